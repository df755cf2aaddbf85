use std::future::Future;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::task::JoinError;

/// Run every item through a worker with a bounded number of tasks in flight.
///
/// Items launch in order; when a task completes its slot is freed and the
/// next pending item starts. The first observed worker error fails the whole
/// operation. Tasks already launched are not cancelled; their handles are
/// dropped and they run to completion in the background, results discarded.
pub async fn run_with_concurrency<I, T, E, F, Fut>(
  items: Vec<I>,
  limit: usize,
  worker: F,
) -> Result<Vec<T>, E>
where
  I: Send + 'static,
  T: Send + 'static,
  E: From<JoinError> + Send + 'static,
  F: Fn(I, usize) -> Fut,
  Fut: Future<Output = Result<T, E>> + Send + 'static,
{
  let limit = limit.max(1);
  let total = items.len();

  let mut results: Vec<Option<T>> = (0..total).map(|_| None).collect();
  let mut pending = items.into_iter().enumerate();
  let mut in_flight = FuturesUnordered::new();

  loop {
    while in_flight.len() < limit {
      match pending.next() {
        Some((index, item)) => {
          let task = worker(item, index);
          in_flight.push(tokio::spawn(async move { (index, task.await) }));
        }
        None => break,
      }
    }

    match in_flight.next().await {
      Some(joined) => {
        let (index, result) = joined?;
        match result {
          Ok(value) => results[index] = Some(value),
          Err(error) => return Err(error),
        }
      }
      None => break,
    }
  }

  Ok(results.into_iter().flatten().collect())
}

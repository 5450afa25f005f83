//! C4: concurrency primitives — bounded parallel map and winner-takes-all
//! race, both built on [`CancellationToken`] composition the same way
//! [`crate::guards`] composes resource signals (§4.4).

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

/// One worker's fail-fast error: which index failed and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapBoundedError {
    pub index: usize,
    pub message: String,
}

/// Outcome of [`map_bounded`]. Never an `Err` — failure and cancellation are
/// both encoded as fields, per §7.
#[derive(Debug)]
pub struct MapBoundedOutcome<O> {
    /// Pre-sized to the input length; `None` at indices never started
    /// (skipped because of an abort).
    pub results: Vec<Option<O>>,
    pub aborted: bool,
    pub error: Option<MapBoundedError>,
}

fn normalize_concurrency(concurrency: i64, items_len: usize) -> usize {
    let normalized = if concurrency <= 0 {
        items_len
    } else {
        concurrency as usize
    };
    normalized.clamp(1, items_len.max(1))
}

/// Run `f` over every item with at most `concurrency` workers in flight at
/// once, preserving result order by input index.
///
/// `concurrency <= 0` normalizes to `items.len()` (unbounded). On the first
/// non-cancellation error from any worker, a combined internal token is
/// cancelled, the remaining workers stop claiming new items, and the error
/// is reported without waiting for other in-flight work to claim more items
/// (though every spawned worker is still joined before this function
/// returns, so nothing leaks). If `cancel` fires externally, partial results
/// are returned with `aborted: true` instead of an error.
pub async fn map_bounded<I, O, F, Fut>(
    items: Vec<I>,
    concurrency: i64,
    cancel: CancellationToken,
    f: F,
) -> MapBoundedOutcome<O>
where
    I: Clone + Send + Sync + 'static,
    O: Send + 'static,
    F: Fn(I, usize, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, String>> + Send + 'static,
{
    let items_len = items.len();
    if items_len == 0 {
        return MapBoundedOutcome {
            results: Vec::new(),
            aborted: false,
            error: None,
        };
    }

    let limit = normalize_concurrency(concurrency, items_len);
    let items = Arc::new(items);
    let f = Arc::new(f);
    let next_index = Arc::new(AtomicUsize::new(0));
    let results: Arc<AsyncMutex<Vec<Option<O>>>> = Arc::new(AsyncMutex::new((0..items_len).map(|_| None).collect()));
    let error_slot: Arc<std::sync::Mutex<Option<MapBoundedError>>> = Arc::new(std::sync::Mutex::new(None));
    let combined = cancel.child_token();

    let mut handles = Vec::with_capacity(limit);
    for _ in 0..limit {
        let items = Arc::clone(&items);
        let f = Arc::clone(&f);
        let next_index = Arc::clone(&next_index);
        let results = Arc::clone(&results);
        let error_slot = Arc::clone(&error_slot);
        let combined = combined.clone();

        handles.push(tokio::spawn(async move {
            loop {
                if combined.is_cancelled() {
                    break;
                }
                let idx = next_index.fetch_add(1, Ordering::SeqCst);
                if idx >= items_len {
                    break;
                }
                let item = items[idx].clone();
                match f(item, idx, combined.clone()).await {
                    Ok(value) => {
                        results.lock().await[idx] = Some(value);
                    }
                    Err(message) => {
                        if combined.is_cancelled() {
                            // Cancellation won the race; swallow the error.
                        } else {
                            let mut slot = error_slot.lock().unwrap();
                            if slot.is_none() {
                                tracing::warn!(index = idx, %message, "map_bounded fail-fast: cancelling remaining workers");
                                *slot = Some(MapBoundedError { index: idx, message });
                            }
                            combined.cancel();
                        }
                    }
                }
            }
        }));
    }

    for handle in handles {
        let _ = handle.await;
    }

    let results = Arc::try_unwrap(results)
        .expect("all worker clones of `results` are dropped once their tasks are joined")
        .into_inner();
    let error = error_slot.lock().unwrap().clone();

    if cancel.is_cancelled() {
        return MapBoundedOutcome {
            results,
            aborted: true,
            error: None,
        };
    }

    MapBoundedOutcome {
        results,
        aborted: false,
        error,
    }
}

/// One task's failure in a lost race.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaceFailure {
    pub id: String,
    pub error: String,
}

/// Outcome of [`race`]. Never an `Err` — every failure mode, including the
/// empty-input and all-failed cases, is a variant here instead, per §7.
#[derive(Debug)]
pub enum RaceOutcome<O> {
    Won { winner_id: String, result: O },
    Aborted,
    AllFailed { failures: Vec<RaceFailure> },
    NoTasks,
}

/// A boxed, type-erased race participant: takes the combined cancel token,
/// returns its result. Boxing lets callers race a list of differently-shaped
/// closures (or futures) under one `Vec`; see [`boxed_race_task`].
pub type RaceTask<O> = Box<dyn FnOnce(CancellationToken) -> BoxRaceFuture<O> + Send>;
type BoxRaceFuture<O> = std::pin::Pin<Box<dyn Future<Output = Result<O, String>> + Send>>;

/// Wrap a closure/future pair into a [`RaceTask`].
pub fn boxed_race_task<O, F, Fut>(f: F) -> RaceTask<O>
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<O, String>> + Send + 'static,
{
    Box::new(move |token| Box::pin(f(token)))
}

/// Run every `(id, task)` pair concurrently; the first to return `Ok` wins
/// and the rest are asked (via the combined token) to stop. Every task is
/// still awaited to completion before this function returns, so a loser's
/// future never leaks past the call (§4.4, S4).
pub async fn race<O>(tasks: Vec<(String, RaceTask<O>)>, parent_cancel: CancellationToken) -> RaceOutcome<O>
where
    O: Send + 'static,
{
    if tasks.is_empty() {
        return RaceOutcome::NoTasks;
    }
    if parent_cancel.is_cancelled() {
        return RaceOutcome::Aborted;
    }

    let combined = parent_cancel.child_token();
    let mut in_flight = FuturesUnordered::new();
    for (id, task) in tasks {
        let token = combined.clone();
        in_flight.push(tokio::spawn(async move { (id, task(token).await) }));
    }

    let mut winner: Option<(String, O)> = None;
    let mut failures = Vec::new();

    while let Some(joined) = in_flight.next().await {
        match joined {
            Ok((id, Ok(value))) => {
                if winner.is_none() {
                    tracing::info!(winner_id = %id, "race winner, cancelling remaining tasks");
                    winner = Some((id, value));
                    combined.cancel();
                }
            }
            Ok((id, Err(error))) => {
                tracing::debug!(task_id = %id, %error, "race participant failed");
                failures.push(RaceFailure { id, error });
            }
            Err(_join_error) => {
                // A task panicked or was aborted; neither a win nor a
                // reportable application-level failure.
            }
        }
    }

    if let Some((winner_id, result)) = winner {
        return RaceOutcome::Won { winner_id, result };
    }
    if parent_cancel.is_cancelled() {
        return RaceOutcome::Aborted;
    }
    RaceOutcome::AllFailed { failures }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    #[tokio::test]
    async fn map_bounded_empty_items_returns_immediately() {
        let outcome: MapBoundedOutcome<i32> =
            map_bounded(Vec::<i32>::new(), 4, CancellationToken::new(), |item, _idx, _token| async move {
                Ok(item)
            })
            .await;
        assert!(outcome.results.is_empty());
        assert!(!outcome.aborted);
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn map_bounded_preserves_order_by_index() {
        let items = vec![10, 20, 30, 40, 50];
        let outcome = map_bounded(items, 3, CancellationToken::new(), |item, _idx, _token| async move {
            Ok::<_, String>(item * 2)
        })
        .await;
        assert_eq!(
            outcome.results,
            vec![Some(20), Some(40), Some(60), Some(80), Some(100)]
        );
        assert!(!outcome.aborted);
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn map_bounded_never_exceeds_concurrency_limit() {
        let items: Vec<u32> = (0..20).collect();
        let in_flight = Arc::new(AtomicU32::new(0));
        let max_observed = Arc::new(AtomicU32::new(0));

        let in_flight_for_closure = Arc::clone(&in_flight);
        let max_observed_for_closure = Arc::clone(&max_observed);
        let outcome = map_bounded(items, 4, CancellationToken::new(), move |item, _idx, _token| {
            let in_flight = Arc::clone(&in_flight_for_closure);
            let max_observed = Arc::clone(&max_observed_for_closure);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_observed.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, String>(item)
            }
        })
        .await;

        assert!(outcome.results.iter().all(Option::is_some));
        assert!(max_observed.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test]
    async fn map_bounded_zero_or_negative_concurrency_means_unbounded() {
        let items: Vec<u32> = (0..5).collect();
        let outcome = map_bounded(items, 0, CancellationToken::new(), |item, _idx, _token| async move {
            Ok::<_, String>(item)
        })
        .await;
        assert_eq!(outcome.results.len(), 5);
        assert!(outcome.results.iter().all(Option::is_some));
    }

    #[tokio::test]
    async fn map_bounded_fail_fast_reports_first_error_and_skips_rest() {
        let items: Vec<u32> = (0..10).collect();
        let outcome = map_bounded(items, 1, CancellationToken::new(), |item, idx, _token| async move {
            if item == 2 {
                Err("boom".to_owned())
            } else {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(idx)
            }
        })
        .await;

        assert!(!outcome.aborted);
        let error = outcome.error.expect("fail-fast should report an error");
        assert_eq!(error.index, 2);
        assert_eq!(error.message, "boom");
        // With concurrency 1, claiming stops right after the failing index.
        assert!(outcome.results[3..].iter().all(Option::is_none));
    }

    #[tokio::test]
    async fn map_bounded_external_cancel_returns_partial_aborted_results() {
        let items: Vec<u32> = (0..20).collect();
        let cancel = CancellationToken::new();
        let cancel_for_task = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(15)).await;
            cancel_for_task.cancel();
        });

        let outcome = map_bounded(items, 2, cancel, |item, _idx, _token| async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, String>(item)
        })
        .await;

        assert!(outcome.aborted);
        assert!(outcome.error.is_none());
        assert!(outcome.results.iter().any(Option::is_none), "some items never started");
    }

    #[tokio::test]
    async fn race_empty_tasks_reports_no_tasks() {
        let outcome: RaceOutcome<&str> = race(Vec::new(), CancellationToken::new()).await;
        assert!(matches!(outcome, RaceOutcome::NoTasks));
    }

    #[tokio::test]
    async fn race_already_cancelled_reports_aborted() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let tasks: Vec<(String, RaceTask<&str>)> = vec![(
            "a".to_owned(),
            boxed_race_task(|_token| async move { Ok("a") }),
        )];
        let outcome = race(tasks, cancel).await;
        assert!(matches!(outcome, RaceOutcome::Aborted));
    }

    #[tokio::test]
    async fn race_fastest_task_wins() {
        let tasks: Vec<(String, RaceTask<String>)> = vec![
            (
                "fast".to_owned(),
                boxed_race_task(|_token| async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Ok("fast result".to_owned())
                }),
            ),
            (
                "slow".to_owned(),
                boxed_race_task(|token| async move {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    if token.is_cancelled() {
                        Err("Aborted".to_owned())
                    } else {
                        Ok("slow result".to_owned())
                    }
                }),
            ),
        ];

        let outcome = race(tasks, CancellationToken::new()).await;
        match outcome {
            RaceOutcome::Won { winner_id, result } => {
                assert_eq!(winner_id, "fast");
                assert_eq!(result, "fast result");
            }
            other => panic!("expected a winner, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn race_all_failures_raises_aggregate() {
        let tasks: Vec<(String, RaceTask<&str>)> = vec![
            ("a".to_owned(), boxed_race_task(|_t| async move { Err("err a".to_owned()) })),
            ("b".to_owned(), boxed_race_task(|_t| async move { Err("err b".to_owned()) })),
        ];
        let outcome = race(tasks, CancellationToken::new()).await;
        match outcome {
            RaceOutcome::AllFailed { failures } => {
                assert_eq!(failures.len(), 2);
                assert!(failures.iter().any(|f| f.id == "a" && f.error == "err a"));
                assert!(failures.iter().any(|f| f.id == "b" && f.error == "err b"));
            }
            other => panic!("expected AllFailed, got {other:?}"),
        }
    }
}

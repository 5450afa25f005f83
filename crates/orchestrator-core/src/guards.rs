//! C2: resource guards — duration, memory, and concurrent-tool-call limits,
//! each expressed as a composable cancellation signal (§4.2).

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Per-task resource limits (§3). `enforce_limits == false` makes
/// `max_memory_mb` and `max_concurrent_tool_calls` advisory only:
/// `max_duration_ms` is always enforced when present, regardless of this flag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub max_memory_mb: Option<u64>,
    pub max_duration_ms: Option<u64>,
    pub max_concurrent_tool_calls: Option<u32>,
    #[serde(default)]
    pub enforce_limits: bool,
}

/// How often the memory poller samples usage (§4.2).
const MEMORY_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// A pluggable sampler for "current memory usage in MB". Measures the
/// orchestrator's own heap, not the child process's RSS (see DESIGN.md);
/// callers that want to measure the child instead can supply their own
/// sampler here. The default sampler always reports zero, making the
/// memory guard inert unless a caller wires in a real measurement.
pub type MemorySampler = Arc<dyn Fn() -> u64 + Send + Sync>;

fn default_sampler() -> MemorySampler {
    Arc::new(|| 0)
}

/// Composes the caller's cancel token with the duration timer, memory
/// poller, and tool-call tracker into a single combined token. Any one
/// signal firing cancels all of them.
///
/// Must be torn down via [`GuardSet::shutdown`] on every return path from
/// the executor so the background duration-timer and memory-poller tasks
/// don't outlive the task they were guarding.
pub struct GuardSet {
    combined: CancellationToken,
    reason: Arc<std::sync::Mutex<Option<String>>>,
    in_flight_tools: Arc<AtomicI64>,
    background: Vec<JoinHandle<()>>,
}

impl GuardSet {
    /// Build a guard set for one executor invocation.
    pub fn new(parent: &CancellationToken, limits: &ResourceLimits) -> Self {
        Self::with_sampler(parent, limits, default_sampler())
    }

    /// Like [`GuardSet::new`], but with an injectable memory sampler
    /// (primarily for tests).
    pub fn with_sampler(
        parent: &CancellationToken,
        limits: &ResourceLimits,
        sampler: MemorySampler,
    ) -> Self {
        Self::with_sampler_and_poll_interval(parent, limits, sampler, MEMORY_POLL_INTERVAL)
    }

    /// Like [`GuardSet::with_sampler`], but with an injectable memory poll
    /// interval (primarily for tests, so the poller doesn't have to wait out
    /// the production [`MEMORY_POLL_INTERVAL`] to prove it fires).
    fn with_sampler_and_poll_interval(
        parent: &CancellationToken,
        limits: &ResourceLimits,
        sampler: MemorySampler,
        poll_interval: Duration,
    ) -> Self {
        let combined = parent.child_token();
        let reason = Arc::new(std::sync::Mutex::new(None));
        let mut background = Vec::new();

        if let Some(max_duration_ms) = limits.max_duration_ms {
            let combined = combined.clone();
            let reason = Arc::clone(&reason);
            background.push(tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(max_duration_ms)) => {
                        set_reason(&reason, "duration limit exceeded");
                        combined.cancel();
                    }
                    _ = combined.cancelled() => {}
                }
            }));
        }

        if limits.enforce_limits {
            if let Some(max_memory_mb) = limits.max_memory_mb {
                let combined = combined.clone();
                let reason = Arc::clone(&reason);
                background.push(tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            _ = tokio::time::sleep(poll_interval) => {
                                let used_mb = sampler();
                                if used_mb > max_memory_mb {
                                    set_reason(&reason, "memory limit exceeded");
                                    combined.cancel();
                                    break;
                                }
                            }
                            _ = combined.cancelled() => break,
                        }
                    }
                }));
            }
        }

        Self {
            combined,
            reason,
            in_flight_tools: Arc::new(AtomicI64::new(0)),
            background,
        }
    }

    /// The composite token to hand to the subprocess / event loop.
    pub fn token(&self) -> CancellationToken {
        self.combined.clone()
    }

    /// Why the composite token fired, if it has.
    pub fn reason(&self) -> Option<String> {
        self.reason.lock().unwrap().clone()
    }

    /// Report that a tool execution has started. If `enforce_limits` and
    /// `max_concurrent_tool_calls` are set and the new in-flight count
    /// exceeds the limit, cancels the composite token.
    pub fn tool_call_started(&self, limits: &ResourceLimits) {
        let in_flight = self.in_flight_tools.fetch_add(1, Ordering::SeqCst) + 1;
        if limits.enforce_limits {
            if let Some(max_concurrent) = limits.max_concurrent_tool_calls {
                if in_flight as u64 > max_concurrent as u64 {
                    set_reason(&self.reason, "concurrent tool call limit exceeded");
                    self.combined.cancel();
                }
            }
        }
    }

    /// Report that a tool execution has finished.
    pub fn tool_call_finished(&self) {
        self.in_flight_tools.fetch_sub(1, Ordering::SeqCst);
    }

    /// Tear down all background guard tasks. Safe to call multiple times;
    /// must be called on every exit path from the executor.
    pub fn shutdown(&mut self) {
        self.combined.cancel();
        for handle in self.background.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for GuardSet {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn set_reason(reason: &Arc<std::sync::Mutex<Option<String>>>, text: &str) {
    let mut guard = reason.lock().unwrap();
    if guard.is_none() {
        tracing::warn!(reason = text, "resource guard cancelling task");
        *guard = Some(text.to_owned());
    }
}

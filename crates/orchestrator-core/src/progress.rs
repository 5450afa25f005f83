//! Live, mutable view of a single task's execution, streamed to callers via
//! [`crate::executor::ProgressSink`].

use std::collections::VecDeque;
use std::time::Instant;

use serde::Serialize;

use crate::usage::UsageStats;

/// Capacity of the recent-tool-invocations FIFO (§3).
pub const RECENT_TOOLS_CAP: usize = 10;
/// Capacity of the recent-assistant-text-preview FIFO (§3).
pub const RECENT_OUTPUT_CAP: usize = 5;
/// Preview truncation length for recent assistant text (§3).
pub const OUTPUT_PREVIEW_CHARS: usize = 100;

/// Lifecycle status of a task as seen from the outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Aborted,
}

/// One recorded tool invocation: the tool name and its argument preview.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInvocation {
    pub tool: String,
    pub args_preview: String,
}

/// A fixed-capacity FIFO that silently drops its oldest entry on overflow.
///
/// Used for both the recent-tools and recent-output buffers in
/// [`TaskProgress`]; the cap is fixed at construction and never exceeded,
/// satisfying the "FIFO sizes never exceed their caps" invariant (§3).
#[derive(Debug, Clone)]
pub struct BoundedFifo<T> {
    cap: usize,
    items: VecDeque<T>,
}

impl<T> BoundedFifo<T> {
    pub fn new(cap: usize) -> Self {
        assert!(cap > 0, "BoundedFifo capacity must be positive");
        Self {
            cap,
            items: VecDeque::with_capacity(cap),
        }
    }

    /// Push a new item, dropping the oldest if already at capacity.
    pub fn push(&mut self, item: T) {
        if self.items.len() >= self.cap {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.items.iter().cloned().collect()
    }
}

impl<T: Serialize> Serialize for BoundedFifo<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_seq(self.items.iter())
    }
}

/// Live, mutable progress for one task.
///
/// A snapshot of this struct (a clone) is handed to the progress callback
/// after every recognized event; callers may retain the clone indefinitely
/// since it carries no shared state.
#[derive(Debug, Clone, Serialize)]
pub struct TaskProgress {
    pub id: String,
    pub name: Option<String>,
    pub status: TaskStatus,
    pub task: String,
    pub model: Option<String>,
    pub recent_tools: BoundedFifo<ToolInvocation>,
    pub recent_output: BoundedFifo<String>,
    pub tool_count: u64,
    pub current_tool: Option<String>,
    pub current_tool_args: Option<String>,
    pub usage: UsageStats,
    #[serde(skip)]
    started_at: Instant,
    pub duration_ms: u64,
}

impl TaskProgress {
    pub fn new(id: impl Into<String>, name: Option<String>, task: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name,
            status: TaskStatus::Pending,
            task: task.into(),
            model: None,
            recent_tools: BoundedFifo::new(RECENT_TOOLS_CAP),
            recent_output: BoundedFifo::new(RECENT_OUTPUT_CAP),
            tool_count: 0,
            current_tool: None,
            current_tool_args: None,
            usage: UsageStats::default(),
            started_at: Instant::now(),
            duration_ms: 0,
        }
    }

    /// Refresh `duration_ms` from the wall clock. Called before every
    /// snapshot emission.
    pub fn tick(&mut self) {
        self.duration_ms = self.started_at.elapsed().as_millis() as u64;
    }

    /// Record the start of a tool execution.
    pub fn begin_tool(&mut self, tool: impl Into<String>, args_preview: impl Into<String>) {
        self.current_tool = Some(tool.into());
        self.current_tool_args = Some(args_preview.into());
    }

    /// Record the end of a tool execution: push onto the recent-tools FIFO,
    /// bump counters, and clear the in-flight tool fields.
    pub fn end_tool(&mut self, tool: impl Into<String>, args_preview: impl Into<String>) {
        self.recent_tools.push(ToolInvocation {
            tool: tool.into(),
            args_preview: args_preview.into(),
        });
        self.tool_count += 1;
        self.current_tool = None;
        self.current_tool_args = None;
    }

    /// Push a truncated preview of assistant text onto the recent-output FIFO.
    pub fn push_output_preview(&mut self, text: &str) {
        self.recent_output.push(truncate_preview(text, OUTPUT_PREVIEW_CHARS));
    }
}

/// Truncate `text` to at most `max_chars` characters, appending an ellipsis
/// when truncated. Operates on `char` boundaries, not bytes, so multi-byte
/// UTF-8 text is never split mid-codepoint.
pub fn truncate_preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('\u{2026}');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_fifo_drops_oldest_on_overflow() {
        let mut fifo = BoundedFifo::new(3);
        for i in 0..5 {
            fifo.push(i);
        }
        assert_eq!(fifo.to_vec(), vec![2, 3, 4]);
        assert_eq!(fifo.len(), 3);
    }

    #[test]
    fn bounded_fifo_never_exceeds_cap() {
        let mut fifo = BoundedFifo::new(10);
        for i in 0..100 {
            fifo.push(i);
            assert!(fifo.len() <= 10);
        }
    }

    #[test]
    fn recent_tools_and_output_caps_match_spec() {
        let mut progress = TaskProgress::new("t1", None, "do a thing");
        for i in 0..20 {
            progress.end_tool("bash", format!("echo {i}"));
        }
        assert_eq!(progress.recent_tools.len(), RECENT_TOOLS_CAP);
        assert_eq!(progress.tool_count, 20, "toolCount keeps counting past the FIFO cap");

        for i in 0..20 {
            progress.push_output_preview(&format!("line {i}"));
        }
        assert_eq!(progress.recent_output.len(), RECENT_OUTPUT_CAP);
    }

    #[test]
    fn truncate_preview_short_text_unchanged() {
        assert_eq!(truncate_preview("hello", 100), "hello");
    }

    #[test]
    fn truncate_preview_long_text_gets_ellipsis() {
        let long = "a".repeat(150);
        let preview = truncate_preview(&long, 100);
        assert_eq!(preview.chars().count(), 101);
        assert!(preview.ends_with('\u{2026}'));
    }

    #[test]
    fn begin_and_end_tool_clears_current_fields() {
        let mut progress = TaskProgress::new("t1", None, "task");
        progress.begin_tool("read", "foo.rs");
        assert_eq!(progress.current_tool.as_deref(), Some("read"));
        progress.end_tool("read", "foo.rs");
        assert!(progress.current_tool.is_none());
        assert!(progress.current_tool_args.is_none());
    }
}

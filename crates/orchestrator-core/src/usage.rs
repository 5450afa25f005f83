//! Token/cost accounting accumulated over the lifetime of a single task.

use serde::{Deserialize, Serialize};

/// Running totals for a task's consumption of model resources.
///
/// Every field starts at zero and is only ever increased by [`add_usage`];
/// nothing in this crate decrements a `UsageStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    pub input: u64,
    pub output: u64,
    pub cache_read: u64,
    pub cache_write: u64,
    pub cost: f64,
    pub context_tokens: u64,
    pub turns: u32,
}

/// A sparse usage update: only present fields are added into a [`UsageStats`].
///
/// Mirrors the event stream's `message.usage` shape (§6.2), where missing
/// sub-fields default to "don't touch this counter" rather than zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsageDelta {
    pub input: Option<u64>,
    pub output: Option<u64>,
    pub cache_read: Option<u64>,
    pub cache_write: Option<u64>,
    pub cost: Option<f64>,
    pub context_tokens: Option<u64>,
    pub turns: Option<u32>,
}

/// Add every present field of `partial` into `target`. Absent fields leave
/// the corresponding counter unchanged.
pub fn add_usage(target: &mut UsageStats, partial: &UsageDelta) {
    if let Some(v) = partial.input {
        target.input += v;
    }
    if let Some(v) = partial.output {
        target.output += v;
    }
    if let Some(v) = partial.cache_read {
        target.cache_read += v;
    }
    if let Some(v) = partial.cache_write {
        target.cache_write += v;
    }
    if let Some(v) = partial.cost {
        target.cost += v;
    }
    if let Some(v) = partial.context_tokens {
        target.context_tokens += v;
    }
    if let Some(v) = partial.turns {
        target.turns += v;
    }
}

impl UsageStats {
    /// Convenience wrapper around [`add_usage`] for call sites that already
    /// hold `&mut self`.
    pub fn add(&mut self, partial: &UsageDelta) {
        add_usage(self, partial);
    }
}

//! Retry budget for the loop-back edges of a run.

use serde::{Deserialize, Serialize};

/// Extra attempts allowed per loop.
pub const MAX_EXTRA_ATTEMPTS: u32 = 1;

/// The two loops a run may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryLoop {
    /// Back to web search after empty grading or an insufficient answer
    WebSearch,
    /// Back to generation after an ungrounded answer
    Regenerate,
}

/// Counts of loop-backs taken in one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryUsage {
    pub web_search: u32,
    pub regenerate: u32,
}

/// Owned by a single run. Every loop-back edge asks it first.
#[derive(Debug, Default)]
pub struct RetryBudget {
    usage: RetryUsage,
}

impl RetryBudget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one attempt of `kind` if any remain.
    pub fn try_consume(&mut self, kind: RetryLoop) -> bool {
        let counter = match kind {
            RetryLoop::WebSearch => &mut self.usage.web_search,
            RetryLoop::Regenerate => &mut self.usage.regenerate,
        };

        if *counter >= MAX_EXTRA_ATTEMPTS {
            return false;
        }
        *counter += 1;
        true
    }

    pub fn used(&self, kind: RetryLoop) -> u32 {
        match kind {
            RetryLoop::WebSearch => self.usage.web_search,
            RetryLoop::Regenerate => self.usage.regenerate,
        }
    }

    pub fn usage(&self) -> RetryUsage {
        self.usage
    }
}

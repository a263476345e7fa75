//! Lifecycle status codes
//!
//! One enumeration serves both the main pipeline (`status`) and the secondary
//! audio pipeline (`musicStatus`). The two pipelines accept different
//! transition tables, see [`StatusCode::can_advance_main`] and
//! [`StatusCode::can_advance_music`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    /// No stage active (fresh, queued, or between analysis and generation)
    Idling,
    /// Vision analysis in progress
    RunningAnalysis,
    /// Image or audio synthesis in progress
    RunningGeneration,
    /// Finished successfully (terminal)
    Success,
    /// Finished with an error (terminal)
    Error,
}

impl StatusCode {
    /// Position in the lifecycle order
    ///
    /// `SUCCESS` and `ERROR` share the terminal rank.
    pub fn rank(self) -> u8 {
        match self {
            StatusCode::Idling => 0,
            StatusCode::RunningAnalysis => 1,
            StatusCode::RunningGeneration => 2,
            StatusCode::Success | StatusCode::Error => 3,
        }
    }

    /// Check if status is terminal (finished)
    pub fn is_terminal(self) -> bool {
        matches!(self, StatusCode::Success | StatusCode::Error)
    }

    /// Wire representation, identical to the serde form
    pub fn as_str(self) -> &'static str {
        match self {
            StatusCode::Idling => "IDLING",
            StatusCode::RunningAnalysis => "RUNNING_ANALYSIS",
            StatusCode::RunningGeneration => "RUNNING_GENERATION",
            StatusCode::Success => "SUCCESS",
            StatusCode::Error => "ERROR",
        }
    }

    /// Transition table for the main pipeline
    ///
    /// `IDLING → RUNNING_ANALYSIS → IDLING (handoff) → RUNNING_GENERATION →
    /// {SUCCESS | ERROR}`. The handoff back to `IDLING` is the only accepted
    /// regression, and `RUNNING_ANALYSIS → RUNNING_GENERATION` is accepted
    /// when the handoff marker is disabled. `ERROR` is reachable from any
    /// non-terminal state.
    pub fn can_advance_main(self, next: StatusCode) -> bool {
        use StatusCode::*;
        match (self, next) {
            (from, _) if from.is_terminal() => false,
            (_, Error) => true,
            (Idling, RunningAnalysis)
            | (RunningAnalysis, Idling)
            | (RunningAnalysis, RunningGeneration)
            | (Idling, RunningGeneration)
            | (RunningGeneration, Success) => true,
            _ => false,
        }
    }

    /// Transition table for the secondary (audio) pipeline
    ///
    /// `IDLING (queued) → RUNNING_GENERATION → {SUCCESS | ERROR}`; a queued
    /// task may also fail straight to `ERROR`.
    pub fn can_advance_music(self, next: StatusCode) -> bool {
        use StatusCode::*;
        matches!(
            (self, next),
            (Idling, RunningGeneration)
                | (Idling, Error)
                | (RunningGeneration, Success)
                | (RunningGeneration, Error)
        )
    }
}

impl Default for StatusCode {
    fn default() -> Self {
        StatusCode::Idling
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Chat state types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Request state of the controller.
///
/// `Sending` counts outstanding completion calls; the pending flag shown to
/// the user is simply "not idle".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatState {
    #[default]
    Idle,
    Sending {
        in_flight: u32,
    },
}

impl ChatState {
    pub fn is_pending(&self) -> bool {
        self.in_flight() > 0
    }

    pub fn in_flight(&self) -> u32 {
        match self {
            ChatState::Idle => 0,
            ChatState::Sending { in_flight } => *in_flight,
        }
    }
}

/// Rule for a submission that arrives while a call is already in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdmissionPolicy {
    /// Accept it; both calls run and replies land in arrival order
    #[default]
    Overlap,
    /// Reject it until the outstanding call settles
    SingleSlot,
}

impl AdmissionPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            AdmissionPolicy::Overlap => "overlap",
            AdmissionPolicy::SingleSlot => "single",
        }
    }
}

impl fmt::Display for AdmissionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdmissionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "overlap" => Ok(AdmissionPolicy::Overlap),
            "single" | "single-slot" | "single_slot" => Ok(AdmissionPolicy::SingleSlot),
            other => Err(format!("unknown admission policy: {other}")),
        }
    }
}

/// Static context for transitions
#[derive(Debug, Clone, Copy, Default)]
pub struct ChatContext {
    pub admission: AdmissionPolicy,
}

impl ChatContext {
    pub fn new(admission: AdmissionPolicy) -> Self {
        Self { admission }
    }
}

//! Receive-side transfer state machine.

use std::fmt;

/// Transfer state
///
/// Transitions only move forward:
/// `AwaitingMetadata -> Receiving -> Complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// No metadata seen yet
    AwaitingMetadata,
    /// Metadata registered, some chunks outstanding
    Receiving,
    /// Every declared chunk has been received
    Complete,
}

impl TransferState {
    /// Derive the state from the received and declared chunk counts
    #[must_use]
    pub fn from_counts(received: u64, total: u64) -> Self {
        if received >= total {
            Self::Complete
        } else {
            Self::Receiving
        }
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingMetadata => write!(f, "AwaitingMetadata"),
            Self::Receiving => write!(f, "Receiving"),
            Self::Complete => write!(f, "Complete"),
        }
    }
}

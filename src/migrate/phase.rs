//! Migration phase state machine.
//!
//! ```text
//! Idle → ConnectingSource → ConnectingDestination → Listing → Copying → ShuttingDown → Done
//!              │                    │                  │          │           │
//!              └────────────────────┴──────────────────┴──────────┴───────────┴──→ Failed
//! ```
//!
//! The connecting and listing phases may also move straight to
//! `ShuttingDown` when the run is cancelled.

/// Phase of a migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MigrationPhase {
    Idle,
    ConnectingSource,
    ConnectingDestination,
    Listing,
    Copying,
    ShuttingDown,
    Done,
    Failed,
}

impl MigrationPhase {
    /// Check if `next` may follow this phase.
    pub fn can_transition_to(self, next: MigrationPhase) -> bool {
        use MigrationPhase::*;
        matches!(
            (self, next),
            (Idle, ConnectingSource)
                | (ConnectingSource, ConnectingDestination)
                | (ConnectingDestination, Listing)
                | (Listing, Copying)
                | (Copying, ShuttingDown)
                | (ShuttingDown, Done)
                | (ConnectingSource, ShuttingDown)
                | (ConnectingDestination, ShuttingDown)
                | (Listing, ShuttingDown)
                | (ConnectingSource, Failed)
                | (ConnectingDestination, Failed)
                | (Listing, Failed)
                | (Copying, Failed)
                | (ShuttingDown, Failed)
        )
    }

    /// Check if the run is over.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl std::fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::ConnectingSource => "connecting-source",
            Self::ConnectingDestination => "connecting-destination",
            Self::Listing => "listing",
            Self::Copying => "copying",
            Self::ShuttingDown => "shutting-down",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Tracks the current phase and every phase entered.
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    history: Vec<MigrationPhase>,
}

impl PhaseTracker {
    /// Start in `Idle`.
    pub fn new() -> Self {
        Self {
            history: vec![MigrationPhase::Idle],
        }
    }

    /// Current phase.
    pub fn current(&self) -> MigrationPhase {
        self.history
            .last()
            .copied()
            .unwrap_or(MigrationPhase::Idle)
    }

    /// Every phase entered so far, starting with `Idle`.
    pub fn history(&self) -> &[MigrationPhase] {
        &self.history
    }

    /// Move to `next`. Illegal transitions are rejected and return false.
    pub fn advance(&mut self, next: MigrationPhase) -> bool {
        let current = self.current();
        if !current.can_transition_to(next) {
            tracing::error!(from = %current, to = %next, "illegal migration phase transition");
            return false;
        }
        tracing::debug!(from = %current, to = %next, "migration phase");
        self.history.push(next);
        true
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

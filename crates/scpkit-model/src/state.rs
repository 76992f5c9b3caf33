//! Lifecycle states shared by every item in a configuration tree

use serde::{Deserialize, Serialize};

/// Lifecycle state of a field, node, or collection.
///
/// `Uninitialized` and `Committed` are idle states; `Initializing`,
/// `Precommit`, and `Changing` all carry pending data worth persisting.
/// `Precommit` marks values bulk-loaded from the wire that a later
/// unconditional commit promotes to `Committed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Never written to
    Uninitialized,
    /// First value present, never committed
    Initializing,
    /// Provisionally loaded from the wire, not yet confirmed
    Precommit,
    /// Matches the last committed snapshot
    Committed,
    /// Diverged from the last committed snapshot
    Changing,
}

impl Default for LifecycleState {
    fn default() -> Self {
        Self::Uninitialized
    }
}

impl LifecycleState {
    /// True when this state carries pending data worth persisting.
    pub fn is_changed(self) -> bool {
        matches!(
            self,
            Self::Initializing | Self::Precommit | Self::Changing
        )
    }

    /// Parent-state update when a child reports a pending state.
    ///
    /// A committed parent starts changing, an untouched parent starts
    /// initializing, and a parent already pending keeps its state. A
    /// non-pending child report leaves the parent untouched; use
    /// [`LifecycleState::settle`] to downgrade after recomputing children.
    pub fn absorb(self, child: LifecycleState) -> LifecycleState {
        if !child.is_changed() {
            return self;
        }
        match self {
            Self::Uninitialized => Self::Initializing,
            Self::Committed => Self::Changing,
            pending => pending,
        }
    }

    /// Parent-state downgrade once the set of changed children is known.
    ///
    /// With a changed child remaining the state stands; otherwise a parent
    /// that was ever committed settles to `Committed` and one that never was
    /// settles back to `Uninitialized`.
    pub fn settle(self, any_child_changed: bool) -> LifecycleState {
        if any_child_changed {
            return self;
        }
        match self {
            Self::Uninitialized | Self::Initializing => Self::Uninitialized,
            Self::Precommit | Self::Committed | Self::Changing => Self::Committed,
        }
    }
}

//! Model error taxonomy
//!
//! Every error is local, synchronous, and recoverable at the offending call.
//! A failed write is fully rejected, never partially applied, so the tree
//! can keep being used after any error.

use thiserror::Error;

use crate::state::LifecycleState;

#[derive(Error, Debug)]
pub enum ModelError {
    /// Value failed type coercion, format validation, or a custom predicate
    #[error("validation failed for '{name}': {reason}")]
    Validation { name: String, reason: String },

    /// Write attempted on a non-modifiable committed field, or while frozen
    #[error("write to '{name}' rejected: {reason} (state {state:?})")]
    Immutable {
        name: String,
        reason: String,
        state: LifecycleState,
    },

    /// No free slot index remains in the group's range
    #[error("no free slot index in [{min},{max}]")]
    PoolExhausted { min: u32, max: u32 },

    /// Entry key already present on an auto-indexed create
    #[error("duplicate key '{key}'")]
    DuplicateKey { key: String },

    /// Unknown child, field, or attribute name
    #[error("no child named '{name}'")]
    NotFound { name: String },

    /// Direct write to a derived/composite field
    #[error("'{name}' is a composite field and cannot be written directly")]
    CompositeWrite { name: String },

    /// Filter expression failed to parse or evaluate
    #[error("filter expression error: {0}")]
    Expression(#[from] scpkit_expr::ExprError),
}

use thiserror::Error;

use crate::entity::EntityRef;

/// Errors surfaced by the entity graph, registry, manager and planner.
///
/// Nothing in this crate swallows an error: every fallible operation
/// propagates one of these variants to the caller rather than retrying or
/// silently discarding a failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// An entity was constructed with invalid input (e.g. a `Trigger` with
    /// neither `function` nor `procedure` set, or with no timing flag set).
    #[error("invalid entity construction: {0}")]
    Construction(String),

    /// A ref was registered that already exists in the registry.
    #[error("duplicate ref: {0}")]
    DuplicateRef(EntityRef),

    /// A dependency ref was not present in the registry when required.
    #[error("unknown ref: {0}")]
    UnknownRef(EntityRef),

    /// The dependency graph contains a cycle; topological iteration cannot
    /// produce a total order. Carries the refs that could not be ordered.
    #[error("cycle detected among: {}", .0.iter().map(EntityRef::as_str).collect::<Vec<_>>().join(", "))]
    CycleDetected(Vec<EntityRef>),

    /// A tagged-text rendering mode was requested that the engine doesn't
    /// support (valid modes are `"s"` for clean text and `"m"`/`""` for clean
    /// text with refs re-appended).
    #[error("invalid format spec: {0:?}")]
    InvalidFormatSpec(String),
}

/// Result type for fallible operations in this crate.
pub type Result<T> = std::result::Result<T, Error>;

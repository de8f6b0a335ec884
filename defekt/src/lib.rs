// Copyright 2024-2025 The defekt developers
// released under BSD 3-Clause License

mod dictionary;
mod diff;
pub mod document;
mod dominance;
mod elaborate;
mod hierarchy;
mod observe;
mod select;

/// Cargo.toml version of this library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, thiserror::Error)]
pub enum DefektError {
    #[error("failed to parse shape `{1}` of signal `{0}`")]
    BadShape(String, String),
    #[error("signal `{0}` declares {1} bits, but the dimension lengths multiply to {2}")]
    WidthMismatch(String, u32, u64),
    #[error("top cell already set to `{0}`, conflicting registration `{1}`")]
    TopCellConflict(String, String),
    #[error("assignment to `{0}` at {1} is outside every scope of routine `{2}`")]
    ScopeDesync(String, String, String),
    #[error("observation `{0}` arrived with no active routine")]
    NoActiveRoutine(String),
    #[error("dictionaries differ in shape: {0}")]
    ShapeMismatch(String),
}

pub type Result<T> = std::result::Result<T, DefektError>;

pub use dictionary::{BitPos, Dictionary, Entry, InjectionKind, Status, TargetId};
pub use diff::{DictDiff, DiffTriplet};
pub use document::Document;
pub use dominance::{apply_writes, DominanceAnalyzer, RoutineWrites, SignalWrites, WriteSite};
pub use elaborate::Elaborator;
pub use hierarchy::{
    Cell, CellRef, Direction, FileId, Hierarchy, Module, ModuleRef, ShapeDim, SourceLoc,
    SourceLocId, SourcePoint, SourceRange, Storage, StringId, Target, VarKind, VarRef, VarShape,
    Variable,
};
pub use observe::{AssignLhs, Locator, Observation, RoutineEvent, Subscript};
pub use select::{SelectOptions, Selection, TargetRef};

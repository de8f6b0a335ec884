// Copyright 2024-2025 The defekt developers
// released under BSD 3-Clause License
//! # Front-end observation interface
//! The core is agnostic to how the source language is parsed: a front end
//! reports what it saw as a stream of typed events. Declaration-side events
//! feed the [`crate::Elaborator`], routine-side events feed the
//! [`crate::DominanceAnalyzer`].

use crate::hierarchy::{Direction, SourceRange};

/// A file/line/column locator as reported by the front end. File paths are
/// interned into small integer ids during elaboration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub file: String,
    pub line: u32,
    pub col: u32,
}

impl Locator {
    pub fn new(file: impl Into<String>, line: u32, col: u32) -> Self {
        Locator {
            file: file.into(),
            line,
            col,
        }
    }
}

/// A declaration-side observation. One run consumes one or more streams of
/// these sequentially against a single elaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// A design block type was declared.
    ModuleDecl { module: String, loc: Locator },
    /// A sub-instance was declared inside an already known module.
    CellDecl {
        owner: String,
        cell: String,
        cell_type: String,
        loc: Locator,
    },
    /// The unique root instance of the design.
    TopCell {
        cell: String,
        cell_type: String,
        loc: Locator,
    },
    /// A signal was declared inside an already known module. The shape
    /// string encodes base types and lengths, see
    /// [`crate::elaborate::parse_shape`].
    VarDecl {
        owner: String,
        var: String,
        direction: Direction,
        shape: String,
        loc: Locator,
    },
    /// An instance name was observed in the instance table.
    Instance {
        instance: String,
        module_type: String,
    },
}

/// A subscript of a left-hand expression. Only integer literals can be
/// resolved to a concrete element statically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subscript {
    Literal(i64),
    Dynamic(String),
}

impl Subscript {
    pub fn is_literal(&self) -> bool {
        matches!(self, Subscript::Literal(_))
    }
}

/// The left-hand expression of an assignment: a base signal name plus zero
/// to three nested subscripts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignLhs {
    pub base: String,
    pub subscripts: Vec<Subscript>,
}

impl AssignLhs {
    pub fn new(base: impl Into<String>) -> Self {
        AssignLhs {
            base: base.into(),
            subscripts: Vec::new(),
        }
    }

    pub fn subscripted(base: impl Into<String>, subscripts: Vec<Subscript>) -> Self {
        debug_assert!(subscripts.len() <= 3);
        AssignLhs {
            base: base.into(),
            subscripts,
        }
    }

    /// The full left-hand text. Two writes hit the same dominance slot iff
    /// their texts are identical.
    pub fn text(&self) -> String {
        let mut out = self.base.clone();
        for sub in &self.subscripts {
            match sub {
                Subscript::Literal(value) => {
                    out.push('[');
                    out.push_str(&value.to_string());
                    out.push(']');
                }
                Subscript::Dynamic(expr) => {
                    out.push('[');
                    out.push_str(expr);
                    out.push(']');
                }
            }
        }
        out
    }

    pub fn all_literal(&self) -> bool {
        self.subscripts.iter().all(|s| s.is_literal())
    }
}

/// A routine-side observation, consumed by the dominance analysis after the
/// target set has been selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutineEvent {
    /// A clocked evaluation routine begins. Ends the previous routine.
    Begin {
        module: String,
        routine: String,
        file: String,
        body: SourceRange,
    },
    /// A compound (brace) scope physically inside the active routine.
    Scope { range: SourceRange },
    /// An assignment inside the active routine.
    Assign { lhs: AssignLhs, range: SourceRange },
}

// Copyright 2024-2025 The defekt developers
// released under BSD 3-Clause License
//! # Sequential dominance analysis
//! Determines, for every signal written inside a clocked evaluation
//! routine, the control-flow-last (dominant) write site. The analyzer is a
//! state machine over routine events: a routine is entered, its compound
//! scopes and assignments are recorded in program order, and the routine is
//! resolved when the next one begins.

use crate::hierarchy::{Hierarchy, SourceLoc, SourcePoint, SourceRange};
use crate::observe::{AssignLhs, RoutineEvent};
use crate::select::Selection;
use crate::{DefektError, Result};
use rustc_hash::FxHashMap;

/// The resolved writes of one clocked evaluation routine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineWrites {
    pub module: String,
    pub routine: String,
    pub file: String,
    pub signals: Vec<SignalWrites>,
}

/// All writes to one signal (by base name) within a routine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalWrites {
    pub signal: String,
    /// One site per distinct left-hand text, carrying its dominant write.
    pub sites: Vec<WriteSite>,
    pub total_writes: usize,
    /// Set when any subscript of any write is not an integer literal: the
    /// concrete element cannot be determined statically, so injection must
    /// be applied at every write occurrence instead of a single site.
    pub always_apply: bool,
}

/// The dominant write to one left-hand text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSite {
    pub lhs: String,
    pub range: SourceRange,
    /// Number of writes to this left-hand text in the routine. Writes
    /// beyond the dominant one are candidates for injection at routine
    /// exit.
    pub writes: usize,
}

struct RecordedAssign {
    lhs: AssignLhs,
    text: String,
    range: SourceRange,
    /// Start of the finest enclosing scope, resolved at record time.
    scope_start: SourcePoint,
}

struct RoutineState {
    module: String,
    routine: String,
    file: String,
    /// All compound scopes of the routine; index 0 is the routine body.
    scopes: Vec<SourceRange>,
    assigns: Vec<RecordedAssign>,
}

#[derive(Default)]
pub struct DominanceAnalyzer {
    active: Option<RoutineState>,
}

impl DominanceAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enters a new routine, resolving and returning the previous one.
    pub fn begin_routine(
        &mut self,
        module: &str,
        routine: &str,
        file: &str,
        body: SourceRange,
    ) -> Option<RoutineWrites> {
        let previous = self.active.take().map(resolve);
        self.active = Some(RoutineState {
            module: module.to_string(),
            routine: routine.to_string(),
            file: file.to_string(),
            scopes: vec![body],
            assigns: Vec::default(),
        });
        previous
    }

    /// Pushes a compound scope of the active routine. A scope outside the
    /// routine body means the observation streams have desynchronized.
    pub fn enter_scope(&mut self, range: SourceRange) -> Result<()> {
        let Some(state) = self.active.as_mut() else {
            return Err(DefektError::NoActiveRoutine("{".to_string()));
        };
        if !state.scopes[0].contains(&range) {
            return Err(DefektError::ScopeDesync(
                "{".to_string(),
                format!("{}:{}", range.start.line, range.start.col),
                state.routine.clone(),
            ));
        }
        state.scopes.push(range);
        Ok(())
    }

    /// Records an assignment, attaching it to the finest enclosing scope.
    /// An assignment outside every scope of the active routine is fatal.
    pub fn record_assignment(&mut self, lhs: AssignLhs, range: SourceRange) -> Result<()> {
        let Some(state) = self.active.as_mut() else {
            return Err(DefektError::NoActiveRoutine(lhs.text()));
        };
        // events arrive in program order, so every scope containing this
        // assignment has already been pushed; the latest-starting one is
        // the finest
        let scope_start = state
            .scopes
            .iter()
            .filter(|s| s.contains(&range))
            .map(|s| s.start)
            .max();
        let Some(scope_start) = scope_start else {
            return Err(DefektError::ScopeDesync(
                lhs.text(),
                format!("{}:{}", range.start.line, range.start.col),
                state.routine.clone(),
            ));
        };
        let text = lhs.text();
        state.assigns.push(RecordedAssign {
            lhs,
            text,
            range,
            scope_start,
        });
        Ok(())
    }

    /// Resolves the active routine without entering a new one.
    pub fn finish_routine(&mut self) -> Option<RoutineWrites> {
        self.active.take().map(resolve)
    }

    /// Consumes one routine event.
    pub fn apply(&mut self, event: RoutineEvent) -> Result<Option<RoutineWrites>> {
        match event {
            RoutineEvent::Begin {
                module,
                routine,
                file,
                body,
            } => Ok(self.begin_routine(&module, &routine, &file, body)),
            RoutineEvent::Scope { range } => {
                self.enter_scope(range)?;
                Ok(None)
            }
            RoutineEvent::Assign { lhs, range } => {
                self.record_assignment(lhs, range)?;
                Ok(None)
            }
        }
    }

    /// Consumes a whole event stream and returns all resolved routines.
    pub fn consume(
        &mut self,
        stream: impl IntoIterator<Item = RoutineEvent>,
    ) -> Result<Vec<RoutineWrites>> {
        let mut out = Vec::new();
        for event in stream {
            if let Some(resolved) = self.apply(event)? {
                out.push(resolved);
            }
        }
        out.extend(self.finish_routine());
        Ok(out)
    }
}

struct WriteSlot {
    text: String,
    dominant: usize,
    dominant_scope: SourcePoint,
    writes: usize,
    dynamic: bool,
}

/// Resolves the dominant write per left-hand text: iterating assignments in
/// program order, a new assignment replaces the recorded dominant one iff
/// the recorded one's scope begins before the new one's.
fn resolve(state: RoutineState) -> RoutineWrites {
    let mut slots: Vec<WriteSlot> = Vec::new();
    let mut slot_index: FxHashMap<String, usize> = FxHashMap::default();
    for (index, assign) in state.assigns.iter().enumerate() {
        match slot_index.get(&assign.text).copied() {
            None => {
                slot_index.insert(assign.text.clone(), slots.len());
                slots.push(WriteSlot {
                    text: assign.text.clone(),
                    dominant: index,
                    dominant_scope: assign.scope_start,
                    writes: 1,
                    dynamic: !assign.lhs.all_literal(),
                });
            }
            Some(slot) => {
                let slot = &mut slots[slot];
                slot.writes += 1;
                if slot.dominant_scope < assign.scope_start {
                    slot.dominant = index;
                    slot.dominant_scope = assign.scope_start;
                }
            }
        }
    }

    let mut signals: Vec<SignalWrites> = Vec::new();
    let mut signal_index: FxHashMap<String, usize> = FxHashMap::default();
    for slot in slots {
        let assign = &state.assigns[slot.dominant];
        let base = assign.lhs.base.clone();
        let entry = match signal_index.get(&base).copied() {
            Some(i) => &mut signals[i],
            None => {
                signal_index.insert(base.clone(), signals.len());
                signals.push(SignalWrites {
                    signal: base,
                    sites: Vec::default(),
                    total_writes: 0,
                    always_apply: false,
                });
                signals.last_mut().unwrap()
            }
        };
        entry.sites.push(WriteSite {
            lhs: slot.text,
            range: assign.range,
            writes: slot.writes,
        });
        entry.total_writes += slot.writes;
        entry.always_apply |= slot.dynamic;
    }

    log::debug!(
        "routine `{}::{}` resolved: {} signal(s) written",
        state.module,
        state.routine,
        signals.len()
    );
    RoutineWrites {
        module: state.module,
        routine: state.routine,
        file: state.file,
        signals,
    }
}

/// Records the resolved dominant sites onto the hierarchy (as injection
/// locations of the written variables) and flags the matching to-inject
/// targets as assigned.
pub fn apply_writes(
    writes: &RoutineWrites,
    hierarchy: &mut Hierarchy,
    selection: &mut Selection,
) {
    let Some(module) = hierarchy.lookup_module(&writes.module) else {
        log::warn!("routine `{}` in unknown module `{}`", writes.routine, writes.module);
        return;
    };
    for signal in &writes.signals {
        let Some(target) = selection.find_to_inject(hierarchy, module, &signal.signal) else {
            continue;
        };
        let var = selection.target(target).var;
        let file = hierarchy.intern_file(&writes.file);
        for site in &signal.sites {
            let loc = SourceLoc {
                file,
                line: site.range.start.line,
                col: site.range.start.col,
            };
            hierarchy.add_injection_loc(var, loc);
        }
        selection.target_mut(target).found_assign = true;
    }
}

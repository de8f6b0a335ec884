// Copyright 2024-2025 The defekt developers
// released under BSD 3-Clause License
//! # Injection target selector
//! Derives the working target set from the elaborated hierarchy: every
//! non-string signal is injectable; the to-inject subset is chosen either
//! by the default filter or by a whitelist document. The selector never
//! mutates the injectable set and is pure with respect to its inputs.

use crate::document::Document;
use crate::hierarchy::{Hierarchy, ModuleRef, Target, VarKind};
use rustc_hash::FxHashMap;
use std::num::NonZeroU32;

/// Uniquely identifies a target within a [`Selection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetRef(NonZeroU32);

impl TargetRef {
    #[inline]
    pub fn from_index(index: usize) -> Option<Self> {
        NonZeroU32::new(index as u32 + 1).map(Self)
    }

    #[inline]
    pub fn index(&self) -> usize {
        (self.0.get() - 1) as usize
    }
}

#[derive(Debug, Copy, Clone)]
pub struct SelectOptions {
    /// Excludes `out`/`inout` ports of the top-level module from the
    /// to-inject set. Set for simulation flavors whose top-level outputs
    /// cannot be safely instrumented.
    pub lock_top_ports: bool,
}

impl Default for SelectOptions {
    fn default() -> Self {
        Self {
            lock_top_ports: false,
        }
    }
}

/// The injectable targets of a run and the to-inject subset among them.
pub struct Selection {
    targets: Vec<Target>,
    to_inject: Vec<TargetRef>,
}

impl Selection {
    /// Turns every injectable (non-string) signal into a [`Target`]. The
    /// to-inject subset starts out empty.
    pub fn collect_injectable(hierarchy: &Hierarchy) -> Self {
        let targets = hierarchy
            .iter_vars()
            .filter(|(_, v)| !matches!(v.kind(), VarKind::String))
            .map(|(var, v)| Target::new(var, v.module()))
            .collect();
        Selection {
            targets,
            to_inject: Vec::default(),
        }
    }

    /// Default filter: every injectable target is to-inject, except locked
    /// top-level output ports.
    pub fn select_all(&mut self, hierarchy: &Hierarchy, options: &SelectOptions) {
        let top = hierarchy.top_module();
        self.to_inject.clear();
        for (index, target) in self.targets.iter().enumerate() {
            if options.lock_top_ports
                && Some(target.module) == top
                && hierarchy[target.var].direction().is_output_port()
            {
                continue;
            }
            self.to_inject.push(TargetRef::from_index(index).unwrap());
        }
    }

    /// Whitelist filter: a target becomes to-inject iff a `var`/`out`/
    /// `inout` node of the whitelist structurally equals it (declaration
    /// location, id, class, bit width, base types, dimensions). Returns the
    /// full names of the injectable targets that were dropped.
    ///
    /// When a whitelist node matches more than one target, the first match
    /// in declaration order consumes it.
    pub fn select_whitelist(&mut self, hierarchy: &Hierarchy, whitelist: &Document) -> Vec<String> {
        let mut nodes: FxHashMap<SignalIdentity, u32> = FxHashMap::default();
        for module in &whitelist.modules {
            for signal in &module.signals {
                if signal.class == "in" {
                    continue;
                }
                let Some((path, line, col)) = whitelist.resolve_loc(&signal.decl_loc) else {
                    log::warn!(
                        "whitelist entry `{}` has an unresolvable location `{}`, ignored",
                        signal.id,
                        signal.decl_loc
                    );
                    continue;
                };
                let identity = SignalIdentity {
                    path: path.to_string(),
                    line,
                    col,
                    id: signal.id.clone(),
                    class: signal.class.clone(),
                    bits: signal.bits,
                    bases: signal.bases.clone(),
                    dims: signal.dim.clone(),
                };
                *nodes.entry(identity).or_insert(0) += 1;
            }
        }

        self.to_inject.clear();
        let mut removed = Vec::new();
        for (index, target) in self.targets.iter().enumerate() {
            let var = &hierarchy[target.var];
            let shape = var.shape().expect("injectable targets are bit vectors");
            let decl = var.decl_loc(hierarchy);
            let identity = SignalIdentity {
                path: hierarchy.file_path(decl.file).to_string(),
                line: decl.line,
                col: decl.col,
                id: var.name(hierarchy).to_string(),
                class: var.direction().class().to_string(),
                bits: shape.bits(),
                bases: shape
                    .dims()
                    .iter()
                    .map(|d| hierarchy[d.base].to_string())
                    .collect(),
                dims: shape.dims().iter().map(|d| d.len).collect(),
            };
            match nodes.get_mut(&identity) {
                Some(count) if *count > 0 => {
                    *count -= 1;
                    self.to_inject.push(TargetRef::from_index(index).unwrap());
                }
                _ => removed.push(var.full_name(hierarchy)),
            }
        }
        if !removed.is_empty() {
            log::warn!(
                "{} injectable target(s) not present in the whitelist: {}",
                removed.len(),
                removed.join(", ")
            );
        }
        removed
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn target(&self, target: TargetRef) -> &Target {
        &self.targets[target.index()]
    }

    pub fn target_mut(&mut self, target: TargetRef) -> &mut Target {
        &mut self.targets[target.index()]
    }

    /// The to-inject subset, in declaration order.
    pub fn to_inject(&self) -> impl Iterator<Item = TargetRef> + '_ {
        self.to_inject.iter().copied()
    }

    pub fn num_to_inject(&self) -> usize {
        self.to_inject.len()
    }

    /// Finds the to-inject target for a signal written inside a module.
    pub fn find_to_inject(
        &self,
        hierarchy: &Hierarchy,
        module: ModuleRef,
        var_name: &str,
    ) -> Option<TargetRef> {
        self.to_inject.iter().copied().find(|t| {
            let target = &self.targets[t.index()];
            target.module == module && hierarchy[target.var].name(hierarchy) == var_name
        })
    }
}

/// The structural identity used by whitelist matching. Locations are
/// compared by resolved path, not by file id, since the two documents may
/// number their files differently.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SignalIdentity {
    path: String,
    line: u32,
    col: u32,
    id: String,
    class: String,
    bits: u32,
    bases: Vec<String>,
    dims: Vec<u32>,
}

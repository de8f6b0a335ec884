// Copyright 2024-2025 The defekt developers
// released under BSD 3-Clause License
//! # Elaboration engine
//! Consumes declaration observations and builds the deduplicated design
//! hierarchy. One elaborator is constructed per run and mutated in place;
//! several observation streams can be consumed sequentially, each one
//! observing and extending the state left by the previous stream.

use crate::hierarchy::*;
use crate::observe::{Locator, Observation};
use crate::{DefektError, Result};
use rustc_hash::FxHashMap;

pub struct Elaborator {
    modules: Vec<Module>,
    cells: Vec<Cell>,
    vars: Vec<Variable>,
    strings: Vec<String>,
    string_index: FxHashMap<String, StringId>,
    files: Vec<String>,
    file_index: FxHashMap<String, FileId>,
    source_locs: Vec<SourceLoc>,
    module_index: FxHashMap<String, ModuleRef>,
    top: Option<CellRef>,
}

impl Default for Elaborator {
    fn default() -> Self {
        Self::new()
    }
}

impl Elaborator {
    pub fn new() -> Self {
        Elaborator {
            modules: Vec::default(),
            cells: Vec::default(),
            vars: Vec::default(),
            strings: Vec::default(),
            string_index: FxHashMap::default(),
            files: Vec::default(),
            file_index: FxHashMap::default(),
            source_locs: Vec::default(),
            module_index: FxHashMap::default(),
            top: None,
        }
    }

    /// Consumes one observation. Fatal conditions abort the run; everything
    /// else is logged and dropped.
    pub fn apply(&mut self, obs: Observation) -> Result<()> {
        match obs {
            Observation::ModuleDecl { module, loc } => {
                self.add_module(&module, &loc);
                Ok(())
            }
            Observation::CellDecl {
                owner,
                cell,
                cell_type,
                loc,
            } => {
                self.add_cell(&owner, &cell, &cell_type, &loc);
                Ok(())
            }
            Observation::TopCell {
                cell,
                cell_type,
                loc,
            } => self.set_top_cell(&cell, &cell_type, &loc),
            Observation::VarDecl {
                owner,
                var,
                direction,
                shape,
                loc,
            } => self.add_variable(&owner, &var, direction, &shape, &loc),
            Observation::Instance {
                instance,
                module_type,
            } => {
                self.add_module_instance(&instance, &module_type);
                Ok(())
            }
        }
    }

    /// Consumes a whole observation stream, stopping at the first fatal
    /// error.
    pub fn consume(&mut self, stream: impl IntoIterator<Item = Observation>) -> Result<()> {
        for obs in stream {
            self.apply(obs)?;
        }
        Ok(())
    }

    /// Creates a module on first observation; repeated declarations of the
    /// same type are idempotent.
    pub fn add_module(&mut self, name: &str, loc: &Locator) {
        if self.module_index.contains_key(name) {
            log::debug!("duplicate module declaration `{name}` ignored");
            return;
        }
        let module_ref = ModuleRef::from_index(self.modules.len()).unwrap();
        let name_id = self.add_string(name);
        let decl = self.add_loc(loc);
        self.modules.push(Module {
            name: name_id,
            decl,
            vars: Vec::default(),
            cells: Vec::default(),
            instances: Vec::default(),
        });
        self.module_index.insert(name.to_string(), module_ref);
    }

    /// Adds a sub-instance to an existing module. Unknown owners and
    /// duplicate cell ids drop the observation.
    pub fn add_cell(&mut self, owner: &str, cell: &str, cell_type: &str, loc: &Locator) {
        let Some(owner_ref) = self.module_index.get(owner).copied() else {
            log::warn!("cell `{cell}` declared in unknown module `{owner}`, dropped");
            return;
        };
        let duplicate = self.modules[owner_ref.index()]
            .cells
            .iter()
            .any(|c| self.strings[self.cells[c.index()].name.index()] == cell);
        if duplicate {
            log::warn!("duplicate cell `{cell}` in module `{owner}`, dropped");
            return;
        }
        let cell_ref = CellRef::from_index(self.cells.len()).unwrap();
        let name_id = self.add_string(cell);
        let tpe_id = self.add_string(cell_type);
        let decl = self.add_loc(loc);
        self.cells.push(Cell {
            name: name_id,
            tpe: tpe_id,
            decl,
            parent: Some(owner_ref),
        });
        self.modules[owner_ref.index()].cells.push(cell_ref);
    }

    /// Registers the unique root instance. The first registration wins;
    /// repeating it is a no-op, a conflicting one is fatal.
    pub fn set_top_cell(&mut self, cell: &str, cell_type: &str, loc: &Locator) -> Result<()> {
        if let Some(top) = self.top {
            let have = &self.cells[top.index()];
            let have_name = &self.strings[have.name.index()];
            let have_tpe = &self.strings[have.tpe.index()];
            if have_name.as_str() == cell && have_tpe.as_str() == cell_type {
                log::debug!("repeated top cell registration `{cell}` ignored");
                return Ok(());
            }
            return Err(DefektError::TopCellConflict(
                have_name.to_string(),
                cell.to_string(),
            ));
        }
        let cell_ref = CellRef::from_index(self.cells.len()).unwrap();
        let name_id = self.add_string(cell);
        let tpe_id = self.add_string(cell_type);
        let decl = self.add_loc(loc);
        self.cells.push(Cell {
            name: name_id,
            tpe: tpe_id,
            decl,
            parent: None,
        });
        self.top = Some(cell_ref);
        Ok(())
    }

    /// Adds a signal to an existing module. Unknown owners and duplicate
    /// ids drop the observation; an unparseable shape is fatal.
    pub fn add_variable(
        &mut self,
        owner: &str,
        var: &str,
        direction: Direction,
        shape: &str,
        loc: &Locator,
    ) -> Result<()> {
        let Some(owner_ref) = self.module_index.get(owner).copied() else {
            log::warn!("signal `{var}` declared in unknown module `{owner}`, dropped");
            return Ok(());
        };
        let duplicate = self.modules[owner_ref.index()]
            .vars
            .iter()
            .any(|v| self.strings[self.vars[v.index()].name.index()] == var);
        if duplicate {
            log::warn!("duplicate signal `{var}` in module `{owner}`, dropped");
            return Ok(());
        }
        let kind = self.parse_shape(var, shape)?;
        let var_ref = VarRef::from_index(self.vars.len()).unwrap();
        let name_id = self.add_string(var);
        let decl = self.add_loc(loc);
        self.vars.push(Variable {
            name: name_id,
            direction,
            kind,
            decl,
            inj_locs: Vec::default(),
            parent: owner_ref,
        });
        self.modules[owner_ref.index()].vars.push(var_ref);
        Ok(())
    }

    /// Records an instance name observed in the instance table under the
    /// matching module, so multiple instantiation can be enumerated later.
    pub fn add_module_instance(&mut self, instance: &str, module_type: &str) {
        let Some(module_ref) = self.module_index.get(module_type).copied() else {
            log::warn!("instance `{instance}` of unknown module `{module_type}`, dropped");
            return;
        };
        let known = self.modules[module_ref.index()]
            .instances
            .iter()
            .any(|i| self.strings[i.index()] == instance);
        if known {
            log::debug!("repeated instance registration `{instance}` ignored");
            return;
        }
        let name_id = self.add_string(instance);
        self.modules[module_ref.index()].instances.push(name_id);
    }

    /// Hands over the finished hierarchy.
    pub fn finish(mut self) -> Hierarchy {
        self.modules.shrink_to_fit();
        self.cells.shrink_to_fit();
        self.vars.shrink_to_fit();
        self.strings.shrink_to_fit();
        self.files.shrink_to_fit();
        self.source_locs.shrink_to_fit();
        Hierarchy {
            modules: self.modules,
            cells: self.cells,
            vars: self.vars,
            strings: self.strings,
            files: self.files,
            source_locs: self.source_locs,
            top: self.top,
            module_index: self.module_index,
        }
    }

    /// Parses a shape string into a [`VarKind`].
    ///
    /// The format is `<base>:<len>[,<base>:<len>]*@<bits>` with the packed
    /// element width as the innermost (last) dimension, e.g. `logic:8@8` or
    /// `logic:4,logic:32@128`. The special shape `string` marks a
    /// string-typed signal, which carries no bits. The declared bit width
    /// must equal the product of the dimension lengths.
    fn parse_shape(&mut self, var: &str, shape: &str) -> Result<VarKind> {
        if shape == "string" {
            return Ok(VarKind::String);
        }
        let bad = || DefektError::BadShape(var.to_string(), shape.to_string());
        let (dims_str, bits_str) = shape.split_once('@').ok_or_else(bad)?;
        let bits: u32 = bits_str.parse().map_err(|_| bad())?;
        if bits == 0 {
            return Err(bad());
        }
        let mut dims = Vec::new();
        for dim in dims_str.split(',') {
            let (base, len_str) = dim.split_once(':').ok_or_else(bad)?;
            let len: u32 = len_str.parse().map_err(|_| bad())?;
            if base.is_empty() || len == 0 {
                return Err(bad());
            }
            let base = self.add_string(base);
            dims.push(ShapeDim { base, len });
        }
        if dims.is_empty() || dims.len() > 4 {
            return Err(bad());
        }
        let product: u64 = dims.iter().map(|d| d.len as u64).product();
        if product != bits as u64 {
            return Err(DefektError::WidthMismatch(var.to_string(), bits, product));
        }
        Ok(VarKind::Bits(VarShape::new(dims)))
    }

    fn add_string(&mut self, value: &str) -> StringId {
        if let Some(id) = self.string_index.get(value) {
            return *id;
        }
        let id = StringId::from_index(self.strings.len());
        self.strings.push(value.to_string());
        self.string_index.insert(value.to_string(), id);
        id
    }

    fn add_loc(&mut self, loc: &Locator) -> SourceLocId {
        let file = if let Some(id) = self.file_index.get(&loc.file) {
            *id
        } else {
            let id = FileId::from_index(self.files.len());
            self.files.push(loc.file.clone());
            self.file_index.insert(loc.file.clone(), id);
            id
        };
        let id = SourceLocId::from_index(self.source_locs.len());
        self.source_locs.push(SourceLoc {
            file,
            line: loc.line,
            col: loc.col,
        });
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(line: u32) -> Locator {
        Locator::new("dut.sv", line, 1)
    }

    #[test]
    fn test_module_dedup() {
        let mut e = Elaborator::new();
        e.add_module("alu", &loc(1));
        e.add_module("alu", &loc(2));
        e.add_module("decoder", &loc(3));
        let h = e.finish();
        assert_eq!(h.num_modules(), 2);
        // the first declaration wins
        let alu = h.lookup_module("alu").unwrap();
        assert_eq!(h[alu].decl_loc(&h).line, 1);
    }

    #[test]
    fn test_missing_owner_is_dropped() {
        let mut e = Elaborator::new();
        e.add_cell("nope", "u0", "alu", &loc(1));
        e.add_variable("nope", "q", Direction::Var, "logic:1@1", &loc(2))
            .unwrap();
        let h = e.finish();
        assert_eq!(h.num_modules(), 0);
        assert_eq!(h.num_vars(), 0);
    }

    #[test]
    fn test_duplicate_var_is_dropped() {
        let mut e = Elaborator::new();
        e.add_module("alu", &loc(1));
        e.add_variable("alu", "q", Direction::Var, "logic:2@2", &loc(2))
            .unwrap();
        e.add_variable("alu", "q", Direction::Var, "logic:4@4", &loc(3))
            .unwrap();
        let h = e.finish();
        assert_eq!(h.num_vars(), 1);
        let alu = h.lookup_module("alu").unwrap();
        let q = h.lookup_var(alu, "q").unwrap();
        assert_eq!(h[q].bits(), Some(2));
    }

    #[test]
    fn test_top_cell_once() {
        let mut e = Elaborator::new();
        e.set_top_cell("dut", "soc", &loc(1)).unwrap();
        // repeating the same registration is a no-op
        e.set_top_cell("dut", "soc", &loc(2)).unwrap();
        // a conflicting one is fatal
        let err = e.set_top_cell("other", "soc", &loc(3)).unwrap_err();
        assert!(matches!(err, DefektError::TopCellConflict(_, _)));
        let h = e.finish();
        assert_eq!(h.top_cell().unwrap().name(&h), "dut");
        assert!(h.top_cell().unwrap().parent().is_none());
    }

    #[test]
    fn test_shape_parsing() {
        let mut e = Elaborator::new();
        e.add_module("m", &loc(1));
        e.add_variable("m", "a", Direction::Var, "logic:8@8", &loc(2))
            .unwrap();
        e.add_variable("m", "b", Direction::Var, "logic:4,logic:32@128", &loc(3))
            .unwrap();
        e.add_variable("m", "s", Direction::Var, "string", &loc(4))
            .unwrap();
        let h = e.finish();
        let m = h.lookup_module("m").unwrap();
        let b = &h[h.lookup_var(m, "b").unwrap()];
        let shape = b.shape().unwrap();
        assert_eq!(shape.bits(), 128);
        assert_eq!(shape.elem_bits(), 32);
        assert_eq!(shape.array_dims().collect::<Vec<_>>(), vec![4]);
        assert!(h[h.lookup_var(m, "s").unwrap()].is_string());
    }

    #[test]
    fn test_bad_shape_is_fatal() {
        let mut e = Elaborator::new();
        e.add_module("m", &loc(1));
        let err = e
            .add_variable("m", "a", Direction::Var, "logic:8", &loc(2))
            .unwrap_err();
        assert!(matches!(err, DefektError::BadShape(_, _)));
        let err = e
            .add_variable("m", "b", Direction::Var, "logic:0@0", &loc(3))
            .unwrap_err();
        assert!(matches!(err, DefektError::BadShape(_, _)));
    }

    #[test]
    fn test_width_product_mismatch_is_fatal() {
        let mut e = Elaborator::new();
        e.add_module("m", &loc(1));
        let err = e
            .add_variable("m", "a", Direction::Var, "logic:4,logic:8@16", &loc(2))
            .unwrap_err();
        match err {
            DefektError::WidthMismatch(var, bits, product) => {
                assert_eq!(var, "a");
                assert_eq!(bits, 16);
                assert_eq!(product, 32);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_instances() {
        let mut e = Elaborator::new();
        e.add_module("alu", &loc(1));
        e.add_module_instance("u_alu0", "alu");
        e.add_module_instance("u_alu1", "alu");
        e.add_module_instance("u_alu0", "alu");
        e.add_module_instance("u_x", "unknown");
        let h = e.finish();
        let alu = h.lookup_module("alu").unwrap();
        let names: Vec<_> = h[alu].instances(&h).collect();
        assert_eq!(names, vec!["u_alu0", "u_alu1"]);
    }

    #[test]
    fn test_full_name() {
        let mut e = Elaborator::new();
        e.add_module("alu", &loc(1));
        e.add_variable("alu", "q1", Direction::Var, "logic:2@2", &loc(2))
            .unwrap();
        let h = e.finish();
        let alu = h.lookup_module("alu").unwrap();
        let q1 = h.lookup_var(alu, "q1").unwrap();
        assert_eq!(h[q1].full_name(&h), "alu.q1");
    }
}

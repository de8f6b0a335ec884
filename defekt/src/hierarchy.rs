// Copyright 2024-2025 The defekt developers
// released under BSD 3-Clause License

use rustc_hash::FxHashMap;
use std::fmt::{Display, Formatter};
use std::num::NonZeroU32;
use std::ops::Index;

/// Uniquely identifies a design module in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleRef(NonZeroU32);

impl ModuleRef {
    #[inline]
    pub fn from_index(index: usize) -> Option<Self> {
        NonZeroU32::new(index as u32 + 1).map(Self)
    }

    #[inline]
    pub fn index(&self) -> usize {
        (self.0.get() - 1) as usize
    }
}

/// Uniquely identifies a cell (module instance) in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRef(NonZeroU32);

impl CellRef {
    #[inline]
    pub fn from_index(index: usize) -> Option<Self> {
        NonZeroU32::new(index as u32 + 1).map(Self)
    }

    #[inline]
    pub fn index(&self) -> usize {
        (self.0.get() - 1) as usize
    }
}

/// Uniquely identifies a signal variable in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarRef(NonZeroU32);

impl VarRef {
    #[inline]
    pub fn from_index(index: usize) -> Option<Self> {
        NonZeroU32::new(index as u32 + 1).map(Self)
    }

    #[inline]
    pub fn index(&self) -> usize {
        (self.0.get() - 1) as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringId(NonZeroU32);

impl StringId {
    #[inline]
    pub(crate) fn from_index(index: usize) -> Self {
        let value = (index + 1) as u32;
        StringId(NonZeroU32::new(value).unwrap())
    }

    #[inline]
    pub(crate) fn index(&self) -> usize {
        (self.0.get() - 1) as usize
    }
}

/// Small integer id of a source file, as used by the document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(NonZeroU32);

impl FileId {
    #[inline]
    pub fn from_index(index: usize) -> Self {
        let value = (index + 1) as u32;
        FileId(NonZeroU32::new(value).unwrap())
    }

    #[inline]
    pub fn index(&self) -> usize {
        (self.0.get() - 1) as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceLocId(NonZeroU32);

impl SourceLocId {
    #[inline]
    pub(crate) fn from_index(index: usize) -> Self {
        let value = (index + 1) as u32;
        SourceLocId(NonZeroU32::new(value).unwrap())
    }

    #[inline]
    pub(crate) fn index(&self) -> usize {
        (self.0.get() - 1) as usize
    }
}

/// A file/line/column locator. Encoded as `<file-id>:l<line>:c<col>` in the
/// document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLoc {
    pub file: FileId,
    pub line: u32,
    pub col: u32,
}

impl Display for SourceLoc {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:l{}:c{}", self.file.index(), self.line, self.col)
    }
}

/// A line/column position inside one translation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SourcePoint {
    pub line: u32,
    pub col: u32,
}

impl SourcePoint {
    pub fn new(line: u32, col: u32) -> Self {
        SourcePoint { line, col }
    }
}

/// The source extent of a compound scope or an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceRange {
    pub start: SourcePoint,
    pub end: SourcePoint,
}

impl SourceRange {
    pub fn new(start: SourcePoint, end: SourcePoint) -> Self {
        debug_assert!(start <= end);
        SourceRange { start, end }
    }

    /// True iff `other` lies entirely within this range.
    #[inline]
    pub fn contains(&self, other: &SourceRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Direction of a signal as declared in the source HDL.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Direction {
    In,
    Out,
    InOut,
    Var,
}

impl Direction {
    /// The node class used by the document format.
    pub fn class(&self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
            Direction::InOut => "inout",
            Direction::Var => "var",
        }
    }

    /// Ports that drive the outside world. These cannot be instrumented on
    /// the top-level module of some simulation flavors.
    pub fn is_output_port(&self) -> bool {
        matches!(self, Direction::Out | Direction::InOut)
    }
}

/// The storage word one element of a signal occupies in the compiled
/// simulation model. Elements wider than 64 bits are spread over an array
/// of 32-bit words ("word-extension" packing).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Storage {
    U8,
    U16,
    U32,
    U64,
    Wide,
}

impl Storage {
    /// Classifies an element width into its storage word.
    pub fn for_width(elem_bits: u32) -> Self {
        match elem_bits {
            0..=8 => Storage::U8,
            9..=16 => Storage::U16,
            17..=32 => Storage::U32,
            33..=64 => Storage::U64,
            _ => Storage::Wide,
        }
    }

    /// Width of one storage word in bits.
    #[inline]
    pub fn word_bits(&self) -> u32 {
        match self {
            Storage::U8 => 8,
            Storage::U16 => 16,
            Storage::U32 => 32,
            Storage::U64 => 64,
            Storage::Wide => 32,
        }
    }

    /// The `cxx_type` attribute value in the document format.
    pub fn cxx_type(&self) -> &'static str {
        match self {
            Storage::U8 => "uint8_t",
            Storage::U16 => "uint16_t",
            Storage::U32 => "uint32_t",
            Storage::U64 => "uint64_t",
            Storage::Wide => "uint32_t[]",
        }
    }
}

/// One dimension of a signal shape: the declared base type and its length.
/// The innermost dimension is the packed element width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeDim {
    pub base: StringId,
    pub len: u32,
}

/// The shape of a bit-vector signal: one to four dimensions, innermost last.
/// The total bit width always equals the product of the dimension lengths;
/// the elaborator rejects declarations where it does not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarShape {
    dims: Vec<ShapeDim>,
}

impl VarShape {
    pub(crate) fn new(dims: Vec<ShapeDim>) -> Self {
        debug_assert!(!dims.is_empty() && dims.len() <= 4);
        VarShape { dims }
    }

    pub fn dims(&self) -> &[ShapeDim] {
        &self.dims
    }

    /// Total bit width, the product of all dimension lengths.
    pub fn bits(&self) -> u32 {
        self.dims.iter().map(|d| d.len).product()
    }

    /// Bits per innermost addressable element.
    pub fn elem_bits(&self) -> u32 {
        self.dims.last().unwrap().len
    }

    /// Lengths of the array dimensions above the packed element, outermost
    /// first. Empty for a scalar signal.
    pub fn array_dims(&self) -> impl Iterator<Item = u32> + '_ {
        self.dims[..self.dims.len() - 1].iter().map(|d| d.len)
    }

    pub fn storage(&self) -> Storage {
        Storage::for_width(self.elem_bits())
    }
}

/// How the signal's value is represented. String signals carry no bits and
/// are never injectable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarKind {
    String,
    Bits(VarShape),
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub(crate) name: StringId,
    pub(crate) direction: Direction,
    pub(crate) kind: VarKind,
    pub(crate) decl: SourceLocId,
    pub(crate) inj_locs: Vec<SourceLocId>,
    pub(crate) parent: ModuleRef,
}

impl Variable {
    /// Local name of the variable.
    #[inline]
    pub fn name<'a>(&self, hierarchy: &'a Hierarchy) -> &'a str {
        &hierarchy[self.name]
    }

    /// `<module>.<variable>` name used to key dictionary entries.
    pub fn full_name(&self, hierarchy: &Hierarchy) -> String {
        let mut out = hierarchy[self.parent].name(hierarchy).to_string();
        out.push('.');
        out.push_str(self.name(hierarchy));
        out
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn kind(&self) -> &VarKind {
        &self.kind
    }

    pub fn shape(&self) -> Option<&VarShape> {
        match &self.kind {
            VarKind::String => None,
            VarKind::Bits(shape) => Some(shape),
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(self.kind, VarKind::String)
    }

    pub fn bits(&self) -> Option<u32> {
        self.shape().map(|s| s.bits())
    }

    pub fn decl_loc(&self, hierarchy: &Hierarchy) -> SourceLoc {
        hierarchy.source_locs[self.decl.index()]
    }

    /// Injection (assignment) sites recorded by the dominance analysis.
    pub fn injection_locs<'a>(
        &'a self,
        hierarchy: &'a Hierarchy,
    ) -> impl Iterator<Item = SourceLoc> + 'a {
        self.inj_locs
            .iter()
            .map(|id| hierarchy.source_locs[id.index()])
    }

    pub fn module(&self) -> ModuleRef {
        self.parent
    }
}

#[derive(Debug, Clone)]
pub struct Cell {
    pub(crate) name: StringId,
    pub(crate) tpe: StringId,
    pub(crate) decl: SourceLocId,
    pub(crate) parent: Option<ModuleRef>,
}

impl Cell {
    #[inline]
    pub fn name<'a>(&self, hierarchy: &'a Hierarchy) -> &'a str {
        &hierarchy[self.name]
    }

    /// Name of the module type this cell instantiates.
    #[inline]
    pub fn module_type<'a>(&self, hierarchy: &'a Hierarchy) -> &'a str {
        &hierarchy[self.tpe]
    }

    pub fn decl_loc(&self, hierarchy: &Hierarchy) -> SourceLoc {
        hierarchy.source_locs[self.decl.index()]
    }

    /// `None` for the unique top cell.
    pub fn parent(&self) -> Option<ModuleRef> {
        self.parent
    }
}

#[derive(Debug, Clone)]
pub struct Module {
    pub(crate) name: StringId,
    pub(crate) decl: SourceLocId,
    pub(crate) vars: Vec<VarRef>,
    pub(crate) cells: Vec<CellRef>,
    pub(crate) instances: Vec<StringId>,
}

impl Module {
    #[inline]
    pub fn name<'a>(&self, hierarchy: &'a Hierarchy) -> &'a str {
        &hierarchy[self.name]
    }

    pub fn decl_loc(&self, hierarchy: &Hierarchy) -> SourceLoc {
        hierarchy.source_locs[self.decl.index()]
    }

    pub fn vars(&self) -> impl Iterator<Item = VarRef> + '_ {
        self.vars.iter().copied()
    }

    pub fn cells(&self) -> impl Iterator<Item = CellRef> + '_ {
        self.cells.iter().copied()
    }

    /// Instance names observed for this module in the instance table. More
    /// than one entry means the module is multiply instantiated.
    pub fn instances<'a>(
        &'a self,
        hierarchy: &'a Hierarchy,
    ) -> impl Iterator<Item = &'a str> + 'a {
        self.instances.iter().map(|id| &hierarchy[*id])
    }
}

/// The injection-capable refinement of a [`Variable`]. Carries the flags
/// used during the analysis/rewrite pass; the owning module is a
/// back-reference only.
#[derive(Debug, Clone)]
pub struct Target {
    pub var: VarRef,
    pub module: ModuleRef,
    pub found_decl: bool,
    pub found_assign: bool,
    pub decl_rewritten: bool,
}

impl Target {
    pub(crate) fn new(var: VarRef, module: ModuleRef) -> Self {
        Target {
            var,
            module,
            found_decl: false,
            found_assign: false,
            decl_rewritten: false,
        }
    }
}

/// The fully elaborated, deduplicated design hierarchy. Produced by the
/// [`crate::Elaborator`]; immutable apart from the injection locations that
/// the dominance analysis appends to variables.
pub struct Hierarchy {
    pub(crate) modules: Vec<Module>,
    pub(crate) cells: Vec<Cell>,
    pub(crate) vars: Vec<Variable>,
    pub(crate) strings: Vec<String>,
    pub(crate) files: Vec<String>,
    pub(crate) source_locs: Vec<SourceLoc>,
    pub(crate) top: Option<CellRef>,
    pub(crate) module_index: FxHashMap<String, ModuleRef>,
}

impl Hierarchy {
    /// Returns an iterator over all modules in declaration order.
    pub fn iter_modules(&self) -> impl Iterator<Item = (ModuleRef, &Module)> {
        self.modules
            .iter()
            .enumerate()
            .map(|(i, m)| (ModuleRef::from_index(i).unwrap(), m))
    }

    /// Returns an iterator over all variables (at all levels).
    pub fn iter_vars(&self) -> impl Iterator<Item = (VarRef, &Variable)> {
        self.vars
            .iter()
            .enumerate()
            .map(|(i, v)| (VarRef::from_index(i).unwrap(), v))
    }

    pub fn num_modules(&self) -> usize {
        self.modules.len()
    }

    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    /// The unique root instance of the design, if one was registered.
    pub fn top_cell(&self) -> Option<&Cell> {
        self.top.map(|c| &self.cells[c.index()])
    }

    /// The module type instantiated by the top cell.
    pub fn top_module(&self) -> Option<ModuleRef> {
        let top = self.top_cell()?;
        self.lookup_module(top.module_type(self))
    }

    pub fn lookup_module(&self, name: &str) -> Option<ModuleRef> {
        self.module_index.get(name).copied()
    }

    pub fn lookup_var(&self, module: ModuleRef, name: &str) -> Option<VarRef> {
        self[module]
            .vars()
            .find(|v| self[*v].name(self) == name)
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn file_path(&self, file: FileId) -> &str {
        &self.files[file.index()]
    }

    pub fn loc(&self, id: SourceLocId) -> SourceLoc {
        self.source_locs[id.index()]
    }

    /// Records an additional injection (assignment) site on a variable.
    /// Called by the dominance analysis when it resolves a write.
    pub(crate) fn add_injection_loc(&mut self, var: VarRef, loc: SourceLoc) {
        let id = SourceLocId::from_index(self.source_locs.len());
        self.source_locs.push(loc);
        self.vars[var.index()].inj_locs.push(id);
    }

    /// Interns a file path, returning the existing id if already known.
    pub(crate) fn intern_file(&mut self, path: &str) -> FileId {
        if let Some(idx) = self.files.iter().position(|f| f == path) {
            FileId::from_index(idx)
        } else {
            let id = FileId::from_index(self.files.len());
            self.files.push(path.to_string());
            id
        }
    }
}

impl Index<ModuleRef> for Hierarchy {
    type Output = Module;

    fn index(&self, index: ModuleRef) -> &Self::Output {
        &self.modules[index.index()]
    }
}

impl Index<CellRef> for Hierarchy {
    type Output = Cell;

    fn index(&self, index: CellRef) -> &Self::Output {
        &self.cells[index.index()]
    }
}

impl Index<VarRef> for Hierarchy {
    type Output = Variable;

    fn index(&self, index: VarRef) -> &Self::Output {
        &self.vars[index.index()]
    }
}

impl Index<StringId> for Hierarchy {
    type Output = str;

    fn index(&self, index: StringId) -> &Self::Output {
        &self.strings[index.index()]
    }
}

impl Index<FileId> for Hierarchy {
    type Output = str;

    fn index(&self, index: FileId) -> &Self::Output {
        &self.files[index.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes() {
        // the ref types must stay word sized, even inside an Option
        assert_eq!(std::mem::size_of::<VarRef>(), 4);
        assert_eq!(std::mem::size_of::<Option<VarRef>>(), 4);
        assert_eq!(std::mem::size_of::<Option<ModuleRef>>(), 4);
        assert_eq!(std::mem::size_of::<Option<CellRef>>(), 4);
        assert_eq!(std::mem::size_of::<SourceLoc>(), 12);
    }

    #[test]
    fn test_ref_round_trip() {
        for index in [0usize, 1, 17, 4096] {
            let r = VarRef::from_index(index).unwrap();
            assert_eq!(r.index(), index);
        }
    }

    #[test]
    fn test_storage_classification() {
        assert_eq!(Storage::for_width(1), Storage::U8);
        assert_eq!(Storage::for_width(8), Storage::U8);
        assert_eq!(Storage::for_width(9), Storage::U16);
        assert_eq!(Storage::for_width(32), Storage::U32);
        assert_eq!(Storage::for_width(33), Storage::U64);
        assert_eq!(Storage::for_width(64), Storage::U64);
        assert_eq!(Storage::for_width(65), Storage::Wide);
        assert_eq!(Storage::Wide.word_bits(), 32);
    }

    #[test]
    fn test_range_containment() {
        let outer = SourceRange::new(SourcePoint::new(2, 1), SourcePoint::new(10, 1));
        let inner = SourceRange::new(SourcePoint::new(5, 3), SourcePoint::new(7, 2));
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        assert!(outer.contains(&outer));

        // same line, column decides
        let a = SourceRange::new(SourcePoint::new(3, 1), SourcePoint::new(3, 40));
        let b = SourceRange::new(SourcePoint::new(3, 5), SourcePoint::new(3, 12));
        assert!(a.contains(&b));
        assert!(!b.contains(&a));
    }
}

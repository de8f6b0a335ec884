// Copyright 2024-2025 The defekt developers
// released under BSD 3-Clause License
//! # Bit-precise injection dictionary
//! The runtime table of per-signal injection state, executed inside the
//! host simulation's evaluation loop. One generic [`Entry`] covers all
//! dimensionalities (scalar up to three array dimensions) and both packing
//! regimes; the control API returns status codes and never unwinds across
//! the simulation boundary. Injection calls sit on the per-cycle hot path
//! and must not allocate.

use crate::hierarchy::{Hierarchy, Storage, Variable};
use crate::select::Selection;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use rustc_hash::FxHashMap;

/// The injection semantics applied when an armed entry fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum InjectionKind {
    /// XOR the mask into the data.
    BitFlip = 0,
    /// OR the mask into the data.
    BiasedSet = 1,
    /// AND the complemented mask into the data.
    BiasedReset = 2,
    /// Replace the masked bits with the prepared value.
    ForcedAssign = 3,
}

/// Status code returned by the control API. Errors are reported to the
/// calling test harness, never thrown across the simulation boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(i32)]
pub enum Status {
    Ok = 0,
    UnknownTarget = 1,
    BitOutOfRange = 2,
    UnsupportedKind = 3,
}

/// The physical position of one bit of an entry: per-dimension indices,
/// the flat element index, the storage word and the in-word offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitPos {
    pub index: [u32; 3],
    pub element: usize,
    pub word: usize,
    pub bit: u32,
}

/// Per-signal injection state: enable flag, kind selector, a mask and a
/// value-to-assign mirroring the storage shape, and one counter per
/// innermost addressable element.
///
/// Two packing regimes exist. When the element width fits the storage word
/// ("array of elements"), every element occupies one word. When it does
/// not ("word extension"), every element spans several 32-bit words.
pub struct Entry {
    name: String,
    storage: Storage,
    elem_bits: u32,
    /// Array dimension lengths, outermost first. Empty for a scalar.
    dims: Vec<u32>,
    words_per_elem: usize,
    elems: usize,
    enabled: bool,
    kind: InjectionKind,
    mask: Vec<u64>,
    value: Vec<u64>,
    counters: Vec<i32>,
    data: Vec<u64>,
}

impl Entry {
    pub fn new(name: impl Into<String>, elem_bits: u32, dims: Vec<u32>) -> Self {
        assert!(elem_bits > 0);
        assert!(dims.len() <= 3);
        assert!(dims.iter().all(|&d| d > 0));
        let storage = Storage::for_width(elem_bits);
        let word_bits = storage.word_bits();
        let words_per_elem = if elem_bits <= word_bits {
            1
        } else {
            elem_bits.div_ceil(word_bits) as usize
        };
        let elems = dims.iter().map(|&d| d as usize).product::<usize>();
        let words = elems * words_per_elem;
        Entry {
            name: name.into(),
            storage,
            elem_bits,
            dims,
            words_per_elem,
            elems,
            enabled: false,
            kind: InjectionKind::BitFlip,
            mask: vec![0; words],
            value: vec![0; words],
            counters: vec![0; elems],
            data: vec![0; words],
        }
    }

    /// Builds the entry for an injectable variable, keyed by its full name.
    pub fn from_var(hierarchy: &Hierarchy, var: &Variable) -> Option<Self> {
        let shape = var.shape()?;
        Some(Entry::new(
            var.full_name(hierarchy),
            shape.elem_bits(),
            shape.array_dims().collect(),
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn storage(&self) -> Storage {
        self.storage
    }

    pub fn elem_bits(&self) -> u32 {
        self.elem_bits
    }

    pub fn dims(&self) -> &[u32] {
        &self.dims
    }

    pub fn num_elems(&self) -> usize {
        self.elems
    }

    /// Total bit width of the entry.
    pub fn bits(&self) -> u32 {
        self.elem_bits * self.elems as u32
    }

    pub fn kind(&self) -> InjectionKind {
        self.kind
    }

    pub(crate) fn set_kind(&mut self, kind: InjectionKind) {
        self.kind = kind;
    }

    pub fn is_armed(&self) -> bool {
        self.enabled
    }

    pub fn arm(&mut self) {
        self.enabled = true;
    }

    pub fn disarm(&mut self) {
        self.enabled = false;
    }

    /// Maps a global bit index onto its physical storage position. The same
    /// division/modulo step nests once per dimension, outermost first; the
    /// remainder below the element is split by the storage word width under
    /// word-extension packing.
    pub fn map_bit(&self, b: u32) -> Option<BitPos> {
        if b >= self.bits() {
            return None;
        }
        let element = (b / self.elem_bits) as usize;
        let in_elem = b % self.elem_bits;
        let mut index = [0u32; 3];
        let mut rem = element;
        let mut stride = self.elems;
        for (i, &len) in self.dims.iter().enumerate() {
            stride /= len as usize;
            index[i] = (rem / stride) as u32;
            rem %= stride;
        }
        let word_bits = self.storage.word_bits();
        let (word_in_elem, bit) = if self.elem_bits <= word_bits {
            (0, in_elem)
        } else {
            ((in_elem / word_bits) as usize, in_elem % word_bits)
        };
        Some(BitPos {
            index,
            element,
            word: element * self.words_per_elem + word_in_elem,
            bit,
        })
    }

    /// Flat element index for a per-dimension index list.
    pub fn elem_index(&self, indices: &[u32]) -> Option<usize> {
        if indices.len() != self.dims.len() {
            return None;
        }
        let mut flat = 0usize;
        for (&index, &len) in indices.iter().zip(self.dims.iter()) {
            if index >= len {
                return None;
            }
            flat = flat * len as usize + index as usize;
        }
        Some(flat)
    }

    pub fn set_mask_bit(&mut self, b: u32) -> Status {
        match self.map_bit(b) {
            None => Status::BitOutOfRange,
            Some(pos) => {
                self.mask[pos.word] |= 1u64 << pos.bit;
                Status::Ok
            }
        }
    }

    pub fn set_value_bit(&mut self, b: u32) -> Status {
        match self.map_bit(b) {
            None => Status::BitOutOfRange,
            Some(pos) => {
                self.value[pos.word] |= 1u64 << pos.bit;
                Status::Ok
            }
        }
    }

    pub fn reset_value_bit(&mut self, b: u32) -> Status {
        match self.map_bit(b) {
            None => Status::BitOutOfRange,
            Some(pos) => {
                self.value[pos.word] &= !(1u64 << pos.bit);
                Status::Ok
            }
        }
    }

    pub fn reset_mask(&mut self) {
        self.mask.fill(0);
    }

    pub fn reset_assign_value(&mut self) {
        self.value.fill(0);
    }

    /// Per-element injection counter. A non-zero counter suppresses further
    /// injection at that element until reset.
    pub fn get_cntr(&self, elem: usize) -> Option<i32> {
        self.counters.get(elem).copied()
    }

    pub fn reset_cntr(&mut self, elem: usize) {
        if let Some(counter) = self.counters.get_mut(elem) {
            *counter = 0;
        }
    }

    pub fn reset_all_cntrs(&mut self) {
        self.counters.fill(0);
    }

    /// The signal storage words, updated by the instrumented model.
    pub fn data(&self) -> &[u64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u64] {
        &mut self.data
    }

    /// Injection at a known write site: exactly one addressed element.
    #[inline]
    pub fn inject_on_update(&mut self, indices: &[u32]) {
        if !self.enabled {
            return;
        }
        if let Some(elem) = self.elem_index(indices) {
            self.inject_elem(elem);
        }
    }

    /// Fallback injection over every element, used for non-literal
    /// subscripts and non-dominant write sites at routine exit.
    #[inline]
    pub fn inject_synchronous(&mut self) {
        if !self.enabled {
            return;
        }
        for elem in 0..self.elems {
            self.inject_elem(elem);
        }
    }

    #[inline]
    fn inject_elem(&mut self, elem: usize) {
        if self.counters[elem] > 0 {
            return;
        }
        let lo = elem * self.words_per_elem;
        let hi = lo + self.words_per_elem;
        if self.mask[lo..hi].iter().all(|&m| m == 0) {
            return;
        }
        self.apply_injection(elem, lo, hi);
    }

    #[cold]
    fn apply_injection(&mut self, elem: usize, lo: usize, hi: usize) {
        for w in lo..hi {
            let mask = self.mask[w];
            match self.kind {
                InjectionKind::BitFlip => self.data[w] ^= mask,
                InjectionKind::BiasedSet => self.data[w] |= mask,
                InjectionKind::BiasedReset => self.data[w] &= !mask,
                InjectionKind::ForcedAssign => {
                    self.data[w] = (self.data[w] & !mask) | (mask & self.value[w]);
                }
            }
        }
        self.counters[elem] += 1;
    }

    /// The flattened bit sequence of the whole entry, msb first,
    /// reconstructed per element under the entry's packing regime.
    pub fn read_data(&self) -> String {
        let bits = self.bits();
        let mut out = String::with_capacity(bits as usize);
        for b in (0..bits).rev() {
            let pos = self.map_bit(b).unwrap();
            let set = (self.data[pos.word] >> pos.bit) & 1 == 1;
            out.push(if set { '1' } else { '0' });
        }
        out
    }

    /// True iff the two entries describe the same signal shape.
    pub(crate) fn same_shape(&self, other: &Entry) -> bool {
        self.name == other.name
            && self.storage == other.storage
            && self.elem_bits == other.elem_bits
            && self.dims == other.dims
    }
}

/// Identifies a dictionary entry either by target name or by index.
#[derive(Debug, Clone, Copy)]
pub enum TargetId<'a> {
    Name(&'a str),
    Index(usize),
}

impl<'a> From<&'a str> for TargetId<'a> {
    fn from(name: &'a str) -> Self {
        TargetId::Name(name)
    }
}

impl From<usize> for TargetId<'_> {
    fn from(index: usize) -> Self {
        TargetId::Index(index)
    }
}

/// The per-target injection dictionary of one simulation instance.
#[derive(Default)]
pub struct Dictionary {
    entries: Vec<Entry>,
    index: FxHashMap<String, usize>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// One entry per to-inject target, keyed by full hierarchical name.
    pub fn for_selection(hierarchy: &Hierarchy, selection: &Selection) -> Self {
        let mut dict = Dictionary::new();
        for target in selection.to_inject() {
            let var = &hierarchy[selection.target(target).var];
            if let Some(entry) = Entry::from_var(hierarchy, var) {
                dict.push(entry);
            }
        }
        dict
    }

    pub fn push(&mut self, entry: Entry) {
        self.index.insert(entry.name.clone(), self.entries.len());
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    fn resolve(&self, target: TargetId) -> Option<usize> {
        match target {
            TargetId::Name(name) => self.index.get(name).copied(),
            TargetId::Index(index) if index < self.entries.len() => Some(index),
            TargetId::Index(_) => None,
        }
    }

    pub fn get<'a>(&self, target: impl Into<TargetId<'a>>) -> Option<&Entry> {
        self.resolve(target.into()).map(|i| &self.entries[i])
    }

    pub fn get_mut<'a>(&mut self, target: impl Into<TargetId<'a>>) -> Option<&mut Entry> {
        self.resolve(target.into()).map(|i| &mut self.entries[i])
    }

    /// Arms a bit-flip, biased-set or biased-reset injection of one bit.
    /// Forced-assign goes through [`Dictionary::prep_value_inject`].
    pub fn prep_inject<'a>(
        &mut self,
        target: impl Into<TargetId<'a>>,
        bit: u32,
        kind: InjectionKind,
    ) -> Status {
        let Some(index) = self.resolve(target.into()) else {
            return Status::UnknownTarget;
        };
        if kind == InjectionKind::ForcedAssign {
            return Status::UnsupportedKind;
        }
        let entry = &mut self.entries[index];
        let status = entry.set_mask_bit(bit);
        if status != Status::Ok {
            return status;
        }
        entry.set_kind(kind);
        entry.arm();
        Status::Ok
    }

    /// Arms a forced-assign injection: every `(bit, value)` pair is added
    /// to the mask and the value-to-assign.
    pub fn prep_value_inject<'a>(
        &mut self,
        target: impl Into<TargetId<'a>>,
        bits: &[(u32, bool)],
    ) -> Status {
        let Some(index) = self.resolve(target.into()) else {
            return Status::UnknownTarget;
        };
        let entry = &mut self.entries[index];
        if bits.iter().any(|(b, _)| *b >= entry.bits()) {
            return Status::BitOutOfRange;
        }
        for (b, value) in bits {
            entry.set_mask_bit(*b);
            if *value {
                entry.set_value_bit(*b);
            } else {
                entry.reset_value_bit(*b);
            }
        }
        entry.set_kind(InjectionKind::ForcedAssign);
        entry.arm();
        Status::Ok
    }

    /// Disarms an entry and clears its mask, value and counters.
    pub fn reset_inject<'a>(&mut self, target: impl Into<TargetId<'a>>) -> Status {
        let Some(index) = self.resolve(target.into()) else {
            return Status::UnknownTarget;
        };
        let entry = &mut self.entries[index];
        entry.disarm();
        entry.reset_mask();
        entry.reset_assign_value();
        entry.reset_all_cntrs();
        Status::Ok
    }
}

// Copyright 2024-2025 The defekt developers
// released under BSD 3-Clause License
//! # Document format
//! Plain records describing the elaborated model: a `top` node, one node
//! per module with its signal and cell children, and a `files` table
//! mapping small integer ids to source paths. The same shape serves as the
//! whitelist-filter input. Entities are kept separate from these records;
//! serialization happens only here, at the I/O boundary.

use crate::hierarchy::{FileId, Hierarchy, SourceLoc, VarKind, Variable};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top: Option<TopNode>,
    pub modules: Vec<ModuleNode>,
    pub files: Vec<FileEntry>,
}

/// The unique root instance of the design.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopNode {
    pub id: String,
    pub module: String,
    pub decl_loc: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleNode {
    pub id: String,
    pub decl_loc: String,
    pub signals: Vec<SignalNode>,
    pub cells: Vec<CellNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instances: Vec<String>,
}

/// A `var`/`in`/`out`/`inout` child of a module node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalNode {
    /// `var`, `in`, `out` or `inout`.
    pub class: String,
    pub id: String,
    pub bits: u32,
    pub bases: Vec<String>,
    pub dim: Vec<u32>,
    pub cxx_type: String,
    pub decl_loc: String,
    /// A single location, or a bracketed comma-separated list when the
    /// signal is written at more than one site.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inj_loc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellNode {
    pub id: String,
    pub module: String,
    pub decl_loc: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub id: u32,
    pub path: String,
}

/// Renders a location as `<file-id>:l<line>:c<col>`.
pub fn encode_loc(loc: SourceLoc) -> String {
    loc.to_string()
}

/// Parses a `<file-id>:l<line>:c<col>` location string.
pub fn parse_loc(s: &str) -> Option<SourceLoc> {
    let mut parts = s.split(':');
    let file: usize = parts.next()?.parse().ok()?;
    let line: u32 = parts.next()?.strip_prefix('l')?.parse().ok()?;
    let col: u32 = parts.next()?.strip_prefix('c')?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(SourceLoc {
        file: FileId::from_index(file),
        line,
        col,
    })
}

/// Renders zero or more injection sites: `None` for an unwritten signal, a
/// plain location for a single site, a bracketed list for several.
pub fn encode_inj_locs(locs: &[SourceLoc]) -> Option<String> {
    match locs {
        [] => None,
        [single] => Some(single.to_string()),
        many => {
            let list = many
                .iter()
                .map(|l| l.to_string())
                .collect::<Vec<_>>()
                .join(",");
            Some(format!("[{list}]"))
        }
    }
}

/// Parses the `inj_loc` attribute back into individual locations.
pub fn parse_inj_locs(s: &str) -> Option<Vec<SourceLoc>> {
    let inner = match s.strip_prefix('[') {
        Some(rest) => rest.strip_suffix(']')?,
        None => return parse_loc(s).map(|l| vec![l]),
    };
    inner.split(',').map(parse_loc).collect()
}

impl SignalNode {
    pub(crate) fn from_var(hierarchy: &Hierarchy, var: &Variable) -> Self {
        let (bits, bases, dim, cxx_type) = match var.kind() {
            VarKind::String => (0, vec!["string".to_string()], vec![], "std::string".to_string()),
            VarKind::Bits(shape) => (
                shape.bits(),
                shape
                    .dims()
                    .iter()
                    .map(|d| hierarchy[d.base].to_string())
                    .collect(),
                shape.dims().iter().map(|d| d.len).collect(),
                shape.storage().cxx_type().to_string(),
            ),
        };
        let inj: Vec<SourceLoc> = var.injection_locs(hierarchy).collect();
        SignalNode {
            class: var.direction().class().to_string(),
            id: var.name(hierarchy).to_string(),
            bits,
            bases,
            dim,
            cxx_type,
            decl_loc: encode_loc(var.decl_loc(hierarchy)),
            inj_loc: encode_inj_locs(&inj),
        }
    }
}

impl Document {
    /// Renders the elaborated hierarchy into its document form.
    pub fn from_hierarchy(hierarchy: &Hierarchy) -> Self {
        let top = hierarchy.top_cell().map(|cell| TopNode {
            id: cell.name(hierarchy).to_string(),
            module: cell.module_type(hierarchy).to_string(),
            decl_loc: encode_loc(cell.decl_loc(hierarchy)),
        });
        let modules = hierarchy
            .iter_modules()
            .map(|(_, module)| ModuleNode {
                id: module.name(hierarchy).to_string(),
                decl_loc: encode_loc(module.decl_loc(hierarchy)),
                signals: module
                    .vars()
                    .map(|v| SignalNode::from_var(hierarchy, &hierarchy[v]))
                    .collect(),
                cells: module
                    .cells()
                    .map(|c| {
                        let cell = &hierarchy[c];
                        CellNode {
                            id: cell.name(hierarchy).to_string(),
                            module: cell.module_type(hierarchy).to_string(),
                            decl_loc: encode_loc(cell.decl_loc(hierarchy)),
                        }
                    })
                    .collect(),
                instances: module
                    .instances(hierarchy)
                    .map(|i| i.to_string())
                    .collect(),
            })
            .collect();
        let files = hierarchy
            .files()
            .iter()
            .enumerate()
            .map(|(i, path)| FileEntry {
                id: i as u32,
                path: path.clone(),
            })
            .collect();
        Document { top, modules, files }
    }

    /// Resolves a location string of this document to its file path plus
    /// line and column. Used for structural matching, where locations from
    /// two documents with different file tables must be compared.
    pub fn resolve_loc(&self, s: &str) -> Option<(&str, u32, u32)> {
        let loc = parse_loc(s)?;
        let path = self
            .files
            .iter()
            .find(|f| f.id as usize == loc.file.index())?;
        Some((&path.path, loc.line, loc.col))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::FileId;

    fn loc(file: usize, line: u32, col: u32) -> SourceLoc {
        SourceLoc {
            file: FileId::from_index(file),
            line,
            col,
        }
    }

    #[test]
    fn test_loc_encoding() {
        assert_eq!(encode_loc(loc(0, 12, 4)), "0:l12:c4");
        assert_eq!(parse_loc("0:l12:c4"), Some(loc(0, 12, 4)));
        assert_eq!(parse_loc("3:l1:c1"), Some(loc(3, 1, 1)));
        assert_eq!(parse_loc("x:l1:c1"), None);
        assert_eq!(parse_loc("0:12:c4"), None);
        assert_eq!(parse_loc("0:l12:c4:junk"), None);
    }

    #[test]
    fn test_inj_loc_list() {
        assert_eq!(encode_inj_locs(&[]), None);
        assert_eq!(encode_inj_locs(&[loc(0, 5, 9)]), Some("0:l5:c9".to_string()));
        assert_eq!(
            encode_inj_locs(&[loc(0, 5, 9), loc(1, 7, 3)]),
            Some("[0:l5:c9,1:l7:c3]".to_string())
        );
        assert_eq!(
            parse_inj_locs("[0:l5:c9,1:l7:c3]"),
            Some(vec![loc(0, 5, 9), loc(1, 7, 3)])
        );
        assert_eq!(parse_inj_locs("0:l5:c9"), Some(vec![loc(0, 5, 9)]));
        assert_eq!(parse_inj_locs("[0:l5:c9"), None);
    }
}

// Copyright 2024-2025 The defekt developers
// released under BSD 3-Clause License
//! Whitelist filtering: the filter document has the same shape as the
//! elaborated model; targets absent from it are dropped and reported.

use defekt::*;

fn elaborate() -> Hierarchy {
    let mut e = Elaborator::new();
    let loc = |line| Locator::new("dut.sv", line, 1);
    e.add_module("soc", &loc(1));
    e.add_variable("soc", "led", Direction::Out, "logic:1@1", &loc(2))
        .unwrap();
    e.add_module("alu", &loc(10));
    e.add_variable("alu", "q1", Direction::Var, "logic:2@2", &loc(11))
        .unwrap();
    e.add_variable("alu", "q2", Direction::Var, "logic:2@2", &loc(12))
        .unwrap();
    e.set_top_cell("dut", "soc", &loc(1)).unwrap();
    e.finish()
}

#[test]
fn test_whitelist_removal_is_reported() {
    let h = elaborate();
    let mut whitelist = Document::from_hierarchy(&h);
    for module in &mut whitelist.modules {
        module.signals.retain(|s| s.id != "q2");
    }

    let mut sel = Selection::collect_injectable(&h);
    let removed = sel.select_whitelist(&h, &whitelist);
    assert_eq!(removed, vec!["alu.q2".to_string()]);

    let names: Vec<String> = sel
        .to_inject()
        .map(|t| h[sel.target(t).var].full_name(&h))
        .collect();
    assert_eq!(names, vec!["soc.led".to_string(), "alu.q1".to_string()]);

    // the runtime dictionary only knows the filtered targets
    let mut dict = Dictionary::for_selection(&h, &sel);
    assert!(dict.get("alu.q1").is_some());
    assert!(dict.get("alu.q2").is_none());
    assert_eq!(
        dict.prep_inject("alu.q2", 0, InjectionKind::BitFlip),
        Status::UnknownTarget
    );
}

#[test]
fn test_full_whitelist_keeps_everything() {
    let h = elaborate();
    let whitelist = Document::from_hierarchy(&h);
    let mut sel = Selection::collect_injectable(&h);
    let removed = sel.select_whitelist(&h, &whitelist);
    assert!(removed.is_empty());
    assert_eq!(sel.num_to_inject(), sel.targets().len());
}

#[test]
fn test_whitelist_with_foreign_file_table() {
    // the same design serialized by another run may number its files
    // differently; matching goes through resolved paths
    let h = elaborate();
    let mut whitelist = Document::from_hierarchy(&h);
    for file in &mut whitelist.files {
        file.id += 7;
    }
    for module in &mut whitelist.modules {
        let bump = |loc: &str| {
            let parsed = document::parse_loc(loc).unwrap();
            format!("{}:l{}:c{}", parsed.file.index() + 7, parsed.line, parsed.col)
        };
        module.decl_loc = bump(&module.decl_loc);
        for signal in &mut module.signals {
            signal.decl_loc = bump(&signal.decl_loc);
        }
    }

    let mut sel = Selection::collect_injectable(&h);
    let removed = sel.select_whitelist(&h, &whitelist);
    assert!(removed.is_empty());
}

#[test]
fn test_document_shape() {
    let h = elaborate();
    let doc = Document::from_hierarchy(&h);
    assert_eq!(doc.top.as_ref().unwrap().id, "dut");
    assert_eq!(doc.top.as_ref().unwrap().module, "soc");
    assert_eq!(doc.files.len(), 1);
    assert_eq!(doc.files[0].path, "dut.sv");

    let alu = doc.modules.iter().find(|m| m.id == "alu").unwrap();
    let q1 = alu.signals.iter().find(|s| s.id == "q1").unwrap();
    assert_eq!(q1.class, "var");
    assert_eq!(q1.bits, 2);
    assert_eq!(q1.dim, vec![2]);
    assert_eq!(q1.bases, vec!["logic".to_string()]);
    assert_eq!(q1.cxx_type, "uint8_t");
    assert_eq!(q1.decl_loc, "0:l11:c1");
    assert!(q1.inj_loc.is_none());
}

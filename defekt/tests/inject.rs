// Copyright 2024-2025 The defekt developers
// released under BSD 3-Clause License
//! End-to-end test: elaborate a small design from an observation stream,
//! resolve its write sites, build the runtime dictionary and check that an
//! armed bit-flip shows up in the data and in the differential compare.

use defekt::*;

fn loc(file: &str, line: u32) -> Locator {
    Locator::new(file, line, 1)
}

fn range(l0: u32, c0: u32, l1: u32, c1: u32) -> SourceRange {
    SourceRange::new(SourcePoint::new(l0, c0), SourcePoint::new(l1, c1))
}

fn observations() -> Vec<Observation> {
    vec![
        Observation::ModuleDecl {
            module: "alu".to_string(),
            loc: loc("alu.sv", 1),
        },
        Observation::VarDecl {
            owner: "alu".to_string(),
            var: "q1".to_string(),
            direction: Direction::Var,
            shape: "logic:2@2".to_string(),
            loc: loc("alu.sv", 2),
        },
        Observation::VarDecl {
            owner: "alu".to_string(),
            var: "q2".to_string(),
            direction: Direction::Var,
            shape: "logic:2@2".to_string(),
            loc: loc("alu.sv", 3),
        },
        Observation::VarDecl {
            owner: "alu".to_string(),
            var: "acc".to_string(),
            direction: Direction::Var,
            shape: "logic:4,logic:8@32".to_string(),
            loc: loc("alu.sv", 4),
        },
        Observation::ModuleDecl {
            module: "soc".to_string(),
            loc: loc("soc.sv", 1),
        },
        Observation::CellDecl {
            owner: "soc".to_string(),
            cell: "u_alu".to_string(),
            cell_type: "alu".to_string(),
            loc: loc("soc.sv", 5),
        },
        Observation::TopCell {
            cell: "dut".to_string(),
            cell_type: "soc".to_string(),
            loc: loc("soc.sv", 1),
        },
        Observation::Instance {
            instance: "u_alu".to_string(),
            module_type: "alu".to_string(),
        },
    ]
}

fn elaborate() -> (Hierarchy, Selection) {
    let mut elaborator = Elaborator::new();
    elaborator.consume(observations()).unwrap();
    let hierarchy = elaborator.finish();
    let mut selection = Selection::collect_injectable(&hierarchy);
    selection.select_all(&hierarchy, &SelectOptions::default());
    (hierarchy, selection)
}

#[test]
fn test_elaborated_hierarchy() {
    let (h, sel) = elaborate();
    assert_eq!(h.num_modules(), 2);
    assert_eq!(h.top_cell().unwrap().name(&h), "dut");
    assert_eq!(h.top_module(), h.lookup_module("soc"));
    // q1, q2 and acc are injectable and selected
    assert_eq!(sel.num_to_inject(), 3);
}

#[test]
fn test_end_to_end_bit_flip() {
    let (h, sel) = elaborate();
    let mut dict = Dictionary::for_selection(&h, &sel);
    assert_eq!(dict.len(), 3);

    // arm bit 1 of the 2-bit signal q1 for a bit flip
    assert_eq!(
        dict.prep_inject("alu.q1", 1, InjectionKind::BitFlip),
        Status::Ok
    );

    let before = dict.get("alu.q1").unwrap().read_data();
    assert_eq!(dict.get("alu.q1").unwrap().get_cntr(0), Some(0));

    // one simulated cycle: the instrumented model evaluates q1 and calls
    // the injection hook at its dominant write site
    dict.get_mut("alu.q1").unwrap().inject_on_update(&[]);

    let entry = dict.get("alu.q1").unwrap();
    let after = entry.read_data();
    let changed: Vec<usize> = itertools::zip_eq(before.chars(), after.chars())
        .enumerate()
        .filter(|(_, (a, b))| a != b)
        .map(|(i, _)| i)
        .collect();
    // msb-first strings of a 2-bit signal: index 0 is bit 1
    assert_eq!(changed, vec![0]);
    assert_eq!(entry.get_cntr(0), Some(1));

    // the next cycle holds the effect instead of flipping back
    dict.get_mut("alu.q1").unwrap().inject_on_update(&[]);
    assert_eq!(dict.get("alu.q1").unwrap().read_data(), after);
}

#[test]
fn test_dominant_site_recorded() {
    let (mut h, mut sel) = elaborate();

    let mut dom = DominanceAnalyzer::new();
    let events = vec![
        RoutineEvent::Begin {
            module: "alu".to_string(),
            routine: "eval_clk".to_string(),
            file: "alu.sv".to_string(),
            body: range(10, 1, 30, 1),
        },
        RoutineEvent::Scope {
            range: range(11, 1, 20, 1),
        },
        RoutineEvent::Scope {
            range: range(14, 1, 18, 1),
        },
        RoutineEvent::Assign {
            lhs: AssignLhs::new("q1"),
            range: range(12, 3, 12, 14),
        },
        RoutineEvent::Assign {
            lhs: AssignLhs::new("q1"),
            range: range(15, 3, 15, 14),
        },
    ];
    let routines = dom.consume(events).unwrap();
    assert_eq!(routines.len(), 1);
    for writes in &routines {
        apply_writes(writes, &mut h, &mut sel);
    }

    let alu = h.lookup_module("alu").unwrap();
    let target = sel.find_to_inject(&h, alu, "q1").unwrap();
    assert!(sel.target(target).found_assign);

    let q1 = h.lookup_var(alu, "q1").unwrap();
    let locs: Vec<SourceLoc> = h[q1].injection_locs(&h).collect();
    // only the dominant write (inside the nested scope) is recorded
    assert_eq!(locs.len(), 1);
    assert_eq!(locs[0].line, 15);

    // the document renders the site into the inj_loc attribute
    let doc = Document::from_hierarchy(&h);
    let node = doc
        .modules
        .iter()
        .find(|m| m.id == "alu")
        .unwrap()
        .signals
        .iter()
        .find(|s| s.id == "q1")
        .unwrap();
    let inj = node.inj_loc.as_ref().unwrap();
    let parsed = document::parse_inj_locs(inj).unwrap();
    assert_eq!(parsed.len(), 1);
    assert_eq!(parsed[0].line, 15);
}

#[test]
fn test_multiple_sites_render_as_list() {
    let (mut h, mut sel) = elaborate();

    let mut dom = DominanceAnalyzer::new();
    let events = vec![
        RoutineEvent::Begin {
            module: "alu".to_string(),
            routine: "eval_clk".to_string(),
            file: "alu.sv".to_string(),
            body: range(10, 1, 30, 1),
        },
        RoutineEvent::Assign {
            lhs: AssignLhs::subscripted("acc", vec![Subscript::Literal(0)]),
            range: range(12, 3, 12, 14),
        },
        RoutineEvent::Assign {
            lhs: AssignLhs::subscripted("acc", vec![Subscript::Literal(1)]),
            range: range(13, 3, 13, 14),
        },
    ];
    for writes in &dom.consume(events).unwrap() {
        apply_writes(writes, &mut h, &mut sel);
    }

    let doc = Document::from_hierarchy(&h);
    let node = doc
        .modules
        .iter()
        .find(|m| m.id == "alu")
        .unwrap()
        .signals
        .iter()
        .find(|s| s.id == "acc")
        .unwrap();
    let inj = node.inj_loc.as_ref().unwrap();
    assert!(inj.starts_with('[') && inj.ends_with(']'), "{inj}");
    assert_eq!(document::parse_inj_locs(inj).unwrap().len(), 2);
}

#[test]
fn test_differential_detection() {
    let (h, sel) = elaborate();
    let golden = Dictionary::for_selection(&h, &sel);
    let mut faulted = Dictionary::for_selection(&h, &sel);

    faulted.prep_inject("alu.q1", 1, InjectionKind::BitFlip);
    faulted.get_mut("alu.q1").unwrap().inject_on_update(&[]);

    let diff = DictDiff::new(&golden, &faulted).unwrap();
    let triplets = diff.compute_diff_vector();
    assert_eq!(triplets.len(), 1);
    assert_eq!(triplets[0].xor, 0b10);

    // the cursor walk finds the faulted entry from any starting point
    for cursor in 0..3 {
        assert_eq!(diff.compare_fast(cursor), Some(0));
    }
}

//! End-to-end netlist scenarios.

use test_log::test;

use crate::shared::Fixture;

const NFET: &str = r#"
devices:
  nfet:
    ports: [D, G, S, B]
    backends:
      sim.ngspice:
        template: "M{name} {ports} nfet"
"#;

#[test]
fn minimal_primitive() {
    let fx = Fixture::new();
    let entry = fx.file(
        "inv.asdl",
        r#"
devices:
  nfet:
    ports: [D, G, S, B]
    backends:
      sim.ngspice:
        template: "M{name} {ports} nfet_mod"
modules:
  inv:
    instances:
      M1: nfet
    nets:
      $in: [M1.G]
      $out: [M1.D]
      $vdd: [M1.B]
      $vss: [M1.S]
"#,
    );

    let (output, issues) = fx.compile_with(&entry, |opts| opts.top_as_subckt = true);
    assert_eq!(issues.num_errors(), 0, "{}", issues);
    let output = output.unwrap();

    assert!(output.netlist.contains(".subckt inv in out vdd vss"));
    assert!(output.netlist.contains("MM1 out in vss vdd nfet_mod"));
    assert!(output.netlist.contains(".ends inv"));
    assert!(output.netlist.contains("* ASDL netlist for inv"));
    assert!(output.netlist.trim_end().ends_with(".end"));
    assert_eq!(output.extension, ".spice");
}

#[test]
fn top_module_unwrapped_by_default() {
    let fx = Fixture::new();
    let entry = fx.file(
        "inv.asdl",
        r#"
devices:
  nfet:
    ports: [D, G, S, B]
    backends:
      sim.ngspice:
        template: "M{name} {ports} nfet_mod"
modules:
  inv:
    instances:
      M1: nfet
    nets:
      $in: [M1.G]
      $out: [M1.D]
      $vdd: [M1.B]
      $vss: [M1.S]
"#,
    );

    let (output, issues) = fx.compile(&entry);
    assert_eq!(issues.num_errors(), 0, "{}", issues);
    let output = output.unwrap();
    assert!(!output.netlist.contains(".subckt"));
    assert!(output.netlist.contains("MM1 out in vss vdd nfet_mod"));
    // Falling back to the unique module is reported as an info note.
    assert!(issues.contains_code(diagnostics::codes::EMIT_NO_TOP));
}

#[test]
fn differential_pattern() {
    let fx = Fixture::new();
    let entry = fx.file(
        "diffpair.asdl",
        r#"
top: diffpair
devices:
  nfet:
    ports: [D, G, S, B]
    parameters:
      m: 1
    backends:
      sim.ngspice:
        template: "M{name} {ports} nfet m={m}"
modules:
  diffpair:
    instances:
      "MN<P|N>": nfet m=1
    nets:
      "$VIN<P|N>": ["MN<P|N>.G"]
      "$VOUT<P|N>": ["MN<P|N>.D"]
      VSS: ["MN<P|N>.S", "MN<P|N>.B"]
"#,
    );

    let (output, issues) = fx.compile(&entry);
    assert_eq!(issues.num_errors(), 0, "{}", issues);
    let output = output.unwrap();

    let module = &output.design.modules[0];
    assert_eq!(module.ports, ["VINP", "VINN", "VOUTP", "VOUTN"]);
    let names: Vec<_> = module.instances.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, ["MNP", "MNN"]);

    assert!(output.netlist.contains("MMNP VOUTP VINP VSS VSS nfet m=1"));
    assert!(output.netlist.contains("MMNN VOUTN VINN VSS VSS nfet m=1"));
}

#[test]
fn numeric_range() {
    let fx = Fixture::new();
    let entry = fx.file(
        "bank.asdl",
        r#"
top: bank
devices:
  dff:
    ports: [D]
    backends:
      sim.ngspice:
        template: "X{name} {ports} dff"
modules:
  bank:
    instances:
      "reg<3:0>": dff
    nets:
      "bus<3:0>": ["reg<3:0>.D"]
"#,
    );

    let (output, issues) = fx.compile(&entry);
    assert_eq!(issues.num_errors(), 0, "{}", issues);
    let output = output.unwrap();

    let module = &output.design.modules[0];
    assert_eq!(module.nets, ["bus3", "bus2", "bus1", "bus0"]);
    for (i, idx) in (0u32..4).zip([3u32, 2, 1, 0]) {
        let inst = &module.instances[i as usize];
        assert_eq!(inst.name.as_str(), format!("reg{}", idx));
        assert_eq!(inst.conn("D").unwrap().as_str(), format!("bus{}", idx));
    }
}

#[test]
fn instance_defaults_with_override() {
    let fx = Fixture::new();
    let entry = fx.file(
        "amp.asdl",
        r#"
top: amp
devices:
  nfet:
    ports: [D, G, S, B]
    backends:
      sim.ngspice:
        template: "M{name} {ports} nfet"
modules:
  amp:
    instances:
      M1: nfet
      M2: nfet
      M3: nfet
    instance_defaults:
      nfet:
        B: $VSS
    nets:
      $IN: [M1.G, M2.G, M3.G]
      $VSS: [M1.S, M2.S, M3.S]
      $VBB: ["!M3.B"]
"#,
    );

    let (output, issues) = fx.compile(&entry);
    assert_eq!(issues.num_errors(), 0, "{}", issues);
    // The `!` prefix suppresses the override notice.
    assert!(!issues.contains_code(diagnostics::codes::LINT_DEFAULT_OVERRIDE));

    let output = output.unwrap();
    let module = &output.design.modules[0];
    let conn_b = |name: &str| {
        module
            .instances
            .iter()
            .find(|i| i.name == name)
            .unwrap()
            .conn("B")
            .unwrap()
            .as_str()
            .to_string()
    };
    assert_eq!(conn_b("M1"), "VSS");
    assert_eq!(conn_b("M2"), "VSS");
    assert_eq!(conn_b("M3"), "VBB");
}

#[test]
fn explicit_override_without_bang_warns() {
    let fx = Fixture::new();
    let entry = fx.file(
        "amp.asdl",
        r#"
top: amp
devices:
  nfet:
    ports: [D, G, S, B]
    backends:
      sim.ngspice:
        template: "M{name} {ports} nfet"
modules:
  amp:
    instances:
      M1: nfet
    instance_defaults:
      nfet:
        B: $VSS
    nets:
      $IN: [M1.G]
      $VSS: [M1.S]
      $VBB: [M1.B]
"#,
    );

    let (output, issues) = fx.compile(&entry);
    assert_eq!(issues.num_errors(), 0, "{}", issues);
    assert!(issues.contains_code(diagnostics::codes::LINT_DEFAULT_OVERRIDE));
    let output = output.unwrap();
    let module = &output.design.modules[0];
    assert_eq!(module.instances[0].conn("B").unwrap(), "VBB");
}

#[test]
fn import_cycle_fails_without_output() {
    let fx = Fixture::new();
    fx.file(
        "b.asdl",
        "imports:\n  a: ./a.asdl\nmodules:\n  cb:\n    nets:\n      $x: []\n",
    );
    let entry = fx.file(
        "a.asdl",
        "imports:\n  b: ./b.asdl\nmodules:\n  ca:\n    nets:\n      $x: []\n",
    );

    let (output, issues) = fx.compile(&entry);
    assert!(output.is_none());
    assert!(issues.contains_code(diagnostics::codes::AST_IMPORT_CYCLE));
    let cycle = issues
        .iter()
        .find(|d| d.code == diagnostics::codes::AST_IMPORT_CYCLE)
        .unwrap();
    assert!(cycle.message.contains("a.asdl"));
    assert!(cycle.message.contains("b.asdl"));
}

const LIB_CELLS: &str = r#"
devices:
  nfet:
    ports: [D, G, S, B]
    backends:
      sim.ngspice:
        template: "M{name} {ports} nfet"
modules:
  inv:
    instances:
      M1: nfet
    nets:
      $IN: [M1.G]
"#;

#[test]
fn collision_rename() {
    let fx = Fixture::new();
    fx.file("lib1/cells.asdl", LIB_CELLS);
    fx.file("lib2/cells.asdl", LIB_CELLS);
    let entry = fx.file(
        "chip.asdl",
        r#"
top: chip
imports:
  l1: ./lib1/cells.asdl
  l2: ./lib2/cells.asdl
modules:
  chip:
    instances:
      X1: l1.inv
      X2: l2.inv
    nets:
      $A: [X1.IN, X2.IN]
"#,
    );

    let (output, issues) = fx.compile(&entry);
    assert_eq!(issues.num_errors(), 0, "{}", issues);
    assert!(issues.contains_code(diagnostics::codes::EMIT_COLLISION_RENAME));
    let output = output.unwrap();

    // The first reachable `inv` keeps its name; the second is suffixed.
    assert!(output.netlist.contains(".subckt inv IN"));
    assert!(output.netlist.contains(".subckt inv__"));
    assert!(output.netlist.contains("XX1 A inv\n"));
    let renamed_call = output
        .netlist
        .lines()
        .find(|l| l.starts_with("XX2 A inv__"))
        .expect("renamed call site");
    assert_ne!(renamed_call, "XX2 A inv");
}

#[test]
fn named_axis_broadcast() {
    let fx = Fixture::new();
    let entry = fx.file(
        "array.asdl",
        r#"
top: array
devices:
  dff:
    ports: [D]
    backends:
      sim.ngspice:
        template: "X{name} {ports} dff"
modules:
  array:
    patterns:
      row: "<0:1>"
      col: "<0:2>"
    instances:
      "m<@row>_<@col>": dff
    nets:
      "r<@row>": ["m<@row>_<@col>.D"]
"#,
    );

    let (output, issues) = fx.compile(&entry);
    assert_eq!(issues.num_errors(), 0, "{}", issues);
    let output = output.unwrap();

    // Each row net repeats across the column axis.
    let module = &output.design.modules[0];
    for inst in &module.instances {
        let row = inst.name.as_bytes()[1] - b'0';
        assert_eq!(
            inst.conn("D").unwrap().as_str(),
            format!("r{}", row),
            "{}",
            inst.name
        );
    }
    assert_eq!(module.instances.len(), 6);
}

#[test]
fn unused_import_warns() {
    let fx = Fixture::new();
    fx.file("lib/cells.asdl", LIB_CELLS);
    let entry = fx.file(
        "chip.asdl",
        r#"
imports:
  cells: ./lib/cells.asdl
devices:
  res:
    ports: [P, N]
    backends:
      sim.ngspice:
        template: "R{name} {ports} 1k"
modules:
  chip:
    instances:
      R1: res
    nets:
      $A: [R1.P]
      $B: [R1.N]
"#,
    );

    let (_, issues) = fx.compile(&entry);
    assert!(issues.contains_code(diagnostics::codes::LINT_UNUSED_IMPORT));
}

#[test]
fn unknown_port_is_an_error() {
    let fx = Fixture::new();
    let entry = fx.file(
        "bad.asdl",
        r#"
devices:
  nfet:
    ports: [D, G, S, B]
    backends:
      sim.ngspice:
        template: "M{name} {ports} nfet"
modules:
  bad:
    instances:
      M1: nfet
    nets:
      $IN: [M1.X]
"#,
    );

    let (output, issues) = fx.compile(&entry);
    assert!(output.is_none());
    assert!(issues.contains_code(diagnostics::codes::IR_UNKNOWN_PORT));
}

#[test]
fn binding_length_mismatch_is_an_error() {
    let fx = Fixture::new();
    let entry = fx.file(
        "bad.asdl",
        r#"
devices:
  dff:
    ports: [D]
    backends:
      sim.ngspice:
        template: "X{name} {ports} dff"
modules:
  bad:
    instances:
      "reg<2:0>": dff
    nets:
      "bus<1:0>": ["reg<2:0>.D"]
"#,
    );

    let (output, issues) = fx.compile(&entry);
    assert!(output.is_none());
    assert!(issues.contains_code(diagnostics::codes::IR_LENGTH_MISMATCH));
}

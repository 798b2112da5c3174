//! Determinism, idempotence, and invariant properties.

use test_log::test;

use crate::shared::Fixture;

const DIFFPAIR: &str = r#"
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
"#;

#[test]
fn compilation_is_deterministic() {
    let fx = Fixture::new();
    let entry = fx.file("diffpair.asdl", DIFFPAIR);

    let (first, issues) = fx.compile(&entry);
    assert_eq!(issues.num_errors(), 0, "{}", issues);
    let (second, _) = fx.compile(&entry);
    assert_eq!(first.unwrap().netlist, second.unwrap().netlist);
}

#[test]
fn emitting_the_same_design_twice_is_identical() {
    let fx = Fixture::new();
    let entry = fx.file("diffpair.asdl", DIFFPAIR);
    let (output, _) = fx.compile(&entry);
    let output = output.unwrap();

    let (config, _) = asdl::backend::load(fx.options().backend_config.as_deref());
    let config = config.unwrap();
    let (backend, _) = config.select(asdl::DEFAULT_BACKEND);
    let backend = backend.unwrap();

    let opts = asdl::EmitOptions::default();
    let (a, _) = asdl::emit::emit(&output.design, asdl::DEFAULT_BACKEND, backend, &opts);
    let (b, _) = asdl::emit::emit(&output.design, asdl::DEFAULT_BACKEND, backend, &opts);
    assert_eq!(a.unwrap(), b.unwrap());
}

#[test]
fn atomization_is_idempotent() {
    let fx = Fixture::new();
    let entry = fx.file("diffpair.asdl", DIFFPAIR);
    let (output, _) = fx.compile(&entry);
    let graph = output.unwrap().graph;

    let (once, issues) = asdl::atomize::atomize(&graph);
    assert_eq!(issues.num_errors(), 0, "{}", issues);
    let once = once.unwrap();
    let (twice, issues) = asdl::atomize::atomize(&once);
    assert_eq!(issues.num_errors(), 0, "{}", issues);
    let twice = twice.unwrap();

    let (design_once, _) = asdl::atomize::project(&once);
    let (design_twice, _) = asdl::atomize::project(&twice);
    assert_eq!(
        serde_json::to_string(&design_once.unwrap()).unwrap(),
        serde_json::to_string(&design_twice.unwrap()).unwrap(),
    );
}

#[test]
fn no_pattern_delimiters_survive_projection() {
    let fx = Fixture::new();
    let entry = fx.file("diffpair.asdl", DIFFPAIR);
    let (output, _) = fx.compile(&entry);
    let design = output.unwrap().design;

    let clean = |s: &str| !s.contains(['<', '>', '|', ':', ';']);
    for module in &design.modules {
        assert!(clean(&module.name));
        for name in module.ports.iter().chain(&module.nets) {
            assert!(clean(name), "{}", name);
        }
        for inst in &module.instances {
            assert!(clean(&inst.name));
            for conn in &inst.conns {
                assert!(clean(&conn.port) && clean(&conn.net));
            }
        }
    }
}

#[test]
fn identity_invariants_hold() {
    let fx = Fixture::new();
    let entry = fx.file("diffpair.asdl", DIFFPAIR);
    let (output, _) = fx.compile(&entry);
    let design = output.unwrap().design;

    for module in &design.modules {
        let mut inst_names = std::collections::HashSet::new();
        for inst in &module.instances {
            assert!(inst_names.insert(inst.name.clone()));
            let mut conn_ports = std::collections::HashSet::new();
            for conn in &inst.conns {
                assert!(conn_ports.insert(conn.port.clone()));
            }
        }
        let mut nets = std::collections::HashSet::new();
        for net in &module.nets {
            assert!(nets.insert(net.clone()));
        }
    }
}

#[test]
fn permuting_library_roots_preserves_output() {
    let fx = Fixture::new();
    fx.file(
        "r1/a.asdl",
        r#"
devices:
  res:
    ports: [P, N]
    backends:
      sim.ngspice:
        template: "R{name} {ports} 1k"
modules:
  cell_a:
    instances:
      R1: res
    nets:
      $X: [R1.P]
      $Y: [R1.N]
"#,
    );
    fx.file(
        "r2/b.asdl",
        r#"
devices:
  cap:
    ports: [P, N]
    backends:
      sim.ngspice:
        template: "C{name} {ports} 1p"
modules:
  cell_b:
    instances:
      C1: cap
    nets:
      $X: [C1.P]
      $Y: [C1.N]
"#,
    );
    let entry = fx.file(
        "top.asdl",
        r#"
top: chip
imports:
  a: a.asdl
  b: b.asdl
modules:
  chip:
    instances:
      U1: a.cell_a
      U2: b.cell_b
    nets:
      $N1: [U1.X, U2.X]
      $N2: [U1.Y, U2.Y]
"#,
    );

    let r1 = fx.root().join("r1");
    let r2 = fx.root().join("r2");

    let (forward, issues) = fx.compile_with(&entry, |opts| {
        opts.lib_roots = vec![r1.clone(), r2.clone()];
    });
    assert_eq!(issues.num_errors(), 0, "{}", issues);
    let (reversed, issues) = fx.compile_with(&entry, |opts| {
        opts.lib_roots = vec![r2.clone(), r1.clone()];
    });
    assert_eq!(issues.num_errors(), 0, "{}", issues);

    assert_eq!(forward.unwrap().netlist, reversed.unwrap().netlist);
}

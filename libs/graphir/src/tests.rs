use diagnostics::FileId;
use indexmap::IndexMap;
use test_log::test;

use crate::*;

fn file() -> FileId {
    FileId::new("/designs/top.asdl")
}

fn device_backends() -> IndexMap<arcstr::ArcStr, DeviceBackend> {
    let mut backends = IndexMap::new();
    backends.insert(
        "sim.ngspice".into(),
        DeviceBackend {
            template: "M{name} {ports} nfet_03v3 L={L} W={W}".into(),
            ..Default::default()
        },
    );
    backends
}

fn inverter() -> (Program, ModuleId) {
    let mut program = Program::new();
    program.add_file(file());
    let nfet = program.create_device(
        "nfet",
        file(),
        vec!["D".into(), "G".into(), "S".into(), "B".into()],
        IndexMap::new(),
        IndexMap::new(),
        device_backends(),
    );

    let inv = program.create_module("inv", file());
    let mn = program.add_instance(
        inv,
        "MN",
        ChildRef::Device(nfet),
        "nfet",
        IndexMap::new(),
        None,
    );
    let vin = program.add_net(inv, "in", true, None);
    let vss = program.add_net(inv, "vss", true, None);
    program.add_port(inv, vin);
    program.add_port(inv, vss);
    program.attach_endpoint(inv, vin, mn, "G", None);
    program.attach_endpoint(inv, vss, mn, "S", None);
    (program, inv)
}

#[test]
fn valid_module_passes() {
    let (program, _) = inverter();
    let issues = program.validate();
    assert_eq!(issues.num_errors(), 0);
    assert_eq!(issues.num_warnings(), 0);
}

#[test]
fn ids_are_never_reused() {
    let (mut program, inv) = inverter();
    let n1 = program.add_net(inv, "scratch", false, None);
    let mut edit = program.edit(inv);
    edit.delete_net(n1);
    edit.commit().unwrap();
    let n2 = program.add_net(inv, "scratch2", false, None);
    assert_ne!(n1, n2);
}

#[test]
fn duplicate_instance_names_rejected() {
    let (mut program, inv) = inverter();
    let nfet = program.device_by_ref(&file(), "nfet").unwrap();
    program.add_instance(
        inv,
        "MN",
        ChildRef::Device(nfet),
        "nfet",
        IndexMap::new(),
        None,
    );
    let issues = program.validate();
    assert!(issues.contains_code(diagnostics::codes::IR_DUPLICATE_INSTANCE));
}

#[test]
fn duplicate_endpoint_key_rejected() {
    let (mut program, inv) = inverter();
    let module = program.module(inv).unwrap();
    let mn = module.instance_named("MN").unwrap().id();
    let vss = module.net_named("vss").unwrap().id();
    program.attach_endpoint(inv, vss, mn, "G", None);
    let issues = program.validate();
    assert!(issues.contains_code(diagnostics::codes::IR_DUPLICATE_ENDPOINT));
}

#[test]
fn failed_commit_rolls_back() {
    let (mut program, inv) = inverter();
    let before = program.module(inv).unwrap().nets().count();

    let mut edit = program.edit(inv);
    // A duplicate net name makes the snapshot invalid.
    edit.create_net("in", false);
    let err = edit.commit().unwrap_err();
    assert!(err.contains_code(diagnostics::codes::IR_DUPLICATE_NET));

    assert_eq!(program.module(inv).unwrap().nets().count(), before);
}

#[test]
fn commit_applies_edits() {
    let (mut program, inv) = inverter();
    let mn = program.module(inv).unwrap().instance_named("MN").unwrap().id();

    let mut edit = program.edit(inv);
    let vdd = edit.create_net("vdd", false);
    edit.attach(vdd, mn, "D");
    edit.set_instance_prop(mn, "m", "2");
    edit.rename_net(vdd, "vdd_core");
    edit.commit().unwrap();

    let module = program.module(inv).unwrap();
    let net = module.net_named("vdd_core").unwrap();
    assert_eq!(net.num_endpoints(), 1);
    assert_eq!(
        module.instance(mn).unwrap().props().get("m").unwrap(),
        "2"
    );
}

#[test]
fn delete_instance_detaches_endpoints() {
    let (mut program, inv) = inverter();
    let mn = program.module(inv).unwrap().instance_named("MN").unwrap().id();

    let mut edit = program.edit(inv);
    edit.delete_instance(mn);
    edit.commit().unwrap();

    let module = program.module(inv).unwrap();
    for (_, net) in module.nets() {
        assert_eq!(net.num_endpoints(), 0);
    }
}

#[test]
fn indices_are_consistent_with_regions() {
    let (program, inv) = inverter();
    let module = program.module(inv).unwrap();
    let indices = Indices::build(module);

    let mn = module.instance_named("MN").unwrap().id();
    assert_eq!(indices.inst_to_endpoints[&mn].len(), 2);
    for (net_id, net) in module.nets() {
        for endpoint in net.endpoints() {
            assert_eq!(indices.endpoint_to_net[&endpoint.id()], net_id);
        }
    }
}

#[test]
fn expr_table_interns_once() {
    let mut table = PatternExprTable::new();
    let a = table.intern("MN<P|N>");
    let b = table.intern("MN<P|N>");
    let c = table.intern("bus<3:0>");
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(table.get(a).unwrap(), "MN<P|N>");
    assert_eq!(table.len(), 2);
}

#[test]
fn design_order_puts_children_first() {
    let (mut program, inv) = inverter();
    let top = program.create_module("chip", file());
    program.add_instance(
        top,
        "X0",
        ChildRef::Module(inv),
        "inv",
        IndexMap::new(),
        None,
    );
    program.entry = Some(top);

    let order = program.emission_order(EmitOrder::Design);
    assert_eq!(order, vec![inv, top]);
}

#[test]
fn library_order_follows_files() {
    let (mut program, inv) = inverter();
    let other = FileId::new("/designs/lib.asdl");
    program.add_file(other.clone());
    let cell = program.create_module("cell", other);

    let order = program.emission_order(EmitOrder::Library);
    assert_eq!(order, vec![inv, cell]);
}

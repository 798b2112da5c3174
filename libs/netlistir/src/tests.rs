use diagnostics::FileId;
use indexmap::IndexMap;
use test_log::test;

use crate::*;

fn file() -> FileId {
    FileId::new("/designs/top.asdl")
}

fn nfet() -> NetlistDevice {
    NetlistDevice {
        name: "nfet".into(),
        file_id: file(),
        ports: vec!["D".into(), "G".into(), "S".into(), "B".into()],
        parameters: IndexMap::new(),
        variables: IndexMap::new(),
        backends: IndexMap::new(),
    }
}

fn inv() -> NetlistModule {
    NetlistModule {
        name: "inv".into(),
        file_id: file(),
        ports: vec!["in".into(), "vss".into()],
        nets: vec!["in".into(), "vss".into()],
        instances: vec![NetlistInstance {
            name: "MN".into(),
            child: NetlistRef {
                kind: ChildKind::Device,
                name: "nfet".into(),
                file: file(),
            },
            params: IndexMap::new(),
            conns: vec![
                NetlistConn {
                    port: "G".into(),
                    net: "in".into(),
                },
                NetlistConn {
                    port: "S".into(),
                    net: "vss".into(),
                },
            ],
        }],
        pattern_expression_table: None,
    }
}

fn design() -> NetlistDesign {
    NetlistDesign {
        modules: vec![inv()],
        devices: vec![nfet()],
        top: Some("inv".into()),
        entry_file_id: Some(file()),
    }
}

#[test]
fn clean_design_verifies() {
    let issues = verify::verify(&design());
    assert_eq!(issues.num_errors(), 0);
}

#[test]
fn pattern_leakage_detected() {
    let mut design = design();
    design.modules[0].nets.push("bus<3:0>".into());
    let issues = verify::verify(&design);
    assert!(issues.contains_code(diagnostics::codes::IR_PATTERN_LEAKAGE));
}

#[test]
fn duplicate_net_detected() {
    let mut design = design();
    design.modules[0].nets.push("in".into());
    let issues = verify::verify_unique_names(&design);
    assert!(issues.contains_code(diagnostics::codes::IR_NETLIST_DUPLICATE));
}

#[test]
fn unknown_device_port_detected() {
    let mut design = design();
    design.modules[0].instances[0].conns.push(NetlistConn {
        port: "X".into(),
        net: "in".into(),
    });
    let issues = verify::verify_connections(&design);
    assert!(issues.contains_code(diagnostics::codes::IR_CONN_PORT_MISMATCH));
}

#[test]
fn portless_devices_skip_port_check() {
    let mut design = design();
    design.devices[0].ports.clear();
    design.modules[0].instances[0].conns.push(NetlistConn {
        port: "whatever".into(),
        net: "in".into(),
    });
    let issues = verify::verify_connections(&design);
    assert_eq!(issues.num_errors(), 0);
}

#[test]
fn dangling_net_detected() {
    let mut design = design();
    design.modules[0].instances[0].conns[0].net = "ghost".into();
    let issues = verify::verify_connections(&design);
    assert!(issues.contains_code(diagnostics::codes::IR_NETLIST_DANGLING));
}

#[test]
fn duplicate_conn_detected() {
    let mut design = design();
    let dup = design.modules[0].instances[0].conns[0].clone();
    design.modules[0].instances[0].conns.push(dup);
    let issues = verify::verify_connections(&design);
    assert!(issues.contains_code(diagnostics::codes::IR_DUPLICATE_CONN));
}

#[test]
fn missing_module_port_conn_detected() {
    let mut design = design();
    let inv_ref = NetlistRef {
        kind: ChildKind::Module,
        name: "inv".into(),
        file: file(),
    };
    design.modules.push(NetlistModule {
        name: "chip".into(),
        file_id: file(),
        ports: vec![],
        nets: vec!["n1".into()],
        instances: vec![NetlistInstance {
            name: "X0".into(),
            child: inv_ref,
            params: IndexMap::new(),
            conns: vec![NetlistConn {
                port: "in".into(),
                net: "n1".into(),
            }],
        }],
        pattern_expression_table: None,
    });
    let issues = verify::verify_connections(&design);
    // `vss` of `inv` is unconnected.
    assert!(issues.contains_code(diagnostics::codes::IR_CONN_PORT_MISMATCH));
}

#[test]
fn verification_does_not_mutate() {
    let design = design();
    let before = serde_json::to_string(&design);
    let _ = verify::verify(&design);
    let after = serde_json::to_string(&design);
    assert_eq!(before.unwrap(), after.unwrap());
}

//! Stateless NetlistIR verification.
//!
//! Every verifier is a pure function from a design to a diagnostic list.
//! Verifiers never mutate their input and never raise; codes live in the
//! `IR-050`+ range.

use std::collections::HashSet;

use diagnostics::{codes, Diagnostic, DiagnosticSet};
use tracing::{span, Level};

use crate::{ChildKind, NetlistDesign, NetlistModule};

/// Runs every verifier over the design.
pub fn verify(design: &NetlistDesign) -> DiagnosticSet {
    let _guard = span!(Level::INFO, "verifying NetlistIR design").entered();
    let mut issues = DiagnosticSet::new();
    issues.merge(verify_no_pattern_leakage(design));
    issues.merge(verify_unique_names(design));
    issues.merge(verify_connections(design));
    issues
}

const PATTERN_DELIMS: [char; 5] = ['<', '>', '|', ':', ';'];

/// No literal name may contain a pattern delimiter.
pub fn verify_no_pattern_leakage(design: &NetlistDesign) -> DiagnosticSet {
    let mut issues = DiagnosticSet::new();
    let mut check = |name: &str, what: &str, module: &str| {
        if name.contains(PATTERN_DELIMS) {
            issues.add(
                Diagnostic::error(
                    codes::IR_PATTERN_LEAKAGE,
                    format!(
                        "{} name `{}` in `{}` contains a pattern delimiter",
                        what, name, module
                    ),
                )
                .with_source("netlistir"),
            );
        }
    };

    for module in &design.modules {
        check(&module.name, "module", &module.name);
        for port in &module.ports {
            check(port, "port", &module.name);
        }
        for net in &module.nets {
            check(net, "net", &module.name);
        }
        for inst in &module.instances {
            check(&inst.name, "instance", &module.name);
            for conn in &inst.conns {
                check(&conn.port, "connection port", &module.name);
                check(&conn.net, "connection net", &module.name);
            }
        }
    }
    issues
}

/// Module identities, and names within each module, must be unique.
pub fn verify_unique_names(design: &NetlistDesign) -> DiagnosticSet {
    let mut issues = DiagnosticSet::new();

    let mut identities = HashSet::new();
    for module in &design.modules {
        if !identities.insert((module.file_id.clone(), module.name.clone())) {
            issues.add(
                Diagnostic::error(
                    codes::IR_NETLIST_DUPLICATE,
                    format!(
                        "module `{}` defined more than once in `{}`",
                        module.name, module.file_id
                    ),
                )
                .with_source("netlistir"),
            );
        }

        let mut nets = HashSet::new();
        for net in &module.nets {
            if !nets.insert(net.clone()) {
                issues.add(
                    Diagnostic::error(
                        codes::IR_NETLIST_DUPLICATE,
                        format!("duplicate net `{}` in module `{}`", net, module.name),
                    )
                    .with_source("netlistir"),
                );
            }
        }

        let mut ports = HashSet::new();
        for port in &module.ports {
            if !ports.insert(port.clone()) {
                issues.add(
                    Diagnostic::error(
                        codes::IR_NETLIST_DUPLICATE,
                        format!("duplicate port `{}` in module `{}`", port, module.name),
                    )
                    .with_source("netlistir"),
                );
            }
        }

        let mut instances = HashSet::new();
        for inst in &module.instances {
            if !instances.insert(inst.name.clone()) {
                issues.add(
                    Diagnostic::error(
                        codes::IR_NETLIST_DUPLICATE,
                        format!(
                            "duplicate instance `{}` in module `{}`",
                            inst.name, module.name
                        ),
                    )
                    .with_source("netlistir"),
                );
            }
        }
    }
    issues
}

/// Connections must reference declared nets and match the child's ports.
pub fn verify_connections(design: &NetlistDesign) -> DiagnosticSet {
    let mut issues = DiagnosticSet::new();
    for module in &design.modules {
        verify_module_connections(design, module, &mut issues);
    }
    issues
}

fn verify_module_connections(
    design: &NetlistDesign,
    module: &NetlistModule,
    issues: &mut DiagnosticSet,
) {
    let nets: HashSet<&str> = module.nets.iter().map(|n| n.as_str()).collect();

    for port in &module.ports {
        if !nets.contains(port.as_str()) {
            issues.add(
                Diagnostic::error(
                    codes::IR_NETLIST_DANGLING,
                    format!(
                        "port `{}` of module `{}` is not among its nets",
                        port, module.name
                    ),
                )
                .with_source("netlistir"),
            );
        }
    }

    for inst in &module.instances {
        let mut seen_ports = HashSet::new();
        for conn in &inst.conns {
            if !seen_ports.insert(conn.port.as_str()) {
                issues.add(
                    Diagnostic::error(
                        codes::IR_DUPLICATE_CONN,
                        format!(
                            "instance `{}` in module `{}` binds port `{}` more than once",
                            inst.name, module.name, conn.port
                        ),
                    )
                    .with_source("netlistir"),
                );
            }
            if !nets.contains(conn.net.as_str()) {
                issues.add(
                    Diagnostic::error(
                        codes::IR_NETLIST_DANGLING,
                        format!(
                            "instance `{}` in module `{}` connects `{}` to undeclared net `{}`",
                            inst.name, module.name, conn.port, conn.net
                        ),
                    )
                    .with_source("netlistir"),
                );
            }
        }

        match inst.child.kind {
            ChildKind::Module => {
                let Some(child) = design.module(&inst.child.file, &inst.child.name) else {
                    issues.add(
                        Diagnostic::error(
                            codes::IR_NETLIST_DANGLING,
                            format!(
                                "instance `{}` in module `{}` references missing module `{}`",
                                inst.name, module.name, inst.child.name
                            ),
                        )
                        .with_source("netlistir"),
                    );
                    continue;
                };
                let child_ports: HashSet<&str> =
                    child.ports.iter().map(|p| p.as_str()).collect();
                for conn in &inst.conns {
                    if !child_ports.contains(conn.port.as_str()) {
                        issues.add(
                            Diagnostic::error(
                                codes::IR_CONN_PORT_MISMATCH,
                                format!(
                                    "instance `{}` in module `{}` connects port `{}`, which `{}` does not declare",
                                    inst.name, module.name, conn.port, child.name
                                ),
                            )
                            .with_source("netlistir"),
                        );
                    }
                }
                for port in &child.ports {
                    if inst.conn(port).is_none() {
                        issues.add(
                            Diagnostic::error(
                                codes::IR_CONN_PORT_MISMATCH,
                                format!(
                                    "instance `{}` in module `{}` leaves port `{}` of `{}` unconnected",
                                    inst.name, module.name, port, child.name
                                ),
                            )
                            .with_source("netlistir"),
                        );
                    }
                }
            }
            ChildKind::Device => {
                let Some(child) = design.device(&inst.child.file, &inst.child.name) else {
                    issues.add(
                        Diagnostic::error(
                            codes::IR_NETLIST_DANGLING,
                            format!(
                                "instance `{}` in module `{}` references missing device `{}`",
                                inst.name, module.name, inst.child.name
                            ),
                        )
                        .with_source("netlistir"),
                    );
                    continue;
                };
                // Portless devices are opaque to the port check.
                if child.ports.is_empty() {
                    continue;
                }
                let child_ports: HashSet<&str> =
                    child.ports.iter().map(|p| p.as_str()).collect();
                for conn in &inst.conns {
                    if !child_ports.contains(conn.port.as_str()) {
                        issues.add(
                            Diagnostic::error(
                                codes::IR_CONN_PORT_MISMATCH,
                                format!(
                                    "instance `{}` in module `{}` connects port `{}`, which device `{}` does not declare",
                                    inst.name, module.name, conn.port, child.name
                                ),
                            )
                            .with_source("netlistir"),
                        );
                    }
                }
            }
        }
    }
}

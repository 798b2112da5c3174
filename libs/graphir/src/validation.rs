//! GraphIR structural validation.
//!
//! Validators are pure: they read a program (or a module in the context
//! of a program) and return diagnostics. They never mutate their input
//! and never raise.

use std::collections::{HashMap, HashSet};

use arcstr::ArcStr;
use diagnostics::{codes, Diagnostic, DiagnosticSet};
use pattern::Expression;
use tracing::{span, Level};

use crate::{ChildRef, Module, Program};

impl Program {
    /// Checks every module of the program.
    pub fn validate(&self) -> DiagnosticSet {
        let _guard = span!(Level::INFO, "validating GraphIR program").entered();
        let mut issues = DiagnosticSet::new();
        for (_, module) in self.modules() {
            issues.merge(validate_module(self, module));
        }
        issues
    }
}

/// Checks one module against the structural invariants:
/// unique net names, unique instance names, unique `(instance, port)`
/// endpoint keys, no dangling references, and well-formed names.
pub fn validate_module(program: &Program, module: &Module) -> DiagnosticSet {
    let _guard = span!(
        Level::INFO,
        "validating GraphIR module",
        module.id = %module.id(),
        module.name = %module.name(),
    )
    .entered();
    let mut issues = DiagnosticSet::new();

    let mut net_names: HashMap<&ArcStr, ()> = HashMap::new();
    for (_, net) in module.nets() {
        if net_names.insert(net.name(), ()).is_some() {
            issues.add(
                Diagnostic::error(
                    codes::IR_DUPLICATE_NET,
                    format!(
                        "duplicate net `{}` in module `{}`",
                        net.name(),
                        module.name()
                    ),
                )
                .with_source("graphir"),
            );
        }
        check_name(&mut issues, module, net.name(), "net");
    }

    let mut inst_names: HashMap<&ArcStr, ()> = HashMap::new();
    for (_, inst) in module.instances() {
        if inst_names.insert(inst.name(), ()).is_some() {
            issues.add(
                Diagnostic::error(
                    codes::IR_DUPLICATE_INSTANCE,
                    format!(
                        "duplicate instance `{}` in module `{}`",
                        inst.name(),
                        module.name()
                    ),
                )
                .with_source("graphir"),
            );
        }
        check_name(&mut issues, module, inst.name(), "instance");

        if !pattern::is_literal(inst.ref_raw()) {
            issues.add(
                Diagnostic::error(
                    codes::IR_BAD_NAME,
                    format!(
                        "model reference `{}` of instance `{}` may not contain pattern syntax",
                        inst.ref_raw(),
                        inst.name()
                    ),
                )
                .with_source("graphir"),
            );
        }

        let resolved = match inst.child() {
            ChildRef::Module(id) => program.module(id).is_some(),
            ChildRef::Device(id) => program.device(id).is_some(),
        };
        if !resolved {
            issues.add(
                Diagnostic::error(
                    codes::IR_DANGLING_REF,
                    format!(
                        "instance `{}` in module `{}` references an entity that no longer exists",
                        inst.name(),
                        module.name()
                    ),
                )
                .with_source("graphir"),
            );
        }
    }

    let mut endpoint_keys: HashSet<(crate::InstanceId, &ArcStr)> = HashSet::new();
    for (_, net) in module.nets() {
        for endpoint in net.endpoints() {
            if module.instance(endpoint.inst()).is_none() {
                issues.add(
                    Diagnostic::error(
                        codes::IR_DANGLING_REF,
                        format!(
                            "endpoint `{}` on net `{}` references a deleted instance",
                            endpoint.id(),
                            net.name()
                        ),
                    )
                    .with_source("graphir"),
                );
            }
            if !endpoint_keys.insert((endpoint.inst(), endpoint.port_path())) {
                issues.add(
                    Diagnostic::error(
                        codes::IR_DUPLICATE_ENDPOINT,
                        format!(
                            "endpoint `{}.{}` attached more than once in module `{}`",
                            module
                                .instance(endpoint.inst())
                                .map(|i| i.name().as_str())
                                .unwrap_or("<deleted>"),
                            endpoint.port_path(),
                            module.name()
                        ),
                    )
                    .with_source("graphir"),
                );
            }
        }
    }

    for port in module.ports() {
        match module.net(*port) {
            Some(net) if net.is_port() => (),
            Some(net) => {
                issues.add(
                    Diagnostic::error(
                        codes::IR_DANGLING_REF,
                        format!(
                            "port order of module `{}` lists net `{}`, which is not a port net",
                            module.name(),
                            net.name()
                        ),
                    )
                    .with_source("graphir"),
                );
            }
            None => {
                issues.add(
                    Diagnostic::error(
                        codes::IR_DANGLING_REF,
                        format!(
                            "port order of module `{}` lists a deleted net",
                            module.name()
                        ),
                    )
                    .with_source("graphir"),
                );
            }
        }
    }

    issues
}

/// A name is sound when it is a plain literal, or a pattern expression
/// every atom of which is a valid literal name.
fn check_name(issues: &mut DiagnosticSet, module: &Module, name: &ArcStr, what: &str) {
    if pattern::is_literal(name) {
        if !pattern::is_valid_name(name) {
            issues.add(
                Diagnostic::error(
                    codes::IR_BAD_NAME,
                    format!("invalid {} name `{}` in module `{}`", what, name, module.name()),
                )
                .with_source("graphir"),
            );
        }
        return;
    }
    match Expression::parse(name.clone(), &module.patterns).and_then(|e| e.expand()) {
        Ok(atoms) => {
            for atom in &atoms {
                if !pattern::is_valid_name(&atom.literal) {
                    issues.add(
                        Diagnostic::error(
                            codes::IR_BAD_NAME,
                            format!(
                                "{} pattern `{}` expands to invalid name `{}`",
                                what, name, atom.literal
                            ),
                        )
                        .with_source("graphir"),
                    );
                }
            }
        }
        Err(err) => {
            issues.add(Diagnostic::error(err.code(), err.to_string()).with_source("graphir"));
        }
    }
}

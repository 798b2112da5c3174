//! Pattern atomization and NetlistIR projection.
//!
//! Atomization rewrites a GraphIR program into an equivalent program in
//! which every name is a literal atom: patterned instances and nets are
//! replaced by their expansions, endpoint bindings are verified with the
//! binding algebra, and pattern provenance moves down to the atoms.
//! Atomizing an already-atomized program is a no-op.
//!
//! Projection then flattens the atomized program into the frozen
//! [`NetlistDesign`] the emitter consumes.

use std::collections::{HashMap, HashSet};

use arcstr::ArcStr;
use diagnostics::{codes, Diagnostic, DiagnosticSet};
use graphir::{
    ChildRef, DeviceId, InstanceId, Module, ModuleId, NetId, PatternOrigin, Program,
};
use indexmap::IndexMap;
use netlistir::{ChildKind, NetlistConn, NetlistDesign, NetlistDevice, NetlistInstance, NetlistModule, NetlistRef};
use pattern::{Atom, Axis, Expression};
use tracing::{span, Level};

/// Expands every patterned name in `program` into literal atoms.
pub fn atomize(program: &Program) -> (Option<Program>, DiagnosticSet) {
    let _guard = span!(Level::INFO, "atomizing GraphIR").entered();
    let mut issues = DiagnosticSet::new();
    let mut out = Program::new();
    for file in &program.files {
        out.add_file(file.clone());
    }
    out.top_name = program.top_name.clone();

    // Shells first so child references remap in one pass.
    let mut module_map: HashMap<ModuleId, ModuleId> = HashMap::new();
    let mut device_map: HashMap<DeviceId, DeviceId> = HashMap::new();
    for (id, device) in program.devices() {
        let new = out.create_device(
            device.name().clone(),
            device.file().clone(),
            device.ports.clone(),
            device.parameters.clone(),
            device.variables.clone(),
            device.backends.clone(),
        );
        device_map.insert(id, new);
    }
    for (id, module) in program.modules() {
        let new = out.create_module(module.name().clone(), module.file().clone());
        let shell = out.module_mut(new).expect("just created");
        shell.patterns = module.patterns.clone();
        shell.parameters = module.parameters.clone();
        shell.variables = module.variables.clone();
        shell.exprs = module.exprs.clone();
        module_map.insert(id, new);
    }
    if let Some(entry) = program.entry {
        out.entry = module_map.get(&entry).copied();
    }

    let mut port_literals: HashMap<ModuleId, Option<Vec<ArcStr>>> = HashMap::new();
    for (id, module) in program.modules() {
        atomize_module(
            program,
            module,
            &mut out,
            module_map[&id],
            &module_map,
            &device_map,
            &mut port_literals,
            &mut issues,
        );
    }

    (Some(out), issues)
}

/// Expands a name in the context of a module, reporting failures.
fn expand_name(
    module: &Module,
    name: &ArcStr,
    issues: &mut DiagnosticSet,
) -> Option<(Expression, Vec<Atom>)> {
    let expression = match Expression::parse(name.clone(), &module.patterns) {
        Ok(e) => e,
        Err(err) => {
            issues.add(
                Diagnostic::error(err.code(), err.to_string()).with_source("atomize"),
            );
            return None;
        }
    };
    match expression.expand() {
        Ok(atoms) => Some((expression, atoms)),
        Err(err) => {
            issues.add(
                Diagnostic::error(err.code(), err.to_string()).with_source("atomize"),
            );
            None
        }
    }
}

/// The literal port names a module exposes, memoized.
fn module_port_literals<'a>(
    program: &Program,
    module_id: ModuleId,
    cache: &'a mut HashMap<ModuleId, Option<Vec<ArcStr>>>,
) -> &'a Option<Vec<ArcStr>> {
    cache.entry(module_id).or_insert_with(|| {
        let module = program.module(module_id)?;
        let mut out = Vec::new();
        for net_id in module.ports() {
            let net = module.net(*net_id)?;
            let atoms = pattern::expand_str(net.name(), &module.patterns).ok()?;
            out.extend(atoms.into_iter().map(|a| a.literal));
        }
        Some(out)
    })
}

#[allow(clippy::too_many_arguments)]
fn atomize_module(
    program: &Program,
    module: &Module,
    out: &mut Program,
    out_id: ModuleId,
    module_map: &HashMap<ModuleId, ModuleId>,
    device_map: &HashMap<DeviceId, DeviceId>,
    port_literals: &mut HashMap<ModuleId, Option<Vec<ArcStr>>>,
    issues: &mut DiagnosticSet,
) {
    let _guard = span!(Level::INFO, "atomizing module", module = %module.name()).entered();

    // Instances. Parameter values broadcast (length 1) or zip by
    // instance index (length N).
    let mut inst_atoms: HashMap<InstanceId, Vec<InstanceId>> = HashMap::new();
    let mut inst_exprs: HashMap<InstanceId, Vec<Atom>> = HashMap::new();
    let mut seen_instances: HashSet<ArcStr> = HashSet::new();
    for (id, inst) in module.instances() {
        let Some((expression, atoms)) = expand_name(module, inst.name(), issues) else {
            continue;
        };
        let count = atoms.len();

        let mut per_atom_props: Vec<IndexMap<ArcStr, ArcStr>> =
            vec![IndexMap::new(); count];
        let mut props_ok = true;
        for (key, value) in inst.props() {
            let expanded = match pattern::expand_str(value, &module.patterns) {
                Ok(atoms) => atoms,
                Err(err) => {
                    issues.add(
                        Diagnostic::error(err.code(), err.to_string())
                            .with_source("atomize"),
                    );
                    props_ok = false;
                    break;
                }
            };
            match expanded.len() {
                1 => {
                    for props in per_atom_props.iter_mut() {
                        props.insert(key.clone(), expanded[0].literal.clone());
                    }
                }
                n if n == count => {
                    for (props, atom) in per_atom_props.iter_mut().zip(&expanded) {
                        props.insert(key.clone(), atom.literal.clone());
                    }
                }
                n => {
                    issues.add(
                        Diagnostic::error(
                            codes::IR_LENGTH_MISMATCH,
                            format!(
                                "parameter `{}` of instance `{}` expands to {} values for {} instances",
                                key,
                                inst.name(),
                                n,
                                count
                            ),
                        )
                        .with_source("atomize"),
                    );
                    props_ok = false;
                    break;
                }
            }
        }
        if !props_ok {
            continue;
        }

        let child = match inst.child() {
            ChildRef::Module(m) => module_map.get(&m).copied().map(ChildRef::Module),
            ChildRef::Device(d) => device_map.get(&d).copied().map(ChildRef::Device),
        };
        let Some(child) = child else {
            issues.add(
                Diagnostic::error(
                    codes::IR_UNKNOWN_INSTANCE,
                    format!("instance `{}` references a missing symbol", inst.name()),
                )
                .with_source("atomize"),
            );
            continue;
        };

        let patterned = expression.has_groups();
        let mut new_ids = Vec::with_capacity(count);
        for (atom, props) in atoms.iter().zip(per_atom_props) {
            if !seen_instances.insert(atom.literal.clone()) {
                issues.add(
                    Diagnostic::error(
                        codes::IR_LITERAL_COLLISION,
                        format!(
                            "instance expansions collide on literal `{}` in module `{}`",
                            atom.literal,
                            module.name()
                        ),
                    )
                    .with_source("atomize"),
                );
            }
            let origin = if patterned {
                Some(atom_origin(out, out_id, inst.name(), atom))
            } else {
                inst.pattern_origin.clone()
            };
            let new_id = out.add_instance(
                out_id,
                atom.literal.clone(),
                child,
                inst.ref_raw().clone(),
                props,
                origin,
            );
            new_ids.push(new_id);
        }
        inst_atoms.insert(id, new_ids);
        inst_exprs.insert(id, atoms);
    }

    // Nets.
    let mut net_atoms: HashMap<NetId, Vec<NetId>> = HashMap::new();
    let mut net_axes: HashMap<NetId, Option<Vec<Axis>>> = HashMap::new();
    let mut seen_nets: HashSet<ArcStr> = HashSet::new();
    for (id, net) in module.nets() {
        let Some((expression, atoms)) = expand_name(module, net.name(), issues) else {
            continue;
        };
        let patterned = expression.has_groups();
        let mut new_ids = Vec::with_capacity(atoms.len());
        for atom in &atoms {
            if !seen_nets.insert(atom.literal.clone()) {
                issues.add(
                    Diagnostic::error(
                        codes::IR_LITERAL_COLLISION,
                        format!(
                            "net expansions collide on literal `{}` in module `{}`",
                            atom.literal,
                            module.name()
                        ),
                    )
                    .with_source("atomize"),
                );
            }
            let origin = if patterned {
                Some(atom_origin(out, out_id, net.name(), atom))
            } else {
                net.pattern_origin.clone()
            };
            new_ids.push(out.add_net(out_id, atom.literal.clone(), net.is_port(), origin));
        }
        net_axes.insert(id, expression.axes());
        net_atoms.insert(id, new_ids);
    }

    // Port order follows the pattern-level port order, expanded.
    for net_id in module.ports() {
        if let Some(new_ids) = net_atoms.get(net_id) {
            for new_id in new_ids {
                out.add_port(out_id, *new_id);
            }
        }
    }

    // Endpoints: verify each (net, endpoint) binding, then attach atoms.
    for (net_id, net) in module.nets() {
        let Some(new_net_ids) = net_atoms.get(&net_id) else {
            continue;
        };
        let net_len = new_net_ids.len();
        let this_net_axes = net_axes.get(&net_id).cloned().unwrap_or(None);

        for endpoint in net.endpoints() {
            let owner = endpoint.inst();
            let Some(owner_insts) = inst_atoms.get(&owner) else {
                issues.add(
                    Diagnostic::error(
                        codes::IR_UNKNOWN_INSTANCE,
                        format!(
                            "endpoint `{}` on net `{}` references an unknown instance",
                            endpoint.port_path(),
                            net.name()
                        ),
                    )
                    .with_source("atomize"),
                );
                continue;
            };
            let owner_atoms = &inst_exprs[&owner];
            let owner_name = module
                .instance(owner)
                .map(|i| i.name().clone())
                .unwrap_or_default();

            let Some((port_expr, port_atoms)) =
                expand_name(module, endpoint.port_path(), issues)
            else {
                continue;
            };

            // Port consistency against the referenced symbol.
            if let Some(inst) = module.instance(owner) {
                check_ports(
                    program,
                    module,
                    &owner_name,
                    inst.child(),
                    &port_atoms,
                    port_literals,
                    issues,
                );
            }

            let ep_len = owner_insts.len() * port_atoms.len();
            let ep_axes: Option<Vec<Axis>> = match (
                module
                    .instance(owner)
                    .and_then(|i| Expression::parse(i.name().clone(), &module.patterns).ok())
                    .and_then(|e| e.axes()),
                port_expr.axes(),
            ) {
                (Some(mut inst_axes), Some(port_axes)) => {
                    inst_axes.extend(port_axes);
                    Some(inst_axes)
                }
                _ => None,
            };

            let binding = match pattern::bind(
                net_len,
                this_net_axes.as_deref(),
                ep_len,
                ep_axes.as_deref(),
            ) {
                Ok(binding) => binding,
                Err(err) => {
                    issues.add(
                        Diagnostic::error(
                            codes::IR_LENGTH_MISMATCH,
                            format!(
                                "net `{}` does not bind endpoint `{}.{}`: {}",
                                net.name(),
                                owner_name,
                                endpoint.port_path(),
                                err
                            ),
                        )
                        .with_source("atomize"),
                    );
                    continue;
                }
            };

            let port_len = port_atoms.len().max(1);
            for e in 0..ep_len {
                let inst_idx = e / port_len;
                let port_idx = e % port_len;
                let net_atom = binding.net_index(e);
                let origin = endpoint.pattern_origin.as_ref().map(|origin| {
                    let mut parts = owner_atoms[inst_idx].parts.clone();
                    parts.extend(port_atoms[port_idx].parts.iter().cloned());
                    PatternOrigin {
                        expr: origin.expr,
                        segment: port_atoms[port_idx].segment,
                        base_name: origin.base_name.clone(),
                        parts,
                    }
                });
                out.attach_endpoint(
                    out_id,
                    new_net_ids[net_atom],
                    owner_insts[inst_idx],
                    port_atoms[port_idx].literal.clone(),
                    origin,
                );
            }
        }
    }
}

/// Builds the per-atom provenance record, interning the expression in the
/// output module's table.
fn atom_origin(out: &mut Program, out_id: ModuleId, expr: &ArcStr, atom: &Atom) -> PatternOrigin {
    let module = out.module_mut(out_id).expect("module exists");
    let expr = module.exprs.intern(expr.clone());
    PatternOrigin {
        expr,
        segment: atom.segment,
        base_name: atom.base_name.clone(),
        parts: atom.parts.clone(),
    }
}

/// Checks expanded port atoms against the referenced symbol's ports.
fn check_ports(
    program: &Program,
    module: &Module,
    owner_name: &ArcStr,
    child: ChildRef,
    port_atoms: &[Atom],
    port_literals: &mut HashMap<ModuleId, Option<Vec<ArcStr>>>,
    issues: &mut DiagnosticSet,
) {
    match child {
        ChildRef::Module(child_id) => {
            let Some(ports) = module_port_literals(program, child_id, port_literals) else {
                return;
            };
            let ports: HashSet<&str> = ports.iter().map(|p| p.as_str()).collect();
            for atom in port_atoms {
                if !ports.contains(atom.literal.as_str()) {
                    issues.add(
                        Diagnostic::error(
                            codes::IR_UNKNOWN_PORT,
                            format!(
                                "instance `{}` in module `{}` has no port `{}`",
                                owner_name,
                                module.name(),
                                atom.literal
                            ),
                        )
                        .with_source("atomize"),
                    );
                }
            }
        }
        ChildRef::Device(device_id) => {
            let Some(device) = program.device(device_id) else {
                return;
            };
            // Portless devices are opaque to the port check.
            if device.ports.is_empty() {
                return;
            }
            for atom in port_atoms {
                if !device.ports.iter().any(|p| p == &atom.literal) {
                    issues.add(
                        Diagnostic::error(
                            codes::IR_UNKNOWN_PORT,
                            format!(
                                "device instance `{}` in module `{}` has no port `{}`",
                                owner_name,
                                module.name(),
                                atom.literal
                            ),
                        )
                        .with_source("atomize"),
                    );
                }
            }
        }
    }
}

/// Projects an atomized program into the frozen NetlistIR design.
pub fn project(program: &Program) -> (Option<NetlistDesign>, DiagnosticSet) {
    let _guard = span!(Level::INFO, "projecting NetlistIR").entered();
    let issues = DiagnosticSet::new();

    let devices = program
        .devices()
        .map(|(_, device)| NetlistDevice {
            name: device.name().clone(),
            file_id: device.file().clone(),
            ports: device.ports.clone(),
            parameters: device.parameters.clone(),
            variables: device.variables.clone(),
            backends: device.backends.clone(),
        })
        .collect();

    let mut modules = Vec::new();
    for (_, module) in program.modules() {
        let ports = module
            .ports()
            .iter()
            .filter_map(|id| module.net(*id))
            .map(|net| net.name().clone())
            .collect();
        let nets: Vec<ArcStr> = module.nets().map(|(_, net)| net.name().clone()).collect();

        let mut instances = Vec::new();
        for (inst_id, inst) in module.instances() {
            let child = match inst.child() {
                ChildRef::Module(_) => ChildKind::Module,
                ChildRef::Device(_) => ChildKind::Device,
            };
            let Some(symbol) = program.symbol_ref(inst.child()) else {
                continue;
            };
            // Invert net regions into this instance's named conns.
            let mut conns = Vec::new();
            for (_, net) in module.nets() {
                for endpoint in net.endpoints() {
                    if endpoint.inst() == inst_id {
                        conns.push(NetlistConn {
                            port: endpoint.port_path().clone(),
                            net: net.name().clone(),
                        });
                    }
                }
            }
            instances.push(NetlistInstance {
                name: inst.name().clone(),
                child: NetlistRef {
                    kind: child,
                    name: symbol.name,
                    file: symbol.file,
                },
                params: inst.props().clone(),
                conns,
            });
        }

        let table: IndexMap<u64, ArcStr> = module
            .exprs
            .iter()
            .map(|(id, text)| (u64::from(id), text.clone()))
            .collect();
        modules.push(NetlistModule {
            name: module.name().clone(),
            file_id: module.file().clone(),
            ports,
            nets,
            instances,
            pattern_expression_table: (!table.is_empty()).then_some(table),
        });
    }

    let design = NetlistDesign {
        modules,
        devices,
        top: program.top_name.clone(),
        entry_file_id: program.files.first().cloned(),
    };
    (Some(design), issues)
}

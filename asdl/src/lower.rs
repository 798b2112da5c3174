//! AST to GraphIR lowering.
//!
//! Walks the program database in discovery order and materializes the
//! semantic hypergraph: declarations first (so cross-file references
//! resolve regardless of file order), then per-module contents. Failing
//! entities are skipped with a diagnostic; their peers keep lowering.

use std::collections::HashMap;

use arcstr::ArcStr;
use diagnostics::{codes, Diagnostic, DiagnosticSet, Span};
use graphir::{ChildRef, InstanceId, ModuleId, NetId, PatternOrigin, Program};
use indexmap::{IndexMap, IndexSet};
use pattern::{Expression, NamedPattern, PatternEnv};
use tracing::{span, Level};

use crate::ast::{DeviceDecl, ModuleDecl, Str};
use crate::imports::{LoadedFile, ProgramDb};

/// Lowers every loaded document into one GraphIR program.
pub fn lower(db: &ProgramDb) -> (Option<Program>, DiagnosticSet) {
    let _guard = span!(Level::INFO, "lowering AST to GraphIR").entered();
    let mut issues = DiagnosticSet::new();
    let mut program = Program::new();

    // Declarations first: modules and devices from every file, so that
    // instance references resolve independent of file order.
    for (file_id, file) in &db.files {
        program.add_file(file_id.clone());
        for (name, decl) in &file.document.devices {
            declare_device(&mut program, file, name, decl, &mut issues);
        }
        for (symbol, decl) in &file.document.modules {
            declare_module(&mut program, file, symbol, decl, &mut issues);
        }
    }

    // Contents second.
    for (file_id, file) in &db.files {
        let mut used_namespaces: IndexSet<ArcStr> = IndexSet::new();
        for (symbol, decl) in &file.document.modules {
            if let Some(module_id) = program.module_by_ref(file_id, symbol) {
                lower_module(
                    &mut program,
                    file,
                    module_id,
                    decl,
                    &mut used_namespaces,
                    &mut issues,
                );
            }
        }
        for (ns, import) in &file.document.imports {
            if !used_namespaces.contains(ns) {
                issues.add(
                    Diagnostic::warning(
                        codes::LINT_UNUSED_IMPORT,
                        format!("namespace `{}` is imported but never referenced", ns),
                    )
                    .with_span(import.span.clone())
                    .with_source("lower"),
                );
            }
        }
    }

    // Entry selection for ordering purposes. The emitter re-checks the
    // strict top policy.
    let entry_doc = &db.entry_file().document;
    if let Some(top) = &entry_doc.top {
        program.top_name = Some(top.text.clone());
        program.entry = program.module_by_ref(&db.entry, &top.text);
    } else if entry_doc.modules.len() == 1 {
        let symbol = entry_doc.modules.keys().next().unwrap();
        program.entry = program.module_by_ref(&db.entry, symbol);
    }

    (Some(program), issues)
}

fn declare_device(
    program: &mut Program,
    file: &LoadedFile,
    name: &ArcStr,
    decl: &DeviceDecl,
    issues: &mut DiagnosticSet,
) {
    if program.module_by_ref(&file.file_id, name).is_some()
        || program.device_by_ref(&file.file_id, name).is_some()
    {
        issues.add(
            Diagnostic::error(
                codes::PARSE_DUPLICATE_KEY,
                format!("symbol `{}` is declared more than once", name),
            )
            .with_span(decl.span.clone())
            .with_source("lower"),
        );
        return;
    }

    let mut ports = Vec::with_capacity(decl.ports.len());
    for port in &decl.ports {
        // Pattern syntax is forbidden in device port names.
        if !pattern::is_valid_name(&port.text) {
            issues.add(
                Diagnostic::error(
                    codes::IR_BAD_NAME,
                    format!(
                        "port `{}` of device `{}` is not a valid literal name",
                        port.text, name
                    ),
                )
                .with_span(port.span.clone())
                .with_source("lower"),
            );
            continue;
        }
        ports.push(port.text.clone());
    }

    let backends = decl
        .backends
        .iter()
        .map(|(backend, b)| {
            (
                backend.clone(),
                graphir::DeviceBackend {
                    template: b.template.text.clone(),
                    parameters: to_text_map(&b.parameters),
                    variables: to_text_map(&b.variables),
                    props: to_text_map(&b.props),
                },
            )
        })
        .collect();

    program.create_device(
        name.clone(),
        file.file_id.clone(),
        ports,
        to_text_map(&decl.parameters),
        to_text_map(&decl.variables),
        backends,
    );
}

fn declare_module(
    program: &mut Program,
    file: &LoadedFile,
    symbol: &ArcStr,
    decl: &ModuleDecl,
    issues: &mut DiagnosticSet,
) {
    if program.module_by_ref(&file.file_id, symbol).is_some()
        || program.device_by_ref(&file.file_id, symbol).is_some()
    {
        issues.add(
            Diagnostic::error(
                codes::PARSE_DUPLICATE_KEY,
                format!("symbol `{}` is declared more than once", symbol),
            )
            .with_span(decl.span.clone())
            .with_source("lower"),
        );
        return;
    }

    let id = program.create_module(symbol.clone(), file.file_id.clone());
    let env: PatternEnv = decl
        .patterns
        .iter()
        .map(|(name, p)| {
            (
                name.clone(),
                NamedPattern {
                    expr: p.expr.text.clone(),
                    tag: p.tag.as_ref().map(|t| t.text.clone()),
                },
            )
        })
        .collect();
    if let Err(err) = pattern::validate_env(&env) {
        issues.add(
            Diagnostic::error(err.code(), err.to_string())
                .with_span(decl.span.clone())
                .with_source("lower"),
        );
    }

    let module = program.module_mut(id).expect("just created");
    module.patterns = env;
    module.parameters = to_text_map(&decl.parameters);
    module.variables = to_text_map(&decl.variables);
}

fn to_text_map(map: &IndexMap<ArcStr, Str>) -> IndexMap<ArcStr, ArcStr> {
    map.iter()
        .map(|(k, v)| (k.clone(), v.text.clone()))
        .collect()
}

/// Per-instance bookkeeping kept while lowering one module.
struct InstInfo {
    id: InstanceId,
    atoms: Vec<ArcStr>,
}

fn lower_module(
    program: &mut Program,
    file: &LoadedFile,
    module_id: ModuleId,
    decl: &ModuleDecl,
    used_namespaces: &mut IndexSet<ArcStr>,
    issues: &mut DiagnosticSet,
) {
    let _guard = span!(
        Level::INFO,
        "lowering module",
        module = %decl.name,
        file = %file.file_id,
    )
    .entered();

    let env = program
        .module(module_id)
        .expect("declared in pass 1")
        .patterns
        .clone();
    let variables = to_text_map(&decl.variables);

    // Instances.
    let mut instances: IndexMap<ArcStr, InstInfo> = IndexMap::new();
    let mut atom_owner: HashMap<ArcStr, InstanceId> = HashMap::new();
    for (name, inst) in &decl.instances {
        let expression = match Expression::parse(name.clone(), &env) {
            Ok(e) => e,
            Err(err) => {
                issues.add(
                    Diagnostic::error(err.code(), err.to_string())
                        .with_span(inst.span.clone())
                        .with_source("lower"),
                );
                continue;
            }
        };
        let atoms = match expression.expand() {
            Ok(atoms) => atoms,
            Err(err) => {
                issues.add(
                    Diagnostic::error(err.code(), err.to_string())
                        .with_span(inst.span.clone())
                        .with_source("lower"),
                );
                continue;
            }
        };

        if let Some(dup) = pattern::duplicates(&atoms) {
            issues.add(
                Diagnostic::error(
                    codes::PASS_DUPLICATE_ATOM,
                    format!("instance `{}` expands `{}` more than once", name, dup.literal),
                )
                .with_span(inst.span.clone())
                .with_source("lower"),
            );
            continue;
        }

        let Some((child, ref_text)) =
            resolve_ref(program, file, &inst.expr, used_namespaces, issues)
        else {
            continue;
        };

        let props = match parse_instance_params(&inst.expr, &variables, issues) {
            Some(props) => props,
            None => continue,
        };

        let origin = entity_origin(program, module_id, name, &expression);
        let id = program.add_instance(
            module_id,
            name.clone(),
            child,
            ref_text.clone(),
            props,
            origin,
        );

        let mut literals = Vec::with_capacity(atoms.len());
        for atom in &atoms {
            if atom_owner.insert(atom.literal.clone(), id).is_some() {
                issues.add(
                    Diagnostic::error(
                        codes::IR_LITERAL_COLLISION,
                        format!(
                            "instance expansions collide on literal `{}`",
                            atom.literal
                        ),
                    )
                    .with_span(inst.span.clone())
                    .with_source("lower"),
                );
            }
            literals.push(atom.literal.clone());
        }
        instances.insert(name.clone(), InstInfo { id, atoms: literals });
    }

    // Nets, in source order. Port nets join the port order immediately.
    let mut nets_by_name: IndexMap<ArcStr, NetId> = IndexMap::new();
    for (raw_name, net) in &decl.nets {
        let (stripped, is_port) = match raw_name.strip_prefix('$') {
            Some(stripped) => (ArcStr::from(stripped), true),
            None => (raw_name.clone(), false),
        };
        if is_port && stripped.contains(';') {
            issues.add(
                Diagnostic::error(
                    codes::IR_BAD_NAME,
                    format!("port net `{}` may not contain `;`", raw_name),
                )
                .with_span(net.span.clone())
                .with_source("lower"),
            );
            continue;
        }
        let expression = match Expression::parse(stripped.clone(), &env) {
            Ok(e) => e,
            Err(err) => {
                issues.add(
                    Diagnostic::error(err.code(), err.to_string())
                        .with_span(net.span.clone())
                        .with_source("lower"),
                );
                continue;
            }
        };
        let origin = entity_origin(program, module_id, &stripped, &expression);
        let id = program.add_net(module_id, stripped.clone(), is_port, origin);
        if is_port {
            program.add_port(module_id, id);
        }
        nets_by_name.insert(stripped, id);
    }

    // Endpoints. Explicit bindings are recorded for the defaults pass:
    // (instance, port atom) -> (`!` prefix seen, token span).
    let mut explicit: HashMap<(InstanceId, ArcStr), (bool, Span)> = HashMap::new();
    for (raw_name, net) in &decl.nets {
        let stripped = raw_name.strip_prefix('$').unwrap_or(raw_name);
        let Some(&net_id) = nets_by_name.get(stripped) else {
            continue;
        };
        for token in &net.endpoints {
            lower_endpoint_token(
                program,
                module_id,
                net_id,
                token,
                &env,
                &instances,
                &atom_owner,
                &mut explicit,
                issues,
            );
        }
    }

    // Instance defaults, keyed by reference. Explicit bindings win; the
    // override is reported unless the endpoint was `!`-prefixed.
    for (ref_key, defaults) in &decl.instance_defaults {
        for info in instances.values() {
            let matches = program
                .module(module_id)
                .and_then(|m| m.instance(info.id))
                .map(|i| i.ref_raw() == ref_key)
                .unwrap_or(false);
            if !matches {
                continue;
            }
            for (pin, target) in &defaults.bindings {
                if !pattern::is_valid_name(pin) {
                    issues.add(
                        Diagnostic::error(
                            codes::IR_BAD_NAME,
                            format!("default pin `{}` is not a valid literal name", pin),
                        )
                        .with_span(defaults.span.clone())
                        .with_source("lower"),
                    );
                    continue;
                }
                if let Some((bang, span)) = explicit.get(&(info.id, pin.clone())) {
                    if !bang {
                        issues.add(
                            Diagnostic::warning(
                                codes::LINT_DEFAULT_OVERRIDE,
                                format!(
                                    "explicit binding of `{}` overrides an instance default",
                                    pin
                                ),
                            )
                            .with_span(span.clone())
                            .with_note("prefix the endpoint with `!` to silence this warning")
                            .with_source("lower"),
                        );
                    }
                    continue;
                }

                let (net_name, is_port) = match target.text.strip_prefix('$') {
                    Some(stripped) => (ArcStr::from(stripped), true),
                    None => (target.text.clone(), false),
                };
                let net_id = match nets_by_name.get(&net_name) {
                    Some(&id) => id,
                    None => {
                        // Defaults-introduced nets append after the
                        // source-order ports.
                        let id = program.add_net(module_id, net_name.clone(), is_port, None);
                        if is_port {
                            program.add_port(module_id, id);
                        }
                        nets_by_name.insert(net_name.clone(), id);
                        id
                    }
                };
                program.attach_endpoint(module_id, net_id, info.id, pin.clone(), None);
            }
        }
    }
}

/// Parses `<ref> [k=v ...]`, resolves the reference, and marks the
/// namespace used.
fn resolve_ref(
    program: &Program,
    file: &LoadedFile,
    expr: &Str,
    used_namespaces: &mut IndexSet<ArcStr>,
    issues: &mut DiagnosticSet,
) -> Option<(ChildRef, ArcStr)> {
    let mut parts = expr.text.split_whitespace();
    let Some(ref_text) = parts.next() else {
        issues.add(
            Diagnostic::error(
                codes::IR_UNRESOLVED_SYMBOL,
                "instance expression is missing a model reference",
            )
            .with_span(expr.span.clone())
            .with_source("lower"),
        );
        return None;
    };

    // Pattern syntax is forbidden in model references.
    if !pattern::is_literal(ref_text) {
        issues.add(
            Diagnostic::error(
                codes::IR_BAD_NAME,
                format!("model reference `{}` may not contain pattern syntax", ref_text),
            )
            .with_span(expr.span.clone())
            .with_source("lower"),
        );
        return None;
    }

    let (target_file, symbol) = match ref_text.split_once('.') {
        Some((ns, symbol)) => {
            let Some(target) = file.name_env.get(ns) else {
                issues.add(
                    Diagnostic::error(
                        codes::IR_UNRESOLVED_NAMESPACE,
                        format!("namespace `{}` is not imported by this file", ns),
                    )
                    .with_span(expr.span.clone())
                    .with_source("lower"),
                );
                return None;
            };
            used_namespaces.insert(ArcStr::from(ns));
            (target.clone(), symbol)
        }
        // Unqualified references resolve only within the defining file.
        None => (file.file_id.clone(), ref_text),
    };

    let child = program
        .module_by_ref(&target_file, symbol)
        .map(ChildRef::Module)
        .or_else(|| program.device_by_ref(&target_file, symbol).map(ChildRef::Device));
    match child {
        Some(child) => Some((child, ArcStr::from(ref_text))),
        None => {
            issues.add(
                Diagnostic::error(
                    codes::IR_UNRESOLVED_SYMBOL,
                    format!("`{}` does not name a module or device", ref_text),
                )
                .with_span(expr.span.clone())
                .with_source("lower"),
            );
            None
        }
    }
}

/// Parses the `k=v` tail of an instance expression, substituting
/// `{variable}` references from the enclosing module.
fn parse_instance_params(
    expr: &Str,
    variables: &IndexMap<ArcStr, ArcStr>,
    issues: &mut DiagnosticSet,
) -> Option<IndexMap<ArcStr, ArcStr>> {
    let mut props = IndexMap::new();
    let mut ok = true;
    for pair in expr.text.split_whitespace().skip(1) {
        let Some((key, value)) = pair.split_once('=') else {
            issues.add(
                Diagnostic::error(
                    codes::IR_BAD_NAME,
                    format!("malformed instance parameter `{}`; expected `key=value`", pair),
                )
                .with_span(expr.span.clone())
                .with_source("lower"),
            );
            ok = false;
            continue;
        };
        match substitute_vars(value, variables) {
            Ok(value) => {
                props.insert(ArcStr::from(key), ArcStr::from(value));
            }
            Err(err) => {
                issues.add(
                    Diagnostic::error(err.code(), err.to_string())
                        .with_span(expr.span.clone())
                        .with_source("lower"),
                );
                ok = false;
            }
        }
    }
    ok.then_some(props)
}

/// An error substituting `{variable}` references.
#[derive(Debug, thiserror::Error)]
pub enum VarError {
    /// The named variable is not defined.
    #[error("variable `{0}` is not defined")]
    Undefined(ArcStr),
    /// Substitution never reaches a fixed point.
    #[error("variable `{0}` is defined in terms of itself")]
    Recursive(ArcStr),
}

impl VarError {
    /// The stable diagnostic code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Undefined(_) => codes::IR_UNDEFINED_VARIABLE,
            Self::Recursive(_) => codes::IR_RECURSIVE_VARIABLE,
        }
    }
}

/// Substitutes `{name}` references until none remain.
pub fn substitute_vars(
    value: &str,
    variables: &IndexMap<ArcStr, ArcStr>,
) -> Result<String, VarError> {
    let mut current = value.to_string();
    for _ in 0..64 {
        let Some(open) = current.find('{') else {
            return Ok(current);
        };
        let Some(close) = current[open..].find('}') else {
            // An unmatched `{` is opaque value text.
            return Ok(current);
        };
        let name = &current[open + 1..open + close];
        let Some(replacement) = variables.get(name) else {
            return Err(VarError::Undefined(ArcStr::from(name)));
        };
        let mut next =
            String::with_capacity(current.len() + replacement.len());
        next.push_str(&current[..open]);
        next.push_str(replacement);
        next.push_str(&current[open + close + 1..]);
        current = next;
    }
    // Still substituting after the depth bound: a cycle.
    let name = value
        .find('{')
        .map(|open| {
            let rest = &value[open + 1..];
            rest[..rest.find('}').unwrap_or(rest.len())].to_string()
        })
        .unwrap_or_default();
    Err(VarError::Recursive(ArcStr::from(name)))
}

/// Interns the expression and builds an entity-level origin when the name
/// contains pattern syntax.
fn entity_origin(
    program: &mut Program,
    module_id: ModuleId,
    name: &ArcStr,
    expression: &Expression,
) -> Option<PatternOrigin> {
    if !expression.has_groups() {
        return None;
    }
    let base_name = expression
        .expand()
        .ok()
        .and_then(|atoms| atoms.first().map(|a| a.base_name.clone()))
        .unwrap_or_default();
    let module = program.module_mut(module_id).expect("module exists");
    let expr = module.exprs.intern(name.clone());
    Some(PatternOrigin {
        expr,
        segment: 0,
        base_name,
        parts: Vec::new(),
    })
}

/// Splits `text` at top-level occurrences of `sep` (outside `<...>`).
fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, ch) in text.char_indices() {
        match ch {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            c if c == sep && depth == 0 => {
                out.push(&text[start..i]);
                start = i + ch.len_utf8();
            }
            _ => (),
        }
    }
    out.push(&text[start..]);
    out
}

/// Lowers one raw endpoint token, creating endpoints under `net_id`.
#[allow(clippy::too_many_arguments)]
fn lower_endpoint_token(
    program: &mut Program,
    module_id: ModuleId,
    net_id: NetId,
    token: &Str,
    env: &PatternEnv,
    instances: &IndexMap<ArcStr, InstInfo>,
    atom_owner: &HashMap<ArcStr, InstanceId>,
    explicit: &mut HashMap<(InstanceId, ArcStr), (bool, Span)>,
    issues: &mut DiagnosticSet,
) {
    let (bang, text) = match token.text.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, &*token.text),
    };
    let patterned = !pattern::is_literal(text);

    for piece in split_top_level(text, ';') {
        let dots = split_top_level(piece, '.');
        match dots.as_slice() {
            [inst_txt, port_txt] => lower_endpoint_piece(
                program, module_id, net_id, token, bang, patterned, inst_txt, port_txt, env,
                instances, atom_owner, explicit, issues,
            ),
            _ => {
                // The `.` lives inside a group. Expand the whole piece
                // and split each atom.
                let atoms = match pattern::expand_str(piece, env) {
                    Ok(atoms) => atoms,
                    Err(err) => {
                        issues.add(
                            Diagnostic::error(err.code(), err.to_string())
                                .with_span(token.span.clone())
                                .with_source("lower"),
                        );
                        continue;
                    }
                };
                for atom in atoms {
                    let mut split = atom.literal.splitn(3, '.');
                    match (split.next(), split.next(), split.next()) {
                        (Some(inst_literal), Some(port_literal), None) => {
                            lower_endpoint_piece(
                                program,
                                module_id,
                                net_id,
                                token,
                                bang,
                                patterned,
                                inst_literal,
                                port_literal,
                                env,
                                instances,
                                atom_owner,
                                explicit,
                                issues,
                            );
                        }
                        _ => {
                            issues.add(
                                Diagnostic::error(
                                    codes::IR_BAD_ENDPOINT,
                                    format!(
                                        "endpoint atom `{}` must contain exactly one `.`",
                                        atom.literal
                                    ),
                                )
                                .with_span(token.span.clone())
                                .with_source("lower"),
                            );
                        }
                    }
                }
            }
        }
    }
}

/// Lowers one `inst.port` piece with a top-level dot.
#[allow(clippy::too_many_arguments)]
fn lower_endpoint_piece(
    program: &mut Program,
    module_id: ModuleId,
    net_id: NetId,
    token: &Str,
    bang: bool,
    patterned: bool,
    inst_txt: &str,
    port_txt: &str,
    env: &PatternEnv,
    instances: &IndexMap<ArcStr, InstInfo>,
    atom_owner: &HashMap<ArcStr, InstanceId>,
    explicit: &mut HashMap<(InstanceId, ArcStr), (bool, Span)>,
    issues: &mut DiagnosticSet,
) {
    // Fast path: the instance side is spelled exactly like a declared
    // instance.
    let targets: Vec<InstanceId> = if let Some(info) = instances.get(inst_txt) {
        vec![info.id]
    } else {
        let inst_atoms = match pattern::expand_str(inst_txt, env) {
            Ok(atoms) => atoms,
            Err(err) => {
                issues.add(
                    Diagnostic::error(err.code(), err.to_string())
                        .with_span(token.span.clone())
                        .with_source("lower"),
                );
                return;
            }
        };
        // Group the atoms by owning instance; each owner must be covered
        // in full, in its own expansion order.
        let mut owners: Vec<InstanceId> = Vec::new();
        for atom in &inst_atoms {
            match atom_owner.get(&atom.literal) {
                Some(&owner) => {
                    if owners.last() != Some(&owner) {
                        owners.push(owner);
                    }
                }
                None => {
                    issues.add(
                        Diagnostic::error(
                            codes::IR_UNKNOWN_INSTANCE,
                            format!("`{}` does not name a declared instance", atom.literal),
                        )
                        .with_span(token.span.clone())
                        .with_source("lower"),
                    );
                    return;
                }
            }
        }
        let mut cursor = inst_atoms.iter().map(|a| &a.literal);
        for owner in &owners {
            let info = instances
                .values()
                .find(|i| i.id == *owner)
                .expect("owner recorded from this map");
            for expected in &info.atoms {
                match cursor.next() {
                    Some(actual) if actual == expected => (),
                    _ => {
                        issues.add(
                            Diagnostic::error(
                                codes::IR_UNKNOWN_INSTANCE,
                                format!(
                                    "endpoint `{}` must address whole instances in expansion order",
                                    inst_txt
                                ),
                            )
                            .with_span(token.span.clone())
                            .with_source("lower"),
                        );
                        return;
                    }
                }
            }
        }
        owners
    };

    // Record explicit pin bindings for the defaults pass.
    let port_atoms = match pattern::expand_str(port_txt, env) {
        Ok(atoms) => atoms,
        Err(err) => {
            issues.add(
                Diagnostic::error(err.code(), err.to_string())
                    .with_span(token.span.clone())
                    .with_source("lower"),
            );
            return;
        }
    };

    for inst_id in targets {
        for atom in &port_atoms {
            explicit
                .entry((inst_id, atom.literal.clone()))
                .or_insert((bang, token.span.clone()));
        }
        let origin = if patterned {
            let module = program.module_mut(module_id).expect("module exists");
            let expr = module.exprs.intern(token.text.clone());
            Some(PatternOrigin {
                expr,
                segment: 0,
                base_name: ArcStr::new(),
                parts: Vec::new(),
            })
        } else {
            None
        };
        program.attach_endpoint(module_id, net_id, inst_id, port_txt, origin);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> IndexMap<ArcStr, ArcStr> {
        pairs
            .iter()
            .map(|(k, v)| (ArcStr::from(*k), ArcStr::from(*v)))
            .collect()
    }

    #[test]
    fn variables_substitute() {
        let vars = vars(&[("w", "2u"), ("len", "{base}*2"), ("base", "0.15u")]);
        assert_eq!(substitute_vars("{w}", &vars).unwrap(), "2u");
        assert_eq!(substitute_vars("{len}", &vars).unwrap(), "0.15u*2");
        assert_eq!(substitute_vars("plain", &vars).unwrap(), "plain");
    }

    #[test]
    fn undefined_variable() {
        let err = substitute_vars("{nope}", &vars(&[])).unwrap_err();
        assert_eq!(err.code(), codes::IR_UNDEFINED_VARIABLE);
    }

    #[test]
    fn recursive_variable() {
        let vars = vars(&[("a", "{b}"), ("b", "{a}")]);
        let err = substitute_vars("{a}", &vars).unwrap_err();
        assert_eq!(err.code(), codes::IR_RECURSIVE_VARIABLE);
    }

    #[test]
    fn unmatched_brace_is_opaque() {
        assert_eq!(substitute_vars("a{b", &vars(&[])).unwrap(), "a{b");
    }

    #[test]
    fn top_level_split_respects_groups() {
        assert_eq!(split_top_level("a.b", '.'), ["a", "b"]);
        assert_eq!(split_top_level("x<1.5|2.5>.p", '.'), ["x<1.5|2.5>", "p"]);
        assert_eq!(split_top_level("a.b;c.d", ';'), ["a.b", "c.d"]);
        assert_eq!(split_top_level("plain", '.'), ["plain"]);
    }
}

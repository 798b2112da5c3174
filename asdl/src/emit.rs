//! Template-driven netlist emission.
//!
//! Emission renders a [`NetlistDesign`] into backend netlist text using
//! the backend's system templates for structure (subcircuit headers,
//! footers, calls, netlist pre- and postamble) and each device's
//! per-backend template for primitive lines. Templates are parsed into
//! literal/placeholder element lists and substituted at write time.

use std::collections::{HashMap, HashSet};
use std::env;

use arcstr::ArcStr;
use diagnostics::{codes, Diagnostic, DiagnosticSet, FileId};
use indexmap::IndexMap;
use itertools::Itertools;
use netlistir::{ChildKind, NetlistDesign, NetlistInstance, NetlistModule};
use sha2::{Digest, Sha256};
use tracing::{span, Level};

use crate::backend::{
    Backend, NETLIST_FOOTER, NETLIST_HEADER, SUBCKT_CALL, SUBCKT_FOOTER, SUBCKT_HEADER,
};

/// Emission options.
#[derive(Clone, Debug, Default)]
pub struct EmitOptions {
    /// Wrap the top module in a subcircuit as well.
    pub top_as_subckt: bool,
    /// Emit every module instead of the entry's reachable set.
    pub library_mode: bool,
}

/// First 8 hex digits of the SHA-256 digest of a file identity.
fn hash8(file: &FileId) -> String {
    let digest = Sha256::digest(file.as_str().as_bytes());
    let mut out = String::with_capacity(8);
    for byte in digest.iter().take(4) {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

/// The emission base name for a module symbol. Views fold into the name.
fn emit_base(symbol: &str) -> String {
    symbol.replace('@', "_")
}

/// Unique emission names keyed by module identity.
///
/// A module whose base name is free keeps it; a collision appends
/// `__{hash8(file_id)}`.
#[derive(Debug, Default)]
struct EmitNames {
    names: HashSet<ArcStr>,
    assignments: HashMap<(FileId, ArcStr), ArcStr>,
}

impl EmitNames {
    /// Assigns a unique emission name. Returns the name and whether the
    /// module was renamed away from its base.
    fn assign(&mut self, file: &FileId, symbol: &ArcStr) -> (ArcStr, bool) {
        let key = (file.clone(), symbol.clone());
        if let Some(name) = self.assignments.get(&key) {
            return (name.clone(), false);
        }
        let base = ArcStr::from(emit_base(symbol));
        let (name, renamed) = if self.names.insert(base.clone()) {
            (base, false)
        } else {
            let mut candidate = arcstr::format!("{}__{}", base, hash8(file));
            let mut salt = 1;
            while !self.names.insert(candidate.clone()) {
                candidate = arcstr::format!("{}__{}_{}", base, hash8(file), salt);
                salt += 1;
            }
            (candidate, true)
        };
        self.assignments.insert(key, name.clone());
        (name, renamed)
    }

    fn get(&self, file: &FileId, symbol: &ArcStr) -> Option<&ArcStr> {
        self.assignments.get(&(file.clone(), symbol.clone()))
    }
}

/// A parsed template element.
#[derive(Clone, Debug)]
enum TemplateElem {
    Literal(String),
    /// `{name}`.
    Placeholder(String),
    /// `${NAME}`, resolved from the process environment at render time.
    Env(String),
}

#[derive(Debug, thiserror::Error)]
enum TemplateError {
    #[error("unclosed `{{` at offset {0}")]
    Unclosed(usize),
    #[error("empty placeholder at offset {0}")]
    Empty(usize),
}

fn parse_template(text: &str) -> Result<Vec<TemplateElem>, TemplateError> {
    let mut elems = Vec::new();
    let mut literal = String::new();
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let rest = &text[i..];
        if let Some(tail) = rest.strip_prefix("${") {
            let Some(close) = tail.find('}') else {
                return Err(TemplateError::Unclosed(i));
            };
            if close == 0 {
                return Err(TemplateError::Empty(i));
            }
            if !literal.is_empty() {
                elems.push(TemplateElem::Literal(std::mem::take(&mut literal)));
            }
            elems.push(TemplateElem::Env(tail[..close].to_string()));
            i += 2 + close + 1;
        } else if rest.starts_with('{') {
            let tail = &rest[1..];
            let Some(close) = tail.find('}') else {
                return Err(TemplateError::Unclosed(i));
            };
            if close == 0 {
                return Err(TemplateError::Empty(i));
            }
            let name = &tail[..close];
            if name.contains('{') {
                return Err(TemplateError::Unclosed(i));
            }
            if !literal.is_empty() {
                elems.push(TemplateElem::Literal(std::mem::take(&mut literal)));
            }
            elems.push(TemplateElem::Placeholder(name.to_string()));
            i += 1 + close + 1;
        } else {
            let ch = rest.chars().next().unwrap();
            literal.push(ch);
            i += ch.len_utf8();
        }
    }
    if !literal.is_empty() {
        elems.push(TemplateElem::Literal(literal));
    }
    Ok(elems)
}

#[derive(Debug, thiserror::Error)]
enum RenderError {
    #[error("unknown placeholder `{{{0}}}`")]
    Unknown(String),
    #[error("environment variable `{0}` is not set")]
    Env(String),
}

fn render(elems: &[TemplateElem], vars: &IndexMap<ArcStr, ArcStr>) -> Result<String, RenderError> {
    let mut out = String::new();
    for elem in elems {
        match elem {
            TemplateElem::Literal(text) => out.push_str(text),
            TemplateElem::Placeholder(name) => match vars.get(name.as_str()) {
                Some(value) => out.push_str(value),
                None => return Err(RenderError::Unknown(name.clone())),
            },
            TemplateElem::Env(name) => match env::var(name) {
                Ok(value) => out.push_str(&value),
                Err(_) => return Err(RenderError::Env(name.clone())),
            },
        }
    }
    Ok(out)
}

/// Collapses whitespace runs left behind by empty placeholders.
fn collapse_ws(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Selects the top module per the strict policy.
fn select_top<'a>(
    design: &'a NetlistDesign,
    issues: &mut DiagnosticSet,
) -> Option<&'a NetlistModule> {
    if let Some(top) = &design.top {
        let module = match &design.entry_file_id {
            Some(entry) => design.module(entry, top),
            None => design.modules.iter().find(|m| &m.name == top),
        };
        if module.is_none() {
            issues.add(
                Diagnostic::error(
                    codes::EMIT_NO_TOP,
                    format!("declared top `{}` does not resolve to a module", top),
                )
                .with_source("emit"),
            );
        }
        return module;
    }

    let entry_candidates: Vec<&NetlistModule> = match &design.entry_file_id {
        Some(entry) => design.modules_in(entry).collect(),
        None => Vec::new(),
    };
    let fallback = match entry_candidates.as_slice() {
        [only] => Some(*only),
        _ if design.modules.len() == 1 => design.modules.first(),
        _ => None,
    };
    match fallback {
        Some(module) => {
            issues.add(
                Diagnostic::info(
                    codes::EMIT_NO_TOP,
                    format!("no top specified; using `{}`", module.name),
                )
                .with_source("emit"),
            );
            Some(module)
        }
        None => {
            issues.add(
                Diagnostic::error(
                    codes::EMIT_NO_TOP,
                    "no top specified and no unique module to fall back to",
                )
                .with_help("declare `top:` in the entry file")
                .with_source("emit"),
            );
            None
        }
    }
}

/// Modules in emission order, as indices into `design.modules`.
fn emission_order(design: &NetlistDesign, top: &NetlistModule, library: bool) -> Vec<usize> {
    if library {
        // Entry file first, then resolution order; `design.modules` is
        // already in discovery order, with the top's file first.
        return (0..design.modules.len()).collect();
    }
    let index_of = |file: &FileId, name: &ArcStr| {
        design
            .modules
            .iter()
            .position(|m| &m.file_id == file && &m.name == name)
    };
    let mut order = Vec::new();
    let mut visited = HashSet::new();
    let Some(start) = index_of(&top.file_id, &top.name) else {
        return order;
    };
    let mut stack = vec![(start, false)];
    while let Some((idx, expanded)) = stack.pop() {
        if expanded {
            order.push(idx);
            continue;
        }
        if !visited.insert(idx) {
            continue;
        }
        stack.push((idx, true));
        // Children are pushed in reverse so they pop in region order.
        let children: Vec<usize> = design.modules[idx]
            .instances
            .iter()
            .filter(|inst| inst.child.kind == ChildKind::Module)
            .filter_map(|inst| index_of(&inst.child.file, &inst.child.name))
            .collect();
        for child in children.into_iter().rev() {
            if !visited.contains(&child) {
                stack.push((child, false));
            }
        }
    }
    order
}

/// Merges device parameters low to high: device defaults, backend
/// overrides, instance overrides. Overrides keep the original position;
/// instance keys the device does not declare warn and are dropped.
fn merge_device_params(
    device_params: &IndexMap<ArcStr, ArcStr>,
    backend_params: &IndexMap<ArcStr, ArcStr>,
    inst: &NetlistInstance,
    issues: &mut DiagnosticSet,
) -> IndexMap<ArcStr, ArcStr> {
    let mut merged = device_params.clone();
    for (key, value) in backend_params {
        merged.insert(key.clone(), value.clone());
    }
    for (key, value) in &inst.params {
        if merged.contains_key(key) {
            merged.insert(key.clone(), value.clone());
        } else {
            issues.add(
                Diagnostic::warning(
                    codes::EMIT_UNKNOWN_PARAM,
                    format!(
                        "instance `{}` sets `{}`, which device `{}` does not declare; ignored",
                        inst.name, key, inst.child.name
                    ),
                )
                .with_source("emit"),
            );
        }
    }
    merged
}

fn params_aggregate(params: &IndexMap<ArcStr, ArcStr>) -> ArcStr {
    ArcStr::from(
        params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .join(" "),
    )
}

struct Emitter<'a> {
    design: &'a NetlistDesign,
    backend_name: &'a str,
    backend: &'a Backend,
    names: EmitNames,
    issues: DiagnosticSet,
}

impl Emitter<'_> {
    fn system_template(&mut self, key: &str) -> Option<Vec<TemplateElem>> {
        let text = self.backend.templates.get(key)?;
        match parse_template(text) {
            Ok(elems) => Some(elems),
            Err(err) => {
                self.issues.add(
                    Diagnostic::error(
                        codes::EMIT_MALFORMED_TEMPLATE,
                        format!("malformed `{}` template: {}", key, err),
                    )
                    .with_source("emit"),
                );
                None
            }
        }
    }

    fn render_system(
        &mut self,
        key: &str,
        vars: &IndexMap<ArcStr, ArcStr>,
    ) -> Option<String> {
        let elems = self.system_template(key)?;
        match render(&elems, vars) {
            Ok(text) => Some(text),
            Err(err @ RenderError::Unknown(_)) => {
                self.issues.add(
                    Diagnostic::error(
                        codes::EMIT_UNKNOWN_SYSTEM_PLACEHOLDER,
                        format!("in `{}` template: {}", key, err),
                    )
                    .with_source("emit"),
                );
                None
            }
            Err(err @ RenderError::Env(_)) => {
                self.issues.add(
                    Diagnostic::error(
                        codes::EMIT_UNRESOLVED_ENV,
                        format!("in `{}` template: {}", key, err),
                    )
                    .with_source("emit"),
                );
                None
            }
        }
    }

    fn base_vars(&self) -> IndexMap<ArcStr, ArcStr> {
        let mut vars = IndexMap::new();
        vars.insert(
            ArcStr::from("comment_prefix"),
            self.backend.comment_prefix.clone(),
        );
        if let Some(entry) = &self.design.entry_file_id {
            vars.insert(ArcStr::from("file"), ArcStr::from(entry.as_str()));
        }
        vars
    }

    fn emit_module_instance(&mut self, inst: &NetlistInstance, out: &mut String) {
        let Some(child) = self.design.module(&inst.child.file, &inst.child.name) else {
            return;
        };
        let Some(child_emit) = self.names.get(&inst.child.file, &inst.child.name).cloned()
        else {
            return;
        };
        let ports = child
            .ports
            .iter()
            .filter_map(|port| inst.conn(port))
            .map(|net| net.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        let mut vars = self.base_vars();
        vars.insert(ArcStr::from("name"), inst.name.clone());
        vars.insert(ArcStr::from("ports"), ArcStr::from(ports));
        vars.insert(ArcStr::from("ref"), child_emit);
        for (key, value) in &inst.params {
            vars.insert(key.clone(), value.clone());
        }
        vars.insert(ArcStr::from("params"), params_aggregate(&inst.params));

        if let Some(line) = self.render_system(SUBCKT_CALL, &vars) {
            out.push_str(&line);
            out.push('\n');
        }
    }

    fn emit_device_instance(&mut self, inst: &NetlistInstance, out: &mut String) {
        let Some(device) = self.design.device(&inst.child.file, &inst.child.name) else {
            return;
        };
        let Some(entry) = device.backends.get(self.backend_name) else {
            self.issues.add(
                Diagnostic::error(
                    codes::EMIT_NO_DEVICE_BACKEND,
                    format!(
                        "device `{}` has no entry for backend `{}`",
                        device.name, self.backend_name
                    ),
                )
                .with_source("emit"),
            );
            return;
        };

        let merged =
            merge_device_params(&device.parameters, &entry.parameters, inst, &mut self.issues);

        let ports = device
            .ports
            .iter()
            .filter_map(|port| inst.conn(port))
            .map(|net| net.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        let mut vars = self.base_vars();
        vars.insert(ArcStr::from("name"), inst.name.clone());
        vars.insert(ArcStr::from("ref"), device.name.clone());
        // Variables and freeform props are placeholders, never part of
        // `{params}`.
        for (key, value) in device.variables.iter().chain(&entry.variables) {
            vars.insert(key.clone(), value.clone());
        }
        for (key, value) in &entry.props {
            vars.insert(key.clone(), value.clone());
        }
        for (key, value) in &merged {
            vars.insert(key.clone(), value.clone());
        }
        vars.insert(ArcStr::from("params"), params_aggregate(&merged));
        vars.insert(ArcStr::from("ports"), ArcStr::from(ports.clone()));

        let elems = match parse_template(&entry.template) {
            Ok(elems) => elems,
            Err(err) => {
                self.issues.add(
                    Diagnostic::error(
                        codes::EMIT_MALFORMED_TEMPLATE,
                        format!("malformed template of device `{}`: {}", device.name, err),
                    )
                    .with_source("emit"),
                );
                return;
            }
        };
        match render(&elems, &vars) {
            Ok(line) => {
                // Portless devices leave a hole where `{ports}` was.
                let line = if ports.is_empty() {
                    collapse_ws(&line)
                } else {
                    line
                };
                out.push_str(&line);
                out.push('\n');
            }
            Err(err @ RenderError::Unknown(_)) => {
                self.issues.add(
                    Diagnostic::error(
                        codes::EMIT_UNKNOWN_PLACEHOLDER,
                        format!("in template of device `{}`: {}", device.name, err),
                    )
                    .with_source("emit"),
                );
            }
            Err(err @ RenderError::Env(_)) => {
                self.issues.add(
                    Diagnostic::error(
                        codes::EMIT_UNRESOLVED_ENV,
                        format!("in template of device `{}`: {}", device.name, err),
                    )
                    .with_source("emit"),
                );
            }
        }
    }
}

/// Emits the design as netlist text.
pub fn emit(
    design: &NetlistDesign,
    backend_name: &str,
    backend: &Backend,
    opts: &EmitOptions,
) -> (Option<String>, DiagnosticSet) {
    let _guard = span!(Level::INFO, "emitting netlist", backend = backend_name).entered();
    let mut emitter = Emitter {
        design,
        backend_name,
        backend,
        names: EmitNames::default(),
        issues: DiagnosticSet::new(),
    };

    let Some(top) = select_top(design, &mut emitter.issues) else {
        return (None, emitter.issues);
    };
    let order = emission_order(design, top, opts.library_mode);

    // Assign emission names first so calls can reference any module.
    for &idx in &order {
        let module = &design.modules[idx];
        let (emitted, renamed) = emitter.names.assign(&module.file_id, &module.name);
        if renamed {
            emitter.issues.add(
                Diagnostic::warning(
                    codes::EMIT_COLLISION_RENAME,
                    format!(
                        "module `{}` from `{}` emitted as `{}`",
                        module.name, module.file_id, emitted
                    ),
                )
                .with_source("emit"),
            );
        }
    }

    let top_emit = emitter
        .names
        .get(&top.file_id, &top.name)
        .cloned()
        .unwrap_or_else(|| top.name.clone());

    let mut out = String::new();
    let mut header_vars = emitter.base_vars();
    header_vars.insert(ArcStr::from("name"), top_emit.clone());
    header_vars.insert(ArcStr::from("top"), top_emit.clone());
    if let Some(text) = emitter.render_system(NETLIST_HEADER, &header_vars) {
        out.push_str(&text);
        out.push('\n');
    }

    for &idx in &order {
        let module = &design.modules[idx];
        let is_top = module.file_id == top.file_id && module.name == top.name;
        let wrapper = !is_top || opts.top_as_subckt;
        let emit_name = emitter
            .names
            .get(&module.file_id, &module.name)
            .cloned()
            .unwrap_or_else(|| module.name.clone());

        out.push('\n');
        let mut vars = emitter.base_vars();
        vars.insert(ArcStr::from("name"), emit_name.clone());
        vars.insert(ArcStr::from("top"), top_emit.clone());
        vars.insert(ArcStr::from("ports"), ArcStr::from(module.ports.join(" ")));

        if wrapper {
            if let Some(text) = emitter.render_system(SUBCKT_HEADER, &vars) {
                out.push_str(&text);
                out.push('\n');
            }
        }
        for inst in &module.instances {
            match inst.child.kind {
                ChildKind::Module => emitter.emit_module_instance(inst, &mut out),
                ChildKind::Device => emitter.emit_device_instance(inst, &mut out),
            }
        }
        if wrapper {
            if let Some(text) = emitter.render_system(SUBCKT_FOOTER, &vars) {
                out.push_str(&text);
                out.push('\n');
            }
        }
    }

    out.push('\n');
    if let Some(text) = emitter.render_system(NETLIST_FOOTER, &header_vars) {
        out.push_str(&text);
        out.push('\n');
    }

    let issues = emitter.issues;
    if issues.has_error() {
        (None, issues)
    } else {
        (Some(out), issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash8_is_stable() {
        let a = hash8(&FileId::new("/designs/a.asdl"));
        assert_eq!(a.len(), 8);
        assert_eq!(a, hash8(&FileId::new("/designs/a.asdl")));
        assert_ne!(a, hash8(&FileId::new("/designs/b.asdl")));
    }

    #[test]
    fn names_collide_to_hash_suffix() {
        let mut names = EmitNames::default();
        let f1 = FileId::new("/a/cells.asdl");
        let f2 = FileId::new("/b/cells.asdl");
        let (n1, r1) = names.assign(&f1, &ArcStr::from("inv"));
        let (n2, r2) = names.assign(&f2, &ArcStr::from("inv"));
        assert_eq!(n1, "inv");
        assert!(!r1);
        assert!(r2);
        assert_eq!(n2, arcstr::format!("inv__{}", hash8(&f2)));
    }

    #[test]
    fn template_parsing() {
        let elems = parse_template("M{name} {ports} model L={L}").unwrap();
        assert_eq!(elems.len(), 6);
        assert!(matches!(&elems[1], TemplateElem::Placeholder(p) if p == "name"));

        assert!(parse_template("X{name").is_err());
        assert!(parse_template("{}").is_err());
    }

    #[test]
    fn env_placeholders() {
        let elems = parse_template("include ${ASDL_EMIT_TEST_VAR}/models").unwrap();
        std::env::set_var("ASDL_EMIT_TEST_VAR", "/pdk");
        let text = render(&elems, &IndexMap::new()).unwrap();
        assert_eq!(text, "include /pdk/models");

        let elems = parse_template("${ASDL_EMIT_TEST_UNSET}").unwrap();
        assert!(matches!(
            render(&elems, &IndexMap::new()),
            Err(RenderError::Env(_))
        ));
    }

    #[test]
    fn whitespace_collapses_for_portless_devices() {
        assert_eq!(collapse_ws("V1   dc 1.8"), "V1 dc 1.8");
    }
}

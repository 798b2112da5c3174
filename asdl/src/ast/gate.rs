//! The document shape gate.
//!
//! Checks that a raw YAML tree has the shape of an ASDL document and
//! builds the typed AST. Shape only: references stay unresolved, patterns
//! unexpanded, defaults unapplied.

use arcstr::ArcStr;
use diagnostics::{codes, Diagnostic, DiagnosticSet, FileId, Span};
use indexmap::IndexMap;
use tracing::{span, Level};

use super::model::*;
use super::raw::{RawKind, RawValue};

/// Validates the shape of `raw` and builds a [`Document`].
///
/// Returns `None` when the document is unusable (the root is not a
/// mapping, or neither `modules` nor `devices` is present); shape errors
/// in individual declarations skip that declaration and continue.
pub fn parse_document(file: &FileId, raw: &RawValue) -> (Option<Document>, DiagnosticSet) {
    let _guard = span!(Level::INFO, "shape gate", file = %file).entered();
    let mut issues = DiagnosticSet::new();

    let Some(entries) = raw.as_map() else {
        issues.add(
            Diagnostic::error(
                codes::PARSE_ROOT_NOT_MAPPING,
                format!("the document root must be a mapping, found a {}", raw.kind_name()),
            )
            .with_span(raw.span.clone())
            .with_source("ast"),
        );
        return (None, issues);
    };

    let mut top = None;
    let mut imports = IndexMap::new();
    let mut modules: IndexMap<ArcStr, ModuleDecl> = IndexMap::new();
    let mut devices: IndexMap<ArcStr, DeviceDecl> = IndexMap::new();
    let mut saw_modules = false;
    let mut saw_devices = false;

    for (key, value) in entries {
        let Some(key_text) = key.as_scalar() else {
            issues.add(bad_kind(key, "a scalar key", "ast"));
            continue;
        };
        match key_text.as_str() {
            "top" => match value.as_scalar() {
                Some(text) => top = Some(Str::new(text.clone(), value.span.clone())),
                None => issues.add(bad_kind(value, "a scalar `top` name", "ast")),
            },
            "imports" => parse_imports(value, &mut imports, &mut issues),
            "modules" => {
                saw_modules = true;
                parse_modules(value, &mut modules, &mut issues);
            }
            "devices" => {
                saw_devices = true;
                parse_devices(value, &mut devices, &mut issues);
            }
            _ => (),
        }
    }

    if !saw_modules && !saw_devices {
        issues.add(
            Diagnostic::error(
                codes::PARSE_MISSING_FIELD,
                "a document must declare at least one of `modules` and `devices`",
            )
            .with_span(raw.span.clone())
            .with_source("ast"),
        );
        return (None, issues);
    }

    if top.is_none() && modules.len() > 1 {
        issues.add(
            Diagnostic::error(
                codes::PARSE_MISSING_FIELD,
                "`top` is required when a document declares more than one module",
            )
            .with_span(raw.span.clone())
            .with_source("ast"),
        );
    }

    let document = Document {
        file: file.clone(),
        top,
        imports,
        modules,
        devices,
        span: raw.span.clone(),
    };
    (Some(document), issues)
}

fn bad_kind(value: &RawValue, expected: &str, source: &'static str) -> Diagnostic {
    Diagnostic::error(
        codes::PARSE_BAD_KIND,
        format!("expected {}, found a {}", expected, value.kind_name()),
    )
    .with_span(value.span.clone())
    .with_source(source)
}

fn duplicate_key(name: &ArcStr, span: &Span) -> Diagnostic {
    Diagnostic::error(
        codes::PARSE_DUPLICATE_KEY,
        format!("duplicate key `{}`", name),
    )
    .with_span(span.clone())
    .with_source("ast")
}

/// Walks a mapping of scalar keys, reporting non-scalar keys.
fn scalar_entries<'a>(
    value: &'a RawValue,
    what: &str,
    issues: &mut DiagnosticSet,
) -> Vec<(&'a ArcStr, &'a RawValue, Span)> {
    let mut out = Vec::new();
    let Some(entries) = value.as_map() else {
        if !value.is_null() {
            issues.add(bad_kind(value, what, "ast"));
        }
        return out;
    };
    for (key, entry) in entries {
        match key.as_scalar() {
            Some(text) => out.push((text, entry, key.span.clone())),
            None => issues.add(bad_kind(key, "a scalar key", "ast")),
        }
    }
    out
}

fn parse_scalar_map(
    value: &RawValue,
    what: &str,
    issues: &mut DiagnosticSet,
) -> IndexMap<ArcStr, Str> {
    let mut out = IndexMap::new();
    for (name, entry, key_span) in scalar_entries(value, what, issues) {
        let Some(text) = entry.as_scalar() else {
            issues.add(bad_kind(entry, "a scalar value", "ast"));
            continue;
        };
        if out
            .insert(name.clone(), Str::new(text.clone(), entry.span.clone()))
            .is_some()
        {
            issues.add(duplicate_key(name, &key_span));
        }
    }
    out
}

fn parse_imports(
    value: &RawValue,
    imports: &mut IndexMap<ArcStr, ImportDecl>,
    issues: &mut DiagnosticSet,
) {
    for (ns, entry, key_span) in scalar_entries(value, "an `imports` mapping", issues) {
        let Some(path) = entry.as_scalar() else {
            issues.add(bad_kind(entry, "a scalar import path", "ast"));
            continue;
        };
        let decl = ImportDecl {
            span: key_span.clone(),
            path: Str::new(path.clone(), entry.span.clone()),
        };
        if imports.insert(ns.clone(), decl).is_some() {
            issues.add(duplicate_key(ns, &key_span));
        }
    }
}

/// Splits a module symbol key into `cell` and optional `view`.
fn parse_symbol_key(name: &ArcStr, span: &Span, issues: &mut DiagnosticSet) -> Option<(ArcStr, Option<ArcStr>)> {
    let mut parts = name.split('@');
    let cell = parts.next().unwrap_or_default();
    let view = parts.next();
    let ok = parts.next().is_none()
        && pattern::is_valid_name(cell)
        && view.map(pattern::is_valid_name).unwrap_or(true);
    if !ok {
        issues.add(
            Diagnostic::error(
                codes::PARSE_BAD_SYMBOL,
                format!("symbol key `{}` must be `cell` or `cell@view`", name),
            )
            .with_span(span.clone())
            .with_source("ast"),
        );
        return None;
    }
    Some((ArcStr::from(cell), view.map(ArcStr::from)))
}

fn parse_modules(
    value: &RawValue,
    modules: &mut IndexMap<ArcStr, ModuleDecl>,
    issues: &mut DiagnosticSet,
) {
    for (name, entry, key_span) in scalar_entries(value, "a `modules` mapping", issues) {
        let Some((cell, view)) = parse_symbol_key(name, &key_span, issues) else {
            continue;
        };
        let Some(decl) = parse_module(name, cell, view, &key_span, entry, issues) else {
            continue;
        };
        if modules.insert(name.clone(), decl).is_some() {
            issues.add(duplicate_key(name, &key_span));
        }
    }
}

fn parse_module(
    symbol: &ArcStr,
    cell: ArcStr,
    view: Option<ArcStr>,
    key_span: &Span,
    entry: &RawValue,
    issues: &mut DiagnosticSet,
) -> Option<ModuleDecl> {
    if entry.as_map().is_none() && !entry.is_null() {
        issues.add(bad_kind(entry, &format!("a mapping for module `{}`", symbol), "ast"));
        return None;
    }

    let mut decl = ModuleDecl {
        name: cell,
        view,
        span: key_span.clone(),
        instances: IndexMap::new(),
        nets: IndexMap::new(),
        patterns: IndexMap::new(),
        instance_defaults: IndexMap::new(),
        parameters: IndexMap::new(),
        variables: IndexMap::new(),
    };

    for (field, value, _) in scalar_entries(entry, "a module mapping", issues) {
        match field.as_str() {
            "instances" => {
                for (name, expr, name_span) in
                    scalar_entries(value, "an `instances` mapping", issues)
                {
                    let Some(text) = expr.as_scalar() else {
                        issues.add(bad_kind(expr, "a scalar instance expression", "ast"));
                        continue;
                    };
                    let inst = InstanceDecl {
                        span: name_span.clone(),
                        expr: Str::new(text.clone(), expr.span.clone()),
                    };
                    if decl.instances.insert(name.clone(), inst).is_some() {
                        issues.add(duplicate_key(name, &name_span));
                    }
                }
            }
            "nets" => {
                for (name, endpoints, name_span) in
                    scalar_entries(value, "a `nets` mapping", issues)
                {
                    let mut tokens = Vec::new();
                    match &endpoints.kind {
                        RawKind::Seq(items) => {
                            for item in items {
                                match item.as_scalar() {
                                    Some(text) => {
                                        tokens.push(Str::new(text.clone(), item.span.clone()))
                                    }
                                    None => issues
                                        .add(bad_kind(item, "a scalar endpoint token", "ast")),
                                }
                            }
                        }
                        RawKind::Null => (),
                        _ => {
                            issues.add(bad_kind(
                                endpoints,
                                "a sequence of endpoint tokens",
                                "ast",
                            ));
                            continue;
                        }
                    }
                    let net = NetDecl {
                        span: name_span.clone(),
                        endpoints: tokens,
                    };
                    if decl.nets.insert(name.clone(), net).is_some() {
                        issues.add(duplicate_key(name, &name_span));
                    }
                }
            }
            "patterns" => {
                for (name, value, name_span) in
                    scalar_entries(value, "a `patterns` mapping", issues)
                {
                    let parsed = match &value.kind {
                        RawKind::Scalar(text) => Some(PatternDecl {
                            span: name_span.clone(),
                            expr: Str::new(text.clone(), value.span.clone()),
                            tag: None,
                        }),
                        RawKind::Map(_) => {
                            parse_pattern_entry(name, &name_span, value, issues)
                        }
                        _ => {
                            issues.add(bad_kind(
                                value,
                                "a pattern expression or `{expr, tag}` mapping",
                                "ast",
                            ));
                            None
                        }
                    };
                    let Some(parsed) = parsed else { continue };
                    if decl.patterns.insert(name.clone(), parsed).is_some() {
                        issues.add(duplicate_key(name, &name_span));
                    }
                }
            }
            "instance_defaults" => {
                for (reference, bindings, ref_span) in
                    scalar_entries(value, "an `instance_defaults` mapping", issues)
                {
                    let defaults = DefaultsDecl {
                        span: ref_span.clone(),
                        bindings: parse_scalar_map(
                            bindings,
                            "a pin-to-net mapping",
                            issues,
                        ),
                    };
                    if decl
                        .instance_defaults
                        .insert(reference.clone(), defaults)
                        .is_some()
                    {
                        issues.add(duplicate_key(reference, &ref_span));
                    }
                }
            }
            "parameters" => {
                decl.parameters = parse_scalar_map(value, "a `parameters` mapping", issues)
            }
            "variables" => {
                decl.variables = parse_scalar_map(value, "a `variables` mapping", issues)
            }
            _ => (),
        }
    }
    Some(decl)
}

fn parse_pattern_entry(
    name: &ArcStr,
    name_span: &Span,
    value: &RawValue,
    issues: &mut DiagnosticSet,
) -> Option<PatternDecl> {
    let mut expr = None;
    let mut tag = None;
    for (field, entry, _) in scalar_entries(value, "a pattern mapping", issues) {
        match field.as_str() {
            "expr" => match entry.as_scalar() {
                Some(text) => expr = Some(Str::new(text.clone(), entry.span.clone())),
                None => issues.add(bad_kind(entry, "a scalar `expr`", "ast")),
            },
            "tag" => match entry.as_scalar() {
                Some(text) => tag = Some(Str::new(text.clone(), entry.span.clone())),
                None => issues.add(bad_kind(entry, "a scalar `tag`", "ast")),
            },
            _ => (),
        }
    }
    match expr {
        Some(expr) => Some(PatternDecl {
            span: name_span.clone(),
            expr,
            tag,
        }),
        None => {
            issues.add(
                Diagnostic::error(
                    codes::PARSE_MISSING_FIELD,
                    format!("pattern `{}` is missing the required `expr` field", name),
                )
                .with_span(name_span.clone())
                .with_source("ast"),
            );
            None
        }
    }
}

fn parse_devices(
    value: &RawValue,
    devices: &mut IndexMap<ArcStr, DeviceDecl>,
    issues: &mut DiagnosticSet,
) {
    for (name, entry, key_span) in scalar_entries(value, "a `devices` mapping", issues) {
        if !pattern::is_valid_name(name) {
            issues.add(
                Diagnostic::error(
                    codes::PARSE_BAD_SYMBOL,
                    format!("device key `{}` is not a valid name", name),
                )
                .with_span(key_span.clone())
                .with_source("ast"),
            );
            continue;
        }
        let Some(decl) = parse_device(name, &key_span, entry, issues) else {
            continue;
        };
        if devices.insert(name.clone(), decl).is_some() {
            issues.add(duplicate_key(name, &key_span));
        }
    }
}

fn parse_device(
    name: &ArcStr,
    key_span: &Span,
    entry: &RawValue,
    issues: &mut DiagnosticSet,
) -> Option<DeviceDecl> {
    if entry.as_map().is_none() {
        issues.add(bad_kind(entry, &format!("a mapping for device `{}`", name), "ast"));
        return None;
    }

    let mut decl = DeviceDecl {
        name: name.clone(),
        span: key_span.clone(),
        ports: Vec::new(),
        parameters: IndexMap::new(),
        variables: IndexMap::new(),
        backends: IndexMap::new(),
    };

    for (field, value, _) in scalar_entries(entry, "a device mapping", issues) {
        match field.as_str() {
            "ports" => match &value.kind {
                RawKind::Seq(items) => {
                    for item in items {
                        match item.as_scalar() {
                            Some(text) => {
                                decl.ports.push(Str::new(text.clone(), item.span.clone()))
                            }
                            None => issues.add(bad_kind(item, "a scalar port name", "ast")),
                        }
                    }
                }
                RawKind::Null => (),
                _ => issues.add(bad_kind(value, "a sequence of port names", "ast")),
            },
            "parameters" => {
                decl.parameters = parse_scalar_map(value, "a `parameters` mapping", issues)
            }
            "variables" => {
                decl.variables = parse_scalar_map(value, "a `variables` mapping", issues)
            }
            "backends" => {
                for (backend, body, backend_span) in
                    scalar_entries(value, "a `backends` mapping", issues)
                {
                    let Some(parsed) =
                        parse_backend(name, backend, &backend_span, body, issues)
                    else {
                        continue;
                    };
                    if decl.backends.insert(backend.clone(), parsed).is_some() {
                        issues.add(duplicate_key(backend, &backend_span));
                    }
                }
            }
            _ => (),
        }
    }

    if decl.backends.is_empty() {
        issues.add(
            Diagnostic::error(
                codes::PARSE_MISSING_FIELD,
                format!("device `{}` must declare at least one backend", name),
            )
            .with_span(key_span.clone())
            .with_source("ast"),
        );
        return None;
    }
    Some(decl)
}

fn parse_backend(
    device: &ArcStr,
    backend: &ArcStr,
    backend_span: &Span,
    body: &RawValue,
    issues: &mut DiagnosticSet,
) -> Option<BackendDecl> {
    let mut template = None;
    let mut parameters = IndexMap::new();
    let mut variables = IndexMap::new();
    let mut props = IndexMap::new();

    for (field, value, _) in scalar_entries(body, "a backend mapping", issues) {
        match field.as_str() {
            "template" => match value.as_scalar() {
                Some(text) => template = Some(Str::new(text.clone(), value.span.clone())),
                None => issues.add(bad_kind(value, "a scalar `template`", "ast")),
            },
            "parameters" => {
                parameters = parse_scalar_map(value, "a `parameters` mapping", issues)
            }
            "variables" => variables = parse_scalar_map(value, "a `variables` mapping", issues),
            // Everything else is a freeform placeholder value.
            _ => match value.as_scalar() {
                Some(text) => {
                    props.insert(field.clone(), Str::new(text.clone(), value.span.clone()));
                }
                None => issues.add(bad_kind(value, "a scalar placeholder value", "ast")),
            },
        }
    }

    match template {
        Some(template) => Some(BackendDecl {
            span: backend_span.clone(),
            template,
            parameters,
            variables,
            props,
        }),
        None => {
            issues.add(
                Diagnostic::error(
                    codes::PARSE_MISSING_FIELD,
                    format!(
                        "backend `{}` of device `{}` is missing the required `template`",
                        backend, device
                    ),
                )
                .with_span(backend_span.clone())
                .with_source("ast"),
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::raw;

    fn gate(text: &str) -> (Option<Document>, DiagnosticSet) {
        let file = FileId::new("/designs/x.asdl");
        let raw = raw::parse_str(&file, text).unwrap();
        parse_document(&file, &raw)
    }

    #[test]
    fn root_must_be_a_mapping() {
        let (doc, issues) = gate("- just\n- a\n- list\n");
        assert!(doc.is_none());
        assert!(issues.contains_code(codes::PARSE_ROOT_NOT_MAPPING));
    }

    #[test]
    fn modules_or_devices_required() {
        let (doc, issues) = gate("top: x\n");
        assert!(doc.is_none());
        assert!(issues.contains_code(codes::PARSE_MISSING_FIELD));
    }

    #[test]
    fn top_required_with_multiple_modules() {
        let (doc, issues) = gate("modules:\n  a:\n    nets: {}\n  b:\n    nets: {}\n");
        assert!(doc.is_some());
        assert!(issues.contains_code(codes::PARSE_MISSING_FIELD));

        let (_, issues) = gate("top: a\nmodules:\n  a:\n    nets: {}\n  b:\n    nets: {}\n");
        assert!(!issues.contains_code(codes::PARSE_MISSING_FIELD));
    }

    #[test]
    fn symbol_keys_allow_a_single_view() {
        let (doc, issues) = gate("modules:\n  cell@layout:\n    nets: {}\n");
        assert_eq!(issues.num_errors(), 0);
        let module = &doc.unwrap().modules["cell@layout"];
        assert_eq!(module.name, "cell");
        assert_eq!(module.view.as_deref(), Some("layout"));

        let (_, issues) = gate("modules:\n  a@b@c:\n    nets: {}\n");
        assert!(issues.contains_code(codes::PARSE_BAD_SYMBOL));
    }

    #[test]
    fn backend_template_required() {
        let (_, issues) = gate(
            "devices:\n  nfet:\n    ports: [D]\n    backends:\n      sim.ngspice:\n        foo: bar\n",
        );
        assert!(issues.contains_code(codes::PARSE_MISSING_FIELD));
    }

    #[test]
    fn device_needs_a_backend() {
        let (_, issues) = gate("devices:\n  nfet:\n    ports: [D]\n");
        assert!(issues.contains_code(codes::PARSE_MISSING_FIELD));
    }

    #[test]
    fn authoring_order_is_preserved() {
        let (doc, issues) = gate(
            "modules:\n  m:\n    instances:\n      ZZ: nfet\n      AA: nfet\n      MM: nfet\n    nets: {}\n",
        );
        assert_eq!(issues.num_errors(), 0);
        let doc = doc.unwrap();
        let names: Vec<_> = doc.modules["m"].instances.keys().cloned().collect();
        assert_eq!(names, ["ZZ", "AA", "MM"]);
    }

    #[test]
    fn the_gate_does_not_resolve_or_expand() {
        // A dangling reference and a pattern both pass the shape gate.
        let (doc, issues) = gate(
            "modules:\n  m:\n    instances:\n      \"X<0:1>\": nothing_of_the_sort\n    nets: {}\n",
        );
        assert_eq!(issues.num_errors(), 0);
        assert!(doc.unwrap().modules["m"].instances.contains_key("X<0:1>"));
    }
}

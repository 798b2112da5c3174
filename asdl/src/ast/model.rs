//! The typed AST for ASDL documents.
//!
//! All mapping fields preserve authoring order; iteration order is part
//! of the contract. Names and values that may carry pattern syntax are
//! kept raw here and interpreted by later stages.

use arcstr::ArcStr;
use diagnostics::{FileId, Span};
use indexmap::IndexMap;

/// A scalar with the span it was written at.
#[derive(Clone, Debug)]
pub struct Str {
    /// The text as written.
    pub text: ArcStr,
    /// Where it was written.
    pub span: Span,
}

impl Str {
    /// Creates a spanned string.
    pub fn new(text: impl Into<ArcStr>, span: Span) -> Self {
        Self {
            text: text.into(),
            span,
        }
    }
}

/// A parsed authoring file.
#[derive(Clone, Debug)]
pub struct Document {
    /// The file this document was parsed from.
    pub file: FileId,
    /// The declared top module, required when more than one module
    /// exists.
    pub top: Option<Str>,
    /// Imports: namespace to raw path.
    pub imports: IndexMap<ArcStr, ImportDecl>,
    /// Module declarations in authoring order.
    pub modules: IndexMap<ArcStr, ModuleDecl>,
    /// Device declarations in authoring order.
    pub devices: IndexMap<ArcStr, DeviceDecl>,
    /// The document root span.
    pub span: Span,
}

/// One `imports` entry.
#[derive(Clone, Debug)]
pub struct ImportDecl {
    /// The namespace span (the mapping key).
    pub span: Span,
    /// The raw import path.
    pub path: Str,
}

/// A module declaration.
#[derive(Clone, Debug)]
pub struct ModuleDecl {
    /// The cell name (the part before `@`).
    pub name: ArcStr,
    /// The view name, when the symbol key is `cell@view`.
    pub view: Option<ArcStr>,
    /// The symbol key span.
    pub span: Span,
    /// Instance name to raw instance expression.
    pub instances: IndexMap<ArcStr, InstanceDecl>,
    /// Net name to endpoint tokens. A `$` prefix marks a port.
    pub nets: IndexMap<ArcStr, NetDecl>,
    /// Module-local named patterns.
    pub patterns: IndexMap<ArcStr, PatternDecl>,
    /// Per-reference default pin bindings.
    pub instance_defaults: IndexMap<ArcStr, DefaultsDecl>,
    /// Module parameters.
    pub parameters: IndexMap<ArcStr, Str>,
    /// Module variables, the `{var}` substitution environment.
    pub variables: IndexMap<ArcStr, Str>,
}

/// One `instances` entry.
#[derive(Clone, Debug)]
pub struct InstanceDecl {
    /// The instance name span (the mapping key).
    pub span: Span,
    /// The raw `<ref> [k=v ...]` expression.
    pub expr: Str,
}

/// One `nets` entry.
#[derive(Clone, Debug)]
pub struct NetDecl {
    /// The net name span (the mapping key).
    pub span: Span,
    /// Raw endpoint tokens in authoring order.
    pub endpoints: Vec<Str>,
}

/// One `patterns` entry: a scalar expression or `{expr, tag}`.
#[derive(Clone, Debug)]
pub struct PatternDecl {
    /// The pattern name span.
    pub span: Span,
    /// The pattern expression.
    pub expr: Str,
    /// Optional axis tag.
    pub tag: Option<Str>,
}

/// One `instance_defaults` entry.
#[derive(Clone, Debug)]
pub struct DefaultsDecl {
    /// The reference key span.
    pub span: Span,
    /// Default pin to net bindings in authoring order.
    pub bindings: IndexMap<ArcStr, Str>,
}

/// A device declaration.
#[derive(Clone, Debug)]
pub struct DeviceDecl {
    /// The device name.
    pub name: ArcStr,
    /// The symbol key span.
    pub span: Span,
    /// Declared port order. May be empty.
    pub ports: Vec<Str>,
    /// Device-level parameter defaults.
    pub parameters: IndexMap<ArcStr, Str>,
    /// Device-level variables.
    pub variables: IndexMap<ArcStr, Str>,
    /// Per-backend entries. Never empty after the gate.
    pub backends: IndexMap<ArcStr, BackendDecl>,
}

/// One device backend entry.
#[derive(Clone, Debug)]
pub struct BackendDecl {
    /// The backend name span.
    pub span: Span,
    /// The device line template.
    pub template: Str,
    /// Backend-level parameter defaults.
    pub parameters: IndexMap<ArcStr, Str>,
    /// Backend-level variables.
    pub variables: IndexMap<ArcStr, Str>,
    /// Freeform placeholder values.
    pub props: IndexMap<ArcStr, Str>,
}

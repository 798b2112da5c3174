//! The ASDL compiler core.
//!
//! ASDL lowers a net-first YAML authoring surface describing analog
//! circuits into backend-specific SPICE-family netlists. The pipeline:
//!
//! 1. import resolution into a frozen program database,
//! 2. shape-gated AST construction per file,
//! 3. lowering into the GraphIR hypergraph,
//! 4. pattern atomization and NetlistIR projection,
//! 5. template-driven emission through a backend bundle.
//!
//! Every stage returns `(result_or_none, diagnostics)`; user-visible
//! failures are diagnostics, never panics. A compile is a pure function
//! of the input tree, the backend bundle, and the environment: re-running
//! it yields byte-identical output.

#![warn(missing_docs)]

pub mod ast;
pub mod atomize;
pub mod backend;
pub mod emit;
pub mod imports;
pub mod lower;

use std::path::{Path, PathBuf};

use arcstr::ArcStr;
use diagnostics::DiagnosticSet;
use tracing::{span, Level};

pub use diagnostics::{Diagnostic, FileId, Severity, Span};
pub use emit::EmitOptions;

/// The backend used when none is requested.
pub const DEFAULT_BACKEND: &str = "sim.ngspice";

/// Options for one compile invocation.
#[derive(Clone, Debug)]
pub struct CompileOptions {
    /// Library roots probed before `ASDL_LIB_PATH`.
    pub lib_roots: Vec<PathBuf>,
    /// The backend to emit for.
    pub backend: String,
    /// Run NetlistIR verification before emission.
    pub verify: bool,
    /// Wrap the top module in a subcircuit.
    pub top_as_subckt: bool,
    /// Emit every module instead of the top's reachable set.
    pub library_mode: bool,
    /// Backend bundle path, overriding `ASDL_BACKEND_CONFIG`.
    pub backend_config: Option<PathBuf>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            lib_roots: Vec::new(),
            backend: DEFAULT_BACKEND.to_string(),
            verify: true,
            top_as_subckt: false,
            library_mode: false,
            backend_config: None,
        }
    }
}

/// The artifacts of a successful compile.
#[derive(Clone, Debug)]
pub struct CompileOutput {
    /// The rendered netlist text.
    pub netlist: String,
    /// The backend's output extension, verbatim.
    pub extension: ArcStr,
    /// The semantic (pre-atomization) graph, for the visualizer dump.
    pub graph: graphir::Program,
    /// The frozen netlist design.
    pub design: netlistir::NetlistDesign,
}

/// Compiles one entry file into netlist text.
///
/// Diagnostics accumulate across stages; a stage whose input already
/// carries errors is skipped, and the returned set is sorted into the
/// deterministic rendering order.
pub fn compile(entry: &Path, opts: &CompileOptions) -> (Option<CompileOutput>, DiagnosticSet) {
    let _guard = span!(Level::INFO, "compile", entry = %entry.display()).entered();
    let mut issues = DiagnosticSet::new();

    macro_rules! bail {
        () => {{
            issues.sort();
            return (None, issues);
        }};
    }
    macro_rules! stage {
        ($result:expr) => {{
            let (value, stage_issues) = $result;
            issues.merge(stage_issues);
            match value {
                Some(value) if !issues.has_error() => value,
                _ => bail!(),
            }
        }};
    }

    // The backend bundle loads first so a broken setup fails fast.
    let config = stage!(backend::load(opts.backend_config.as_deref()));
    let selected = stage!(config.select(&opts.backend));
    let selected = selected.clone();

    let roots = imports::Roots::from_cli(&opts.lib_roots);
    let db = stage!(imports::load_program(entry, &roots));
    let graph = stage!(lower::lower(&db));

    let graph_issues = graph.validate();
    issues.merge(graph_issues);
    if issues.has_error() {
        bail!();
    }

    let atomized = stage!(atomize::atomize(&graph));
    let design = stage!(atomize::project(&atomized));

    if opts.verify {
        issues.merge(netlistir::verify::verify(&design));
        if issues.has_error() {
            bail!();
        }
    }

    let emit_opts = EmitOptions {
        top_as_subckt: opts.top_as_subckt,
        library_mode: opts.library_mode,
    };
    let netlist = stage!(emit::emit(&design, &opts.backend, &selected, &emit_opts));

    issues.sort();
    (
        Some(CompileOutput {
            netlist,
            extension: selected.extension.clone(),
            graph,
            design,
        }),
        issues,
    )
}

/// The default output path: `{basename}{extension}` next to the input.
pub fn default_output_path(input: &Path, extension: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "out".to_string());
    input.with_file_name(format!("{}{}", stem, extension))
}

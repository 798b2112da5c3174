//! Shared fixtures for the end-to-end tests.

use std::fs;
use std::path::{Path, PathBuf};

use asdl::{CompileOptions, CompileOutput};
use diagnostics::DiagnosticSet;
use tempfile::TempDir;

/// The backend bundle the end-to-end scenarios run against.
pub const BUNDLE: &str = r#"
sim.ngspice:
  extension: .spice
  comment_prefix: "*"
  templates:
    __netlist_header__: "{comment_prefix} ASDL netlist for {top}"
    __netlist_footer__: ".end"
    __subckt_header__: ".subckt {name} {ports}"
    __subckt_footer__: ".ends {name}"
    __subckt_call__: "X{name} {ports} {ref}"
"#;

/// A scratch design tree with its own backend bundle.
pub struct Fixture {
    dir: TempDir,
    bundle: PathBuf,
}

impl Fixture {
    /// Creates a fresh fixture directory.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let bundle = dir.path().join("backends.yaml");
        fs::write(&bundle, BUNDLE).expect("write bundle");
        Self { dir, bundle }
    }

    /// The fixture root.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Writes a file, creating parent directories.
    pub fn file(&self, rel: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parents");
        }
        fs::write(&path, contents).expect("write file");
        path
    }

    /// Compile options pointing at this fixture's bundle.
    pub fn options(&self) -> CompileOptions {
        CompileOptions {
            backend_config: Some(self.bundle.clone()),
            ..Default::default()
        }
    }

    /// Compiles the given entry with default options.
    pub fn compile(&self, entry: &Path) -> (Option<CompileOutput>, DiagnosticSet) {
        asdl::compile(entry, &self.options())
    }

    /// Compiles with caller-adjusted options.
    pub fn compile_with(
        &self,
        entry: &Path,
        adjust: impl FnOnce(&mut CompileOptions),
    ) -> (Option<CompileOutput>, DiagnosticSet) {
        let mut opts = self.options();
        adjust(&mut opts);
        asdl::compile(entry, &opts)
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

//! Backend bundle loading.
//!
//! A backend bundle is a YAML file mapping backend names to their output
//! extension, comment prefix, and system template map. The bundle is
//! loaded once per invocation and immutable afterwards.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use arcstr::ArcStr;
use diagnostics::{codes, Diagnostic, DiagnosticSet};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{span, Level};

/// The environment variable overriding the backend bundle path.
pub const BACKEND_CONFIG_ENV: &str = "ASDL_BACKEND_CONFIG";

/// The default backend bundle path.
pub const DEFAULT_CONFIG_PATH: &str = "config/backends.yaml";

/// System template key: subcircuit header.
pub const SUBCKT_HEADER: &str = "__subckt_header__";
/// System template key: subcircuit footer.
pub const SUBCKT_FOOTER: &str = "__subckt_footer__";
/// System template key: hierarchical instance call.
pub const SUBCKT_CALL: &str = "__subckt_call__";
/// System template key: netlist preamble.
pub const NETLIST_HEADER: &str = "__netlist_header__";
/// System template key: netlist postamble.
pub const NETLIST_FOOTER: &str = "__netlist_footer__";

/// The template keys every backend must define.
pub const REQUIRED_TEMPLATES: [&str; 5] = [
    SUBCKT_HEADER,
    SUBCKT_FOOTER,
    SUBCKT_CALL,
    NETLIST_HEADER,
    NETLIST_FOOTER,
];

/// One backend's emission configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Backend {
    /// Output file suffix, used verbatim (e.g. `.spice`).
    pub extension: ArcStr,
    /// The backend's comment leader (e.g. `*`).
    pub comment_prefix: ArcStr,
    /// System templates plus any device-backend templates.
    #[serde(default)]
    pub templates: IndexMap<ArcStr, ArcStr>,
}

/// A loaded backend bundle.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendConfig {
    /// Backends by name, in bundle order.
    pub backends: IndexMap<ArcStr, Backend>,
}

/// Loads the backend bundle.
///
/// The path is, in order of preference: `path_override`, the
/// `ASDL_BACKEND_CONFIG` environment variable, then
/// `config/backends.yaml`. Failures are fatal.
pub fn load(path_override: Option<&Path>) -> (Option<BackendConfig>, DiagnosticSet) {
    let path: PathBuf = match path_override {
        Some(path) => path.to_path_buf(),
        None => env::var_os(BACKEND_CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
    };
    let _guard = span!(Level::INFO, "loading backend bundle", path = %path.display()).entered();
    let mut issues = DiagnosticSet::new();

    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(err) => {
            issues.add(
                Diagnostic::fatal(
                    codes::EMIT_CONFIG,
                    format!("cannot read backend bundle `{}`: {}", path.display(), err),
                )
                .with_help("set ASDL_BACKEND_CONFIG to the bundle path")
                .with_source("backend"),
            );
            return (None, issues);
        }
    };

    match serde_yaml::from_str::<BackendConfig>(&text) {
        Ok(config) => (Some(config), issues),
        Err(err) => {
            issues.add(
                Diagnostic::fatal(
                    codes::EMIT_CONFIG,
                    format!("malformed backend bundle `{}`: {}", path.display(), err),
                )
                .with_source("backend"),
            );
            (None, issues)
        }
    }
}

impl BackendConfig {
    /// Selects a backend and checks its required system templates.
    pub fn select(&self, name: &str) -> (Option<&Backend>, DiagnosticSet) {
        let mut issues = DiagnosticSet::new();
        let Some(backend) = self.backends.get(name) else {
            let known = self
                .backends
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            issues.add(
                Diagnostic::fatal(
                    codes::EMIT_UNKNOWN_BACKEND,
                    format!("backend `{}` is not defined; known backends: {}", name, known),
                )
                .with_source("backend"),
            );
            return (None, issues);
        };
        let mut ok = true;
        for required in REQUIRED_TEMPLATES {
            if !backend.templates.contains_key(required) {
                issues.add(
                    Diagnostic::fatal(
                        codes::EMIT_MISSING_TEMPLATE,
                        format!("backend `{}` is missing the `{}` template", name, required),
                    )
                    .with_source("backend"),
                );
                ok = false;
            }
        }
        (ok.then_some(backend), issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const BUNDLE: &str = r#"
sim.ngspice:
  extension: .spice
  comment_prefix: "*"
  templates:
    __netlist_header__: "{comment_prefix} {name}"
    __netlist_footer__: ".end"
    __subckt_header__: ".subckt {name} {ports}"
    __subckt_footer__: ".ends {name}"
    __subckt_call__: "X{name} {ports} {ref}"
"#;

    #[test]
    fn loads_and_selects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backends.yaml");
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(BUNDLE.as_bytes()).unwrap();

        let (config, issues) = load(Some(&path));
        assert_eq!(issues.num_errors(), 0);
        let config = config.unwrap();
        let (backend, issues) = config.select("sim.ngspice");
        assert_eq!(issues.num_errors(), 0);
        assert_eq!(backend.unwrap().extension, ".spice");
    }

    #[test]
    fn unknown_backend_is_fatal() {
        let config: BackendConfig = serde_yaml::from_str(BUNDLE).unwrap();
        let (backend, issues) = config.select("sim.xyce");
        assert!(backend.is_none());
        assert!(issues.contains_code(codes::EMIT_UNKNOWN_BACKEND));
        assert!(issues.has_fatal());
    }

    #[test]
    fn missing_required_template_is_fatal() {
        let mut config: BackendConfig = serde_yaml::from_str(BUNDLE).unwrap();
        config
            .backends
            .get_mut("sim.ngspice")
            .unwrap()
            .templates
            .shift_remove(SUBCKT_CALL);
        let (backend, issues) = config.select("sim.ngspice");
        assert!(backend.is_none());
        assert!(issues.contains_code(codes::EMIT_MISSING_TEMPLATE));
    }

    #[test]
    fn missing_bundle_is_fatal() {
        let (config, issues) = load(Some(Path::new("/nonexistent/backends.yaml")));
        assert!(config.is_none());
        assert!(issues.contains_code(codes::EMIT_CONFIG));
        assert!(issues.has_fatal());
    }
}

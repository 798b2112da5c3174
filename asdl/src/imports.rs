//! Import resolution and the program database.
//!
//! Files are loaded depth-first from the entry document. Every file is
//! keyed by its [`FileId`]: the lexically normalized absolute path, with
//! no symlink resolution. Loading is transitive, visibility is not: each
//! file sees only the namespaces its own `imports` block binds.

use std::collections::{HashMap, HashSet};
use std::env;
use std::fs;
use std::path::{Component, Path, PathBuf};

use arcstr::ArcStr;
use diagnostics::{codes, Diagnostic, DiagnosticSet, FileId, Span};
use indexmap::IndexMap;
use tracing::{span, Level};

use crate::ast::{self, Document};

/// The environment variable appending library roots after CLI `--lib`
/// roots.
pub const LIB_PATH_ENV: &str = "ASDL_LIB_PATH";

/// The ordered library roots used to resolve logical import paths.
#[derive(Clone, Debug, Default)]
pub struct Roots {
    roots: Vec<PathBuf>,
}

impl Roots {
    /// Builds the search roots: CLI roots first, then every entry of the
    /// `ASDL_LIB_PATH` environment list, in order.
    pub fn from_cli(cli: &[PathBuf]) -> Self {
        let mut roots: Vec<PathBuf> = cli.to_vec();
        if let Some(paths) = env::var_os(LIB_PATH_ENV) {
            roots.extend(env::split_paths(&paths));
        }
        Self { roots }
    }

    /// Builds roots from an explicit list, ignoring the environment.
    pub fn from_list(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    /// The roots in probe order.
    pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
        self.roots.iter()
    }
}

/// How an import path resolved.
enum Resolution {
    File(PathBuf),
    Empty,
    NotFound,
    Ambiguous(Vec<PathBuf>),
}

/// Expands `~` and `$VAR`/`${VAR}` references. Unset variables expand to
/// the empty string.
fn expand_path(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    if let Some(tail) = raw.strip_prefix('~') {
        if tail.is_empty() || tail.starts_with('/') {
            out.push_str(&env::var("HOME").unwrap_or_default());
            rest = tail;
        }
    }

    let mut chars = rest.char_indices().peekable();
    while let Some((_, ch)) = chars.next() {
        if ch != '$' {
            out.push(ch);
            continue;
        }
        match chars.peek() {
            Some((_, '{')) => {
                chars.next();
                let mut name = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }
                if closed {
                    out.push_str(&env::var(&name).unwrap_or_default());
                } else {
                    out.push('$');
                    out.push('{');
                    out.push_str(&name);
                }
            }
            Some((_, c)) if c.is_ascii_alphanumeric() || *c == '_' => {
                let mut name = String::new();
                while let Some((_, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || *c == '_' {
                        name.push(*c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push_str(&env::var(&name).unwrap_or_default());
            }
            _ => out.push('$'),
        }
    }
    out
}

/// Lexically normalizes a path into a [`FileId`].
///
/// Relative paths are resolved against `base`; `.` and `..` components
/// collapse. Symlinks are deliberately not resolved.
pub fn normalize(path: &Path, base: &Path) -> FileId {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    let mut parts: Vec<std::ffi::OsString> = Vec::new();
    let mut prefix = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::Prefix(p) => prefix.push(p.as_os_str()),
            Component::RootDir => prefix.push(Component::RootDir.as_os_str()),
            Component::CurDir => (),
            Component::ParentDir => {
                parts.pop();
            }
            Component::Normal(part) => parts.push(part.to_os_string()),
        }
    }
    let mut normalized = prefix;
    for part in parts {
        normalized.push(part);
    }
    FileId::new(normalized.to_string_lossy().into_owned())
}

/// Resolves a raw import path relative to the importing file's directory.
fn resolve_import(raw: &str, base_dir: &Path, roots: &Roots) -> Resolution {
    let expanded = expand_path(raw);
    if expanded.is_empty() {
        return Resolution::Empty;
    }
    let path = Path::new(&expanded);

    if expanded.starts_with("./") || expanded.starts_with("../") {
        return Resolution::File(base_dir.join(path));
    }
    if path.is_absolute() {
        return Resolution::File(path.to_path_buf());
    }

    let mut matches = Vec::new();
    for root in roots.iter() {
        let candidate = root.join(path);
        if candidate.is_file() {
            matches.push(candidate);
        }
    }
    match matches.len() {
        0 => Resolution::NotFound,
        1 => Resolution::File(matches.pop().unwrap()),
        _ => Resolution::Ambiguous(matches),
    }
}

/// A loaded authoring file and its namespace environment.
#[derive(Clone, Debug)]
pub struct LoadedFile {
    /// The file's identity.
    pub file_id: FileId,
    /// The parsed document.
    pub document: Document,
    /// Namespace to imported file, in `imports` order.
    pub name_env: IndexMap<ArcStr, FileId>,
}

/// The program database: every loaded file, keyed by identity in
/// depth-first discovery order (entry first).
///
/// Frozen once loading completes; later stages share it read-only.
#[derive(Clone, Debug)]
pub struct ProgramDb {
    /// Loaded files in discovery order.
    pub files: IndexMap<FileId, LoadedFile>,
    /// The entry file.
    pub entry: FileId,
}

impl ProgramDb {
    /// The entry file's record.
    pub fn entry_file(&self) -> &LoadedFile {
        &self.files[&self.entry]
    }

    /// The record for the given file.
    pub fn file(&self, id: &FileId) -> Option<&LoadedFile> {
        self.files.get(id)
    }
}

struct Loader<'a> {
    roots: &'a Roots,
    loaded: HashMap<FileId, LoadedFile>,
    order: Vec<FileId>,
    failed: HashSet<FileId>,
    stack: Vec<FileId>,
    issues: DiagnosticSet,
}

/// Loads the entry file and, transitively, everything it imports.
pub fn load_program(entry: &Path, roots: &Roots) -> (Option<ProgramDb>, DiagnosticSet) {
    let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
    let entry_id = normalize(entry, &cwd);
    let _guard = span!(Level::INFO, "loading program", entry = %entry_id).entered();

    let mut loader = Loader {
        roots,
        loaded: HashMap::new(),
        order: Vec::new(),
        failed: HashSet::new(),
        stack: Vec::new(),
        issues: DiagnosticSet::new(),
    };
    let ok = loader.load_file(&entry_id, None);

    let Loader {
        loaded: mut files_by_id,
        order,
        mut issues,
        ..
    } = loader;

    if !ok {
        return (None, issues);
    }

    let mut files = IndexMap::new();
    for file_id in order {
        if let Some(file) = files_by_id.remove(&file_id) {
            files.insert(file_id, file);
        }
    }
    (
        Some(ProgramDb {
            files,
            entry: entry_id,
        }),
        issues,
    )
}

impl Loader<'_> {
    /// Loads one file, memoized by identity. Returns `false` when the
    /// file is unusable; diagnostics are already recorded.
    fn load_file(&mut self, file_id: &FileId, import_span: Option<&Span>) -> bool {
        if self.loaded.contains_key(file_id) {
            return true;
        }
        if self.failed.contains(file_id) {
            return false;
        }
        if self.stack.contains(file_id) {
            let mut chain: Vec<&str> = self
                .stack
                .iter()
                .skip_while(|f| *f != file_id)
                .map(|f| f.as_str())
                .collect();
            chain.push(file_id.as_str());
            self.issues.add(
                Diagnostic::error(
                    codes::AST_IMPORT_CYCLE,
                    format!("import cycle: {}", chain.join(" -> ")),
                )
                .with_span_opt(import_span.cloned())
                .with_source("imports"),
            );
            return false;
        }

        let text = match fs::read_to_string(Path::new(file_id.as_str())) {
            Ok(text) => text,
            Err(err) => {
                self.issues.add(
                    Diagnostic::error(
                        codes::TOOL_READ,
                        format!("cannot read `{}`: {}", file_id, err),
                    )
                    .with_span_opt(import_span.cloned())
                    .with_source("imports"),
                );
                self.failed.insert(file_id.clone());
                return false;
            }
        };

        let raw = match ast::raw::parse_str(file_id, &text) {
            Ok(raw) => raw,
            Err(err) => {
                let span = err
                    .position()
                    .map(|at| Span::point(file_id.clone(), at));
                self.issues.add(
                    Diagnostic::error(codes::PARSE_YAML, err.to_string())
                        .with_span_opt(span)
                        .with_source("ast"),
                );
                self.failed.insert(file_id.clone());
                return false;
            }
        };

        let (document, gate_issues) = ast::parse_document(file_id, &raw);
        self.issues.merge(gate_issues);
        let Some(document) = document else {
            self.failed.insert(file_id.clone());
            return false;
        };

        if document.modules.is_empty() && document.devices.is_empty() {
            self.issues.add(
                Diagnostic::error(
                    codes::AST_FILE_EMPTY,
                    format!("`{}` defines no modules and no devices", file_id),
                )
                .with_span(document.span.clone())
                .with_source("imports"),
            );
            self.failed.insert(file_id.clone());
            return false;
        }

        // Discovery order is recorded before descending into imports, so
        // the entry file is first and importers precede their imports.
        self.order.push(file_id.clone());
        self.stack.push(file_id.clone());

        let base_dir = Path::new(file_id.as_str())
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));

        let mut name_env = IndexMap::new();
        for (ns, import) in &document.imports {
            let resolved = match resolve_import(&import.path.text, &base_dir, self.roots) {
                Resolution::File(path) => normalize(&path, &base_dir),
                Resolution::Empty => {
                    self.issues.add(
                        Diagnostic::error(
                            codes::AST_IMPORT_EMPTY,
                            format!(
                                "import `{}` expands to an empty path",
                                import.path.text
                            ),
                        )
                        .with_span(import.path.span.clone())
                        .with_source("imports"),
                    );
                    continue;
                }
                Resolution::NotFound => {
                    self.issues.add(
                        Diagnostic::error(
                            codes::AST_IMPORT_NOT_FOUND,
                            format!(
                                "import `{}` matches no library root",
                                import.path.text
                            ),
                        )
                        .with_span(import.path.span.clone())
                        .with_help("pass additional roots with --lib or ASDL_LIB_PATH")
                        .with_source("imports"),
                    );
                    continue;
                }
                Resolution::Ambiguous(candidates) => {
                    let listing = candidates
                        .iter()
                        .map(|c| c.display().to_string())
                        .collect::<Vec<_>>()
                        .join(", ");
                    self.issues.add(
                        Diagnostic::error(
                            codes::AST_IMPORT_AMBIGUOUS,
                            format!(
                                "import `{}` matches more than one root: {}",
                                import.path.text, listing
                            ),
                        )
                        .with_span(import.path.span.clone())
                        .with_source("imports"),
                    );
                    continue;
                }
            };

            if self.load_file(&resolved, Some(&import.path.span)) {
                name_env.insert(ns.clone(), resolved);
            }
        }

        self.stack.pop();
        self.loaded.insert(
            file_id.clone(),
            LoadedFile {
                file_id: file_id.clone(),
                document,
                name_env,
            },
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    const LEAF: &str = "modules:\n  cell:\n    nets:\n      $a: []\n";

    #[test]
    fn normalize_collapses_dots() {
        let id = normalize(Path::new("/a/b/../c/./d.asdl"), Path::new("/"));
        assert_eq!(id.as_str(), "/a/c/d.asdl");
    }

    #[test]
    fn relative_paths_resolve_against_importer() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("lib");
        fs::create_dir(&sub).unwrap();
        write(&sub, "leaf.asdl", LEAF);
        let entry = write(
            dir.path(),
            "top.asdl",
            "imports:\n  leaf: ./lib/leaf.asdl\nmodules:\n  cell:\n    nets:\n      $a: []\n",
        );

        let (db, issues) = load_program(&entry, &Roots::default());
        assert_eq!(issues.num_errors(), 0);
        let db = db.unwrap();
        assert_eq!(db.files.len(), 2);
        let entry_file = db.entry_file();
        assert!(entry_file.name_env.contains_key("leaf"));
    }

    #[test]
    fn discovery_order_is_entry_first() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.asdl", LEAF);
        write(
            dir.path(),
            "b.asdl",
            "imports:\n  a: ./a.asdl\nmodules:\n  cell:\n    nets:\n      $a: []\n",
        );
        let entry = write(
            dir.path(),
            "top.asdl",
            "imports:\n  b: ./b.asdl\n  a: ./a.asdl\nmodules:\n  cell:\n    nets:\n      $a: []\n",
        );

        let (db, _) = load_program(&entry, &Roots::default());
        let order: Vec<_> = db
            .unwrap()
            .files
            .keys()
            .map(|f| {
                Path::new(f.as_str())
                    .file_name()
                    .unwrap()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        assert_eq!(order, ["top.asdl", "b.asdl", "a.asdl"]);
    }

    #[test]
    fn cycles_report_the_chain() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "a.asdl",
            "imports:\n  b: ./b.asdl\nmodules:\n  ca:\n    nets:\n      $x: []\n",
        );
        write(
            dir.path(),
            "b.asdl",
            "imports:\n  a: ./a.asdl\nmodules:\n  cb:\n    nets:\n      $x: []\n",
        );
        let entry = dir.path().join("a.asdl");

        let (db, issues) = load_program(&entry, &Roots::default());
        assert!(issues.contains_code(codes::AST_IMPORT_CYCLE));
        let cycle = issues
            .iter()
            .find(|d| d.code == codes::AST_IMPORT_CYCLE)
            .unwrap();
        assert!(cycle.message.contains("a.asdl -> "));
        assert!(cycle.message.contains("b.asdl"));
        // The entry itself loads; the back-edge namespace is unbound.
        let db = db.unwrap();
        assert!(!db.files[&db.entry].name_env.is_empty());
    }

    #[test]
    fn memoized_by_identity_across_spellings() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "leaf.asdl", LEAF);
        // Two spellings that normalize to the same file_id.
        let entry = write(
            dir.path(),
            "top.asdl",
            "imports:\n  l1: ./leaf.asdl\n  l2: ./x/../leaf.asdl\nmodules:\n  cell:\n    nets:\n      $a: []\n",
        );

        let (db, issues) = load_program(&entry, &Roots::default());
        assert_eq!(issues.num_errors(), 0);
        let db = db.unwrap();
        assert_eq!(db.files.len(), 2);
        let entry_file = db.entry_file();
        assert_eq!(
            entry_file.name_env["l1"], entry_file.name_env["l2"],
            "both namespaces bind the same file_id"
        );
    }

    #[test]
    fn logical_paths_probe_roots_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let r1 = dir.path().join("r1");
        let r2 = dir.path().join("r2");
        fs::create_dir_all(&r1).unwrap();
        fs::create_dir_all(&r2).unwrap();
        write(&r2, "leaf.asdl", LEAF);
        let entry = write(
            dir.path(),
            "top.asdl",
            "imports:\n  leaf: leaf.asdl\nmodules:\n  cell:\n    nets:\n      $a: []\n",
        );

        let roots = Roots::from_list(vec![r1.clone(), r2.clone()]);
        let (db, issues) = load_program(&entry, &roots);
        assert_eq!(issues.num_errors(), 0);
        assert_eq!(db.unwrap().files.len(), 2);

        // Present in both roots: ambiguous.
        write(&r1, "leaf.asdl", LEAF);
        let (_, issues) = load_program(&entry, &roots);
        assert!(issues.contains_code(codes::AST_IMPORT_AMBIGUOUS));
    }

    #[test]
    fn missing_logical_import() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write(
            dir.path(),
            "top.asdl",
            "imports:\n  leaf: nowhere.asdl\nmodules:\n  cell:\n    nets:\n      $a: []\n",
        );
        let (_, issues) = load_program(&entry, &Roots::default());
        assert!(issues.contains_code(codes::AST_IMPORT_NOT_FOUND));
    }

    #[test]
    fn empty_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write(dir.path(), "top.asdl", "modules: {}\n");
        let (db, issues) = load_program(&entry, &Roots::default());
        assert!(db.is_none());
        assert!(issues.contains_code(codes::AST_FILE_EMPTY));
    }
}

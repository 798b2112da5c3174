//! The stable diagnostic code catalog.
//!
//! Codes are stable strings of the form `DOMAIN-NNN`. Domains:
//! `PARSE-` (YAML shape gate), `AST-` (imports and document structure),
//! `IR-` (lowering, graph construction, atomization, verification),
//! `PASS-` (pattern engine), `EMIT-` (backend config and emission),
//! `LINT-` (advisory), `TOOL-` (file I/O at the tool boundary).

/// YAML could not be scanned or used an unsupported construct.
pub const PARSE_YAML: &str = "PARSE-001";
/// The document root is not a mapping.
pub const PARSE_ROOT_NOT_MAPPING: &str = "PARSE-002";
/// A required field is missing.
pub const PARSE_MISSING_FIELD: &str = "PARSE-003";
/// A symbol key is not `cell` or `cell@view` with a single `@`.
pub const PARSE_BAD_SYMBOL: &str = "PARSE-004";
/// A field has the wrong node kind (mapping/sequence/scalar).
pub const PARSE_BAD_KIND: &str = "PARSE-005";
/// A mapping repeats a key.
pub const PARSE_DUPLICATE_KEY: &str = "PARSE-006";

/// An import path matched no library root.
pub const AST_IMPORT_NOT_FOUND: &str = "AST-010";
/// An import path expanded to the empty string.
pub const AST_IMPORT_EMPTY: &str = "AST-011";
/// The import graph contains a cycle.
pub const AST_IMPORT_CYCLE: &str = "AST-012";
/// An imported file defines no modules and no devices.
pub const AST_FILE_EMPTY: &str = "AST-014";
/// An import path matched more than one library root.
pub const AST_IMPORT_AMBIGUOUS: &str = "AST-015";

/// Pattern expansion lengths are incompatible for binding.
pub const IR_LENGTH_MISMATCH: &str = "IR-003";
/// Two expansions produced the same literal name.
pub const IR_LITERAL_COLLISION: &str = "IR-004";
/// An instance references an unresolved symbol.
pub const IR_UNRESOLVED_SYMBOL: &str = "IR-010";
/// A qualified reference uses an unresolved namespace.
pub const IR_UNRESOLVED_NAMESPACE: &str = "IR-011";
/// A `{variable}` reference has no definition.
pub const IR_UNDEFINED_VARIABLE: &str = "IR-012";
/// A `{variable}` reference is recursive.
pub const IR_RECURSIVE_VARIABLE: &str = "IR-013";
/// An endpoint atom does not contain exactly one `.`.
pub const IR_BAD_ENDPOINT: &str = "IR-014";
/// Two nets in a module share a name.
pub const IR_DUPLICATE_NET: &str = "IR-020";
/// Two instances in a module share a name.
pub const IR_DUPLICATE_INSTANCE: &str = "IR-021";
/// Two endpoints share the `(instance, port)` key.
pub const IR_DUPLICATE_ENDPOINT: &str = "IR-022";
/// An entity references an ID that does not exist.
pub const IR_DANGLING_REF: &str = "IR-023";
/// A name is not a valid literal and not a valid pattern for its position.
pub const IR_BAD_NAME: &str = "IR-024";
/// An endpoint refers to an unknown instance.
pub const IR_UNKNOWN_INSTANCE: &str = "IR-032";
/// An endpoint refers to a port its target does not declare.
pub const IR_UNKNOWN_PORT: &str = "IR-033";
/// A netlist name contains a pattern delimiter.
pub const IR_PATTERN_LEAKAGE: &str = "IR-050";
/// Two netlist entities share a literal name.
pub const IR_NETLIST_DUPLICATE: &str = "IR-051";
/// An instance connection does not match its target's port list.
pub const IR_CONN_PORT_MISMATCH: &str = "IR-052";
/// A netlist entity references a module, device, or net that does not exist.
pub const IR_NETLIST_DANGLING: &str = "IR-053";
/// An instance binds the same port twice.
pub const IR_DUPLICATE_CONN: &str = "IR-054";

/// A named pattern reference has no definition.
pub const PASS_UNKNOWN_PATTERN: &str = "PASS-101";
/// A pattern expansion repeats a literal.
pub const PASS_DUPLICATE_ATOM: &str = "PASS-104";
/// A pattern expansion exceeds the per-token atom cap.
pub const PASS_TOO_LONG: &str = "PASS-105";
/// A pattern expression is syntactically malformed.
pub const PASS_MALFORMED: &str = "PASS-106";
/// Two named patterns share an axis but differ in length.
pub const PASS_AXIS_LENGTH: &str = "PASS-107";

/// No top module could be selected.
pub const EMIT_NO_TOP: &str = "EMIT-001";
/// An instance parameter override names a key the device does not declare.
pub const EMIT_UNKNOWN_PARAM: &str = "EMIT-002";
/// A device template uses an unknown placeholder.
pub const EMIT_UNKNOWN_PLACEHOLDER: &str = "EMIT-003";
/// A backend is missing a required system template.
pub const EMIT_MISSING_TEMPLATE: &str = "EMIT-004";
/// A module was renamed to resolve an emission-name collision.
pub const EMIT_COLLISION_RENAME: &str = "EMIT-005";
/// The requested backend is not defined in the backend bundle.
pub const EMIT_UNKNOWN_BACKEND: &str = "EMIT-006";
/// A system template uses an unknown placeholder.
pub const EMIT_UNKNOWN_SYSTEM_PLACEHOLDER: &str = "EMIT-007";
/// A template string is malformed.
pub const EMIT_MALFORMED_TEMPLATE: &str = "EMIT-008";
/// The backend bundle could not be read or parsed.
pub const EMIT_CONFIG: &str = "EMIT-009";
/// A device declares no entry for the selected backend.
pub const EMIT_NO_DEVICE_BACKEND: &str = "EMIT-010";
/// A template references an environment variable that is not set.
pub const EMIT_UNRESOLVED_ENV: &str = "EMIT-011";

/// An import namespace is never referenced.
pub const LINT_UNUSED_IMPORT: &str = "LINT-001";
/// An explicit binding overrides an instance default.
pub const LINT_DEFAULT_OVERRIDE: &str = "LINT-002";

/// An input file could not be read.
pub const TOOL_READ: &str = "TOOL-001";
/// An output file could not be written.
pub const TOOL_WRITE: &str = "TOOL-002";

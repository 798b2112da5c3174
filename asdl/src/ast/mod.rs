//! The authoring surface: raw YAML loading, the typed AST, and the shape
//! gate.
//!
//! The raw loader preserves document order and attaches a source span to
//! every node. The gate checks shape only: it never resolves references,
//! expands patterns, or applies defaults.

pub mod gate;
pub mod model;
pub mod raw;

pub use gate::parse_document;
pub use model::*;

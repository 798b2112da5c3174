//! Pattern expression engine.
//!
//! A pattern expression is a raw string containing zero or more groups.
//! A group is an enumeration `<a|b|c>`, an inclusive integer range
//! `<start:end>` (direction preserved), or a reference `<@name>` to a
//! module-local named pattern. Literal text and groups concatenate into a
//! *segment*; segments joined by `;` splice: each expands independently
//! and the results concatenate left to right.
//!
//! Expansion is strictly left-to-right and single-pass. Within a segment,
//! groups combine like an odometer with the leftmost group slowest. Named
//! patterns are substituted before expansion and do not recurse.
//!
//! The expansion of a single expression is capped at [`MAX_EXPANSION`]
//! atoms.

#![warn(missing_docs)]

mod binding;

use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use arcstr::ArcStr;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub use binding::{bind, BindError, Binding};

/// The maximum number of atoms a single expression may expand to.
pub const MAX_EXPANSION: usize = 10_000;

/// A module-local named pattern.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NamedPattern {
    /// The pattern expression this name substitutes to.
    pub expr: ArcStr,
    /// Explicit axis tag. Defaults to the defining name.
    pub tag: Option<ArcStr>,
}

/// The named patterns visible to an expression, in declaration order.
pub type PatternEnv = IndexMap<ArcStr, NamedPattern>;

/// An error produced by the pattern engine.
///
/// Callers map these to diagnostics using [`PatternError::code`].
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum PatternError {
    /// The expression is syntactically malformed.
    #[error("malformed pattern `{expr}` at offset {pos}: {reason}")]
    Malformed {
        /// The offending expression.
        expr: ArcStr,
        /// Byte offset of the error.
        pos: usize,
        /// Why the expression is malformed.
        reason: &'static str,
    },
    /// A `<@name>` reference has no definition.
    #[error("unknown named pattern `{name}`")]
    UnknownName {
        /// The unresolved name.
        name: ArcStr,
    },
    /// The expansion exceeds [`MAX_EXPANSION`].
    #[error("pattern `{expr}` expands to {len} atoms; the limit is {max}", max = MAX_EXPANSION)]
    TooLong {
        /// The offending expression.
        expr: ArcStr,
        /// The computed expansion length.
        len: u64,
    },
    /// The expansion repeats a literal.
    #[error("pattern expansion repeats the literal `{literal}`")]
    DuplicateAtom {
        /// The repeated literal.
        literal: ArcStr,
    },
    /// Two named patterns share an axis but differ in length.
    #[error("patterns on axis `{axis}` have conflicting lengths {first} and {second}")]
    AxisLength {
        /// The shared axis.
        axis: ArcStr,
        /// Length of the first definition.
        first: usize,
        /// Length of the conflicting definition.
        second: usize,
    },
}

impl PatternError {
    /// The stable diagnostic code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Malformed { .. } => diagnostics::codes::PASS_MALFORMED,
            Self::UnknownName { .. } => diagnostics::codes::PASS_UNKNOWN_PATTERN,
            Self::TooLong { .. } => diagnostics::codes::PASS_TOO_LONG,
            Self::DuplicateAtom { .. } => diagnostics::codes::PASS_DUPLICATE_ATOM,
            Self::AxisLength { .. } => diagnostics::codes::PASS_AXIS_LENGTH,
        }
    }
}

/// One alternative contributed to an atom by a group.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum PatternPart {
    /// A string alternative from an enumeration.
    Literal(ArcStr),
    /// An integer from a range.
    Index(i64),
}

impl Display for PatternPart {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Literal(s) => write!(f, "{}", s),
            Self::Index(i) => write!(f, "{}", i),
        }
    }
}

/// Whether an atom's parts are all numeric.
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum PatternType {
    /// At least one string part, or no parts at all.
    #[default]
    Literal,
    /// Every part is a range index.
    Numeric,
}

/// A single literal name produced by expansion.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    /// The literal text. Contains no pattern delimiters.
    pub literal: ArcStr,
    /// The concatenation of the producing segment's literal pieces.
    pub base_name: ArcStr,
    /// The alternatives chosen by each group, left to right.
    pub parts: Vec<PatternPart>,
    /// Whether every part is numeric.
    pub pattern_type: PatternType,
    /// Index of the producing splice segment.
    pub segment: usize,
}

/// An axis of a pattern expression, used by the broadcast rule.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    /// The axis identifier: a named pattern's `tag`, or its defining name.
    pub id: ArcStr,
    /// The expansion length of the axis.
    pub len: usize,
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum GroupKind {
    Alternates(Vec<ArcStr>),
    Range { start: i64, end: i64 },
    Named { atoms: Vec<Atom> },
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct Group {
    kind: GroupKind,
    /// Set for `<@name>` groups only; anonymous groups carry no axis.
    axis: Option<ArcStr>,
}

impl Group {
    fn len(&self) -> usize {
        match &self.kind {
            GroupKind::Alternates(alts) => alts.len(),
            GroupKind::Range { start, end } => start.abs_diff(*end) as usize + 1,
            GroupKind::Named { atoms } => atoms.len(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum Piece {
    Literal(ArcStr),
    Group(Group),
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct Segment {
    pieces: Vec<Piece>,
}

impl Segment {
    fn groups(&self) -> impl Iterator<Item = &Group> {
        self.pieces.iter().filter_map(|p| match p {
            Piece::Group(g) => Some(g),
            Piece::Literal(_) => None,
        })
    }

    fn len(&self) -> Result<u64, ()> {
        let mut len: u64 = 1;
        for group in self.groups() {
            len = len.checked_mul(group.len() as u64).ok_or(())?;
        }
        Ok(len)
    }

    fn base_name(&self) -> ArcStr {
        let mut base = String::new();
        for piece in &self.pieces {
            if let Piece::Literal(s) = piece {
                base.push_str(s);
            }
        }
        base.into()
    }
}

/// A parsed pattern expression with named patterns already substituted.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Expression {
    raw: ArcStr,
    segments: Vec<Segment>,
}

/// Raw piece produced by the tokenizer, before macro resolution.
enum RawPiece {
    Literal(ArcStr),
    Alternates(Vec<ArcStr>),
    Range { start: i64, end: i64 },
    Macro(ArcStr),
}

/// Tokenizer state: inside or outside a `<...>` group.
enum ScanState {
    Literal,
    Group { start: usize },
}

fn tokenize(expr: &ArcStr) -> Result<Vec<Vec<RawPiece>>, PatternError> {
    let malformed = |pos: usize, reason: &'static str| PatternError::Malformed {
        expr: expr.clone(),
        pos,
        reason,
    };

    let mut segments = Vec::new();
    let mut pieces: Vec<RawPiece> = Vec::new();
    let mut literal = String::new();
    let mut state = ScanState::Literal;

    let flush_segment =
        |pieces: &mut Vec<RawPiece>, literal: &mut String, pos: usize| -> Result<(), PatternError> {
            if !literal.is_empty() {
                pieces.push(RawPiece::Literal(ArcStr::from(literal.as_str())));
                literal.clear();
            }
            if pieces.is_empty() {
                return Err(PatternError::Malformed {
                    expr: expr.clone(),
                    pos,
                    reason: "empty splice segment",
                });
            }
            Ok(())
        };

    for (pos, ch) in expr.char_indices() {
        match state {
            ScanState::Literal => match ch {
                '<' => {
                    if !literal.is_empty() {
                        pieces.push(RawPiece::Literal(ArcStr::from(literal.as_str())));
                        literal.clear();
                    }
                    state = ScanState::Group { start: pos + 1 };
                }
                '>' => return Err(malformed(pos, "`>` without a matching `<`")),
                ';' => {
                    flush_segment(&mut pieces, &mut literal, pos)?;
                    segments.push(std::mem::take(&mut pieces));
                }
                _ => literal.push(ch),
            },
            ScanState::Group { start } => match ch {
                '<' => return Err(malformed(pos, "groups may not nest")),
                '>' => {
                    let content = &expr[start..pos];
                    pieces.push(classify_group(expr, start, content)?);
                    state = ScanState::Literal;
                }
                _ => (),
            },
        }
    }

    if let ScanState::Group { start } = state {
        return Err(malformed(start, "unclosed group"));
    }
    flush_segment(&mut pieces, &mut literal, expr.len())?;
    segments.push(pieces);
    Ok(segments)
}

fn classify_group(expr: &ArcStr, start: usize, content: &str) -> Result<RawPiece, PatternError> {
    let malformed = |reason: &'static str| PatternError::Malformed {
        expr: expr.clone(),
        pos: start,
        reason,
    };

    if content.is_empty() {
        return Err(malformed("empty group"));
    }
    if let Some(name) = content.strip_prefix('@') {
        if !is_valid_name(name) {
            return Err(malformed("invalid named pattern reference"));
        }
        return Ok(RawPiece::Macro(ArcStr::from(name)));
    }
    if content.contains(':') {
        let mut bounds = content.splitn(2, ':');
        let start_txt = bounds.next().unwrap();
        let end_txt = bounds.next().unwrap();
        if end_txt.contains(':') {
            return Err(malformed("range takes exactly one `:`"));
        }
        let start_val: i64 = start_txt
            .parse()
            .map_err(|_| malformed("range bound is not an integer"))?;
        let end_val: i64 = end_txt
            .parse()
            .map_err(|_| malformed("range bound is not an integer"))?;
        return Ok(RawPiece::Range {
            start: start_val,
            end: end_val,
        });
    }
    let alts: Vec<ArcStr> = content.split('|').map(ArcStr::from).collect();
    Ok(RawPiece::Alternates(alts))
}

impl Expression {
    /// Parses an expression, substituting named patterns from `env`.
    ///
    /// Named patterns do not recurse: a body that itself contains a
    /// `<@name>` reference is malformed.
    pub fn parse(expr: impl Into<ArcStr>, env: &PatternEnv) -> Result<Self, PatternError> {
        Self::build(expr.into(), Some(env))
    }

    /// Parses a named pattern body; references are rejected inside it.
    fn parse_body(expr: &ArcStr) -> Result<Self, PatternError> {
        Self::build(expr.clone(), None)
    }

    fn build(raw: ArcStr, env: Option<&PatternEnv>) -> Result<Self, PatternError> {
        let raw_segments = tokenize(&raw)?;

        let mut segments = Vec::with_capacity(raw_segments.len());
        for raw_pieces in raw_segments {
            let mut pieces = Vec::with_capacity(raw_pieces.len());
            for piece in raw_pieces {
                pieces.push(match piece {
                    RawPiece::Literal(s) => Piece::Literal(s),
                    RawPiece::Alternates(alts) => Piece::Group(Group {
                        kind: GroupKind::Alternates(alts),
                        axis: None,
                    }),
                    RawPiece::Range { start, end } => Piece::Group(Group {
                        kind: GroupKind::Range { start, end },
                        axis: None,
                    }),
                    RawPiece::Macro(name) => {
                        let Some(env) = env else {
                            return Err(PatternError::Malformed {
                                expr: raw.clone(),
                                pos: 0,
                                reason: "named patterns do not recurse",
                            });
                        };
                        let pattern =
                            env.get(&name).ok_or_else(|| PatternError::UnknownName {
                                name: name.clone(),
                            })?;
                        let body = Self::parse_body(&pattern.expr)?;
                        let atoms = body.expand()?;
                        let axis = pattern.tag.clone().unwrap_or_else(|| name.clone());
                        Piece::Group(Group {
                            kind: GroupKind::Named { atoms },
                            axis: Some(axis),
                        })
                    }
                });
            }
            segments.push(Segment { pieces });
        }

        Ok(Self { raw, segments })
    }

    /// The raw expression text.
    #[inline]
    pub fn raw(&self) -> &ArcStr {
        &self.raw
    }

    /// Returns `true` if any segment contains a group.
    pub fn has_groups(&self) -> bool {
        self.segments.iter().any(|s| s.groups().next().is_some())
    }

    /// The number of splice segments.
    #[inline]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// The expansion length, computed without materializing atoms.
    pub fn length(&self) -> Result<usize, PatternError> {
        let mut total: u64 = 0;
        for segment in &self.segments {
            let len = segment.len().map_err(|_| PatternError::TooLong {
                expr: self.raw.clone(),
                len: u64::MAX,
            })?;
            total = total.saturating_add(len);
        }
        if total > MAX_EXPANSION as u64 {
            return Err(PatternError::TooLong {
                expr: self.raw.clone(),
                len: total,
            });
        }
        Ok(total as usize)
    }

    /// Expands the expression into its ordered atom list.
    pub fn expand(&self) -> Result<Vec<Atom>, PatternError> {
        let total = self.length()?;
        let mut atoms = Vec::with_capacity(total);

        for (segment_idx, segment) in self.segments.iter().enumerate() {
            let groups: Vec<&Group> = segment.groups().collect();
            let seg_len = segment.len().unwrap() as usize;
            let base_name = segment.base_name();

            // Odometer strides, leftmost group slowest.
            let mut strides = vec![1usize; groups.len()];
            for i in (0..groups.len().saturating_sub(1)).rev() {
                strides[i] = strides[i + 1] * groups[i + 1].len();
            }

            for i in 0..seg_len {
                let mut literal = String::new();
                let mut parts = Vec::new();
                let mut group_idx = 0;
                for piece in &segment.pieces {
                    match piece {
                        Piece::Literal(s) => literal.push_str(s),
                        Piece::Group(group) => {
                            let j = (i / strides[group_idx]) % group.len();
                            group_idx += 1;
                            match &group.kind {
                                GroupKind::Alternates(alts) => {
                                    literal.push_str(&alts[j]);
                                    parts.push(PatternPart::Literal(alts[j].clone()));
                                }
                                GroupKind::Range { start, end } => {
                                    let value = if end >= start {
                                        start + j as i64
                                    } else {
                                        start - j as i64
                                    };
                                    literal.push_str(&value.to_string());
                                    parts.push(PatternPart::Index(value));
                                }
                                GroupKind::Named { atoms } => {
                                    let atom = &atoms[j];
                                    literal.push_str(&atom.literal);
                                    parts.extend(atom.parts.iter().cloned());
                                }
                            }
                        }
                    }
                }
                let pattern_type = if !parts.is_empty()
                    && parts.iter().all(|p| matches!(p, PatternPart::Index(_)))
                {
                    PatternType::Numeric
                } else {
                    PatternType::Literal
                };
                atoms.push(Atom {
                    literal: literal.into(),
                    base_name: base_name.clone(),
                    parts,
                    pattern_type,
                    segment: segment_idx,
                });
            }
        }
        Ok(atoms)
    }

    /// The left-to-right axis sequence of the expression.
    ///
    /// Returns `Some` only for single-segment expressions all of whose
    /// groups are named-pattern references: anonymous groups carry no axis
    /// and splices break the positional product structure the broadcast
    /// rule relies on. An expression with no groups has an empty axis
    /// sequence.
    pub fn axes(&self) -> Option<Vec<Axis>> {
        if self.segments.len() != 1 {
            return None;
        }
        let mut axes = Vec::new();
        for group in self.segments[0].groups() {
            let id = group.axis.clone()?;
            axes.push(Axis {
                id,
                len: group.len(),
            });
        }
        Some(axes)
    }
}

/// Parses and expands `expr` in one step.
pub fn expand_str(expr: &str, env: &PatternEnv) -> Result<Vec<Atom>, PatternError> {
    Expression::parse(expr, env)?.expand()
}

/// Parses and computes the expansion length of `expr` in one step.
pub fn length_str(expr: &str, env: &PatternEnv) -> Result<usize, PatternError> {
    Expression::parse(expr, env)?.length()
}

/// Returns the first literal repeated anywhere in the expansion.
pub fn duplicates(atoms: &[Atom]) -> Option<&Atom> {
    let mut seen = HashMap::with_capacity(atoms.len());
    for atom in atoms {
        if seen.insert(atom.literal.clone(), ()).is_some() {
            return Some(atom);
        }
    }
    None
}

/// Returns `true` if `name` matches `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => (),
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Returns `true` if `text` contains no pattern delimiters.
pub fn is_literal(text: &str) -> bool {
    !text.contains(['<', '>', '|', ';'])
}

/// Validates a module's named pattern environment.
///
/// Every body must parse without references of its own, and patterns
/// sharing an axis must expand to the same length.
pub fn validate_env(env: &PatternEnv) -> Result<(), PatternError> {
    let mut axis_lens: IndexMap<ArcStr, usize> = IndexMap::new();
    for (name, pattern) in env {
        let body = Expression::parse_body(&pattern.expr)?;
        let len = body.length()?;
        let axis = pattern.tag.clone().unwrap_or_else(|| name.clone());
        match axis_lens.get(&axis) {
            Some(&prev) if prev != len => {
                return Err(PatternError::AxisLength {
                    axis,
                    first: prev,
                    second: len,
                })
            }
            Some(_) => (),
            None => {
                axis_lens.insert(axis, len);
            }
        }
    }
    Ok(())
}

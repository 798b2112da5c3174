//! Order-preserving raw YAML trees with per-node source spans.
//!
//! Built from `yaml-rust` marked parser events rather than a serde
//! deserializer: the authoring surface is deeply order-sensitive and the
//! shape gate needs spans for its diagnostics. Scalars are kept exactly
//! as written; values are opaque strings to the compiler.

use arcstr::ArcStr;
use diagnostics::{FileId, LineCol, Span};
use yaml_rust::parser::{Event, MarkedEventReceiver, Parser};
use yaml_rust::scanner::{Marker, TScalarStyle};

/// A raw YAML node.
#[derive(Clone, Debug)]
pub struct RawValue {
    /// The node's kind and children.
    pub kind: RawKind,
    /// Where the node starts in the source.
    pub span: Span,
}

/// The kind of a raw node.
#[derive(Clone, Debug)]
pub enum RawKind {
    /// An explicit or implicit null.
    Null,
    /// A scalar, kept as written.
    Scalar(ArcStr),
    /// A sequence in document order.
    Seq(Vec<RawValue>),
    /// A mapping in document order. Keys may repeat; the gate rejects
    /// duplicates.
    Map(Vec<(RawValue, RawValue)>),
}

impl RawValue {
    /// The scalar text, if this node is a scalar.
    pub fn as_scalar(&self) -> Option<&ArcStr> {
        match &self.kind {
            RawKind::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// The entries, if this node is a mapping.
    pub fn as_map(&self) -> Option<&[(RawValue, RawValue)]> {
        match &self.kind {
            RawKind::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// The items, if this node is a sequence.
    pub fn as_seq(&self) -> Option<&[RawValue]> {
        match &self.kind {
            RawKind::Seq(items) => Some(items),
            _ => None,
        }
    }

    /// Returns `true` for explicit and implicit nulls.
    pub fn is_null(&self) -> bool {
        matches!(self.kind, RawKind::Null)
    }

    /// A short noun for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            RawKind::Null => "null",
            RawKind::Scalar(_) => "scalar",
            RawKind::Seq(_) => "sequence",
            RawKind::Map(_) => "mapping",
        }
    }
}

/// An error loading raw YAML.
#[derive(Clone, Debug, thiserror::Error)]
pub enum RawError {
    /// The scanner rejected the text.
    #[error("{0}")]
    Scan(String),
    /// The document uses a YAML feature the authoring surface excludes.
    #[error("{what} are not supported in ASDL documents")]
    Unsupported {
        /// The offending feature.
        what: &'static str,
        /// Where it occurred.
        at: LineCol,
    },
    /// The document is empty.
    #[error("the document is empty")]
    Empty,
}

impl RawError {
    /// The position to attach to the diagnostic, when known.
    pub fn position(&self) -> Option<LineCol> {
        match self {
            Self::Scan(_) | Self::Empty => None,
            Self::Unsupported { at, .. } => Some(*at),
        }
    }
}

/// Parses a single YAML document into a raw tree.
pub fn parse_str(file: &FileId, text: &str) -> Result<RawValue, RawError> {
    let mut builder = TreeBuilder {
        file: file.clone(),
        root: None,
        stack: Vec::new(),
        error: None,
    };
    let mut parser = Parser::new(text.chars());
    parser
        .load(&mut builder, false)
        .map_err(|err| RawError::Scan(err.to_string()))?;
    if let Some(error) = builder.error {
        return Err(error);
    }
    builder.root.ok_or(RawError::Empty)
}

enum Frame {
    Seq {
        items: Vec<RawValue>,
        start: LineCol,
    },
    Map {
        entries: Vec<(RawValue, RawValue)>,
        pending_key: Option<RawValue>,
        start: LineCol,
    },
}

struct TreeBuilder {
    file: FileId,
    root: Option<RawValue>,
    stack: Vec<Frame>,
    error: Option<RawError>,
}

impl TreeBuilder {
    fn pos(mark: Marker) -> LineCol {
        LineCol::new(mark.line() as u32, mark.col() as u32 + 1)
    }

    fn span(&self, start: LineCol, end: LineCol) -> Span {
        Span::new(self.file.clone(), start, end)
    }

    fn push_value(&mut self, value: RawValue) {
        match self.stack.last_mut() {
            None => {
                // Only the first document root is kept.
                if self.root.is_none() {
                    self.root = Some(value);
                }
            }
            Some(Frame::Seq { items, .. }) => items.push(value),
            Some(Frame::Map {
                entries,
                pending_key,
                ..
            }) => match pending_key.take() {
                None => *pending_key = Some(value),
                Some(key) => entries.push((key, value)),
            },
        }
    }
}

impl MarkedEventReceiver for TreeBuilder {
    fn on_event(&mut self, event: Event, mark: Marker) {
        if self.error.is_some() {
            return;
        }
        let pos = Self::pos(mark);
        match event {
            Event::Nothing
            | Event::StreamStart
            | Event::StreamEnd
            | Event::DocumentStart
            | Event::DocumentEnd => (),
            Event::Alias(_) => {
                self.error = Some(RawError::Unsupported {
                    what: "YAML aliases",
                    at: pos,
                });
            }
            Event::Scalar(text, style, _, _) => {
                let is_null = style == TScalarStyle::Plain
                    && matches!(text.as_str(), "" | "~" | "null" | "Null" | "NULL");
                let kind = if is_null {
                    RawKind::Null
                } else {
                    RawKind::Scalar(ArcStr::from(text))
                };
                let span = self.span(pos, pos);
                self.push_value(RawValue { kind, span });
            }
            Event::SequenceStart(_) => self.stack.push(Frame::Seq {
                items: Vec::new(),
                start: pos,
            }),
            Event::SequenceEnd => {
                let Some(Frame::Seq { items, start }) = self.stack.pop() else {
                    self.error = Some(RawError::Unsupported {
                        what: "unbalanced sequence events",
                        at: pos,
                    });
                    return;
                };
                let span = self.span(start, pos);
                self.push_value(RawValue {
                    kind: RawKind::Seq(items),
                    span,
                });
            }
            Event::MappingStart(_) => self.stack.push(Frame::Map {
                entries: Vec::new(),
                pending_key: None,
                start: pos,
            }),
            Event::MappingEnd => {
                let Some(Frame::Map { entries, start, .. }) = self.stack.pop() else {
                    self.error = Some(RawError::Unsupported {
                        what: "unbalanced mapping events",
                        at: pos,
                    });
                    return;
                };
                let span = self.span(start, pos);
                self.push_value(RawValue {
                    kind: RawKind::Map(entries),
                    span,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file() -> FileId {
        FileId::new("/designs/x.asdl")
    }

    #[test]
    fn preserves_mapping_order() {
        let raw = parse_str(&file(), "b: 1\na: 2\nz: 3\n").unwrap();
        let keys: Vec<_> = raw
            .as_map()
            .unwrap()
            .iter()
            .map(|(k, _)| k.as_scalar().unwrap().as_str())
            .collect();
        assert_eq!(keys, ["b", "a", "z"]);
    }

    #[test]
    fn scalars_stay_strings() {
        let raw = parse_str(&file(), "x: 007\n").unwrap();
        let (_, value) = &raw.as_map().unwrap()[0];
        assert_eq!(value.as_scalar().unwrap(), "007");
    }

    #[test]
    fn nulls_detected() {
        let raw = parse_str(&file(), "x:\ny: ~\nz: \"null\"\n").unwrap();
        let entries = raw.as_map().unwrap();
        assert!(entries[0].1.is_null());
        assert!(entries[1].1.is_null());
        assert!(!entries[2].1.is_null());
    }

    #[test]
    fn spans_are_one_based() {
        let raw = parse_str(&file(), "top: inv\n").unwrap();
        let (key, value) = &raw.as_map().unwrap()[0];
        assert_eq!(key.span.start, LineCol::new(1, 1));
        assert_eq!(value.span.start, LineCol::new(1, 6));
    }

    #[test]
    fn aliases_rejected() {
        let err = parse_str(&file(), "a: &x 1\nb: *x\n").unwrap_err();
        assert!(matches!(err, RawError::Unsupported { .. }));
    }

    #[test]
    fn scan_errors_reported() {
        assert!(matches!(
            parse_str(&file(), "a: [1, 2\n"),
            Err(RawError::Scan(_))
        ));
    }
}

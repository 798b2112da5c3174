use crate::*;

fn span(file: &str, line: u32, col: u32) -> Span {
    Span::point(FileId::new(file), LineCol::new(line, col))
}

#[test]
fn counters_track_severities() {
    let mut set = DiagnosticSet::new();
    set.add(Diagnostic::info(codes::EMIT_NO_TOP, "note"));
    set.add(Diagnostic::warning(codes::LINT_DEFAULT_OVERRIDE, "override"));
    set.add(Diagnostic::error(codes::IR_UNRESOLVED_SYMBOL, "missing"));
    set.add(Diagnostic::fatal(codes::EMIT_CONFIG, "no config"));

    assert_eq!(set.len(), 4);
    assert_eq!(set.num_errors(), 2);
    assert_eq!(set.num_warnings(), 1);
    assert!(set.has_error());
    assert!(set.has_fatal());
}

#[test]
fn ordering_contract() {
    let mut set = DiagnosticSet::new();
    // Out of order on purpose.
    set.add(Diagnostic::error(codes::IR_UNRESOLVED_SYMBOL, "late").with_span(span("b.asdl", 1, 1)));
    set.add(Diagnostic::error(codes::IR_UNRESOLVED_SYMBOL, "spanless"));
    set.add(
        Diagnostic::error(codes::IR_UNRESOLVED_SYMBOL, "unknown file")
            .with_span(Span::point(FileId::unknown(), LineCol::new(1, 1))),
    );
    set.add(Diagnostic::error(codes::IR_UNRESOLVED_SYMBOL, "early").with_span(span("a.asdl", 9, 2)));
    set.add(
        Diagnostic::warning(codes::LINT_DEFAULT_OVERRIDE, "same spot, lower severity")
            .with_span(span("a.asdl", 2, 4)),
    );
    set.add(
        Diagnostic::error(codes::IR_LENGTH_MISMATCH, "same spot, higher severity")
            .with_span(span("a.asdl", 2, 4)),
    );

    set.sort();
    let messages: Vec<_> = set.iter().map(|d| d.message.as_str()).collect();
    assert_eq!(
        messages,
        [
            "same spot, higher severity",
            "same spot, lower severity",
            "early",
            "late",
            "spanless",
            "unknown file",
        ]
    );
}

#[test]
fn severity_ranks_most_severe_first() {
    assert!(Severity::Fatal.rank() < Severity::Error.rank());
    assert!(Severity::Error.rank() < Severity::Warning.rank());
    assert!(Severity::Warning.rank() < Severity::Info.rank());
}

#[test]
fn render_includes_code_and_span() {
    let d = Diagnostic::error(codes::IR_UNKNOWN_PORT, "no port `G`")
        .with_span(span("inv.asdl", 4, 7))
        .with_note("declared ports: D, S")
        .with_help("check the device declaration");
    let text = d.to_string();
    assert!(text.contains("inv.asdl:4:7"));
    assert!(text.contains("error[IR-033]"));
    assert!(text.contains("note: declared ports"));
    assert!(text.contains("help: check the device"));
}

//! Ariadne-based rendering of compile errors.
//!
//! Output is colorless so that it stays stable in tests. Each report has an
//! error code, the error message, a label at the error's origin and a fix
//! suggestion when one is plausible.

use std::ops::Range;

use ariadne::{Color, Config, Label, Report, ReportKind, Source};

use crate::error::{CompileError, ErrorKind};

// ── Error Codes ────────────────────────────────────────────────────────

pub fn error_code(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::UnknownIdentifier => "E0001",
        ErrorKind::UnknownType => "E0002",
        ErrorKind::UnknownMember => "E0003",
        ErrorKind::ArityMismatch => "E0004",
        ErrorKind::TypeMismatch => "E0005",
        ErrorKind::InconsistentBinding => "E0006",
        ErrorKind::NonExhaustiveMatch => "E0007",
        ErrorKind::EmptyMatch => "E0008",
        ErrorKind::InvalidConstraint => "E0009",
        ErrorKind::InvalidOperand => "E0010",
        ErrorKind::NoApplicableRule => "E0011",
        ErrorKind::Registry => "E0012",
    }
}

// ── Span Helpers ───────────────────────────────────────────────────────

fn text_range_to_range(range: rowan::TextRange) -> Range<usize> {
    let start: usize = range.start().into();
    let end: usize = range.end().into();
    start..end
}

fn label_message(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::UnknownIdentifier => "not found in this scope",
        ErrorKind::UnknownType => "unknown type",
        ErrorKind::UnknownMember => "no such member",
        ErrorKind::ArityMismatch => "wrong number of arguments",
        ErrorKind::TypeMismatch => "type mismatch here",
        ErrorKind::InconsistentBinding => "conflicting type argument",
        ErrorKind::NonExhaustiveMatch => "not all variants are covered",
        ErrorKind::EmptyMatch => "no arms",
        ErrorKind::InvalidConstraint => "constraint not satisfied",
        ErrorKind::InvalidOperand => "invalid operand",
        ErrorKind::NoApplicableRule => "cannot lower this",
        ErrorKind::Registry => "invalid declaration",
    }
}

fn help_for(error: &CompileError) -> Option<String> {
    match error.kind {
        ErrorKind::NonExhaustiveMatch => {
            Some("add arms for the missing variants or a wildcard `_` arm".to_string())
        }
        ErrorKind::EmptyMatch => Some("add at least one arm".to_string()),
        ErrorKind::InconsistentBinding => {
            Some("every argument bound to the same type parameter must have the same type".to_string())
        }
        ErrorKind::UnknownIdentifier => {
            Some("declare it before use, or import the module that exports it".to_string())
        }
        ErrorKind::TypeMismatch
            if error.message.contains("expected string")
                && crate::builtins::NUMERIC_TYPES
                    .iter()
                    .any(|n| error.message.ends_with(&format!("got {}", n))) =>
        {
            Some("convert the value with `to_string()`".to_string())
        }
        _ => None,
    }
}

// ── Rendering ──────────────────────────────────────────────────────────

/// Render a compile error against `source` as a terminal report.
pub fn render_diagnostic(error: &CompileError, source: &str, filename: &str) -> String {
    let config = Config::default().with_color(false);
    let source_len = source.len();

    // ariadne needs at least a 1-char span inside the source.
    let clamp = |r: Range<usize>| -> Range<usize> {
        let s = r.start.min(source_len);
        let e = r.end.min(source_len).max(s);
        if s == e {
            s..e.saturating_add(1).min(source_len)
        } else {
            s..e
        }
    };

    let span = clamp(
        error
            .origin
            .map(text_range_to_range)
            .unwrap_or(0..source_len),
    );

    let mut builder = Report::build(ReportKind::Error, span.clone())
        .with_code(error_code(error.kind))
        .with_message(&error.message)
        .with_config(config)
        .with_label(
            Label::new(span)
                .with_message(label_message(error.kind))
                .with_color(Color::Red),
        );
    if let Some(help) = help_for(error) {
        builder = builder.with_help(help);
    }
    if error.origin.is_none() {
        builder = builder.with_note(format!("in {}", filename));
    }
    let report = builder.finish();

    let mut buf = Vec::new();
    if report.write(Source::from(source), &mut buf).is_err() {
        return format!("error[{}]: {}", error_code(error.kind), error.message);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowan::TextRange;

    #[test]
    fn codes_are_unique() {
        let kinds = [
            ErrorKind::UnknownIdentifier,
            ErrorKind::UnknownType,
            ErrorKind::UnknownMember,
            ErrorKind::ArityMismatch,
            ErrorKind::TypeMismatch,
            ErrorKind::InconsistentBinding,
            ErrorKind::NonExhaustiveMatch,
            ErrorKind::EmptyMatch,
            ErrorKind::InvalidConstraint,
            ErrorKind::InvalidOperand,
            ErrorKind::NoApplicableRule,
            ErrorKind::Registry,
        ];
        let mut codes: Vec<&str> = kinds.iter().map(|k| error_code(*k)).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), kinds.len());
    }

    #[test]
    fn report_carries_code_message_and_help() {
        let src = "match opt { Some(x) => x }";
        let err = CompileError::non_exhaustive(&["None".to_string()])
            .with_origin(Some(TextRange::new(0.into(), 5.into())));
        let output = render_diagnostic(&err, src, "main.mlc");
        assert!(output.contains("E0007"), "{}", output);
        assert!(output.contains("Non-exhaustive match: missing variant(s) None"));
        assert!(output.contains("wildcard"));
    }

    #[test]
    fn string_expected_numeric_found_suggests_to_string() {
        let err = CompileError::type_mismatch("argument 1 of 'greet'", "string", "i32");
        assert!(help_for(&err).is_some_and(|h| h.contains("to_string")));
        let err = CompileError::type_mismatch("argument 1 of 'greet'", "i32", "string");
        assert!(help_for(&err).is_none());
    }

    #[test]
    fn empty_origin_is_clamped() {
        let src = "x";
        let err = CompileError::unknown_identifier("y", &[])
            .with_origin(Some(TextRange::new(1.into(), 1.into())));
        let output = render_diagnostic(&err, src, "main.mlc");
        assert!(output.contains("Unknown identifier 'y'"));
    }
}

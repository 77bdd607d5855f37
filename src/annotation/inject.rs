//! Pure marker transforms over source bytes
//!
//! [`inject`] and [`erase`] never touch the filesystem. Markers carry no
//! surrounding whitespace, so erasing is exact removal and
//! `erase(inject(x)) == x` for any source without pre-existing markers.

use super::FunctionRecord;
use regex::bytes::Regex;
use std::sync::OnceLock;

pub const START_MARKER: &str = "AUTOPERF_PROBE_START";
pub const END_MARKER: &str = "AUTOPERF_PROBE_END";
/// Closes the brace opened in front of a wrapped `return`
pub const RETURN_CLOSE: &str = "}/*AUTOPERF_PROBE*/";

/// Which functions of a file receive markers
#[derive(Debug, Clone, Copy)]
pub enum Selection<'a> {
    All,
    /// Changed line numbers of this file; a function is selected when one
    /// of them falls inside its body
    Lines(&'a [usize]),
}

impl Selection<'_> {
    pub fn selects(&self, function: &FunctionRecord) -> bool {
        match self {
            Selection::All => true,
            Selection::Lines(lines) => lines.iter().any(|l| function.lines.contains(l)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
    Start,
    ReturnOpen,
    ReturnClose,
    End,
    Removed,
}

/// One insertion (or, for erase, one removal) at a byte offset of the input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub offset: usize,
    pub kind: EditKind,
    pub text: String,
}

fn start_marker(name: &str) -> String {
    format!("{}(\"{}\");", START_MARKER, name)
}

fn end_marker(name: &str) -> String {
    format!("{}(\"{}\");", END_MARKER, name)
}

/// True when the body already begins with a start marker
fn already_annotated(source: &[u8], function: &FunctionRecord) -> bool {
    source[function.body_start()..].starts_with(START_MARKER.as_bytes())
}

/// Insert probe markers into the selected functions
///
/// Returns the new bytes and the journal of insertions, ordered as they
/// appear in the output. Functions already carrying a start marker are left
/// alone, which makes injecting twice a no-op.
pub fn inject(source: &[u8], functions: &[FunctionRecord], selection: &Selection<'_>) -> (Vec<u8>, Vec<Edit>) {
    let mut journal = Vec::new();
    for function in functions {
        if !selection.selects(function) || already_annotated(source, function) {
            continue;
        }
        let end = end_marker(&function.name);
        journal.push(Edit {
            offset: function.body_start(),
            kind: EditKind::Start,
            text: start_marker(&function.name),
        });
        for site in &function.returns {
            journal.push(Edit {
                offset: site.start,
                kind: EditKind::ReturnOpen,
                text: format!("{{{}", end),
            });
            journal.push(Edit {
                offset: site.end,
                kind: EditKind::ReturnClose,
                text: RETURN_CLOSE.to_string(),
            });
        }
        journal.push(Edit {
            offset: function.body_end(),
            kind: EditKind::End,
            text: end,
        });
    }

    // Stable sort keeps journal order for inserts sharing an offset, e.g. a
    // return closer right before the end marker at the closing brace.
    journal.sort_by_key(|edit| edit.offset);

    let mut output = source.to_vec();
    for edit in journal.iter().rev() {
        output.splice(edit.offset..edit.offset, edit.text.bytes());
    }
    (output, journal)
}

fn marker_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let pattern = format!(
            r#"\{{{end}\("[^"\n]*"\);|{start}\("[^"\n]*"\);|{end}\("[^"\n]*"\);|{close}"#,
            end = END_MARKER,
            start = START_MARKER,
            close = regex::escape(RETURN_CLOSE),
        );
        Regex::new(&pattern).unwrap_or_else(|e| unreachable!("marker pattern is static: {}", e))
    })
}

/// Remove every marker token, returning the new bytes and the removals
pub fn erase(source: &[u8]) -> (Vec<u8>, Vec<Edit>) {
    let pattern = marker_pattern();
    let mut output = Vec::with_capacity(source.len());
    let mut removed = Vec::new();
    let mut last = 0;
    for m in pattern.find_iter(source) {
        output.extend_from_slice(&source[last..m.start()]);
        removed.push(Edit {
            offset: m.start(),
            kind: EditKind::Removed,
            text: String::from_utf8_lossy(m.as_bytes()).into_owned(),
        });
        last = m.end();
    }
    output.extend_from_slice(&source[last..]);
    (output, removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{CScanner, SourceParser};

    fn annotate(src: &str, selection: Selection<'_>) -> String {
        let functions = CScanner.parse(src.as_bytes()).unwrap();
        let (out, _) = inject(src.as_bytes(), &functions, &selection);
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_markers_wrap_body_and_returns() {
        let src = "int f(int x) {\n  if (x) return 1;\n  return 0;\n}\n";
        let out = annotate(src, Selection::All);
        assert_eq!(
            out,
            "int f(int x) {AUTOPERF_PROBE_START(\"f\");\n  if (x) {AUTOPERF_PROBE_END(\"f\");return 1;}/*AUTOPERF_PROBE*/\n  {AUTOPERF_PROBE_END(\"f\");return 0;}/*AUTOPERF_PROBE*/\nAUTOPERF_PROBE_END(\"f\");}\n"
        );
    }

    #[test]
    fn test_return_right_before_closing_brace() {
        let src = "int g(void) {return 2;}";
        let out = annotate(src, Selection::All);
        assert_eq!(
            out,
            "int g(void) {AUTOPERF_PROBE_START(\"g\");{AUTOPERF_PROBE_END(\"g\");return 2;}/*AUTOPERF_PROBE*/AUTOPERF_PROBE_END(\"g\");}"
        );
    }

    #[test]
    fn test_empty_body() {
        let out = annotate("void h(void) {}", Selection::All);
        assert_eq!(out, "void h(void) {AUTOPERF_PROBE_START(\"h\");AUTOPERF_PROBE_END(\"h\");}");
    }

    #[test]
    fn test_erase_restores_original() {
        let src = "int f(int x) {\n  if (x) return 1;\n  return 0;\n}\nvoid h(void) {}\n";
        let out = annotate(src, Selection::All);
        let (erased, removed) = erase(out.as_bytes());
        assert_eq!(erased, src.as_bytes());
        assert_eq!(removed.len(), 8);
    }

    #[test]
    fn test_inject_twice_is_noop() {
        let src = "int f(void) { return 0; }\n";
        let once = annotate(src, Selection::All);
        let twice = annotate(&once, Selection::All);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_erase_is_idempotent_and_noop_on_clean_input() {
        let src = b"int f(void) { return 0; }\n";
        assert_eq!(erase(src).0, src);
        assert!(erase(src).1.is_empty());
        let out = annotate("int f(void) { return 0; }\n", Selection::All);
        let once = erase(out.as_bytes()).0;
        assert_eq!(erase(&once).0, once);
    }

    #[test]
    fn test_line_selection() {
        let src = "int a(void) {\n  return 1;\n}\nint b(void) {\n  return 2;\n}\n";
        let out = annotate(src, Selection::Lines(&[5]));
        assert!(!out.contains("PROBE_START(\"a\")"));
        assert!(out.contains("PROBE_START(\"b\")"));

        let untouched = annotate(src, Selection::Lines(&[100]));
        assert_eq!(untouched, src);
    }

    #[test]
    fn test_journal_is_in_output_order() {
        let src = "int g(void) {return 2;}";
        let functions = CScanner.parse(src.as_bytes()).unwrap();
        let (_, journal) = inject(src.as_bytes(), &functions, &Selection::All);
        let kinds: Vec<EditKind> = journal.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![EditKind::Start, EditKind::ReturnOpen, EditKind::ReturnClose, EditKind::End]
        );
    }
}

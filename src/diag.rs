use color_print::cformat;

use crate::span::Position;

/// Witness that a diagnostic has already been pushed to the sink.
///
/// Phases return `Err(Reported)` instead of an error payload; the sink is
/// the single source of truth for what went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reported;

pub type Fallible<T = ()> = Result<T, Reported>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message:  String,
    pub position: Position,
}

/// Append-only sink shared by every phase of the pipeline.
///
/// Reporting never fails and never panics; callers check `has_errors`
/// between phases and unwind cleanly.
#[derive(Debug, Default)]
pub struct Diagnostics {
    list: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, message: impl Into<String>, position: Position) -> Reported {
        self.list.push(Diagnostic {
            severity: Severity::Error,
            message: message.into(),
            position,
        });
        Reported
    }

    pub fn warning(&mut self, message: impl Into<String>, position: Position) {
        self.list.push(Diagnostic {
            severity: Severity::Warning,
            message: message.into(),
            position,
        });
    }

    pub fn has_errors(&self) -> bool {
        self.list
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.list.iter()
    }

    /// Renders every diagnostic with the offending line and a caret
    /// underline, errors in red and warnings in magenta.
    pub fn render(&self, file_name: &str, source: &str) -> String {
        let mut out = String::new();
        for diag in &self.list {
            out.push_str(&render_one(diag, file_name, source));
        }
        out
    }
}

fn render_one(diag: &Diagnostic, file_name: &str, source: &str) -> String {
    let pos = diag.position;

    let line_start = pos.line_start as usize;
    let line_start = line_start.min(source.len());
    let line_end = source[line_start..]
        .find('\n')
        .map(|i| line_start + i)
        .unwrap_or(source.len());
    let line = &source[line_start..line_end];

    // Leading whitespace is dropped from the echoed line and the caret
    // is re-anchored accordingly.
    let trimmed = line.trim_start_matches([' ', '\t']);
    let indent = line.len() - trimmed.len();

    let start_col = (pos.start as usize).saturating_sub(line_start);
    let end_col = (pos.end as usize).saturating_sub(line_start);

    let lo = start_col.saturating_sub(indent).min(trimmed.len());
    let hi = end_col.saturating_sub(indent).clamp(lo, trimmed.len());

    let label = match diag.severity {
        Severity::Error => cformat!("<red,underline>Error</>: "),
        Severity::Warning => cformat!("<magenta,underline>Warning</>: "),
    };
    let header = format!("{}{}", label, cformat!("<white>{}</>", diag.message));

    let padding = format!("{} {}:{}:  ", file_name, pos.line, start_col);
    let echoed = format!(
        "{}{}{}{}",
        padding,
        &trimmed[..lo],
        match diag.severity {
            Severity::Error => cformat!("<red>{}</>", &trimmed[lo..hi]),
            Severity::Warning => cformat!("<magenta>{}</>", &trimmed[lo..hi]),
        },
        &trimmed[hi..],
    );

    let mut underline = String::new();
    for _ in 0..padding.len() + lo {
        underline.push(' ');
    }
    let marker = format!("^{}", "~".repeat(hi.saturating_sub(lo + 1)));
    underline.push_str(&match diag.severity {
        Severity::Error => cformat!("<red>{}</>", marker),
        Severity::Warning => cformat!("<magenta>{}</>", marker),
    });

    format!("{}\n{}\n{}\n", header, echoed, underline)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_error_sets_flag() {
        let mut diags = Diagnostics::new();
        assert!(!diags.has_errors());
        diags.warning("shadowed", Position::default());
        assert!(!diags.has_errors());
        diags.error("bad", Position::default());
        assert!(diags.has_errors());
        assert_eq!(diags.iter().count(), 2);
    }

    #[test]
    fn test_render_contains_line_and_caret() {
        let source = "let x = 5;\nlet y = @;\n";
        let mut diags = Diagnostics::new();
        // the '@' sits at byte 19, on line 2 which starts at byte 11
        diags.error("Unknown Character '@'", Position::new(19, 20, 2, 11));
        let out = diags.render("test.frc", source);
        assert!(out.contains("Unknown Character '@'"));
        assert!(out.contains("test.frc 2:8:"));
        assert!(out.contains('^'));
    }

    #[test]
    fn test_render_trims_leading_whitespace() {
        let source = "    break;\n";
        let mut diags = Diagnostics::new();
        diags.error("Cannot use break outside of a loop", Position::new(4, 9, 1, 0));
        let out = diags.render("test.frc", source);
        // the echoed line starts right after the padding column
        assert!(out.contains(":  \u{1b}"));
        assert!(!out.contains("    break"));
    }
}

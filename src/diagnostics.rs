//! Diagnostics: positions, code frames, fatal errors and accumulated warnings.

use once_cell::unsync::OnceCell;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// DIAGNOSTIC CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const ERR_DEFAULT_EXPORT: &str = "default-export";
pub const ERR_MISSING_REF: &str = "missing-ref";
pub const ERR_PARSE: &str = "parse-error";

pub const WARN_UNUSED_HELPER: &str = "unused-helper";
pub const WARN_UNUSED_ACTION: &str = "unused-action";
pub const WARN_UNUSED_EVENT: &str = "unused-event";
pub const WARN_UNUSED_TRANSITION: &str = "unused-transition";
pub const WARN_UNUSED_ANIMATION: &str = "unused-animation";
pub const WARN_CSS_UNUSED_SELECTOR: &str = "css-unused-selector";

// ═══════════════════════════════════════════════════════════════════════════════
// DIAGNOSTIC
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A resolved source position: 1-based line, 0-based column in UTF-16 units, byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub line: u32,
    pub column: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: String,
    pub message: String,
    pub filename: String,
    pub start: Position,
    pub end: Position,
    pub frame: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}:{})\n{}",
            self.message, self.start.line, self.start.column, self.frame
        )
    }
}

/// Contract violations between code producers and the emitter. Never caused by user input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InternalError {
    #[error("template variable '%{name}' has no value")]
    UnresolvedTemplateVar { name: String },

    #[error("source span {start}..{end} is outside the {len}-byte input")]
    InvalidSpan { start: u32, end: u32, len: usize },
}

#[derive(Error, Debug, Clone)]
pub enum CompileError {
    #[error("{0}")]
    Fatal(Box<Diagnostic>),

    #[error("internal compiler error: {0}")]
    Internal(#[from] InternalError),
}

impl CompileError {
    pub fn code(&self) -> &str {
        match self {
            CompileError::Fatal(diagnostic) => &diagnostic.code,
            CompileError::Internal(InternalError::UnresolvedTemplateVar { .. }) => {
                "unresolved-template-var"
            }
            CompileError::Internal(InternalError::InvalidSpan { .. }) => "invalid-span",
        }
    }

    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            CompileError::Fatal(diagnostic) => Some(diagnostic),
            CompileError::Internal(_) => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOCATOR
// ═══════════════════════════════════════════════════════════════════════════════

/// Line-start table for offset → line/column lookup.
#[derive(Debug, Clone)]
pub struct Locator {
    line_starts: Vec<usize>,
}

impl Locator {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0usize];
        for (i, byte) in source.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self { line_starts }
    }

    /// 0-based line index containing `offset`.
    pub fn line_index(&self, offset: usize) -> usize {
        match self.line_starts.binary_search(&offset) {
            Ok(exact) => exact,
            Err(insert) => insert.saturating_sub(1),
        }
    }

    pub fn line_start(&self, line_index: usize) -> usize {
        self.line_starts[line_index]
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// 0-based line and UTF-16 column of `offset`.
    pub fn locate(&self, source: &str, offset: usize) -> (u32, u32) {
        let offset = floor_char_boundary(source, offset.min(source.len()));
        let line = self.line_index(offset);
        let column = source[self.line_starts[line]..offset].encode_utf16().count();
        (line as u32, column as u32)
    }

    pub fn position(&self, source: &str, offset: usize) -> Position {
        let (line, column) = self.locate(source, offset);
        Position {
            line: line + 1,
            column,
            offset: offset.min(source.len()) as u32,
        }
    }
}

fn floor_char_boundary(source: &str, mut offset: usize) -> usize {
    while offset > 0 && !source.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

fn tabs_to_spaces(line: &str) -> String {
    line.replace('\t', "  ")
}

/// Render up to two lines either side of `offset` with a caret under its column.
pub fn code_frame(source: &str, locator: &Locator, offset: usize) -> String {
    let offset = floor_char_boundary(source, offset.min(source.len()));
    let line = locator.line_index(offset);
    let lines: Vec<&str> = source.split('\n').collect();

    let frame_start = line.saturating_sub(2);
    let frame_end = (line + 3).min(lines.len());
    let digits = frame_end.to_string().len();

    lines[frame_start..frame_end]
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let text = text.trim_end_matches('\r');
            let number = format!("{:>width$}", frame_start + i + 1, width = digits);
            if frame_start + i == line {
                let before = &source[locator.line_start(line)..offset];
                let indent = digits + 2 + tabs_to_spaces(before).chars().count();
                format!(
                    "{}: {}\n{}^",
                    number,
                    tabs_to_spaces(text),
                    " ".repeat(indent)
                )
            } else {
                format!("{}: {}", number, tabs_to_spaces(text))
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ═══════════════════════════════════════════════════════════════════════════════
// REPORTER
// ═══════════════════════════════════════════════════════════════════════════════

/// Builds positioned diagnostics for one compilation unit.
///
/// The locator is built on first use; a unit that never reports anything never pays
/// for it. Warnings are accumulated and handed back by [`DiagnosticReporter::take_warnings`].
pub struct DiagnosticReporter<'s> {
    source: &'s str,
    filename: String,
    locator: OnceCell<Locator>,
    warnings: Vec<Diagnostic>,
}

impl<'s> DiagnosticReporter<'s> {
    pub fn new(source: &'s str, filename: impl Into<String>) -> Self {
        Self {
            source,
            filename: filename.into(),
            locator: OnceCell::new(),
            warnings: Vec::new(),
        }
    }

    pub fn source(&self) -> &'s str {
        self.source
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn locator(&self) -> &Locator {
        self.locator.get_or_init(|| Locator::new(self.source))
    }

    pub fn diagnostic(
        &self,
        severity: Severity,
        code: &str,
        message: impl Into<String>,
        start: usize,
        end: usize,
    ) -> Diagnostic {
        let locator = self.locator();
        Diagnostic {
            severity,
            code: code.to_string(),
            message: message.into(),
            filename: self.filename.clone(),
            start: locator.position(self.source, start),
            end: locator.position(self.source, end.max(start)),
            frame: code_frame(self.source, locator, start),
        }
    }

    /// A fatal diagnostic, ready to be returned with `Err(..)`.
    pub fn error(&self, code: &str, message: impl Into<String>, start: usize, end: usize) -> CompileError {
        let diagnostic = self.diagnostic(Severity::Error, code, message, start, end);
        CompileError::Fatal(Box::new(diagnostic))
    }

    pub fn warn(&mut self, code: &str, message: impl Into<String>, start: usize, end: usize) {
        let diagnostic = self.diagnostic(Severity::Warning, code, message, start, end);
        tracing::warn!(code, message = diagnostic.message.as_str(), "compiler warning");
        self.warnings.push(diagnostic);
    }

    pub fn warnings(&self) -> &[Diagnostic] {
        &self.warnings
    }

    pub fn take_warnings(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.warnings)
    }
}

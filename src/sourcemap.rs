//! Output bundling and version 3 source maps.
//!
//! A [`Bundle`] is an ordered list of segments: generated literal text, verbatim byte
//! ranges of the original source, and the empty placeholder that keeps the original
//! file registered in `sources` when nothing was spliced. [`Bundle::finish`] joins the
//! segments and returns the text together with its map.
//!
//! Columns in the map are UTF-16 code units, as consumers of v3 maps expect.

use crate::diagnostics::{InternalError, Locator};
use crate::ir::SourceSpan;
use serde::{Deserialize, Serialize};

const BASE64_CHARS: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

// ═══════════════════════════════════════════════════════════════════════════════
// VLQ
// ═══════════════════════════════════════════════════════════════════════════════

fn encode_vlq(out: &mut String, value: i64) {
    let mut vlq = if value < 0 {
        ((-value) << 1) | 1
    } else {
        value << 1
    };
    loop {
        let mut digit = (vlq & 0b11111) as usize;
        vlq >>= 5;
        if vlq > 0 {
            digit |= 0b100000;
        }
        out.push(BASE64_CHARS[digit] as char);
        if vlq == 0 {
            break;
        }
    }
}

fn base64_value(c: u8) -> Option<i64> {
    BASE64_CHARS.iter().position(|&b| b == c).map(|p| p as i64)
}

fn decode_vlq_segment(segment: &str) -> Option<Vec<i64>> {
    let mut values = Vec::new();
    let mut value = 0i64;
    let mut shift = 0;
    for byte in segment.bytes() {
        let digit = base64_value(byte)?;
        value |= (digit & 0b11111) << shift;
        if digit & 0b100000 != 0 {
            shift += 5;
            continue;
        }
        let negative = value & 1 == 1;
        value >>= 1;
        values.push(if negative { -value } else { value });
        value = 0;
        shift = 0;
    }
    (shift == 0).then_some(values)
}

/// One decoded mapping: generated column, then original line and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    pub generated_column: u32,
    pub source: u32,
    pub original_line: u32,
    pub original_column: u32,
}

/// Decode a `mappings` string into per-line absolute mappings.
pub fn decode_mappings(mappings: &str) -> Option<Vec<Vec<Mapping>>> {
    let mut lines = Vec::new();
    let (mut source, mut original_line, mut original_column) = (0i64, 0i64, 0i64);

    for line in mappings.split(';') {
        let mut decoded = Vec::new();
        let mut generated_column = 0i64;
        for segment in line.split(',').filter(|s| !s.is_empty()) {
            let fields = decode_vlq_segment(segment)?;
            generated_column += *fields.first()?;
            if fields.len() < 4 {
                continue;
            }
            source += fields[1];
            original_line += fields[2];
            original_column += fields[3];
            decoded.push(Mapping {
                generated_column: u32::try_from(generated_column).ok()?,
                source: u32::try_from(source).ok()?,
                original_line: u32::try_from(original_line).ok()?,
                original_column: u32::try_from(original_column).ok()?,
            });
        }
        lines.push(decoded);
    }
    Some(lines)
}

fn encode_mappings(lines: &[Vec<Mapping>]) -> String {
    let mut out = String::new();
    let (mut source, mut original_line, mut original_column) = (0i64, 0i64, 0i64);

    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            out.push(';');
        }
        let mut generated_column = 0i64;
        for (j, mapping) in line.iter().enumerate() {
            if j > 0 {
                out.push(',');
            }
            encode_vlq(&mut out, mapping.generated_column as i64 - generated_column);
            encode_vlq(&mut out, mapping.source as i64 - source);
            encode_vlq(&mut out, mapping.original_line as i64 - original_line);
            encode_vlq(&mut out, mapping.original_column as i64 - original_column);
            generated_column = mapping.generated_column as i64;
            source = mapping.source as i64;
            original_line = mapping.original_line as i64;
            original_column = mapping.original_column as i64;
        }
    }
    out
}

// ═══════════════════════════════════════════════════════════════════════════════
// SOURCE MAP
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    pub version: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub sources: Vec<String>,
    pub sources_content: Vec<String>,
    pub names: Vec<String>,
    pub mappings: String,
}

impl SourceMap {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Original `(line, column)` for a generated position, both 0-based.
    pub fn original_position(&self, line: u32, column: u32) -> Option<(u32, u32)> {
        let lines = decode_mappings(&self.mappings)?;
        let segment = lines
            .get(line as usize)?
            .iter()
            .rev()
            .find(|m| m.generated_column <= column)?;
        Some((
            segment.original_line,
            segment.original_column + (column - segment.generated_column),
        ))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BUNDLE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Source(SourceSpan),
    /// Zero-length segment attributed to the original file.
    Placeholder,
}

pub struct Bundle<'s> {
    filename: String,
    source: &'s str,
    segments: Vec<Segment>,
}

impl<'s> Bundle<'s> {
    pub fn new(filename: impl Into<String>, source: &'s str) -> Self {
        Self {
            filename: filename.into(),
            source,
            segments: Vec::new(),
        }
    }

    pub fn push_literal(&mut self, text: impl Into<String>) {
        let text = text.into();
        if text.is_empty() {
            return;
        }
        match self.segments.last_mut() {
            Some(Segment::Literal(previous)) => previous.push_str(&text),
            _ => self.segments.push(Segment::Literal(text)),
        }
    }

    pub fn push_source(&mut self, span: SourceSpan) -> Result<(), InternalError> {
        span.slice(self.source)?;
        self.segments.push(Segment::Source(span));
        Ok(())
    }

    pub fn push_placeholder(&mut self) {
        self.segments.push(Segment::Placeholder);
    }

    pub fn push(&mut self, segment: Segment) -> Result<(), InternalError> {
        match segment {
            Segment::Literal(text) => self.push_literal(text),
            Segment::Source(span) => self.push_source(span)?,
            Segment::Placeholder => self.push_placeholder(),
        }
        Ok(())
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Joined output text and its source map.
    pub fn finish(self) -> (String, SourceMap) {
        let locator = Locator::new(self.source);
        let mut code = String::new();
        let mut lines: Vec<Vec<Mapping>> = vec![Vec::new()];
        let mut generated_column = 0u32;
        let mut spliced = false;

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => {
                    advance(text, &mut lines, &mut generated_column);
                    code.push_str(text);
                }
                Segment::Placeholder => {}
                Segment::Source(span) => {
                    spliced = true;
                    // Bounds were checked on push.
                    let text = &self.source[span.start as usize..span.end as usize];
                    let (mut original_line, mut original_column) =
                        locator.locate(self.source, span.start as usize);

                    let mut at_line_start = true;
                    for c in text.chars() {
                        if at_line_start {
                            if let Some(line) = lines.last_mut() {
                                line.push(Mapping {
                                    generated_column,
                                    source: 0,
                                    original_line,
                                    original_column,
                                });
                            }
                            at_line_start = false;
                        }
                        if c == '\n' {
                            lines.push(Vec::new());
                            generated_column = 0;
                            original_line += 1;
                            original_column = 0;
                            at_line_start = true;
                        } else {
                            let width = c.len_utf16() as u32;
                            generated_column += width;
                            original_column += width;
                        }
                    }
                    code.push_str(text);
                }
            }
        }

        let sources_content = if spliced {
            self.source.to_string()
        } else {
            String::new()
        };

        tracing::debug!(
            segments = self.segments.len(),
            lines = lines.len(),
            spliced,
            "bundle finished"
        );

        let map = SourceMap {
            version: 3,
            file: None,
            sources: vec![self.filename],
            sources_content: vec![sources_content],
            names: Vec::new(),
            mappings: encode_mappings(&lines),
        };
        (code, map)
    }
}

fn advance(text: &str, lines: &mut Vec<Vec<Mapping>>, column: &mut u32) {
    for c in text.chars() {
        if c == '\n' {
            lines.push(Vec::new());
            *column = 0;
        } else {
            *column += c.len_utf16() as u32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vlq_encoding() {
        let mut out = String::new();
        encode_vlq(&mut out, 0);
        encode_vlq(&mut out, 1);
        encode_vlq(&mut out, -1);
        encode_vlq(&mut out, 16);
        assert_eq!(out, "ACDgB");
        assert_eq!(decode_vlq_segment("ACDgB"), Some(vec![0, 1, -1, 16]));
    }

    #[test]
    fn test_empty_bundle_registers_file() {
        let mut bundle = Bundle::new("App.html", "<p>hi</p>");
        bundle.push_literal("const x = 1;");
        bundle.push_placeholder();
        let (code, map) = bundle.finish();
        assert_eq!(code, "const x = 1;");
        assert_eq!(map.sources, vec!["App.html".to_string()]);
        assert_eq!(map.sources_content, vec![String::new()]);
        assert_eq!(map.mappings, "");
    }

    #[test]
    fn test_spliced_span_is_attributed() {
        let source = "<script>\nlet count = 0;\nfunction inc() {}\n</script>";
        let start = source.find("let").unwrap() as u32;
        let end = source.find("\n</script>").unwrap() as u32;

        let mut bundle = Bundle::new("App.html", source);
        bundle.push_literal("// generated\n  ");
        bundle.push_source(SourceSpan::new(start, end)).unwrap();
        bundle.push_literal("\nexport {};");
        let (code, map) = bundle.finish();

        assert!(code.contains("let count = 0;\nfunction inc() {}"));
        assert_eq!(map.sources_content[0], source);
        // "let" at generated 1:2 comes from original 1:0.
        assert_eq!(map.original_position(1, 2), Some((1, 0)));
        assert_eq!(map.original_position(1, 6), Some((1, 4)));
        // "function" on the next generated line maps to original line 2.
        assert_eq!(map.original_position(2, 0), Some((2, 0)));
        assert_eq!(map.original_position(0, 0), None);
    }

    #[test]
    fn test_out_of_range_span_rejected() {
        let mut bundle = Bundle::new("App.html", "abc");
        assert!(bundle.push_source(SourceSpan::new(1, 9)).is_err());
    }

    #[test]
    fn test_map_serializes_sources_content() {
        let (_, map) = Bundle::new("App.html", "").finish();
        let json = map.to_json().unwrap();
        assert!(json.contains("\"sourcesContent\":[\"\"]"));
        assert!(json.contains("\"version\":3"));
    }
}

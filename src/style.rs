//! Style block collaborator.
//!
//! The backend does not scope or minify CSS. It asks a [`StyleRenderer`] for the final
//! stylesheet and for the selectors that match nothing in the template, and derives
//! the per-component scope id that fragment producers read as `%css_id`.

use crate::ir::{AttributeValue, Directive, ElementNode, SourceSpan, TemplateNode};
use crate::sourcemap::{Bundle, SourceMap};
use crate::visitor::{walk_element, TemplateVisitor};
use serde::Serialize;
use sha2::{Digest, Sha256};

pub const CSS_ID_PREFIX: &str = "c-";

/// Stable scope id for a style block: `c-` plus the first 8 hex digits of its SHA-256.
pub fn css_scope_id(css: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(css.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("{}{}", CSS_ID_PREFIX, &digest[..8])
}

/// The style block of one component.
pub struct StyleSource<'a> {
    pub filename: &'a str,
    pub source: &'a str,
    pub span: SourceSpan,
    pub scope_id: &'a str,
    pub nodes: &'a [TemplateNode],
}

impl StyleSource<'_> {
    pub fn css(&self) -> &str {
        self.source
            .get(self.span.start as usize..self.span.end as usize)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleOutput {
    pub code: String,
    pub map: Option<SourceMap>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnusedSelector {
    pub selector: String,
    pub span: SourceSpan,
}

pub trait StyleRenderer: Send + Sync {
    fn render(&self, style: &StyleSource<'_>, should_inject: bool) -> StyleOutput;

    fn unused_selectors(&self, style: &StyleSource<'_>) -> Vec<UnusedSelector>;
}

/// Emits the stylesheet unchanged and flags simple selectors nothing can match.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughStyle;

impl StyleRenderer for PassthroughStyle {
    fn render(&self, style: &StyleSource<'_>, should_inject: bool) -> StyleOutput {
        let mut bundle = Bundle::new(style.filename, style.source);
        if bundle.push_source(style.span).is_err() {
            return StyleOutput {
                code: String::new(),
                map: None,
            };
        }
        let (code, map) = bundle.finish();
        // Injected CSS becomes a string literal in the JS output and carries no map.
        let map = (!should_inject).then_some(map);
        StyleOutput { code, map }
    }

    fn unused_selectors(&self, style: &StyleSource<'_>) -> Vec<UnusedSelector> {
        let mut elements = ElementCollector::default();
        elements.visit_nodes(style.nodes);

        selectors(style.css(), style.span.start)
            .into_iter()
            .filter(|(selector, _)| {
                let Some(compound) = Compound::parse(selector) else {
                    return false;
                };
                !elements.found.iter().any(|el| compound.matches(el))
            })
            .map(|(selector, span)| UnusedSelector {
                selector: selector.to_string(),
                span,
            })
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SELECTOR MATCHING
// ═══════════════════════════════════════════════════════════════════════════════

/// Top-level rule selectors with absolute spans. At-rules are skipped.
fn selectors(css: &str, base: u32) -> Vec<(&str, SourceSpan)> {
    let bytes = css.as_bytes();
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut prelude_start = 0usize;
    let mut i = 0usize;

    while i < bytes.len() {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = css[i + 2..].find("*/").map_or(bytes.len(), |p| i + 2 + p + 2);
                if depth == 0 && css[prelude_start..i].trim().is_empty() {
                    prelude_start = end;
                }
                i = end;
                continue;
            }
            b'{' => {
                if depth == 0 {
                    let prelude = &css[prelude_start..i];
                    if !prelude.trim_start().starts_with('@') {
                        let mut offset = prelude_start;
                        for part in prelude.split(',') {
                            let trimmed = part.trim();
                            if !trimmed.is_empty() {
                                let lead = part.len() - part.trim_start().len();
                                let start = (offset + lead) as u32 + base;
                                out.push((trimmed, SourceSpan::new(start, start + trimmed.len() as u32)));
                            }
                            offset += part.len() + 1;
                        }
                    }
                }
                depth += 1;
            }
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    prelude_start = i + 1;
                }
            }
            b';' if depth == 0 => prelude_start = i + 1,
            _ => {}
        }
        i += 1;
    }
    out
}

struct FoundElement {
    name: String,
    classes: Vec<String>,
    dynamic_class: bool,
    has_id: bool,
}

#[derive(Default)]
struct ElementCollector {
    found: Vec<FoundElement>,
}

impl<'n> TemplateVisitor<'n> for ElementCollector {
    fn visit_element(&mut self, element: &'n ElementNode) {
        let mut found = FoundElement {
            name: element.name.to_ascii_lowercase(),
            classes: Vec::new(),
            dynamic_class: false,
            has_id: false,
        };
        for attribute in &element.attributes {
            match attribute {
                Directive::Attribute { name, value, .. } if name == "class" => {
                    for part in value {
                        match part {
                            AttributeValue::Text { data, .. } => found
                                .classes
                                .extend(data.split_whitespace().map(str::to_string)),
                            AttributeValue::Expression { .. } => found.dynamic_class = true,
                        }
                    }
                }
                Directive::Attribute { name, .. } if name == "id" => found.has_id = true,
                Directive::Spread { .. } => {
                    found.dynamic_class = true;
                    found.has_id = true;
                }
                _ => {}
            }
        }
        self.found.push(found);
        walk_element(self, element);
    }
}

/// The rightmost compound of a selector, reduced to tag, classes and id.
struct Compound {
    tag: Option<String>,
    classes: Vec<String>,
    id: bool,
}

impl Compound {
    /// `None` for selectors this matcher does not understand; those count as used.
    fn parse(selector: &str) -> Option<Compound> {
        if selector.contains(":global") || selector.contains('*') {
            return None;
        }
        let last = selector
            .rsplit(|c: char| c.is_whitespace() || matches!(c, '>' | '+' | '~'))
            .find(|part| !part.is_empty())?;
        // Pseudo-classes and attribute selectors do not narrow what we can check.
        let core = last.split([':', '[']).next().unwrap_or_default();
        if core.is_empty() {
            return None;
        }

        let mut compound = Compound {
            tag: None,
            classes: Vec::new(),
            id: false,
        };
        let mut rest = core;
        let tag_end = rest.find(['.', '#']).unwrap_or(rest.len());
        if tag_end > 0 {
            compound.tag = Some(rest[..tag_end].to_ascii_lowercase());
        }
        rest = &rest[tag_end..];

        while let Some(kind) = rest.chars().next() {
            let body = &rest[1..];
            let end = body.find(['.', '#']).unwrap_or(body.len());
            let name = &body[..end];
            if name.is_empty() {
                return None;
            }
            if kind == '.' {
                compound.classes.push(name.to_string());
            } else {
                compound.id = true;
            }
            rest = &body[end..];
        }
        Some(compound)
    }

    fn matches(&self, element: &FoundElement) -> bool {
        if let Some(tag) = &self.tag {
            if *tag != element.name {
                return false;
            }
        }
        if self.id && !element.has_id {
            return false;
        }
        element.dynamic_class
            || self
                .classes
                .iter()
                .all(|class| element.classes.iter().any(|c| c == class))
    }
}

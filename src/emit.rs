//! Placeholder code emission.
//!
//! Fragment producers describe output as a [`CodeTemplate`]: a list of [`Emit`]
//! instructions (literal text, runtime helper references, per-instance template
//! variables and verbatim source spans). The [`Emitter`] resolves helpers through the
//! [`AliasRegistry`], looks template variables up in [`TemplateVars`], and hands the
//! result to a [`Bundle`] for joining and source mapping.
//!
//! Producers that still speak the string grammar (`@helper`, `%var`, `[✂start-end✂]`)
//! go through [`CodeTemplate::parse`], which lowers the text to the same instructions.

use crate::alias::AliasRegistry;
use crate::diagnostics::{CompileError, InternalError};
use crate::ir::SourceSpan;
use crate::names::BOOTSTRAP_HELPER;
use crate::sourcemap::{Bundle, Segment, SourceMap};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

pub const HELPER_SIGIL: char = '@';
pub const TEMPLATE_VAR_SIGIL: char = '%';
pub const SPAN_MARKER_OPEN: &str = "[✂";
pub const SPAN_MARKER_CLOSE: &str = "✂]";

lazy_static! {
    static ref SIGIL_RE: Regex = Regex::new(r"(@+|#+|%+)(\w*(?:-\w*)?)").unwrap();
    static ref SPAN_MARKER_RE: Regex = Regex::new(r"\[✂(\d+)-(\d+)$").unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// INSTRUCTIONS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emit {
    Literal(String),
    /// A runtime helper or other logical name, resolved through `alias()`.
    Helper(String),
    TemplateVar(String),
    SourceSpan(SourceSpan),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeTemplate {
    instructions: Vec<Emit>,
}

impl CodeTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn instructions(&self) -> &[Emit] {
        &self.instructions
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn has_spans(&self) -> bool {
        self.instructions
            .iter()
            .any(|i| matches!(i, Emit::SourceSpan(_)))
    }

    pub fn push(&mut self, instruction: Emit) {
        if let Emit::Literal(text) = &instruction {
            if text.is_empty() {
                return;
            }
            if let Some(Emit::Literal(previous)) = self.instructions.last_mut() {
                previous.push_str(text);
                return;
            }
        }
        self.instructions.push(instruction);
    }

    pub fn append(&mut self, other: CodeTemplate) {
        for instruction in other.instructions {
            self.push(instruction);
        }
    }

    /// Lower text written in the sigil grammar.
    ///
    /// `@name` is a helper, `%name` a template variable and `[✂start-end✂]` a source
    /// span. Any other sigil run loses one leading character, so `@@x` is the literal
    /// `@x` and `#x` is `x`. A sigil with no name is kept as written.
    pub fn parse(text: &str) -> CodeTemplate {
        let mut template = CodeTemplate::new();
        let chunks: Vec<&str> = text.split(SPAN_MARKER_CLOSE).collect();
        let last = chunks.len() - 1;

        for (i, chunk) in chunks.iter().enumerate() {
            if i == last {
                template.push_sigil_text(chunk);
                break;
            }
            match parse_span_marker(chunk) {
                Some((before, span)) => {
                    template.push_sigil_text(before);
                    template.push(Emit::SourceSpan(span));
                }
                None => {
                    template.push_sigil_text(chunk);
                    template.push(Emit::Literal(SPAN_MARKER_CLOSE.to_string()));
                }
            }
        }
        template
    }

    fn push_sigil_text(&mut self, text: &str) {
        let mut cursor = 0;
        for caps in SIGIL_RE.captures_iter(text) {
            let (Some(whole), Some(sigil), Some(name)) = (caps.get(0), caps.get(1), caps.get(2))
            else {
                continue;
            };
            self.push(Emit::Literal(text[cursor..whole.start()].to_string()));
            cursor = whole.end();

            let (sigil, name) = (sigil.as_str(), name.as_str());
            if name.is_empty() || name.starts_with('-') {
                self.push(Emit::Literal(whole.as_str().to_string()));
            } else if sigil.len() > 1 || sigil.starts_with('#') {
                self.push(Emit::Literal(format!("{}{}", &sigil[1..], name)));
            } else if sigil.starts_with(HELPER_SIGIL) {
                // Helper names are identifiers; a trailing `-x` is ordinary code.
                match name.split_once('-') {
                    Some((helper, rest)) => {
                        self.push(Emit::Helper(helper.to_string()));
                        self.push(Emit::Literal(format!("-{}", rest)));
                    }
                    None => self.push(Emit::Helper(name.to_string())),
                }
            } else {
                self.push(Emit::TemplateVar(name.to_string()));
            }
        }
        self.push(Emit::Literal(text[cursor..].to_string()));
    }
}

fn parse_span_marker(chunk: &str) -> Option<(&str, SourceSpan)> {
    let caps = SPAN_MARKER_RE.captures(chunk)?;
    let whole = caps.get(0)?;
    let start = caps.get(1)?.as_str().parse().ok()?;
    let end = caps.get(2)?.as_str().parse().ok()?;
    Some((&chunk[..whole.start()], SourceSpan::new(start, end)))
}

/// Render a span in the string grammar.
pub fn span_marker(span: SourceSpan) -> String {
    format!(
        "{}{}-{}{}",
        SPAN_MARKER_OPEN, span.start, span.end, SPAN_MARKER_CLOSE
    )
}

/// Fluent construction of a [`CodeTemplate`].
#[derive(Debug, Default)]
pub struct CodeBuilder {
    template: CodeTemplate,
}

impl CodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn literal(mut self, text: impl Into<String>) -> Self {
        self.template.push(Emit::Literal(text.into()));
        self
    }

    pub fn helper(mut self, name: impl Into<String>) -> Self {
        self.template.push(Emit::Helper(name.into()));
        self
    }

    pub fn var(mut self, name: impl Into<String>) -> Self {
        self.template.push(Emit::TemplateVar(name.into()));
        self
    }

    pub fn span(mut self, span: SourceSpan) -> Self {
        self.template.push(Emit::SourceSpan(span));
        self
    }

    /// Append text in the sigil grammar.
    pub fn code(mut self, text: &str) -> Self {
        self.template.append(CodeTemplate::parse(text));
        self
    }

    pub fn append(mut self, other: CodeTemplate) -> Self {
        self.template.append(other);
        self
    }

    pub fn build(self) -> CodeTemplate {
        self.template
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TEMPLATE VARIABLES
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-instance values for `%name` placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TemplateVars {
    values: BTreeMap<String, String>,
}

impl TemplateVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TemplateVars {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut vars = TemplateVars::new();
        for (name, value) in iter {
            vars.insert(name, value);
        }
        vars
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EMITTER
// ═══════════════════════════════════════════════════════════════════════════════

/// A runtime helper the output module must import, under its emitted name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedHelper {
    pub name: String,
    pub alias: String,
}

pub struct Emitter<'r, 't> {
    registry: &'r mut AliasRegistry<'t>,
    vars: &'r TemplateVars,
    dev: bool,
    used_helpers: BTreeSet<String>,
}

impl<'r, 't> Emitter<'r, 't> {
    pub fn new(registry: &'r mut AliasRegistry<'t>, vars: &'r TemplateVars) -> Self {
        Self {
            registry,
            vars,
            dev: false,
            used_helpers: BTreeSet::new(),
        }
    }

    /// Substitute development variants of helpers where the catalogue has them.
    pub fn with_dev(mut self, dev: bool) -> Self {
        self.dev = dev;
        self
    }

    pub fn registry(&mut self) -> &mut AliasRegistry<'t> {
        self.registry
    }

    /// Emitted name for `@name`. Catalogue helpers are recorded as used.
    pub fn resolve_helper(&mut self, name: &str) -> String {
        let tables = self.registry.tables();
        if !tables.is_helper(name) {
            return self.registry.alias(name);
        }

        let helper = if self.dev {
            tables
                .dev_variant(name)
                .unwrap_or_else(|| name.to_string())
        } else {
            name.to_string()
        };
        let emitted = self.registry.alias(&helper);
        self.used_helpers.insert(helper);
        emitted
    }

    pub fn resolve_var(&self, name: &str) -> Result<&'r str, InternalError> {
        self.vars
            .get(name)
            .ok_or_else(|| InternalError::UnresolvedTemplateVar {
                name: name.to_string(),
            })
    }

    /// Resolve every instruction into bundle segments.
    ///
    /// A template without source spans still yields one placeholder segment so the
    /// original file stays registered in the map.
    pub fn resolve(
        &mut self,
        template: &CodeTemplate,
        source: &str,
    ) -> Result<Vec<Segment>, CompileError> {
        let mut segments = Vec::new();
        let mut pending = String::new();
        let mut spliced = false;

        for instruction in template.instructions() {
            match instruction {
                Emit::Literal(text) => pending.push_str(text),
                Emit::Helper(name) => {
                    let emitted = self.resolve_helper(name);
                    pending.push_str(&emitted);
                }
                Emit::TemplateVar(name) => pending.push_str(self.resolve_var(name)?),
                Emit::SourceSpan(span) => {
                    span.slice(source)?;
                    if !pending.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut pending)));
                    }
                    segments.push(Segment::Source(*span));
                    spliced = true;
                }
            }
        }

        if !pending.is_empty() {
            segments.push(Segment::Literal(pending));
        }
        if !spliced {
            segments.push(Segment::Placeholder);
        }

        tracing::debug!(
            instructions = template.instructions().len(),
            segments = segments.len(),
            helpers = self.used_helpers.len(),
            "template resolved"
        );
        Ok(segments)
    }

    /// Resolve `template` and bundle it on its own.
    pub fn render(
        &mut self,
        template: &CodeTemplate,
        filename: &str,
        source: &str,
    ) -> Result<(String, SourceMap), CompileError> {
        let mut bundle = Bundle::new(filename, source);
        for segment in self.resolve(template, source)? {
            bundle.push(segment)?;
        }
        Ok(bundle.finish())
    }

    pub fn used_helpers(&self) -> impl Iterator<Item = &str> {
        self.used_helpers.iter().map(String::as_str)
    }

    /// Helpers to import: every used helper plus the bootstrap helper, sorted.
    pub fn imported_helpers(&mut self) -> Vec<ImportedHelper> {
        let mut names = self.used_helpers.clone();
        names.insert(BOOTSTRAP_HELPER.to_string());

        names
            .into_iter()
            .map(|name| {
                let alias = self.registry.alias(&name);
                ImportedHelper { name, alias }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::NameTables;

    #[test]
    fn test_parse_sigils() {
        let template = CodeTemplate::parse("const @noop = 1; %slot");
        assert_eq!(
            template.instructions(),
            &[
                Emit::Literal("const ".to_string()),
                Emit::Helper("noop".to_string()),
                Emit::Literal(" = 1; ".to_string()),
                Emit::TemplateVar("slot".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_escapes() {
        let template = CodeTemplate::parse("a @@b #c %%d @ x");
        assert_eq!(
            template.instructions(),
            &[Emit::Literal("a @b c %d @ x".to_string())]
        );
    }

    #[test]
    fn test_parse_hyphenated_helper() {
        let template = CodeTemplate::parse("@count-1");
        assert_eq!(
            template.instructions(),
            &[
                Emit::Helper("count".to_string()),
                Emit::Literal("-1".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_span_markers() {
        let template = CodeTemplate::parse("a[✂3-7✂]b[✂x✂]c");
        assert_eq!(
            template.instructions(),
            &[
                Emit::Literal("a".to_string()),
                Emit::SourceSpan(SourceSpan::new(3, 7)),
                Emit::Literal("b[✂x✂]c".to_string()),
            ]
        );
        assert_eq!(span_marker(SourceSpan::new(3, 7)), "[✂3-7✂]");
    }

    #[test]
    fn test_builder_matches_parse() {
        let built = CodeBuilder::new()
            .literal("const ")
            .helper("noop")
            .literal(" = 1; ")
            .var("slot")
            .build();
        assert_eq!(built, CodeTemplate::parse("const @noop = 1; %slot"));
    }

    #[test]
    fn test_missing_template_var_is_internal_error() {
        let mut registry = AliasRegistry::new(NameTables::standard());
        let vars = TemplateVars::new();
        let mut emitter = Emitter::new(&mut registry, &vars);
        let template = CodeTemplate::parse("%missing");
        let err = emitter
            .resolve(&template, "")
            .expect_err("unresolved variable");
        assert_eq!(err.code(), "unresolved-template-var");
    }

    #[test]
    fn test_helper_outside_catalogue_is_aliased_not_imported() {
        let mut registry = AliasRegistry::new(NameTables::standard());
        registry.add_user_name("component");
        let vars = TemplateVars::new();
        let mut emitter = Emitter::new(&mut registry, &vars);
        assert_eq!(emitter.resolve_helper("component"), "component_1");
        assert_eq!(emitter.used_helpers().count(), 0);
    }

    #[test]
    fn test_imported_helpers_sorted_with_bootstrap() {
        let mut registry = AliasRegistry::new(NameTables::standard());
        let vars = TemplateVars::new();
        let mut emitter = Emitter::new(&mut registry, &vars);
        emitter.resolve_helper("noop");
        emitter.resolve_helper("assign");
        emitter.resolve_helper("noop");
        let names: Vec<_> = emitter
            .imported_helpers()
            .into_iter()
            .map(|h| h.name)
            .collect();
        assert_eq!(names, vec!["assign", "init", "noop"]);
    }
}

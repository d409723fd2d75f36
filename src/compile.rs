//! The compilation pipeline for one component.
//!
//! Phases run strictly in order: script analysis, template usage collection, alias
//! registry seeding, ref validation, warnings, fragment generation, placeholder
//! emission, module wrapping and bundling. A fatal diagnostic stops the unit at the
//! phase that raised it; warnings are handed to the caller once the unit is done.

use crate::alias::AliasRegistry;
use crate::diagnostics::{
    CompileError, Diagnostic, DiagnosticReporter, WARN_CSS_UNUSED_SELECTOR, WARN_UNUSED_ACTION,
    WARN_UNUSED_ANIMATION, WARN_UNUSED_EVENT, WARN_UNUSED_HELPER, WARN_UNUSED_TRANSITION,
};
use crate::emit::{CodeBuilder, CodeTemplate, Emit, Emitter, ImportedHelper, TemplateVars};
use crate::ir::{ComponentInput, MemberCategory, TemplateNode};
use crate::names::NameTables;
use crate::refs::validate_refs;
use crate::scope::{analyze_script, Identifier, IdentifierKind, RefUsage, ScriptAnalysis};
use crate::script::script_fragment;
use crate::sourcemap::{Bundle, SourceMap};
use crate::style::{css_scope_id, PassthroughStyle, StyleOutput, StyleRenderer, StyleSource};
use crate::template::TemplateAnalysis;
use crate::wrap::{ModuleFormat, ModuleWrapper, StandardWrapper, WrapContext, DEFAULT_SHARED_PATH};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

pub const DEFAULT_FILENAME: &str = "input.html";
pub const DEFAULT_COMPONENT_NAME: &str = "Component";

/// Template variable holding the emitted component name.
pub const VAR_NAME: &str = "name";
/// Template variable holding the style scope id, set when the component has a style block.
pub const VAR_CSS_ID: &str = "css_id";
/// Template variable holding the stylesheet as a JS string literal, set when CSS is injected.
pub const VAR_CSS: &str = "css";

// ═══════════════════════════════════════════════════════════════════════════════
// OPTIONS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompileOptions {
    /// Use development helper variants and stable generated names.
    pub dev: bool,
    /// Stable generated names without development helpers.
    pub test: bool,
    pub filename: Option<String>,
    pub name: String,
    pub custom_element: bool,
    pub format: ModuleFormat,
    pub shared_path: Option<String>,
    /// Inject the stylesheet into the JS output.
    pub css: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            dev: false,
            test: false,
            filename: None,
            name: DEFAULT_COMPONENT_NAME.to_string(),
            custom_element: false,
            format: ModuleFormat::Es,
            shared_path: None,
            css: true,
        }
    }
}

impl CompileOptions {
    pub fn stable_names(&self) -> bool {
        self.dev || self.test
    }

    pub fn should_inject_css(&self) -> bool {
        self.css && !self.custom_element
    }

    pub fn shared_path(&self) -> &str {
        self.shared_path.as_deref().unwrap_or(DEFAULT_SHARED_PATH)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FRAGMENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Everything a fragment producer may read or allocate from.
pub struct GenerationContext<'c, 't> {
    pub registry: &'c mut AliasRegistry<'t>,
    pub template_vars: &'c mut TemplateVars,
    pub source: &'c str,
    pub script: Option<&'c ScriptAnalysis>,
    pub template: &'c TemplateAnalysis,
    pub nodes: &'c [TemplateNode],
    pub options: &'c CompileOptions,
    pub should_inject_css: bool,
}

/// Producer of one region of output code.
pub trait FragmentBuilder: Send + Sync {
    fn build(&self, cx: &mut GenerationContext<'_, '_>) -> Result<CodeTemplate, CompileError>;
}

/// The component constructor and prototype wiring.
#[derive(Debug, Default, Clone, Copy)]
pub struct ComponentDefinition;

impl FragmentBuilder for ComponentDefinition {
    fn build(&self, cx: &mut GenerationContext<'_, '_>) -> Result<CodeTemplate, CompileError> {
        let mut builder = CodeBuilder::new()
            .code("function %name(options) {\n\t@init(this, options);\n");
        if cx.template_vars.get(VAR_CSS_ID).is_some() {
            builder = builder.code("\tthis._css = \"%css_id\";\n");
        }
        if cx.should_inject_css && cx.template_vars.get(VAR_CSS).is_some() {
            builder = builder.code("\tthis._styles = %css;\n");
        }
        Ok(builder
            .code("}\n\n@assign(%name.prototype, @proto);")
            .build())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OUTPUT
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileOutput {
    pub code: String,
    pub map: SourceMap,
    pub css: Option<StyleOutput>,
    /// Warnings, in the order they were raised.
    pub diagnostics: Vec<Diagnostic>,
    pub imported_helpers: Vec<ImportedHelper>,
    pub identifiers: Vec<Identifier>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILER
// ═══════════════════════════════════════════════════════════════════════════════

pub type WarningHandler = Box<dyn Fn(&Diagnostic) + Send + Sync>;

pub struct Compiler {
    options: CompileOptions,
    tables: NameTables,
    fragments: Vec<Box<dyn FragmentBuilder>>,
    style: Box<dyn StyleRenderer>,
    wrapper: Box<dyn ModuleWrapper>,
    on_warning: Option<WarningHandler>,
}

impl Compiler {
    pub fn new(options: CompileOptions) -> Self {
        Self {
            options,
            tables: NameTables::standard().clone(),
            fragments: vec![Box::new(ComponentDefinition)],
            style: Box::new(PassthroughStyle),
            wrapper: Box::new(StandardWrapper),
            on_warning: None,
        }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn with_tables(mut self, tables: NameTables) -> Self {
        self.tables = tables;
        self
    }

    /// Replace the fragment producers. The script passthrough always comes first.
    pub fn with_fragments(mut self, fragments: Vec<Box<dyn FragmentBuilder>>) -> Self {
        self.fragments = fragments;
        self
    }

    pub fn with_fragment(mut self, fragment: impl FragmentBuilder + 'static) -> Self {
        self.fragments.push(Box::new(fragment));
        self
    }

    pub fn with_style(mut self, style: impl StyleRenderer + 'static) -> Self {
        self.style = Box::new(style);
        self
    }

    pub fn with_wrapper(mut self, wrapper: impl ModuleWrapper + 'static) -> Self {
        self.wrapper = Box::new(wrapper);
        self
    }

    pub fn on_warning<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Diagnostic) + Send + Sync + 'static,
    {
        self.on_warning = Some(Box::new(handler));
        self
    }

    pub fn compile(&self, input: &ComponentInput) -> Result<CompileOutput, CompileError> {
        let options = &self.options;
        let filename = input
            .filename
            .as_deref()
            .or(options.filename.as_deref())
            .unwrap_or(DEFAULT_FILENAME);
        let source = input.source.as_str();
        let mut reporter = DiagnosticReporter::new(source, filename);
        tracing::debug!(filename, bytes = source.len(), "compiling component");

        // 1. Script
        let script = input
            .script
            .map(|span| analyze_script(&reporter, span))
            .transpose()?;

        // 2. Template
        let template = TemplateAnalysis::collect(&input.template, &input.members, &reporter)?;
        tracing::debug!(
            globals = template.globals(&self.tables).count(),
            state = template.state_references(&self.tables).count(),
            "template references classified"
        );

        // 3. Names
        let mut registry =
            AliasRegistry::new(&self.tables).with_stable_names(options.stable_names());
        if let Some(script) = &script {
            registry.add_user_names(script.user_names());
        }
        registry.add_user_names(template.references.iter().map(String::as_str));
        registry.add_user_names(template.identifiers.iter().map(|i| i.name.as_str()));

        // 4. Refs
        let mut usages: Vec<RefUsage> = script
            .as_ref()
            .map(|s| s.ref_usages.clone())
            .unwrap_or_default();
        usages.extend(template.ref_usages.iter().cloned());
        validate_refs(
            &usages,
            template.declared_refs.keys().map(String::as_str),
            &reporter,
        )?;

        // 5. Unused members
        for member in &input.members {
            if template.is_used(member) {
                continue;
            }
            let code = match member.category {
                MemberCategory::Helper => WARN_UNUSED_HELPER,
                MemberCategory::Action => WARN_UNUSED_ACTION,
                MemberCategory::Event => WARN_UNUSED_EVENT,
                MemberCategory::Transition => WARN_UNUSED_TRANSITION,
                MemberCategory::Animation => WARN_UNUSED_ANIMATION,
            };
            reporter.warn(
                code,
                format!("The '{}' {} is unused", member.name, member.category.singular()),
                member.span.start as usize,
                member.span.end as usize,
            );
        }

        // 6. Style
        let should_inject_css = options.should_inject_css();
        let mut template_vars = TemplateVars::new();
        let mut css = None;
        if let Some(span) = input.style {
            let scope_id = css_scope_id(span.slice(source)?);
            let style = StyleSource {
                filename,
                source,
                span,
                scope_id: &scope_id,
                nodes: &input.template,
            };
            for unused in self.style.unused_selectors(&style) {
                reporter.warn(
                    WARN_CSS_UNUSED_SELECTOR,
                    format!("Unused CSS selector \"{}\"", unused.selector),
                    unused.span.start as usize,
                    unused.span.end as usize,
                );
            }
            let output = self.style.render(&style, should_inject_css);
            if should_inject_css {
                template_vars.insert(VAR_CSS, js_string(&output.code));
            }
            template_vars.insert(VAR_CSS_ID, scope_id.as_str());
            css = Some(output);
        }

        let name = registry.alias(&options.name);
        template_vars.insert(VAR_NAME, name.as_str());

        // 7. Fragments
        let mut body = CodeTemplate::new();
        if let Some(script) = &script {
            body.append(script_fragment(source, script));
        }
        for fragment in &self.fragments {
            let mut cx = GenerationContext {
                registry: &mut registry,
                template_vars: &mut template_vars,
                source,
                script: script.as_ref(),
                template: &template,
                nodes: &input.template,
                options,
                should_inject_css,
            };
            let code = fragment.build(&mut cx)?;
            if code.is_empty() {
                continue;
            }
            if !body.is_empty() {
                body.push(Emit::Literal("\n\n".to_string()));
            }
            body.append(code);
        }

        // 8. Emission
        let mut emitter = Emitter::new(&mut registry, &template_vars).with_dev(options.dev);
        let segments = emitter.resolve(&body, source)?;
        let imported_helpers = emitter.imported_helpers();

        // 9. Wrapping
        let hoisted_imports = script
            .as_ref()
            .map(|s| s.hoisted_imports.as_slice())
            .unwrap_or_default();
        let wrapped = self.wrapper.wrap(&WrapContext {
            format: options.format,
            name: &name,
            shared_path: options.shared_path(),
            imported_helpers: &imported_helpers,
            hoisted_imports,
        });

        let mut bundle = Bundle::new(filename, source);
        bundle.push_literal(wrapped.intro);
        for segment in segments {
            bundle.push(segment)?;
        }
        bundle.push_literal(wrapped.outro);
        let (code, map) = bundle.finish();

        // 10. Identifiers and warnings
        let mut identifiers: Vec<Identifier> = script
            .as_ref()
            .map(|s| s.identifiers.clone())
            .unwrap_or_default();
        identifiers.extend(template.identifiers.iter().cloned());
        let template_globals: Vec<&str> = template
            .globals(&self.tables)
            .filter(|name| {
                !script.as_ref().map_or(false, |s| s.declared.contains(*name))
                    && !identifiers.iter().any(|i| i.name == *name)
            })
            .collect();
        identifiers.extend(template_globals.into_iter().map(|name| Identifier {
            name: name.to_string(),
            kind: IdentifierKind::FreeGlobal,
            scope_depth: 0,
        }));
        identifiers.extend(imported_helpers.iter().map(|helper| Identifier {
            name: helper.name.clone(),
            kind: IdentifierKind::RuntimeHelper,
            scope_depth: 0,
        }));

        let diagnostics = reporter.take_warnings();
        if let Some(handler) = &self.on_warning {
            for warning in &diagnostics {
                handler(warning);
            }
        }

        tracing::debug!(
            filename,
            bytes = code.len(),
            helpers = imported_helpers.len(),
            warnings = diagnostics.len(),
            "component compiled"
        );

        Ok(CompileOutput {
            code,
            map,
            css,
            diagnostics,
            imported_helpers,
            identifiers,
        })
    }

    /// Compile independent units in parallel. Results keep the input order.
    pub fn compile_batch(&self, inputs: &[ComponentInput]) -> Vec<Result<CompileOutput, CompileError>> {
        inputs.par_iter().map(|input| self.compile(input)).collect()
    }
}

fn js_string(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string())
}

/// Compile one component with the standard collaborators.
pub fn compile(input: &ComponentInput, options: CompileOptions) -> Result<CompileOutput, CompileError> {
    Compiler::new(options).compile(input)
}

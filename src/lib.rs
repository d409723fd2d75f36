//! # Component Compiler Backend
//!
//! Turns a parsed component (original source, script span, template tree, style span)
//! into an output module and a source map.
//!
//! ## Naming Invariants
//!
//! 1. **One Allocator Per Unit**: every compiled unit owns its [`AliasRegistry`]. Nothing
//!    mutable is shared between units; the name tables are static and read-only.
//!
//! 2. **Protected Names**: names the script declares, names it reads without declaring,
//!    and names template expressions read are never handed out to generated code.
//!
//! 3. **Memoized Aliases**: `alias(x)` returns the same emitted name for the whole unit.
//!    Collisions resolve to `x_1`, `x_2`, ... in allocation order.
//!
//! 4. **Stable Names**: with `dev` or `test` set, every fresh name carries a `$` marker
//!    so golden output does not shift when unrelated names change.
//!
//! ## Emission Contract
//!
//! Fragment producers hand the emitter a [`CodeTemplate`]. In the string grammar:
//! - `@name` resolves through the alias registry; catalogue helpers are imported.
//! - `%name` reads a per-unit template variable (`name`, `css_id`, `css`).
//! - `[✂start-end✂]` splices the original bytes `start..end` and maps them back.
//!
//! ## Failure Model
//!
//! A default export in the script, an undeclared `refs.<name>` or a parse error is a
//! fatal [`Diagnostic`]. An unresolvable template variable or an out-of-range span is
//! an [`InternalError`]. Unused members and unused selectors are warnings.

#[cfg(feature = "napi")]
use napi_derive::napi;

mod alias;
mod compile;
mod diagnostics;
mod emit;
mod fuzzy;
mod ir;
mod names;
mod refs;
mod scope;
mod script;
mod sourcemap;
mod style;
mod template;
mod visitor;
mod wrap;

#[cfg(test)]
mod compile_tests;

pub use alias::{AliasRegistry, NameScope, ScopedAllocator, STABLE_NAME_MARKER};
pub use compile::{
    compile, CompileOptions, CompileOutput, Compiler, ComponentDefinition, FragmentBuilder,
    GenerationContext, WarningHandler, DEFAULT_COMPONENT_NAME, DEFAULT_FILENAME, VAR_CSS,
    VAR_CSS_ID, VAR_NAME,
};
pub use diagnostics::{
    code_frame, CompileError, Diagnostic, DiagnosticReporter, InternalError, Locator, Position,
    Severity,
};
pub use emit::{
    span_marker, CodeBuilder, CodeTemplate, Emit, Emitter, ImportedHelper, TemplateVars, HELPER_SIGIL,
    SPAN_MARKER_CLOSE, SPAN_MARKER_OPEN, TEMPLATE_VAR_SIGIL,
};
pub use fuzzy::{best_match, similarity, MATCH_THRESHOLD};
pub use ir::*;
pub use names::{NameTables, BOOTSTRAP_HELPER, DEV_VARIANT_SUFFIX};
pub use refs::validate_refs;
pub use scope::{
    analyze_script, HoistedImport, HoistedSpecifier, Identifier, IdentifierKind, RefUsage,
    ScopeAnalyzer, ScopeTree, ScriptAnalysis, SpecifierKind,
};
pub use script::script_fragment;
pub use sourcemap::{decode_mappings, Bundle, Mapping, Segment, SourceMap};
pub use style::{css_scope_id, PassthroughStyle, CSS_ID_PREFIX, StyleOutput, StyleRenderer, StyleSource, UnusedSelector};
pub use template::TemplateAnalysis;
pub use visitor::TemplateVisitor;
pub use wrap::{ModuleFormat, ModuleWrapper, StandardWrapper, WrapContext, Wrapped, DEFAULT_SHARED_PATH};

pub mod codes {
    pub use crate::diagnostics::{
        ERR_DEFAULT_EXPORT, ERR_MISSING_REF, ERR_PARSE, WARN_CSS_UNUSED_SELECTOR,
        WARN_UNUSED_ACTION, WARN_UNUSED_ANIMATION, WARN_UNUSED_EVENT, WARN_UNUSED_HELPER,
        WARN_UNUSED_TRANSITION,
    };
}

/// Compile a JSON-encoded [`ComponentInput`]; returns the JSON-encoded [`CompileOutput`].
#[cfg(feature = "napi")]
#[napi]
pub fn compile_native(input_json: String, options_json: Option<String>) -> napi::Result<String> {
    let input: ComponentInput = serde_json::from_str(&input_json)
        .map_err(|e| napi::Error::from_reason(format!("Invalid component input: {}", e)))?;

    let options: CompileOptions = match options_json {
        Some(json) => serde_json::from_str(&json)
            .map_err(|e| napi::Error::from_reason(format!("Invalid options: {}", e)))?,
        None => CompileOptions::default(),
    };

    let output = compile(&input, options).map_err(|e| napi::Error::from_reason(e.to_string()))?;
    serde_json::to_string(&output).map_err(|e| napi::Error::from_reason(e.to_string()))
}

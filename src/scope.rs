//! Lexical scope analysis of the component script.
//!
//! One walk over the oxc AST builds the scope tree and records every declaration and
//! every identifier reference together with the scope it appeared in. References are
//! resolved only after the walk so hoisted declarations (`var`, function declarations)
//! resolve no matter where they appear.

use crate::diagnostics::{CompileError, DiagnosticReporter, ERR_DEFAULT_EXPORT, ERR_PARSE};
use crate::ir::SourceSpan;
use oxc_allocator::Allocator;
use oxc_ast::ast::*;
use oxc_ast_visit::Visit;
use oxc_parser::Parser;
use oxc_span::SourceType;
use oxc_syntax::scope::ScopeFlags;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};

/// Namespace through which scripts and template expressions reach element refs.
pub const REFS_NAMESPACE: &str = "refs";

// ═══════════════════════════════════════════════════════════════════════════════
// ANALYSIS TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdentifierKind {
    UserDeclared,
    FreeGlobal,
    RuntimeHelper,
    TemplateLocal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identifier {
    pub name: String,
    pub kind: IdentifierKind,
    pub scope_depth: u32,
}

pub type ScopeId = usize;

#[derive(Debug, Clone)]
pub struct ScopeNode {
    pub parent: Option<ScopeId>,
    pub declared: HashSet<String>,
    pub is_block: bool,
    pub depth: u32,
}

/// Arena of scopes; index 0 is the module scope.
#[derive(Debug, Clone)]
pub struct ScopeTree {
    nodes: Vec<ScopeNode>,
}

impl ScopeTree {
    fn new() -> Self {
        Self {
            nodes: vec![ScopeNode {
                parent: None,
                declared: HashSet::new(),
                is_block: false,
                depth: 0,
            }],
        }
    }

    pub fn root(&self) -> ScopeId {
        0
    }

    pub fn get(&self, id: ScopeId) -> &ScopeNode {
        &self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The scope declaring `name` as seen from `from`, climbing towards the root.
    pub fn resolve(&self, from: ScopeId, name: &str) -> Option<ScopeId> {
        let mut current = Some(from);
        while let Some(id) = current {
            let node = &self.nodes[id];
            if node.declared.contains(name) {
                return Some(id);
            }
            current = node.parent;
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "imported", rename_all = "camelCase")]
pub enum SpecifierKind {
    Default,
    Namespace,
    Named(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoistedSpecifier {
    pub kind: SpecifierKind,
    pub local: String,
}

/// An import declaration lifted out of the script body for the module wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoistedImport {
    pub source: String,
    pub specifiers: Vec<HoistedSpecifier>,
    pub span: SourceSpan,
}

/// A `refs.<name>` (or `this.refs.<name>`) access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefUsage {
    pub name: String,
    pub span: SourceSpan,
}

#[derive(Debug, Clone)]
pub struct ScriptAnalysis {
    pub span: SourceSpan,
    pub scopes: ScopeTree,
    /// Every name declared in any scope of the script.
    pub declared: BTreeSet<String>,
    /// Names read somewhere without a matching declaration.
    pub free: BTreeSet<String>,
    pub identifiers: Vec<Identifier>,
    pub hoisted_imports: Vec<HoistedImport>,
    pub ref_usages: Vec<RefUsage>,
    pub default_export: Option<SourceSpan>,
}

impl ScriptAnalysis {
    /// Declared and free names; none of these may be chosen for generated code.
    pub fn user_names(&self) -> impl Iterator<Item = &str> {
        self.declared.iter().chain(self.free.iter()).map(String::as_str)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ANALYZER
// ═══════════════════════════════════════════════════════════════════════════════

struct PendingRef {
    usage: RefUsage,
    /// Scope of a bare `refs` object; the usage only counts if `refs` is free there.
    bare_in: Option<ScopeId>,
}

pub struct ScopeAnalyzer {
    tree: ScopeTree,
    stack: Vec<ScopeId>,
    hoist_var: bool,
    saved_hoist: Vec<bool>,
    references: Vec<(String, ScopeId)>,
    identifiers: Vec<Identifier>,
    pending_refs: Vec<PendingRef>,
    hoisted_imports: Vec<HoistedImport>,
    default_export: Option<SourceSpan>,
}

impl Default for ScopeAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeAnalyzer {
    pub fn new() -> Self {
        Self {
            tree: ScopeTree::new(),
            stack: vec![0],
            hoist_var: false,
            saved_hoist: Vec::new(),
            references: Vec::new(),
            identifiers: Vec::new(),
            pending_refs: Vec::new(),
            hoisted_imports: Vec::new(),
            default_export: None,
        }
    }

    /// Analyze an already-parsed script.
    pub fn analyze(program: &Program<'_>) -> ScriptAnalysis {
        let mut analyzer = Self::new();
        analyzer.visit_program(program);
        analyzer.finish(SourceSpan::new(program.span.start, program.span.end))
    }

    fn current(&self) -> ScopeId {
        *self.stack.last().unwrap_or(&0)
    }

    /// Nearest enclosing function (or module) scope; where `var` lands.
    fn function_scope(&self) -> ScopeId {
        self.stack
            .iter()
            .rev()
            .copied()
            .find(|id| !self.tree.nodes[*id].is_block)
            .unwrap_or(0)
    }

    fn push_scope(&mut self, is_block: bool) {
        let parent = self.current();
        let depth = self.tree.nodes[parent].depth + 1;
        self.tree.nodes.push(ScopeNode {
            parent: Some(parent),
            declared: HashSet::new(),
            is_block,
            depth,
        });
        self.stack.push(self.tree.nodes.len() - 1);
        self.saved_hoist.push(self.hoist_var);
        self.hoist_var = false;
    }

    fn pop_scope(&mut self) {
        self.stack.pop();
        self.hoist_var = self.saved_hoist.pop().unwrap_or(false);
    }

    fn declare(&mut self, scope: ScopeId, name: &str) {
        let node = &mut self.tree.nodes[scope];
        if node.declared.insert(name.to_string()) {
            self.identifiers.push(Identifier {
                name: name.to_string(),
                kind: IdentifierKind::UserDeclared,
                scope_depth: node.depth,
            });
        }
    }

    fn record_ref(&mut self, name: &str, span: oxc_span::Span, bare_in: Option<ScopeId>) {
        self.pending_refs.push(PendingRef {
            usage: RefUsage {
                name: name.to_string(),
                span: SourceSpan::new(span.start, span.end),
            },
            bare_in,
        });
    }

    fn finish(self, span: SourceSpan) -> ScriptAnalysis {
        let Self {
            tree,
            references,
            mut identifiers,
            pending_refs,
            hoisted_imports,
            default_export,
            ..
        } = self;

        let mut free = BTreeSet::new();
        for (name, scope) in &references {
            if tree.resolve(*scope, name).is_none() && free.insert(name.clone()) {
                identifiers.push(Identifier {
                    name: name.clone(),
                    kind: IdentifierKind::FreeGlobal,
                    scope_depth: 0,
                });
            }
        }

        let declared = tree
            .nodes
            .iter()
            .flat_map(|node| node.declared.iter().cloned())
            .collect();

        let ref_usages = pending_refs
            .into_iter()
            .filter(|pending| match pending.bare_in {
                Some(scope) => tree.resolve(scope, REFS_NAMESPACE).is_none(),
                None => true,
            })
            .map(|pending| pending.usage)
            .collect();

        tracing::debug!(
            scopes = tree.nodes.len(),
            references = references.len(),
            free = free.len(),
            "script scope analysis complete"
        );

        ScriptAnalysis {
            span,
            scopes: tree,
            declared,
            free,
            identifiers,
            hoisted_imports,
            ref_usages,
            default_export,
        }
    }
}

fn module_export_name(name: &ModuleExportName) -> String {
    match name {
        ModuleExportName::IdentifierName(id) => id.name.to_string(),
        ModuleExportName::IdentifierReference(id) => id.name.to_string(),
        ModuleExportName::StringLiteral(s) => s.value.to_string(),
    }
}

impl<'a> Visit<'a> for ScopeAnalyzer {
    fn visit_block_statement(&mut self, block: &BlockStatement<'a>) {
        self.push_scope(true);
        oxc_ast_visit::walk::walk_block_statement(self, block);
        self.pop_scope();
    }

    fn visit_for_statement(&mut self, stmt: &ForStatement<'a>) {
        self.push_scope(true);
        oxc_ast_visit::walk::walk_for_statement(self, stmt);
        self.pop_scope();
    }

    fn visit_for_in_statement(&mut self, stmt: &ForInStatement<'a>) {
        self.push_scope(true);
        oxc_ast_visit::walk::walk_for_in_statement(self, stmt);
        self.pop_scope();
    }

    fn visit_for_of_statement(&mut self, stmt: &ForOfStatement<'a>) {
        self.push_scope(true);
        oxc_ast_visit::walk::walk_for_of_statement(self, stmt);
        self.pop_scope();
    }

    fn visit_switch_statement(&mut self, stmt: &SwitchStatement<'a>) {
        self.visit_expression(&stmt.discriminant);
        self.push_scope(true);
        for case in &stmt.cases {
            self.visit_switch_case(case);
        }
        self.pop_scope();
    }

    fn visit_catch_clause(&mut self, clause: &CatchClause<'a>) {
        self.push_scope(true);
        oxc_ast_visit::walk::walk_catch_clause(self, clause);
        self.pop_scope();
    }

    fn visit_function(&mut self, func: &Function<'a>, _flags: ScopeFlags) {
        let is_declaration = matches!(func.r#type, FunctionType::FunctionDeclaration);
        if is_declaration {
            if let Some(id) = &func.id {
                let scope = self.current();
                self.declare(scope, &id.name);
            }
        }

        self.push_scope(false);
        if !is_declaration {
            // A named function expression sees its own name.
            if let Some(id) = &func.id {
                let scope = self.current();
                self.declare(scope, &id.name);
            }
        }
        self.visit_formal_parameters(&func.params);
        if let Some(body) = &func.body {
            self.visit_function_body(body);
        }
        self.pop_scope();
    }

    fn visit_arrow_function_expression(&mut self, func: &ArrowFunctionExpression<'a>) {
        self.push_scope(false);
        self.visit_formal_parameters(&func.params);
        self.visit_function_body(&func.body);
        self.pop_scope();
    }

    fn visit_class(&mut self, class: &Class<'a>) {
        if let Some(id) = &class.id {
            let scope = self.current();
            self.declare(scope, &id.name);
        }
        if let Some(super_class) = &class.super_class {
            self.visit_expression(super_class);
        }
        self.push_scope(true);
        self.visit_class_body(&class.body);
        self.pop_scope();
    }

    fn visit_variable_declaration(&mut self, decl: &VariableDeclaration<'a>) {
        let is_var = decl.kind == VariableDeclarationKind::Var;
        for declarator in &decl.declarations {
            let saved = std::mem::replace(&mut self.hoist_var, is_var);
            self.visit_binding_pattern(&declarator.id);
            self.hoist_var = saved;
            if let Some(init) = &declarator.init {
                self.visit_expression(init);
            }
        }
    }

    fn visit_binding_identifier(&mut self, ident: &BindingIdentifier<'a>) {
        let scope = if self.hoist_var {
            self.function_scope()
        } else {
            self.current()
        };
        self.declare(scope, &ident.name);
    }

    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        let scope = self.current();
        self.references.push((ident.name.to_string(), scope));
    }

    fn visit_import_declaration(&mut self, decl: &ImportDeclaration<'a>) {
        let specifiers = decl
            .specifiers
            .as_ref()
            .map(|specifiers| {
                specifiers
                    .iter()
                    .map(|specifier| match specifier {
                        ImportDeclarationSpecifier::ImportSpecifier(s) => HoistedSpecifier {
                            kind: SpecifierKind::Named(module_export_name(&s.imported)),
                            local: s.local.name.to_string(),
                        },
                        ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                            HoistedSpecifier {
                                kind: SpecifierKind::Default,
                                local: s.local.name.to_string(),
                            }
                        }
                        ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                            HoistedSpecifier {
                                kind: SpecifierKind::Namespace,
                                local: s.local.name.to_string(),
                            }
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        self.hoisted_imports.push(HoistedImport {
            source: decl.source.value.to_string(),
            specifiers,
            span: SourceSpan::new(decl.span.start, decl.span.end),
        });
        oxc_ast_visit::walk::walk_import_declaration(self, decl);
    }

    fn visit_export_default_declaration(&mut self, decl: &ExportDefaultDeclaration<'a>) {
        self.default_export = Some(SourceSpan::new(decl.span.start, decl.span.end));
        oxc_ast_visit::walk::walk_export_default_declaration(self, decl);
    }

    fn visit_export_specifier(&mut self, specifier: &ExportSpecifier<'a>) {
        if specifier.exported.name() == "default" && self.default_export.is_none() {
            self.default_export = Some(SourceSpan::new(specifier.span.start, specifier.span.end));
        }
        oxc_ast_visit::walk::walk_export_specifier(self, specifier);
    }

    fn visit_static_member_expression(&mut self, expr: &StaticMemberExpression<'a>) {
        match &expr.object {
            Expression::Identifier(ident) if ident.name == REFS_NAMESPACE => {
                let scope = self.current();
                self.record_ref(&expr.property.name, expr.property.span, Some(scope));
            }
            Expression::StaticMemberExpression(inner)
                if inner.property.name == REFS_NAMESPACE
                    && matches!(inner.object, Expression::ThisExpression(_)) =>
            {
                self.record_ref(&expr.property.name, expr.property.span, None);
            }
            _ => {}
        }
        oxc_ast_visit::walk::walk_static_member_expression(self, expr);
    }

    fn visit_computed_member_expression(&mut self, expr: &ComputedMemberExpression<'a>) {
        if let Expression::StringLiteral(name) = &expr.expression {
            match &expr.object {
                Expression::Identifier(ident) if ident.name == REFS_NAMESPACE => {
                    let scope = self.current();
                    self.record_ref(&name.value, name.span, Some(scope));
                }
                Expression::StaticMemberExpression(inner)
                    if inner.property.name == REFS_NAMESPACE
                        && matches!(inner.object, Expression::ThisExpression(_)) =>
                {
                    self.record_ref(&name.value, name.span, None);
                }
                _ => {}
            }
        }
        oxc_ast_visit::walk::walk_computed_member_expression(self, expr);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCRIPT ENTRY POINT
// ═══════════════════════════════════════════════════════════════════════════════

/// Copy of `source` with every byte outside `span` blanked (newlines kept), so spans
/// reported by the parser are offsets into the original input.
fn mask_outside(source: &str, span: SourceSpan) -> String {
    let mut masked = String::with_capacity(source.len());
    for (i, c) in source.char_indices() {
        if span.contains(i as u32) || c == '\n' {
            masked.push(c);
        } else {
            masked.extend(std::iter::repeat(' ').take(c.len_utf8()));
        }
    }
    masked
}

/// Parse and analyze the script block at `span`.
pub fn analyze_script(
    reporter: &DiagnosticReporter<'_>,
    span: SourceSpan,
) -> Result<ScriptAnalysis, CompileError> {
    let source = reporter.source();
    span.check(source.len())?;

    let masked = mask_outside(source, span);
    let allocator = Allocator::default();
    let source_type = SourceType::default().with_module(true);
    let ret = Parser::new(&allocator, &masked, source_type).parse();

    if let Some(error) = ret.errors.first() {
        let (start, end) = error
            .labels
            .as_ref()
            .and_then(|labels| labels.first())
            .map(|label| (label.offset(), label.offset() + label.len()))
            .unwrap_or((span.start as usize, span.start as usize));
        return Err(reporter.error(
            ERR_PARSE,
            format!("Invalid script: {}", error),
            start,
            end,
        ));
    }

    let mut analysis = ScopeAnalyzer::analyze(&ret.program);
    analysis.span = span;

    if let Some(export) = analysis.default_export {
        return Err(reporter.error(
            ERR_DEFAULT_EXPORT,
            "A component script cannot have a default export",
            export.start as usize,
            export.end as usize,
        ));
    }

    Ok(analysis)
}

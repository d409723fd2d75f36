//! Template usage collection.
//!
//! Walks the template tree once and records what the template declares and reads:
//! element refs, `refs.<name>` accesses inside expressions, category members used by
//! directives or expressions, identifiers read from the component scope, and the
//! template-local names each block introduces.

use crate::diagnostics::{CompileError, DiagnosticReporter, ERR_PARSE};
use crate::ir::{DeclaredMember, Directive, ExpressionRef, MemberCategory, SourceSpan, TemplateNode};
use crate::names::NameTables;
use crate::scope::{Identifier, IdentifierKind, RefUsage, REFS_NAMESPACE};
use crate::visitor::{walk_directive, TemplateVisitor};
use oxc_allocator::Allocator;
use oxc_ast::ast::{BindingIdentifier, Expression, IdentifierReference, StaticMemberExpression};
use oxc_ast_visit::Visit;
use oxc_parser::Parser;
use oxc_span::SourceType;
use std::collections::{BTreeMap, BTreeSet, HashSet};

#[derive(Debug, Clone, Default)]
pub struct TemplateAnalysis {
    /// Refs declared with `ref:name`, keyed by name, first declaration wins.
    pub declared_refs: BTreeMap<String, SourceSpan>,
    pub ref_usages: Vec<RefUsage>,
    /// Names read by template expressions that are not template-local.
    pub references: BTreeSet<String>,
    pub used_members: HashSet<(MemberCategory, String)>,
    pub identifiers: Vec<Identifier>,
}

impl TemplateAnalysis {
    pub fn collect(
        nodes: &[TemplateNode],
        members: &[DeclaredMember],
        reporter: &DiagnosticReporter<'_>,
    ) -> Result<TemplateAnalysis, CompileError> {
        let mut collector = UsageCollector {
            reporter,
            members: members
                .iter()
                .map(|m| (m.category, m.name.clone()))
                .collect(),
            locals: Vec::new(),
            analysis: TemplateAnalysis::default(),
            error: None,
        };
        collector.visit_nodes(nodes);

        if let Some(error) = collector.error {
            return Err(error);
        }

        let analysis = collector.analysis;
        tracing::debug!(
            refs = analysis.declared_refs.len(),
            ref_usages = analysis.ref_usages.len(),
            references = analysis.references.len(),
            "template usage collected"
        );
        Ok(analysis)
    }

    /// References that resolve to whitelisted globals (`Math`, `JSON`, ...).
    pub fn globals<'a>(&'a self, tables: &'a NameTables) -> impl Iterator<Item = &'a str> {
        self.references
            .iter()
            .map(String::as_str)
            .filter(|name| tables.is_global(name))
    }

    /// References the component itself has to provide.
    pub fn state_references<'a>(
        &'a self,
        tables: &'a NameTables,
    ) -> impl Iterator<Item = &'a str> {
        self.references
            .iter()
            .map(String::as_str)
            .filter(|name| !tables.is_global(name))
    }

    pub fn is_used(&self, member: &DeclaredMember) -> bool {
        self.used_members
            .contains(&(member.category, member.name.clone()))
    }
}

struct UsageCollector<'r, 's> {
    reporter: &'r DiagnosticReporter<'s>,
    members: HashSet<(MemberCategory, String)>,
    locals: Vec<String>,
    analysis: TemplateAnalysis,
    error: Option<CompileError>,
}

impl UsageCollector<'_, '_> {
    fn mark(&mut self, category: MemberCategory, name: &str) {
        let key = (category, name.to_string());
        if self.members.contains(&key) {
            self.analysis.used_members.insert(key);
        }
    }

    fn is_local(&self, name: &str) -> bool {
        self.locals.iter().any(|local| local == name)
    }

    fn collect_expression(&mut self, expression: ExpressionRef) -> Result<(), CompileError> {
        let source = self.reporter.source();
        let code = expression.span.slice(source)?;
        let offset = expression.span.start;

        let allocator = Allocator::default();
        let source_type = SourceType::default().with_module(true);
        let parsed = Parser::new(&allocator, code, source_type).parse_expression();

        let expr = match parsed {
            Ok(expr) => expr,
            Err(errors) => {
                let first = errors.first();
                let detail = first
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "unexpected token".to_string());
                let (start, end) = first
                    .and_then(|e| e.labels.as_ref())
                    .and_then(|labels| labels.first())
                    .map(|label| {
                        let start = offset as usize + label.offset();
                        (start, start + label.len())
                    })
                    .unwrap_or((offset as usize, expression.span.end as usize));
                return Err(self.reporter.error(
                    ERR_PARSE,
                    format!("Invalid expression: {}", detail),
                    start,
                    end,
                ));
            }
        };

        let mut collector = ExpressionCollector::default();
        collector.visit_expression(&expr);

        for (name, _) in collector.references {
            if collector.bindings.contains(&name) || self.is_local(&name) {
                continue;
            }
            self.mark(MemberCategory::Helper, &name);
            self.analysis.references.insert(name);
        }

        if !self.is_local(REFS_NAMESPACE) && !collector.bindings.contains(REFS_NAMESPACE) {
            for (name, span) in collector.refs {
                self.analysis.ref_usages.push(RefUsage {
                    name,
                    span: SourceSpan::new(span.start + offset, span.end + offset),
                });
            }
        }
        Ok(())
    }
}

impl<'n> TemplateVisitor<'n> for UsageCollector<'_, '_> {
    fn visit_node(&mut self, node: &'n TemplateNode) {
        if self.error.is_none() {
            crate::visitor::walk_node(self, node);
        }
    }

    fn visit_directive(&mut self, directive: &'n Directive) {
        match directive {
            Directive::Ref { name, span } => {
                self.analysis
                    .declared_refs
                    .entry(name.clone())
                    .or_insert(*span);
            }
            Directive::Action { name, .. } => self.mark(MemberCategory::Action, name),
            Directive::EventHandler { name, .. } => self.mark(MemberCategory::Event, name),
            Directive::Transition { name, .. } => self.mark(MemberCategory::Transition, name),
            Directive::Animation { name, .. } => self.mark(MemberCategory::Animation, name),
            Directive::Attribute { .. } | Directive::Binding { .. } | Directive::Spread { .. } => {}
        }
        walk_directive(self, directive);
    }

    fn visit_expression(&mut self, expression: ExpressionRef) {
        if self.error.is_some() {
            return;
        }
        if let Err(error) = self.collect_expression(expression) {
            self.error = Some(error);
        }
    }

    fn enter_locals(&mut self, locals: &[&'n str]) {
        let depth = self.locals.len() as u32 + 1;
        for local in locals {
            self.analysis.identifiers.push(Identifier {
                name: local.to_string(),
                kind: IdentifierKind::TemplateLocal,
                scope_depth: depth,
            });
            self.locals.push(local.to_string());
        }
    }

    fn leave_locals(&mut self, locals: &[&'n str]) {
        let keep = self.locals.len().saturating_sub(locals.len());
        self.locals.truncate(keep);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXPRESSION COLLECTOR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct ExpressionCollector {
    references: Vec<(String, oxc_span::Span)>,
    bindings: HashSet<String>,
    refs: Vec<(String, oxc_span::Span)>,
}

impl<'a> Visit<'a> for ExpressionCollector {
    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        self.references.push((ident.name.to_string(), ident.span));
    }

    fn visit_binding_identifier(&mut self, ident: &BindingIdentifier<'a>) {
        self.bindings.insert(ident.name.to_string());
    }

    fn visit_static_member_expression(&mut self, expr: &StaticMemberExpression<'a>) {
        if let Expression::Identifier(ident) = &expr.object {
            if ident.name == REFS_NAMESPACE {
                self.refs
                    .push((expr.property.name.to_string(), expr.property.span));
            }
        }
        oxc_ast_visit::walk::walk_static_member_expression(self, expr);
    }
}

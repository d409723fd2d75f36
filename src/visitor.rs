use crate::ir::{Directive, ElementNode, ExpressionRef, TemplateNode};

/// The TemplateVisitor trait defines the single authoritative traversal of the template tree.
///
/// Rules:
/// 1. Traversal order is source order and fixed.
/// 2. Implementers override `visit_*` methods to add behavior.
/// 3. Implementers MUST call the matching `walk_*` function to continue traversal unless pruning is intended.
/// 4. Template-local names (each-block contexts, await values) are announced with
///    `enter_locals` before the fragment that sees them and `leave_locals` after it.
pub trait TemplateVisitor<'n> {
    fn visit_nodes(&mut self, nodes: &'n [TemplateNode]) {
        walk_nodes(self, nodes);
    }

    fn visit_node(&mut self, node: &'n TemplateNode) {
        walk_node(self, node);
    }

    fn visit_element(&mut self, element: &'n ElementNode) {
        walk_element(self, element);
    }

    fn visit_directive(&mut self, directive: &'n Directive) {
        walk_directive(self, directive);
    }

    fn visit_expression(&mut self, _expression: ExpressionRef) {
        // Leaf, nothing to walk by default
    }

    fn enter_locals(&mut self, _locals: &[&'n str]) {}

    fn leave_locals(&mut self, _locals: &[&'n str]) {}
}

pub fn walk_nodes<'n, V: TemplateVisitor<'n> + ?Sized>(visitor: &mut V, nodes: &'n [TemplateNode]) {
    for node in nodes {
        visitor.visit_node(node);
    }
}

pub fn walk_node<'n, V: TemplateVisitor<'n> + ?Sized>(visitor: &mut V, node: &'n TemplateNode) {
    let key = match node {
        TemplateNode::Element(el) => {
            visitor.visit_element(el);
            return;
        }
        TemplateNode::MustacheTag(tag) | TemplateNode::RawMustacheTag(tag) => {
            visitor.visit_expression(tag.expression);
            None
        }
        TemplateNode::IfBlock(block) => {
            visitor.visit_expression(block.expression);
            None
        }
        TemplateNode::EachBlock(block) => {
            visitor.visit_expression(block.expression);
            block.key
        }
        TemplateNode::AwaitBlock(block) => {
            visitor.visit_expression(block.expression);
            None
        }
        TemplateNode::Text(_) | TemplateNode::Comment(_) => None, // Leaf
    };

    for (i, list) in node.child_lists().into_iter().enumerate() {
        visitor.enter_locals(&list.locals);
        if i == 0 {
            // An each-block key is evaluated with the context in scope.
            if let Some(key) = key {
                visitor.visit_expression(key);
            }
        }
        visitor.visit_nodes(list.nodes);
        visitor.leave_locals(&list.locals);
    }
}

pub fn walk_element<'n, V: TemplateVisitor<'n> + ?Sized>(visitor: &mut V, element: &'n ElementNode) {
    for directive in &element.attributes {
        visitor.visit_directive(directive);
    }
    visitor.visit_nodes(&element.children);
}

pub fn walk_directive<'n, V: TemplateVisitor<'n> + ?Sized>(visitor: &mut V, directive: &'n Directive) {
    for expression in directive.expressions() {
        visitor.visit_expression(expression);
    }
}

//! Input IR: the parsed component handed to the backend.
//!
//! The template tree is a tagged-variant AST. Every node kind lists its child
//! fragments explicitly through [`TemplateNode::child_lists`], so traversal never has
//! to guess which fields hold children.

use crate::diagnostics::InternalError;
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════════
// SPANS
// ═══════════════════════════════════════════════════════════════════════════════

/// Byte range `[start, end)` into the original component source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start: u32,
    pub end: u32,
}

impl SourceSpan {
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, offset: u32) -> bool {
        self.start <= offset && offset < self.end
    }

    /// Ensure the span lies inside a `len`-byte input.
    pub fn check(&self, len: usize) -> Result<(), InternalError> {
        if self.start > self.end || self.end as usize > len {
            return Err(InternalError::InvalidSpan {
                start: self.start,
                end: self.end,
                len,
            });
        }
        Ok(())
    }

    pub fn slice<'s>(&self, source: &'s str) -> Result<&'s str, InternalError> {
        self.check(source.len())?;
        source
            .get(self.start as usize..self.end as usize)
            .ok_or(InternalError::InvalidSpan {
                start: self.start,
                end: self.end,
                len: source.len(),
            })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TEMPLATE NODES
// ═══════════════════════════════════════════════════════════════════════════════

/// A JavaScript expression embedded in the template, addressed by its source span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpressionRef {
    pub span: SourceSpan,
}

impl ExpressionRef {
    pub const fn new(start: u32, end: u32) -> Self {
        Self {
            span: SourceSpan::new(start, end),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TemplateNode {
    Element(ElementNode),
    Text(TextNode),
    MustacheTag(TagNode),
    RawMustacheTag(TagNode),
    IfBlock(IfBlockNode),
    EachBlock(EachBlockNode),
    AwaitBlock(AwaitBlockNode),
    Comment(TextNode),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementNode {
    pub name: String,
    #[serde(default)]
    pub attributes: Vec<Directive>,
    #[serde(default)]
    pub children: Vec<TemplateNode>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextNode {
    pub data: String,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagNode {
    pub expression: ExpressionRef,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IfBlockNode {
    pub expression: ExpressionRef,
    #[serde(default)]
    pub children: Vec<TemplateNode>,
    #[serde(default)]
    pub else_children: Vec<TemplateNode>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EachBlockNode {
    pub expression: ExpressionRef,
    pub context: String,
    #[serde(default)]
    pub index: Option<String>,
    #[serde(default)]
    pub key: Option<ExpressionRef>,
    #[serde(default)]
    pub children: Vec<TemplateNode>,
    #[serde(default)]
    pub else_children: Vec<TemplateNode>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwaitBlockNode {
    pub expression: ExpressionRef,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub pending: Vec<TemplateNode>,
    #[serde(default)]
    pub then: Vec<TemplateNode>,
    #[serde(default)]
    pub catch: Vec<TemplateNode>,
    pub span: SourceSpan,
}

/// Child fragment of a node, tagged with the template-local names it introduces.
pub struct ChildList<'n> {
    pub nodes: &'n [TemplateNode],
    pub locals: Vec<&'n str>,
}

impl TemplateNode {
    pub fn span(&self) -> SourceSpan {
        match self {
            TemplateNode::Element(n) => n.span,
            TemplateNode::Text(n) | TemplateNode::Comment(n) => n.span,
            TemplateNode::MustacheTag(n) | TemplateNode::RawMustacheTag(n) => n.span,
            TemplateNode::IfBlock(n) => n.span,
            TemplateNode::EachBlock(n) => n.span,
            TemplateNode::AwaitBlock(n) => n.span,
        }
    }

    /// Every child fragment of this node, in source order.
    pub fn child_lists(&self) -> Vec<ChildList<'_>> {
        match self {
            TemplateNode::Element(el) => vec![ChildList {
                nodes: &el.children,
                locals: vec![],
            }],
            TemplateNode::IfBlock(block) => vec![
                ChildList {
                    nodes: &block.children,
                    locals: vec![],
                },
                ChildList {
                    nodes: &block.else_children,
                    locals: vec![],
                },
            ],
            TemplateNode::EachBlock(block) => {
                let mut locals = vec![block.context.as_str()];
                if let Some(index) = &block.index {
                    locals.push(index.as_str());
                }
                vec![
                    ChildList {
                        nodes: &block.children,
                        locals,
                    },
                    ChildList {
                        nodes: &block.else_children,
                        locals: vec![],
                    },
                ]
            }
            TemplateNode::AwaitBlock(block) => vec![
                ChildList {
                    nodes: &block.pending,
                    locals: vec![],
                },
                ChildList {
                    nodes: &block.then,
                    locals: block.value.iter().map(String::as_str).collect(),
                },
                ChildList {
                    nodes: &block.catch,
                    locals: block.error.iter().map(String::as_str).collect(),
                },
            ],
            TemplateNode::Text(_)
            | TemplateNode::Comment(_)
            | TemplateNode::MustacheTag(_)
            | TemplateNode::RawMustacheTag(_) => vec![],
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DIRECTIVES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AttributeValue {
    Text { data: String, span: SourceSpan },
    Expression { expression: ExpressionRef },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Directive {
    Attribute {
        name: String,
        #[serde(default)]
        value: Vec<AttributeValue>,
        span: SourceSpan,
    },
    Ref {
        name: String,
        span: SourceSpan,
    },
    Action {
        name: String,
        #[serde(default)]
        expression: Option<ExpressionRef>,
        span: SourceSpan,
    },
    EventHandler {
        name: String,
        #[serde(default)]
        expression: Option<ExpressionRef>,
        span: SourceSpan,
    },
    Transition {
        name: String,
        #[serde(default)]
        intro: bool,
        #[serde(default)]
        outro: bool,
        #[serde(default)]
        expression: Option<ExpressionRef>,
        span: SourceSpan,
    },
    Animation {
        name: String,
        #[serde(default)]
        expression: Option<ExpressionRef>,
        span: SourceSpan,
    },
    Binding {
        name: String,
        expression: ExpressionRef,
        span: SourceSpan,
    },
    Spread {
        expression: ExpressionRef,
        span: SourceSpan,
    },
}

impl Directive {
    /// Expressions carried by this directive, in source order.
    pub fn expressions(&self) -> Vec<ExpressionRef> {
        match self {
            Directive::Attribute { value, .. } => value
                .iter()
                .filter_map(|v| match v {
                    AttributeValue::Expression { expression } => Some(*expression),
                    AttributeValue::Text { .. } => None,
                })
                .collect(),
            Directive::Ref { .. } => vec![],
            Directive::Action { expression, .. }
            | Directive::EventHandler { expression, .. }
            | Directive::Transition { expression, .. }
            | Directive::Animation { expression, .. } => expression.iter().copied().collect(),
            Directive::Binding { expression, .. } | Directive::Spread { expression, .. } => {
                vec![*expression]
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPONENT INPUT
// ═══════════════════════════════════════════════════════════════════════════════

/// Category of a component-level declaration that the template may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MemberCategory {
    Helper,
    Action,
    Event,
    Transition,
    Animation,
}

impl MemberCategory {
    pub fn singular(&self) -> &'static str {
        match self {
            MemberCategory::Helper => "helper",
            MemberCategory::Action => "action",
            MemberCategory::Event => "event",
            MemberCategory::Transition => "transition",
            MemberCategory::Animation => "animation",
        }
    }
}

/// A declared helper/action/event/transition/animation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclaredMember {
    pub category: MemberCategory,
    pub name: String,
    pub span: SourceSpan,
}

/// A parsed component: original text plus the pieces the front end located in it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentInput {
    pub source: String,
    /// Overrides the filename from the compile options for this unit.
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub script: Option<SourceSpan>,
    #[serde(default)]
    pub template: Vec<TemplateNode>,
    #[serde(default)]
    pub style: Option<SourceSpan>,
    #[serde(default)]
    pub members: Vec<DeclaredMember>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_checks() {
        assert!(SourceSpan::new(0, 3).check(3).is_ok());
        assert!(SourceSpan::new(2, 4).check(3).is_err());
        assert!(SourceSpan::new(3, 2).check(10).is_err());
        assert_eq!(SourceSpan::new(1, 3).slice("abcd").unwrap(), "bc");
        assert!(SourceSpan::new(1, 2).slice("é").is_err());
    }

    #[test]
    fn test_each_block_children_carry_locals() {
        let node = TemplateNode::EachBlock(EachBlockNode {
            expression: ExpressionRef::new(0, 5),
            context: "item".to_string(),
            index: Some("i".to_string()),
            key: None,
            children: vec![],
            else_children: vec![],
            span: SourceSpan::new(0, 10),
        });
        let lists = node.child_lists();
        assert_eq!(lists.len(), 2);
        assert_eq!(lists[0].locals, vec!["item", "i"]);
        assert!(lists[1].locals.is_empty());
    }

    #[test]
    fn test_deserialize_template_json() {
        let json = r#"[
            {"type": "element", "name": "input", "attributes": [
                {"type": "ref", "name": "field", "span": {"start": 7, "end": 16}},
                {"type": "event-handler", "name": "click", "expression": {"span": {"start": 26, "end": 40}}, "span": {"start": 17, "end": 41}}
            ], "span": {"start": 0, "end": 43}}
        ]"#;
        let nodes: Vec<TemplateNode> = serde_json::from_str(json).expect("valid template json");
        match &nodes[0] {
            TemplateNode::Element(el) => {
                assert_eq!(el.name, "input");
                assert_eq!(el.attributes.len(), 2);
                assert_eq!(el.attributes[1].expressions()[0].span, SourceSpan::new(26, 40));
            }
            other => panic!("unexpected node {:?}", other),
        }
    }
}

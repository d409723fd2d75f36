//! Script passthrough: the component script, spliced verbatim minus hoisted imports.

use crate::emit::{CodeTemplate, Emit};
use crate::ir::SourceSpan;
use crate::scope::ScriptAnalysis;

/// Code template that reproduces the script body.
///
/// Import declarations are left out; the module wrapper re-emits them at the top of
/// the output. Gaps holding only whitespace are dropped.
pub fn script_fragment(source: &str, analysis: &ScriptAnalysis) -> CodeTemplate {
    let mut template = CodeTemplate::new();
    let span = analysis.span;

    let mut holes: Vec<SourceSpan> = analysis
        .hoisted_imports
        .iter()
        .map(|import| import.span)
        .filter(|hole| hole.start >= span.start && hole.end <= span.end)
        .collect();
    holes.sort_by_key(|hole| hole.start);

    let mut cursor = span.start;
    let mut pieces = Vec::new();
    for hole in holes {
        if hole.start > cursor {
            pieces.push(SourceSpan::new(cursor, hole.start));
        }
        cursor = cursor.max(hole.end);
    }
    if span.end > cursor {
        pieces.push(SourceSpan::new(cursor, span.end));
    }

    for piece in pieces {
        let blank = source
            .get(piece.start as usize..piece.end as usize)
            .map_or(false, |text| text.trim().is_empty());
        if blank {
            continue;
        }
        if !template.is_empty() {
            template.push(Emit::Literal("\n".to_string()));
        }
        template.push(Emit::SourceSpan(piece));
    }

    tracing::debug!(
        imports = analysis.hoisted_imports.len(),
        spans = template.instructions().len(),
        "script fragment built"
    );
    template
}

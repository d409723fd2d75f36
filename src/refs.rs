//! Validation of `refs.<name>` accesses against the refs the template declares.

use crate::diagnostics::{CompileError, DiagnosticReporter, ERR_MISSING_REF};
use crate::fuzzy;
use crate::scope::RefUsage;

/// Fail on the first usage (in source order) that names an undeclared ref.
pub fn validate_refs<'d, I>(
    usages: &[RefUsage],
    declared: I,
    reporter: &DiagnosticReporter<'_>,
) -> Result<(), CompileError>
where
    I: IntoIterator<Item = &'d str>,
{
    let declared: Vec<&str> = declared.into_iter().collect();

    let mut ordered: Vec<&RefUsage> = usages.iter().collect();
    ordered.sort_by_key(|usage| usage.span.start);

    for usage in ordered {
        if declared.contains(&usage.name.as_str()) {
            continue;
        }

        let mut message = format!("'{}' is not a valid ref", usage.name);
        if let Some(suggestion) = fuzzy::best_match(&usage.name, declared.iter().copied()) {
            message.push_str(&format!(" (did you mean '{}'?)", suggestion));
        }
        return Err(reporter.error(
            ERR_MISSING_REF,
            message,
            usage.span.start as usize,
            usage.span.end as usize,
        ));
    }

    tracing::debug!(usages = usages.len(), declared = declared.len(), "refs validated");
    Ok(())
}

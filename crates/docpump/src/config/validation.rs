//! Configuration validation.

use super::RunConfig;

/// Collect every validation problem in the configuration.
///
/// Returns an empty list for a valid configuration. All problems are
/// reported at once so the caller sees the full picture before any I/O.
pub fn validate(config: &RunConfig) -> Vec<String> {
    let mut errors = Vec::new();

    if config.input.is_empty() {
        errors.push("`input` is a required option".to_string());
    }
    if config.output.is_empty() {
        errors.push("`output` is a required option".to_string());
    }
    if config.limit == 0 {
        errors.push("`limit` must be at least 1".to_string());
    }
    if config.interval_cap > 0 && config.concurrency_interval == 0 {
        errors.push("`interval_cap` requires a non-zero `concurrency_interval`".to_string());
    }

    errors
}

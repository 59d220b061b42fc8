//! Validation runs and the findings view built from their results.

pub mod findings;
pub mod result;
pub mod runner;

pub use findings::{
    build_view, categories, CategoryGroup, Finding, FindingsViewModel, Severity, SeverityBucket,
    SeverityFilter, SummaryCounts,
};
pub use result::{ValidationOutcome, ValidationResult};
pub use runner::{RunnerStatus, ValidationRunner};

use serde::Serialize;

use super::findings::Finding;

/// Terminal output of one validation run. Replaced wholesale by the next run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub succeeded: bool,
    pub summary_message: String,
    /// May be empty; an empty list is still a result.
    pub findings: Vec<Finding>,
}

/// Business reading of a result that came back over a working transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// The service validated the document and reported nothing.
    Clean,
    /// The service validated the document and reported findings.
    ProblemsFound,
    /// The service could not validate the document.
    Rejected,
}

impl ValidationResult {
    pub fn outcome(&self) -> ValidationOutcome {
        match (self.succeeded, self.findings.is_empty()) {
            (false, _) => ValidationOutcome::Rejected,
            (true, true) => ValidationOutcome::Clean,
            (true, false) => ValidationOutcome::ProblemsFound,
        }
    }
}

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::result::ValidationResult;
use crate::error::RunError;
use crate::gateway::{ValidationGateway, ValidationRequest};
use crate::session::ValidationTargets;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerStatus {
    Idle,
    Running,
}

#[derive(Debug)]
struct RunnerState {
    status: RunnerStatus,
    last_result: Option<ValidationResult>,
}

/// Runs one validation at a time against already-resolved remote paths.
///
/// A second `run` while one is pending is rejected with
/// [`RunError::AlreadyRunning`]; nothing is queued.
pub struct ValidationRunner {
    gateway: Arc<dyn ValidationGateway>,
    state: Mutex<RunnerState>,
}

/// Puts the runner back to idle however the run ends, including when the
/// run future is dropped.
struct RunGuard<'a> {
    state: &'a Mutex<RunnerState>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.state.lock().status = RunnerStatus::Idle;
    }
}

impl ValidationRunner {
    pub fn new(gateway: Arc<dyn ValidationGateway>) -> Self {
        Self {
            gateway,
            state: Mutex::new(RunnerState {
                status: RunnerStatus::Idle,
                last_result: None,
            }),
        }
    }

    pub fn status(&self) -> RunnerStatus {
        self.state.lock().status
    }

    pub fn last_result(&self) -> Option<ValidationResult> {
        self.state.lock().last_result.clone()
    }

    pub async fn run(
        &self,
        targets: ValidationTargets,
        instructions: &str,
    ) -> Result<ValidationResult, RunError> {
        {
            let mut state = self.state.lock();
            if state.status == RunnerStatus::Running {
                debug!("validation already running, rejecting new run");
                return Err(RunError::AlreadyRunning);
            }
            state.status = RunnerStatus::Running;
            state.last_result = None;
        }
        let _guard = RunGuard { state: &self.state };

        let request = ValidationRequest {
            input_path: targets.input_path,
            reference_paths: targets.reference_paths,
            instructions: instructions.trim().to_string(),
        };
        debug!(
            input = %request.input_path,
            references = request.reference_paths.len(),
            "starting validation"
        );

        let result = self.gateway.validate(&request).await.map_err(|err| {
            warn!(error = %err, "validation request failed");
            RunError::Transport(err)
        })?;

        info!(
            succeeded = result.succeeded,
            findings = result.findings.len(),
            "validation finished"
        );
        self.state.lock().last_result = Some(result.clone());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tokio::sync::{oneshot, Mutex as AsyncMutex};

    use super::*;
    use crate::error::TransportError;
    use crate::validation::{Finding, Severity};

    struct GatedValidator {
        release: AsyncMutex<Option<oneshot::Receiver<Result<ValidationResult, TransportError>>>>,
        seen: Mutex<Vec<ValidationRequest>>,
    }

    #[async_trait]
    impl ValidationGateway for GatedValidator {
        async fn validate(
            &self,
            request: &ValidationRequest,
        ) -> Result<ValidationResult, TransportError> {
            self.seen.lock().push(request.clone());
            let rx = self.release.lock().await.take();
            match rx {
                Some(rx) => rx
                    .await
                    .unwrap_or_else(|_| Err(TransportError::Network("dropped".into()))),
                None => Err(TransportError::Network("no response scripted".into())),
            }
        }
    }

    fn gated() -> (Arc<GatedValidator>, oneshot::Sender<Result<ValidationResult, TransportError>>) {
        let (tx, rx) = oneshot::channel();
        let gateway = Arc::new(GatedValidator {
            release: AsyncMutex::new(Some(rx)),
            seen: Mutex::new(Vec::new()),
        });
        (gateway, tx)
    }

    fn targets() -> ValidationTargets {
        ValidationTargets {
            input_path: "input/sow.pdf".into(),
            reference_paths: vec!["ref/policy.pdf".into()],
        }
    }

    #[tokio::test]
    async fn second_run_is_rejected_while_first_is_pending() {
        let (gateway, tx) = gated();
        let runner = Arc::new(ValidationRunner::new(gateway.clone()));

        let first = {
            let runner = runner.clone();
            tokio::spawn(async move { runner.run(targets(), "  check billing  ").await })
        };
        while runner.status() != RunnerStatus::Running {
            tokio::task::yield_now().await;
        }

        assert_eq!(runner.run(targets(), "").await, Err(RunError::AlreadyRunning));

        let result = ValidationResult {
            succeeded: true,
            summary_message: "done".into(),
            findings: vec![Finding::new("Billing", Severity::Critical, "Rate exceeds cap")],
        };
        tx.send(Ok(result.clone())).unwrap();

        assert_eq!(first.await.unwrap(), Ok(result.clone()));
        assert_eq!(runner.status(), RunnerStatus::Idle);
        assert_eq!(runner.last_result(), Some(result));

        let seen = gateway.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].instructions, "check billing");
    }

    #[tokio::test]
    async fn transport_failure_is_typed_and_clears_result() {
        let (gateway, tx) = gated();
        let runner = ValidationRunner::new(gateway);
        tx.send(Err(TransportError::Status {
            status: 500,
            message: "backend down".into(),
        }))
        .unwrap();

        let err = runner.run(targets(), "").await.unwrap_err();
        assert!(matches!(err, RunError::Transport(TransportError::Status { status: 500, .. })));
        assert_eq!(runner.status(), RunnerStatus::Idle);
        assert_eq!(runner.last_result(), None);
    }

    #[tokio::test]
    async fn unsuccessful_validation_is_a_result_not_an_error() {
        let (gateway, tx) = gated();
        let runner = ValidationRunner::new(gateway);
        tx.send(Ok(ValidationResult {
            succeeded: false,
            summary_message: "Input document is empty".into(),
            findings: vec![],
        }))
        .unwrap();

        let result = runner.run(targets(), "").await.unwrap();
        assert!(!result.succeeded);
        assert_eq!(
            runner.last_result().map(|r| r.summary_message),
            Some("Input document is empty".to_string())
        );
    }
}

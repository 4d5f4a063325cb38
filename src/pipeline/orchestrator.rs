//! Runs the step table over one context.
//!
//! Steps execute strictly in order, each under a timeout. A non-critical
//! failure is logged as a warning and the run continues; a critical failure
//! aborts with whatever context has been produced so far. A run may start at
//! any named step with a prepopulated context, and may stop after one.

use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use uuid::Uuid;

use super::context::PipelineContext;
use super::audit::{LogEntry, LogLevel, RunLog};
use super::steps::{failure_annotation, step_index, Criticality, StepDescriptor, StepEnv, StepReport, STEPS};
use crate::config::ForgeConfig;
use crate::error::PipelineError;
use crate::services::{ReportLinks, Services};
use crate::validation::Validator;

/// Per-run overrides of the orchestrator's configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_width: Option<usize>,
    /// Finish successfully after this step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_after: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub report_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Resume at this step instead of the first one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_step: Option<String>,
    /// Context carried over from an earlier run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<PipelineContext>,
    #[serde(default)]
    pub options: RunOptions,
}

impl RunRequest {
    pub fn new(report_id: impl Into<String>) -> Self {
        Self {
            report_id: report_id.into(),
            ..Self::default()
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn resume_at(mut self, step: impl Into<String>, context: PipelineContext) -> Self {
        self.start_step = Some(step.into());
        self.context = Some(context);
        self
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }
}

/// Why a run failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunError {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    pub message: String,
}

impl RunError {
    pub fn new(error: &PipelineError, step: Option<&str>) -> Self {
        Self {
            kind: error.kind().to_string(),
            step: step.map(str::to_string),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    pub success: bool,
    pub session_id: String,
    pub report_id: String,
    pub links: ReportLinks,
    /// Steps that ran to completion, in order, warnings included.
    pub completed_steps: Vec<String>,
    pub context: PipelineContext,
    pub logs: Vec<LogEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RunError>,
}

/// A step result after criticality has been applied.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Continue(String),
    Warn(String),
    Abort(PipelineError),
}

impl StepOutcome {
    pub fn fold(criticality: Criticality, result: Result<StepReport, PipelineError>) -> Self {
        match (result, criticality) {
            (Ok(StepReport::Done(message)), _) => StepOutcome::Continue(message),
            (Ok(StepReport::Skipped(reason)), _) => StepOutcome::Continue(format!("skipped: {}", reason)),
            (Ok(StepReport::Warning(message)), _) => StepOutcome::Warn(message),
            (Err(e), Criticality::NonCritical) => {
                StepOutcome::Warn(format!("{}: {}; continuing", e.kind(), e))
            }
            (Err(e), Criticality::Critical) => StepOutcome::Abort(e),
        }
    }
}

pub struct Orchestrator {
    services: Services,
    config: ForgeConfig,
    permits: Arc<Semaphore>,
}

impl Orchestrator {
    pub fn new(services: Services, config: ForgeConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_runs.max(1)));
        Self {
            services,
            config,
            permits,
        }
    }

    pub fn config(&self) -> &ForgeConfig {
        &self.config
    }

    /// The canonical step order. Has no side effects.
    pub fn list_steps() -> &'static [StepDescriptor] {
        &STEPS
    }

    fn resolve_config(&self, options: &RunOptions) -> ForgeConfig {
        let mut config = self.config.clone();
        if let Some(template_id) = &options.template_id {
            config.template_id = template_id.clone();
        }
        if let Some(folder_id) = &options.folder_id {
            config.folder_id = folder_id.clone();
        }
        if let Some(grid_width) = options.grid_width {
            config.grid_width = grid_width;
        }
        config
    }

    /// Execute one report run. Always returns an outcome with the full log.
    pub async fn run(&self, request: RunRequest) -> RunOutcome {
        let session_id = request
            .session_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut log = RunLog::new(&session_id);
        let mut ctx = request.context.clone().unwrap_or_default();

        let (start, stop) = match self.plan_range(&request) {
            Ok(range) => range,
            Err(e) => {
                log.error(format!("run rejected: {}", e));
                return outcome(&request, session_id, ctx, log, Vec::new(), Some(RunError::new(&e, None)));
            }
        };

        let config = self.resolve_config(&request.options);
        let env = StepEnv {
            services: &self.services,
            config: &config,
            report_id: &request.report_id,
        };
        log.info(format!(
            "run started for report '{}' at step '{}'",
            request.report_id, STEPS[start].name
        ));

        let mut completed = Vec::new();
        let mut warnings = 0;
        for descriptor in &STEPS[start..=stop] {
            let result = match tokio::time::timeout(config.step_timeout, descriptor.execute(&env, &mut ctx)).await {
                Ok(result) => result,
                Err(_) => Err(PipelineError::StepTimeout {
                    step: descriptor.name.to_string(),
                    after: config.step_timeout,
                }),
            };

            match StepOutcome::fold(descriptor.criticality, result) {
                StepOutcome::Continue(message) => {
                    log.step(descriptor.name, LogLevel::Info, message);
                }
                StepOutcome::Warn(message) => {
                    warnings += 1;
                    log.step(descriptor.name, LogLevel::Warn, message);
                }
                StepOutcome::Abort(e) => {
                    log.step(
                        descriptor.name,
                        LogLevel::Error,
                        format!("{}: {}; aborting run", e.kind(), e),
                    );
                    self.annotate_failure(&config, &ctx, descriptor.name, &e, &mut log)
                        .await;
                    let error = RunError::new(&e, Some(descriptor.name));
                    return outcome(&request, session_id, ctx, log, completed, Some(error));
                }
            }
            completed.push(descriptor.name.to_string());
        }

        if stop + 1 < STEPS.len() {
            log.info(format!("stopped after step '{}'", STEPS[stop].name));
        }
        log.info(format!(
            "run finished: {} steps, {} warnings",
            completed.len(),
            warnings
        ));
        outcome(&request, session_id, ctx, log, completed, None)
    }

    /// Run independent requests concurrently, at most `max_concurrent_runs`
    /// at a time. Outcomes come back in request order.
    pub async fn run_batch(&self, requests: Vec<RunRequest>) -> Vec<RunOutcome> {
        let runs = requests.into_iter().map(|request| async move {
            let _permit = self.permits.acquire().await.ok();
            self.run(request).await
        });
        join_all(runs).await
    }

    /// Index range of the steps this request executes.
    fn plan_range(&self, request: &RunRequest) -> Result<(usize, usize), PipelineError> {
        let start = match &request.start_step {
            Some(name) => step_index(name).ok_or_else(|| PipelineError::UnknownStep(name.clone()))?,
            None => 0,
        };
        let stop = match &request.options.stop_after {
            Some(name) => step_index(name).ok_or_else(|| PipelineError::UnknownStep(name.clone()))?,
            None => STEPS.len() - 1,
        };
        request.check().map_err(PipelineError::Validation)?;

        if stop < start {
            return Err(PipelineError::Validation(format!(
                "stop step '{}' comes before start step '{}'",
                STEPS[stop].name, STEPS[start].name
            )));
        }
        Ok((start, stop))
    }

    /// Best effort: write the failure into the document at the configured
    /// anchor so readers of a half-built report see it. Failure here is only
    /// logged.
    async fn annotate_failure(
        &self,
        config: &ForgeConfig,
        ctx: &PipelineContext,
        step: &str,
        error: &PipelineError,
        log: &mut RunLog,
    ) {
        let Ok(document_id) = ctx.document_id() else {
            return;
        };
        let batch = [failure_annotation(config.error_anchor_offset, step, error)];
        let write = self.services.documents.apply_batch(document_id, &batch);
        match tokio::time::timeout(config.step_timeout, write).await {
            Ok(Ok(())) => log.info(format!(
                "error annotation written to '{}' at offset {}",
                document_id, config.error_anchor_offset
            )),
            Ok(Err(e)) => log.warn(format!("could not write error annotation: {}", e)),
            Err(_) => log.warn("could not write error annotation: timed out"),
        }
    }
}

fn outcome(
    request: &RunRequest,
    session_id: String,
    context: PipelineContext,
    log: RunLog,
    completed_steps: Vec<String>,
    error: Option<RunError>,
) -> RunOutcome {
    RunOutcome {
        success: error.is_none(),
        session_id,
        report_id: request.report_id.clone(),
        links: context.links(),
        completed_steps,
        context,
        logs: log.into_entries(),
        error,
    }
}

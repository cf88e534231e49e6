//! Plan execution
//!
//! Runs a plan level by level. Every step of a level is launched at once and
//! the level is awaited as a whole before the next one starts, so a step only
//! ever sees results of strictly earlier levels. Step failures are recorded in
//! the result map; only plan-level problems (malformed input, cycles) abort.
//! The LLM is NOT involved here.

pub mod levels;
pub mod references;

pub use levels::{group_into_levels, DependencyLevel};
pub use references::{resolve_references, resolve_with_context, Reference, Resolved, Resolver};

use crate::config::Settings;
use crate::error::AgentError;
use crate::models::{
    step_key, ExecutionPlan, ExecutionStatus, PlanStep, ResultMap, StepFailure, StepObservation,
};
use crate::tools::ToolInvoker;
use crate::Result;
use futures::future::join_all;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Maximum steps allowed per plan unless configured otherwise
const MAX_STEPS_PER_PLAN: usize = 50;
const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Deadline for a single tool invocation. `None` waits indefinitely.
    pub step_timeout: Option<Duration>,
    pub max_steps: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            step_timeout: Some(DEFAULT_STEP_TIMEOUT),
            max_steps: MAX_STEPS_PER_PLAN,
        }
    }
}

impl ExecutorConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            step_timeout: settings.step_timeout,
            max_steps: settings.max_plan_steps,
        }
    }
}

/// Everything a plan run produced.
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    pub levels: Vec<DependencyLevel>,
    pub results: ResultMap,
    /// One entry per step, in step order.
    pub observations: Vec<StepObservation>,
    pub cancelled: bool,
}

impl ExecutionReport {
    pub fn failed_steps(&self) -> usize {
        self.observations
            .iter()
            .filter(|o| o.status != ExecutionStatus::Success)
            .count()
    }

    pub fn succeeded_steps(&self) -> usize {
        self.observations.len() - self.failed_steps()
    }

    /// Successful outputs keyed by tool id instead of step index. A tool used
    /// by several steps keeps its first output under the bare id and the rest
    /// under `<tool_id>#<step>`.
    pub fn named_results(&self, plan: &ExecutionPlan) -> ResultMap {
        let mut named = ResultMap::new();

        for observation in &self.observations {
            if observation.status != ExecutionStatus::Success {
                continue;
            }
            let Some(step) = plan.steps.get(observation.index) else {
                continue;
            };
            let Some(output) = self.results.get(&step_key(observation.index)) else {
                continue;
            };

            let key = if named.contains_key(&step.tool_id) {
                format!("{}#{}", step.tool_id, observation.index)
            } else {
                step.tool_id.clone()
            };
            named.insert(key, output.clone());
        }

        named
    }
}

/// Runs execution plans against a tool capability.
pub struct PlanExecutor {
    tools: Arc<dyn ToolInvoker>,
    config: ExecutorConfig,
}

struct StepOutcome {
    index: usize,
    output: Result<Value>,
    elapsed_ms: u64,
    unresolved: Vec<String>,
}

impl PlanExecutor {
    pub fn new(tools: Arc<dyn ToolInvoker>) -> Self {
        Self::with_config(tools, ExecutorConfig::default())
    }

    pub fn with_config(tools: Arc<dyn ToolInvoker>, config: ExecutorConfig) -> Self {
        Self { tools, config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run a plan given as raw JSON (a step array or `{"steps": [...]}`) and
    /// return the aggregated result map.
    pub async fn execute(&self, plan: &Value) -> Result<ResultMap> {
        let plan = ExecutionPlan::from_value(plan)?;
        let report = self.run(&plan, &Map::new()).await?;
        Ok(report.results)
    }

    pub async fn run(&self, plan: &ExecutionPlan, context: &Map<String, Value>) -> Result<ExecutionReport> {
        self.run_with_cancellation(plan, context, &CancellationToken::new())
            .await
    }

    /// Run a plan, resolving `$context.<key>` placeholders against `context`.
    ///
    /// Cancelling `cancel` fails in-flight steps with [`AgentError::Cancelled`]
    /// and records every step of the remaining levels the same way without
    /// invoking it.
    pub async fn run_with_cancellation(
        &self,
        plan: &ExecutionPlan,
        context: &Map<String, Value>,
        cancel: &CancellationToken,
    ) -> Result<ExecutionReport> {
        if plan.len() > self.config.max_steps {
            return Err(AgentError::MalformedPlan(format!(
                "Plan exceeds maximum allowed steps ({})",
                self.config.max_steps
            )));
        }

        let levels = group_into_levels(&plan.steps)?;

        info!(
            steps = plan.len(),
            levels = levels.len(),
            "Starting plan execution"
        );

        let mut results = ResultMap::new();
        let mut observations: Vec<Option<StepObservation>> = vec![None; plan.len()];

        for (level_index, level) in levels.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(level = level_index, "Plan cancelled before level launch");
                for &index in level {
                    let tool_id = &plan.steps[index].tool_id;
                    let error = AgentError::Cancelled {
                        tool: tool_id.clone(),
                    };
                    results.insert(step_key(index), StepFailure::new(tool_id, &error).to_value());
                    observations[index] = Some(StepObservation {
                        index,
                        level: level_index,
                        tool_id: tool_id.clone(),
                        status: ExecutionStatus::Cancelled,
                        execution_time_ms: 0,
                        unresolved_references: Vec::new(),
                    });
                }
                continue;
            }

            debug!(level = level_index, steps = ?level, "Launching level");

            // Steps read `results` while in flight; outcomes are merged only
            // after the whole level has settled.
            let outcomes = join_all(level.iter().map(|&index| {
                self.run_step(index, &plan.steps[index], &results, context, cancel)
            }))
            .await;

            for outcome in outcomes {
                let step = &plan.steps[outcome.index];

                if !outcome.unresolved.is_empty() {
                    warn!(
                        step = outcome.index,
                        tool_id = %step.tool_id,
                        unresolved = ?outcome.unresolved,
                        "Unresolved references passed through literally"
                    );
                }

                let status = match &outcome.output {
                    Ok(_) => ExecutionStatus::Success,
                    Err(AgentError::Timeout { .. }) => ExecutionStatus::TimedOut,
                    Err(AgentError::Cancelled { .. }) => ExecutionStatus::Cancelled,
                    Err(_) => ExecutionStatus::Failed,
                };

                let entry = match outcome.output {
                    Ok(value) => value,
                    Err(e) => {
                        if e.is_step_error() {
                            warn!(
                                step = outcome.index,
                                tool_id = %step.tool_id,
                                error = %e,
                                "Tool execution failed"
                            );
                        } else {
                            error!(
                                step = outcome.index,
                                tool_id = %step.tool_id,
                                error = %e,
                                "Tool raised an unexpected error"
                            );
                        }
                        StepFailure::new(&step.tool_id, &e).to_value()
                    }
                };

                results.insert(step_key(outcome.index), entry);
                observations[outcome.index] = Some(StepObservation {
                    index: outcome.index,
                    level: level_index,
                    tool_id: step.tool_id.clone(),
                    status,
                    execution_time_ms: outcome.elapsed_ms,
                    unresolved_references: outcome.unresolved,
                });
            }
        }

        let report = ExecutionReport {
            levels,
            results,
            observations: observations.into_iter().flatten().collect(),
            cancelled: cancel.is_cancelled(),
        };

        debug!(
            result_count = report.results.len(),
            succeeded_steps = report.succeeded_steps(),
            failed_steps = report.failed_steps(),
            cancelled = report.cancelled,
            "Plan execution completed"
        );

        Ok(report)
    }

    async fn run_step(
        &self,
        index: usize,
        step: &PlanStep,
        results: &ResultMap,
        context: &Map<String, Value>,
        cancel: &CancellationToken,
    ) -> StepOutcome {
        let resolved = Resolver::new(results)
            .with_context(context)
            .resolve_parameters(&step.parameters);

        debug!(step = index, tool_id = %step.tool_id, "Processing step");

        let start = Instant::now();
        let invocation = self.tools.invoke(&step.tool_id, Value::Object(resolved.value));

        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AgentError::Cancelled {
                tool: step.tool_id.clone(),
            }),
            output = async {
                match self.config.step_timeout {
                    Some(after) => match tokio::time::timeout(after, invocation).await {
                        Ok(output) => output,
                        Err(_) => Err(AgentError::Timeout {
                            tool: step.tool_id.clone(),
                            after,
                        }),
                    },
                    None => invocation.await,
                }
            } => output,
        };

        StepOutcome {
            index,
            output,
            elapsed_ms: start.elapsed().as_millis() as u64,
            unresolved: resolved.unresolved,
        }
    }
}

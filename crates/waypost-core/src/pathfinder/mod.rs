//! Pathfinder — the durable pathway execution engine.
//!
//! The Pathfinder walks a pathway's post chain, dispatching each post to
//! whichever agent currently advertises the needed practice, and
//! checkpoints every step in the Pouch before advancing. A crashed run
//! can be resumed exactly where it left off: completed steps are
//! skipped, the step that was in flight is re-attempted (at-least-once
//! semantics for the step in flight).

pub mod executor;
pub mod resolver;
pub mod template;

use std::sync::{Arc, RwLock};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::dispatch::PracticeCaller;
use crate::error::EngineError;
use crate::metrics::PathfinderMetrics;
use crate::models::pathrun::{PathRun, RunState, UpdatePathRunInput};
use crate::models::pathway::Pathway;
use crate::models::poststep::StepVariables;
use crate::models::VarMap;
use crate::plaza::Plaza;
use crate::practice::PracticeRegistry;
use crate::store::Pouch;

use executor::StepExecutor;

const DEFAULT_PLAZA_NAME: &str = "MainPlaza";

/// Iteration ceiling guarding against cyclic pathways.
const DEFAULT_MAX_STEPS: usize = 1000;

/// The run orchestrator: creates runs, resumes them, and walks the
/// pathway graph sequentially.
pub struct Pathfinder {
    agent_id: String,
    plaza_name: String,
    pouch: Pouch,
    registry: Arc<PracticeRegistry>,
    plaza: Arc<dyn Plaza>,
    caller: Arc<dyn PracticeCaller>,
    metrics: Arc<PathfinderMetrics>,
    state: Arc<RwLock<RunState>>,
    max_steps: usize,
}

impl Pathfinder {
    pub fn new(
        agent_id: impl Into<String>,
        pouch: Pouch,
        registry: Arc<PracticeRegistry>,
        plaza: Arc<dyn Plaza>,
        caller: Arc<dyn PracticeCaller>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            plaza_name: DEFAULT_PLAZA_NAME.to_string(),
            pouch,
            registry,
            plaza,
            caller,
            metrics: Arc::new(PathfinderMetrics::detached()),
            state: Arc::new(RwLock::new(RunState::Pending)),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    /// Use shared (exported) metrics instead of a detached registry.
    pub fn with_metrics(mut self, metrics: Arc<PathfinderMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_plaza_name(mut self, plaza_name: impl Into<String>) -> Self {
        self.plaza_name = plaza_name.into();
        self
    }

    /// Bound the number of steps walked per resume. Cyclic pathways are
    /// not rejected at authoring time, so the loop enforces a ceiling.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// The engine's current lifecycle state.
    pub fn status(&self) -> RunState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn set_status(&self, state: RunState) {
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Create and execute a new run of `pathway`, returning the final
    /// variable environment.
    ///
    /// The pathway is registered in the Pouch if not already present
    /// (idempotent, keyed by `pathway_id`). An input named
    /// `pathrun_description` overrides the run's description.
    pub async fn run(
        &self,
        pathway: Pathway,
        inputs: VarMap,
        days_to_live: i64,
    ) -> Result<VarMap, EngineError> {
        info!("Starting pathway execution: {}", pathway.pathway_id);

        if self.pouch.pathways.get(&pathway.pathway_id).await?.is_none() {
            self.pouch.pathways.create(&pathway).await?;
            debug!("Registered pathway {} in pouch", pathway.pathway_id);
        }

        let description = inputs
            .get("pathrun_description")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        let pathrun = self
            .pouch
            .pathruns
            .create(
                &self.agent_id,
                &pathway,
                true,
                description,
                inputs.clone(),
                days_to_live,
            )
            .await?;
        debug!("Created path run: {}", pathrun.pathrun_id);

        self.resume(pathrun, inputs).await
    }

    /// Resume a persisted run, retrying its last failed or stopped step
    /// if one exists, otherwise continuing from the most recent step.
    ///
    /// Fails with [`EngineError::InvalidState`] when the run is already
    /// `Running` or `Completed`, before any persisted mutation.
    pub async fn resume(&self, pathrun: PathRun, inputs: VarMap) -> Result<VarMap, EngineError> {
        match pathrun.state {
            RunState::Running => {
                return Err(EngineError::InvalidState(format!(
                    "Pathrun {} is running, cannot resume",
                    pathrun.pathrun_id
                )))
            }
            RunState::Completed => {
                return Err(EngineError::InvalidState(format!(
                    "Pathrun {} is completed, cannot resume",
                    pathrun.pathrun_id
                )))
            }
            _ => {}
        }

        info!("Resuming pathway run: {}", pathrun.pathrun_id);
        self.set_status(RunState::Running);
        let start = Instant::now();
        let result = self.resume_inner(&pathrun, inputs).await;
        self.metrics
            .pathway_duration
            .with_label_values(&[&pathrun.pathway.pathway_id])
            .observe(start.elapsed().as_secs_f64());

        match &result {
            Ok(_) => {
                self.metrics
                    .pathway_executions
                    .with_label_values(&[&pathrun.pathway.pathway_id, "success"])
                    .inc();
                self.set_status(RunState::Completed);
            }
            Err(e) => {
                tracing::error!("Error in pathway execution: {}", e);
                self.metrics
                    .pathway_executions
                    .with_label_values(&[&pathrun.pathway.pathway_id, "error"])
                    .inc();
                self.set_status(RunState::Failed);
            }
        }
        result
    }

    async fn resume_inner(
        &self,
        pathrun: &PathRun,
        inputs: VarMap,
    ) -> Result<VarMap, EngineError> {
        // Merge the resume inputs over the persisted ones and mark the
        // run running before touching any step.
        let mut merged = pathrun.inputs.clone();
        merged.extend(inputs);
        self.pouch
            .pathruns
            .update(
                &pathrun.pathrun_id,
                UpdatePathRunInput {
                    state: Some(RunState::Running),
                    status_msg: Some("PathRun resumed".to_string()),
                    inputs: Some(merged.clone()),
                },
            )
            .await?;

        let steps = self
            .pouch
            .poststeps
            .list(&pathrun.pathrun_id, None)
            .await?;

        let (mut current_post, mut step, mut variables) = if steps.is_empty() {
            let Some(entrance) = pathrun.pathway.entrance() else {
                warn!(
                    "Pathway {} has no post matching entrance {}, finishing",
                    pathrun.pathway.pathway_id, pathrun.pathway.entrance_post
                );
                self.pouch.pathruns.complete(&pathrun.pathrun_id, None).await?;
                return Ok(merged);
            };
            let step = self
                .pouch
                .poststeps
                .add(
                    &pathrun.pathrun_id,
                    entrance,
                    &self.agent_id,
                    &pathrun.pathway.pathway_id,
                    Some(0),
                    StepVariables::new(merged.clone(), entrance.parameters.clone()),
                )
                .await?;
            info!("Starting with entrance post: {}", entrance.post_id);
            (entrance.clone(), step, merged)
        } else {
            // Prefer retrying the most recent failed/stopped step;
            // otherwise continue from the most recently created one.
            let step = steps
                .iter()
                .rev()
                .find(|s| matches!(s.state, RunState::Failed | RunState::Stopped))
                .or(steps.last())
                .cloned()
                .ok_or_else(|| EngineError::Internal("step list vanished".to_string()))?;
            let variables = step.variables.environment().clone();
            info!(
                "Resuming from poststep {} (post {})",
                step.poststep_id, step.post.post_id
            );
            (step.post.clone(), step, variables)
        };

        let executor = self.step_executor();
        let mut walked = 0usize;

        loop {
            walked += 1;
            if walked > self.max_steps {
                let msg = format!(
                    "Pathway {} exceeded the {}-step ceiling, aborting run",
                    pathrun.pathway.pathway_id, self.max_steps
                );
                self.fail_run(&pathrun.pathrun_id, &msg).await;
                return Err(EngineError::InvalidState(msg));
            }

            if step.state == RunState::Completed {
                debug!("Post {} already completed, skipping", current_post.post_id);
                variables = step.variables.environment().clone();
            } else {
                info!(
                    "Executing post {} with practice {}",
                    current_post.post_id, current_post.practice
                );
                match executor.execute(&mut step, &variables).await {
                    Ok(updated) => variables = updated,
                    Err(e) => {
                        self.fail_run(
                            &pathrun.pathrun_id,
                            &format!("Post {} failed: {}", current_post.post_id, e),
                        )
                        .await;
                        return Err(e);
                    }
                }
            }

            if current_post.is_exit() {
                info!("Reached exit post, finishing pathway");
                break;
            }

            let Some(next_post) = pathrun.pathway.post(&current_post.next_post) else {
                warn!(
                    "Could not find next post {}, finishing pathway",
                    current_post.next_post
                );
                break;
            };

            let next_step = self
                .pouch
                .poststeps
                .add(
                    &pathrun.pathrun_id,
                    next_post,
                    &self.agent_id,
                    &pathrun.pathway.pathway_id,
                    Some(step.poststep_id),
                    StepVariables::new(variables.clone(), next_post.parameters.clone()),
                )
                .await?;
            step.next_poststep = Some(next_step.poststep_id);
            self.pouch.poststeps.update(&step).await?;
            debug!("Created post step: {}", next_step.poststep_id);

            current_post = next_post.clone();
            step = next_step;
        }

        let results = variables.get("result").cloned();
        self.pouch
            .pathruns
            .complete(&pathrun.pathrun_id, results)
            .await?;
        info!("Pathway {} completed successfully", pathrun.pathway.pathway_id);
        Ok(variables)
    }

    fn step_executor(&self) -> StepExecutor {
        StepExecutor {
            agent_id: self.agent_id.clone(),
            plaza_name: self.plaza_name.clone(),
            registry: self.registry.clone(),
            plaza: self.plaza.clone(),
            caller: self.caller.clone(),
            pouch: self.pouch.clone(),
            metrics: self.metrics.clone(),
        }
    }

    /// Best-effort: persist a failure state on the run. The original
    /// error is what the caller sees; a persistence error here is only
    /// logged.
    async fn fail_run(&self, pathrun_id: &str, status_msg: &str) {
        if let Err(e) = self
            .pouch
            .pathruns
            .update(
                pathrun_id,
                UpdatePathRunInput {
                    state: Some(RunState::Failed),
                    status_msg: Some(status_msg.to_string()),
                    inputs: None,
                },
            )
            .await
        {
            warn!("Failed to persist run failure for {}: {}", pathrun_id, e);
        }
    }
}

pub use resolver::DispatchTarget;

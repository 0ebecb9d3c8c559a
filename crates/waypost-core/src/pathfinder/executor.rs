//! Step execution: resolve a capability, substitute parameters, dispatch
//! the call, and map the result back into workflow variables.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use crate::dispatch::{parse_result, PracticeCaller};
use crate::error::EngineError;
use crate::metrics::PathfinderMetrics;
use crate::models::pathrun::RunState;
use crate::models::poststep::PostStep;
use crate::models::VarMap;
use crate::plaza::Plaza;
use crate::practice::PracticeRegistry;
use crate::store::Pouch;

use super::resolver::{resolve_practice, DispatchTarget};
use super::template;

/// Executes one post step against the current variable environment.
pub struct StepExecutor {
    pub(crate) agent_id: String,
    pub(crate) plaza_name: String,
    pub(crate) registry: Arc<PracticeRegistry>,
    pub(crate) plaza: Arc<dyn Plaza>,
    pub(crate) caller: Arc<dyn PracticeCaller>,
    pub(crate) pouch: Pouch,
    pub(crate) metrics: Arc<PathfinderMetrics>,
}

impl StepExecutor {
    /// Run one step. Returns the updated variable environment; a step
    /// whose practice resolves nowhere returns the environment
    /// unchanged (soft failure). Marks the step `Failed` and persists
    /// it before surfacing any hard error.
    pub async fn execute(
        &self,
        step: &mut PostStep,
        variables: &VarMap,
    ) -> Result<VarMap, EngineError> {
        let start = Instant::now();
        let result = self.execute_inner(step, variables).await;
        self.metrics
            .post_duration
            .with_label_values(&[&step.post.post_id])
            .observe(start.elapsed().as_secs_f64());

        if let Err(e) = &result {
            tracing::error!("Error executing post {}: {}", step.post.post_id, e);
            self.metrics
                .execution_errors
                .with_label_values(&[&step.post.post_id, "dispatch"])
                .inc();
            step.state = RunState::Failed;
            step.status_msg = format!("Post failed: {}", e);
            step.stop_time = Some(Utc::now());
            if let Err(persist_err) = self.pouch.poststeps.update(step).await {
                tracing::warn!(
                    "Failed to persist failed step {}: {}",
                    step.poststep_id,
                    persist_err
                );
            }
        }
        result
    }

    async fn execute_inner(
        &self,
        step: &mut PostStep,
        variables: &VarMap,
    ) -> Result<VarMap, EngineError> {
        let practice = step.post.practice.clone();
        tracing::info!("Starting post execution: {}", step.post.post_id);

        step.state = RunState::Running;
        step.status_msg = format!("Finding agent for practice {}", practice);
        self.pouch.poststeps.update(step).await?;

        let target = resolve_practice(
            &self.registry,
            &self.plaza,
            &self.agent_id,
            &self.plaza_name,
            &practice,
        )
        .await?;

        let Some(target) = target else {
            // Soft failure: the step closes as a no-op and the run
            // continues with unmodified variables.
            tracing::warn!("No agent found for practice {}", practice);
            self.metrics
                .execution_errors
                .with_label_values(&[&step.post.post_id, "no_agent_found"])
                .inc();
            step.state = RunState::Completed;
            step.status_msg = format!("No agent found for practice {}", practice);
            step.variables.outputs = Some(variables.clone());
            step.stop_time = Some(Utc::now());
            self.pouch.poststeps.update(step).await?;
            return Ok(variables.clone());
        };

        let payload = build_payload(step, variables);

        let qualified = match &target {
            DispatchTarget::Local { practice } => practice.clone(),
            DispatchTarget::Remote { practice, .. } => practice.clone(),
        };
        step.status_msg = format!("Calling practice {}", qualified);
        self.pouch.poststeps.update(step).await?;

        let result = match &target {
            DispatchTarget::Local { practice } => Some(self.registry.invoke(practice, &payload)?),
            DispatchTarget::Remote { address, practice } => {
                let envelopes = self.caller.call(address, practice, &payload).await?;
                parse_result(&envelopes)?
            }
        };

        // Output mapping is applied to a copy; the incoming environment
        // is never mutated.
        let mut updated = variables.clone();
        match result {
            Some(result) => apply_output_mapping(step, &result, &mut updated),
            None => tracing::warn!(
                "No 'result' field in response for practice {}",
                qualified
            ),
        }

        step.state = RunState::Completed;
        step.status_msg = format!("Finished post {}", step.post.post_id);
        step.variables.outputs = Some(updated.clone());
        step.stop_time = Some(Utc::now());
        self.pouch.poststeps.update(step).await?;

        self.metrics
            .post_executions
            .with_label_values(&[&step.post.post_id, "success"])
            .inc();
        tracing::info!("Post {} completed successfully", step.post.post_id);
        Ok(updated)
    }
}

/// Build the call payload: string parameters go through placeholder
/// substitution, everything else is passed through as-is.
fn build_payload(step: &PostStep, variables: &VarMap) -> VarMap {
    let mut payload = VarMap::new();
    for (key, value) in &step.post.parameters {
        let processed = match value {
            serde_json::Value::String(s) => {
                serde_json::Value::String(template::substitute(s, variables))
            }
            other => other.clone(),
        };
        payload.insert(key.clone(), processed);
    }
    payload
}

/// Copy mapped result fields into the variable environment. Missing
/// source fields are logged and skipped.
fn apply_output_mapping(step: &PostStep, result: &serde_json::Value, variables: &mut VarMap) {
    for output in step.post.outputs.values() {
        for (src_field, dest_var) in &output.field_mapping {
            match result.get(src_field) {
                Some(value) => {
                    tracing::debug!("Mapped output {} to variable {}", src_field, dest_var);
                    variables.insert(dest_var.clone(), value.clone());
                }
                None => {
                    tracing::warn!("Source field {} not found in result", src_field);
                }
            }
        }
    }
}

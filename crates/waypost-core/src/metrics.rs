//! Prometheus metrics for the Pathfinder engine.

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

/// Duration and count instruments emitted around pathway and post
/// execution. Observations are fire-and-forget; nothing in the engine
/// depends on them.
pub struct PathfinderMetrics {
    /// Duration of whole pathway runs
    pub pathway_duration: HistogramVec,

    /// Duration of individual post executions
    pub post_duration: HistogramVec,

    /// Pathway runs by outcome
    pub pathway_executions: IntCounterVec,

    /// Post executions by outcome
    pub post_executions: IntCounterVec,

    /// Resolution/dispatch errors by kind
    pub execution_errors: IntCounterVec,
}

impl PathfinderMetrics {
    /// Create the instruments and register them against `registry`.
    pub fn new(registry: &Registry) -> Self {
        let pathway_duration = HistogramVec::new(
            HistogramOpts::new(
                "pathway_execution_duration_seconds",
                "Duration of pathway execution",
            )
            .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]),
            &["pathway_id"],
        )
        .expect("Failed to create pathway_execution_duration_seconds");
        registry
            .register(Box::new(pathway_duration.clone()))
            .expect("Failed to register pathway_execution_duration_seconds");

        let post_duration = HistogramVec::new(
            HistogramOpts::new(
                "post_execution_duration_seconds",
                "Duration of post execution",
            )
            .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]),
            &["post_id"],
        )
        .expect("Failed to create post_execution_duration_seconds");
        registry
            .register(Box::new(post_duration.clone()))
            .expect("Failed to register post_execution_duration_seconds");

        let pathway_executions = IntCounterVec::new(
            Opts::new("pathway_executions_total", "Number of pathway executions"),
            &["pathway_id", "status"],
        )
        .expect("Failed to create pathway_executions_total");
        registry
            .register(Box::new(pathway_executions.clone()))
            .expect("Failed to register pathway_executions_total");

        let post_executions = IntCounterVec::new(
            Opts::new("post_executions_total", "Number of post executions"),
            &["post_id", "status"],
        )
        .expect("Failed to create post_executions_total");
        registry
            .register(Box::new(post_executions.clone()))
            .expect("Failed to register post_executions_total");

        let execution_errors = IntCounterVec::new(
            Opts::new("execution_errors_total", "Number of execution errors"),
            &["post_id", "error"],
        )
        .expect("Failed to create execution_errors_total");
        registry
            .register(Box::new(execution_errors.clone()))
            .expect("Failed to register execution_errors_total");

        Self {
            pathway_duration,
            post_duration,
            pathway_executions,
            post_executions,
            execution_errors,
        }
    }

    /// Instruments registered against a private registry, for engines
    /// that do not export metrics.
    pub fn detached() -> Self {
        Self::new(&Registry::new())
    }
}

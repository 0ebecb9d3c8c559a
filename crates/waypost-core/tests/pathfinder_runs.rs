//! End-to-end tests for the Pathfinder engine: run execution, output
//! mapping, crash/resume semantics, and capability resolution across
//! local and remote agents.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use waypost_core::dispatch::{PracticeCaller, ResponseEnvelope};
use waypost_core::error::EngineError;
use waypost_core::models::pathrun::{RunState, UpdatePathRunInput};
use waypost_core::models::pathway::Pathway;
use waypost_core::models::poststep::StepVariables;
use waypost_core::models::VarMap;
use waypost_core::plaza::{AgentListing, ComponentInfo, Plaza};
use waypost_core::practice::PracticeRegistry;
use waypost_core::{Database, Pathfinder, Pouch};

struct StubPlaza {
    listings: Vec<AgentListing>,
}

#[async_trait]
impl Plaza for StubPlaza {
    async fn list_active_agents(&self) -> Result<Vec<AgentListing>, EngineError> {
        Ok(self.listings.clone())
    }
}

/// Records calls and answers with a canned result.
struct StubCaller {
    result: serde_json::Value,
    calls: Mutex<Vec<(String, String, VarMap)>>,
}

impl StubCaller {
    fn new(result: serde_json::Value) -> Self {
        Self {
            result,
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl PracticeCaller for StubCaller {
    async fn call(
        &self,
        address: &str,
        practice: &str,
        payload: &VarMap,
    ) -> Result<Vec<ResponseEnvelope>, EngineError> {
        self.calls
            .lock()
            .unwrap()
            .push((address.to_string(), practice.to_string(), payload.clone()));
        Ok(vec![ResponseEnvelope::from_result(self.result.clone())])
    }
}

fn empty_plaza() -> Arc<dyn Plaza> {
    Arc::new(StubPlaza { listings: vec![] })
}

fn pathfinder(pouch: Pouch, registry: PracticeRegistry) -> Pathfinder {
    Pathfinder::new(
        "agent-1",
        pouch,
        Arc::new(registry),
        empty_plaza(),
        Arc::new(StubCaller::new(json!({}))),
    )
}

fn two_post_pathway() -> Pathway {
    Pathway::from_yaml(
        r#"
pathway_id: "translate-flow"
name: "Translate"
entrance_post: "a"
posts:
  - post_id: "a"
    practice: "Refine"
    parameters:
      text: "{source}"
    next_post: "b"
  - post_id: "b"
    practice: "Translate"
    parameters:
      text: "{source}"
    outputs:
      translation:
        field_mapping:
          text: "translated"
    next_post: "exit"
"#,
    )
    .unwrap()
}

fn inputs() -> VarMap {
    VarMap::from([("source".to_string(), json!("hello"))])
}

#[tokio::test]
async fn run_two_posts_maps_output_variable() {
    let pouch = Pouch::new(Database::open_in_memory().unwrap());
    let mut registry = PracticeRegistry::new();
    registry.register("Refine", |_| Ok(json!({})));
    registry.register("Translate", |_| Ok(json!({ "text": "bonjour" })));
    let pf = pathfinder(pouch.clone(), registry);

    let vars = pf.run(two_post_pathway(), inputs(), 0).await.unwrap();
    assert_eq!(vars.get("translated"), Some(&json!("bonjour")));
    assert_eq!(vars.get("source"), Some(&json!("hello")));
    assert_eq!(pf.status(), RunState::Completed);

    let runs = pouch.pathruns.list().await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].state, RunState::Completed);

    let steps = pouch.poststeps.list(&runs[0].pathrun_id, None).await.unwrap();
    assert_eq!(
        steps.iter().map(|s| s.poststep_id).collect::<Vec<_>>(),
        vec![1, 2]
    );
    assert!(steps.iter().all(|s| s.state == RunState::Completed));
    // Steps are linked into a chain.
    assert_eq!(steps[0].next_poststep, Some(2));
    assert_eq!(steps[1].last_poststep, Some(1));
}

#[tokio::test]
async fn run_with_unresolvable_practice_still_completes() {
    let pouch = Pouch::new(Database::open_in_memory().unwrap());
    let pf = pathfinder(pouch.clone(), PracticeRegistry::new());

    let pathway = Pathway::from_yaml(
        r#"
pathway_id: "nowhere"
name: "Nowhere"
entrance_post: "a"
posts:
  - post_id: "a"
    practice: "DoesNotExist"
    next_post: "exit"
"#,
    )
    .unwrap();

    let vars = pf.run(pathway, inputs(), 0).await.unwrap();
    assert_eq!(vars, inputs());

    let runs = pouch.pathruns.list().await.unwrap();
    assert_eq!(runs[0].state, RunState::Completed);

    // The skipped step is closed out, not left running forever.
    let steps = pouch.poststeps.list(&runs[0].pathrun_id, None).await.unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].state, RunState::Completed);
    assert!(steps[0].stop_time.is_some());
}

#[tokio::test]
async fn dangling_next_post_ends_run_without_error() {
    let pouch = Pouch::new(Database::open_in_memory().unwrap());
    let mut registry = PracticeRegistry::new();
    registry.register("Refine", |_| Ok(json!({})));
    let pf = pathfinder(pouch.clone(), registry);

    let pathway = Pathway::from_yaml(
        r#"
pathway_id: "dangling"
name: "Dangling"
entrance_post: "a"
posts:
  - post_id: "a"
    practice: "Refine"
    next_post: "no-such-post"
"#,
    )
    .unwrap();

    pf.run(pathway, VarMap::new(), 0).await.unwrap();
    let runs = pouch.pathruns.list().await.unwrap();
    assert_eq!(runs[0].state, RunState::Completed);
    assert_eq!(
        pouch
            .poststeps
            .list(&runs[0].pathrun_id, None)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn resume_rejects_running_and_completed_runs() {
    let pouch = Pouch::new(Database::open_in_memory().unwrap());
    let pf = pathfinder(pouch.clone(), PracticeRegistry::new());

    let run = pouch
        .pathruns
        .create("agent-1", &two_post_pathway(), true, None, VarMap::new(), 0)
        .await
        .unwrap();

    for state in [RunState::Running, RunState::Completed] {
        pouch
            .pathruns
            .update(
                &run.pathrun_id,
                UpdatePathRunInput {
                    state: Some(state),
                    status_msg: None,
                    inputs: None,
                },
            )
            .await
            .unwrap();
        let loaded = pouch.pathruns.get(&run.pathrun_id).await.unwrap().unwrap();
        let err = pf.resume(loaded, VarMap::new()).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));

        // The rejection itself persisted nothing.
        let after = pouch.pathruns.get(&run.pathrun_id).await.unwrap().unwrap();
        assert_eq!(after.state, state);
        assert!(pouch
            .poststeps
            .list(&run.pathrun_id, None)
            .await
            .unwrap()
            .is_empty());
    }
}

fn flaky_pathway() -> Pathway {
    Pathway::from_yaml(
        r#"
pathway_id: "flaky-flow"
name: "Flaky"
entrance_post: "a"
posts:
  - post_id: "a"
    practice: "Flaky"
    outputs:
      out:
        field_mapping:
          text: "text"
    next_post: "exit"
"#,
    )
    .unwrap()
}

#[tokio::test]
async fn failed_step_is_retried_with_same_id() {
    let pouch = Pouch::new(Database::open_in_memory().unwrap());
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let mut registry = PracticeRegistry::new();
    registry.register("Flaky", move |_| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(EngineError::Dispatch("transient outage".to_string()))
        } else {
            Ok(json!({ "text": "recovered" }))
        }
    });
    let pf = pathfinder(pouch.clone(), registry);

    let err = pf.run(flaky_pathway(), inputs(), 0).await.unwrap_err();
    assert!(matches!(err, EngineError::Dispatch(_)));
    assert_eq!(pf.status(), RunState::Failed);

    let run = pouch.pathruns.list().await.unwrap().remove(0);
    assert_eq!(run.state, RunState::Failed);
    let steps = pouch.poststeps.list(&run.pathrun_id, None).await.unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].state, RunState::Failed);

    // The retry reuses poststep 1 rather than appending a new record.
    let vars = pf.resume(run, VarMap::new()).await.unwrap();
    assert_eq!(vars.get("text"), Some(&json!("recovered")));
    assert_eq!(attempts.load(Ordering::SeqCst), 2);

    let run = pouch.pathruns.list().await.unwrap().remove(0);
    assert_eq!(run.state, RunState::Completed);
    let steps = pouch.poststeps.list(&run.pathrun_id, None).await.unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].poststep_id, 1);
    assert_eq!(steps[0].state, RunState::Completed);
}

#[tokio::test]
async fn run_survives_reopening_the_pouch() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("waypost.db").to_string_lossy().to_string();

    // First process: the practice is down, the run fails mid-step.
    {
        let pouch = Pouch::new(Database::open(&path).unwrap());
        let mut registry = PracticeRegistry::new();
        registry.register("Flaky", |_| {
            Err(EngineError::Dispatch("outage".to_string()))
        });
        let pf = pathfinder(pouch, registry);
        pf.run(flaky_pathway(), inputs(), 0).await.unwrap_err();
    }

    // Second process: reopen the pouch from disk and resume.
    let pouch = Pouch::new(Database::open(&path).unwrap());
    let run = pouch.pathruns.list().await.unwrap().remove(0);
    assert_eq!(run.state, RunState::Failed);

    let mut registry = PracticeRegistry::new();
    registry.register("Flaky", |_| Ok(json!({ "text": "recovered" })));
    let pf = pathfinder(pouch.clone(), registry);
    let vars = pf.resume(run.clone(), VarMap::new()).await.unwrap();
    assert_eq!(vars.get("text"), Some(&json!("recovered")));

    let after = pouch.pathruns.get(&run.pathrun_id).await.unwrap().unwrap();
    assert_eq!(after.state, RunState::Completed);
}

#[tokio::test]
async fn resume_of_completed_final_step_creates_no_new_step() {
    let pouch = Pouch::new(Database::open_in_memory().unwrap());
    let pf = pathfinder(pouch.clone(), PracticeRegistry::new());

    let pathway = Pathway::from_yaml(
        r#"
pathway_id: "done"
name: "Done"
entrance_post: "a"
posts:
  - post_id: "a"
    practice: "Echo"
    next_post: "exit"
"#,
    )
    .unwrap();

    let run = pouch
        .pathruns
        .create("agent-1", &pathway, true, None, VarMap::new(), 0)
        .await
        .unwrap();
    let mut step = pouch
        .poststeps
        .add(
            &run.pathrun_id,
            pathway.entrance().unwrap(),
            "agent-1",
            &pathway.pathway_id,
            Some(0),
            StepVariables::new(VarMap::new(), HashMap::new()),
        )
        .await
        .unwrap();
    step.state = RunState::Completed;
    step.variables.outputs = Some(VarMap::from([("done".to_string(), json!(true))]));
    pouch.poststeps.update(&step).await.unwrap();

    let vars = pf.resume(run.clone(), VarMap::new()).await.unwrap();
    assert_eq!(vars.get("done"), Some(&json!(true)));

    let steps = pouch.poststeps.list(&run.pathrun_id, None).await.unwrap();
    assert_eq!(steps.len(), 1);
    let after = pouch.pathruns.get(&run.pathrun_id).await.unwrap().unwrap();
    assert_eq!(after.state, RunState::Completed);
}

#[tokio::test]
async fn remote_practice_is_dispatched_through_caller() {
    let pouch = Pouch::new(Database::open_in_memory().unwrap());
    let caller = Arc::new(StubCaller::new(json!({ "text": "bonjour" })));
    let plaza: Arc<dyn Plaza> = Arc::new(StubPlaza {
        listings: vec![AgentListing {
            agent_id: "remote-1".to_string(),
            components: HashMap::from([(
                "translator".to_string(),
                ComponentInfo {
                    practices: vec!["Translate".to_string()],
                },
            )]),
        }],
    });
    let pf = Pathfinder::new(
        "agent-1",
        pouch.clone(),
        Arc::new(PracticeRegistry::new()),
        plaza,
        caller.clone(),
    );

    let pathway = Pathway::from_yaml(
        r#"
pathway_id: "remote-flow"
name: "Remote"
entrance_post: "a"
posts:
  - post_id: "a"
    practice: "Translate"
    parameters:
      text: "say {source}"
    outputs:
      out:
        field_mapping:
          text: "translated"
    next_post: "exit"
"#,
    )
    .unwrap();

    let vars = pf.run(pathway, inputs(), 0).await.unwrap();
    assert_eq!(vars.get("translated"), Some(&json!("bonjour")));

    let calls = caller.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let (address, practice, payload) = &calls[0];
    assert_eq!(address, "remote-1@MainPlaza");
    assert_eq!(practice, "translator/Translate");
    assert_eq!(payload.get("text"), Some(&json!("say hello")));
}

#[tokio::test]
async fn cyclic_pathway_hits_step_ceiling() {
    let pouch = Pouch::new(Database::open_in_memory().unwrap());
    let mut registry = PracticeRegistry::new();
    registry.register("Spin", |_| Ok(json!({})));
    let pf = pathfinder(pouch.clone(), registry).with_max_steps(5);

    let pathway = Pathway::from_yaml(
        r#"
pathway_id: "cycle"
name: "Cycle"
entrance_post: "a"
posts:
  - post_id: "a"
    practice: "Spin"
    next_post: "b"
  - post_id: "b"
    practice: "Spin"
    next_post: "a"
"#,
    )
    .unwrap();

    let err = pf.run(pathway, VarMap::new(), 0).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));

    let run = pouch.pathruns.list().await.unwrap().remove(0);
    assert_eq!(run.state, RunState::Failed);
}

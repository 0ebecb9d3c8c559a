use chrono::{TimeZone, Utc};
use rusqlite::OptionalExtension;
use uuid::Uuid;

use crate::db::Database;
use crate::error::EngineError;
use crate::models::pathrun::{PathRun, RunState, UpdatePathRunInput};
use crate::models::pathway::Pathway;
use crate::models::VarMap;

use super::pathway_store::parse_json_col;

/// Persisted path run records.
#[derive(Clone)]
pub struct PathRunStore {
    db: Database,
}

impl PathRunStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a new run in `Pending` state, snapshotting the pathway.
    pub async fn create(
        &self,
        owner_agent_id: &str,
        pathway: &Pathway,
        can_take_over: bool,
        description: Option<String>,
        inputs: VarMap,
        days_to_live: i64,
    ) -> Result<PathRun, EngineError> {
        let now = Utc::now();
        let run = PathRun {
            pathrun_id: Uuid::new_v4().to_string(),
            pathway: pathway.clone(),
            owner_agent_id: owner_agent_id.to_string(),
            can_take_over,
            state: RunState::Pending,
            status_msg: "PathRun created".to_string(),
            description: description.unwrap_or_else(|| pathway.description.clone()),
            inputs,
            days_to_live,
            results: None,
            create_time: now,
            update_time: now,
            stop_time: None,
        };
        let r = run.clone();
        let pathway_json = serde_json::to_string(&r.pathway)
            .map_err(|e| EngineError::BadRequest(format!("Unserializable pathway: {}", e)))?;
        let inputs_json = serde_json::to_string(&r.inputs)
            .map_err(|e| EngineError::BadRequest(format!("Unserializable inputs: {}", e)))?;
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO pathruns (pathrun_id, owner_agent_id, pathway_id, pathway_json, can_take_over, \
                     state, status_msg, description, inputs, days_to_live, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
                    rusqlite::params![
                        r.pathrun_id,
                        r.owner_agent_id,
                        r.pathway.pathway_id,
                        pathway_json,
                        r.can_take_over as i64,
                        r.state.as_str(),
                        r.status_msg,
                        r.description,
                        inputs_json,
                        r.days_to_live,
                        r.create_time.timestamp_millis(),
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(run)
    }

    pub async fn get(&self, pathrun_id: &str) -> Result<Option<PathRun>, EngineError> {
        let id = pathrun_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.query_row(
                    &format!("{} WHERE pathrun_id = ?1", SELECT_PATHRUN),
                    rusqlite::params![id],
                    row_to_pathrun,
                )
                .optional()
            })
            .await
    }

    pub async fn list(&self) -> Result<Vec<PathRun>, EngineError> {
        self.db
            .with_conn_async(move |conn| {
                let mut stmt =
                    conn.prepare(&format!("{} ORDER BY created_at DESC", SELECT_PATHRUN))?;
                let rows = stmt
                    .query_map([], row_to_pathrun)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// Patch the mutable fields of a run and bump `update_time`.
    pub async fn update(
        &self,
        pathrun_id: &str,
        input: UpdatePathRunInput,
    ) -> Result<(), EngineError> {
        let id = pathrun_id.to_string();
        let inputs_json = match &input.inputs {
            Some(vars) => Some(
                serde_json::to_string(vars)
                    .map_err(|e| EngineError::BadRequest(format!("Unserializable inputs: {}", e)))?,
            ),
            None => None,
        };
        let now_ms = Utc::now().timestamp_millis();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "UPDATE pathruns SET \
                     state = COALESCE(?2, state), \
                     status_msg = COALESCE(?3, status_msg), \
                     inputs = COALESCE(?4, inputs), \
                     updated_at = ?5 \
                     WHERE pathrun_id = ?1",
                    rusqlite::params![
                        id,
                        input.state.map(|s| s.as_str()),
                        input.status_msg,
                        inputs_json,
                        now_ms,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    /// Mark a run `Completed`, persisting its results and stop time.
    pub async fn complete(
        &self,
        pathrun_id: &str,
        results: Option<serde_json::Value>,
    ) -> Result<(), EngineError> {
        self.finalize(pathrun_id, RunState::Completed, "PathRun completed", results)
            .await
    }

    /// Mark a run `Stopped`, persisting its stop time.
    pub async fn stop(
        &self,
        pathrun_id: &str,
        results: Option<serde_json::Value>,
    ) -> Result<(), EngineError> {
        self.finalize(pathrun_id, RunState::Stopped, "PathRun stopped", results)
            .await
    }

    async fn finalize(
        &self,
        pathrun_id: &str,
        state: RunState,
        status_msg: &str,
        results: Option<serde_json::Value>,
    ) -> Result<(), EngineError> {
        let id = pathrun_id.to_string();
        let msg = status_msg.to_string();
        let results_json = results.map(|r| r.to_string());
        let now_ms = Utc::now().timestamp_millis();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "UPDATE pathruns SET state = ?2, status_msg = ?3, results = ?4, \
                     updated_at = ?5, stopped_at = ?5 WHERE pathrun_id = ?1",
                    rusqlite::params![id, state.as_str(), msg, results_json, now_ms],
                )?;
                Ok(())
            })
            .await
    }
}

const SELECT_PATHRUN: &str = "SELECT pathrun_id, owner_agent_id, pathway_json, can_take_over, \
     state, status_msg, description, inputs, results, days_to_live, created_at, updated_at, stopped_at \
     FROM pathruns";

fn row_to_pathrun(row: &rusqlite::Row<'_>) -> Result<PathRun, rusqlite::Error> {
    let to_dt = |ms: Option<i64>| ms.and_then(|v| Utc.timestamp_millis_opt(v).single());

    let pathway_json: String = row.get(2)?;
    let pathway: Pathway = parse_json_col(&pathway_json, 2)?;
    let inputs_json: String = row.get(7)?;
    let inputs: VarMap = parse_json_col(&inputs_json, 7)?;
    let results: Option<serde_json::Value> = row
        .get::<_, Option<String>>(8)?
        .and_then(|s| serde_json::from_str(&s).ok());

    Ok(PathRun {
        pathrun_id: row.get(0)?,
        owner_agent_id: row.get(1)?,
        pathway,
        can_take_over: row.get::<_, i64>(3)? != 0,
        state: RunState::from_str(&row.get::<_, String>(4)?),
        status_msg: row.get(5)?,
        description: row.get(6)?,
        inputs,
        results,
        days_to_live: row.get(9)?,
        create_time: to_dt(row.get(10)?).unwrap_or_else(Utc::now),
        update_time: to_dt(row.get(11)?).unwrap_or_else(Utc::now),
        stop_time: to_dt(row.get(12)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_pathway() -> Pathway {
        Pathway::from_yaml(
            r#"
pathway_id: "p1"
name: "Sample"
description: "pathway description"
entrance_post: "a"
posts:
  - post_id: "a"
    practice: "Echo"
"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = PathRunStore::new(Database::open_in_memory().unwrap());
        let inputs = VarMap::from([("source".to_string(), json!("hello"))]);
        let run = store
            .create("agent-1", &sample_pathway(), true, None, inputs, 7)
            .await
            .unwrap();
        assert_eq!(run.state, RunState::Pending);
        assert_eq!(run.description, "pathway description");

        let loaded = store.get(&run.pathrun_id).await.unwrap().unwrap();
        assert_eq!(loaded.pathway.pathway_id, "p1");
        assert_eq!(loaded.inputs.get("source"), Some(&json!("hello")));
        assert_eq!(loaded.days_to_live, 7);
    }

    #[tokio::test]
    async fn test_update_and_complete() {
        let store = PathRunStore::new(Database::open_in_memory().unwrap());
        let run = store
            .create("agent-1", &sample_pathway(), true, None, VarMap::new(), 0)
            .await
            .unwrap();

        store
            .update(
                &run.pathrun_id,
                UpdatePathRunInput {
                    state: Some(RunState::Running),
                    status_msg: Some("PathRun resumed".to_string()),
                    inputs: None,
                },
            )
            .await
            .unwrap();
        let loaded = store.get(&run.pathrun_id).await.unwrap().unwrap();
        assert_eq!(loaded.state, RunState::Running);
        assert_eq!(loaded.status_msg, "PathRun resumed");

        store
            .complete(&run.pathrun_id, Some(json!({"ok": true})))
            .await
            .unwrap();
        let loaded = store.get(&run.pathrun_id).await.unwrap().unwrap();
        assert_eq!(loaded.state, RunState::Completed);
        assert!(loaded.stop_time.is_some());
        assert_eq!(loaded.results, Some(json!({"ok": true})));
    }

    #[tokio::test]
    async fn test_stop_marks_run_stopped() {
        let store = PathRunStore::new(Database::open_in_memory().unwrap());
        let run = store
            .create("agent-1", &sample_pathway(), true, None, VarMap::new(), 0)
            .await
            .unwrap();

        store.stop(&run.pathrun_id, None).await.unwrap();
        let loaded = store.get(&run.pathrun_id).await.unwrap().unwrap();
        assert_eq!(loaded.state, RunState::Stopped);
        assert_eq!(loaded.status_msg, "PathRun stopped");
        assert!(loaded.stop_time.is_some());
        assert_eq!(loaded.results, None);
    }
}

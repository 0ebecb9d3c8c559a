use chrono::{TimeZone, Utc};
use rusqlite::OptionalExtension;

use crate::db::Database;
use crate::error::EngineError;
use crate::models::pathrun::RunState;
use crate::models::pathway::Post;
use crate::models::poststep::{PostStep, StepVariables};

use super::pathway_store::parse_json_col;

/// Persisted post step records — the execution history of a run.
#[derive(Clone)]
pub struct PostStepStore {
    db: Database,
}

impl PostStepStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append a step to a run, assigning the next sequential
    /// `poststep_id` (1-based, gap-free).
    pub async fn add(
        &self,
        pathrun_id: &str,
        post: &Post,
        owner_agent_id: &str,
        pathway_id: &str,
        last_poststep: Option<i64>,
        variables: StepVariables,
    ) -> Result<PostStep, EngineError> {
        let now = Utc::now();
        let run_id = pathrun_id.to_string();
        let step = PostStep {
            pathrun_id: pathrun_id.to_string(),
            poststep_id: 0, // assigned below
            post: post.clone(),
            owner_agent_id: owner_agent_id.to_string(),
            pathway_id: pathway_id.to_string(),
            state: RunState::Pending,
            status_msg: "Pending".to_string(),
            variables,
            last_poststep,
            next_poststep: None,
            start_time: now,
            stop_time: None,
        };
        let post_json = serde_json::to_string(&step.post)
            .map_err(|e| EngineError::BadRequest(format!("Unserializable post: {}", e)))?;
        let variables_json = serde_json::to_string(&step.variables)
            .map_err(|e| EngineError::BadRequest(format!("Unserializable variables: {}", e)))?;
        let s = step.clone();
        let poststep_id = self
            .db
            .with_conn_async(move |conn| {
                let next_id: i64 = conn.query_row(
                    "SELECT COALESCE(MAX(poststep_id), 0) + 1 FROM poststeps WHERE pathrun_id = ?1",
                    rusqlite::params![run_id],
                    |row| row.get(0),
                )?;
                conn.execute(
                    "INSERT INTO poststeps (pathrun_id, poststep_id, owner_agent_id, pathway_id, post_id, \
                     post_json, state, status_msg, variables, last_poststep, next_poststep, started_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, NULL, ?11)",
                    rusqlite::params![
                        s.pathrun_id,
                        next_id,
                        s.owner_agent_id,
                        s.pathway_id,
                        s.post.post_id,
                        post_json,
                        s.state.as_str(),
                        s.status_msg,
                        variables_json,
                        s.last_poststep,
                        s.start_time.timestamp_millis(),
                    ],
                )?;
                Ok(next_id)
            })
            .await?;
        Ok(PostStep {
            poststep_id,
            ..step
        })
    }

    /// Rewrite the mutable fields of a step, keyed by its id pair.
    pub async fn update(&self, step: &PostStep) -> Result<(), EngineError> {
        let variables_json = serde_json::to_string(&step.variables)
            .map_err(|e| EngineError::BadRequest(format!("Unserializable variables: {}", e)))?;
        let s = step.clone();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "UPDATE poststeps SET state = ?3, status_msg = ?4, variables = ?5, \
                     last_poststep = ?6, next_poststep = ?7, stopped_at = ?8 \
                     WHERE pathrun_id = ?1 AND poststep_id = ?2",
                    rusqlite::params![
                        s.pathrun_id,
                        s.poststep_id,
                        s.state.as_str(),
                        s.status_msg,
                        variables_json,
                        s.last_poststep,
                        s.next_poststep,
                        s.stop_time.map(|t| t.timestamp_millis()),
                    ],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn get(
        &self,
        pathrun_id: &str,
        poststep_id: i64,
    ) -> Result<Option<PostStep>, EngineError> {
        let id = pathrun_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.query_row(
                    &format!(
                        "{} WHERE pathrun_id = ?1 AND poststep_id = ?2",
                        SELECT_POSTSTEP
                    ),
                    rusqlite::params![id, poststep_id],
                    row_to_poststep,
                )
                .optional()
            })
            .await
    }

    /// List a run's steps in execution order, optionally filtered by state.
    pub async fn list(
        &self,
        pathrun_id: &str,
        state: Option<RunState>,
    ) -> Result<Vec<PostStep>, EngineError> {
        let id = pathrun_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "{} WHERE pathrun_id = ?1 AND (?2 IS NULL OR state = ?2) ORDER BY poststep_id",
                    SELECT_POSTSTEP
                ))?;
                let rows = stmt
                    .query_map(
                        rusqlite::params![id, state.map(|s| s.as_str())],
                        row_to_poststep,
                    )?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }
}

const SELECT_POSTSTEP: &str = "SELECT pathrun_id, poststep_id, owner_agent_id, pathway_id, \
     post_json, state, status_msg, variables, last_poststep, next_poststep, started_at, stopped_at \
     FROM poststeps";

fn row_to_poststep(row: &rusqlite::Row<'_>) -> Result<PostStep, rusqlite::Error> {
    let to_dt = |ms: Option<i64>| ms.and_then(|v| Utc.timestamp_millis_opt(v).single());

    let post_json: String = row.get(4)?;
    let post: Post = parse_json_col(&post_json, 4)?;
    let variables_json: String = row.get(7)?;
    let variables: StepVariables = parse_json_col(&variables_json, 7)?;

    Ok(PostStep {
        pathrun_id: row.get(0)?,
        poststep_id: row.get(1)?,
        owner_agent_id: row.get(2)?,
        pathway_id: row.get(3)?,
        post,
        state: RunState::from_str(&row.get::<_, String>(5)?),
        status_msg: row.get(6)?,
        variables,
        last_poststep: row.get(8)?,
        next_poststep: row.get(9)?,
        start_time: to_dt(row.get(10)?).unwrap_or_else(Utc::now),
        stop_time: to_dt(row.get(11)?),
    })
}

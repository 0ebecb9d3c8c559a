use chrono::Utc;
use rusqlite::OptionalExtension;

use crate::db::Database;
use crate::error::EngineError;
use crate::models::pathway::Pathway;

/// Persisted pathway definitions.
#[derive(Clone)]
pub struct PathwayStore {
    db: Database,
}

impl PathwayStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Register a pathway. Idempotent: re-registering an existing
    /// `pathway_id` leaves the stored definition untouched.
    pub async fn create(&self, pathway: &Pathway) -> Result<(), EngineError> {
        let pw = pathway.clone();
        let pathway_json = serde_json::to_string(&pw)
            .map_err(|e| EngineError::BadRequest(format!("Unserializable pathway: {}", e)))?;
        let now_ms = Utc::now().timestamp_millis();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO pathways (pathway_id, version, name, description, owner_agent_id, pathway_json, created_at, updated_at)
                     VALUES (?1, 1, ?2, ?3, ?4, ?5, ?6, ?6)
                     ON CONFLICT(pathway_id) DO NOTHING",
                    rusqlite::params![
                        pw.pathway_id,
                        pw.name,
                        pw.description,
                        pw.owner_agent_id,
                        pathway_json,
                        now_ms,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn get(&self, pathway_id: &str) -> Result<Option<Pathway>, EngineError> {
        let id = pathway_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.query_row(
                    "SELECT pathway_json FROM pathways WHERE pathway_id = ?1",
                    rusqlite::params![id],
                    |row| {
                        let json: String = row.get(0)?;
                        parse_json_col(&json, 0)
                    },
                )
                .optional()
            })
            .await
    }

    pub async fn list(&self) -> Result<Vec<Pathway>, EngineError> {
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn
                    .prepare("SELECT pathway_json FROM pathways ORDER BY created_at DESC")?;
                let rows = stmt
                    .query_map([], |row| {
                        let json: String = row.get(0)?;
                        parse_json_col(&json, 0)
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    pub async fn delete(&self, pathway_id: &str) -> Result<bool, EngineError> {
        let id = pathway_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let n = conn.execute(
                    "DELETE FROM pathways WHERE pathway_id = ?1",
                    rusqlite::params![id],
                )?;
                Ok(n > 0)
            })
            .await
    }
}

pub(crate) fn parse_json_col<T: serde::de::DeserializeOwned>(
    json: &str,
    col: usize,
) -> Result<T, rusqlite::Error> {
    serde_json::from_str(json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pathway(id: &str) -> Pathway {
        Pathway::from_yaml(&format!(
            r#"
pathway_id: "{}"
name: "Sample"
entrance_post: "a"
posts:
  - post_id: "a"
    practice: "Echo"
"#,
            id
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let store = PathwayStore::new(Database::open_in_memory().unwrap());
        let pw = sample_pathway("p1");
        store.create(&pw).await.unwrap();

        let mut renamed = pw.clone();
        renamed.name = "Renamed".to_string();
        store.create(&renamed).await.unwrap();

        let stored = store.get("p1").await.unwrap().unwrap();
        assert_eq!(stored.name, "Sample");
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let store = PathwayStore::new(Database::open_in_memory().unwrap());
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_reports_whether_a_row_existed() {
        let store = PathwayStore::new(Database::open_in_memory().unwrap());
        store.create(&sample_pathway("p1")).await.unwrap();

        assert!(store.delete("p1").await.unwrap());
        assert!(store.get("p1").await.unwrap().is_none());
        assert!(!store.delete("p1").await.unwrap());
    }
}

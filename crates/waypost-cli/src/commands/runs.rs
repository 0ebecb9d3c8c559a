//! `waypost runs` — list persisted pathway runs.

use waypost_core::Pouch;

use super::print_json;

pub async fn list(pouch: &Pouch) -> Result<(), String> {
    let runs = pouch.pathruns.list().await.map_err(|e| e.to_string())?;

    let rows: Vec<serde_json::Value> = runs
        .iter()
        .map(|r| {
            serde_json::json!({
                "pathrun_id": r.pathrun_id,
                "pathway": r.pathway.name,
                "state": r.state.as_str(),
                "status": r.status_msg,
                "created": r.create_time.to_rfc3339(),
                "updated": r.update_time.to_rfc3339(),
            })
        })
        .collect();
    print_json(&serde_json::json!(rows));
    Ok(())
}

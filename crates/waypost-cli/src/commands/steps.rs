//! `waypost steps` — show the step history of a run.

use waypost_core::Pouch;

use super::print_json;

pub async fn list(pouch: &Pouch, pathrun_id: &str) -> Result<(), String> {
    let steps = pouch
        .poststeps
        .list(pathrun_id, None)
        .await
        .map_err(|e| e.to_string())?;

    if steps.is_empty() {
        println!("No steps recorded for run '{}'", pathrun_id);
        return Ok(());
    }

    let rows: Vec<serde_json::Value> = steps
        .iter()
        .map(|s| {
            serde_json::json!({
                "poststep_id": s.poststep_id,
                "post": s.post.post_id,
                "practice": s.post.practice,
                "state": s.state.as_str(),
                "status": s.status_msg,
                "started": s.start_time.to_rfc3339(),
                "stopped": s.stop_time.map(|t| t.to_rfc3339()),
            })
        })
        .collect();
    print_json(&serde_json::json!(rows));
    Ok(())
}

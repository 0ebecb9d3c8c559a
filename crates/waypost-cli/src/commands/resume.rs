//! `waypost resume` — resume a persisted pathway run.

use waypost_core::Pouch;

use super::{init_pathfinder, parse_inputs, print_json};

pub async fn run(
    pouch: &Pouch,
    pathrun_id: &str,
    input_pairs: &[String],
    plaza_url: Option<&str>,
) -> Result<(), String> {
    let inputs = parse_inputs(input_pairs)?;

    let pathrun = pouch
        .pathruns
        .get(pathrun_id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("PathRun '{}' not found", pathrun_id))?;

    println!(
        "Resuming run {} (pathway: {}, state: {})",
        pathrun.pathrun_id,
        pathrun.pathway.name,
        pathrun.state.as_str()
    );

    let pathfinder = init_pathfinder(pouch, plaza_url);
    let variables = pathfinder
        .resume(pathrun, inputs)
        .await
        .map_err(|e| e.to_string())?;

    print_json(&serde_json::json!(variables));
    Ok(())
}

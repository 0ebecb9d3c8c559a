//! `waypost run` — execute a pathway from a YAML file.

use waypost_core::models::pathway::Pathway;
use waypost_core::Pouch;

use super::{init_pathfinder, parse_inputs, print_json};

pub async fn run(
    pouch: &Pouch,
    file: &str,
    input_pairs: &[String],
    ttl: i64,
    plaza_url: Option<&str>,
) -> Result<(), String> {
    let pathway = Pathway::from_file(file)?;
    let inputs = parse_inputs(input_pairs)?;

    println!(
        "Running pathway: {} ({} post(s), entrance: {})",
        pathway.name,
        pathway.posts.len(),
        pathway.entrance_post
    );

    let pathfinder = init_pathfinder(pouch, plaza_url);
    let variables = pathfinder
        .run(pathway, inputs, ttl)
        .await
        .map_err(|e| e.to_string())?;

    print_json(&serde_json::json!(variables));
    Ok(())
}

//! `{variable}` placeholder substitution for post parameters.

use crate::models::VarMap;

/// Substitute variable placeholders in a parameter template.
///
/// Placeholders are `{identifier}` tokens. Scanning left to right, the
/// first placeholder with a binding in `variables` is substituted (all
/// occurrences of that one token); the scan then stops, so any later
/// placeholders stay verbatim. Unbound placeholders are logged and left
/// verbatim as well.
pub fn substitute(template: &str, variables: &VarMap) -> String {
    let re = regex::Regex::new(r"\{([^{}]+)\}").expect("placeholder regex");
    let mut result = template.to_string();
    for caps in re.captures_iter(template) {
        let name = &caps[1];
        match variables.get(name) {
            Some(value) => {
                let rendered = render_value(value);
                result = result.replace(&format!("{{{}}}", name), &rendered);
                tracing::debug!("Replaced placeholder {{{}}} with: {}", name, rendered);
                break;
            }
            None => {
                tracing::warn!("Placeholder {{{}}} not found in variables", name);
            }
        }
    }
    result
}

/// String form of a variable value: bare text for strings, compact JSON
/// for everything else.
fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

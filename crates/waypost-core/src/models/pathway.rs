//! Pathway definition types.
//!
//! A pathway is an immutable workflow description: a chain of posts, each
//! naming a practice (capability), its parameters, and how the practice
//! result maps back into workflow variables. Definitions are authored as
//! YAML:
//!
//! ```yaml
//! pathway_id: "translate-flow"
//! name: "Translate"
//! description: "Translate a document and summarize it"
//! entrance_post: "translate"
//!
//! posts:
//!   - post_id: "translate"
//!     name: "Translate"
//!     practice: "Translate"
//!     parameters:
//!       text: "{source}"
//!       target_lang: "fr"
//!     outputs:
//!       translation:
//!         field_mapping:
//!           text: "translated"
//!     next_post: "summarize"
//!
//!   - post_id: "summarize"
//!     name: "Summarize"
//!     practice: "Summarize"
//!     parameters:
//!       text: "{translated}"
//!     next_post: "exit"
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Sentinel `next_post` value that terminates a run.
pub const EXIT_POST: &str = "exit";

/// Output mapping declared on a post: copies fields of the practice
/// result into named workflow variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostOutput {
    /// result field name -> variable name
    #[serde(default)]
    pub field_mapping: HashMap<String, String>,
}

/// One node in a pathway: names a practice, its parameters, and its
/// single successor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    /// Identity of the post within its pathway
    pub post_id: String,

    /// Human-readable name
    #[serde(default)]
    pub name: String,

    /// The capability this post invokes
    pub practice: String,

    /// Parameter templates; string values may contain `{variable}`
    /// placeholders substituted from the run's variable environment
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,

    /// Output mappings applied to the practice result
    #[serde(default)]
    pub outputs: HashMap<String, PostOutput>,

    /// Successor post id, or `"exit"` to end the run
    #[serde(default = "default_next_post")]
    pub next_post: String,
}

fn default_next_post() -> String {
    EXIT_POST.to_string()
}

impl Post {
    /// Whether this post is the last one in the chain.
    pub fn is_exit(&self) -> bool {
        self.next_post == EXIT_POST
    }
}

/// An immutable workflow definition: a chain of posts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pathway {
    pub pathway_id: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub owner_agent_id: String,

    /// Id of the first post to execute
    pub entrance_post: String,

    pub posts: Vec<Post>,
}

impl Pathway {
    /// Look up a post by id.
    pub fn post(&self, post_id: &str) -> Option<&Post> {
        self.posts.iter().find(|p| p.post_id == post_id)
    }

    /// The first post of the pathway, if the entrance id resolves.
    pub fn entrance(&self) -> Option<&Post> {
        self.post(&self.entrance_post)
    }

    /// Parse a pathway definition from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, String> {
        serde_yaml::from_str(yaml).map_err(|e| format!("Failed to parse pathway YAML: {}", e))
    }

    /// Load a pathway definition from a file path.
    pub fn from_file(path: &str) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read pathway file '{}': {}", path, e))?;
        Self::from_yaml(&content)
    }
}

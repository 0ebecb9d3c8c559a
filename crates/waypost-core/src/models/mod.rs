pub mod pathrun;
pub mod pathway;
pub mod poststep;

pub use pathrun::*;
pub use pathway::*;
pub use poststep::*;

/// The workflow-wide variable environment threaded between steps.
pub type VarMap = std::collections::HashMap<String, serde_json::Value>;

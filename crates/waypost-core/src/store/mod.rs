//! Run state persistence — the Pouch.
//!
//! Three stores over one SQLite database, bundled behind the [`Pouch`]
//! facade. The Pathfinder only ever talks to the Pouch; it never touches
//! the database handle directly.

pub mod pathrun_store;
pub mod pathway_store;
pub mod poststep_store;

pub use pathrun_store::PathRunStore;
pub use pathway_store::PathwayStore;
pub use poststep_store::PostStepStore;

use crate::db::Database;

/// The persistence facade for pathways, path runs, and post steps.
#[derive(Clone)]
pub struct Pouch {
    pub pathways: PathwayStore,
    pub pathruns: PathRunStore,
    pub poststeps: PostStepStore,
}

impl Pouch {
    pub fn new(db: Database) -> Self {
        Self {
            pathways: PathwayStore::new(db.clone()),
            pathruns: PathRunStore::new(db.clone()),
            poststeps: PostStepStore::new(db),
        }
    }
}

use anyhow::Result;
use tracing::{info, warn};

use super::db_path;
use crate::cli::StatusArgs;
use crate::db::SqliteStore;

pub fn run(args: StatusArgs) -> Result<()> {
    let db_path = db_path(&args.cache_root, args.db_path.as_deref());
    info!(cache_root = %args.cache_root.display(), "status requested");

    if !db_path.exists() {
        warn!(path = %db_path.display(), "database file missing");
        return Ok(());
    }

    let store = SqliteStore::open(&db_path)?;
    let counts = store.counts()?;
    info!(
        path = %db_path.display(),
        employees = counts.employees,
        directions = counts.directions,
        documents = counts.documents,
        needs_review = counts.documents_needing_review,
        training_records = counts.training_records,
        "database status"
    );

    Ok(())
}

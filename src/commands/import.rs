use anyhow::{Result, bail};
use tracing::{info, warn};

use super::db_path;
use crate::cli::ImportArgs;
use crate::db::SqliteStore;
use crate::model::{DirectionRef, EmployeeRef};
use crate::util::read_json;

pub fn run(args: ImportArgs) -> Result<()> {
    if args.employees.is_none() && args.directions.is_none() {
        bail!("nothing to import: pass --employees and/or --directions");
    }

    let db_path = db_path(&args.cache_root, args.db_path.as_deref());
    let mut store = SqliteStore::open(&db_path)?;

    if let Some(path) = &args.employees {
        let employees: Vec<EmployeeRef> = read_json(path)?;
        let blank = employees
            .iter()
            .filter(|employee| employee.full_name.trim().is_empty())
            .count();
        if blank > 0 {
            warn!(count = blank, "employees with blank names will never match a page");
        }
        store.upsert_employees(&employees)?;
    }

    if let Some(path) = &args.directions {
        let directions: Vec<DirectionRef> = read_json(path)?;
        store.upsert_directions(&directions)?;
    }

    let counts = store.counts()?;
    info!(
        db = %db_path.display(),
        employees = counts.employees,
        directions = counts.directions,
        "registry import complete"
    );
    Ok(())
}

use anyhow::{bail, Context};
use jobhost_core::JobhostConfig;
use jobhost_history::{ClusterStateReader, HistoryStore};
use jobhost_packages::{manifest::read_manifest, PackageError, PackageStore};
use jobhost_scheduler::{JobData, NewJob, SchedulerHandle};
use serde::Serialize;
use serde_json::json;
use std::time::Duration;

use crate::cli::{HistoryCommand, JobCommand, PackageCommand};
use crate::open_db;

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn package(config: &JobhostConfig, command: PackageCommand) -> anyhow::Result<()> {
    let store = PackageStore::new(open_db(&config.database.path)?);
    match command {
        PackageCommand::Upload { zip, name } => {
            let bytes = std::fs::read(&zip).with_context(|| format!("reading {}", zip.display()))?;
            let name = match name {
                Some(name) => name,
                None => read_manifest(&bytes)?.name,
            };
            print_json(&store.save(&name, &bytes)?)
        }
        PackageCommand::List { names: true, .. } => print_json(&store.list_names()?),
        PackageCommand::List { page, page_size, .. } => {
            let (items, total) = store.list_page(page_size, page)?;
            print_json(&json!({ "total": total, "page": page, "items": items }))
        }
        PackageCommand::Show { name, brief } => {
            if brief {
                let details = store.get_details(&name)?;
                print_json(&details.ok_or(PackageError::NotFound { name })?)
            } else {
                let package = store.get_by_name(&name)?;
                print_json(&package.ok_or(PackageError::NotFound { name })?)
            }
        }
        PackageCommand::Delete { name } => {
            if !store.delete(&name)? {
                return Err(PackageError::NotFound { name }.into());
            }
            print_json(&json!({ "deleted": name }))
        }
    }
}

pub fn job(config: &JobhostConfig, command: JobCommand) -> anyhow::Result<()> {
    let handle = SchedulerHandle::new(open_db(&config.database.path)?)?;
    match command {
        JobCommand::Add(add) => {
            let schedule = add.schedule()?;
            let data = JobData {
                package_name: add.package.clone(),
                arguments: add.args.clone(),
            };
            let mut new = NewJob::new(add.name.clone(), schedule, data);
            if add.no_concurrent {
                new = new.disallow_concurrent();
            }
            if let Some(max_runs) = add.max_runs {
                new = new.with_max_runs(max_runs);
            }
            print_json(&handle.add_job(new)?)
        }
        JobCommand::List => print_json(&handle.list_jobs()?),
        JobCommand::Remove { id } => {
            handle.remove_job(&id)?;
            print_json(&json!({ "removed": id }))
        }
        JobCommand::Trigger { id } => {
            handle.trigger_now(&id)?;
            print_json(&json!({ "triggered": id }))
        }
    }
}

pub fn history(config: &JobhostConfig, command: HistoryCommand) -> anyhow::Result<()> {
    let store = HistoryStore::new(
        open_db(&config.database.path)?,
        Duration::from_secs(config.history.signal_timeout_secs),
    );
    match command {
        HistoryCommand::List { job, page, page_size } => {
            let (items, total) = store.list_history(&job, page_size, page)?;
            print_json(&json!({ "total": total, "page": page, "items": items }))
        }
        HistoryCommand::Show { id } => {
            let Some(detail) = store.get_detail(&id)? else {
                bail!("history entry not found: {id}");
            };
            let error_details = store.get_error_detail(&id)?;
            print_json(&json!({ "detail": detail, "errorDetails": error_details }))
        }
        HistoryCommand::Stats => print_json(&store.get_statistics()?),
        HistoryCommand::Chart { day } => print_json(&store.chart_data(day)?),
    }
}

pub fn cluster(config: &JobhostConfig) -> anyhow::Result<()> {
    let reader = ClusterStateReader::new(open_db(&config.database.path)?);
    print_json(&reader.list_instances()?)
}

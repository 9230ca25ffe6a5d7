use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::{DateTime, NaiveDate, Utc, Weekday};
use clap::{ArgGroup, Args, Parser, Subcommand};
use jobhost_scheduler::Schedule;

/// Schedule packaged console programs and keep their execution history.
#[derive(Parser)]
#[command(name = "jobhost", version, about = "Run packaged console programs on a schedule")]
pub struct Cli {
    /// Config file (defaults to ~/.jobhost/jobhost.toml)
    #[arg(long, global = true, env = "JOBHOST_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the scheduler until Ctrl-C
    Serve,
    /// Manage packages
    Package {
        #[command(subcommand)]
        command: PackageCommand,
    },
    /// Manage scheduled jobs
    Job {
        #[command(subcommand)]
        command: JobCommand,
    },
    /// Query execution history
    History {
        #[command(subcommand)]
        command: HistoryCommand,
    },
    /// List scheduler instances and their last check-in
    Cluster,
}

#[derive(Subcommand)]
pub enum PackageCommand {
    /// Upload a zip package (replaces any package with the same name)
    Upload {
        /// Path to the zip archive
        zip: PathBuf,
        /// Package name (defaults to the manifest's name)
        #[arg(long)]
        name: Option<String>,
    },
    /// List packages
    List {
        /// Only print package names
        #[arg(long)]
        names: bool,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 20)]
        page_size: usize,
    },
    /// Show a package's metadata
    Show {
        name: String,
        /// Only print the name and modification time
        #[arg(long)]
        brief: bool,
    },
    /// Delete a package
    Delete { name: String },
}

#[derive(Subcommand)]
pub enum JobCommand {
    /// Schedule a package
    Add(AddJob),
    /// List jobs
    List,
    /// Remove a job
    Remove { id: String },
    /// Make a job due immediately
    Trigger { id: String },
}

#[derive(Args)]
#[command(group(
    ArgGroup::new("schedule")
        .required(true)
        .args(["every", "daily", "weekly", "once", "cron"])
))]
pub struct AddJob {
    /// Job name
    pub name: String,
    /// Package to run
    #[arg(long)]
    pub package: String,
    /// Arguments appended after the package's own
    #[arg(long, default_value = "", allow_hyphen_values = true)]
    pub args: String,
    /// Run every N seconds
    #[arg(long, value_name = "SECS")]
    pub every: Option<u64>,
    /// Run daily at HH:MM (UTC)
    #[arg(long, value_name = "HH:MM")]
    pub daily: Option<String>,
    /// Run weekly, e.g. `mon,09:30` or `0,09:30` (UTC)
    #[arg(long, value_name = "DAY,HH:MM")]
    pub weekly: Option<String>,
    /// Run once at an RFC3339 instant
    #[arg(long, value_name = "RFC3339")]
    pub once: Option<String>,
    /// Store a cron expression; such jobs only run via `job trigger`
    #[arg(long, value_name = "EXPR")]
    pub cron: Option<String>,
    /// Veto a firing while another firing of this job is still executing
    #[arg(long)]
    pub no_concurrent: bool,
    /// Stop after this many runs
    #[arg(long)]
    pub max_runs: Option<u32>,
}

impl AddJob {
    pub fn schedule(&self) -> anyhow::Result<Schedule> {
        if let Some(every_secs) = self.every {
            return Ok(Schedule::Interval { every_secs });
        }
        if let Some(daily) = &self.daily {
            let (hour, minute) = parse_time_of_day(daily)?;
            return Ok(Schedule::Daily { hour, minute });
        }
        if let Some(weekly) = &self.weekly {
            let (day, time) = weekly
                .split_once(',')
                .with_context(|| format!("expected DAY,HH:MM, got `{weekly}`"))?;
            let (hour, minute) = parse_time_of_day(time)?;
            return Ok(Schedule::Weekly {
                day: parse_weekday(day)?,
                hour,
                minute,
            });
        }
        if let Some(once) = &self.once {
            let at = DateTime::parse_from_rfc3339(once)
                .with_context(|| format!("invalid RFC3339 instant `{once}`"))?
                .with_timezone(&Utc);
            return Ok(Schedule::Once { at });
        }
        if let Some(expression) = &self.cron {
            return Ok(Schedule::Cron {
                expression: expression.clone(),
            });
        }
        bail!("no schedule given")
    }
}

#[derive(Subcommand)]
pub enum HistoryCommand {
    /// List runs, newest first
    List {
        /// Only runs of this job
        #[arg(long, default_value = "")]
        job: String,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 20)]
        page_size: usize,
    },
    /// Show one run with its output and failure details
    Show { id: String },
    /// Totals per outcome
    Stats,
    /// Runs per 15 minutes for a UTC day
    Chart { day: NaiveDate },
}

fn parse_time_of_day(s: &str) -> anyhow::Result<(u8, u8)> {
    let (hour, minute) = s
        .trim()
        .split_once(':')
        .with_context(|| format!("expected HH:MM, got `{s}`"))?;
    Ok((
        hour.parse().with_context(|| format!("bad hour in `{s}`"))?,
        minute.parse().with_context(|| format!("bad minute in `{s}`"))?,
    ))
}

/// `0`..`6` (Monday first) or a weekday name such as `mon` / `monday`.
fn parse_weekday(s: &str) -> anyhow::Result<u8> {
    let s = s.trim();
    if let Ok(n) = s.parse::<u8>() {
        return Ok(n);
    }
    s.parse::<Weekday>()
        .map(|day| day.num_days_from_monday() as u8)
        .map_err(|_| anyhow::anyhow!("unknown weekday `{s}`"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("jobhost").chain(args.iter().copied())).unwrap()
    }

    fn add_job(args: &[&str]) -> AddJob {
        match parse(args).command {
            Commands::Job {
                command: JobCommand::Add(add),
            } => add,
            _ => panic!("expected job add"),
        }
    }

    #[test]
    fn weekly_accepts_names_and_numbers() {
        let by_name = add_job(&["job", "add", "report", "--package", "p1", "--weekly", "fri,18:05"]);
        assert_eq!(
            by_name.schedule().unwrap(),
            Schedule::Weekly { day: 4, hour: 18, minute: 5 }
        );
        let by_number = add_job(&["job", "add", "report", "--package", "p1", "--weekly", "0,09:30"]);
        assert_eq!(
            by_number.schedule().unwrap(),
            Schedule::Weekly { day: 0, hour: 9, minute: 30 }
        );
    }

    #[test]
    fn caller_args_may_start_with_a_dash() {
        let add = add_job(&[
            "job", "add", "sync", "--package", "p1", "--args", "--y", "--every", "60", "--no-concurrent",
        ]);
        assert_eq!(add.args, "--y");
        assert!(add.no_concurrent);
        assert_eq!(add.schedule().unwrap(), Schedule::Interval { every_secs: 60 });
    }

    #[test]
    fn exactly_one_schedule_is_required() {
        let none = Cli::try_parse_from(["jobhost", "job", "add", "x", "--package", "p1"]);
        assert!(none.is_err());
        let two = Cli::try_parse_from([
            "jobhost", "job", "add", "x", "--package", "p1", "--every", "5", "--daily", "09:00",
        ]);
        assert!(two.is_err());
    }

    #[test]
    fn bad_times_are_rejected() {
        let add = add_job(&["job", "add", "x", "--package", "p1", "--daily", "nine"]);
        assert!(add.schedule().is_err());
        let add = add_job(&["job", "add", "x", "--package", "p1", "--once", "tomorrow"]);
        assert!(add.schedule().is_err());
    }

    #[test]
    fn chart_day_is_a_date() {
        match parse(&["history", "chart", "2026-03-02"]).command {
            Commands::History {
                command: HistoryCommand::Chart { day },
            } => assert_eq!(day, NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()),
            _ => panic!("expected history chart"),
        }
    }
}

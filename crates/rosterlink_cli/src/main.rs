//! Operator entry point for a roster database.
//!
//! # Responsibility
//! - Open a database file with optional JSON engine settings.
//! - Print liveness, listing and integrity-audit summaries.

use clap::{Parser, Subcommand};
use log::error;
use rosterlink_core::{
    core_version, default_log_level, init_logging, ping, EmployeeService, Engine, EngineConfig,
    EngineResult, LookupService,
};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "rosterlink", about = "Employee roster integrity tool", version)]
struct Cli {
    /// SQLite database file.
    db_path: PathBuf,

    /// JSON engine settings; `db_path` on the command line wins.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Absolute directory for rotating log files.
    #[arg(long)]
    log_dir: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Command {
    /// Print core version and open the database.
    Ping,
    /// Report relationship divergences. Exits non-zero when any are found.
    Audit,
    /// List employees whose name contains the filter.
    Employees {
        #[arg(default_value = "")]
        filter: String,
    },
    /// List departments with their member counts.
    Departments,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(log_dir) = &cli.log_dir {
        if let Err(err) = init_logging(default_log_level(), log_dir) {
            eprintln!("logging disabled: {err}");
        }
    }

    let config = match &cli.config {
        Some(path) => match EngineConfig::load(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("{err}");
                return ExitCode::FAILURE;
            }
        },
        None => EngineConfig::default(),
    };
    let config = EngineConfig {
        db_path: Some(cli.db_path.clone()),
        ..config
    };

    match run(config, cli.command.unwrap_or(Command::Ping)) {
        Ok(code) => code,
        Err(err) => {
            error!("event=cli_run module=cli status=error error={}", err);
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: EngineConfig, command: Command) -> EngineResult<ExitCode> {
    let engine = Engine::open(config)?;
    match command {
        Command::Ping => {
            println!("rosterlink_core ping={}", ping());
            println!("rosterlink_core version={}", core_version());
        }
        Command::Audit => {
            let report = engine.audit()?;
            for (collection, count) in &report.scanned {
                println!("scanned {collection}={count}");
            }
            for divergence in &report.divergences {
                println!("divergence: {divergence}");
            }
            println!("divergences={}", report.divergences.len());
            if !report.is_consistent() {
                return Ok(ExitCode::from(2));
            }
        }
        Command::Employees { filter } => {
            let employees = engine.read(|store| EmployeeService::new(store).search(&filter))?;
            for employee in employees {
                println!(
                    "{}\t{}\tdep={}",
                    employee.id,
                    employee.name,
                    employee
                        .dep_id
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| "-".to_string())
                );
            }
        }
        Command::Departments => {
            let departments = engine.read(|store| LookupService::new(store).list_departments())?;
            for department in departments {
                println!(
                    "{}\t{}\tmembers={}",
                    department.id,
                    department.name,
                    department.members.len()
                );
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

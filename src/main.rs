use std::io;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info, warn};

use tabload::cli::Cli;
use tabload::database::SqliteConnector;
use tabload::runner::{Outcome, Runner};

fn setup_logging(level: log::LevelFilter) {
    env_logger::Builder::from_default_env().filter_level(level).init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.log_level);

    let connector = SqliteConnector;
    let runner = Runner::new(cli.run_config(), &connector);
    info!("tabload starting (run {})", runner.run_timestamp());

    let stdout = io::stdout();
    let summary = match runner.run(&mut stdout.lock()) {
        Ok(summary) => summary,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    for item in &summary.outcomes {
        match &item.outcome {
            Outcome::Failed(reason) => warn!("{}: failed: {reason}", item.descriptor.display()),
            other => info!("{}: {other:?}", item.descriptor.display()),
        }
    }
    if summary.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

fn main() -> ExitCode {
    if let Err(err) = try_main() {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn try_main() -> anyhow::Result<()> {
    boardagenda::logging::init().context("init logging")?;

    let cli = boardagenda::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        boardagenda::cli::Command::Parse(args) => {
            boardagenda::agenda::run(args).context("parse")?;
        }
        boardagenda::cli::Command::Roster(args) => {
            boardagenda::roster::run(args).context("roster")?;
        }
        boardagenda::cli::Command::Report(args) => {
            boardagenda::report::run(args).context("report")?;
        }
        boardagenda::cli::Command::Approve(args) => {
            boardagenda::approval::run(args).context("approve")?;
        }
    }

    Ok(())
}

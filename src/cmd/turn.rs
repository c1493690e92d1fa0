//! Stop-hook turns: `loopwarden orchestrate` and `loopwarden grind`.
//!
//! Both read one JSON object from stdin and print exactly one JSON object to
//! stdout. Input that can't be decoded is a no-op turn, never a hard failure.

use anyhow::{Context, Result};
use loopwarden::config::LoopConfig;
use loopwarden::grind::GrindLoop;
use loopwarden::orchestrator::Orchestrator;
use loopwarden::runner::ShellRunner;
use loopwarden::turn::{TurnInput, TurnOutput};
use std::io::Write;
use tokio::io::AsyncReadExt;

pub async fn cmd_orchestrate(config: &LoopConfig) -> Result<()> {
    let Some(input) = read_turn_input().await? else {
        return emit(&TurnOutput::stop());
    };
    let runner = ShellRunner::new(&config.project_dir, config.command_timeout());
    let output = Orchestrator::from_config(config, runner).turn(&input).await?;
    emit(&output)
}

pub async fn cmd_grind(config: &LoopConfig) -> Result<()> {
    let Some(input) = read_turn_input().await? else {
        return emit(&TurnOutput::stop());
    };
    let runner = ShellRunner::new(&config.project_dir, config.command_timeout());
    let output = GrindLoop::from_config(config, runner).turn(&input).await?;
    emit(&output)
}

async fn read_turn_input() -> Result<Option<TurnInput>> {
    let mut raw = String::new();
    tokio::io::stdin()
        .read_to_string(&mut raw)
        .await
        .context("Failed to read turn input from stdin")?;

    match TurnInput::parse(&raw) {
        Ok(input) => Ok(Some(input)),
        Err(e) => {
            tracing::warn!(error = %e, "ignoring malformed turn input");
            Ok(None)
        }
    }
}

fn emit(output: &TurnOutput) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", output.to_json()).context("Failed to write turn output")?;
    stdout.flush()?;
    Ok(())
}

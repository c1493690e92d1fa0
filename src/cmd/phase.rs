//! Run inspection and control: `status`, `plan`, `mark-done`, `reset`.

use anyhow::{Context, Result, bail};
use console::style;
use loopwarden::classify::classify;
use loopwarden::config::LoopConfig;
use loopwarden::e2e;
use loopwarden::orchestrator::{RunState, StateStore, TurnLock, reset_run};
use loopwarden::plan::{Phase, Plan};
use loopwarden::runner::ShellRunner;
use loopwarden::scratchpad::Scratchpad;
use loopwarden::tracker::collect_touched_paths;

pub fn cmd_status(config: &LoopConfig) -> Result<()> {
    let scratchpad = Scratchpad::new(config.scratchpad_path());
    let store = StateStore::new(config.state_file());
    let text = scratchpad.read()?;

    println!();
    println!("Loopwarden Status");
    println!("=================");
    println!();
    println!("Scratchpad: {}", scratchpad.path().display());
    println!("State file: {}", store.path().display());
    println!();

    // Read-only: a run recovered from markers is shown but not saved.
    let (state, recovered) = match store.load()? {
        Some(state) => (state, false),
        None => match RunState::recover_from_markers(&text)? {
            Some(state) => (state, true),
            None => {
                println!("Run: not initialized");
                println!();
                println!("The next completed agent turn will build a plan.");
                println!();
                return Ok(());
            }
        },
    };

    if recovered {
        println!(
            "{}",
            style("Run recovered from scratchpad markers (not yet saved)").yellow()
        );
    } else {
        println!("Run:        {}", state.run_id);
        println!(
            "Started:    {}",
            state.initialized_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    println!("Plan:       {}", state.plan);

    let phase = if state.is_done() {
        style(state.phase.to_string()).green().bold()
    } else {
        style(state.phase.to_string()).cyan().bold()
    };
    println!("Phase:      {}", phase);
    if state.phase.is_agent_phase() {
        let marker = state.phase.done_marker();
        let status = if scratchpad.has_line(&marker)? {
            style("present").green()
        } else {
            style("missing").yellow()
        };
        println!("            {} ({})", marker, status);
    }

    let completed = state.completed_phases();
    if !completed.is_empty() {
        let names: Vec<_> = completed.iter().map(Phase::as_str).collect();
        println!("Completed:  {}", names.join(", "));
    }

    if state.healthcare.enabled {
        println!("Healthcare: {}", style("YES").magenta());
        for reason in &state.healthcare.reasons {
            println!("            {}", style(reason).dim());
        }
    } else {
        println!("Healthcare: NO");
    }

    if state.touched_at_init.is_empty() {
        println!("Touched:    (none)");
    } else {
        println!("Touched:    {} path(s) at init", state.touched_at_init.len());
        for path in &state.touched_at_init {
            println!("            {}", path);
        }
    }

    if !state.history.is_empty() {
        println!();
        println!("History:");
        for t in &state.history {
            println!(
                "  {} {} → {} {}",
                style(t.at.format("%Y-%m-%d %H:%M:%S")).dim(),
                t.from,
                t.to,
                style(format!("(loop {})", t.loop_count)).dim()
            );
        }
    }
    println!();
    Ok(())
}

/// Dry run: classify the current changes and show the resulting plan.
pub async fn cmd_plan(config: &LoopConfig) -> Result<()> {
    let scratchpad = Scratchpad::new(config.scratchpad_path());
    let runner = ShellRunner::new(&config.project_dir, config.command_timeout());

    let text = scratchpad.read()?;
    let touched = collect_touched_paths(&runner)
        .await
        .context("Failed to collect touched paths")?;
    let classification = classify(&text, &touched, &config.toml.healthcare.keywords);
    let plan = Plan::build(&classification);
    let decision = e2e::decide(&touched, config.toml.e2e.run_when_frontend_unclassified);

    println!();
    println!("Touched paths ({}):", touched.len());
    if touched.is_empty() {
        println!("  (none)");
    }
    for path in &touched {
        println!("  {}", path);
    }
    println!();
    println!("Classification:");
    println!("  events:        {}", classification.touches_events);
    println!("  projections:   {}", classification.touches_projections);
    println!("  docs or flows: {}", classification.touches_docs_or_flows);
    println!("  healthcare:    {}", classification.healthcare_mode());
    for reason in &classification.healthcare.reasons {
        println!("                 {}", style(reason).dim());
    }
    println!();
    println!("Plan: {}", style(&plan).bold());
    println!(
        "E2E:  {} ({})",
        if decision.run { "YES" } else { "NO" },
        decision.reasons.join(" | ")
    );

    if let Some(state) = StateStore::new(config.state_file()).load()? {
        println!();
        println!(
            "{} a run is in progress with a frozen plan: {}",
            style("Note:").yellow(),
            state.plan
        );
    }
    println!();
    Ok(())
}

pub fn cmd_mark_done(config: &LoopConfig, phase: &str) -> Result<()> {
    let phase: Phase = phase.parse()?;
    if !phase.is_agent_phase() {
        bail!(
            "{} is not completed by a marker. GRIND advances when tests are green, DONE is terminal.",
            phase
        );
    }

    let _lock = TurnLock::acquire(config.lock_file())?;
    let scratchpad = Scratchpad::new(config.scratchpad_path());
    let marker = phase.done_marker();
    if scratchpad.has_line(&marker)? {
        println!("{} is already marked done", phase);
        return Ok(());
    }
    scratchpad.append(&format!("\n{}\n", marker))?;
    println!("Appended {} to {}", style(&marker).green(), scratchpad.path().display());
    Ok(())
}

pub fn cmd_reset(config: &LoopConfig, force: bool) -> Result<()> {
    use dialoguer::Confirm;

    if !force {
        let confirm = Confirm::new()
            .with_prompt("This will discard the current plan and phase. Are you sure?")
            .default(false)
            .interact()
            .unwrap_or(false);

        if !confirm {
            println!("Reset cancelled");
            return Ok(());
        }
    }

    let _lock = TurnLock::acquire(config.lock_file())?;
    let store = StateStore::new(config.state_file());
    let scratchpad = Scratchpad::new(config.scratchpad_path());
    if reset_run(&store, &scratchpad)? {
        println!("Reset complete");
    } else {
        println!("Nothing to reset");
    }
    Ok(())
}

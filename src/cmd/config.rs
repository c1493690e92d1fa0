//! Configuration view and validation commands: `loopwarden config`.

use anyhow::Result;

use super::super::ConfigCommands;

pub fn cmd_config(project_dir: &std::path::Path, command: Option<ConfigCommands>) -> Result<()> {
    use loopwarden::config::{CONFIG_FILE, LOOPWARDEN_DIR, LoopConfig, LoopToml};

    let loopwarden_dir = project_dir.join(LOOPWARDEN_DIR);
    let config_path = loopwarden_dir.join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Loopwarden Configuration");
            println!("========================");
            println!();

            let toml = if config_path.exists() {
                println!("Config file: {}", config_path.display());
                LoopToml::load(&config_path)?
            } else {
                println!("No loopwarden.toml found at {}", config_path.display());
                println!("Using default configuration.");
                LoopToml::default()
            };
            println!();
            print_toml(&toml);

            println!("Effective values (with env overrides):");
            let config = LoopConfig::new(project_dir.to_path_buf())?;
            println!("  test command = \"{}\"", config.test_cmd());
            println!("  e2e command = \"{}\"", config.e2e_cmd());
            println!("  timeout = {}s", config.command_timeout().as_secs());
            println!("  scratchpad = {}", config.scratchpad_path().display());
            println!();

            if !config_path.exists() {
                println!("Run 'loopwarden config init' to create a loopwarden.toml file.");
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No loopwarden.toml found. Using defaults (valid).");
                return Ok(());
            }

            let toml = LoopToml::load(&config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("loopwarden.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            if !loopwarden_dir.exists() {
                std::fs::create_dir_all(&loopwarden_dir)?;
            }

            LoopToml::default().save(&config_path)?;

            println!("Created loopwarden.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [commands] test, e2e, timeout_secs");
            println!("  - [orchestrator] / [grind] max_iterations");
            println!("  - [scratchpad] path, truncate_chars");
            println!("  - [e2e] run_when_frontend_unclassified");
            println!("  - [healthcare] keywords");
            println!();
        }
    }

    Ok(())
}

fn print_toml(toml: &loopwarden::config::LoopToml) {
    println!("[scratchpad]");
    println!("  path = \"{}\"", toml.scratchpad.path.display());
    println!("  truncate_chars = {}", toml.scratchpad.truncate_chars);
    println!();
    println!("[commands]");
    println!("  test = \"{}\"", toml.commands.test);
    println!("  e2e = \"{}\"", toml.commands.e2e);
    println!("  timeout_secs = {}", toml.commands.timeout_secs);
    println!();
    println!("[orchestrator]");
    println!("  max_iterations = {}", toml.orchestrator.max_iterations);
    println!();
    println!("[grind]");
    println!("  max_iterations = {}", toml.grind.max_iterations);
    println!();
    println!("[e2e]");
    println!(
        "  run_when_frontend_unclassified = {}",
        toml.e2e.run_when_frontend_unclassified
    );
    println!();
    println!("[healthcare]");
    println!("  keywords = [{}]", toml.healthcare.keywords.join(", "));
    println!();
    println!("[logging]");
    println!("  file = {}", toml.logging.file);
    println!();
}

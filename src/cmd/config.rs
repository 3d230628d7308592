//! Configuration view and validation commands: `conductor config`.

use anyhow::Result;

use conductor::config::{ConductorToml, STATE_DIR};

use super::super::ConfigCommands;

pub fn cmd_config(project_dir: &std::path::Path, command: Option<ConfigCommands>) -> Result<()> {
    let state_dir = project_dir.join(STATE_DIR);
    let config_path = state_dir.join("conductor.toml");

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Conductor Configuration");
            println!("=======================");
            println!();

            let toml = if config_path.exists() {
                println!("Config file: {}", config_path.display());
                ConductorToml::load(&config_path)?
            } else {
                println!("No conductor.toml found at {}", config_path.display());
                println!("Using default configuration:");
                ConductorToml::default()
            };
            println!();
            print!("{}", toml::to_string_pretty(&toml)?);
            println!();

            println!("Effective values (with env overrides):");
            println!("  adapter.command = \"{}\"", toml.adapter.command());
            println!();

            if !config_path.exists() {
                println!("Run 'conductor config init' to create a conductor.toml file.");
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No conductor.toml found. Using defaults (valid).");
                return Ok(());
            }

            let toml = ConductorToml::load(&config_path)?;
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
                println!("conductor.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            if !state_dir.exists() {
                std::fs::create_dir_all(&state_dir)?;
            }

            ConductorToml::default().save(&config_path)?;

            println!("Created conductor.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [adapter] command, model, context_window");
            println!("  - [run] on_error, inject_output, output_limit");
            println!("  - [checkpoint] output, commit");
            println!();
        }
    }

    Ok(())
}

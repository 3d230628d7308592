//! Directive manifest inspection: `conductor directives`.

use anyhow::Result;
use console::style;
use std::path::Path;

use conductor::config::RunOptions;
use conductor::directives::PluginDirectiveRegistry;

use super::super::DirectivesCommands;

pub fn cmd_directives(project_dir: &Path, command: Option<DirectivesCommands>) -> Result<()> {
    let options = RunOptions::for_workspace(project_dir);
    let registry = PluginDirectiveRegistry::discover(project_dir, options.directive_timeout);

    match command {
        None | Some(DirectivesCommands::List) => {
            if registry.manifests().is_empty() && registry.warnings().is_empty() {
                println!("No directive manifests found.");
                return Ok(());
            }

            println!("Manifests (highest precedence first):");
            for manifest in registry.manifests() {
                println!("  {}", manifest.display());
            }
            println!();

            if registry.is_empty() {
                println!("No directive handlers registered.");
            } else {
                println!("Handlers:");
                for handler in registry.handlers() {
                    println!("  {}", style(handler.key()).cyan().bold());
                    if let Some(ref description) = handler.description {
                        println!("    {}", description);
                    }
                    if !handler.required_capabilities.is_empty() {
                        let caps: Vec<&str> = handler
                            .required_capabilities
                            .iter()
                            .map(|c| c.as_str())
                            .collect();
                        println!("    requires: {}", caps.join(", "));
                    }
                    println!("    source: {}", handler.source.display());
                }
            }

            print_warnings(registry.warnings());
        }
        Some(DirectivesCommands::Validate) => {
            let warnings = registry.warnings();
            if warnings.is_empty() {
                println!(
                    "{} handler(s) from {} manifest(s) are valid.",
                    registry.handlers().len(),
                    registry.manifests().len()
                );
                return Ok(());
            }
            print_warnings(warnings);
            anyhow::bail!("{} directive manifest problem(s) found", warnings.len());
        }
    }

    Ok(())
}

fn print_warnings(warnings: &[String]) {
    if warnings.is_empty() {
        return;
    }
    println!();
    println!("{}", style("Warnings:").yellow().bold());
    for warning in warnings {
        println!("  - {}", warning);
    }
}

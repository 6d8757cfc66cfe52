use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};

use uipilot::{matcher, Scenario};

#[derive(Parser)]
#[command(name = "uipilot")]
#[command(version = "0.1.0")]
#[command(about = "Record-and-replay UI automation toolkit", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the steps of a scenario file
    Inspect {
        /// Path to a scenario JSON document
        path: PathBuf,
    },

    /// Rewrite a scenario file in canonical form, dropping unreadable steps
    Normalize {
        /// Path to a scenario JSON document
        path: PathBuf,
    },

    /// Edit a scenario file in place
    Edit {
        /// Path to a scenario JSON document
        path: PathBuf,

        /// Delete the step at this index (0-based)
        #[arg(long)]
        delete: Option<usize>,

        /// Move a step: FROM TO (0-based)
        #[arg(long, num_args = 2, value_names = ["FROM", "TO"])]
        r#move: Option<Vec<usize>>,
    },

    /// Search a screenshot for a template image
    Find {
        /// Path to the screenshot
        screen: PathBuf,

        /// Path to the template image
        template: PathBuf,

        /// Minimum correlation score to accept
        #[arg(short, long, default_value = "0.8")]
        threshold: f32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect { path } => {
            let scenario = load_scenario(&path).await?;
            println!(
                "{} {} ({} steps)",
                "●".cyan().bold(),
                path.display(),
                scenario.len()
            );
            for (index, step) in scenario.steps().iter().enumerate() {
                println!("  [{}] {}", index, step.summary());
            }
        }

        Commands::Normalize { path } => {
            let raw = tokio::fs::read_to_string(&path).await?;
            let declared = serde_json::from_str::<serde_json::Value>(&raw)
                .ok()
                .and_then(|v| v.get("steps").and_then(|s| s.as_array()).map(|a| a.len()));
            let scenario = Scenario::from_json(target_of(&path), &raw);
            tokio::fs::write(&path, scenario.to_json()).await?;

            let kept = scenario.len();
            match declared {
                Some(n) if n > kept => println!(
                    "{} Normalized {} ({} steps kept, {} dropped)",
                    "✓".green(),
                    path.display(),
                    kept,
                    n - kept
                ),
                _ => println!(
                    "{} Normalized {} ({} steps)",
                    "✓".green(),
                    path.display(),
                    kept
                ),
            }
        }

        Commands::Edit {
            path,
            delete,
            r#move,
        } => {
            let mut scenario = load_scenario(&path).await?;
            if let Some(pair) = r#move {
                let (from, to) = (pair[0], pair[1]);
                if scenario.move_step(from, to) {
                    println!("{} Moved step {} to {}", "✓".green(), from, to);
                } else {
                    anyhow::bail!("move {} -> {} is out of range", from, to);
                }
            }
            if let Some(index) = delete {
                match scenario.remove(index) {
                    Some(step) => {
                        println!("{} Deleted step {}: {}", "✓".green(), index, step.summary())
                    }
                    None => anyhow::bail!("no step at index {}", index),
                }
            }
            tokio::fs::write(&path, scenario.to_json()).await?;
        }

        Commands::Find {
            screen,
            template,
            threshold,
        } => {
            let screen_img = image::open(&screen)?.to_rgba8();
            let template_img = image::open(&template)?.to_rgba8();

            match matcher::find_template(&screen_img, &template_img, threshold) {
                Some(rect) => {
                    let center = rect.center();
                    println!(
                        "{} Match at ({}, {}) size {}x{}, center ({}, {})",
                        "✓".green().bold(),
                        rect.x,
                        rect.y,
                        rect.w,
                        rect.h,
                        center.x,
                        center.y
                    );
                }
                None => {
                    println!("{} No match at threshold {}", "✗".red().bold(), threshold);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

async fn load_scenario(path: &Path) -> anyhow::Result<Scenario> {
    let raw = tokio::fs::read_to_string(path).await?;
    Ok(Scenario::from_json(target_of(path), &raw))
}

/// Scenario files carry no target identifier; the file stem stands in.
fn target_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "scenario".to_string())
}

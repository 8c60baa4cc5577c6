//! AniMAIRE command-line interface.
//!
//! Run dose-rate simulations from TOML configuration files:
//! ```sh
//! animaire run job.toml
//! animaire validate job.toml
//! animaire presets
//! animaire preview job.toml
//! animaire compare job.toml --gle "GLE 69"
//! ```

mod config;
mod runner;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use animaire_core::presets::{find_gle_preset, gle_presets};
use animaire_core::report::compare_tables;
use animaire_core::spectra::ModelPreview;
use animaire_core::types::DoseColumn;

#[derive(Parser)]
#[command(name = "animaire")]
#[command(about = "AniMAIRE: anisotropic cosmic-ray dose rates at aviation altitudes")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation from a TOML configuration file.
    Run {
        /// Path to the job configuration file.
        config: PathBuf,
        /// Output directory (overrides config file setting).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file without running the simulation.
    Validate {
        /// Path to the job configuration file.
        config: PathBuf,
    },
    /// List the built-in ground level enhancement presets.
    Presets,
    /// Sample the spectrum and pitch-angle distribution of each configured
    /// distribution.
    Preview {
        /// Path to the job configuration file.
        config: PathBuf,
        /// Output directory (overrides config file setting).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Compare a simulation with a GLE preset over the same grid.
    Compare {
        /// Path to the job configuration file.
        config: PathBuf,
        /// Preset name or number, e.g. "GLE 69" or 71.
        #[arg(long)]
        gle: String,
        /// Dose column to compare.
        #[arg(long, default_value = "edose")]
        quantity: String,
        /// Output directory (overrides config file setting).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, output } => {
            println!("AniMAIRE Dose Rates");
            println!("===================");
            let job = config::load_config(&config)?;
            println!("Configuration: {}", config.display());

            let out_dir = output.unwrap_or_else(|| PathBuf::from(&job.output.directory));
            let table = runner::run_simulation(&job, Some(&out_dir))?;
            runner::print_summary(&table);

            if job.output.save_csv {
                runner::write_dose_csv(&table, &out_dir.join("dose_rates.csv"), &job)?;
            }
            if job.output.save_json {
                runner::write_dose_json(&table, &out_dir.join("dose_rates.json"))?;
            }

            println!("Simulation complete.");
            Ok(())
        }
        Commands::Validate { config } => {
            let job = config::load_config(&config)?;
            let distributions = runner::build_distributions(&job)?;
            anyhow::ensure!(
                !distributions.is_empty(),
                "At least one [[distribution]] is required"
            );
            let run = runner::build_run_config(&job, distributions, None)?;
            runner::build_collaborators(&job)?;
            println!(
                "Configuration is valid: {} ({} distributions, {} grid points, {} altitudes)",
                config.display(),
                run.distributions.len(),
                run.grid.len(),
                run.altitudes.len()
            );
            Ok(())
        }
        Commands::Presets => {
            println!("Available GLE presets:");
            for preset in gle_presets()? {
                println!();
                println!("  {}", preset.name);
                println!("    {}", preset.description);
                println!("    date_time: {}", preset.date_and_time);
                println!("    model: {}", preset.model);
                println!(
                    "    reference: {}, {}",
                    preset.reference.latitude, preset.reference.longitude
                );
                for reference in preset.references {
                    println!("    • {}", reference);
                }
            }
            Ok(())
        }
        Commands::Preview { config, output } => {
            let job = config::load_config(&config)?;
            let out_dir = output.unwrap_or_else(|| PathBuf::from(&job.output.directory));
            for (i, distribution) in runner::build_distributions(&job)?.iter().enumerate() {
                let preview = ModelPreview::sample(distribution);
                let path = out_dir.join(format!("preview_{}.csv", i + 1));
                runner::write_preview_csv(distribution.label(), &preview, &path)?;
            }
            Ok(())
        }
        Commands::Compare {
            config,
            gle,
            quantity,
            output,
        } => {
            println!("AniMAIRE Comparison");
            println!("===================");
            let job = config::load_config(&config)?;
            let preset = find_gle_preset(&gle)?
                .with_context(|| format!("Unknown GLE preset '{}'; see `animaire presets`", gle))?;
            let column = DoseColumn::from_name(&quantity)
                .with_context(|| format!("Unknown dose column '{}'", quantity))?;
            let out_dir = output.unwrap_or_else(|| PathBuf::from(&job.output.directory));

            println!("Current simulation:");
            let current = runner::run_simulation(&job, None)?;
            println!("{}:", preset.name);
            let reference = runner::run_preset(&job, &preset)?;

            let comparison = compare_tables(&current, &reference, column)?;
            println!("{}", runner::comparison_statistics(&comparison, &preset));

            let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
            runner::write_comparison_csv(
                &comparison,
                &preset,
                &out_dir.join(format!("comparison_{}.csv", timestamp)),
            )?;
            runner::write_comparison_report(
                &comparison,
                &preset,
                &job,
                &out_dir.join(format!("comparison_report_{}.txt", timestamp)),
            )?;
            Ok(())
        }
    }
}

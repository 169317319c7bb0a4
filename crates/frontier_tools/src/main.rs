//! Frontier - Development Tools
//!
//! # Usage
//!
//! ```bash
//! # Validate the config files in a data directory
//! cargo run -p frontier_tools -- validate assets/data
//!
//! # Plan a formation of 12 agents around an obstacle
//! cargo run -p frontier_tools -- plan --formation line --agents 12 --obstacle 0,0,2
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use frontier_core::math::Fixed;
use frontier_tools::plan::{parse_fixed, parse_obstacle, parse_point, run_plan, Obstacle, PlanRequest};
use frontier_tools::validate::{load_movement_config, validate_data_directory};
use frontier_tools::ToolError;

#[derive(Parser)]
#[command(name = "frontier-tools")]
#[command(about = "Development tools for Frontier formation and territory data")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate data files
    Validate {
        /// Path to data directory
        #[arg(default_value = "assets/data")]
        path: PathBuf,
    },

    /// Plan a group move on an open map and print the destinations as JSON
    Plan {
        /// Movement config file
        #[arg(short, long, default_value = "assets/data/movement.ron")]
        config: PathBuf,

        /// Formation code
        #[arg(short, long, default_value = "circle")]
        formation: String,

        /// Number of agents
        #[arg(short, long, default_value = "8")]
        agents: u32,

        /// Agent radius
        #[arg(long, default_value = "1", value_parser = parse_fixed)]
        radius: Fixed,

        /// Target point as x,z
        #[arg(short, long, default_value = "0,0", value_parser = parse_point)]
        target: (Fixed, Fixed),

        /// Distance behind the target the agents start from
        #[arg(long, default_value = "10", value_parser = parse_fixed)]
        start_distance: Fixed,

        /// Initial offset radius
        #[arg(long, default_value = "0", value_parser = parse_fixed)]
        offset: Fixed,

        /// Spacing override
        #[arg(long, value_parser = parse_fixed)]
        spacing: Option<Fixed>,

        /// Obstacle as x,z,radius (repeatable)
        #[arg(long = "obstacle", value_parser = parse_obstacle)]
        obstacles: Vec<Obstacle>,

        /// Cells per side of the map
        #[arg(long, default_value = "64")]
        map_size: u32,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { path } => cmd_validate(&path),
        Commands::Plan {
            config,
            formation,
            agents,
            radius,
            target,
            start_distance,
            offset,
            spacing,
            obstacles,
            map_size,
        } => cmd_plan(
            &config,
            PlanRequest {
                formation,
                agents,
                radius,
                target,
                start_distance,
                offset,
                spacing,
                obstacles,
                map_cells: map_size,
            },
        ),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Validate a data directory; `Ok(false)` when any file has problems.
fn cmd_validate(path: &std::path::Path) -> Result<bool, ToolError> {
    tracing::info!("Validating data files in: {}", path.display());
    let report = validate_data_directory(path)?;
    if report.is_clean() {
        tracing::info!("Validation passed");
    } else {
        tracing::error!(problems = report.problem_count(), "Validation failed");
    }
    Ok(report.is_clean())
}

/// Run a plan and print its report; `Ok(false)` when a group failed.
fn cmd_plan(config: &std::path::Path, request: PlanRequest) -> Result<bool, ToolError> {
    let movement = load_movement_config(config)?;
    let report = run_plan(&movement, &request)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(report.failures.is_empty())
}

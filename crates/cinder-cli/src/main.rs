//! Cinder CLI - headless tooling for particle effect definitions

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{bake, check, render, simulate};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cinder")]
#[command(about = "Simulate, bake, and preview particle effects", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Step one effect and print its particle count and bounds
    Simulate {
        /// Path to effect definition (TOML)
        effect: String,

        /// Number of update calls
        #[arg(long, default_value = "10")]
        steps: u32,

        /// Real-time delta per update, in seconds
        #[arg(long, default_value = "0.1")]
        dt: f32,

        /// Random seed
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Simulate in emitter space regardless of the definition
        #[arg(long)]
        local: bool,

        /// Extra particles queued before the first step
        #[arg(long, default_value = "0")]
        burst: u32,
    },

    /// Print the baked curve channels and gradient of an effect
    Bake {
        /// Path to effect definition (TOML)
        effect: String,

        /// Number of evenly spaced samples to print
        #[arg(long, default_value = "9")]
        samples: usize,
    },

    /// Validate an effect definition and print its content hash
    Check {
        /// Path to effect definition (TOML)
        effect: String,
    },

    /// Simulate an effect and render the last frame to a PNG image (headless)
    Render {
        /// Path to effect definition (TOML)
        effect: String,

        /// Output image path
        #[arg(short, long, default_value = "particles.png")]
        output: String,

        /// Image width in pixels
        #[arg(long, default_value = "800")]
        width: u32,

        /// Image height in pixels
        #[arg(long, default_value = "600")]
        height: u32,

        /// Number of update calls before rendering
        #[arg(long, default_value = "30")]
        steps: u32,

        /// Real-time delta per update, in seconds
        #[arg(long, default_value = "0.05")]
        dt: f32,

        /// Random seed
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Camera orbit distance
        #[arg(long, default_value = "12")]
        distance: f32,

        /// Camera horizontal angle in degrees
        #[arg(long, default_value = "30")]
        yaw: f32,

        /// Camera vertical angle in degrees
        #[arg(long, default_value = "20")]
        pitch: f32,

        /// Camera look-at point (comma-separated x,y,z)
        #[arg(long, value_parser = parse_vec3)]
        target: Option<[f32; 3]>,

        /// Field of view in degrees
        #[arg(long, default_value = "60")]
        fov: f32,
    },
}

fn parse_vec3(s: &str) -> Result<[f32; 3], String> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 3 {
        return Err(format!("expected 3 comma-separated values, got {}", parts.len()));
    }
    let x: f32 = parts[0].trim().parse().map_err(|e| format!("invalid x: {}", e))?;
    let y: f32 = parts[1].trim().parse().map_err(|e| format!("invalid y: {}", e))?;
    let z: f32 = parts[2].trim().parse().map_err(|e| format!("invalid z: {}", e))?;
    Ok([x, y, z])
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Simulate {
            effect,
            steps,
            dt,
            seed,
            local,
            burst,
        } => simulate::run(simulate::SimulateArgs {
            effect,
            steps,
            dt,
            seed,
            local,
            burst,
        }),
        Commands::Bake { effect, samples } => bake::run(&effect, samples),
        Commands::Check { effect } => check::run(&effect),
        Commands::Render {
            effect,
            output,
            width,
            height,
            steps,
            dt,
            seed,
            distance,
            yaw,
            pitch,
            target,
            fov,
        } => render::run(render::RenderArgs {
            effect,
            output,
            width,
            height,
            steps,
            dt,
            seed,
            distance,
            yaw,
            pitch,
            target,
            fov,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_vec3() {
        assert_eq!(parse_vec3("1, 2.5,-3"), Ok([1.0, 2.5, -3.0]));
        assert!(parse_vec3("1,2").is_err());
        assert!(parse_vec3("1,b,3").is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn simulate_defaults() {
        let cli = Cli::parse_from(["cinder", "simulate", "fx.toml"]);
        match cli.command {
            Commands::Simulate {
                steps, dt, local, ..
            } => {
                assert_eq!(steps, 10);
                assert_eq!(dt, 0.1);
                assert!(!local);
            }
            _ => panic!("expected simulate"),
        }
    }
}

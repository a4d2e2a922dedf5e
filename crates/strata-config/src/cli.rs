//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Strata command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug)]
#[command(name = "strata", about = "Strata terrain tile-data pipeline")]
pub struct CliArgs {
    /// Number of frames to simulate.
    #[arg(long)]
    pub frames: Option<u64>,

    /// Maximum number of baking requests in flight.
    #[arg(long)]
    pub max_bakes: Option<usize>,

    /// Maximum number of baking requests started per frame.
    #[arg(long)]
    pub bakes_per_frame: Option<usize>,

    /// Tile tessellation (quads per side).
    #[arg(long)]
    pub tessellation: Option<u32>,

    /// Fractal noise seed.
    #[arg(long)]
    pub seed: Option<u32>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(frames) = args.frames {
            self.demo.frames = frames;
        }
        if let Some(max) = args.max_bakes {
            self.tile_data.max_baking_thread_count = max;
        }
        if let Some(per_frame) = args.bakes_per_frame {
            self.tile_data.max_bake_process_per_frame = per_frame;
        }
        if let Some(tess) = args.tessellation {
            self.tile_data.tile_tessellation = tess;
        }
        if let Some(seed) = args.seed {
            self.fractal.seed = seed;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

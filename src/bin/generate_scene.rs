// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::path::PathBuf;

use clap::Parser;
use env_logger;
use log::{error, info};

use ellipse_bench::error::Result;
use ellipse_bench::records::{create_parent_dir, load_json, write_json, GroundTruthRecord};
use ellipse_bench::scene::{generate_scene, SceneConfig};

/// Generates a synthetic ellipse collage and its ground truth JSON.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about=None)]
struct Args {
    /// Scene configuration JSON.
    config: PathBuf,

    /// Output image. Defaults to <output_path>.png from the configuration.
    #[arg(requires = "output_gt")]
    output_image: Option<PathBuf>,

    /// Output ground truth. Defaults to <output_path>_gt.json from the
    /// configuration.
    output_gt: Option<PathBuf>,

    /// Overrides the configured random seed.
    #[arg(short, long)]
    seed: Option<u64>,
}

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")).init();

    // Usage errors exit with 1 like every other failure; help and version
    // requests exit cleanly.
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            std::process::exit(if e.use_stderr() { 1 } else { 0 });
        },
    };
    if let Err(e) = run(&args) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let mut config: SceneConfig = load_json(&args.config)?;
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    let image_path = args.output_image.clone()
        .unwrap_or_else(|| PathBuf::from(config.image_path()));
    let ground_truth_path = args.output_gt.clone()
        .unwrap_or_else(|| PathBuf::from(config.ground_truth_path()));

    let (collage, truth) = generate_scene(&config)?;
    let save = || -> Result<()> {
        create_parent_dir(&image_path)?;
        collage.save(&image_path)?;
        Ok(())
    };
    save().map_err(|e| e.in_file(&image_path))?;
    write_json(&ground_truth_path,
               &GroundTruthRecord::new(&truth, config.metadata()))?;
    info!("Generated {}x{} collage with seed {}: {:?}, {:?}",
          config.n, config.n, config.seed, image_path, ground_truth_path);
    Ok(())
}

// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::path::{Path, PathBuf};

use clap::Parser;
use env_logger;
use log::{error, info, warn};

use ellipse_bench::error::{BenchError, Result};
use ellipse_bench::evaluator::{match_ellipses, CenterNormalization, MatchParams,
                               MatchStrategy, ScoringMode, DEFAULT_CENTER_SCALE,
                               DEFAULT_THRESHOLD};
use ellipse_bench::records::{load_json, read_list_file, write_json, DetectionRecord,
                             Evaluation, EvaluationReport, GroundTruthRecord, Metrics};

/// Scores detection files against their ground truth files and writes a
/// JSON report. The two list files pair up line by line.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about=None)]
struct Args {
    /// File listing ground truth JSON paths, one per line.
    ground_truth_list: PathBuf,

    /// File listing detection JSON paths, one per line.
    detected_list: PathBuf,

    /// Where the report is written.
    report_json: PathBuf,

    /// Pair scoring. Distance mode normalizes center offsets by the tile
    /// size; overlap mode by the mean axis length of the pair.
    #[arg(short, long, value_enum, default_value_t = ScoringMode::Distance)]
    mode: ScoringMode,

    /// Pairing of ground truth with detections.
    #[arg(short, long, value_enum, default_value_t = MatchStrategy::Greedy)]
    strategy: MatchStrategy,

    /// Score a pair must beat (below it in distance mode, above it in
    /// overlap mode) to match.
    #[arg(short, long, default_value_t = DEFAULT_THRESHOLD)]
    threshold: f64,

    /// Record unreadable file pairs in the report and continue, instead of
    /// failing.
    #[arg(short, long, default_value_t = false)]
    keep_going: bool,
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
    let ground_truth_files = read_list_file(&args.ground_truth_list)?;
    let detected_files = read_list_file(&args.detected_list)?;
    if ground_truth_files.len() != detected_files.len() {
        return Err(BenchError::ListLengthMismatch {
            ground_truth: ground_truth_files.len(),
            detections: detected_files.len(),
        });
    }
    let params = MatchParams {
        mode: args.mode,
        threshold: args.threshold,
        normalization: match args.mode {
            ScoringMode::Distance => CenterNormalization::Fixed(DEFAULT_CENTER_SCALE),
            ScoringMode::Overlap => CenterNormalization::MeanAxis,
        },
        strategy: args.strategy,
    };

    let mut report = EvaluationReport::default();
    let mut skipped = 0;
    for (ground_truth_file, detected_file) in ground_truth_files.iter().zip(&detected_files) {
        let file = ground_truth_file.to_string_lossy().into_owned();
        match evaluate_pair(ground_truth_file, detected_file, &params) {
            Ok(metrics) => {
                info!("{}: precision {:.3} recall {:.3} ({} tp, {} fp, {} fn)",
                      file, metrics.object_precision, metrics.object_recall,
                      metrics.true_positives, metrics.false_positives,
                      metrics.false_negatives);
                report.evaluations.push(Evaluation { file, metrics: Some(metrics), error: None });
            },
            Err(e) if args.keep_going => {
                warn!("Skipping {} due to: {}", file, e);
                skipped += 1;
                report.evaluations.push(
                    Evaluation { file, metrics: None, error: Some(e.to_string()) });
            },
            Err(e) => return Err(e),
        }
    }
    write_json(&args.report_json, &report)?;
    info!("Evaluated {} file pairs ({} skipped); wrote {:?}",
          report.evaluations.len() - skipped, skipped, args.report_json);
    Ok(())
}

fn evaluate_pair(ground_truth_file: &Path, detected_file: &Path, params: &MatchParams)
                 -> Result<Metrics> {
    let ground_truth: GroundTruthRecord = load_json(ground_truth_file)?;
    let detected: DetectionRecord = load_json(detected_file)?;
    let result = match_ellipses(&ground_truth.ellipses(), &detected.ellipses(), params);
    Ok(Metrics::from(&result))
}

// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Scores a detection set against ground truth.
//!
//! Every (ground truth, detection) pair gets a composite score built from
//! three normalized differences: center distance, size and axial
//! orientation. Pairs whose score clears the threshold are admissible
//! matches. Ground truth items are then paired with detections one-to-one,
//! either greedily (the benchmark's reference behavior) or by an optimal
//! assignment, and precision/recall are derived from the match count.

use std::time::Instant;

use log::debug;

use crate::ellipse::{axial_angle_difference, Ellipse};

/// Precision or recall reported when the ratio's denominator is zero.
pub const EMPTY_RATIO: f64 = 0.0;

pub const DEFAULT_THRESHOLD: f64 = 0.6;

/// Normalization of center distance in the shipped configuration: the tile
/// size.
pub const DEFAULT_CENTER_SCALE: f64 = 256.0;

/// The angle term is the axial difference over 180°, so it never exceeds
/// 0.5: perpendicular ellipses cost at most 0.1 in distance mode and lose
/// at most 0.15 in overlap mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ScoringMode {
    /// score = 0.5*dist + 0.3*size + 0.2*angle; lower is better and a pair
    /// matches below the threshold.
    Distance,

    /// score = 0.4*(1-dist) + 0.3*(1-size) + 0.3*(1-angle); higher is
    /// better and a pair matches above the threshold.
    Overlap,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum MatchStrategy {
    /// Each ground truth item in turn takes its best remaining detection.
    /// Fast and order dependent; can under-count matches.
    Greedy,

    /// Maximum number of matches, then best total score.
    Optimal,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CenterNormalization {
    /// Divide center distance by this constant.
    Fixed(f64),

    /// Divide center distance by the mean of the four axis lengths.
    MeanAxis,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchParams {
    pub mode: ScoringMode,
    pub threshold: f64,
    pub normalization: CenterNormalization,
    pub strategy: MatchStrategy,
}

impl Default for MatchParams {
    fn default() -> Self {
        MatchParams {
            mode: ScoringMode::Distance,
            threshold: DEFAULT_THRESHOLD,
            normalization: CenterNormalization::Fixed(DEFAULT_CENTER_SCALE),
            strategy: MatchStrategy::Greedy,
        }
    }
}

/// The normalized components of a pair's score.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Differences {
    /// Center distance over the normalization scale.
    pub center: f64,

    /// (|dw| + |dh|) / (sum of all four axes), in [0, 1).
    pub size: f64,

    /// Axial orientation difference over 180, in [0, 0.5].
    pub angle: f64,
}

/// Compares the canonical forms of `a` and `b`.
pub fn differences(a: &Ellipse, b: &Ellipse, normalization: CenterNormalization)
                   -> Differences {
    let a = a.canonical();
    let b = b.canonical();
    let axis_sum = a.width + a.height + b.width + b.height;
    let scale = match normalization {
        CenterNormalization::Fixed(scale) => scale,
        CenterNormalization::MeanAxis => axis_sum / 4.0,
    };
    let distance = a.center_distance(&b);
    let center = if scale > 0.0 { distance / scale } else { distance };
    let size = if axis_sum > 0.0 {
        ((a.width - b.width).abs() + (a.height - b.height).abs()) / axis_sum
    } else {
        0.0
    };
    let angle = axial_angle_difference(a.angle, b.angle) / 180.0;
    Differences { center, size, angle }
}

/// Composite score of a pair under `params.mode`.
pub fn similarity(ground_truth: &Ellipse, detection: &Ellipse, params: &MatchParams) -> f64 {
    let d = differences(ground_truth, detection, params.normalization);
    match params.mode {
        ScoringMode::Distance => 0.5 * d.center + 0.3 * d.size + 0.2 * d.angle,
        ScoringMode::Overlap =>
            0.4 * (1.0 - d.center) + 0.3 * (1.0 - d.size) + 0.3 * (1.0 - d.angle),
    }
}

/// Whether `score` clears the threshold.
pub fn is_match(score: f64, params: &MatchParams) -> bool {
    match params.mode {
        ScoringMode::Distance => score < params.threshold,
        ScoringMode::Overlap => score > params.threshold,
    }
}

// Score as a cost: lower is always better.
fn penalty(score: f64, mode: ScoringMode) -> f64 {
    match mode {
        ScoringMode::Distance => score,
        ScoringMode::Overlap => -score,
    }
}

/// `numerator / denominator`, or [EMPTY_RATIO] when the denominator is zero.
pub fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        EMPTY_RATIO
    } else {
        numerator as f64 / denominator as f64
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MatchResult {
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub precision: f64,
    pub recall: f64,

    /// Matched (ground truth index, detection index) pairs, ordered by
    /// ground truth index.
    pub pairs: Vec<(usize, usize)>,
}

impl MatchResult {
    fn from_pairs(mut pairs: Vec<(usize, usize)>, num_ground_truth: usize,
                  num_detections: usize) -> Self {
        pairs.sort_unstable();
        let true_positives = pairs.len();
        let false_positives = num_detections - true_positives;
        let false_negatives = num_ground_truth - true_positives;
        MatchResult {
            true_positives,
            false_positives,
            false_negatives,
            precision: ratio(true_positives, true_positives + false_positives),
            recall: ratio(true_positives, true_positives + false_negatives),
            pairs,
        }
    }
}

/// Matches `detections` against `ground_truth` one-to-one.
pub fn match_ellipses(ground_truth: &[Ellipse], detections: &[Ellipse],
                      params: &MatchParams) -> MatchResult {
    let start = Instant::now();
    let pairs = match params.strategy {
        MatchStrategy::Greedy => greedy_pairs(ground_truth, detections, params),
        MatchStrategy::Optimal => optimal_pairs(ground_truth, detections, params),
    };
    let result = MatchResult::from_pairs(pairs, ground_truth.len(), detections.len());
    debug!("{:?} matching of {} ground truth vs {} detections: {} matched in {:?}",
           params.strategy, ground_truth.len(), detections.len(),
           result.true_positives, start.elapsed());
    result
}

// Ground truth in input order; each takes the best-scoring unmatched
// admissible detection, ties going to the earliest.
fn greedy_pairs(ground_truth: &[Ellipse], detections: &[Ellipse],
                params: &MatchParams) -> Vec<(usize, usize)> {
    let mut matched = vec![false; detections.len()];
    let mut pairs = Vec::new();
    for (gi, g) in ground_truth.iter().enumerate() {
        let mut best: Option<(usize, f64)> = None;
        for (di, d) in detections.iter().enumerate() {
            if matched[di] {
                continue;
            }
            let score = similarity(g, d, params);
            if !is_match(score, params) {
                continue;
            }
            let cost = penalty(score, params.mode);
            if best.map_or(true, |(_, best_cost)| cost < best_cost) {
                best = Some((di, cost));
            }
        }
        if let Some((di, _)) = best {
            matched[di] = true;
            pairs.push((gi, di));
        }
    }
    pairs
}

// Minimum-cost assignment where each admissible pair costs its penalty
// minus a bonus large enough that one more match always outweighs any
// difference in total penalty. Inadmissible pairs cost 0 and are dropped
// from the assignment afterwards.
fn optimal_pairs(ground_truth: &[Ellipse], detections: &[Ellipse],
                 params: &MatchParams) -> Vec<(usize, usize)> {
    if ground_truth.is_empty() || detections.is_empty() {
        return Vec::new();
    }
    let mut penalties: Vec<Vec<Option<f64>>> = Vec::with_capacity(ground_truth.len());
    let mut lowest = f64::INFINITY;
    let mut highest = f64::NEG_INFINITY;
    for g in ground_truth {
        let row: Vec<Option<f64>> = detections.iter().map(|d| {
            let score = similarity(g, d, params);
            is_match(score, params).then(|| penalty(score, params.mode))
        }).collect();
        for p in row.iter().flatten() {
            lowest = lowest.min(*p);
            highest = highest.max(*p);
        }
        penalties.push(row);
    }
    if !lowest.is_finite() {
        return Vec::new();
    }
    let max_matches = ground_truth.len().min(detections.len()) as f64;
    let bonus = highest.abs() + (max_matches + 1.0) * (highest - lowest) + 1.0;

    // The solver wants no more rows than columns.
    let transposed = ground_truth.len() > detections.len();
    let (rows, cols) = if transposed {
        (detections.len(), ground_truth.len())
    } else {
        (ground_truth.len(), detections.len())
    };
    let cost: Vec<Vec<f64>> = (0..rows).map(|r| {
        (0..cols).map(|c| {
            let (gi, di) = if transposed { (c, r) } else { (r, c) };
            penalties[gi][di].map_or(0.0, |p| p - bonus)
        }).collect()
    }).collect();

    hungarian(&cost).into_iter()
        .enumerate()
        .map(|(r, c)| if transposed { (c, r) } else { (r, c) })
        .filter(|&(gi, di)| penalties[gi][di].is_some())
        .collect()
}

// Kuhn-Munkres with potentials, O(rows² * cols). Requires
// 0 < rows <= cols; returns the column assigned to each row.
fn hungarian(cost: &[Vec<f64>]) -> Vec<usize> {
    let rows = cost.len();
    let cols = cost.first().map_or(0, |row| row.len());
    // 1-based; index 0 is the virtual column used to seed each augmentation.
    let mut u = vec![0.0f64; rows + 1];
    let mut v = vec![0.0f64; cols + 1];
    let mut owner = vec![0usize; cols + 1];  // Row assigned to each column.
    let mut way = vec![0usize; cols + 1];

    for row in 1..=rows {
        owner[0] = row;
        let mut col0 = 0;
        let mut min_slack = vec![f64::INFINITY; cols + 1];
        let mut used = vec![false; cols + 1];
        loop {
            used[col0] = true;
            let row0 = owner[col0];
            let mut delta = f64::INFINITY;
            let mut col1 = 0;
            for col in 1..=cols {
                if used[col] {
                    continue;
                }
                let slack = cost[row0 - 1][col - 1] - u[row0] - v[col];
                if slack < min_slack[col] {
                    min_slack[col] = slack;
                    way[col] = col0;
                }
                if min_slack[col] < delta {
                    delta = min_slack[col];
                    col1 = col;
                }
            }
            for col in 0..=cols {
                if used[col] {
                    u[owner[col]] += delta;
                    v[col] -= delta;
                } else {
                    min_slack[col] -= delta;
                }
            }
            col0 = col1;
            if owner[col0] == 0 {
                break;
            }
        }
        // Flip the augmenting path.
        loop {
            let col1 = way[col0];
            owner[col0] = owner[col1];
            col0 = col1;
            if col0 == 0 {
                break;
            }
        }
    }

    let mut assignment = vec![0usize; rows];
    for col in 1..=cols {
        if owner[col] != 0 {
            assignment[owner[col] - 1] = col - 1;
        }
    }
    assignment
}

// mod tests.

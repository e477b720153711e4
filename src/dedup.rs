// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ellipse::DetectedEllipse;

/// Which of two conflicting detections survives duplicate suppression.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupPolicy {
    /// Candidates are considered in the order they were produced; the first
    /// one accepted suppresses later conflicting ones.
    FirstWins,

    /// Candidates are considered strongest first (ties keep production
    /// order), so the strongest member of a conflicting group survives.
    StrongestWins,
}

/// Something with a position that can collide with its neighbors.
pub trait Spot {
    fn position(&self) -> (f64, f64);
    fn strength(&self) -> f64;
}

impl Spot for DetectedEllipse {
    fn position(&self) -> (f64, f64) {
        (self.ellipse.center_x, self.ellipse.center_y)
    }
    fn strength(&self) -> f64 {
        self.strength
    }
}

/// Greedy duplicate suppression. Items are visited in the order given by
/// `policy`; an item is kept unless `conflicts(item, kept)` holds for some
/// already-kept item. Kept items are returned in their original relative
/// order.
///
/// `reach` must bound the conflict range: `conflicts(a, b)` may only be true
/// when |dx| < reach and |dy| < reach. Kept items are bucketed into a
/// spatial hash with cell size `reach`, so each item is compared only
/// against the occupants of the 3x3 block of cells around it.
///
/// Afterwards no two kept items conflict.
pub fn suppress_duplicates<T, F>(items: Vec<T>, policy: DedupPolicy, reach: f64,
                                 conflicts: F) -> Vec<T>
where T: Spot,
      F: Fn(&T, &T) -> bool,
{
    if items.len() < 2 {
        return items;
    }
    let mut order: Vec<usize> = (0..items.len()).collect();
    if policy == DedupPolicy::StrongestWins {
        // Stable sort: equal strengths keep production order.
        order.sort_by(|&a, &b| {
            items[b].strength().partial_cmp(&items[a].strength())
                .unwrap_or(Ordering::Equal)
        });
    }

    let cell_size = if reach.is_finite() && reach > 0.0 { reach } else { 1.0 };
    let cell_of = |(x, y): (f64, f64)| {
        ((x / cell_size).floor() as i64, (y / cell_size).floor() as i64)
    };
    let mut grid: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
    let mut keep = vec![false; items.len()];

    for &index in &order {
        let item = &items[index];
        let (cx, cy) = cell_of(item.position());
        let mut duplicate = false;
        'cells: for gy in cy - 1..=cy + 1 {
            for gx in cx - 1..=cx + 1 {
                let Some(occupants) = grid.get(&(gx, gy)) else {
                    continue;
                };
                if occupants.iter().any(|&kept| conflicts(item, &items[kept])) {
                    duplicate = true;
                    break 'cells;
                }
            }
        }
        if !duplicate {
            keep[index] = true;
            grid.entry((cx, cy)).or_default().push(index);
        }
    }

    items.into_iter()
        .enumerate()
        .filter_map(|(index, item)| keep[index].then_some(item))
        .collect()
}

/// The contour detector's duplicate rule: centers within `distance` on both
/// axes (a square test, not a circle).
pub fn within_square(a: &impl Spot, b: &impl Spot, distance: f64) -> bool {
    let (ax, ay) = a.position();
    let (bx, by) = b.position();
    (ax - bx).abs() < distance && (ay - by).abs() < distance
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use super::*;
    use crate::ellipse::Ellipse;

    #[derive(Debug, PartialEq)]
    struct Point {
        x: f64,
        y: f64,
        s: f64,
    }

    impl Spot for Point {
        fn position(&self) -> (f64, f64) { (self.x, self.y) }
        fn strength(&self) -> f64 { self.s }
    }

    fn p(x: f64, y: f64, s: f64) -> Point {
        Point { x, y, s }
    }

    fn close(a: &Point, b: &Point) -> bool {
        within_square(a, b, 20.0)
    }

    #[test]
    fn test_first_wins() {
        let points = vec![p(0.0, 0.0, 1.0), p(10.0, 10.0, 9.0), p(50.0, 0.0, 1.0)];
        let kept = suppress_duplicates(points, DedupPolicy::FirstWins, 20.0, close);
        assert_eq!(kept, vec![p(0.0, 0.0, 1.0), p(50.0, 0.0, 1.0)]);
    }

    #[test]
    fn test_strongest_wins() {
        let points = vec![p(0.0, 0.0, 1.0), p(10.0, 10.0, 9.0), p(50.0, 0.0, 1.0)];
        let kept = suppress_duplicates(points, DedupPolicy::StrongestWins, 20.0, close);
        // Original relative order is preserved.
        assert_eq!(kept, vec![p(10.0, 10.0, 9.0), p(50.0, 0.0, 1.0)]);
    }

    #[test]
    fn test_square_rule_is_not_circular() {
        // Distance ~27 but within 20 on both axes: duplicates.
        assert!(within_square(&p(0.0, 0.0, 0.0), &p(19.0, 19.0, 0.0), 20.0));
        // Distance 20 along one axis: not duplicates.
        assert!(!within_square(&p(0.0, 0.0, 0.0), &p(20.0, 0.0, 0.0), 20.0));
    }

    #[test]
    fn test_neighbor_cells_are_searched() {
        // Straddles a cell boundary at x = 20.
        let points = vec![p(19.5, 5.0, 1.0), p(20.5, 5.0, 2.0), p(-0.4, 1.0, 3.0)];
        let kept = suppress_duplicates(points, DedupPolicy::FirstWins, 20.0, close);
        assert_eq!(kept, vec![p(19.5, 5.0, 1.0)]);
    }

    #[test]
    fn test_chain_keeps_non_conflicting_ends() {
        // a-b conflict, b-c conflict, a-c do not. With b strongest, only b
        // survives; first-wins keeps a and c.
        let points = || vec![p(0.0, 0.0, 1.0), p(15.0, 0.0, 5.0), p(30.0, 0.0, 1.0)];
        let first = suppress_duplicates(points(), DedupPolicy::FirstWins, 20.0, close);
        assert_eq!(first, vec![p(0.0, 0.0, 1.0), p(30.0, 0.0, 1.0)]);
        let strongest = suppress_duplicates(points(), DedupPolicy::StrongestWins, 20.0, close);
        assert_eq!(strongest, vec![p(15.0, 0.0, 5.0)]);
    }

    #[test]
    fn test_no_kept_pair_conflicts() {
        // Pseudo-random cloud.
        let mut points = Vec::new();
        let mut rng = StdRng::seed_from_u64(12345);
        for _ in 0..300 {
            let x: f64 = rng.gen_range(0.0..500.0);
            let y: f64 = rng.gen_range(0.0..500.0);
            points.push(p(x, y, rng.gen_range(0.0..13.0)));
        }
        for policy in [DedupPolicy::FirstWins, DedupPolicy::StrongestWins] {
            let kept = suppress_duplicates(
                points.iter().map(|q| p(q.x, q.y, q.s)).collect(), policy, 20.0, close);
            for (i, a) in kept.iter().enumerate() {
                for b in &kept[i + 1..] {
                    assert!(!close(a, b), "{:?} conflicts with {:?}", a, b);
                }
            }
        }
    }

    #[test]
    fn test_detected_ellipse_spot() {
        let d = DetectedEllipse::new(Ellipse::circle(3.0, 4.0, 10.0), 7.5);
        assert_eq!(d.position(), (3.0, 4.0));
        assert_eq!(Spot::strength(&d), 7.5);
    }
}  // mod tests.

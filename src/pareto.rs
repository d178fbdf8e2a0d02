//! # Pareto Utilities
//!
//! Dominance sorting and crowding distance for the threshold search, the
//! [`ParetoFront`] it returns, and [`find_elbow`], an optional aid for
//! picking one threshold off the front.
//!
//! All objectives are minimized.

use crate::{FitnessVector, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One evaluated threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParetoPoint {
    pub threshold: f64,
    pub fitness: FitnessVector,
}

impl ParetoPoint {
    pub fn new(threshold: f64, fitness: FitnessVector) -> Self {
        Self { threshold, fitness }
    }
}

/// Result of a non-dominated sort.
#[derive(Debug, Clone, PartialEq)]
pub struct NondominatedSort {
    /// Front index of each solution (0 = non-dominated)
    pub ranks: Vec<usize>,
    /// Solution indices per front, best front first
    pub fronts: Vec<Vec<usize>>,
}

/// Fast non-dominated sort (Deb et al., 2002), O(m·n²).
pub fn non_dominated_sort(objectives: &[FitnessVector]) -> NondominatedSort {
    let n = objectives.len();
    if n == 0 {
        return NondominatedSort {
            ranks: Vec::new(),
            fronts: Vec::new(),
        };
    }

    let mut domination_count = vec![0usize; n];
    let mut dominates: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut ranks = vec![0usize; n];

    for i in 0..n {
        for j in (i + 1)..n {
            if objectives[i].dominates(&objectives[j]) {
                dominates[i].push(j);
                domination_count[j] += 1;
            } else if objectives[j].dominates(&objectives[i]) {
                dominates[j].push(i);
                domination_count[i] += 1;
            }
        }
    }

    let mut fronts = vec![(0..n).filter(|&i| domination_count[i] == 0).collect::<Vec<_>>()];
    loop {
        let mut next_front = Vec::new();
        if let Some(current) = fronts.last() {
            for &i in current {
                for &j in &dominates[i] {
                    domination_count[j] -= 1;
                    if domination_count[j] == 0 {
                        ranks[j] = fronts.len();
                        next_front.push(j);
                    }
                }
            }
        }
        if next_front.is_empty() {
            break;
        }
        fronts.push(next_front);
    }

    NondominatedSort { ranks, fronts }
}

/// Crowding distance of each solution in `members` (indices into
/// `objectives`), returned in the order of `members`.
///
/// Boundary solutions of any objective get `f64::INFINITY`. Objectives with
/// zero range add nothing.
pub fn crowding_distance(objectives: &[FitnessVector], members: &[usize]) -> Vec<f64> {
    let n = members.len();
    if n <= 2 {
        return vec![f64::INFINITY; n];
    }

    let mut distances = vec![0.0f64; n];
    for obj in 0..2 {
        let value = |k: usize| objectives[members[k]].objectives()[obj];

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| value(a).total_cmp(&value(b)));

        distances[order[0]] = f64::INFINITY;
        distances[order[n - 1]] = f64::INFINITY;

        let range = value(order[n - 1]) - value(order[0]);
        if range > 0.0 {
            for k in 1..(n - 1) {
                distances[order[k]] += (value(order[k + 1]) - value(order[k - 1])) / range;
            }
        }
    }
    distances
}

/// Order by `unknown_area`, then `companion_area`, then threshold.
fn front_order(a: &ParetoPoint, b: &ParetoPoint) -> Ordering {
    a.fitness
        .unknown_area
        .total_cmp(&b.fitness.unknown_area)
        .then(a.fitness.companion_area.total_cmp(&b.fitness.companion_area))
        .then(a.threshold.total_cmp(&b.threshold))
}

// ============================================================================
// Pareto Front
// ============================================================================

/// Non-dominated thresholds of a search, plus every evaluation it made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParetoFront {
    points: Vec<ParetoPoint>,
    history: Vec<ParetoPoint>,
}

impl ParetoFront {
    /// Extract the front from a list of evaluations.
    ///
    /// Points sharing an objective vector collapse to the one with the
    /// smallest threshold. The front is sorted by `unknown_area` ascending,
    /// ties broken by `companion_area`.
    pub fn from_evaluations(history: Vec<ParetoPoint>) -> Self {
        let mut points: Vec<ParetoPoint> = history
            .iter()
            .filter(|p| !history.iter().any(|q| q.fitness.dominates(&p.fitness)))
            .copied()
            .collect();

        points.sort_by(front_order);
        points.dedup_by(|later, earlier| later.fitness == earlier.fitness);

        Self { points, history }
    }

    /// Front points in order.
    pub fn points(&self) -> &[ParetoPoint] {
        &self.points
    }

    /// Every evaluated `(threshold, fitness)` pair, in evaluation order.
    pub fn history(&self) -> &[ParetoPoint] {
        &self.history
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn thresholds(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.threshold).collect()
    }

    /// Front points as a JSON array of `{threshold, fitness}` records.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.points)?)
    }
}

// ============================================================================
// Elbow
// ============================================================================

/// Front point where the trade-off rate changes most sharply.
///
/// Both objectives are rescaled to `[0, 1]` over the front, then the slope
/// between consecutive points (ordered by `unknown_area`) is compared on
/// either side of every interior point. The point with the largest absolute
/// change wins; ties go to the smaller `unknown_area`.
///
/// Returns `None` for fronts with fewer than three points.
pub fn find_elbow(front: &ParetoFront) -> Option<ParetoPoint> {
    let points = front.points();
    if points.len() < 3 {
        return None;
    }

    let scale = |values: Vec<f64>| -> Vec<f64> {
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let range = max - min;
        values
            .into_iter()
            .map(|v| if range > 0.0 { (v - min) / range } else { 0.0 })
            .collect()
    };
    let x = scale(points.iter().map(|p| p.fitness.unknown_area).collect());
    let y = scale(points.iter().map(|p| p.fitness.companion_area).collect());

    let slopes: Vec<f64> = (0..points.len() - 1)
        .map(|k| {
            let dx = x[k + 1] - x[k];
            if dx > 0.0 {
                (y[k + 1] - y[k]) / dx
            } else {
                0.0
            }
        })
        .collect();

    let mut best: Option<(usize, f64)> = None;
    for k in 1..slopes.len() {
        let change = (slopes[k] - slopes[k - 1]).abs();
        if best.map_or(true, |(_, c)| change > c) {
            best = Some((k, change));
        }
    }
    best.map(|(k, _)| points[k])
}

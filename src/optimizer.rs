//! # Threshold Optimizer
//!
//! NSGA-II search over the single clustering threshold. Each candidate is
//! scored by a caller-supplied fitness function; candidates of one
//! generation are scored in parallel and gathered by index, so a seeded run
//! is reproducible regardless of scheduling.
//!
//! The search is a small state machine ([`ThresholdSearch`]) driven by
//! [`optimize`]:
//!
//! ```text
//! Initialized → Evaluating → Selecting → Varying → Evaluating → … → Converged
//! ```
//!
//! A fitness function that fails is logged and scored as all-zero, so one
//! degenerate candidate never stops the search.

use crate::pareto::{crowding_distance, non_dominated_sort, ParetoFront, ParetoPoint};
use crate::{ClusterError, FitnessVector, Result};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::time::Instant;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Upper bound on the evaluation history reserved up front.
const MAX_HISTORY_PREALLOCATION: usize = 1 << 16;

/// Configuration for the threshold search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Smallest threshold considered, in meters. Default: 1000.0
    pub lower_bound: f64,

    /// Largest threshold considered, in meters. Default: 15000.0
    pub upper_bound: f64,

    /// Candidates per generation, at least 2. Default: 20
    pub population_size: usize,

    /// Rounds of variation and selection after the initial population. Default: 10
    pub generations: usize,

    /// Mutation standard deviation as a fraction of the search range. Default: 0.1
    pub mutation_scale: f64,

    /// RNG seed. `None` seeds from the OS. Default: None
    pub seed: Option<u64>,

    /// Worker threads for fitness evaluation (0 = all cores). Default: 0
    pub workers: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            lower_bound: 1_000.0,
            upper_bound: 15_000.0,
            population_size: 20,
            generations: 10,
            mutation_scale: 0.1,
            seed: None,
            workers: 0,
        }
    }
}

impl OptimizerConfig {
    /// Check the search configuration before any evaluation.
    pub fn validate(&self) -> Result<()> {
        if !self.lower_bound.is_finite() || !self.upper_bound.is_finite() {
            return Err(ClusterError::config(format!(
                "search bounds must be finite, got [{}, {}]",
                self.lower_bound, self.upper_bound
            )));
        }
        if self.lower_bound >= self.upper_bound {
            return Err(ClusterError::config(format!(
                "lower bound {} must be below upper bound {}",
                self.lower_bound, self.upper_bound
            )));
        }
        if self.population_size < 2 {
            return Err(ClusterError::config(format!(
                "population size must be at least 2, got {}",
                self.population_size
            )));
        }
        if !self.mutation_scale.is_finite() || self.mutation_scale < 0.0 {
            return Err(ClusterError::config(format!(
                "mutation scale must be a non-negative number, got {}",
                self.mutation_scale
            )));
        }
        Ok(())
    }

    /// Total fitness evaluations a full run performs, saturating at `usize::MAX`.
    pub fn evaluation_budget(&self) -> usize {
        self.population_size
            .saturating_mul(self.generations.saturating_add(1))
    }
}

/// Phase most recently completed by a [`ThresholdSearch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptimizerState {
    /// Initial population sampled, nothing scored yet
    Initialized,
    /// Pending candidates scored
    Evaluating,
    /// Survivors chosen by rank and crowding distance
    Selecting,
    /// Offspring produced by tournament and mutation
    Varying,
    /// All generations done; the front is final
    Converged,
}

// ============================================================================
// Evaluation
// ============================================================================

struct Evaluator<'a, F> {
    fitness_fn: &'a F,
    #[cfg(feature = "parallel")]
    pool: rayon::ThreadPool,
}

impl<'a, F> Evaluator<'a, F>
where
    F: Fn(f64) -> Result<FitnessVector> + Sync,
{
    fn new(fitness_fn: &'a F, _workers: usize) -> Result<Self> {
        Ok(Self {
            fitness_fn,
            #[cfg(feature = "parallel")]
            pool: crate::thread_pool(_workers)?,
        })
    }

    fn score(&self, threshold: f64) -> FitnessVector {
        match (self.fitness_fn)(threshold) {
            Ok(fitness) if fitness.objectives().iter().all(|v| v.is_finite()) => fitness,
            Ok(fitness) => {
                warn!(
                    "[Optimizer] Non-finite fitness {:?} at threshold {:.1}, scoring as zero",
                    fitness, threshold
                );
                FitnessVector::ZERO
            }
            Err(e) => {
                warn!(
                    "[Optimizer] Fitness failed at threshold {:.1}: {}, scoring as zero",
                    threshold, e
                );
                FitnessVector::ZERO
            }
        }
    }

    /// Score candidates; output order matches input order.
    fn evaluate(&self, candidates: &[f64]) -> Vec<FitnessVector> {
        #[cfg(feature = "parallel")]
        {
            self.pool
                .install(|| candidates.par_iter().map(|&t| self.score(t)).collect())
        }

        #[cfg(not(feature = "parallel"))]
        {
            candidates.iter().map(|&t| self.score(t)).collect()
        }
    }
}

// ============================================================================
// Selection
// ============================================================================

/// Pick `n` survivors: whole fronts while they fit, then the most isolated
/// members of the front that overflows.
fn environmental_selection(fitness: &[FitnessVector], n: usize) -> Vec<usize> {
    let sorted = non_dominated_sort(fitness);
    let mut chosen = Vec::with_capacity(n);

    for front in &sorted.fronts {
        if chosen.len() + front.len() <= n {
            chosen.extend_from_slice(front);
            continue;
        }
        let crowding = crowding_distance(fitness, front);
        let mut order: Vec<usize> = (0..front.len()).collect();
        order.sort_by(|&a, &b| crowding[b].total_cmp(&crowding[a]).then(front[a].cmp(&front[b])));
        let remaining = n - chosen.len();
        chosen.extend(order.into_iter().take(remaining).map(|k| front[k]));
        break;
    }
    chosen
}

/// Pareto rank and crowding distance of every member.
fn rank_and_crowding(fitness: &[FitnessVector]) -> (Vec<usize>, Vec<f64>) {
    let sorted = non_dominated_sort(fitness);
    let mut crowding = vec![0.0; fitness.len()];
    for front in &sorted.fronts {
        for (&member, d) in front.iter().zip(crowding_distance(fitness, front)) {
            crowding[member] = d;
        }
    }
    (sorted.ranks, crowding)
}

// ============================================================================
// Search
// ============================================================================

/// Step-wise NSGA-II run over the threshold.
///
/// Use [`optimize`] unless the individual phases need to be observed.
pub struct ThresholdSearch<'a, F> {
    config: OptimizerConfig,
    evaluator: Evaluator<'a, F>,
    rng: StdRng,
    mutation: Normal<f64>,
    state: OptimizerState,
    generation: usize,

    population: Vec<f64>,
    fitness: Vec<FitnessVector>,
    ranks: Vec<usize>,
    crowding: Vec<f64>,

    pending: Vec<f64>,
    pending_fitness: Vec<FitnessVector>,

    history: Vec<ParetoPoint>,
    started: Instant,
}

impl<'a, F> ThresholdSearch<'a, F>
where
    F: Fn(f64) -> Result<FitnessVector> + Sync,
{
    /// Validate the configuration and sample the initial population.
    pub fn new(fitness_fn: &'a F, config: &OptimizerConfig) -> Result<Self> {
        config.validate()?;

        let range = config.upper_bound - config.lower_bound;
        let mutation = Normal::new(0.0, config.mutation_scale * range)
            .map_err(|e| ClusterError::config(format!("invalid mutation distribution: {}", e)))?;

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let pending: Vec<f64> = (0..config.population_size)
            .map(|_| rng.gen_range(config.lower_bound..=config.upper_bound))
            .collect();

        info!(
            "[Optimizer] Starting search: population {}, generations {}, bounds [{:.1}, {:.1}]",
            config.population_size, config.generations, config.lower_bound, config.upper_bound
        );

        Ok(Self {
            config: config.clone(),
            evaluator: Evaluator::new(fitness_fn, config.workers)?,
            rng,
            mutation,
            state: OptimizerState::Initialized,
            generation: 0,
            population: Vec::new(),
            fitness: Vec::new(),
            ranks: Vec::new(),
            crowding: Vec::new(),
            pending,
            pending_fitness: Vec::new(),
            history: Vec::with_capacity(config.evaluation_budget().min(MAX_HISTORY_PREALLOCATION)),
            started: Instant::now(),
        })
    }

    pub fn state(&self) -> OptimizerState {
        self.state
    }

    /// Completed variation rounds.
    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Current survivors.
    pub fn population(&self) -> &[f64] {
        &self.population
    }

    /// Every evaluation so far, in evaluation order.
    pub fn history(&self) -> &[ParetoPoint] {
        &self.history
    }

    /// Run the next phase and return the new state. A no-op once converged.
    pub fn step(&mut self) -> OptimizerState {
        self.state = match self.state {
            OptimizerState::Initialized | OptimizerState::Varying => {
                self.evaluate_pending();
                OptimizerState::Evaluating
            }
            OptimizerState::Evaluating => {
                self.select();
                if self.generation >= self.config.generations {
                    info!(
                        "[Optimizer] Converged after {} generations: {} evaluations in {}ms",
                        self.generation,
                        self.history.len(),
                        self.started.elapsed().as_millis()
                    );
                    OptimizerState::Converged
                } else {
                    OptimizerState::Selecting
                }
            }
            OptimizerState::Selecting => {
                self.vary();
                self.generation += 1;
                OptimizerState::Varying
            }
            OptimizerState::Converged => OptimizerState::Converged,
        };
        self.state
    }

    /// Non-dominated set over every evaluation made.
    pub fn finish(self) -> ParetoFront {
        ParetoFront::from_evaluations(self.history)
    }

    fn evaluate_pending(&mut self) {
        self.pending_fitness = self.evaluator.evaluate(&self.pending);
        self.history.extend(
            self.pending
                .iter()
                .zip(&self.pending_fitness)
                .map(|(&t, &f)| ParetoPoint::new(t, f)),
        );
    }

    fn select(&mut self) {
        let mut candidates = std::mem::take(&mut self.population);
        candidates.append(&mut self.pending);
        let mut fitness = std::mem::take(&mut self.fitness);
        fitness.append(&mut self.pending_fitness);

        let survivors = environmental_selection(&fitness, self.config.population_size);
        self.population = survivors.iter().map(|&i| candidates[i]).collect();
        self.fitness = survivors.iter().map(|&i| fitness[i]).collect();
        (self.ranks, self.crowding) = rank_and_crowding(&self.fitness);

        debug!(
            "[Optimizer] Generation {}: {} survivors, {} on the first front",
            self.generation,
            self.population.len(),
            self.ranks.iter().filter(|&&r| r == 0).count()
        );
    }

    fn vary(&mut self) {
        let n = self.config.population_size;
        let mut offspring = Vec::with_capacity(n);
        for _ in 0..n {
            let winner = self.tournament();
            let parent = self.population[winner];
            let child = parent + self.mutation.sample(&mut self.rng);
            offspring.push(child.clamp(self.config.lower_bound, self.config.upper_bound));
        }
        self.pending = offspring;
    }

    /// Binary tournament: lower rank wins, then larger crowding distance.
    fn tournament(&mut self) -> usize {
        let n = self.population.len();
        let a = self.rng.gen_range(0..n);
        let b = self.rng.gen_range(0..n);
        if self.ranks[b] < self.ranks[a]
            || (self.ranks[b] == self.ranks[a] && self.crowding[b] > self.crowding[a])
        {
            b
        } else {
            a
        }
    }
}

/// Search the threshold range for the Pareto trade-off of `fitness_fn`.
///
/// Performs exactly `population_size × (generations + 1)` evaluations and
/// returns the non-dominated set over all of them.
///
/// # Example
/// ```
/// use mining_clusters::{optimize, FitnessVector, OptimizerConfig};
///
/// let config = OptimizerConfig { population_size: 8, generations: 2, seed: Some(7), ..Default::default() };
///
/// // Larger thresholds trade unknown area for companion area.
/// let front = optimize(|t| Ok(FitnessVector::new(15_000.0 - t, t - 1_000.0)), &config).unwrap();
/// assert_eq!(front.history().len(), 24);
/// assert!(!front.is_empty());
/// ```
pub fn optimize<F>(fitness_fn: F, config: &OptimizerConfig) -> Result<ParetoFront>
where
    F: Fn(f64) -> Result<FitnessVector> + Sync,
{
    let mut search = ThresholdSearch::new(&fitness_fn, config)?;
    while search.step() != OptimizerState::Converged {}
    Ok(search.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn trade_off(t: f64) -> Result<FitnessVector> {
        Ok(FitnessVector::new((10_000.0 - t).max(0.0), (t - 4_000.0).max(0.0)))
    }

    fn seeded(population_size: usize, generations: usize) -> OptimizerConfig {
        OptimizerConfig {
            population_size,
            generations,
            seed: Some(42),
            workers: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_rejects_bad_config() {
        let bad = [
            OptimizerConfig { lower_bound: 5_000.0, upper_bound: 5_000.0, ..Default::default() },
            OptimizerConfig { lower_bound: 9_000.0, upper_bound: 1_000.0, ..Default::default() },
            OptimizerConfig { upper_bound: f64::INFINITY, ..Default::default() },
            OptimizerConfig { population_size: 1, ..Default::default() },
            OptimizerConfig { mutation_scale: -0.5, ..Default::default() },
        ];
        for config in &bad {
            let calls = AtomicUsize::new(0);
            let result = optimize(
                |t| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    trade_off(t)
                },
                config,
            );
            assert!(matches!(result, Err(ClusterError::Configuration(_))), "{:?}", config);
            assert_eq!(calls.load(Ordering::SeqCst), 0);
        }
    }

    #[test]
    fn test_evaluation_budget_respected() {
        let calls = AtomicUsize::new(0);
        let config = seeded(8, 3);
        let front = optimize(
            |t| {
                calls.fetch_add(1, Ordering::SeqCst);
                trade_off(t)
            },
            &config,
        )
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 32);
        assert_eq!(front.history().len(), config.evaluation_budget());
    }

    #[test]
    fn test_front_is_non_dominated_and_in_bounds() {
        let config = seeded(10, 4);
        let front = optimize(trade_off, &config).unwrap();
        assert!(!front.is_empty());
        for p in front.points() {
            assert!(p.threshold >= config.lower_bound && p.threshold <= config.upper_bound);
            for q in front.points() {
                assert!(!q.fitness.dominates(&p.fitness));
            }
        }
        for pair in front.points().windows(2) {
            assert!(pair[0].fitness.unknown_area <= pair[1].fitness.unknown_area);
            assert!(pair[0].fitness.companion_area >= pair[1].fitness.companion_area);
        }
    }

    #[test]
    fn test_seeded_runs_reproducible() {
        let config = seeded(6, 3);
        let a = optimize(trade_off, &config).unwrap();
        let b = optimize(trade_off, &config).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_failed_fitness_scores_zero() {
        let config = seeded(4, 1);
        let front = optimize(|_| Err(ClusterError::integrity("empty group")), &config).unwrap();
        assert_eq!(front.history().len(), 8);
        assert_eq!(front.len(), 1);
        assert_eq!(front.points()[0].fitness, FitnessVector::ZERO);
    }

    #[test]
    fn test_state_sequence() {
        let fitness = trade_off;
        let mut search = ThresholdSearch::new(&fitness, &seeded(4, 1)).unwrap();
        assert_eq!(search.state(), OptimizerState::Initialized);

        let mut states = Vec::new();
        loop {
            let state = search.step();
            states.push(state);
            if state == OptimizerState::Converged {
                break;
            }
        }
        assert_eq!(
            states,
            vec![
                OptimizerState::Evaluating,
                OptimizerState::Selecting,
                OptimizerState::Varying,
                OptimizerState::Evaluating,
                OptimizerState::Converged,
            ]
        );
        assert_eq!(search.generation(), 1);
        assert_eq!(search.population().len(), 4);
        assert_eq!(search.step(), OptimizerState::Converged);
        assert_eq!(search.history().len(), 8);
    }

    #[test]
    fn test_huge_budget_saturates() {
        let config = OptimizerConfig {
            population_size: 4,
            generations: usize::MAX,
            seed: Some(3),
            ..Default::default()
        };
        assert_eq!(config.evaluation_budget(), usize::MAX);

        let fitness = trade_off;
        let mut search = ThresholdSearch::new(&fitness, &config).unwrap();
        for _ in 0..4 {
            search.step();
        }
        assert_eq!(search.state(), OptimizerState::Evaluating);
        assert_eq!(search.history().len(), 8);
    }

    #[test]
    fn test_tournament_parents_come_from_population() {
        let fitness = trade_off;
        let config = seeded(6, 1);
        let mut search = ThresholdSearch::new(&fitness, &config).unwrap();
        search.step();
        search.step();
        let survivors = search.population().to_vec();
        for _ in 0..20 {
            let winner = search.tournament();
            assert!(survivors.contains(&search.population()[winner]));
        }
    }

    #[test]
    fn test_zero_generations() {
        let front = optimize(trade_off, &seeded(5, 0)).unwrap();
        assert_eq!(front.history().len(), 5);
    }

    #[test]
    fn test_environmental_selection_prefers_first_front() {
        let fitness = vec![
            FitnessVector::new(5.0, 5.0),
            FitnessVector::new(0.0, 9.0),
            FitnessVector::new(4.0, 4.0),
            FitnessVector::new(9.0, 0.0),
        ];
        let mut chosen = environmental_selection(&fitness, 3);
        chosen.sort_unstable();
        assert_eq!(chosen, vec![1, 2, 3]);

        // Overflowing front keeps its boundary points.
        let chosen = environmental_selection(&fitness, 2);
        assert!(chosen.contains(&1) && chosen.contains(&3));
    }
}

// Evolutionary search over work-item permutations: uniform PMX crossover,
// shuffle-indexes mutation, tournament selection, generational replacement.

use std::time::Instant;

use itertools::Itertools;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::analyze::{self, GenerationStat, RunStats, SolveResult};
use crate::assign::Assigner;
use crate::fitness::{evaluate, Fitness, ObjectiveWeights};
use crate::prepare::WorkItem;

/// Run-level knobs. The defaults mirror the production configuration.
#[derive(Clone, Debug)]
pub struct EngineParams {
    pub machines: usize,
    pub population_size: usize,
    pub generations: usize,
    /// Crossover probability per consecutive parent pair.
    pub cxpb: f64,
    /// Mutation probability per offspring.
    pub mutpb: f64,
    /// Per-position swap probability inside crossover.
    pub indpb_cx: f64,
    /// Per-position swap probability inside mutation.
    pub indpb_mut: f64,
    pub tournament_size: usize,
    pub weights: ObjectiveWeights,
    /// Drawn from the OS and logged when absent.
    pub seed: Option<u64>,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            machines: 10,
            population_size: 50,
            generations: 100,
            cxpb: 0.8,
            mutpb: 0.2,
            indpb_cx: 0.8,
            indpb_mut: 0.05,
            tournament_size: 10,
            weights: ObjectiveWeights::default(),
            seed: None,
        }
    }
}

/// A permutation with its evaluated fitness.
#[derive(Clone, Debug)]
struct Individual {
    genes: Vec<usize>,
    fitness: Fitness,
    aggregate: f64,
}

/// One optimization run. Owns its operators, RNG, population, and
/// statistics; nothing about a run is process-wide.
pub struct Engine<'a> {
    assigner: Assigner<'a>,
    params: EngineParams,
    rng: StdRng,
    stats: RunStats,
}

impl<'a> Engine<'a> {
    pub fn new(items: &'a [WorkItem], params: EngineParams) -> Self {
        let seed = params.seed.unwrap_or_else(|| rand::rng().random());
        info!("engine seed: {seed}");
        Self {
            assigner: Assigner::new(items, params.machines),
            rng: StdRng::seed_from_u64(seed),
            params,
            stats: RunStats::default(),
        }
    }

    /// Runs the search and analyzes the best schedule found.
    pub fn run(mut self) -> SolveResult {
        let n = self.assigner.items().len();
        if n <= 1 {
            if n == 0 {
                warn!("no work items; emitting an empty schedule");
            }
            let trivial: Vec<usize> = (0..n).collect();
            return analyze::solve_result(&self.assigner, &trivial, self.stats);
        }

        info!(
            "searching over {n} items: population {}, {} generations",
            self.params.population_size, self.params.generations,
        );
        let mut population = self.initial_population(n);

        let mut best_aggregate = f64::INFINITY;
        for generation in 1..=self.params.generations {
            let started = Instant::now();
            let offspring_genes = self.breed(&population);
            let offspring = self.evaluated(offspring_genes);

            let generation_best = offspring
                .iter()
                .map(|individual| individual.aggregate)
                .fold(f64::INFINITY, f64::min);
            if generation_best < best_aggregate {
                best_aggregate = generation_best;
            }
            let avg = offspring
                .iter()
                .map(|individual| individual.aggregate)
                .sum::<f64>()
                / offspring.len() as f64;
            self.stats.generations.push(GenerationStat {
                generation,
                best: best_aggregate,
                avg,
                wall_seconds: started.elapsed().as_secs_f64(),
            });

            population = offspring;
            if generation % 10 == 0 {
                info!("generation {generation}: best aggregate = {best_aggregate:.2}");
            }
        }

        let best_genes = match population
            .iter()
            .min_by(|a, b| a.aggregate.total_cmp(&b.aggregate))
        {
            Some(best) => {
                info!(
                    "best schedule: makespan {:.1} h, balance {:.3}, {:.3} changes per item",
                    best.fitness.makespan, best.fitness.balance, best.fitness.changes,
                );
                best.genes.clone()
            }
            None => (0..n).collect(),
        };
        analyze::solve_result(&self.assigner, &best_genes, self.stats)
    }

    fn initial_population(&mut self, n: usize) -> Vec<Individual> {
        let mut size = self.params.population_size;
        if size == 0 {
            warn!("population size 0 requested; falling back to 1");
            size = 1;
        }
        let genes: Vec<Vec<usize>> = (0..size)
            .map(|_| {
                let mut permutation: Vec<usize> = (0..n).collect();
                permutation.shuffle(&mut self.rng);
                permutation
            })
            .collect();
        self.evaluated(genes)
    }

    /// Scores a batch of permutations on the worker pool. Evaluation is
    /// pure, so parallel execution cannot change the results.
    fn evaluated(&self, genes: Vec<Vec<usize>>) -> Vec<Individual> {
        let assigner = &self.assigner;
        let weights = &self.params.weights;
        genes
            .into_par_iter()
            .map(|genes| {
                let fitness = evaluate(assigner, &genes);
                let aggregate = fitness.aggregate(weights);
                Individual {
                    genes,
                    fitness,
                    aggregate,
                }
            })
            .collect()
    }

    /// Tournament-selects one parent per offspring slot, then crosses
    /// consecutive pairs and mutates in place.
    fn breed(&mut self, population: &[Individual]) -> Vec<Vec<usize>> {
        let mut offspring: Vec<Vec<usize>> = (0..population.len())
            .map(|_| self.tournament(population).genes.clone())
            .collect();
        for (left, right) in offspring.iter_mut().tuples() {
            if self.rng.random::<f64>() < self.params.cxpb {
                uniform_pmx(left, right, self.params.indpb_cx, &mut self.rng);
            }
        }
        for genes in &mut offspring {
            if self.rng.random::<f64>() < self.params.mutpb {
                shuffle_indexes(genes, self.params.indpb_mut, &mut self.rng);
            }
        }
        offspring
    }

    /// Draws `tournament_size` candidates with replacement; the lowest
    /// aggregate wins, first-drawn on ties.
    fn tournament<'p>(&mut self, population: &'p [Individual]) -> &'p Individual {
        let mut best = &population[self.rng.random_range(0..population.len())];
        for _ in 1..self.params.tournament_size {
            let challenger = &population[self.rng.random_range(0..population.len())];
            if challenger.aggregate < best.aggregate {
                best = challenger;
            }
        }
        best
    }
}

/// Uniform partially-matched crossover: each position swaps its values
/// between the two parents with probability `indpb`, and the position maps
/// repair the conflicts so both children stay permutations.
pub fn uniform_pmx(a: &mut [usize], b: &mut [usize], indpb: f64, rng: &mut impl Rng) {
    let size = a.len().min(b.len());
    let mut pos_a = vec![0; size];
    let mut pos_b = vec![0; size];
    for i in 0..size {
        pos_a[a[i]] = i;
        pos_b[b[i]] = i;
    }
    for i in 0..size {
        if rng.random::<f64>() >= indpb {
            continue;
        }
        let va = a[i];
        let vb = b[i];
        a.swap(i, pos_a[vb]);
        b.swap(i, pos_b[va]);
        pos_a.swap(va, vb);
        pos_b.swap(va, vb);
    }
}

/// Shuffle-indexes mutation: each position swaps with a uniformly random
/// other position with probability `indpb`.
pub fn shuffle_indexes(genes: &mut [usize], indpb: f64, rng: &mut impl Rng) {
    let size = genes.len();
    if size < 2 {
        return;
    }
    for i in 0..size {
        if rng.random::<f64>() < indpb {
            let mut other = rng.random_range(0..size - 1);
            if other >= i {
                other += 1;
            }
            genes.swap(i, other);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prepare::testing::item;

    fn is_permutation(genes: &[usize]) -> bool {
        let mut sorted = genes.to_vec();
        sorted.sort_unstable();
        sorted.into_iter().eq(0..genes.len())
    }

    fn fleet_items() -> Vec<WorkItem> {
        let variants = ["V1", "V2", "V1", "V3", "V2", "V1", "V4", "V2"];
        let ulaks = [Some("U1"), None, Some("U1"), Some("U2"), None, Some("U1"), Some("U2"), None];
        variants
            .into_iter()
            .zip(ulaks)
            .enumerate()
            .map(|(index, (variant, ulak))| {
                item(
                    &format!("{}_1", index + 1),
                    &(index + 1).to_string(),
                    4.0 + index as f64,
                    Some(variant),
                    ulak,
                )
            })
            .collect()
    }

    fn small_params(seed: u64) -> EngineParams {
        EngineParams {
            machines: 3,
            population_size: 8,
            generations: 6,
            seed: Some(seed),
            ..EngineParams::default()
        }
    }

    #[test]
    fn crossover_preserves_the_permutation_property() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let mut a: Vec<usize> = (0..30).collect();
            let mut b: Vec<usize> = (0..30).collect();
            a.shuffle(&mut rng);
            b.shuffle(&mut rng);
            uniform_pmx(&mut a, &mut b, 0.8, &mut rng);
            assert!(is_permutation(&a));
            assert!(is_permutation(&b));
        }
    }

    #[test]
    fn mutation_preserves_the_permutation_property() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            let mut genes: Vec<usize> = (0..30).collect();
            genes.shuffle(&mut rng);
            shuffle_indexes(&mut genes, 0.2, &mut rng);
            assert!(is_permutation(&genes));
        }
    }

    #[test]
    fn zero_probability_operators_change_nothing() {
        let mut rng = StdRng::seed_from_u64(13);
        let mut a: Vec<usize> = (0..12).rev().collect();
        let mut b: Vec<usize> = (0..12).collect();
        let (before_a, before_b) = (a.clone(), b.clone());
        uniform_pmx(&mut a, &mut b, 0.0, &mut rng);
        shuffle_indexes(&mut a, 0.0, &mut rng);
        assert_eq!(a, before_a);
        assert_eq!(b, before_b);
    }

    #[test]
    fn identical_seeds_reproduce_the_run() {
        let items = fleet_items();
        let first = Engine::new(&items, small_params(42)).run();
        let second = Engine::new(&items, small_params(42)).run();

        assert_eq!(
            serde_json::to_string(&first.machines).unwrap(),
            serde_json::to_string(&second.machines).unwrap(),
        );
        assert_eq!(first.stats.type_changes, second.stats.type_changes);
        let progress = |result: &SolveResult| -> Vec<(f64, f64)> {
            result
                .stats
                .generations
                .iter()
                .map(|stat| (stat.best, stat.avg))
                .collect()
        };
        assert_eq!(progress(&first), progress(&second));
    }

    #[test]
    fn recorded_best_aggregate_never_worsens() {
        let items = fleet_items();
        let result = Engine::new(&items, small_params(3)).run();

        assert_eq!(result.stats.generations.len(), 6);
        for pair in result.stats.generations.windows(2) {
            assert!(pair[1].best <= pair[0].best);
        }
    }

    #[test]
    fn every_item_is_scheduled_exactly_once() {
        let items = fleet_items();
        let result = Engine::new(&items, small_params(9)).run();

        let mut scheduled: Vec<String> = result
            .machines
            .iter()
            .flat_map(|timeline| timeline.entries.iter().map(|entry| entry.item_id.clone()))
            .collect();
        scheduled.sort();
        let mut expected: Vec<String> = items.iter().map(|item| item.id.clone()).collect();
        expected.sort();
        assert_eq!(scheduled, expected);
    }

    #[test]
    fn single_item_bypasses_the_search() {
        let items = vec![item("1_1", "1", 5.0, Some("V1"), None)];
        let result = Engine::new(&items, small_params(1)).run();

        assert!(result.stats.generations.is_empty());
        assert_eq!(result.machines[0].entries.len(), 1);
        assert!(result.machines[1..]
            .iter()
            .all(|timeline| timeline.entries.is_empty()));
    }

    #[test]
    fn empty_input_yields_an_empty_schedule_and_zero_stats() {
        let items: Vec<WorkItem> = Vec::new();
        let result = Engine::new(&items, small_params(1)).run();

        assert_eq!(result.machines.len(), 3);
        assert!(result.machines.iter().all(|t| t.entries.is_empty()));
        assert!(result.stats.generations.is_empty());
        assert_eq!(result.stats.type_changes, crate::analyze::SetupTally::default());
        assert!(result
            .stats
            .machine_loads
            .iter()
            .all(|load| load.item_count == 0 && load.total_hours.abs() < f64::EPSILON));
    }
}

//! Multi-objective evolutionary search over edit combinations (NSGA-II).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use log::{debug, info};

use crate::schema::{
    CandidateSnapshot, SearchConfig, SearchHistory, SearchPhase, SearchProgress, SearchResult,
    SearchStats, StopReason,
};

use super::context::RunContext;
use super::fitness::{EvaluationStatus, FitnessEvaluator, ObjectiveVector, SENTINEL};
use super::genome::{Chromosome, GenomeRng, SearchBounds, chromosome_distance};

/// A candidate individual in the population.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Unique identifier.
    pub id: u64,
    pub chromosome: Chromosome,
    pub objectives: ObjectiveVector,
    pub status: EvaluationStatus,
    /// Non-domination rank (0 = first front).
    pub rank: usize,
    pub crowding: f64,
    /// Generation created.
    pub generation: usize,
    /// Parent IDs.
    pub parents: Vec<u64>,
}

impl Candidate {
    /// Convert to snapshot for serialization.
    pub fn to_snapshot(&self) -> CandidateSnapshot {
        CandidateSnapshot {
            id: self.id,
            generation: self.generation,
            objectives: self.objectives.as_slice().to_vec(),
            rank: self.rank,
            active_points: self.chromosome.active_points(),
            parents: self.parents.clone(),
        }
    }
}

/// Indices of each non-dominated front, best first.
pub fn non_dominated_sort(objectives: &[ObjectiveVector]) -> Vec<Vec<usize>> {
    let n = objectives.len();
    let mut dominated_by: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut domination_count = vec![0usize; n];
    let mut fronts = vec![Vec::new()];

    for p in 0..n {
        for q in 0..n {
            if p == q {
                continue;
            }
            if objectives[p].dominates(&objectives[q]) {
                dominated_by[p].push(q);
            } else if objectives[q].dominates(&objectives[p]) {
                domination_count[p] += 1;
            }
        }
        if domination_count[p] == 0 {
            fronts[0].push(p);
        }
    }

    let mut current = 0;
    while !fronts[current].is_empty() {
        let mut next = Vec::new();
        for &p in &fronts[current] {
            for &q in &dominated_by[p] {
                domination_count[q] -= 1;
                if domination_count[q] == 0 {
                    next.push(q);
                }
            }
        }
        current += 1;
        fronts.push(next);
    }
    fronts.pop();
    fronts
}

/// Crowding distance of each member of `front`, in the same order.
pub fn crowding_distance(front: &[usize], objectives: &[ObjectiveVector]) -> Vec<f64> {
    let size = front.len();
    let mut distance = vec![0.0; size];
    if size <= 2 {
        return vec![f64::INFINITY; size];
    }

    let m = objectives[front[0]].len();
    for k in 0..m {
        let mut order: Vec<usize> = (0..size).collect();
        order.sort_by(|&a, &b| {
            objectives[front[a]]
                .get(k)
                .total_cmp(&objectives[front[b]].get(k))
        });
        let min = objectives[front[order[0]]].get(k);
        let max = objectives[front[order[size - 1]]].get(k);
        distance[order[0]] = f64::INFINITY;
        distance[order[size - 1]] = f64::INFINITY;
        let range = max - min;
        if range <= 0.0 || !range.is_finite() {
            continue;
        }
        for w in 1..size - 1 {
            let prev = objectives[front[order[w - 1]]].get(k);
            let next = objectives[front[order[w + 1]]].get(k);
            distance[order[w]] += (next - prev) / range;
        }
    }
    distance
}

/// Evolution engine that runs the search.
pub struct EvolutionEngine {
    config: SearchConfig,
    bounds: SearchBounds,
    rng: GenomeRng,
    evaluator: FitnessEvaluator,
    ctx: RunContext,
    population: Vec<Candidate>,
    history: SearchHistory,
    generation: usize,
    best_fitness: f64,
    mutation_rate: f64,
    next_id: u64,
    cancelled: Arc<AtomicBool>,
}

impl EvolutionEngine {
    /// Create a new evolution engine.
    pub fn new(config: SearchConfig, evaluator: FitnessEvaluator, ctx: RunContext) -> Self {
        let seed = config.random_seed.unwrap_or_else(rand::random);
        let bounds = SearchBounds::from_model(evaluator.model());
        let mutation_rate = config
            .mutation_probability
            .unwrap_or(1.0 / bounds.len().max(1) as f64);

        Self {
            config,
            bounds,
            rng: GenomeRng::new(seed),
            evaluator,
            ctx,
            population: Vec::new(),
            history: SearchHistory::default(),
            generation: 0,
            best_fitness: SENTINEL,
            mutation_rate,
            next_id: 0,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get cancellation handle.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn population(&self) -> &[Candidate] {
        &self.population
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Hand back the run context, with the accepted patches.
    pub fn into_context(self) -> RunContext {
        self.ctx
    }

    fn new_candidate(&mut self, chromosome: Chromosome, parents: Vec<u64>) -> Candidate {
        let id = self.next_id;
        self.next_id += 1;
        Candidate {
            id,
            chromosome,
            objectives: ObjectiveVector::sentinel(self.evaluator.number_of_objectives()),
            status: EvaluationStatus::NoActiveEdits,
            rank: usize::MAX,
            crowding: 0.0,
            generation: self.generation,
            parents,
        }
    }

    /// Draw the initial population.
    pub fn initialize(&mut self) {
        self.population.clear();
        self.generation = 0;
        for _ in 0..self.config.population_size {
            let chromosome = self.rng.random_chromosome(
                &self.bounds,
                self.config.initialization_strategy,
                self.config.mu,
            );
            let candidate = self.new_candidate(chromosome, Vec::new());
            self.population.push(candidate);
        }
    }

    fn should_stop(&self) -> Option<StopReason> {
        if self.cancelled.load(Ordering::Relaxed) {
            return Some(StopReason::Cancelled);
        }
        if self.ctx.evaluations() >= self.config.max_evaluations() {
            return Some(StopReason::MaxEvaluations);
        }
        None
    }

    /// Evaluate candidates in order until the budget runs out or the run is
    /// cancelled. Returns how many were evaluated.
    fn evaluate_all(&mut self, candidates: &mut [Candidate]) -> usize {
        for (done, candidate) in candidates.iter_mut().enumerate() {
            if self.should_stop().is_some() {
                return done;
            }
            let evaluation = self
                .evaluator
                .evaluate(&mut candidate.chromosome, &mut self.ctx);
            if let Some(fitness) = evaluation.fitness {
                self.best_fitness = self.best_fitness.min(fitness);
            }
            candidate.objectives = evaluation.objectives;
            candidate.status = evaluation.status;
        }
        candidates.len()
    }

    /// Binary tournament on (rank, crowding).
    fn tournament(&mut self) -> usize {
        let a = self.rng.index(self.population.len());
        let b = self.rng.index(self.population.len());
        let (ca, cb) = (&self.population[a], &self.population[b]);
        if ca.rank != cb.rank {
            return if ca.rank < cb.rank { a } else { b };
        }
        if ca.crowding > cb.crowding {
            a
        } else if cb.crowding > ca.crowding {
            b
        } else if self.rng.chance(0.5) {
            a
        } else {
            b
        }
    }

    fn make_offspring(&mut self) -> Vec<Candidate> {
        let size = self.config.population_size;
        let mut offspring = Vec::with_capacity(size + 1);
        while offspring.len() < size {
            let i1 = self.tournament();
            let i2 = self.tournament();
            let (p1, p2) = (&self.population[i1], &self.population[i2]);
            let parents = vec![p1.id, p2.id];

            let (mut c1, mut c2) = if self.rng.chance(self.config.crossover_probability) {
                let (a, b) = (p1.chromosome.clone(), p2.chromosome.clone());
                self.rng.crossover(&a, &b)
            } else {
                (p1.chromosome.clone(), p2.chromosome.clone())
            };
            self.rng.mutate(&mut c1, &self.bounds, self.mutation_rate);
            self.rng.mutate(&mut c2, &self.bounds, self.mutation_rate);

            offspring.push(self.new_candidate(c1, parents.clone()));
            if offspring.len() < size {
                offspring.push(self.new_candidate(c2, parents));
            }
        }
        offspring
    }

    /// Keep the best `population_size` of `pool` by front, then crowding.
    fn select_survivors(&mut self, mut pool: Vec<Candidate>) {
        let objectives: Vec<ObjectiveVector> = pool.iter().map(|c| c.objectives).collect();
        let fronts = non_dominated_sort(&objectives);
        for (rank, front) in fronts.iter().enumerate() {
            let distances = crowding_distance(front, &objectives);
            for (&i, d) in front.iter().zip(distances) {
                pool[i].rank = rank;
                pool[i].crowding = d;
            }
        }
        pool.sort_by(|a, b| {
            a.rank
                .cmp(&b.rank)
                .then_with(|| b.crowding.total_cmp(&a.crowding))
        });
        pool.truncate(self.config.population_size);
        self.population = pool;
    }

    fn record_history(&mut self) {
        let size = self.population.len().max(1) as f64;
        let mean_edits = self
            .population
            .iter()
            .map(|c| c.chromosome.active_count() as f64)
            .sum::<f64>()
            / size;
        let diversity = self.compute_diversity();

        self.history.best_fitness.push(self.best_fitness);
        self.history.front_size.push(self.front_size());
        self.history.mean_edits.push(mean_edits);
        self.history.diversity.push(diversity);
        self.history.patches_found.push(self.ctx.patches().len());
    }

    /// Mean pairwise chromosome distance.
    fn compute_diversity(&self) -> f64 {
        let n = self.population.len();
        if n < 2 {
            return 0.0;
        }
        let mut total = 0.0;
        let mut count = 0;
        for i in 0..n {
            for j in (i + 1)..n {
                total += chromosome_distance(
                    &self.population[i].chromosome,
                    &self.population[j].chromosome,
                );
                count += 1;
            }
        }
        total / count as f64
    }

    fn front_size(&self) -> usize {
        self.population.iter().filter(|c| c.rank == 0).count()
    }

    /// Get current progress.
    pub fn progress(&self) -> SearchProgress {
        let phase = if self.cancelled.load(Ordering::Relaxed) {
            SearchPhase::Stopped
        } else if self.ctx.evaluations() == 0 {
            SearchPhase::Initializing
        } else if self.ctx.evaluations() >= self.config.max_evaluations() {
            SearchPhase::Complete
        } else {
            SearchPhase::Evaluating
        };

        SearchProgress {
            generation: self.generation,
            total_generations: self.config.max_generations,
            evaluations: self.ctx.evaluations(),
            max_evaluations: self.config.max_evaluations(),
            best_fitness: self.best_fitness,
            front_size: self.front_size(),
            patches_found: self.ctx.patches().len(),
            phase,
        }
    }

    /// Run the search with progress callback.
    pub fn run_with_callback<F>(&mut self, callback: F) -> SearchResult
    where
        F: Fn(&SearchProgress),
    {
        let start_time = Instant::now();
        info!(
            "Searching {} modification points: population {}, budget {} evaluations",
            self.bounds.len(),
            self.config.population_size,
            self.config.max_evaluations()
        );

        self.initialize();
        callback(&self.progress());

        let mut initial = std::mem::take(&mut self.population);
        let evaluated = self.evaluate_all(&mut initial);
        initial.truncate(evaluated);
        self.select_survivors(initial);
        self.record_history();
        callback(&self.progress());

        let stop_reason = loop {
            if let Some(reason) = self.should_stop() {
                break reason;
            }
            if self.population.is_empty() {
                break StopReason::Cancelled;
            }

            self.generation += 1;
            let mut offspring = self.make_offspring();
            let evaluated = self.evaluate_all(&mut offspring);
            offspring.truncate(evaluated);

            let mut pool = std::mem::take(&mut self.population);
            pool.extend(offspring);
            self.select_survivors(pool);
            self.record_history();

            debug!(
                "Generation {}: front {}, best fitness {:.4}, patches {}",
                self.generation,
                self.front_size(),
                self.best_fitness,
                self.ctx.patches().len()
            );
            callback(&self.progress());
        };

        let elapsed = start_time.elapsed().as_secs_f64();
        let total_evaluations = self.ctx.evaluations();
        info!(
            "Search stopped ({stop_reason:?}) after {total_evaluations} evaluations: {} patches",
            self.ctx.patches().len()
        );

        SearchResult {
            front: self
                .population
                .iter()
                .filter(|c| c.rank == 0)
                .map(Candidate::to_snapshot)
                .collect(),
            patches: self.ctx.patches().records().to_vec(),
            stats: SearchStats {
                generations: self.generation,
                total_evaluations,
                best_fitness: self.best_fitness,
                elapsed_seconds: elapsed,
                evaluations_per_second: if elapsed > 0.0 {
                    total_evaluations as f64 / elapsed
                } else {
                    0.0
                },
                stop_reason,
            },
            history: self.history.clone(),
        }
    }

    /// Run the search (blocking).
    pub fn run(&mut self) -> SearchResult {
        self.run_with_callback(|_| {})
    }
}

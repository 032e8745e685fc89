use crate::organism::{Brain, Chromosome, GENE_COUNT, MAX_GENE, MIN_GENE};
use crate::simulation::{
    CrossoverType, EvaluatorState, GenerationEvaluator, GenerationReport, RenderFrame, SimulationConfig,
};
use rand::prelude::*;
use rand_distr::StandardNormal;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

// Global counter for unique individual IDs
static NEXT_INDIVIDUAL_ID: AtomicUsize = AtomicUsize::new(0);

fn generate_unique_id() -> usize {
    NEXT_INDIVIDUAL_ID.fetch_add(1, Ordering::SeqCst)
}

// Re-draws allowed when the second parent keeps coming out equal to the first.
const MAX_PARENT_REDRAWS: usize = 10;

#[derive(Debug, Clone)]
pub struct Individual {
    pub id: usize,
    pub chromosome: Chromosome,
    pub fitness: f64,
    pub generation: u32, // Generation this individual was born in
}

impl Individual {
    pub fn new_random<R: Rng + ?Sized>(rng: &mut R, generation: u32) -> Self {
        Self {
            id: generate_unique_id(),
            chromosome: Chromosome::new_random(rng),
            fitness: 0.0,
            generation,
        }
    }

    // Applies mutation to a chromosome based on the simulation config
    fn mutate_chromosome<R: Rng + ?Sized>(chromosome: &mut Chromosome, rng: &mut R, config: &SimulationConfig) {
        if !rng.gen_bool(config.mutation_rate_per_individual) {
            return;
        }
        for gene in &mut chromosome.genes {
            if rng.gen_bool(config.mutation_rate_per_gene) {
                Self::mutate_float_gene(gene, config.mutation_power, rng);
            }
        }
    }

    fn mutate_float_gene<R: Rng + ?Sized>(value: &mut f32, power: f32, rng: &mut R) {
        let perturbation: f32 = rng.sample(StandardNormal);
        *value = (*value + perturbation * power).clamp(MIN_GENE, MAX_GENE);
    }

    pub fn from_parents<R: Rng + ?Sized>(
        parent1: &Individual,
        parent2: &Individual,
        rng: &mut R,
        config: &SimulationConfig,
        generation: u32,
    ) -> Self {
        let mut genes = parent1.chromosome.genes;
        let donor = &parent2.chromosome.genes;
        match config.crossover_type {
            CrossoverType::SinglePoint => {
                let crossover_point = rng.gen_range(0..GENE_COUNT);
                genes[crossover_point..].copy_from_slice(&donor[crossover_point..]);
            }
            CrossoverType::Uniform => {
                for (gene, donated) in genes.iter_mut().zip(donor) {
                    if rng.gen_bool(0.5) {
                        *gene = *donated;
                    }
                }
            }
        }

        let mut chromosome = Chromosome { genes };
        Self::mutate_chromosome(&mut chromosome, rng, config);

        Self {
            id: generate_unique_id(),
            chromosome,
            fitness: 0.0,
            generation,
        }
    }
}

#[derive(Debug)]
pub struct Population {
    pub individuals: Vec<Individual>,
    pub generation_count: u32,
}

impl Population {
    pub fn new_random<R: Rng + ?Sized>(size: usize, rng: &mut R, generation: u32) -> Self {
        let individuals = (0..size).map(|_| Individual::new_random(rng, generation)).collect();
        Self {
            individuals,
            generation_count: generation,
        }
    }

    // Tournament Selection
    fn select_one_parent<R: Rng + ?Sized>(&self, rng: &mut R, tournament_size: usize) -> Option<&Individual> {
        if self.individuals.is_empty() {
            return None;
        }
        (0..tournament_size.max(1))
            .map(|_| &self.individuals[rng.gen_range(0..self.individuals.len())])
            .max_by(|a, b| a.fitness.total_cmp(&b.fitness))
    }

    pub fn select_parents<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        tournament_size: usize,
    ) -> Option<(&Individual, &Individual)> {
        let parent1 = self.select_one_parent(rng, tournament_size)?;
        let mut parent2 = self.select_one_parent(rng, tournament_size)?;
        // Prefer distinct parents when the population allows it
        if self.individuals.len() > 1 {
            for _ in 0..MAX_PARENT_REDRAWS {
                if parent2.id != parent1.id {
                    break;
                }
                parent2 = self.select_one_parent(rng, tournament_size)?;
            }
        }
        Some((parent1, parent2))
    }

    /// Copies each individual's fitness out of the report, then sorts best first.
    pub fn apply_report(&mut self, report: &GenerationReport) {
        for individual in &mut self.individuals {
            individual.fitness = report.fitness_of(individual.id).unwrap_or(0.0);
        }
        self.individuals.sort_by(|a, b| b.fitness.total_cmp(&a.fitness));
    }

    pub fn best_fitness(&self) -> f64 {
        self.individuals.first().map_or(0.0, |ind| ind.fitness)
    }

    pub fn average_fitness(&self) -> f64 {
        if self.individuals.is_empty() {
            return 0.0;
        }
        self.individuals.iter().map(|ind| ind.fitness).sum::<f64>() / self.individuals.len() as f64
    }
}

/// One birth: `parents` is `None` for the randomly created founders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineageRecord {
    pub child: usize,
    pub parents: Option<(usize, usize)>,
    pub generation: u32,
}

pub struct EvolutionEngine {
    pub population: Population,
    config: SimulationConfig,
    rng: StdRng,
    evaluator: Option<GenerationEvaluator<Brain, StdRng>>,
    pub phylogeny_data: Vec<LineageRecord>,
    pub all_time_best_individual: Option<Individual>,
    last_report: Option<GenerationReport>,
    finished: bool,
}

impl EvolutionEngine {
    pub fn new(config: SimulationConfig) -> Self {
        let mut rng = Self::seeded_rng(&config);
        let population = Population::new_random(config.population_size, &mut rng, 0);
        let phylogeny_data = Self::founders(&population);

        Self {
            population,
            config,
            rng,
            evaluator: None,
            phylogeny_data,
            all_time_best_individual: None,
            last_report: None,
            finished: false,
        }
    }

    fn seeded_rng(config: &SimulationConfig) -> StdRng {
        match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    fn founders(population: &Population) -> Vec<LineageRecord> {
        population
            .individuals
            .iter()
            .map(|individual| LineageRecord {
                child: individual.id,
                parents: None,
                generation: population.generation_count,
            })
            .collect()
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn last_report(&self) -> Option<&GenerationReport> {
        self.last_report.as_ref()
    }

    /// Generation budget spent, or the fitness threshold reached.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    // Method to reset the engine to its initial state
    pub fn reset(&mut self) {
        self.rng = Self::seeded_rng(&self.config);
        self.population = Population::new_random(self.config.population_size, &mut self.rng, 0);
        self.phylogeny_data = Self::founders(&self.population);
        self.evaluator = None;
        self.all_time_best_individual = None;
        self.last_report = None;
        self.finished = false;
        info!("evolution engine reset");
    }

    /// Snapshot of the generation currently being played, if any.
    pub fn frame(&self) -> Option<RenderFrame> {
        self.evaluator.as_ref().map(|evaluator| evaluator.frame())
    }

    fn current_evaluator(&mut self) -> &mut GenerationEvaluator<Brain, StdRng> {
        let generation = self.population.generation_count;
        let individuals = &self.population.individuals;
        let rng = &mut self.rng;
        self.evaluator.get_or_insert_with(|| {
            let agents = individuals
                .iter()
                .map(|individual| (individual.id, Brain::from_chromosome(&individual.chromosome)));
            GenerationEvaluator::new(generation, agents, StdRng::seed_from_u64(rng.gen()))
        })
    }

    /// Steps the current generation by up to `ticks` ticks, moving on to the
    /// next generation whenever one ends. Returns how many generations ended.
    pub fn advance(&mut self, ticks: u64) -> usize {
        let cap = self.config.max_ticks_per_generation;
        let mut completed = 0;
        for _ in 0..ticks {
            if self.finished {
                break;
            }
            let evaluator = self.current_evaluator();
            evaluator.tick();
            if evaluator.is_running() && evaluator.ticks() >= cap {
                evaluator.halt();
            }
            if !evaluator.is_running() {
                self.complete_generation();
                completed += 1;
            }
        }
        completed
    }

    /// Plays the current generation to its end (or the tick cap) at once.
    pub fn run_generation(&mut self) -> Option<&GenerationReport> {
        if self.finished {
            return None;
        }
        let cap = self.config.max_ticks_per_generation;
        let evaluator = self.current_evaluator();
        let remaining = cap.saturating_sub(evaluator.ticks());
        evaluator.run_to_completion(remaining);
        self.complete_generation();
        self.last_report.as_ref()
    }

    fn complete_generation(&mut self) {
        let Some(evaluator) = self.evaluator.take() else {
            return;
        };
        let report = evaluator.finish();
        self.population.apply_report(&report);
        self.update_all_time_best();

        let halted = report.state == EvaluatorState::Halted;
        info!(
            generation = report.generation,
            score = report.score,
            ticks = report.ticks,
            halted,
            "Gen: {} - Best Fitness: {:.2}, Avg Fitness: {:.2}",
            report.generation,
            self.population.best_fitness(),
            self.population.average_fitness()
        );

        let budget_spent = report.next_generation >= self.config.num_generations;
        let threshold_reached = self.population.best_fitness() >= self.config.fitness_threshold;
        if budget_spent || threshold_reached {
            info!(
                generations = report.next_generation,
                best = self.population.best_fitness(),
                "evolution finished"
            );
            self.finished = true;
        } else {
            self.evolve_generation(report.next_generation);
        }
        self.last_report = Some(report);
    }

    fn update_all_time_best(&mut self) {
        let Some(current_gen_best) = self.population.individuals.first() else {
            return;
        };
        let improved = self
            .all_time_best_individual
            .as_ref()
            .map_or(true, |best| current_gen_best.fitness > best.fitness);
        if improved {
            info!(
                id = current_gen_best.id,
                fitness = current_gen_best.fitness,
                generation = current_gen_best.generation,
                "new all-time best individual"
            );
            self.all_time_best_individual = Some(current_gen_best.clone());
        }
    }

    // Breeds the next population from the evaluated (sorted) current one.
    fn evolve_generation(&mut self, next_generation_number: u32) {
        let mut new_population = Vec::with_capacity(self.config.population_size);

        // Elitism: Carry over the best individuals from the current population
        new_population.extend(self.population.individuals.iter().take(self.config.elitism_count).cloned());

        while new_population.len() < self.config.population_size {
            let Some((parent1, parent2)) = self.population.select_parents(&mut self.rng, self.config.tournament_size) else {
                break;
            };
            let offspring = Individual::from_parents(parent1, parent2, &mut self.rng, &self.config, next_generation_number);

            self.phylogeny_data.push(LineageRecord {
                child: offspring.id,
                parents: Some((parent1.id, parent2.id)),
                generation: next_generation_number,
            });
            new_population.push(offspring);
        }
        debug!(generation = next_generation_number, size = new_population.len(), "bred next generation");

        self.population.individuals = new_population;
        self.population.generation_count = next_generation_number;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Helper to get a small, reproducible config for tests
    fn test_config() -> SimulationConfig {
        SimulationConfig {
            population_size: 6,
            num_generations: 3,
            tournament_size: 3,
            elitism_count: 1,
            mutation_rate_per_gene: 0.1,
            mutation_rate_per_individual: 1.0, // Ensure mutation happens for testing
            max_ticks_per_generation: 400,
            seed: Some(42),
            ..Default::default()
        }
    }

    fn individual_with_genes(value: f32) -> Individual {
        Individual {
            id: generate_unique_id(),
            chromosome: Chromosome { genes: [value; GENE_COUNT] },
            fitness: 0.0,
            generation: 0,
        }
    }

    #[test]
    fn test_population_initialization() {
        let mut rng = StdRng::seed_from_u64(1);
        let population = Population::new_random(10, &mut rng, 0);
        assert_eq!(population.individuals.len(), 10);
        let mut ids: Vec<_> = population.individuals.iter().map(|ind| ind.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 10);
    }

    #[test]
    fn test_tournament_selection() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut population = Population::new_random(10, &mut rng, 0);
        for (i, ind) in population.individuals.iter_mut().enumerate() {
            ind.fitness = i as f64;
        }

        let (p1, p2) = population.select_parents(&mut rng, 3).expect("non-empty population");
        assert_ne!(p1.id, p2.id, "Parents should be different");

        let draws = 1_000;
        let mean = (0..draws)
            .filter_map(|_| population.select_one_parent(&mut rng, 3))
            .map(|ind| ind.fitness)
            .sum::<f64>()
            / draws as f64;
        assert!(mean > 5.5, "tournament mean {} shows no selection pressure", mean);

        let empty = Population::new_random(0, &mut rng, 0);
        assert!(empty.select_parents(&mut rng, 3).is_none());
    }

    #[test]
    fn test_single_point_crossover() {
        let mut rng = StdRng::seed_from_u64(3);
        let config = SimulationConfig {
            crossover_type: CrossoverType::SinglePoint,
            mutation_rate_per_individual: 0.0,
            ..test_config()
        };
        let parent1 = individual_with_genes(1.0);
        let parent2 = individual_with_genes(-1.0);
        for _ in 0..50 {
            let child = Individual::from_parents(&parent1, &parent2, &mut rng, &config, 1);
            let split = child.chromosome.genes.iter().position(|&gene| gene == -1.0).unwrap_or(GENE_COUNT);
            assert!(child.chromosome.genes[..split].iter().all(|&gene| gene == 1.0));
            assert!(child.chromosome.genes[split..].iter().all(|&gene| gene == -1.0));
            assert_eq!(child.generation, 1);
        }
    }

    #[test]
    fn test_uniform_crossover_mixes_parents() {
        let mut rng = StdRng::seed_from_u64(4);
        let config = SimulationConfig {
            crossover_type: CrossoverType::Uniform,
            mutation_rate_per_individual: 0.0,
            ..test_config()
        };
        let parent1 = individual_with_genes(1.0);
        let parent2 = individual_with_genes(-1.0);
        let child = Individual::from_parents(&parent1, &parent2, &mut rng, &config, 1);
        assert!(child.chromosome.genes.iter().all(|&gene| gene == 1.0 || gene == -1.0));
        // 2^-20 chance of drawing every gene from one side.
        assert!(child.chromosome.genes.contains(&1.0));
        assert!(child.chromosome.genes.contains(&-1.0));
        assert_ne!(child.id, parent1.id);
    }

    #[test]
    fn test_mutation_stays_within_bounds() {
        let mut rng = StdRng::seed_from_u64(5);
        let config = SimulationConfig {
            mutation_rate_per_individual: 1.0,
            mutation_rate_per_gene: 1.0,
            mutation_power: 100.0,
            ..test_config()
        };
        let parent = individual_with_genes(29.5);
        let child = Individual::from_parents(&parent, &parent, &mut rng, &config, 1);
        assert!(child.chromosome.genes.iter().all(|gene| (MIN_GENE..=MAX_GENE).contains(gene)));
        assert_ne!(child.chromosome, parent.chromosome);
    }

    #[test]
    fn test_engine_runs_to_generation_budget() {
        let config = test_config();
        let mut engine = EvolutionEngine::new(config.clone());
        let mut generations = 0;
        while !engine.is_finished() {
            let report = engine.run_generation().expect("engine not finished");
            assert_eq!(report.generation, generations);
            assert!(report.ticks <= config.max_ticks_per_generation);
            generations += 1;
            assert!(generations <= config.num_generations);
        }

        let last = engine.last_report().expect("at least one generation");
        assert!(generations == config.num_generations || engine.population.best_fitness() >= config.fitness_threshold);
        assert_eq!(last.next_generation, generations);
        assert!(engine.all_time_best_individual.is_some());
        assert!(engine.run_generation().is_none());
        assert_eq!(engine.advance(10), 0);

        let bred = (generations as usize - 1) * (config.population_size - config.elitism_count);
        assert_eq!(engine.phylogeny_data.len(), config.population_size + bred);
    }

    #[test]
    fn test_fitness_threshold_stops_evolution() {
        let config = SimulationConfig {
            fitness_threshold: 0.0,
            ..test_config()
        };
        let mut engine = EvolutionEngine::new(config);
        engine.run_generation();
        assert!(engine.is_finished());
        assert_eq!(engine.population.generation_count, 0);
    }

    #[test]
    fn test_tick_cap_halts_generation() {
        let config = SimulationConfig {
            max_ticks_per_generation: 5,
            ..test_config()
        };
        let mut engine = EvolutionEngine::new(config);
        assert_eq!(engine.advance(5), 1);
        let report = engine.last_report().expect("first generation ended");
        assert_eq!(report.state, EvaluatorState::Halted);
        assert_eq!(report.ticks, 5);
        assert_eq!(report.results.len(), 6);
        // Five ticks of survival, no obstacle reached yet.
        assert!(engine.population.individuals.iter().all(|ind| ind.generation == 1 || ind.fitness > 0.0));
        assert_eq!(engine.population.generation_count, 1);
    }

    #[test]
    fn test_advance_exposes_frames() {
        let mut engine = EvolutionEngine::new(test_config());
        assert!(engine.frame().is_none());
        engine.advance(1);
        let frame = engine.frame().expect("generation in progress");
        assert_eq!(frame.generation, 0);
        assert_eq!(frame.obstacles.len(), 1);
        assert!(frame.alive <= 6);
    }

    #[test]
    fn test_same_seed_same_run() {
        let fitness_after_one = |seed| {
            let mut engine = EvolutionEngine::new(SimulationConfig {
                seed: Some(seed),
                ..test_config()
            });
            engine.run_generation();
            engine.population.individuals.iter().map(|ind| ind.fitness).collect::<Vec<_>>()
        };
        assert_eq!(fitness_after_one(9), fitness_after_one(9));
    }

    #[test]
    fn test_all_time_best_tracking() {
        let mut engine = EvolutionEngine::new(test_config());
        engine.population.individuals[0].fitness = 10.0;
        engine.update_all_time_best();
        assert_eq!(engine.all_time_best_individual.as_ref().map(|ind| ind.fitness), Some(10.0));

        engine.population.individuals[0].fitness = 3.0;
        engine.update_all_time_best();
        assert_eq!(engine.all_time_best_individual.as_ref().map(|ind| ind.fitness), Some(10.0));
    }

    #[test]
    fn test_engine_reset() {
        let config = test_config();
        let mut engine = EvolutionEngine::new(config.clone());
        engine.run_generation();
        assert!(engine.last_report().is_some());

        engine.reset();
        assert_eq!(engine.population.generation_count, 0);
        assert_eq!(engine.phylogeny_data.len(), config.population_size);
        assert!(engine.all_time_best_individual.is_none());
        assert!(engine.last_report().is_none());
        assert!(!engine.is_finished());
        assert_eq!(engine.population.individuals.len(), config.population_size);
    }
}

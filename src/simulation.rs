use crate::collision::{self, Boundary, SpriteMasks};
use crate::controller::{self, Action, Controller};
use crate::error::EvoError;
use crate::physics::{Actor, Ground, Obstacle, OBSTACLE_SPAWN_X};
use bevy::prelude::Resource;
use rand::Rng;
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

// --- Fitness Shaping ---
// Accumulated in f64 so long runs do not drift.
pub const SURVIVAL_REWARD: f64 = 0.1;
pub const CLEARANCE_REWARD: f64 = 5.0;
pub const COLLISION_PENALTY: f64 = -2.0;

pub type AgentId = usize;

/// Why an agent left the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fate {
    Collided,
    Grounded,
    Escaped,
    /// Still alive when the generation was halted.
    Survived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluatorState {
    Running,
    GenerationDone,
    Halted,
}

#[derive(Debug)]
pub struct RosterEntry<C> {
    pub agent: AgentId,
    pub controller: C,
    pub actor: Actor,
    pub fitness: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentResult {
    pub agent: AgentId,
    pub fitness: f64,
    pub fate: Fate,
    pub ticks_survived: u64,
}

/// Handed back to the optimizer once a generation ends.
#[derive(Debug, Clone)]
pub struct GenerationReport {
    pub generation: u32,
    pub next_generation: u32,
    pub score: u32,
    pub ticks: u64,
    pub state: EvaluatorState,
    pub results: Vec<AgentResult>,
}

impl GenerationReport {
    pub fn best_fitness(&self) -> f64 {
        self.results
            .iter()
            .map(|result| result.fitness)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn fitness_of(&self, agent: AgentId) -> Option<f64> {
        self.results
            .iter()
            .find(|result| result.agent == agent)
            .map(|result| result.fitness)
    }
}

// --- Rendering Input ---

#[derive(Debug, Clone, PartialEq)]
pub struct ActorView {
    pub agent: AgentId,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub frame: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObstacleView {
    pub x: f32,
    pub top_edge: f32,
    pub bottom_edge: f32,
}

/// Read-only snapshot of one tick for the renderer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderFrame {
    pub actors: Vec<ActorView>,
    pub obstacles: Vec<ObstacleView>,
    pub ground: [f32; 2],
    pub score: u32,
    pub generation: u32,
    pub alive: usize,
}

// === Generation Evaluator ===

/// Runs one generation: every live agent is advanced in lockstep until the
/// roster is empty (or the owner halts it between ticks).
pub struct GenerationEvaluator<C, R> {
    roster: Vec<RosterEntry<C>>,
    results: Vec<AgentResult>,
    obstacles: Vec<Obstacle>,
    ground: Ground,
    masks: &'static SpriteMasks,
    rng: R,
    score: u32,
    generation: u32,
    started_at: u32,
    ticks: u64,
    state: EvaluatorState,
}

impl<C: Controller, R: Rng> GenerationEvaluator<C, R> {
    pub fn new(generation: u32, agents: impl IntoIterator<Item = (AgentId, C)>, mut rng: R) -> Self {
        let roster: Vec<_> = agents
            .into_iter()
            .map(|(agent, controller)| RosterEntry {
                agent,
                controller,
                actor: Actor::default(),
                fitness: 0.0,
            })
            .collect();
        let obstacles = vec![Obstacle::spawn(OBSTACLE_SPAWN_X, &mut rng)];
        debug!(generation, agents = roster.len(), "generation started");

        let mut evaluator = Self {
            roster,
            results: Vec::new(),
            obstacles,
            ground: Ground::default(),
            masks: SpriteMasks::shared(),
            rng,
            score: 0,
            generation,
            started_at: generation,
            ticks: 0,
            state: EvaluatorState::Running,
        };
        if evaluator.roster.is_empty() {
            evaluator.conclude(EvaluatorState::GenerationDone);
        }
        evaluator
    }

    pub fn is_running(&self) -> bool {
        self.state == EvaluatorState::Running
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// The obstacle the lead actor still has to clear.
    pub fn active_obstacle_index(&self) -> usize {
        match (self.roster.first(), self.obstacles.first()) {
            (Some(lead), Some(first))
                if self.obstacles.len() > 1 && lead.actor.x > first.right_edge() =>
            {
                1
            }
            _ => 0,
        }
    }

    pub fn tick(&mut self) -> EvaluatorState {
        if !self.is_running() {
            return self.state;
        }
        self.ticks += 1;
        if self.obstacles.is_empty() {
            self.spawn_obstacle();
        }

        // 1-2. Sense, decide, move.
        let active = self.obstacles[self.active_obstacle_index()];
        for entry in &mut self.roster {
            entry.fitness += SURVIVAL_REWARD;
            let sensors = controller::observe(&entry.actor, &active);
            if Action::from_signal(entry.controller.decide(&sensors)) == Action::Flap {
                entry.actor.impulse();
            }
            entry.actor.advance();
        }

        // 3. Scroll obstacles, mark collisions and clearances.
        let mut fates: Vec<Option<Fate>> = vec![None; self.roster.len()];
        let mut cleared = false;
        for obstacle in &mut self.obstacles {
            obstacle.advance();
            for (entry, fate) in self.roster.iter_mut().zip(fates.iter_mut()) {
                if fate.is_none() && collision::collides(&entry.actor, obstacle, self.masks) {
                    entry.fitness += COLLISION_PENALTY;
                    *fate = Some(Fate::Collided);
                }
                if !obstacle.passed && obstacle.x < entry.actor.x {
                    obstacle.passed = true;
                    cleared = true;
                }
            }
        }

        // 4. Cohort reward and replacement obstacle.
        if cleared {
            self.score += 1;
            for (entry, _) in self.roster.iter_mut().zip(&fates).filter(|(_, fate)| fate.is_none()) {
                entry.fitness += CLEARANCE_REWARD;
            }
            self.spawn_obstacle();
        }
        self.obstacles.retain(|obstacle| !obstacle.is_off_screen());

        // 5. Ground and ceiling.
        for (entry, fate) in self.roster.iter().zip(fates.iter_mut()) {
            if fate.is_none() {
                *fate = collision::out_of_bounds(&entry.actor).map(|boundary| match boundary {
                    Boundary::Ground => Fate::Grounded,
                    Boundary::Ceiling => Fate::Escaped,
                });
            }
        }

        // 6. Scroll the ground.
        self.ground.advance();

        // 7. Sweep eliminated entries in one order-preserving pass.
        self.sweep(fates);
        if self.roster.is_empty() {
            self.conclude(EvaluatorState::GenerationDone);
        }
        self.state
    }

    /// Ticks until the generation ends or `max_ticks` more ticks have run,
    /// in which case the generation is halted.
    pub fn run_to_completion(&mut self, max_ticks: u64) -> EvaluatorState {
        let mut budget = max_ticks;
        while self.is_running() && budget > 0 {
            self.tick();
            budget -= 1;
        }
        if self.is_running() {
            self.halt();
        }
        self.state
    }

    /// Stops a running generation between ticks. Survivors keep their fitness.
    pub fn halt(&mut self) {
        if !self.is_running() {
            return;
        }
        let ticks = self.ticks;
        self.results.extend(self.roster.drain(..).map(|entry| AgentResult {
            agent: entry.agent,
            fitness: entry.fitness,
            fate: Fate::Survived,
            ticks_survived: ticks,
        }));
        self.conclude(EvaluatorState::Halted);
    }

    pub fn finish(mut self) -> GenerationReport {
        self.halt();
        GenerationReport {
            generation: self.started_at,
            next_generation: self.generation,
            score: self.score,
            ticks: self.ticks,
            state: self.state,
            results: self.results,
        }
    }

    pub fn frame(&self) -> RenderFrame {
        RenderFrame {
            actors: self
                .roster
                .iter()
                .map(|entry| ActorView {
                    agent: entry.agent,
                    x: entry.actor.x,
                    y: entry.actor.y,
                    rotation: entry.actor.rotation,
                    frame: entry.actor.frame(),
                })
                .collect(),
            obstacles: self
                .obstacles
                .iter()
                .map(|obstacle| ObstacleView {
                    x: obstacle.x,
                    top_edge: obstacle.top_edge,
                    bottom_edge: obstacle.bottom_edge,
                })
                .collect(),
            ground: self.ground.offsets(),
            score: self.score,
            generation: self.generation,
            alive: self.roster.len(),
        }
    }

    fn spawn_obstacle(&mut self) {
        self.obstacles.push(Obstacle::spawn(OBSTACLE_SPAWN_X, &mut self.rng));
    }

    fn sweep(&mut self, fates: Vec<Option<Fate>>) {
        let ticks = self.ticks;
        let (eliminated, survivors): (Vec<_>, Vec<_>) = self
            .roster
            .drain(..)
            .zip(fates)
            .partition(|(_, fate)| fate.is_some());

        self.results.extend(eliminated.into_iter().filter_map(|(entry, fate)| {
            fate.map(|fate| AgentResult {
                agent: entry.agent,
                fitness: entry.fitness,
                fate,
                ticks_survived: ticks,
            })
        }));
        self.roster = survivors.into_iter().map(|(entry, _)| entry).collect();
    }

    fn conclude(&mut self, state: EvaluatorState) {
        self.state = state;
        self.generation += 1;
        debug!(
            generation = self.started_at,
            score = self.score,
            ticks = self.ticks,
            ?state,
            "generation ended"
        );
    }
}

// --- Configuration ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossoverType {
    SinglePoint,
    Uniform,
}

#[derive(Debug, Clone, Resource, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    pub population_size: usize,
    pub num_generations: u32,
    pub tournament_size: usize, // For tournament selection
    pub elitism_count: usize, // Number of elite individuals to carry over
    pub mutation_rate_per_gene: f64,
    pub mutation_rate_per_individual: f64, // Chance an individual undergoes any mutation at all
    pub mutation_power: f32, // Standard deviation of a gene perturbation
    pub crossover_type: CrossoverType,
    pub fitness_threshold: f64, // Evolution stops once the best agent reaches this
    pub max_ticks_per_generation: u64,
    pub headless_ticks_per_update: u64,
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            population_size: 50,
            num_generations: 50,
            tournament_size: 3,
            elitism_count: 2,
            mutation_rate_per_gene: 0.2,
            mutation_rate_per_individual: 0.8,
            mutation_power: 0.5,
            crossover_type: CrossoverType::Uniform,
            fitness_threshold: 100.0,
            max_ticks_per_generation: 20_000,
            headless_ticks_per_update: 2_000,
            seed: None,
        }
    }
}

impl SimulationConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }

    pub fn load(path: &Path) -> Result<Self, EvoError> {
        let source = std::fs::read_to_string(path).map_err(|source| EvoError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&source).map_err(|source| EvoError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EvoError> {
        let invalid = |reason: String| Err(EvoError::InvalidConfig(reason));
        if self.population_size == 0 {
            return invalid("population_size must be at least 1".into());
        }
        if self.tournament_size == 0 {
            return invalid("tournament_size must be at least 1".into());
        }
        if self.elitism_count >= self.population_size {
            return invalid(format!(
                "elitism_count ({}) must be smaller than population_size ({})",
                self.elitism_count, self.population_size
            ));
        }
        for (name, rate) in [
            ("mutation_rate_per_gene", self.mutation_rate_per_gene),
            ("mutation_rate_per_individual", self.mutation_rate_per_individual),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return invalid(format!("{} must be within [0, 1], got {}", name, rate));
            }
        }
        if !(self.mutation_power.is_finite() && self.mutation_power > 0.0) {
            return invalid(format!("mutation_power must be positive, got {}", self.mutation_power));
        }
        if self.max_ticks_per_generation == 0 || self.headless_ticks_per_update == 0 {
            return invalid("tick budgets must be at least 1".into());
        }
        Ok(())
    }
}

// Inspection used by the tests; the engine only reads frames and reports.
#[cfg(test)]
impl<C, R> GenerationEvaluator<C, R> {
    fn state(&self) -> EvaluatorState {
        self.state
    }

    fn generation(&self) -> u32 {
        self.generation
    }

    fn score(&self) -> u32 {
        self.score
    }

    fn alive(&self) -> usize {
        self.roster.len()
    }

    fn roster(&self) -> &[RosterEntry<C>] {
        &self.roster
    }

    fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }
}

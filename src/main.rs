mod collision;
mod controller;
mod error;
mod evolution;
mod organism;
mod phylogeny;
mod physics;
mod simulation;
mod visualization;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use bevy::{app::{AppExit, ScheduleRunnerPlugin}, log::LogPlugin, prelude::*, window::PresentMode};
use bevy_egui::{egui, EguiContexts, EguiPlugin};
use clap::Parser;

use evolution::EvolutionEngine;
use phylogeny::write_phylogeny_to_dot_file;
use physics::{TICK_RATE_HZ, WIN_HEIGHT, WIN_WIDTH};
use simulation::SimulationConfig;
use visualization::*;

#[derive(Parser, Debug)]
#[command(name = "flappy_evo", about = "Evolves neural controllers for a side-scrolling flapping game")]
struct Cli {
    /// Train without a window and exit when evolution finishes
    #[arg(long)]
    headless: bool,

    /// TOML file overriding the default evolution settings
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    generations: Option<u32>,

    #[arg(long)]
    population: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    /// Where the lineage graph is written
    #[arg(long, default_value = "phylogeny.dot")]
    phylogeny: PathBuf,
}

// --- Bevy App Setup ---

// Resource to manage the main evolution engine
#[derive(Resource)]
struct EvoResource(EvolutionEngine);

#[derive(Resource)]
struct PhylogenyPath(PathBuf);

#[derive(Resource)]
struct ConfigSource(String);

// Enum to define the simulation mode
#[derive(States, Debug, Clone, PartialEq, Eq, Hash, Default)]
enum SimulationMode {
    #[default]
    Paused,
    Watching, // One tick per fixed step, rendered
    RunningFast, // Whole generations per frame
}

// Resource for simulation speed control
#[derive(Resource)]
pub struct SimulationSpeed(pub f32);

impl Default for SimulationSpeed {
    fn default() -> Self {
        SimulationSpeed(1.0)
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<(SimulationConfig, String)> {
    let (mut config, source) = match &cli.config {
        Some(path) => {
            let config = SimulationConfig::load(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?;
            (config, path.display().to_string())
        }
        None => (SimulationConfig::default(), "defaults".to_string()),
    };

    if let Some(generations) = cli.generations {
        config.num_generations = generations;
    }
    if let Some(population) = cli.population {
        config.population_size = population;
    }
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    config.validate().context("command-line overrides produced an invalid configuration")?;
    Ok((config, source))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (config, source) = load_config(&cli)?;
    let engine = EvolutionEngine::new(config.clone());

    let mut app = App::new();
    app.insert_resource(config)
        .insert_resource(EvoResource(engine))
        .insert_resource(PhylogenyPath(cli.phylogeny))
        .insert_resource(ConfigSource(source))
        .add_systems(Startup, log_startup);

    if cli.headless {
        app.add_plugins(MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::ZERO)))
            .add_plugins(LogPlugin::default())
            .add_systems(Update, run_headless_batch);
    } else {
        app.add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "Flappy Evolution".into(),
                resolution: (WIN_WIDTH, WIN_HEIGHT).into(),
                resizable: false,
                present_mode: PresentMode::AutoVsync,
                ..default()
            }),
            ..default()
        }))
        .add_plugins(EguiPlugin)
        .add_state::<SimulationMode>()
        .init_resource::<SimulationSpeed>()
        .init_resource::<LatestFrame>()
        // One evaluator tick per fixed step
        .insert_resource(Time::<Fixed>::from_hz(TICK_RATE_HZ))
        .add_systems(Startup, (setup_graphics, setup_sprite_textures))
        .add_systems(
            FixedUpdate,
            step_watched_generation.run_if(in_state(SimulationMode::Watching)),
        )
        .add_systems(
            Update,
            (
                keyboard_controls,
                run_fast_generations.run_if(in_state(SimulationMode::RunningFast)),
                update_latest_frame,
                draw_scene,
            )
                .chain(),
        )
        .add_systems(Update, ui_system_info_panel)
        .add_systems(Update, apply_simulation_speed); // System to apply speed to Time<Virtual>
    }

    app.run();
    Ok(())
}

fn log_startup(config: Res<SimulationConfig>, source: Res<ConfigSource>) {
    info!(
        source = %source.0,
        population = config.population_size,
        generations = config.num_generations,
        seed = ?config.seed,
        "configuration loaded"
    );
}

fn export_phylogeny(engine: &EvolutionEngine, path: &PhylogenyPath) {
    if let Err(e) = write_phylogeny_to_dot_file(engine, &path.0) {
        warn!("Failed to write phylogeny file {}: {}", path.0.display(), e);
    }
}

// --- Headless ---

// Runs a bounded batch of ticks per update so the app can only exit between ticks.
fn run_headless_batch(
    mut evo_res: ResMut<EvoResource>,
    config: Res<SimulationConfig>,
    path: Res<PhylogenyPath>,
    mut exit: EventWriter<AppExit>,
    mut done: Local<bool>,
) {
    if *done {
        return;
    }
    let engine = &mut evo_res.0;
    engine.advance(config.headless_ticks_per_update);

    if engine.is_finished() {
        if let Some(best) = &engine.all_time_best_individual {
            info!(id = best.id, fitness = best.fitness, generation = best.generation, "training complete");
        }
        export_phylogeny(engine, &path);
        *done = true;
        exit.send(AppExit);
    }
}

// --- Windowed ---

fn step_watched_generation(
    mut evo_res: ResMut<EvoResource>,
    mut next_sim_mode: ResMut<NextState<SimulationMode>>,
) {
    let engine = &mut evo_res.0;
    engine.advance(1);
    if engine.is_finished() {
        info!("Evolution finished. Switching to Paused.");
        next_sim_mode.set(SimulationMode::Paused);
    }
}

fn run_fast_generations(
    mut evo_res: ResMut<EvoResource>,
    mut next_sim_mode: ResMut<NextState<SimulationMode>>,
) {
    let engine = &mut evo_res.0;
    if engine.run_generation().is_none() || engine.is_finished() {
        info!("Evolution finished. Switching to Paused.");
        next_sim_mode.set(SimulationMode::Paused);
    }
}

fn update_latest_frame(evo_res: Res<EvoResource>, mut latest: ResMut<LatestFrame>) {
    if let Some(frame) = evo_res.0.frame() {
        if latest.0 != frame {
            latest.0 = frame;
        }
    }
}

fn keyboard_controls(
    mut next_sim_mode: ResMut<NextState<SimulationMode>>,
    current_sim_mode: Res<State<SimulationMode>>,
    keyboard_input: Res<Input<KeyCode>>,
    mut evo_res: ResMut<EvoResource>,
    mut latest: ResMut<LatestFrame>,
    path: Res<PhylogenyPath>,
) {
    if keyboard_input.just_pressed(KeyCode::Space) {
        match *current_sim_mode.get() {
            SimulationMode::Paused => next_sim_mode.set(SimulationMode::Watching),
            _ => next_sim_mode.set(SimulationMode::Paused),
        }
    }

    if keyboard_input.just_pressed(KeyCode::F) {
        if *current_sim_mode.get() != SimulationMode::RunningFast {
            info!("Switching to RunningFast mode.");
            next_sim_mode.set(SimulationMode::RunningFast);
        } else {
            next_sim_mode.set(SimulationMode::Watching);
        }
    }

    if keyboard_input.just_pressed(KeyCode::P) {
        export_phylogeny(&evo_res.0, &path);
    }

    if keyboard_input.just_pressed(KeyCode::R) {
        evo_res.0.reset();
        *latest = LatestFrame::default();
        next_sim_mode.set(SimulationMode::Paused);
    }
}

fn apply_simulation_speed(sim_speed: Res<SimulationSpeed>, mut time: ResMut<Time<Virtual>>) {
    if sim_speed.is_changed() {
        time.set_relative_speed(sim_speed.0);
    }
}

fn ui_system_info_panel(
    mut contexts: EguiContexts,
    mut evo_res: ResMut<EvoResource>,
    sim_mode: Res<State<SimulationMode>>,
    config: Res<SimulationConfig>,
    mut latest: ResMut<LatestFrame>,
    path: Res<PhylogenyPath>,
    mut next_sim_mode: ResMut<NextState<SimulationMode>>,
    mut sim_speed: ResMut<SimulationSpeed>,
) {
    let frame = latest.0.clone();
    egui::Window::new("Simulation Info & Controls").show(contexts.ctx_mut(), |ui| {
        ui.label(format!("Current Mode: {:?}", sim_mode.get()));
        ui.separator();
        ui.label(format!("Score: {}", frame.score));
        ui.label(format!("Generation: {} / {}", frame.generation, config.num_generations));
        ui.label(format!("Alive: {}", frame.alive));
        if let Some(report) = evo_res.0.last_report() {
            ui.label(format!(
                "Last Gen {}: best {:.2}, score {}",
                report.generation,
                report.best_fitness(),
                report.score
            ));
        }
        if let Some(best_overall) = &evo_res.0.all_time_best_individual {
            ui.label(format!("All-Time Best Fitness: {:.2} (Gen {})", best_overall.fitness, best_overall.generation));
        }
        if evo_res.0.is_finished() {
            ui.colored_label(egui::Color32::from_rgb(255, 100, 100), "Evolution finished");
        }

        ui.separator();
        ui.heading("Controls (Keyboard):");
        ui.label("Space - Watch / Pause");
        ui.label("F - Toggle Fast Mode");
        ui.label("P - Export Phylogeny (.dot file)");
        ui.label("R - Reset Simulation");

        ui.separator();
        ui.horizontal(|ui| {
            if ui.button("Watch").clicked() {
                next_sim_mode.set(SimulationMode::Watching);
            }
            if ui.button("Run Fast").clicked() {
                next_sim_mode.set(SimulationMode::RunningFast);
            }
            if ui.button("Pause").clicked() {
                next_sim_mode.set(SimulationMode::Paused);
            }
        });
        if ui.button("Export Phylogeny Tree (.dot)").clicked() {
            export_phylogeny(&evo_res.0, &path);
        }
        if ui.button("Reset Simulation").clicked() {
            evo_res.0.reset();
            *latest = LatestFrame::default();
            next_sim_mode.set(SimulationMode::Paused);
        }

        ui.separator();
        ui.label("Simulation Speed (Watching Only):");
        ui.add(egui::Slider::new(&mut sim_speed.0, 0.1..=5.0).text("Speed Factor"));
    });
}

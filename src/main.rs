use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use log::info;

mod analyze;
mod assign;
mod engine;
mod fitness;
mod orders;
mod prepare;
mod render;
mod setup;

/// Assigns weaving work orders to the loom fleet with an evolutionary
/// scheduler and writes the resulting timelines and run statistics.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Order table: CSV with the ERP export columns (siparisId,
    /// siparisDetayId, hamMiktar, hamTermin, atkiSikligi, tipAd,
    /// varyantKodu, UlakKodu).
    orders: PathBuf,

    /// Quick run: population 20 and 50 generations unless overridden.
    #[arg(long)]
    test: bool,

    /// Number of looms in the fleet.
    #[arg(short, long, default_value_t = 10)]
    machines: usize,

    /// Population size (defaults to 50, or 20 with --test).
    #[arg(short, long)]
    population: Option<usize>,

    /// Generation count (defaults to 100, or 50 with --test).
    #[arg(short, long)]
    generations: Option<usize>,

    /// Crossover probability per consecutive parent pair.
    #[arg(long, default_value_t = 0.8)]
    cxpb: f64,

    /// Mutation probability per offspring.
    #[arg(long, default_value_t = 0.2)]
    mutpb: f64,

    /// Per-position swap probability inside crossover.
    #[arg(long, default_value_t = 0.8)]
    indpb_cx: f64,

    /// Per-position swap probability inside mutation.
    #[arg(long, default_value_t = 0.05)]
    indpb_mut: f64,

    /// Tournament size for parent selection.
    #[arg(long, default_value_t = 10)]
    tournament: usize,

    /// Objective weights on makespan, balance, and setup changes.
    #[arg(
        long,
        num_args = 3,
        value_names = ["TIME", "BALANCE", "CHANGES"],
        default_values_t = [-2.0, -3.0, -10.0],
        allow_negative_numbers = true
    )]
    weights: Vec<f64>,

    /// RNG seed; drawn from the OS and logged when omitted.
    #[arg(long)]
    seed: Option<u64>,

    /// Weft insertions per minute at the reed.
    #[arg(long, default_value_t = 450.0)]
    atki_devir: f64,

    /// Loom efficiency factor.
    #[arg(long, default_value_t = 0.85)]
    randiman: f64,

    /// Minimum meters a split part may carry.
    #[arg(long, default_value_t = 500.0)]
    min_split: f64,

    /// Maximum parts an order may be split into.
    #[arg(long, default_value_t = 10)]
    max_splits: usize,

    /// Where to write the per-machine schedule.
    #[arg(long, default_value = "schedule.json")]
    schedule_out: PathBuf,

    /// Where to write the run statistics.
    #[arg(long, default_value = "stats.json")]
    stats_out: PathBuf,

    /// Render the schedule to an SVG file next to the schedule JSON.
    #[arg(long)]
    svg: bool,

    /// Open the rendered SVG if created.
    #[arg(long)]
    open: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let raw = orders::read_orders(&cli.orders)
        .with_context(|| format!("reading {}", cli.orders.display()))?;
    info!("{} order lines inside the scheduling window", raw.len());

    let loom_params = prepare::LoomParams {
        atki_devir: cli.atki_devir,
        randiman: cli.randiman,
        min_split: cli.min_split,
        max_splits: cli.max_splits,
        ..prepare::LoomParams::default()
    };
    let items = prepare::prepare(&raw, chrono::Local::now().naive_local(), &loom_params);
    info!("{} work items prepared", items.len());

    let engine_params = engine::EngineParams {
        machines: cli.machines,
        population_size: cli.population.unwrap_or(if cli.test { 20 } else { 50 }),
        generations: cli.generations.unwrap_or(if cli.test { 50 } else { 100 }),
        cxpb: cli.cxpb,
        mutpb: cli.mutpb,
        indpb_cx: cli.indpb_cx,
        indpb_mut: cli.indpb_mut,
        tournament_size: cli.tournament,
        weights: fitness::ObjectiveWeights {
            time: cli.weights[0],
            balance: cli.weights[1],
            changes: cli.weights[2],
        },
        seed: cli.seed,
    };
    let result = engine::Engine::new(&items, engine_params).run();

    write_json(&cli.schedule_out, &result.machines)?;
    write_json(&cli.stats_out, &result.stats)?;
    info!(
        "schedule written to {}, statistics to {}",
        cli.schedule_out.display(),
        cli.stats_out.display(),
    );

    if cli.svg {
        let svg_path = cli.schedule_out.with_extension("svg");
        std::fs::write(&svg_path, render::render_schedule(&result.machines))
            .with_context(|| format!("writing {}", svg_path.display()))?;
        info!("schedule rendered to {}", svg_path.display());
        if cli.open {
            open::that(&svg_path)
                .with_context(|| format!("opening {}", svg_path.display()))?;
        }
    }
    Ok(())
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)
        .with_context(|| format!("writing {}", path.display()))
}

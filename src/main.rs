use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tyre_strategy::analytics::{self, GapRequest};
use tyre_strategy::data::{normalize, NormalizedSession, RawLapTable, SessionMeta};
use tyre_strategy::pipeline;
use tyre_strategy::store::{DirStore, SessionStore};
use tyre_strategy::strategy::{self, DriverProfile, PlanContext, StintScenario};
use tyre_strategy::{Compound, DegradationModel, PipelineConfig};

#[derive(Debug, Parser)]
#[clap(
    name = "tyre-strategy",
    version,
    about = "Tyre degradation model and race analytics from lap timing data"
)]
struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[clap(short, long, global = true)]
    verbose: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Train the degradation model from the sessions in a config file
    Train(TrainArgs),
    /// Simulate stints (and optionally whole race plans) with a trained model
    Simulate(SimulateArgs),
    /// Cumulative gaps to a reference driver for one session
    Gaps(GapsArgs),
    /// Stints, tyre usage and summary figures for one session
    Stints(StintsArgs),
}

#[derive(Debug, Args)]
struct TrainArgs {
    /// JSON pipeline configuration
    #[clap(short, long)]
    config: PathBuf,

    /// Where to write the model artifact
    #[clap(short, long, default_value = "models/tyre_model.json")]
    out: PathBuf,

    /// Directory used to keep copies of the session tables
    #[clap(long)]
    store: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct SimulateArgs {
    #[clap(short, long)]
    model: PathBuf,

    #[clap(long)]
    track: String,

    #[clap(long)]
    driver: String,

    #[clap(long)]
    team: String,

    /// Compounds to compare
    #[clap(long, value_delimiter = ',', default_values = &["SOFT", "MEDIUM", "HARD"])]
    compounds: Vec<String>,

    #[clap(long, default_value = "1")]
    min_laps: u32,

    #[clap(long, default_value = "25")]
    max_laps: u32,

    /// Race laps already run when the stint starts
    #[clap(long, default_value = "10")]
    start_lap: u32,

    /// average, contender or rookie
    #[clap(long, default_value = "average")]
    profile: String,

    /// Also rank one- and two-stop plans over this race distance
    #[clap(long)]
    race_laps: Option<u32>,

    #[clap(long, default_value = "21.0")]
    pit_loss: f64,
}

#[derive(Debug, Args)]
struct SessionArgs {
    /// CSV lap table
    #[clap(short, long)]
    laps: PathBuf,

    #[clap(long, default_value = "0")]
    season: u16,

    #[clap(long, default_value = "session")]
    event: String,
}

#[derive(Debug, Args)]
struct GapsArgs {
    #[clap(flatten)]
    session: SessionArgs,

    /// Drivers to compare, e.g. VER,LEC
    #[clap(long, value_delimiter = ',')]
    drivers: Vec<String>,

    #[clap(long)]
    reference: Option<String>,
}

#[derive(Debug, Args)]
struct StintsArgs {
    #[clap(flatten)]
    session: SessionArgs,

    #[clap(long, default_value = "3")]
    min_stint_length: u32,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Train(args) => handle_train(args),
        Command::Simulate(args) => handle_simulate(args),
        Command::Gaps(args) => handle_gaps(args),
        Command::Stints(args) => handle_stints(args),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    serde_json::to_writer_pretty(io::stdout().lock(), value).context("failed to write output")?;
    println!();
    Ok(())
}

fn load_session(args: &SessionArgs) -> Result<NormalizedSession> {
    let table = RawLapTable::from_path(&args.laps)
        .with_context(|| format!("failed to read lap table {}", args.laps.display()))?;
    let session = normalize(&table, &SessionMeta::new(args.season, &args.event))
        .with_context(|| format!("failed to normalize {}", args.laps.display()))?;
    if session.dropped_rows > 0 {
        warn!(dropped = session.dropped_rows, "dropped unusable rows");
    }
    Ok(session)
}

fn handle_train(args: TrainArgs) -> Result<()> {
    let cfg = PipelineConfig::from_path(&args.config)
        .with_context(|| format!("failed to read config {}", args.config.display()))?;
    let mut store = args.store.as_ref().map(DirStore::new);
    let (model, loaded) = pipeline::train_from_config(
        &cfg,
        store.as_mut().map(|s| s as &mut dyn SessionStore),
    )?;
    for s in &loaded.skipped {
        warn!(season = s.season, event = %s.event, reason = %s.reason, "session skipped");
    }
    let meta_path = model
        .save(&args.out)
        .with_context(|| format!("failed to save model to {}", args.out.display()))?;
    info!(model = %args.out.display(), metadata = %meta_path.display(), "done");
    print_json(model.metadata())
}

#[derive(Serialize)]
struct SimulationOutput {
    compounds: Vec<strategy::DegradationCurve>,
    plans: Vec<strategy::PlanOutcome>,
}

fn handle_simulate(args: SimulateArgs) -> Result<()> {
    let model = DegradationModel::load(&args.model)
        .with_context(|| format!("failed to load model {}", args.model.display()))?;
    let profile: DriverProfile = args.profile.parse()?;
    let compounds: Vec<Compound> = args.compounds.iter().map(|c| Compound::parse(c)).collect();
    let first = *compounds.first().ok_or_else(|| anyhow!("no compounds given"))?;

    let scenario = StintScenario {
        compound: first,
        min_laps: args.min_laps,
        max_laps: args.max_laps,
        start_lap: args.start_lap,
        track_id: args.track.clone(),
        driver_id: args.driver.clone(),
        team_id: args.team.clone(),
        profile,
    };
    let curves = strategy::compare_compounds(&model, &scenario, &compounds)?;
    for c in &curves {
        if let Some(o) = c.full_stint() {
            info!(
                compound = %c.compound,
                total = o.total_time,
                per_lap = c.degradation_per_lap,
                cliff = ?c.cliff_lap,
                "stint"
            );
        }
    }

    let plans = match args.race_laps {
        Some(laps) => {
            let ctx = PlanContext {
                track_id: args.track,
                driver_id: args.driver,
                team_id: args.team,
                profile,
                pit_loss: args.pit_loss,
                start_lap: 0,
            };
            strategy::rank_plans(&model, &ctx, &strategy::standard_plans(laps))?
        }
        None => Vec::new(),
    };
    print_json(&SimulationOutput {
        compounds: curves,
        plans,
    })
}

fn handle_gaps(args: GapsArgs) -> Result<()> {
    let session = load_session(&args.session)?;
    let request = GapRequest {
        drivers: args.drivers,
        reference: args.reference,
    };
    let report = analytics::compute_gaps(&session.laps, &request)?;
    print_json(&report)
}

#[derive(Serialize)]
struct StintsOutput {
    stints: Vec<analytics::Stint>,
    strategies: Vec<analytics::StrategyStats>,
    summary: Option<analytics::RaceSummary>,
}

fn handle_stints(args: StintsArgs) -> Result<()> {
    let session = load_session(&args.session)?;
    let stints = analytics::aggregate_stints(&session.laps, args.min_stint_length);
    let strategies = analytics::strategy_stats(&stints);
    let summary = analytics::race_summary(&session.laps);
    if let Some(s) = &summary {
        info!(
            fastest = %analytics::format_lap_time(s.fastest_lap.seconds),
            driver = %s.fastest_lap.driver_id,
            "fastest lap"
        );
    }
    print_json(&StintsOutput {
        stints,
        strategies,
        summary,
    })
}

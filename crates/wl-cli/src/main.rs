mod session;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use wl_core::Settings;
use wl_store::{StateStore, load_settings, load_settings_or_default};

use session::{PinSpec, Session, SessionOptions};

#[derive(Parser)]
#[command(name = "wl", about = "World-locking engine driver")]
struct Cli {
    /// Settings file (TOML); defaults to settings.toml in the data directory
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulated session: walk, stabilize, autosave
    Simulate {
        /// Number of frames to run
        #[arg(long, default_value_t = 600)]
        frames: usize,

        /// Seconds per frame
        #[arg(long, default_value_t = 1.0 / 30.0)]
        dt: f64,

        /// Seed for the drift random walk
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Radius of the circular walk in meters (0 stands still)
        #[arg(long, default_value_t = 3.0)]
        radius: f64,

        /// Walking speed in meters per second
        #[arg(long, default_value_t = 1.0)]
        speed: f64,

        /// Per-frame translational drift in meters
        #[arg(long, default_value_t = 0.0005)]
        drift: f64,

        /// Per-frame rotational drift in radians
        #[arg(long, default_value_t = 0.0001)]
        drift_rotation: f64,

        /// Yaw of the tracker origin for this session, radians
        #[arg(long, default_value_t = 0.0)]
        origin_yaw: f64,

        /// Alignment pin as name:mx,my,mz:lx,ly,lz (repeatable)
        #[arg(long = "pin")]
        pins: Vec<PinSpec>,

        /// Start clean instead of loading persisted state
        #[arg(long)]
        no_load: bool,
    },

    /// Show persisted state statistics
    Stats,

    /// Export persisted state to a JSON file
    Export {
        /// Output file path
        path: PathBuf,
    },

    /// Delete all persisted state
    Reset,
}

fn open_store() -> Result<StateStore> {
    let base_dir = std::env::var("WL_DATA_DIR").ok().map(PathBuf::from);
    StateStore::open(base_dir.as_deref()).context("failed to open state store")
}

fn resolve_settings(cli: &Cli, store: &StateStore) -> Result<Settings> {
    match &cli.config {
        Some(path) => load_settings(path)
            .with_context(|| format!("failed to load settings from {}", path.display())),
        None => load_settings_or_default(&store.settings_path()).context("failed to load settings"),
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Simulate {
            frames,
            dt,
            seed,
            radius,
            speed,
            drift,
            drift_rotation,
            origin_yaw,
            pins,
            no_load,
        } => {
            let opts = SessionOptions {
                frames: *frames,
                dt: *dt,
                seed: *seed,
                radius: *radius,
                speed: *speed,
                drift_meters: *drift,
                drift_radians: *drift_rotation,
                pins: pins.clone(),
            };
            cmd_simulate(&cli, opts, *origin_yaw, *no_load).await
        }
        Commands::Stats => cmd_stats(),
        Commands::Export { path } => cmd_export(path),
        Commands::Reset => cmd_reset(),
    }
}

async fn cmd_simulate(
    cli: &Cli,
    opts: SessionOptions,
    origin_yaw: f64,
    no_load: bool,
) -> Result<()> {
    if opts.dt <= 0.0 {
        bail!("--dt must be positive");
    }
    let store = open_store()?;
    let settings = resolve_settings(cli, &store)?;
    tracing::info!(dir = %store.dir().display(), frames = opts.frames, "starting simulation");

    let mut session = Session::open(store, settings, origin_yaw);
    if !no_load {
        session.start_load();
    }
    let report = session.run(&opts).await.context("simulation failed")?;

    println!("frames:     {}", report.frames);
    println!(
        "outcomes:   stabilized={}, paused={}, loading={}",
        report.stabilized, report.paused, report.loading
    );
    println!("loaded:     {}", if report.loaded { "yes" } else { "no" });
    println!("anchors:    {}", report.anchors);
    println!("edges:      {}", report.edges);
    println!("fragments:  {}", report.fragments);
    println!("pins:       {}", report.pins);
    println!("saves:      {} ({} failed)", report.saves, report.save_failures);
    println!("max_error:  {:.6}m", report.max_error);
    let p = report.adjustment.position;
    println!("adjustment: ({:.3}, {:.3}, {:.3})", p.x, p.y, p.z);
    if !report.status.is_empty() {
        println!("status:     {}", report.status);
    }
    Ok(())
}

fn cmd_stats() -> Result<()> {
    let store = open_store()?;
    let state = store
        .load_state()
        .context("failed to load persisted state")?
        .unwrap_or_default();
    let platform = store
        .load_platform()
        .context("failed to load platform anchors")?
        .unwrap_or_default();
    let sizes = store.stats();
    let kb = |bytes: Option<u64>| bytes.unwrap_or(0) as f64 / 1024.0;

    println!("dir:        {}", store.dir().display());
    println!("anchors:    {}", state.anchors.frozen_anchors.len());
    println!("edges:      {}", state.anchors.frozen_edges.len());
    println!("pins:       {}", state.alignment.pins.len());
    println!("platform:   {}", platform.len());
    println!(
        "size:       anchors={:.1}KB, alignment={:.1}KB, platform={:.1}KB",
        kb(sizes.anchors_bytes),
        kb(sizes.alignment_bytes),
        kb(sizes.platform_bytes),
    );
    match store.anchors_timestamp() {
        Some(ts) => println!("saved_at:   {ts}"),
        None => println!("saved_at:   never"),
    }
    Ok(())
}

fn cmd_export(path: &Path) -> Result<()> {
    let store = open_store()?;
    let Some(state) = store.load_state().context("failed to load persisted state")? else {
        bail!("no persisted state in {}", store.dir().display());
    };
    let platform = store
        .load_platform()
        .context("failed to load platform anchors")?
        .unwrap_or_default();

    let export = serde_json::json!({
        "anchors": state.anchors,
        "alignment": state.alignment,
        "platform": platform,
    });
    let json = serde_json::to_string_pretty(&export).context("failed to serialize state")?;
    std::fs::write(path, &json).with_context(|| format!("failed to write {}", path.display()))?;

    println!("exported to {}", path.display());
    Ok(())
}

fn cmd_reset() -> Result<()> {
    let store = open_store()?;
    store.reset().context("failed to remove persisted state")?;
    println!("removed persisted state from {}", store.dir().display());
    Ok(())
}

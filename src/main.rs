use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use moldflow_sweep::prelude::*;
use moldflow_sweep::properties::ResultRequest;
use moldflow_sweep::settings::DEFAULT_MOLDFLOW_BIN;

#[derive(Parser)]
#[command(name = "moldflow-sweep", version, about = "Build plate models and run Moldflow filling simulations")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build every model and run its studies in Moldflow
    Run(RunArgs),
    /// Only export the STL of every model
    Geometry {
        config: PathBuf,
        #[arg(short, long, env = "SWEEP_OUTPUT", default_value = "data")]
        output: PathBuf,
    },
    /// Mesh STL files that already exist below a directory, one project each
    Mesh(MeshArgs),
    /// Write a random sweep configuration
    Generate {
        #[arg(short, long, default_value = "random_models.json")]
        output: PathBuf,
        #[arg(long, default_value_t = 50)]
        models: usize,
        #[arg(long, default_value_t = 10)]
        locations: usize,
        #[arg(long, default_value_t = 1)]
        holes: usize,
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Sweep configuration (JSON object keyed by model name)
    config: PathBuf,
    #[arg(short, long, env = "SWEEP_OUTPUT", default_value = "data")]
    output: PathBuf,
    #[arg(long, env = "MOLDFLOW_BIN", default_value = DEFAULT_MOLDFLOW_BIN)]
    moldflow_bin: PathBuf,
    #[arg(long, env = "SYNERGY_SCRIPT_HOST", default_value = "cscript")]
    script_host: String,
    #[arg(long, value_enum, default_value_t = ExistingDirPolicy::Abort)]
    on_existing_dir: ExistingDirPolicy,
    #[arg(long, value_enum, default_value_t = MissingResultPolicy::Warn)]
    on_missing_result: MissingResultPolicy,
    #[arg(long, value_enum, default_value_t = UnitSystem::Metric)]
    units: UnitSystem,
    /// Mesh type of the imported geometry
    #[arg(long, value_enum, default_value_t = MeshType::ThreeD)]
    mesh_type: MeshType,
    #[arg(long, default_value_t = 2.5)]
    edge_length: f64,
    #[arg(long, default_value_t = 50)]
    intermediate_results: u32,
    /// Maximum filled volume per fill step in percent (solver default if unset)
    #[arg(long)]
    max_filled_volume_per_step: Option<f64>,
    /// Result to extract as CODE=NAME; repeat for several (default: fill time, weld surface, weld line)
    #[arg(long = "result")]
    results: Vec<ResultRequest>,
    /// Record Synergy calls instead of running them and skip the solver;
    /// files go to a scratch directory
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct MeshArgs {
    /// Directory searched recursively for `.stl` files
    root: PathBuf,
    #[arg(long, env = "SYNERGY_SCRIPT_HOST", default_value = "cscript")]
    script_host: String,
    #[arg(long, value_enum, default_value_t = UnitSystem::Metric)]
    units: UnitSystem,
    #[arg(long, value_enum, default_value_t = MeshType::ThreeD)]
    mesh_type: MeshType,
    #[arg(long, default_value_t = 5.0)]
    edge_length: f64,
}

impl RunArgs {
    fn settings(&self) -> SweepSettings {
        let mut settings = SweepSettings {
            moldflow_bin: self.moldflow_bin.clone(),
            output_root: self.output.clone(),
            on_existing_dir: self.on_existing_dir,
            on_missing_result: self.on_missing_result,
            units: self.units,
            mesh_type: self.mesh_type,
            edge_length: self.edge_length,
            intermediate_results: self.intermediate_results,
            max_filled_volume_per_step: self.max_filled_volume_per_step,
            ..SweepSettings::default()
        };
        if !self.results.is_empty() {
            settings.results = self.results.clone();
        }
        settings
    }
}

fn run(args: RunArgs) -> SweepResult<()> {
    let config = SweepConfig::load(&args.config)?;
    let mut settings = args.settings();
    if args.dry_run {
        settings = settings.for_dry_run()?;
        tracing::info!("Dry run, writing to {:?}", settings.output_root);
    }
    tracing::info!("Loaded {} models from {:?}", config.len(), args.config);

    let tools = MoldflowToolchain::new(&settings.moldflow_bin);
    let report = if args.dry_run {
        let mut session = RecordingSession::new();
        let report = SweepDriver::new(&settings, &mut session, &tools).run(&config)?;
        for call in &session.calls {
            tracing::info!("synergy: {}", call);
        }
        report
    } else {
        tools.verify()?;
        let mut session = ScriptSession::new(&args.script_host);
        SweepDriver::new(&settings, &mut session, &tools).run(&config)?
    };

    std::fs::create_dir_all(&settings.output_root)?;
    let report_path = settings.output_root.join("sweep_report.json");
    report.write(&report_path)?;
    tracing::info!("Sweep {} finished, report in {:?}", report.run_id, report_path);
    Ok(())
}

fn mesh(args: MeshArgs) -> SweepResult<()> {
    let settings = SweepSettings {
        units: args.units,
        mesh_type: args.mesh_type,
        edge_length: args.edge_length,
        ..SweepSettings::default()
    };
    let mut session = ScriptSession::new(&args.script_host);
    let meshed = mesh_existing_stl(&args.root, &settings, &mut session)?;
    tracing::info!("Meshed {} STL files", meshed.len());
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "moldflow_sweep=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Run(args) => run(args),
        Command::Mesh(args) => mesh(args),
        Command::Geometry { config, output } => SweepConfig::load(&config)
            .map_err(SweepError::from)
            .and_then(|config| {
                export_geometry(&config, &output, moldflow_sweep::geometry::DEFAULT_CIRCLE_SEGMENTS)
            })
            .map(|written| tracing::info!("Exported {} STL files", written.len())),
        Command::Generate {
            output,
            models,
            locations,
            holes,
            seed,
        } => {
            let options = GeneratorOptions {
                models,
                locations_per_model: locations,
                holes_per_model: holes,
                seed,
                ..GeneratorOptions::default()
            };
            random_config(&options)
                .map_err(SweepError::from)
                .and_then(|config| config.to_json_string().map_err(SweepError::from))
                .and_then(|json| std::fs::write(&output, json).map_err(SweepError::from))
                .map(|()| tracing::info!("Wrote {} models to {:?}", models, output))
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

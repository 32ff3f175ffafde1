use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;

use scenario_core::{
    load_engine_config_from_env, EngineConfig, SamplingMode, ScenarioEngine, ScenarioTable,
    StudyArea,
};
use scenario_schema::{KnobEdit, ScenarioInput};

#[derive(Parser, Debug)]
#[command(author, version, about = "Evaluate land-use scenarios for a study area", long_about = None)]
struct Args {
    /// Study area directory holding the baseline tables and models
    #[arg(long)]
    data: PathBuf,

    /// Scenario JSON mapping area ids to knobs (defaults to the baseline)
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Treat the scenario keys as parent-unit ids instead of area ids
    #[arg(long)]
    by_parent: bool,

    /// Engine config JSON (defaults to SCENARIO_ENGINE_CONFIG_PATH or the builtin)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured sampling mode
    #[arg(long, value_enum)]
    sampling_mode: Option<SamplingModeArg>,

    /// Sampling seed (defaults to the configured api_seed)
    #[arg(long, conflicts_with = "unseeded")]
    seed: Option<u64>,

    /// Draw from entropy instead of a fixed seed
    #[arg(long)]
    unseeded: bool,

    /// Apply an edit after the scenario (format: PARENT:knob=value, value may be `none`)
    #[arg(long = "edit")]
    edits: Vec<String>,

    /// Write the published records here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SamplingModeArg {
    SharedDraw,
    Independent,
}

impl From<SamplingModeArg> for SamplingMode {
    fn from(value: SamplingModeArg) -> Self {
        match value {
            SamplingModeArg::SharedDraw => SamplingMode::SharedDraw,
            SamplingModeArg::Independent => SamplingMode::Independent,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("Failed to load engine config {}", path.display()))?,
        None => {
            let (config, _) = load_engine_config_from_env();
            (*config).clone()
        }
    };
    if let Some(mode) = args.sampling_mode {
        config = config.with_sampling_mode(mode.into());
    }
    let seed = if args.unseeded {
        None
    } else {
        Some(args.seed.unwrap_or_else(|| config.api_seed()))
    };

    let study_area = Arc::new(
        StudyArea::from_dir(&args.data, Arc::new(config))
            .with_context(|| format!("Failed to load study area {}", args.data.display()))?,
    );

    let scenario = match &args.scenario {
        Some(path) => read_scenario(path)?,
        None => ScenarioInput::new(),
    };
    let baseline = Arc::clone(study_area.baseline());
    let table = if args.by_parent {
        ScenarioTable::from_parent_knobs(baseline, &scenario)
    } else {
        ScenarioTable::from_area_knobs(baseline, &scenario)
    }
    .with_context(|| "Scenario does not match the study area")?;

    let mut engine = ScenarioEngine::from_table(Arc::clone(&study_area), table, seed)
        .with_context(|| "Failed to evaluate scenario")?;

    for raw in &args.edits {
        let (parent, edit) = parse_edit(raw)?;
        let changed = engine
            .change(parent, edit)
            .with_context(|| format!("Edit '{raw}' failed"))?;
        info!(target: "scenario::cli", edit = %raw, changed, "scenario.edit_applied");
    }

    let output = serde_json::to_string_pretty(&engine.indicators().to_output())?;
    match &args.output {
        Some(path) => fs::write(path, output)
            .with_context(|| format!("Failed to write output {}", path.display()))?,
        None => println!("{output}"),
    }

    Ok(())
}

fn read_scenario(path: &Path) -> Result<ScenarioInput> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario {}", path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse scenario JSON at {}", path.display()))
}

fn parse_edit(raw: &str) -> Result<(&str, KnobEdit)> {
    let (parent, edit) = raw
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("Edit must be in PARENT:knob=value form"))?;
    let edit = edit
        .parse::<KnobEdit>()
        .with_context(|| format!("Invalid edit '{raw}'"))?;
    Ok((parent.trim(), edit))
}

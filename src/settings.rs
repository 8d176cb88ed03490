use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::geometry::DEFAULT_CIRCLE_SEGMENTS;
use crate::properties::{default_results, ResultRequest};
use crate::session::{MeshType, UnitSystem};

pub const DEFAULT_MOLDFLOW_BIN: &str = "C:/Program Files/Autodesk/Moldflow Insight 2021.1/bin";

/// What to do when a model's working directory already exists
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExistingDirPolicy {
    /// Stop the whole run
    #[default]
    Abort,
    /// Leave the directory alone and continue with the next model
    Skip,
}

/// What to do when the extractor does not write the expected XML file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MissingResultPolicy {
    /// Log a warning, record the result as missing and continue
    #[default]
    Warn,
    /// Stop the whole run
    Fail,
}

/// Settings shared by every model of a sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepSettings {
    pub moldflow_bin: PathBuf,
    /// Parent of the per-model working directories
    pub output_root: PathBuf,
    pub on_existing_dir: ExistingDirPolicy,
    pub on_missing_result: MissingResultPolicy,
    pub units: UnitSystem,
    /// Mesh type requested when importing the STL
    pub mesh_type: MeshType,
    /// Target mesh edge length (mm) unless a model overrides it
    pub edge_length: f64,
    pub intermediate_results: u32,
    /// Maximum filled volume per fill step (%), solver default when unset
    pub max_filled_volume_per_step: Option<f64>,
    pub results: Vec<ResultRequest>,
    pub circle_segments: usize,
    /// When false, studies are prepared but neither solved nor extracted
    pub run_solver: bool,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            moldflow_bin: PathBuf::from(DEFAULT_MOLDFLOW_BIN),
            output_root: PathBuf::from("data"),
            on_existing_dir: ExistingDirPolicy::default(),
            on_missing_result: MissingResultPolicy::default(),
            units: UnitSystem::default(),
            mesh_type: MeshType::default(),
            edge_length: 2.5,
            intermediate_results: 50,
            max_filled_volume_per_step: None,
            results: default_results(),
            circle_segments: DEFAULT_CIRCLE_SEGMENTS,
            run_solver: true,
        }
    }
}

impl SweepSettings {
    /// Settings for a dry run: the solver is off and every file goes to a
    /// fresh scratch directory, so the real output root stays untouched.
    pub fn for_dry_run(self) -> std::io::Result<Self> {
        let scratch = tempfile::Builder::new()
            .prefix("moldflow-sweep-dry-run-")
            .tempdir()?
            .keep();
        Ok(Self {
            output_root: scratch,
            run_solver: false,
            ..self
        })
    }
}

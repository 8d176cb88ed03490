//! Automation boundary to Moldflow Synergy
//!
//! The sweep talks to Synergy only through [`SynergySession`]. One session is
//! created for the whole run and passed explicitly to the driver.

mod recording;
mod script;

pub use recording::{RecordingSession, SessionCall};
pub use script::ScriptSession;

use std::fmt;
use std::path::Path;

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::models::MaterialRef;
use crate::properties::{ProcessField, PropertySet};

/// Unit system Synergy displays and stores values in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    #[default]
    Metric,
    English,
}

impl fmt::Display for UnitSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitSystem::Metric => write!(f, "Metric"),
            UnitSystem::English => write!(f, "English"),
        }
    }
}

/// Mesh type Synergy builds for an imported geometry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum MeshType {
    #[serde(rename = "midplane")]
    #[value(name = "midplane")]
    Midplane,
    #[serde(rename = "fusion")]
    #[value(name = "fusion", alias = "dual-domain")]
    DualDomain,
    #[default]
    #[serde(rename = "3d")]
    #[value(name = "3d")]
    ThreeD,
}

impl fmt::Display for MeshType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MeshType::Midplane => "Midplane",
            MeshType::DualDomain => "Fusion",
            MeshType::ThreeD => "3D",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOptions {
    pub mesh_type: MeshType,
    /// Length unit of the imported file, e.g. `"mm"`
    pub units: String,
}

impl ImportOptions {
    /// Millimetre geometry meshed as `mesh_type`
    pub fn mm(mesh_type: MeshType) -> Self {
        Self {
            mesh_type,
            units: "mm".to_string(),
        }
    }
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self::mm(MeshType::default())
    }
}

/// Operations the sweep needs from a Synergy instance
pub trait SynergySession {
    fn set_units(&mut self, units: UnitSystem) -> Result<(), SessionError>;

    /// Create a project named `name` in `dir`
    fn new_project(&mut self, name: &str, dir: &Path) -> Result<(), SessionError>;

    /// Import a geometry file into a new study of the current project
    fn import_file(&mut self, file: &Path, options: &ImportOptions) -> Result<(), SessionError>;

    fn rename_study(&mut self, from: &str, to: &str) -> Result<(), SessionError>;

    fn create_injection_location(
        &mut self,
        location: &Point3<f64>,
        direction: &Vector3<f64>,
    ) -> Result<(), SessionError>;

    fn generate_mesh(&mut self, edge_length: f64) -> Result<(), SessionError>;

    fn select_material(&mut self, material: &MaterialRef) -> Result<(), SessionError>;

    /// Stage new values for one field of a property set
    fn set_property(
        &mut self,
        set: &PropertySet,
        field: ProcessField,
        values: &[f64],
    ) -> Result<(), SessionError>;

    fn commit_properties(&mut self, set: &PropertySet) -> Result<(), SessionError>;

    fn save_study(&mut self) -> Result<(), SessionError>;

    /// Export the current study's mesh (format from the file extension)
    fn export_model(&mut self, path: &Path) -> Result<(), SessionError>;

    /// Make sure every queued operation has reached Synergy.
    fn flush(&mut self) -> Result<(), SessionError> {
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to launch script host '{host}': {source}")]
    Launch {
        host: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Synergy script {script:?} failed with {status}: {output}")]
    ScriptFailed {
        script: std::path::PathBuf,
        status: String,
        output: String,
    },
    #[error("No project is open")]
    NoProject,
}

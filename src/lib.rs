//! moldflow-sweep - batch plate geometry and Moldflow filling simulations
//!
//! A sweep configuration names a set of plates (size, thickness, holes,
//! injection locations, optional process parameters). For each plate the
//! crate:
//! - builds the solid and exports it as STL,
//! - sets up one Moldflow study per injection location through a
//!   [`session::SynergySession`],
//! - runs the solver and the result extractor as external processes,
//! - keeps logs and XML results in a per-model working directory.
//!
//! ## Example
//! ```no_run
//! use moldflow_sweep::prelude::*;
//!
//! let config = SweepConfig::load("random_models.json".as_ref()).unwrap();
//! let settings = SweepSettings::default();
//! let mut session = ScriptSession::new("cscript");
//! let tools = MoldflowToolchain::new(&settings.moldflow_bin);
//!
//! let report = SweepDriver::new(&settings, &mut session, &tools)
//!     .run(&config)
//!     .unwrap();
//! println!("{} models", report.models.len());
//! ```

pub mod error;
pub mod executor;
pub mod generator;
pub mod geometry;
pub mod models;
pub mod properties;
pub mod session;
pub mod settings;
pub mod stl;
pub mod sweep;

pub mod prelude {
    pub use crate::error::{SweepError, SweepResult};
    pub use crate::executor::{MoldflowToolchain, StudyRunner, ToolOutput};
    pub use crate::generator::{random_config, GeneratorError, GeneratorOptions};
    pub use crate::geometry::{build_part, Solid, TriMesh};
    pub use crate::models::{Hole, InjectionLocation, ModelSpec, SweepConfig};
    pub use crate::session::{MeshType, RecordingSession, ScriptSession, SynergySession, UnitSystem};
    pub use crate::settings::{ExistingDirPolicy, MissingResultPolicy, SweepSettings};
    pub use crate::sweep::{export_geometry, mesh_existing_stl, study_name, SweepDriver, SweepReport};
}

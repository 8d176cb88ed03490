use std::fmt;
use std::path::{Path, PathBuf};

use nalgebra::{Point3, Vector3};

use super::{ImportOptions, SessionError, SynergySession, UnitSystem};
use crate::models::MaterialRef;
use crate::properties::{ProcessField, PropertySet};

/// One call made on a [`RecordingSession`]
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCall {
    SetUnits(UnitSystem),
    NewProject { name: String, dir: PathBuf },
    ImportFile { file: PathBuf, options: ImportOptions },
    RenameStudy { from: String, to: String },
    CreateInjectionLocation { location: Point3<f64>, direction: Vector3<f64> },
    GenerateMesh { edge_length: f64 },
    SelectMaterial(MaterialRef),
    SetProperty { set: PropertySet, field: ProcessField, values: Vec<f64> },
    CommitProperties { set: PropertySet },
    SaveStudy,
    ExportModel(PathBuf),
    Flush,
}

impl fmt::Display for SessionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionCall::SetUnits(units) => write!(f, "SetUnits({})", units),
            SessionCall::NewProject { name, dir } => write!(f, "NewProject({}, {:?})", name, dir),
            SessionCall::ImportFile { file, options } => {
                write!(f, "ImportFile({:?}, {}, {})", file, options.mesh_type, options.units)
            }
            SessionCall::RenameStudy { from, to } => write!(f, "RenameStudy({} -> {})", from, to),
            SessionCall::CreateInjectionLocation { location, direction } => write!(
                f,
                "CreateNDBCAtXYZ([{}, {}, {}], [{}, {}, {}])",
                location.x, location.y, location.z, direction.x, direction.y, direction.z
            ),
            SessionCall::GenerateMesh { edge_length } => write!(f, "GenerateMesh({})", edge_length),
            SessionCall::SelectMaterial(m) => {
                write!(f, "SelectMaterial({}, {}, {})", m.database, m.database_type, m.index)
            }
            SessionCall::SetProperty { set, field, values } => {
                write!(f, "SetProperty({}/{}, {} = {:?})", set.type_code, set.id, field.name(), values)
            }
            SessionCall::CommitProperties { set } => write!(f, "CommitChanges({})", set.label),
            SessionCall::SaveStudy => write!(f, "SaveStudy"),
            SessionCall::ExportModel(path) => write!(f, "ExportModel({:?})", path),
            SessionCall::Flush => write!(f, "Flush"),
        }
    }
}

/// Session that only records what it is asked to do.
///
/// Used for dry runs and as the test double for the driver.
#[derive(Debug, Default)]
pub struct RecordingSession {
    pub calls: Vec<SessionCall>,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fields set on any property set, in call order
    pub fn property_fields(&self) -> Vec<ProcessField> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                SessionCall::SetProperty { field, .. } => Some(*field),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&SessionCall) -> bool) -> usize {
        self.calls.iter().filter(|c| predicate(c)).count()
    }
}

impl SynergySession for RecordingSession {
    fn set_units(&mut self, units: UnitSystem) -> Result<(), SessionError> {
        self.calls.push(SessionCall::SetUnits(units));
        Ok(())
    }

    fn new_project(&mut self, name: &str, dir: &Path) -> Result<(), SessionError> {
        self.calls.push(SessionCall::NewProject {
            name: name.to_string(),
            dir: dir.to_path_buf(),
        });
        Ok(())
    }

    fn import_file(&mut self, file: &Path, options: &ImportOptions) -> Result<(), SessionError> {
        self.calls.push(SessionCall::ImportFile {
            file: file.to_path_buf(),
            options: options.clone(),
        });
        Ok(())
    }

    fn rename_study(&mut self, from: &str, to: &str) -> Result<(), SessionError> {
        self.calls.push(SessionCall::RenameStudy {
            from: from.to_string(),
            to: to.to_string(),
        });
        Ok(())
    }

    fn create_injection_location(
        &mut self,
        location: &Point3<f64>,
        direction: &Vector3<f64>,
    ) -> Result<(), SessionError> {
        self.calls.push(SessionCall::CreateInjectionLocation {
            location: *location,
            direction: *direction,
        });
        Ok(())
    }

    fn generate_mesh(&mut self, edge_length: f64) -> Result<(), SessionError> {
        self.calls.push(SessionCall::GenerateMesh { edge_length });
        Ok(())
    }

    fn select_material(&mut self, material: &MaterialRef) -> Result<(), SessionError> {
        self.calls.push(SessionCall::SelectMaterial(material.clone()));
        Ok(())
    }

    fn set_property(
        &mut self,
        set: &PropertySet,
        field: ProcessField,
        values: &[f64],
    ) -> Result<(), SessionError> {
        self.calls.push(SessionCall::SetProperty {
            set: *set,
            field,
            values: values.to_vec(),
        });
        Ok(())
    }

    fn commit_properties(&mut self, set: &PropertySet) -> Result<(), SessionError> {
        self.calls.push(SessionCall::CommitProperties { set: *set });
        Ok(())
    }

    fn save_study(&mut self) -> Result<(), SessionError> {
        self.calls.push(SessionCall::SaveStudy);
        Ok(())
    }

    fn export_model(&mut self, path: &Path) -> Result<(), SessionError> {
        self.calls.push(SessionCall::ExportModel(path.to_path_buf()));
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SessionError> {
        self.calls.push(SessionCall::Flush);
        Ok(())
    }
}

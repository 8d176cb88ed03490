use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use nalgebra::{Point3, Vector3};

use super::{ImportOptions, SessionError, SynergySession, UnitSystem};
use crate::models::MaterialRef;
use crate::properties::{ProcessField, PropertySet, INJECTION_LOCATION_BC};

const HEADER: &str = "SetLocale(\"en-us\")\n\
Dim Synergy\n\
Set Synergy = CreateObject(\"synergy.Synergy\")\n";

/// Drives Synergy through VBScript run by the Windows script host.
///
/// Calls are rendered as statements and queued; `flush` writes them to a
/// `.vbs` file in the project directory and runs it with `cscript`. Synergy
/// keeps its state between scripts, so each flush continues where the
/// previous one stopped.
pub struct ScriptSession {
    host: String,
    project_dir: Option<PathBuf>,
    script_name: String,
    statements: Vec<String>,
}

impl ScriptSession {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            project_dir: None,
            script_name: "synergy".to_string(),
            statements: Vec::new(),
        }
    }

    /// Full script text for the queued statements
    pub fn render(&self) -> String {
        let mut script = String::from(HEADER);
        for statement in &self.statements {
            script.push_str(statement);
            script.push('\n');
        }
        script
    }

    pub fn pending(&self) -> usize {
        self.statements.len()
    }

    fn push(&mut self, statement: String) {
        tracing::debug!("synergy: {}", statement);
        self.statements.push(statement);
    }
}

/// VBScript string literal
fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn quote_path(path: &Path) -> String {
    quote(&path.to_string_lossy())
}

/// Synergy resolves paths from its own working directory, never ours.
fn absolute(path: &Path) -> Result<PathBuf, SessionError> {
    Ok(std::path::absolute(path)?)
}

impl SynergySession for ScriptSession {
    fn set_units(&mut self, units: UnitSystem) -> Result<(), SessionError> {
        self.push(format!("Synergy.SetUnits {}", quote(&units.to_string())));
        Ok(())
    }

    fn new_project(&mut self, name: &str, dir: &Path) -> Result<(), SessionError> {
        let dir = absolute(dir)?;
        self.script_name = name.to_string();
        self.push(format!("Synergy.NewProject {}, {}", quote(name), quote_path(&dir)));
        self.project_dir = Some(dir);
        Ok(())
    }

    fn import_file(&mut self, file: &Path, options: &ImportOptions) -> Result<(), SessionError> {
        self.push("Set ImpOpts = Synergy.ImportOptions".to_string());
        self.push(format!("ImpOpts.MeshType = {}", quote(&options.mesh_type.to_string())));
        self.push(format!("ImpOpts.Units = {}", quote(&options.units)));
        let file = absolute(file)?;
        self.push(format!("Synergy.ImportFile {}, ImpOpts, False", quote_path(&file)));
        Ok(())
    }

    fn rename_study(&mut self, from: &str, to: &str) -> Result<(), SessionError> {
        self.script_name = to.to_string();
        self.push("Set Project = Synergy.Project".to_string());
        self.push(format!(
            "Project.RenameItemByName {}, \"Study\", {}",
            quote(from),
            quote(to)
        ));
        Ok(())
    }

    fn create_injection_location(
        &mut self,
        location: &Point3<f64>,
        direction: &Vector3<f64>,
    ) -> Result<(), SessionError> {
        self.push("Set BoundaryConditions = Synergy.BoundaryConditions".to_string());
        self.push("Set Direction = Synergy.CreateVector".to_string());
        self.push(format!(
            "Direction.SetXYZ {}, {}, {}",
            direction.x,
            direction.y,
            direction.z
        ));
        self.push("Set Location = Synergy.CreateVector".to_string());
        self.push(format!(
            "Location.SetXYZ {}, {}, {}",
            location.x,
            location.y,
            location.z
        ));
        self.push(format!(
            "Set EntList = BoundaryConditions.CreateNDBCAtXYZ(Location, Direction, {}, Nothing)",
            INJECTION_LOCATION_BC
        ));
        Ok(())
    }

    fn generate_mesh(&mut self, edge_length: f64) -> Result<(), SessionError> {
        self.push("Set MeshGenerator = Synergy.MeshGenerator".to_string());
        self.push(format!("MeshGenerator.EdgeLength = {}", edge_length));
        self.push("MeshGenerator.Generate".to_string());
        Ok(())
    }

    fn select_material(&mut self, material: &MaterialRef) -> Result<(), SessionError> {
        self.push("Set MaterialSelector = Synergy.MaterialSelector".to_string());
        self.push(format!(
            "MaterialSelector.Select {}, {}, {}, 0",
            quote(&material.database),
            quote(&material.database_type),
            material.index
        ));
        Ok(())
    }

    fn set_property(
        &mut self,
        set: &PropertySet,
        field: ProcessField,
        values: &[f64],
    ) -> Result<(), SessionError> {
        self.push("Set PropEd = Synergy.PropertyEditor".to_string());
        self.push(format!("Set Prop = PropEd.FindProperty({}, {})", set.type_code, set.id));
        self.push("Set DVec = Synergy.CreateDoubleArray".to_string());
        for value in values {
            self.push(format!("DVec.AddDouble {}", value));
        }
        self.push(format!("Prop.FieldValues {}, DVec", field.code()));
        Ok(())
    }

    fn commit_properties(&mut self, set: &PropertySet) -> Result<(), SessionError> {
        self.push("Set PropEd = Synergy.PropertyEditor".to_string());
        self.push(format!("PropEd.CommitChanges {}", quote(set.label)));
        Ok(())
    }

    fn save_study(&mut self) -> Result<(), SessionError> {
        self.push("Set StudyDoc = Synergy.StudyDoc".to_string());
        self.push("StudyDoc.Save".to_string());
        Ok(())
    }

    fn export_model(&mut self, path: &Path) -> Result<(), SessionError> {
        self.push("Set Project = Synergy.Project".to_string());
        let path = absolute(path)?;
        self.push(format!("Project.ExportModel {}", quote_path(&path)));
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SessionError> {
        if self.statements.is_empty() {
            return Ok(());
        }

        let dir = self.project_dir.clone().ok_or(SessionError::NoProject)?;
        let script_path = dir.join(format!("{}.vbs", self.script_name));
        fs::write(&script_path, self.render())?;

        tracing::info!("Running {} {:?} ({} statements)", self.host, script_path, self.statements.len());

        let output = Command::new(&self.host)
            .arg("//NoLogo")
            .arg(&script_path)
            .current_dir(&dir)
            .output()
            .map_err(|source| SessionError::Launch {
                host: self.host.clone(),
                source,
            })?;

        if !output.status.success() {
            let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
            text.push_str(&String::from_utf8_lossy(&output.stderr));
            tracing::error!("Synergy script failed: {}", text.trim());
            return Err(SessionError::ScriptFailed {
                script: script_path,
                status: output.status.to_string(),
                output: text.trim().to_string(),
            });
        }

        self.statements.clear();
        Ok(())
    }
}

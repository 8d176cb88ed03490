//! Sweep driver: geometry, Synergy setup, solver run and result extraction
//! for every model and injection location of a configuration.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{SweepError, SweepResult};
use crate::executor::StudyRunner;
use crate::geometry::{build_part, Solid};
use crate::models::{InjectionLocation, ModelSpec, NamedModel, SweepConfig};
use crate::properties::{ProcessField, PropertySet, FILL_CONTROL_FLOW_RATE};
use crate::session::{ImportOptions, SynergySession};
use crate::settings::{ExistingDirPolicy, MissingResultPolicy, SweepSettings};
use crate::stl;

/// Study name for one injection location: model name plus the integer parts
/// of the injection x and y coordinates.
pub fn study_name(model: &str, location: &InjectionLocation) -> String {
    format!(
        "{}_{}_{}_study",
        model,
        location.point.x.trunc() as i64,
        location.point.y.trunc() as i64
    )
}

/// Pairs of location indices `(first, later)` that map to the same study name.
/// The later location overwrites the earlier one's files.
pub fn study_name_collisions(model: &str, locations: &[InjectionLocation]) -> Vec<(usize, usize, String)> {
    let mut first_seen: HashMap<String, usize> = HashMap::new();
    let mut collisions = Vec::new();
    for (i, location) in locations.iter().enumerate() {
        let name = study_name(model, location);
        match first_seen.get(&name) {
            Some(&first) => collisions.push((first, i, name)),
            None => {
                first_seen.insert(name, i);
            }
        }
    }
    collisions
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    Completed,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudyReport {
    pub name: String,
    pub solver_exit_code: Option<i32>,
    /// Result files written, by result name
    pub results: Vec<String>,
    pub missing_results: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelReport {
    pub name: String,
    pub status: ModelStatus,
    pub workdir: PathBuf,
    pub studies: Vec<StudyReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub run_id: Uuid,
    pub started_at: String,
    pub finished_at: String,
    pub models: Vec<ModelReport>,
}

impl SweepReport {
    pub fn model(&self, name: &str) -> Option<&ModelReport> {
        self.models.iter().find(|m| m.name == name)
    }

    pub fn write(&self, path: &Path) -> SweepResult<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Runs a configuration against one Synergy session and one tool runner.
pub struct SweepDriver<'a> {
    settings: &'a SweepSettings,
    session: &'a mut dyn SynergySession,
    runner: &'a dyn StudyRunner,
}

impl<'a> SweepDriver<'a> {
    pub fn new(
        settings: &'a SweepSettings,
        session: &'a mut dyn SynergySession,
        runner: &'a dyn StudyRunner,
    ) -> Self {
        Self {
            settings,
            session,
            runner,
        }
    }

    pub fn run(&mut self, config: &SweepConfig) -> SweepResult<SweepReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now().to_rfc3339();
        let output_root = std::path::absolute(&self.settings.output_root)?;
        tracing::info!(
            "Starting sweep {} over {} models in {:?}",
            run_id,
            config.len(),
            output_root
        );

        let mut models = Vec::with_capacity(config.len());
        for model in &config.models {
            models.push(self.run_model(&output_root, model)?);
        }

        Ok(SweepReport {
            run_id,
            started_at,
            finished_at: Utc::now().to_rfc3339(),
            models,
        })
    }

    fn run_model(&mut self, output_root: &Path, model: &NamedModel) -> SweepResult<ModelReport> {
        let name = model.name.as_str();
        let spec = &model.spec;
        tracing::info!("Running model '{}'", name);

        let workdir = output_root.join(name);
        if workdir.exists() {
            match self.settings.on_existing_dir {
                ExistingDirPolicy::Abort => return Err(SweepError::WorkdirExists(workdir)),
                ExistingDirPolicy::Skip => {
                    tracing::warn!("Skipping model '{}': {:?} already exists", name, workdir);
                    return Ok(ModelReport {
                        name: name.to_string(),
                        status: ModelStatus::Skipped,
                        workdir,
                        studies: Vec::new(),
                    });
                }
            }
        }
        fs::create_dir_all(output_root)?;
        fs::create_dir(&workdir)?;

        let part = build_model_part(name, spec)?;
        let stl_path = workdir.join(format!("{}.stl", name));
        let mesh = part
            .tessellate(self.settings.circle_segments)
            .map_err(|source| SweepError::Geometry {
                model: name.to_string(),
                source,
            })?;
        stl::export_stl(&mesh, &stl_path)?;
        tracing::info!("Exported {:?} ({} triangles)", stl_path, mesh.triangles.len());

        self.session.set_units(self.settings.units)?;
        self.session.new_project(name, &workdir)?;

        for (first, later, study) in study_name_collisions(name, &spec.injection_locations) {
            tracing::warn!(
                "Injection locations {} and {} of '{}' share study name '{}'; location {} overwrites",
                first,
                later,
                name,
                study,
                later
            );
        }

        let mut studies = Vec::with_capacity(spec.injection_locations.len());
        for location in &spec.injection_locations {
            studies.push(self.run_location(name, spec, &workdir, &stl_path, location)?);
        }

        tracing::info!("Model '{}' done", name);
        Ok(ModelReport {
            name: name.to_string(),
            status: ModelStatus::Completed,
            workdir,
            studies,
        })
    }

    fn run_location(
        &mut self,
        name: &str,
        spec: &ModelSpec,
        workdir: &Path,
        stl_path: &Path,
        location: &InjectionLocation,
    ) -> SweepResult<StudyReport> {
        let p = &location.point;
        tracing::info!(" - Injection location [{}, {}, {}]", p.x, p.y, p.z);

        let study = study_name(name, location);

        self.session
            .import_file(stl_path, &ImportOptions::mm(self.settings.mesh_type))?;
        self.session.rename_study(&format!("{}_study", name), &study)?;
        self.session
            .create_injection_location(&location.point, &location.direction)?;
        self.session
            .generate_mesh(spec.edge_length.unwrap_or(self.settings.edge_length))?;
        self.apply_process_parameters(spec)?;
        self.session.save_study()?;
        self.session.export_model(&workdir.join(format!("{}.pat", study)))?;
        self.session.flush()?;

        let mut report = StudyReport {
            name: study.clone(),
            solver_exit_code: None,
            results: Vec::new(),
            missing_results: Vec::new(),
        };
        if !self.settings.run_solver {
            tracing::info!("Study '{}' prepared, solver disabled", study);
            return Ok(report);
        }

        let study_file = format!("{}.sdy", study);
        let solved = self.runner.run_study(workdir, &study_file)?;
        fs::write(workdir.join(format!("{}.log", study)), solved.text())?;
        report.solver_exit_code = solved.exit_code;

        for request in &self.settings.results {
            self.runner.extract_result(workdir, &study_file, request.code)?;

            let produced = workdir.join(format!("{}.xml", study));
            let target = workdir.join(format!("{}_{}.xml", study, request.name));
            if produced.is_file() {
                fs::rename(&produced, &target)?;
                report.results.push(request.name.clone());
                continue;
            }

            match self.settings.on_missing_result {
                MissingResultPolicy::Fail => {
                    return Err(SweepError::MissingResult {
                        study,
                        result: request.name.clone(),
                        expected: produced,
                    })
                }
                MissingResultPolicy::Warn => {
                    tracing::warn!(
                        "Result {} ({}) not produced for '{}', skipping",
                        request.code,
                        request.name,
                        study
                    );
                    report.missing_results.push(request.name.clone());
                }
            }
        }

        tracing::info!("          ...done.");
        Ok(report)
    }

    /// Each parameter is committed on its own; absent ones are not touched.
    fn apply_process_parameters(&mut self, spec: &ModelSpec) -> SweepResult<()> {
        if let Some(material) = &spec.material {
            self.session.select_material(material)?;
        }

        self.commit_field(
            ProcessField::IntermediateResultsCount,
            f64::from(self.settings.intermediate_results),
        )?;
        if let Some(percent) = self.settings.max_filled_volume_per_step {
            self.commit_field(ProcessField::MaxFilledVolumePerStep, percent)?;
        }

        if let Some(flow_rate) = spec.flow_rate {
            // Moldflow only reads the flow rate when filling is controlled by it
            let fill = ProcessField::FillControl;
            self.session
                .set_property(&fill.property_set(), fill, &[FILL_CONTROL_FLOW_RATE])?;
            self.commit_field(ProcessField::FlowRate, flow_rate)?;
        }
        if let Some(mold_temp) = spec.mold_temp {
            self.commit_field(ProcessField::MoldTemperature, mold_temp)?;
        }
        if let Some(melt_temp) = spec.melt_temp {
            self.commit_field(ProcessField::MeltTemperature, melt_temp)?;
        }
        Ok(())
    }

    fn commit_field(&mut self, field: ProcessField, value: f64) -> SweepResult<()> {
        let set: PropertySet = field.property_set();
        tracing::debug!("Setting {} = {} on {}/{}", field.name(), value, set.type_code, set.id);
        self.session.set_property(&set, field, &[value])?;
        self.session.commit_properties(&set)?;
        Ok(())
    }
}

fn build_model_part(name: &str, spec: &ModelSpec) -> SweepResult<Solid> {
    build_part(spec).map_err(|source| SweepError::Geometry {
        model: name.to_string(),
        source,
    })
}

/// Write `<output_root>/<name>.stl` for every model without touching Moldflow.
pub fn export_geometry(config: &SweepConfig, output_root: &Path, circle_segments: usize) -> SweepResult<Vec<PathBuf>> {
    fs::create_dir_all(output_root)?;

    let mut written = Vec::with_capacity(config.len());
    for model in &config.models {
        let part = build_model_part(&model.name, &model.spec)?;
        let mesh = part
            .tessellate(circle_segments)
            .map_err(|source| SweepError::Geometry {
                model: model.name.clone(),
                source,
            })?;
        let path = output_root.join(format!("{}.stl", model.name));
        stl::export_stl(&mesh, &path)?;
        tracing::info!("Wrote {:?} (volume {:.3} mm³)", path, part.volume());
        written.push(path);
    }
    Ok(written)
}

/// Every `.stl` file below `root`, directories walked in name order.
pub fn find_stl_files(root: &Path) -> SweepResult<Vec<PathBuf>> {
    let mut entries = fs::read_dir(root)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort();

    let mut found = Vec::new();
    for path in entries {
        if path.is_dir() {
            found.extend(find_stl_files(&path)?);
        } else if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("stl"))
        {
            found.push(path);
        }
    }
    Ok(found)
}

/// Mesh STL files that already exist below `root`: one project per file,
/// created in the file's directory and named after it. Nothing is solved.
pub fn mesh_existing_stl(
    root: &Path,
    settings: &SweepSettings,
    session: &mut dyn SynergySession,
) -> SweepResult<Vec<PathBuf>> {
    let root = std::path::absolute(root)?;
    let files = find_stl_files(&root)?;
    tracing::info!("Found {} STL files below {:?}", files.len(), root);

    for file in &files {
        let (Some(dir), Some(stem)) = (file.parent(), file.file_stem()) else {
            continue;
        };
        let name = stem.to_string_lossy();
        tracing::info!("Building Moldflow model for {:?}", file);

        session.set_units(settings.units)?;
        session.new_project(&name, dir)?;
        session.import_file(file, &ImportOptions::mm(settings.mesh_type))?;
        session.generate_mesh(settings.edge_length)?;
        session.save_study()?;
        session.flush()?;
    }
    Ok(files)
}

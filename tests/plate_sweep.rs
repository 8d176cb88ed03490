use std::cell::RefCell;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use moldflow_sweep::executor::{ExecutorError, StudyRunner, ToolOutput};
use moldflow_sweep::models::MaterialRef;
use moldflow_sweep::prelude::*;
use moldflow_sweep::properties::{ProcessField, PropertySet, PROCESS_CONDITIONS, PROCESS_SETTINGS};
use moldflow_sweep::session::{ImportOptions, MeshType, SessionCall, SessionError, UnitSystem};
use nalgebra::{Point3, Vector3};

/// Records calls like `RecordingSession` and writes the files Synergy would
/// leave in the project directory.
#[derive(Default)]
struct FakeSynergy {
    inner: RecordingSession,
    project_dir: Option<PathBuf>,
    study: Option<String>,
}

impl FakeSynergy {
    fn study_path(&self, extension: &str) -> Result<PathBuf, SessionError> {
        let dir = self.project_dir.as_ref().ok_or(SessionError::NoProject)?;
        let study = self.study.as_deref().unwrap_or("unnamed_study");
        Ok(dir.join(format!("{}.{}", study, extension)))
    }
}

impl SynergySession for FakeSynergy {
    fn set_units(&mut self, units: UnitSystem) -> Result<(), SessionError> {
        self.inner.set_units(units)
    }

    fn new_project(&mut self, name: &str, dir: &Path) -> Result<(), SessionError> {
        self.project_dir = Some(dir.to_path_buf());
        self.inner.new_project(name, dir)
    }

    fn import_file(&mut self, file: &Path, options: &ImportOptions) -> Result<(), SessionError> {
        assert!(file.is_file(), "imported geometry {:?} must exist", file);
        self.inner.import_file(file, options)
    }

    fn rename_study(&mut self, from: &str, to: &str) -> Result<(), SessionError> {
        self.study = Some(to.to_string());
        self.inner.rename_study(from, to)
    }

    fn create_injection_location(
        &mut self,
        location: &Point3<f64>,
        direction: &Vector3<f64>,
    ) -> Result<(), SessionError> {
        self.inner.create_injection_location(location, direction)
    }

    fn generate_mesh(&mut self, edge_length: f64) -> Result<(), SessionError> {
        self.inner.generate_mesh(edge_length)
    }

    fn select_material(&mut self, material: &MaterialRef) -> Result<(), SessionError> {
        self.inner.select_material(material)
    }

    fn set_property(
        &mut self,
        set: &PropertySet,
        field: ProcessField,
        values: &[f64],
    ) -> Result<(), SessionError> {
        self.inner.set_property(set, field, values)
    }

    fn commit_properties(&mut self, set: &PropertySet) -> Result<(), SessionError> {
        self.inner.commit_properties(set)
    }

    fn save_study(&mut self) -> Result<(), SessionError> {
        fs::write(self.study_path("sdy")?, "study")?;
        self.inner.save_study()
    }

    fn export_model(&mut self, path: &Path) -> Result<(), SessionError> {
        fs::write(path, "patran")?;
        self.inner.export_model(path)
    }

    fn flush(&mut self) -> Result<(), SessionError> {
        self.inner.flush()
    }
}

/// Stands in for runstudy/studyrlt: numbers each solver run and writes
/// `<study>.xml` for every result code not listed in `missing`.
#[derive(Default)]
struct FakeTools {
    runs: RefCell<Vec<String>>,
    missing: HashSet<u32>,
}

impl StudyRunner for FakeTools {
    fn run_study(&self, workdir: &Path, study_file: &str) -> Result<ToolOutput, ExecutorError> {
        assert!(workdir.join(study_file).is_file());
        let mut runs = self.runs.borrow_mut();
        runs.push(study_file.to_string());

        let mut output = format!("\r\n  run {} of {}\r\n", runs.len(), study_file).into_bytes();
        output.extend_from_slice(b"Temp\xe9rature OK\r\n");
        Ok(ToolOutput {
            exit_code: Some(0),
            output,
        })
    }

    fn extract_result(
        &self,
        workdir: &Path,
        study_file: &str,
        result_code: u32,
    ) -> Result<ToolOutput, ExecutorError> {
        if !self.missing.contains(&result_code) {
            let study = study_file.trim_end_matches(".sdy");
            fs::write(
                workdir.join(format!("{}.xml", study)),
                format!("<result code=\"{}\"/>", result_code),
            )
            .map_err(|source| ExecutorError::Launch {
                program: PathBuf::from("studyrlt.exe"),
                source,
            })?;
        }
        Ok(ToolOutput {
            exit_code: Some(0),
            output: Vec::new(),
        })
    }
}

fn plate_spec(locations: &[[f64; 2]]) -> ModelSpec {
    ModelSpec {
        thickness: 2.0,
        plate: [50.0, 50.0],
        holes: Vec::new(),
        injection_locations: locations
            .iter()
            .map(|&[x, y]| InjectionLocation::from([[x, y, 0.0], [0.0, 0.0, 1.0]]))
            .collect(),
        flow_rate: None,
        mold_temp: None,
        melt_temp: None,
        material: None,
        edge_length: None,
    }
}

fn settings_in(root: &Path) -> SweepSettings {
    SweepSettings {
        output_root: root.join("data"),
        ..SweepSettings::default()
    }
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn single_plate_produces_expected_files() {
    let tmp = tempfile::tempdir().unwrap();
    let settings = settings_in(tmp.path());
    let mut config = SweepConfig::default();
    config.push("plate_0", plate_spec(&[[10.0, 10.0]]));

    let mut session = FakeSynergy::default();
    let tools = FakeTools::default();
    let report = SweepDriver::new(&settings, &mut session, &tools).run(&config).unwrap();

    let workdir = tmp.path().join("data").join("plate_0");
    assert_eq!(file_names(&tmp.path().join("data")), ["plate_0"]);
    assert_eq!(
        file_names(&workdir),
        [
            "plate_0.stl",
            "plate_0_10_10_study.log",
            "plate_0_10_10_study.pat",
            "plate_0_10_10_study.sdy",
            "plate_0_10_10_study_fill_time.xml",
            "plate_0_10_10_study_weld_line.xml",
            "plate_0_10_10_study_weld_surface.xml",
        ]
    );

    let weld_line = fs::read_to_string(workdir.join("plate_0_10_10_study_weld_line.xml")).unwrap();
    assert_eq!(weld_line, "<result code=\"1722\"/>");

    let log = fs::read_to_string(workdir.join("plate_0_10_10_study.log")).unwrap();
    assert_eq!(log, "run 1 of plate_0_10_10_study.sdy\r\nTempérature OK");

    let model = report.model("plate_0").unwrap();
    assert_eq!(model.studies.len(), 1);
    assert_eq!(model.studies[0].results, ["fill_time", "weld_surface", "weld_line"]);
    assert!(model.studies[0].missing_results.is_empty());
    assert_eq!(model.studies[0].solver_exit_code, Some(0));
}

#[test]
fn session_sees_steps_in_order() {
    let tmp = tempfile::tempdir().unwrap();
    let settings = settings_in(tmp.path());
    let mut config = SweepConfig::default();
    config.push("plate_0", plate_spec(&[[10.0, 10.0]]));

    let mut session = RecordingSession::new();
    let tools = FakeTools::default();
    let mut quiet = settings.clone();
    quiet.run_solver = false;
    SweepDriver::new(&quiet, &mut session, &tools).run(&config).unwrap();

    let workdir = tmp.path().join("data").join("plate_0");
    let labels: Vec<String> = session.calls.iter().map(|c| c.to_string()).collect();
    assert_eq!(labels[0], "SetUnits(Metric)");
    assert_eq!(
        session.calls[1],
        SessionCall::NewProject {
            name: "plate_0".into(),
            dir: workdir.clone()
        }
    );
    assert_eq!(
        session.calls[2],
        SessionCall::ImportFile {
            file: workdir.join("plate_0.stl"),
            options: ImportOptions::default()
        }
    );
    assert_eq!(
        session.calls[3],
        SessionCall::RenameStudy {
            from: "plate_0_study".into(),
            to: "plate_0_10_10_study".into()
        }
    );
    assert!(matches!(session.calls[4], SessionCall::CreateInjectionLocation { .. }));
    assert_eq!(session.calls[5], SessionCall::GenerateMesh { edge_length: 2.5 });
    assert_eq!(session.calls[session.calls.len() - 3], SessionCall::SaveStudy);
    assert_eq!(
        session.calls[session.calls.len() - 2],
        SessionCall::ExportModel(workdir.join("plate_0_10_10_study.pat"))
    );
    assert_eq!(session.calls.last(), Some(&SessionCall::Flush));

    // solver disabled: nothing was run or extracted
    assert!(tools.runs.borrow().is_empty());
}

#[test]
fn absent_process_parameters_are_not_committed() {
    let tmp = tempfile::tempdir().unwrap();
    let settings = settings_in(tmp.path());
    let mut config = SweepConfig::default();
    config.push("bare", plate_spec(&[[5.0, 5.0]]));
    let settings = SweepSettings {
        run_solver: false,
        ..settings
    };

    let mut session = RecordingSession::new();
    SweepDriver::new(&settings, &mut session, &FakeTools::default())
        .run(&config)
        .unwrap();

    assert_eq!(session.property_fields(), [ProcessField::IntermediateResultsCount]);
    assert_eq!(session.count(|c| matches!(c, SessionCall::CommitProperties { .. })), 1);
    assert_eq!(session.count(|c| matches!(c, SessionCall::SelectMaterial(_))), 0);
}

#[test]
fn present_process_parameters_are_committed_one_by_one() {
    let tmp = tempfile::tempdir().unwrap();
    let settings = settings_in(tmp.path());
    let mut spec = plate_spec(&[[5.0, 5.0]]);
    spec.flow_rate = Some(10.0);
    spec.melt_temp = Some(230.0);
    spec.edge_length = Some(1.0);
    spec.material = Some(MaterialRef::system("Celanese.21000.udb", 10994));
    let mut config = SweepConfig::default();
    config.push("tuned", spec);
    let settings = SweepSettings {
        run_solver: false,
        ..settings
    };

    let mut session = RecordingSession::new();
    SweepDriver::new(&settings, &mut session, &FakeTools::default())
        .run(&config)
        .unwrap();

    assert_eq!(
        session.property_fields(),
        [
            ProcessField::IntermediateResultsCount,
            ProcessField::FillControl,
            ProcessField::FlowRate,
            ProcessField::MeltTemperature
        ]
    );

    // every SetProperty is followed directly by its commit, except the fill
    // control switch that precedes the flow rate
    for (i, call) in session.calls.iter().enumerate() {
        if let SessionCall::SetProperty { set, field, values } = call {
            match field {
                ProcessField::IntermediateResultsCount => assert_eq!(*set, PROCESS_CONDITIONS),
                _ => assert_eq!(*set, PROCESS_SETTINGS),
            }
            if *field == ProcessField::FillControl {
                assert_eq!(values, &[3.0]);
                assert!(matches!(
                    session.calls[i + 1],
                    SessionCall::SetProperty { field: ProcessField::FlowRate, .. }
                ));
            } else {
                assert_eq!(session.calls[i + 1], SessionCall::CommitProperties { set: *set });
            }
        }
    }
    assert!(session.calls.contains(&SessionCall::GenerateMesh { edge_length: 1.0 }));
    assert_eq!(session.count(|c| matches!(c, SessionCall::SelectMaterial(_))), 1);
    assert!(session.calls.iter().any(|c| matches!(
        c,
        SessionCall::SetProperty { field: ProcessField::FlowRate, values, .. } if values == &[10.0]
    )));
}

#[test]
fn existing_workdir_aborts_run() {
    let tmp = tempfile::tempdir().unwrap();
    let settings = settings_in(tmp.path());
    let mut config = SweepConfig::default();
    config.push("plate_0", plate_spec(&[[10.0, 10.0]]));

    let tools = FakeTools::default();
    SweepDriver::new(&settings, &mut FakeSynergy::default(), &tools)
        .run(&config)
        .unwrap();

    let mut session = RecordingSession::new();
    let err = SweepDriver::new(&settings, &mut session, &tools)
        .run(&config)
        .unwrap_err();
    assert!(matches!(err, SweepError::WorkdirExists(ref p) if p.ends_with("plate_0")));
    assert!(session.calls.is_empty());
    assert_eq!(tools.runs.borrow().len(), 1);
}

#[test]
fn existing_workdir_is_skipped_when_configured() {
    let tmp = tempfile::tempdir().unwrap();
    let settings = SweepSettings {
        on_existing_dir: ExistingDirPolicy::Skip,
        ..settings_in(tmp.path())
    };
    fs::create_dir_all(tmp.path().join("data").join("plate_0")).unwrap();

    let mut config = SweepConfig::default();
    config.push("plate_0", plate_spec(&[[10.0, 10.0]]));
    config.push("plate_1", plate_spec(&[[20.0, 30.0]]));

    let mut session = FakeSynergy::default();
    let tools = FakeTools::default();
    let report = SweepDriver::new(&settings, &mut session, &tools).run(&config).unwrap();

    assert_eq!(report.model("plate_0").unwrap().status, moldflow_sweep::sweep::ModelStatus::Skipped);
    assert_eq!(report.model("plate_1").unwrap().status, moldflow_sweep::sweep::ModelStatus::Completed);
    assert!(file_names(&tmp.path().join("data").join("plate_0")).is_empty());
    assert_eq!(*tools.runs.borrow(), ["plate_1_20_30_study.sdy"]);
}

#[test]
fn colliding_study_names_overwrite() {
    let tmp = tempfile::tempdir().unwrap();
    let settings = settings_in(tmp.path());
    let mut config = SweepConfig::default();
    config.push("p", plate_spec(&[[10.2, 5.0], [10.8, 5.9]]));

    let mut session = FakeSynergy::default();
    let tools = FakeTools::default();
    let report = SweepDriver::new(&settings, &mut session, &tools).run(&config).unwrap();

    let studies: Vec<_> = report.models[0].studies.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(studies, ["p_10_5_study", "p_10_5_study"]);

    let workdir = tmp.path().join("data").join("p");
    let logs: Vec<_> = file_names(&workdir).into_iter().filter(|n| n.ends_with(".log")).collect();
    assert_eq!(logs, ["p_10_5_study.log"]);
    let log = fs::read_to_string(workdir.join("p_10_5_study.log")).unwrap();
    assert!(log.starts_with("run 2 of"), "second location should win, got {:?}", log);
}

#[test]
fn missing_result_is_recorded_by_default() {
    let tmp = tempfile::tempdir().unwrap();
    let settings = settings_in(tmp.path());
    let mut config = SweepConfig::default();
    config.push("plate_0", plate_spec(&[[10.0, 10.0]]));

    let tools = FakeTools {
        missing: HashSet::from([1653]),
        ..FakeTools::default()
    };
    let report = SweepDriver::new(&settings, &mut FakeSynergy::default(), &tools)
        .run(&config)
        .unwrap();

    let study = &report.models[0].studies[0];
    assert_eq!(study.results, ["fill_time", "weld_line"]);
    assert_eq!(study.missing_results, ["weld_surface"]);
    assert!(!tmp
        .path()
        .join("data/plate_0/plate_0_10_10_study_weld_surface.xml")
        .exists());
}

#[test]
fn missing_result_fails_when_configured() {
    let tmp = tempfile::tempdir().unwrap();
    let settings = SweepSettings {
        on_missing_result: MissingResultPolicy::Fail,
        ..settings_in(tmp.path())
    };
    let mut config = SweepConfig::default();
    config.push("plate_0", plate_spec(&[[10.0, 10.0]]));

    let tools = FakeTools {
        missing: HashSet::from([1610]),
        ..FakeTools::default()
    };
    let err = SweepDriver::new(&settings, &mut FakeSynergy::default(), &tools)
        .run(&config)
        .unwrap_err();
    assert!(matches!(err, SweepError::MissingResult { ref result, .. } if result == "fill_time"));
}

#[test]
fn hole_outside_plate_stops_before_session() {
    let tmp = tempfile::tempdir().unwrap();
    let settings = settings_in(tmp.path());
    let mut spec = plate_spec(&[[10.0, 10.0]]);
    spec.holes.push(Hole { x: 48.0, y: 25.0, radius: 5.0 });
    let mut config = SweepConfig::default();
    config.push("bad", spec);

    let mut session = RecordingSession::new();
    let err = SweepDriver::new(&settings, &mut session, &FakeTools::default())
        .run(&config)
        .unwrap_err();
    assert!(matches!(err, SweepError::Geometry { ref model, .. } if model == "bad"));
    assert!(session.calls.is_empty());
}

#[test]
fn report_is_written_as_json() {
    let tmp = tempfile::tempdir().unwrap();
    let settings = settings_in(tmp.path());
    let mut config = SweepConfig::default();
    config.push("plate_0", plate_spec(&[[10.0, 10.0]]));

    let report = SweepDriver::new(&settings, &mut FakeSynergy::default(), &FakeTools::default())
        .run(&config)
        .unwrap();
    let path = tmp.path().join("report.json");
    report.write(&path).unwrap();

    let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(value["models"][0]["name"], "plate_0");
    assert_eq!(value["models"][0]["status"], "completed");
    assert_eq!(value["models"][0]["studies"][0]["name"], "plate_0_10_10_study");
}

#[test]
fn relative_output_root_reaches_synergy_as_absolute_paths() {
    // relative to the working directory of the test process
    let tmp = tempfile::tempdir_in(".").unwrap();
    let root = tmp.path().join("data");
    assert!(root.is_relative());
    let settings = SweepSettings {
        output_root: root.clone(),
        run_solver: false,
        ..SweepSettings::default()
    };
    let mut config = SweepConfig::default();
    config.push("plate_0", plate_spec(&[[10.0, 10.0]]));

    let mut session = RecordingSession::new();
    let report = SweepDriver::new(&settings, &mut session, &FakeTools::default())
        .run(&config)
        .unwrap();

    let workdir = std::path::absolute(root.join("plate_0")).unwrap();
    assert!(workdir.join("plate_0.stl").is_file());
    assert_eq!(report.models[0].workdir, workdir);
    for call in &session.calls {
        match call {
            SessionCall::NewProject { dir, .. } => assert_eq!(dir, &workdir),
            SessionCall::ImportFile { file, .. } => assert_eq!(file, &workdir.join("plate_0.stl")),
            SessionCall::ExportModel(path) => {
                assert_eq!(path, &workdir.join("plate_0_10_10_study.pat"))
            }
            _ => {}
        }
    }
}

#[test]
fn dry_run_leaves_output_root_untouched() {
    let tmp = tempfile::tempdir().unwrap();
    let settings = settings_in(tmp.path());
    let mut config = SweepConfig::default();
    config.push("plate_0", plate_spec(&[[10.0, 10.0]]));

    let dry = settings.clone().for_dry_run().unwrap();
    let mut session = RecordingSession::new();
    let tools = FakeTools::default();
    SweepDriver::new(&dry, &mut session, &tools).run(&config).unwrap();
    assert!(dry.output_root.join("plate_0").join("plate_0.stl").is_file());
    assert!(!settings.output_root.exists());
    assert!(tools.runs.borrow().is_empty());

    // a real run on the same root afterwards is not blocked
    SweepDriver::new(&settings, &mut FakeSynergy::default(), &tools)
        .run(&config)
        .unwrap();
    assert_eq!(tools.runs.borrow().len(), 1);
    fs::remove_dir_all(&dry.output_root).unwrap();
}

#[test]
fn run_settings_reach_the_session() {
    let tmp = tempfile::tempdir().unwrap();
    let settings = SweepSettings {
        units: UnitSystem::English,
        mesh_type: MeshType::Midplane,
        max_filled_volume_per_step: Some(1.0),
        run_solver: false,
        ..settings_in(tmp.path())
    };
    let mut config = SweepConfig::default();
    config.push("plate_0", plate_spec(&[[10.0, 10.0]]));

    let mut session = RecordingSession::new();
    SweepDriver::new(&settings, &mut session, &FakeTools::default())
        .run(&config)
        .unwrap();

    assert_eq!(session.calls[0], SessionCall::SetUnits(UnitSystem::English));
    assert!(session.calls.iter().any(|c| matches!(
        c,
        SessionCall::ImportFile { options, .. } if *options == ImportOptions::mm(MeshType::Midplane)
    )));
    assert_eq!(
        session.property_fields(),
        [ProcessField::IntermediateResultsCount, ProcessField::MaxFilledVolumePerStep]
    );
    assert!(session.calls.contains(&SessionCall::SetProperty {
        set: PROCESS_CONDITIONS,
        field: ProcessField::MaxFilledVolumePerStep,
        values: vec![1.0],
    }));
}

#[test]
fn existing_stl_files_get_one_project_each() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    fs::create_dir_all(root.join("plate_0")).unwrap();
    fs::create_dir_all(root.join("plate_1")).unwrap();
    fs::write(root.join("plate_0").join("plate_0.stl"), b"solid").unwrap();
    fs::write(root.join("plate_1").join("plate_1.stl"), b"solid").unwrap();
    fs::write(root.join("plate_1").join("plate_1.log"), b"log").unwrap();

    let settings = SweepSettings {
        edge_length: 5.0,
        ..SweepSettings::default()
    };
    let mut session = RecordingSession::new();
    let meshed = mesh_existing_stl(root, &settings, &mut session).unwrap();
    assert_eq!(
        meshed,
        [root.join("plate_0").join("plate_0.stl"), root.join("plate_1").join("plate_1.stl")]
    );

    let projects: Vec<_> = session
        .calls
        .iter()
        .filter_map(|c| match c {
            SessionCall::NewProject { name, dir } => Some((name.as_str(), dir.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(
        projects,
        [("plate_0", root.join("plate_0")), ("plate_1", root.join("plate_1"))]
    );
    assert_eq!(session.count(|c| *c == SessionCall::GenerateMesh { edge_length: 5.0 }), 2);
    assert_eq!(session.count(|c| *c == SessionCall::SaveStudy), 2);
    assert_eq!(session.count(|c| *c == SessionCall::Flush), 2);
    assert_eq!(session.count(|c| matches!(c, SessionCall::CreateInjectionLocation { .. })), 0);
}

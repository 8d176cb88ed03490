//! Vendor codes used by Moldflow Synergy and its command line tools.
//!
//! Numeric property, field, boundary condition and result codes only mean
//! something to Moldflow; everything else refers to them by name.

use serde::{Deserialize, Serialize};

/// Boundary condition code of an injection location (NDBC)
pub const INJECTION_LOCATION_BC: u32 = 40000;

/// Property set addressed by type code and instance id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertySet {
    pub type_code: u32,
    pub id: u32,
    /// Label passed to `CommitChanges`
    pub label: &'static str,
}

/// Solver parameters: intermediate output and fill step size
pub const PROCESS_CONDITIONS: PropertySet = PropertySet {
    type_code: 10080,
    id: 1,
    label: "Process Conditions",
};

/// Process settings: filling control and mold/melt temperatures
pub const PROCESS_SETTINGS: PropertySet = PropertySet {
    type_code: 30011,
    id: 1,
    label: "Process Conditions",
};

/// Value of [`ProcessField::FillControl`] selecting control by flow rate
pub const FILL_CONTROL_FLOW_RATE: f64 = 3.0;

/// Fields of the process property sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessField {
    IntermediateResultsCount,
    MaxFilledVolumePerStep,
    FillControl,
    FlowRate,
    MoldTemperature,
    MeltTemperature,
}

impl ProcessField {
    pub const fn code(self) -> u32 {
        match self {
            ProcessField::IntermediateResultsCount => 910,
            ProcessField::MaxFilledVolumePerStep => 51010,
            ProcessField::FillControl => 10109,
            ProcessField::FlowRate => 10107,
            ProcessField::MoldTemperature => 11108,
            ProcessField::MeltTemperature => 11002,
        }
    }

    /// Property set the field belongs to
    pub const fn property_set(self) -> PropertySet {
        match self {
            ProcessField::IntermediateResultsCount | ProcessField::MaxFilledVolumePerStep => {
                PROCESS_CONDITIONS
            }
            ProcessField::FillControl
            | ProcessField::FlowRate
            | ProcessField::MoldTemperature
            | ProcessField::MeltTemperature => PROCESS_SETTINGS,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            ProcessField::IntermediateResultsCount => "intermediate results count",
            ProcessField::MaxFilledVolumePerStep => "max filled volume per step (%)",
            ProcessField::FillControl => "filling control",
            ProcessField::FlowRate => "flow rate",
            ProcessField::MoldTemperature => "mold temperature",
            ProcessField::MeltTemperature => "melt temperature",
        }
    }
}

/// A result exported by `studyrlt` and the suffix its XML file gets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRequest {
    pub code: u32,
    pub name: String,
}

impl ResultRequest {
    pub fn new(code: u32, name: impl Into<String>) -> Self {
        Self {
            code,
            name: name.into(),
        }
    }
}

pub const FILL_TIME: u32 = 1610;
pub const WELD_SURFACE: u32 = 1653;
pub const WELD_LINE: u32 = 1722;

/// Results extracted after every solver run unless configured otherwise
pub fn default_results() -> Vec<ResultRequest> {
    vec![
        ResultRequest::new(FILL_TIME, "fill_time"),
        ResultRequest::new(WELD_SURFACE, "weld_surface"),
        ResultRequest::new(WELD_LINE, "weld_line"),
    ]
}

impl std::str::FromStr for ResultRequest {
    type Err = String;

    /// Parses `code=name`, e.g. `1610=fill_time`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (code, name) = s
            .split_once('=')
            .ok_or_else(|| format!("expected CODE=NAME, got '{}'", s))?;
        let code = code
            .trim()
            .parse::<u32>()
            .map_err(|e| format!("invalid result code '{}': {}", code, e))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("missing result name in '{}'", s));
        }
        Ok(Self::new(code, name))
    }
}

use std::path::Path;

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// One plate model as written in the sweep configuration.
///
/// Process parameters are optional; `None` leaves the Moldflow default in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelSpec {
    pub thickness: f64,
    /// Width (x) and length (y) of the plate footprint
    pub plate: [f64; 2],
    #[serde(default)]
    pub holes: Vec<Hole>,
    #[serde(default)]
    pub injection_locations: Vec<InjectionLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_rate: Option<f64>, // cm³/s
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mold_temp: Option<f64>, // °C
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub melt_temp: Option<f64>, // °C
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<MaterialRef>,
    /// Overrides the sweep-wide mesh edge length for this model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_length: Option<f64>,
}

impl ModelSpec {
    pub fn width(&self) -> f64 {
        self.plate[0]
    }

    pub fn length(&self) -> f64 {
        self.plate[1]
    }

    /// Check the values that must be positive. Hole placement is left to the
    /// geometry kernel, which rejects holes it cannot cut.
    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidModel {
            name: name.to_string(),
            reason,
        };

        if !(self.thickness > 0.0) {
            return Err(invalid(format!("thickness must be positive, got {}", self.thickness)));
        }
        if !(self.width() > 0.0 && self.length() > 0.0) {
            return Err(invalid(format!(
                "plate dimensions must be positive, got {:?}",
                self.plate
            )));
        }
        for (i, hole) in self.holes.iter().enumerate() {
            if !(hole.radius > 0.0) {
                return Err(invalid(format!("hole {} has non-positive radius {}", i, hole.radius)));
            }
        }

        let optional = [
            ("flow_rate", self.flow_rate),
            ("mold_temp", self.mold_temp),
            ("melt_temp", self.melt_temp),
            ("edge_length", self.edge_length),
        ];
        for (key, value) in optional {
            if let Some(v) = value {
                if !(v > 0.0) {
                    return Err(invalid(format!("{} must be positive, got {}", key, v)));
                }
            }
        }

        Ok(())
    }
}

/// A cylindrical through-hole, written as `[x, y, radius]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct Hole {
    pub x: f64,
    pub y: f64,
    pub radius: f64,
}

impl From<[f64; 3]> for Hole {
    fn from([x, y, radius]: [f64; 3]) -> Self {
        Self { x, y, radius }
    }
}

impl From<Hole> for [f64; 3] {
    fn from(hole: Hole) -> Self {
        [hole.x, hole.y, hole.radius]
    }
}

/// Injection point and direction, written as `[[x, y, z], [dx, dy, dz]]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[[f64; 3]; 2]", into = "[[f64; 3]; 2]")]
pub struct InjectionLocation {
    pub point: Point3<f64>,
    pub direction: Vector3<f64>,
}

impl From<[[f64; 3]; 2]> for InjectionLocation {
    fn from([point, direction]: [[f64; 3]; 2]) -> Self {
        Self {
            point: Point3::from(point),
            direction: Vector3::from(direction),
        }
    }
}

impl From<InjectionLocation> for [[f64; 3]; 2] {
    fn from(location: InjectionLocation) -> Self {
        [
            [location.point.x, location.point.y, location.point.z],
            [location.direction.x, location.direction.y, location.direction.z],
        ]
    }
}

/// Entry of the Moldflow material database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MaterialRef {
    /// Database file, e.g. `"Celanese.21000.udb"`
    pub database: String,
    /// `"System"` for the bundled databases, `"User"` for user databases
    #[serde(default = "MaterialRef::system_database")]
    pub database_type: String,
    pub index: u32,
}

impl MaterialRef {
    fn system_database() -> String {
        "System".to_string()
    }

    /// Material from one of the bundled databases
    pub fn system(database: impl Into<String>, index: u32) -> Self {
        Self {
            database: database.into(),
            database_type: Self::system_database(),
            index,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamedModel {
    pub name: String,
    pub spec: ModelSpec,
}

/// Ordered set of models. File order is the run order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepConfig {
    pub models: Vec<NamedModel>,
}

impl SweepConfig {
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let entries: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(content).map_err(ConfigError::Parse)?;

        let mut models = Vec::with_capacity(entries.len());
        for (name, value) in entries {
            let spec: ModelSpec = serde_json::from_value(value).map_err(|e| {
                ConfigError::InvalidModel {
                    name: name.clone(),
                    reason: e.to_string(),
                }
            })?;
            spec.validate(&name)?;
            models.push(NamedModel { name, spec });
        }

        Ok(Self { models })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        let mut entries = serde_json::Map::with_capacity(self.models.len());
        for model in &self.models {
            let value = serde_json::to_value(&model.spec).map_err(ConfigError::Parse)?;
            entries.insert(model.name.clone(), value);
        }
        serde_json::to_string_pretty(&serde_json::Value::Object(entries)).map_err(ConfigError::Parse)
    }

    pub fn push(&mut self, name: impl Into<String>, spec: ModelSpec) {
        self.models.push(NamedModel {
            name: name.into(),
            spec,
        });
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path:?}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Parse error: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("Invalid model '{name}': {reason}")]
    InvalidModel { name: String, reason: String },
}

//! Random sweep configurations: rectangular plates with holes and a set of
//! injection points on the bottom face.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::models::{Hole, InjectionLocation, ModelSpec, SweepConfig};

#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    pub models: usize,
    pub locations_per_model: usize,
    pub holes_per_model: usize,
    pub flow_rate: Option<f64>,
    pub seed: Option<u64>,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            models: 50,
            locations_per_model: 10,
            holes_per_model: 1,
            flow_rate: Some(10.0),
            seed: None,
        }
    }
}

/// Margin between a hole center and the plate edge
const HOLE_MARGIN: i64 = 9;
const PLATE_SIZE: std::ops::Range<i64> = 20..100;
const THICKNESS: std::ops::Range<i64> = 1..10;
const HOLE_RADIUS: std::ops::Range<i64> = 2..8;
/// Draws per hole before the plate itself is redrawn
const HOLE_ATTEMPTS: usize = 100;
/// Plates drawn per model before giving up
const PLATE_ATTEMPTS: usize = 1000;

pub fn random_config(options: &GeneratorOptions) -> Result<SweepConfig, GeneratorError> {
    let mut rng = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut config = SweepConfig::default();
    for i in 0..options.models {
        let spec = random_model(&mut rng, options)?;
        config.push(format!("plate_{}", i), spec);
    }
    Ok(config)
}

fn random_model<R: Rng>(rng: &mut R, options: &GeneratorOptions) -> Result<ModelSpec, GeneratorError> {
    for _ in 0..PLATE_ATTEMPTS {
        let x = rng.gen_range(PLATE_SIZE);
        let y = rng.gen_range(PLATE_SIZE);
        let thickness = rng.gen_range(THICKNESS);
        if let Some(holes) = random_holes(rng, x, y, options.holes_per_model) {
            return Ok(random_plate(rng, x, y, thickness, holes, options));
        }
    }
    Err(GeneratorError::HolesDoNotFit {
        holes: options.holes_per_model,
        attempts: PLATE_ATTEMPTS,
    })
}

/// Non-overlapping holes on an `x` by `y` plate, `None` if they do not fit.
///
/// Centers keep a margin from the edges and the radius range stays below it,
/// so every hole lies inside the plate.
fn random_holes<R: Rng>(rng: &mut R, x: i64, y: i64, count: usize) -> Option<Vec<Hole>> {
    let mut holes: Vec<Hole> = Vec::with_capacity(count);
    while holes.len() < count {
        let hole = (0..HOLE_ATTEMPTS)
            .map(|_| Hole {
                x: rng.gen_range(HOLE_MARGIN..x - HOLE_MARGIN) as f64,
                y: rng.gen_range(HOLE_MARGIN..y - HOLE_MARGIN) as f64,
                radius: rng.gen_range(HOLE_RADIUS) as f64,
            })
            .find(|candidate| holes.iter().all(|other| !overlaps(candidate, other)))?;
        holes.push(hole);
    }
    Some(holes)
}

/// True when two holes overlap or leave less than 1 mm of wall between them
fn overlaps(a: &Hole, b: &Hole) -> bool {
    let distance = (a.x - b.x).hypot(a.y - b.y);
    distance <= a.radius + b.radius + 1.0
}

fn random_plate<R: Rng>(
    rng: &mut R,
    x: i64,
    y: i64,
    thickness: i64,
    holes: Vec<Hole>,
    options: &GeneratorOptions,
) -> ModelSpec {
    let injection_locations = (0..options.locations_per_model)
        .map(|_| {
            InjectionLocation::from([
                [rng.gen_range(0..x) as f64, rng.gen_range(0..y) as f64, 0.0],
                [0.0, 0.0, 1.0],
            ])
        })
        .collect();

    ModelSpec {
        thickness: thickness as f64,
        plate: [x as f64, y as f64],
        holes,
        injection_locations,
        flow_rate: options.flow_rate,
        mold_temp: None,
        melt_temp: None,
        material: None,
        edge_length: None,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("Could not place {holes} non-overlapping holes after {attempts} plates")]
    HolesDoNotFit { holes: usize, attempts: usize },
}

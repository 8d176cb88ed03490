//! Prismatic solid kernel for plates with cylindrical through-holes
//!
//! A `Solid` is a rectangular footprint extruded along +Z, minus any number of
//! circular voids. Cylinders subtracted from it must span the whole thickness;
//! that is the only boolean the plate sweep needs.

use std::f64::consts::PI;

use nalgebra::{Point2, Point3, Vector3};

use crate::models::ModelSpec;

/// Segments used to approximate a full circle when tessellating
pub const DEFAULT_CIRCLE_SEGMENTS: usize = 64;

const EPS: f64 = 1e-9;

/// Solid cylinder with its axis along +Z
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cylinder {
    /// Center of the cylinder (mid-height on the axis)
    pub center: Point3<f64>,
    pub radius: f64,
    pub height: f64,
}

impl Cylinder {
    pub fn z_min(&self) -> f64 {
        self.center.z - 0.5 * self.height
    }

    pub fn z_max(&self) -> f64 {
        self.center.z + 0.5 * self.height
    }
}

/// Circular void left in a solid by a subtracted cylinder
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircularVoid {
    pub center: Point2<f64>,
    pub radius: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Solid {
    pub width: f64,
    pub length: f64,
    pub z_min: f64,
    pub z_max: f64,
    pub voids: Vec<CircularVoid>,
}

impl Solid {
    pub fn thickness(&self) -> f64 {
        self.z_max - self.z_min
    }

    /// Exact volume of the ideal solid (round holes)
    pub fn volume(&self) -> f64 {
        let void_area: f64 = self.voids.iter().map(|v| PI * v.radius * v.radius).sum();
        (self.width * self.length - void_area) * self.thickness()
    }

    /// Triangulate the boundary into a closed, outward-oriented mesh.
    pub fn tessellate(&self, circle_segments: usize) -> Result<TriMesh, GeometryError> {
        if circle_segments < 3 {
            return Err(GeometryError::InvalidDimension(format!(
                "circle needs at least 3 segments, got {}",
                circle_segments
            )));
        }

        // Outer ring counter-clockwise, hole rings clockwise: walls built from
        // consecutive ring points then face away from the material.
        let mut rings: Vec<Vec<Point2<f64>>> = Vec::with_capacity(self.voids.len() + 1);
        rings.push(vec![
            Point2::new(0.0, 0.0),
            Point2::new(self.width, 0.0),
            Point2::new(self.width, self.length),
            Point2::new(0.0, self.length),
        ]);
        for void in &self.voids {
            let ring = (0..circle_segments)
                .map(|i| {
                    let angle = -2.0 * PI * (i as f64) / (circle_segments as f64);
                    Point2::new(
                        void.center.x + void.radius * angle.cos(),
                        void.center.y + void.radius * angle.sin(),
                    )
                })
                .collect();
            rings.push(ring);
        }

        let mut flat = Vec::new();
        let mut hole_starts = Vec::with_capacity(self.voids.len());
        for (i, ring) in rings.iter().enumerate() {
            if i > 0 {
                hole_starts.push(flat.len() / 2);
            }
            for p in ring {
                flat.push(p.x);
                flat.push(p.y);
            }
        }
        let profile: Vec<Point2<f64>> = rings.iter().flatten().copied().collect();
        let n = profile.len();

        let cap = earcutr::earcut(&flat, &hole_starts, 2)
            .map_err(|e| GeometryError::Triangulation(format!("{:?}", e)))?;
        if cap.is_empty() {
            return Err(GeometryError::Triangulation("profile produced no triangles".to_string()));
        }

        let mut mesh = TriMesh::with_capacity(2 * n, cap.len() * 2 / 3 + 2 * n);
        for p in &profile {
            mesh.vertices.push(Point3::new(p.x, p.y, self.z_min));
        }
        for p in &profile {
            mesh.vertices.push(Point3::new(p.x, p.y, self.z_max));
        }

        for tri in cap.chunks_exact(3) {
            let (a, b, c) = (tri[0], tri[1], tri[2]);
            let area = signed_area(&profile[a], &profile[b], &profile[c]);
            let (a, b, c) = if area < 0.0 { (a, c, b) } else { (a, b, c) };
            // top faces +Z, bottom faces -Z
            mesh.triangles.push([a + n, b + n, c + n]);
            mesh.triangles.push([a, c, b]);
        }

        let mut start = 0;
        for ring in &rings {
            let len = ring.len();
            for i in 0..len {
                let a = start + i;
                let b = start + (i + 1) % len;
                mesh.triangles.push([a, b, b + n]);
                mesh.triangles.push([a, b + n, a + n]);
            }
            start += len;
        }

        Ok(mesh)
    }
}

fn signed_area(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>) -> f64 {
    0.5 * ((b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x))
}

/// Rectangular plate `[0, width] x [0, length] x [0, thickness]`
pub fn build_plate(width: f64, length: f64, thickness: f64) -> Result<Solid, GeometryError> {
    for (label, value) in [("width", width), ("length", length), ("thickness", thickness)] {
        if !(value > 0.0) {
            return Err(GeometryError::InvalidDimension(format!(
                "plate {} must be positive, got {}",
                label, value
            )));
        }
    }

    Ok(Solid {
        width,
        length,
        z_min: 0.0,
        z_max: thickness,
        voids: Vec::new(),
    })
}

/// Cutting cylinder for a hole at `(x, y)` in a plate whose top face sits at
/// `top`. It is three plate thicknesses tall and centered on the top face.
pub fn build_cylinder(x: f64, y: f64, top: f64, thickness: f64, radius: f64) -> Result<Cylinder, GeometryError> {
    if !(radius > 0.0) {
        return Err(GeometryError::InvalidDimension(format!(
            "cylinder radius must be positive, got {}",
            radius
        )));
    }

    Ok(Cylinder {
        center: Point3::new(x, y, top),
        radius,
        height: 3.0 * thickness,
    })
}

/// Subtract `tool` from `solid`.
///
/// A cylinder that misses the footprint entirely leaves the solid unchanged.
pub fn difference(solid: &Solid, tool: &Cylinder) -> Result<Solid, GeometryError> {
    if tool.z_min() > solid.z_min + EPS || tool.z_max() < solid.z_max - EPS {
        return Err(GeometryError::PartialCut {
            z_min: tool.z_min(),
            z_max: tool.z_max(),
        });
    }

    let (cx, cy, r) = (tool.center.x, tool.center.y, tool.radius);

    let misses = cx + r <= 0.0 || cx - r >= solid.width || cy + r <= 0.0 || cy - r >= solid.length;
    if misses {
        tracing::debug!("Cylinder at ({}, {}) misses the plate, nothing to subtract", cx, cy);
        return Ok(solid.clone());
    }

    let inside = cx - r > EPS
        && cx + r < solid.width - EPS
        && cy - r > EPS
        && cy + r < solid.length - EPS;
    if !inside {
        return Err(GeometryError::HoleOutsidePlate { x: cx, y: cy, radius: r });
    }

    let center = Point2::new(cx, cy);
    if let Some(other) = solid
        .voids
        .iter()
        .find(|v| nalgebra::distance(&v.center, &center) < v.radius + r + EPS)
    {
        return Err(GeometryError::OverlappingHoles {
            first: (other.center.x, other.center.y),
            second: (cx, cy),
        });
    }

    let mut result = solid.clone();
    result.voids.push(CircularVoid { center, radius: r });
    Ok(result)
}

/// Build the part described by a model: the plate minus each hole, in order.
pub fn build_part(spec: &ModelSpec) -> Result<Solid, GeometryError> {
    let h = spec.thickness;
    let mut part = build_plate(spec.width(), spec.length(), h)?;
    for hole in &spec.holes {
        let cylinder = build_cylinder(hole.x, hole.y, part.z_max, h, hole.radius)?;
        part = difference(&part, &cylinder)?;
    }
    Ok(part)
}

/// Indexed triangle mesh
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriMesh {
    pub vertices: Vec<Point3<f64>>,
    pub triangles: Vec<[usize; 3]>,
}

impl TriMesh {
    pub fn with_capacity(vertices: usize, triangles: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(vertices),
            triangles: Vec::with_capacity(triangles),
        }
    }

    /// Unit normal of triangle `i` following its winding
    pub fn normal(&self, i: usize) -> Vector3<f64> {
        let [a, b, c] = self.triangles[i];
        let (a, b, c) = (&self.vertices[a], &self.vertices[b], &self.vertices[c]);
        (b - a).cross(&(c - a)).try_normalize(1e-12).unwrap_or_else(Vector3::z)
    }

    /// Enclosed volume (divergence theorem); positive for outward winding
    pub fn volume(&self) -> f64 {
        self.triangles
            .iter()
            .map(|&[a, b, c]| {
                let (a, b, c) = (
                    self.vertices[a].coords,
                    self.vertices[b].coords,
                    self.vertices[c].coords,
                );
                a.dot(&b.cross(&c)) / 6.0
            })
            .sum()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GeometryError {
    #[error("Invalid dimension: {0}")]
    InvalidDimension(String),
    #[error("Hole at ({x}, {y}) with radius {radius} is not fully inside the plate")]
    HoleOutsidePlate { x: f64, y: f64, radius: f64 },
    #[error("Holes at {first:?} and {second:?} overlap")]
    OverlappingHoles { first: (f64, f64), second: (f64, f64) },
    #[error("Cylinder spanning z=[{z_min}, {z_max}] does not cut through the plate")]
    PartialCut { z_min: f64, z_max: f64 },
    #[error("Triangulation error: {0}")]
    Triangulation(String),
}

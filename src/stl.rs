//! Binary STL export

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::geometry::TriMesh;

/// Convert a mesh into the STL triangle soup, single precision.
pub fn to_stl_triangles(mesh: &TriMesh) -> Result<Vec<stl_io::Triangle>, StlError> {
    if mesh.triangles.is_empty() {
        return Err(StlError::EmptyMesh);
    }

    let vertex_count = mesh.vertices.len();
    let mut triangles = Vec::with_capacity(mesh.triangles.len());
    for (i, tri) in mesh.triangles.iter().enumerate() {
        if let Some(&idx) = tri.iter().find(|&&idx| idx >= vertex_count) {
            return Err(StlError::IndexOutOfRange { index: idx, vertex_count });
        }

        let n = mesh.normal(i);
        let vertex = |idx: usize| {
            let p = &mesh.vertices[idx];
            stl_io::Vertex::new([p.x as f32, p.y as f32, p.z as f32])
        };
        triangles.push(stl_io::Triangle {
            normal: stl_io::Normal::new([n.x as f32, n.y as f32, n.z as f32]),
            vertices: [vertex(tri[0]), vertex(tri[1]), vertex(tri[2])],
        });
    }

    Ok(triangles)
}

pub fn write_stl<W: Write>(mesh: &TriMesh, writer: &mut W) -> Result<(), StlError> {
    let triangles = to_stl_triangles(mesh)?;
    stl_io::write_stl(writer, triangles.iter())?;
    Ok(())
}

/// Write `mesh` to `path` as binary STL.
pub fn export_stl(mesh: &TriMesh, path: &Path) -> Result<(), StlError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_stl(mesh, &mut writer)?;
    writer.flush()?;

    tracing::debug!("Wrote {} triangles to {:?}", mesh.triangles.len(), path);
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum StlError {
    #[error("mesh has no triangles")]
    EmptyMesh,
    #[error("index {index} out of range (vertex count = {vertex_count})")]
    IndexOutOfRange { index: usize, vertex_count: usize },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

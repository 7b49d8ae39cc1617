//! ASCII VTU fragments of the locally owned solution.
//!
//! Every owned cell is split into `n × n` patch quads whose corners carry the
//! finite-element solution evaluated there. Patch points are not shared
//! between cells. The owning rank is attached as the cell field `subdomain`.

use crate::algs::partition::CellPartition;
use crate::cdr_error::CdrError;
use crate::data::dof_handler::DofHandler;
use crate::discretization::runtime::{LagrangeBasis, map_point};
use crate::lac::vector::GhostedVector;
use crate::topology::shell::ShellMesh;
use std::io::Write;

/// VTK cell type id of a linear quadrilateral.
pub const VTK_QUAD: u8 = 9;

/// Output geometry and fields of one rank.
#[derive(Clone, Debug, PartialEq)]
pub struct Patches {
    /// Subdivisions per cell edge.
    pub n_subdivisions: usize,
    /// `(n + 1)^2` points per cell, row by row along the radius.
    pub points: Vec<[f64; 2]>,
    /// Solution at each point.
    pub values: Vec<f64>,
    /// Owning rank, one entry per patch quad.
    pub subdomain: Vec<f32>,
}

impl Patches {
    pub fn n_points(&self) -> usize {
        self.points.len()
    }

    pub fn n_cells(&self) -> usize {
        self.subdomain.len()
    }

    /// Corner indices of every patch quad, counter-clockwise.
    pub fn connectivity(&self) -> Vec<[usize; 4]> {
        let n = self.n_subdivisions;
        let per_cell = (n + 1) * (n + 1);
        let n_source_cells = self.points.len() / per_cell;
        let mut quads = Vec::with_capacity(n_source_cells * n * n);
        for cell in 0..n_source_cells {
            let base = cell * per_cell;
            for j in 0..n {
                for i in 0..n {
                    let p = base + j * (n + 1) + i;
                    quads.push([p, p + 1, p + n + 2, p + n + 1]);
                }
            }
        }
        quads
    }
}

/// Sample `solution` on the owned cells of `cells`.
pub fn build_patches(
    mesh: &ShellMesh,
    cells: &CellPartition,
    dofs: &DofHandler,
    solution: &GhostedVector,
    patch_level: usize,
) -> Result<Patches, CdrError> {
    let n = patch_level.max(1);
    let basis = LagrangeBasis::new(dofs.fe_order());
    let reference: Vec<[f64; 2]> = (0..=n)
        .flat_map(|j| {
            (0..=n).map(move |i| {
                [
                    -1.0 + 2.0 * i as f64 / n as f64,
                    -1.0 + 2.0 * j as f64 / n as f64,
                ]
            })
        })
        .collect();
    let shape: Vec<Vec<f64>> = reference.iter().map(|&p| basis.values_at(p)).collect();

    let owned = cells.owned_cells();
    let per_cell = reference.len();
    let mut points = Vec::with_capacity(owned.len() * per_cell);
    let mut values = Vec::with_capacity(owned.len() * per_cell);
    let mut local = vec![0.0; dofs.dofs_per_cell()];
    for cell in owned.clone() {
        let vertices = mesh.vertices(cell);
        solution.extract(dofs.cell_dofs(cell), &mut local)?;
        for (point, phi) in reference.iter().zip(&shape) {
            points.push(map_point(&vertices, *point));
            values.push(phi.iter().zip(&local).map(|(p, u)| p * u).sum());
        }
    }
    Ok(Patches {
        n_subdivisions: n,
        points,
        values,
        subdomain: vec![cells.rank() as f32; owned.len() * n * n],
    })
}

fn write_data_array<W, T>(writer: &mut W, values: impl IntoIterator<Item = T>) -> std::io::Result<()>
where
    W: Write,
    T: std::fmt::Display,
{
    let mut line_len = 0usize;
    for value in values {
        let text = value.to_string();
        if line_len + text.len() + 1 > 70 {
            writeln!(writer)?;
            line_len = 0;
        }
        if line_len > 0 {
            write!(writer, " ")?;
            line_len += 1;
        }
        write!(writer, "{text}")?;
        line_len += text.len();
    }
    writeln!(writer)
}

/// Serialize `patches` as an ASCII `UnstructuredGrid` piece.
pub fn write_vtu<W: Write>(writer: &mut W, patches: &Patches) -> std::io::Result<()> {
    let quads = patches.connectivity();
    writeln!(writer, "<?xml version=\"1.0\"?>")?;
    writeln!(
        writer,
        "<VTKFile type=\"UnstructuredGrid\" version=\"0.1\" byte_order=\"LittleEndian\">"
    )?;
    writeln!(writer, "<UnstructuredGrid>")?;
    writeln!(
        writer,
        "<Piece NumberOfPoints=\"{}\" NumberOfCells=\"{}\">",
        patches.n_points(),
        quads.len()
    )?;

    writeln!(writer, "<Points>")?;
    writeln!(
        writer,
        "<DataArray type=\"Float64\" NumberOfComponents=\"3\" format=\"ascii\">"
    )?;
    write_data_array(
        writer,
        patches.points.iter().flat_map(|p| [p[0], p[1], 0.0]),
    )?;
    writeln!(writer, "</DataArray>")?;
    writeln!(writer, "</Points>")?;

    writeln!(writer, "<Cells>")?;
    writeln!(writer, "<DataArray type=\"Int32\" Name=\"connectivity\" format=\"ascii\">")?;
    write_data_array(writer, quads.iter().flatten())?;
    writeln!(writer, "</DataArray>")?;
    writeln!(writer, "<DataArray type=\"Int32\" Name=\"offsets\" format=\"ascii\">")?;
    write_data_array(writer, (1..=quads.len()).map(|c| 4 * c))?;
    writeln!(writer, "</DataArray>")?;
    writeln!(writer, "<DataArray type=\"UInt8\" Name=\"types\" format=\"ascii\">")?;
    write_data_array(writer, std::iter::repeat_n(VTK_QUAD, quads.len()))?;
    writeln!(writer, "</DataArray>")?;
    writeln!(writer, "</Cells>")?;

    writeln!(writer, "<PointData Scalars=\"u\">")?;
    writeln!(writer, "<DataArray type=\"Float64\" Name=\"u\" format=\"ascii\">")?;
    write_data_array(writer, patches.values.iter())?;
    writeln!(writer, "</DataArray>")?;
    writeln!(writer, "</PointData>")?;

    writeln!(writer, "<CellData Scalars=\"subdomain\">")?;
    writeln!(writer, "<DataArray type=\"Float32\" Name=\"subdomain\" format=\"ascii\">")?;
    write_data_array(writer, patches.subdomain.iter())?;
    writeln!(writer, "</DataArray>")?;
    writeln!(writer, "</CellData>")?;

    writeln!(writer, "</Piece>")?;
    writeln!(writer, "</UnstructuredGrid>")?;
    writeln!(writer, "</VTKFile>")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_quad() -> Patches {
        Patches {
            n_subdivisions: 1,
            points: vec![[1.0, 0.0], [2.0, 0.0], [0.0, 1.0], [0.0, 2.0]],
            values: vec![0.5, 0.25, 0.0, 1.0],
            subdomain: vec![3.0],
        }
    }

    #[test]
    fn connectivity_walks_counter_clockwise() {
        let mut p = single_quad();
        assert_eq!(p.connectivity(), vec![[0, 1, 3, 2]]);
        p.n_subdivisions = 2;
        p.points = vec![[0.0; 2]; 9];
        assert_eq!(p.connectivity().len(), 4);
        assert_eq!(p.connectivity()[3], [4, 5, 8, 7]);
    }

    #[test]
    fn vtu_lists_fields_and_counts() {
        let mut out = Vec::new();
        write_vtu(&mut out, &single_quad()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("NumberOfPoints=\"4\" NumberOfCells=\"1\""));
        assert!(text.contains("Name=\"u\""));
        assert!(text.contains("Name=\"subdomain\""));
        assert!(text.contains("\n0 1 3 2\n"));
        assert!(text.trim_end().ends_with("</VTKFile>"));
    }
}

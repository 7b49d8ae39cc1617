//! Distributed assembly of the implicit step.
//!
//! Each rank integrates only the cells it owns, condenses the cell
//! contributions through the constraints, and lets the builders ship rows it
//! does not own to their owners. Every contribution is therefore summed
//! exactly once, on the owner of its row.

use crate::algs::communicator::Communicator;
use crate::algs::partition::CellPartition;
use crate::cdr_error::CdrError;
use crate::data::constraints::AffineConstraints;
use crate::data::dof_handler::DofHandler;
use crate::discretization::runtime::{ElementRuntime, tabulate_element};
use crate::expr::FunctionParser;
use crate::lac::sparse::{DistributedMatrix, MatrixBuilder};
use crate::lac::vector::{DistributedVector, GhostedVector, VectorBuilder};
use crate::physics::fe::{CellCoefficients, cell_matrix, cell_rhs};
use crate::topology::ownership::DofPartition;
use crate::topology::shell::ShellMesh;

/// Borrowed view of everything an assembly pass reads.
#[derive(Clone, Copy)]
pub struct AssemblyContext<'a> {
    pub mesh: &'a ShellMesh,
    pub cells: &'a CellPartition,
    pub dofs: &'a DofHandler,
    pub constraints: &'a AffineConstraints,
    pub partition: &'a DofPartition,
    pub runtime: &'a ElementRuntime,
}

/// Physical coefficients of the operator.
#[derive(Clone, Copy, Debug)]
pub struct OperatorCoefficients<'a> {
    pub diffusion: f64,
    pub reaction: f64,
    /// Two-component field in `x, y`.
    pub convection: &'a FunctionParser,
}

/// Collective: assemble `M + dt A` with constraints condensed.
pub fn assemble_system_matrix<C: Communicator + ?Sized>(
    ctx: &AssemblyContext<'_>,
    coefficients: &OperatorCoefficients<'_>,
    time_step: f64,
    comm: &C,
) -> Result<DistributedMatrix, CdrError> {
    let n = ctx.runtime.dofs_per_cell();
    let mut builder = MatrixBuilder::new(ctx.partition);
    let mut local = vec![0.0; n * n];
    let mut convection = vec![[0.0; 2]; ctx.runtime.n_q_points()];
    let mut velocity = [0.0; 2];
    for cell in ctx.cells.owned_cells() {
        let tab = tabulate_element(ctx.runtime, &ctx.mesh.vertices(cell))?;
        for (slot, x) in convection.iter_mut().zip(&tab.physical_points) {
            coefficients.convection.vector_value(x, &mut velocity)?;
            *slot = velocity;
        }
        let cell_coefficients = CellCoefficients {
            diffusion: coefficients.diffusion,
            reaction: coefficients.reaction,
            convection: &convection,
        };
        cell_matrix(ctx.runtime, &tab, &cell_coefficients, time_step, &mut local);
        ctx.constraints
            .condense_matrix(ctx.dofs.cell_dofs(cell), &local, |i, j, v| builder.add(i, j, v))?;
    }
    builder.compress(comm)
}

/// Collective: assemble `M u_old + dt F` with `forcing` at its current time.
///
/// `old_solution` must hold every DoF of the owned cells.
pub fn assemble_rhs<C: Communicator + ?Sized>(
    ctx: &AssemblyContext<'_>,
    old_solution: &GhostedVector,
    forcing: &FunctionParser,
    time_step: f64,
    comm: &C,
) -> Result<DistributedVector, CdrError> {
    let n = ctx.runtime.dofs_per_cell();
    let mut builder = VectorBuilder::new(ctx.partition);
    let mut local = vec![0.0; n];
    let mut u_old = vec![0.0; n];
    let mut f = vec![0.0; ctx.runtime.n_q_points()];
    for cell in ctx.cells.owned_cells() {
        let tab = tabulate_element(ctx.runtime, &ctx.mesh.vertices(cell))?;
        let cell_dofs = ctx.dofs.cell_dofs(cell);
        old_solution.extract(cell_dofs, &mut u_old)?;
        for (slot, x) in f.iter_mut().zip(&tab.physical_points) {
            *slot = forcing.value(x, 0)?;
        }
        cell_rhs(ctx.runtime, &tab, &u_old, &f, time_step, &mut local);
        ctx.constraints
            .condense_vector(cell_dofs, &local, |i, v| builder.add(i, v))?;
    }
    builder.compress(comm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use crate::algs::partition::dof_partition;
    use crate::expr::default_constants;
    use crate::topology::manifold::SphericalManifold;

    #[test]
    fn serial_matrix_is_square_and_positive_on_diagonal() {
        let mut mesh = ShellMesh::hyper_shell(1.0, 2.0, 8, false).unwrap();
        mesh.set_manifold(0, SphericalManifold::new([0.0, 0.0]));
        mesh.set_all_manifold_ids(0);
        mesh.refine_global(1).unwrap();
        let cells = CellPartition::new(&mesh, 0, 1).unwrap();
        let dofs = DofHandler::distribute(&mesh, 1, cells.owners(), 1).unwrap();
        let mut constraints = AffineConstraints::new();
        crate::data::bc::make_zero_dirichlet_constraints(&mesh, &dofs, 0, &mut constraints);
        constraints.close().unwrap();
        let partition = dof_partition(&cells, &dofs, &constraints).unwrap();
        let runtime = ElementRuntime::new(1, 4);
        let ctx = AssemblyContext {
            mesh: &mesh,
            cells: &cells,
            dofs: &dofs,
            constraints: &constraints,
            partition: &partition,
            runtime: &runtime,
        };
        let convection =
            FunctionParser::from_component_list("x,y", "-y,x", 2, &default_constants(), false)
                .unwrap();
        let coefficients = OperatorCoefficients {
            diffusion: 1e-3,
            reaction: 1e-4,
            convection: &convection,
        };
        let a = assemble_system_matrix(&ctx, &coefficients, 0.01, &NoComm).unwrap();
        assert_eq!(a.n_global(), dofs.n_dofs());
        assert!(a.diagonal().iter().all(|&d| d > 0.0));
        // Dirichlet rows carry only their diagonal
        for line in constraints.lines() {
            let (cols, _) = a.row(line.index);
            assert_eq!(cols, &[line.index]);
        }
    }
}

//! The time-stepping driver.
//!
//! [`CdrProblem`] walks `Uninitialized → GeometrySet → MatricesReady →
//! Stepping(k) → Done`. The matrix `M + dt A` and its preconditioner are built
//! once; each step only assembles a new right-hand side, solves with the
//! previous solution as initial guess, and redistributes the constraints.
//! All ranks of the communicator call every method in the same order.

use crate::algs::assembly::{
    AssemblyContext, OperatorCoefficients, assemble_rhs, assemble_system_matrix,
};
use crate::algs::communicator::Communicator;
use crate::algs::partition::{CellPartition, dof_partition};
use crate::cdr_error::CdrError;
use crate::data::bc::make_zero_dirichlet_constraints;
use crate::data::constraints::AffineConstraints;
use crate::data::dof_handler::DofHandler;
use crate::data::hanging_node_constraints::make_hanging_node_constraints;
use crate::discretization::runtime::ElementRuntime;
use crate::expr::{FunctionParser, default_constants};
use crate::io::{build_patches, write_checkpoint};
use crate::lac::ghost::GhostImporter;
use crate::lac::gmres::{SolverControl, SolverGmres};
use crate::lac::precondition::{Preconditioner, build_preconditioner};
use crate::lac::sparse::DistributedMatrix;
use crate::lac::vector::{DistributedVector, GhostedVector};
use crate::params::Parameters;
use crate::solver::state::{ProblemState, RunSummary, StepContext, StepReport};
use crate::topology::manifold::SphericalManifold;
use crate::topology::ownership::DofPartition;
use crate::topology::shell::ShellMesh;
use std::path::PathBuf;

const SHELL_MANIFOLD: u8 = 0;

struct Geometry {
    mesh: ShellMesh,
    cells: CellPartition,
    dofs: DofHandler,
}

struct LinearSystem {
    constraints: AffineConstraints,
    partition: DofPartition,
    importer: GhostImporter,
    runtime: ElementRuntime,
    matrix: DistributedMatrix,
    preconditioner: Box<dyn Preconditioner + Send + Sync>,
    /// Owned entries, written only by the solve.
    solution: DistributedVector,
    /// Relevant entries, refreshed after every solve.
    ghosted: GhostedVector,
}

/// A convection–diffusion–reaction run on one rank of `comm`.
pub struct CdrProblem<C: Communicator> {
    params: Parameters,
    comm: C,
    state: ProblemState,
    convection: FunctionParser,
    forcing: FunctionParser,
    time_step: f64,
    time: f64,
    geometry: Option<Geometry>,
    system: Option<LinearSystem>,
    checkpoints: Vec<PathBuf>,
    total_iterations: usize,
}

impl<C: Communicator> CdrProblem<C> {
    /// Validate `params` and compile the coefficient expressions.
    ///
    /// Fails with a configuration error before any mesh or communication work.
    pub fn new(params: Parameters, comm: C) -> Result<Self, CdrError> {
        params.validate()?;
        let constants = default_constants();
        let convection = FunctionParser::from_component_list(
            "x,y",
            &params.convection_field,
            params.dimension,
            &constants,
            false,
        )?;
        let mut forcing = FunctionParser::new("x,y,t", &[params.forcing.as_str()], &constants, true)?;
        forcing.set_time(params.start_time);
        Ok(Self {
            time_step: params.time_step(),
            time: params.start_time,
            params,
            comm,
            state: ProblemState::Uninitialized,
            convection,
            forcing,
            geometry: None,
            system: None,
            checkpoints: Vec::new(),
            total_iterations: 0,
        })
    }

    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    pub fn comm(&self) -> &C {
        &self.comm
    }

    pub fn state(&self) -> ProblemState {
        self.state
    }

    /// Elapsed simulation time.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn time_step(&self) -> f64 {
        self.time_step
    }

    /// Time the forcing expression is currently evaluated at.
    pub fn forcing_time(&self) -> f64 {
        self.forcing.time()
    }

    /// Move the forcing clock without touching the simulation clock.
    pub fn set_forcing_time(&mut self, time: f64) {
        self.forcing.set_time(time);
    }

    pub fn mesh(&self) -> Option<&ShellMesh> {
        self.geometry.as_ref().map(|g| &g.mesh)
    }

    pub fn dof_handler(&self) -> Option<&DofHandler> {
        self.geometry.as_ref().map(|g| &g.dofs)
    }

    pub fn cell_partition(&self) -> Option<&CellPartition> {
        self.geometry.as_ref().map(|g| &g.cells)
    }

    pub fn dof_partition(&self) -> Option<&DofPartition> {
        self.system.as_ref().map(|s| &s.partition)
    }

    pub fn constraints(&self) -> Option<&AffineConstraints> {
        self.system.as_ref().map(|s| &s.constraints)
    }

    pub fn system_matrix(&self) -> Option<&DistributedMatrix> {
        self.system.as_ref().map(|s| &s.matrix)
    }

    /// Locally owned solution values.
    pub fn solution(&self) -> Option<&DistributedVector> {
        self.system.as_ref().map(|s| &s.solution)
    }

    /// Solution on the locally relevant DoFs.
    pub fn ghosted_solution(&self) -> Option<&GhostedVector> {
        self.system.as_ref().map(|s| &s.ghosted)
    }

    /// Manifests written so far, in step order.
    pub fn checkpoints(&self) -> &[PathBuf] {
        &self.checkpoints
    }

    fn invalid_state(&self, expected: &'static str) -> CdrError {
        CdrError::InvalidState {
            expected,
            found: self.state.to_string(),
        }
    }

    fn geometry(&self) -> Result<&Geometry, CdrError> {
        self.geometry
            .as_ref()
            .ok_or_else(|| self.invalid_state("GeometrySet"))
    }

    /// Collective: build and refine the shell, partition its cells and number
    /// the DoFs.
    pub fn setup_geometry(&mut self) -> Result<(), CdrError> {
        if self.state != ProblemState::Uninitialized {
            return Err(self.invalid_state("Uninitialized"));
        }
        let p = &self.params;
        let mut mesh = ShellMesh::hyper_shell(
            p.inner_radius,
            p.outer_radius,
            p.coarse_cells,
            p.colorize_boundaries,
        )?;
        mesh.set_manifold(SHELL_MANIFOLD, SphericalManifold::new([0.0, 0.0]));
        mesh.set_all_manifold_ids(SHELL_MANIFOLD);
        mesh.refine_global(p.refinement_level)?;
        let cells = CellPartition::new(&mesh, self.comm.rank(), self.comm.size())?;
        let dofs = DofHandler::distribute(&mesh, p.fe_order, cells.owners(), self.comm.size())?;
        log::info!(
            "rank {}: {} active cells, {} DoFs ({} owned)",
            self.comm.rank(),
            mesh.n_active_cells(),
            dofs.n_dofs(),
            dofs.owned_ranges()[self.comm.rank()].len()
        );
        self.geometry = Some(Geometry { mesh, cells, dofs });
        self.state = ProblemState::GeometrySet;
        Ok(())
    }

    /// Collective: constraints, the one-time matrix assembly, and the
    /// preconditioner. The solution starts at zero.
    pub fn setup_matrices(&mut self) -> Result<(), CdrError> {
        if self.state != ProblemState::GeometrySet {
            return Err(self.invalid_state("GeometrySet"));
        }
        let geometry = self.geometry()?;
        let mut constraints = AffineConstraints::new();
        let hanging = make_hanging_node_constraints(&geometry.mesh, &geometry.dofs, &mut constraints)?;
        let dirichlet = make_zero_dirichlet_constraints(
            &geometry.mesh,
            &geometry.dofs,
            self.params.dirichlet_boundary,
            &mut constraints,
        );
        constraints.close()?;
        let partition = dof_partition(&geometry.cells, &geometry.dofs, &constraints)?;
        let constraints = constraints.restrict_to(partition.relevant());
        log::debug!(
            "rank {}: {hanging} hanging and {dirichlet} Dirichlet lines, {} relevant DoFs",
            self.comm.rank(),
            partition.relevant().len()
        );

        let importer = GhostImporter::new(partition.owned_ranges(), partition.ghosts(), &self.comm)?;
        let runtime = ElementRuntime::new(self.params.fe_order, self.params.quadrature_points());
        let matrix = self.assemble_with(geometry, &constraints, &partition, &runtime)?;
        let preconditioner = build_preconditioner(self.params.solver.preconditioner, &matrix)?;
        log::info!(
            "rank {}: system matrix with {} owned rows and {} nonzeros",
            self.comm.rank(),
            matrix.n_owned_rows(),
            matrix.n_nonzeros()
        );
        self.system = Some(LinearSystem {
            solution: DistributedVector::from_partition(&partition),
            ghosted: GhostedVector::new(&partition),
            constraints,
            partition,
            importer,
            runtime,
            matrix,
            preconditioner,
        });
        self.state = ProblemState::MatricesReady;
        Ok(())
    }

    fn assemble_with(
        &self,
        geometry: &Geometry,
        constraints: &AffineConstraints,
        partition: &DofPartition,
        runtime: &ElementRuntime,
    ) -> Result<DistributedMatrix, CdrError> {
        let ctx = AssemblyContext {
            mesh: &geometry.mesh,
            cells: &geometry.cells,
            dofs: &geometry.dofs,
            constraints,
            partition,
            runtime,
        };
        let coefficients = OperatorCoefficients {
            diffusion: self.params.diffusion_coefficient,
            reaction: self.params.reaction_coefficient,
            convection: &self.convection,
        };
        assemble_system_matrix(&ctx, &coefficients, self.time_step, &self.comm)
    }

    /// Collective: assemble the system matrix again from scratch, leaving the
    /// stored one untouched.
    pub fn assemble_matrix(&self) -> Result<DistributedMatrix, CdrError> {
        let geometry = self.geometry()?;
        let system = self
            .system
            .as_ref()
            .ok_or_else(|| self.invalid_state("MatricesReady"))?;
        self.assemble_with(geometry, &system.constraints, &system.partition, &system.runtime)
    }

    /// Collective: advance one step and write its checkpoint if due.
    ///
    /// A failed solve leaves the solution and both clocks as they were. A
    /// failed checkpoint keeps the new solution but not the state change.
    pub fn step(&mut self) -> Result<StepReport, CdrError> {
        let step = match self.state {
            ProblemState::MatricesReady => 0,
            ProblemState::Stepping(k) => k + 1,
            _ => return Err(self.invalid_state("MatricesReady or Stepping")),
        };
        let (time, forcing_time) = (self.time, self.forcing.time());
        let report = self.advance(step);
        // rewind the forcing clock only if the solution was not replaced
        if report.is_err() && self.time == time {
            self.forcing.set_time(forcing_time);
        }
        report
    }

    fn advance(&mut self, step: usize) -> Result<StepReport, CdrError> {
        let context = StepContext {
            step,
            time: self.time + self.time_step,
            time_step: self.time_step,
        };
        if self.params.time_dependent_forcing {
            self.forcing.advance_time(self.time_step);
        }

        let (Some(geometry), Some(system)) = (self.geometry.as_ref(), self.system.as_mut()) else {
            return Err(CdrError::InvalidState {
                expected: "MatricesReady",
                found: self.state.to_string(),
            });
        };
        let ctx = AssemblyContext {
            mesh: &geometry.mesh,
            cells: &geometry.cells,
            dofs: &geometry.dofs,
            constraints: &system.constraints,
            partition: &system.partition,
            runtime: &system.runtime,
        };
        let rhs = assemble_rhs(&ctx, &system.ghosted, &self.forcing, self.time_step, &self.comm)?;

        let settings = &self.params.solver;
        let n_dofs = geometry.dofs.n_dofs();
        let control = SolverControl {
            max_steps: settings.max_iterations.map_or(n_dofs, |cap| cap.min(n_dofs)),
            tolerance: settings.relative_tolerance * rhs.l2_norm(&self.comm)?,
        };
        let mut next = system.solution.clone();
        let stats = SolverGmres::new(settings.restart)
            .solve(
                control,
                &system.matrix,
                &mut next,
                &rhs,
                system.preconditioner.as_ref(),
                &self.comm,
            )
            .map_err(|err| match err {
                CdrError::SolverNotConverged {
                    iterations,
                    residual,
                    tolerance,
                    ..
                } => CdrError::SolverNotConverged {
                    step: Some(step),
                    iterations,
                    residual,
                    tolerance,
                },
                other => other,
            })?;
        system.solution = next;

        // constrained values need their columns, which may live elsewhere
        system
            .ghosted
            .update_ghosts(&system.solution, &system.importer, &self.comm)?;
        system.constraints.distribute(&mut system.ghosted)?;
        system.ghosted.copy_owned_into(&mut system.solution)?;
        system
            .ghosted
            .update_ghosts(&system.solution, &system.importer, &self.comm)?;

        self.time = context.time;
        self.total_iterations += stats.iterations;
        log::info!(
            "step {step}: t = {:.6}, {} GMRES iterations, residual {:e}",
            context.time,
            stats.iterations,
            stats.residual
        );

        let checkpoint = if self.params.is_checkpoint(step) {
            let patches = build_patches(
                &geometry.mesh,
                &geometry.cells,
                &geometry.dofs,
                &system.ghosted,
                self.params.patch_level,
            )?;
            let manifest = write_checkpoint(&self.params.output, step, &patches, &self.comm)?;
            self.checkpoints.push(manifest.clone());
            Some(manifest)
        } else {
            None
        };

        self.state = if step + 1 == self.params.n_time_steps {
            ProblemState::Done
        } else {
            ProblemState::Stepping(step)
        };
        Ok(StepReport {
            context,
            iterations: stats.iterations,
            residual: stats.residual,
            checkpoint,
        })
    }

    /// Collective: finish whatever setup is missing, then step until `Done`.
    pub fn run(&mut self) -> Result<RunSummary, CdrError> {
        if self.state == ProblemState::Uninitialized {
            self.setup_geometry()?;
        }
        if self.state == ProblemState::GeometrySet {
            self.setup_matrices()?;
        }
        let mut steps = 0;
        while self.state != ProblemState::Done {
            self.step()?;
            steps += 1;
        }
        log::info!(
            "run finished at t = {} after {steps} steps and {} GMRES iterations",
            self.time,
            self.total_iterations
        );
        Ok(RunSummary {
            steps,
            final_time: self.time,
            checkpoints: self.checkpoints.clone(),
            total_iterations: self.total_iterations,
        })
    }
}

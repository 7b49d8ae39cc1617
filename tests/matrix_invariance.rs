use shell_cdr::algs::communicator::run_spmd;
use shell_cdr::data::dof_handler::DofKey;
use shell_cdr::prelude::*;

mod util;

type Triplets = Vec<(usize, usize, f64)>;

fn triplets(matrix: &DistributedMatrix) -> Triplets {
    matrix.triplets()
}

#[test]
fn forcing_time_does_not_touch_the_matrix() {
    let params = Parameters {
        fe_order: 2,
        ..util::small_params("invariance-forcing")
    };
    let dir = params.output.directory.clone();
    let results = run_spmd(2, |comm| -> Result<(Triplets, Triplets, Triplets), CdrError> {
        let mut problem = CdrProblem::new(params.clone(), comm)?;
        problem.setup_geometry()?;
        problem.setup_matrices()?;
        let stored = problem.system_matrix().map(triplets).unwrap_or_default();
        problem.set_forcing_time(17.25);
        let perturbed = triplets(&problem.assemble_matrix()?);
        problem.set_forcing_time(params.start_time);
        problem.step()?;
        problem.step()?;
        let after_steps = triplets(&problem.assemble_matrix()?);
        Ok((stored, perturbed, after_steps))
    });
    for result in results {
        let (stored, perturbed, after_steps) = result.unwrap();
        assert!(!stored.is_empty());
        assert_eq!(stored, perturbed);
        assert_eq!(stored, after_steps);
    }
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn forcing_expression_does_not_touch_the_matrix() {
    let base = util::small_params("invariance-expression");
    let dir = base.output.directory.clone();
    let matrix_for = |forcing: &str| {
        let params = Parameters {
            forcing: forcing.to_string(),
            ..base.clone()
        };
        let mut problem = CdrProblem::new(params, NoComm).unwrap();
        problem.setup_geometry().unwrap();
        problem.setup_matrices().unwrap();
        problem.system_matrix().map(triplets).unwrap()
    };
    assert_eq!(matrix_for("0"), matrix_for("sin(pi*t)*x*y + 3"));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn summed_matrix_is_independent_of_rank_count() {
    let params = util::small_params("invariance-ranks");
    // global numbers depend on the rank count; lattice keys do not
    let gather = |ranks: usize| {
        let mut all: Vec<(DofKey, DofKey, f64)> = run_spmd(ranks, |comm| {
            let mut problem = CdrProblem::new(params.clone(), comm).unwrap();
            problem.setup_geometry().unwrap();
            problem.setup_matrices().unwrap();
            let dofs = problem.dof_handler().unwrap();
            problem
                .system_matrix()
                .unwrap()
                .triplets()
                .into_iter()
                .map(|(r, c, v)| (dofs.dof_key(r), dofs.dof_key(c), v))
                .collect::<Vec<_>>()
        })
        .concat();
        all.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        all
    };
    let serial = gather(1);
    for ranks in [2, 3] {
        let parallel = gather(ranks);
        assert_eq!(serial.len(), parallel.len());
        for (s, p) in serial.iter().zip(&parallel) {
            assert_eq!((s.0, s.1), (p.0, p.1));
            assert!((s.2 - p.2).abs() <= 1e-14 * s.2.abs().max(1.0));
        }
    }
}

use proptest::prelude::*;
use shell_cdr::data::bc::make_zero_dirichlet_constraints;
use shell_cdr::data::constraints::AffineConstraints;
use shell_cdr::data::dof_handler::DofHandler;
use shell_cdr::data::hanging_node_constraints::make_hanging_node_constraints;
use shell_cdr::prelude::CdrError;
use shell_cdr::topology::shell::ShellMesh;

mod util;

/// Level-1 shell with the first inner-layer cell refined once more.
fn locally_refined() -> ShellMesh {
    let mut mesh = util::shell(1);
    let target = mesh
        .cells()
        .iter()
        .position(|c| c.key.i == 0)
        .unwrap();
    mesh.refine_where(|_, c| c == target).unwrap();
    mesh
}

fn hanging(mesh: &ShellMesh, fe_order: usize) -> (DofHandler, AffineConstraints) {
    let dofs = DofHandler::distribute(mesh, fe_order, &vec![0; mesh.n_active_cells()], 1).unwrap();
    let mut constraints = AffineConstraints::new();
    make_hanging_node_constraints(mesh, &dofs, &mut constraints).unwrap();
    (dofs, constraints)
}

#[test]
fn q1_midpoints_average_the_coarse_face() {
    let mesh = locally_refined();
    let (_, constraints) = hanging(&mesh, 1);
    // inner boundary below, three coarser neighbours around
    assert_eq!(constraints.n_constraints(), 3);
    for line in constraints.lines() {
        assert_eq!(line.entries.len(), 2);
        assert!(line.entries.iter().all(|&(_, w)| (w - 0.5).abs() < 1e-15));
        assert_eq!(line.inhomogeneity, 0.0);
    }
}

#[test]
fn each_coarse_face_hangs_p_nodes() {
    let mesh = locally_refined();
    for p in 1..=3 {
        let (_, constraints) = hanging(&mesh, p);
        assert_eq!(constraints.n_constraints(), 3 * p);
    }
}

#[test]
fn radial_polynomials_are_reproduced() {
    let mesh = locally_refined();
    for p in 1..=3 {
        let (dofs, mut constraints) = hanging(&mesh, p);
        constraints.close().unwrap();
        let r_max = (0..dofs.n_dofs()).map(|d| dofs.dof_key(d).0).max().unwrap() as f64;
        let exact: Vec<f64> = (0..dofs.n_dofs())
            .map(|d| (dofs.dof_key(d).0 as f64 / r_max).powi(p as i32))
            .collect();
        let mut u = exact.clone();
        for line in constraints.lines() {
            u[line.index] = -1.0;
        }
        constraints.distribute(u.as_mut_slice()).unwrap();
        for (got, want) in u.iter().zip(&exact) {
            assert!((got - want).abs() < 1e-12, "Q{p}: {got} vs {want}");
        }
    }
}

#[test]
fn chains_resolve_on_close() {
    let mut c = AffineConstraints::new();
    c.add_line(0, vec![(1, 0.5)], 1.0);
    c.add_line(1, vec![(2, 2.0), (3, 1.0)], 0.5);
    c.close().unwrap();
    let line = c.line(0).unwrap();
    assert_eq!(line.entries, vec![(2, 1.0), (3, 0.5)]);
    assert!((line.inhomogeneity - 1.25).abs() < 1e-15);
}

#[test]
fn cycles_are_rejected() {
    let mut c = AffineConstraints::new();
    c.add_line(0, vec![(1, 1.0)], 0.0);
    c.add_line(1, vec![(0, 1.0)], 0.0);
    assert!(matches!(c.close(), Err(CdrError::ConstraintCycle(_))));
}

#[test]
fn distribute_needs_a_closed_set() {
    let mut c = AffineConstraints::new();
    c.add_line(0, Vec::new(), 2.0);
    let mut u = vec![0.0; 2];
    assert!(matches!(
        c.distribute(u.as_mut_slice()),
        Err(CdrError::ConstraintsNotClosed)
    ));
}

proptest! {
    #[test]
    fn distribute_is_idempotent(values in proptest::collection::vec(-10.0f64..10.0, 128)) {
        let mesh = locally_refined();
        let (dofs, mut constraints) = hanging(&mesh, 2);
        make_zero_dirichlet_constraints(&mesh, &dofs, 0, &mut constraints);
        constraints.close().unwrap();
        let mut u: Vec<f64> = (0..dofs.n_dofs()).map(|d| values[d % values.len()]).collect();
        constraints.distribute(u.as_mut_slice()).unwrap();
        let once = u.clone();
        constraints.distribute(u.as_mut_slice()).unwrap();
        prop_assert_eq!(once, u);
    }
}

use proptest::prelude::*;
use shell_cdr::algs::communicator::run_spmd;
use shell_cdr::algs::partition::{CellPartition, dof_partition};
use shell_cdr::data::constraints::AffineConstraints;
use shell_cdr::data::dof_handler::DofHandler;
use shell_cdr::data::hanging_node_constraints::make_hanging_node_constraints;
use shell_cdr::prelude::*;

mod util;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn owned_sets_tile_the_dofs(
        level in 0u32..3,
        fe_order in 1usize..4,
        n_ranks in 1usize..6,
        marked in proptest::collection::vec(any::<bool>(), 0..32),
    ) {
        let mut mesh = util::shell(level);
        // one extra level on the marked cells gives hanging nodes
        mesh.refine_where(|_, c| marked.get(c).copied().unwrap_or(false)).unwrap();
        let owners = CellPartition::new(&mesh, 0, n_ranks).unwrap().owners().to_vec();
        let dofs = DofHandler::distribute(&mesh, fe_order, &owners, n_ranks).unwrap();
        let mut constraints = AffineConstraints::new();
        make_hanging_node_constraints(&mesh, &dofs, &mut constraints).unwrap();
        constraints.close().unwrap();

        let mut owner_count = vec![0usize; dofs.n_dofs()];
        for rank in 0..n_ranks {
            let cells = CellPartition::new(&mesh, rank, n_ranks).unwrap();
            let partition = dof_partition(&cells, &dofs, &constraints).unwrap();
            for dof in partition.owned_range() {
                owner_count[dof] += 1;
            }
            prop_assert!(partition.locally_owned().is_subset_of(partition.relevant()));
            for cell in cells.owned_cells() {
                for &dof in dofs.cell_dofs(cell) {
                    prop_assert!(partition.relevant().contains(dof));
                    // DoFs go to the smallest rank touching them
                    prop_assert!(partition.owner_of(dof).unwrap() <= rank);
                }
            }
        }
        prop_assert!(owner_count.iter().all(|&n| n == 1));
    }
}

#[test]
fn live_ranks_agree_on_the_partition() {
    let params = util::small_params("partition-live");
    let parts = run_spmd(3, |comm| {
        let mut problem = CdrProblem::new(params.clone(), comm).unwrap();
        problem.setup_geometry().unwrap();
        problem.setup_matrices().unwrap();
        let partition = problem.dof_partition().unwrap();
        (partition.owned_ranges().to_vec(), partition.owned_range(), partition.n_dofs())
    });
    let n_dofs = parts[0].2;
    let mut next = 0;
    for (rank, (ranges, mine, n)) in parts.iter().enumerate() {
        assert_eq!(ranges, &parts[0].0);
        assert_eq!(*n, n_dofs);
        assert_eq!(mine, &ranges[rank]);
        assert_eq!(mine.start, next);
        next = mine.end;
    }
    assert_eq!(next, n_dofs);
}

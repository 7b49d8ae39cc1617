#![allow(dead_code)]
use shell_cdr::algs::partition::CellPartition;
use shell_cdr::data::dof_handler::DofHandler;
use shell_cdr::params::{OutputSettings, Parameters};
use shell_cdr::topology::manifold::SphericalManifold;
use shell_cdr::topology::shell::ShellMesh;
use std::path::PathBuf;

/// Fresh, empty scratch directory unique to this test process.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("shell-cdr-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

/// The end-to-end configuration: level 1, `Q1`, four steps, every step saved.
pub fn small_params(name: &str) -> Parameters {
    Parameters {
        refinement_level: 1,
        fe_order: 1,
        n_time_steps: 4,
        save_interval: 1,
        patch_level: 1,
        output: OutputSettings {
            directory: scratch_dir(name),
            basename: "solution".to_string(),
        },
        ..Parameters::default()
    }
}

/// Shell with radii 1 and 2, 8 sectors, the circle manifold on every cell.
pub fn shell(level: u32) -> ShellMesh {
    let mut mesh = ShellMesh::hyper_shell(1.0, 2.0, 8, false).unwrap();
    mesh.set_manifold(0, SphericalManifold::new([0.0, 0.0]));
    mesh.set_all_manifold_ids(0);
    mesh.refine_global(level).unwrap();
    mesh
}

/// DoFs of `mesh` numbered for `n_ranks` ranks, with rank 0's cell view.
pub fn numbered(mesh: &ShellMesh, fe_order: usize, n_ranks: usize) -> (CellPartition, DofHandler) {
    let cells = CellPartition::new(mesh, 0, n_ranks).unwrap();
    let dofs = DofHandler::distribute(mesh, fe_order, cells.owners(), n_ranks).unwrap();
    (cells, dofs)
}

use shell_cdr::algs::communicator::run_spmd;
use shell_cdr::io::{fragment_name, manifest_name, read_manifest_sources};
use shell_cdr::prelude::*;

mod util;

fn run_on(ranks: usize) {
    let params = util::small_params(&format!("e2e-{ranks}"));
    let dir = params.output.directory.clone();
    let results = run_spmd(ranks, |comm| -> Result<(RunSummary, f64), CdrError> {
        let mut problem = CdrProblem::new(params.clone(), comm)?;
        let summary = problem.run()?;
        let norm = problem
            .solution()
            .map(|u| u.linfty_norm(problem.comm()))
            .transpose()?
            .unwrap_or_default();
        Ok((summary, norm))
    });

    let mut norms = Vec::new();
    for result in results {
        let (summary, norm) = result.unwrap();
        assert_eq!(summary.steps, 4);
        assert!((summary.final_time - params.stop_time).abs() <= 1e-12 * params.stop_time);
        assert_eq!(summary.checkpoints.len(), 4);
        assert!(summary.total_iterations > 0);
        norms.push(norm);
    }
    // collective norm: identical on every rank, and the forcing made the field nonzero
    assert!(norms.iter().all(|&n| n == norms[0]));
    assert!(norms[0] > 0.0);

    for step in 0..4 {
        let manifest = dir.join(manifest_name("solution", step));
        let sources = read_manifest_sources(&manifest).unwrap();
        let expected: Vec<String> = (0..ranks).map(|r| fragment_name("solution", step, r)).collect();
        assert_eq!(sources, expected);
        for source in &sources {
            assert!(dir.join(source).is_file(), "missing fragment {source}");
        }
    }
    assert!(!dir.join(manifest_name("solution", 4)).exists());
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn four_checkpoints_on_one_rank() {
    run_on(1);
}

#[test]
fn four_checkpoints_on_two_ranks() {
    run_on(2);
}

#[test]
fn four_checkpoints_on_three_ranks() {
    run_on(3);
}

#[test]
fn save_interval_skips_steps_but_keeps_step_zero() {
    let params = Parameters {
        n_time_steps: 5,
        save_interval: 2,
        ..util::small_params("e2e-interval")
    };
    let dir = params.output.directory.clone();
    let mut problem = CdrProblem::new(params, NoComm).unwrap();
    let summary = problem.run().unwrap();
    let written: Vec<_> = summary
        .checkpoints
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(written, vec!["solution-0.pvtu", "solution-2.pvtu", "solution-4.pvtu"]);
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn elapsed_time_reaches_stop_time() {
    for (start, stop, steps) in [(0.0, 2.0, 7), (0.3, 1.0, 3), (-1.0, 0.5, 11)] {
        let params = Parameters {
            start_time: start,
            stop_time: stop,
            n_time_steps: steps,
            save_interval: 1000,
            ..util::small_params("e2e-clock")
        };
        let dir = params.output.directory.clone();
        let dt = params.time_step();
        let mut problem = CdrProblem::new(params, NoComm).unwrap();
        let summary = problem.run().unwrap();
        assert_eq!(summary.steps, steps);
        assert!((summary.final_time - stop).abs() < dt * 1e-9);
        assert!((problem.forcing_time() - stop).abs() < dt * 1e-9);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}

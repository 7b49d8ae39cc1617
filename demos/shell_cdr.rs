// The reference shell run on an in-process group of ranks.
// Run with `RUST_LOG=info cargo run --release --example shell_cdr -- 4`

use shell_cdr::prelude::*;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let ranks: usize = std::env::args()
        .nth(1)
        .map(|arg| arg.parse::<usize>())
        .transpose()?
        .unwrap_or(2);

    let params = Parameters {
        output: OutputSettings {
            directory: PathBuf::from("shell_cdr_output"),
            basename: "solution".to_string(),
        },
        ..Parameters::default()
    };
    println!(
        "running {} steps of size {} on {ranks} ranks",
        params.n_time_steps,
        params.time_step()
    );

    let results = run_spmd(ranks, |comm| -> Result<RunSummary, CdrError> {
        let mut problem = CdrProblem::new(params.clone(), comm)?;
        problem.run()
    });
    for (rank, result) in results.into_iter().enumerate() {
        let summary = result?;
        if rank == 0 {
            println!(
                "t = {} after {} steps, {} GMRES iterations, {} checkpoints (last: {})",
                summary.final_time,
                summary.steps,
                summary.total_iterations,
                summary.checkpoints.len(),
                summary
                    .checkpoints
                    .last()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default()
            );
        }
    }
    Ok(())
}

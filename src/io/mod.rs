//! Checkpoint output: one VTU fragment per rank plus a manifest from rank 0.

pub mod pvtu;
pub mod vtu;

pub use pvtu::{fragment_name, manifest_name, read_manifest_sources, write_pvtu};
pub use vtu::{Patches, build_patches, write_vtu};

use crate::algs::communicator::Communicator;
use crate::cdr_error::CdrError;
use crate::params::OutputSettings;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Rank that writes manifests.
pub const COORDINATOR: usize = 0;

fn write_file<F>(path: &Path, body: F) -> Result<(), CdrError>
where
    F: FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
{
    let file = File::create(path).map_err(|e| CdrError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    body(&mut writer)
        .and_then(|()| writer.flush())
        .map_err(|e| CdrError::io(path, e))
}

/// Turn a local result into a group-wide verdict: the local error on the
/// failing rank, [`CdrError::RemoteFailure`] everywhere else.
fn agree<C: Communicator + ?Sized>(
    local: Result<(), CdrError>,
    phase: &'static str,
    comm: &C,
) -> Result<(), CdrError> {
    let failed = comm.first_failed_rank(local.is_ok())?;
    local?;
    match failed {
        Some(rank) => Err(CdrError::RemoteFailure { rank, phase }),
        None => Ok(()),
    }
}

/// Collective: write this rank's fragment of checkpoint `step`, then the
/// manifest on the coordinator. Returns the manifest path.
pub fn write_checkpoint<C: Communicator + ?Sized>(
    settings: &OutputSettings,
    step: usize,
    patches: &Patches,
    comm: &C,
) -> Result<PathBuf, CdrError> {
    let dir = settings.directory.as_path();
    let fragment = dir.join(fragment_name(&settings.basename, step, comm.rank()));
    let local = fs::create_dir_all(dir)
        .map_err(|e| CdrError::io(dir, e))
        .and_then(|()| write_file(&fragment, |w| write_vtu(w, patches)));
    agree(local, "write fragment", comm)?;

    let manifest = dir.join(manifest_name(&settings.basename, step));
    let local = if comm.rank() == COORDINATOR {
        let sources: Vec<String> = (0..comm.size())
            .map(|rank| fragment_name(&settings.basename, step, rank))
            .collect();
        write_file(&manifest, |w| write_pvtu(w, &sources))
    } else {
        Ok(())
    };
    agree(local, "write manifest", comm)?;
    log::debug!("checkpoint {step} written to {}", manifest.display());
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::run_spmd;

    fn patches(rank: usize) -> Patches {
        Patches {
            n_subdivisions: 1,
            points: vec![[1.0, 0.0], [2.0, 0.0], [0.0, 1.0], [0.0, 2.0]],
            values: vec![0.0; 4],
            subdomain: vec![rank as f32],
        }
    }

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("shell-cdr-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn every_rank_writes_one_fragment() {
        let settings = OutputSettings {
            directory: scratch("io-fragments"),
            basename: "ckpt".to_string(),
        };
        let manifests = run_spmd(3, |comm| {
            write_checkpoint(&settings, 5, &patches(comm.rank()), &comm).unwrap()
        });
        assert!(manifests.iter().all(|m| m == &manifests[0]));
        let sources = read_manifest_sources(&manifests[0]).unwrap();
        assert_eq!(sources.len(), 3);
        for source in sources {
            assert!(settings.directory.join(source).is_file());
        }
        fs::remove_dir_all(&settings.directory).unwrap();
    }

    #[test]
    fn unwritable_directory_fails_on_every_rank() {
        let blocker = scratch("io-blocker");
        fs::write(&blocker, b"not a directory").unwrap();
        let settings = OutputSettings {
            directory: blocker.join("nested"),
            basename: "ckpt".to_string(),
        };
        let results = run_spmd(2, |comm| write_checkpoint(&settings, 0, &patches(comm.rank()), &comm));
        assert!(results.iter().all(|r| r.is_err()));
        assert!(results[0].as_ref().unwrap_err().is_io());
        fs::remove_file(&blocker).unwrap();
    }
}

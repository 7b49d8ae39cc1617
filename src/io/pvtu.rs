//! Checkpoint naming and the parallel manifest (`.pvtu`).

use crate::cdr_error::CdrError;
use std::io::Write;
use std::path::Path;

/// Fragment written by `rank` at checkpoint `step`.
pub fn fragment_name(basename: &str, step: usize, rank: usize) -> String {
    format!("{basename}-{step}.{rank:04}.vtu")
}

/// Manifest of checkpoint `step`.
pub fn manifest_name(basename: &str, step: usize) -> String {
    format!("{basename}-{step}.pvtu")
}

/// Serialize a manifest referencing `sources` (relative to the manifest).
pub fn write_pvtu<W: Write, S: AsRef<str>>(writer: &mut W, sources: &[S]) -> std::io::Result<()> {
    writeln!(writer, "<?xml version=\"1.0\"?>")?;
    writeln!(
        writer,
        "<VTKFile type=\"PUnstructuredGrid\" version=\"0.1\" byte_order=\"LittleEndian\">"
    )?;
    writeln!(writer, "  <PUnstructuredGrid GhostLevel=\"0\">")?;
    writeln!(writer, "    <PPointData Scalars=\"u\">")?;
    writeln!(writer, "      <PDataArray type=\"Float64\" Name=\"u\"/>")?;
    writeln!(writer, "    </PPointData>")?;
    writeln!(writer, "    <PCellData Scalars=\"subdomain\">")?;
    writeln!(writer, "      <PDataArray type=\"Float32\" Name=\"subdomain\"/>")?;
    writeln!(writer, "    </PCellData>")?;
    writeln!(writer, "    <PPoints>")?;
    writeln!(writer, "      <PDataArray type=\"Float64\" NumberOfComponents=\"3\"/>")?;
    writeln!(writer, "    </PPoints>")?;
    for source in sources {
        writeln!(writer, "    <Piece Source=\"{}\"/>", source.as_ref())?;
    }
    writeln!(writer, "  </PUnstructuredGrid>")?;
    writeln!(writer, "</VTKFile>")
}

/// Fragment file names listed in a manifest, in order.
pub fn parse_manifest_sources(text: &str) -> Vec<String> {
    const KEY: &str = "Source=\"";
    let mut sources = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find(KEY) {
        rest = &rest[start + KEY.len()..];
        let Some(end) = rest.find('"') else {
            break;
        };
        sources.push(rest[..end].to_string());
        rest = &rest[end + 1..];
    }
    sources
}

/// Read the fragment names listed in the manifest at `path`.
pub fn read_manifest_sources(path: impl AsRef<Path>) -> Result<Vec<String>, CdrError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| CdrError::io(path, e))?;
    Ok(parse_manifest_sources(&text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_zero_padded() {
        assert_eq!(fragment_name("solution", 12, 3), "solution-12.0003.vtu");
        assert_eq!(manifest_name("solution", 0), "solution-0.pvtu");
    }

    #[test]
    fn manifest_lists_sources_in_rank_order() {
        let sources: Vec<String> = (0..3).map(|r| fragment_name("run", 4, r)).collect();
        let mut out = Vec::new();
        write_pvtu(&mut out, &sources).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("PUnstructuredGrid"));
        assert_eq!(parse_manifest_sources(&text), sources);
    }
}

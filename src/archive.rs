//! Multi-table archive assembly.
//!
//! Packs formatted artifacts into a single deflate zip held in memory. Entry
//! names never collide: names are compared case-insensitively and a clashing
//! artifact gets a numeric suffix before its extension (`sales.csv`,
//! `sales-2.csv`, …). Nothing is ever overwritten.

use std::collections::HashSet;
use std::io::{Cursor, Write as _};
use tracing::debug;

use crate::error::ExportError;

/// One formatted output file for a single table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub name: String,
    pub bytes: Vec<u8>,
    pub row_count: usize,
}

/// Zip `artifacts` in order and return the archive bytes.
pub fn build_archive(artifacts: &[Artifact]) -> Result<Vec<u8>, ExportError> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    let mut taken = HashSet::new();
    for artifact in artifacts {
        let entry = unique_entry_name(&artifact.name, &mut taken);
        if entry != artifact.name {
            debug!(original = %artifact.name, entry = %entry, "renamed colliding archive entry");
        }
        zip.start_file(entry, options)?;
        zip.write_all(&artifact.bytes)?;
    }

    Ok(zip.finish()?.into_inner())
}

/// Reserve a name in `taken` that does not clash (case-insensitively) with
/// any earlier one.
fn unique_entry_name(name: &str, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.to_lowercase()) {
        return name.to_string();
    }
    let (stem, ext) = match name.rfind('.') {
        Some(dot) if dot > 0 => name.split_at(dot),
        _ => (name, ""),
    };
    let mut n = 2;
    loop {
        let candidate = format!("{stem}-{n}{ext}");
        if taken.insert(candidate.to_lowercase()) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read as _;

    fn artifact(name: &str, body: &str) -> Artifact {
        Artifact {
            name: name.to_string(),
            bytes: body.as_bytes().to_vec(),
            row_count: 1,
        }
    }

    #[test]
    fn test_archive_keeps_order_and_contents() {
        let bytes = build_archive(&[
            artifact("sales.csv", "id\r\n1\r\n"),
            artifact("customers.csv", "id\r\n2\r\n"),
        ])
        .unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);
        let mut first = archive.by_index(0).unwrap();
        assert_eq!(first.name(), "sales.csv");
        assert_eq!(first.compression(), zip::CompressionMethod::Deflated);
        let mut body = String::new();
        first.read_to_string(&mut body).unwrap();
        assert_eq!(body, "id\r\n1\r\n");
    }

    #[test]
    fn test_colliding_names_get_suffixes() {
        let bytes = build_archive(&[
            artifact("sales.csv", "a"),
            artifact("SALES.csv", "b"),
            artifact("sales.csv", "c"),
        ])
        .unwrap();
        let archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let names: Vec<&str> = archive.file_names().collect();
        assert_eq!(archive.len(), 3);
        assert!(names.contains(&"sales.csv"));
        assert!(names.contains(&"SALES-2.csv"));
        assert!(names.contains(&"sales-3.csv"));
    }

    #[test]
    fn test_unique_name_without_extension() {
        let mut taken = HashSet::new();
        assert_eq!(unique_entry_name("notes", &mut taken), "notes");
        assert_eq!(unique_entry_name("Notes", &mut taken), "Notes-2");
        assert_eq!(unique_entry_name(".hidden", &mut taken), ".hidden");
        assert_eq!(unique_entry_name(".hidden", &mut taken), ".hidden-2");
    }

    #[test]
    fn test_empty_archive_is_valid_zip() {
        let bytes = build_archive(&[]).unwrap();
        let archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 0);
    }
}

//! JSON-lines dump reader
//!
//! A dump is a file, or a directory tree of files, holding one document
//! record per line. Files ending in `.bz2` are decompressed on the fly.

use crate::errors::IngestionError;
use bridgehop_common::DocumentRecord;
use bzip2::read::MultiBzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Records parsed from one dump file
#[derive(Debug, Default)]
pub struct DumpFile {
    pub records: Vec<DocumentRecord>,
    /// Records without paragraphs
    pub empty: usize,
    /// Records that failed to parse or validate
    pub rejected: usize,
}

/// Every dump file under `path`, sorted. Hidden entries are skipped.
pub fn dump_files(path: &Path) -> Result<Vec<PathBuf>, IngestionError> {
    if !path.exists() {
        return Err(IngestionError::DumpNotFound(path.display().to_string()));
    }
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    let mut pending = vec![path.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let entry_path = entry.path();
            let hidden = entry
                .file_name()
                .to_str()
                .map(|n| n.starts_with('.'))
                .unwrap_or(false);
            if hidden {
                continue;
            }
            if entry_path.is_dir() {
                pending.push(entry_path);
            } else {
                files.push(entry_path);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Parse one dump file. Bad lines are logged and counted, never fatal.
pub fn read_dump(path: &Path) -> Result<DumpFile, IngestionError> {
    let file = File::open(path).map_err(|e| IngestionError::DumpRead {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let reader: Box<dyn BufRead> = if is_bz2(path) {
        Box::new(BufReader::new(MultiBzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    let mut dump = DumpFile::default();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| IngestionError::DumpRead {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if line.trim().is_empty() {
            continue;
        }

        let record = match serde_json::from_str::<DocumentRecord>(&line) {
            Ok(record) => record,
            Err(e) => {
                warn!(path = %path.display(), line = line_no + 1, error = %e, "Skipping unparsable record");
                dump.rejected += 1;
                continue;
            }
        };

        if record.paragraphs.is_empty() {
            dump.empty += 1;
            continue;
        }

        match record.into_normalized() {
            Ok(record) => dump.records.push(record),
            Err(e) => {
                warn!(path = %path.display(), line = line_no + 1, error = %e, "Rejecting record");
                dump.rejected += 1;
            }
        }
    }

    debug!(
        path = %path.display(),
        records = dump.records.len(),
        empty = dump.empty,
        rejected = dump.rejected,
        "Dump file read"
    );
    Ok(dump)
}

fn is_bz2(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "bz2")
}

#[cfg(test)]
mod tests {
    use super::*;
    use bzip2::write::BzEncoder;
    use bzip2::Compression;
    use std::io::Write;

    #[test]
    fn test_read_dump_skips_and_rejects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wiki_00");
        let mut file = File::create(&path).unwrap();
        writeln!(
            file,
            r#"{{"id": "Beyoncé", "url": "https://en.wikipedia.org/wiki?curid=1", "title": "Beyoncé", "text": ["Beyoncé sings."], "text_with_links": ["Beyoncé sings."]}}"#
        )
        .unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"id": "Empty", "title": "Empty", "text": [], "text_with_links": []}}"#).unwrap();
        writeln!(file, r#"{{"id": "Bad", "title": "Bad", "text": ["a", "b"], "text_with_links": ["a"]}}"#).unwrap();
        writeln!(file, "not json").unwrap();
        drop(file);

        let dump = read_dump(&path).unwrap();
        assert_eq!(dump.records.len(), 1);
        assert_eq!(dump.records[0].id, "Beyonce\u{301}");
        assert_eq!(dump.empty, 1);
        assert_eq!(dump.rejected, 2);
    }

    #[test]
    fn test_read_bz2_dump() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wiki_00.bz2");
        let mut encoder = BzEncoder::new(File::create(&path).unwrap(), Compression::default());
        writeln!(
            encoder,
            r#"{{"id": "Honolulu", "title": "Honolulu", "text": ["Honolulu is in Hawaii."], "text_with_links": ["Honolulu is in <a href=\"Hawaii\">Hawaii</a>."]}}"#
        )
        .unwrap();
        writeln!(encoder, r#"{{"id": "Empty", "title": "Empty", "text": [], "text_with_links": []}}"#).unwrap();
        encoder.finish().unwrap();

        let dump = read_dump(&path).unwrap();
        assert_eq!(dump.records.len(), 1);
        assert_eq!(dump.records[0].id, "Honolulu");
        assert_eq!(dump.empty, 1);
        assert_eq!(dump.rejected, 0);
    }

    #[test]
    fn test_corrupt_bz2_dump_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wiki_01.bz2");
        std::fs::write(&path, b"not bzip2 data").unwrap();

        let err = read_dump(&path).unwrap_err();
        assert!(matches!(err, IngestionError::DumpRead { .. }));
    }

    #[test]
    fn test_dump_files_walks_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("AB")).unwrap();
        std::fs::create_dir(dir.path().join("AA")).unwrap();
        File::create(dir.path().join("AB").join("wiki_00")).unwrap();
        File::create(dir.path().join("AA").join("wiki_01")).unwrap();
        File::create(dir.path().join("AA").join("wiki_00")).unwrap();
        File::create(dir.path().join(".DS_Store")).unwrap();

        let files = dump_files(dir.path()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().display().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                format!("AA{}wiki_00", std::path::MAIN_SEPARATOR),
                format!("AA{}wiki_01", std::path::MAIN_SEPARATOR),
                format!("AB{}wiki_00", std::path::MAIN_SEPARATOR),
            ]
        );
    }

    #[test]
    fn test_missing_dump_path() {
        let err = dump_files(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, IngestionError::DumpNotFound(_)));
    }
}

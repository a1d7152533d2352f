use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::record::InfoboxRecord;
use crate::store::load_record;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub loaded: usize,
    pub empty: usize,
    /// Files that couldn't be read or parsed as a record.
    pub malformed: Vec<PathBuf>,
}

/// Loads every stored result under `dir`, calling `on_record` with a running count.
///
/// Empty files are ignored, unreadable or malformed ones are logged and skipped.
pub fn scan_results<P, F>(dir: P, mut on_record: F) -> Result<ScanSummary>
where
    P: AsRef<Path>,
    F: FnMut(usize, &Path, InfoboxRecord),
{
    let pattern = format!(
        "{}/**/*",
        glob::Pattern::escape(&dir.as_ref().to_string_lossy())
    );

    let mut summary = ScanSummary::default();
    for entry in glob::glob(&pattern)? {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                log::warn!("Skipping unreadable path {}: {e}", e.path().display());
                summary.malformed.push(e.path().to_path_buf());
                continue;
            }
        };
        if !path.is_file() {
            continue;
        }
        if fs_err::metadata(&path).map(|m| m.len() == 0).unwrap_or(false) {
            summary.empty += 1;
            continue;
        }

        match load_record(&path) {
            Ok(record) => {
                summary.loaded += 1;
                on_record(summary.loaded, &path, record);
            }
            Err(e) => {
                log::warn!("Error in load file = {} got: {e:#}", path.display());
                summary.malformed.push(path);
            }
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FsStore;

    #[test]
    fn malformed_and_empty_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        store.persist(&InfoboxRecord::named("United States Army")).unwrap();
        store.persist(&InfoboxRecord::named("United States Navy")).unwrap();
        fs_err::write(dir.path().join("enwiki_empty.json"), "").unwrap();
        fs_err::write(dir.path().join("enwiki_truncated.json"), "{\"Name\": \"Pent").unwrap();
        fs_err::create_dir_all(dir.path().join("old")).unwrap();
        fs_err::write(dir.path().join("old/enwiki_list.json"), "[1, 2]").unwrap();

        let mut names = vec![];
        let summary = scan_results(dir.path(), |count, _, record| {
            names.push((count, record.name().unwrap_or_default().to_string()));
        })
        .unwrap();

        assert_eq!(summary.loaded, 2);
        assert_eq!(summary.empty, 1);
        assert_eq!(summary.malformed.len(), 2);
        assert_eq!(
            names,
            vec![
                (1, "United States Army".to_string()),
                (2, "United States Navy".to_string())
            ]
        );
    }
}

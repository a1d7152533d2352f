use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use sha2::{Digest, Sha256};

use crate::record::InfoboxRecord;

const FILE_PREFIX: &str = "enwiki_";
const FILE_EXTENSION: &str = "json";
const MAX_SLUG_BYTES: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Persisted {
    Written(PathBuf),
    /// Another worker stored this keyword first.
    AlreadyExists(PathBuf),
}

/// One JSON file per keyword, the file existence being the "already done" marker.
#[derive(Debug, Clone)]
pub struct FsStore {
    dir: PathBuf,
}

impl FsStore {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs_err::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, keyword: &str) -> PathBuf {
        self.dir.join(file_name(keyword))
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.path_for(keyword).exists()
    }

    /// Writes the record under its `Name`, unless a result for it already exists.
    pub fn persist(&self, record: &InfoboxRecord) -> Result<Persisted> {
        let keyword = record
            .name()
            .ok_or_else(|| anyhow!("Cannot persist a record without name: {record:?}"))?;
        let path = self.path_for(keyword);

        let file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Ok(Persisted::AlreadyExists(path))
            }
            Err(e) => {
                return Err(anyhow::Error::new(e).context(format!(
                    "Couldn't create {}",
                    path.display()
                )))
            }
        };

        let mut wtr = BufWriter::new(file);
        let written = serde_json::to_writer(&mut wtr, record)
            .map_err(anyhow::Error::from)
            .and_then(|()| wtr.flush().map_err(anyhow::Error::from));
        if let Err(e) = written {
            fs_err::remove_file(&path).ok();
            return Err(e.context(format!("Couldn't write {}", path.display())));
        }

        Ok(Persisted::Written(path))
    }

    pub fn load(&self, keyword: &str) -> Result<InfoboxRecord> {
        load_record(self.path_for(keyword))
    }
}

pub fn load_record<P: AsRef<Path>>(path: P) -> Result<InfoboxRecord> {
    let data = fs_err::read_to_string(path.as_ref())?;
    let record = serde_json::from_str(&data)
        .with_context(|| format!("Malformed record {}", path.as_ref().display()))?;
    Ok(record)
}

/// Deterministic, filesystem safe file name of a keyword.
///
/// The readable slug alone may collide (`a/b` and `a_b`), the digest suffix keeps names unique.
/// The slug is capped in bytes, file systems limit names to 255 bytes.
pub fn file_name(keyword: &str) -> String {
    let mut slug = String::new();
    for c in keyword.chars() {
        let c = if c.is_alphanumeric() || c == '-' || c == '_' {
            c
        } else {
            '_'
        };
        if slug.len() + c.len_utf8() > MAX_SLUG_BYTES {
            break;
        }
        slug.push(c);
    }
    let digest = Sha256::digest(keyword.as_bytes());
    let hash: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();
    format!("{FILE_PREFIX}{slug}_{hash}.{FILE_EXTENSION}")
}

//! Seam to the packed-container reader.
//!
//! The proprietary archive format is an external collaborator; the loader
//! only needs named entries and their bytes. [`DirArchive`] serves the same
//! interface from an extracted directory tree so tools and tests can run
//! without the container reader.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use memmap2::MmapOptions;
use walkdir::WalkDir;

/// Read access to named archive entries.
pub trait ArchiveSource: Send + Sync {
    /// Entry names matching a `*suffix` pattern (or an exact name).
    fn file_names(&self, pattern: &str) -> Vec<String>;

    /// Bytes of a single entry, by name.
    fn read_file(&self, name: &str) -> Result<Vec<u8>>;

    fn contains(&self, name: &str) -> bool;
}

/// Case-insensitive `*suffix` match; any other pattern is an exact name.
pub fn name_matches(name: &str, pattern: &str) -> bool {
    match pattern.strip_prefix('*') {
        Some(suffix) => {
            name.len() >= suffix.len()
                && name[name.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
        }
        None => name.eq_ignore_ascii_case(pattern),
    }
}

#[derive(Debug)]
struct DirEntryRecord {
    name: String,
    path: PathBuf,
}

/// Archive backed by an extracted directory tree. Entry names are bare file
/// names; lookups are case-insensitive like the source container's.
#[derive(Debug)]
pub struct DirArchive {
    root: PathBuf,
    entries: Vec<DirEntryRecord>,
}

impl DirArchive {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            bail!("{} is not a directory", root.display());
        }
        let mut entries = Vec::new();
        for entry in WalkDir::new(&root) {
            let entry =
                entry.with_context(|| format!("scanning archive dir {}", root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            entries.push(DirEntryRecord {
                name,
                path: entry.path().to_path_buf(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(DirArchive { root, entries })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn find(&self, name: &str) -> Option<&DirEntryRecord> {
        self.entries
            .iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(name))
    }
}

impl ArchiveSource for DirArchive {
    fn file_names(&self, pattern: &str) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| name_matches(&entry.name, pattern))
            .map(|entry| entry.name.clone())
            .collect()
    }

    fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        let entry = self
            .find(name)
            .with_context(|| format!("archive has no entry named {name:?}"))?;
        let file = File::open(&entry.path)
            .with_context(|| format!("opening {}", entry.path.display()))?;
        let mmap = unsafe { MmapOptions::new().map(&file) }
            .with_context(|| format!("memory-mapping {}", entry.path.display()))?;
        Ok(mmap.to_vec())
    }

    fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn pattern_matching_rules() {
        assert!(name_matches("terr01.rfgzone_pc", "*.rfgzone_pc"));
        assert!(name_matches("TERR01.RFGZONE_PC", "*.rfgzone_pc"));
        assert!(!name_matches("terr01.layer_pc", "*.rfgzone_pc"));
        assert!(name_matches("exact.bin", "exact.bin"));
        assert!(!name_matches("other.bin", "exact.bin"));
    }

    #[test]
    fn dir_archive_lists_and_reads_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alpha.rfgzone_pc");
        let mut file = File::create(&path).unwrap();
        file.write_all(b"payload").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/beta.cterrain_pc"), b"terrain").unwrap();

        let archive = DirArchive::open(dir.path()).unwrap();
        assert_eq!(archive.len(), 2);
        assert_eq!(archive.file_names("*.rfgzone_pc"), vec!["alpha.rfgzone_pc"]);
        assert!(archive.contains("ALPHA.rfgzone_pc"));
        assert_eq!(archive.read_file("alpha.rfgzone_pc").unwrap(), b"payload");
        assert_eq!(
            archive.read_file("beta.cterrain_pc").unwrap(),
            b"terrain"
        );
        assert!(archive.read_file("missing.bin").is_err());
    }
}

//! Safe extraction of gzip-compressed tar payloads.
//!
//! Entries are confined to the destination directory, individual file sizes
//! are capped, and permissions are normalised. Anything other than regular
//! files and directories (links, devices, fifos) is skipped.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::EntryType;

use crate::error::ArchiveError;

/// Per-entry size cap applied when none is configured.
pub const DEFAULT_MAX_ENTRY_SIZE: u64 = 20 * 1024 * 1024;

const DIR_MODE: u32 = 0o755;
const FILE_MODE: u32 = 0o644;

/// Extracts tar.gz streams into a directory.
#[derive(Debug, Clone, Copy)]
pub struct Extractor {
    max_entry_size: u64,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRY_SIZE)
    }
}

impl Extractor {
    pub fn new(max_entry_size: u64) -> Self {
        Self { max_entry_size }
    }

    /// Extracts the archive at `archive` into `dest`, returning the number
    /// of files written.
    pub fn extract_file(&self, archive: &Path, dest: &Path) -> Result<usize, ArchiveError> {
        let file = File::open(archive).map_err(|source| ArchiveError::Open {
            path: archive.to_path_buf(),
            source,
        })?;
        self.extract_reader(io::BufReader::new(file), dest)
    }

    /// Extracts a gzip-compressed tar stream into `dest`.
    pub fn extract_reader<R: Read>(&self, reader: R, dest: &Path) -> Result<usize, ArchiveError> {
        create_dir(dest).map_err(|source| ArchiveError::Write {
            path: dest.to_path_buf(),
            source,
        })?;

        let mut archive = tar::Archive::new(GzDecoder::new(reader));
        let mut written = 0;

        for entry in archive.entries().map_err(ArchiveError::Read)? {
            let mut entry = entry.map_err(ArchiveError::Read)?;
            let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
            let target = join_within(dest, Path::new(&name))
                .ok_or_else(|| ArchiveError::PathEscape { entry: name.clone() })?;

            match entry.header().entry_type() {
                EntryType::Directory => {
                    if target == dest {
                        continue;
                    }
                    create_dir(&target).map_err(|source| ArchiveError::Write {
                        path: target.clone(),
                        source,
                    })?;
                }
                EntryType::Regular | EntryType::Continuous => {
                    if target == dest {
                        return Err(ArchiveError::PathEscape { entry: name });
                    }
                    if entry.size() > self.max_entry_size {
                        return Err(ArchiveError::EntryTooLarge {
                            entry: name,
                            limit: self.max_entry_size,
                        });
                    }
                    self.write_entry(&mut entry, &name, &target)?;
                    written += 1;
                }
                other => {
                    log::debug!("Skipping tar entry {:?} of type {:?}", name, other);
                }
            }
        }

        Ok(written)
    }

    fn write_entry<R: Read>(&self, entry: &mut R, name: &str, target: &Path) -> Result<(), ArchiveError> {
        let write_err = |source| ArchiveError::Write {
            path: target.to_path_buf(),
            source,
        };

        if let Some(parent) = target.parent() {
            create_dir(parent).map_err(write_err)?;
        }

        let mut file = create_file(target).map_err(write_err)?;
        // Read one byte past the cap so an understated header size is caught.
        let copied = io::copy(&mut entry.take(self.max_entry_size + 1), &mut file)
            .map_err(ArchiveError::Read)?;
        if copied > self.max_entry_size {
            drop(file);
            let _ = fs::remove_file(target);
            return Err(ArchiveError::EntryTooLarge {
                entry: name.to_string(),
                limit: self.max_entry_size,
            });
        }
        Ok(())
    }
}

/// Lexically joins `relative` onto `root`.
///
/// Leading separators and `.` components are dropped. Returns `None` when a
/// `..` component would climb above `root`. The result may equal `root`.
pub fn join_within(root: &Path, relative: &Path) -> Option<PathBuf> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }

    let mut target = root.to_path_buf();
    target.extend(parts);
    Some(target)
}

fn create_dir(path: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(DIR_MODE);
    }
    builder.create(path)
}

fn create_file(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(FILE_MODE);
    }
    options.open(path)
}

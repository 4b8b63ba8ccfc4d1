//! Package archive containers
//!
//! Extraction only needs to list entries and read them back, so archives are
//! accessed through the [`ArchiveContainer`] capability. Package archives
//! are zip files; gzipped tarballs are also accepted.

use flate2::read::GzDecoder;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use thiserror::Error;
use zip::ZipArchive;

/// Errors that can occur while opening or reading an archive
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Bytes are not a recognised container format
    #[error("Unrecognized archive format")]
    UnrecognizedFormat,

    /// Zip container could not be read
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// IO error while reading entries
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Requested entry does not exist
    #[error("Entry not found in archive: {0}")]
    EntryNotFound(String),
}

/// A file entry inside an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Normalized path using `/` separators
    pub path: String,
    /// Uncompressed size in bytes
    pub size: u64,
}

impl ArchiveEntry {
    /// Final path component
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Name of the folder directly containing the entry, if any
    pub fn parent_folder(&self) -> Option<&str> {
        let mut components = self.path.rsplit('/');
        components.next();
        components.next()
    }

    /// Lower-cased file extension without the dot
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name();
        name.rsplit_once('.')
            .filter(|(stem, _)| !stem.is_empty())
            .map(|(_, ext)| ext.to_ascii_lowercase())
    }
}

/// Read access to the files inside an archive
pub trait ArchiveContainer {
    /// List file entries (directories are skipped)
    fn entries(&mut self) -> Result<Vec<ArchiveEntry>, ArchiveError>;

    /// Open an entry by its normalized path
    fn open_entry(&mut self, path: &str) -> Result<Box<dyn Read + '_>, ArchiveError>;

    /// Read an entry fully into memory
    fn read_entry(&mut self, path: &str) -> Result<Vec<u8>, ArchiveError> {
        let mut reader = self.open_entry(path)?;
        let mut content = Vec::new();
        reader.read_to_end(&mut content)?;
        Ok(content)
    }
}

/// Normalize an entry path to forward slashes without a leading `./` or `/`
pub fn normalize_entry_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    let mut trimmed = path.as_str();
    loop {
        if let Some(rest) = trimmed.strip_prefix("./") {
            trimmed = rest;
        } else if let Some(rest) = trimmed.strip_prefix('/') {
            trimmed = rest;
        } else {
            break;
        }
    }
    trimmed.to_string()
}

/// Zip-backed container (package archives)
pub struct ZipContainer {
    archive: ZipArchive<Cursor<Vec<u8>>>,
    /// Normalized path to entry index; the first of duplicate paths wins
    index: HashMap<String, usize>,
}

impl ZipContainer {
    pub fn new(bytes: Vec<u8>) -> Result<Self, ArchiveError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut index = HashMap::with_capacity(archive.len());
        for i in 0..archive.len() {
            let entry = archive.by_index_raw(i)?;
            if entry.is_dir() {
                continue;
            }
            index.entry(normalize_entry_path(entry.name())).or_insert(i);
        }
        Ok(Self { archive, index })
    }
}

impl ArchiveContainer for ZipContainer {
    fn entries(&mut self) -> Result<Vec<ArchiveEntry>, ArchiveError> {
        let mut entries = Vec::with_capacity(self.index.len());
        for i in 0..self.archive.len() {
            let entry = self.archive.by_index_raw(i)?;
            if entry.is_dir() {
                continue;
            }
            let path = normalize_entry_path(entry.name());
            if self.index.get(&path) != Some(&i) {
                continue;
            }
            entries.push(ArchiveEntry {
                path,
                size: entry.size(),
            });
        }
        Ok(entries)
    }

    fn open_entry(&mut self, path: &str) -> Result<Box<dyn Read + '_>, ArchiveError> {
        let index = *self
            .index
            .get(path)
            .ok_or_else(|| ArchiveError::EntryNotFound(path.to_string()))?;
        Ok(Box::new(self.archive.by_index(index)?))
    }
}

/// Gzipped tarball container
///
/// Tar streams cannot be randomly accessed, so files are buffered on open.
pub struct TarGzContainer {
    files: Vec<(String, Vec<u8>)>,
}

impl TarGzContainer {
    pub fn new(bytes: &[u8]) -> Result<Self, ArchiveError> {
        let mut archive = tar::Archive::new(GzDecoder::new(bytes));
        let mut files = Vec::new();

        for entry in archive.entries()? {
            let mut entry = entry?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let path = normalize_entry_path(&entry.path()?.to_string_lossy());
            let mut content = Vec::new();
            entry.read_to_end(&mut content)?;
            files.push((path, content));
        }

        Ok(Self { files })
    }
}

impl ArchiveContainer for TarGzContainer {
    fn entries(&mut self) -> Result<Vec<ArchiveEntry>, ArchiveError> {
        Ok(self
            .files
            .iter()
            .map(|(path, content)| ArchiveEntry {
                path: path.clone(),
                size: content.len() as u64,
            })
            .collect())
    }

    fn open_entry(&mut self, path: &str) -> Result<Box<dyn Read + '_>, ArchiveError> {
        let (_, content) = self
            .files
            .iter()
            .find(|(name, _)| name == path)
            .ok_or_else(|| ArchiveError::EntryNotFound(path.to_string()))?;
        Ok(Box::new(Cursor::new(content.as_slice())))
    }
}

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const ZIP_EMPTY_MAGIC: &[u8] = b"PK\x05\x06";
const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];

/// Open archive bytes, sniffing the container format
pub fn open_archive(bytes: Vec<u8>) -> Result<Box<dyn ArchiveContainer>, ArchiveError> {
    if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(ZIP_EMPTY_MAGIC) {
        Ok(Box::new(ZipContainer::new(bytes)?))
    } else if bytes.starts_with(GZIP_MAGIC) {
        Ok(Box::new(TarGzContainer::new(&bytes)?))
    } else {
        Err(ArchiveError::UnrecognizedFormat)
    }
}

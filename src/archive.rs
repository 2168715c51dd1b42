//! Archive Reader
//!
//! Thin random-access layer over the EPUB's ZIP container. Entry names are kept
//! exactly as stored in the central directory; lookups that need to be tolerant
//! (backslashes, wrong case, guessed root folders) are built on top of
//! [EpubArchive::entries] and [EpubArchive::find_case_insensitive].

use std::{
    fs::File,
    io::{BufReader, Cursor, Read, Seek},
    path::{Path, PathBuf},
};

use log::debug;
use percent_encoding::percent_decode_str;
use zip::ZipArchive;

use crate::{error::EpubError, path::strip_fragment};

/// Root folders commonly used by EPUB producers, tried when a resolved path misses
const ROOT_FOLDER_GUESSES: [&str; 3] = ["OEBPS/", "OPS/", "images/"];

/// The data source of an EPUB file
#[derive(Debug, Clone)]
pub enum EpubSource {
    /// The complete EPUB file in memory
    Bytes(Vec<u8>),

    /// A path to an EPUB file on the local file system
    Path(PathBuf),
}

impl From<Vec<u8>> for EpubSource {
    fn from(value: Vec<u8>) -> Self {
        EpubSource::Bytes(value)
    }
}

impl From<&[u8]> for EpubSource {
    fn from(value: &[u8]) -> Self {
        EpubSource::Bytes(value.to_vec())
    }
}

impl From<PathBuf> for EpubSource {
    fn from(value: PathBuf) -> Self {
        EpubSource::Path(value)
    }
}

impl From<&Path> for EpubSource {
    fn from(value: &Path) -> Self {
        EpubSource::Path(value.to_path_buf())
    }
}

/// A single entry of the central directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHandle {
    /// Position of the entry in the central directory
    pub index: usize,

    /// The entry path exactly as stored in the archive
    pub name: String,

    /// Uncompressed size in bytes
    pub size: u64,
}

impl EntryHandle {
    /// Whether the entry is a directory marker rather than a file
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/') || self.name.ends_with('\\')
    }

    /// The entry name with `/` separators and without a leading slash
    pub fn normalized_name(&self) -> String {
        self.name.replace('\\', "/").trim_start_matches('/').to_string()
    }
}

/// An opened EPUB container
///
/// Owned by exactly one parse operation. Reading entries needs `&mut self` because
/// the underlying reader is seeked.
pub struct EpubArchive<R: Read + Seek> {
    archive: ZipArchive<R>,
    entries: Vec<EntryHandle>,
}

impl<R: Read + Seek> EpubArchive<R> {
    /// Opens a ZIP container from a reader
    ///
    /// # Return
    /// - `Ok(EpubArchive)`: The central directory was read
    /// - `Err(EpubError::ArchiveError)`: The data is not a readable ZIP archive
    pub fn open(reader: R) -> Result<Self, EpubError> {
        let mut archive =
            ZipArchive::new(reader).map_err(|source| EpubError::ArchiveError { source })?;

        let mut entries = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            match archive.by_index_raw(index) {
                Ok(file) => entries.push(EntryHandle {
                    index,
                    name: file.name().to_string(),
                    size: file.size(),
                }),
                Err(err) => debug!("Skipping unreadable central directory entry {}: {}", index, err),
            }
        }

        Ok(Self { archive, entries })
    }

    /// Looks up an entry by its exact stored path
    pub fn entry(&self, path: &str) -> Option<&EntryHandle> {
        self.entries.iter().find(|entry| entry.name == path)
    }

    /// All entries in central directory order
    pub fn entries(&self) -> &[EntryHandle] {
        &self.entries
    }

    /// Looks up an entry ignoring case, separator style and a leading slash
    pub fn find_case_insensitive(&self, path: &str) -> Option<&EntryHandle> {
        let target = path.replace('\\', "/").trim_start_matches('/').to_lowercase();
        self.entries
            .iter()
            .find(|entry| entry.normalized_name().to_lowercase() == target)
    }

    /// Finds the entry for a resolved archive path, trying progressively looser matches
    ///
    /// For each spelling of the path (as given, without `#fragment`/`?query`,
    /// percent-decoded) the lookup tries:
    /// 1. the exact path
    /// 2. the path under the common root folders `OEBPS/`, `OPS/` and `images/`
    /// 3. a case-insensitive scan
    pub fn locate(&self, path: &str) -> Option<&EntryHandle> {
        let mut spellings = vec![path.to_string()];
        let stripped = strip_fragment(path);
        if stripped != path {
            spellings.push(stripped.to_string());
        }
        let decoded = percent_decode_str(stripped).decode_utf8_lossy();
        if decoded != stripped {
            spellings.push(decoded.into_owned());
        }

        for spelling in spellings.iter().filter(|spelling| !spelling.is_empty()) {
            if let Some(entry) = self.entry(spelling) {
                return Some(entry);
            }

            if let Some(entry) = ROOT_FOLDER_GUESSES
                .iter()
                .find_map(|root| self.entry(&format!("{}{}", root, spelling)))
            {
                return Some(entry);
            }

            if let Some(entry) = self.find_case_insensitive(spelling) {
                return Some(entry);
            }
        }

        None
    }

    /// Reads the complete data of an entry
    ///
    /// # Return
    /// - `Ok(Vec<u8>)`: The uncompressed entry data
    /// - `Err(EpubError::ExtractionError)`: The entry data is corrupt or unreadable
    pub fn extract(&mut self, entry: &EntryHandle) -> Result<Vec<u8>, EpubError> {
        let mut file = self
            .archive
            .by_index(entry.index)
            .map_err(|err| EpubError::ExtractionError {
                entry: entry.name.clone(),
                source: std::io::Error::other(err),
            })?;

        let mut buffer = Vec::with_capacity(entry.size.min(64 * 1024 * 1024) as usize);
        file.read_to_end(&mut buffer)
            .map_err(|source| EpubError::ExtractionError {
                entry: entry.name.clone(),
                source,
            })?;

        Ok(buffer)
    }

    /// Locates and reads an entry, see [EpubArchive::locate]
    pub fn read(&mut self, path: &str) -> Result<(EntryHandle, Vec<u8>), EpubError> {
        let entry = self
            .locate(path)
            .cloned()
            .ok_or_else(|| EpubError::ResourceNotFound {
                resource: path.to_string(),
            })?;

        let data = self.extract(&entry)?;
        Ok((entry, data))
    }
}

impl EpubArchive<Cursor<Vec<u8>>> {
    /// Opens a ZIP container held in memory
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, EpubError> {
        Self::open(Cursor::new(bytes))
    }
}

impl EpubArchive<BufReader<File>> {
    /// Opens a ZIP container from a file path
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self, EpubError> {
        let file = File::open(path).map_err(EpubError::from)?;
        Self::open(BufReader::new(file))
    }
}

//! Cover image storage
//!
//! The extractor hands the rendered cover to a [CoverStore] and only keeps the
//! location it returns. [TempFileCoverStore] is the default: every call creates a
//! uniquely named file, writes it completely and only then reports its path.
//! Removing the files is up to the caller.

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use tempfile::Builder;

use crate::error::EpubError;

/// Persists rendered cover images and returns a locator for them
pub trait CoverStore: Send + Sync {
    /// Stores encoded image bytes
    ///
    /// # Parameters
    /// - `data`: The encoded image
    /// - `extension`: File extension matching the encoding, without the dot
    ///
    /// # Return
    /// - `Ok(String)`: A locator (path or URL) for the stored image
    /// - `Err(EpubError)`: The image could not be stored
    fn store(&self, data: &[u8], extension: &str) -> Result<String, EpubError>;
}

/// Writes covers as uniquely named files into a directory
#[derive(Debug, Clone, Default)]
pub struct TempFileCoverStore {
    /// Target directory, the system temporary directory when `None`
    dir: Option<PathBuf>,
}

impl TempFileCoverStore {
    /// Creates a store writing into the system temporary directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store writing into `dir`
    pub fn in_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: Some(dir.as_ref().to_path_buf()),
        }
    }
}

impl CoverStore for TempFileCoverStore {
    fn store(&self, data: &[u8], extension: &str) -> Result<String, EpubError> {
        let suffix = format!(".{}", extension);
        let mut builder = Builder::new();
        builder.prefix("epub-cover-").suffix(&suffix);

        let mut file = match &self.dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        file.write_all(data)?;
        file.flush()?;

        let (_, path) = file.keep().map_err(|err| EpubError::from(err.error))?;
        Ok(path.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use crate::cache::{CoverStore, TempFileCoverStore};

    #[test]
    fn test_store_writes_unique_complete_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = TempFileCoverStore::in_dir(dir.path());

        let first = store.store(b"first image", "png").unwrap();
        let second = store.store(b"second image", "png").unwrap();

        assert_ne!(first, second);
        assert!(first.ends_with(".png"));
        assert!(first.contains("epub-cover-"));
        assert_eq!(fs::read(&first).unwrap(), b"first image");
        assert_eq!(fs::read(&second).unwrap(), b"second image");
    }

    #[test]
    fn test_store_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = TempFileCoverStore::in_dir(dir.path().join("does-not-exist"));

        assert!(store.store(b"data", "png").is_err());
    }
}

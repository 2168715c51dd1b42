//! Error Type Definition Module
//!
//! This module defines the error types that may be encountered while extracting
//! content from an EPUB file. All errors are uniformly wrapped in the `EpubError`
//! enumeration.
//!
//! Only [EpubError::ArchiveError] (and I/O failures while reading a source path) ever
//! reach the caller of [crate::parse_epub]. Every other variant describes a single
//! unusable candidate inside a fallback cascade and is absorbed there.

use thiserror::Error;

/// Types of errors that can occur during EPUB extraction
#[derive(Debug, Error)]
pub enum EpubError {
    /// The input is not a readable ZIP archive
    ///
    /// This is the only fatal condition of a parse: without a central directory
    /// there is nothing to extract.
    #[error("Archive error: {source}")]
    ArchiveError { source: zip::result::ZipError },

    /// Data Decoding Error - Null data
    ///
    /// This error occurs when trying to decode an empty stream.
    #[error("Decode error: The data is empty.")]
    EmptyDataError,

    /// An archive entry exists but its data could not be read
    ///
    /// Usually caused by a corrupt local header, a truncated stream or an
    /// encrypted entry.
    #[error("Extraction error: Unable to read entry \"{entry}\": {source}")]
    ExtractionError {
        entry: String,
        source: std::io::Error,
    },

    /// Image decoding error
    #[error("Image error: {source}")]
    ImageError { source: image::ImageError },

    #[error("IO error: {source}")]
    IOError { source: std::io::Error },

    /// The entry is too small to hold a real image
    #[error("Not an image: \"{path}\" holds only {size} bytes.")]
    NotAnImageError { path: String, size: usize },

    /// Unable to find the resource error
    ///
    /// This error occurs when an attempt is made to get a resource
    /// but it does not exist in the EPUB container.
    #[error("Resource not found: Unable to find resource from \"{resource}\".")]
    ResourceNotFound { resource: String },
}

impl From<image::ImageError> for EpubError {
    fn from(value: image::ImageError) -> Self {
        EpubError::ImageError { source: value }
    }
}

impl From<std::io::Error> for EpubError {
    fn from(value: std::io::Error) -> Self {
        EpubError::IOError { source: value }
    }
}

#[cfg(test)]
impl PartialEq for EpubError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::ExtractionError { entry: l_entry, .. }, Self::ExtractionError { entry: r_entry, .. }) => {
                l_entry == r_entry
            }
            (
                Self::NotAnImageError {
                    path: l_path,
                    size: l_size,
                },
                Self::NotAnImageError {
                    path: r_path,
                    size: r_size,
                },
            ) => l_path == r_path && l_size == r_size,
            (
                Self::ResourceNotFound {
                    resource: l_resource,
                },
                Self::ResourceNotFound {
                    resource: r_resource,
                },
            ) => l_resource == r_resource,

            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

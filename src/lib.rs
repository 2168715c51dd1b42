//! Epub extract library
//!
//! A Rust library that recovers the readable content of arbitrary EPUB files.
//!
//! Real-world EPUBs are often only loosely conformant: containers are missing,
//! package documents are malformed, paths use the wrong case or separator, and covers
//! are declared in half a dozen ways or not at all. This library opens such files
//! anyway and recovers a title, an author, a cover image and the chapter texts in
//! reading order, falling back to weaker heuristics wherever the structure is missing.
//!
//! ## Features
//!
//! - Locates the package document through `META-INF/container.xml` or by scanning.
//! - Tolerant package document parsing (EPUB 2 and EPUB 3).
//! - Six-step cover cascade, from the `cover-image` property down to the first image
//!   in the archive, rendered as a bounded PNG.
//! - Plain text chapters with heading detection, and an archive scan when the spine
//!   is unusable.
//!
//! ## Quick Start
//!
//! ```rust, ignore
//! # use epub_extract::parse_epub;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let content = parse_epub(std::path::Path::new("path/to/book.epub"), None)?;
//!
//! println!("Title: {}", content.title);
//! println!("Author: {}", content.author);
//! println!("Cover: {:?}", content.cover_image_location);
//!
//! for chapter in &content.chapters {
//!     println!("{}: {} characters", chapter.title, chapter.content.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Only a source that is not a ZIP archive (or an unreadable path) is an error.
//! Everything else degrades to defaults: `"Unknown Title"`, `"Unknown Author"`, no
//! cover, or no chapters.

pub(crate) mod utils;

pub mod archive;
pub mod cache;
pub mod chapter;
pub mod cover;
pub mod epub;
pub mod error;
pub mod package;
pub mod path;
pub mod text;
pub mod types;

#[cfg(test)]
mod test_utils;

pub use archive::EpubSource;
pub use cache::{CoverStore, TempFileCoverStore};
pub use epub::{EpubExtractor, parse_epub};
pub use error::EpubError;
pub use types::{EpubContent, ExtractOptions, ResolvedChapter};
pub use utils::DecodeBytes;

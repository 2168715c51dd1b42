//! Chapter Extractor
//!
//! Chapters follow the spine. When the package is missing or its spine yields no
//! readable text, every HTML document in the archive is used instead, in archive order.

use std::io::{Read, Seek};

use log::{debug, warn};
use uuid::Uuid;

use crate::{
    archive::EpubArchive,
    text::{clean_html, h1_tag, heading_title, title_tag},
    types::{ExtractOptions, PackageDocument, ResolvedChapter},
    utils::DecodeBytes,
};

const HTML_EXTENSIONS: [&str; 3] = [".html", ".xhtml", ".htm"];

/// Extracts the readable chapters of the book
///
/// Documents that cannot be read or decoded, and documents without any text once
/// markup is removed, are skipped. The `order` of the returned chapters is their
/// position in the result.
///
/// # Parameters
/// - `package`: The parsed package document, if one was found
/// - `archive`: The opened EPUB container
/// - `options`: Supplies the naming mode and the heading scan depth
pub fn extract_chapters<R: Read + Seek>(
    package: Option<&PackageDocument>,
    archive: &mut EpubArchive<R>,
    options: &ExtractOptions,
) -> Vec<ResolvedChapter> {
    let chapters = match package {
        Some(package) => from_spine(package, archive, options),
        None => Vec::new(),
    };

    if !chapters.is_empty() {
        return chapters;
    }

    debug!("Spine produced no chapters, scanning the archive for HTML documents");
    from_archive_scan(archive, options)
}

fn from_spine<R: Read + Seek>(
    package: &PackageDocument,
    archive: &mut EpubArchive<R>,
    options: &ExtractOptions,
) -> Vec<ResolvedChapter> {
    let mut chapters = Vec::new();

    for idref in &package.spine_idrefs {
        let Some(item) = package.manifest_item(idref) else {
            debug!("Spine references unknown manifest id \"{}\"", idref);
            continue;
        };

        let path = package.resolve_href(&item.href);
        let Some(markup) = read_document(archive, &path) else {
            continue;
        };

        let content = clean_html(&markup);
        if content.is_empty() {
            continue;
        }

        let number = chapters.len() + 1;
        let title = if options.simple_naming {
            numbered_title(number)
        } else {
            heading_title(&content, options.title_scan_lines).unwrap_or_else(|| numbered_title(number))
        };

        chapters.push(new_chapter(title, content, chapters.len()));
    }

    chapters
}

fn from_archive_scan<R: Read + Seek>(
    archive: &mut EpubArchive<R>,
    options: &ExtractOptions,
) -> Vec<ResolvedChapter> {
    let documents = archive
        .entries()
        .iter()
        .filter(|entry| !entry.is_dir())
        .filter(|entry| {
            let name = entry.name.to_lowercase();
            HTML_EXTENSIONS.iter().any(|extension| name.ends_with(extension))
        })
        .map(|entry| entry.name.clone())
        .collect::<Vec<String>>();

    let mut chapters = Vec::new();
    for name in documents {
        let Some(markup) = read_document(archive, &name) else {
            continue;
        };

        let content = clean_html(&markup);
        if content.is_empty() {
            continue;
        }

        let number = chapters.len() + 1;
        let title = if options.simple_naming {
            numbered_title(number)
        } else {
            title_tag(&markup)
                .or_else(|| h1_tag(&markup))
                .or_else(|| heading_title(&content, options.title_scan_lines))
                .unwrap_or_else(|| numbered_title(number))
        };

        chapters.push(new_chapter(title, content, chapters.len()));
    }

    chapters
}

fn read_document<R: Read + Seek>(archive: &mut EpubArchive<R>, path: &str) -> Option<String> {
    match archive.read(path).and_then(|(_, data)| data.decode()) {
        Ok(markup) => Some(markup),
        Err(err) => {
            warn!("Skipping chapter document \"{}\": {}", path, err);
            None
        }
    }
}

fn new_chapter(title: String, content: String, order: usize) -> ResolvedChapter {
    ResolvedChapter {
        id: Uuid::new_v4().to_string(),
        title,
        content,
        order,
    }
}

#[inline]
fn numbered_title(number: usize) -> String {
    format!("Chapter {}", number)
}

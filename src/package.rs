//! Container and package document handling
//!
//! [locate_package_document] finds the OPF file, [PackageDocument::parse] reads it.
//! Neither fails: a missing or unreadable package simply means that no structural
//! metadata is available and later stages fall back to scanning the archive.

use std::{
    collections::HashSet,
    io::{Read, Seek},
    sync::LazyLock,
};

use log::{debug, warn};
use regex::Regex;

use crate::{
    archive::{EntryHandle, EpubArchive},
    path::parent_dir,
    types::{ManifestItem, PackageDocument},
    utils::{DecodeBytes, XmlElement, XmlReader},
};

const CONTAINER_PATH: &str = "META-INF/container.xml";

static FULL_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)full-path\s*=\s*(?:"([^"]+)"|'([^']+)')"#).unwrap()
});

/// Finds and reads the package (OPF) document
///
/// The path named by the `full-path` attribute in `META-INF/container.xml` is tried
/// first. If the container is absent, names nothing, or the named file cannot be
/// read, the first entry whose path ends in `.opf` is used instead.
///
/// # Return
/// - `Some((content, path))`: The decoded OPF text and its archive path
/// - `None`: No readable package document exists
pub fn locate_package_document<R: Read + Seek>(
    archive: &mut EpubArchive<R>,
) -> Option<(String, String)> {
    if let Some(full_path) = container_full_path(archive) {
        match read_text(archive, &full_path) {
            Some(found) => return Some(found),
            None => debug!(
                "Package document \"{}\" named by the container is unavailable",
                full_path
            ),
        }
    }

    let candidates = archive
        .entries()
        .iter()
        .filter(|entry| !entry.is_dir() && entry.name.to_lowercase().ends_with(".opf"))
        .cloned()
        .collect::<Vec<EntryHandle>>();

    for entry in candidates {
        if let Some(found) = read_entry_text(archive, &entry) {
            debug!("Using package document \"{}\" found by scanning", found.1);
            return Some(found);
        }
    }

    None
}

/// Extracts the first `full-path` attribute from the container file
fn container_full_path<R: Read + Seek>(archive: &mut EpubArchive<R>) -> Option<String> {
    let entry = archive
        .entry(CONTAINER_PATH)
        .or_else(|| archive.find_case_insensitive(CONTAINER_PATH))
        .cloned()?;

    let container = match archive.extract(&entry).and_then(|data| data.decode()) {
        Ok(container) => container,
        Err(err) => {
            warn!("Unable to read {}: {}", entry.name, err);
            return None;
        }
    };

    let captures = FULL_PATH_RE.captures(&container)?;
    captures
        .get(1)
        .or_else(|| captures.get(2))
        .map(|full_path| full_path.as_str().trim().to_string())
        .filter(|full_path| !full_path.is_empty())
}

fn read_text<R: Read + Seek>(archive: &mut EpubArchive<R>, path: &str) -> Option<(String, String)> {
    let target = path.replace('\\', "/");
    let target = target.trim_start_matches('/');
    let entry = archive
        .entry(target)
        .or_else(|| archive.find_case_insensitive(target))
        .cloned()?;

    read_entry_text(archive, &entry)
}

fn read_entry_text<R: Read + Seek>(
    archive: &mut EpubArchive<R>,
    entry: &EntryHandle,
) -> Option<(String, String)> {
    match archive.extract(entry).and_then(|data| data.decode()) {
        Ok(content) => Some((content, entry.normalized_name())),
        Err(err) => {
            warn!("Unable to read package document {}: {}", entry.name, err);
            None
        }
    }
}

impl PackageDocument {
    /// Parses the content of a package document
    ///
    /// This function never fails. Parsing is tolerant of the irregularities found in
    /// real-world files (see [XmlReader]); fields that cannot be recovered stay
    /// `None` or empty.
    ///
    /// # Parameters
    /// - `content`: The decoded OPF text
    /// - `package_path`: The archive path of the OPF file, used to derive the base path
    pub fn parse(content: &str, package_path: &str) -> PackageDocument {
        let root = XmlReader::parse(content);

        PackageDocument {
            title: first_text(&root, "title"),
            author: first_text(&root, "creator"),
            language: first_text(&root, "language"),
            description: first_text(&root, "description"),
            manifest: Self::parse_manifest(&root),
            spine_idrefs: Self::parse_spine(&root),
            meta_cover_id: Self::parse_meta_cover(&root),
            guide_cover_href: Self::parse_guide_cover(&root),
            package_path: package_path.replace('\\', "/"),
            base_path: parent_dir(package_path),
        }
    }

    /// Collects every `<item>` carrying `id`, `href` and `media-type`
    ///
    /// The first declaration of a duplicated id wins.
    fn parse_manifest(root: &XmlElement) -> Vec<ManifestItem> {
        let mut seen = HashSet::new();
        let mut manifest = Vec::new();

        for element in root.find_elements_by_name("item") {
            let (Some(id), Some(href), Some(media_type)) = (
                element.get_attr("id"),
                element.get_attr("href"),
                element.get_attr("media-type"),
            ) else {
                debug!("Ignoring manifest item without id, href or media-type");
                continue;
            };

            let id = id.trim().to_string();
            if !seen.insert(id.clone()) {
                debug!("Ignoring duplicate manifest id \"{}\"", id);
                continue;
            }

            manifest.push(ManifestItem {
                id,
                href: href.trim().to_string(),
                media_type: media_type.trim().to_string(),
                properties: element.get_attr("properties"),
            });
        }

        manifest
    }

    /// Collects every `<itemref idref>` in document order
    fn parse_spine(root: &XmlElement) -> Vec<String> {
        root.find_elements_by_name("itemref")
            .filter_map(|element| element.get_attr("idref"))
            .map(|idref| idref.trim().to_string())
            .filter(|idref| !idref.is_empty())
            .collect()
    }

    fn parse_meta_cover(root: &XmlElement) -> Option<String> {
        root.find_elements_by_name("meta")
            .find(|element| {
                element
                    .get_attr("name")
                    .is_some_and(|name| name.trim().eq_ignore_ascii_case("cover"))
            })
            .and_then(|element| element.get_attr("content"))
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
    }

    fn parse_guide_cover(root: &XmlElement) -> Option<String> {
        root.find_elements_by_name("guide")
            .flat_map(|guide| guide.find_elements_by_name("reference"))
            .find(|reference| {
                reference.get_attr("type").is_some_and(|kind| {
                    let kind = kind.trim();
                    kind.eq_ignore_ascii_case("cover") || kind.eq_ignore_ascii_case("cover-image")
                })
            })
            .and_then(|reference| reference.get_attr("href"))
            .map(|href| href.trim().to_string())
            .filter(|href| !href.is_empty())
    }
}

/// Text of the first element with the given name that has any text
fn first_text(root: &XmlElement, name: &str) -> Option<String> {
    root.find_elements_by_name(name)
        .map(|element| element.text())
        .find(|text| !text.is_empty())
}

use std::collections::HashSet;

use crate::path::resolve;

/// Title used when the package document does not provide one
pub const UNKNOWN_TITLE: &str = "Unknown Title";

/// Author used when the package document does not provide one
pub const UNKNOWN_AUTHOR: &str = "Unknown Author";

/// The tag marker that switches chapter titles to plain numbering
pub const SIMPLE_NAMING_TAG: &str = "AI";

/// Represents a resource item declared in the EPUB manifest
///
/// Only items carrying all of `id`, `href` and `media-type` are kept; the href is
/// stored as written, relative to the package document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestItem {
    /// The unique identifier of the resource within the manifest
    pub id: String,

    /// The reference to the resource, relative to the package document
    pub href: String,

    /// The media type of the resource
    pub media_type: String,

    /// Optional space-separated properties, e.g. `cover-image` or `nav`
    pub properties: Option<String>,
}

impl ManifestItem {
    /// Checks whether the whitespace-separated `properties` contain `property`
    pub fn has_property(&self, property: &str) -> bool {
        self.properties
            .as_deref()
            .is_some_and(|properties| properties.split_whitespace().any(|p| p == property))
    }
}

/// In-memory view of the package (OPF) document
///
/// Everything is optional or possibly empty: the parser never fails, it only
/// recovers what the document offers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageDocument {
    /// Text of the first `<dc:title>`
    pub title: Option<String>,

    /// Text of the first `<dc:creator>`
    pub author: Option<String>,

    /// Text of the first `<dc:language>`
    pub language: Option<String>,

    /// Text of the first `<dc:description>`
    pub description: Option<String>,

    /// Manifest items in declaration order, ids unique
    pub manifest: Vec<ManifestItem>,

    /// Manifest ids in reading order
    pub spine_idrefs: Vec<String>,

    /// EPUB 2 `<meta name="cover" content="...">` value
    pub meta_cover_id: Option<String>,

    /// EPUB 2 `<guide><reference type="cover" href="...">` value
    pub guide_cover_href: Option<String>,

    /// Archive path of the package document itself
    pub package_path: String,

    /// Directory of the package document, empty at the archive root
    ///
    /// All manifest and guide hrefs are relative to this directory.
    pub base_path: String,
}

impl PackageDocument {
    /// Returns the manifest item with the given id
    pub fn manifest_item(&self, id: &str) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.id == id)
    }

    /// Resolves an href written in the package document against [Self::base_path]
    pub fn resolve_href(&self, href: &str) -> String {
        resolve(href, &self.package_path, Some(&self.base_path))
    }
}

/// A chapter recovered from the EPUB
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedChapter {
    /// Freshly generated opaque identifier
    pub id: String,

    /// The chapter title
    pub title: String,

    /// Plain text content, markup removed
    pub content: String,

    /// Zero-based position of the chapter in [EpubContent::chapters]
    pub order: usize,
}

/// The result of parsing an EPUB
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpubContent {
    /// The book title, [UNKNOWN_TITLE] when it could not be recovered
    pub title: String,

    /// The book author, [UNKNOWN_AUTHOR] when it could not be recovered
    pub author: String,

    /// Optional language code from the package metadata
    pub language: Option<String>,

    /// Optional description from the package metadata
    pub description: Option<String>,

    /// The chapters in reading order
    pub chapters: Vec<ResolvedChapter>,

    /// Location of the cached cover image, if a cover was found
    pub cover_image_location: Option<String>,
}

/// Options controlling an extraction
///
/// The defaults reproduce the behavior of [crate::parse_epub] without the `"AI"` tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Always title chapters `"Chapter N"` instead of detecting headings
    pub simple_naming: bool,

    /// Bounding box the cached cover is shrunk into, `None` keeps the original size
    pub cover_max_size: Option<(u32, u32)>,

    /// Generate a gradient placeholder cover when the EPUB has no usable image
    pub placeholder_cover: bool,

    /// How many leading spine documents are searched for an inline cover image
    pub spine_image_probe: usize,

    /// Entries smaller than this are never treated as images
    pub min_image_bytes: usize,

    /// How many leading non-empty lines are searched for a chapter heading
    pub title_scan_lines: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            simple_naming: false,
            cover_max_size: Some((300, 450)),
            placeholder_cover: false,
            spine_image_probe: 3,
            min_image_bytes: 100,
            title_scan_lines: 10,
        }
    }
}

impl ExtractOptions {
    /// Builds the default options, selecting simple naming when `tags` holds `"AI"`
    pub fn from_tags(tags: Option<&HashSet<String>>) -> Self {
        Self {
            simple_naming: tags.is_some_and(|tags| tags.contains(SIMPLE_NAMING_TAG)),
            ..Self::default()
        }
    }

    pub fn with_simple_naming(mut self, simple_naming: bool) -> Self {
        self.simple_naming = simple_naming;
        self
    }

    pub fn with_cover_max_size(mut self, cover_max_size: Option<(u32, u32)>) -> Self {
        self.cover_max_size = cover_max_size;
        self
    }

    pub fn with_placeholder_cover(mut self, placeholder_cover: bool) -> Self {
        self.placeholder_cover = placeholder_cover;
        self
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use crate::types::{ExtractOptions, ManifestItem, PackageDocument};

    #[test]
    fn test_manifest_item_has_property() {
        let item = ManifestItem {
            id: "img".to_string(),
            href: "cover.png".to_string(),
            media_type: "image/png".to_string(),
            properties: Some("svg cover-image".to_string()),
        };
        assert!(item.has_property("cover-image"));
        assert!(!item.has_property("cover"));

        let item = ManifestItem {
            properties: None,
            ..item
        };
        assert!(!item.has_property("cover-image"));
    }

    #[test]
    fn test_options_from_tags() {
        assert!(!ExtractOptions::from_tags(None).simple_naming);

        let tags = HashSet::from(["Classic".to_string()]);
        assert!(!ExtractOptions::from_tags(Some(&tags)).simple_naming);

        let tags = HashSet::from(["Classic".to_string(), "AI".to_string()]);
        let options = ExtractOptions::from_tags(Some(&tags));
        assert!(options.simple_naming);
        assert_eq!(options.cover_max_size, Some((300, 450)));

        let tags = HashSet::from(["ai".to_string()]);
        assert!(!ExtractOptions::from_tags(Some(&tags)).simple_naming);
    }

    #[test]
    fn test_resolve_href_against_base_path() {
        let package = PackageDocument {
            package_path: "OEBPS/content.opf".to_string(),
            base_path: "OEBPS".to_string(),
            ..PackageDocument::default()
        };
        assert_eq!(package.resolve_href("text/ch1.xhtml"), "OEBPS/text/ch1.xhtml");
        assert_eq!(package.resolve_href("../images/a.png"), "images/a.png");
        assert_eq!(package.resolve_href("/cover.jpg"), "cover.jpg");

        let package = PackageDocument {
            package_path: "content.opf".to_string(),
            ..PackageDocument::default()
        };
        assert_eq!(package.resolve_href("./text\\ch1.xhtml"), "text/ch1.xhtml");
    }
}

use std::{
    collections::HashSet,
    io::{Read, Seek},
};

use log::{debug, warn};

use crate::{
    archive::{EpubArchive, EpubSource},
    cache::{CoverStore, TempFileCoverStore},
    chapter::extract_chapters,
    cover::{placeholder_cover, render_png, resolve_cover},
    error::EpubError,
    package::locate_package_document,
    types::{EpubContent, ExtractOptions, PackageDocument, UNKNOWN_AUTHOR, UNKNOWN_TITLE},
};

/// Size of the generated placeholder when no cover bounds are configured
const PLACEHOLDER_SIZE: (u32, u32) = (300, 450);

/// EPUB content extractor
///
/// Opens an EPUB and recovers its title, author, cover and chapter texts. Every stage
/// falls back to a weaker heuristic when the stronger one finds nothing, so the only
/// fatal condition is an input that is not a ZIP archive at all.
///
/// The extractor holds no per-parse state; one instance can serve any number of
/// parses, from any number of threads.
///
/// ## Example
///
/// ```rust, ignore
/// let extractor = EpubExtractor::new(ExtractOptions::default().with_simple_naming(true))
///     .with_store(TempFileCoverStore::in_dir("/var/cache/covers"));
/// let content = extractor.extract(std::path::Path::new("book.epub"))?;
/// println!("{} by {}", content.title, content.author);
/// ```
pub struct EpubExtractor {
    options: ExtractOptions,
    store: Box<dyn CoverStore>,
}

impl Default for EpubExtractor {
    fn default() -> Self {
        Self::new(ExtractOptions::default())
    }
}

impl EpubExtractor {
    /// Creates an extractor writing covers into the system temporary directory
    pub fn new(options: ExtractOptions) -> Self {
        Self {
            options,
            store: Box::new(TempFileCoverStore::new()),
        }
    }

    /// Replaces the cover store
    pub fn with_store(mut self, store: impl CoverStore + 'static) -> Self {
        self.store = Box::new(store);
        self
    }

    /// The options used by this extractor
    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    /// Extracts the content of an EPUB
    ///
    /// # Parameters
    /// - `source`: The EPUB bytes or a path to the EPUB file
    ///
    /// # Return
    /// - `Ok(EpubContent)`: The recovered content, with defaults for anything missing
    /// - `Err(EpubError)`: The file could not be read, or it is not a ZIP archive
    pub fn extract<S: Into<EpubSource>>(&self, source: S) -> Result<EpubContent, EpubError> {
        match source.into() {
            EpubSource::Bytes(bytes) => Ok(self.extract_from_archive(EpubArchive::from_bytes(bytes)?)),
            EpubSource::Path(path) => Ok(self.extract_from_archive(EpubArchive::open_path(path)?)),
        }
    }

    /// Extracts the content of an already opened archive
    ///
    /// Every stage after opening the archive degrades to defaults instead of failing.
    pub fn extract_from_archive<R: Read + Seek>(&self, mut archive: EpubArchive<R>) -> EpubContent {
        // Extraction process
        // 1. Locate and parse the package document, if there is one
        // 2. Resolve and store the cover
        // 3. Extract the chapters, spine first, archive scan second
        // 4. Apply defaults for missing metadata

        let package = match locate_package_document(&mut archive) {
            Some((content, path)) => Some(PackageDocument::parse(&content, &path)),
            None => {
                debug!("No package document found, continuing without metadata");
                None
            }
        };

        let title = package
            .as_ref()
            .and_then(|package| package.title.clone())
            .unwrap_or_else(|| UNKNOWN_TITLE.to_string());
        let author = package
            .as_ref()
            .and_then(|package| package.author.clone())
            .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());

        let cover_image_location = self.cover_location(package.as_ref(), &mut archive, &title, &author);
        let chapters = extract_chapters(package.as_ref(), &mut archive, &self.options);

        let (language, description) = match package {
            Some(package) => (package.language, package.description),
            None => (None, None),
        };

        EpubContent {
            title,
            author,
            language,
            description,
            chapters,
            cover_image_location,
        }
    }

    /// Resolves, renders and stores the cover
    ///
    /// Any failure on the way is logged and treated as "no cover".
    fn cover_location<R: Read + Seek>(
        &self,
        package: Option<&PackageDocument>,
        archive: &mut EpubArchive<R>,
        title: &str,
        author: &str,
    ) -> Option<String> {
        let rendered = match resolve_cover(package, archive, &self.options) {
            Some(cover) => cover.render_png(self.options.cover_max_size),
            None if self.options.placeholder_cover => {
                let (width, height) = self.options.cover_max_size.unwrap_or(PLACEHOLDER_SIZE);
                let seed = format!("{}\n{}", title, author);
                debug!("Generating placeholder cover for \"{}\"", title);
                render_png(&placeholder_cover(&seed, width, height), None)
            }
            None => return None,
        };

        let stored = rendered.and_then(|png| self.store.store(&png, "png"));
        match stored {
            Ok(location) => Some(location),
            Err(err) => {
                warn!("Unable to store the cover image: {}", err);
                None
            }
        }
    }
}

/// Extracts the content of an EPUB with default options
///
/// # Parameters
/// - `source`: The EPUB bytes or a path to the EPUB file
/// - `tags`: Catalog tags of the book; the `"AI"` tag selects plain
///   `"Chapter N"` titles instead of detected headings
///
/// # Return
/// - `Ok(EpubContent)`: The recovered content, with defaults for anything missing
/// - `Err(EpubError)`: The file could not be read, or it is not a ZIP archive
pub fn parse_epub<S: Into<EpubSource>>(
    source: S,
    tags: Option<&HashSet<String>>,
) -> Result<EpubContent, EpubError> {
    EpubExtractor::new(ExtractOptions::from_tags(tags)).extract(source)
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, fs};

    use crate::{
        cache::{CoverStore, TempFileCoverStore},
        epub::{EpubExtractor, parse_epub},
        error::EpubError,
        test_utils::{ZipBuilder, container_xml, png_bytes},
        types::{ExtractOptions, UNKNOWN_AUTHOR, UNKNOWN_TITLE},
    };

    const OPF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
    <dc:title>  The   Sample Book </dc:title>
    <dc:creator opf:role="aut">Jane Doe</dc:creator>
    <dc:language>en</dc:language>
    <dc:description>A short book.</dc:description>
    <meta name="cover" content="cvr"/>
  </metadata>
  <manifest>
    <item id="cvr" href="images/front.png" media-type="image/png"/>
    <item id="ch1" href="text/ch1.xhtml" media-type="application/xhtml+xml"/>
    <item id="ch2" href="text/ch2.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine toc="ncx"><itemref idref="ch1"/><itemref idref="ch2"/></spine>
</package>"#;

    fn sample_epub() -> Vec<u8> {
        ZipBuilder::new()
            .file("mimetype", "application/epub+zip")
            .file("META-INF/container.xml", container_xml("OEBPS/content.opf"))
            .file("OEBPS/content.opf", OPF)
            .file("OEBPS/images/front.png", png_bytes(400, 600, 1))
            .file(
                "OEBPS/text/ch1.xhtml",
                "<html><body><h1>Chapter 1: Arrival</h1><p>They came by sea.</p></body></html>",
            )
            .file(
                "OEBPS/text/ch2.xhtml",
                "<html><body><h1>Chapter 2</h1><p>They left by air.</p></body></html>",
            )
            .build()
    }

    struct FailingStore;

    impl CoverStore for FailingStore {
        fn store(&self, _: &[u8], _: &str) -> Result<String, EpubError> {
            Err(EpubError::IOError {
                source: std::io::Error::other("disk full"),
            })
        }
    }

    #[test]
    fn test_extract_complete_book() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = EpubExtractor::default().with_store(TempFileCoverStore::in_dir(dir.path()));

        let content = extractor.extract(sample_epub()).unwrap();
        assert_eq!(content.title, "The Sample Book");
        assert_eq!(content.author, "Jane Doe");
        assert_eq!(content.language.as_deref(), Some("en"));
        assert_eq!(content.description.as_deref(), Some("A short book."));

        assert_eq!(content.chapters.len(), 2);
        assert_eq!(content.chapters[0].title, "Chapter 1: Arrival");
        assert_eq!(content.chapters[0].content, "Chapter 1: Arrival\n\nThey came by sea.");
        assert_eq!(content.chapters[1].title, "Chapter 2");
        assert_eq!(content.chapters[1].order, 1);

        let location = content.cover_image_location.unwrap();
        assert!(location.starts_with(dir.path().to_str().unwrap()));
        let cover = image::load_from_memory(&fs::read(&location).unwrap()).unwrap();
        assert_eq!((cover.width(), cover.height()), (300, 450));
    }

    #[test]
    fn test_parse_epub_with_simple_naming_tag() {
        let tags = HashSet::from(["AI".to_string(), "Fiction".to_string()]);
        let content = parse_epub(sample_epub(), Some(&tags)).unwrap();

        let titles = content
            .chapters
            .iter()
            .map(|chapter| chapter.title.as_str())
            .collect::<Vec<_>>();
        assert_eq!(titles, vec!["Chapter 1", "Chapter 2"]);

        if let Some(location) = content.cover_image_location {
            let _ = fs::remove_file(location);
        }
    }

    #[test]
    fn test_extract_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.epub");
        fs::write(&path, sample_epub()).unwrap();

        let extractor = EpubExtractor::default().with_store(TempFileCoverStore::in_dir(dir.path()));
        let content = extractor.extract(path.as_path()).unwrap();
        assert_eq!(content.title, "The Sample Book");

        let result = extractor.extract(dir.path().join("missing.epub"));
        assert!(matches!(result, Err(EpubError::IOError { .. })));
    }

    #[test]
    fn test_non_epub_zip_yields_defaults() {
        let bytes = ZipBuilder::new()
            .file("notes/readme.txt", "Just some notes.")
            .file("data.json", "{}")
            .build();

        let content = EpubExtractor::default().extract(bytes).unwrap();
        assert_eq!(content.title, UNKNOWN_TITLE);
        assert_eq!(content.author, UNKNOWN_AUTHOR);
        assert_eq!(content.language, None);
        assert!(content.chapters.is_empty());
        assert_eq!(content.cover_image_location, None);
    }

    #[test]
    fn test_invalid_archive_is_fatal() {
        let result = parse_epub(b"PK but not really a zip".as_slice(), None);
        assert!(matches!(result, Err(EpubError::ArchiveError { .. })));
    }

    #[test]
    fn test_store_failure_means_no_cover() {
        let content = EpubExtractor::default()
            .with_store(FailingStore)
            .extract(sample_epub())
            .unwrap();

        assert_eq!(content.cover_image_location, None);
        assert_eq!(content.title, "The Sample Book");
        assert_eq!(content.chapters.len(), 2);
    }

    #[test]
    fn test_placeholder_cover_when_enabled() {
        let bytes = ZipBuilder::new()
            .file("content.opf", "<package><metadata><dc:title>Plain</dc:title></metadata></package>")
            .file("text.xhtml", "<p>Words.</p>")
            .build();
        let dir = tempfile::tempdir().unwrap();

        let extractor = EpubExtractor::new(ExtractOptions::default().with_placeholder_cover(true))
            .with_store(TempFileCoverStore::in_dir(dir.path()));
        let content = extractor.extract(bytes.clone()).unwrap();
        assert_eq!(content.title, "Plain");
        assert_eq!(content.chapters.len(), 1);

        let location = content.cover_image_location.unwrap();
        let cover = image::load_from_memory(&fs::read(&location).unwrap()).unwrap();
        assert_eq!((cover.width(), cover.height()), (300, 450));

        let content = EpubExtractor::default()
            .with_store(TempFileCoverStore::in_dir(dir.path()))
            .extract(bytes)
            .unwrap();
        assert_eq!(content.cover_image_location, None);
    }

    #[test]
    fn test_extractor_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EpubExtractor>();
    }
}

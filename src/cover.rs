//! Cover Resolution Cascade
//!
//! EPUBs announce their cover in several incompatible ways, and many do not announce
//! it at all. The cascade evaluates [CoverStrategy::CASCADE] in order; each strategy
//! proposes candidate archive paths and the first candidate that decodes into a real
//! image wins. Running out of strategies is a valid outcome: the book has no cover.
//!
//! Every strategy can be inspected on its own through [CoverStrategy::candidates].

use std::{
    collections::HashSet,
    io::{Cursor, Read, Seek},
    sync::LazyLock,
};

use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba};
use log::debug;
use regex::Regex;
use sha1::{Digest, Sha1};

use crate::{
    archive::EpubArchive,
    error::EpubError,
    path::{base_href_dir, has_url_scheme, resolve, strip_fragment},
    types::{ExtractOptions, PackageDocument},
    utils::{DecodeBytes, decode_entities},
};

/// Extensions accepted by the file-name based strategies
const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "gif"];

/// Extensions of documents that may wrap the cover image
const MARKUP_EXTENSIONS: [&str; 4] = ["xhtml", "html", "htm", "xml"];

/// Two-color gradients used by [placeholder_cover]
const PLACEHOLDER_PALETTE: [([u8; 3], [u8; 3]); 6] = [
    ([139, 92, 246], [124, 58, 237]),
    ([236, 72, 153], [219, 39, 119]),
    ([16, 185, 129], [5, 150, 105]),
    ([245, 158, 11], [217, 119, 6]),
    ([59, 130, 246], [37, 99, 235]),
    ([239, 68, 68], [220, 38, 38]),
];

static IMAGE_REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<(?:img\b[^>]*?\ssrc|(?:svg:)?image\b[^>]*?\s(?:xlink:)?href)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#,
    )
    .unwrap()
});

/// One way of finding a cover, in cascade order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverStrategy {
    /// EPUB 3: manifest items whose `properties` contain `cover-image`
    ManifestProperty,

    /// EPUB 2: the manifest item named by `<meta name="cover">`
    MetaCover,

    /// EPUB 2: the `<guide>` reference of type `cover`
    GuideReference,

    /// The first image inside each of the leading spine documents
    SpineImage,

    /// Image entries whose path mentions `cover` or `title`
    FileNameHint,

    /// Any image entry, alphabetically, skipping thumbnails and icons
    FirstImage,
}

impl CoverStrategy {
    /// All strategies in priority order
    pub const CASCADE: [CoverStrategy; 6] = [
        CoverStrategy::ManifestProperty,
        CoverStrategy::MetaCover,
        CoverStrategy::GuideReference,
        CoverStrategy::SpineImage,
        CoverStrategy::FileNameHint,
        CoverStrategy::FirstImage,
    ];

    /// Proposes candidate archive paths for this strategy, best first
    ///
    /// Package-based strategies propose nothing when `package` is `None`. Paths are
    /// resolved but not checked for existence; see [EpubArchive::locate].
    pub fn candidates<R: Read + Seek>(
        self,
        package: Option<&PackageDocument>,
        archive: &mut EpubArchive<R>,
        options: &ExtractOptions,
    ) -> Vec<String> {
        match (self, package) {
            (CoverStrategy::ManifestProperty, Some(package)) => package
                .manifest
                .iter()
                .filter(|item| item.has_property("cover-image"))
                .map(|item| package.resolve_href(&item.href))
                .collect(),

            (CoverStrategy::MetaCover, Some(package)) => {
                let Some(cover_id) = package.meta_cover_id.as_deref() else {
                    return Vec::new();
                };

                match package.manifest_item(cover_id) {
                    Some(item) => vec![package.resolve_href(&item.href)],
                    // Some producers put the image path itself into the meta element.
                    None if has_extension(cover_id, &IMAGE_EXTENSIONS) => {
                        vec![package.resolve_href(cover_id)]
                    }
                    None => Vec::new(),
                }
            }

            (CoverStrategy::GuideReference, Some(package)) => {
                let Some(href) = package.guide_cover_href.as_deref() else {
                    return Vec::new();
                };

                let target = package.resolve_href(href);
                let mut candidates = vec![target.clone()];
                if has_extension(&target, &MARKUP_EXTENSIONS) {
                    candidates.extend(first_image_in_document(archive, &target));
                }
                candidates
            }

            (CoverStrategy::SpineImage, Some(package)) => package
                .spine_idrefs
                .iter()
                .take(options.spine_image_probe)
                .filter_map(|idref| package.manifest_item(idref))
                .filter_map(|item| {
                    let document = package.resolve_href(&item.href);
                    first_image_in_document(archive, &document)
                })
                .collect(),

            (CoverStrategy::FileNameHint, _) => archive
                .entries()
                .iter()
                .filter(|entry| !entry.is_dir())
                .filter(|entry| {
                    let name = entry.name.to_lowercase();
                    (name.contains("cover") || name.contains("title"))
                        && has_extension(&name, &IMAGE_EXTENSIONS)
                })
                .map(|entry| entry.name.clone())
                .collect(),

            (CoverStrategy::FirstImage, _) => {
                let mut names = archive
                    .entries()
                    .iter()
                    .filter(|entry| !entry.is_dir())
                    .filter(|entry| {
                        let name = entry.name.to_lowercase();
                        has_extension(&name, &IMAGE_EXTENSIONS)
                            && !name.contains("thumbnail")
                            && !name.contains("icon")
                    })
                    .map(|entry| entry.name.clone())
                    .collect::<Vec<String>>();
                names.sort();
                names
            }

            (_, None) => Vec::new(),
        }
    }
}

/// The winning cover candidate
#[derive(Debug, Clone)]
pub struct ResolvedCover {
    /// The strategy that produced the cover
    pub strategy: CoverStrategy,

    /// Normalized archive path of the image entry
    pub source_path: String,

    /// MIME type sniffed from the entry bytes
    pub mime_type: Option<String>,

    /// The decoded bitmap
    pub image: DynamicImage,
}

impl ResolvedCover {
    /// Renders the cover as PNG, see [render_png]
    pub fn render_png(&self, max_size: Option<(u32, u32)>) -> Result<Vec<u8>, EpubError> {
        render_png(&self.image, max_size)
    }
}

/// Runs the cover cascade
///
/// # Return
/// - `Some(ResolvedCover)`: The first candidate, in cascade order, that decodes
/// - `None`: No strategy produced a usable image
pub fn resolve_cover<R: Read + Seek>(
    package: Option<&PackageDocument>,
    archive: &mut EpubArchive<R>,
    options: &ExtractOptions,
) -> Option<ResolvedCover> {
    let mut rejected = HashSet::new();

    for strategy in CoverStrategy::CASCADE {
        for candidate in strategy.candidates(package, archive, options) {
            if rejected.contains(&candidate) {
                continue;
            }

            match load_image(archive, &candidate, options.min_image_bytes) {
                Ok((source_path, mime_type, image)) => {
                    debug!("Cover resolved by {:?} from \"{}\"", strategy, source_path);
                    return Some(ResolvedCover {
                        strategy,
                        source_path,
                        mime_type,
                        image,
                    });
                }
                Err(err) => {
                    debug!("{:?} candidate \"{}\" rejected: {}", strategy, candidate, err);
                    rejected.insert(candidate);
                }
            }
        }
    }

    debug!("No cover image found");
    None
}

/// Locates, reads and decodes one candidate
fn load_image<R: Read + Seek>(
    archive: &mut EpubArchive<R>,
    path: &str,
    min_bytes: usize,
) -> Result<(String, Option<String>, DynamicImage), EpubError> {
    let (entry, data) = archive.read(path)?;
    let source_path = entry.normalized_name();

    if data.len() < min_bytes {
        return Err(EpubError::NotAnImageError {
            path: source_path,
            size: data.len(),
        });
    }

    let mime_type = infer::get(&data).map(|kind| kind.mime_type().to_string());
    let image = image::load_from_memory(&data)?;

    Ok((source_path, mime_type, image))
}

/// Resolved path of the first image referenced by a markup document
///
/// `<img src>`, `<image href>` and `<image xlink:href>` are recognized. References
/// carrying a URL scheme (remote or `data:` images) are skipped. Relative references
/// honor the document's `<base href>`.
fn first_image_in_document<R: Read + Seek>(
    archive: &mut EpubArchive<R>,
    document_path: &str,
) -> Option<String> {
    let (entry, data) = archive.read(document_path).ok()?;
    let markup = data.decode().ok()?;
    let document_path = entry.normalized_name();

    first_image_reference(&markup, &document_path)
}

/// Resolved path of the first local image referenced in `markup`
pub fn first_image_reference(markup: &str, document_path: &str) -> Option<String> {
    let base = base_href_dir(markup, document_path);

    IMAGE_REF_RE
        .captures_iter(markup)
        .filter_map(|captures| {
            captures
                .get(1)
                .or_else(|| captures.get(2))
                .or_else(|| captures.get(3))
                .map(|href| href.as_str().trim().to_string())
        })
        .find(|href| !href.is_empty() && !has_url_scheme(href))
        .map(|href| resolve(&decode_entities(&href), document_path, base.as_deref()))
}

/// Shrinks the image into `max_size`, flattens transparency onto white and encodes PNG
///
/// The aspect ratio is kept and images already inside the bounds are never enlarged.
pub fn render_png(image: &DynamicImage, max_size: Option<(u32, u32)>) -> Result<Vec<u8>, EpubError> {
    let image = match max_size {
        Some((width, height)) if image.width() > width || image.height() > height => {
            image.thumbnail(width, height)
        }
        _ => image.clone(),
    };

    let mut buffer = Vec::new();
    DynamicImage::ImageRgb8(flatten_onto_white(&image))
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)?;

    Ok(buffer)
}

fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let Rgba([red, green, blue, alpha]) = *rgba.get_pixel(x, y);
        let alpha = alpha as u32;
        let blend = |channel: u8| ((channel as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        Rgb([blend(red), blend(green), blend(blue)])
    })
}

/// Draws a vertical two-color gradient cover
///
/// The palette is picked from a SHA-1 of `seed`, so the same book always gets the
/// same colors.
pub fn placeholder_cover(seed: &str, width: u32, height: u32) -> DynamicImage {
    let digest = Sha1::digest(seed.as_bytes());
    let (top, bottom) = PLACEHOLDER_PALETTE[digest[0] as usize % PLACEHOLDER_PALETTE.len()];

    let height = height.max(1);
    let image = RgbImage::from_fn(width.max(1), height, |_, y| {
        let mix = |from: u8, to: u8| {
            let from = from as i32;
            let to = to as i32;
            (from + (to - from) * y as i32 / height as i32) as u8
        };
        Rgb([mix(top[0], bottom[0]), mix(top[1], bottom[1]), mix(top[2], bottom[2])])
    });

    DynamicImage::ImageRgb8(image)
}

fn has_extension(path: &str, extensions: &[&str]) -> bool {
    strip_fragment(path)
        .rsplit_once('.')
        .is_some_and(|(_, extension)| {
            extensions
                .iter()
                .any(|candidate| extension.eq_ignore_ascii_case(candidate))
        })
}

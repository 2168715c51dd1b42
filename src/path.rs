//! Archive path resolution
//!
//! Every href found in an EPUB (manifest items, guide references, spine documents,
//! `<img src>` inside content documents) is turned into a normalized path inside the
//! archive by [resolve]. Normalized paths use `/` separators, contain no `.` or `..`
//! segments and have no leading slash.

use std::sync::LazyLock;

use regex::Regex;

static BASE_HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<base\s[^>]*?href\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#).unwrap()
});

/// Resolves `href` into a normalized archive path
///
/// ## Parameters
/// - `href`: The reference to resolve, as written in the source document
/// - `relative_to`: Archive path of the document containing the reference
/// - `base_override`: Directory declared by the document's `<base href>`, if any;
///   replaces the directory of `relative_to`
///
/// ## Rules
/// - Backslashes are treated as forward slashes.
/// - A leading `/` makes the href relative to the archive root.
/// - Anything else (`./`, `../` or an implicit relative path) is joined onto the
///   effective base directory.
/// - `..` never climbs above the archive root; extra segments are dropped.
pub fn resolve(href: &str, relative_to: &str, base_override: Option<&str>) -> String {
    let href = href.trim().replace('\\', "/");

    if let Some(absolute) = href.strip_prefix('/') {
        return normalize(absolute);
    }

    let base = match base_override {
        Some(base) => base.replace('\\', "/"),
        None => parent_dir(relative_to),
    };

    if base.is_empty() {
        normalize(&href)
    } else {
        normalize(&format!("{}/{}", base, href))
    }
}

/// Normalizes an archive path
///
/// Converts `\` to `/`, drops empty and `.` segments and applies `..` by popping the
/// previous segment. Popping past the root is ignored.
pub fn normalize(path: &str) -> String {
    let path = path.replace('\\', "/");

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    segments.join("/")
}

/// Returns the normalized directory portion of an archive path
///
/// Returns an empty string for paths at the archive root.
pub fn parent_dir(path: &str) -> String {
    let path = normalize(path);
    match path.rfind('/') {
        Some(index) => path[..index].to_string(),
        None => String::new(),
    }
}

/// Returns the directory declared by a `<base href>` element in `markup`
///
/// Relative base hrefs are resolved against `document_path`. A base ending in `/`
/// names a directory; otherwise it names a document and its parent directory is used.
/// Bases carrying a URL scheme (`http:`, `file:`, ...) cannot point into the
/// archive and are ignored.
pub fn base_href_dir(markup: &str, document_path: &str) -> Option<String> {
    let captures = BASE_HREF_RE.captures(markup)?;
    let href = captures
        .get(1)
        .or_else(|| captures.get(2))
        .or_else(|| captures.get(3))?
        .as_str()
        .trim();

    if href.is_empty() || has_url_scheme(href) {
        return None;
    }

    let resolved = resolve(href, document_path, None);
    if href.ends_with('/') || href.ends_with('\\') || href == "." || href.ends_with("/.") {
        Some(resolved)
    } else {
        Some(parent_dir(&resolved))
    }
}

/// Removes a trailing `#fragment` or `?query` from an href
pub fn strip_fragment(href: &str) -> &str {
    match href.find(['#', '?']) {
        Some(index) => &href[..index],
        None => href,
    }
}

/// Checks whether an href starts with a URL scheme such as `http:` or `data:`
pub fn has_url_scheme(href: &str) -> bool {
    match href.find(':') {
        // A single letter before the colon is a Windows drive, not a scheme.
        Some(index) if index > 1 => href[..index]
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '-' | '.')),
        _ => false,
    }
}

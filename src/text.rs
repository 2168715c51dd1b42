//! Markup cleaning and chapter title heuristics
//!
//! Content documents are turned into plain text with a handful of targeted patterns
//! rather than an HTML parser; the output is meant for reading aloud and display,
//! not for faithful rendering.

use std::sync::LazyLock;

use regex::Regex;

use crate::utils::{NormalizeWhitespace, decode_entities};

static INVISIBLE_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<head[\s>].*?</head\s*>|<script[\s>].*?</script\s*>|<style[\s>].*?</style\s*>|<!--.*?-->")
        .unwrap()
});

static LINE_BREAK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<br(?:\s[^>]*)?/?>|<p(?:\s[^>]*)?/?>|</(?:p|div|h[1-6]|li|tr|blockquote|section)\s*>")
        .unwrap()
});

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());

static HORIZONTAL_SPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\u{00A0}\r\x0C]+").unwrap());

static EXCESS_NEWLINES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

static TITLE_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title\s*>").unwrap());

static H1_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<h1[^>]*>(.*?)</h1\s*>").unwrap());

static CHAPTER_HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^chapter\s+(?:\d+|[ivxlcdm]+)\b(?:\s*[:\-.\u{2013}\u{2014}]\s*|\s+)?.*$").unwrap()
});

static BOOKEND_HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:epilogue|prologue)\b(?:\s*[:\-.\u{2013}\u{2014}]\s*|\s+)?.*$").unwrap()
});

/// Longest line still considered a heading
const MAX_HEADING_CHARS: usize = 120;

/// Converts an HTML/XHTML document into plain text
///
/// - `<head>`, `<script>`, `<style>` and comments are dropped.
/// - `<br>`, `<p>` and the end of block elements become line breaks.
/// - All remaining tags are removed and character references decoded.
/// - Horizontal whitespace is collapsed, lines trimmed, runs of three or more
///   newlines reduced to two.
pub fn clean_html(markup: &str) -> String {
    let text = INVISIBLE_BLOCK_RE.replace_all(markup, "");
    let text = LINE_BREAK_RE.replace_all(&text, "\n");
    let text = TAG_RE.replace_all(&text, "");
    let text = decode_entities(&text);

    normalize_text(&text)
}

/// Collapses whitespace in plain text while keeping paragraph breaks
pub fn normalize_text(text: &str) -> String {
    let text = text.replace("\r\n", "\n");
    let text = HORIZONTAL_SPACE_RE.replace_all(&text, " ");
    let text = text.lines().map(str::trim).collect::<Vec<_>>().join("\n");
    let text = EXCESS_NEWLINES_RE.replace_all(&text, "\n\n");

    text.trim().to_string()
}

/// Detects a chapter heading among the first lines of cleaned text
///
/// Only the first `max_lines` non-empty lines are examined. Recognized headings are
/// `CHAPTER <number or roman numeral>` optionally followed by a separator (`:`, `-`,
/// `.`, dash or space) and a name, and lines starting with `EPILOGUE` or `PROLOGUE`,
/// all case-insensitive. The matching line is returned whitespace-normalized.
pub fn heading_title(text: &str, max_lines: usize) -> Option<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(max_lines)
        .find(|line| {
            line.chars().count() <= MAX_HEADING_CHARS
                && (CHAPTER_HEADING_RE.is_match(line) || BOOKEND_HEADING_RE.is_match(line))
        })
        .map(|line| line.normalize_whitespace())
}

/// Text of the document's `<title>` element, if it has any
pub fn title_tag(markup: &str) -> Option<String> {
    inner_text(&TITLE_TAG_RE, markup)
}

/// Text of the document's first `<h1>` element, if it has any
pub fn h1_tag(markup: &str) -> Option<String> {
    inner_text(&H1_TAG_RE, markup)
}

fn inner_text(pattern: &Regex, markup: &str) -> Option<String> {
    let inner = pattern.captures(markup)?.get(1)?.as_str();
    let text = decode_entities(&TAG_RE.replace_all(inner, " ")).normalize_whitespace();

    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use crate::text::{clean_html, h1_tag, heading_title, normalize_text, title_tag};

    #[test]
    fn test_clean_html_paragraphs_and_breaks() {
        let markup = r#"<?xml version="1.0"?>
<html><head><title>Ignored</title><style>p { color: red; }</style></head>
<body>
  <h2>Chapter 1</h2>
  <p class="first">It was a   bright cold day.</p>
  <p>Line one<br/>Line two<br>Line three</p>
  <script>var x = 1;</script>
</body></html>"#;

        assert_eq!(
            clean_html(markup),
            "Chapter 1\n\nIt was a bright cold day.\n\nLine one\nLine two\nLine three"
        );
    }

    #[test]
    fn test_clean_html_entities() {
        assert_eq!(
            clean_html("<p>Fish&nbsp;&amp;&nbsp;Chips &lt;3 &quot;yum&quot;</p>"),
            "Fish & Chips <3 \"yum\""
        );
    }

    #[test]
    fn test_clean_html_collapses_blank_lines() {
        let markup = "<p>A</p><p></p><p></p><p></p><div>B</div>";
        assert_eq!(clean_html(markup), "A\n\nB");
    }

    #[test]
    fn test_clean_plain_text_is_unchanged() {
        let text = "Already clean text.\n\nSecond paragraph with words.";
        assert_eq!(clean_html(text), text);

        let messy = "  Already clean   text.  \n\n\n\nSecond\tparagraph. ";
        assert_eq!(clean_html(messy), normalize_text(messy));
        assert_eq!(clean_html(messy), "Already clean text.\n\nSecond paragraph.");
    }

    #[test]
    fn test_heading_title_patterns() {
        assert_eq!(
            heading_title("CHAPTER 1: The Beginning\nText", 10),
            Some("CHAPTER 1: The Beginning".to_string())
        );
        assert_eq!(
            heading_title("\n\nChapter XII - Storm\nText", 10),
            Some("Chapter XII - Storm".to_string())
        );
        assert_eq!(heading_title("chapter 7", 10), Some("chapter 7".to_string()));
        assert_eq!(
            heading_title("Book One\nPrologue: Before", 10),
            Some("Prologue: Before".to_string())
        );
        assert_eq!(heading_title("EPILOGUE", 10), Some("EPILOGUE".to_string()));
    }

    #[test]
    fn test_heading_title_rejections() {
        assert_eq!(heading_title("Chapters of my life", 10), None);
        assert_eq!(heading_title("In this chapter 3 we see", 10), None);
        assert_eq!(heading_title("", 10), None);

        let late = format!("{}Chapter 2", "line\n".repeat(10));
        assert_eq!(heading_title(&late, 10), None);
        assert_eq!(heading_title(&late, 11), Some("Chapter 2".to_string()));
    }

    #[test]
    fn test_title_and_h1_tags() {
        let markup = "<html><head><title> The &amp; Title </title></head><body><h1 class='x'>Big <em>Head</em></h1></body></html>";
        assert_eq!(title_tag(markup), Some("The & Title".to_string()));
        assert_eq!(h1_tag(markup), Some("Big Head".to_string()));

        assert_eq!(title_tag("<title>  </title>"), None);
        assert_eq!(h1_tag("<p>none</p>"), None);
    }
}

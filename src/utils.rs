use std::collections::HashMap;

use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, WINDOWS_1252};
use log::warn;
use quick_xml::{
    Reader,
    events::{BytesStart, Event},
};

use crate::error::EpubError;

/// Provides functionality to decode byte data into strings
///
/// Text documents inside an EPUB declare their encoding unreliably, so decoding is
/// a fixed sequence of attempts, returning the first that succeeds:
///
/// 1. A byte order mark (UTF-8, UTF-16 BE, UTF-16 LE) decides the encoding.
/// 2. UTF-8, unless the data contains NUL bytes.
/// 3. UTF-16, only when the data has an even length and contains NUL bytes
///    (ASCII-range UTF-16 always does, 8-bit text never does). The byte order whose
///    high bytes hold the NULs is tried first, then the other one.
/// 4. Windows-1252, the ISO Latin-1 superset. It maps every byte, so plain ASCII is
///    always covered by this step.
///
/// ## Notes
/// - No further validation is done that the chosen encoding is the correct one.
pub trait DecodeBytes {
    fn decode(&self) -> Result<String, EpubError>;
}

impl DecodeBytes for [u8] {
    fn decode(&self) -> Result<String, EpubError> {
        if self.is_empty() {
            return Err(EpubError::EmptyDataError);
        }

        if let Some((encoding, bom_length)) = Encoding::for_bom(self) {
            if let Some(text) =
                encoding.decode_without_bom_handling_and_without_replacement(&self[bom_length..])
            {
                return Ok(text.into_owned());
            }
        }

        let has_nul = self.contains(&0);
        if !has_nul {
            if let Ok(text) = std::str::from_utf8(self) {
                return Ok(text.to_string());
            }
        }

        if has_nul && self.len() % 2 == 0 {
            // ASCII-range UTF-16 has its NULs in the high byte of each pair.
            let high_first = self.iter().step_by(2).filter(|&&byte| byte == 0).count();
            let high_last = self.iter().skip(1).step_by(2).filter(|&&byte| byte == 0).count();
            let order = if high_first > high_last {
                [UTF_16BE, UTF_16LE]
            } else {
                [UTF_16LE, UTF_16BE]
            };

            for encoding in order {
                if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(self)
                {
                    return Ok(text.into_owned());
                }
            }
        }

        let (text, _) = WINDOWS_1252.decode_without_bom_handling(self);
        Ok(text.into_owned())
    }
}

impl DecodeBytes for Vec<u8> {
    fn decode(&self) -> Result<String, EpubError> {
        self.as_slice().decode()
    }
}

/// Provides functionality for normalizing whitespace characters
///
/// This trait normalizes various sequences of whitespace characters
/// (including spaces, tabs, newlines, etc.) in a string into a single
/// whitespace character, removing leading and trailing whitespace characters.
pub trait NormalizeWhitespace {
    fn normalize_whitespace(&self) -> String;
}

impl NormalizeWhitespace for &str {
    fn normalize_whitespace(&self) -> String {
        self.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

impl NormalizeWhitespace for String {
    fn normalize_whitespace(&self) -> String {
        self.as_str().normalize_whitespace()
    }
}

/// Resolves a named or numeric character reference, without the `&` and `;`
///
/// Covers the XML predefined entities, `nbsp` and decimal/hexadecimal references.
/// Returns `None` for anything else so the caller can keep the raw text.
pub fn resolve_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let number = name.strip_prefix('#')?;
            let code = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// Decodes every character reference in `text` that [resolve_entity] knows
///
/// Unknown or malformed references are left untouched.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut result = String::with_capacity(text.len());
    let mut remaining = text;
    while let Some(start) = remaining.find('&') {
        result.push_str(&remaining[..start]);
        let candidate = &remaining[start + 1..];

        // Entity names are short; anything longer is a bare ampersand.
        let resolved = candidate
            .find(';')
            .filter(|&end| end > 0 && end <= 10)
            .and_then(|end| resolve_entity(&candidate[..end]).map(|ch| (ch, end)));

        match resolved {
            Some((ch, end)) => {
                result.push(ch);
                remaining = &candidate[end + 1..];
            }
            None => {
                result.push('&');
                remaining = candidate;
            }
        }
    }
    result.push_str(remaining);

    result
}

/// Represents an element node in a leniently parsed XML document
///
/// Names are stored as lowercase local names (namespace prefix removed),
/// attribute keys likewise, so lookups are case- and prefix-insensitive.
#[derive(Debug)]
pub struct XmlElement {
    /// The lowercase local name of the element
    pub name: String,

    /// The attributes of the element, keyed by lowercase local name
    pub attributes: HashMap<String, String>,

    /// The text inside the element before its first child
    pub text: String,

    /// The text after the element's end tag, up to the next sibling
    pub tail: String,

    /// The children of the element
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    /// Create a new element
    pub fn new(name: String) -> Self {
        Self {
            name,
            attributes: HashMap::new(),
            text: String::new(),
            tail: String::new(),
            children: Vec::new(),
        }
    }

    /// Gets the text content of the element and all its child elements
    ///
    /// The result is whitespace-normalized.
    pub fn text(&self) -> String {
        let mut result = String::new();
        self.collect_text(&mut result);

        result.normalize_whitespace()
    }

    fn collect_text(&self, result: &mut String) {
        result.push_str(&self.text);
        for child in &self.children {
            child.collect_text(result);
            result.push_str(&child.tail);
        }
    }

    /// Returns the value of the specified attribute
    pub fn get_attr(&self, name: &str) -> Option<String> {
        self.attributes.get(name).cloned()
    }

    /// Find all elements with the specified name, depth first, in document order
    ///
    /// `name` is compared against the lowercase local name, so `"Title"` finds
    /// `<dc:title>` as well as `<TITLE>`.
    pub fn find_elements_by_name<'a>(
        &'a self,
        name: &str,
    ) -> impl Iterator<Item = &'a XmlElement> + use<'a> {
        let target = name.to_ascii_lowercase();
        let mut pending = vec![self];

        std::iter::from_fn(move || {
            while let Some(element) = pending.pop() {
                pending.extend(element.children.iter().rev());
                if element.name == target {
                    return Some(element);
                }
            }
            None
        })
    }
}

/// Lenient XML tokenizer that builds an [XmlElement] tree
///
/// Real-world package documents are frequently not well formed. This reader accepts:
/// - missing or undeclared namespace prefixes (only local names are kept)
/// - mixed quoting, unquoted and valueless attributes, any attribute order
/// - mismatched or stray end tags
/// - broken markup: the construct the tokenizer rejects is skipped and tokenizing
///   resumes at the next `<`, so elements after it are still recovered
/// - truncated documents: every element recovered so far is kept
pub struct XmlReader {}

impl XmlReader {
    /// Parses XML from a string into a synthetic `#document` element
    ///
    /// The returned element's children are the top-level elements of the input.
    /// This function never fails; an empty or garbage input yields an empty document.
    pub fn parse(content: &str) -> XmlElement {
        let mut stack = vec![XmlElement::new("#document".to_string())];
        let mut offset = 0;

        while offset < content.len() {
            let Err(broken_at) = Self::tokenize(&content[offset..], &mut stack) else {
                break;
            };

            let resume_from = offset + broken_at + 1;
            match content
                .as_bytes()
                .get(resume_from..)
                .and_then(|rest| rest.iter().position(|&byte| byte == b'<'))
            {
                Some(next) => offset = resume_from + next,
                None => break,
            }
        }

        while stack.len() > 1 {
            Self::close_top(&mut stack);
        }

        stack.pop().unwrap_or_else(|| XmlElement::new("#document".to_string()))
    }

    /// Tokenizes `fragment` onto the open element stack
    ///
    /// # Return
    /// - `Ok(())`: The end of the fragment was reached
    /// - `Err(usize)`: Byte offset in `fragment` of the construct that could not be read
    fn tokenize(fragment: &str, stack: &mut Vec<XmlElement>) -> Result<(), usize> {
        let mut reader = Reader::from_str(fragment);
        {
            let config = reader.config_mut();
            config.check_end_names = false;
            config.allow_unmatched_ends = true;
            config.allow_dangling_amp = true;
        }

        let mut buf = Vec::new();
        loop {
            let event_start = reader.buffer_position() as usize;

            match reader.read_event_into(&mut buf) {
                Ok(Event::Eof) => return Ok(()),

                Ok(Event::Start(e)) => stack.push(Self::element(&e)),

                Ok(Event::Empty(e)) => {
                    let element = Self::element(&e);
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(element);
                    }
                }

                Ok(Event::End(e)) => {
                    let name = lowercase_name(e.local_name().as_ref());

                    // Close up to the nearest open element with this name; a stray end
                    // tag that matches nothing open is ignored.
                    if let Some(position) = stack.iter().skip(1).rposition(|el| el.name == name)
                    {
                        while stack.len() > position + 1 {
                            Self::close_top(stack);
                        }
                    }
                }

                Ok(Event::Text(e)) => Self::push_text(stack, &String::from_utf8_lossy(&e)),

                Ok(Event::CData(e)) => Self::push_text(stack, &String::from_utf8_lossy(&e)),

                Ok(Event::GeneralRef(e)) => {
                    let name = String::from_utf8_lossy(&e);
                    match resolve_entity(&name) {
                        Some(ch) => Self::push_text(stack, ch.encode_utf8(&mut [0; 4])),
                        None => Self::push_text(stack, &format!("&{};", name)),
                    }
                }

                Err(err) => {
                    warn!("Skipping malformed XML at byte {}: {}", event_start, err);
                    return Err(event_start);
                }

                // Comment, PI, Declaration, Doctype
                _ => {}
            }

            buf.clear();
        }
    }

    fn element(start: &BytesStart) -> XmlElement {
        let mut element = XmlElement::new(lowercase_name(start.local_name().as_ref()));
        for attr in start.html_attributes().flatten() {
            element.attributes.insert(
                lowercase_name(attr.key.local_name().as_ref()),
                decode_entities(&String::from_utf8_lossy(&attr.value)),
            );
        }
        element
    }

    /// Appends character data in document order: to the open element before its
    /// first child, otherwise to the tail of its last child
    fn push_text(stack: &mut [XmlElement], text: &str) {
        if let Some(element) = stack.last_mut() {
            match element.children.last_mut() {
                Some(child) => child.tail.push_str(text),
                None => element.text.push_str(text),
            }
        }
    }

    fn close_top(stack: &mut Vec<XmlElement>) {
        if let Some(element) = stack.pop() {
            if let Some(parent) = stack.last_mut() {
                parent.children.push(element);
            }
        }
    }
}

#[inline]
fn lowercase_name(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).to_ascii_lowercase()
}

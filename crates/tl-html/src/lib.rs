//! HTML tokenization and tree construction for server-rendered pages.

use tl_dom::Document;
use tl_dom::NodeId;
use tracing::trace;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

/// Parses raw HTML into a DOM document.
#[derive(Debug, Default)]
pub struct HtmlParser;

impl HtmlParser {
    pub fn parse(&self, input: &str) -> Document {
        let mut builder = TreeBuilder::new();
        let bytes = input.as_bytes();
        let mut idx = 0_usize;

        while idx < bytes.len() {
            if bytes[idx] != b'<' {
                let next = find_byte(bytes, idx, b'<').unwrap_or(bytes.len());
                builder.text(&input[idx..next]);
                idx = next;
                continue;
            }

            if starts_with(bytes, idx, b"<!--") {
                idx = skip_comment(bytes, idx);
                continue;
            }

            if starts_with(bytes, idx, b"<!") {
                idx = skip_to_gt(bytes, idx.saturating_add(2));
                continue;
            }

            if starts_with(bytes, idx, b"<?") {
                idx = skip_processing_instruction(bytes, idx);
                continue;
            }

            let Some((tag, next_idx)) = parse_tag(input, idx) else {
                builder.text("<");
                idx = idx.saturating_add(1);
                continue;
            };

            if tag.is_end {
                builder.close(&tag.name);
                idx = next_idx;
                continue;
            }

            let element = builder.open(&tag);
            if !tag.self_closing && RAW_TEXT_ELEMENTS.contains(&tag.name.as_str()) {
                let (raw, after_raw) = read_raw_text_until_end_tag(input, next_idx, &tag.name);
                if !raw.is_empty() {
                    builder.raw_text(element, raw);
                }
                builder.close(&tag.name);
                idx = after_raw;
                continue;
            }

            idx = next_idx;
        }

        builder.finish()
    }
}

struct TreeBuilder {
    document: Document,
    open: Vec<NodeId>,
}

impl TreeBuilder {
    fn new() -> Self {
        let document = Document::empty();
        let root = document.root();
        Self {
            document,
            open: vec![root],
        }
    }

    fn current(&self) -> NodeId {
        self.open.last().copied().unwrap_or(self.document.root())
    }

    fn text(&mut self, raw: &str) {
        if raw.trim().is_empty() {
            return;
        }

        let decoded = decode_character_references(raw);
        let node = self.document.create_text(&decoded);
        let parent = self.current();
        if let Err(error) = self.document.append_child(parent, node) {
            trace!(%error, "dropping text node");
        }
    }

    fn raw_text(&mut self, element: NodeId, raw: &str) {
        let node = self.document.create_text(raw);
        if let Err(error) = self.document.append_child(element, node) {
            trace!(%error, "dropping raw text node");
        }
    }

    fn open(&mut self, tag: &ParsedTag) -> NodeId {
        let element = self.document.create_element(&tag.name);
        for (name, value) in &tag.attributes {
            if !name.is_empty() && !self.document.has_attribute(element, name) {
                self.document.set_attribute(element, name, value);
            }
        }

        let parent = self.current();
        if let Err(error) = self.document.append_child(parent, element) {
            trace!(%error, tag = %tag.name, "dropping element");
            return element;
        }

        if !tag.self_closing && !VOID_ELEMENTS.contains(&tag.name.as_str()) {
            self.open.push(element);
        }

        element
    }

    fn close(&mut self, name: &str) {
        let position = self
            .open
            .iter()
            .rposition(|node| self.document.is_element(*node, name));

        match position {
            Some(index) if index > 0 => self.open.truncate(index),
            _ => trace!(tag = name, "ignoring unmatched end tag"),
        }
    }

    fn finish(self) -> Document {
        self.document
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ParsedTag {
    name: String,
    is_end: bool,
    self_closing: bool,
    attributes: Vec<(String, String)>,
}

fn parse_tag(input: &str, start: usize) -> Option<(ParsedTag, usize)> {
    let bytes = input.as_bytes();
    if bytes.get(start).copied() != Some(b'<') {
        return None;
    }

    let mut idx = start.saturating_add(1);
    let mut is_end = false;
    if bytes.get(idx).copied() == Some(b'/') {
        is_end = true;
        idx = idx.saturating_add(1);
    }

    let name_start = idx;
    while idx < bytes.len() && is_tag_name_char(bytes[idx]) {
        idx = idx.saturating_add(1);
    }

    if idx == name_start {
        return None;
    }

    let name = input[name_start..idx].to_ascii_lowercase();
    let mut attributes = Vec::new();
    let mut self_closing = false;

    loop {
        idx = skip_spaces(bytes, idx);
        match bytes.get(idx).copied() {
            None => return None,
            Some(b'>') => break,
            Some(b'/') => {
                idx = idx.saturating_add(1);
                if bytes.get(idx).copied() == Some(b'>') {
                    self_closing = true;
                    break;
                }
                continue;
            }
            Some(_) => {}
        }

        let attr_start = idx;
        while idx < bytes.len() && !is_attribute_name_end(bytes[idx]) {
            idx = idx.saturating_add(1);
        }
        let attr_name = input[attr_start..idx].to_ascii_lowercase();

        idx = skip_spaces(bytes, idx);
        if bytes.get(idx).copied() != Some(b'=') {
            attributes.push((attr_name, String::new()));
            continue;
        }

        idx = skip_spaces(bytes, idx.saturating_add(1));
        let (value, after_value) = read_attribute_value(input, idx)?;
        attributes.push((attr_name, decode_character_references(value)));
        idx = after_value;
    }

    Some((
        ParsedTag {
            name,
            is_end,
            self_closing,
            attributes,
        },
        idx.saturating_add(1),
    ))
}

fn read_attribute_value(input: &str, start: usize) -> Option<(&str, usize)> {
    let bytes = input.as_bytes();
    match bytes.get(start).copied() {
        Some(quote @ (b'"' | b'\'')) => {
            let value_start = start.saturating_add(1);
            let end = find_byte(bytes, value_start, quote)?;
            Some((&input[value_start..end], end.saturating_add(1)))
        }
        Some(_) => {
            let mut idx = start;
            while idx < bytes.len() && !bytes[idx].is_ascii_whitespace() && bytes[idx] != b'>' {
                idx = idx.saturating_add(1);
            }
            Some((&input[start..idx], idx))
        }
        None => None,
    }
}

fn read_raw_text_until_end_tag<'a>(
    input: &'a str,
    start: usize,
    tag_name: &str,
) -> (&'a str, usize) {
    let bytes = input.as_bytes();
    let tag_bytes = tag_name.as_bytes();
    let mut idx = start;

    while idx < bytes.len() {
        if bytes[idx] == b'<'
            && bytes.get(idx.saturating_add(1)).copied() == Some(b'/')
            && starts_with_ignore_ascii_case(bytes, idx.saturating_add(2), tag_bytes)
            && tag_name_boundary(bytes, idx.saturating_add(2 + tag_bytes.len()))
        {
            let end = skip_to_gt(bytes, idx);
            return (&input[start..idx], end);
        }

        idx = idx.saturating_add(1);
    }

    (&input[start..], bytes.len())
}

fn decode_character_references(input: &str) -> String {
    if !input.contains('&') {
        return input.to_owned();
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let candidate = &rest[amp..];
        let decoded = candidate
            .find(';')
            .filter(|end| *end <= 10)
            .and_then(|end| decode_reference(&candidate[1..end]).map(|ch| (ch, end)));

        match decoded {
            Some((ch, end)) => {
                out.push(ch);
                rest = &candidate[end + 1..];
            }
            None => {
                out.push('&');
                rest = &candidate[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_reference(name: &str) -> Option<char> {
    if let Some(numeric) = name.strip_prefix('#') {
        let code = match numeric.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => numeric.parse::<u32>().ok()?,
        };
        return char::from_u32(code);
    }

    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => None,
    }
}

fn skip_comment(bytes: &[u8], start: usize) -> usize {
    find_subslice(bytes, start.saturating_add(4), b"-->")
        .map(|end| end.saturating_add(3))
        .unwrap_or(bytes.len())
}

fn skip_processing_instruction(bytes: &[u8], start: usize) -> usize {
    if let Some(end) = find_subslice(bytes, start.saturating_add(2), b"?>") {
        return end.saturating_add(2);
    }

    skip_to_gt(bytes, start.saturating_add(2))
}

fn skip_to_gt(bytes: &[u8], mut idx: usize) -> usize {
    while idx < bytes.len() {
        if bytes[idx] == b'>' {
            return idx.saturating_add(1);
        }
        idx = idx.saturating_add(1);
    }

    bytes.len()
}

fn tag_name_boundary(bytes: &[u8], idx: usize) -> bool {
    match bytes.get(idx).copied() {
        None => true,
        Some(byte) => byte.is_ascii_whitespace() || byte == b'>' || byte == b'/',
    }
}

fn skip_spaces(bytes: &[u8], mut idx: usize) -> usize {
    while idx < bytes.len() && bytes[idx].is_ascii_whitespace() {
        idx = idx.saturating_add(1);
    }
    idx
}

fn is_tag_name_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b':')
}

fn is_attribute_name_end(byte: u8) -> bool {
    byte.is_ascii_whitespace() || matches!(byte, b'=' | b'>' | b'/')
}

fn starts_with(bytes: &[u8], idx: usize, pattern: &[u8]) -> bool {
    let end = idx.saturating_add(pattern.len());
    end <= bytes.len() && bytes[idx..end] == *pattern
}

fn starts_with_ignore_ascii_case(bytes: &[u8], idx: usize, pattern: &[u8]) -> bool {
    let end = idx.saturating_add(pattern.len());
    if end > bytes.len() {
        return false;
    }

    bytes[idx..end]
        .iter()
        .zip(pattern.iter())
        .all(|(left, right)| left.eq_ignore_ascii_case(right))
}

fn find_subslice(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if from >= bytes.len() {
        return None;
    }

    bytes[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|offset| from + offset)
}

fn find_byte(bytes: &[u8], from: usize, byte: u8) -> Option<usize> {
    bytes
        .get(from..)?
        .iter()
        .position(|candidate| *candidate == byte)
        .map(|offset| from + offset)
}

#[cfg(test)]
mod tests {
    use super::HtmlParser;
    use super::decode_character_references;

    const VOTE_CARD: &str = r#"
        <!DOCTYPE html>
        <html><body>
        <div class="card-footer">
            <form method="post" action="/posts/1/vote/upvote/" class="d-inline vote-form">
                <input type="hidden" name="csrfmiddlewaretoken" value="test-csrf">
                <button type="submit" class="btn btn-outline-success vote-btn"
                        data-post-id="1" data-vote-type="upvote">
                    <i class="fa fa-thumbs-up"></i> Up
                </button>
            </form>
            <span class="vote-count" id="vote-count-1"><strong>0</strong></span>
        </div>
        </body></html>
    "#;

    #[test]
    fn builds_nested_tree_with_attributes() {
        let doc = HtmlParser.parse(VOTE_CARD);
        let counter = doc.element_by_id("vote-count-1");
        assert!(counter.is_some());
        let counter = match counter {
            Some(node) => node,
            None => panic!("counter missing"),
        };
        assert_eq!(doc.text_content(counter), "0");

        let button = doc.find_descendant(doc.root(), |doc, node| {
            doc.attribute(node, "data-vote-type") == Some("upvote")
        });
        let button = match button {
            Some(node) => node,
            None => panic!("button missing"),
        };
        assert_eq!(doc.attribute(button, "data-post-id"), Some("1"));
        assert!(doc.has_class(button, "btn-outline-success"));
        assert_eq!(doc.text_content(button).trim(), "Up");
    }

    #[test]
    fn void_input_does_not_swallow_siblings() {
        let doc = HtmlParser.parse(VOTE_CARD);
        let form = doc.first_descendant_by_tag(doc.root(), "form");
        let form = match form {
            Some(node) => node,
            None => panic!("form missing"),
        };
        let input = doc.first_descendant_by_tag(form, "input");
        let button = doc.first_descendant_by_tag(form, "button");
        assert!(input.is_some());
        assert!(button.is_some());
        assert_eq!(doc.parent(button.unwrap_or(form)), Some(form));
    }

    #[test]
    fn boolean_and_unquoted_attributes_are_kept() {
        let doc = HtmlParser.parse("<button disabled data-post-id=7 class='a b'>x</button>");
        let button = doc.first_descendant_by_tag(doc.root(), "button");
        let button = match button {
            Some(node) => node,
            None => panic!("button missing"),
        };
        assert!(doc.is_disabled(button));
        assert_eq!(doc.attribute(button, "data-post-id"), Some("7"));
        assert_eq!(doc.classes(button), vec!["a", "b"]);
    }

    #[test]
    fn script_body_is_raw_text() {
        let doc = HtmlParser.parse("<body><script>if (a < b) { x(); }</script><p>hi</p></body>");
        let script = doc.first_descendant_by_tag(doc.root(), "script");
        let script = match script {
            Some(node) => node,
            None => panic!("script missing"),
        };
        assert_eq!(doc.text_content(script), "if (a < b) { x(); }");
        assert!(doc.first_descendant_by_tag(doc.root(), "p").is_some());
    }

    #[test]
    fn unmatched_end_tags_are_ignored() {
        let doc = HtmlParser.parse("<div id=\"a\"></span><em>ok</em></div>");
        let div = doc.element_by_id("a");
        let div = match div {
            Some(node) => node,
            None => panic!("div missing"),
        };
        assert_eq!(doc.text_content(div), "ok");
    }

    #[test]
    fn decodes_named_and_numeric_references() {
        assert_eq!(
            decode_character_references("a &amp; b &#x3C; c &#62; &bogus; &"),
            "a & b < c > &bogus; &"
        );
    }
}

//! Low-level string tokenizer for the narrow SpreadsheetML subset the
//! streaming path reads.
//!
//! Not a general XML parser: CDATA and comments inside rows are not handled.
//! Element names are compared by local name, so `<x:row>` matches `row`
//! whatever the prefix is bound to. Every lookup reports "not found" for a
//! fragment that is still incomplete, so callers can keep a partial row in
//! their buffer until more text arrives.

use std::borrow::Cow;

/// An element located in a text buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Element<'a> {
    /// Opening tag including `<` and `>`.
    pub tag: &'a str,
    /// Content between the opening and closing tags; `None` when self-closing.
    pub body: Option<&'a str>,
    /// Byte offset of `<`.
    pub start: usize,
    /// Byte offset just past the element.
    pub end: usize,
}

fn is_name_delimiter(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'>' | b'/')
}

enum NameMatch {
    /// Matched; offset just past the qualified name.
    Yes(usize),
    No,
    /// The name runs to the end of the buffer.
    Incomplete,
}

/// Compare the tag name starting at `name_start` with `local`, ignoring any prefix.
fn match_tag_name(hay: &str, name_start: usize, local: &str) -> NameMatch {
    let Some(rest) = hay.as_bytes().get(name_start..) else {
        return NameMatch::Incomplete;
    };
    let Some(len) = rest.iter().position(|&b| is_name_delimiter(b)) else {
        return NameMatch::Incomplete;
    };
    let qname = hay.get(name_start..name_start + len).unwrap_or("");
    let local_part = qname.rsplit_once(':').map_or(qname, |(_, l)| l);
    if local_part == local {
        NameMatch::Yes(name_start + len)
    } else {
        NameMatch::No
    }
}

/// Offset of the next `<name` (or `<prefix:name`) opening tag at or after `from`.
///
/// `<c` does not match `<col`: the name must be followed by whitespace, `>` or `/`.
/// A match at the very end of `hay` is not reported since the delimiter is unknown.
pub fn find_open_tag(hay: &str, from: usize, name: &str) -> Option<usize> {
    let mut cursor = from;
    loop {
        let rest = hay.get(cursor..)?;
        let rel = rest.find('<')?;
        let open = cursor + rel;
        match match_tag_name(hay, open + 1, name) {
            NameMatch::Yes(_) => return Some(open),
            NameMatch::Incomplete => return None,
            NameMatch::No => cursor = open + 1,
        }
    }
}

/// Offset of the last `<name` opening tag that starts before `before`.
pub fn rfind_open_tag(hay: &str, before: usize, name: &str) -> Option<usize> {
    let mut limit = before;
    loop {
        let window = hay.get(..limit)?;
        let open = window.rfind('<')?;
        if let NameMatch::Yes(_) = match_tag_name(hay, open + 1, name) {
            return Some(open);
        }
        limit = open;
    }
}

/// Byte range of the next complete `</name>` closing tag at or after `from`.
pub fn find_close_tag(hay: &str, from: usize, name: &str) -> Option<(usize, usize)> {
    let bytes = hay.as_bytes();
    let mut cursor = from;
    loop {
        let rest = hay.get(cursor..)?;
        let rel = rest.find("</")?;
        let open = cursor + rel;
        match match_tag_name(hay, open + 2, name) {
            NameMatch::Yes(mut pos) => {
                while bytes.get(pos).is_some_and(u8::is_ascii_whitespace) {
                    pos += 1;
                }
                match bytes.get(pos) {
                    Some(b'>') => return Some((open, pos + 1)),
                    Some(_) => cursor = open + 2,
                    None => return None,
                }
            }
            NameMatch::Incomplete => return None,
            NameMatch::No => cursor = open + 2,
        }
    }
}

/// Locate the next complete `name` element at or after `from`.
///
/// Returns `None` if there is none, or if the first one found is not yet
/// complete (its closing tag is beyond the end of `hay`).
pub fn next_element<'a>(hay: &'a str, from: usize, name: &str) -> Option<Element<'a>> {
    let start = find_open_tag(hay, from, name)?;
    let gt = start + hay.get(start..)?.find('>')?;
    let tag = hay.get(start..=gt)?;
    if tag.ends_with("/>") {
        return Some(Element {
            tag,
            body: None,
            start,
            end: gt + 1,
        });
    }
    let body_start = gt + 1;
    let (body_end, end) = find_close_tag(hay, body_start, name)?;
    Some(Element {
        tag,
        body: hay.get(body_start..body_end),
        start,
        end,
    })
}

/// Raw (still entity-encoded) value of attribute `name` in an opening tag.
pub fn attr<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let bytes = tag.as_bytes();
    let mut cursor = 0usize;
    while let Some(rel) = tag.get(cursor..)?.find(name) {
        let idx = cursor + rel;
        cursor = idx + name.len();
        let preceded_ok = idx
            .checked_sub(1)
            .and_then(|i| bytes.get(i))
            .is_some_and(|b| b.is_ascii_whitespace());
        if !preceded_ok {
            continue;
        }
        let mut pos = idx + name.len();
        while bytes.get(pos).is_some_and(u8::is_ascii_whitespace) {
            pos += 1;
        }
        if bytes.get(pos) != Some(&b'=') {
            continue;
        }
        pos += 1;
        while bytes.get(pos).is_some_and(u8::is_ascii_whitespace) {
            pos += 1;
        }
        let quote = *bytes.get(pos)?;
        if quote != b'"' && quote != b'\'' {
            continue;
        }
        let value_start = pos + 1;
        let value_len = tag.get(value_start..)?.find(char::from(quote))?;
        return tag.get(value_start..value_start + value_len);
    }
    None
}

/// Decode the five predefined XML entities plus numeric character references.
///
/// Unknown or malformed references are kept verbatim.
pub fn decode_entities(s: &str) -> Cow<'_, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(rest.get(..amp).unwrap_or(""));
        let tail = rest.get(amp..).unwrap_or("");
        let decoded = tail
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| {
                let entity = tail.get(1..semi)?;
                decode_entity(entity).map(|ch| (ch, semi + 1))
            });
        match decoded {
            Some((ch, consumed)) => {
                out.push(ch);
                rest = tail.get(consumed..).unwrap_or("");
            }
            None => {
                out.push('&');
                rest = tail.get(1..).unwrap_or("");
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let num = entity.strip_prefix('#')?;
            let code = match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// Append the decoded text of every `<t>` run in `xml` to `out`.
///
/// Phonetic runs (`<rPh>`) are skipped; they annotate the text, they are not part of it.
pub fn push_text_runs(xml: &str, out: &mut String) {
    let mut cursor = 0usize;
    loop {
        let next_t = find_open_tag(xml, cursor, "t");
        let next_rph = find_open_tag(xml, cursor, "rPh");
        if let (Some(rph), Some(t)) = (next_rph, next_t) {
            if rph < t {
                match next_element(xml, rph, "rPh") {
                    Some(skip) => {
                        cursor = skip.end;
                        continue;
                    }
                    None => return,
                }
            }
        }
        let Some(t) = next_t else {
            return;
        };
        let Some(run) = next_element(xml, t, "t") else {
            return;
        };
        if let Some(body) = run.body {
            out.push_str(&decode_entities(body));
        }
        cursor = run.end;
    }
}

/// Byte range of the first complete `<row ...>...</row>` fragment in `buf`.
///
/// Searches for the closing tag first and backtracks to the nearest opening
/// tag, so self-closing empty rows in between are stepped over.
pub fn next_row_fragment(buf: &str) -> Option<(usize, usize)> {
    let (close, end) = find_close_tag(buf, 0, "row")?;
    let start = rfind_open_tag(buf, close, "row")?;
    Some((start, end))
}

/// The `r` attribute of a row fragment's opening tag.
pub fn row_number(fragment: &str) -> Option<u32> {
    let gt = fragment.find('>')?;
    let tag = fragment.get(..=gt)?;
    attr(tag, "r")?.trim().parse().ok()
}

/// One `<c>` element as it appears in the XML, nothing resolved yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawCell<'a> {
    /// The `r` attribute ("B12").
    pub reference: Option<&'a str>,
    /// The `t` attribute.
    pub cell_type: Option<&'a str>,
    /// Body of `<v>`, still entity-encoded.
    pub value: Option<&'a str>,
    /// Body of `<is>` for inline strings.
    pub inline: Option<&'a str>,
}

/// Iterator over the cells of one row fragment.
pub struct Cells<'a> {
    row: &'a str,
    cursor: usize,
}

/// Iterate the `<c>` elements (self-closing or not) of a row fragment.
pub fn cells(row: &str) -> Cells<'_> {
    Cells { row, cursor: 0 }
}

impl<'a> Iterator for Cells<'a> {
    type Item = RawCell<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let element = next_element(self.row, self.cursor, "c")?;
        self.cursor = element.end;
        let mut cell = RawCell {
            reference: attr(element.tag, "r"),
            cell_type: attr(element.tag, "t"),
            ..RawCell::default()
        };
        if let Some(body) = element.body {
            cell.value = next_element(body, 0, "v").and_then(|v| v.body);
            cell.inline = next_element(body, 0, "is").and_then(|is| is.body);
        }
        Some(cell)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;

    #[test]
    fn test_find_open_tag_respects_name_boundary() {
        let xml = r#"<cols><col min="1"/></cols><c r="A1"/>"#;
        assert_eq!(find_open_tag(xml, 0, "c"), Some(27));
        assert_eq!(find_open_tag(xml, 0, "col"), Some(6));
        assert_eq!(find_open_tag("<sheetData", 0, "sheetData"), None);
        assert_eq!(find_open_tag("<sheetData>", 0, "sheetData"), Some(0));
    }

    #[test]
    fn test_next_element_incomplete_returns_none() {
        assert!(next_element(r#"<c r="A1"><v>12"#, 0, "c").is_none());
        assert!(next_element(r#"<c r="A1""#, 0, "c").is_none());
        let done = next_element(r#"<c r="A1"><v>12</v></c>tail"#, 0, "c").unwrap();
        assert_eq!(done.body, Some("<v>12</v>"));
        assert_eq!(done.end, 23);
    }

    #[test]
    fn test_attr_lookup() {
        let tag = r#"<c r="B7" s="3" t="s">"#;
        assert_eq!(attr(tag, "r"), Some("B7"));
        assert_eq!(attr(tag, "t"), Some("s"));
        assert_eq!(attr(tag, "s"), Some("3"));
        assert_eq!(attr(tag, "x"), None);
        // `ref` must not match inside `xref`
        assert_eq!(attr(r#"<a xref="1" ref = 'A1:B2'/>"#, "ref"), Some("A1:B2"));
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("plain"), "plain");
        assert_eq!(
            decode_entities("R&amp;D &lt;ops&gt; &quot;x&quot; &apos;y&apos;"),
            "R&D <ops> \"x\" 'y'"
        );
        assert_eq!(decode_entities("&#65;&#x42;"), "AB");
        assert_eq!(decode_entities("AT&T & co"), "AT&T & co");
    }

    #[test]
    fn test_push_text_runs_skips_phonetic() {
        let mut out = String::new();
        push_text_runs(
            r#"<r><t>Rich </t></r><r><t xml:space="preserve">text</t></r><rPh sb="0" eb="1"><t>ignored</t></rPh>"#,
            &mut out,
        );
        assert_eq!(out, "Rich text");
    }

    #[test]
    fn test_next_row_fragment_steps_over_empty_rows() {
        let buf = r#"<sheetData><row r="1"/><row r="2"><c r="A2"><v>1</v></c></row><row r="3">"#;
        let (start, end) = next_row_fragment(buf).unwrap();
        let fragment = &buf[start..end];
        assert!(fragment.starts_with(r#"<row r="2">"#));
        assert!(fragment.ends_with("</row>"));
        assert_eq!(row_number(fragment), Some(2));
        assert!(next_row_fragment(&buf[end..]).is_none());
    }

    #[test]
    fn test_cells_iteration() {
        let row = r#"<row r="2"><c r="A2" t="s"><v>0</v></c><c r="B2"/><c r="C2" t="inlineStr"><is><t>hi</t></is></c><c r="D2"><f>A1</f><v>3.5</v></c></row>"#;
        let cells: Vec<_> = cells(row).collect();
        assert_eq!(cells.len(), 4);
        assert_eq!(cells[0].reference, Some("A2"));
        assert_eq!(cells[0].cell_type, Some("s"));
        assert_eq!(cells[0].value, Some("0"));
        assert_eq!(cells[1].value, None);
        assert_eq!(cells[2].inline, Some("<t>hi</t>"));
        assert_eq!(cells[3].value, Some("3.5"));
    }

    #[test]
    fn test_prefixed_names_match_by_local_name() {
        let xml = r#"<x:sheetData><x:row r="1"><x:c r="A1" t="inlineStr"><x:is><x:t>Job</x:t></x:is></x:c></x:row ></x:sheetData>"#;
        assert_eq!(find_open_tag(xml, 0, "sheetData"), Some(0));
        assert_eq!(find_open_tag(xml, 0, "row"), Some(13));
        assert_eq!(find_open_tag(xml, 0, "r"), None);
        assert_eq!(find_close_tag(xml, 0, "sheetData").map(|(s, _)| &xml[s..]), Some("</x:sheetData>"));

        let (start, end) = next_row_fragment(xml).unwrap();
        assert!(xml[start..end].starts_with("<x:row"));
        assert!(xml[start..end].ends_with("</x:row >"));
        assert_eq!(row_number(&xml[start..end]), Some(1));

        let cell = cells(&xml[start..end]).next().unwrap();
        assert_eq!(cell.reference, Some("A1"));
        let mut text = String::new();
        push_text_runs(cell.inline.unwrap(), &mut text);
        assert_eq!(text, "Job");
    }

    #[test]
    fn test_find_close_tag_waits_for_full_tag() {
        assert_eq!(find_close_tag("<v>1</v", 0, "v"), None);
        assert_eq!(find_close_tag("<v>1</vx></v>", 0, "v"), Some((9, 13)));
        assert_eq!(find_close_tag("</x:row>", 0, "row"), Some((0, 8)));
    }
}

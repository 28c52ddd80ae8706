//! Shared string table for the streaming path.

use log::debug;

use crate::decompress::{decompress_to_string, StreamOptions};
use crate::error::Result;
use crate::scan::{find_open_tag, next_element, push_text_runs};
use crate::source::ByteSource;
use crate::zip_directory::ZipDirectory;

/// Default location of the shared string part.
pub const SHARED_STRINGS_PATH: &str = "xl/sharedStrings.xml";

/// Parse `sharedStrings.xml` into strings indexed by `<si>` position.
///
/// Every `<si>` yields exactly one entry (empty if it has no text runs), so
/// worksheet indices stay aligned.
pub fn parse_shared_strings(xml: &str) -> Vec<String> {
    let mut strings = Vec::new();
    let mut cursor = 0usize;
    while let Some(start) = find_open_tag(xml, cursor, "si") {
        let Some(si) = next_element(xml, start, "si") else {
            break;
        };
        let mut text = String::new();
        if let Some(body) = si.body {
            push_text_runs(body, &mut text);
        }
        strings.push(text);
        cursor = si.end;
    }
    strings
}

/// Load and parse the shared strings entry at `path`; absent means no shared strings.
///
/// # Errors
/// Propagates decompression errors from the entry.
pub async fn load_shared_strings<S: ByteSource + ?Sized>(
    source: &S,
    directory: &ZipDirectory,
    path: &str,
    options: StreamOptions,
) -> Result<Vec<String>> {
    let Some(entry) = directory.find(path) else {
        debug!("no shared strings at {path}");
        return Ok(Vec::new());
    };
    let xml = decompress_to_string(source, entry, options).await?;
    let strings = parse_shared_strings(&xml);
    debug!("shared strings: {} entries from {} bytes", strings.len(), xml.len());
    Ok(strings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_alignment_with_empty_entries() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="5" uniqueCount="5">
<si><t>Ops</t></si>
<si/>
<si><t></t></si>
<si><r><rPr><b/></rPr><t>Rich</t></r><r><t xml:space="preserve"> run</t></r></si>
<si><t>R&amp;D &lt;ops&gt;</t><rPh sb="0" eb="1"><t>ard</t></rPh></si>
</sst>"#;
        assert_eq!(
            parse_shared_strings(xml),
            vec!["Ops", "", "", "Rich run", "R&D <ops>"]
        );
    }

    #[test]
    fn test_si_without_text_runs() {
        assert_eq!(
            parse_shared_strings("<sst><si><r></r></si><si><t>x</t></si></sst>"),
            vec!["", "x"]
        );
    }

    #[test]
    fn test_sst_tag_is_not_an_si() {
        assert!(parse_shared_strings("<sst count=\"0\"></sst>").is_empty());
    }
}

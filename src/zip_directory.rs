//! ZIP structure discovery over range reads.
//!
//! Only the trailing EOCD window, the central directory and one 30-byte local
//! header per entry are read; entry data is left for [`crate::decompress`].

use log::debug;

use crate::error::{ImportError, Result};
use crate::source::ByteSource;

const EOCD_SIGNATURE: u32 = 0x0605_4b50;
const CENTRAL_SIGNATURE: u32 = 0x0201_4b50;
const LOCAL_SIGNATURE: u32 = 0x0403_4b50;

const EOCD_LEN: usize = 22;
/// EOCD record plus the longest possible archive comment.
const EOCD_SEARCH_WINDOW: u64 = 65_557;
const CENTRAL_HEADER_LEN: usize = 46;
const LOCAL_HEADER_LEN: usize = 30;

/// How an entry's bytes are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    /// Raw DEFLATE (method 8).
    Deflate,
    /// Anything else; only an error if the entry is actually opened.
    Unsupported(u16),
}

impl From<u16> for CompressionMethod {
    fn from(method: u16) -> Self {
        match method {
            0 => Self::Stored,
            8 => Self::Deflate,
            other => Self::Unsupported(other),
        }
    }
}

/// A resolved archive member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipEntry {
    pub name: String,
    pub compression: CompressionMethod,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub local_header_offset: u64,
    /// First byte of the entry's data, known only once the local header has been read.
    pub data_offset: u64,
}

/// Central-directory view of the archive.
#[derive(Debug, Clone, Default)]
pub struct ZipDirectory {
    pub entries: Vec<ZipEntry>,
}

impl ZipDirectory {
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&ZipEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }
}

fn le_u16(buf: &[u8], at: usize) -> Option<u16> {
    let bytes = buf.get(at..at + 2)?;
    Some(u16::from_le_bytes(bytes.try_into().ok()?))
}

fn le_u32(buf: &[u8], at: usize) -> Option<u32> {
    let bytes = buf.get(at..at + 4)?;
    Some(u32::from_le_bytes(bytes.try_into().ok()?))
}

fn truncated(what: &str) -> ImportError {
    ImportError::format(format!("truncated {what}"))
}

/// Offset (within `window`) of the last EOCD signature with room for a full record.
fn find_eocd(window: &[u8]) -> Option<usize> {
    let last = window.len().checked_sub(EOCD_LEN)?;
    (0..=last)
        .rev()
        .find(|&i| le_u32(window, i) == Some(EOCD_SIGNATURE))
}

fn reject_zip64(value: u32, field: &str) -> Result<u64> {
    if value == u32::MAX {
        return Err(ImportError::format(format!(
            "ZIP64 archives are not supported ({field})"
        )));
    }
    Ok(u64::from(value))
}

/// Read the archive's entry list, resolving every entry's data offset.
///
/// # Errors
/// `FormatError` if there is no EOCD record in the trailing window, if a
/// central or local header signature does not match, or if a record is cut short.
pub async fn read_entries<S: ByteSource + ?Sized>(source: &S) -> Result<ZipDirectory> {
    let file_len = source.len();
    let window_len = file_len.min(EOCD_SEARCH_WINDOW);
    let window_start = file_len - window_len;
    let window = source
        .read_range(window_start, usize::try_from(window_len).unwrap_or(0))
        .await?;

    let eocd_at = find_eocd(&window)
        .ok_or_else(|| ImportError::format("not a ZIP archive (no end of central directory)"))?;
    let eocd = window.get(eocd_at..).ok_or_else(|| truncated("EOCD"))?;

    let entry_count = le_u16(eocd, 10).ok_or_else(|| truncated("EOCD"))?;
    let cd_size = reject_zip64(le_u32(eocd, 12).ok_or_else(|| truncated("EOCD"))?, "size")?;
    let cd_offset = reject_zip64(le_u32(eocd, 16).ok_or_else(|| truncated("EOCD"))?, "offset")?;

    if cd_offset + cd_size > file_len {
        return Err(ImportError::format(
            "central directory extends past the end of the file",
        ));
    }
    let cd_len = usize::try_from(cd_size).map_err(|_| truncated("central directory"))?;
    let directory = source.read_range(cd_offset, cd_len).await?;

    let mut entries = Vec::with_capacity(usize::from(entry_count));
    let mut pos = 0usize;
    for _ in 0..entry_count {
        let record = directory
            .get(pos..)
            .filter(|r| r.len() >= CENTRAL_HEADER_LEN)
            .ok_or_else(|| truncated("central directory record"))?;
        if le_u32(record, 0) != Some(CENTRAL_SIGNATURE) {
            return Err(ImportError::format(format!(
                "bad central directory signature at offset {}",
                cd_offset + pos as u64
            )));
        }
        let field16 = |at| le_u16(record, at).ok_or_else(|| truncated("central directory record"));
        let field32 = |at| le_u32(record, at).ok_or_else(|| truncated("central directory record"));

        let method = field16(10)?;
        let compressed_size = reject_zip64(field32(20)?, "compressed size")?;
        let uncompressed_size = reject_zip64(field32(24)?, "uncompressed size")?;
        let name_len = usize::from(field16(28)?);
        let extra_len = usize::from(field16(30)?);
        let comment_len = usize::from(field16(32)?);
        let local_header_offset = reject_zip64(field32(42)?, "local header offset")?;

        let name_bytes = record
            .get(CENTRAL_HEADER_LEN..CENTRAL_HEADER_LEN + name_len)
            .ok_or_else(|| truncated("entry name"))?;
        let name = String::from_utf8_lossy(name_bytes).into_owned();

        entries.push(ZipEntry {
            name,
            compression: CompressionMethod::from(method),
            compressed_size,
            uncompressed_size,
            local_header_offset,
            data_offset: 0,
        });
        pos += CENTRAL_HEADER_LEN + name_len + extra_len + comment_len;
    }

    for entry in &mut entries {
        entry.data_offset = resolve_data_offset(source, entry).await?;
    }

    debug!(
        "zip: {} entries, central directory {} bytes at {}",
        entries.len(),
        cd_size,
        cd_offset
    );
    Ok(ZipDirectory { entries })
}

/// Read an entry's local header to find where its data really starts.
///
/// The local name/extra lengths can differ from the central directory's, so
/// the central record alone is not enough.
async fn resolve_data_offset<S: ByteSource + ?Sized>(source: &S, entry: &ZipEntry) -> Result<u64> {
    let header = source
        .read_range(entry.local_header_offset, LOCAL_HEADER_LEN)
        .await?;
    if le_u32(&header, 0) != Some(LOCAL_SIGNATURE) {
        return Err(ImportError::format(format!(
            "bad local header signature for {}",
            entry.name
        )));
    }
    let name_len = le_u16(&header, 26).ok_or_else(|| truncated("local header"))?;
    let extra_len = le_u16(&header, 28).ok_or_else(|| truncated("local header"))?;
    let data_offset = entry.local_header_offset
        + LOCAL_HEADER_LEN as u64
        + u64::from(name_len)
        + u64::from(extra_len);
    if data_offset + entry.compressed_size > source.len() {
        return Err(ImportError::format(format!(
            "data for {} extends past the end of the file",
            entry.name
        )));
    }
    Ok(data_offset)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::cast_possible_truncation
)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use std::io::{Cursor, Write};
    use zip::write::FileOptions;
    use zip::{CompressionMethod as ZipMethod, ZipWriter};

    fn archive(entries: &[(&str, &[u8], ZipMethod)], comment: &str) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data, method) in entries {
            zip.start_file(*name, FileOptions::default().compression_method(*method))
                .unwrap();
            zip.write_all(data).unwrap();
        }
        zip.set_comment(comment);
        zip.finish().unwrap().into_inner()
    }

    #[tokio::test]
    async fn test_reads_entries_and_data_offsets() {
        let bytes = archive(
            &[
                ("xl/workbook.xml", b"<workbook/>", ZipMethod::Stored),
                ("xl/worksheets/sheet1.xml", &[b'x'; 4096], ZipMethod::Deflated),
            ],
            "",
        );
        let dir = read_entries(&MemorySource::new(&bytes)).await.unwrap();
        assert_eq!(dir.len(), 2);

        let stored = dir.find("xl/workbook.xml").unwrap();
        assert_eq!(stored.compression, CompressionMethod::Stored);
        assert_eq!(stored.compressed_size, 11);
        let start = stored.data_offset as usize;
        assert_eq!(&bytes[start..start + 11], b"<workbook/>");

        let deflated = dir.find("xl/worksheets/sheet1.xml").unwrap();
        assert_eq!(deflated.compression, CompressionMethod::Deflate);
        assert_eq!(deflated.uncompressed_size, 4096);
        assert!(deflated.compressed_size < 4096);
    }

    #[tokio::test]
    async fn test_archive_comment_is_skipped() {
        let comment = "c".repeat(2000);
        let bytes = archive(&[("a.txt", b"hello", ZipMethod::Stored)], &comment);
        let dir = read_entries(&MemorySource::new(&bytes)).await.unwrap();
        assert_eq!(dir.names().collect::<Vec<_>>(), vec!["a.txt"]);
    }

    #[tokio::test]
    async fn test_not_a_zip() {
        let err = read_entries(&MemorySource::new(b"definitely not a zip archive"))
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::Format(_)), "{err}");
        assert!(read_entries(&MemorySource::new(b"")).await.is_err());
    }

    #[tokio::test]
    async fn test_bad_central_signature() {
        let mut bytes = archive(&[("a.txt", b"hello", ZipMethod::Stored)], "");
        let eocd = find_eocd(&bytes).unwrap();
        let cd_offset = le_u32(&bytes, eocd + 16).unwrap() as usize;
        bytes[cd_offset] = b'X';
        let err = read_entries(&MemorySource::new(&bytes)).await.unwrap_err();
        assert!(err.to_string().contains("central directory signature"), "{err}");
    }

    #[tokio::test]
    async fn test_bad_local_signature() {
        let mut bytes = archive(&[("a.txt", b"hello", ZipMethod::Stored)], "");
        bytes[0] = b'X';
        let err = read_entries(&MemorySource::new(&bytes)).await.unwrap_err();
        assert!(err.to_string().contains("local header"), "{err}");
    }

    #[test]
    fn test_unsupported_method_is_recorded() {
        assert_eq!(CompressionMethod::from(12), CompressionMethod::Unsupported(12));
    }
}

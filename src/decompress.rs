//! Entry data streams: stored passthrough or incremental raw inflate.

use flate2::{Decompress, FlushDecompress, Status};

use crate::error::{ImportError, Result};
use crate::source::ByteSource;
use crate::zip_directory::{CompressionMethod, ZipEntry};

/// Read-side sizing for an entry stream.
#[derive(Debug, Clone, Copy)]
pub struct StreamOptions {
    /// Compressed bytes fetched per range read.
    pub read_chunk: usize,
    /// Upper bound on decompressed bytes produced per step.
    pub inflate_chunk: usize,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            read_chunk: 256 * 1024,
            inflate_chunk: 64 * 1024,
        }
    }
}

/// Pull-based byte stream over one entry's data.
pub struct EntryStream<'a, S: ByteSource + ?Sized> {
    source: &'a S,
    name: String,
    next_offset: u64,
    /// Compressed bytes not yet fetched from the source.
    remaining: u64,
    total: u64,
    inflater: Option<Decompress>,
    pending: Vec<u8>,
    pending_pos: usize,
    finished: bool,
    options: StreamOptions,
}

impl<'a, S: ByteSource + ?Sized> EntryStream<'a, S> {
    /// Open `entry` for reading.
    ///
    /// # Errors
    /// `FormatError` for compression methods other than stored and deflate.
    pub fn open(source: &'a S, entry: &ZipEntry, options: StreamOptions) -> Result<Self> {
        let inflater = match entry.compression {
            CompressionMethod::Stored => None,
            CompressionMethod::Deflate => Some(Decompress::new(false)),
            CompressionMethod::Unsupported(method) => {
                return Err(ImportError::format(format!(
                    "{} uses unsupported compression method {method}",
                    entry.name
                )))
            }
        };
        Ok(Self {
            source,
            name: entry.name.clone(),
            next_offset: entry.data_offset,
            remaining: entry.compressed_size,
            total: entry.compressed_size,
            inflater,
            pending: Vec::new(),
            pending_pos: 0,
            finished: false,
            options: StreamOptions {
                read_chunk: options.read_chunk.max(1),
                inflate_chunk: options.inflate_chunk.max(1),
            },
        })
    }

    /// Compressed bytes consumed so far, for progress when no better estimate exists.
    pub fn compressed_read(&self) -> u64 {
        self.total - self.remaining
    }

    pub fn compressed_total(&self) -> u64 {
        self.total
    }

    async fn fetch(&mut self) -> Result<Vec<u8>> {
        let want = self.remaining.min(self.options.read_chunk as u64);
        let len = usize::try_from(want).unwrap_or(self.options.read_chunk);
        let bytes = self.source.read_range(self.next_offset, len).await?;
        self.next_offset += want;
        self.remaining -= want;
        Ok(bytes)
    }

    /// Next run of decompressed bytes, or `None` at the end of the entry.
    ///
    /// # Errors
    /// `DecompressionError` if the deflate data is corrupt or ends early.
    pub async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if self.finished {
            return Ok(None);
        }
        if self.inflater.is_none() {
            if self.remaining == 0 {
                self.finished = true;
                return Ok(None);
            }
            return self.fetch().await.map(Some);
        }

        loop {
            if self.pending_pos >= self.pending.len() && self.remaining > 0 {
                self.pending = self.fetch().await?;
                self.pending_pos = 0;
            }
            let input = self.pending.get(self.pending_pos..).unwrap_or(&[]);
            let input_exhausted = self.remaining == 0;
            let flush = if input_exhausted {
                FlushDecompress::Finish
            } else {
                FlushDecompress::None
            };
            let Some(inflater) = self.inflater.as_mut() else {
                return Ok(None);
            };

            let mut out = Vec::with_capacity(self.options.inflate_chunk);
            let before_in = inflater.total_in();
            let status = inflater
                .decompress_vec(input, &mut out, flush)
                .map_err(|e| ImportError::Decompression(format!("{}: {e}", self.name)))?;
            let consumed = usize::try_from(inflater.total_in() - before_in).unwrap_or(0);
            self.pending_pos += consumed;

            if status == Status::StreamEnd {
                self.finished = true;
                return Ok((!out.is_empty()).then_some(out));
            }
            if !out.is_empty() {
                return Ok(Some(out));
            }
            if consumed == 0 {
                let starved = self.pending_pos >= self.pending.len();
                if !starved || input_exhausted {
                    return Err(ImportError::Decompression(format!(
                        "{}: deflate stream ended unexpectedly",
                        self.name
                    )));
                }
            }
        }
    }
}

/// Length of the prefix of `buf` that does not end inside a UTF-8 sequence.
fn complete_prefix_len(buf: &[u8]) -> usize {
    let n = buf.len();
    for back in 1..=n.min(3) {
        let Some(&b) = buf.get(n - back) else {
            break;
        };
        if b & 0xC0 != 0x80 {
            let need = match b {
                0xF0.. => 4,
                0xE0.. => 3,
                0xC0.. => 2,
                _ => 1,
            };
            return if need > back { n - back } else { n };
        }
    }
    n
}

/// Incremental UTF-8 decoder that carries split multi-byte sequences across chunks.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    carry: Vec<u8>,
}

impl Utf8Decoder {
    /// Decode `bytes`, holding back a trailing partial character for the next call.
    pub fn push(&mut self, bytes: &[u8]) -> String {
        let mut buf = std::mem::take(&mut self.carry);
        buf.extend_from_slice(bytes);
        let cut = complete_prefix_len(&buf);
        self.carry = buf.split_off(cut);
        match String::from_utf8(buf) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        }
    }

    /// Flush whatever is left; a dangling partial character becomes U+FFFD.
    pub fn finish(&mut self) -> String {
        let rest = std::mem::take(&mut self.carry);
        String::from_utf8_lossy(&rest).into_owned()
    }
}

/// An entry stream that yields text.
pub struct TextStream<'a, S: ByteSource + ?Sized> {
    inner: EntryStream<'a, S>,
    decoder: Utf8Decoder,
    done: bool,
}

impl<'a, S: ByteSource + ?Sized> TextStream<'a, S> {
    /// # Errors
    /// See [`EntryStream::open`].
    pub fn open(source: &'a S, entry: &ZipEntry, options: StreamOptions) -> Result<Self> {
        Ok(Self {
            inner: EntryStream::open(source, entry, options)?,
            decoder: Utf8Decoder::default(),
            done: false,
        })
    }

    pub fn compressed_read(&self) -> u64 {
        self.inner.compressed_read()
    }

    pub fn compressed_total(&self) -> u64 {
        self.inner.compressed_total()
    }

    /// Next decoded text chunk, or `None` at the end.
    ///
    /// # Errors
    /// See [`EntryStream::next_chunk`].
    pub async fn next_text(&mut self) -> Result<Option<String>> {
        if self.done {
            return Ok(None);
        }
        match self.inner.next_chunk().await? {
            Some(bytes) => Ok(Some(self.decoder.push(&bytes))),
            None => {
                self.done = true;
                let tail = self.decoder.finish();
                Ok((!tail.is_empty()).then_some(tail))
            }
        }
    }
}

/// Fully decompress a (small) entry into a string.
///
/// # Errors
/// See [`EntryStream::open`] and [`EntryStream::next_chunk`].
pub async fn decompress_to_string<S: ByteSource + ?Sized>(
    source: &S,
    entry: &ZipEntry,
    options: StreamOptions,
) -> Result<String> {
    let capacity = usize::try_from(entry.uncompressed_size).unwrap_or(0);
    let mut out = String::with_capacity(capacity.min(64 * 1024 * 1024));
    let mut stream = TextStream::open(source, entry, options)?;
    while let Some(text) = stream.next_text().await? {
        out.push_str(&text);
    }
    Ok(out)
}

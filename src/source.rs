//! Random-access byte sources.
//!
//! The streaming path never loads the archive wholesale: it asks for the
//! trailing EOCD window, the central directory, each local header, and then
//! the worksheet's compressed bytes one chunk at a time.

use crate::error::{ImportError, Result};

/// Something that can serve byte ranges of a fixed-size input.
#[allow(async_fn_in_trait)]
pub trait ByteSource {
    /// Total size in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read exactly `len` bytes at `offset`. Reading past the end is an error.
    async fn read_range(&self, offset: u64, len: usize) -> Result<Vec<u8>>;

    /// The whole input, if it is already resident in memory.
    fn as_bytes(&self) -> Option<&[u8]> {
        None
    }

    /// The whole input, read into memory if it is not already there.
    async fn read_all(&self) -> Result<Vec<u8>> {
        if let Some(bytes) = self.as_bytes() {
            return Ok(bytes.to_vec());
        }
        let len = usize::try_from(self.len())
            .map_err(|_| ImportError::Source("input too large to load in memory".into()))?;
        self.read_range(0, len).await
    }
}

pub(crate) fn check_range(total: u64, offset: u64, len: usize) -> Result<()> {
    let end = offset.checked_add(len as u64);
    match end {
        Some(end) if end <= total => Ok(()),
        _ => Err(ImportError::format(format!(
            "read of {len} bytes at offset {offset} is past the end of the {total}-byte file"
        ))),
    }
}

/// An input already held in memory.
#[derive(Debug, Clone)]
pub struct MemorySource<'a> {
    data: &'a [u8],
}

impl<'a> MemorySource<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl ByteSource for MemorySource<'_> {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    async fn read_range(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        check_range(self.len(), offset, len)?;
        let start = usize::try_from(offset).map_err(|_| ImportError::format("offset overflow"))?;
        self.data
            .get(start..start + len)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| ImportError::format("range out of bounds"))
    }

    fn as_bytes(&self) -> Option<&[u8]> {
        Some(self.data)
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use native::FileSource;

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::cell::RefCell;
    use std::fs::File;
    use std::io::{Read, Seek, SeekFrom};
    use std::path::Path;

    use super::{check_range, ByteSource};
    use crate::error::Result;

    /// A file on disk, read with seek + read per range.
    #[derive(Debug)]
    pub struct FileSource {
        file: RefCell<File>,
        len: u64,
    }

    impl FileSource {
        /// Open `path` for range reads.
        ///
        /// # Errors
        /// Returns `ImportError::Io` if the file cannot be opened or stat'ed.
        pub fn open(path: impl AsRef<Path>) -> Result<Self> {
            let file = File::open(path)?;
            let len = file.metadata()?.len();
            Ok(Self {
                file: RefCell::new(file),
                len,
            })
        }
    }

    impl ByteSource for FileSource {
        fn len(&self) -> u64 {
            self.len
        }

        async fn read_range(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
            check_range(self.len, offset, len)?;
            let mut file = self.file.borrow_mut();
            file.seek(SeekFrom::Start(offset))?;
            let mut buf = vec![0u8; len];
            file.read_exact(&mut buf)?;
            Ok(buf)
        }
    }
}

#[cfg(target_arch = "wasm32")]
pub use web::BlobSource;

#[cfg(target_arch = "wasm32")]
mod web {
    use wasm_bindgen::JsValue;
    use wasm_bindgen_futures::JsFuture;

    use super::{check_range, ByteSource};
    use crate::error::{ImportError, Result};

    fn js_error(e: &JsValue) -> ImportError {
        ImportError::Source(e.as_string().unwrap_or_else(|| format!("{e:?}")))
    }

    /// A browser `Blob`/`File`, read through `blob.slice(a, b).arrayBuffer()`.
    #[derive(Debug, Clone)]
    pub struct BlobSource {
        blob: web_sys::Blob,
    }

    impl BlobSource {
        #[must_use]
        pub fn new(blob: web_sys::Blob) -> Self {
            Self { blob }
        }
    }

    impl ByteSource for BlobSource {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        fn len(&self) -> u64 {
            // Blob sizes are non-negative integers below 2^53.
            self.blob.size() as u64
        }

        #[allow(clippy::cast_precision_loss)]
        async fn read_range(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
            check_range(self.len(), offset, len)?;
            let end = offset + len as u64;
            let slice = self
                .blob
                .slice_with_f64_and_f64(offset as f64, end as f64)
                .map_err(|e| js_error(&e))?;
            let buffer = JsFuture::from(slice.array_buffer())
                .await
                .map_err(|e| js_error(&e))?;
            let bytes = js_sys::Uint8Array::new(&buffer).to_vec();
            if bytes.len() != len {
                return Err(ImportError::Source(format!(
                    "short read: wanted {len} bytes, got {}",
                    bytes.len()
                )));
            }
            Ok(bytes)
        }
    }
}

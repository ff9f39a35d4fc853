use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use tracing::trace;

use crate::error::Error;

/// 8 MiB read buffer.
pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ContentHasher {
    buffer_size: usize,
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}

impl ContentHasher {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Hex BLAKE3 digest of the whole file. Fails if any part of it cannot be read.
    pub fn hash(&self, path: &Path) -> Result<String, Error> {
        self.hash_file(path).map_err(|source| Error::Hash {
            path: path.to_path_buf(),
            source,
        })
    }

    fn hash_file(&self, path: &Path) -> io::Result<String> {
        let mut file = File::open(path)?;
        let mut hasher = blake3::Hasher::new();
        let mut buffer = vec![0u8; self.buffer_size];
        let mut total: u64 = 0;

        loop {
            let read = match file.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            hasher.update(&buffer[..read]);
            total += read as u64;
        }

        trace!("Hashed {} ({} bytes)", path.display(), total);
        Ok(hasher.finalize().to_hex().to_string())
    }
}

pub fn hash_bytes(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

//! Content hashing.
//!
//! Files are streamed through a fixed-size buffer into BLAKE3, so memory use is
//! bounded by the buffer regardless of file size. Digest equality is treated as
//! content equality by the duplicate resolver.

mod stream;

pub use stream::{hash_bytes, ContentHasher, DEFAULT_BUFFER_SIZE};

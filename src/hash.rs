//! Selection hashing capability.
//!
//! Selection fingerprints are computed by a swappable hash function passed to
//! the manager as part of [`ManagerOptions`](crate::select::ManagerOptions).
//! The default is MurmurHash3 x86-32 over the raw little-endian bytes of the
//! packed value blocks. Hashes are in-process identifiers only: they are
//! stable for a fixed manager layout but not portable across differently
//! ordered registrations.

use std::io::Cursor;

// Block bytes are reinterpreted in place, so the fingerprint of a selection
// depends on the native byte order matching the documented little-endian
// layout.
#[cfg(not(target_endian = "little"))]
compile_error!("selection hashing requires a little-endian target");

/// Hash capability: fingerprints a byte slice into 32 bits.
pub type SelectionHashFn = fn(&[u8]) -> u32;

/// MurmurHash3 x86-32 with seed 0, the default [`SelectionHashFn`].
pub fn selection_hash(bytes: &[u8]) -> u32 {
    murmur3::murmur3_32(&mut Cursor::new(bytes), 0).expect("in-memory reads are infallible")
}

/// Reinterprets a block slice as its raw bytes.
pub fn block_bytes(blocks: &[u64]) -> &[u8] {
    // SAFETY: u64 has no padding and a stricter alignment than u8; the
    // length covers exactly the same allocation.
    unsafe { std::slice::from_raw_parts(blocks.as_ptr().cast::<u8>(), std::mem::size_of_val(blocks)) }
}

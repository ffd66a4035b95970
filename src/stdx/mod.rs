pub mod bitset;

pub use bitset::{low_bits, BitSet, Block, BITS_PER_BLOCK, BIT_INDEX_MASK, BLOCK_SHIFT};

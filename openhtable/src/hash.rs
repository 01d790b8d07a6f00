//! xxHash32: the default 32-bit byte hash backing every table in this crate.
//!
//! `xxhash32`/`xxhash32_4`/`xxhash32_8` are the raw algorithm, ported from
//! the reference C++ implementation. `XxHash32`/`XxHash32Builder` adapt it to
//! `core::hash::{Hasher, BuildHasher}` so any `K: Hash` can drive it through
//! the standard derive machinery.

use core::hash::{BuildHasher, Hasher};

const PRIME32_1: u32 = 2654435761;
const PRIME32_2: u32 = 2246822519;
const PRIME32_3: u32 = 3266489917;
const PRIME32_4: u32 = 668265263;
const PRIME32_5: u32 = 374761393;

/// xxHash32's published default seed.
pub const DEFAULT_SEED: u32 = 88675123;

#[inline]
fn round32(seed: u32, x: u32) -> u32 {
    seed.wrapping_add(x.wrapping_mul(PRIME32_2))
        .rotate_left(13)
        .wrapping_mul(PRIME32_1)
}

#[inline]
fn read_u32_le(data: &[u8]) -> u32 {
    u32::from_le_bytes([data[0], data[1], data[2], data[3]])
}

/// General-purpose xxHash32 over an arbitrary byte slice.
pub fn xxhash32(data: &[u8], seed: u32) -> u32 {
    let len = data.len();
    let mut ptr = 0usize;
    let mut h32: u32;

    if len >= 16 {
        let limit = len - 16;
        let mut v1 = seed.wrapping_add(PRIME32_1).wrapping_add(PRIME32_2);
        let mut v2 = seed.wrapping_add(PRIME32_2);
        let mut v3 = seed;
        let mut v4 = seed.wrapping_sub(PRIME32_1);

        loop {
            v1 = round32(v1, read_u32_le(&data[ptr..]));
            ptr += 4;
            v2 = round32(v2, read_u32_le(&data[ptr..]));
            ptr += 4;
            v3 = round32(v3, read_u32_le(&data[ptr..]));
            ptr += 4;
            v4 = round32(v4, read_u32_le(&data[ptr..]));
            ptr += 4;
            if ptr > limit {
                break;
            }
        }

        h32 = v1.rotate_left(1)
            .wrapping_add(v2.rotate_left(7))
            .wrapping_add(v3.rotate_left(12))
            .wrapping_add(v4.rotate_left(18));
    } else {
        h32 = seed.wrapping_add(PRIME32_5);
    }

    h32 = h32.wrapping_add(len as u32);

    while ptr + 4 <= len {
        h32 = h32.wrapping_add(read_u32_le(&data[ptr..]).wrapping_mul(PRIME32_3));
        h32 = h32.rotate_left(17).wrapping_mul(PRIME32_4);
        ptr += 4;
    }

    while ptr < len {
        h32 = h32.wrapping_add((data[ptr] as u32).wrapping_mul(PRIME32_5));
        h32 = h32.rotate_left(11).wrapping_mul(PRIME32_1);
        ptr += 1;
    }

    h32 ^= h32 >> 15;
    h32 = h32.wrapping_mul(PRIME32_2);
    h32 ^= h32 >> 13;
    h32 = h32.wrapping_mul(PRIME32_3);
    h32 ^= h32 >> 16;
    h32
}

/// Fast path for exactly 4 bytes (e.g. a `u32`/`i32` key).
pub fn xxhash32_4(data: &[u8; 4], seed: u32) -> u32 {
    let mut h32 = seed.wrapping_add(PRIME32_5).wrapping_add(4);
    h32 = h32.wrapping_add(read_u32_le(data).wrapping_mul(PRIME32_3));
    h32 = h32.rotate_left(17).wrapping_mul(PRIME32_4);

    h32 ^= h32 >> 15;
    h32 = h32.wrapping_mul(PRIME32_2);
    h32 ^= h32 >> 13;
    h32 = h32.wrapping_mul(PRIME32_3);
    h32 ^= h32 >> 16;
    h32
}

/// Fast path for exactly 8 bytes (e.g. a `u64`/`i64` key).
pub fn xxhash32_8(data: &[u8; 8], seed: u32) -> u32 {
    let mut h32 = seed.wrapping_add(PRIME32_5).wrapping_add(8);
    h32 = h32.wrapping_add(read_u32_le(&data[0..4]).wrapping_mul(PRIME32_3));
    h32 = h32.rotate_left(17).wrapping_mul(PRIME32_4);
    h32 = h32.wrapping_add(read_u32_le(&data[4..8]).wrapping_mul(PRIME32_3));
    h32 = h32.rotate_left(17).wrapping_mul(PRIME32_4);

    h32 ^= h32 >> 15;
    h32 = h32.wrapping_mul(PRIME32_2);
    h32 ^= h32 >> 13;
    h32 = h32.wrapping_mul(PRIME32_3);
    h32 ^= h32 >> 16;
    h32
}

/// A `core::hash::Hasher` backed by xxHash32.
///
/// `Hasher::write` is called once per field by `#[derive(Hash)]`, not once
/// per whole key, so this buffers everything written and folds it through
/// `xxhash32` on `finish()` rather than trying to maintain xxHash32's block
/// state incrementally across calls of arbitrary size.
#[derive(Clone, Debug, Default)]
pub struct XxHash32 {
    seed: u32,
    buf: Vec<u8>,
}

impl XxHash32 {
    pub fn with_seed(seed: u32) -> Self {
        Self {
            seed,
            buf: Vec::new(),
        }
    }
}

impl Hasher for XxHash32 {
    fn write(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn finish(&self) -> u64 {
        match self.buf.len() {
            4 => xxhash32_4(self.buf[..4].try_into().unwrap(), self.seed) as u64,
            8 => xxhash32_8(self.buf[..8].try_into().unwrap(), self.seed) as u64,
            _ => xxhash32(&self.buf, self.seed) as u64,
        }
    }
}

/// `BuildHasher` for [`XxHash32`], parameterized by seed.
#[derive(Clone, Debug)]
pub struct XxHash32Builder {
    seed: u32,
}

impl XxHash32Builder {
    pub fn new(seed: u32) -> Self {
        Self { seed }
    }
}

impl Default for XxHash32Builder {
    fn default() -> Self {
        Self { seed: DEFAULT_SEED }
    }
}

impl BuildHasher for XxHash32Builder {
    type Hasher = XxHash32;

    fn build_hasher(&self) -> XxHash32 {
        XxHash32::with_seed(self.seed)
    }
}

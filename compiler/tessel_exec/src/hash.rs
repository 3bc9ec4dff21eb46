//! Hash functions shared by the runtime routines and the dynamic objects.
//!
//! Hashes are `i32`. `-1` is reserved as the "not computed" marker of the
//! string hash cache and is never produced.

const FNV_OFFSET: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Multiplier of the element hash combination of tuples.
pub(crate) const COMBINE_MULTIPLIER: i32 = 1_000_003;

fn finish(hash: i32) -> i32 {
    if hash == -1 {
        -2
    } else {
        hash
    }
}

pub fn hash_i64(value: i64) -> i32 {
    finish((value ^ (value >> 32)) as i32)
}

pub fn hash_u64(value: u64) -> i32 {
    finish((value ^ (value >> 32)) as i32)
}

/// Integral floats hash like the equal integer.
pub fn hash_f64(value: f64) -> i32 {
    if value.fract() == 0.0 && value.abs() < 9.2e18 {
        return hash_i64(value as i64);
    }
    hash_u64(value.to_bits())
}

/// FNV-1a over the UTF-8 bytes.
pub fn hash_bytes(bytes: &[u8]) -> i32 {
    let mut hash = FNV_OFFSET;
    for byte in bytes {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    finish(hash as i32)
}

pub(crate) fn combine(hash: i32, element: i32) -> i32 {
    finish(hash.wrapping_mul(COMBINE_MULTIPLIER) ^ element)
}

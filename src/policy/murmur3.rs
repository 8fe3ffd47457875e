//! Murmur3 partitioner: the default Cassandra token function (GLOSSARY).
//!
//! Cassandra's `Murmur3Partitioner` uses the low 64 bits of the x64 128-bit
//! murmur3 hash (seed 0) of the routing key as the signed token.

const C1: u64 = 0x87c3_7b91_1142_53d5;
const C2: u64 = 0x4cf5_ad43_2745_937f;

/// Compute the Murmur3 partitioner token for `routing_key`.
pub fn token(routing_key: &[u8]) -> i64 {
    let (h1, _h2) = hash_x64_128(routing_key, 0);
    h1 as i64
}

fn hash_x64_128(data: &[u8], seed: u64) -> (u64, u64) {
    let len = data.len();
    let nblocks = len / 16;

    let mut h1 = seed;
    let mut h2 = seed;

    for i in 0..nblocks {
        let block = &data[i * 16..i * 16 + 16];
        let mut k1 = u64::from_le_bytes(block[0..8].try_into().unwrap());
        let mut k2 = u64::from_le_bytes(block[8..16].try_into().unwrap());

        k1 = k1.wrapping_mul(C1);
        k1 = k1.rotate_left(31);
        k1 = k1.wrapping_mul(C2);
        h1 ^= k1;

        h1 = h1.rotate_left(27);
        h1 = h1.wrapping_add(h2);
        h1 = h1.wrapping_mul(5).wrapping_add(0x52dc_e729);

        k2 = k2.wrapping_mul(C2);
        k2 = k2.rotate_left(33);
        k2 = k2.wrapping_mul(C1);
        h2 ^= k2;

        h2 = h2.rotate_left(31);
        h2 = h2.wrapping_add(h1);
        h2 = h2.wrapping_mul(5).wrapping_add(0x3849_5ab5);
    }

    let tail = &data[nblocks * 16..];
    let mut k1 = 0u64;
    let mut k2 = 0u64;

    if tail.len() > 8 {
        for (i, &b) in tail[8..].iter().enumerate().rev() {
            k2 ^= (b as u64) << (8 * i);
        }
        k2 = k2.wrapping_mul(C2);
        k2 = k2.rotate_left(33);
        k2 = k2.wrapping_mul(C1);
        h2 ^= k2;
    }

    if !tail.is_empty() {
        let head_len = tail.len().min(8);
        for (i, &b) in tail[..head_len].iter().enumerate().rev() {
            k1 ^= (b as u64) << (8 * i);
        }
        k1 = k1.wrapping_mul(C1);
        k1 = k1.rotate_left(31);
        k1 = k1.wrapping_mul(C2);
        h1 ^= k1;
    }

    h1 ^= len as u64;
    h2 ^= len as u64;

    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);

    h1 = fmix64(h1);
    h2 = fmix64(h2);

    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);

    (h1, h2)
}

fn fmix64(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51_afd7_ed55_8ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    k ^= k >> 33;
    k
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_key_is_deterministic() {
        assert_eq!(token(b""), token(b""));
    }

    #[test]
    fn differing_keys_usually_differ() {
        assert_ne!(token(b"alice"), token(b"bob"));
    }

    #[test]
    fn handles_keys_of_every_length_in_a_full_block_cycle() {
        for len in 0..32 {
            let key: Vec<u8> = (0..len).collect();
            // Must not panic across the tail-handling boundary (0..16 bytes).
            let _ = token(&key);
        }
    }
}

//! 6-and-2 Group Code Recording codec (spec §4.4).
//!
//! No teacher counterpart — this crate's teacher never encodes nibble
//! images. Grounded directly on the original firmware's `encTable`/
//! `decTable`/`FlipBit1..3` constants and encode loop (`sdisk2.c:164-204`,
//! `656-672`), written in the idiom of the teacher's `util::bits::Bits`
//! trait for the bit-level interleaving.

pub const ENCODED_LEN: usize = 343;

/// "Disk byte" table: every 6-bit value's 8-bit on-disk encoding. MSB
/// always set, no two consecutive zero bits.
pub const ENCODE_TABLE: [u8; 64] = [
    0x96, 0x97, 0x9A, 0x9B, 0x9D, 0x9E, 0x9F, 0xA6,
    0xA7, 0xAB, 0xAC, 0xAD, 0xAE, 0xAF, 0xB2, 0xB3,
    0xB4, 0xB5, 0xB6, 0xB7, 0xB9, 0xBA, 0xBB, 0xBC,
    0xBD, 0xBE, 0xBF, 0xCB, 0xCD, 0xCE, 0xCF, 0xD3,
    0xD6, 0xD7, 0xD9, 0xDA, 0xDB, 0xDC, 0xDD, 0xDE,
    0xDF, 0xE5, 0xE6, 0xE7, 0xE9, 0xEA, 0xEB, 0xEC,
    0xED, 0xEE, 0xEF, 0xF2, 0xF3, 0xF4, 0xF5, 0xF6,
    0xF7, 0xF9, 0xFA, 0xFB, 0xFC, 0xFD, 0xFE, 0xFF,
];

/// Inverse of [`ENCODE_TABLE`]; 0 marks a disk byte with no valid 6-bit
/// preimage (spec §4.4: "0 marking invalid bytes").
pub const DECODE_TABLE: [u8; 256] = build_decode_table();

const fn build_decode_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < ENCODE_TABLE.len() {
        table[ENCODE_TABLE[i] as usize] = i as u8;
        i += 1;
    }
    table
}

const FLIP1: [u8; 4] = [0, 2, 1, 3];
const FLIP2: [u8; 4] = [0, 8, 4, 12];
const FLIP3: [u8; 4] = [0, 32, 16, 48];

/// Stateless 6-and-2 encoder/decoder for a single 256-byte logical sector.
pub struct GcrCodec;

impl GcrCodec {
    /// Encodes `src` (256 bytes) into `out` (343 bytes), per spec §4.4.
    pub fn encode(src: &[u8; 256], out: &mut [u8; ENCODED_LEN]) {
        let mut prev = 0u8;

        for i in 0..86 {
            let third = if i <= 83 { FLIP3[(src[i + 172] & 3) as usize] } else { 0 };
            let x = FLIP1[(src[i] & 3) as usize] | FLIP2[(src[i + 86] & 3) as usize] | third;
            out[i] = ENCODE_TABLE[(x ^ prev) as usize];
            prev = x;
        }

        for i in 0..256 {
            let x = src[i] >> 2;
            out[86 + i] = ENCODE_TABLE[(x ^ prev) as usize];
            prev = x;
        }

        out[342] = ENCODE_TABLE[prev as usize];
    }

    /// Decodes `src` (343 bytes) back into `out` (256 bytes). Invalid
    /// nibbles decode to 0 via [`DECODE_TABLE`]; this layer never
    /// validates, per the error taxonomy's deliberate omission of a
    /// malformed-image variant.
    pub fn decode(src: &[u8; ENCODED_LEN], out: &mut [u8; 256]) {
        let mut prev = 0u8;

        // FLIP1 is its own inverse ({0,2,1,3} swaps only 1<->2), and FLIP2 /
        // FLIP3 are FLIP1 scaled by 4 and 16, so the same table inverts all
        // three 2-bit fields packed into `x` once each is shifted down.
        let mut low = [0u8; 86];
        let mut mid = [0u8; 86];
        let mut high = [0u8; 84];

        for i in 0..86 {
            let x = DECODE_TABLE[src[i] as usize] ^ prev;
            prev = x;

            low[i] = FLIP1[(x & 3) as usize];
            mid[i] = FLIP1[((x >> 2) & 3) as usize];
            if i <= 83 {
                high[i] = FLIP1[((x >> 4) & 3) as usize];
            }
        }

        for i in 0..256 {
            let x = DECODE_TABLE[src[86 + i] as usize] ^ prev;
            prev = x;

            let low2 = if i < 86 {
                low[i]
            } else if i < 172 {
                mid[i - 86]
            } else {
                high[i - 172]
            };

            out[i] = (x << 2) | low2;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let mut src = [0u8; 256];
        for (i, b) in src.iter_mut().enumerate() {
            *b = (i * 7 + 3) as u8;
        }

        let mut encoded = [0u8; ENCODED_LEN];
        GcrCodec::encode(&src, &mut encoded);

        let mut decoded = [0u8; 256];
        GcrCodec::decode(&encoded, &mut decoded);

        assert_eq!(src, decoded);
    }

    #[test]
    fn round_trip_all_zeros_and_all_ones() {
        for fill in [0x00u8, 0xFF] {
            let src = [fill; 256];
            let mut encoded = [0u8; ENCODED_LEN];
            GcrCodec::encode(&src, &mut encoded);

            let mut decoded = [0u8; 256];
            GcrCodec::decode(&encoded, &mut decoded);
            assert_eq!(src, decoded);
        }
    }

    #[test]
    fn every_encoded_byte_has_high_bit_set() {
        let src = [0xA5u8; 256];
        let mut encoded = [0u8; ENCODED_LEN];
        GcrCodec::encode(&src, &mut encoded);

        for b in encoded.iter() {
            assert_eq!(b & 0x80, 0x80);
        }
    }

    #[test]
    fn checksum_byte_is_a_valid_disk_byte() {
        let src = [0x3Cu8; 256];
        let mut encoded = [0u8; ENCODED_LEN];
        GcrCodec::encode(&src, &mut encoded);

        assert!(ENCODE_TABLE.contains(&encoded[342]));
    }
}

//! The 416-byte NIC physical sector frame (spec §4.5).
//!
//! Grounded on `dsk2Nic`'s frame-assembly code (`sdisk2.c:579-640`) and
//! `writeBackSub2`'s mirror-image assembly for write-back
//! (`sdisk2.c:985-1088`).

use crate::gcr::{GcrCodec, ENCODED_LEN};

/// Logical frame length (gap through trailer, before the 512-block pad).
pub const FRAME_LEN: usize = 0x1A0;
/// Padded length written to the SD block.
pub const BLOCK_LEN: usize = 512;

const SYNC_HEADER: [u8; 12] = [
    0x03, 0xFC, 0xFF, 0x3F, 0xCF, 0xF3, 0xFC, 0xFF, 0x3F, 0xCF, 0xF3, 0xFC,
];
const ADDR_PROLOGUE: [u8; 3] = [0xD5, 0xAA, 0x96];
const ADDR_EPILOGUE: [u8; 3] = [0xDE, 0xAA, 0xEB];
const DATA_PROLOGUE: [u8; 3] = [0xD5, 0xAA, 0xAD];
const DATA_EPILOGUE: [u8; 3] = [0xDE, 0xAA, 0xEB];

const OFF_GAP: usize = 0x00;
const OFF_SYNC_HEADER: usize = 0x16;
const OFF_ADDR_PROLOGUE: usize = 0x22;
const OFF_ADDR_FIELD: usize = 0x25;
const OFF_ADDR_EPILOGUE: usize = 0x2D;
const OFF_SYNC_GAP: usize = 0x30;
const OFF_DATA_PROLOGUE: usize = 0x35;
const OFF_PAYLOAD: usize = 0x38;
const OFF_DATA_EPILOGUE: usize = 0x18F;
const OFF_TRAILER_GAP: usize = 0x192;

/// Length of the data field (prologue + 343-byte GCR payload + epilogue)
/// as captured verbatim from a host write, replayed unchanged on flush.
pub const CAPTURED_DATA_FIELD_LEN: usize = OFF_TRAILER_GAP - OFF_DATA_PROLOGUE;

/// 4-and-4 encodes `v` as the two bytes `((v>>1)|0xAA, v|0xAA)`.
fn encode_4_and_4(v: u8, out: &mut [u8]) {
    out[0] = (v >> 1) | 0xAA;
    out[1] = v | 0xAA;
}

/// Inverts [`encode_4_and_4`]: `v = (hi<<1 | 1) & lo`.
fn decode_4_and_4(bytes: &[u8]) -> u8 {
    ((bytes[0] << 1) | 1) & bytes[1]
}

pub struct NicLayout;

impl NicLayout {
    /// Assembles a full 512-byte NIC block for `(volume, track, sector)`
    /// encoding `payload` (spec §4.5).
    pub fn assemble(volume: u8, track: u8, sector: u8, payload: &[u8; 256], out: &mut [u8; BLOCK_LEN]) {
        for b in out[OFF_GAP..OFF_SYNC_HEADER].iter_mut() {
            *b = 0xFF;
        }
        out[OFF_SYNC_HEADER..OFF_SYNC_HEADER + SYNC_HEADER.len()].copy_from_slice(&SYNC_HEADER);

        out[OFF_ADDR_PROLOGUE..OFF_ADDR_PROLOGUE + 3].copy_from_slice(&ADDR_PROLOGUE);
        let checksum = volume ^ track ^ sector;
        encode_4_and_4(volume, &mut out[OFF_ADDR_FIELD..OFF_ADDR_FIELD + 2]);
        encode_4_and_4(track, &mut out[OFF_ADDR_FIELD + 2..OFF_ADDR_FIELD + 4]);
        encode_4_and_4(sector, &mut out[OFF_ADDR_FIELD + 4..OFF_ADDR_FIELD + 6]);
        encode_4_and_4(checksum, &mut out[OFF_ADDR_FIELD + 6..OFF_ADDR_FIELD + 8]);
        out[OFF_ADDR_EPILOGUE..OFF_ADDR_EPILOGUE + 3].copy_from_slice(&ADDR_EPILOGUE);

        for b in out[OFF_SYNC_GAP..OFF_DATA_PROLOGUE].iter_mut() {
            *b = 0xFF;
        }

        out[OFF_DATA_PROLOGUE..OFF_DATA_PROLOGUE + 3].copy_from_slice(&DATA_PROLOGUE);

        let mut encoded = [0u8; ENCODED_LEN];
        GcrCodec::encode(payload, &mut encoded);
        out[OFF_PAYLOAD..OFF_PAYLOAD + ENCODED_LEN].copy_from_slice(&encoded);

        out[OFF_DATA_EPILOGUE..OFF_DATA_EPILOGUE + 3].copy_from_slice(&DATA_EPILOGUE);

        for b in out[OFF_TRAILER_GAP..FRAME_LEN].iter_mut() {
            *b = 0xFF;
        }
        for b in out[FRAME_LEN..BLOCK_LEN].iter_mut() {
            *b = 0x00;
        }
    }

    /// Rebuilds a full NIC block for a write-back flush: a freshly computed
    /// gap/sync/address header for `(volume, track, sector)`, followed by
    /// the host's captured data field replayed verbatim (spec §4.9).
    /// Grounded on `writeBackSub2`, which recomputes only the header and
    /// resends the captured nibbles unchanged (`sdisk2.c:985-1077`).
    pub fn reassemble_from_capture(
        volume: u8,
        track: u8,
        sector: u8,
        captured_data_field: &[u8; CAPTURED_DATA_FIELD_LEN],
        out: &mut [u8; BLOCK_LEN],
    ) {
        for b in out[OFF_GAP..OFF_SYNC_HEADER].iter_mut() {
            *b = 0xFF;
        }
        out[OFF_SYNC_HEADER..OFF_SYNC_HEADER + SYNC_HEADER.len()].copy_from_slice(&SYNC_HEADER);

        out[OFF_ADDR_PROLOGUE..OFF_ADDR_PROLOGUE + 3].copy_from_slice(&ADDR_PROLOGUE);
        let checksum = volume ^ track ^ sector;
        encode_4_and_4(volume, &mut out[OFF_ADDR_FIELD..OFF_ADDR_FIELD + 2]);
        encode_4_and_4(track, &mut out[OFF_ADDR_FIELD + 2..OFF_ADDR_FIELD + 4]);
        encode_4_and_4(sector, &mut out[OFF_ADDR_FIELD + 4..OFF_ADDR_FIELD + 6]);
        encode_4_and_4(checksum, &mut out[OFF_ADDR_FIELD + 6..OFF_ADDR_FIELD + 8]);
        out[OFF_ADDR_EPILOGUE..OFF_ADDR_EPILOGUE + 3].copy_from_slice(&ADDR_EPILOGUE);

        for b in out[OFF_SYNC_GAP..OFF_DATA_PROLOGUE].iter_mut() {
            *b = 0xFF;
        }

        out[OFF_DATA_PROLOGUE..OFF_DATA_PROLOGUE + CAPTURED_DATA_FIELD_LEN]
            .copy_from_slice(captured_data_field);

        for b in out[OFF_TRAILER_GAP..FRAME_LEN].iter_mut() {
            *b = 0xFF;
        }
        for b in out[FRAME_LEN..BLOCK_LEN].iter_mut() {
            *b = 0x00;
        }
    }

    /// Parses the `(volume, track, sector)` address triple out of an
    /// assembled frame, without touching the GCR payload.
    pub fn parse_address(frame: &[u8; BLOCK_LEN]) -> (u8, u8, u8) {
        let volume = decode_4_and_4(&frame[OFF_ADDR_FIELD..OFF_ADDR_FIELD + 2]);
        let track = decode_4_and_4(&frame[OFF_ADDR_FIELD + 2..OFF_ADDR_FIELD + 4]);
        let sector = decode_4_and_4(&frame[OFF_ADDR_FIELD + 4..OFF_ADDR_FIELD + 6]);
        (volume, track, sector)
    }

    /// Decodes a frame's GCR payload back to its 256-byte logical sector.
    /// Supplemental (SPEC_FULL §10): not used by the mount/convert path,
    /// only by this crate's own round-trip tests and any caller that wants
    /// to verify a conversion without touching the card.
    pub fn decode_to_dsk_sector(frame: &[u8; BLOCK_LEN], out: &mut [u8; 256]) {
        let mut encoded = [0u8; ENCODED_LEN];
        encoded.copy_from_slice(&frame[OFF_PAYLOAD..OFF_PAYLOAD + ENCODED_LEN]);
        GcrCodec::decode(&encoded, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_field_round_trips_example_from_spec() {
        let mut frame = [0u8; BLOCK_LEN];
        let payload = [0u8; 256];
        NicLayout::assemble(0xFE, 0x11, 0x0D, &payload, &mut frame);

        assert_eq!(NicLayout::parse_address(&frame), (0xFE, 0x11, 0x0D));
    }

    #[test]
    fn markers_land_at_spec_offsets() {
        let mut frame = [0u8; BLOCK_LEN];
        let payload = [0x5Au8; 256];
        NicLayout::assemble(0xFE, 3, 7, &payload, &mut frame);

        assert_eq!(&frame[0x22..0x25], &ADDR_PROLOGUE);
        assert_eq!(&frame[0x2D..0x30], &ADDR_EPILOGUE);
        assert_eq!(&frame[0x35..0x38], &DATA_PROLOGUE);
        assert_eq!(&frame[0x18F..0x192], &DATA_EPILOGUE);
        assert_eq!(&frame[0x1A0..0x200], &[0u8; 96][..]);
    }

    #[test]
    fn payload_round_trips_through_frame() {
        let mut frame = [0u8; BLOCK_LEN];
        let mut payload = [0u8; 256];
        for (i, b) in payload.iter_mut().enumerate() {
            *b = (i * 3 + 1) as u8;
        }
        NicLayout::assemble(0xFE, 20, 5, &payload, &mut frame);

        let mut decoded = [0u8; 256];
        NicLayout::decode_to_dsk_sector(&frame, &mut decoded);
        assert_eq!(payload, decoded);
    }
}

//! Write-back buffer pool: up to 5 captured physical-sector writes,
//! coalesced and flushed together (spec §4.9).
//!
//! Grounded on the `writeData`/`sectors`/`tracks` arrays and
//! `writeBackSub`/`writeBackSub2` (`sdisk2.c:1089-1110`, `985-1088`),
//! recast in the teacher's `fat::cache::CacheEntry` idiom: a tagged enum
//! per slot rather than raw `0xFF` sentinel bytes.

use generic_array::GenericArray;
use typenum::consts::U512;

use crate::error::{Error, Result};
use crate::nic::{NicLayout, BLOCK_LEN, CAPTURED_DATA_FIELD_LEN};
use crate::storage::Storage;

pub const SLOT_COUNT: usize = 5;
/// Captured write length including the short lead-in the host streams
/// before the data-field prologue (spec §9 "magic constants").
pub const CAPTURE_LEN: usize = 350;

const VOLUME: u8 = 0xFE;

#[derive(Debug, Clone, Copy)]
pub enum Slot {
    Free,
    Captured {
        track: u8,
        sector: u8,
        payload: [u8; CAPTURE_LEN],
    },
}

impl Slot {
    fn matches(&self, track: u8, sector: u8) -> bool {
        matches!(self, Slot::Captured { track: t, sector: s, .. } if *t == track && *s == sector)
    }
}

/// Pool of `SLOT_COUNT` write-back slots. At most one slot per (track,
/// sector) pair; `buf_num` is the next-free slot.
pub struct WriteBuffer {
    slots: [Slot; SLOT_COUNT],
    pub buf_num: usize,
}

impl WriteBuffer {
    pub fn new() -> Self {
        WriteBuffer {
            slots: [Slot::Free; SLOT_COUNT],
            buf_num: 0,
        }
    }

    pub fn is_full(&self) -> bool {
        self.buf_num >= SLOT_COUNT
    }

    /// True if `(track, sector)` is currently buffered in some slot.
    pub fn contains(&self, track: u8, sector: u8) -> bool {
        self.slots.iter().any(|s| s.matches(track, sector))
    }

    /// Records a capture, coalescing into an already-buffered slot for the
    /// same `(track, sector)` in place rather than burning a fresh one
    /// (spec §4.9 "at most one slot per (track, sector) pair").
    pub fn capture(&mut self, track: u8, sector: u8, payload: [u8; CAPTURE_LEN]) {
        if let Some(existing) = self.slots.iter().position(|s| s.matches(track, sector)) {
            self.slots[existing] = Slot::Captured { track, sector, payload };
            return;
        }
        self.slots[self.buf_num] = Slot::Captured { track, sector, payload };
        self.buf_num += 1;
    }

    /// Reframes every non-empty slot back to NIC format and writes it via
    /// `SdBlock`'s block-write path, then clears the pool (spec §4.9).
    /// `resolve_block` takes the same `storage` reference given here (it
    /// needs it to walk a FAT window) — pass it through rather than
    /// capturing a second mutable reference to it.
    pub fn flush<S, F>(&mut self, storage: &mut S, mut resolve_block: F) -> Result<()>
    where
        S: Storage<SECTOR_SIZE = U512>,
        F: FnMut(&mut S, u8, u8) -> Result<usize>,
    {
        log::trace!("write buffer flush: {} slot(s) pending", self.buf_num);

        for slot in self.slots.iter() {
            if let Slot::Captured { track, sector, payload } = slot {
                let mut data_field = [0u8; CAPTURED_DATA_FIELD_LEN];
                data_field.copy_from_slice(&payload[0..CAPTURED_DATA_FIELD_LEN]);

                let mut frame = [0u8; BLOCK_LEN];
                NicLayout::reassemble_from_capture(VOLUME, *track, *sector, &data_field, &mut frame);

                let sector_idx = resolve_block(storage, *track, *sector)?;
                let mut block = GenericArray::<u8, U512>::default();
                block.as_mut_slice().copy_from_slice(&frame);
                storage.write_sector(sector_idx, &block).map_err(|_| {
                    log::error!(
                        "write buffer flush: failed to write track {} sector {}",
                        track,
                        sector
                    );
                    Error::NotFound
                })?;
            }
        }

        self.slots = [Slot::Free; SLOT_COUNT];
        self.buf_num = 0;
        Ok(())
    }
}

impl Default for WriteBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_most_one_slot_per_track_sector() {
        let mut buf = WriteBuffer::new();
        buf.capture(1, 2, [0u8; CAPTURE_LEN]);
        assert!(buf.contains(1, 2));
        assert!(!buf.contains(1, 3));
    }

    #[test]
    fn recapturing_the_same_sector_overwrites_in_place() {
        let mut buf = WriteBuffer::new();
        buf.capture(1, 2, [0xAAu8; CAPTURE_LEN]);
        buf.capture(1, 2, [0xBBu8; CAPTURE_LEN]);

        assert_eq!(buf.buf_num, 1);
        match buf.slots[0] {
            Slot::Captured { payload, .. } => assert_eq!(payload[0], 0xBB),
            Slot::Free => panic!("expected slot 0 to hold the latest capture"),
        }
    }

    #[test]
    fn fills_to_capacity_and_reports_full() {
        let mut buf = WriteBuffer::new();
        for i in 0..SLOT_COUNT {
            assert!(!buf.is_full());
            buf.capture(0, i as u8, [0u8; CAPTURE_LEN]);
        }
        assert!(buf.is_full());
    }

    #[test]
    fn flush_clears_the_pool() {
        let mut buf = WriteBuffer::new();
        buf.capture(5, 9, [0xAAu8; CAPTURE_LEN]);

        let mut storage = crate::storage::test_support::VecStorage::new(4);
        buf.flush(&mut storage, |_storage, _track, _sector| Ok(0)).unwrap();

        assert!(!buf.contains(5, 9));
        assert_eq!(buf.buf_num, 0);
    }
}

//! FAT16 volume mounting and chain walking (spec §4.2).
//!
//! Grounded on the teacher's `fat/boot_sector.rs` field layout and
//! little-endian parsing macro, and on the original firmware's `init()`
//! (`sdisk2.c:737-864`), which probes for a raw FAT16 BPB before falling
//! back to an MBR partition entry.

use generic_array::GenericArray;
use typenum::consts::U512;

use crate::error::{Error, Result};
use crate::storage::Storage;

pub mod boot_sector;
pub mod dir;
pub mod mbr;
pub mod table;

use boot_sector::Bpb;

const SECTOR_SIZE: usize = 512;
const DIR_ENTRY_SIZE: usize = 32;
const ROOT_ENTRY_COUNT: usize = 512;
/// Entries greater than this mark end-of-chain when walking (spec §4.2).
const END_OF_CHAIN: u16 = 0xFFF6;
/// Value written to terminate a newly allocated chain (spec §4.3 step 5).
const CHAIN_TERMINATOR: u16 = 0xFFFF;

/// A mounted FAT16 volume: offsets derived once at mount time, per spec §3.
#[derive(Debug, Clone, Copy)]
pub struct Fat16 {
    pub bpb_offset: u64,
    pub sectors_per_cluster: u8,
    pub sectors_per_cluster_log2: u8,
    pub reserved_sectors: u16,
    pub sectors_per_fat: u16,

    pub fat_offset: u64,
    pub root_offset: u64,
    pub user_offset: u64,

    /// Bumped on every `walk_chain` reload; makes window reloads a visible,
    /// testable event rather than silent state (SPEC_FULL §10).
    pub last_reload_window_id: u32,
}

impl Fat16 {
    /// Probes offset 54 of LBA 0 for `"FAT16"`; otherwise reads the first
    /// MBR partition's starting LBA at offset 0x1C6 (spec §4.2).
    pub fn mount<S: Storage<SECTOR_SIZE = U512>>(storage: &mut S) -> Result<Self> {
        let mut lba0 = GenericArray::<u8, U512>::default();
        storage.read_sector(0, &mut lba0).map_err(|_| {
            log::error!("fat16 mount: could not read LBA 0");
            Error::NotFound
        })?;

        let bpb_offset = if &lba0[54..59] == b"FAT16" {
            0u64
        } else {
            mbr::first_partition_lba(&lba0).map_err(|e| {
                log::warn!("fat16 mount: no raw FAT16 BPB and no MBR partition found");
                e
            })? as u64
                * SECTOR_SIZE as u64
        };

        let bpb_sector = if bpb_offset == 0 {
            lba0
        } else {
            let mut sector = GenericArray::<u8, U512>::default();
            storage
                .read_sector((bpb_offset / SECTOR_SIZE as u64) as usize, &mut sector)
                .map_err(|_| {
                    log::error!("fat16 mount: could not read BPB sector at offset {}", bpb_offset);
                    Error::NotFound
                })?;
            sector
        };

        let bpb = Bpb::parse(&bpb_sector);

        let mut sectors_per_cluster_log2 = 0u8;
        let mut spc = bpb.sectors_per_cluster;
        while spc > 1 {
            spc >>= 1;
            sectors_per_cluster_log2 += 1;
        }

        let fat_offset = bpb_offset + SECTOR_SIZE as u64 * bpb.reserved_sectors as u64;
        let root_offset = fat_offset + 2 * SECTOR_SIZE as u64 * bpb.sectors_per_fat as u64;
        let user_offset = root_offset + SECTOR_SIZE as u64 * 32;

        Ok(Fat16 {
            bpb_offset,
            sectors_per_cluster: bpb.sectors_per_cluster,
            sectors_per_cluster_log2,
            reserved_sectors: bpb.reserved_sectors,
            sectors_per_fat: bpb.sectors_per_fat,
            fat_offset,
            root_offset,
            user_offset,
            last_reload_window_id: 0,
        })
    }

    fn fat_entry<S: Storage<SECTOR_SIZE = U512>>(
        &self,
        storage: &mut S,
        cluster: u16,
    ) -> Result<u16> {
        let byte_offset = self.fat_offset + 2 * cluster as u64;
        let sector_idx = (byte_offset / SECTOR_SIZE as u64) as usize;
        let in_sector = (byte_offset % SECTOR_SIZE as u64) as usize;

        let mut sector = GenericArray::<u8, U512>::default();
        storage
            .read_sector(sector_idx, &mut sector)
            .map_err(|_| Error::NotFound)?;

        Ok(u16::from_le_bytes([sector[in_sector], sector[in_sector + 1]]))
    }

    fn set_fat_entry<S: Storage<SECTOR_SIZE = U512>>(
        &self,
        storage: &mut S,
        cluster: u16,
        value: u16,
    ) -> Result<()> {
        let byte_offset = self.fat_offset + 2 * cluster as u64;
        let sector_idx = (byte_offset / SECTOR_SIZE as u64) as usize;
        let in_sector = (byte_offset % SECTOR_SIZE as u64) as usize;

        let mut sector = GenericArray::<u8, U512>::default();
        storage
            .read_sector(sector_idx, &mut sector)
            .map_err(|_| Error::NotFound)?;
        sector[in_sector..in_sector + 2].copy_from_slice(&value.to_le_bytes());
        storage
            .write_sector(sector_idx, &sector)
            .map_err(|_| Error::NotFound)
    }

    /// Walks the chain from `start_cluster`, filling `out` with the FAT
    /// entries whose step index falls in `window_id`'s `window_size`-wide
    /// window. Terminates on end-of-chain or a filled window (spec §4.2).
    pub fn walk_chain<S: Storage<SECTOR_SIZE = U512>>(
        &mut self,
        storage: &mut S,
        start_cluster: u16,
        window_size: usize,
        window_id: u32,
        out: &mut [u16],
    ) -> Result<usize> {
        let mut current = start_cluster;
        let mut step = 0usize;
        let mut filled = 0usize;

        loop {
            if step / window_size == window_id as usize {
                out[step % window_size] = current;
                filled += 1;
                if filled == window_size {
                    break;
                }
            }

            let next = self.fat_entry(storage, current)?;
            if next > END_OF_CHAIN {
                break;
            }
            current = next;
            step += 1;
        }

        self.last_reload_window_id = window_id;
        Ok(filled)
    }

    /// Allocates `count` new clusters, chaining them after `tail` (or
    /// starting a fresh chain if `tail` is `None`). Returns the first
    /// allocated cluster. Grounded on `createNic`'s chain-building loop
    /// (`sdisk2.c:528-577`).
    pub fn allocate_chain<S: Storage<SECTOR_SIZE = U512>>(
        &mut self,
        storage: &mut S,
        mut tail: Option<u16>,
        count: usize,
    ) -> Result<u16> {
        let fat_entries = self.sectors_per_fat as u64 * SECTOR_SIZE as u64 / 2;
        let mut first_allocated = None;

        for _ in 0..count {
            let mut candidate = None;
            for cluster in 2..fat_entries as u16 {
                if self.fat_entry(storage, cluster)? == 0 {
                    candidate = Some(cluster);
                    break;
                }
            }
            let cluster = candidate.ok_or_else(|| {
                log::error!("fat16 allocate_chain: no free clusters left");
                Error::OutOfClusters
            })?;

            if let Some(prev) = tail {
                self.set_fat_entry(storage, prev, cluster)?;
            }
            self.set_fat_entry(storage, cluster, CHAIN_TERMINATOR)?;

            if first_allocated.is_none() {
                first_allocated = Some(cluster);
            }
            tail = Some(cluster);
        }

        first_allocated.ok_or_else(|| {
            log::error!("fat16 allocate_chain: requested 0 clusters");
            Error::OutOfClusters
        })
    }

    /// Copies the primary FAT to the secondary FAT region immediately
    /// following it (spec §4.2; byte-for-byte per `duplicateFat`,
    /// `sdisk2.c:495-527`).
    pub fn duplicate_fat<S: Storage<SECTOR_SIZE = U512>>(&self, storage: &mut S) -> Result<()> {
        let sectors = self.sectors_per_fat as usize;
        let primary_start = (self.fat_offset / SECTOR_SIZE as u64) as usize;
        let secondary_start = primary_start + sectors;

        for i in 0..sectors {
            let mut sector = GenericArray::<u8, U512>::default();
            storage
                .read_sector(primary_start + i, &mut sector)
                .map_err(|_| Error::NotFound)?;
            storage
                .write_sector(secondary_start + i, &sector)
                .map_err(|_| Error::NotFound)?;
        }
        Ok(())
    }

    /// Byte offset of the start of `cluster`'s data in the user area.
    pub fn cluster_offset(&self, cluster: u16) -> u64 {
        self.user_offset
            + (cluster as u64 - 2) * self.sectors_per_cluster as u64 * SECTOR_SIZE as u64
    }
}

pub(crate) const fn dir_entry_size() -> usize {
    DIR_ENTRY_SIZE
}

pub(crate) const fn root_entry_count() -> usize {
    ROOT_ENTRY_COUNT
}

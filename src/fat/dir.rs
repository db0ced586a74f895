//! The root directory: finding the newest image of a given extension, and
//! creating new 8.3 entries with preallocated cluster chains (spec §4.3).
//!
//! Grounded on the teacher's `DirEntry` field layout and on the original
//! firmware's `findExt`/`createNic` (`sdisk2.c:372-442`, `528-577`).

use generic_array::GenericArray;
use typenum::consts::U512;

use crate::error::{Error, Result};
use crate::storage::Storage;

use super::Fat16;

const SECTOR_SIZE: usize = 512;
const ENTRY_SIZE: usize = 32;
const ENTRIES_PER_SECTOR: usize = SECTOR_SIZE / ENTRY_SIZE;

/// Attribute bits that disqualify an entry from being a plain file: any of
/// volume-id, directory, or system/hidden-as-long-name combos (spec §4.3:
/// "attribute byte bits 0x1E set").
const REJECT_ATTR_MASK: u8 = 0x1E;
const LONG_NAME_ATTR: u8 = 0x0F;

#[derive(Debug, Clone, Copy)]
pub struct FoundEntry {
    pub entry_index: usize,
    pub name: [u8; 8],
    pub starting_cluster: u16,
    pub protect: bool,
}

fn read_entry<S: Storage<SECTOR_SIZE = U512>>(
    fat: &Fat16,
    storage: &mut S,
    index: usize,
) -> Result<[u8; ENTRY_SIZE]> {
    let sector_idx = (fat.root_offset / SECTOR_SIZE as u64) as usize + index / ENTRIES_PER_SECTOR;
    let in_sector = (index % ENTRIES_PER_SECTOR) * ENTRY_SIZE;

    let mut sector = GenericArray::<u8, U512>::default();
    storage
        .read_sector(sector_idx, &mut sector)
        .map_err(|_| Error::NotFound)?;

    let mut entry = [0u8; ENTRY_SIZE];
    entry.copy_from_slice(&sector[in_sector..in_sector + ENTRY_SIZE]);
    Ok(entry)
}

fn write_entry<S: Storage<SECTOR_SIZE = U512>>(
    fat: &Fat16,
    storage: &mut S,
    index: usize,
    entry: &[u8; ENTRY_SIZE],
) -> Result<()> {
    let sector_idx = (fat.root_offset / SECTOR_SIZE as u64) as usize + index / ENTRIES_PER_SECTOR;
    let in_sector = (index % ENTRIES_PER_SECTOR) * ENTRY_SIZE;

    let mut sector = GenericArray::<u8, U512>::default();
    storage
        .read_sector(sector_idx, &mut sector)
        .map_err(|_| Error::NotFound)?;
    sector[in_sector..in_sector + ENTRY_SIZE].copy_from_slice(entry);
    storage
        .write_sector(sector_idx, &sector)
        .map_err(|_| Error::NotFound)
}

fn is_rejected(entry: &[u8; ENTRY_SIZE]) -> bool {
    let first = entry[0];
    if matches!(first, 0x00 | 0x05 | 0x2E | 0xE5) {
        return true;
    }
    if !first.is_ascii_alphanumeric() {
        return true;
    }
    if entry[11] & REJECT_ATTR_MASK != 0 {
        return true;
    }
    if entry[11] == LONG_NAME_ATTR {
        return true;
    }
    false
}

fn is_free(entry: &[u8; ENTRY_SIZE]) -> bool {
    matches!(entry[0], 0x00 | 0xE5) && entry[11] != LONG_NAME_ATTR
}

/// Scans all 512 root entries for the newest file whose 3-byte extension
/// (offset 8) matches `ext`, ranked by the `(date, time)` pair at offsets
/// 22-25 (spec §4.3).
pub fn find_newest<S: Storage<SECTOR_SIZE = U512>>(
    fat: &Fat16,
    storage: &mut S,
    ext: &[u8; 3],
) -> Result<FoundEntry> {
    let mut best: Option<(u32, FoundEntry)> = None;

    for index in 0..super::root_entry_count() {
        let entry = read_entry(fat, storage, index)?;
        if is_rejected(&entry) {
            continue;
        }
        if &entry[8..11] != ext {
            continue;
        }

        let time = u16::from_le_bytes([entry[22], entry[23]]);
        let date = u16::from_le_bytes([entry[24], entry[25]]);
        let rank = ((date as u32) << 16) | time as u32;

        let mut name = [0u8; 8];
        name.copy_from_slice(&entry[0..8]);

        let found = FoundEntry {
            entry_index: index,
            name,
            starting_cluster: u16::from_le_bytes([entry[26], entry[27]]),
            protect: entry[11] & 0x01 != 0,
        };

        if best.map_or(true, |(best_rank, _)| rank > best_rank) {
            best = Some((rank, found));
        }
    }

    best.map(|(_, found)| found).ok_or_else(|| {
        log::warn!("root directory: no entry found with extension {:?}", ext);
        Error::NotFound
    })
}

/// Creates a new 8.3 entry named `name.ext`, sized `size_bytes`, allocating
/// and chaining the needed clusters and duplicating the FAT afterward
/// (spec §4.3 steps 1-7).
pub fn create<S: Storage<SECTOR_SIZE = U512>>(
    fat: &mut Fat16,
    storage: &mut S,
    name: &[u8; 8],
    ext: &[u8; 3],
    size_bytes: u32,
) -> Result<FoundEntry> {
    let mut free_index = None;
    for index in 0..super::root_entry_count() {
        let entry = read_entry(fat, storage, index)?;
        if is_free(&entry) {
            free_index = Some(index);
            break;
        }
    }
    let index = free_index.ok_or_else(|| {
        log::error!("root directory: no free entry for {:?}.{:?}", name, ext);
        Error::OutOfDirectorySpace
    })?;

    let cluster_bytes = fat.sectors_per_cluster as u32 * SECTOR_SIZE as u32;
    let cluster_count = ((size_bytes + cluster_bytes - 1) / cluster_bytes) as usize;

    let first_cluster = fat.allocate_chain(storage, None, cluster_count)?;

    let mut entry = [0u8; ENTRY_SIZE];
    entry[0..8].copy_from_slice(name);
    entry[8..11].copy_from_slice(ext);
    entry[26..28].copy_from_slice(&first_cluster.to_le_bytes());
    entry[28..32].copy_from_slice(&size_bytes.to_le_bytes());
    write_entry(fat, storage, index, &entry)?;

    fat.duplicate_fat(storage)?;

    Ok(FoundEntry {
        entry_index: index,
        name: *name,
        starting_cluster: first_cluster,
        protect: false,
    })
}

//! One-shot DSK → NIC image conversion at mount time (spec §4.6).
//!
//! Grounded on `dsk2Nic` (`sdisk2.c:579-736`): walks 35 tracks × 16 logical
//! sectors, reads each DSK half-sector pair, encodes each physical sector,
//! and writes it at the corresponding NIC cluster.

use generic_array::GenericArray;
use typenum::consts::U512;

use crate::error::{Error, Result};
use crate::fat::dir;
use crate::fat::table::FatWindow;
use crate::fat::Fat16;
use crate::nic::{NicLayout, BLOCK_LEN};
use crate::storage::Storage;

const SECTOR_SIZE: usize = 512;
const TRACKS: usize = 35;
const LOGICAL_SECTORS: usize = 16;
const VOLUME: u8 = 0xFE;
const NIC_SIZE_BYTES: u32 = 286_720;

const DSK_WINDOW_LEN: usize = 18;
const NIC_WINDOW_LEN: usize = 35;

const PHYSICAL_OF: [u8; 16] = [0, 13, 11, 9, 7, 5, 3, 1, 14, 12, 10, 8, 6, 4, 2, 15];

pub struct ImageConverter;

impl ImageConverter {
    /// Converts `dsk_basename`'s DSK image to a freshly-allocated NIC file.
    /// Aborts early (leaving a partial, rediscoverable NIC file) if the
    /// caller's `still_present` check trips mid-conversion (spec §4.6:
    /// "if eject fires mid-conversion, abort").
    pub fn convert<S: Storage<SECTOR_SIZE = U512>>(
        fat: &mut Fat16,
        storage: &mut S,
        dsk_basename: &[u8; 8],
        dsk_start_cluster: u16,
        mut still_present: impl FnMut() -> bool,
    ) -> Result<()> {
        log::debug!("converting DSK image {:?} to NIC", dsk_basename);

        let nic_entry = dir::create(fat, storage, dsk_basename, b"NIC", NIC_SIZE_BYTES)?;

        let mut dsk_window: FatWindow<DSK_WINDOW_LEN> = FatWindow::new();
        let mut nic_window: FatWindow<NIC_WINDOW_LEN> = FatWindow::new();

        let sectors_per_cluster_log2 = fat.sectors_per_cluster_log2 as u32;

        for track in 0..TRACKS {
            if !still_present() {
                log::warn!("card ejected mid-conversion at track {}", track);
                return Err(Error::CardEjected);
            }

            let mut scratch = [0u8; SECTOR_SIZE];

            for logical_sector in 0..LOGICAL_SECTORS {
                if !still_present() {
                    log::warn!(
                        "card ejected mid-conversion at track {} logical sector {}",
                        track,
                        logical_sector
                    );
                    return Err(Error::CardEjected);
                }

                let phys = PHYSICAL_OF[logical_sector] as u8;

                if logical_sector % 2 == 0 {
                    let long_sector = (track * 8 + logical_sector / 2) as u32;
                    let long_cluster = long_sector >> sectors_per_cluster_log2;
                    let window_id = long_cluster / DSK_WINDOW_LEN as u32;

                    dsk_window.ensure(fat, storage, dsk_start_cluster, window_id)?;
                    let step_in_window = (long_cluster % DSK_WINDOW_LEN as u32) as usize;
                    let cluster = dsk_window.cluster_at(step_in_window).ok_or(Error::NotFound)?;

                    let within_cluster = long_sector & ((1 << sectors_per_cluster_log2) - 1);
                    let sector_idx = (fat.cluster_offset(cluster) / SECTOR_SIZE as u64) as usize
                        + within_cluster as usize;

                    let mut block = GenericArray::<u8, U512>::default();
                    storage.read_sector(sector_idx, &mut block).map_err(|_| {
                        log::error!("dsk->nic convert: failed to read DSK sector {}", sector_idx);
                        Error::NotFound
                    })?;
                    scratch.copy_from_slice(block.as_slice());
                }

                let payload: [u8; 256] = if logical_sector % 2 == 0 {
                    let mut half = [0u8; 256];
                    half.copy_from_slice(&scratch[0..256]);
                    half
                } else {
                    let mut half = [0u8; 256];
                    half.copy_from_slice(&scratch[256..512]);
                    half
                };

                let mut frame = [0u8; BLOCK_LEN];
                NicLayout::assemble(VOLUME, track as u8, phys, &payload, &mut frame);

                let long_sector = (track * 16 + phys as usize) as u32;
                let long_cluster = long_sector >> sectors_per_cluster_log2;
                let window_id = long_cluster / NIC_WINDOW_LEN as u32;

                nic_window.ensure(fat, storage, nic_entry.starting_cluster, window_id)?;
                let step_in_window = (long_cluster % NIC_WINDOW_LEN as u32) as usize;
                let cluster = nic_window.cluster_at(step_in_window).ok_or(Error::NotFound)?;

                let within_cluster = long_sector & ((1 << sectors_per_cluster_log2) - 1);
                let sector_idx = (fat.cluster_offset(cluster) / SECTOR_SIZE as u64) as usize
                    + within_cluster as usize;

                let mut out_block = GenericArray::<u8, U512>::default();
                out_block.as_mut_slice().copy_from_slice(&frame);
                storage.write_sector(sector_idx, &out_block).map_err(|_| {
                    log::error!("dsk->nic convert: failed to write NIC sector {}", sector_idx);
                    Error::NotFound
                })?;
            }
        }

        Ok(())
    }
}

//! Gathering of the per-tile packets of one picture back into a single access unit.
//!
//! Packets arrive tagged with their tile index, in any order. Once every tile of the picture is
//! present, the packet of tile 0 is emitted whole, followed by just the slice segment NAL units
//! of the remaining tiles in tile order. Parameter sets are therefore only taken from tile 0.

use crate::annexb;
use crate::nal::NalHeader;
use crate::packet::{self, FilterError, Packet};
use log::*;

const MAX_TILES: usize = 255;

pub struct TileRepacker {
    tiles: Vec<Option<Packet>>,
    /// Number of tiles collected so far for the current picture.
    received: usize,
    /// Timing and flags of the first packet of the current picture.
    first: Option<Packet>,
}
impl TileRepacker {
    pub fn new(tile_num: usize) -> Result<TileRepacker, FilterError> {
        if tile_num == 0 || tile_num > MAX_TILES {
            return Err(FilterError::InvalidOption {
                name: "tile_num",
                value: tile_num as i64,
            });
        }
        info!("number of tiles {}", tile_num);
        Ok(TileRepacker {
            tiles: vec![None; tile_num],
            received: 0,
            first: None,
        })
    }

    pub fn tile_num(&self) -> usize {
        self.tiles.len()
    }

    /// Accepts the packet of one tile, returning the repacked picture once all its tiles have
    /// arrived.
    ///
    /// A rejected packet is dropped; the tiles already collected are kept.
    pub fn push(&mut self, packet: Packet) -> Result<Option<Packet>, FilterError> {
        let tile_num = self.tiles.len();
        let tile = packet
            .tile_index
            .ok_or(FilterError::InvalidData("packet without tile index"))?;
        if tile >= tile_num {
            error!("tile index {} exceeds maximum tile number {}", tile, tile_num);
            return Err(FilterError::InvalidData("tile index out of range"));
        }
        if self.tiles[tile].is_some() {
            error!("duplicated tile index {}", tile);
            return Err(FilterError::InvalidData("duplicated tile index"));
        }
        let mismatch = self.first.as_ref().map_or(false, |first| {
            packet.pts != first.pts || packet.dts != first.dts || packet.flags != first.flags
        });
        if mismatch {
            error!("packet metadata does not match");
            return Err(FilterError::InvalidData("packet metadata does not match"));
        }
        if self.first.is_none() {
            self.first = Some(packet.derive(vec![]));
        }
        debug!("tile {}, data actual size {}", tile, packet.data.len());
        self.tiles[tile] = Some(packet);
        self.received += 1;
        if self.received < tile_num {
            return Ok(None);
        }
        self.repack().map(Some)
    }

    fn repack(&mut self) -> Result<Packet, FilterError> {
        let tiles: Vec<Packet> = self.tiles.iter_mut().filter_map(Option::take).collect();
        let first = self.first.take().unwrap_or_default();
        self.received = 0;

        let mut data = packet::alloc(tiles.iter().map(|t| t.data.len()).sum())?;
        let mut tiles = tiles.into_iter();
        if let Some(tile0) = tiles.next() {
            data.extend_from_slice(&tile0.data);
        }
        for (i, tile) in tiles.enumerate() {
            let mut copied = 0;
            let units = annexb::nal_units(&tile.data)
                .map_err(|_| FilterError::InvalidData("tile packet is not Annex B"))?;
            for unit in units {
                let vcl = NalHeader::from_bytes(unit.nal)
                    .map(|h| h.nal_unit_type().is_vcl())
                    .unwrap_or(false);
                if vcl {
                    data.extend_from_slice(unit.framed);
                    copied += unit.framed.len();
                }
            }
            debug!("tile {} size {}", i + 1, copied);
        }
        debug!("repacket new size {}", data.len());
        Ok(first.derive(data))
    }

    /// Discards the tiles collected for an incomplete picture.
    pub fn flush(&mut self) {
        for tile in &mut self.tiles {
            *tile = None;
        }
        self.received = 0;
        self.first = None;
    }
}

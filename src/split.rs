//! Splitting of pictures coded as several tiles into one independently decodable stream per
//! tile.
//!
//! Every parameter set of an access unit is copied into each tile's stream, with the SPS
//! resized to the tile's dimensions and the PPS tile partitioning removed. Each slice segment
//! is then rewritten as the first segment of a single-tile picture and handed out, together
//! with the parameter sets pending in its tile's stream, as one packet.

use crate::extradata;
use crate::nal::pps::{write_pps, ForceTile, PicParameterSet};
use crate::nal::slice::{write_slice_header, SliceTarget};
use crate::nal::sps::{write_sps, SeqParameterSet};
use crate::nal::vps::write_vps;
use crate::nal::UnitType;
use crate::packet::{self, FilterError, Packet};
use crate::rbsp::BitWriter;
use crate::tile::LayoutTable;
use crate::unit::{AccessUnit, SliceUnit, Unit};
use crate::Context;
use hex_slice::AsHex;
use log::*;

#[derive(Debug)]
enum State {
    /// Waiting for the next access unit.
    Idle,
    /// An access unit that could not be parsed, to be handed back unchanged.
    PassThrough(Packet),
    /// Handing out one packet per slice segment of `au`, starting the search at `cursor`.
    Distributing {
        input: Packet,
        au: AccessUnit,
        cursor: usize,
    },
}

pub struct FrameSplitter {
    ctx: Context,
    layouts: LayoutTable,
    streams: Vec<BitWriter<Vec<u8>>>,
    state: State,
}
impl Default for FrameSplitter {
    /// A splitter that learns its tile count from the first access unit carrying a PPS.
    fn default() -> Self {
        FrameSplitter {
            ctx: Context::default(),
            layouts: LayoutTable::default(),
            streams: vec![],
            state: State::Idle,
        }
    }
}
impl FrameSplitter {
    /// Creates a splitter for the stream described by `extradata`, whose first PPS must enable
    /// tiles.
    pub fn new(extradata: &[u8]) -> Result<FrameSplitter, FilterError> {
        let sets = extradata::parse(extradata).map_err(|e| {
            warn!("unusable extradata: {:?}", e);
            FilterError::InvalidData("extradata")
        })?;
        let pps = sets
            .first_pps()
            .ok_or(FilterError::InvalidData("no PPS in extradata"))?;
        if !pps.tiles_enabled_flag() {
            error!("extradata pps {} does not enable tiles", pps.id().id());
            return Err(FilterError::InvalidData("tiles not enabled"));
        }
        let mut splitter = FrameSplitter::default();
        splitter.streams = new_streams(pps.num_tile_columns() as usize * pps.num_tile_rows() as usize)?;
        if let Some(sps) = sets.ctx.sps_by_id(pps.seq_parameter_set_id) {
            splitter.layouts.resolve(sps, pps)?;
        }
        splitter.ctx = sets.ctx;
        Ok(splitter)
    }

    /// Number of tile streams, zero until it is known.
    pub fn num_tiles(&self) -> usize {
        self.streams.len()
    }

    /// Accepts the next access unit.
    ///
    /// All packets produced for the previous one must have been received first.
    pub fn send(&mut self, packet: Packet) -> Result<(), FilterError> {
        if !matches!(self.state, State::Idle) {
            return Err(FilterError::PendingOutput);
        }
        let au = match AccessUnit::parse(&mut self.ctx, &packet.data) {
            Ok(au) => au,
            Err(e) => {
                warn!("passing through unparsable access unit: {:?}", e);
                self.state = State::PassThrough(packet);
                return Ok(());
            }
        };
        if let Err(e) = self.distribute_parameter_sets(&au) {
            error!("dropping access unit: {:?}", e);
            self.reset_streams();
            return Err(e);
        }
        if au.num_slices() > 0 {
            self.state = State::Distributing {
                input: packet,
                au,
                cursor: 0,
            };
        }
        Ok(())
    }

    /// Returns the next packet, or `None` once the last access unit sent is used up.
    pub fn receive(&mut self) -> Result<Option<Packet>, FilterError> {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Idle => Ok(None),
            State::PassThrough(packet) => Ok(Some(packet)),
            State::Distributing { input, au, cursor } => {
                let next = au.units[cursor..]
                    .iter()
                    .position(Unit::is_slice)
                    .map(|p| cursor + p);
                let index = match next {
                    Some(i) => i,
                    None => return Ok(None),
                };
                let slice = match &au.units[index] {
                    Unit::Slice(slice) => slice,
                    _ => return Err(FilterError::InvalidData("not a slice")),
                };
                match self.write_slice(slice) {
                    Ok((tile, data)) => {
                        let mut out = input.derive(data);
                        out.tile_index = Some(tile);
                        if au.units[index + 1..].iter().any(Unit::is_slice) {
                            self.state = State::Distributing {
                                input,
                                au,
                                cursor: index + 1,
                            };
                        }
                        Ok(Some(out))
                    }
                    Err(e) => {
                        error!("dropping access unit: {:?}", e);
                        self.reset_streams();
                        Err(e)
                    }
                }
            }
        }
    }

    /// Discards any pending input and any parameter sets not yet handed out.
    pub fn flush(&mut self) {
        self.state = State::Idle;
        self.reset_streams();
    }

    fn reset_streams(&mut self) {
        for stream in &mut self.streams {
            stream.reset();
        }
    }

    fn ensure_streams(&mut self, num_tiles: usize) -> Result<(), FilterError> {
        if self.streams.is_empty() {
            self.streams = new_streams(num_tiles)?;
            Ok(())
        } else if self.streams.len() != num_tiles {
            error!(
                "layout of {} tiles in a stream split into {}",
                num_tiles,
                self.streams.len()
            );
            Err(FilterError::InvalidData("tile count changed"))
        } else {
            Ok(())
        }
    }

    fn distribute_parameter_sets(&mut self, au: &AccessUnit) -> Result<(), FilterError> {
        if self.streams.is_empty() {
            // the tile count comes from the first PPS of the stream
            if let Some(pps) = au.units.iter().find_map(|u| match u {
                Unit::Pps(pps) => Some(pps),
                _ => None,
            }) {
                if !pps.tiles_enabled_flag() {
                    return Err(FilterError::InvalidData("tiles not enabled"));
                }
                self.ensure_streams(pps.num_tile_columns() as usize * pps.num_tile_rows() as usize)?;
            }
        }
        let mut units = au.units.iter().peekable();
        while let Some(unit) = units.next() {
            match unit {
                Unit::Vps(vps) => {
                    for stream in self.streams_for(UnitType::VpsNut)? {
                        stream.write_nal_header(UnitType::VpsNut, 0, true)?;
                        write_vps(vps, stream)?;
                    }
                }
                Unit::Sps(sps) => {
                    let pps = match units.peek() {
                        Some(Unit::Pps(pps)) if pps.seq_parameter_set_id == sps.id() => pps,
                        _ => {
                            error!("sps {} not followed by its pps", sps.id().id());
                            return Err(FilterError::InvalidData("SPS not followed by its PPS"));
                        }
                    };
                    self.write_sps(sps, pps)?;
                }
                Unit::Pps(pps) => {
                    for stream in self.streams_for(UnitType::PpsNut)? {
                        stream.write_nal_header(UnitType::PpsNut, 0, true)?;
                        write_pps(pps, ForceTile::Disable, 0, 0, stream)?;
                    }
                }
                Unit::Slice(_) | Unit::Other(_) => {}
            }
        }
        Ok(())
    }

    fn streams_for(
        &mut self,
        unit_type: UnitType,
    ) -> Result<&mut [BitWriter<Vec<u8>>], FilterError> {
        if self.streams.is_empty() {
            error!("{:?} before the tile count is known", unit_type);
            return Err(FilterError::InvalidData("tile count unknown"));
        }
        Ok(&mut self.streams[..])
    }

    /// Writes `sps` into each tile stream, sized to that tile.
    fn write_sps(&mut self, sps: &SeqParameterSet, pps: &PicParameterSet) -> Result<(), FilterError> {
        let layout = self.layouts.resolve(sps, pps)?;
        if self.streams.len() != layout.num_tiles() {
            error!(
                "pps {} has {} tiles, expected {}",
                pps.id().id(),
                layout.num_tiles(),
                self.streams.len()
            );
            return Err(FilterError::InvalidData("tile count changed"));
        }
        for (tile, stream) in self.streams.iter_mut().enumerate() {
            let (width, height) = layout
                .tile_geometry(tile)
                .ok_or(FilterError::InvalidData("tile index"))?;
            stream.write_nal_header(UnitType::SpsNut, 0, true)?;
            write_sps(sps, width, height, stream)?;
        }
        Ok(())
    }

    /// Appends `slice`, rewritten for its tile, to that tile's stream and drains the stream.
    fn write_slice(&mut self, slice: &SliceUnit) -> Result<(usize, Vec<u8>), FilterError> {
        let pps = self
            .ctx
            .pps_by_id(slice.header.slice_pic_parameter_set_id)
            .ok_or(FilterError::InvalidData("slice refers to unknown PPS"))?;
        let sps = self
            .ctx
            .sps_by_id(pps.seq_parameter_set_id)
            .ok_or(FilterError::InvalidData("PPS refers to unknown SPS"))?;
        let layout = self.layouts.resolve(sps, pps)?;
        let tile = layout
            .tile_index(slice.header.slice_segment_address)
            .ok_or(FilterError::InvalidData("slice segment address outside picture"))?;
        let (width, height) = layout
            .tile_geometry(tile)
            .ok_or(FilterError::InvalidData("tile index"))?;
        let num_tiles = layout.num_tiles();
        if self.streams.is_empty() {
            self.streams = new_streams(num_tiles)?;
        }
        if self.streams.len() != num_tiles {
            return Err(FilterError::InvalidData("tile count changed"));
        }
        let stream = &mut self.streams[tile];
        let target = SliceTarget {
            width,
            height,
            force_tile: ForceTile::Disable,
            x: 0,
            y: 0,
            independent: true,
        };
        stream.write_nal_header(
            slice.nal_header.nal_unit_type(),
            slice.nal_header.temporal_id(),
            true,
        )?;
        write_slice_header(&slice.header, slice.nal_header, sps, pps, &target, stream)?;
        stream.write_payload(slice.data())?;

        let mut data = packet::alloc(stream.byte_count()?)?;
        data.resize(stream.byte_count()?, 0);
        stream.fetch_into(&mut data)?;
        stream.reset();
        debug!(
            "slice at {} to tile {} ({}x{}), {} bytes",
            slice.header.slice_segment_address,
            tile,
            width,
            height,
            data.len()
        );
        trace!("tile {} packet {:02x}", tile, data[..data.len().min(32)].as_hex());
        Ok((tile, data))
    }
}

fn new_streams(num_tiles: usize) -> Result<Vec<BitWriter<Vec<u8>>>, FilterError> {
    let mut streams = Vec::new();
    streams.try_reserve_exact(num_tiles)?;
    streams.resize_with(num_tiles, || BitWriter::new(Vec::new()));
    debug!("splitting into {} tile streams", num_tiles);
    Ok(streams)
}

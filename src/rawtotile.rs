//! Re-addressing of a picture so that it becomes one tile of a larger tiled picture.
//!
//! The parameter sets of each access unit are rewritten to describe the larger picture and its
//! uniform tile grid, and the first slice segment is moved to the configured position. The
//! packets of the other tiles, produced the same way, can then be gathered by
//! [`crate::repack::TileRepacker`].

use crate::nal::pps::{write_pps, ForceTile};
use crate::nal::slice::{write_slice_header, SliceTarget};
use crate::nal::sps::{ctbs_for, write_sps};
use crate::nal::vps::write_vps;
use crate::nal::UnitType;
use crate::packet::{self, FilterError, Packet};
use crate::rbsp::BitWriter;
use crate::unit::{AccessUnit, SliceUnit, Unit};
use crate::Context;
use log::*;

const MAX_DIMENSION: u32 = 8192;
const MAX_TILES: u32 = 128;
/// Log2 of the smallest CTB size, which bounds the tile count before the SPS is known.
const MIN_LOG2_CTB_SIZE: u32 = 4;

/// Placement of the tile within the picture being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileOptions {
    /// Width in luma samples of the whole picture.
    pub width: u32,
    /// Height in luma samples of the whole picture.
    pub height: u32,
    /// Number of tile columns; zero means one.
    pub column: u32,
    /// Number of tile rows; zero means one.
    pub row: u32,
    /// Luma sample position of the tile's top left corner.
    pub x: u32,
    pub y: u32,
}
impl Default for TileOptions {
    fn default() -> Self {
        TileOptions {
            width: 1280,
            height: 720,
            column: 0,
            row: 0,
            x: 0,
            y: 0,
        }
    }
}
impl TileOptions {
    pub fn validate(&self) -> Result<(), FilterError> {
        let check = |name, value: u32, max| {
            if value > max {
                Err(FilterError::InvalidOption {
                    name,
                    value: i64::from(value),
                })
            } else {
                Ok(())
            }
        };
        check("width", self.width, MAX_DIMENSION)?;
        check("height", self.height, MAX_DIMENSION)?;
        check("column", self.column, MAX_TILES)?;
        check("row", self.row, MAX_TILES)?;
        check("x", self.x, MAX_DIMENSION)?;
        check("y", self.y, MAX_DIMENSION)?;
        self.check_grid(MIN_LOG2_CTB_SIZE)
    }

    /// Checks that every tile column and row holds at least one CTB of size
    /// `1 << log2_ctb_size`.
    fn check_grid(&self, log2_ctb_size: u32) -> Result<(), FilterError> {
        if self.columns() > ctbs_for(self.width, log2_ctb_size) {
            return Err(FilterError::InvalidOption {
                name: "column",
                value: i64::from(self.column),
            });
        }
        if self.rows() > ctbs_for(self.height, log2_ctb_size) {
            return Err(FilterError::InvalidOption {
                name: "row",
                value: i64::from(self.row),
            });
        }
        Ok(())
    }

    fn columns(&self) -> u32 {
        self.column.max(1)
    }

    fn rows(&self) -> u32 {
        self.row.max(1)
    }
}

pub struct RawToTile {
    options: TileOptions,
    ctx: Context,
    stream: BitWriter<Vec<u8>>,
}
impl RawToTile {
    pub fn new(options: TileOptions) -> Result<RawToTile, FilterError> {
        options.validate()?;
        Ok(RawToTile {
            options,
            ctx: Context::default(),
            stream: BitWriter::new(Vec::new()),
        })
    }

    pub fn options(&self) -> &TileOptions {
        &self.options
    }

    /// Rewrites one access unit.
    ///
    /// Returns `None` for an access unit without slices; its rewritten parameter sets are then
    /// prepended to the next packet. Access units that cannot be parsed are returned unchanged.
    pub fn filter(&mut self, packet: Packet) -> Result<Option<Packet>, FilterError> {
        let au = match AccessUnit::parse(&mut self.ctx, &packet.data) {
            Ok(au) => au,
            Err(e) => {
                warn!("passing through unparsable access unit: {:?}", e);
                return Ok(Some(packet));
            }
        };
        match self.rewrite(&au) {
            Ok(false) => Ok(None),
            Ok(true) => {
                let len = self.stream.byte_count()?;
                let mut data = packet::alloc(len)?;
                data.resize(len, 0);
                self.stream.fetch_into(&mut data)?;
                self.stream.reset();
                Ok(Some(packet.derive(data)))
            }
            Err(e) => {
                error!("dropping access unit: {:?}", e);
                self.stream.reset();
                Err(e)
            }
        }
    }

    /// Discards rewritten parameter sets not yet handed out.
    pub fn flush(&mut self) {
        self.stream.reset();
    }

    /// Writes the parameter sets and the first slice of `au`, returning whether there was a slice.
    fn rewrite(&mut self, au: &AccessUnit) -> Result<bool, FilterError> {
        let o = self.options;
        let w = &mut self.stream;
        for unit in &au.units {
            match unit {
                Unit::Vps(vps) => {
                    w.write_nal_header(UnitType::VpsNut, 0, true)?;
                    write_vps(vps, w)?;
                }
                Unit::Sps(sps) => {
                    w.write_nal_header(UnitType::SpsNut, 0, true)?;
                    write_sps(sps, o.width, o.height, w)?;
                }
                Unit::Pps(pps) => {
                    if let Some(sps) = self.ctx.sps_by_id(pps.seq_parameter_set_id) {
                        o.check_grid(sps.log2_ctb_size())?;
                    }
                    w.write_nal_header(UnitType::PpsNut, 0, true)?;
                    write_pps(pps, ForceTile::Enable, o.columns(), o.rows(), w)?;
                }
                Unit::Slice(_) | Unit::Other(_) => {}
            }
        }
        let slice = match au.units.iter().find_map(|u| match u {
            Unit::Slice(slice) => Some(slice),
            _ => None,
        }) {
            Some(slice) => slice,
            None => return Ok(false),
        };
        if au.num_slices() > 1 {
            debug!("keeping the first of {} slice segments", au.num_slices());
        }
        self.write_slice(slice)?;
        Ok(true)
    }

    fn write_slice(&mut self, slice: &SliceUnit) -> Result<(), FilterError> {
        let pps = self
            .ctx
            .pps_by_id(slice.header.slice_pic_parameter_set_id)
            .ok_or(FilterError::InvalidData("slice refers to unknown PPS"))?;
        let sps = self
            .ctx
            .sps_by_id(pps.seq_parameter_set_id)
            .ok_or(FilterError::InvalidData("PPS refers to unknown SPS"))?;
        let target = SliceTarget {
            width: self.options.width,
            height: self.options.height,
            force_tile: ForceTile::Enable,
            x: self.options.x,
            y: self.options.y,
            independent: true,
        };
        self.stream.write_nal_header(
            slice.nal_header.nal_unit_type(),
            slice.nal_header.temporal_id(),
            true,
        )?;
        write_slice_header(&slice.header, slice.nal_header, sps, pps, &target, &mut self.stream)?;
        self.stream.write_payload(slice.data())?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::nal::pps::test::PPS_NO_TILES;
    use crate::nal::sps::test::SPS_1080P;
    use crate::nal::vps::test::VPS;
    use crate::unit::test::annexb;
    use hex_literal::hex;
    use test_case::test_case;

    /// A single tile IDR slice, as written for the untiled PPS.
    const UNTILED_IDR: [u8; 11] = hex!("26 01 AF 2E AF 12 00 00 03 01 80");

    fn bottom_right() -> TileOptions {
        TileOptions {
            width: 3840,
            height: 2176,
            column: 2,
            row: 2,
            x: 1920,
            y: 1088,
        }
    }

    #[test]
    fn defaults() {
        let o = TileOptions::default();
        assert_eq!((o.width, o.height), (1280, 720));
        assert_eq!((o.column, o.row, o.x, o.y), (0, 0, 0, 0));
        assert!(o.validate().is_ok());
    }

    #[test_case(TileOptions { width: 8193, ..TileOptions::default() }, "width"; "width")]
    #[test_case(TileOptions { height: 9000, ..TileOptions::default() }, "height"; "height")]
    #[test_case(TileOptions { column: 129, ..TileOptions::default() }, "column"; "column")]
    #[test_case(TileOptions { row: 200, ..TileOptions::default() }, "row"; "row")]
    #[test_case(TileOptions { x: 8193, ..TileOptions::default() }, "x"; "x")]
    #[test_case(TileOptions { y: 10000, ..TileOptions::default() }, "y"; "y")]
    fn option_out_of_range(o: TileOptions, expected: &str) {
        match RawToTile::new(o) {
            Err(FilterError::InvalidOption { name, .. }) => assert_eq!(name, expected),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test_case(TileOptions { width: 64, column: 5, ..TileOptions::default() }, "column"; "columns")]
    #[test_case(TileOptions { height: 0, ..TileOptions::default() }, "row"; "zero height")]
    fn grid_finer_than_smallest_ctb(o: TileOptions, expected: &str) {
        match RawToTile::new(o) {
            Err(FilterError::InvalidOption { name, .. }) => assert_eq!(name, expected),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn grid_finer_than_ctb() {
        // 16 columns of 16 samples are fine until the 64 sample CTB of the SPS is known
        let mut filter = RawToTile::new(TileOptions {
            width: 256,
            column: 16,
            ..TileOptions::default()
        })
        .unwrap();
        let input = Packet::new(annexb(&[&VPS, &SPS_1080P, &PPS_NO_TILES, &UNTILED_IDR]));
        assert!(matches!(
            filter.filter(input),
            Err(FilterError::InvalidOption {
                name: "column",
                value: 16
            })
        ));
    }

    #[test]
    fn place_in_grid() {
        let mut filter = RawToTile::new(bottom_right()).unwrap();
        let mut input = Packet::new(annexb(&[&VPS, &SPS_1080P, &PPS_NO_TILES, &UNTILED_IDR]));
        input.pts = Some(1);
        let out = filter.filter(input).unwrap().unwrap();
        assert_eq!(out.pts, Some(1));
        let expected = hex!(
            "00 00 00 01 40 01 0C 01 FF FF 01 60 00 00 03 00 90 00 00 03 00 00 03 00 7B 95 98 09
             00 00 00 01 42 01 01 01 60 00 00 03 00 90 00 00 03 00 00 03 00 7B A0 01 E0 20 02 20
                         7C B9 65 66 92 44 8A C8
             00 00 00 01 44 01 C0 71 84 97 12
             00 00 00 01 26 01 30 69 E5 E0 AF 12 00 00 03 01 80"
        );
        assert_eq!(out.data, &expected[..]);
    }

    #[test]
    fn reparse_output() {
        let mut filter = RawToTile::new(bottom_right()).unwrap();
        let input = Packet::new(annexb(&[&VPS, &SPS_1080P, &PPS_NO_TILES, &UNTILED_IDR]));
        let out = filter.filter(input).unwrap().unwrap();
        let mut ctx = Context::default();
        let au = AccessUnit::parse(&mut ctx, &out.data).unwrap();
        let pps = ctx.pps().next().unwrap();
        assert_eq!((pps.num_tile_columns(), pps.num_tile_rows()), (2, 2));
        match &au.units[3] {
            Unit::Slice(slice) => {
                assert_eq!(slice.header.slice_segment_address, 17 * 60 + 30);
                assert_eq!(slice.data(), &hex!("AF 12 00 00 01 80"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parameter_sets_wait_for_a_slice() {
        let mut filter = RawToTile::new(TileOptions {
            column: 1,
            row: 1,
            ..TileOptions::default()
        })
        .unwrap();
        let params = filter
            .filter(Packet::new(annexb(&[&VPS, &SPS_1080P, &PPS_NO_TILES])))
            .unwrap();
        assert!(params.is_none());
        let out = filter
            .filter(Packet::new(annexb(&[&UNTILED_IDR, &UNTILED_IDR])))
            .unwrap()
            .unwrap();
        let mut ctx = Context::default();
        let au = AccessUnit::parse(&mut ctx, &out.data).unwrap();
        // the parameter sets, then only the first slice
        assert_eq!(au.units.len(), 4);
        assert_eq!(au.num_slices(), 1);
        let sps = ctx.sps().next().unwrap();
        assert_eq!(sps.pic_width_in_luma_samples, 1280);
        assert_eq!(sps.pic_height_in_luma_samples, 720);
    }

    #[test]
    fn zero_grid_is_one_tile() {
        let mut filter = RawToTile::new(TileOptions::default()).unwrap();
        let input = Packet::new(annexb(&[&VPS, &SPS_1080P, &PPS_NO_TILES, &UNTILED_IDR]));
        let out = filter.filter(input).unwrap().unwrap();
        let mut ctx = Context::default();
        AccessUnit::parse(&mut ctx, &out.data).unwrap();
        let pps = ctx.pps().next().unwrap();
        assert!(pps.tiles_enabled_flag());
        assert_eq!((pps.num_tile_columns(), pps.num_tile_rows()), (1, 1));
    }

    #[test]
    fn position_outside_picture() {
        let mut filter = RawToTile::new(TileOptions {
            x: 4000,
            y: 64,
            ..bottom_right()
        })
        .unwrap();
        let input = Packet::new(annexb(&[&VPS, &SPS_1080P, &PPS_NO_TILES, &UNTILED_IDR]));
        assert!(matches!(
            filter.filter(input),
            Err(FilterError::InvalidData("slice_segment_address"))
        ));
    }

    #[test]
    fn pass_through() {
        let mut filter = RawToTile::new(TileOptions::default()).unwrap();
        let input = Packet::new(hex!("01 02 03").to_vec());
        assert_eq!(filter.filter(input.clone()).unwrap(), Some(input));
    }
}

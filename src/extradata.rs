//! Parameter sets carried out of band, either as Annex B NAL units or as an `hvcC` record.

use crate::hvcc::{HevcDecoderConfigurationRecord, HvccError};
use crate::nal::pps::PicParameterSet;
use crate::nal::UnitType;
use crate::rbsp::{decode_nal, BitReader};
use crate::unit::{AccessUnit, Unit, UnitError};
use crate::Context;
use log::*;
use std::convert::TryFrom;

#[derive(Debug)]
pub enum ExtradataError {
    Empty,
    AnnexB(UnitError),
    Hvcc(HvccError),
    NoPicParameterSet,
}
impl From<UnitError> for ExtradataError {
    fn from(e: UnitError) -> Self {
        ExtradataError::AnnexB(e)
    }
}
impl From<HvccError> for ExtradataError {
    fn from(e: HvccError) -> Self {
        ExtradataError::Hvcc(e)
    }
}

/// The tile grid of a picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileCount {
    pub rows: u32,
    pub columns: u32,
}
impl TileCount {
    pub fn num_tiles(&self) -> usize {
        (self.rows * self.columns) as usize
    }
}

/// The parameter sets found in extradata.
pub struct ParameterSets {
    pub ctx: Context,
    /// The first PPS in the order the extradata lists them, which a later PPS with the same id
    /// may have replaced in `ctx`.
    first_pps: Option<PicParameterSet>,
}
impl ParameterSets {
    pub fn first_pps(&self) -> Option<&PicParameterSet> {
        self.first_pps.as_ref()
    }
}

/// Parses extradata, telling an `hvcC` record from Annex B data by its leading
/// `configurationVersion` byte.
pub fn parse(data: &[u8]) -> Result<ParameterSets, ExtradataError> {
    match data.first() {
        None => Err(ExtradataError::Empty),
        Some(1) => {
            let hvcc = HevcDecoderConfigurationRecord::try_from(data)?;
            let ctx = hvcc.create_context()?;
            let first_pps = match hvcc.units_of_type(UnitType::PpsNut).next() {
                Some(nal) => {
                    let rbsp = decode_nal(nal).map_err(HvccError::Rbsp)?;
                    let pps = PicParameterSet::from_bits(&ctx, BitReader::new(&rbsp))
                        .map_err(HvccError::Pps)?;
                    Some(pps)
                }
                None => None,
            };
            Ok(ParameterSets { ctx, first_pps })
        }
        Some(_) => {
            let mut ctx = Context::default();
            let au = AccessUnit::parse(&mut ctx, data)?;
            let first_pps = au.units.iter().find_map(|u| match u {
                Unit::Pps(pps) => Some(pps.clone()),
                _ => None,
            });
            Ok(ParameterSets { ctx, first_pps })
        }
    }
}

/// Returns the tile grid of the first PPS of `data`; a PPS without tiles is a single tile.
pub fn extract_tiles(data: &[u8]) -> Result<TileCount, ExtradataError> {
    let sets = parse(data)?;
    let pps = sets.first_pps().ok_or(ExtradataError::NoPicParameterSet)?;
    let count = TileCount {
        rows: pps.num_tile_rows(),
        columns: pps.num_tile_columns(),
    };
    debug!(
        "extradata pps {}: {} tile columns, {} tile rows",
        pps.id().id(),
        count.columns,
        count.rows
    );
    Ok(count)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hvcc::test::record;
    use crate::nal::pps::test::{PPS_2X1, PPS_NO_TILES};
    use crate::nal::sps::test::SPS_1080P;
    use crate::nal::vps::test::VPS;
    use crate::unit::test::annexb;

    #[test]
    fn annexb_parameter_sets() {
        let data = annexb(&[&VPS, &SPS_1080P, &PPS_2X1]);
        assert_eq!(
            extract_tiles(&data).unwrap(),
            TileCount {
                rows: 1,
                columns: 2
            }
        );
    }

    #[test]
    fn hvcc_parameter_sets() {
        let data = record(&[&[&VPS], &[&SPS_1080P], &[&PPS_2X1]]);
        let count = extract_tiles(&data).unwrap();
        assert_eq!(count.columns, 2);
        assert_eq!(count.num_tiles(), 2);
    }

    #[test]
    fn untiled() {
        let data = annexb(&[&VPS, &SPS_1080P, &PPS_NO_TILES]);
        assert_eq!(
            extract_tiles(&data).unwrap(),
            TileCount {
                rows: 1,
                columns: 1
            }
        );
    }

    #[test]
    fn first_of_two_pps_with_one_id() {
        let data = annexb(&[&VPS, &SPS_1080P, &PPS_2X1, &PPS_NO_TILES]);
        assert_eq!(
            extract_tiles(&data).unwrap(),
            TileCount {
                rows: 1,
                columns: 2
            }
        );
        let data = record(&[&[&VPS], &[&SPS_1080P], &[&PPS_NO_TILES, &PPS_2X1]]);
        assert_eq!(extract_tiles(&data).unwrap().num_tiles(), 1);
    }

    #[test]
    fn no_pps() {
        let data = annexb(&[&VPS, &SPS_1080P]);
        assert!(matches!(
            extract_tiles(&data),
            Err(ExtradataError::NoPicParameterSet)
        ));
        let data = record(&[&[&VPS], &[&SPS_1080P]]);
        assert!(matches!(
            extract_tiles(&data),
            Err(ExtradataError::NoPicParameterSet)
        ));
    }

    #[test]
    fn garbage() {
        assert!(matches!(extract_tiles(&[]), Err(ExtradataError::Empty)));
        assert!(matches!(
            extract_tiles(&[0x42, 0x42]),
            Err(ExtradataError::AnnexB(_))
        ));
    }
}

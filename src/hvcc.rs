//! Support for handling _HEVC Decoder Configuration_ data (the `hvcC` box), used in the _ISO Base
//! Media File Format_ (AKA MP4), as specified in _ISO/IEC 14496-15_.

use crate::nal::pps::{PicParameterSet, PpsError};
use crate::nal::sps::{SeqParameterSet, SpsError};
use crate::nal::vps::{VideoParamSet, VpsError};
use crate::nal::{NalHeaderError, RefNal, UnitType};
use crate::rbsp::{BitReader, BitReaderError};
use crate::Context;
use std::convert::TryFrom;

#[derive(Debug)]
pub enum HvccError {
    NotEnoughData {
        expected: usize,
        actual: usize,
    },
    /// The HEVCDecoderConfigurationRecord used a version number other than `1`.
    UnsupportedConfigurationVersion(u8),
    ParamSet(ParamSetError),
    Rbsp(BitReaderError),
    Vps(VpsError),
    Sps(SpsError),
    Pps(PpsError),
}

#[derive(Debug)]
pub enum ParamSetError {
    NalHeader(NalHeaderError),
    /// A NAL unit's header disagreed with the `NAL_unit_type` of the array holding it.
    IncorrectNalType {
        expected: UnitType,
        actual: UnitType,
    },
}

/// One of the `numOfArrays` NAL unit arrays of the record.
#[derive(Debug, Clone)]
pub struct NalArray<'buf> {
    pub array_completeness: bool,
    pub unit_type: UnitType,
    /// Each NAL unit of the array, header included and still escaped.
    pub units: Vec<&'buf [u8]>,
}

pub struct HevcDecoderConfigurationRecord<'buf> {
    data: &'buf [u8],
    arrays: Vec<NalArray<'buf>>,
}
impl<'buf> TryFrom<&'buf [u8]> for HevcDecoderConfigurationRecord<'buf> {
    type Error = HvccError;

    fn try_from(data: &'buf [u8]) -> Result<Self, Self::Error> {
        // all fixed fields must be present before any accessor is used,
        ck(data, Self::MIN_CONF_SIZE)?;
        if data[0] != 1 {
            // decoders are required to ignore records with an unknown version,
            return Err(HvccError::UnsupportedConfigurationVersion(data[0]));
        }
        let num_arrays = data[Self::MIN_CONF_SIZE - 1];
        let mut len = Self::MIN_CONF_SIZE;
        let mut arrays = Vec::with_capacity(usize::from(num_arrays));
        for _ in 0..num_arrays {
            ck(data, len + 3)?;
            let array_completeness = data[len] & 0b1000_0000 != 0;
            let id = data[len] & 0b0011_1111;
            let unit_type = UnitType::for_id(id).unwrap_or(UnitType::Unspecified(id));
            let num_nalus = u16::from_be_bytes([data[len + 1], data[len + 2]]);
            len += 3;
            let mut units = Vec::with_capacity(usize::from(num_nalus));
            for _ in 0..num_nalus {
                ck(data, len + 2)?;
                let nal_len = usize::from(u16::from_be_bytes([data[len], data[len + 1]]));
                len += 2;
                ck(data, len + nal_len)?;
                let nal = &data[len..len + nal_len];
                let header = RefNal::new(nal)
                    .map_err(|e| HvccError::ParamSet(ParamSetError::NalHeader(e)))?
                    .header();
                if header.nal_unit_type() != unit_type {
                    return Err(HvccError::ParamSet(ParamSetError::IncorrectNalType {
                        expected: unit_type,
                        actual: header.nal_unit_type(),
                    }));
                }
                units.push(nal);
                len += nal_len;
            }
            arrays.push(NalArray {
                array_completeness,
                unit_type,
                units,
            });
        }
        Ok(HevcDecoderConfigurationRecord { data, arrays })
    }
}

fn ck(data: &[u8], len: usize) -> Result<(), HvccError> {
    if data.len() < len {
        Err(HvccError::NotEnoughData {
            expected: len,
            actual: data.len(),
        })
    } else {
        Ok(())
    }
}

impl<'buf> HevcDecoderConfigurationRecord<'buf> {
    const MIN_CONF_SIZE: usize = 23;

    pub fn configuration_version(&self) -> u8 {
        self.data[0]
    }
    pub fn general_profile_space(&self) -> u8 {
        self.data[1] >> 6
    }
    pub fn general_tier_flag(&self) -> bool {
        self.data[1] & 0b0010_0000 != 0
    }
    pub fn general_profile_idc(&self) -> u8 {
        self.data[1] & 0b0001_1111
    }
    pub fn general_profile_compatibility_flags(&self) -> u32 {
        u32::from_be_bytes([self.data[2], self.data[3], self.data[4], self.data[5]])
    }
    pub fn general_level_idc(&self) -> u8 {
        self.data[12]
    }
    pub fn min_spatial_segmentation_idc(&self) -> u16 {
        u16::from_be_bytes([self.data[13], self.data[14]]) & 0x0fff
    }
    /// 0 mixed or unknown, 1 slice based, 2 tile based, 3 wavefront based parallel decoding.
    pub fn parallelism_type(&self) -> u8 {
        self.data[15] & 0b0000_0011
    }
    pub fn chroma_format_idc(&self) -> u8 {
        self.data[16] & 0b0000_0011
    }
    pub fn bit_depth_luma_minus8(&self) -> u8 {
        self.data[17] & 0b0000_0111
    }
    pub fn bit_depth_chroma_minus8(&self) -> u8 {
        self.data[18] & 0b0000_0111
    }
    pub fn avg_frame_rate(&self) -> u16 {
        u16::from_be_bytes([self.data[19], self.data[20]])
    }
    pub fn num_temporal_layers(&self) -> u8 {
        (self.data[21] >> 3) & 0b0000_0111
    }
    /// Number of bytes used to specify the length of each NAL unit
    /// 0 => 1 byte, 1 => 2 bytes, 3 => 4 bytes
    pub fn length_size_minus_one(&self) -> u8 {
        self.data[21] & 0b0000_0011
    }
    pub fn arrays(&self) -> &[NalArray<'buf>] {
        &self.arrays
    }

    /// All NAL units of the given type, in record order.
    pub fn units_of_type(&self, unit_type: UnitType) -> impl Iterator<Item = &'buf [u8]> + '_ {
        self.arrays
            .iter()
            .filter(move |a| a.unit_type == unit_type)
            .flat_map(|a| a.units.iter().copied())
    }

    /// Creates an H265 parser context holding the parameter sets of this record.
    ///
    /// The VPS, SPS and PPS arrays are processed in that order, whatever order the record lists
    /// them in.
    pub fn create_context(&self) -> Result<Context, HvccError> {
        let mut ctx = Context::default();
        for nal in self.units_of_type(UnitType::VpsNut) {
            let rbsp = rbsp(nal)?;
            let vps = VideoParamSet::from_bits(BitReader::new(&rbsp)).map_err(HvccError::Vps)?;
            ctx.put_video_param_set(vps);
        }
        for nal in self.units_of_type(UnitType::SpsNut) {
            let rbsp = rbsp(nal)?;
            let sps = SeqParameterSet::from_bits(BitReader::new(&rbsp)).map_err(HvccError::Sps)?;
            ctx.put_seq_param_set(sps);
        }
        for nal in self.units_of_type(UnitType::PpsNut) {
            let rbsp = rbsp(nal)?;
            let pps =
                PicParameterSet::from_bits(&ctx, BitReader::new(&rbsp)).map_err(HvccError::Pps)?;
            ctx.put_pic_param_set(pps);
        }
        Ok(ctx)
    }
}

fn rbsp(nal: &[u8]) -> Result<std::borrow::Cow<'_, [u8]>, HvccError> {
    RefNal::new(nal)
        .map_err(|e| HvccError::ParamSet(ParamSetError::NalHeader(e)))?
        .rbsp()
        .map_err(HvccError::Rbsp)
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::nal::pps::test::PPS_2X1;
    use crate::nal::pps::PicParamSetId;
    use crate::nal::sps::test::SPS_1080P;
    use crate::nal::sps::SeqParamSetId;
    use crate::nal::vps::test::VPS;
    use hex_literal::*;

    /// An `hvcC` record carrying the given arrays of NAL units, each tagged with the type found
    /// in its first unit's header.
    pub(crate) fn record(arrays: &[&[&[u8]]]) -> Vec<u8> {
        let mut data = hex!("01 01 60000000 900000000000 5d f000 fc fd f8 f8 0000 0f").to_vec();
        data.push(arrays.len() as u8);
        for units in arrays {
            data.push(0b1000_0000 | (units[0][0] >> 1));
            data.extend_from_slice(&(units.len() as u16).to_be_bytes());
            for unit in *units {
                data.extend_from_slice(&(unit.len() as u16).to_be_bytes());
                data.extend_from_slice(unit);
            }
        }
        data
    }

    #[test]
    fn it_works() {
        let data = record(&[&[&VPS], &[&SPS_1080P], &[&PPS_2X1]]);
        let hvcc = HevcDecoderConfigurationRecord::try_from(&data[..]).unwrap();
        assert_eq!(1, hvcc.configuration_version());
        assert_eq!(0, hvcc.general_profile_space());
        assert!(!hvcc.general_tier_flag());
        assert_eq!(1, hvcc.general_profile_idc());
        assert_eq!(0x6000_0000, hvcc.general_profile_compatibility_flags());
        assert_eq!(93, hvcc.general_level_idc());
        assert_eq!(0, hvcc.min_spatial_segmentation_idc());
        assert_eq!(0, hvcc.parallelism_type());
        assert_eq!(1, hvcc.chroma_format_idc());
        assert_eq!(0, hvcc.bit_depth_luma_minus8());
        assert_eq!(0, hvcc.bit_depth_chroma_minus8());
        assert_eq!(1, hvcc.num_temporal_layers());
        assert_eq!(3, hvcc.length_size_minus_one());
        assert_eq!(hvcc.arrays().len(), 3);
        assert!(hvcc.arrays()[2].array_completeness);
        assert_eq!(hvcc.arrays()[2].unit_type, UnitType::PpsNut);

        let ctx = hvcc.create_context().unwrap();
        assert!(ctx.vps_by_id(0).is_some());
        let sps = ctx
            .sps_by_id(SeqParamSetId::from_u32(0).unwrap())
            .expect("missing sps");
        assert_eq!(sps.pic_width_in_luma_samples, 1920);
        let pps = ctx
            .pps_by_id(PicParamSetId::from_u32(0).unwrap())
            .expect("missing pps");
        assert_eq!(pps.num_tile_columns(), 2);
    }

    #[test]
    fn arrays_out_of_order() {
        let data = record(&[&[&PPS_2X1], &[&SPS_1080P], &[&VPS]]);
        let hvcc = HevcDecoderConfigurationRecord::try_from(&data[..]).unwrap();
        let ctx = hvcc.create_context().unwrap();
        assert_eq!(ctx.pps().count(), 1);
    }

    #[test]
    fn truncated() {
        let data = record(&[&[&VPS], &[&SPS_1080P]]);
        assert!(matches!(
            HevcDecoderConfigurationRecord::try_from(&data[..data.len() - 1]),
            Err(HvccError::NotEnoughData { .. })
        ));
        assert!(matches!(
            HevcDecoderConfigurationRecord::try_from(&data[..10]),
            Err(HvccError::NotEnoughData {
                expected: 23,
                actual: 10
            })
        ));
    }

    #[test]
    fn unsupported_version() {
        let mut data = record(&[]);
        data[0] = 0;
        assert!(matches!(
            HevcDecoderConfigurationRecord::try_from(&data[..]),
            Err(HvccError::UnsupportedConfigurationVersion(0))
        ));
    }

    #[test]
    fn mislabelled_array() {
        let mut data = record(&[&[&SPS_1080P]]);
        // relabel the SPS array as a PPS array
        data[23] = 0b1000_0000 | 34;
        assert!(matches!(
            HevcDecoderConfigurationRecord::try_from(&data[..]),
            Err(HvccError::ParamSet(ParamSetError::IncorrectNalType {
                expected: UnitType::PpsNut,
                actual: UnitType::SpsNut
            }))
        ));
    }
}

//! Decomposition of one Annex B access unit into decoded syntax structures.

use crate::annexb::{self, AnnexBError};
use crate::nal::pps::{PicParameterSet, PpsError};
use crate::nal::slice::{SliceHeaderError, SliceSegmentHeader};
use crate::nal::sps::{SeqParameterSet, SpsError};
use crate::nal::vps::{VideoParamSet, VpsError};
use crate::nal::{NalHeader, NalHeaderError, RefNal, UnitType};
use crate::rbsp::{BitRead, BitReader, BitReaderError};
use crate::Context;
use log::*;

#[derive(Debug)]
pub enum UnitError {
    AnnexB(AnnexBError),
    NalHeader(NalHeaderError),
    Rbsp(BitReaderError),
    Vps(VpsError),
    Sps(SpsError),
    Pps(PpsError),
    Slice(SliceHeaderError),
}
impl From<AnnexBError> for UnitError {
    fn from(e: AnnexBError) -> Self {
        UnitError::AnnexB(e)
    }
}
impl From<NalHeaderError> for UnitError {
    fn from(e: NalHeaderError) -> Self {
        UnitError::NalHeader(e)
    }
}
impl From<BitReaderError> for UnitError {
    fn from(e: BitReaderError) -> Self {
        UnitError::Rbsp(e)
    }
}
impl From<VpsError> for UnitError {
    fn from(e: VpsError) -> Self {
        UnitError::Vps(e)
    }
}
impl From<SpsError> for UnitError {
    fn from(e: SpsError) -> Self {
        UnitError::Sps(e)
    }
}
impl From<PpsError> for UnitError {
    fn from(e: PpsError) -> Self {
        UnitError::Pps(e)
    }
}
impl From<SliceHeaderError> for UnitError {
    fn from(e: SliceHeaderError) -> Self {
        UnitError::Slice(e)
    }
}

/// A slice segment: its decoded header and the slice data that follows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceUnit {
    pub nal_header: NalHeader,
    pub header: SliceSegmentHeader,
    /// The unescaped RBSP of the whole NAL unit, header excluded.
    pub rbsp: Vec<u8>,
    /// Offset of `slice_segment_data()` within `rbsp`.
    pub data_offset: usize,
}
impl SliceUnit {
    /// The byte aligned slice data, copied verbatim when the header is rewritten.
    pub fn data(&self) -> &[u8] {
        &self.rbsp[self.data_offset..]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unit {
    Vps(VideoParamSet),
    Sps(SeqParameterSet),
    Pps(PicParameterSet),
    Slice(SliceUnit),
    /// Any other NAL unit, left undecoded.
    Other(NalHeader),
}
impl Unit {
    pub fn is_slice(&self) -> bool {
        matches!(self, Unit::Slice(_))
    }
}

/// The decoded units of one access unit, in bitstream order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessUnit {
    pub units: Vec<Unit>,
}
impl AccessUnit {
    /// Parses every NAL unit of `data`, adding the parameter sets found to `ctx`.
    ///
    /// On error `ctx` is left untouched.
    pub fn parse(ctx: &mut Context, data: &[u8]) -> Result<AccessUnit, UnitError> {
        let mut staged = ctx.clone();
        let mut units = vec![];
        let mut last_independent: Option<SliceSegmentHeader> = None;
        for found in annexb::nal_units(data)? {
            let nal = RefNal::new(found.nal)?;
            let header = nal.header();
            if header.nuh_layer_id() > 0 {
                trace!("ignoring {:?} of layer {}", header.nal_unit_type(), header.nuh_layer_id());
                units.push(Unit::Other(header));
                continue;
            }
            let unit = match header.nal_unit_type() {
                UnitType::VpsNut => {
                    let vps = VideoParamSet::from_bits(BitReader::new(&nal.rbsp()?))?;
                    staged.put_video_param_set(vps.clone());
                    Unit::Vps(vps)
                }
                UnitType::SpsNut => {
                    let sps = SeqParameterSet::from_bits(BitReader::new(&nal.rbsp()?))?;
                    staged.put_seq_param_set(sps.clone());
                    Unit::Sps(sps)
                }
                UnitType::PpsNut => {
                    let pps = PicParameterSet::from_bits(&staged, BitReader::new(&nal.rbsp()?))?;
                    staged.put_pic_param_set(pps.clone());
                    Unit::Pps(pps)
                }
                t if t.is_vcl() && !matches!(t, UnitType::ReservedVcl(_) | UnitType::ReservedIrap(_)) => {
                    let rbsp = nal.rbsp()?.into_owned();
                    let mut r = BitReader::new(&rbsp);
                    let slice = SliceSegmentHeader::from_bits(
                        &staged,
                        &mut r,
                        header,
                        last_independent.as_ref(),
                    )?;
                    let data_offset = (r.position() / 8) as usize;
                    if !slice.dependent_slice_segment_flag {
                        last_independent = Some(slice.clone());
                    }
                    Unit::Slice(SliceUnit {
                        nal_header: header,
                        header: slice,
                        rbsp,
                        data_offset,
                    })
                }
                _ => Unit::Other(header),
            };
            units.push(unit);
        }
        *ctx = staged;
        Ok(AccessUnit { units })
    }

    pub fn num_slices(&self) -> usize {
        self.units.iter().filter(|u| u.is_slice()).count()
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::nal::pps::test::PPS_2X1;
    use crate::nal::slice::test::{IDR_TILE0, IDR_TILE1};
    use crate::nal::sps::test::SPS_1080P;
    use crate::nal::vps::test::VPS;

    /// Annex B framing of the given NAL units, each with a four byte start code.
    pub(crate) fn annexb(nals: &[&[u8]]) -> Vec<u8> {
        let mut out = vec![];
        for nal in nals {
            out.extend_from_slice(&[0, 0, 0, 1]);
            out.extend_from_slice(nal);
        }
        out
    }

    /// An IDR access unit of a 1920x1088 picture coded as two tiles side by side.
    pub(crate) fn tiled_idr() -> Vec<u8> {
        annexb(&[&VPS, &SPS_1080P, &PPS_2X1, &IDR_TILE0, &IDR_TILE1])
    }

    #[test]
    fn parse_tiled_idr() {
        let mut ctx = Context::default();
        let au = AccessUnit::parse(&mut ctx, &tiled_idr()).unwrap();
        assert_eq!(au.units.len(), 5);
        assert!(matches!(au.units[0], Unit::Vps(_)));
        assert!(matches!(au.units[1], Unit::Sps(_)));
        assert!(matches!(au.units[2], Unit::Pps(_)));
        assert_eq!(au.num_slices(), 2);
        match au.units[4] {
            Unit::Slice(ref slice) => {
                assert_eq!(slice.header.slice_segment_address, 15);
                assert_eq!(slice.data(), &[0xC0, 0xFF, 0xEE, 0x01]);
            }
            ref other => panic!("unexpected {:?}", other),
        }
        assert_eq!(ctx.pps().count(), 1);
        assert_eq!(ctx.vps().count(), 1);
    }

    #[test]
    fn other_units_kept_undecoded() {
        let mut ctx = Context::default();
        // an access unit delimiter
        let au = AccessUnit::parse(&mut ctx, &annexb(&[&[0x46, 0x01, 0x50]])).unwrap();
        assert!(matches!(&au.units[..], [Unit::Other(h)] if h.nal_unit_type() == UnitType::AudNut));
    }

    #[test]
    fn failure_leaves_context_untouched() {
        let mut ctx = Context::default();
        // slice without its parameter sets
        let data = annexb(&[&VPS, &SPS_1080P, &IDR_TILE0]);
        assert!(matches!(
            AccessUnit::parse(&mut ctx, &data),
            Err(UnitError::Slice(SliceHeaderError::UndefinedPicParamSetId(_)))
        ));
        assert_eq!(ctx.sps().count(), 0);
        assert_eq!(ctx.vps().count(), 0);
    }

    #[test]
    fn not_annexb() {
        let mut ctx = Context::default();
        assert!(matches!(
            AccessUnit::parse(&mut ctx, &[0x12, 0x34]),
            Err(UnitError::AnnexB(AnnexBError::MissingStartCode))
        ));
    }
}

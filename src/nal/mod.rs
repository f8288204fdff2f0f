//! Types for reading and writing H265 _Network Abstraction Layer_ Units (NAL Units).
//!
//! NAL units are handed around in their escaped form (as found between Annex B start codes);
//! [`RefNal::rbsp`] removes the header and the 'emulation prevention' bytes before the
//! parameter set and slice header parsers see the data.

pub mod hrd;
pub mod pps;
pub mod ptl;
pub mod slice;
pub mod sps;
pub mod vps;

use crate::rbsp::{self, BitReaderError};
use std::borrow::Cow;
use std::fmt;

/// `nal_unit_type` values from Rec. ITU-T H.265 table 7-1.
#[derive(PartialEq, Eq, Hash, Debug, Copy, Clone)]
pub enum UnitType {
    TrailN,
    TrailR,
    TsaN,
    TsaR,
    StsaN,
    StsaR,
    RadlN,
    RadlR,
    RaslN,
    RaslR,
    /// `RSV_VCL_N10` to `RSV_VCL_R15`, and `RSV_VCL24` to `RSV_VCL31`
    ReservedVcl(u8),
    BlaWLp,
    BlaWRadl,
    BlaNLp,
    IdrWRadl,
    IdrNLp,
    CraNut,
    /// `RSV_IRAP_VCL22` and `RSV_IRAP_VCL23`
    ReservedIrap(u8),
    VpsNut,
    SpsNut,
    PpsNut,
    AudNut,
    EosNut,
    EobNut,
    FdNut,
    PrefixSeiNut,
    SuffixSeiNut,
    /// `RSV_NVCL41` to `RSV_NVCL47`
    ReservedNonVcl(u8),
    /// The values `48`-`63` are unspecified
    Unspecified(u8),
}
impl UnitType {
    pub fn for_id(id: u8) -> Result<UnitType, UnitTypeError> {
        let t = match id {
            0 => UnitType::TrailN,
            1 => UnitType::TrailR,
            2 => UnitType::TsaN,
            3 => UnitType::TsaR,
            4 => UnitType::StsaN,
            5 => UnitType::StsaR,
            6 => UnitType::RadlN,
            7 => UnitType::RadlR,
            8 => UnitType::RaslN,
            9 => UnitType::RaslR,
            10..=15 => UnitType::ReservedVcl(id),
            16 => UnitType::BlaWLp,
            17 => UnitType::BlaWRadl,
            18 => UnitType::BlaNLp,
            19 => UnitType::IdrWRadl,
            20 => UnitType::IdrNLp,
            21 => UnitType::CraNut,
            22..=23 => UnitType::ReservedIrap(id),
            24..=31 => UnitType::ReservedVcl(id),
            32 => UnitType::VpsNut,
            33 => UnitType::SpsNut,
            34 => UnitType::PpsNut,
            35 => UnitType::AudNut,
            36 => UnitType::EosNut,
            37 => UnitType::EobNut,
            38 => UnitType::FdNut,
            39 => UnitType::PrefixSeiNut,
            40 => UnitType::SuffixSeiNut,
            41..=47 => UnitType::ReservedNonVcl(id),
            48..=63 => UnitType::Unspecified(id),
            _ => return Err(UnitTypeError::ValueOutOfRange(id)),
        };
        Ok(t)
    }

    pub fn id(self) -> u8 {
        match self {
            UnitType::TrailN => 0,
            UnitType::TrailR => 1,
            UnitType::TsaN => 2,
            UnitType::TsaR => 3,
            UnitType::StsaN => 4,
            UnitType::StsaR => 5,
            UnitType::RadlN => 6,
            UnitType::RadlR => 7,
            UnitType::RaslN => 8,
            UnitType::RaslR => 9,
            UnitType::ReservedVcl(v) => v,
            UnitType::BlaWLp => 16,
            UnitType::BlaWRadl => 17,
            UnitType::BlaNLp => 18,
            UnitType::IdrWRadl => 19,
            UnitType::IdrNLp => 20,
            UnitType::CraNut => 21,
            UnitType::ReservedIrap(v) => v,
            UnitType::VpsNut => 32,
            UnitType::SpsNut => 33,
            UnitType::PpsNut => 34,
            UnitType::AudNut => 35,
            UnitType::EosNut => 36,
            UnitType::EobNut => 37,
            UnitType::FdNut => 38,
            UnitType::PrefixSeiNut => 39,
            UnitType::SuffixSeiNut => 40,
            UnitType::ReservedNonVcl(v) => v,
            UnitType::Unspecified(v) => v,
        }
    }

    /// Video coding layer units, which carry slice segments (types `0`-`31`).
    pub fn is_vcl(self) -> bool {
        match self {
            UnitType::TrailN
            | UnitType::TrailR
            | UnitType::TsaN
            | UnitType::TsaR
            | UnitType::StsaN
            | UnitType::StsaR
            | UnitType::RadlN
            | UnitType::RadlR
            | UnitType::RaslN
            | UnitType::RaslR
            | UnitType::ReservedVcl(_)
            | UnitType::BlaWLp
            | UnitType::BlaWRadl
            | UnitType::BlaNLp
            | UnitType::IdrWRadl
            | UnitType::IdrNLp
            | UnitType::CraNut
            | UnitType::ReservedIrap(_) => true,
            UnitType::VpsNut
            | UnitType::SpsNut
            | UnitType::PpsNut
            | UnitType::AudNut
            | UnitType::EosNut
            | UnitType::EobNut
            | UnitType::FdNut
            | UnitType::PrefixSeiNut
            | UnitType::SuffixSeiNut
            | UnitType::ReservedNonVcl(_)
            | UnitType::Unspecified(_) => false,
        }
    }

    /// Intra random access point pictures (types `16`-`23`), whose slice headers carry
    /// `no_output_of_prior_pics_flag`.
    pub fn is_irap(self) -> bool {
        matches!(
            self,
            UnitType::BlaWLp
                | UnitType::BlaWRadl
                | UnitType::BlaNLp
                | UnitType::IdrWRadl
                | UnitType::IdrNLp
                | UnitType::CraNut
                | UnitType::ReservedIrap(_)
        )
    }

    pub fn is_idr(self) -> bool {
        matches!(self, UnitType::IdrWRadl | UnitType::IdrNLp)
    }
}

#[derive(Debug)]
pub enum UnitTypeError {
    /// if the value was outside the range `0` - `63`.
    ValueOutOfRange(u8),
}

/// The two byte H265 NAL unit header.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct NalHeader(u16);

#[derive(Debug)]
pub enum NalHeaderError {
    /// The most significant bit of the header, called `forbidden_zero_bit`, was set to 1.
    ForbiddenZeroBit,
    /// `nuh_temporal_id_plus1` must not be zero.
    ZeroTemporalIdPlus1,
    /// Less than two bytes were available.
    Truncated,
}
impl NalHeader {
    pub fn new(header_value: u16) -> Result<NalHeader, NalHeaderError> {
        if header_value & 0x8000 != 0 {
            Err(NalHeaderError::ForbiddenZeroBit)
        } else if header_value & 0b111 == 0 {
            Err(NalHeaderError::ZeroTemporalIdPlus1)
        } else {
            Ok(NalHeader(header_value))
        }
    }

    pub fn from_bytes(data: &[u8]) -> Result<NalHeader, NalHeaderError> {
        match data {
            [a, b, ..] => NalHeader::new(u16::from(*a) << 8 | u16::from(*b)),
            _ => Err(NalHeaderError::Truncated),
        }
    }

    pub fn nal_unit_type(self) -> UnitType {
        let id = ((self.0 >> 9) & 0b11_1111) as u8;
        // six bits can't exceed 63
        UnitType::for_id(id).unwrap_or(UnitType::Unspecified(id))
    }

    pub fn nuh_layer_id(self) -> u8 {
        ((self.0 >> 3) & 0b11_1111) as u8
    }

    pub fn temporal_id(self) -> u8 {
        (self.0 & 0b111) as u8 - 1
    }
}
impl From<NalHeader> for u16 {
    fn from(v: NalHeader) -> Self {
        v.0
    }
}
impl fmt::Debug for NalHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("NalHeader")
            .field("nal_unit_type", &self.nal_unit_type())
            .field("nuh_layer_id", &self.nuh_layer_id())
            .field("temporal_id", &self.temporal_id())
            .finish()
    }
}

/// A complete NAL unit borrowed from a larger buffer, still carrying its header and any
/// emulation prevention bytes.
#[derive(Copy, Clone, Debug)]
pub struct RefNal<'buf> {
    header: NalHeader,
    data: &'buf [u8],
}
impl<'buf> RefNal<'buf> {
    pub fn new(data: &'buf [u8]) -> Result<Self, NalHeaderError> {
        Ok(RefNal {
            header: NalHeader::from_bytes(data)?,
            data,
        })
    }

    pub fn header(&self) -> NalHeader {
        self.header
    }

    /// The escaped bytes of this NAL unit, header included.
    pub fn data(&self) -> &'buf [u8] {
        self.data
    }

    /// The RBSP of this NAL unit, without header or emulation prevention bytes.
    pub fn rbsp(&self) -> Result<Cow<'buf, [u8]>, BitReaderError> {
        rbsp::decode_nal(self.data)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use hex_literal::hex;
    use test_case::test_case;

    #[test]
    fn unit_type_ids() {
        for id in 0..64 {
            let t = UnitType::for_id(id).unwrap();
            assert_eq!(t.id(), id);
            assert_eq!(t.is_vcl(), id < 32, "{:?}", t);
            assert_eq!(t.is_irap(), (16..=23).contains(&id), "{:?}", t);
        }
        assert!(matches!(
            UnitType::for_id(64),
            Err(UnitTypeError::ValueOutOfRange(64))
        ));
    }

    #[test_case(&hex!("40 01"), UnitType::VpsNut, 0; "vps")]
    #[test_case(&hex!("42 01"), UnitType::SpsNut, 0; "sps")]
    #[test_case(&hex!("26 01"), UnitType::IdrWRadl, 0; "idr")]
    #[test_case(&hex!("02 03"), UnitType::TrailR, 2; "trail with temporal id")]
    fn header(data: &[u8], unit_type: UnitType, temporal_id: u8) {
        let h = NalHeader::from_bytes(data).unwrap();
        assert_eq!(h.nal_unit_type(), unit_type);
        assert_eq!(h.temporal_id(), temporal_id);
        assert_eq!(h.nuh_layer_id(), 0);
        assert!(!format!("{:?}", h).is_empty());
    }

    #[test]
    fn bad_headers() {
        assert!(matches!(
            NalHeader::from_bytes(&hex!("C0 01")),
            Err(NalHeaderError::ForbiddenZeroBit)
        ));
        assert!(matches!(
            NalHeader::from_bytes(&hex!("40 00")),
            Err(NalHeaderError::ZeroTemporalIdPlus1)
        ));
        assert!(matches!(
            NalHeader::from_bytes(&hex!("40")),
            Err(NalHeaderError::Truncated)
        ));
    }

    #[test]
    fn ref_nal_rbsp() {
        let nal = RefNal::new(&hex!("44 01 C1 00 00 03 01 80")).unwrap();
        assert_eq!(nal.header().nal_unit_type(), UnitType::PpsNut);
        assert_eq!(&*nal.rbsp().unwrap(), &hex!("C1 00 00 01 80")[..]);
    }
}

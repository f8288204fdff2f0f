//! `profile_tier_level()` syntax, shared by the VPS and SPS.

use crate::rbsp::{BitRead, BitReaderError, BitWriter, WriteError};
use std::io::Write;

/// The 88 bits describing a profile, present for the general layer and optionally per
/// sub-layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileInfo {
    pub profile_space: u8,
    pub tier_flag: bool,
    pub profile_idc: u8,
    pub profile_compatibility_flags: u32,
    pub progressive_source_flag: bool,
    pub interlaced_source_flag: bool,
    pub non_packed_constraint_flag: bool,
    pub frame_only_constraint_flag: bool,
    /// Profile specific constraint flags (`general_max_12bit_constraint_flag` and friends for
    /// the range extension profiles), zero otherwise.
    pub constraint_flags_43bits: u64,
    /// `general_inbld_flag` or its reserved counterpart.
    pub inbld_flag: bool,
}
impl ProfileInfo {
    fn read<R: BitRead>(r: &mut R) -> Result<ProfileInfo, BitReaderError> {
        Ok(ProfileInfo {
            profile_space: r.read_u8(2, "profile_space")?,
            tier_flag: r.read_bool("tier_flag")?,
            profile_idc: r.read_u8(5, "profile_idc")?,
            profile_compatibility_flags: r.read_u32(32, "profile_compatibility_flag")?,
            progressive_source_flag: r.read_bool("progressive_source_flag")?,
            interlaced_source_flag: r.read_bool("interlaced_source_flag")?,
            non_packed_constraint_flag: r.read_bool("non_packed_constraint_flag")?,
            frame_only_constraint_flag: r.read_bool("frame_only_constraint_flag")?,
            constraint_flags_43bits: {
                let hi = u64::from(r.read_u32(11, "reserved_zero_43bits")?);
                let lo = u64::from(r.read_u32(32, "reserved_zero_43bits")?);
                hi << 32 | lo
            },
            inbld_flag: r.read_bool("inbld_flag")?,
        })
    }

    fn write<W: Write>(&self, w: &mut BitWriter<W>) -> Result<(), WriteError> {
        w.write_bits(2, u32::from(self.profile_space))?;
        w.write_bit(self.tier_flag)?;
        w.write_bits(5, u32::from(self.profile_idc))?;
        w.write_bits(32, self.profile_compatibility_flags)?;
        w.write_bit(self.progressive_source_flag)?;
        w.write_bit(self.interlaced_source_flag)?;
        w.write_bit(self.non_packed_constraint_flag)?;
        w.write_bit(self.frame_only_constraint_flag)?;
        w.write_bits(11, (self.constraint_flags_43bits >> 32) as u32)?;
        w.write_bits(32, self.constraint_flags_43bits as u32)?;
        w.write_bit(self.inbld_flag)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubLayerInfo {
    pub profile: Option<ProfileInfo>,
    pub level_idc: Option<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileTierLevel {
    pub general_profile: ProfileInfo,
    pub general_level_idc: u8,
    /// One entry per sub-layer below the highest (`max_sub_layers_minus1` entries).
    pub sub_layers: Vec<SubLayerInfo>,
}
impl ProfileTierLevel {
    pub fn read<R: BitRead>(
        r: &mut R,
        max_sub_layers_minus1: u8,
    ) -> Result<ProfileTierLevel, BitReaderError> {
        let general_profile = ProfileInfo::read(r)?;
        let general_level_idc = r.read_u8(8, "general_level_idc")?;
        let mut present = Vec::with_capacity(usize::from(max_sub_layers_minus1));
        for _ in 0..max_sub_layers_minus1 {
            let profile_present = r.read_bool("sub_layer_profile_present_flag")?;
            let level_present = r.read_bool("sub_layer_level_present_flag")?;
            present.push((profile_present, level_present));
        }
        if max_sub_layers_minus1 > 0 {
            for _ in max_sub_layers_minus1..8 {
                r.skip(2, "reserved_zero_2bits")?;
            }
        }
        let mut sub_layers = Vec::with_capacity(present.len());
        for (profile_present, level_present) in present {
            let profile = if profile_present {
                Some(ProfileInfo::read(r)?)
            } else {
                None
            };
            let level_idc = if level_present {
                Some(r.read_u8(8, "sub_layer_level_idc")?)
            } else {
                None
            };
            sub_layers.push(SubLayerInfo { profile, level_idc });
        }
        Ok(ProfileTierLevel {
            general_profile,
            general_level_idc,
            sub_layers,
        })
    }

    pub fn write<W: Write>(&self, w: &mut BitWriter<W>) -> Result<(), WriteError> {
        self.general_profile.write(w)?;
        w.write_bits(8, u32::from(self.general_level_idc))?;
        for sub_layer in &self.sub_layers {
            w.write_bit(sub_layer.profile.is_some())?;
            w.write_bit(sub_layer.level_idc.is_some())?;
        }
        if !self.sub_layers.is_empty() {
            for _ in self.sub_layers.len()..8 {
                w.write_bits(2, 0)?;
            }
        }
        for sub_layer in &self.sub_layers {
            if let Some(ref profile) = sub_layer.profile {
                profile.write(w)?;
            }
            if let Some(level_idc) = sub_layer.level_idc {
                w.write_bits(8, u32::from(level_idc))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::rbsp::{unescape, BitReader};
    use hex_literal::hex;

    #[test]
    fn main_profile_level_4_1() {
        // general_profile_idc=1, compatibility flags 1 and 2, progressive + frame only,
        // level_idc=123
        let data = hex!("01 60 00 00 00 90 00 00 00 00 00 7B");
        let mut r = BitReader::new(&data[..]);
        let ptl = ProfileTierLevel::read(&mut r, 0).unwrap();
        assert_eq!(ptl.general_profile.profile_idc, 1);
        assert_eq!(ptl.general_profile.profile_compatibility_flags, 0x6000_0000);
        assert!(ptl.general_profile.progressive_source_flag);
        assert!(!ptl.general_profile.interlaced_source_flag);
        assert!(ptl.general_profile.frame_only_constraint_flag);
        assert_eq!(ptl.general_level_idc, 123);
        assert_eq!(r.position(), 96);

        let mut w = BitWriter::new(Vec::new());
        ptl.write(&mut w).unwrap();
        assert_eq!(
            w.into_inner(),
            hex!("01 60 00 00 03 00 90 00 00 03 00 00 03 00 7B")
        );
    }

    #[test]
    fn sub_layers_round_trip() {
        let ptl = ProfileTierLevel {
            general_profile: ProfileInfo {
                profile_idc: 4,
                profile_compatibility_flags: 1 << 27,
                constraint_flags_43bits: 0b1_0110_0000 << 34,
                ..Default::default()
            },
            general_level_idc: 93,
            sub_layers: vec![
                SubLayerInfo {
                    profile: None,
                    level_idc: Some(90),
                },
                SubLayerInfo {
                    profile: Some(ProfileInfo {
                        profile_idc: 1,
                        ..Default::default()
                    }),
                    level_idc: None,
                },
            ],
        };
        let mut w = BitWriter::new(Vec::new());
        ptl.write(&mut w).unwrap();
        w.write_rbsp_trailing_bits().unwrap();
        let escaped = w.into_inner();
        let data = unescape(&escaped);
        let mut r = BitReader::new(&data);
        assert_eq!(ProfileTierLevel::read(&mut r, 2).unwrap(), ptl);
        r.finish_rbsp().unwrap();
    }
}

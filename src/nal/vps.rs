use super::hrd::HrdParameters;
use super::ptl::ProfileTierLevel;
use crate::rbsp::{BitRead, BitReaderError, BitWriter, WriteError};
use std::io::Write;

#[derive(Debug)]
pub enum VpsError {
    RbspReaderError(BitReaderError),
    FieldValueTooLarge { name: &'static str, value: u32 },
    /// `vps_reserved_three_2bits` / `vps_reserved_0xffff_16bits` held unexpected values.
    ReservedBits,
}

impl From<BitReaderError> for VpsError {
    fn from(e: BitReaderError) -> Self {
        VpsError::RbspReaderError(e)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubLayerOrderingInfo {
    pub max_dec_pic_buffering_minus1: u32,
    pub max_num_reorder_pics: u32,
    pub max_latency_increase_plus1: u32,
}
impl SubLayerOrderingInfo {
    /// Reads the ordering info loop shared by VPS and SPS, returning one entry per sub-layer.
    /// When only the highest sub-layer is coded its values are copied to the lower ones.
    pub(crate) fn read_all<R: BitRead>(
        r: &mut R,
        present_flag: bool,
        max_sub_layers_minus1: u8,
    ) -> Result<Vec<SubLayerOrderingInfo>, BitReaderError> {
        let start = if present_flag { 0 } else { max_sub_layers_minus1 };
        let mut infos = Vec::with_capacity(usize::from(max_sub_layers_minus1) + 1);
        for _ in start..=max_sub_layers_minus1 {
            infos.push(SubLayerOrderingInfo {
                max_dec_pic_buffering_minus1: r.read_ue("max_dec_pic_buffering_minus1")?,
                max_num_reorder_pics: r.read_ue("max_num_reorder_pics")?,
                max_latency_increase_plus1: r.read_ue("max_latency_increase_plus1")?,
            });
        }
        if !present_flag {
            let highest = infos[0];
            infos = vec![highest; usize::from(max_sub_layers_minus1) + 1];
        }
        Ok(infos)
    }

    pub(crate) fn write_all<W: Write>(
        w: &mut BitWriter<W>,
        infos: &[SubLayerOrderingInfo],
        present_flag: bool,
    ) -> Result<(), WriteError> {
        let start = if present_flag {
            0
        } else {
            infos.len().saturating_sub(1)
        };
        for info in &infos[start..] {
            w.write_ue(info.max_dec_pic_buffering_minus1)?;
            w.write_ue(info.max_num_reorder_pics)?;
            w.write_ue(info.max_latency_increase_plus1)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VpsTimingInfo {
    pub num_units_in_tick: u32,
    pub time_scale: u32,
    pub num_ticks_poc_diff_one_minus1: Option<u32>,
    /// `(hrd_layer_set_idx, hrd_parameters)` pairs.
    pub hrd_parameters: Vec<(u32, HrdParameters)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoParamSet {
    pub vps_video_parameter_set_id: u8,
    pub vps_base_layer_internal_flag: bool,
    pub vps_base_layer_available_flag: bool,
    pub vps_max_layers_minus1: u8,
    pub vps_max_sub_layers_minus1: u8,
    pub vps_temporal_id_nesting_flag: bool,
    pub profile_tier_level: ProfileTierLevel,
    pub vps_sub_layer_ordering_info_present_flag: bool,
    pub sub_layer_ordering_info: Vec<SubLayerOrderingInfo>,
    pub vps_max_layer_id: u8,
    /// `layer_id_included_flag[i][j]` for layer sets `1..=vps_num_layer_sets_minus1`, each
    /// holding `vps_max_layer_id + 1` flags.
    pub layer_id_included_flags: Vec<Vec<bool>>,
    pub timing_info: Option<VpsTimingInfo>,
    pub vps_extension_flag: bool,
}
impl VideoParamSet {
    pub fn from_bits<R: BitRead>(mut r: R) -> Result<VideoParamSet, VpsError> {
        let vps_video_parameter_set_id = r.read_u8(4, "vps_video_parameter_set_id")?;
        let vps_base_layer_internal_flag = r.read_bool("vps_base_layer_internal_flag")?;
        let vps_base_layer_available_flag = r.read_bool("vps_base_layer_available_flag")?;
        let vps_max_layers_minus1 = r.read_u8(6, "vps_max_layers_minus1")?;
        let vps_max_sub_layers_minus1 = r.read_u8(3, "vps_max_sub_layers_minus1")?;
        if vps_max_sub_layers_minus1 > 6 {
            return Err(VpsError::FieldValueTooLarge {
                name: "vps_max_sub_layers_minus1",
                value: u32::from(vps_max_sub_layers_minus1),
            });
        }
        let vps_temporal_id_nesting_flag = r.read_bool("vps_temporal_id_nesting_flag")?;
        if r.read_u32(16, "vps_reserved_0xffff_16bits")? != 0xffff {
            return Err(VpsError::ReservedBits);
        }
        let profile_tier_level = ProfileTierLevel::read(&mut r, vps_max_sub_layers_minus1)?;
        let vps_sub_layer_ordering_info_present_flag =
            r.read_bool("vps_sub_layer_ordering_info_present_flag")?;
        let sub_layer_ordering_info = SubLayerOrderingInfo::read_all(
            &mut r,
            vps_sub_layer_ordering_info_present_flag,
            vps_max_sub_layers_minus1,
        )?;
        let vps_max_layer_id = r.read_u8(6, "vps_max_layer_id")?;
        let vps_num_layer_sets_minus1 = r.read_ue("vps_num_layer_sets_minus1")?;
        if vps_num_layer_sets_minus1 > 1023 {
            return Err(VpsError::FieldValueTooLarge {
                name: "vps_num_layer_sets_minus1",
                value: vps_num_layer_sets_minus1,
            });
        }
        let mut layer_id_included_flags = Vec::with_capacity(vps_num_layer_sets_minus1 as usize);
        for _ in 0..vps_num_layer_sets_minus1 {
            let flags = (0..=vps_max_layer_id)
                .map(|_| r.read_bool("layer_id_included_flag"))
                .collect::<Result<Vec<_>, _>>()?;
            layer_id_included_flags.push(flags);
        }
        let timing_info = if r.read_bool("vps_timing_info_present_flag")? {
            let num_units_in_tick = r.read_u32(32, "vps_num_units_in_tick")?;
            let time_scale = r.read_u32(32, "vps_time_scale")?;
            let num_ticks_poc_diff_one_minus1 = if r.read_bool("vps_poc_proportional_to_timing_flag")? {
                Some(r.read_ue("vps_num_ticks_poc_diff_one_minus1")?)
            } else {
                None
            };
            let vps_num_hrd_parameters = r.read_ue("vps_num_hrd_parameters")?;
            if vps_num_hrd_parameters > vps_num_layer_sets_minus1 + 1 {
                return Err(VpsError::FieldValueTooLarge {
                    name: "vps_num_hrd_parameters",
                    value: vps_num_hrd_parameters,
                });
            }
            let mut hrd_parameters: Vec<(u32, HrdParameters)> =
                Vec::with_capacity(vps_num_hrd_parameters as usize);
            for i in 0..vps_num_hrd_parameters {
                let hrd_layer_set_idx = r.read_ue("hrd_layer_set_idx")?;
                let cprms_present_flag = if i > 0 {
                    r.read_bool("cprms_present_flag")?
                } else {
                    true
                };
                let inherited = hrd_parameters.last().map(|(_, h)| &h.common);
                let hrd = HrdParameters::read(
                    &mut r,
                    cprms_present_flag,
                    vps_max_sub_layers_minus1,
                    inherited,
                )?;
                hrd_parameters.push((hrd_layer_set_idx, hrd));
            }
            Some(VpsTimingInfo {
                num_units_in_tick,
                time_scale,
                num_ticks_poc_diff_one_minus1,
                hrd_parameters,
            })
        } else {
            None
        };
        let vps_extension_flag = r.read_bool("vps_extension_flag")?;
        if !vps_extension_flag {
            r.finish_rbsp()?;
        }
        Ok(VideoParamSet {
            vps_video_parameter_set_id,
            vps_base_layer_internal_flag,
            vps_base_layer_available_flag,
            vps_max_layers_minus1,
            vps_max_sub_layers_minus1,
            vps_temporal_id_nesting_flag,
            profile_tier_level,
            vps_sub_layer_ordering_info_present_flag,
            sub_layer_ordering_info,
            vps_max_layer_id,
            layer_id_included_flags,
            timing_info,
            vps_extension_flag,
        })
    }

    pub fn id(&self) -> u8 {
        self.vps_video_parameter_set_id
    }
}

/// Writes the VPS RBSP, including its trailing bits.
pub fn write_vps<W: Write>(vps: &VideoParamSet, w: &mut BitWriter<W>) -> Result<(), WriteError> {
    if vps.vps_extension_flag {
        return Err(WriteError::Unsupported("vps_extension"));
    }
    w.write_bits(4, u32::from(vps.vps_video_parameter_set_id))?;
    w.write_bit(vps.vps_base_layer_internal_flag)?;
    w.write_bit(vps.vps_base_layer_available_flag)?;
    w.write_bits(6, u32::from(vps.vps_max_layers_minus1))?;
    w.write_bits(3, u32::from(vps.vps_max_sub_layers_minus1))?;
    w.write_bit(vps.vps_temporal_id_nesting_flag)?;
    w.write_bits(16, 0xffff)?;
    vps.profile_tier_level.write(w)?;
    w.write_bit(vps.vps_sub_layer_ordering_info_present_flag)?;
    SubLayerOrderingInfo::write_all(
        w,
        &vps.sub_layer_ordering_info,
        vps.vps_sub_layer_ordering_info_present_flag,
    )?;
    w.write_bits(6, u32::from(vps.vps_max_layer_id))?;
    w.write_ue(vps.layer_id_included_flags.len() as u32)?;
    for flags in &vps.layer_id_included_flags {
        for &flag in flags {
            w.write_bit(flag)?;
        }
    }
    w.write_bit(vps.timing_info.is_some())?;
    if let Some(ref timing) = vps.timing_info {
        w.write_bits(32, timing.num_units_in_tick)?;
        w.write_bits(32, timing.time_scale)?;
        w.write_bit(timing.num_ticks_poc_diff_one_minus1.is_some())?;
        if let Some(ticks) = timing.num_ticks_poc_diff_one_minus1 {
            w.write_ue(ticks)?;
        }
        w.write_ue(timing.hrd_parameters.len() as u32)?;
        for (i, (hrd_layer_set_idx, hrd)) in timing.hrd_parameters.iter().enumerate() {
            w.write_ue(*hrd_layer_set_idx)?;
            if i > 0 {
                w.write_bit(hrd.common_inf_present_flag)?;
            }
            hrd.write(w)?;
        }
    }
    w.write_bit(false)?;
    w.write_rbsp_trailing_bits()
}

//! `hrd_parameters()` syntax (Rec. ITU-T H.265 Annex E), carried in the VPS and in SPS VUI.

use crate::rbsp::{BitRead, BitReaderError, BitWriter, WriteError};
use std::io::Write;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubPicHrdParams {
    pub tick_divisor_minus2: u8,
    pub du_cpb_removal_delay_increment_length_minus1: u8,
    pub sub_pic_cpb_params_in_pic_timing_sei_flag: bool,
    pub dpb_output_delay_du_length_minus1: u8,
}

/// Fields common to all sub-layers; present only if either HRD type is present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HrdCommonParams {
    pub sub_pic_hrd_params: Option<SubPicHrdParams>,
    pub bit_rate_scale: u8,
    pub cpb_size_scale: u8,
    pub cpb_size_du_scale: u8,
    pub initial_cpb_removal_delay_length_minus1: u8,
    pub au_cpb_removal_delay_length_minus1: u8,
    pub dpb_output_delay_length_minus1: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HrdCommonInfo {
    pub nal_hrd_parameters_present_flag: bool,
    pub vcl_hrd_parameters_present_flag: bool,
    pub params: Option<HrdCommonParams>,
}
impl HrdCommonInfo {
    fn sub_pic_present(&self) -> bool {
        self.params
            .as_ref()
            .map_or(false, |p| p.sub_pic_hrd_params.is_some())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpbParams {
    pub bit_rate_value_minus1: u32,
    pub cpb_size_value_minus1: u32,
    pub cpb_size_du_value_minus1: u32,
    pub bit_rate_du_value_minus1: u32,
    pub cbr_flag: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubLayerHrd {
    pub fixed_pic_rate_general_flag: bool,
    pub fixed_pic_rate_within_cvs_flag: bool,
    pub elemental_duration_in_tc_minus1: u32,
    pub low_delay_hrd_flag: bool,
    pub cpb_cnt_minus1: u32,
    pub nal: Vec<CpbParams>,
    pub vcl: Vec<CpbParams>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HrdParameters {
    /// Whether the common info was coded here rather than inherited (VPS `cprms_present_flag`).
    pub common_inf_present_flag: bool,
    pub common: HrdCommonInfo,
    pub sub_layers: Vec<SubLayerHrd>,
}
impl HrdParameters {
    /// Reads `hrd_parameters(commonInfPresentFlag, maxNumSubLayersMinus1)`; when the common
    /// info is not coded it is taken from `inherited`.
    pub fn read<R: BitRead>(
        r: &mut R,
        common_inf_present_flag: bool,
        max_sub_layers_minus1: u8,
        inherited: Option<&HrdCommonInfo>,
    ) -> Result<HrdParameters, BitReaderError> {
        let common = if common_inf_present_flag {
            Self::read_common(r)?
        } else {
            inherited.copied().unwrap_or_default()
        };
        let sub_pic = common.sub_pic_present();
        let mut sub_layers = Vec::with_capacity(usize::from(max_sub_layers_minus1) + 1);
        for _ in 0..=max_sub_layers_minus1 {
            let fixed_pic_rate_general_flag = r.read_bool("fixed_pic_rate_general_flag")?;
            let fixed_pic_rate_within_cvs_flag = if fixed_pic_rate_general_flag {
                true
            } else {
                r.read_bool("fixed_pic_rate_within_cvs_flag")?
            };
            let mut elemental_duration_in_tc_minus1 = 0;
            let mut low_delay_hrd_flag = false;
            if fixed_pic_rate_within_cvs_flag {
                elemental_duration_in_tc_minus1 = r.read_ue("elemental_duration_in_tc_minus1")?;
            } else {
                low_delay_hrd_flag = r.read_bool("low_delay_hrd_flag")?;
            }
            let cpb_cnt_minus1 = if low_delay_hrd_flag {
                0
            } else {
                r.read_ue("cpb_cnt_minus1")?
            };
            if cpb_cnt_minus1 > 31 {
                return Err(BitReaderError::ExpGolombTooLarge("cpb_cnt_minus1"));
            }
            let nal = if common.nal_hrd_parameters_present_flag {
                read_sub_layer_hrd(r, cpb_cnt_minus1, sub_pic)?
            } else {
                vec![]
            };
            let vcl = if common.vcl_hrd_parameters_present_flag {
                read_sub_layer_hrd(r, cpb_cnt_minus1, sub_pic)?
            } else {
                vec![]
            };
            sub_layers.push(SubLayerHrd {
                fixed_pic_rate_general_flag,
                fixed_pic_rate_within_cvs_flag,
                elemental_duration_in_tc_minus1,
                low_delay_hrd_flag,
                cpb_cnt_minus1,
                nal,
                vcl,
            });
        }
        Ok(HrdParameters {
            common_inf_present_flag,
            common,
            sub_layers,
        })
    }

    fn read_common<R: BitRead>(r: &mut R) -> Result<HrdCommonInfo, BitReaderError> {
        let nal_hrd_parameters_present_flag = r.read_bool("nal_hrd_parameters_present_flag")?;
        let vcl_hrd_parameters_present_flag = r.read_bool("vcl_hrd_parameters_present_flag")?;
        let params = if nal_hrd_parameters_present_flag || vcl_hrd_parameters_present_flag {
            let sub_pic_hrd_params = if r.read_bool("sub_pic_hrd_params_present_flag")? {
                Some(SubPicHrdParams {
                    tick_divisor_minus2: r.read_u8(8, "tick_divisor_minus2")?,
                    du_cpb_removal_delay_increment_length_minus1: r
                        .read_u8(5, "du_cpb_removal_delay_increment_length_minus1")?,
                    sub_pic_cpb_params_in_pic_timing_sei_flag: r
                        .read_bool("sub_pic_cpb_params_in_pic_timing_sei_flag")?,
                    dpb_output_delay_du_length_minus1: r
                        .read_u8(5, "dpb_output_delay_du_length_minus1")?,
                })
            } else {
                None
            };
            let bit_rate_scale = r.read_u8(4, "bit_rate_scale")?;
            let cpb_size_scale = r.read_u8(4, "cpb_size_scale")?;
            let cpb_size_du_scale = if sub_pic_hrd_params.is_some() {
                r.read_u8(4, "cpb_size_du_scale")?
            } else {
                0
            };
            Some(HrdCommonParams {
                sub_pic_hrd_params,
                bit_rate_scale,
                cpb_size_scale,
                cpb_size_du_scale,
                initial_cpb_removal_delay_length_minus1: r
                    .read_u8(5, "initial_cpb_removal_delay_length_minus1")?,
                au_cpb_removal_delay_length_minus1: r
                    .read_u8(5, "au_cpb_removal_delay_length_minus1")?,
                dpb_output_delay_length_minus1: r.read_u8(5, "dpb_output_delay_length_minus1")?,
            })
        } else {
            None
        };
        Ok(HrdCommonInfo {
            nal_hrd_parameters_present_flag,
            vcl_hrd_parameters_present_flag,
            params,
        })
    }

    pub fn write<W: Write>(&self, w: &mut BitWriter<W>) -> Result<(), WriteError> {
        let common = &self.common;
        if self.common_inf_present_flag {
            w.write_bit(common.nal_hrd_parameters_present_flag)?;
            w.write_bit(common.vcl_hrd_parameters_present_flag)?;
            if common.nal_hrd_parameters_present_flag || common.vcl_hrd_parameters_present_flag {
                let params = common.params.unwrap_or_default();
                w.write_bit(params.sub_pic_hrd_params.is_some())?;
                if let Some(sub_pic) = params.sub_pic_hrd_params {
                    w.write_bits(8, u32::from(sub_pic.tick_divisor_minus2))?;
                    w.write_bits(5, u32::from(sub_pic.du_cpb_removal_delay_increment_length_minus1))?;
                    w.write_bit(sub_pic.sub_pic_cpb_params_in_pic_timing_sei_flag)?;
                    w.write_bits(5, u32::from(sub_pic.dpb_output_delay_du_length_minus1))?;
                }
                w.write_bits(4, u32::from(params.bit_rate_scale))?;
                w.write_bits(4, u32::from(params.cpb_size_scale))?;
                if params.sub_pic_hrd_params.is_some() {
                    w.write_bits(4, u32::from(params.cpb_size_du_scale))?;
                }
                w.write_bits(5, u32::from(params.initial_cpb_removal_delay_length_minus1))?;
                w.write_bits(5, u32::from(params.au_cpb_removal_delay_length_minus1))?;
                w.write_bits(5, u32::from(params.dpb_output_delay_length_minus1))?;
            }
        }
        let sub_pic = common.sub_pic_present();
        for sub_layer in &self.sub_layers {
            w.write_bit(sub_layer.fixed_pic_rate_general_flag)?;
            if !sub_layer.fixed_pic_rate_general_flag {
                w.write_bit(sub_layer.fixed_pic_rate_within_cvs_flag)?;
            }
            if sub_layer.fixed_pic_rate_within_cvs_flag {
                w.write_ue(sub_layer.elemental_duration_in_tc_minus1)?;
            } else {
                w.write_bit(sub_layer.low_delay_hrd_flag)?;
            }
            if !sub_layer.low_delay_hrd_flag {
                w.write_ue(sub_layer.cpb_cnt_minus1)?;
            }
            if common.nal_hrd_parameters_present_flag {
                write_sub_layer_hrd(w, &sub_layer.nal, sub_pic)?;
            }
            if common.vcl_hrd_parameters_present_flag {
                write_sub_layer_hrd(w, &sub_layer.vcl, sub_pic)?;
            }
        }
        Ok(())
    }
}

fn read_sub_layer_hrd<R: BitRead>(
    r: &mut R,
    cpb_cnt_minus1: u32,
    sub_pic: bool,
) -> Result<Vec<CpbParams>, BitReaderError> {
    (0..=cpb_cnt_minus1)
        .map(|_| {
            let bit_rate_value_minus1 = r.read_ue("bit_rate_value_minus1")?;
            let cpb_size_value_minus1 = r.read_ue("cpb_size_value_minus1")?;
            let (cpb_size_du_value_minus1, bit_rate_du_value_minus1) = if sub_pic {
                (
                    r.read_ue("cpb_size_du_value_minus1")?,
                    r.read_ue("bit_rate_du_value_minus1")?,
                )
            } else {
                (0, 0)
            };
            Ok(CpbParams {
                bit_rate_value_minus1,
                cpb_size_value_minus1,
                cpb_size_du_value_minus1,
                bit_rate_du_value_minus1,
                cbr_flag: r.read_bool("cbr_flag")?,
            })
        })
        .collect()
}

fn write_sub_layer_hrd<W: Write>(
    w: &mut BitWriter<W>,
    cpbs: &[CpbParams],
    sub_pic: bool,
) -> Result<(), WriteError> {
    for cpb in cpbs {
        w.write_ue(cpb.bit_rate_value_minus1)?;
        w.write_ue(cpb.cpb_size_value_minus1)?;
        if sub_pic {
            w.write_ue(cpb.cpb_size_du_value_minus1)?;
            w.write_ue(cpb.bit_rate_du_value_minus1)?;
        }
        w.write_bit(cpb.cbr_flag)?;
    }
    Ok(())
}

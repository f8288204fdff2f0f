//! `slice_segment_header()` parsing, and re-encoding of slice segment headers for a new picture
//! geometry or tile partitioning.

use super::pps::{self, ForceTile, PicParamSetId, PicParameterSet};
use super::sps::{self, RefPicSetError, SeqParamSetId, SeqParameterSet, ShortTermRefPicSet};
use super::{NalHeader, UnitType};
use crate::rbsp::{BitRead, BitReaderError, BitWriter, WriteError};
use crate::Context;
use std::io::Write;

#[derive(Debug)]
pub enum SliceHeaderError {
    RbspError(BitReaderError),
    InvalidSliceType(u32),
    BadPicParamSetId(pps::PicParamSetIdError),
    UndefinedPicParamSetId(PicParamSetId),
    UndefinedSeqParamSetId(SeqParamSetId),
    /// A dependent slice segment was not preceded by an independent one in the same picture.
    MissingIndependentSegment,
    FieldValueTooLarge {
        name: &'static str,
        value: u32,
    },
    RefPicSet(RefPicSetError),
    /// `alignment_bit_equal_to_one` was zero.
    MissingAlignmentBit,
    /// The header contained syntax elements that the parser isn't able to handle
    UnsupportedSyntax(&'static str),
}
impl From<BitReaderError> for SliceHeaderError {
    fn from(e: BitReaderError) -> Self {
        SliceHeaderError::RbspError(e)
    }
}
impl From<pps::PicParamSetIdError> for SliceHeaderError {
    fn from(e: pps::PicParamSetIdError) -> Self {
        SliceHeaderError::BadPicParamSetId(e)
    }
}
impl From<RefPicSetError> for SliceHeaderError {
    fn from(e: RefPicSetError) -> Self {
        SliceHeaderError::RefPicSet(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceType {
    B,
    P,
    I,
}
impl SliceType {
    fn from_id(id: u32) -> Result<SliceType, SliceHeaderError> {
        match id {
            0 => Ok(SliceType::B),
            1 => Ok(SliceType::P),
            2 => Ok(SliceType::I),
            _ => Err(SliceHeaderError::InvalidSliceType(id)),
        }
    }

    pub fn id(self) -> u32 {
        match self {
            SliceType::B => 0,
            SliceType::P => 1,
            SliceType::I => 2,
        }
    }

    fn is_inter(self) -> bool {
        self != SliceType::I
    }
}

/// The short-term reference picture set selected by a slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SliceRefPicSet {
    /// `short_term_ref_pic_set_idx` into the sets of the SPS.
    Sps(usize),
    /// A set coded in the slice header itself.
    Explicit(ShortTermRefPicSet),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LongTermPicSource {
    Sps { lt_idx_sps: u32 },
    Explicit { poc_lsb_lt: u32, used_by_curr_pic_lt_flag: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LongTermPic {
    pub source: LongTermPicSource,
    pub delta_poc_msb_cycle_lt: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LongTermRefs {
    pub num_long_term_sps: u32,
    /// `num_long_term_sps` SPS candidates followed by `num_long_term_pics` explicit ones.
    pub pics: Vec<LongTermPic>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefPicListModification {
    pub list_entry_l0: Option<Vec<u32>>,
    pub list_entry_l1: Option<Vec<u32>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LumaWeight {
    pub delta_luma_weight: i32,
    pub luma_offset: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChromaWeight {
    pub delta_chroma_weight: i32,
    pub delta_chroma_offset: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PredWeight {
    pub luma: Option<LumaWeight>,
    /// Cb then Cr; always `None` when `ChromaArrayType` is zero.
    pub chroma: Option<[ChromaWeight; 2]>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PredWeightTable {
    pub luma_log2_weight_denom: u32,
    pub delta_chroma_log2_weight_denom: Option<i32>,
    pub l0: Vec<PredWeight>,
    pub l1: Vec<PredWeight>,
}
impl PredWeightTable {
    fn read<R: BitRead>(
        r: &mut R,
        chroma: bool,
        num_l0: u32,
        num_l1: Option<u32>,
    ) -> Result<PredWeightTable, SliceHeaderError> {
        let luma_log2_weight_denom = r.read_ue("luma_log2_weight_denom")?;
        if luma_log2_weight_denom > 7 {
            return Err(SliceHeaderError::FieldValueTooLarge {
                name: "luma_log2_weight_denom",
                value: luma_log2_weight_denom,
            });
        }
        let delta_chroma_log2_weight_denom = if chroma {
            Some(r.read_se("delta_chroma_log2_weight_denom")?)
        } else {
            None
        };
        let l0 = Self::read_list(r, chroma, num_l0)?;
        let l1 = match num_l1 {
            Some(n) => Self::read_list(r, chroma, n)?,
            None => vec![],
        };
        Ok(PredWeightTable {
            luma_log2_weight_denom,
            delta_chroma_log2_weight_denom,
            l0,
            l1,
        })
    }

    fn read_list<R: BitRead>(
        r: &mut R,
        chroma: bool,
        count: u32,
    ) -> Result<Vec<PredWeight>, SliceHeaderError> {
        let luma_flags = (0..count)
            .map(|_| r.read_bool("luma_weight_flag"))
            .collect::<Result<Vec<_>, _>>()?;
        let chroma_flags = (0..count)
            .map(|_| if chroma { r.read_bool("chroma_weight_flag") } else { Ok(false) })
            .collect::<Result<Vec<_>, _>>()?;
        let mut weights = Vec::with_capacity(count as usize);
        for (luma_flag, chroma_flag) in luma_flags.into_iter().zip(chroma_flags) {
            let luma = if luma_flag {
                Some(LumaWeight {
                    delta_luma_weight: r.read_se("delta_luma_weight")?,
                    luma_offset: r.read_se("luma_offset")?,
                })
            } else {
                None
            };
            let chroma = if chroma_flag {
                let mut read_one = || -> Result<ChromaWeight, BitReaderError> {
                    Ok(ChromaWeight {
                        delta_chroma_weight: r.read_se("delta_chroma_weight")?,
                        delta_chroma_offset: r.read_se("delta_chroma_offset")?,
                    })
                };
                Some([read_one()?, read_one()?])
            } else {
                None
            };
            weights.push(PredWeight { luma, chroma });
        }
        Ok(weights)
    }

    fn write<W: Write>(&self, w: &mut BitWriter<W>, chroma: bool, b: bool) -> Result<(), WriteError> {
        w.write_ue(self.luma_log2_weight_denom)?;
        if chroma {
            w.write_se(self.delta_chroma_log2_weight_denom.unwrap_or(0))?;
        }
        Self::write_list(w, &self.l0, chroma)?;
        if b {
            Self::write_list(w, &self.l1, chroma)?;
        }
        Ok(())
    }

    fn write_list<W: Write>(
        w: &mut BitWriter<W>,
        weights: &[PredWeight],
        chroma: bool,
    ) -> Result<(), WriteError> {
        for weight in weights {
            w.write_bit(weight.luma.is_some())?;
        }
        if chroma {
            for weight in weights {
                w.write_bit(weight.chroma.is_some())?;
            }
        }
        for weight in weights {
            if let Some(luma) = weight.luma {
                w.write_se(luma.delta_luma_weight)?;
                w.write_se(luma.luma_offset)?;
            }
            if let (true, Some(pair)) = (chroma, weight.chroma) {
                for c in &pair {
                    w.write_se(c.delta_chroma_weight)?;
                    w.write_se(c.delta_chroma_offset)?;
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryPoints {
    pub offset_len_minus1: u32,
    pub entry_point_offset_minus1: Vec<u32>,
}

/// A decoded `slice_segment_header()`.
///
/// Fields that the syntax leaves out are held at their inferred values, and for dependent
/// slice segments the fields of the preceding independent segment are carried over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceSegmentHeader {
    pub first_slice_segment_in_pic_flag: bool,
    pub no_output_of_prior_pics_flag: bool,
    pub slice_pic_parameter_set_id: PicParamSetId,
    pub dependent_slice_segment_flag: bool,
    pub slice_segment_address: u32,
    /// `slice_reserved_flag` values, most significant first.
    pub slice_reserved_flags: u8,
    pub slice_type: SliceType,
    pub pic_output_flag: bool,
    pub colour_plane_id: Option<u8>,
    pub slice_pic_order_cnt_lsb: u32,
    /// `None` for IDR pictures.
    pub short_term_ref_pic_set: Option<SliceRefPicSet>,
    pub long_term_refs: Option<LongTermRefs>,
    pub slice_temporal_mvp_enabled_flag: bool,
    pub slice_sao_luma_flag: bool,
    pub slice_sao_chroma_flag: bool,
    pub num_ref_idx_active_override_flag: bool,
    pub num_ref_idx_l0_active_minus1: u32,
    pub num_ref_idx_l1_active_minus1: u32,
    pub ref_pic_list_modification: Option<RefPicListModification>,
    pub mvd_l1_zero_flag: bool,
    pub cabac_init_flag: bool,
    pub collocated_from_l0_flag: bool,
    pub collocated_ref_idx: u32,
    pub pred_weight_table: Option<PredWeightTable>,
    pub five_minus_max_num_merge_cand: u32,
    pub slice_qp_delta: i32,
    pub slice_cb_qp_offset: i32,
    pub slice_cr_qp_offset: i32,
    pub cu_chroma_qp_offset_enabled_flag: bool,
    pub deblocking_filter_override_flag: bool,
    pub slice_deblocking_filter_disabled_flag: bool,
    pub slice_beta_offset_div2: i32,
    pub slice_tc_offset_div2: i32,
    pub slice_loop_filter_across_slices_enabled_flag: bool,
    /// `None` when the PPS enables neither tiles nor entropy coding sync.
    pub entry_points: Option<EntryPoints>,
    pub slice_segment_header_extension_data: Option<Vec<u8>>,
}

impl SliceSegmentHeader {
    /// Reads the header, up to and including `byte_alignment()`, leaving `r` positioned at the
    /// first byte of `slice_segment_data()`.
    ///
    /// `previous` is the most recent independent slice segment header of the same picture,
    /// required when this segment is a dependent one.
    pub fn from_bits<R: BitRead>(
        ctx: &Context,
        r: &mut R,
        header: NalHeader,
        previous: Option<&SliceSegmentHeader>,
    ) -> Result<SliceSegmentHeader, SliceHeaderError> {
        let nal_unit_type = header.nal_unit_type();
        let first_slice_segment_in_pic_flag = r.read_bool("first_slice_segment_in_pic_flag")?;
        let no_output_of_prior_pics_flag = if nal_unit_type.is_irap() {
            r.read_bool("no_output_of_prior_pics_flag")?
        } else {
            false
        };
        let slice_pic_parameter_set_id =
            PicParamSetId::from_u32(r.read_ue("slice_pic_parameter_set_id")?)?;
        let pps = ctx
            .pps_by_id(slice_pic_parameter_set_id)
            .ok_or(SliceHeaderError::UndefinedPicParamSetId(slice_pic_parameter_set_id))?;
        let sps = ctx
            .sps_by_id(pps.seq_parameter_set_id)
            .ok_or(SliceHeaderError::UndefinedSeqParamSetId(pps.seq_parameter_set_id))?;

        let mut dependent_slice_segment_flag = false;
        let mut slice_segment_address = 0;
        if !first_slice_segment_in_pic_flag {
            if pps.dependent_slice_segments_enabled_flag {
                dependent_slice_segment_flag = r.read_bool("dependent_slice_segment_flag")?;
            }
            slice_segment_address =
                r.read_u32(ceil_log2(sps.pic_size_in_ctbs()), "slice_segment_address")?;
            if slice_segment_address >= sps.pic_size_in_ctbs() {
                return Err(SliceHeaderError::FieldValueTooLarge {
                    name: "slice_segment_address",
                    value: slice_segment_address,
                });
            }
        }

        let mut slice = if dependent_slice_segment_flag {
            previous
                .cloned()
                .ok_or(SliceHeaderError::MissingIndependentSegment)?
        } else {
            Self::read_independent(r, nal_unit_type, sps, pps)?
        };
        slice.first_slice_segment_in_pic_flag = first_slice_segment_in_pic_flag;
        slice.no_output_of_prior_pics_flag = no_output_of_prior_pics_flag;
        slice.slice_pic_parameter_set_id = slice_pic_parameter_set_id;
        slice.dependent_slice_segment_flag = dependent_slice_segment_flag;
        slice.slice_segment_address = slice_segment_address;

        slice.entry_points = if pps.tiles_enabled_flag() || pps.entropy_coding_sync_enabled_flag {
            Some(read_entry_points(r, sps)?)
        } else {
            None
        };
        slice.slice_segment_header_extension_data =
            if pps.slice_segment_header_extension_present_flag {
                let len = read_bounded(r, "slice_segment_header_extension_length", 256)?;
                Some(
                    (0..len)
                        .map(|_| r.read_u8(8, "slice_segment_header_extension_data_byte"))
                        .collect::<Result<_, _>>()?,
                )
            } else {
                None
            };
        if !r.read_bool("alignment_bit_equal_to_one")? {
            return Err(SliceHeaderError::MissingAlignmentBit);
        }
        while !r.byte_aligned() {
            r.skip(1, "alignment_bit_equal_to_zero")?;
        }
        Ok(slice)
    }

    fn read_independent<R: BitRead>(
        r: &mut R,
        nal_unit_type: UnitType,
        sps: &SeqParameterSet,
        pps: &PicParameterSet,
    ) -> Result<SliceSegmentHeader, SliceHeaderError> {
        let slice_reserved_flags = r.read_u8(
            u32::from(pps.num_extra_slice_header_bits),
            "slice_reserved_flag",
        )?;
        let slice_type = SliceType::from_id(r.read_ue("slice_type")?)?;
        let pic_output_flag = if pps.output_flag_present_flag {
            r.read_bool("pic_output_flag")?
        } else {
            true
        };
        let colour_plane_id = if sps.separate_colour_plane_flag {
            Some(r.read_u8(2, "colour_plane_id")?)
        } else {
            None
        };

        let mut slice_pic_order_cnt_lsb = 0;
        let mut short_term_ref_pic_set = None;
        let mut long_term_refs = None;
        let mut slice_temporal_mvp_enabled_flag = false;
        let mut num_pic_total_curr = 0;
        if !nal_unit_type.is_idr() {
            slice_pic_order_cnt_lsb =
                r.read_u32(sps.log2_max_pic_order_cnt_lsb(), "slice_pic_order_cnt_lsb")?;
            let num_sets = sps.short_term_ref_pic_sets.len();
            let selection = if !r.read_bool("short_term_ref_pic_set_sps_flag")? {
                SliceRefPicSet::Explicit(ShortTermRefPicSet::read(
                    r,
                    num_sets,
                    num_sets,
                    &sps.short_term_ref_pic_sets,
                )?)
            } else {
                let idx = if num_sets > 1 {
                    r.read_u32(ceil_log2(num_sets as u32), "short_term_ref_pic_set_idx")?
                } else {
                    0
                };
                if idx as usize >= num_sets {
                    return Err(SliceHeaderError::FieldValueTooLarge {
                        name: "short_term_ref_pic_set_idx",
                        value: idx,
                    });
                }
                SliceRefPicSet::Sps(idx as usize)
            };
            num_pic_total_curr += rps_for(&selection, sps).map_or(0, |s| s.num_used_by_curr_pic());
            short_term_ref_pic_set = Some(selection);
            if let Some(ref lt_sps) = sps.long_term_ref_pics {
                let refs = read_long_term_refs(r, sps, lt_sps)?;
                num_pic_total_curr += refs
                    .pics
                    .iter()
                    .filter(|p| match p.source {
                        LongTermPicSource::Sps { lt_idx_sps } => lt_sps
                            .used_by_curr_pic_lt_sps_flag
                            .get(lt_idx_sps as usize)
                            .copied()
                            .unwrap_or(false),
                        LongTermPicSource::Explicit {
                            used_by_curr_pic_lt_flag,
                            ..
                        } => used_by_curr_pic_lt_flag,
                    })
                    .count();
                long_term_refs = Some(refs);
            }
            if sps.sps_temporal_mvp_enabled_flag {
                slice_temporal_mvp_enabled_flag = r.read_bool("slice_temporal_mvp_enabled_flag")?;
            }
        }

        let (slice_sao_luma_flag, slice_sao_chroma_flag) = if sps.sample_adaptive_offset_enabled_flag
        {
            (
                r.read_bool("slice_sao_luma_flag")?,
                if sps.chroma_array_type() != 0 {
                    r.read_bool("slice_sao_chroma_flag")?
                } else {
                    false
                },
            )
        } else {
            (false, false)
        };

        let mut num_ref_idx_active_override_flag = false;
        let mut num_ref_idx_l0_active_minus1 = pps.num_ref_idx_l0_default_active_minus1;
        let mut num_ref_idx_l1_active_minus1 = pps.num_ref_idx_l1_default_active_minus1;
        let mut ref_pic_list_modification = None;
        let mut mvd_l1_zero_flag = false;
        let mut cabac_init_flag = false;
        let mut collocated_from_l0_flag = true;
        let mut collocated_ref_idx = 0;
        let mut pred_weight_table = None;
        let mut five_minus_max_num_merge_cand = 0;
        if slice_type.is_inter() {
            let b = slice_type == SliceType::B;
            num_ref_idx_active_override_flag = r.read_bool("num_ref_idx_active_override_flag")?;
            if num_ref_idx_active_override_flag {
                num_ref_idx_l0_active_minus1 = read_bounded(r, "num_ref_idx_l0_active_minus1", 14)?;
                if b {
                    num_ref_idx_l1_active_minus1 =
                        read_bounded(r, "num_ref_idx_l1_active_minus1", 14)?;
                }
            }
            if pps.lists_modification_present_flag && num_pic_total_curr > 1 {
                let entry_size = ceil_log2(num_pic_total_curr as u32);
                let mut read_list = |count: u32,
                                     name: &'static str|
                 -> Result<Option<Vec<u32>>, BitReaderError> {
                    if r.read_bool(name)? {
                        Ok(Some(
                            (0..=count)
                                .map(|_| r.read_u32(entry_size, "list_entry"))
                                .collect::<Result<_, _>>()?,
                        ))
                    } else {
                        Ok(None)
                    }
                };
                let list_entry_l0 =
                    read_list(num_ref_idx_l0_active_minus1, "ref_pic_list_modification_flag_l0")?;
                let list_entry_l1 = if b {
                    read_list(num_ref_idx_l1_active_minus1, "ref_pic_list_modification_flag_l1")?
                } else {
                    None
                };
                ref_pic_list_modification = Some(RefPicListModification {
                    list_entry_l0,
                    list_entry_l1,
                });
            }
            if b {
                mvd_l1_zero_flag = r.read_bool("mvd_l1_zero_flag")?;
            }
            if pps.cabac_init_present_flag {
                cabac_init_flag = r.read_bool("cabac_init_flag")?;
            }
            if slice_temporal_mvp_enabled_flag {
                if b {
                    collocated_from_l0_flag = r.read_bool("collocated_from_l0_flag")?;
                }
                let active = if collocated_from_l0_flag {
                    num_ref_idx_l0_active_minus1
                } else {
                    num_ref_idx_l1_active_minus1
                };
                if active > 0 {
                    collocated_ref_idx = read_bounded(r, "collocated_ref_idx", active)?;
                }
            }
            if (pps.weighted_pred_flag && slice_type == SliceType::P)
                || (pps.weighted_bipred_flag && b)
            {
                pred_weight_table = Some(PredWeightTable::read(
                    r,
                    sps.chroma_array_type() != 0,
                    num_ref_idx_l0_active_minus1 + 1,
                    if b {
                        Some(num_ref_idx_l1_active_minus1 + 1)
                    } else {
                        None
                    },
                )?);
            }
            five_minus_max_num_merge_cand = read_bounded(r, "five_minus_max_num_merge_cand", 4)?;
        }

        let slice_qp_delta = r.read_se("slice_qp_delta")?;
        let (slice_cb_qp_offset, slice_cr_qp_offset) =
            if pps.pps_slice_chroma_qp_offsets_present_flag {
                (
                    r.read_se("slice_cb_qp_offset")?,
                    r.read_se("slice_cr_qp_offset")?,
                )
            } else {
                (0, 0)
            };
        let cu_chroma_qp_offset_enabled_flag = if pps.chroma_qp_offset_list_enabled_flag() {
            r.read_bool("cu_chroma_qp_offset_enabled_flag")?
        } else {
            false
        };
        let deblocking_filter_override_flag = if pps.deblocking_filter_override_enabled_flag() {
            r.read_bool("deblocking_filter_override_flag")?
        } else {
            false
        };
        let pps_deblocking = pps.deblocking_filter_control.unwrap_or_default();
        let mut slice_deblocking_filter_disabled_flag =
            pps_deblocking.pps_deblocking_filter_disabled_flag;
        let mut slice_beta_offset_div2 = pps_deblocking.pps_beta_offset_div2;
        let mut slice_tc_offset_div2 = pps_deblocking.pps_tc_offset_div2;
        if deblocking_filter_override_flag {
            slice_deblocking_filter_disabled_flag =
                r.read_bool("slice_deblocking_filter_disabled_flag")?;
            if !slice_deblocking_filter_disabled_flag {
                slice_beta_offset_div2 = r.read_se("slice_beta_offset_div2")?;
                slice_tc_offset_div2 = r.read_se("slice_tc_offset_div2")?;
            }
        }
        let slice_loop_filter_across_slices_enabled_flag =
            if pps.pps_loop_filter_across_slices_enabled_flag
                && (slice_sao_luma_flag
                    || slice_sao_chroma_flag
                    || !slice_deblocking_filter_disabled_flag)
            {
                r.read_bool("slice_loop_filter_across_slices_enabled_flag")?
            } else {
                pps.pps_loop_filter_across_slices_enabled_flag
            };

        Ok(SliceSegmentHeader {
            first_slice_segment_in_pic_flag: false,
            no_output_of_prior_pics_flag: false,
            slice_pic_parameter_set_id: pps.pic_parameter_set_id,
            dependent_slice_segment_flag: false,
            slice_segment_address: 0,
            slice_reserved_flags,
            slice_type,
            pic_output_flag,
            colour_plane_id,
            slice_pic_order_cnt_lsb,
            short_term_ref_pic_set,
            long_term_refs,
            slice_temporal_mvp_enabled_flag,
            slice_sao_luma_flag,
            slice_sao_chroma_flag,
            num_ref_idx_active_override_flag,
            num_ref_idx_l0_active_minus1,
            num_ref_idx_l1_active_minus1,
            ref_pic_list_modification,
            mvd_l1_zero_flag,
            cabac_init_flag,
            collocated_from_l0_flag,
            collocated_ref_idx,
            pred_weight_table,
            five_minus_max_num_merge_cand,
            slice_qp_delta,
            slice_cb_qp_offset,
            slice_cr_qp_offset,
            cu_chroma_qp_offset_enabled_flag,
            deblocking_filter_override_flag,
            slice_deblocking_filter_disabled_flag,
            slice_beta_offset_div2,
            slice_tc_offset_div2,
            slice_loop_filter_across_slices_enabled_flag,
            entry_points: None,
            slice_segment_header_extension_data: None,
        })
    }

    /// The short-term reference picture set in effect for this slice, if any.
    pub fn short_term_rps<'a>(&'a self, sps: &'a SeqParameterSet) -> Option<&'a ShortTermRefPicSet> {
        self.short_term_ref_pic_set
            .as_ref()
            .and_then(|selection| rps_for(selection, sps))
    }

    /// `NumPicTotalCurr`, counting short-term pictures only.
    fn num_pic_total_curr(&self, sps: &SeqParameterSet) -> usize {
        self.short_term_rps(sps)
            .map_or(0, |s| s.num_used_by_curr_pic())
    }
}

fn rps_for<'a>(
    selection: &'a SliceRefPicSet,
    sps: &'a SeqParameterSet,
) -> Option<&'a ShortTermRefPicSet> {
    match selection {
        SliceRefPicSet::Sps(idx) => sps.short_term_ref_pic_sets.get(*idx),
        SliceRefPicSet::Explicit(set) => Some(set),
    }
}

fn read_long_term_refs<R: BitRead>(
    r: &mut R,
    sps: &SeqParameterSet,
    lt_sps: &sps::LongTermRefPicsSps,
) -> Result<LongTermRefs, SliceHeaderError> {
    let num_long_term_ref_pics_sps = lt_sps.lt_ref_pic_poc_lsb_sps.len() as u32;
    let num_long_term_sps = if num_long_term_ref_pics_sps > 0 {
        read_bounded(r, "num_long_term_sps", num_long_term_ref_pics_sps)?
    } else {
        0
    };
    let num_long_term_pics = read_bounded(r, "num_long_term_pics", 32)?;
    let mut pics = Vec::with_capacity((num_long_term_sps + num_long_term_pics) as usize);
    for i in 0..num_long_term_sps + num_long_term_pics {
        let source = if i < num_long_term_sps {
            let lt_idx_sps = if num_long_term_ref_pics_sps > 1 {
                r.read_u32(ceil_log2(num_long_term_ref_pics_sps), "lt_idx_sps")?
            } else {
                0
            };
            LongTermPicSource::Sps { lt_idx_sps }
        } else {
            LongTermPicSource::Explicit {
                poc_lsb_lt: r.read_u32(sps.log2_max_pic_order_cnt_lsb(), "poc_lsb_lt")?,
                used_by_curr_pic_lt_flag: r.read_bool("used_by_curr_pic_lt_flag")?,
            }
        };
        let delta_poc_msb_cycle_lt = if r.read_bool("delta_poc_msb_present_flag")? {
            Some(r.read_ue("delta_poc_msb_cycle_lt")?)
        } else {
            None
        };
        pics.push(LongTermPic {
            source,
            delta_poc_msb_cycle_lt,
        });
    }
    Ok(LongTermRefs {
        num_long_term_sps,
        pics,
    })
}

fn read_entry_points<R: BitRead>(
    r: &mut R,
    sps: &SeqParameterSet,
) -> Result<EntryPoints, SliceHeaderError> {
    let num_entry_point_offsets =
        read_bounded(r, "num_entry_point_offsets", sps.pic_size_in_ctbs())?;
    if num_entry_point_offsets == 0 {
        return Ok(EntryPoints::default());
    }
    let offset_len_minus1 = read_bounded(r, "offset_len_minus1", 31)?;
    Ok(EntryPoints {
        offset_len_minus1,
        entry_point_offset_minus1: (0..num_entry_point_offsets)
            .map(|_| r.read_u32(offset_len_minus1 + 1, "entry_point_offset_minus1"))
            .collect::<Result<_, _>>()?,
    })
}

fn read_bounded<R: BitRead>(
    r: &mut R,
    name: &'static str,
    max: u32,
) -> Result<u32, SliceHeaderError> {
    let value = r.read_ue(name)?;
    if value > max {
        Err(SliceHeaderError::FieldValueTooLarge { name, value })
    } else {
        Ok(value)
    }
}

/// `Ceil(Log2(n))`, zero for `n <= 1`.
pub(crate) fn ceil_log2(n: u32) -> u32 {
    if n <= 1 {
        0
    } else {
        32 - (n - 1).leading_zeros()
    }
}

/// Where, and how, a slice segment is placed in the picture being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceTarget {
    /// Width in luma samples of the picture being written.
    pub width: u32,
    /// Height in luma samples of the picture being written.
    pub height: u32,
    /// The tile partitioning override applied to the PPS this slice refers to.
    pub force_tile: ForceTile,
    /// Luma sample position of the first CTB of the segment.
    pub x: u32,
    pub y: u32,
    /// Write the fields of an independent slice segment.
    pub independent: bool,
}

/// Writes `slice_segment_header()`, including the final `byte_alignment()`, for `slice`
/// placed according to `target`.
///
/// `sps` and `pps` are the parameter sets the slice was parsed against; the slice data can be
/// appended with [`BitWriter::write_payload`] afterwards.
///
/// `slice_reserved_flag` bits are always written as zero, whatever values were parsed.
pub fn write_slice_header<W: Write>(
    slice: &SliceSegmentHeader,
    header: NalHeader,
    sps: &SeqParameterSet,
    pps: &PicParameterSet,
    target: &SliceTarget,
    w: &mut BitWriter<W>,
) -> Result<(), WriteError> {
    if pps.output_flag_present_flag {
        return Err(WriteError::Unsupported("output_flag_present_flag"));
    }
    if sps.separate_colour_plane_flag {
        return Err(WriteError::Unsupported("separate_colour_plane_flag"));
    }
    if sps.long_term_ref_pics.is_some() {
        return Err(WriteError::Unsupported("long_term_ref_pics_present_flag"));
    }
    let nal_unit_type = header.nal_unit_type();
    let first_slice_segment_in_pic_flag = target.x == 0 && target.y == 0;
    w.write_bit(first_slice_segment_in_pic_flag)?;
    if nal_unit_type.is_irap() {
        w.write_bit(slice.no_output_of_prior_pics_flag)?;
    }
    w.write_ue(u32::from(slice.slice_pic_parameter_set_id.id()))?;
    if !first_slice_segment_in_pic_flag {
        if target.x >= target.width || target.y >= target.height {
            return Err(WriteError::InvalidValue {
                name: "slice_segment_address",
                value: i64::from(target.x.max(target.y)),
            });
        }
        let log2_ctb = sps.log2_ctb_size();
        let width_in_ctbs = sps::ctbs_for(target.width, log2_ctb);
        let pic_size_in_ctbs = width_in_ctbs * sps::ctbs_for(target.height, log2_ctb);
        let address = (target.y >> log2_ctb) * width_in_ctbs + (target.x >> log2_ctb);
        w.write_bits(ceil_log2(pic_size_in_ctbs), address)?;
    }

    if target.independent {
        write_independent(slice, nal_unit_type, sps, pps, w)?;
    }

    let tiles = match target.force_tile {
        ForceTile::Enable => true,
        ForceTile::Off => pps.tiles_enabled_flag(),
        ForceTile::Disable => false,
    };
    if tiles || pps.entropy_coding_sync_enabled_flag {
        match slice.entry_points {
            Some(ref entry) if !entry.entry_point_offset_minus1.is_empty() => {
                w.write_ue(entry.entry_point_offset_minus1.len() as u32)?;
                w.write_ue(entry.offset_len_minus1)?;
                for &offset in &entry.entry_point_offset_minus1 {
                    w.write_bits(entry.offset_len_minus1 + 1, offset)?;
                }
            }
            _ => w.write_ue(0)?,
        }
    }

    if pps.slice_segment_header_extension_present_flag {
        let data = slice
            .slice_segment_header_extension_data
            .as_deref()
            .unwrap_or_default();
        w.write_ue(data.len() as u32)?;
        for &b in data {
            w.write_bits(8, u32::from(b))?;
        }
    }
    w.write_rbsp_trailing_bits()
}

fn write_independent<W: Write>(
    slice: &SliceSegmentHeader,
    nal_unit_type: UnitType,
    sps: &SeqParameterSet,
    pps: &PicParameterSet,
    w: &mut BitWriter<W>,
) -> Result<(), WriteError> {
    w.write_bits(u32::from(pps.num_extra_slice_header_bits), 0)?;
    w.write_ue(slice.slice_type.id())?;
    if !nal_unit_type.is_idr() {
        w.write_bits(sps.log2_max_pic_order_cnt_lsb(), slice.slice_pic_order_cnt_lsb)?;
        let num_sets = sps.short_term_ref_pic_sets.len();
        match slice.short_term_ref_pic_set {
            Some(SliceRefPicSet::Explicit(ref set)) => {
                w.write_bit(false)?;
                set.write(w, num_sets, num_sets)?;
            }
            Some(SliceRefPicSet::Sps(idx)) if idx < num_sets => {
                w.write_bit(true)?;
                if num_sets > 1 {
                    w.write_bits(ceil_log2(num_sets as u32), idx as u32)?;
                }
            }
            Some(SliceRefPicSet::Sps(idx)) => {
                return Err(WriteError::InvalidValue {
                    name: "short_term_ref_pic_set_idx",
                    value: idx as i64,
                })
            }
            None => return Err(WriteError::Unsupported("missing short_term_ref_pic_set")),
        }
        if sps.sps_temporal_mvp_enabled_flag {
            w.write_bit(slice.slice_temporal_mvp_enabled_flag)?;
        }
    }
    if sps.sample_adaptive_offset_enabled_flag {
        w.write_bit(slice.slice_sao_luma_flag)?;
        if sps.chroma_array_type() != 0 {
            w.write_bit(slice.slice_sao_chroma_flag)?;
        }
    }
    if slice.slice_type.is_inter() {
        let b = slice.slice_type == SliceType::B;
        w.write_bit(slice.num_ref_idx_active_override_flag)?;
        if slice.num_ref_idx_active_override_flag {
            w.write_ue(slice.num_ref_idx_l0_active_minus1)?;
            if b {
                w.write_ue(slice.num_ref_idx_l1_active_minus1)?;
            }
        }
        let num_pic_total_curr = slice.num_pic_total_curr(sps);
        if pps.lists_modification_present_flag && num_pic_total_curr > 1 {
            let entry_size = ceil_log2(num_pic_total_curr as u32);
            let modification = slice.ref_pic_list_modification.clone().unwrap_or_default();
            let mut write_list =
                |entries: &Option<Vec<u32>>, count: u32| -> Result<(), WriteError> {
                    w.write_bit(entries.is_some())?;
                    if let Some(entries) = entries {
                        if entries.len() != count as usize + 1 {
                            return Err(WriteError::InvalidValue {
                                name: "list_entry",
                                value: entries.len() as i64,
                            });
                        }
                        for &entry in entries {
                            w.write_bits(entry_size, entry)?;
                        }
                    }
                    Ok(())
                };
            write_list(&modification.list_entry_l0, slice.num_ref_idx_l0_active_minus1)?;
            if b {
                write_list(&modification.list_entry_l1, slice.num_ref_idx_l1_active_minus1)?;
            }
        }
        if b {
            w.write_bit(slice.mvd_l1_zero_flag)?;
        }
        if pps.cabac_init_present_flag {
            w.write_bit(slice.cabac_init_flag)?;
        }
        if slice.slice_temporal_mvp_enabled_flag {
            if b {
                w.write_bit(slice.collocated_from_l0_flag)?;
            }
            let active = if slice.collocated_from_l0_flag {
                slice.num_ref_idx_l0_active_minus1
            } else {
                slice.num_ref_idx_l1_active_minus1
            };
            if active > 0 {
                w.write_ue(slice.collocated_ref_idx)?;
            }
        }
        if (pps.weighted_pred_flag && slice.slice_type == SliceType::P)
            || (pps.weighted_bipred_flag && b)
        {
            slice
                .pred_weight_table
                .as_ref()
                .ok_or(WriteError::Unsupported("missing pred_weight_table"))?
                .write(w, sps.chroma_array_type() != 0, b)?;
        }
        w.write_ue(slice.five_minus_max_num_merge_cand)?;
    }
    w.write_se(slice.slice_qp_delta)?;
    if pps.pps_slice_chroma_qp_offsets_present_flag {
        w.write_se(slice.slice_cb_qp_offset)?;
        w.write_se(slice.slice_cr_qp_offset)?;
    }
    if pps.chroma_qp_offset_list_enabled_flag() {
        w.write_bit(slice.cu_chroma_qp_offset_enabled_flag)?;
    }
    let override_flag =
        pps.deblocking_filter_override_enabled_flag() && slice.deblocking_filter_override_flag;
    if pps.deblocking_filter_override_enabled_flag() {
        w.write_bit(override_flag)?;
    }
    let deblocking_disabled = if override_flag {
        w.write_bit(slice.slice_deblocking_filter_disabled_flag)?;
        if !slice.slice_deblocking_filter_disabled_flag {
            w.write_se(slice.slice_beta_offset_div2)?;
            w.write_se(slice.slice_tc_offset_div2)?;
        }
        slice.slice_deblocking_filter_disabled_flag
    } else {
        pps.pps_deblocking_filter_disabled_flag()
    };
    if pps.pps_loop_filter_across_slices_enabled_flag
        && (slice.slice_sao_luma_flag || slice.slice_sao_chroma_flag || !deblocking_disabled)
    {
        w.write_bit(slice.slice_loop_filter_across_slices_enabled_flag)?;
    }
    Ok(())
}

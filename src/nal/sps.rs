use super::hrd::HrdParameters;
use super::ptl::ProfileTierLevel;
use super::vps::SubLayerOrderingInfo;
use crate::rbsp::{BitRead, BitReaderError, BitWriter, WriteError};
use std::io::Write;

#[derive(Debug, PartialEq)]
pub enum SeqParamSetIdError {
    IdTooLarge(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeqParamSetId(u8);
impl SeqParamSetId {
    pub fn from_u32(id: u32) -> Result<SeqParamSetId, SeqParamSetIdError> {
        if id > 15 {
            Err(SeqParamSetIdError::IdTooLarge(id))
        } else {
            Ok(SeqParamSetId(id as u8))
        }
    }
    pub fn id(self) -> u8 {
        self.0
    }
}

#[derive(Debug)]
pub enum SpsError {
    RbspReaderError(BitReaderError),
    BadSeqParamSetId(SeqParamSetIdError),
    /// A field in the bitstream had a value too large for a subsequent calculation
    FieldValueTooLarge {
        name: &'static str,
        value: u32,
    },
    /// A field in the bitstream had a value that is too small
    FieldValueTooSmall {
        name: &'static str,
        value: u32,
    },
    RefPicSet(RefPicSetError),
    ScalingList(ScalingListError),
    /// Multilayer, 3D and screen content coding extensions are not handled.
    UnsupportedExtension(&'static str),
}

impl From<BitReaderError> for SpsError {
    fn from(e: BitReaderError) -> Self {
        SpsError::RbspReaderError(e)
    }
}
impl From<ScalingListError> for SpsError {
    fn from(e: ScalingListError) -> Self {
        SpsError::ScalingList(e)
    }
}
impl From<RefPicSetError> for SpsError {
    fn from(e: RefPicSetError) -> Self {
        SpsError::RefPicSet(e)
    }
}

/// Largest picture dimension permitted by any level (`Sqrt(MaxLumaPs * 8)` for level 6.2).
const MAX_PIC_DIMENSION: u32 = 16888;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChromaFormat {
    Monochrome,
    #[default]
    YUV420,
    YUV422,
    YUV444,
}
impl ChromaFormat {
    fn from_chroma_format_idc(chroma_format_idc: u32) -> Result<ChromaFormat, SpsError> {
        Ok(match chroma_format_idc {
            0 => ChromaFormat::Monochrome,
            1 => ChromaFormat::YUV420,
            2 => ChromaFormat::YUV422,
            3 => ChromaFormat::YUV444,
            _ => {
                return Err(SpsError::FieldValueTooLarge {
                    name: "chroma_format_idc",
                    value: chroma_format_idc,
                })
            }
        })
    }

    pub fn chroma_format_idc(self) -> u32 {
        match self {
            ChromaFormat::Monochrome => 0,
            ChromaFormat::YUV420 => 1,
            ChromaFormat::YUV422 => 2,
            ChromaFormat::YUV444 => 3,
        }
    }

    /// Horizontal and vertical chroma subsampling factors, `(SubWidthC, SubHeightC)`.
    pub fn sub_sampling(self) -> (u32, u32) {
        match self {
            ChromaFormat::YUV420 => (2, 2),
            ChromaFormat::YUV422 => (2, 1),
            ChromaFormat::Monochrome | ChromaFormat::YUV444 => (1, 1),
        }
    }
}

/// Cropping offsets, used for both `conf_win_*_offset` and `def_disp_win_*_offset`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Window {
    pub left_offset: u32,
    pub right_offset: u32,
    pub top_offset: u32,
    pub bottom_offset: u32,
}
impl Window {
    fn read<R: BitRead>(r: &mut R, name: &'static str) -> Result<Option<Window>, BitReaderError> {
        Ok(if r.read_bool(name)? {
            Some(Window {
                left_offset: r.read_ue("win_left_offset")?,
                right_offset: r.read_ue("win_right_offset")?,
                top_offset: r.read_ue("win_top_offset")?,
                bottom_offset: r.read_ue("win_bottom_offset")?,
            })
        } else {
            None
        })
    }

    fn write<W: Write>(window: Option<&Window>, w: &mut BitWriter<W>) -> Result<(), WriteError> {
        w.write_bit(window.is_some())?;
        if let Some(win) = window {
            w.write_ue(win.left_offset)?;
            w.write_ue(win.right_offset)?;
            w.write_ue(win.top_offset)?;
            w.write_ue(win.bottom_offset)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum ScalingListError {
    RbspReaderError(BitReaderError),
    /// `scaling_list_dc_coef_minus8` outside `-7..=247`.
    DcCoefOutOfRange(i32),
    /// `scaling_list_pred_matrix_id_delta` referring to a matrix before the first one.
    PredMatrixIdDeltaTooLarge(u32),
}
impl From<BitReaderError> for ScalingListError {
    fn from(e: BitReaderError) -> Self {
        ScalingListError::RbspReaderError(e)
    }
}

/// One `scaling_list_pred_mode_flag` branch of `scaling_list_data()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScalingListEntry {
    Predicted {
        pred_matrix_id_delta: u32,
    },
    Explicit {
        /// Present for 16x16 and 32x32 lists only.
        dc_coef_minus8: Option<i32>,
        delta_coefs: Vec<i32>,
    },
}

/// `scaling_list_data()` as coded, one entry per (sizeId, matrixId) in coding order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScalingListData {
    pub entries: Vec<ScalingListEntry>,
}
impl ScalingListData {
    pub(crate) fn positions() -> impl Iterator<Item = (u32, u32)> {
        (0..4u32).flat_map(|size_id| {
            let step = if size_id == 3 { 3 } else { 1 };
            (0..6u32).step_by(step).map(move |matrix_id| (size_id, matrix_id))
        })
    }

    pub fn read<R: BitRead>(r: &mut R) -> Result<ScalingListData, ScalingListError> {
        let mut entries = Vec::with_capacity(20);
        for (size_id, matrix_id) in Self::positions() {
            let entry = if r.read_bool("scaling_list_pred_mode_flag")? {
                let coef_num = 64.min(1 << (4 + (size_id << 1)));
                let dc_coef_minus8 = if size_id > 1 {
                    let dc = r.read_se("scaling_list_dc_coef_minus8")?;
                    if !(-7..=247).contains(&dc) {
                        return Err(ScalingListError::DcCoefOutOfRange(dc));
                    }
                    Some(dc)
                } else {
                    None
                };
                let delta_coefs = (0..coef_num)
                    .map(|_| r.read_se("scaling_list_delta_coef"))
                    .collect::<Result<Vec<_>, _>>()?;
                ScalingListEntry::Explicit {
                    dc_coef_minus8,
                    delta_coefs,
                }
            } else {
                let pred_matrix_id_delta = r.read_ue("scaling_list_pred_matrix_id_delta")?;
                let max = if size_id == 3 { matrix_id / 3 } else { matrix_id };
                if pred_matrix_id_delta > max {
                    return Err(ScalingListError::PredMatrixIdDeltaTooLarge(
                        pred_matrix_id_delta,
                    ));
                }
                ScalingListEntry::Predicted {
                    pred_matrix_id_delta,
                }
            };
            entries.push(entry);
        }
        Ok(ScalingListData { entries })
    }

    pub fn write<W: Write>(&self, w: &mut BitWriter<W>) -> Result<(), WriteError> {
        if self.entries.len() != Self::positions().count() {
            return Err(WriteError::InvalidValue {
                name: "scaling_list_data entries",
                value: self.entries.len() as i64,
            });
        }
        for entry in &self.entries {
            match entry {
                ScalingListEntry::Predicted {
                    pred_matrix_id_delta,
                } => {
                    w.write_bit(false)?;
                    w.write_ue(*pred_matrix_id_delta)?;
                }
                ScalingListEntry::Explicit {
                    dc_coef_minus8,
                    delta_coefs,
                } => {
                    w.write_bit(true)?;
                    if let Some(dc) = dc_coef_minus8 {
                        w.write_se(*dc)?;
                    }
                    for &coef in delta_coefs {
                        w.write_se(coef)?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PcmParams {
    pub pcm_sample_bit_depth_luma_minus1: u8,
    pub pcm_sample_bit_depth_chroma_minus1: u8,
    pub log2_min_pcm_luma_coding_block_size_minus3: u32,
    pub log2_diff_max_min_pcm_luma_coding_block_size: u32,
    pub pcm_loop_filter_disabled_flag: bool,
}

#[derive(Debug)]
pub enum RefPicSetError {
    RbspReaderError(BitReaderError),
    /// `delta_idx_minus1` pointed before the first candidate set.
    BadRefRpsIdx { st_rps_idx: usize, delta_idx_minus1: u32 },
    /// More than 16 pictures in one direction.
    TooManyPictures(u32),
}
impl From<BitReaderError> for RefPicSetError {
    fn from(e: BitReaderError) -> Self {
        RefPicSetError::RbspReaderError(e)
    }
}

/// How a short-term reference picture set was coded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StRefPicSetSyntax {
    /// Predicted from an earlier set of the SPS.
    Inter {
        delta_idx_minus1: u32,
        delta_rps_sign: bool,
        abs_delta_rps_minus1: u32,
        used_by_curr_pic_flag: Vec<bool>,
        use_delta_flag: Vec<bool>,
    },
    Explicit {
        delta_poc_s0_minus1: Vec<u32>,
        used_by_curr_pic_s0_flag: Vec<bool>,
        delta_poc_s1_minus1: Vec<u32>,
        used_by_curr_pic_s1_flag: Vec<bool>,
    },
}

/// `st_ref_pic_set(stRpsIdx)`: the coded syntax, plus the derived picture order count deltas
/// needed to interpret later sets and slice headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortTermRefPicSet {
    pub syntax: StRefPicSetSyntax,
    pub delta_poc_s0: Vec<i32>,
    pub used_by_curr_pic_s0: Vec<bool>,
    pub delta_poc_s1: Vec<i32>,
    pub used_by_curr_pic_s1: Vec<bool>,
}
impl ShortTermRefPicSet {
    /// `st_rps_idx` equal to `sets.len()` with `num_short_term_ref_pic_sets == sets.len()`
    /// reads the set coded in a slice header.
    pub fn read<R: BitRead>(
        r: &mut R,
        st_rps_idx: usize,
        num_short_term_ref_pic_sets: usize,
        sets: &[ShortTermRefPicSet],
    ) -> Result<ShortTermRefPicSet, RefPicSetError> {
        let inter_ref_pic_set_prediction_flag = if st_rps_idx != 0 {
            r.read_bool("inter_ref_pic_set_prediction_flag")?
        } else {
            false
        };
        if inter_ref_pic_set_prediction_flag {
            let delta_idx_minus1 = if st_rps_idx == num_short_term_ref_pic_sets {
                r.read_ue("delta_idx_minus1")?
            } else {
                0
            };
            let reference = st_rps_idx
                .checked_sub(delta_idx_minus1 as usize + 1)
                .and_then(|i| sets.get(i))
                .ok_or(RefPicSetError::BadRefRpsIdx {
                    st_rps_idx,
                    delta_idx_minus1,
                })?;
            let delta_rps_sign = r.read_bool("delta_rps_sign")?;
            let abs_delta_rps_minus1 = r.read_ue("abs_delta_rps_minus1")?;
            if abs_delta_rps_minus1 > 0x7fff {
                return Err(BitReaderError::ExpGolombTooLarge("abs_delta_rps_minus1").into());
            }
            let mut used_by_curr_pic_flag = vec![];
            let mut use_delta_flag = vec![];
            for _ in 0..=reference.num_delta_pocs() {
                let used = r.read_bool("used_by_curr_pic_flag")?;
                used_by_curr_pic_flag.push(used);
                use_delta_flag.push(if used {
                    true
                } else {
                    r.read_bool("use_delta_flag")?
                });
            }
            let syntax = StRefPicSetSyntax::Inter {
                delta_idx_minus1,
                delta_rps_sign,
                abs_delta_rps_minus1,
                used_by_curr_pic_flag,
                use_delta_flag,
            };
            Ok(Self::derive_inter(syntax, reference))
        } else {
            let num_negative_pics = r.read_ue("num_negative_pics")?;
            let num_positive_pics = r.read_ue("num_positive_pics")?;
            for &n in &[num_negative_pics, num_positive_pics] {
                if n > 16 {
                    return Err(RefPicSetError::TooManyPictures(n));
                }
            }
            let mut delta_poc_s0_minus1 = vec![];
            let mut used_by_curr_pic_s0_flag = vec![];
            for _ in 0..num_negative_pics {
                delta_poc_s0_minus1.push(r.read_ue("delta_poc_s0_minus1")?);
                used_by_curr_pic_s0_flag.push(r.read_bool("used_by_curr_pic_s0_flag")?);
            }
            let mut delta_poc_s1_minus1 = vec![];
            let mut used_by_curr_pic_s1_flag = vec![];
            for _ in 0..num_positive_pics {
                delta_poc_s1_minus1.push(r.read_ue("delta_poc_s1_minus1")?);
                used_by_curr_pic_s1_flag.push(r.read_bool("used_by_curr_pic_s1_flag")?);
            }
            let mut poc = 0i64;
            let delta_poc_s0 = delta_poc_s0_minus1
                .iter()
                .map(|&d| {
                    poc -= i64::from(d) + 1;
                    poc as i32
                })
                .collect();
            poc = 0;
            let delta_poc_s1 = delta_poc_s1_minus1
                .iter()
                .map(|&d| {
                    poc += i64::from(d) + 1;
                    poc as i32
                })
                .collect();
            Ok(ShortTermRefPicSet {
                delta_poc_s0,
                used_by_curr_pic_s0: used_by_curr_pic_s0_flag.clone(),
                delta_poc_s1,
                used_by_curr_pic_s1: used_by_curr_pic_s1_flag.clone(),
                syntax: StRefPicSetSyntax::Explicit {
                    delta_poc_s0_minus1,
                    used_by_curr_pic_s0_flag,
                    delta_poc_s1_minus1,
                    used_by_curr_pic_s1_flag,
                },
            })
        }
    }

    /// Equations 7-61 and 7-62 of Rec. ITU-T H.265.
    fn derive_inter(syntax: StRefPicSetSyntax, reference: &ShortTermRefPicSet) -> Self {
        let mut set = ShortTermRefPicSet {
            syntax,
            delta_poc_s0: vec![],
            used_by_curr_pic_s0: vec![],
            delta_poc_s1: vec![],
            used_by_curr_pic_s1: vec![],
        };
        let (delta_rps, used, use_delta) = match set.syntax {
            StRefPicSetSyntax::Inter {
                delta_rps_sign,
                abs_delta_rps_minus1,
                ref used_by_curr_pic_flag,
                ref use_delta_flag,
                ..
            } => {
                let magnitude = abs_delta_rps_minus1 as i32 + 1;
                (
                    if delta_rps_sign { -magnitude } else { magnitude },
                    used_by_curr_pic_flag.clone(),
                    use_delta_flag.clone(),
                )
            }
            StRefPicSetSyntax::Explicit { .. } => return set,
        };
        let num_negative = reference.num_negative();
        let num_delta_pocs = reference.num_delta_pocs();

        for j in (0..reference.num_positive()).rev() {
            let d_poc = reference.delta_poc_s1[j] + delta_rps;
            if d_poc < 0 && use_delta[num_negative + j] {
                set.delta_poc_s0.push(d_poc);
                set.used_by_curr_pic_s0.push(used[num_negative + j]);
            }
        }
        if delta_rps < 0 && use_delta[num_delta_pocs] {
            set.delta_poc_s0.push(delta_rps);
            set.used_by_curr_pic_s0.push(used[num_delta_pocs]);
        }
        for j in 0..num_negative {
            let d_poc = reference.delta_poc_s0[j] + delta_rps;
            if d_poc < 0 && use_delta[j] {
                set.delta_poc_s0.push(d_poc);
                set.used_by_curr_pic_s0.push(used[j]);
            }
        }

        for j in (0..num_negative).rev() {
            let d_poc = reference.delta_poc_s0[j] + delta_rps;
            if d_poc > 0 && use_delta[j] {
                set.delta_poc_s1.push(d_poc);
                set.used_by_curr_pic_s1.push(used[j]);
            }
        }
        if delta_rps > 0 && use_delta[num_delta_pocs] {
            set.delta_poc_s1.push(delta_rps);
            set.used_by_curr_pic_s1.push(used[num_delta_pocs]);
        }
        for j in 0..reference.num_positive() {
            let d_poc = reference.delta_poc_s1[j] + delta_rps;
            if d_poc > 0 && use_delta[num_negative + j] {
                set.delta_poc_s1.push(d_poc);
                set.used_by_curr_pic_s1.push(used[num_negative + j]);
            }
        }
        set
    }

    pub fn write<W: Write>(
        &self,
        w: &mut BitWriter<W>,
        st_rps_idx: usize,
        num_short_term_ref_pic_sets: usize,
    ) -> Result<(), WriteError> {
        match &self.syntax {
            StRefPicSetSyntax::Inter {
                delta_idx_minus1,
                delta_rps_sign,
                abs_delta_rps_minus1,
                used_by_curr_pic_flag,
                use_delta_flag,
            } => {
                if st_rps_idx == 0 {
                    return Err(WriteError::InvalidValue {
                        name: "inter_ref_pic_set_prediction_flag",
                        value: 1,
                    });
                }
                w.write_bit(true)?;
                if st_rps_idx == num_short_term_ref_pic_sets {
                    w.write_ue(*delta_idx_minus1)?;
                }
                w.write_bit(*delta_rps_sign)?;
                w.write_ue(*abs_delta_rps_minus1)?;
                for (&used, &use_delta) in used_by_curr_pic_flag.iter().zip(use_delta_flag) {
                    w.write_bit(used)?;
                    if !used {
                        w.write_bit(use_delta)?;
                    }
                }
            }
            StRefPicSetSyntax::Explicit {
                delta_poc_s0_minus1,
                used_by_curr_pic_s0_flag,
                delta_poc_s1_minus1,
                used_by_curr_pic_s1_flag,
            } => {
                if st_rps_idx != 0 {
                    w.write_bit(false)?;
                }
                w.write_ue(delta_poc_s0_minus1.len() as u32)?;
                w.write_ue(delta_poc_s1_minus1.len() as u32)?;
                for (&d, &used) in delta_poc_s0_minus1.iter().zip(used_by_curr_pic_s0_flag) {
                    w.write_ue(d)?;
                    w.write_bit(used)?;
                }
                for (&d, &used) in delta_poc_s1_minus1.iter().zip(used_by_curr_pic_s1_flag) {
                    w.write_ue(d)?;
                    w.write_bit(used)?;
                }
            }
        }
        Ok(())
    }

    pub fn num_negative(&self) -> usize {
        self.delta_poc_s0.len()
    }

    pub fn num_positive(&self) -> usize {
        self.delta_poc_s1.len()
    }

    pub fn num_delta_pocs(&self) -> usize {
        self.num_negative() + self.num_positive()
    }

    /// Pictures of this set used for reference by the current picture.
    pub fn num_used_by_curr_pic(&self) -> usize {
        self.used_by_curr_pic_s0
            .iter()
            .chain(&self.used_by_curr_pic_s1)
            .filter(|&&used| used)
            .count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LongTermRefPicsSps {
    pub lt_ref_pic_poc_lsb_sps: Vec<u32>,
    pub used_by_curr_pic_lt_sps_flag: Vec<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AspectRatioInfo {
    #[default]
    Unspecified,
    Ratio1_1,
    Ratio12_11,
    Ratio10_11,
    Ratio16_11,
    Ratio40_33,
    Ratio24_11,
    Ratio20_11,
    Ratio32_11,
    Ratio80_33,
    Ratio18_11,
    Ratio15_11,
    Ratio64_33,
    Ratio160_99,
    Ratio4_3,
    Ratio3_2,
    Ratio2_1,
    Reserved(u8),
    Extended(u16, u16),
}
impl AspectRatioInfo {
    fn read<R: BitRead>(r: &mut R) -> Result<Option<AspectRatioInfo>, BitReaderError> {
        let aspect_ratio_info_present_flag = r.read_bool("aspect_ratio_info_present_flag")?;
        Ok(if aspect_ratio_info_present_flag {
            let aspect_ratio_idc = r.read_u8(8, "aspect_ratio_idc")?;
            Some(match aspect_ratio_idc {
                0 => AspectRatioInfo::Unspecified,
                1 => AspectRatioInfo::Ratio1_1,
                2 => AspectRatioInfo::Ratio12_11,
                3 => AspectRatioInfo::Ratio10_11,
                4 => AspectRatioInfo::Ratio16_11,
                5 => AspectRatioInfo::Ratio40_33,
                6 => AspectRatioInfo::Ratio24_11,
                7 => AspectRatioInfo::Ratio20_11,
                8 => AspectRatioInfo::Ratio32_11,
                9 => AspectRatioInfo::Ratio80_33,
                10 => AspectRatioInfo::Ratio18_11,
                11 => AspectRatioInfo::Ratio15_11,
                12 => AspectRatioInfo::Ratio64_33,
                13 => AspectRatioInfo::Ratio160_99,
                14 => AspectRatioInfo::Ratio4_3,
                15 => AspectRatioInfo::Ratio3_2,
                16 => AspectRatioInfo::Ratio2_1,
                255 => AspectRatioInfo::Extended(
                    r.read_u32(16, "sar_width")? as u16,
                    r.read_u32(16, "sar_height")? as u16,
                ),
                _ => AspectRatioInfo::Reserved(aspect_ratio_idc),
            })
        } else {
            None
        })
    }

    fn write<W: Write>(
        info: Option<&AspectRatioInfo>,
        w: &mut BitWriter<W>,
    ) -> Result<(), WriteError> {
        w.write_bit(info.is_some())?;
        if let Some(info) = info {
            w.write_bits(8, u32::from(info.to_u8()))?;
            if let AspectRatioInfo::Extended(width, height) = *info {
                w.write_bits(16, u32::from(width))?;
                w.write_bits(16, u32::from(height))?;
            }
        }
        Ok(())
    }

    /// Returns the aspect ratio as `(width, height)`, if specified.
    pub fn get(&self) -> Option<(u16, u16)> {
        match *self {
            AspectRatioInfo::Unspecified | AspectRatioInfo::Reserved(_) => None,
            AspectRatioInfo::Ratio1_1 => Some((1, 1)),
            AspectRatioInfo::Ratio12_11 => Some((12, 11)),
            AspectRatioInfo::Ratio10_11 => Some((10, 11)),
            AspectRatioInfo::Ratio16_11 => Some((16, 11)),
            AspectRatioInfo::Ratio40_33 => Some((40, 33)),
            AspectRatioInfo::Ratio24_11 => Some((24, 11)),
            AspectRatioInfo::Ratio20_11 => Some((20, 11)),
            AspectRatioInfo::Ratio32_11 => Some((32, 11)),
            AspectRatioInfo::Ratio80_33 => Some((80, 33)),
            AspectRatioInfo::Ratio18_11 => Some((18, 11)),
            AspectRatioInfo::Ratio15_11 => Some((15, 11)),
            AspectRatioInfo::Ratio64_33 => Some((64, 33)),
            AspectRatioInfo::Ratio160_99 => Some((160, 99)),
            AspectRatioInfo::Ratio4_3 => Some((4, 3)),
            AspectRatioInfo::Ratio3_2 => Some((3, 2)),
            AspectRatioInfo::Ratio2_1 => Some((2, 1)),
            // sar_width or sar_height of zero means unspecified
            AspectRatioInfo::Extended(0, _) | AspectRatioInfo::Extended(_, 0) => None,
            AspectRatioInfo::Extended(width, height) => Some((width, height)),
        }
    }

    pub fn to_u8(&self) -> u8 {
        match *self {
            AspectRatioInfo::Unspecified => 0,
            AspectRatioInfo::Ratio1_1 => 1,
            AspectRatioInfo::Ratio12_11 => 2,
            AspectRatioInfo::Ratio10_11 => 3,
            AspectRatioInfo::Ratio16_11 => 4,
            AspectRatioInfo::Ratio40_33 => 5,
            AspectRatioInfo::Ratio24_11 => 6,
            AspectRatioInfo::Ratio20_11 => 7,
            AspectRatioInfo::Ratio32_11 => 8,
            AspectRatioInfo::Ratio80_33 => 9,
            AspectRatioInfo::Ratio18_11 => 10,
            AspectRatioInfo::Ratio15_11 => 11,
            AspectRatioInfo::Ratio64_33 => 12,
            AspectRatioInfo::Ratio160_99 => 13,
            AspectRatioInfo::Ratio4_3 => 14,
            AspectRatioInfo::Ratio3_2 => 15,
            AspectRatioInfo::Ratio2_1 => 16,
            AspectRatioInfo::Reserved(aspect_ratio_idc) => aspect_ratio_idc,
            AspectRatioInfo::Extended(..) => 255,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OverscanAppropriate {
    #[default]
    Unspecified,
    Appropriate,
    Inappropriate,
}
impl OverscanAppropriate {
    fn read<R: BitRead>(r: &mut R) -> Result<OverscanAppropriate, BitReaderError> {
        let overscan_info_present_flag = r.read_bool("overscan_info_present_flag")?;
        Ok(if overscan_info_present_flag {
            if r.read_bool("overscan_appropriate_flag")? {
                OverscanAppropriate::Appropriate
            } else {
                OverscanAppropriate::Inappropriate
            }
        } else {
            OverscanAppropriate::Unspecified
        })
    }

    fn write<W: Write>(self, w: &mut BitWriter<W>) -> Result<(), WriteError> {
        match self {
            OverscanAppropriate::Unspecified => w.write_bit(false),
            OverscanAppropriate::Appropriate => {
                w.write_bit(true)?;
                w.write_bit(true)
            }
            OverscanAppropriate::Inappropriate => {
                w.write_bit(true)?;
                w.write_bit(false)
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VideoFormat {
    #[default]
    Component,
    PAL,
    NTSC,
    SECAM,
    MAC,
    Unspecified,
    Reserved(u8),
}
impl VideoFormat {
    fn from(video_format: u8) -> VideoFormat {
        match video_format {
            0 => VideoFormat::Component,
            1 => VideoFormat::PAL,
            2 => VideoFormat::NTSC,
            3 => VideoFormat::SECAM,
            4 => VideoFormat::MAC,
            5 => VideoFormat::Unspecified,
            _ => VideoFormat::Reserved(video_format),
        }
    }
    pub fn to_u8(&self) -> u8 {
        match *self {
            VideoFormat::Component => 0,
            VideoFormat::PAL => 1,
            VideoFormat::NTSC => 2,
            VideoFormat::SECAM => 3,
            VideoFormat::MAC => 4,
            VideoFormat::Unspecified => 5,
            VideoFormat::Reserved(video_format) => video_format,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ColourDescription {
    pub colour_primaries: u8,
    pub transfer_characteristics: u8,
    pub matrix_coefficients: u8,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VideoSignalType {
    pub video_format: VideoFormat,
    pub video_full_range_flag: bool,
    pub colour_description: Option<ColourDescription>,
}
impl VideoSignalType {
    fn read<R: BitRead>(r: &mut R) -> Result<Option<VideoSignalType>, BitReaderError> {
        let video_signal_type_present_flag = r.read_bool("video_signal_type_present_flag")?;
        Ok(if video_signal_type_present_flag {
            Some(VideoSignalType {
                video_format: VideoFormat::from(r.read_u8(3, "video_format")?),
                video_full_range_flag: r.read_bool("video_full_range_flag")?,
                colour_description: if r.read_bool("colour_description_present_flag")? {
                    Some(ColourDescription {
                        colour_primaries: r.read_u8(8, "colour_primaries")?,
                        transfer_characteristics: r.read_u8(8, "transfer_characteristics")?,
                        matrix_coefficients: r.read_u8(8, "matrix_coefficients")?,
                    })
                } else {
                    None
                },
            })
        } else {
            None
        })
    }

    fn write<W: Write>(
        signal: Option<&VideoSignalType>,
        w: &mut BitWriter<W>,
    ) -> Result<(), WriteError> {
        w.write_bit(signal.is_some())?;
        if let Some(signal) = signal {
            w.write_bits(3, u32::from(signal.video_format.to_u8()))?;
            w.write_bit(signal.video_full_range_flag)?;
            w.write_bit(signal.colour_description.is_some())?;
            if let Some(colour) = signal.colour_description {
                w.write_bits(8, u32::from(colour.colour_primaries))?;
                w.write_bits(8, u32::from(colour.transfer_characteristics))?;
                w.write_bits(8, u32::from(colour.matrix_coefficients))?;
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChromaLocInfo {
    pub chroma_sample_loc_type_top_field: u32,
    pub chroma_sample_loc_type_bottom_field: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VuiTimingInfo {
    pub num_units_in_tick: u32,
    pub time_scale: u32,
    pub num_ticks_poc_diff_one_minus1: Option<u32>,
    pub hrd_parameters: Option<HrdParameters>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BitstreamRestrictions {
    pub tiles_fixed_structure_flag: bool,
    pub motion_vectors_over_pic_boundaries_flag: bool,
    pub restricted_ref_pic_lists_flag: bool,
    pub min_spatial_segmentation_idc: u32,
    pub max_bytes_per_pic_denom: u32,
    pub max_bits_per_min_cu_denom: u32,
    pub log2_max_mv_length_horizontal: u32,
    pub log2_max_mv_length_vertical: u32,
}
impl BitstreamRestrictions {
    fn read<R: BitRead>(r: &mut R) -> Result<Option<BitstreamRestrictions>, SpsError> {
        if !r.read_bool("bitstream_restriction_flag")? {
            return Ok(None);
        }
        let restrictions = BitstreamRestrictions {
            tiles_fixed_structure_flag: r.read_bool("tiles_fixed_structure_flag")?,
            motion_vectors_over_pic_boundaries_flag: r
                .read_bool("motion_vectors_over_pic_boundaries_flag")?,
            restricted_ref_pic_lists_flag: r.read_bool("restricted_ref_pic_lists_flag")?,
            min_spatial_segmentation_idc: r.read_ue("min_spatial_segmentation_idc")?,
            max_bytes_per_pic_denom: r.read_ue("max_bytes_per_pic_denom")?,
            max_bits_per_min_cu_denom: r.read_ue("max_bits_per_min_cu_denom")?,
            log2_max_mv_length_horizontal: r.read_ue("log2_max_mv_length_horizontal")?,
            log2_max_mv_length_vertical: r.read_ue("log2_max_mv_length_vertical")?,
        };
        for &(name, value, max) in &[
            (
                "min_spatial_segmentation_idc",
                restrictions.min_spatial_segmentation_idc,
                4095,
            ),
            (
                "max_bytes_per_pic_denom",
                restrictions.max_bytes_per_pic_denom,
                16,
            ),
            (
                "max_bits_per_min_cu_denom",
                restrictions.max_bits_per_min_cu_denom,
                16,
            ),
            (
                "log2_max_mv_length_horizontal",
                restrictions.log2_max_mv_length_horizontal,
                16,
            ),
            (
                "log2_max_mv_length_vertical",
                restrictions.log2_max_mv_length_vertical,
                16,
            ),
        ] {
            if value > max {
                return Err(SpsError::FieldValueTooLarge { name, value });
            }
        }
        Ok(Some(restrictions))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VuiParameters {
    pub aspect_ratio_info: Option<AspectRatioInfo>,
    pub overscan_appropriate: OverscanAppropriate,
    pub video_signal_type: Option<VideoSignalType>,
    pub chroma_loc_info: Option<ChromaLocInfo>,
    pub neutral_chroma_indication_flag: bool,
    pub field_seq_flag: bool,
    pub frame_field_info_present_flag: bool,
    pub default_display_window: Option<Window>,
    pub timing_info: Option<VuiTimingInfo>,
    pub bitstream_restrictions: Option<BitstreamRestrictions>,
}
impl VuiParameters {
    fn read<R: BitRead>(
        r: &mut R,
        max_sub_layers_minus1: u8,
    ) -> Result<Option<VuiParameters>, SpsError> {
        if !r.read_bool("vui_parameters_present_flag")? {
            return Ok(None);
        }
        Ok(Some(VuiParameters {
            aspect_ratio_info: AspectRatioInfo::read(r)?,
            overscan_appropriate: OverscanAppropriate::read(r)?,
            video_signal_type: VideoSignalType::read(r)?,
            chroma_loc_info: if r.read_bool("chroma_loc_info_present_flag")? {
                Some(ChromaLocInfo {
                    chroma_sample_loc_type_top_field: r
                        .read_ue("chroma_sample_loc_type_top_field")?,
                    chroma_sample_loc_type_bottom_field: r
                        .read_ue("chroma_sample_loc_type_bottom_field")?,
                })
            } else {
                None
            },
            neutral_chroma_indication_flag: r.read_bool("neutral_chroma_indication_flag")?,
            field_seq_flag: r.read_bool("field_seq_flag")?,
            frame_field_info_present_flag: r.read_bool("frame_field_info_present_flag")?,
            default_display_window: Window::read(r, "default_display_window_flag")?,
            timing_info: if r.read_bool("vui_timing_info_present_flag")? {
                let num_units_in_tick = r.read_u32(32, "vui_num_units_in_tick")?;
                let time_scale = r.read_u32(32, "vui_time_scale")?;
                let num_ticks_poc_diff_one_minus1 =
                    if r.read_bool("vui_poc_proportional_to_timing_flag")? {
                        Some(r.read_ue("vui_num_ticks_poc_diff_one_minus1")?)
                    } else {
                        None
                    };
                let hrd_parameters = if r.read_bool("vui_hrd_parameters_present_flag")? {
                    Some(HrdParameters::read(r, true, max_sub_layers_minus1, None)?)
                } else {
                    None
                };
                Some(VuiTimingInfo {
                    num_units_in_tick,
                    time_scale,
                    num_ticks_poc_diff_one_minus1,
                    hrd_parameters,
                })
            } else {
                None
            },
            bitstream_restrictions: BitstreamRestrictions::read(r)?,
        }))
    }

    fn write<W: Write>(&self, w: &mut BitWriter<W>) -> Result<(), WriteError> {
        AspectRatioInfo::write(self.aspect_ratio_info.as_ref(), w)?;
        self.overscan_appropriate.write(w)?;
        VideoSignalType::write(self.video_signal_type.as_ref(), w)?;
        w.write_bit(self.chroma_loc_info.is_some())?;
        if let Some(loc) = self.chroma_loc_info {
            w.write_ue(loc.chroma_sample_loc_type_top_field)?;
            w.write_ue(loc.chroma_sample_loc_type_bottom_field)?;
        }
        w.write_bit(self.neutral_chroma_indication_flag)?;
        w.write_bit(self.field_seq_flag)?;
        w.write_bit(self.frame_field_info_present_flag)?;
        Window::write(self.default_display_window.as_ref(), w)?;
        w.write_bit(self.timing_info.is_some())?;
        if let Some(ref timing) = self.timing_info {
            w.write_bits(32, timing.num_units_in_tick)?;
            w.write_bits(32, timing.time_scale)?;
            w.write_bit(timing.num_ticks_poc_diff_one_minus1.is_some())?;
            if let Some(ticks) = timing.num_ticks_poc_diff_one_minus1 {
                w.write_ue(ticks)?;
            }
            w.write_bit(timing.hrd_parameters.is_some())?;
            if let Some(ref hrd) = timing.hrd_parameters {
                hrd.write(w)?;
            }
        }
        w.write_bit(self.bitstream_restrictions.is_some())?;
        if let Some(b) = self.bitstream_restrictions {
            w.write_bit(b.tiles_fixed_structure_flag)?;
            w.write_bit(b.motion_vectors_over_pic_boundaries_flag)?;
            w.write_bit(b.restricted_ref_pic_lists_flag)?;
            w.write_ue(b.min_spatial_segmentation_idc)?;
            w.write_ue(b.max_bytes_per_pic_denom)?;
            w.write_ue(b.max_bits_per_min_cu_denom)?;
            w.write_ue(b.log2_max_mv_length_horizontal)?;
            w.write_ue(b.log2_max_mv_length_vertical)?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SpsRangeExtension {
    pub transform_skip_rotation_enabled_flag: bool,
    pub transform_skip_context_enabled_flag: bool,
    pub implicit_rdpcm_enabled_flag: bool,
    pub explicit_rdpcm_enabled_flag: bool,
    pub extended_precision_processing_flag: bool,
    pub intra_smoothing_disabled_flag: bool,
    pub high_precision_offsets_enabled_flag: bool,
    pub persistent_rice_adaptation_enabled_flag: bool,
    pub cabac_bypass_alignment_enabled_flag: bool,
}
impl SpsRangeExtension {
    fn read<R: BitRead>(r: &mut R) -> Result<SpsRangeExtension, BitReaderError> {
        Ok(SpsRangeExtension {
            transform_skip_rotation_enabled_flag: r
                .read_bool("transform_skip_rotation_enabled_flag")?,
            transform_skip_context_enabled_flag: r
                .read_bool("transform_skip_context_enabled_flag")?,
            implicit_rdpcm_enabled_flag: r.read_bool("implicit_rdpcm_enabled_flag")?,
            explicit_rdpcm_enabled_flag: r.read_bool("explicit_rdpcm_enabled_flag")?,
            extended_precision_processing_flag: r
                .read_bool("extended_precision_processing_flag")?,
            intra_smoothing_disabled_flag: r.read_bool("intra_smoothing_disabled_flag")?,
            high_precision_offsets_enabled_flag: r
                .read_bool("high_precision_offsets_enabled_flag")?,
            persistent_rice_adaptation_enabled_flag: r
                .read_bool("persistent_rice_adaptation_enabled_flag")?,
            cabac_bypass_alignment_enabled_flag: r
                .read_bool("cabac_bypass_alignment_enabled_flag")?,
        })
    }

    fn write<W: Write>(&self, w: &mut BitWriter<W>) -> Result<(), WriteError> {
        for &flag in &[
            self.transform_skip_rotation_enabled_flag,
            self.transform_skip_context_enabled_flag,
            self.implicit_rdpcm_enabled_flag,
            self.explicit_rdpcm_enabled_flag,
            self.extended_precision_processing_flag,
            self.intra_smoothing_disabled_flag,
            self.high_precision_offsets_enabled_flag,
            self.persistent_rice_adaptation_enabled_flag,
            self.cabac_bypass_alignment_enabled_flag,
        ] {
            w.write_bit(flag)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeqParameterSet {
    pub sps_video_parameter_set_id: u8,
    pub sps_max_sub_layers_minus1: u8,
    pub sps_temporal_id_nesting_flag: bool,
    pub profile_tier_level: ProfileTierLevel,
    pub seq_parameter_set_id: SeqParamSetId,
    pub chroma_format: ChromaFormat,
    pub separate_colour_plane_flag: bool,
    pub pic_width_in_luma_samples: u32,
    pub pic_height_in_luma_samples: u32,
    pub conformance_window: Option<Window>,
    pub bit_depth_luma_minus8: u8,
    pub bit_depth_chroma_minus8: u8,
    pub log2_max_pic_order_cnt_lsb_minus4: u8,
    pub sps_sub_layer_ordering_info_present_flag: bool,
    pub sub_layer_ordering_info: Vec<SubLayerOrderingInfo>,
    pub log2_min_luma_coding_block_size_minus3: u8,
    pub log2_diff_max_min_luma_coding_block_size: u8,
    pub log2_min_luma_transform_block_size_minus2: u32,
    pub log2_diff_max_min_luma_transform_block_size: u32,
    pub max_transform_hierarchy_depth_inter: u32,
    pub max_transform_hierarchy_depth_intra: u32,
    pub scaling_list_enabled_flag: bool,
    /// `Some` when `sps_scaling_list_data_present_flag` is set.
    pub scaling_list_data: Option<ScalingListData>,
    pub amp_enabled_flag: bool,
    pub sample_adaptive_offset_enabled_flag: bool,
    pub pcm: Option<PcmParams>,
    pub short_term_ref_pic_sets: Vec<ShortTermRefPicSet>,
    pub long_term_ref_pics: Option<LongTermRefPicsSps>,
    pub sps_temporal_mvp_enabled_flag: bool,
    pub strong_intra_smoothing_enabled_flag: bool,
    pub vui_parameters: Option<VuiParameters>,
    pub range_extension: Option<SpsRangeExtension>,
    /// `sps_extension_4bits`; the extension data itself is ignored.
    pub sps_extension_4bits: u8,
}
impl SeqParameterSet {
    pub fn from_bits<R: BitRead>(mut r: R) -> Result<SeqParameterSet, SpsError> {
        let sps_video_parameter_set_id = r.read_u8(4, "sps_video_parameter_set_id")?;
        let sps_max_sub_layers_minus1 = r.read_u8(3, "sps_max_sub_layers_minus1")?;
        if sps_max_sub_layers_minus1 > 6 {
            return Err(SpsError::FieldValueTooLarge {
                name: "sps_max_sub_layers_minus1",
                value: u32::from(sps_max_sub_layers_minus1),
            });
        }
        let sps_temporal_id_nesting_flag = r.read_bool("sps_temporal_id_nesting_flag")?;
        let profile_tier_level = ProfileTierLevel::read(&mut r, sps_max_sub_layers_minus1)?;
        let seq_parameter_set_id = SeqParamSetId::from_u32(r.read_ue("sps_seq_parameter_set_id")?)
            .map_err(SpsError::BadSeqParamSetId)?;
        let chroma_format = ChromaFormat::from_chroma_format_idc(r.read_ue("chroma_format_idc")?)?;
        let separate_colour_plane_flag = if chroma_format == ChromaFormat::YUV444 {
            r.read_bool("separate_colour_plane_flag")?
        } else {
            false
        };
        let pic_width_in_luma_samples = read_dimension(&mut r, "pic_width_in_luma_samples")?;
        let pic_height_in_luma_samples = read_dimension(&mut r, "pic_height_in_luma_samples")?;
        let conformance_window = Window::read(&mut r, "conformance_window_flag")?;
        let bit_depth_luma_minus8 = read_bounded_ue(&mut r, "bit_depth_luma_minus8", 8)? as u8;
        let bit_depth_chroma_minus8 = read_bounded_ue(&mut r, "bit_depth_chroma_minus8", 8)? as u8;
        let log2_max_pic_order_cnt_lsb_minus4 =
            read_bounded_ue(&mut r, "log2_max_pic_order_cnt_lsb_minus4", 12)? as u8;
        let sps_sub_layer_ordering_info_present_flag =
            r.read_bool("sps_sub_layer_ordering_info_present_flag")?;
        let sub_layer_ordering_info = SubLayerOrderingInfo::read_all(
            &mut r,
            sps_sub_layer_ordering_info_present_flag,
            sps_max_sub_layers_minus1,
        )?;
        let log2_min_luma_coding_block_size_minus3 =
            read_bounded_ue(&mut r, "log2_min_luma_coding_block_size_minus3", 3)? as u8;
        let log2_diff_max_min_luma_coding_block_size =
            read_bounded_ue(&mut r, "log2_diff_max_min_luma_coding_block_size", 3)? as u8;
        let log2_ctb_size =
            log2_min_luma_coding_block_size_minus3 + 3 + log2_diff_max_min_luma_coding_block_size;
        if log2_ctb_size > 6 {
            return Err(SpsError::FieldValueTooLarge {
                name: "log2_diff_max_min_luma_coding_block_size",
                value: u32::from(log2_diff_max_min_luma_coding_block_size),
            });
        }
        let log2_min_luma_transform_block_size_minus2 =
            read_bounded_ue(&mut r, "log2_min_luma_transform_block_size_minus2", 3)?;
        let log2_diff_max_min_luma_transform_block_size =
            read_bounded_ue(&mut r, "log2_diff_max_min_luma_transform_block_size", 3)?;
        let max_transform_hierarchy_depth_inter =
            read_bounded_ue(&mut r, "max_transform_hierarchy_depth_inter", 4)?;
        let max_transform_hierarchy_depth_intra =
            read_bounded_ue(&mut r, "max_transform_hierarchy_depth_intra", 4)?;
        let scaling_list_enabled_flag = r.read_bool("scaling_list_enabled_flag")?;
        let scaling_list_data =
            if scaling_list_enabled_flag && r.read_bool("sps_scaling_list_data_present_flag")? {
                Some(ScalingListData::read(&mut r)?)
            } else {
                None
            };
        let amp_enabled_flag = r.read_bool("amp_enabled_flag")?;
        let sample_adaptive_offset_enabled_flag =
            r.read_bool("sample_adaptive_offset_enabled_flag")?;
        let pcm = if r.read_bool("pcm_enabled_flag")? {
            Some(PcmParams {
                pcm_sample_bit_depth_luma_minus1: r.read_u8(4, "pcm_sample_bit_depth_luma_minus1")?,
                pcm_sample_bit_depth_chroma_minus1: r
                    .read_u8(4, "pcm_sample_bit_depth_chroma_minus1")?,
                log2_min_pcm_luma_coding_block_size_minus3: r
                    .read_ue("log2_min_pcm_luma_coding_block_size_minus3")?,
                log2_diff_max_min_pcm_luma_coding_block_size: r
                    .read_ue("log2_diff_max_min_pcm_luma_coding_block_size")?,
                pcm_loop_filter_disabled_flag: r.read_bool("pcm_loop_filter_disabled_flag")?,
            })
        } else {
            None
        };
        let num_short_term_ref_pic_sets =
            read_bounded_ue(&mut r, "num_short_term_ref_pic_sets", 64)? as usize;
        let mut short_term_ref_pic_sets = Vec::with_capacity(num_short_term_ref_pic_sets);
        for i in 0..num_short_term_ref_pic_sets {
            let set = ShortTermRefPicSet::read(
                &mut r,
                i,
                num_short_term_ref_pic_sets,
                &short_term_ref_pic_sets,
            )?;
            short_term_ref_pic_sets.push(set);
        }
        let long_term_ref_pics = if r.read_bool("long_term_ref_pics_present_flag")? {
            let num_long_term_ref_pics_sps =
                read_bounded_ue(&mut r, "num_long_term_ref_pics_sps", 32)?;
            let mut lt = LongTermRefPicsSps::default();
            for _ in 0..num_long_term_ref_pics_sps {
                lt.lt_ref_pic_poc_lsb_sps.push(r.read_u32(
                    u32::from(log2_max_pic_order_cnt_lsb_minus4) + 4,
                    "lt_ref_pic_poc_lsb_sps",
                )?);
                lt.used_by_curr_pic_lt_sps_flag
                    .push(r.read_bool("used_by_curr_pic_lt_sps_flag")?);
            }
            Some(lt)
        } else {
            None
        };
        let sps_temporal_mvp_enabled_flag = r.read_bool("sps_temporal_mvp_enabled_flag")?;
        let strong_intra_smoothing_enabled_flag =
            r.read_bool("strong_intra_smoothing_enabled_flag")?;
        let vui_parameters = VuiParameters::read(&mut r, sps_max_sub_layers_minus1)?;

        let mut range_extension = None;
        let mut sps_extension_4bits = 0;
        if r.read_bool("sps_extension_present_flag")? {
            let sps_range_extension_flag = r.read_bool("sps_range_extension_flag")?;
            if r.read_bool("sps_multilayer_extension_flag")? {
                return Err(SpsError::UnsupportedExtension("sps_multilayer_extension"));
            }
            if r.read_bool("sps_3d_extension_flag")? {
                return Err(SpsError::UnsupportedExtension("sps_3d_extension"));
            }
            if r.read_bool("sps_scc_extension_flag")? {
                return Err(SpsError::UnsupportedExtension("sps_scc_extension"));
            }
            sps_extension_4bits = r.read_u8(4, "sps_extension_4bits")?;
            if sps_range_extension_flag {
                range_extension = Some(SpsRangeExtension::read(&mut r)?);
            }
        }
        // sps_extension_data_flag contents are not interpreted
        if sps_extension_4bits == 0 {
            r.finish_rbsp()?;
        }

        Ok(SeqParameterSet {
            sps_video_parameter_set_id,
            sps_max_sub_layers_minus1,
            sps_temporal_id_nesting_flag,
            profile_tier_level,
            seq_parameter_set_id,
            chroma_format,
            separate_colour_plane_flag,
            pic_width_in_luma_samples,
            pic_height_in_luma_samples,
            conformance_window,
            bit_depth_luma_minus8,
            bit_depth_chroma_minus8,
            log2_max_pic_order_cnt_lsb_minus4,
            sps_sub_layer_ordering_info_present_flag,
            sub_layer_ordering_info,
            log2_min_luma_coding_block_size_minus3,
            log2_diff_max_min_luma_coding_block_size,
            log2_min_luma_transform_block_size_minus2,
            log2_diff_max_min_luma_transform_block_size,
            max_transform_hierarchy_depth_inter,
            max_transform_hierarchy_depth_intra,
            scaling_list_enabled_flag,
            scaling_list_data,
            amp_enabled_flag,
            sample_adaptive_offset_enabled_flag,
            pcm,
            short_term_ref_pic_sets,
            long_term_ref_pics,
            sps_temporal_mvp_enabled_flag,
            strong_intra_smoothing_enabled_flag,
            vui_parameters,
            range_extension,
            sps_extension_4bits,
        })
    }

    pub fn id(&self) -> SeqParamSetId {
        self.seq_parameter_set_id
    }

    /// `ChromaArrayType`: zero for monochrome or separately coded colour planes.
    pub fn chroma_array_type(&self) -> u32 {
        if self.separate_colour_plane_flag {
            0
        } else {
            self.chroma_format.chroma_format_idc()
        }
    }

    pub fn log2_max_pic_order_cnt_lsb(&self) -> u32 {
        u32::from(self.log2_max_pic_order_cnt_lsb_minus4) + 4
    }

    pub fn log2_min_cb_size(&self) -> u32 {
        u32::from(self.log2_min_luma_coding_block_size_minus3) + 3
    }

    /// `CtbLog2SizeY`, in the range 3 to 6 for streams this crate accepts.
    pub fn log2_ctb_size(&self) -> u32 {
        self.log2_min_cb_size() + u32::from(self.log2_diff_max_min_luma_coding_block_size)
    }

    pub fn ctb_size(&self) -> u32 {
        1 << self.log2_ctb_size()
    }

    pub fn pic_width_in_ctbs(&self) -> u32 {
        ctbs_for(self.pic_width_in_luma_samples, self.log2_ctb_size())
    }

    pub fn pic_height_in_ctbs(&self) -> u32 {
        ctbs_for(self.pic_height_in_luma_samples, self.log2_ctb_size())
    }

    pub fn pic_size_in_ctbs(&self) -> u32 {
        self.pic_width_in_ctbs() * self.pic_height_in_ctbs()
    }

    /// Helper to calculate the pixel-dimensions of the video image specified by this SPS, taking
    /// into account the conformance cropping window.
    pub fn pixel_dimensions(&self) -> Result<(u32, u32), SpsError> {
        let (width, height) = (
            self.pic_width_in_luma_samples,
            self.pic_height_in_luma_samples,
        );
        let crop = match self.conformance_window {
            None => return Ok((width, height)),
            Some(ref crop) => crop,
        };
        let (sub_width, sub_height) = self.chroma_format.sub_sampling();
        let horizontal = crop
            .left_offset
            .checked_add(crop.right_offset)
            .and_then(|o| o.checked_mul(sub_width))
            .ok_or(SpsError::FieldValueTooLarge {
                name: "conf_win_right_offset",
                value: crop.right_offset,
            })?;
        let vertical = crop
            .top_offset
            .checked_add(crop.bottom_offset)
            .and_then(|o| o.checked_mul(sub_height))
            .ok_or(SpsError::FieldValueTooLarge {
                name: "conf_win_bottom_offset",
                value: crop.bottom_offset,
            })?;
        match (width.checked_sub(horizontal), height.checked_sub(vertical)) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Ok((w, h)),
            _ => Err(SpsError::FieldValueTooLarge {
                name: "conformance_window",
                value: horizontal.max(vertical),
            }),
        }
    }
}

/// Number of CTBs of size `1 << log2_ctb_size` needed to cover `samples`.
pub(crate) fn ctbs_for(samples: u32, log2_ctb_size: u32) -> u32 {
    (samples + (1 << log2_ctb_size) - 1) >> log2_ctb_size
}

fn read_bounded_ue<R: BitRead>(r: &mut R, name: &'static str, max: u32) -> Result<u32, SpsError> {
    let value = r.read_ue(name)?;
    if value > max {
        Err(SpsError::FieldValueTooLarge { name, value })
    } else {
        Ok(value)
    }
}

fn read_dimension<R: BitRead>(r: &mut R, name: &'static str) -> Result<u32, SpsError> {
    let value = read_bounded_ue(r, name, MAX_PIC_DIMENSION)?;
    if value == 0 {
        Err(SpsError::FieldValueTooSmall { name, value })
    } else {
        Ok(value)
    }
}

/// Writes the SPS RBSP with `pic_width_in_luma_samples` / `pic_height_in_luma_samples`
/// replaced by `width` and `height`.
pub fn write_sps<W: Write>(
    sps: &SeqParameterSet,
    width: u32,
    height: u32,
    w: &mut BitWriter<W>,
) -> Result<(), WriteError> {
    if sps.long_term_ref_pics.is_some() {
        return Err(WriteError::Unsupported("long_term_ref_pics_present_flag"));
    }
    w.write_bits(4, u32::from(sps.sps_video_parameter_set_id))?;
    w.write_bits(3, u32::from(sps.sps_max_sub_layers_minus1))?;
    w.write_bit(sps.sps_temporal_id_nesting_flag)?;
    sps.profile_tier_level.write(w)?;
    w.write_ue(u32::from(sps.seq_parameter_set_id.id()))?;
    w.write_ue(sps.chroma_format.chroma_format_idc())?;
    if sps.chroma_format == ChromaFormat::YUV444 {
        w.write_bit(sps.separate_colour_plane_flag)?;
    }
    w.write_ue(width)?;
    w.write_ue(height)?;
    Window::write(sps.conformance_window.as_ref(), w)?;
    w.write_ue(u32::from(sps.bit_depth_luma_minus8))?;
    w.write_ue(u32::from(sps.bit_depth_chroma_minus8))?;
    w.write_ue(u32::from(sps.log2_max_pic_order_cnt_lsb_minus4))?;
    w.write_bit(sps.sps_sub_layer_ordering_info_present_flag)?;
    SubLayerOrderingInfo::write_all(
        w,
        &sps.sub_layer_ordering_info,
        sps.sps_sub_layer_ordering_info_present_flag,
    )?;
    w.write_ue(u32::from(sps.log2_min_luma_coding_block_size_minus3))?;
    w.write_ue(u32::from(sps.log2_diff_max_min_luma_coding_block_size))?;
    w.write_ue(sps.log2_min_luma_transform_block_size_minus2)?;
    w.write_ue(sps.log2_diff_max_min_luma_transform_block_size)?;
    w.write_ue(sps.max_transform_hierarchy_depth_inter)?;
    w.write_ue(sps.max_transform_hierarchy_depth_intra)?;
    w.write_bit(sps.scaling_list_enabled_flag)?;
    if sps.scaling_list_enabled_flag {
        w.write_bit(sps.scaling_list_data.is_some())?;
        if let Some(ref data) = sps.scaling_list_data {
            data.write(w)?;
        }
    }
    w.write_bit(sps.amp_enabled_flag)?;
    w.write_bit(sps.sample_adaptive_offset_enabled_flag)?;
    w.write_bit(sps.pcm.is_some())?;
    if let Some(pcm) = sps.pcm {
        w.write_bits(4, u32::from(pcm.pcm_sample_bit_depth_luma_minus1))?;
        w.write_bits(4, u32::from(pcm.pcm_sample_bit_depth_chroma_minus1))?;
        w.write_ue(pcm.log2_min_pcm_luma_coding_block_size_minus3)?;
        w.write_ue(pcm.log2_diff_max_min_pcm_luma_coding_block_size)?;
        w.write_bit(pcm.pcm_loop_filter_disabled_flag)?;
    }
    let num_sets = sps.short_term_ref_pic_sets.len();
    w.write_ue(num_sets as u32)?;
    for (i, set) in sps.short_term_ref_pic_sets.iter().enumerate() {
        set.write(w, i, num_sets)?;
    }
    w.write_bit(false)?; // long_term_ref_pics_present_flag
    w.write_bit(sps.sps_temporal_mvp_enabled_flag)?;
    w.write_bit(sps.strong_intra_smoothing_enabled_flag)?;
    w.write_bit(sps.vui_parameters.is_some())?;
    if let Some(ref vui) = sps.vui_parameters {
        vui.write(w)?;
    }
    w.write_bit(sps.range_extension.is_some())?; // sps_extension_present_flag
    if let Some(ref ext) = sps.range_extension {
        w.write_bit(true)?; // sps_range_extension_flag
        w.write_bits(7, 0)?; // multilayer, 3d, scc, sps_extension_4bits
        ext.write(w)?;
    }
    w.write_rbsp_trailing_bits()
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::nal::ptl::ProfileInfo;
    use crate::rbsp::{decode_nal, unescape, BitReader};
    use hex_literal::hex;
    use test_case::test_case;

    /// 1920x1080 Main profile, 64x64 CTBs, conformance window cropping 8 lines
    pub(crate) fn sps_1080p() -> SeqParameterSet {
        SeqParameterSet {
            sps_video_parameter_set_id: 0,
            sps_max_sub_layers_minus1: 0,
            sps_temporal_id_nesting_flag: true,
            profile_tier_level: ProfileTierLevel {
                general_profile: ProfileInfo {
                    profile_idc: 1,
                    profile_compatibility_flags: 0x6000_0000,
                    progressive_source_flag: true,
                    frame_only_constraint_flag: true,
                    ..Default::default()
                },
                general_level_idc: 123,
                sub_layers: vec![],
            },
            seq_parameter_set_id: SeqParamSetId::from_u32(0).unwrap(),
            chroma_format: ChromaFormat::YUV420,
            separate_colour_plane_flag: false,
            pic_width_in_luma_samples: 1920,
            pic_height_in_luma_samples: 1088,
            conformance_window: Some(Window {
                bottom_offset: 4,
                ..Window::default()
            }),
            bit_depth_luma_minus8: 0,
            bit_depth_chroma_minus8: 0,
            log2_max_pic_order_cnt_lsb_minus4: 4,
            sps_sub_layer_ordering_info_present_flag: true,
            sub_layer_ordering_info: vec![SubLayerOrderingInfo {
                max_dec_pic_buffering_minus1: 4,
                max_num_reorder_pics: 2,
                max_latency_increase_plus1: 5,
            }],
            log2_min_luma_coding_block_size_minus3: 0,
            log2_diff_max_min_luma_coding_block_size: 3,
            log2_min_luma_transform_block_size_minus2: 0,
            log2_diff_max_min_luma_transform_block_size: 3,
            max_transform_hierarchy_depth_inter: 1,
            max_transform_hierarchy_depth_intra: 1,
            scaling_list_enabled_flag: false,
            scaling_list_data: None,
            amp_enabled_flag: false,
            sample_adaptive_offset_enabled_flag: true,
            pcm: None,
            short_term_ref_pic_sets: vec![],
            long_term_ref_pics: None,
            sps_temporal_mvp_enabled_flag: true,
            strong_intra_smoothing_enabled_flag: true,
            vui_parameters: None,
            range_extension: None,
            sps_extension_4bits: 0,
        }
    }

    fn written<F>(f: F) -> Vec<u8>
    where
        F: FnOnce(&mut BitWriter<Vec<u8>>) -> Result<(), WriteError>,
    {
        let mut w = BitWriter::new(Vec::new());
        f(&mut w).unwrap();
        unescape(&w.into_inner()).into_owned()
    }

    fn round_trip(sps: &SeqParameterSet) -> SeqParameterSet {
        let data = written(|w| {
            write_sps(
                sps,
                sps.pic_width_in_luma_samples,
                sps.pic_height_in_luma_samples,
                w,
            )
        });
        SeqParameterSet::from_bits(BitReader::new(&data)).unwrap()
    }

    fn explicit(negative: &[u32], positive: &[u32]) -> ShortTermRefPicSet {
        let data = written(|w| {
            w.write_ue(negative.len() as u32)?;
            w.write_ue(positive.len() as u32)?;
            for &d in negative.iter().chain(positive) {
                w.write_ue(d)?;
                w.write_bit(true)?;
            }
            w.write_rbsp_trailing_bits()
        });
        ShortTermRefPicSet::read(&mut BitReader::new(&data), 0, 1, &[]).unwrap()
    }

    pub(crate) const SPS_1080P: [u8; 32] = hex!(
        "42 01 01 01 60 00 00 03 00 90 00 00 03 00 00 03 00 7B A0 03 C0 80 11 07 CB 96
         56 69 24 48 AC 80"
    );

    #[test]
    fn parse_sps() {
        let rbsp = decode_nal(&SPS_1080P).unwrap();
        let sps = SeqParameterSet::from_bits(BitReader::new(&rbsp)).unwrap();
        assert_eq!(sps, sps_1080p());
        assert_eq!(sps.pixel_dimensions().unwrap(), (1920, 1080));
        assert_eq!(sps.log2_ctb_size(), 6);
        assert_eq!(sps.ctb_size(), 64);
        assert_eq!(sps.pic_width_in_ctbs(), 30);
        assert_eq!(sps.pic_height_in_ctbs(), 17);
        assert_eq!(sps.pic_size_in_ctbs(), 510);
        assert_eq!(sps.chroma_array_type(), 1);

        let mut w = BitWriter::new(Vec::new());
        write_sps(&sps, 1920, 1088, &mut w).unwrap();
        assert_eq!(&w.into_inner()[..], &SPS_1080P[2..]);
    }

    #[test]
    fn dimensions_overridden() {
        let sps = sps_1080p();
        let data = written(|w| write_sps(&sps, 960, 1088, w));
        let tile = SeqParameterSet::from_bits(BitReader::new(&data)).unwrap();
        assert_eq!(tile.pic_width_in_luma_samples, 960);
        assert_eq!(tile.pic_width_in_ctbs(), 15);
        assert_eq!(tile.pixel_dimensions().unwrap(), (960, 1080));
        let mut expected = sps.clone();
        expected.pic_width_in_luma_samples = 960;
        assert_eq!(tile, expected);
    }

    #[test]
    fn full_round_trip() {
        let mut sps = sps_1080p();
        sps.sps_max_sub_layers_minus1 = 1;
        sps.sps_sub_layer_ordering_info_present_flag = false;
        sps.sub_layer_ordering_info = vec![sps.sub_layer_ordering_info[0]; 2];
        sps.profile_tier_level.sub_layers = vec![Default::default()];
        sps.scaling_list_enabled_flag = true;
        sps.scaling_list_data = Some(ScalingListData {
            entries: ScalingListData::positions()
                .map(|(size_id, matrix_id)| {
                    if matrix_id == 0 {
                        let coef_num = 64.min(1 << (4 + (size_id << 1)));
                        ScalingListEntry::Explicit {
                            dc_coef_minus8: if size_id > 1 { Some(8) } else { None },
                            delta_coefs: (0..coef_num).map(|i| i % 5 - 2).collect(),
                        }
                    } else {
                        ScalingListEntry::Predicted {
                            pred_matrix_id_delta: 1,
                        }
                    }
                })
                .collect(),
        });
        sps.pcm = Some(PcmParams {
            pcm_sample_bit_depth_luma_minus1: 7,
            pcm_sample_bit_depth_chroma_minus1: 7,
            log2_min_pcm_luma_coding_block_size_minus3: 0,
            log2_diff_max_min_pcm_luma_coding_block_size: 2,
            pcm_loop_filter_disabled_flag: true,
        });
        sps.short_term_ref_pic_sets = vec![explicit(&[0, 1], &[]), explicit(&[0], &[3])];
        sps.vui_parameters = Some(VuiParameters {
            aspect_ratio_info: Some(AspectRatioInfo::Extended(4, 3)),
            overscan_appropriate: OverscanAppropriate::Inappropriate,
            video_signal_type: Some(VideoSignalType {
                video_format: VideoFormat::Unspecified,
                video_full_range_flag: false,
                colour_description: Some(ColourDescription {
                    colour_primaries: 9,
                    transfer_characteristics: 16,
                    matrix_coefficients: 9,
                }),
            }),
            chroma_loc_info: Some(ChromaLocInfo {
                chroma_sample_loc_type_top_field: 2,
                chroma_sample_loc_type_bottom_field: 2,
            }),
            default_display_window: Some(Window {
                left_offset: 8,
                ..Default::default()
            }),
            timing_info: Some(VuiTimingInfo {
                num_units_in_tick: 1001,
                time_scale: 60000,
                num_ticks_poc_diff_one_minus1: Some(0),
                hrd_parameters: Some(HrdParameters {
                    common_inf_present_flag: true,
                    common: Default::default(),
                    sub_layers: vec![Default::default(); 2],
                }),
            }),
            bitstream_restrictions: Some(BitstreamRestrictions {
                motion_vectors_over_pic_boundaries_flag: true,
                log2_max_mv_length_horizontal: 15,
                log2_max_mv_length_vertical: 15,
                ..Default::default()
            }),
            ..Default::default()
        });
        sps.range_extension = Some(SpsRangeExtension {
            implicit_rdpcm_enabled_flag: true,
            cabac_bypass_alignment_enabled_flag: true,
            ..Default::default()
        });
        assert_eq!(round_trip(&sps), sps);
    }

    #[test]
    fn inter_predicted_ref_pic_set() {
        // reference set: {-1, -3} negative, {2} positive
        let reference = explicit(&[0, 1], &[1]);
        assert_eq!(reference.delta_poc_s0, vec![-1, -3]);
        assert_eq!(reference.delta_poc_s1, vec![2]);
        // deltaRps = -1, keep everything
        let data = written(|w| {
            w.write_bit(true)?; // inter_ref_pic_set_prediction_flag
            w.write_bit(true)?; // delta_rps_sign
            w.write_ue(0)?; // abs_delta_rps_minus1
            for _ in 0..=reference.num_delta_pocs() {
                w.write_bit(true)?;
            }
            w.write_rbsp_trailing_bits()
        });
        let sets = [reference];
        let set = ShortTermRefPicSet::read(&mut BitReader::new(&data), 1, 2, &sets).unwrap();
        assert_eq!(set.delta_poc_s0, vec![-1, -2, -4]);
        assert_eq!(set.delta_poc_s1, vec![1]);
        assert_eq!(set.num_used_by_curr_pic(), 4);

        let rewritten = written(|w| {
            set.write(w, 1, 2)?;
            w.write_rbsp_trailing_bits()
        });
        assert_eq!(rewritten, data);
    }

    #[test]
    fn bad_ref_rps_idx() {
        // slice header set predicting from delta_idx_minus1 = 3 with only one SPS set
        let data = written(|w| {
            w.write_bit(true)?;
            w.write_ue(3)?;
            w.write_rbsp_trailing_bits()
        });
        let sets = [explicit(&[0], &[])];
        assert!(matches!(
            ShortTermRefPicSet::read(&mut BitReader::new(&data), 1, 1, &sets),
            Err(RefPicSetError::BadRefRpsIdx { .. })
        ));
    }

    #[test]
    fn long_term_refs_unsupported() {
        let mut sps = sps_1080p();
        sps.long_term_ref_pics = Some(LongTermRefPicsSps::default());
        let mut w = BitWriter::new(Vec::new());
        assert!(matches!(
            write_sps(&sps, 1920, 1088, &mut w),
            Err(WriteError::Unsupported(_))
        ));
    }

    #[test_case(0, ChromaFormat::Monochrome, (1, 1))]
    #[test_case(1, ChromaFormat::YUV420, (2, 2))]
    #[test_case(2, ChromaFormat::YUV422, (2, 1))]
    #[test_case(3, ChromaFormat::YUV444, (1, 1))]
    fn chroma_formats(idc: u32, format: ChromaFormat, sub_sampling: (u32, u32)) {
        let parsed = ChromaFormat::from_chroma_format_idc(idc).unwrap();
        assert_eq!(parsed, format);
        assert_eq!(parsed.chroma_format_idc(), idc);
        assert_eq!(parsed.sub_sampling(), sub_sampling);
    }

    #[test]
    fn multilayer_extension_rejected() {
        // sps_1080p() with sps_multilayer_extension_flag set
        let nal = hex!(
            "42 01 01 01 60 00 00 03 00 90 00 00 03 00 00 03 00 7B A0 03 C0 80 11 07 CB 96
             56 69 24 48 AD 40 80"
        );
        let rbsp = decode_nal(&nal).unwrap();
        assert!(matches!(
            SeqParameterSet::from_bits(BitReader::new(&rbsp)),
            Err(SpsError::UnsupportedExtension("sps_multilayer_extension"))
        ));
    }
}

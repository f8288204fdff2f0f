use super::sps::{self, ScalingListData, ScalingListError, SeqParamSetId, SeqParamSetIdError};
use crate::rbsp::{self, BitRead, BitWriter, WriteError};
use crate::Context;
use std::io::Write;

#[derive(Debug)]
pub enum PpsError {
    RbspReaderError(rbsp::BitReaderError),
    InvalidNumRefIdx(&'static str, u32),
    UnknownSeqParamSetId(SeqParamSetId),
    BadPicParamSetId(PicParamSetIdError),
    BadSeqParamSetId(SeqParamSetIdError),
    ScalingList(ScalingListError),
    /// A field in the bitstream had a value too large for the active SPS
    FieldValueTooLarge {
        name: &'static str,
        value: u32,
    },
    /// Multilayer, 3D and screen content coding extensions are not handled.
    UnsupportedExtension(&'static str),
}

impl From<rbsp::BitReaderError> for PpsError {
    fn from(e: rbsp::BitReaderError) -> Self {
        PpsError::RbspReaderError(e)
    }
}
impl From<ScalingListError> for PpsError {
    fn from(e: ScalingListError) -> Self {
        PpsError::ScalingList(e)
    }
}

#[derive(Debug, PartialEq)]
pub enum PicParamSetIdError {
    IdTooLarge(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PicParamSetId(u8);
impl PicParamSetId {
    pub fn from_u32(id: u32) -> Result<PicParamSetId, PicParamSetIdError> {
        if id > 63 {
            Err(PicParamSetIdError::IdTooLarge(id))
        } else {
            Ok(PicParamSetId(id as u8))
        }
    }
    pub fn id(self) -> u8 {
        self.0
    }
}

/// Whether (and how) the tile partitioning of a PPS is overridden when writing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceTile {
    /// Keep the source tile partitioning.
    Off,
    /// Write a single tile picture.
    Disable,
    /// Write a uniformly spaced grid of the requested size.
    Enable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileSpacing {
    Uniform,
    /// Widths and heights in CTBs, minus one, of every column / row but the last.
    Explicit {
        column_width_minus1: Vec<u32>,
        row_height_minus1: Vec<u32>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileInfo {
    pub num_tile_columns_minus1: u32,
    pub num_tile_rows_minus1: u32,
    pub spacing: TileSpacing,
    pub loop_filter_across_tiles_enabled_flag: bool,
}
impl TileInfo {
    fn read<R: BitRead>(r: &mut R, sps: &sps::SeqParameterSet) -> Result<TileInfo, PpsError> {
        let num_tile_columns_minus1 = r.read_ue("num_tile_columns_minus1")?;
        if num_tile_columns_minus1 >= sps.pic_width_in_ctbs() {
            return Err(PpsError::FieldValueTooLarge {
                name: "num_tile_columns_minus1",
                value: num_tile_columns_minus1,
            });
        }
        let num_tile_rows_minus1 = r.read_ue("num_tile_rows_minus1")?;
        if num_tile_rows_minus1 >= sps.pic_height_in_ctbs() {
            return Err(PpsError::FieldValueTooLarge {
                name: "num_tile_rows_minus1",
                value: num_tile_rows_minus1,
            });
        }
        let spacing = if r.read_bool("uniform_spacing_flag")? {
            TileSpacing::Uniform
        } else {
            TileSpacing::Explicit {
                column_width_minus1: (0..num_tile_columns_minus1)
                    .map(|_| r.read_ue("column_width_minus1"))
                    .collect::<Result<_, _>>()?,
                row_height_minus1: (0..num_tile_rows_minus1)
                    .map(|_| r.read_ue("row_height_minus1"))
                    .collect::<Result<_, _>>()?,
            }
        };
        Ok(TileInfo {
            num_tile_columns_minus1,
            num_tile_rows_minus1,
            spacing,
            loop_filter_across_tiles_enabled_flag: r
                .read_bool("loop_filter_across_tiles_enabled_flag")?,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeblockingFilterControl {
    pub deblocking_filter_override_enabled_flag: bool,
    pub pps_deblocking_filter_disabled_flag: bool,
    pub pps_beta_offset_div2: i32,
    pub pps_tc_offset_div2: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChromaQpOffsetList {
    pub diff_cu_chroma_qp_offset_depth: u32,
    pub cb_qp_offset_list: Vec<i32>,
    pub cr_qp_offset_list: Vec<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PpsRangeExtension {
    /// Present when `transform_skip_enabled_flag` is set.
    pub log2_max_transform_skip_block_size_minus2: Option<u32>,
    pub cross_component_prediction_enabled_flag: bool,
    pub chroma_qp_offset_list: Option<ChromaQpOffsetList>,
    pub log2_sao_offset_scale_luma: u32,
    pub log2_sao_offset_scale_chroma: u32,
}
impl PpsRangeExtension {
    fn read<R: BitRead>(
        r: &mut R,
        transform_skip_enabled_flag: bool,
    ) -> Result<PpsRangeExtension, PpsError> {
        let log2_max_transform_skip_block_size_minus2 = if transform_skip_enabled_flag {
            Some(r.read_ue("log2_max_transform_skip_block_size_minus2")?)
        } else {
            None
        };
        let cross_component_prediction_enabled_flag =
            r.read_bool("cross_component_prediction_enabled_flag")?;
        let chroma_qp_offset_list = if r.read_bool("chroma_qp_offset_list_enabled_flag")? {
            let diff_cu_chroma_qp_offset_depth = r.read_ue("diff_cu_chroma_qp_offset_depth")?;
            let len_minus1 = r.read_ue("chroma_qp_offset_list_len_minus1")?;
            if len_minus1 > 5 {
                return Err(PpsError::FieldValueTooLarge {
                    name: "chroma_qp_offset_list_len_minus1",
                    value: len_minus1,
                });
            }
            let mut list = ChromaQpOffsetList {
                diff_cu_chroma_qp_offset_depth,
                ..ChromaQpOffsetList::default()
            };
            for _ in 0..=len_minus1 {
                list.cb_qp_offset_list.push(r.read_se("cb_qp_offset_list")?);
                list.cr_qp_offset_list.push(r.read_se("cr_qp_offset_list")?);
            }
            Some(list)
        } else {
            None
        };
        Ok(PpsRangeExtension {
            log2_max_transform_skip_block_size_minus2,
            cross_component_prediction_enabled_flag,
            chroma_qp_offset_list,
            log2_sao_offset_scale_luma: r.read_ue("log2_sao_offset_scale_luma")?,
            log2_sao_offset_scale_chroma: r.read_ue("log2_sao_offset_scale_chroma")?,
        })
    }

    fn write<W: Write>(&self, w: &mut BitWriter<W>) -> Result<(), WriteError> {
        if let Some(v) = self.log2_max_transform_skip_block_size_minus2 {
            w.write_ue(v)?;
        }
        w.write_bit(self.cross_component_prediction_enabled_flag)?;
        w.write_bit(self.chroma_qp_offset_list.is_some())?;
        if let Some(ref list) = self.chroma_qp_offset_list {
            if list.cb_qp_offset_list.is_empty()
                || list.cb_qp_offset_list.len() != list.cr_qp_offset_list.len()
            {
                return Err(WriteError::InvalidValue {
                    name: "chroma_qp_offset_list_len_minus1",
                    value: list.cb_qp_offset_list.len() as i64 - 1,
                });
            }
            w.write_ue(list.diff_cu_chroma_qp_offset_depth)?;
            w.write_ue(list.cb_qp_offset_list.len() as u32 - 1)?;
            for (&cb, &cr) in list.cb_qp_offset_list.iter().zip(&list.cr_qp_offset_list) {
                w.write_se(cb)?;
                w.write_se(cr)?;
            }
        }
        w.write_ue(self.log2_sao_offset_scale_luma)?;
        w.write_ue(self.log2_sao_offset_scale_chroma)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PicParameterSet {
    pub pic_parameter_set_id: PicParamSetId,
    pub seq_parameter_set_id: SeqParamSetId,
    pub dependent_slice_segments_enabled_flag: bool,
    pub output_flag_present_flag: bool,
    pub num_extra_slice_header_bits: u8,
    pub sign_data_hiding_enabled_flag: bool,
    pub cabac_init_present_flag: bool,
    pub num_ref_idx_l0_default_active_minus1: u32,
    pub num_ref_idx_l1_default_active_minus1: u32,
    pub init_qp_minus26: i32,
    pub constrained_intra_pred_flag: bool,
    pub transform_skip_enabled_flag: bool,
    /// `diff_cu_qp_delta_depth`, present when `cu_qp_delta_enabled_flag` is set.
    pub diff_cu_qp_delta_depth: Option<u32>,
    pub pps_cb_qp_offset: i32,
    pub pps_cr_qp_offset: i32,
    pub pps_slice_chroma_qp_offsets_present_flag: bool,
    pub weighted_pred_flag: bool,
    pub weighted_bipred_flag: bool,
    pub transquant_bypass_enabled_flag: bool,
    /// `Some` when `tiles_enabled_flag` is set.
    pub tiles: Option<TileInfo>,
    pub entropy_coding_sync_enabled_flag: bool,
    pub pps_loop_filter_across_slices_enabled_flag: bool,
    pub deblocking_filter_control: Option<DeblockingFilterControl>,
    pub scaling_list_data: Option<ScalingListData>,
    pub lists_modification_present_flag: bool,
    pub log2_parallel_merge_level_minus2: u32,
    pub slice_segment_header_extension_present_flag: bool,
    pub range_extension: Option<PpsRangeExtension>,
    /// `pps_extension_4bits`; the extension data itself is ignored.
    pub pps_extension_4bits: u8,
}
impl PicParameterSet {
    pub fn from_bits<R: BitRead>(ctx: &Context, mut r: R) -> Result<PicParameterSet, PpsError> {
        let pic_parameter_set_id = PicParamSetId::from_u32(r.read_ue("pps_pic_parameter_set_id")?)
            .map_err(PpsError::BadPicParamSetId)?;
        let seq_parameter_set_id =
            SeqParamSetId::from_u32(r.read_ue("pps_seq_parameter_set_id")?)
                .map_err(PpsError::BadSeqParamSetId)?;
        let seq_parameter_set = ctx
            .sps_by_id(seq_parameter_set_id)
            .ok_or(PpsError::UnknownSeqParamSetId(seq_parameter_set_id))?;
        let dependent_slice_segments_enabled_flag =
            r.read_bool("dependent_slice_segments_enabled_flag")?;
        let output_flag_present_flag = r.read_bool("output_flag_present_flag")?;
        let num_extra_slice_header_bits = r.read_u8(3, "num_extra_slice_header_bits")?;
        let sign_data_hiding_enabled_flag = r.read_bool("sign_data_hiding_enabled_flag")?;
        let cabac_init_present_flag = r.read_bool("cabac_init_present_flag")?;
        let num_ref_idx_l0_default_active_minus1 =
            read_num_ref_idx(&mut r, "num_ref_idx_l0_default_active_minus1")?;
        let num_ref_idx_l1_default_active_minus1 =
            read_num_ref_idx(&mut r, "num_ref_idx_l1_default_active_minus1")?;
        let init_qp_minus26 = r.read_se("init_qp_minus26")?;
        let constrained_intra_pred_flag = r.read_bool("constrained_intra_pred_flag")?;
        let transform_skip_enabled_flag = r.read_bool("transform_skip_enabled_flag")?;
        let diff_cu_qp_delta_depth = if r.read_bool("cu_qp_delta_enabled_flag")? {
            Some(r.read_ue("diff_cu_qp_delta_depth")?)
        } else {
            None
        };
        let pps_cb_qp_offset = r.read_se("pps_cb_qp_offset")?;
        let pps_cr_qp_offset = r.read_se("pps_cr_qp_offset")?;
        let pps_slice_chroma_qp_offsets_present_flag =
            r.read_bool("pps_slice_chroma_qp_offsets_present_flag")?;
        let weighted_pred_flag = r.read_bool("weighted_pred_flag")?;
        let weighted_bipred_flag = r.read_bool("weighted_bipred_flag")?;
        let transquant_bypass_enabled_flag = r.read_bool("transquant_bypass_enabled_flag")?;
        let tiles_enabled_flag = r.read_bool("tiles_enabled_flag")?;
        let entropy_coding_sync_enabled_flag = r.read_bool("entropy_coding_sync_enabled_flag")?;
        let tiles = if tiles_enabled_flag {
            Some(TileInfo::read(&mut r, seq_parameter_set)?)
        } else {
            None
        };
        let pps_loop_filter_across_slices_enabled_flag =
            r.read_bool("pps_loop_filter_across_slices_enabled_flag")?;
        let deblocking_filter_control = if r.read_bool("deblocking_filter_control_present_flag")? {
            let deblocking_filter_override_enabled_flag =
                r.read_bool("deblocking_filter_override_enabled_flag")?;
            let pps_deblocking_filter_disabled_flag =
                r.read_bool("pps_deblocking_filter_disabled_flag")?;
            let (pps_beta_offset_div2, pps_tc_offset_div2) = if pps_deblocking_filter_disabled_flag
            {
                (0, 0)
            } else {
                (
                    r.read_se("pps_beta_offset_div2")?,
                    r.read_se("pps_tc_offset_div2")?,
                )
            };
            Some(DeblockingFilterControl {
                deblocking_filter_override_enabled_flag,
                pps_deblocking_filter_disabled_flag,
                pps_beta_offset_div2,
                pps_tc_offset_div2,
            })
        } else {
            None
        };
        let scaling_list_data = if r.read_bool("pps_scaling_list_data_present_flag")? {
            Some(ScalingListData::read(&mut r)?)
        } else {
            None
        };
        let lists_modification_present_flag = r.read_bool("lists_modification_present_flag")?;
        let log2_parallel_merge_level_minus2 = r.read_ue("log2_parallel_merge_level_minus2")?;
        if log2_parallel_merge_level_minus2 + 2 > seq_parameter_set.log2_ctb_size() {
            return Err(PpsError::FieldValueTooLarge {
                name: "log2_parallel_merge_level_minus2",
                value: log2_parallel_merge_level_minus2,
            });
        }
        let slice_segment_header_extension_present_flag =
            r.read_bool("slice_segment_header_extension_present_flag")?;

        let mut range_extension = None;
        let mut pps_extension_4bits = 0;
        if r.read_bool("pps_extension_present_flag")? {
            let pps_range_extension_flag = r.read_bool("pps_range_extension_flag")?;
            if r.read_bool("pps_multilayer_extension_flag")? {
                return Err(PpsError::UnsupportedExtension("pps_multilayer_extension"));
            }
            if r.read_bool("pps_3d_extension_flag")? {
                return Err(PpsError::UnsupportedExtension("pps_3d_extension"));
            }
            if r.read_bool("pps_scc_extension_flag")? {
                return Err(PpsError::UnsupportedExtension("pps_scc_extension"));
            }
            pps_extension_4bits = r.read_u8(4, "pps_extension_4bits")?;
            if pps_range_extension_flag {
                range_extension = Some(PpsRangeExtension::read(
                    &mut r,
                    transform_skip_enabled_flag,
                )?);
            }
        }
        if pps_extension_4bits == 0 {
            r.finish_rbsp()?;
        }

        Ok(PicParameterSet {
            pic_parameter_set_id,
            seq_parameter_set_id,
            dependent_slice_segments_enabled_flag,
            output_flag_present_flag,
            num_extra_slice_header_bits,
            sign_data_hiding_enabled_flag,
            cabac_init_present_flag,
            num_ref_idx_l0_default_active_minus1,
            num_ref_idx_l1_default_active_minus1,
            init_qp_minus26,
            constrained_intra_pred_flag,
            transform_skip_enabled_flag,
            diff_cu_qp_delta_depth,
            pps_cb_qp_offset,
            pps_cr_qp_offset,
            pps_slice_chroma_qp_offsets_present_flag,
            weighted_pred_flag,
            weighted_bipred_flag,
            transquant_bypass_enabled_flag,
            tiles,
            entropy_coding_sync_enabled_flag,
            pps_loop_filter_across_slices_enabled_flag,
            deblocking_filter_control,
            scaling_list_data,
            lists_modification_present_flag,
            log2_parallel_merge_level_minus2,
            slice_segment_header_extension_present_flag,
            range_extension,
            pps_extension_4bits,
        })
    }

    pub fn id(&self) -> PicParamSetId {
        self.pic_parameter_set_id
    }

    pub fn tiles_enabled_flag(&self) -> bool {
        self.tiles.is_some()
    }

    /// Number of tile columns, one when tiles are disabled.
    pub fn num_tile_columns(&self) -> u32 {
        self.tiles
            .as_ref()
            .map_or(1, |t| t.num_tile_columns_minus1 + 1)
    }

    /// Number of tile rows, one when tiles are disabled.
    pub fn num_tile_rows(&self) -> u32 {
        self.tiles.as_ref().map_or(1, |t| t.num_tile_rows_minus1 + 1)
    }

    /// Inferred to be set when tiles are disabled.
    pub fn loop_filter_across_tiles_enabled_flag(&self) -> bool {
        self.tiles
            .as_ref()
            .map_or(true, |t| t.loop_filter_across_tiles_enabled_flag)
    }

    pub fn deblocking_filter_override_enabled_flag(&self) -> bool {
        self.deblocking_filter_control
            .map_or(false, |d| d.deblocking_filter_override_enabled_flag)
    }

    pub fn pps_deblocking_filter_disabled_flag(&self) -> bool {
        self.deblocking_filter_control
            .map_or(false, |d| d.pps_deblocking_filter_disabled_flag)
    }

    pub fn chroma_qp_offset_list_enabled_flag(&self) -> bool {
        self.range_extension
            .as_ref()
            .map_or(false, |e| e.chroma_qp_offset_list.is_some())
    }
}

fn read_num_ref_idx<R: BitRead>(r: &mut R, name: &'static str) -> Result<u32, PpsError> {
    let val = r.read_ue(name)?;
    if val > 14 {
        return Err(PpsError::InvalidNumRefIdx(name, val));
    }
    Ok(val)
}

/// Writes the PPS RBSP, overriding the tile partitioning as requested by `force_tile`.
///
/// `columns` and `rows` give the grid written for [`ForceTile::Enable`] and are ignored
/// otherwise. `dependent_slice_segments_enabled_flag` is always cleared, since rewritten slice
/// segments are all independent.
pub fn write_pps<W: Write>(
    pps: &PicParameterSet,
    force_tile: ForceTile,
    columns: u32,
    rows: u32,
    w: &mut BitWriter<W>,
) -> Result<(), WriteError> {
    w.write_ue(u32::from(pps.pic_parameter_set_id.id()))?;
    w.write_ue(u32::from(pps.seq_parameter_set_id.id()))?;
    w.write_bit(false)?; // dependent_slice_segments_enabled_flag
    w.write_bit(pps.output_flag_present_flag)?;
    w.write_bits(3, u32::from(pps.num_extra_slice_header_bits))?;
    w.write_bit(pps.sign_data_hiding_enabled_flag)?;
    w.write_bit(pps.cabac_init_present_flag)?;
    w.write_ue(pps.num_ref_idx_l0_default_active_minus1)?;
    w.write_ue(pps.num_ref_idx_l1_default_active_minus1)?;
    w.write_se(pps.init_qp_minus26)?;
    w.write_bit(pps.constrained_intra_pred_flag)?;
    w.write_bit(pps.transform_skip_enabled_flag)?;
    w.write_bit(pps.diff_cu_qp_delta_depth.is_some())?;
    if let Some(depth) = pps.diff_cu_qp_delta_depth {
        w.write_ue(depth)?;
    }
    w.write_se(pps.pps_cb_qp_offset)?;
    w.write_se(pps.pps_cr_qp_offset)?;
    w.write_bit(pps.pps_slice_chroma_qp_offsets_present_flag)?;
    w.write_bit(pps.weighted_pred_flag)?;
    w.write_bit(pps.weighted_bipred_flag)?;
    w.write_bit(pps.transquant_bypass_enabled_flag)?;
    match (force_tile, &pps.tiles) {
        (ForceTile::Enable, _) => {
            if columns == 0 || rows == 0 {
                return Err(WriteError::InvalidValue {
                    name: "num_tile_columns_minus1",
                    value: i64::from(columns.min(rows)) - 1,
                });
            }
            w.write_bit(true)?;
            w.write_bit(pps.entropy_coding_sync_enabled_flag)?;
            w.write_ue(columns - 1)?;
            w.write_ue(rows - 1)?;
            w.write_bit(true)?; // uniform_spacing_flag
            w.write_bit(pps.loop_filter_across_tiles_enabled_flag())?;
        }
        (ForceTile::Off, Some(tiles)) => {
            w.write_bit(true)?;
            w.write_bit(pps.entropy_coding_sync_enabled_flag)?;
            w.write_ue(tiles.num_tile_columns_minus1)?;
            w.write_ue(tiles.num_tile_rows_minus1)?;
            match tiles.spacing {
                TileSpacing::Uniform => w.write_bit(true)?,
                TileSpacing::Explicit {
                    ref column_width_minus1,
                    ref row_height_minus1,
                } => {
                    w.write_bit(false)?;
                    for &width in column_width_minus1 {
                        w.write_ue(width)?;
                    }
                    for &height in row_height_minus1 {
                        w.write_ue(height)?;
                    }
                }
            }
            w.write_bit(tiles.loop_filter_across_tiles_enabled_flag)?;
        }
        (ForceTile::Off, None) | (ForceTile::Disable, _) => {
            w.write_bit(false)?;
            w.write_bit(pps.entropy_coding_sync_enabled_flag)?;
        }
    }
    w.write_bit(pps.pps_loop_filter_across_slices_enabled_flag)?;
    w.write_bit(pps.deblocking_filter_control.is_some())?;
    if let Some(d) = pps.deblocking_filter_control {
        w.write_bit(d.deblocking_filter_override_enabled_flag)?;
        w.write_bit(d.pps_deblocking_filter_disabled_flag)?;
        if !d.pps_deblocking_filter_disabled_flag {
            w.write_se(d.pps_beta_offset_div2)?;
            w.write_se(d.pps_tc_offset_div2)?;
        }
    }
    w.write_bit(pps.scaling_list_data.is_some())?;
    if let Some(ref data) = pps.scaling_list_data {
        data.write(w)?;
    }
    w.write_bit(pps.lists_modification_present_flag)?;
    w.write_ue(pps.log2_parallel_merge_level_minus2)?;
    w.write_bit(pps.slice_segment_header_extension_present_flag)?;
    w.write_bit(pps.range_extension.is_some())?; // pps_extension_present_flag
    if let Some(ref ext) = pps.range_extension {
        w.write_bit(true)?; // pps_range_extension_flag
        w.write_bits(7, 0)?; // multilayer, 3d, scc, pps_extension_4bits
        ext.write(w)?;
    }
    w.write_rbsp_trailing_bits()
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::nal::sps::test::sps_1080p;
    use crate::rbsp::{decode_nal, unescape, BitReader};
    use hex_literal::hex;

    /// Tiles enabled with two uniformly spaced columns and one row.
    pub(crate) const PPS_2X1: [u8; 7] = hex!("44 01 C0 71 84 BC 48");
    /// The same PPS without tiles.
    pub(crate) const PPS_NO_TILES: [u8; 6] = hex!("44 01 C0 71 81 12");

    pub(crate) fn context() -> Context {
        let mut ctx = Context::default();
        ctx.put_seq_param_set(sps_1080p());
        ctx
    }

    fn read(data: &[u8]) -> Result<PicParameterSet, PpsError> {
        PicParameterSet::from_bits(&context(), BitReader::new(data))
    }

    fn written(
        pps: &PicParameterSet,
        force_tile: ForceTile,
        columns: u32,
        rows: u32,
    ) -> Vec<u8> {
        let mut w = BitWriter::new(Vec::new());
        write_pps(pps, force_tile, columns, rows, &mut w).unwrap();
        unescape(&w.into_inner()).into_owned()
    }

    #[test]
    fn parse_tiled() {
        let rbsp = decode_nal(&PPS_2X1).unwrap();
        let pps = read(&rbsp).unwrap();
        assert_eq!(pps.id().id(), 0);
        assert_eq!(pps.seq_parameter_set_id.id(), 0);
        assert_eq!(
            pps.tiles,
            Some(TileInfo {
                num_tile_columns_minus1: 1,
                num_tile_rows_minus1: 0,
                spacing: TileSpacing::Uniform,
                loop_filter_across_tiles_enabled_flag: true,
            })
        );
        assert_eq!(pps.num_tile_columns(), 2);
        assert_eq!(pps.num_tile_rows(), 1);
        assert!(pps.pps_loop_filter_across_slices_enabled_flag);
        assert!(pps.deblocking_filter_control.is_none());

        // Off keeps the source partitioning bit for bit
        assert_eq!(written(&pps, ForceTile::Off, 0, 0), &rbsp[..]);
    }

    #[test]
    fn force_tile() {
        let rbsp = decode_nal(&PPS_2X1).unwrap();
        let pps = read(&rbsp).unwrap();

        let disabled = read(&written(&pps, ForceTile::Disable, 2, 1)).unwrap();
        assert!(disabled.tiles.is_none());
        assert_eq!(disabled.num_tile_columns(), 1);
        assert!(disabled.loop_filter_across_tiles_enabled_flag());

        let enabled = read(&written(&pps, ForceTile::Enable, 4, 3)).unwrap();
        assert_eq!(
            enabled.tiles,
            Some(TileInfo {
                num_tile_columns_minus1: 3,
                num_tile_rows_minus1: 2,
                spacing: TileSpacing::Uniform,
                loop_filter_across_tiles_enabled_flag: true,
            })
        );
        // everything but the tile fields is untouched
        let mut expected = enabled.clone();
        expected.tiles = pps.tiles.clone();
        assert_eq!(expected, pps);

        let mut w = BitWriter::new(Vec::new());
        assert!(matches!(
            write_pps(&pps, ForceTile::Enable, 0, 1, &mut w),
            Err(WriteError::InvalidValue { .. })
        ));
    }

    #[test]
    fn dependent_slices_cleared() {
        let rbsp = decode_nal(&PPS_2X1).unwrap();
        let mut pps = read(&rbsp).unwrap();
        pps.dependent_slice_segments_enabled_flag = true;
        let rewritten = read(&written(&pps, ForceTile::Off, 0, 0)).unwrap();
        assert!(!rewritten.dependent_slice_segments_enabled_flag);
    }

    #[test]
    fn explicit_spacing_and_extensions_round_trip() {
        let rbsp = decode_nal(&PPS_2X1).unwrap();
        let mut pps = read(&rbsp).unwrap();
        pps.pic_parameter_set_id = PicParamSetId::from_u32(63).unwrap();
        pps.tiles = Some(TileInfo {
            num_tile_columns_minus1: 2,
            num_tile_rows_minus1: 1,
            spacing: TileSpacing::Explicit {
                column_width_minus1: vec![9, 4],
                row_height_minus1: vec![7],
            },
            loop_filter_across_tiles_enabled_flag: false,
        });
        pps.transform_skip_enabled_flag = true;
        pps.diff_cu_qp_delta_depth = Some(1);
        pps.pps_cb_qp_offset = -2;
        pps.deblocking_filter_control = Some(DeblockingFilterControl {
            deblocking_filter_override_enabled_flag: true,
            pps_deblocking_filter_disabled_flag: false,
            pps_beta_offset_div2: -3,
            pps_tc_offset_div2: 2,
        });
        pps.range_extension = Some(PpsRangeExtension {
            log2_max_transform_skip_block_size_minus2: Some(1),
            cross_component_prediction_enabled_flag: false,
            chroma_qp_offset_list: Some(ChromaQpOffsetList {
                diff_cu_chroma_qp_offset_depth: 1,
                cb_qp_offset_list: vec![1, -1],
                cr_qp_offset_list: vec![2, -2],
            }),
            log2_sao_offset_scale_luma: 0,
            log2_sao_offset_scale_chroma: 0,
        });
        assert_eq!(read(&written(&pps, ForceTile::Off, 0, 0)).unwrap(), pps);
    }

    #[test]
    fn unknown_sps() {
        let mut pps = read(&decode_nal(&PPS_2X1).unwrap()).unwrap();
        pps.seq_parameter_set_id = SeqParamSetId::from_u32(1).unwrap();
        assert!(matches!(
            read(&written(&pps, ForceTile::Off, 0, 0)),
            Err(PpsError::UnknownSeqParamSetId(id)) if id.id() == 1
        ));
    }

    #[test]
    fn no_tiles() {
        let rbsp = decode_nal(&PPS_NO_TILES).unwrap();
        let pps = read(&rbsp).unwrap();
        assert!(!pps.tiles_enabled_flag());
        assert_eq!(written(&pps, ForceTile::Off, 3, 3), &rbsp[..]);
        assert_eq!(written(&pps, ForceTile::Disable, 3, 3), &rbsp[..]);
        let tiled = read(&decode_nal(&PPS_2X1).unwrap()).unwrap();
        assert_eq!(written(&pps, ForceTile::Enable, 2, 1), written(&tiled, ForceTile::Off, 0, 0));
    }

    #[test]
    fn too_many_tile_columns() {
        let rbsp = decode_nal(&PPS_2X1).unwrap();
        let mut pps = read(&rbsp).unwrap();
        pps.tiles = Some(TileInfo {
            num_tile_columns_minus1: 30,
            num_tile_rows_minus1: 0,
            spacing: TileSpacing::Uniform,
            loop_filter_across_tiles_enabled_flag: true,
        });
        assert!(matches!(
            read(&written(&pps, ForceTile::Off, 0, 0)),
            Err(PpsError::FieldValueTooLarge {
                name: "num_tile_columns_minus1",
                value: 30
            })
        ));
    }
}

//! Geometry of the tile partitioning that a PPS applies to the pictures of its SPS.

use crate::nal::pps::{PicParameterSet, TileSpacing};
use crate::nal::sps::SeqParameterSet;
use log::*;

/// Number of distinct `pps_pic_parameter_set_id` values.
pub const MAX_PPS_COUNT: usize = 64;

#[derive(Debug, PartialEq, Eq)]
pub enum TileLayoutError {
    /// The PPS does not set `tiles_enabled_flag`.
    TilesDisabled,
    /// Explicit column widths or row heights leave no room for the final column or row.
    ExplicitSizeOverflow { columns: bool },
    /// The parameter sets do not describe the same layout as an earlier one.
    Mismatch(&'static str),
}

/// Tile columns and rows of a picture, in luma samples and in CTBs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileLayout {
    pub num_tile_columns: u32,
    pub num_tile_rows: u32,
    pub log2_ctb_size: u32,
    pub ctb_width: u32,
    pub ctb_height: u32,
    pub width: u32,
    pub height: u32,
    /// Width in luma samples of each tile column.
    pub column_width: Vec<u32>,
    /// Height in luma samples of each tile row.
    pub row_height: Vec<u32>,
    /// Tile column of each CTB column.
    pub col_idx: Vec<u32>,
    /// Tile row of each CTB row.
    pub row_idx: Vec<u32>,
}
impl TileLayout {
    pub fn new(sps: &SeqParameterSet, pps: &PicParameterSet) -> Result<TileLayout, TileLayoutError> {
        let tiles = pps.tiles.as_ref().ok_or(TileLayoutError::TilesDisabled)?;
        let log2_ctb_size = sps.log2_ctb_size();
        let ctb_width = sps.pic_width_in_ctbs();
        let ctb_height = sps.pic_height_in_ctbs();
        let num_tile_columns = tiles.num_tile_columns_minus1 + 1;
        let num_tile_rows = tiles.num_tile_rows_minus1 + 1;
        let width = sps.pic_width_in_luma_samples;
        let height = sps.pic_height_in_luma_samples;

        let (column_width, row_height) = tile_sizes(sps, pps)?;
        let col_idx = ctb_to_tile(&column_width, ctb_width, log2_ctb_size);
        let row_idx = ctb_to_tile(&row_height, ctb_height, log2_ctb_size);

        let layout = TileLayout {
            num_tile_columns,
            num_tile_rows,
            log2_ctb_size,
            ctb_width,
            ctb_height,
            width,
            height,
            column_width,
            row_height,
            col_idx,
            row_idx,
        };
        debug!(
            "pps {} tile layout: ctb_size {}, ctb {}x{}, column_width {:?}, row_height {:?}",
            pps.id().id(),
            1 << log2_ctb_size,
            ctb_width,
            ctb_height,
            layout.column_width,
            layout.row_height
        );
        trace!("col_idx {:?}, row_idx {:?}", layout.col_idx, layout.row_idx);
        Ok(layout)
    }

    pub fn num_tiles(&self) -> usize {
        (self.num_tile_columns * self.num_tile_rows) as usize
    }

    /// Index, in raster order, of the tile containing the CTB at `slice_segment_address`.
    pub fn tile_index(&self, slice_segment_address: u32) -> Option<usize> {
        if self.ctb_width == 0 {
            return None;
        }
        let col = self.col_idx.get((slice_segment_address % self.ctb_width) as usize)?;
        let row = self.row_idx.get((slice_segment_address / self.ctb_width) as usize)?;
        let idx = (col + self.num_tile_columns * row) as usize;
        if idx < self.num_tiles() {
            Some(idx)
        } else {
            None
        }
    }

    /// Width and height in luma samples of the tile with index `tile_idx`.
    pub fn tile_geometry(&self, tile_idx: usize) -> Option<(u32, u32)> {
        let columns = self.num_tile_columns as usize;
        Some((
            *self.column_width.get(tile_idx % columns)?,
            *self.row_height.get(tile_idx / columns)?,
        ))
    }

    /// Checks that `sps` and `pps` describe pictures with the dimensions, CTB size and tile grid
    /// of this layout.
    pub fn matches(&self, sps: &SeqParameterSet, pps: &PicParameterSet) -> Result<(), TileLayoutError> {
        if !pps.tiles_enabled_flag() {
            return Err(TileLayoutError::TilesDisabled);
        }
        if sps.pic_width_in_luma_samples != self.width
            || sps.pic_height_in_luma_samples != self.height
        {
            return Err(TileLayoutError::Mismatch("picture size"));
        }
        if pps.num_tile_columns() != self.num_tile_columns
            || pps.num_tile_rows() != self.num_tile_rows
        {
            return Err(TileLayoutError::Mismatch("tile partition"));
        }
        if sps.log2_ctb_size() != self.log2_ctb_size {
            return Err(TileLayoutError::Mismatch("ctb size"));
        }
        let (column_width, row_height) = tile_sizes(sps, pps)?;
        if column_width != self.column_width || row_height != self.row_height {
            return Err(TileLayoutError::Mismatch("tile geometry"));
        }
        Ok(())
    }
}

/// Column widths and row heights, in luma samples, of the tiles `pps` places on pictures of
/// `sps`.
fn tile_sizes(
    sps: &SeqParameterSet,
    pps: &PicParameterSet,
) -> Result<(Vec<u32>, Vec<u32>), TileLayoutError> {
    let tiles = pps.tiles.as_ref().ok_or(TileLayoutError::TilesDisabled)?;
    let log2_ctb_size = sps.log2_ctb_size();
    let width = sps.pic_width_in_luma_samples;
    let height = sps.pic_height_in_luma_samples;
    Ok(match tiles.spacing {
        TileSpacing::Uniform => (
            uniform_sizes(
                tiles.num_tile_columns_minus1 + 1,
                sps.pic_width_in_ctbs(),
                log2_ctb_size,
                width,
            ),
            uniform_sizes(
                tiles.num_tile_rows_minus1 + 1,
                sps.pic_height_in_ctbs(),
                log2_ctb_size,
                height,
            ),
        ),
        TileSpacing::Explicit {
            ref column_width_minus1,
            ref row_height_minus1,
        } => (
            explicit_sizes(column_width_minus1, log2_ctb_size, width)
                .ok_or(TileLayoutError::ExplicitSizeOverflow { columns: true })?,
            explicit_sizes(row_height_minus1, log2_ctb_size, height)
                .ok_or(TileLayoutError::ExplicitSizeOverflow { columns: false })?,
        ),
    })
}

fn uniform_sizes(count: u32, ctbs: u32, log2_ctb_size: u32, total: u32) -> Vec<u32> {
    let mut sizes: Vec<u32> = (0..count - 1)
        .map(|i| (((i + 1) * ctbs) / count - (i * ctbs) / count) << log2_ctb_size)
        .collect();
    let used: u32 = sizes.iter().sum();
    sizes.push(total.saturating_sub(used));
    sizes
}

fn explicit_sizes(minus1: &[u32], log2_ctb_size: u32, total: u32) -> Option<Vec<u32>> {
    let mut sizes = Vec::with_capacity(minus1.len() + 1);
    let mut used = 0u32;
    for &m in minus1 {
        let size = m.checked_add(1)?.checked_shl(log2_ctb_size)?;
        used = used.checked_add(size)?;
        sizes.push(size);
    }
    if used >= total {
        return None;
    }
    sizes.push(total - used);
    Some(sizes)
}

/// Maps each CTB column (or row) to the tile column (or row) containing it.
fn ctb_to_tile(sizes: &[u32], ctbs: u32, log2_ctb_size: u32) -> Vec<u32> {
    let ctb_size = 1 << log2_ctb_size;
    let ctbs_in = |size: u32| (size + ctb_size - 1) >> log2_ctb_size;
    let mut idx = Vec::with_capacity(ctbs as usize);
    let mut tile = 0;
    let mut limit = sizes.first().map_or(0, |&s| ctbs_in(s));
    for i in 0..ctbs {
        while i >= limit && (tile as usize) < sizes.len() - 1 {
            tile += 1;
            limit += ctbs_in(sizes[tile as usize]);
        }
        idx.push(tile);
    }
    idx
}

/// Tile layouts indexed by `pps_pic_parameter_set_id`.
#[derive(Debug, Clone)]
pub struct LayoutTable {
    layouts: Vec<Option<TileLayout>>,
}
impl Default for LayoutTable {
    fn default() -> Self {
        LayoutTable {
            layouts: vec![None; MAX_PPS_COUNT],
        }
    }
}
impl LayoutTable {
    pub fn get(&self, pps_id: u8) -> Option<&TileLayout> {
        self.layouts.get(usize::from(pps_id)).and_then(Option::as_ref)
    }

    /// Returns the layout for `pps`, creating it on first use and otherwise checking that the
    /// parameter sets still agree with it.
    pub fn resolve(
        &mut self,
        sps: &SeqParameterSet,
        pps: &PicParameterSet,
    ) -> Result<&TileLayout, TileLayoutError> {
        let slot = &mut self.layouts[usize::from(pps.id().id())];
        match slot {
            Some(layout) => {
                layout.matches(sps, pps)?;
                Ok(layout)
            }
            None => Ok(slot.insert(TileLayout::new(sps, pps)?)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.iter().all(Option::is_none)
    }

    pub fn clear(&mut self) {
        for slot in &mut self.layouts {
            *slot = None;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::nal::pps::test::{context, PPS_2X1};
    use crate::nal::pps::{PicParamSetId, TileInfo};
    use crate::nal::sps::test::sps_1080p;
    use crate::rbsp::{decode_nal, BitReader};
    use test_case::test_case;

    fn pps_with(tiles: Option<TileInfo>) -> PicParameterSet {
        let rbsp = decode_nal(&PPS_2X1).unwrap();
        let mut pps = PicParameterSet::from_bits(&context(), BitReader::new(&rbsp)).unwrap();
        pps.tiles = tiles;
        pps
    }

    fn uniform(columns: u32, rows: u32) -> PicParameterSet {
        pps_with(Some(TileInfo {
            num_tile_columns_minus1: columns - 1,
            num_tile_rows_minus1: rows - 1,
            spacing: TileSpacing::Uniform,
            loop_filter_across_tiles_enabled_flag: true,
        }))
    }

    #[test]
    fn two_columns() {
        let layout = TileLayout::new(&sps_1080p(), &uniform(2, 1)).unwrap();
        assert_eq!(layout.num_tiles(), 2);
        assert_eq!(layout.ctb_width, 30);
        assert_eq!(layout.ctb_height, 17);
        assert_eq!(layout.column_width, vec![960, 960]);
        assert_eq!(layout.row_height, vec![1088]);
        assert_eq!(layout.tile_geometry(1), Some((960, 1088)));
        assert_eq!(layout.tile_index(0), Some(0));
        assert_eq!(layout.tile_index(14), Some(0));
        assert_eq!(layout.tile_index(15), Some(1));
        assert_eq!(layout.tile_index(30 + 15), Some(1));
        assert_eq!(layout.tile_index(30 * 17), None);
    }

    #[test_case(1, 1)]
    #[test_case(2, 1)]
    #[test_case(4, 3)]
    #[test_case(7, 5)]
    #[test_case(30, 17; "one ctb per tile")]
    fn uniform_geometry(columns: u32, rows: u32) {
        let sps = sps_1080p();
        let layout = TileLayout::new(&sps, &uniform(columns, rows)).unwrap();
        assert_eq!(layout.column_width.iter().sum::<u32>(), 1920);
        assert_eq!(layout.row_height.iter().sum::<u32>(), 1088);
        // all but the last column differ from one another by at most one CTB
        let inner = &layout.column_width[..layout.column_width.len() - 1];
        if let (Some(min), Some(max)) = (inner.iter().min(), inner.iter().max()) {
            assert!(max - min <= 64);
        }
        assert!(layout.col_idx.windows(2).all(|w| w[0] <= w[1]));
        assert!(layout.row_idx.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*layout.col_idx.last().unwrap(), columns - 1);
        assert_eq!(*layout.row_idx.last().unwrap(), rows - 1);
        for addr in 0..sps.pic_size_in_ctbs() {
            let idx = layout.tile_index(addr).unwrap();
            assert!(idx < layout.num_tiles());
        }
    }

    #[test]
    fn explicit_geometry() {
        let pps = pps_with(Some(TileInfo {
            num_tile_columns_minus1: 2,
            num_tile_rows_minus1: 1,
            spacing: TileSpacing::Explicit {
                column_width_minus1: vec![9, 4],
                row_height_minus1: vec![3],
            },
            loop_filter_across_tiles_enabled_flag: false,
        }));
        let layout = TileLayout::new(&sps_1080p(), &pps).unwrap();
        assert_eq!(layout.column_width, vec![640, 320, 960]);
        assert_eq!(layout.row_height, vec![256, 832]);
        assert_eq!(layout.tile_index(9), Some(0));
        assert_eq!(layout.tile_index(10), Some(1));
        assert_eq!(layout.tile_index(15), Some(2));
        assert_eq!(layout.tile_index(4 * 30), Some(3));
        assert_eq!(layout.tile_geometry(5), Some((960, 832)));
    }

    #[test]
    fn explicit_overflow() {
        let pps = pps_with(Some(TileInfo {
            num_tile_columns_minus1: 1,
            num_tile_rows_minus1: 0,
            spacing: TileSpacing::Explicit {
                column_width_minus1: vec![29],
                row_height_minus1: vec![],
            },
            loop_filter_across_tiles_enabled_flag: true,
        }));
        assert_eq!(
            TileLayout::new(&sps_1080p(), &pps),
            Err(TileLayoutError::ExplicitSizeOverflow { columns: true })
        );
    }

    #[test]
    fn tiles_disabled() {
        assert_eq!(
            TileLayout::new(&sps_1080p(), &pps_with(None)),
            Err(TileLayoutError::TilesDisabled)
        );
    }

    #[test]
    fn table_resolves_and_validates() {
        let mut table = LayoutTable::default();
        assert!(table.is_empty());
        let sps = sps_1080p();
        let pps = uniform(2, 1);
        assert_eq!(table.resolve(&sps, &pps).unwrap().num_tiles(), 2);
        assert!(table.get(0).is_some());

        assert_eq!(
            table.resolve(&sps, &uniform(3, 1)).err(),
            Some(TileLayoutError::Mismatch("tile partition"))
        );
        let mut narrow = sps_1080p();
        narrow.pic_width_in_luma_samples = 1280;
        assert_eq!(
            table.resolve(&narrow, &pps).err(),
            Some(TileLayoutError::Mismatch("picture size"))
        );
        // same counts, different spacing
        let explicit = pps_with(Some(TileInfo {
            num_tile_columns_minus1: 1,
            num_tile_rows_minus1: 0,
            spacing: TileSpacing::Explicit {
                column_width_minus1: vec![4],
                row_height_minus1: vec![],
            },
            loop_filter_across_tiles_enabled_flag: true,
        }));
        assert_eq!(
            table.resolve(&sps, &explicit).err(),
            Some(TileLayoutError::Mismatch("tile geometry"))
        );
        assert_eq!(table.get(0).unwrap().column_width, vec![960, 960]);
        assert!(table.resolve(&sps, &pps).is_ok());

        let mut other_id = uniform(3, 1);
        other_id.pic_parameter_set_id = PicParamSetId::from_u32(5).unwrap();
        assert_eq!(table.resolve(&sps, &other_id).unwrap().num_tiles(), 3);

        table.clear();
        assert!(table.is_empty());
    }
}

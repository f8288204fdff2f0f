//! Rewriting of tiled H265 (HEVC) bitstreams at the syntax layer.
//!
//! Pictures coded with a tile partitioning are split into one independently decodable stream
//! per tile ([`split`]), single pictures are re-addressed into a tile of a larger picture
//! ([`rawtotile`]), and per-tile pictures are gathered back into one access unit ([`repack`]).
//! Only parameter sets and slice segment headers are re-encoded; slice data is copied verbatim.

#![forbid(unsafe_code)]

pub mod annexb;
pub mod extradata;
pub mod hvcc;
pub mod nal;
pub mod packet;
pub mod rawtotile;
pub mod rbsp;
pub mod repack;
pub mod split;
pub mod tile;
pub mod unit;

use nal::pps::{PicParamSetId, PicParameterSet};
use nal::sps::{SeqParamSetId, SeqParameterSet};
use nal::vps::VideoParamSet;

/// Contextual data that needs to be tracked between evaluations of different portions of H265
/// syntax.
#[derive(Clone)]
pub struct Context {
    video_param_sets: Vec<Option<VideoParamSet>>,
    seq_param_sets: Vec<Option<SeqParameterSet>>,
    pic_param_sets: Vec<Option<PicParameterSet>>,
}
impl Default for Context {
    fn default() -> Self {
        Context {
            video_param_sets: vec![None; 16],
            seq_param_sets: vec![None; 16],
            pic_param_sets: vec![None; 64],
        }
    }
}
impl Context {
    #[inline]
    pub fn vps_by_id(&self, id: u8) -> Option<&VideoParamSet> {
        self.video_param_sets
            .get(usize::from(id))
            .and_then(Option::as_ref)
    }
    #[inline]
    pub fn vps(&self) -> impl Iterator<Item = &VideoParamSet> {
        self.video_param_sets.iter().filter_map(Option::as_ref)
    }
    #[inline]
    pub fn put_video_param_set(&mut self, vps: VideoParamSet) {
        let i = usize::from(vps.id());
        if let Some(slot) = self.video_param_sets.get_mut(i) {
            *slot = Some(vps);
        }
    }
    #[inline]
    pub fn sps_by_id(&self, id: SeqParamSetId) -> Option<&SeqParameterSet> {
        self.seq_param_sets[usize::from(id.id())].as_ref()
    }
    #[inline]
    pub fn sps(&self) -> impl Iterator<Item = &SeqParameterSet> {
        self.seq_param_sets.iter().filter_map(Option::as_ref)
    }
    #[inline]
    pub fn put_seq_param_set(&mut self, sps: SeqParameterSet) {
        let i = usize::from(sps.id().id());
        self.seq_param_sets[i] = Some(sps);
    }
    #[inline]
    pub fn pps_by_id(&self, id: PicParamSetId) -> Option<&PicParameterSet> {
        self.pic_param_sets[usize::from(id.id())].as_ref()
    }
    #[inline]
    pub fn pps(&self) -> impl Iterator<Item = &PicParameterSet> {
        self.pic_param_sets.iter().filter_map(Option::as_ref)
    }
    #[inline]
    pub fn put_pic_param_set(&mut self, pps: PicParameterSet) {
        let i = usize::from(pps.id().id());
        self.pic_param_sets[i] = Some(pps);
    }
}

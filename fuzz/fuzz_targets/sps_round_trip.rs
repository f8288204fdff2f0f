//! Fuzz test: decode(encode(decode(sps_rbsp))) == decode(sps_rbsp).
//!
//! Any SPS RBSP that parses and that the writer supports must re-encode to an SPS describing
//! the same sequence.

#![no_main]
use h265_tiles::nal::sps::{write_sps, SeqParameterSet};
use h265_tiles::rbsp::{unescape, BitReader, BitWriter};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let sps = match SeqParameterSet::from_bits(BitReader::new(data)) {
        Ok(s) => s,
        Err(_) => return,
    };

    let mut bw = BitWriter::new(Vec::new());
    if write_sps(
        &sps,
        sps.pic_width_in_luma_samples,
        sps.pic_height_in_luma_samples,
        &mut bw,
    )
    .is_err()
    {
        return;
    }
    let encoded = bw.into_inner();
    let rbsp = unescape(&encoded);
    let reparsed = SeqParameterSet::from_bits(BitReader::new(&rbsp))
        .expect("re-encoded SPS should parse");
    assert_eq!(sps, reparsed, "decode(encode(sps)) != sps on {sps:#?}");
});

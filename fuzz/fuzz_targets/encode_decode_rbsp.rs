//! Checks that a NAL unit written by `BitWriter` decodes back to the RBSP bytes it was given,
//! however those bytes are split across `write_payload()` calls.

#![no_main]
use h265_tiles::nal::UnitType;
use h265_tiles::rbsp::{decode_nal, BitWriter};
use hex_slice::AsHex;
use libfuzzer_sys::fuzz_target;

const START_CODE_LEN: usize = 4;

fuzz_target!(|data: &[u8]| {
    // the first byte picks where the payload is split
    let (split, rbsp) = match data.split_first() {
        Some((&split, rbsp)) => (usize::from(split).min(rbsp.len()), rbsp),
        None => return,
    };
    let (head, tail) = rbsp.split_at(split);
    let mut w = BitWriter::new(Vec::new());
    w.write_nal_header(UnitType::PrefixSeiNut, 0, true).unwrap();
    w.write_payload(head).unwrap();
    w.write_payload(tail).unwrap();
    let written = w.into_inner();

    let decoded = decode_nal(&written[START_CODE_LEN..]).unwrap();
    assert_eq!(
        &*decoded,
        rbsp,
        "{:02x} written as {:02x}",
        rbsp.as_hex(),
        written.as_hex()
    );
});

//! Tests the Annex B splitter doesn't crash, and that the units it finds are non-empty,
//! contain no start code, and appear in order within the input.

#![no_main]
use hex_slice::AsHex;
use h265_tiles::annexb::nal_units;
use libfuzzer_sys::fuzz_target;
use memchr::memmem;

fuzz_target!(|data: &[u8]| {
    let units = match nal_units(data) {
        Ok(units) => units,
        Err(_) => return,
    };
    let mut last_end = 0;
    for unit in units {
        let start = unit.framed.as_ptr() as usize - data.as_ptr() as usize;
        assert!(start >= last_end, "units overlap in {:02x}", data.as_hex());
        last_end = start + unit.framed.len();
        assert!(!unit.nal.is_empty());
        assert!(unit.framed.ends_with(unit.nal));
        assert_ne!(unit.nal.last(), Some(&0x00), "trailing zero kept: {:02x}", unit.nal.as_hex());
        assert!(
            memmem::find(unit.nal, &[0x00, 0x00, 0x01]).is_none(),
            "start code inside {:02x}",
            unit.nal.as_hex()
        );
    }
});

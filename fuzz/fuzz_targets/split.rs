//! Feeds arbitrary access units through the rewriting engines, which must never panic and must
//! only hand out packets for tiles that exist.

#![no_main]
use h265_tiles::packet::Packet;
use h265_tiles::rawtotile::{RawToTile, TileOptions};
use h265_tiles::split::FrameSplitter;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut splitter = FrameSplitter::default();
    // the same bytes twice, so the second access unit meets the parameter sets of the first
    for _ in 0..2 {
        if splitter.send(Packet::new(data.to_vec())).is_err() {
            continue;
        }
        while let Ok(Some(p)) = splitter.receive() {
            if let Some(tile) = p.tile_index {
                assert!(tile < splitter.num_tiles());
            }
        }
    }

    let options = TileOptions {
        width: 3840,
        height: 2160,
        column: 2,
        row: 2,
        x: 1920,
        y: 1088,
    };
    let mut merge = RawToTile::new(options).unwrap();
    let _ = merge.filter(Packet::new(data.to_vec()));
});

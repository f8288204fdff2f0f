#[macro_use]
extern crate criterion;

use criterion::{Criterion, Throughput};
use h265_tiles::packet::Packet;
use h265_tiles::rawtotile::{RawToTile, TileOptions};
use h265_tiles::repack::TileRepacker;
use h265_tiles::split::FrameSplitter;
use std::hint::black_box;

/// VPS, SPS and PPS of a 1920x1080 stream coded as two tile columns.
const PARAMETER_SETS: &[&[u8]] = &[
    &[
        0x40, 0x01, 0x0C, 0x01, 0xFF, 0xFF, 0x01, 0x60, 0x00, 0x00, 0x03, 0x00, 0x90, 0x00, 0x00,
        0x03, 0x00, 0x00, 0x03, 0x00, 0x7B, 0x95, 0x98, 0x09,
    ],
    &[
        0x42, 0x01, 0x01, 0x01, 0x60, 0x00, 0x00, 0x03, 0x00, 0x90, 0x00, 0x00, 0x03, 0x00, 0x00,
        0x03, 0x00, 0x7B, 0xA0, 0x03, 0xC0, 0x80, 0x11, 0x07, 0xCB, 0x96, 0x56, 0x69, 0x24, 0x48,
        0xAC, 0x80,
    ],
    &[0x44, 0x01, 0xC0, 0x71, 0x84, 0xBC, 0x48],
];
const PPS_NO_TILES: &[u8] = &[0x44, 0x01, 0xC0, 0x71, 0x81, 0x12];
const IDR_UNTILED: &[u8] = &[0x26, 0x01, 0xAF, 0x2E, 0xAF, 0x12, 0x00, 0x00, 0x03, 0x01, 0x80];
/// The IDR slice segment of each tile.
const SLICES: &[&[u8]] = &[
    &[0x26, 0x01, 0xAF, 0x2F, 0xAF, 0x12, 0x00, 0x00, 0x03, 0x01, 0x80],
    &[0x26, 0x01, 0x20, 0xF7, 0x97, 0x80, 0xC0, 0xFF, 0xEE, 0x01],
];

fn annexb(units: &[&[u8]], payload: usize) -> Vec<u8> {
    let mut data = vec![];
    for unit in units {
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x01]);
        data.extend_from_slice(unit);
        if unit[0] >> 1 & 0x3f < 32 {
            // stand-in for slice data, free of emulation prevention
            data.extend(std::iter::repeat(0xA5).take(payload));
        }
    }
    data
}

fn split(c: &mut Criterion) {
    let mut units = PARAMETER_SETS.to_vec();
    units.extend_from_slice(SLICES);
    let au = annexb(&units, 64 * 1024);
    let mut group = c.benchmark_group("split");
    group.throughput(Throughput::Bytes(au.len() as u64));
    group.bench_function("two_columns", |b| {
        let mut splitter = FrameSplitter::default();
        b.iter(|| {
            splitter.send(Packet::new(au.clone())).unwrap();
            while let Some(p) = splitter.receive().unwrap() {
                black_box(p);
            }
        });
    });
    group.finish();
}

fn merge(c: &mut Criterion) {
    let au = annexb(
        &[PARAMETER_SETS[0], PARAMETER_SETS[1], PPS_NO_TILES, IDR_UNTILED],
        64 * 1024,
    );
    let options = TileOptions {
        width: 3840,
        height: 2176,
        column: 2,
        row: 2,
        x: 1920,
        y: 1088,
    };
    let mut group = c.benchmark_group("merge");
    group.throughput(Throughput::Bytes(au.len() as u64));
    group.bench_function("raw_to_tile", |b| {
        let mut filter = RawToTile::new(options).unwrap();
        b.iter(|| black_box(filter.filter(Packet::new(au.clone())).unwrap()));
    });
    group.bench_function("repack", |b| {
        let mut repacker = TileRepacker::new(4).unwrap();
        b.iter(|| {
            let mut out = None;
            for tile in 0..4 {
                let mut p = Packet::new(au.clone());
                p.tile_index = Some(tile);
                out = repacker.push(p).unwrap();
            }
            black_box(out)
        });
    });
    group.finish();
}

criterion_group!(benches, split, merge);
criterion_main!(benches);

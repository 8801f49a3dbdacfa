use criterion::{black_box, criterion_group, criterion_main, Criterion};

use okto::prelude::*;

/// Busy counting loop with a draw in its body.
///
/// 0x200: LD  v0, 0
/// 0x202: LD  I, 0x20E
/// 0x204: DRW v0, v0, 4
/// 0x206: ADD v0, 1
/// 0x208: SE  v0, 0
/// 0x20A: JP  0x204
/// 0x20C: JP  0x20C
/// 0x20E: sprite data
#[rustfmt::skip]
const SPIN: &[u8] = &[
    0x60, 0x00,
    0xA2, 0x0E,
    0xD0, 0x04,
    0x70, 0x01,
    0x30, 0x00,
    0x12, 0x04,
    0x12, 0x0C,
    0x3C, 0xA5, 0xA5, 0x3C,
];

fn criterion_benchmark(c: &mut Criterion) {
    {
        let mut vm = OktoVm::new(OktoConf::default());
        vm.load_rom(SPIN).unwrap();

        c.bench_function("spin loop", |b| {
            b.iter(|| {
                let step_count = black_box(1000_usize);
                black_box(vm.run_steps(step_count))
            })
        });
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);

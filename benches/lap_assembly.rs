//! Benchmarks for the detection pipeline
//!
//! Measures:
//! - Appending in-order detections to a running race
//! - Re-deriving a pilot after a disqualification, by race length
//! - Feeding splits to the speed tracker

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use holeshot::LapAssembler;
use holeshot::speed::SpeedRecordTracker;
use holeshot::test_utils::{detection_at, running_race, split, split_detection_at};
use holeshot::types::Sector;
use std::hint::black_box;

fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("assemble");
    let assembler = LapAssembler::default();

    for pilot_count in [1usize, 4, 8] {
        group.bench_function(BenchmarkId::new("twenty_laps", pilot_count), |b| {
            b.iter(|| {
                let (mut race, pilots) = running_race(pilot_count);
                for lap in 0..20 {
                    for (offset, pilot) in pilots.iter().enumerate() {
                        let base = 1.0 + f64::from(lap) * 10.0 + offset as f64 * 0.1;
                        let _ = assembler.assemble(&mut race, split_detection_at(*pilot, 1, base + 5.0));
                        let _ = assembler.assemble(&mut race, detection_at(*pilot, base + 9.0));
                    }
                }
                black_box(race.laps().len())
            })
        });
    }

    group.finish();
}

fn bench_rederive(c: &mut Criterion) {
    let mut group = c.benchmark_group("rederive");
    let assembler = LapAssembler::default();

    for laps in [10u32, 50, 200] {
        let (mut race, pilots) = running_race(1);
        let pilot = pilots[0];
        let mut ids = Vec::new();
        for lap in 0..laps {
            let assembled = assembler
                .assemble(&mut race, detection_at(pilot, 1.0 + f64::from(lap) * 10.0))
                .expect("in order");
            ids.push(assembled.detection);
        }
        let target = ids[ids.len() / 2];

        group.bench_function(BenchmarkId::new("disqualify_reinstate", laps), |b| {
            b.iter(|| {
                let _ = assembler.disqualify(&mut race, target);
                black_box(assembler.reinstate(&mut race, target).map(|c| c.rederived.renumbered))
            })
        });
    }

    group.finish();
}

fn bench_speed(c: &mut Criterion) {
    let mut group = c.benchmark_group("speed");
    let mut tracker = SpeedRecordTracker::new();
    tracker.initialize(&[0, 1], &[Sector::new(80.0), Sector::new(120.0)], Vec::new());

    let (_, pilots) = running_race(8);
    let splits: Vec<_> = pilots
        .iter()
        .flat_map(|&pilot| (1..50).map(move |i| split(pilot, i % 2, 2.0 + f64::from(i) * 0.1)))
        .collect();

    group.bench_function("check_split", |b| {
        b.iter(|| {
            for split in &splits {
                black_box(tracker.check_split(split));
            }
        })
    });

    group.bench_function("update", |b| b.iter(|| tracker.update(splits.iter().cloned())));

    group.finish();
}

criterion_group!(benches, bench_append, bench_rederive, bench_speed);
criterion_main!(benches);

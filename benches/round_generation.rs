//! Benchmarks for round generation
//!
//! Seeds growing fields of pilots into heats, with and without a calling
//! round whose channels the pilots try to keep.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use holeshot::format::{FormatContext, RoundFormat, RoundPlan, TopFormat};
use holeshot::test_utils::{pilots, raceband};
use holeshot::types::RoundId;
use holeshot::{PrimaryTimingSystemLocation, Race, Round, RoundType};
use std::hint::black_box;

fn bench_fresh_round(c: &mut Criterion) {
    let mut group = c.benchmark_group("top_format");

    for pilot_count in [8usize, 32, 128] {
        let plan = RoundPlan {
            pilots: pilots(pilot_count),
            channels: raceband(),
            number_of_races: pilot_count.div_ceil(4),
            calling_round: None,
            target_laps: 3,
        };
        let round = Round::new(1, RoundType::Round);

        group.bench_function(BenchmarkId::new("fresh", pilot_count), |b| {
            b.iter(|| {
                black_box(TopFormat.generate_round(&FormatContext::default(), &[], &round, &plan))
            })
        });
    }

    group.finish();
}

fn bench_seeded_round(c: &mut Criterion) {
    let mut group = c.benchmark_group("top_format");
    let channels = raceband();

    for pilot_count in [8usize, 32, 128] {
        let calling = RoundId::new();
        let field = pilots(pilot_count);
        let history: Vec<Race> = field
            .chunks(4)
            .zip(1u32..)
            .map(|(heat, number)| {
                let mut race = Race::new(calling, number);
                for (pilot, channel) in heat.iter().zip(channels.iter().step_by(2)) {
                    race.set_pilot(channel, *pilot).expect("free channel");
                }
                race
            })
            .collect();

        let plan = RoundPlan {
            pilots: field.iter().rev().copied().collect(),
            channels: channels.clone(),
            number_of_races: pilot_count.div_ceil(4),
            calling_round: Some(calling),
            target_laps: 3,
        };
        let round = Round::new(2, RoundType::Final);
        let context = FormatContext::new(&history, PrimaryTimingSystemLocation::Holeshot);

        group.bench_function(BenchmarkId::new("seeded", pilot_count), |b| {
            b.iter(|| black_box(TopFormat.generate_round(&context, &[], &round, &plan)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fresh_round, bench_seeded_round);
criterion_main!(benches);

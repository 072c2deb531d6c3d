//! Benchmarks for timeline merging, rule evaluation and block simulation

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use virtchan::{
    Battery, BatteryView, GroupBy, Limiter, MemorySource, Query, TimestampMerger, VirtualChannel,
    VirtualDefinition,
};
use virtchan_testdata::{Household, HouseholdScenario, LOAD, METER, PV};

fn household() -> MemorySource {
    Household::new(HouseholdScenario::SunnyDay).source(42)
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");

    let inputs: Vec<Vec<i64>> = (0..8)
        .map(|i| (0..10_000).map(|n| n * (7 + i) + i).collect())
        .collect();
    let total: usize = inputs.iter().map(|v| v.len()).sum();

    group.throughput(Throughput::Elements(total as u64));

    group.bench_function("merge_8x10000_timestamps", |b| {
        b.iter(|| {
            let mut merger = TimestampMerger::new();
            for input in &inputs {
                merger.add(input.clone().into_iter());
            }
            black_box(merger.count())
        })
    });

    group.finish();
}

fn bench_rule(c: &mut Criterion) {
    let mut group = c.benchmark_group("rule");

    let source = household();
    let definition = VirtualDefinition::new("max(in1() - in2(), 0)")
        .with_input("in1", PV)
        .with_input("in2", LOAD);
    let rows = VirtualChannel::from_source(&definition, &source, &Query::default())
        .map(|channel| channel.count())
        .unwrap_or(0);

    group.throughput(Throughput::Elements(rows as u64));

    group.bench_function("surplus_one_day", |b| {
        b.iter(|| {
            let channel = VirtualChannel::from_source(&definition, &source, &Query::default());
            black_box(channel.map(|c| c.count()))
        })
    });

    let grouped = Query::default().with_group_by(GroupBy::Hour);
    group.bench_function("surplus_one_day_hourly", |b| {
        b.iter(|| {
            let channel = VirtualChannel::from_source(&definition, &source, &grouped);
            black_box(channel.map(|c| c.count()))
        })
    });

    group.finish();
}

fn bench_blocks(c: &mut Criterion) {
    let mut group = c.benchmark_group("blocks");

    let source = household();
    let battery = Battery::new("home", PV, LOAD, 7.5);
    let limiter = Limiter::new("cap", METER, 1_000.0);

    group.bench_function("battery_level_one_day", |b| {
        b.iter(|| {
            let sim = battery.simulate(BatteryView::Level, &source, &Query::default());
            black_box(sim.map(|s| s.count()))
        })
    });

    group.bench_function("limiter_one_day", |b| {
        b.iter(|| {
            let out = limiter.open(&source, &Query::default());
            black_box(out.map(|o| o.count()))
        })
    });

    group.finish();
}

criterion_group!(benches, bench_merge, bench_rule, bench_blocks);
criterion_main!(benches);

//! 费用引擎性能基准测试
//!
//! 费用计算是报价与initiate的同步热路径，目标单次计算 < 10µs

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ironramp::{
    domain::payment::{Corridor, FeeHandling, PaymentMethod},
    service::fee_engine,
};
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy)]
enum AmountLevel {
    Small,
    Medium,
    Large,
}

impl AmountLevel {
    fn value(&self) -> Decimal {
        match self {
            Self::Small => Decimal::new(1000, 2),      // 10.00
            Self::Medium => Decimal::new(50000, 2),    // 500.00
            Self::Large => Decimal::new(1_000_000, 2), // 10000.00
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Small => "small_10",
            Self::Medium => "medium_500",
            Self::Large => "large_10000",
        }
    }
}

fn bench_fee_compute(c: &mut Criterion) {
    let mut group = c.benchmark_group("fee_compute");

    for level in [AmountLevel::Small, AmountLevel::Medium, AmountLevel::Large] {
        group.bench_with_input(
            BenchmarkId::new("ach_mxn_inclusive", level.name()),
            &level,
            |b, level| {
                b.iter(|| {
                    fee_engine::compute(
                        black_box(level.value()),
                        PaymentMethod::Ach,
                        Corridor::Mxn,
                        FeeHandling::Inclusive,
                    )
                })
            },
        );

        group.bench_with_input(
            BenchmarkId::new("card_ngn_additive", level.name()),
            &level,
            |b, level| {
                b.iter(|| {
                    fee_engine::compute(
                        black_box(level.value()),
                        PaymentMethod::Card,
                        Corridor::Ngn,
                        FeeHandling::Additive,
                    )
                })
            },
        );
    }

    group.finish();
}

fn bench_all_corridors(c: &mut Criterion) {
    c.bench_function("fee_compute_all_corridors", |b| {
        b.iter(|| {
            for corridor in Corridor::all() {
                let _ = fee_engine::compute(
                    black_box(Decimal::new(25_000, 2)),
                    PaymentMethod::Card,
                    corridor,
                    FeeHandling::Inclusive,
                );
            }
        })
    });
}

criterion_group!(benches, bench_fee_compute, bench_all_corridors);
criterion_main!(benches);

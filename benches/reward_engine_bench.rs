//! 奖励引擎性能基准测试
//!
//! 测试覆盖：
//! - 单笔奖励计算
//! - 不同候选数量下挑选最大奖励
//! - 默认规则评估

use chrono::Utc;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use promotion_engine::models::{EvaluationContext, Promotion, RateType};
use promotion_engine::rules::evaluate_default_rules;
use promotion_engine::test_utils::promotion_with_rate;
use promotion_engine::{calculate_reward, find_largest_reward};
use rust_decimal::Decimal;
use std::hint::black_box;

fn candidates(count: usize) -> Vec<Promotion> {
    (0..count)
        .map(|i| {
            let id = format!("p-{i}");
            if i % 2 == 0 {
                promotion_with_rate(&id, RateType::Fixed, Decimal::from(i as i64 + 1))
            } else {
                promotion_with_rate(&id, RateType::Percentage, Decimal::new(i as i64 * 25, 2))
            }
        })
        .collect()
}

fn bench_calculate_reward(c: &mut Criterion) {
    let amount = Decimal::new(23_345, 2);
    let rate = Decimal::new(525, 2);

    c.bench_function("calculate_reward_percentage", |b| {
        b.iter(|| calculate_reward(black_box(amount), RateType::Percentage, black_box(rate)))
    });
}

fn bench_find_largest_reward(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_largest_reward");
    let amount = Decimal::new(10_000, 2);

    for count in [1usize, 10, 100, 1000] {
        let promotions = candidates(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &promotions, |b, p| {
            b.iter(|| find_largest_reward(black_box(p.iter()), amount, "o-1", "c-1"))
        });
    }

    group.finish();
}

fn bench_default_rules(c: &mut Criterion) {
    let promotions = candidates(100);
    let today = Utc::now().date_naive();
    let amount = Decimal::new(10_000, 2);

    c.bench_function("evaluate_default_rules_100", |b| {
        b.iter(|| {
            promotions
                .iter()
                .filter(|p| {
                    evaluate_default_rules(
                        p,
                        black_box(amount),
                        EvaluationContext::OrderCreated,
                        Some("c-1"),
                        today,
                    )
                })
                .count()
        })
    });
}

criterion_group!(
    benches,
    bench_calculate_reward,
    bench_find_largest_reward,
    bench_default_rules
);
criterion_main!(benches);

//! 奖励计算
//!
//! 纯函数：按费率计算奖励金额，并在多个合格促销中挑出奖励最大的一个

use rust_decimal::{Decimal, RoundingStrategy};

use crate::models::{Promotion, RateType, Reward};

/// 计算单个促销的奖励金额
///
/// 固定金额原样返回；百分比按订单金额计算后保留两位小数，中点远离零舍入。
pub fn calculate_reward(order_amount: Decimal, rate_type: RateType, rate_amount: Decimal) -> Decimal {
    match rate_type {
        RateType::Fixed => rate_amount,
        RateType::Percentage => (order_amount * rate_amount / Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
    }
}

/// 挑选奖励最大的促销
///
/// 金额相同时取先出现的促销；列表为空时返回 None。
pub fn find_largest_reward<'a, I>(
    promotions: I,
    order_amount: Decimal,
    order_id: &str,
    customer_id: &str,
) -> Option<Reward>
where
    I: IntoIterator<Item = &'a Promotion>,
{
    largest(promotions, |promotion| promotion, order_amount)
        .map(|(amount, promotion)| reward_for(amount, promotion, order_id, customer_id))
}

/// 在携带促销的候选中挑选奖励最大的一项，连同候选本身返回
///
/// 规则同 [`find_largest_reward`]。
pub fn select_largest_reward<'a, T, F>(
    candidates: &'a [T],
    promotion_of: F,
    order_amount: Decimal,
    order_id: &str,
    customer_id: &str,
) -> Option<(Reward, &'a T)>
where
    F: Fn(&T) -> &Promotion,
{
    let (amount, candidate) = largest(candidates, &promotion_of, order_amount)?;
    let reward = reward_for(amount, promotion_of(candidate), order_id, customer_id);
    Some((reward, candidate))
}

fn largest<'a, T, I, F>(candidates: I, promotion_of: F, order_amount: Decimal) -> Option<(Decimal, &'a T)>
where
    T: 'a,
    I: IntoIterator<Item = &'a T>,
    F: Fn(&T) -> &Promotion,
{
    let mut best: Option<(Decimal, &'a T)> = None;

    for candidate in candidates {
        let promotion = promotion_of(candidate);
        let amount = calculate_reward(order_amount, promotion.reward_rate_type, promotion.rate_amount);
        match best {
            Some((current, _)) if amount <= current => {}
            _ => best = Some((amount, candidate)),
        }
    }

    best
}

fn reward_for(amount: Decimal, promotion: &Promotion, order_id: &str, customer_id: &str) -> Reward {
    Reward {
        amount,
        order_id: order_id.to_string(),
        customer_id: customer_id.to_string(),
        promotion_id: promotion.id.clone(),
    }
}

//! 订单奖励对账服务
//!
//! 消费订单生命周期消息（创建、退款、结算），维护客户订单奖励账本、
//! 促销客户名单与促销汇总，并向下游发布奖励余额变更通知。
//! 同时监听商户 / 促销变更，维护商户识别与优惠查询所用的缓存。

pub mod change_feed;
pub mod commands;
pub mod consumer;
pub mod error;
pub mod messages;
pub mod notification;
pub mod orchestrator;
pub mod processor;

//! IronRamp - 跨境支付编排服务
//!
//! USD转账意图 → 报价/计费 → 幂等创建 → 异步入金(USD→USDC)与
//! 出金(USDC→本地法币)，全程产出全序、持久的事件日志，
//! 通过SSE实时推送并以签名webhook投递。

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod repository;
pub mod security;
pub mod service;

// 重新导出常用类型
pub use app_state::AppState;
pub use error::{AppError, AppErrorCode};

//! 网关 / 模式路由：公共入口，按运行模式选择适配器并组合优化器与解码器。
//!
//! # Gateway
//!
//! ```text
//! caller → Gateway (validate, budget, mode → adapter) → ProviderAdapter
//!            │                                            │
//!            └── terminal guard (deadline, cancel) ◀── events ◀── StreamDecoder ◀── Optimizer
//! ```
//!
//! Mode selection is total: every [`Mode`] has exactly one adapter.

mod builder;
mod core;
pub mod health;
pub mod mode;

pub use self::builder::GatewayBuilder;
pub use self::core::{CancelHandle, Gateway};
pub use health::{HealthStatus, ProviderHealth};
pub use mode::Mode;

//! Token 估算模块：为本地预算检查提供与厂商无关的廉价 Token 计数。
//!
//! # Token Estimation
//!
//! A cheap, provider-independent heuristic used for local budget checks before a
//! request leaves the device. It is not a billing-accurate tokenizer.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`TokenCounter`] | Trait for token counting implementations |
//! | [`CharacterEstimator`] | Character-based approximation (4 chars ≈ 1 token) |
//! | [`estimate_token_count`] | Shortcut using the default estimator |
//!
//! ```rust
//! use ai_gateway::tokens::estimate_token_count;
//!
//! assert_eq!(estimate_token_count("Hello, how are you?"), 5);
//! assert_eq!(estimate_token_count(""), 0);
//! ```

mod counter;

pub use counter::{estimate_token_count, CharacterEstimator, TokenCounter};

//! 函数调用桥：校验模型提出的函数调用，分发给已注册的处理器并包装结果。
//!
//! # Function-Call Bridge
//!
//! A model's [`FunctionCall`](crate::types::FunctionCall) is untrusted. The bridge
//! checks it against the registered [`FunctionSignature`], coerces unambiguous
//! argument shapes (see [`coerce`]), dispatches to the [`FunctionHandler`] and wraps
//! whatever happens in an [`ExecutionResult`](crate::types::ExecutionResult).
//!
//! ```rust
//! use ai_gateway::bridge::{FunctionBridge, FunctionSignature, ParamSpec};
//! use ai_gateway::types::{ArgMap, ArgValue, FunctionCall};
//!
//! # tokio_test::block_on(async {
//! let bridge = FunctionBridge::new();
//! bridge
//!     .register_fn(
//!         FunctionSignature::new("log_water", "Record water intake")
//!             .param(ParamSpec::integer("ml").range(Some(1.0), Some(5000.0))),
//!         |args: ArgMap| async move { Ok(args) },
//!     )
//!     .unwrap();
//!
//! let mut arguments = ArgMap::new();
//! arguments.insert("ml".into(), ArgValue::from("250"));
//! let result = bridge.execute(&FunctionCall::new("log_water", arguments)).await;
//! assert!(result.success);
//! assert_eq!(result.data.unwrap()["ml"], ArgValue::Number(250.0));
//! # });
//! ```

pub mod coerce;
mod registry;
mod signature;

pub use registry::{FnHandler, FunctionBridge, FunctionHandler};
pub use signature::{FunctionSignature, ParamSpec, ParamType};

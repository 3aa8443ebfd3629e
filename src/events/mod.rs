//! 事件模块
//!
//! - `types.rs`: 上传生命周期事件与事件接收方
//! - `throttle.rs`: 进度事件节流

mod throttle;
mod types;

pub use throttle::*;
pub use types::*;

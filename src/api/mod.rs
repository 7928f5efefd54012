//! 只读 HTTP API
//!
//! 为前端面板提供存储统计和最新的分析结果。每个请求在阻塞线程上
//! 建立一次性存储会话。

pub mod routes;

pub use routes::{router, serve, ApiState};

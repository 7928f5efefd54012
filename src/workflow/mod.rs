//! 流程层（Workflow Layer）
//!
//! 定义"一个文件 / 一条公报"的完整处理流程，不持有存储会话。

pub mod analysis_flow;
pub mod classify_flow;
pub mod file_ctx;

pub use analysis_flow::AnalysisFlow;
pub use classify_flow::{classify_file, classify_measure, ClassifyOutcome};
pub use file_ctx::FileCtx;

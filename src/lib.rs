//! # BORA 分析系统
//!
//! 抓取阿根廷官方公报（Boletín Oficial），按标题标签分类统计，
//! 并用 LLM 对每条公报做批量分析。
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（远程存储会话），只暴露能力
//! - `ManagedSession` - 唯一的会话持有者，按策略重连
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个文件 / 单条公报
//! - `label_extractor` - 从标题 HTML 提取标签
//! - `page_elements` - 识别可能的签署人和 class 提示
//! - `ScrapeService` - 抓取并解析公报页面
//! - `LlmService` - LLM 调用能力
//! - `ResultEmitter` - 输出统计表和示例
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个文件"的完整处理流程
//! - `FileCtx` - 上下文封装（文件名 + 进度）
//! - `classify_file` / `AnalysisFlow`
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_classifier` - 可续跑的批量分类
//! - `orchestrator/batch_analyzer` - 批量 LLM 分析
//! - `orchestrator/scrape_runner` - 按日期抓取
//!
//! 另有 `api/` 提供只读 HTTP 接口。

pub mod api;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::{FtpConnector, MemoryConnector, StoreConnector};
pub use models::{Checkpoint, Measure};
pub use orchestrator::{BatchAnalyzer, BatchClassifier, ScrapeRunner};

//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和流程调度：持有存储会话、控制批次、输出统计。
//!
//! ## 模块划分
//!
//! ### `batch_classifier` - 批量标签分类
//! - 列出原始目录，跳过检查点中已处理的文件
//! - 按批下载、分类，每批结束保存检查点
//! - 错误上限、按数量/按批重连、本地暂存
//! - 完成后输出结果文件并删除检查点
//!
//! ### `batch_analyzer` - 批量 LLM 分析
//! - 只分析尚未生成分析结果的公报
//! - 上传单条分析结果和批量汇总
//!
//! ### `scrape_runner` - 公报抓取
//! - 按日期探测编号，保存到本地并可选上传
//! - `local_stats` 汇总本地已抓取的数据
//!
//! ### `store_check` - 存储连通性检查
//!
//! ## 层次关系
//!
//! ```text
//! batch_classifier / batch_analyzer / scrape_runner
//!     ↓
//! workflow (classify_file / AnalysisFlow)
//!     ↓
//! services (label_extractor / llm / scrape / result_emitter)
//!     ↓
//! infrastructure (ManagedSession / RemoteStore)
//! ```

pub mod batch_analyzer;
pub mod batch_classifier;
pub mod scrape_runner;
pub mod store_check;

pub use batch_analyzer::{AnalyzeReport, BatchAnalyzer};
pub use batch_classifier::{BatchClassifier, ClassifyReport};
pub use scrape_runner::{local_stats, MeasureSource, ScrapeRange, ScrapeReport, ScrapeRunner};
pub use store_check::{check_store, StoreCheckReport};

//! 分类流程 - 流程层
//!
//! 核心职责：定义"一个文件"的分类流程
//!
//! 流程顺序：
//! 1. 字节 → `Measure`
//! 2. 标题片段 → 标签 + 示例
//! 3. 记入检查点

use tracing::debug;

use crate::error::AppResult;
use crate::models::{Checkpoint, LabelExample, Measure};
use crate::services::label_extractor::{extract_label, heading_text};
use crate::workflow::file_ctx::FileCtx;

/// 没有 `<h2>` 时示例中使用的标题文本
const NO_HEADING_TEXT: &str = "N/A";

/// 单个文件的分类结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifyOutcome {
    /// 已计入检查点
    Recorded { label: String },
    /// 检查点中已存在，未重复计数
    AlreadyProcessed,
}

/// 提取一条公报的标签和示例
pub fn classify_measure(measure: &Measure) -> (String, LabelExample) {
    let html = measure.html_title();
    let label = extract_label(html);
    let example = LabelExample {
        h2_completo: heading_text(html).unwrap_or_else(|| NO_HEADING_TEXT.to_string()),
        fecha: measure.fecha_boletin.clone(),
        tiene_pdf: measure.tiene_pdf,
    };
    (label, example)
}

/// 处理一个已下载的文件；解析失败时返回错误且不修改检查点
pub fn classify_file(
    bytes: &[u8],
    ctx: &FileCtx,
    checkpoint: &mut Checkpoint,
) -> AppResult<ClassifyOutcome> {
    if checkpoint.is_processed(&ctx.name) {
        return Ok(ClassifyOutcome::AlreadyProcessed);
    }

    let measure = Measure::from_slice(bytes)?;
    let (label, example) = classify_measure(&measure);
    debug!("{} → {}", ctx, label);

    checkpoint.record(&ctx.name, &label, example);
    Ok(ClassifyOutcome::Recorded { label })
}

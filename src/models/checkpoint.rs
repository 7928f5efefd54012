//! 可恢复的批处理进度
//!
//! 每批结束后落盘；全部完成后删除。同一个文件名在多次续跑中最多统计一次。

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AppError, AppResult, FileError};
use crate::models::summary::{LabelExample, TypeRow, MAX_EXAMPLES_PER_LABEL};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    #[serde(rename = "archivos_procesados", default)]
    processed: BTreeSet<String>,
    #[serde(rename = "tipos", default)]
    counts: BTreeMap<String, u64>,
    #[serde(rename = "tiene_pdf_por_tipo", default)]
    pdf_counts: BTreeMap<String, u64>,
    #[serde(rename = "ejemplos_h2", default)]
    examples: BTreeMap<String, Vec<LabelExample>>,
    #[serde(rename = "timestamp", default)]
    updated_at: Option<DateTime<Local>>,
}

impl Checkpoint {
    /// 读取检查点；文件不存在时返回空检查点
    pub fn load(path: &Path) -> AppResult<Self> {
        match fs::read(path) {
            Ok(bytes) => {
                let checkpoint: Checkpoint = serde_json::from_slice(&bytes)?;
                info!(
                    "📂 已加载检查点 {}: {} 个文件已处理",
                    path.display(),
                    checkpoint.processed.len()
                );
                Ok(checkpoint)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("检查点 {} 不存在，从头开始", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(AppError::file_read_failed(path, e)),
        }
    }

    /// 原子写入：先写临时文件再重命名
    pub fn save(&mut self, path: &Path) -> AppResult<()> {
        self.updated_at = Some(Local::now());
        let json = serde_json::to_vec_pretty(self)?;

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = Path::new(&tmp);

        fs::write(tmp, json).map_err(|e| AppError::file_write_failed(tmp, e))?;
        fs::rename(tmp, path).map_err(|e| AppError::file_write_failed(path, e))?;
        debug!("检查点已保存: {} 个文件", self.processed.len());
        Ok(())
    }

    /// 删除检查点文件（不存在视为成功）
    pub fn remove(path: &Path) -> AppResult<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(FileError::DeleteFailed {
                path: path.to_path_buf(),
                source,
            }
            .into()),
        }
    }

    pub fn is_processed(&self, name: &str) -> bool {
        self.processed.contains(name)
    }

    /// 记录一个成功处理的文件；已处理过的返回 false 且不改变任何计数
    pub fn record(&mut self, name: &str, label: &str, example: LabelExample) -> bool {
        if !self.processed.insert(name.to_string()) {
            return false;
        }

        *self.counts.entry(label.to_string()).or_insert(0) += 1;
        if example.tiene_pdf {
            *self.pdf_counts.entry(label.to_string()).or_insert(0) += 1;
        }

        let examples = self.examples.entry(label.to_string()).or_default();
        if examples.len() < MAX_EXAMPLES_PER_LABEL {
            examples.push(example);
        }
        true
    }

    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    /// 所有标签的计数之和
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn count_for(&self, label: &str) -> u64 {
        self.counts.get(label).copied().unwrap_or(0)
    }

    pub fn examples(&self) -> &BTreeMap<String, Vec<LabelExample>> {
        &self.examples
    }

    pub fn updated_at(&self) -> Option<DateTime<Local>> {
        self.updated_at
    }

    /// 生成结果表：按数量降序，数量相同按标签排序
    pub fn result_rows(&self) -> Vec<TypeRow> {
        let total = self.total();
        let mut labels: Vec<(&String, &u64)> = self.counts.iter().collect();
        labels.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

        labels
            .into_iter()
            .map(|(label, &count)| {
                let with_pdf = self.pdf_counts.get(label).copied().unwrap_or(0);
                let example = self
                    .examples
                    .get(label)
                    .and_then(|list| list.first())
                    .map(|e| e.h2_completo.as_str())
                    .unwrap_or("");
                TypeRow::new(label, count, with_pdf, total, example)
            })
            .collect()
    }
}

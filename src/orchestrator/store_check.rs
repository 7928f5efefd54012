//! 存储连通性检查
//!
//! 连接 → 列出原始目录 → 读取最多 10 个文件 → 在登录目录上传 `test_ok.txt`

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::{join_remote, Config};
use crate::infrastructure::{list_dir, with_store, StoreConnector};
use crate::models::Measure;

/// 检查时最多读取的文件数
const SAMPLE_FILES: usize = 10;
pub const MARKER_FILE: &str = "test_ok.txt";

#[derive(Debug, Default, Clone)]
pub struct StoreCheckReport {
    pub listed: usize,
    pub sampled: usize,
    pub unreadable: usize,
}

pub fn check_store(config: &Config, connector: &dyn StoreConnector) -> Result<StoreCheckReport> {
    info!("🚀 检查存储: {}", connector.describe());
    let raw_dir = config.raw_path();

    let report = with_store(connector, &config.retry_policy(), "", |store| {
        let files = list_dir(store, &raw_dir, ".json")?;
        let mut report = StoreCheckReport {
            listed: files.len(),
            ..StoreCheckReport::default()
        };
        info!("✓ {} 中有 {} 个 JSON 文件", raw_dir, files.len());

        for name in files.iter().take(SAMPLE_FILES) {
            let data = store.retrieve(&join_remote(&raw_dir, name))?;
            match Measure::from_slice(&data) {
                Ok(measure) => info!("  {} → 编号 {}", name, measure.numero_medida),
                Err(e) => {
                    warn!("  ⚠️ {} 无法解析: {}", name, e);
                    report.unreadable += 1;
                }
            }
            report.sampled += 1;
        }

        store.store(MARKER_FILE, b"ok")?;
        Ok(report)
    })
    .context("存储检查失败")?;

    info!("✓ 存储检查通过，已上传 {}", MARKER_FILE);
    Ok(report)
}

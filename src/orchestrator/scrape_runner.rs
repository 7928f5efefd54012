//! 抓取运行器 - 编排层
//!
//! 按日期逐天探测公报编号：从起始编号开始递增，连续 `scrape_max_misses`
//! 个编号不存在（或达到 `--limit`）后进入下一天。每条公报保存到本地，
//! 可选上传到原始目录。结束时汇总本地数据（日期、机构、文件类型）。

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::AppResult;
use crate::infrastructure::SharedSession;
use crate::models::{Measure, ScrapeStats};
use crate::services::label_extractor::{extract_label, SIN_H2};
use crate::services::ScrapeService;
use crate::utils::logging::{init_log_file, log_startup, print_final_stats};

/// 公报来源
#[async_trait]
pub trait MeasureSource: Send + Sync {
    /// 编号不存在时返回 `Ok(None)`
    async fn fetch_measure(&self, number: u64, date: NaiveDate) -> AppResult<Option<Measure>>;
}

#[async_trait]
impl MeasureSource for ScrapeService {
    async fn fetch_measure(&self, number: u64, date: NaiveDate) -> AppResult<Option<Measure>> {
        ScrapeService::fetch_measure(self, number, date).await
    }
}

/// 一次抓取的参数
#[derive(Debug, Clone)]
pub struct ScrapeRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
    /// 每天最多保存的条数
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Clone)]
pub struct ScrapeReport {
    pub days: usize,
    pub saved: usize,
    pub uploaded: usize,
    pub errors: usize,
    pub files: Vec<PathBuf>,
    /// 运行结束时本地目录的概况
    pub stats: ScrapeStats,
}

pub struct ScrapeRunner {
    config: Config,
    source: Box<dyn MeasureSource>,
    /// 为 `None` 时只保存到本地
    upload: Option<SharedSession>,
}

impl ScrapeRunner {
    pub fn new(config: Config, source: Box<dyn MeasureSource>, upload: Option<SharedSession>) -> Self {
        Self {
            config,
            source,
            upload,
        }
    }

    pub async fn run(&self, range: &ScrapeRange) -> Result<ScrapeReport> {
        init_log_file(&self.config.output_log_file, "BORA 公报抓取")?;
        log_startup(
            "公报抓取",
            &format!("{} → {}，起始编号 {}", range.from, range.to, self.config.scrape_start_number),
        );
        std::fs::create_dir_all(&self.config.local_data_dir).with_context(|| {
            format!("无法创建数据目录: {}", self.config.local_data_dir.display())
        })?;

        let mut report = ScrapeReport::default();
        let mut day = range.from;
        while day <= range.to {
            if report.days > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.scrape_day_delay_ms)).await;
            }
            let saved_before = report.saved;
            self.scrape_day(day, range.limit, &mut report).await?;
            info!("📦 {}: 保存 {} 条公报", day, report.saved - saved_before);
            report.days += 1;
            day = match day.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }

        if let Some(session) = &self.upload {
            session.close().await;
        }
        report.stats = local_stats(&self.config.local_data_dir)?;
        info!(
            "📊 本地共 {} 条公报，覆盖 {} 天，{} 个机构，{} 种类型",
            report.stats.total_medidas,
            report.stats.fechas_cubiertas.len(),
            report.stats.organismos_detectados.len(),
            report.stats.tipos_documento_detectados.len()
        );
        print_final_stats(
            report.saved,
            report.errors,
            report.saved + report.errors,
            &self.config.output_log_file,
        );
        Ok(report)
    }

    async fn scrape_day(
        &self,
        date: NaiveDate,
        limit: Option<usize>,
        report: &mut ScrapeReport,
    ) -> Result<()> {
        let mut number = self.config.scrape_start_number;
        let mut misses = 0;
        let mut found = 0;

        while misses < self.config.scrape_max_misses && limit.map_or(true, |l| found < l) {
            let measure = match self.source.fetch_measure(number, date).await {
                Ok(Some(measure)) => measure,
                Ok(None) => {
                    misses += 1;
                    number += 1;
                    continue;
                }
                Err(e) => {
                    warn!("⚠️ 抓取公报 {} ({}) 失败，按不存在处理: {}", number, date, e);
                    report.errors += 1;
                    misses += 1;
                    number += 1;
                    continue;
                }
            };

            misses = 0;
            found += 1;
            let path = self.save_local(&measure)?;
            debug!("已保存 {}", path.display());
            report.saved += 1;
            report.files.push(path);

            if let Some(session) = &self.upload {
                match self.upload_raw(session, &measure).await {
                    Ok(()) => report.uploaded += 1,
                    Err(e) => warn!("⚠️ 上传 {} 失败: {}", measure.file_name(), e),
                }
            }

            number += 1;
            tokio::time::sleep(Duration::from_millis(self.config.scrape_delay_ms)).await;
        }
        Ok(())
    }

    fn save_local(&self, measure: &Measure) -> Result<PathBuf> {
        let path = self.config.local_data_dir.join(measure.file_name());
        let json = serde_json::to_vec_pretty(measure)?;
        std::fs::write(&path, json)
            .with_context(|| format!("无法写入 {}", path.display()))?;
        Ok(path)
    }

    async fn upload_raw(&self, session: &SharedSession, measure: &Measure) -> AppResult<()> {
        let target = crate::config::join_remote(&self.config.raw_path(), &measure.file_name());
        let json = serde_json::to_vec_pretty(measure)?;
        session.call(move |s| s.store(&target, &json)).await
    }
}

/// 汇总本地目录中的 `medida_*.json`；目录不存在视为空，无法解析的文件只计数
pub fn local_stats(dir: &Path) -> Result<ScrapeStats> {
    let mut stats = ScrapeStats::default();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(stats),
        Err(e) => {
            return Err(e).with_context(|| format!("无法读取数据目录: {}", dir.display()))
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("medida_") && name.ends_with(".json"))
        })
        .collect();
    paths.sort();

    for path in paths {
        stats.total_medidas += 1;
        let parsed = std::fs::read(&path)
            .map_err(|e| e.to_string())
            .and_then(|data| Measure::from_slice(&data).map_err(|e| e.to_string()));
        let measure = match parsed {
            Ok(measure) => measure,
            Err(e) => {
                warn!("⚠️ 读取 {} 失败: {}", path.display(), e);
                continue;
            }
        };
        stats.record(&measure);
        let label = extract_label(measure.html_title());
        if label != SIN_H2 {
            stats.tipos_documento_detectados.insert(label);
        }
    }
    Ok(stats)
}

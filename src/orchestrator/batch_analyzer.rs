//! 批量分析器 - 编排层
//!
//! 找出原始目录中尚未分析的公报，逐条分析后上传
//! `<stem>_analysis_agnostic.json`，最后上传批量汇总。

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::config::{join_remote, Config};
use crate::error::AppResult;
use crate::infrastructure::{list_dir, ManagedSession, SharedSession, StoreConnector};
use crate::models::analysis::{
    file_stem, BatchStats, BatchSummary, MeasureAnalysis, ANALYSIS_APPROACH, ANALYSIS_SUFFIX,
    BATCH_SUMMARY_FILE,
};
use crate::models::Measure;
use crate::services::ChatModel;
use crate::utils::logging::{init_log_file, log_startup, print_final_stats};
use crate::workflow::{AnalysisFlow, FileCtx};

/// 一次分析运行的统计
#[derive(Debug, Default, Clone)]
pub struct AnalyzeReport {
    pub pending: usize,
    pub analyzed: usize,
    pub errors: Vec<String>,
}

/// 批量分析器
pub struct BatchAnalyzer {
    config: Config,
    session: SharedSession,
    flow: AnalysisFlow,
}

impl BatchAnalyzer {
    pub fn new(config: Config, connector: Arc<dyn StoreConnector>, model: Arc<dyn ChatModel>) -> Self {
        let session = ManagedSession::new(connector, config.retry_policy(), config.reconnect_every);
        Self {
            config,
            session: SharedSession::new(session),
            flow: AnalysisFlow::new(model),
        }
    }

    pub async fn run(&self) -> Result<AnalyzeReport> {
        init_log_file(&self.config.output_log_file, "BORA 批量分析")?;
        log_startup("批量分析", "逐条分析尚未分析的公报");

        let raw_dir = self.config.raw_path();
        let analyzed_dir = self.config.analyzed_path();

        let raw_names = self
            .session
            .call({
                let dir = raw_dir.clone();
                move |s| list_dir(s, &dir, ".json")
            })
            .await
            .context("列出原始目录失败")?;
        let analyzed_names = self
            .session
            .call({
                let dir = analyzed_dir.clone();
                move |s| list_dir(s, &dir, ANALYSIS_SUFFIX)
            })
            .await
            .context("列出分析目录失败")?;

        let pending = pending_measures(&raw_names, &analyzed_names);
        let mut report = AnalyzeReport {
            pending: pending.len(),
            ..AnalyzeReport::default()
        };
        if pending.is_empty() {
            info!("✓ 没有新的公报需要分析");
            return Ok(report);
        }
        info!("✓ 找到 {} 条待分析的公报", pending.len());

        let mut results = Vec::new();
        for (i, name) in pending.iter().enumerate() {
            let ctx = FileCtx::new(name.as_str(), i + 1, pending.len());
            match self.analyze_one(&ctx, &raw_dir, &analyzed_dir).await {
                Ok(analysis) => {
                    info!("{} ✓ 分析完成并已上传", ctx);
                    results.push(analysis);
                    report.analyzed += 1;
                }
                Err(e) => {
                    let message = format!("Error procesando {}: {}", ctx.name, e);
                    error!("{} ❌ {}", ctx, e);
                    report.errors.push(message);
                }
            }
        }

        if let Err(e) = self.upload_summary(&results, &report.errors, &analyzed_dir).await {
            warn!("⚠️ 上传批量汇总失败: {}", e);
        }
        self.session.close().await;

        print_final_stats(
            report.analyzed,
            report.errors.len(),
            report.pending,
            &self.config.output_log_file,
        );
        Ok(report)
    }

    async fn analyze_one(
        &self,
        ctx: &FileCtx,
        raw_dir: &str,
        analyzed_dir: &str,
    ) -> AppResult<MeasureAnalysis> {
        let remote = join_remote(raw_dir, &ctx.name);
        let bytes = self.session.call(move |s| s.retrieve(&remote)).await?;
        let measure = Measure::from_slice(&bytes)?;

        let analysis = self.flow.run(&measure).await;

        let json = serde_json::to_vec_pretty(&analysis)?;
        let target = join_remote(analyzed_dir, &MeasureAnalysis::file_name_for(&ctx.name));
        self.session.call(move |s| s.store(&target, &json)).await?;
        Ok(analysis)
    }

    async fn upload_summary(
        &self,
        results: &[MeasureAnalysis],
        errors: &[String],
        analyzed_dir: &str,
    ) -> AppResult<()> {
        if results.is_empty() {
            return Ok(());
        }
        let summary = BatchSummary {
            fecha_analisis_batch: chrono::Local::now().to_rfc3339(),
            enfoque: ANALYSIS_APPROACH.to_string(),
            total_medidas_analizadas: results.len(),
            total_errores: errors.len(),
            estadisticas_generales: BatchStats::from_results(results),
            errores_detalle: errors.to_vec(),
        };
        let json = serde_json::to_vec_pretty(&summary)?;
        let target = join_remote(analyzed_dir, BATCH_SUMMARY_FILE);
        self.session.call(move |s| s.store(&target, &json)).await?;
        info!("📤 批量汇总已上传: {}", BATCH_SUMMARY_FILE);
        Ok(())
    }
}

/// 原始文件中，stem 尚未出现在分析结果里的那些
pub fn pending_measures(raw_names: &[String], analyzed_names: &[String]) -> Vec<String> {
    let analyzed: HashSet<&str> = analyzed_names
        .iter()
        .filter_map(|name| name.strip_suffix(ANALYSIS_SUFFIX))
        .collect();
    raw_names
        .iter()
        .filter(|name| !analyzed.contains(file_stem(name)))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::MemoryConnector;
    use async_trait::async_trait;

    struct FixedModel;

    #[async_trait]
    impl ChatModel for FixedModel {
        async fn complete(&self, user_message: &str, _system: Option<&str>) -> AppResult<String> {
            if user_message.contains("abogado del diablo") {
                Ok(r#"{"nivel_riesgo_democratico": "medio"}"#.to_string())
            } else if user_message.contains("semántico") {
                Ok(r#"{"categoria_emergente": "designaciones"}"#.to_string())
            } else {
                Ok("{}".to_string())
            }
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    fn raw(n: u32) -> Vec<u8> {
        format!(
            r#"{{"numero_medida": {}, "fecha_boletin": "2024-01-02", "titulo_raw": "DECRETO {}/2024"}}"#,
            n, n
        )
        .into_bytes()
    }

    #[test]
    fn pending_excludes_already_analyzed_stems() {
        let raw = vec!["medida_1_20240102.json".to_string(), "medida_2_20240102.json".to_string()];
        let analyzed = vec![
            "medida_1_20240102_analysis_agnostic.json".to_string(),
            BATCH_SUMMARY_FILE.to_string(),
        ];
        assert_eq!(pending_measures(&raw, &analyzed), vec!["medida_2_20240102.json"]);
    }

    #[tokio::test]
    async fn analyzes_pending_and_uploads_summary() {
        let dir = tempfile::tempdir().unwrap();
        let connector = MemoryConnector::new();
        connector.put("data/raw/medida_1_20240102.json", raw(1));
        connector.put("data/raw/medida_2_20240102.json", raw(2));
        connector.put("data/raw/medida_3_20240102.json", b"no es json".to_vec());
        connector.put("data/analyzed/medida_1_20240102_analysis_agnostic.json", b"{}".to_vec());

        let config = Config {
            output_log_file: dir.path().join("output.txt"),
            retry_initial_backoff_ms: 0,
            retry_max_backoff_ms: 0,
            ..Config::default()
        };
        let analyzer = BatchAnalyzer::new(config, Arc::new(connector.clone()), Arc::new(FixedModel));

        let report = analyzer.run().await.unwrap();

        assert_eq!(report.pending, 2);
        assert_eq!(report.analyzed, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("medida_3_20240102.json"));

        let uploaded = connector
            .get("data/analyzed/medida_2_20240102_analysis_agnostic.json")
            .unwrap();
        let analysis: serde_json::Value = serde_json::from_slice(&uploaded).unwrap();
        assert_eq!(analysis["numero_medida"], "2");

        let summary: serde_json::Value = serde_json::from_slice(
            &connector.get(&format!("data/analyzed/{}", BATCH_SUMMARY_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(summary["total_medidas_analizadas"], 1);
        assert_eq!(summary["total_errores"], 1);
        assert_eq!(summary["estadisticas_generales"]["niveles_riesgo"]["medio"], 1);
        assert_eq!(
            summary["estadisticas_generales"]["temas_emergentes"]["designaciones"],
            1
        );
    }
}

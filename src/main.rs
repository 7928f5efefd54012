use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing::info;

use bora_analisis::api::{self, ApiState};
use bora_analisis::infrastructure::{FtpConnector, ManagedSession, SharedSession, StoreConnector};
use bora_analisis::orchestrator::{
    check_store, local_stats, BatchAnalyzer, BatchClassifier, ScrapeRange, ScrapeRunner,
};
use bora_analisis::services::{LlmService, ScrapeService};
use bora_analisis::utils::logging;
use bora_analisis::Config;

#[derive(Parser, Debug)]
#[command(
    name = "bora",
    version,
    about = "Scraper, clasificador y analizador del Boletín Oficial"
)]
struct Cli {
    /// TOML 配置文件（所有字段可省略，环境变量优先）
    #[arg(long, global = true, env = "BORA_CONFIG")]
    config: Option<PathBuf>,

    /// 显示 debug 日志
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 按日期抓取公报
    Scrape {
        /// 起始日期 (YYYY-MM-DD)，默认今天
        #[arg(long)]
        from: Option<NaiveDate>,
        /// 结束日期 (YYYY-MM-DD)，默认与起始日期相同
        #[arg(long)]
        to: Option<NaiveDate>,
        /// 每天最多保存的条数
        #[arg(long)]
        limit: Option<usize>,
        /// 同时上传到远程原始目录
        #[arg(long)]
        upload: bool,
    },
    /// 汇总本地已抓取的数据（日期、机构、类型）
    ScrapeStats,
    /// 按标题标签分类远程原始数据（可续跑）
    Classify {
        /// 忽略已有检查点，从头开始
        #[arg(long)]
        fresh: bool,
    },
    /// 用 LLM 分析尚未分析的公报
    Analyze,
    /// 启动只读 HTTP API
    Serve {
        /// 监听地址 (host:port)，默认取配置中的 api_bind
        #[arg(long)]
        bind: Option<String>,
    },
    /// 检查远程存储是否可用
    CheckStore,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).context("加载配置失败")?;
    logging::init(cli.verbose || config.verbose_logging);

    match cli.command {
        Command::Scrape {
            from,
            to,
            limit,
            upload,
        } => {
            let from = from.unwrap_or_else(|| Local::now().date_naive());
            let to = to.unwrap_or(from);
            if to < from {
                bail!("结束日期 {} 早于起始日期 {}", to, from);
            }
            let session = if upload {
                let connector = ftp_connector(&config)?;
                Some(SharedSession::new(ManagedSession::new(
                    connector,
                    config.retry_policy(),
                    config.reconnect_every,
                )))
            } else {
                None
            };
            let source = ScrapeService::new(&config)?;
            let report = ScrapeRunner::new(config, Box::new(source), session)
                .run(&ScrapeRange { from, to, limit })
                .await?;
            info!(
                "✓ 抓取完成: {} 天，保存 {} 条，上传 {} 条",
                report.days, report.saved, report.uploaded
            );
        }
        Command::ScrapeStats => {
            let stats = local_stats(&config.local_data_dir)?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Classify { fresh } => {
            let connector = ftp_connector(&config)?;
            let classifier = BatchClassifier::new(config, connector);
            let report = tokio::task::spawn_blocking(move || classifier.run(fresh)).await??;
            info!(
                "✓ 分类完成: 本次处理 {} 个文件，累计 {} 个",
                report.processed, report.total_recorded
            );
        }
        Command::Analyze => {
            if config.llm_api_key.is_empty() {
                bail!("缺少 LLM_API_KEY（或 GEMINI_API_KEY）");
            }
            let connector = ftp_connector(&config)?;
            let model = Arc::new(LlmService::new(&config));
            let report = BatchAnalyzer::new(config, connector, model).run().await?;
            info!(
                "✓ 分析完成: {}/{} 条，错误 {} 条",
                report.analyzed,
                report.pending,
                report.errors.len()
            );
        }
        Command::Serve { bind } => {
            let connector = ftp_connector(&config)?;
            let bind = bind.unwrap_or_else(|| config.api_bind.clone());
            api::serve(&bind, ApiState::new(&config, connector)).await?;
        }
        Command::CheckStore => {
            let connector = ftp_connector(&config)?;
            let report =
                tokio::task::spawn_blocking(move || check_store(&config, connector.as_ref()))
                    .await??;
            info!(
                "✓ 列出 {} 个文件，读取 {} 个，{} 个无法解析",
                report.listed, report.sampled, report.unreadable
            );
        }
    }

    Ok(())
}

fn ftp_connector(config: &Config) -> Result<Arc<dyn StoreConnector>> {
    config.require_ftp_credentials()?;
    Ok(Arc::new(FtpConnector::new(config)))
}

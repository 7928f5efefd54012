//! 批量分类器 - 编排层
//!
//! ## 职责
//!
//! 对原始目录下的所有公报文件做标签统计，是整个分类任务的入口。
//!
//! ## 核心功能
//!
//! 1. **断点续跑**：加载检查点，跳过已处理的文件名
//! 2. **分批处理**：每批结束后保存检查点
//! 3. **连接管理**：通过 `ManagedSession` 定期重连，可选每批重连
//! 4. **本地暂存**：可选先把整批文件下载到临时目录再处理
//! 5. **错误统计**：单文件错误只记录并跳过；可选错误阈值
//! 6. **结果输出**：全部完成后写出并上传结果，然后删除检查点
//!
//! 会话是阻塞的，整个流程单线程顺序执行；异步入口请用 `spawn_blocking` 调用。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tempfile::TempDir;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{AppError, StoreError};
use crate::infrastructure::{connect_with_retry, ManagedSession, StoreConnector};
use crate::models::{Checkpoint, TypeRow};
use crate::services::ResultEmitter;
use crate::utils::logging::{
    init_log_file, log_batch_complete, log_batch_start, log_startup, print_final_stats,
};
use crate::workflow::{classify_file, ClassifyOutcome, FileCtx};

/// 一次分类运行的统计
#[derive(Debug, Default, Clone)]
pub struct ClassifyReport {
    /// 远程目录中的 JSON 文件数
    pub listed: usize,
    /// 检查点中已存在而跳过的文件数
    pub already_processed: usize,
    /// 本次成功处理的文件数
    pub processed: usize,
    /// 本次失败的文件数
    pub errors: usize,
    /// 检查点累计处理的文件总数
    pub total_recorded: u64,
    /// 最终结果表
    pub rows: Vec<TypeRow>,
}

/// 批量分类器
pub struct BatchClassifier {
    config: Config,
    connector: Arc<dyn StoreConnector>,
    emitter: ResultEmitter,
}

impl BatchClassifier {
    pub fn new(config: Config, connector: Arc<dyn StoreConnector>) -> Self {
        let emitter = ResultEmitter::new(&config);
        Self {
            config,
            connector,
            emitter,
        }
    }

    /// 运行分类；`fresh` 为 true 时忽略已有检查点
    pub fn run(&self, fresh: bool) -> Result<ClassifyReport> {
        let config = &self.config;
        init_log_file(&config.output_log_file, "BORA 标签分类")?;
        log_startup(
            "标签分类",
            &format!(
                "每批 {} 个文件，每 {} 个文件重连一次",
                config.batch_size, config.reconnect_every
            ),
        );

        if fresh {
            Checkpoint::remove(&config.checkpoint_path)?;
            info!("🧹 已删除旧检查点，从头开始");
        }
        let mut checkpoint = Checkpoint::load(&config.checkpoint_path)
            .with_context(|| format!("无法加载检查点 {}", config.checkpoint_path.display()))?;

        let mut session = ManagedSession::new(
            self.connector.clone(),
            config.retry_policy(),
            config.reconnect_every,
        );
        let raw_path = config.raw_path();
        session
            .set_workdir(raw_path.clone())
            .with_context(|| format!("无法进入远程目录 {}", raw_path))?;

        let names = session
            .with_session(|s| s.list_names(Some(".json")))
            .context("列出远程文件失败")?;
        let pending: Vec<String> = names
            .iter()
            .filter(|name| !checkpoint.is_processed(name))
            .cloned()
            .collect();

        let mut report = ClassifyReport {
            listed: names.len(),
            already_processed: names.len() - pending.len(),
            ..ClassifyReport::default()
        };
        info!(
            "✓ 找到 {} 个文件，{} 个已处理，{} 个待处理",
            report.listed,
            report.already_processed,
            pending.len()
        );

        let total = pending.len();
        let batch_size = config.batch_size.max(1);
        let total_batches = total.div_ceil(batch_size);

        for (batch_idx, batch) in pending.chunks(batch_size).enumerate() {
            let batch_num = batch_idx + 1;
            let offset = batch_idx * batch_size;
            log_batch_start(batch_num, total_batches, offset + 1, offset + batch.len(), total);

            if config.reconnect_per_batch && batch_idx > 0 {
                session.reconnect().context("批次开始前重连失败")?;
            }

            let before = report.processed;
            let ctxs: Vec<FileCtx> = batch
                .iter()
                .enumerate()
                .map(|(i, name)| FileCtx::new(name.as_str(), offset + i + 1, total))
                .collect();

            if config.local_staging {
                self.run_staged(&ctxs, &mut session, &mut checkpoint, &mut report)?;
            } else {
                self.run_direct(&ctxs, &mut session, &mut checkpoint, &mut report)?;
            }

            checkpoint.save(&config.checkpoint_path)?;
            log_batch_complete(batch_num, report.processed - before, batch.len());
        }
        session.close();

        report.total_recorded = checkpoint.total();
        report.rows = self.emit_results(&checkpoint)?;
        Checkpoint::remove(&config.checkpoint_path)?;

        print_final_stats(report.processed, report.errors, total, &config.output_log_file);
        Ok(report)
    }

    /// 逐个下载到内存并处理
    fn run_direct(
        &self,
        ctxs: &[FileCtx],
        session: &mut ManagedSession,
        checkpoint: &mut Checkpoint,
        report: &mut ClassifyReport,
    ) -> Result<()> {
        for ctx in ctxs {
            let fetched = session.with_session(|s| s.retrieve(&ctx.name));
            session.mark_item();
            let result = fetched
                .map_err(AppError::from)
                .and_then(|bytes| classify_file(&bytes, ctx, checkpoint));
            self.settle(ctx, result, checkpoint, report)?;
        }
        Ok(())
    }

    /// 先把整批下载到临时目录，再逐个处理
    fn run_staged(
        &self,
        ctxs: &[FileCtx],
        session: &mut ManagedSession,
        checkpoint: &mut Checkpoint,
        report: &mut ClassifyReport,
    ) -> Result<()> {
        let staging = TempDir::new().context("无法创建临时目录")?;
        let mut staged: Vec<(&FileCtx, PathBuf)> = Vec::with_capacity(ctxs.len());

        for ctx in ctxs {
            let local = staging.path().join(&ctx.name);
            let downloaded = session.with_session(|s| s.retrieve_to(&ctx.name, &local));
            session.mark_item();
            match downloaded {
                Ok(_) => staged.push((ctx, local)),
                Err(e) => self.settle(ctx, Err(e.into()), checkpoint, report)?,
            }
        }

        for (ctx, local) in staged {
            let result = std::fs::read(&local)
                .map_err(|e| AppError::file_read_failed(&local, e))
                .and_then(|bytes| classify_file(&bytes, ctx, checkpoint));
            self.settle(ctx, result, checkpoint, report)?;
        }
        // staging 在这里被删除
        Ok(())
    }

    /// 记录单个文件的结果；只有无法重连或超过错误阈值时才返回错误
    fn settle(
        &self,
        ctx: &FileCtx,
        result: Result<ClassifyOutcome, AppError>,
        checkpoint: &mut Checkpoint,
        report: &mut ClassifyReport,
    ) -> Result<()> {
        let err = match result {
            Ok(ClassifyOutcome::Recorded { .. }) => {
                report.processed += 1;
                return Ok(());
            }
            Ok(ClassifyOutcome::AlreadyProcessed) => return Ok(()),
            Err(err) => err,
        };

        if let AppError::Store(StoreError::RetriesExhausted { .. }) = err {
            error!("{} ❌ 无法恢复远程连接，保存检查点后中止", ctx);
            checkpoint.save(&self.config.checkpoint_path)?;
            return Err(err).context("远程连接不可用");
        }

        report.errors += 1;
        warn!("{} ⚠️ 处理失败，跳过: {}", ctx, err);

        if let Some(limit) = self.config.max_errors {
            if report.errors > limit {
                error!("❌ 错误数 {} 超过阈值 {}，保存检查点后中止", report.errors, limit);
                checkpoint.save(&self.config.checkpoint_path)?;
                return Err(AppError::ErrorThreshold {
                    errors: report.errors,
                    limit,
                }
                .into());
            }
        }
        Ok(())
    }

    /// 写出并上传结果
    fn emit_results(&self, checkpoint: &Checkpoint) -> Result<Vec<TypeRow>> {
        let rows = self.emitter.write_local(checkpoint)?;

        let policy = self.config.retry_policy();
        let mut store = connect_with_retry(self.connector.as_ref(), &policy)
            .context("上传结果前连接失败")?;
        let uploaded = self.emitter.upload(store.as_mut());
        if let Err(e) = store.disconnect() {
            warn!("关闭上传会话失败（忽略）: {}", e);
        }
        uploaded.context("上传结果失败")?;
        Ok(rows)
    }
}

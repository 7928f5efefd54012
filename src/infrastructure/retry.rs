//! 统一的重试策略
//!
//! 取代各处零散的"断线重连"逻辑：指数退避、最大尝试次数、空闲超时。

use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::error::{StoreError, StoreResult};

/// 重试策略
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 最大尝试次数（含第一次）
    pub max_attempts: u32,
    /// 第一次重试前的等待时间
    pub initial_backoff: Duration,
    /// 单次等待上限
    pub max_backoff: Duration,
    /// 会话空闲超过该时间视为失效
    pub idle_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// 不等待的策略（测试用）
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            ..Self::default()
        }
    }

    /// 第 `attempt` 次失败后的等待时间（attempt 从 1 开始）
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }

    /// 执行操作，只对连接层面的错误重试
    pub fn run<T>(
        &self,
        label: &str,
        mut op: impl FnMut(u32) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transport() => return Err(err),
                Err(err) if attempt >= max_attempts => {
                    return Err(StoreError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(err),
                    });
                }
                Err(err) => {
                    let wait = self.backoff(attempt);
                    warn!(
                        "⚠️ {} 失败 (第 {}/{} 次): {}，{:?} 后重试",
                        label, attempt, max_attempts, err, wait
                    );
                    thread::sleep(wait);
                    attempt += 1;
                }
            }
        }
    }
}

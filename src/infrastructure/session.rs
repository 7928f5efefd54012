//! 受管会话
//!
//! 唯一持有当前存储会话的对象。以下情况会重新建立连接：
//! - 还没有会话，或上一次命令出现连接层面的错误
//! - 空闲时间超过 `RetryPolicy::idle_timeout`
//! - 自上次连接以来处理的文件数达到 `reconnect_every`
//! - 调用方显式要求（例如每批开始前）

use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::error::{AppResult, StoreError, StoreResult};
use crate::infrastructure::remote_store::connect_with_retry;
use crate::infrastructure::{RemoteStore, RetryPolicy, StoreConnector};

pub struct ManagedSession {
    connector: Arc<dyn StoreConnector>,
    policy: RetryPolicy,
    /// 0 表示不按数量重连
    reconnect_every: usize,
    workdir: Option<String>,
    current: Option<Box<dyn RemoteStore>>,
    items_since_connect: usize,
    last_used: Instant,
}

impl ManagedSession {
    pub fn new(
        connector: Arc<dyn StoreConnector>,
        policy: RetryPolicy,
        reconnect_every: usize,
    ) -> Self {
        Self {
            connector,
            policy,
            reconnect_every,
            workdir: None,
            current: None,
            items_since_connect: 0,
            last_used: Instant::now(),
        }
    }

    /// 设置工作目录；重连后会自动恢复
    pub fn set_workdir(&mut self, dir: impl Into<String>) -> StoreResult<()> {
        let dir = dir.into();
        self.session()?.change_dir(&dir)?;
        self.workdir = Some(dir);
        Ok(())
    }

    /// 获取可用的会话，必要时先重连
    pub fn session(&mut self) -> StoreResult<&mut dyn RemoteStore> {
        if let Some(reason) = self.reconnect_reason() {
            debug!("重新建立会话: {}", reason);
            self.reconnect()?;
        }
        self.last_used = Instant::now();
        match self.current.as_deref_mut() {
            Some(session) => Ok(session),
            None => Err(StoreError::ConnectFailed {
                host: self.connector.describe(),
                detail: "会话不可用".to_string(),
            }),
        }
    }

    /// 在会话上执行一个操作；连接层面的错误会让会话失效，下一次调用时重连
    pub fn with_session<T>(
        &mut self,
        op: impl FnOnce(&mut dyn RemoteStore) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let session = self.session()?;
        let result = op(session);
        if let Err(err) = &result {
            if err.is_transport() {
                warn!("⚠️ 会话出现连接错误，下次使用时重连: {}", err);
                self.invalidate();
            }
        }
        result
    }

    /// 记录处理了一个文件
    pub fn mark_item(&mut self) {
        self.items_since_connect += 1;
        self.last_used = Instant::now();
    }

    /// 关闭旧会话并重新连接
    pub fn reconnect(&mut self) -> StoreResult<()> {
        self.close();
        let mut session = connect_with_retry(self.connector.as_ref(), &self.policy)?;
        if let Some(dir) = &self.workdir {
            session.change_dir(dir)?;
        }
        self.current = Some(session);
        self.items_since_connect = 0;
        self.last_used = Instant::now();
        info!("🔄 会话已重新建立: {}", self.connector.describe());
        Ok(())
    }

    /// 丢弃当前会话（不发送 QUIT）
    pub fn invalidate(&mut self) {
        self.current = None;
    }

    /// 正常结束当前会话
    pub fn close(&mut self) {
        if let Some(mut session) = self.current.take() {
            if let Err(e) = session.disconnect() {
                debug!("关闭会话时出错（忽略）: {}", e);
            }
        }
    }

    fn reconnect_reason(&self) -> Option<&'static str> {
        if self.current.is_none() {
            Some("尚未连接")
        } else if self.reconnect_every > 0 && self.items_since_connect >= self.reconnect_every {
            Some("达到重连间隔")
        } else if self.last_used.elapsed() > self.policy.idle_timeout {
            Some("空闲超时")
        } else {
            None
        }
    }
}

impl Drop for ManagedSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// 供异步代码使用的受管会话；每次操作在阻塞线程上执行
#[derive(Clone)]
pub struct SharedSession {
    inner: Arc<Mutex<ManagedSession>>,
}

impl SharedSession {
    pub fn new(session: ManagedSession) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    /// 执行一次存储操作，并计入重连间隔
    pub async fn call<T, F>(&self, op: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn RemoteStore) -> StoreResult<T> + Send + 'static,
    {
        let inner = self.inner.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut session = inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let result = session.with_session(op);
            session.mark_item();
            result
        })
        .await?;
        Ok(result?)
    }

    pub async fn close(&self) {
        let inner = self.inner.clone();
        let _ = tokio::task::spawn_blocking(move || {
            inner
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .close();
        })
        .await;
    }
}

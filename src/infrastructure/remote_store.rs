//! 远程文件存储 - 基础设施层
//!
//! 只暴露"列出 / 下载 / 上传"能力，不认识 Measure / Checkpoint

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::infrastructure::RetryPolicy;

/// 一个已登录的远程存储会话
///
/// 所有操作都是阻塞的；文件名相对于当前工作目录。
pub trait RemoteStore: Send {
    /// 切换工作目录（支持相对路径和 `..`）
    fn change_dir(&mut self, dir: &str) -> StoreResult<()>;

    /// 列出当前目录下的文件名，可按后缀过滤
    fn list_names(&mut self, suffix: Option<&str>) -> StoreResult<Vec<String>>;

    /// 下载文件内容
    fn retrieve(&mut self, name: &str) -> StoreResult<Vec<u8>>;

    /// 上传内容，已存在则覆盖
    fn store(&mut self, name: &str, data: &[u8]) -> StoreResult<()>;

    /// 结束会话
    fn disconnect(&mut self) -> StoreResult<()>;

    /// 下载到本地路径，返回写入的字节数
    fn retrieve_to(&mut self, name: &str, local_path: &Path) -> StoreResult<u64> {
        let data = self.retrieve(name)?;
        fs::write(local_path, &data)?;
        debug!("已下载 {} -> {}", name, local_path.display());
        Ok(data.len() as u64)
    }

    /// 从本地文件上传
    fn store_from(&mut self, local_path: &Path, name: &str) -> StoreResult<()> {
        let data = fs::read(local_path)?;
        self.store(name, &data)
    }
}

/// 建立新会话的能力
pub trait StoreConnector: Send + Sync {
    /// 连接并登录
    fn connect(&self) -> StoreResult<Box<dyn RemoteStore>>;

    /// 用于日志的描述（不含密码）
    fn describe(&self) -> String;
}

/// 按重试策略建立会话
pub fn connect_with_retry(
    connector: &dyn StoreConnector,
    policy: &RetryPolicy,
) -> StoreResult<Box<dyn RemoteStore>> {
    policy.run(&format!("连接 {}", connector.describe()), |_| connector.connect())
}

/// 打开一次性会话，进入 `dir`（空字符串表示登录目录）执行操作后断开
pub fn with_store<T>(
    connector: &dyn StoreConnector,
    policy: &RetryPolicy,
    dir: &str,
    op: impl FnOnce(&mut dyn RemoteStore) -> StoreResult<T>,
) -> StoreResult<T> {
    let mut session = connect_with_retry(connector, policy)?;
    let result = if dir.is_empty() {
        op(session.as_mut())
    } else {
        session.change_dir(dir).and_then(|_| op(session.as_mut()))
    };
    if let Err(e) = session.disconnect() {
        debug!("关闭会话时出错（忽略）: {}", e);
    }
    result
}

/// 列出 `dir`（相对于当前目录）下的文件，完成后回到原目录；目录不存在视为空
pub fn list_dir(
    store: &mut dyn RemoteStore,
    dir: &str,
    suffix: &str,
) -> StoreResult<Vec<String>> {
    match store.change_dir(dir) {
        Ok(()) => {}
        Err(StoreError::NotFound { .. }) => return Ok(Vec::new()),
        Err(e) => return Err(e),
    }
    let names = store.list_names(Some(suffix));
    let depth = dir.split('/').filter(|p| !p.is_empty() && *p != ".").count();
    if depth > 0 {
        store.change_dir(&vec![".."; depth].join("/"))?;
    }
    names
}

/// 去掉服务器可能返回的路径前缀，并过滤 `.` / `..`
pub(crate) fn normalize_listing(names: Vec<String>, suffix: Option<&str>) -> Vec<String> {
    names
        .into_iter()
        .map(|name| {
            name.rsplit('/')
                .next()
                .unwrap_or_default()
                .trim()
                .to_string()
        })
        .filter(|name| !name.is_empty() && name != "." && name != "..")
        .filter(|name| suffix.map_or(true, |s| name.ends_with(s)))
        .collect()
}

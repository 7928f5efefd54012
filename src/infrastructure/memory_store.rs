//! 内存存储实现
//!
//! 与 FTP 行为一致的目录树，用于测试和本地演练。多个会话共享同一棵树。

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{StoreError, StoreResult};
use crate::infrastructure::remote_store::normalize_listing;
use crate::infrastructure::{RemoteStore, StoreConnector};

#[derive(Debug, Default)]
struct Tree {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    failing: HashSet<String>,
    refuse_connects: u32,
    connects: usize,
}

impl Tree {
    fn add_dirs_for(&mut self, path: &str) {
        let mut current = String::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(part);
            self.dirs.insert(current.clone());
        }
    }
}

/// 共享的内存文件树；clone 后指向同一份数据
#[derive(Clone, Debug, Default)]
pub struct MemoryConnector {
    tree: Arc<Mutex<Tree>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn tree(&self) -> MutexGuard<'_, Tree> {
        self.tree.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 直接写入文件（路径相对于根目录）
    pub fn put(&self, path: &str, data: impl Into<Vec<u8>>) {
        let path = resolve("", path);
        let mut tree = self.tree();
        if let Some((parent, _)) = path.rsplit_once('/') {
            tree.add_dirs_for(parent);
        }
        tree.files.insert(path, data.into());
    }

    /// 创建空目录
    pub fn mkdir(&self, path: &str) {
        self.tree().add_dirs_for(&resolve("", path));
    }

    /// 读取文件
    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.tree().files.get(&resolve("", path)).cloned()
    }

    /// 让某个文件的下载始终失败
    pub fn fail_on(&self, path: &str) {
        self.tree().failing.insert(resolve("", path));
    }

    /// 接下来的 `count` 次连接被拒绝
    pub fn refuse_next_connects(&self, count: u32) {
        self.tree().refuse_connects = count;
    }

    /// 成功建立过的会话数
    pub fn connects(&self) -> usize {
        self.tree().connects
    }
}

impl StoreConnector for MemoryConnector {
    fn connect(&self) -> StoreResult<Box<dyn RemoteStore>> {
        let mut tree = self.tree();
        if tree.refuse_connects > 0 {
            tree.refuse_connects -= 1;
            return Err(StoreError::ConnectFailed {
                host: "memory".to_string(),
                detail: "connection refused".to_string(),
            });
        }
        tree.connects += 1;
        Ok(Box::new(MemoryStore {
            connector: self.clone(),
            cwd: String::new(),
            open: true,
        }))
    }

    fn describe(&self) -> String {
        "memory://".to_string()
    }
}

/// 一个内存会话
pub struct MemoryStore {
    connector: MemoryConnector,
    cwd: String,
    open: bool,
}

impl MemoryStore {
    fn ensure_open(&self) -> StoreResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(StoreError::disconnected("NOOP", "connection closed"))
        }
    }
}

impl RemoteStore for MemoryStore {
    fn change_dir(&mut self, dir: &str) -> StoreResult<()> {
        self.ensure_open()?;
        let target = resolve(&self.cwd, dir);
        if target.is_empty() || self.connector.tree().dirs.contains(&target) {
            self.cwd = target;
            Ok(())
        } else {
            Err(StoreError::NotFound { path: target })
        }
    }

    fn list_names(&mut self, suffix: Option<&str>) -> StoreResult<Vec<String>> {
        self.ensure_open()?;
        let prefix = if self.cwd.is_empty() {
            String::new()
        } else {
            format!("{}/", self.cwd)
        };
        let names = self
            .connector
            .tree()
            .files
            .keys()
            .filter_map(|path| path.strip_prefix(&prefix))
            .filter(|rest| !rest.contains('/'))
            .map(str::to_string)
            .collect();
        Ok(normalize_listing(names, suffix))
    }

    fn retrieve(&mut self, name: &str) -> StoreResult<Vec<u8>> {
        self.ensure_open()?;
        let path = resolve(&self.cwd, name);
        let tree = self.connector.tree();
        if tree.failing.contains(&path) {
            return Err(StoreError::command(
                format!("RETR {}", name),
                "451 transfer aborted",
            ));
        }
        tree.files
            .get(&path)
            .cloned()
            .ok_or(StoreError::NotFound { path })
    }

    fn store(&mut self, name: &str, data: &[u8]) -> StoreResult<()> {
        self.ensure_open()?;
        let path = resolve(&self.cwd, name);
        self.connector.tree().files.insert(path, data.to_vec());
        Ok(())
    }

    fn disconnect(&mut self) -> StoreResult<()> {
        self.open = false;
        Ok(())
    }
}

/// 解析相对路径（支持 `.`、`..` 和以 `/` 开头的绝对路径）
fn resolve(cwd: &str, path: &str) -> String {
    let mut parts: Vec<&str> = if path.starts_with('/') {
        Vec::new()
    } else {
        cwd.split('/').filter(|p| !p.is_empty()).collect()
    };
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

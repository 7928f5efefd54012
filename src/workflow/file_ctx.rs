//! 文件处理上下文
//!
//! 封装"我正在处理第几个文件、文件名是什么"这一信息

use std::fmt::Display;

/// 文件处理上下文
///
/// 包含处理单个远程文件时日志需要的信息
#[derive(Debug, Clone)]
pub struct FileCtx {
    /// 远程文件名
    pub name: String,

    /// 在本次运行中的序号（从1开始，仅用于日志显示）
    pub index: usize,

    /// 本次运行的文件总数
    pub total: usize,
}

impl FileCtx {
    pub fn new(name: impl Into<String>, index: usize, total: usize) -> Self {
        Self {
            name: name.into(),
            index,
            total,
        }
    }
}

impl Display for FileCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[文件 {}/{} {}]", self.index, self.total, self.name)
    }
}

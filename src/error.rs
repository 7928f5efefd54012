use std::path::PathBuf;

use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 远程存储错误
    #[error("存储错误: {0}")]
    Store(#[from] StoreError),
    /// 本地文件错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// JSON 解析失败
    #[error("JSON解析失败: {0}")]
    Json(#[from] serde_json::Error),
    /// HTTP 请求失败（抓取）
    #[error("HTTP请求失败: {0}")]
    Http(#[from] reqwest::Error),
    /// LLM 服务错误
    #[error("LLM错误: {0}")]
    Llm(#[from] LlmError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 后台阻塞任务失败
    #[error("后台任务失败: {0}")]
    Task(#[from] tokio::task::JoinError),
    /// 单文件错误累计超过阈值
    #[error("错误数 {errors} 超过阈值 {limit}，批处理中止")]
    ErrorThreshold { errors: usize, limit: usize },
}

/// 远程存储（FTP）错误
#[derive(Debug, Error)]
pub enum StoreError {
    /// 连接失败
    #[error("无法连接到 {host}: {detail}")]
    ConnectFailed { host: String, detail: String },
    /// 登录失败
    #[error("登录失败 (用户: {user}): {detail}")]
    LoginFailed { user: String, detail: String },
    /// 命令执行失败（服务器拒绝，连接仍可用）
    #[error("命令 {command} 执行失败: {detail}")]
    CommandFailed { command: String, detail: String },
    /// 执行命令时连接中断
    #[error("执行 {command} 时连接中断: {detail}")]
    Disconnected { command: String, detail: String },
    /// 远程文件不存在
    #[error("远程文件不存在: {path}")]
    NotFound { path: String },
    /// 本地读写失败
    #[error("本地文件读写失败: {0}")]
    Io(#[from] std::io::Error),
    /// 重试次数耗尽
    #[error("重试 {attempts} 次后仍然失败: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<StoreError>,
    },
}

impl StoreError {
    /// 是否是连接层面的错误（需要重新建立会话）
    pub fn is_transport(&self) -> bool {
        match self {
            StoreError::ConnectFailed { .. }
            | StoreError::LoginFailed { .. }
            | StoreError::Disconnected { .. }
            | StoreError::RetriesExhausted { .. } => true,
            StoreError::CommandFailed { .. } | StoreError::NotFound { .. } | StoreError::Io(_) => {
                false
            }
        }
    }

    pub fn command(command: impl Into<String>, detail: impl ToString) -> Self {
        StoreError::CommandFailed {
            command: command.into(),
            detail: detail.to_string(),
        }
    }

    pub fn disconnected(command: impl Into<String>, detail: impl ToString) -> Self {
        StoreError::Disconnected {
            command: command.into(),
            detail: detail.to_string(),
        }
    }
}

/// 本地文件错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 读取文件失败
    #[error("读取文件失败 ({}): {source}", .path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// 写入文件失败
    #[error("写入文件失败 ({}): {source}", .path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// 删除文件失败
    #[error("删除文件失败 ({}): {source}", .path.display())]
    DeleteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// CSV 写入失败
    #[error("CSV写入失败 ({}): {source}", .path.display())]
    CsvFailed {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// LLM 服务错误
#[derive(Debug, Error)]
pub enum LlmError {
    /// API 调用失败
    #[error("LLM API调用失败 (模型: {model}): {detail}")]
    ApiCallFailed { model: String, detail: String },
    /// 返回内容为空
    #[error("LLM返回内容为空 (模型: {model})")]
    EmptyContent { model: String },
    /// 响应不是合法 JSON
    #[error("无法解析LLM返回的JSON (响应: {response}): {source}")]
    JsonParseFailed {
        response: String,
        #[source]
        source: serde_json::Error,
    },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置文件读取失败
    #[error("无法读取配置文件 {}: {source}", .path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({}): {source}", .path.display())]
    TomlParseFailed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    /// 必填项缺失
    #[error("缺少必填配置项: {name}")]
    Missing { name: &'static str },
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建文件读取错误
    pub fn file_read_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: path.into(),
            source,
        })
    }

    /// 创建文件写入错误
    pub fn file_write_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AppError::File(FileError::WriteFailed {
            path: path.into(),
            source,
        })
    }

    /// 创建LLM API调用错误
    pub fn llm_api_failed(model: impl Into<String>, detail: impl ToString) -> Self {
        AppError::Llm(LlmError::ApiCallFailed {
            model: model.into(),
            detail: detail.to_string(),
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

/// 远程存储结果类型
pub type StoreResult<T> = Result<T, StoreError>;

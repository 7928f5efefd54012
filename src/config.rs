//! 程序配置
//!
//! 加载顺序：内置默认值 → TOML 配置文件（可选，所有字段可省略）→ 环境变量。

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::error::ConfigError;
use crate::infrastructure::RetryPolicy;

/// 程序配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- FTP 配置 ---
    pub ftp_host: String,
    pub ftp_port: u16,
    pub ftp_user: String,
    pub ftp_password: String,
    /// 控制连接超时（秒）
    pub ftp_timeout_secs: u64,
    pub ftp_passive: bool,

    // --- 远程目录布局 ---
    /// 数据根目录（相对于登录目录）
    pub data_root: String,
    pub raw_dir: String,
    pub analyzed_dir: String,
    /// 结果文件上传目录，空字符串表示登录根目录
    pub results_dir: String,

    // --- 批处理 ---
    /// 每批文件数，每批结束后保存检查点
    pub batch_size: usize,
    /// 每处理多少个文件重新建立一次连接
    pub reconnect_every: usize,
    /// 每批开始前都重新建立连接
    pub reconnect_per_batch: bool,
    /// 单文件错误上限，超过后中止；None 表示只记录不中止
    pub max_errors: Option<usize>,
    /// 是否先把整批文件下载到本地临时目录
    pub local_staging: bool,
    pub checkpoint_path: PathBuf,
    pub table_file: PathBuf,
    pub examples_file: PathBuf,

    // --- 重试策略 ---
    pub retry_max_attempts: u32,
    pub retry_initial_backoff_ms: u64,
    pub retry_max_backoff_ms: u64,
    /// 会话空闲超过该时间后重新连接（秒）
    pub idle_timeout_secs: u64,

    // --- 抓取 ---
    pub bora_base_url: String,
    pub scrape_start_number: u64,
    /// 连续多少个编号不存在后结束当天的抓取
    pub scrape_max_misses: u32,
    pub scrape_delay_ms: u64,
    pub scrape_day_delay_ms: u64,
    pub local_data_dir: PathBuf,

    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,

    // --- 读取 API ---
    pub api_bind: String,
    pub api_default_limit: usize,

    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ftp_host: "localhost".to_string(),
            ftp_port: 21,
            ftp_user: String::new(),
            ftp_password: String::new(),
            ftp_timeout_secs: 60,
            ftp_passive: true,
            data_root: "data".to_string(),
            raw_dir: "raw".to_string(),
            analyzed_dir: "analyzed".to_string(),
            results_dir: String::new(),
            batch_size: 1000,
            reconnect_every: 5000,
            reconnect_per_batch: false,
            max_errors: None,
            local_staging: false,
            checkpoint_path: PathBuf::from("checkpoint_tipos.json"),
            table_file: PathBuf::from("tipos_desde_h2.csv"),
            examples_file: PathBuf::from("ejemplos_h2_completos.json"),
            retry_max_attempts: 3,
            retry_initial_backoff_ms: 1000,
            retry_max_backoff_ms: 30_000,
            idle_timeout_secs: 300,
            bora_base_url: "https://www.boletinoficial.gob.ar".to_string(),
            scrape_start_number: 300_720,
            scrape_max_misses: 50,
            scrape_delay_ms: 500,
            scrape_day_delay_ms: 2000,
            local_data_dir: PathBuf::from("data"),
            llm_api_key: String::new(),
            llm_api_base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            llm_model_name: "gemini-1.5-flash".to_string(),
            api_bind: "0.0.0.0:10000".to_string(),
            api_default_limit: 50,
            verbose_logging: false,
            output_log_file: PathBuf::from("output.txt"),
        }
    }
}

impl Config {
    /// 加载配置：默认值 → 配置文件 → 环境变量
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        Ok(base.with_env())
    }

    /// 只使用默认值和环境变量
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::TomlParseFailed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 用环境变量覆盖已有的值
    pub fn with_env(self) -> Self {
        let base = self;
        Self {
            ftp_host: env_string("FTP_HOST", base.ftp_host),
            ftp_port: env_parse("FTP_PORT", base.ftp_port),
            ftp_user: env_string("FTP_USER", base.ftp_user),
            ftp_password: env_string("HOSTINGER_FTP_PASSWORD", base.ftp_password),
            ftp_timeout_secs: env_parse("FTP_TIMEOUT_SECS", base.ftp_timeout_secs),
            ftp_passive: env_parse("FTP_PASSIVE", base.ftp_passive),
            data_root: env_string("DATA_ROOT", base.data_root),
            raw_dir: env_string("RAW_DIR", base.raw_dir),
            analyzed_dir: env_string("ANALYZED_DIR", base.analyzed_dir),
            results_dir: env_string("RESULTS_DIR", base.results_dir),
            batch_size: env_parse("BATCH_SIZE", base.batch_size),
            reconnect_every: env_parse("RECONNECT_EVERY", base.reconnect_every),
            reconnect_per_batch: env_parse("RECONNECT_PER_BATCH", base.reconnect_per_batch),
            max_errors: match std::env::var("CLASSIFY_MAX_ERRORS") {
                Ok(v) => parse_or_warn("CLASSIFY_MAX_ERRORS", &v).or(base.max_errors),
                Err(_) => base.max_errors,
            },
            local_staging: env_parse("LOCAL_STAGING", base.local_staging),
            checkpoint_path: env_path("CHECKPOINT_PATH", base.checkpoint_path),
            table_file: env_path("TABLE_FILE", base.table_file),
            examples_file: env_path("EXAMPLES_FILE", base.examples_file),
            retry_max_attempts: env_parse("RETRY_MAX_ATTEMPTS", base.retry_max_attempts),
            retry_initial_backoff_ms: env_parse(
                "RETRY_INITIAL_BACKOFF_MS",
                base.retry_initial_backoff_ms,
            ),
            retry_max_backoff_ms: env_parse("RETRY_MAX_BACKOFF_MS", base.retry_max_backoff_ms),
            idle_timeout_secs: env_parse("IDLE_TIMEOUT_SECS", base.idle_timeout_secs),
            bora_base_url: env_string("BORA_BASE_URL", base.bora_base_url),
            scrape_start_number: env_parse("SCRAPE_START_NUMBER", base.scrape_start_number),
            scrape_max_misses: env_parse("SCRAPE_MAX_MISSES", base.scrape_max_misses),
            scrape_delay_ms: env_parse("SCRAPE_DELAY_MS", base.scrape_delay_ms),
            scrape_day_delay_ms: env_parse("SCRAPE_DAY_DELAY_MS", base.scrape_day_delay_ms),
            local_data_dir: env_path("LOCAL_DATA_DIR", base.local_data_dir),
            llm_api_key: std::env::var("LLM_API_KEY")
                .or_else(|_| std::env::var("GEMINI_API_KEY"))
                .unwrap_or(base.llm_api_key),
            llm_api_base_url: env_string("LLM_API_BASE_URL", base.llm_api_base_url),
            llm_model_name: env_string("LLM_MODEL_NAME", base.llm_model_name),
            api_bind: match std::env::var("PORT") {
                Ok(port) => format!("0.0.0.0:{}", port),
                Err(_) => base.api_bind,
            },
            api_default_limit: env_parse("API_DEFAULT_LIMIT", base.api_default_limit),
            verbose_logging: env_parse("VERBOSE_LOGGING", base.verbose_logging),
            output_log_file: env_path("OUTPUT_LOG_FILE", base.output_log_file),
        }
    }

    /// 连接重试策略
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts.max(1),
            initial_backoff: Duration::from_millis(self.retry_initial_backoff_ms),
            max_backoff: Duration::from_millis(self.retry_max_backoff_ms),
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
        }
    }

    /// 原始数据目录（相对于登录目录）
    pub fn raw_path(&self) -> String {
        join_remote(&self.data_root, &self.raw_dir)
    }

    /// 分析结果目录（相对于登录目录）
    pub fn analyzed_path(&self) -> String {
        join_remote(&self.data_root, &self.analyzed_dir)
    }

    /// 检查 FTP 必填项
    pub fn require_ftp_credentials(&self) -> Result<(), ConfigError> {
        if self.ftp_user.is_empty() {
            return Err(ConfigError::Missing { name: "FTP_USER" });
        }
        if self.ftp_password.is_empty() {
            return Err(ConfigError::Missing {
                name: "HOSTINGER_FTP_PASSWORD",
            });
        }
        Ok(())
    }
}

/// 拼接远程路径，忽略空段
pub fn join_remote(base: &str, child: &str) -> String {
    let base = base.trim_end_matches('/');
    let child = child.trim_start_matches('/');
    match (base.is_empty(), child.is_empty()) {
        (true, _) => child.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{}/{}", base, child),
    }
}

fn env_string(name: &str, default: String) -> String {
    std::env::var(name).unwrap_or(default)
}

fn env_path(name: &str, default: PathBuf) -> PathBuf {
    std::env::var(name).map(PathBuf::from).unwrap_or(default)
}

fn env_parse<T: FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(value) => parse_or_warn(name, &value).unwrap_or(default),
        Err(_) => default,
    }
}

fn parse_or_warn<T: FromStr>(name: &str, value: &str) -> Option<T> {
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!("⚠️ 环境变量 {} 的值 '{}' 无法解析，使用默认值", name, value);
            None
        }
    }
}

//! 基础设施层（Infrastructure Layer）
//!
//! 持有稀缺资源（远程存储会话），只暴露能力：列出、下载、上传。
//!
//! - `RemoteStore` / `StoreConnector` - 会话与连接能力的抽象
//! - `FtpConnector` - 基于 suppaftp 的 FTP 实现
//! - `MemoryConnector` - 内存实现，测试和演练用
//! - `RetryPolicy` - 统一的指数退避重试策略
//! - `ManagedSession` - 唯一的会话持有者，负责按策略重连
//! - `SharedSession` - 异步代码通过它在阻塞线程上使用 `ManagedSession`

pub mod ftp_store;
pub mod memory_store;
pub mod remote_store;
pub mod retry;
pub mod session;

pub use ftp_store::{FtpConnector, FtpStore};
pub use memory_store::{MemoryConnector, MemoryStore};
pub use remote_store::{connect_with_retry, list_dir, with_store, RemoteStore, StoreConnector};
pub use retry::RetryPolicy;
pub use session::{ManagedSession, SharedSession};

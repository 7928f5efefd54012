//! FTP 存储实现
//!
//! 基于 `suppaftp` 的同步客户端：被动模式、二进制传输、带超时的控制连接。

use std::io::Cursor;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream, Mode};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{StoreError, StoreResult};
use crate::infrastructure::remote_store::normalize_listing;
use crate::infrastructure::{RemoteStore, StoreConnector};

/// FTP 连接参数
#[derive(Clone, Debug)]
pub struct FtpConnector {
    host: String,
    port: u16,
    user: String,
    password: String,
    timeout: Duration,
    passive: bool,
}

impl FtpConnector {
    pub fn new(config: &Config) -> Self {
        Self {
            host: config.ftp_host.clone(),
            port: config.ftp_port,
            user: config.ftp_user.clone(),
            password: config.ftp_password.clone(),
            timeout: Duration::from_secs(config.ftp_timeout_secs),
            passive: config.ftp_passive,
        }
    }

    fn resolve(&self) -> StoreResult<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| StoreError::ConnectFailed {
                host: self.host.clone(),
                detail: e.to_string(),
            })?
            .next()
            .ok_or_else(|| StoreError::ConnectFailed {
                host: self.host.clone(),
                detail: "无法解析主机地址".to_string(),
            })
    }
}

impl StoreConnector for FtpConnector {
    fn connect(&self) -> StoreResult<Box<dyn RemoteStore>> {
        let addr = self.resolve()?;
        debug!("正在连接 FTP: {} ({})", self.host, addr);

        let mut stream =
            FtpStream::connect_timeout(addr, self.timeout).map_err(|e| {
                StoreError::ConnectFailed {
                    host: self.host.clone(),
                    detail: e.to_string(),
                }
            })?;

        stream
            .get_ref()
            .set_read_timeout(Some(self.timeout))
            .map_err(StoreError::Io)?;

        stream
            .login(&self.user, &self.password)
            .map_err(|e| StoreError::LoginFailed {
                user: self.user.clone(),
                detail: e.to_string(),
            })?;

        if self.passive {
            stream.set_mode(Mode::Passive);
        }
        stream
            .transfer_type(FileType::Binary)
            .map_err(|e| ftp_error("TYPE I", e))?;

        info!("✓ FTP 已连接: {}@{}", self.user, self.host);
        Ok(Box::new(FtpStore { stream }))
    }

    fn describe(&self) -> String {
        format!("ftp://{}@{}:{}", self.user, self.host, self.port)
    }
}

/// 一个 FTP 会话
pub struct FtpStore {
    stream: FtpStream,
}

impl RemoteStore for FtpStore {
    fn change_dir(&mut self, dir: &str) -> StoreResult<()> {
        if dir.is_empty() {
            return Ok(());
        }
        self.stream
            .cwd(dir)
            .map_err(|e| ftp_error(&format!("CWD {}", dir), e))
    }

    fn list_names(&mut self, suffix: Option<&str>) -> StoreResult<Vec<String>> {
        let names = self
            .stream
            .nlst(None)
            .map_err(|e| ftp_error("NLST", e))?;
        Ok(normalize_listing(names, suffix))
    }

    fn retrieve(&mut self, name: &str) -> StoreResult<Vec<u8>> {
        let buffer = self
            .stream
            .retr_as_buffer(name)
            .map_err(|e| ftp_error(&format!("RETR {}", name), e))?;
        Ok(buffer.into_inner())
    }

    fn store(&mut self, name: &str, data: &[u8]) -> StoreResult<()> {
        let mut reader = Cursor::new(data);
        let written = self
            .stream
            .put_file(name, &mut reader)
            .map_err(|e| ftp_error(&format!("STOR {}", name), e))?;
        debug!("已上传 {} ({} 字节)", name, written);
        Ok(())
    }

    fn disconnect(&mut self) -> StoreResult<()> {
        self.stream.quit().map_err(|e| ftp_error("QUIT", e))
    }
}

/// 按 FTP 回复码归类错误：只看状态码，不看回复文本
fn ftp_error(command: &str, err: FtpError) -> StoreError {
    match err {
        FtpError::ConnectionError(e) => StoreError::disconnected(command, e),
        FtpError::UnexpectedResponse(response) => classify_reply(
            command,
            response.status.code(),
            String::from_utf8_lossy(&response.body).trim(),
        ),
        other => StoreError::command(command, other),
    }
}

fn classify_reply(command: &str, code: u32, detail: &str) -> StoreError {
    match code {
        550 => StoreError::NotFound {
            path: command
                .split_once(' ')
                .map(|(_, arg)| arg.to_string())
                .unwrap_or_else(|| command.to_string()),
        },
        // 421 服务关闭、425 无法打开数据连接、426 数据连接中断
        421 | 425 | 426 => StoreError::disconnected(command, detail),
        _ => StoreError::command(command, detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn code_550_maps_to_not_found() {
        let err = classify_reply("RETR faltante.json", 550, "550 No such file");
        assert!(matches!(err, StoreError::NotFound { ref path } if path == "faltante.json"));
        assert!(!err.is_transport());
    }

    #[test]
    fn digits_in_file_names_do_not_change_the_category() {
        let err = classify_reply(
            "RETR medida_305501_20240102.json",
            451,
            "451 connection reset while reading medida_305501_20240102.json",
        );
        assert!(matches!(err, StoreError::CommandFailed { .. }));
        assert!(!err.is_transport());
    }

    #[test]
    fn closing_replies_are_transport_errors() {
        for code in [421, 425, 426] {
            let err = classify_reply("NLST", code, "service closing");
            assert!(err.is_transport(), "{}", code);
        }
    }

    #[test]
    fn socket_failures_are_transport_errors() {
        let err = ftp_error(
            "RETR medida_1_20240102.json",
            FtpError::ConnectionError(io::Error::from(io::ErrorKind::ConnectionReset)),
        );
        assert!(matches!(err, StoreError::Disconnected { .. }));
        assert!(err.is_transport());

        let err = ftp_error("PASV", FtpError::BadResponse);
        assert!(!err.is_transport());
    }
}

//! Hand-rolled RESP client for enqueueing spider tasks onto a Redis list
//! (§4.8, §4.8.1). No general-purpose Redis client: `AUTH`, `SELECT`, `LPUSH`
//! are the only commands this workspace ever issues against Redis, so a plain
//! RESP array writer/reader over `TcpStream` is enough.

use serde::Serialize;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

#[derive(Debug, thiserror::Error)]
pub enum SpiderGatewayError {
    #[error("connection error: {0}")]
    Connect(String),
    #[error("redis replied with an error: {0}")]
    RedisError(String),
    #[error("timed out talking to redis")]
    Timeout,
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct SpiderEnqueuePayload {
    pub task_id: String,
    pub run_type: &'static str,
    pub site_code: String,
    pub scope_type: &'static str,
    pub scope_value: String,
    pub callback_url: String,
    pub callback_token: String,
    pub extra: serde_json::Value,
}

pub struct SpiderGateway {
    pub redis_url: String,
    pub list_key: String,
    pub timeout: Duration,
}

impl SpiderGateway {
    pub fn new(redis_url: String, list_key: String, timeout_seconds: u64) -> Self {
        Self { redis_url, list_key, timeout: Duration::from_secs(timeout_seconds) }
    }

    pub async fn enqueue(&self, payload: &SpiderEnqueuePayload) -> Result<(), SpiderGatewayError> {
        let body = serde_json::to_string(payload)?;
        let (host, port, password, db) = parse_redis_url(&self.redis_url);
        let fut = async {
            let mut stream = TcpStream::connect((host.as_str(), port))
                .await
                .map_err(|e| SpiderGatewayError::Connect(e.to_string()))?;

            if let Some(password) = password {
                send_command(&mut stream, &["AUTH", &password]).await?;
            }
            if db != 0 {
                send_command(&mut stream, &["SELECT", &db.to_string()]).await?;
            }
            send_command(&mut stream, &["LPUSH", &self.list_key, &body]).await?;
            Ok(())
        };
        timeout(self.timeout, fut).await.map_err(|_| SpiderGatewayError::Timeout)?
    }
}

/// `redis://[:password@]host:port[/db]`, enough of the scheme the workspace needs.
fn parse_redis_url(url: &str) -> (String, u16, Option<String>, i64) {
    let rest = url.trim_start_matches("redis://");
    let (auth_host, db) = match rest.split_once('/') {
        Some((ah, d)) => (ah, d.parse().unwrap_or(0)),
        None => (rest, 0),
    };
    let (password, host_port) = match auth_host.rsplit_once('@') {
        Some((cred, hp)) => {
            let password = cred.strip_prefix(':').unwrap_or(cred);
            (if password.is_empty() { None } else { Some(password.to_string()) }, hp)
        }
        None => (None, auth_host),
    };
    let (host, port) = host_port.rsplit_once(':').unwrap_or((host_port, "6379"));
    (host.to_string(), port.parse().unwrap_or(6379), password, db)
}

/// Writes `args` as a RESP array of bulk strings and reads one reply far enough
/// to distinguish `+OK` / `:<n>` / `-ERR ...`.
async fn send_command(stream: &mut TcpStream, args: &[&str]) -> Result<(), SpiderGatewayError> {
    let mut buf = format!("*{}\r\n", args.len());
    for arg in args {
        buf.push_str(&format!("${}\r\n{}\r\n", arg.len(), arg));
    }
    stream.write_all(buf.as_bytes()).await.map_err(|e| SpiderGatewayError::Connect(e.to_string()))?;

    let mut reply = [0u8; 512];
    let n = stream.read(&mut reply).await.map_err(|e| SpiderGatewayError::Connect(e.to_string()))?;
    let reply = String::from_utf8_lossy(&reply[..n]);
    if reply.starts_with('-') {
        return Err(SpiderGatewayError::RedisError(reply.trim().trim_start_matches('-').to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_url_with_password_and_db() {
        let (host, port, password, db) = parse_redis_url("redis://:secret@cache.internal:6380/2");
        assert_eq!(host, "cache.internal");
        assert_eq!(port, 6380);
        assert_eq!(password.as_deref(), Some("secret"));
        assert_eq!(db, 2);
    }

    #[test]
    fn parses_bare_url() {
        let (host, port, password, db) = parse_redis_url("redis://localhost:6379");
        assert_eq!(host, "localhost");
        assert_eq!(port, 6379);
        assert_eq!(password, None);
        assert_eq!(db, 0);
    }
}

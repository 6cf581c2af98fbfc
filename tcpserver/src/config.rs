//! TCP 채팅 서버 환경 설정 모듈
//!
//! Backend/.env 파일에서 환경변수를 로드하고 관리합니다.

use anyhow::Result;
use servercore::config::{DEFAULT_MAX_PACKET_ID, DEFAULT_RECV_BUFFER_SIZE, DEFAULT_SEND_CHUNK_SIZE};
use servercore::SessionConfig;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// 기본 방 이름
pub const DEFAULT_ROOM: &str = "lobby";

/// TCP 채팅 서버 설정 구조체
#[derive(Debug, Clone)]
pub struct TcpServerConfig {
    /// TCP 서버 호스트 주소
    pub host: String,
    /// TCP 서버 포트 번호
    pub port: u16,
    /// 세션당 수신 버퍼 크기
    pub recv_buffer_size: usize,
    /// 송신 청크 크기
    pub send_chunk_size: usize,
    /// 허용하는 최대 PacketID
    pub max_packet_id: u16,
    /// 큐 통계 로그 주기 (초)
    pub stats_interval_secs: u64,
    /// 접속 시 자동 입장하는 방
    pub default_room: String,
}

impl Default for TcpServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4000,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            send_chunk_size: DEFAULT_SEND_CHUNK_SIZE,
            max_packet_id: DEFAULT_MAX_PACKET_ID,
            stats_interval_secs: 30,
            default_room: DEFAULT_ROOM.to_string(),
        }
    }
}

impl TcpServerConfig {
    /// 환경변수에서 설정을 로드합니다.
    ///
    /// 로드 순서:
    /// 1. 프로젝트 루트의 .env 파일 (Backend/.env)
    /// 2. 현재 디렉토리의 .env 파일
    /// 3. 시스템 환경변수
    /// 4. 기본값
    pub fn from_env() -> Result<Self> {
        Self::load_env_file();

        let defaults = Self::default();
        let config = Self {
            host: std::env::var("tcp_host").unwrap_or(defaults.host),
            port: env_or("tcp_port", defaults.port),
            recv_buffer_size: env_or("recv_buffer_size", defaults.recv_buffer_size),
            send_chunk_size: env_or("send_chunk_size", defaults.send_chunk_size),
            max_packet_id: env_or("max_packet_id", defaults.max_packet_id),
            stats_interval_secs: env_or("stats_interval_secs", defaults.stats_interval_secs),
            default_room: std::env::var("default_room").unwrap_or(defaults.default_room),
        };

        info!("TCP 서버 설정 로드 완료: {:?}", config);
        Ok(config)
    }

    /// TCP 서버 바인딩 주소를 반환합니다.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// 네트워크 코어에 넘길 세션 설정
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            recv_buffer_size: self.recv_buffer_size,
            send_chunk_size: self.send_chunk_size,
            max_packet_id: self.max_packet_id,
            ..SessionConfig::default()
        }
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }

    /// .env 파일을 로드합니다.
    fn load_env_file() {
        let env_paths = [
            "../.env",    // 상위 디렉토리 (Backend/.env)
            ".env",       // 현재 디렉토리
            "../../.env", // 프로젝트 루트
        ];

        for path in env_paths {
            if Path::new(path).exists() && dotenv::from_filename(path).is_ok() {
                info!(".env 파일 로드 성공: {}", path);
                return;
            }
        }

        warn!(".env 파일을 찾을 수 없습니다. 기본값과 시스템 환경변수를 사용합니다.");
    }
}

/// 환경변수를 읽어 파싱합니다. 없거나 파싱에 실패하면 기본값.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(value) => value.parse().unwrap_or_else(|_| {
            warn!("환경변수 {}='{}' 파싱 실패, 기본값 사용", key, value);
            default
        }),
        Err(_) => default,
    }
}

/// 설정 검증 유틸리티
pub fn validate_config(config: &TcpServerConfig) -> Result<()> {
    if config.host.is_empty() {
        anyhow::bail!("TCP 호스트 주소가 비어있습니다");
    }

    if config.stats_interval_secs == 0 {
        anyhow::bail!("stats_interval_secs는 0일 수 없습니다");
    }

    if config.default_room.trim().is_empty() {
        anyhow::bail!("기본 방 이름이 비어있습니다");
    }

    config.session_config().validate()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TcpServerConfig::default();
        tokio_test::assert_ok!(validate_config(&config));
        assert_eq!(config.bind_address(), "127.0.0.1:4000");
        assert_eq!(config.session_config().recv_buffer_size, 8192);
        assert_eq!(config.stats_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = TcpServerConfig {
            default_room: "  ".to_string(),
            ..TcpServerConfig::default()
        };
        tokio_test::assert_err!(validate_config(&config));

        let config = TcpServerConfig {
            recv_buffer_size: 8,
            ..TcpServerConfig::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_env_or_falls_back() {
        std::env::set_var("tcpserver_test_number", "not-a-number");
        assert_eq!(env_or("tcpserver_test_number", 7u16), 7);
        std::env::set_var("tcpserver_test_number", "42");
        assert_eq!(env_or("tcpserver_test_number", 7u16), 42);
        assert_eq!(env_or("tcpserver_test_missing", 9u64), 9);
    }
}

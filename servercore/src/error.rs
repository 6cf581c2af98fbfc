//! 네트워크 코어 에러 정의
//!
//! 세션/리스너/커넥터 레이어에서 발생하는 에러를 분류합니다.
//! 소켓 에러와 프로토콜 에러는 모두 해당 세션에 치명적이며 `disconnect()`로 이어집니다.

use std::net::SocketAddr;
use thiserror::Error;

/// 네트워크 코어 에러
#[derive(Error, Debug)]
pub enum NetError {
    /// 소켓 I/O 실패 (송수신, bind, accept)
    #[error("소켓 I/O 에러: {0}")]
    Io(#[from] std::io::Error),

    /// 프레이밍/파싱 실패. 스트림 재동기화는 시도하지 않습니다.
    #[error("프로토콜 에러: {0}")]
    Protocol(String),

    /// 이미 연결이 끊긴 세션에 대한 요청
    #[error("세션 {session_id} 연결이 이미 종료되었습니다")]
    Disconnected { session_id: u64 },

    /// 아웃바운드 연결 실패
    #[error("연결 실패 [{addr}]: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// 잘못된 설정값
    #[error("설정 에러 [키: {key}]: {message}")]
    Config { key: &'static str, message: String },
}

impl NetError {
    /// 프로토콜 에러 생성
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// 설정 에러 생성
    pub fn config(key: &'static str, message: impl Into<String>) -> Self {
        Self::Config {
            key,
            message: message.into(),
        }
    }
}

/// 결과 타입 별칭
pub type NetResult<T> = Result<T, NetError>;

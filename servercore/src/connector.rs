//! 커넥터
//!
//! 서버 간 통신 등 능동적으로 연결을 맺을 때 사용합니다.
//! `connect`는 한 번만 시도하며, 재시도가 필요하면 `connect_with_retry`를 씁니다.

use rand::Rng;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::SessionConfig;
use crate::error::{NetError, NetResult};
use crate::session::{Session, SessionHandler};

/// 재연결 정책 (지수 백오프 + 지터)
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: Duration::from_millis(50),
        }
    }
}

impl ReconnectPolicy {
    /// `attempt`번째 실패(0부터) 이후 기다릴 시간
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let backoff = self.base_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        let capped = backoff.min(self.max_delay.as_millis() as f64).max(0.0) as u64;

        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms > 0 {
            rand::thread_rng().gen_range(0..jitter_ms)
        } else {
            0
        };
        Duration::from_millis(capped + jitter)
    }
}

pub struct Connector;

impl Connector {
    /// 한 번 연결을 시도하고, 성공하면 팩토리가 만든 핸들러로 세션을 시작합니다.
    pub async fn connect<F, H>(addr: SocketAddr, factory: F, config: &SessionConfig) -> NetResult<Arc<Session>>
    where
        F: FnOnce() -> H,
        H: SessionHandler,
    {
        let stream = match TcpStream::connect(addr).await {
            Ok(stream) => stream,
            Err(source) => {
                warn!("연결 실패: {} ({})", addr, source);
                return Err(NetError::Connect { addr, source });
            }
        };

        let session = Session::start(stream, factory(), config)?;
        info!(session_id = session.id(), "서버 연결 성공: {}", addr);
        Ok(session)
    }

    /// 정책에 따라 실패한 연결을 재시도합니다. 마지막 에러를 반환합니다.
    pub async fn connect_with_retry<F, H>(
        addr: SocketAddr,
        factory: F,
        config: &SessionConfig,
        policy: &ReconnectPolicy,
    ) -> NetResult<Arc<Session>>
    where
        F: Fn() -> H,
        H: SessionHandler,
    {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match Self::connect(addr, &factory, config).await {
                Ok(session) => return Ok(session),
                Err(e) => {
                    attempt += 1;
                    if attempt >= max_attempts {
                        warn!("재연결 포기: {} ({}회 시도)", addr, attempt);
                        return Err(e);
                    }
                    let delay = policy.delay_for(attempt - 1);
                    info!("재연결 대기 {:?} ({}/{}): {}", delay, attempt, max_attempts, addr);
                    sleep(delay).await;
                }
            }
        }
    }
}

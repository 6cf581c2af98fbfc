//! 리스너
//!
//! 포트를 열고 accept 루프를 돌며, 연결마다 팩토리로 핸들러를 만들어 세션을 시작합니다.
//! accept 실패는 로그를 남기고 잠시 쉰 뒤 다음 accept를 겁니다.
//! 실패가 연달아 나면(EMFILE 등) 대기 시간이 늘어나고, 성공하면 초기화됩니다.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::error::{NetError, NetResult};
use crate::send_buffer::SendBufferHelper;
use crate::session::{Session, SessionHandler};

/// accept 실패 후 첫 대기 시간
const ACCEPT_RETRY_BASE: Duration = Duration::from_millis(10);
/// accept 실패 후 최대 대기 시간
const ACCEPT_RETRY_MAX: Duration = Duration::from_secs(1);

/// 접속 대기 중인 서버 소켓
pub struct Listener {
    local_addr: SocketAddr,
    accepted: Arc<AtomicU64>,
    accept_task: JoinHandle<()>,
}

impl Listener {
    /// `addr`에 바인딩하고 accept 루프를 시작합니다.
    pub async fn bind<F, H>(addr: SocketAddr, factory: F, config: SessionConfig) -> NetResult<Listener>
    where
        F: Fn() -> H + Send + Sync + 'static,
        H: SessionHandler,
    {
        config.validate()?;
        SendBufferHelper::set_chunk_size(config.send_chunk_size);

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(config.listen_backlog)?;
        let local_addr = listener.local_addr()?;

        info!("🚀 리스너 시작: {} (backlog {})", local_addr, config.listen_backlog);

        let accepted = Arc::new(AtomicU64::new(0));
        let accept_task = tokio::spawn(accept_loop(listener, factory, config, accepted.clone()));

        Ok(Listener {
            local_addr,
            accepted,
            accept_task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 지금까지 세션으로 시작된 연결 수
    pub fn accepted_count(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// accept 루프를 멈춥니다. 이미 만들어진 세션은 영향을 받지 않습니다.
    pub fn shutdown(&self) {
        if !self.accept_task.is_finished() {
            info!("리스너 종료: {}", self.local_addr);
            self.accept_task.abort();
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn accept_loop<F, H>(listener: TcpListener, factory: F, config: SessionConfig, accepted: Arc<AtomicU64>)
where
    F: Fn() -> H + Send + Sync + 'static,
    H: SessionHandler,
{
    let mut consecutive_errors = 0u32;
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(pair) => {
                consecutive_errors = 0;
                pair
            }
            Err(e) => {
                consecutive_errors = consecutive_errors.saturating_add(1);
                let delay = accept_retry_delay(consecutive_errors);
                warn!("accept 실패 ({}회 연속), {:?} 후 재시도: {}", consecutive_errors, delay, e);
                tokio::time::sleep(delay).await;
                continue;
            }
        };

        debug!(peer = %peer, "새 연결 수락");
        match Session::start(stream, factory(), &config) {
            Ok(session) => {
                accepted.fetch_add(1, Ordering::Relaxed);
                debug!(session_id = session.id(), peer = %peer, "세션 생성");
            }
            Err(e) => error!(peer = %peer, "세션 시작 실패: {}", e),
        }
    }
}

/// 연속 실패 횟수(1부터)에 따른 accept 재시도 대기 시간
fn accept_retry_delay(consecutive_errors: u32) -> Duration {
    let shift = consecutive_errors.saturating_sub(1).min(16);
    ACCEPT_RETRY_BASE
        .saturating_mul(1u32 << shift)
        .min(ACCEPT_RETRY_MAX)
}

/// 주소 문자열을 파싱합니다.
pub fn parse_addr(addr: &str) -> NetResult<SocketAddr> {
    addr.parse()
        .map_err(|e| NetError::config("addr", format!("잘못된 주소 '{}': {}", addr, e)))
}

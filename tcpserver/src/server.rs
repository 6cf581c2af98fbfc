//! 채팅 서버
//!
//! 리스너와 세션/방 관리자를 묶고, 주기적으로 잡 큐 통계를 로그로 남깁니다.

use anyhow::{Context, Result};
use servercore::{FramedSession, JobQueueManager, Listener};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::TcpServerConfig;
use crate::room::RoomManager;
use crate::session::{ClientSession, ClientSessionHandler, SessionManager};

/// 서버 전역에서 공유하는 관리자 묶음
pub struct ServerContext {
    pub config: TcpServerConfig,
    pub jobs: Arc<JobQueueManager>,
    pub sessions: SessionManager,
    pub rooms: RoomManager,
}

impl ServerContext {
    pub fn new(config: TcpServerConfig, jobs: Arc<JobQueueManager>) -> Arc<Self> {
        let rooms = RoomManager::new(jobs.clone(), config.default_room.clone());
        Arc::new(Self {
            config,
            jobs,
            sessions: SessionManager::new(),
            rooms,
        })
    }
}

pub struct ChatServer {
    context: Arc<ServerContext>,
    listener: Listener,
    stats_task: JoinHandle<()>,
}

impl ChatServer {
    /// 새 잡 큐 매니저로 서버를 시작합니다.
    pub async fn start(addr: SocketAddr, config: TcpServerConfig) -> Result<Self> {
        Self::start_with_jobs(addr, config, Arc::new(JobQueueManager::new())).await
    }

    /// 주어진 잡 큐 매니저를 공유하며 서버를 시작합니다.
    pub async fn start_with_jobs(
        addr: SocketAddr,
        config: TcpServerConfig,
        jobs: Arc<JobQueueManager>,
    ) -> Result<Self> {
        info!("🚀 채팅 서버 시작 중... ({})", addr);

        let session_config = config.session_config();
        let context = ServerContext::new(config, jobs);
        // 기본 방은 서버와 수명을 같이함
        context.rooms.get_or_create(context.rooms.default_room());

        let factory_context = context.clone();
        let factory_config = session_config.clone();
        let listener = Listener::bind(
            addr,
            move || {
                let client = ClientSession::new(factory_context.clone());
                FramedSession::with_config(ClientSessionHandler::new(client), &factory_config)
            },
            session_config,
        )
        .await
        .context("TCP 리스너 바인드 실패")?;

        let stats_task = spawn_stats_monitor(context.clone());

        info!("✅ 채팅 서버가 {}에서 실행 중입니다", listener.local_addr());
        Ok(Self {
            context,
            listener,
            stats_task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.context
    }

    /// 더 이상 접속을 받지 않고, 남은 세션을 모두 끊습니다.
    pub fn shutdown(&self) {
        info!("🛑 채팅 서버 중지 중...");
        self.listener.shutdown();
        self.stats_task.abort();

        for client in self.context.sessions.all() {
            client.disconnect();
        }
        info!("✅ 채팅 서버가 중지되었습니다");
    }
}

impl Drop for ChatServer {
    fn drop(&mut self) {
        self.stats_task.abort();
    }
}

fn spawn_stats_monitor(context: Arc<ServerContext>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(context.config.stats_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // 첫 tick은 즉시 완료됨
        ticker.tick().await;

        loop {
            ticker.tick().await;
            log_queue_stats(&context);
        }
    })
}

/// 큐별 대기 잡 개수와 전체 현황을 로그로 남깁니다.
pub fn log_queue_stats(context: &ServerContext) {
    let stats = context.jobs.queue_stats();
    let pending_total: usize = stats.values().sum();

    info!(
        sessions = context.sessions.count(),
        rooms = context.rooms.room_count(),
        queues = stats.len(),
        pending_total,
        "📊 잡 큐 현황"
    );

    debug!(rooms = ?context.rooms.room_ids(), "방 목록");

    let mut busy: Vec<_> = stats.into_iter().filter(|(_, pending)| *pending > 0).collect();
    busy.sort_by(|a, b| b.1.cmp(&a.1));
    for (queue, pending) in busy {
        debug!(queue = %queue, pending, "대기 중인 잡");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_creates_default_room_and_shuts_down() {
        let addr: SocketAddr = "127.0.0.1:0".parse().expect("Test assertion failed");
        let server = ChatServer::start(addr, TcpServerConfig::default())
            .await
            .expect("Test assertion failed");

        assert_ne!(server.local_addr().port(), 0);
        assert!(server.context().rooms.find("lobby").is_some());
        assert_eq!(server.context().sessions.count(), 0);

        log_queue_stats(server.context());
        server.shutdown();
    }
}

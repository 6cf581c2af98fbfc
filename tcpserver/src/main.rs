//! TCP 채팅 서버 진입점

use anyhow::Result;
use servercore::listener::parse_addr;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tcpserver::{validate_config, ChatServer, TcpServerConfig};

/// 환경 설정은 Backend/.env 파일에서 로드됩니다.
///
/// 환경변수:
/// - tcp_host: TCP 서버 호스트 (기본값: "127.0.0.1")
/// - tcp_port: TCP 서버 포트 (기본값: "4000")
/// - recv_buffer_size: 세션당 수신 버퍼 크기 (기본값: 8192)
/// - send_chunk_size: 송신 청크 크기 (기본값: 8192)
/// - max_packet_id: 허용하는 최대 PacketID (기본값: 1000)
/// - stats_interval_secs: 잡 큐 통계 로그 주기 (기본값: 30)
/// - default_room: 자동 입장 방 (기본값: "lobby")
#[tokio::main]
async fn main() -> Result<()> {
    // 로깅 설정
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = TcpServerConfig::from_env()?;
    validate_config(&config)?;

    info!("=== TCP 채팅 서버 설정 ===");
    info!("TCP 서버: {}", config.bind_address());
    info!("기본 방: {}", config.default_room);
    info!("수신 버퍼: {}바이트", config.recv_buffer_size);
    info!("==========================");

    let addr = parse_addr(&config.bind_address())?;
    let server = ChatServer::start(addr, config).await?;

    // 종료 시그널 대기
    tokio::signal::ctrl_c().await?;
    info!("종료 시그널 수신, 서버를 중지합니다...");
    server.shutdown();

    Ok(())
}

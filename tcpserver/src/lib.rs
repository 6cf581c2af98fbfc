//! TCP 채팅 서버 라이브러리
//!
//! `servercore` 네트워크 코어 위에 세운 방 기반 채팅 서버입니다.
//!
//! # 주요 기능
//!
//! - **자동 입장**: 접속하면 기본 방에 들어감
//! - **방 이동**: JSON 명령 `JoinRoom` / `LeaveRoom`
//! - **채팅**: `CChat` 패킷 또는 JSON `SendMessage`를 방 전체에 `SChat`으로 브로드캐스트
//! - **인원 알림**: 입장/퇴장 시 `RoomUpdate`
//!
//! # 아키텍처
//!
//! ```text
//! ChatServer
//! ├── Listener (servercore)
//! │   └── FramedSession<ClientSessionHandler>
//! ├── SessionManager
//! │   └── ClientSession (세션 잡 큐 session:<id>)
//! └── RoomManager
//!     └── GameRoom (방 잡 큐 room:<id>)
//! ```
//!
//! # 사용 예시
//!
//! ```no_run
//! use tcpserver::{ChatServer, TcpServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = TcpServerConfig::from_env()?;
//!     let server = ChatServer::start(config.bind_address().parse()?, config).await?;
//!     tokio::signal::ctrl_c().await?;
//!     server.shutdown();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod protocol;
pub mod room;
pub mod server;
pub mod session;

pub use config::{validate_config, TcpServerConfig};
pub use error::TcpServerError;
pub use protocol::{ClientCommand, PacketId, ServerResponse};
pub use room::{GameRoom, RoomManager};
pub use server::{ChatServer, ServerContext};
pub use session::{ClientSession, SessionManager};

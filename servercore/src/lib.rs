//! 서버 네트워크 코어
//!
//! TCP 세션 관리와 잡 직렬화를 위한 재사용 가능한 라이브러리입니다.
//!
//! # 주요 기능
//!
//! - **수신 버퍼**: 재할당 없는 슬라이딩 윈도우 버퍼
//! - **송신 버퍼**: 워커별 청크 풀에서 잘라 쓰는 송신 세그먼트
//! - **세션**: 비동기 수신/송신 루프, 한 번만 실행되는 disconnect
//! - **프레이밍**: Raw / Tagged / 길이 프리픽스 세션 어댑터
//! - **리스너/커넥터**: accept 루프, 단발 연결과 재연결 정책
//! - **잡 큐**: 공유 상태 작업을 락 없이 직렬 실행
//!
//! # 아키텍처
//!
//! ```text
//! Listener / Connector
//! └── Session (RecvBuffer, 송신 큐)
//!     └── SessionHandler
//!         ├── RawSession
//!         ├── TaggedSession
//!         └── FramedSession
//! JobQueueManager
//! └── JobQueue (rayon 워커에서 드레인)
//! ```
//!
//! # 사용 예시
//!
//! ```no_run
//! use servercore::{FramedSession, Listener, NetResult, Session, SessionConfig, TaggedPacketHandler};
//! use std::sync::Arc;
//!
//! struct Echo;
//!
//! impl TaggedPacketHandler for Echo {
//!     fn on_recv_packet(&self, session: &Arc<Session>, packet_id: u16, payload: &[u8]) -> NetResult<()> {
//!         session.send(servercore::encode_frame(packet_id, payload))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let listener = Listener::bind(
//!         "127.0.0.1:7777".parse()?,
//!         || FramedSession::new(Echo),
//!         SessionConfig::default(),
//!     )
//!     .await?;
//!     println!("listening on {}", listener.local_addr());
//!     tokio::signal::ctrl_c().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connector;
pub mod error;
pub mod job_queue;
pub mod listener;
pub mod packet_session;
pub mod recv_buffer;
pub mod send_buffer;
pub mod session;

pub use config::SessionConfig;
pub use connector::{Connector, ReconnectPolicy};
pub use error::{NetError, NetResult};
pub use job_queue::{Job, JobQueue, JobQueueManager, JobQueueStats};
pub use listener::Listener;
pub use packet_session::{
    encode_frame, encode_json_frame, encode_tagged, FramedSession, RawPacketHandler, RawSession,
    TaggedPacketHandler, TaggedSession, FRAME_HEADER_SIZE, JSON_PACKET_ID,
};
pub use recv_buffer::RecvBuffer;
pub use send_buffer::{SendBuffer, SendBufferHelper};
pub use session::{Session, SessionHandler, SessionStats};

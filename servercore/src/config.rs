//! 세션 코어 설정
//!
//! 버퍼 크기, listen backlog, 패킷 검증 한계값을 관리합니다.

use crate::error::{NetError, NetResult};

/// 수신 버퍼 기본 크기 (8KB)
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 8192;
/// 송신 청크 기본 크기 (8KB)
pub const DEFAULT_SEND_CHUNK_SIZE: usize = 8192;
/// 기본 listen backlog
pub const DEFAULT_LISTEN_BACKLOG: u32 = 10;
/// 이보다 큰 PacketID는 버퍼 오염으로 간주합니다.
pub const DEFAULT_MAX_PACKET_ID: u16 = 1000;

/// 세션/리스너 공통 설정
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// 세션당 수신 버퍼 크기
    pub recv_buffer_size: usize,
    /// 워커별 송신 청크 크기
    pub send_chunk_size: usize,
    /// listen backlog
    pub listen_backlog: u32,
    /// 허용하는 최대 PacketID
    pub max_packet_id: u16,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            send_chunk_size: DEFAULT_SEND_CHUNK_SIZE,
            listen_backlog: DEFAULT_LISTEN_BACKLOG,
            max_packet_id: DEFAULT_MAX_PACKET_ID,
        }
    }
}

impl SessionConfig {
    /// 길이 프리픽스 프레임이 가질 수 있는 최대 크기.
    ///
    /// 한 프레임은 반드시 수신 버퍼 하나에 들어가야 합니다.
    pub fn max_frame_size(&self) -> usize {
        self.recv_buffer_size
    }

    /// 설정 검증
    pub fn validate(&self) -> NetResult<()> {
        if self.recv_buffer_size < 64 {
            return Err(NetError::config(
                "recv_buffer_size",
                format!("최소 64바이트 이상이어야 합니다 (현재: {})", self.recv_buffer_size),
            ));
        }
        if self.send_chunk_size == 0 {
            return Err(NetError::config("send_chunk_size", "0일 수 없습니다"));
        }
        if self.listen_backlog == 0 {
            return Err(NetError::config("listen_backlog", "0일 수 없습니다"));
        }
        Ok(())
    }
}

//! 채팅 서버 도메인 에러

use thiserror::Error;

/// TCP 채팅 서버 에러 타입
#[derive(Error, Debug)]
pub enum TcpServerError {
    /// 알 수 없는 PacketID
    #[error("알 수 없는 패킷 ID: {0}")]
    UnknownPacket(u16),

    /// 알 수 없거나 형식이 잘못된 JSON 명령
    #[error("잘못된 명령: {0}")]
    BadCommand(String),

    /// 페이로드 역직렬화 실패
    #[error("페이로드 파싱 실패 [패킷 {packet_id}]: {message}")]
    InvalidPayload { packet_id: u16, message: String },

    /// 비어 있거나 너무 긴 채팅 메시지
    #[error("잘못된 메시지: {0}")]
    InvalidMessage(String),

    /// 존재하지 않는 방
    #[error("방을 찾을 수 없습니다: {room_id}")]
    RoomNotFound { room_id: String },

    /// 방에 들어가 있지 않은 세션의 요청
    #[error("세션 {session_id}은(는) 방에 입장해 있지 않습니다")]
    NotInRoom { session_id: u64 },

    /// 이미 끊긴 세션
    #[error("세션 {session_id} 연결이 종료되었습니다")]
    SessionClosed { session_id: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(TcpServerError::UnknownPacket(77).to_string(), "알 수 없는 패킷 ID: 77");
        let e = TcpServerError::RoomNotFound {
            room_id: "abc".to_string(),
        };
        assert!(e.to_string().contains("abc"));

        let wrapped: anyhow::Error = TcpServerError::NotInRoom { session_id: 3 }.into();
        assert!(matches!(
            wrapped.downcast_ref::<TcpServerError>(),
            Some(TcpServerError::NotInRoom { session_id: 3 })
        ));
    }
}

//! 채팅 프로토콜 정의
//!
//! 모든 패킷은 길이 프리픽스 프레임으로 오갑니다.
//!
//! ```text
//! [4바이트 전체 길이 (LE)][2바이트 PacketID (LE)][페이로드]
//! ```
//!
//! - PacketID 0: JSON 명령/응답 텍스트 (`{"Type":"JoinRoom","RoomId":"lobby"}`)
//! - PacketID 1 이상: 아래 `PacketId`, 페이로드는 JSON 직렬화된 패킷 구조체

use anyhow::{Context, Result};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use servercore::{encode_frame, encode_json_frame};

use crate::error::TcpServerError;

/// 채팅 메시지 최대 글자 수
pub const MAX_CHAT_LENGTH: usize = 200;

/// 바이너리 패킷 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum PacketId {
    /// 클라이언트 → 서버 채팅
    CChat = 1,
    /// 서버 → 클라이언트 채팅 브로드캐스트
    SChat = 2,
    /// 서버 → 클라이언트 방 인원 변경
    RoomUpdate = 3,
}

impl TryFrom<u16> for PacketId {
    type Error = TcpServerError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(PacketId::CChat),
            2 => Ok(PacketId::SChat),
            3 => Ok(PacketId::RoomUpdate),
            other => Err(TcpServerError::UnknownPacket(other)),
        }
    }
}

impl From<PacketId> for u16 {
    fn from(id: PacketId) -> u16 {
        id as u16
    }
}

/// 클라이언트 채팅 요청
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CChat {
    pub message: String,
}

/// 방 안의 모두에게 전달되는 채팅
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SChat {
    pub player_id: u64,
    pub message: String,
    /// Unix 타임스탬프 (밀리초)
    pub timestamp: i64,
}

/// 방 인원 변경 이벤트 종류
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoomEvent {
    Entered,
    Left,
    Snapshot,
}

/// 방 인원 변경 알림
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RoomUpdate {
    pub room_id: String,
    pub event: RoomEvent,
    pub player_id: Option<u64>,
    pub member_count: usize,
}

/// PacketID 0으로 오는 JSON 명령
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "Type")]
pub enum ClientCommand {
    JoinRoom {
        #[serde(rename = "RoomId")]
        room_id: String,
    },
    LeaveRoom {
        #[serde(rename = "RoomId")]
        room_id: String,
    },
    SendMessage {
        #[serde(rename = "Message")]
        message: String,
    },
}

/// PacketID 0으로 나가는 JSON 응답
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "Type")]
pub enum ServerResponse {
    JoinRoomResponse {
        #[serde(rename = "Success")]
        success: bool,
        #[serde(rename = "RoomId")]
        room_id: String,
    },
    LeaveRoomResponse {
        #[serde(rename = "Success")]
        success: bool,
        #[serde(rename = "RoomId")]
        room_id: String,
    },
    Error {
        #[serde(rename = "Message")]
        message: String,
    },
}

impl ClientCommand {
    pub fn from_json(json: &str) -> Result<Self, TcpServerError> {
        serde_json::from_str(json).map_err(|e| TcpServerError::BadCommand(e.to_string()))
    }
}

impl ServerResponse {
    pub fn to_frame(&self) -> Result<Bytes> {
        let json = serde_json::to_string(self).context("응답 직렬화 실패")?;
        Ok(encode_json_frame(&json))
    }
}

/// 채팅 메시지를 검증합니다. 비어 있거나 `MAX_CHAT_LENGTH`자를 넘으면 거부합니다.
///
/// 글자 수 제한 덕분에 `SChat` 프레임은 항상 기본 최대 프레임 크기 안에 들어갑니다.
pub fn validate_chat_message(message: &str) -> Result<(), TcpServerError> {
    if message.trim().is_empty() {
        return Err(TcpServerError::InvalidMessage("빈 메시지".to_string()));
    }
    let length = message.chars().count();
    if length > MAX_CHAT_LENGTH {
        return Err(TcpServerError::InvalidMessage(format!(
            "메시지가 너무 깁니다 ({}자, 최대 {}자)",
            length, MAX_CHAT_LENGTH
        )));
    }
    Ok(())
}

/// 패킷 구조체를 프레임으로 인코딩
pub fn encode_packet<T: Serialize>(packet_id: PacketId, packet: &T) -> Result<Bytes> {
    let payload = serde_json::to_vec(packet).with_context(|| format!("{:?} 직렬화 실패", packet_id))?;
    Ok(encode_frame(packet_id.into(), &payload))
}

/// 페이로드를 패킷 구조체로 디코딩
pub fn decode_packet<T: DeserializeOwned>(packet_id: PacketId, payload: &[u8]) -> Result<T, TcpServerError> {
    serde_json::from_slice(payload).map_err(|e| TcpServerError::InvalidPayload {
        packet_id: packet_id.into(),
        message: e.to_string(),
    })
}

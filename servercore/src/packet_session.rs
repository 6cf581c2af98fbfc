//! 패킷 프레이밍 세션
//!
//! `SessionHandler`를 구현하는 재사용 가능한 프레이밍 어댑터들입니다.
//!
//! # 와이어 포맷
//!
//! **RawSession** — 수신 버퍼 전체를 불투명한 메시지 하나로 취급합니다.
//!
//! **TaggedSession** — 커스텀 헤더 방식 (버퍼 점유량이 곧 메시지 경계):
//! ```text
//! [2바이트 PacketID (LE)][페이로드 ...버퍼 끝까지]
//! 또는
//! {JSON 텍스트 ...버퍼 끝까지}        (첫 바이트가 '{')
//! ```
//!
//! **FramedSession** — 길이 프리픽스 방식 (헤더 → 바디 2단계 파싱):
//! ```text
//! [4바이트 전체 길이 (LE, 헤더 포함)][2바이트 PacketID (LE)][페이로드]
//! ```
//! PacketID `0`은 UTF-8 JSON 텍스트 페이로드로 예약되어 있습니다.

use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

use crate::config::SessionConfig;
use crate::error::{NetError, NetResult};
use crate::send_buffer::SendBufferHelper;
use crate::session::{Session, SessionHandler};

/// PacketID 크기
pub const PACKET_ID_SIZE: usize = 2;
/// 길이 프리픽스 크기
pub const LENGTH_PREFIX_SIZE: usize = 4;
/// FramedSession 헤더 크기
pub const FRAME_HEADER_SIZE: usize = LENGTH_PREFIX_SIZE + PACKET_ID_SIZE;
/// FramedSession에서 JSON 텍스트를 실어 나르는 PacketID
pub const JSON_PACKET_ID: u16 = 0;
/// '{'
const JSON_OPEN_BRACE: u8 = 0x7B;

/// 파싱된 패킷 하나
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packet<'a> {
    Binary { packet_id: u16, payload: &'a [u8] },
    Json(&'a str),
}

/// 프레임 검증 한계값
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLimits {
    pub max_packet_id: u16,
    pub max_frame_size: usize,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}

impl FrameLimits {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            max_packet_id: config.max_packet_id,
            max_frame_size: config.max_frame_size(),
        }
    }
}

/// 버퍼 전체를 메시지 하나로 받는 핸들러
pub trait RawPacketHandler: Send + Sync + 'static {
    fn on_connected(&self, _session: &Arc<Session>, _peer: SocketAddr) {}

    fn on_recv_packet(&self, session: &Arc<Session>, data: &[u8]) -> NetResult<()>;

    fn on_send(&self, _session: &Arc<Session>, _num_of_bytes: usize) {}

    fn on_disconnected(&self, _session: &Arc<Session>, _peer: SocketAddr) {}
}

/// PacketID 태그가 붙은 패킷과 JSON 텍스트를 받는 핸들러
pub trait TaggedPacketHandler: Send + Sync + 'static {
    fn on_connected(&self, _session: &Arc<Session>, _peer: SocketAddr) {}

    fn on_recv_packet(&self, session: &Arc<Session>, packet_id: u16, payload: &[u8]) -> NetResult<()>;

    /// 기본 구현은 JSON 패킷을 무시합니다.
    fn on_recv_json(&self, session: &Arc<Session>, json: &str) -> NetResult<()> {
        debug!(session_id = session.id(), "처리하지 않는 JSON 패킷: {}", json);
        Ok(())
    }

    fn on_send(&self, _session: &Arc<Session>, _num_of_bytes: usize) {}

    fn on_disconnected(&self, _session: &Arc<Session>, _peer: SocketAddr) {}
}

/// 헤더 없는 패스스루 세션
pub struct RawSession<H> {
    handler: H,
}

impl<H: RawPacketHandler> RawSession<H> {
    pub fn new(handler: H) -> Self {
        Self { handler }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }
}

impl<H: RawPacketHandler> SessionHandler for RawSession<H> {
    fn on_connected(&self, session: &Arc<Session>, peer: SocketAddr) {
        self.handler.on_connected(session, peer);
    }

    fn on_recv(&self, session: &Arc<Session>, buffer: &[u8]) -> NetResult<usize> {
        if buffer.is_empty() {
            return Ok(0);
        }
        self.handler.on_recv_packet(session, buffer)?;
        Ok(buffer.len())
    }

    fn on_send(&self, session: &Arc<Session>, num_of_bytes: usize) {
        self.handler.on_send(session, num_of_bytes);
    }

    fn on_disconnected(&self, session: &Arc<Session>, peer: SocketAddr) {
        self.handler.on_disconnected(session, peer);
    }
}

/// `[PacketID][페이로드]` 또는 JSON 텍스트를 받는 세션
pub struct TaggedSession<H> {
    handler: H,
    max_packet_id: u16,
}

impl<H: TaggedPacketHandler> TaggedSession<H> {
    pub fn new(handler: H) -> Self {
        Self::with_config(handler, &SessionConfig::default())
    }

    pub fn with_config(handler: H, config: &SessionConfig) -> Self {
        Self {
            handler,
            max_packet_id: config.max_packet_id,
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }
}

impl<H: TaggedPacketHandler> SessionHandler for TaggedSession<H> {
    fn on_connected(&self, session: &Arc<Session>, peer: SocketAddr) {
        self.handler.on_connected(session, peer);
    }

    fn on_recv(&self, session: &Arc<Session>, buffer: &[u8]) -> NetResult<usize> {
        parse_tagged(buffer, self.max_packet_id, |packet| {
            dispatch(&self.handler, session, packet)
        })
    }

    fn on_send(&self, session: &Arc<Session>, num_of_bytes: usize) {
        self.handler.on_send(session, num_of_bytes);
    }

    fn on_disconnected(&self, session: &Arc<Session>, peer: SocketAddr) {
        self.handler.on_disconnected(session, peer);
    }
}

/// `[전체 길이][PacketID][페이로드]` 프레임을 받는 세션
pub struct FramedSession<H> {
    handler: H,
    limits: FrameLimits,
}

impl<H: TaggedPacketHandler> FramedSession<H> {
    pub fn new(handler: H) -> Self {
        Self::with_config(handler, &SessionConfig::default())
    }

    pub fn with_config(handler: H, config: &SessionConfig) -> Self {
        Self {
            handler,
            limits: FrameLimits::from_config(config),
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }
}

impl<H: TaggedPacketHandler> SessionHandler for FramedSession<H> {
    fn on_connected(&self, session: &Arc<Session>, peer: SocketAddr) {
        self.handler.on_connected(session, peer);
    }

    fn on_recv(&self, session: &Arc<Session>, buffer: &[u8]) -> NetResult<usize> {
        parse_framed(buffer, &self.limits, |packet| {
            dispatch(&self.handler, session, packet)
        })
    }

    fn on_send(&self, session: &Arc<Session>, num_of_bytes: usize) {
        self.handler.on_send(session, num_of_bytes);
    }

    fn on_disconnected(&self, session: &Arc<Session>, peer: SocketAddr) {
        self.handler.on_disconnected(session, peer);
    }
}

fn dispatch<H: TaggedPacketHandler>(handler: &H, session: &Arc<Session>, packet: Packet<'_>) -> NetResult<()> {
    match packet {
        Packet::Binary { packet_id, payload } => handler.on_recv_packet(session, packet_id, payload),
        Packet::Json(json) => handler.on_recv_json(session, json),
    }
}

/// TaggedSession 포맷 파싱. 버퍼에 든 것 전체를 메시지 하나로 봅니다.
///
/// 처리한 바이트 수를 반환하며, PacketID를 읽을 수 없을 만큼 짧으면 0입니다.
pub fn parse_tagged<'a, F>(buffer: &'a [u8], max_packet_id: u16, mut on_packet: F) -> NetResult<usize>
where
    F: FnMut(Packet<'a>) -> NetResult<()>,
{
    let Some(&first) = buffer.first() else {
        return Ok(0);
    };

    if first == JSON_OPEN_BRACE {
        let json = std::str::from_utf8(buffer)
            .map_err(|e| NetError::protocol(format!("JSON 패킷 UTF-8 디코딩 실패: {}", e)))?;
        on_packet(Packet::Json(json))?;
        return Ok(buffer.len());
    }

    if buffer.len() < PACKET_ID_SIZE {
        return Ok(0);
    }

    let packet_id = u16::from_le_bytes([buffer[0], buffer[1]]);
    if packet_id > max_packet_id {
        return Err(NetError::protocol(format!("비정상적인 PacketID: {}", packet_id)));
    }

    on_packet(Packet::Binary {
        packet_id,
        payload: &buffer[PACKET_ID_SIZE..],
    })?;
    Ok(buffer.len())
}

/// FramedSession 포맷 파싱. 완성된 프레임만 처리하고 그 바이트 수를 반환합니다.
///
/// 헤더는 바디가 다 오기 전에도 검증하므로, 오염된 길이 값은 즉시 에러가 됩니다.
pub fn parse_framed<'a, F>(buffer: &'a [u8], limits: &FrameLimits, mut on_packet: F) -> NetResult<usize>
where
    F: FnMut(Packet<'a>) -> NetResult<()>,
{
    let mut process_len = 0;

    loop {
        let remaining = &buffer[process_len..];
        if remaining.len() < FRAME_HEADER_SIZE {
            break;
        }

        let total_len = u32::from_le_bytes([remaining[0], remaining[1], remaining[2], remaining[3]]) as usize;
        if total_len < FRAME_HEADER_SIZE {
            return Err(NetError::protocol(format!("프레임 길이가 헤더보다 작습니다: {}", total_len)));
        }
        if total_len > limits.max_frame_size {
            return Err(NetError::protocol(format!(
                "프레임 길이 초과: {} > {}",
                total_len, limits.max_frame_size
            )));
        }

        let packet_id = u16::from_le_bytes([remaining[4], remaining[5]]);
        if packet_id > limits.max_packet_id {
            return Err(NetError::protocol(format!("비정상적인 PacketID: {}", packet_id)));
        }

        if remaining.len() < total_len {
            break;
        }

        let payload = &remaining[FRAME_HEADER_SIZE..total_len];
        if packet_id == JSON_PACKET_ID {
            let json = std::str::from_utf8(payload)
                .map_err(|e| NetError::protocol(format!("JSON 패킷 UTF-8 디코딩 실패: {}", e)))?;
            on_packet(Packet::Json(json))?;
        } else {
            on_packet(Packet::Binary { packet_id, payload })?;
        }

        process_len += total_len;
    }

    Ok(process_len)
}

/// FramedSession 프레임 인코딩
pub fn encode_frame(packet_id: u16, payload: &[u8]) -> Bytes {
    let total_len = FRAME_HEADER_SIZE + payload.len();
    SendBufferHelper::write(total_len, |region| {
        region[..LENGTH_PREFIX_SIZE].copy_from_slice(&(total_len as u32).to_le_bytes());
        region[LENGTH_PREFIX_SIZE..FRAME_HEADER_SIZE].copy_from_slice(&packet_id.to_le_bytes());
        region[FRAME_HEADER_SIZE..].copy_from_slice(payload);
        total_len
    })
}

/// JSON 텍스트를 PacketID 0 프레임으로 인코딩
pub fn encode_json_frame(json: &str) -> Bytes {
    encode_frame(JSON_PACKET_ID, json.as_bytes())
}

/// TaggedSession 포맷 인코딩
pub fn encode_tagged(packet_id: u16, payload: &[u8]) -> Bytes {
    let total_len = PACKET_ID_SIZE + payload.len();
    SendBufferHelper::write(total_len, |region| {
        region[..PACKET_ID_SIZE].copy_from_slice(&packet_id.to_le_bytes());
        region[PACKET_ID_SIZE..].copy_from_slice(payload);
        total_len
    })
}

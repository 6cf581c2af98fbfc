//! 클라이언트 세션
//!
//! 수신한 패킷은 복사해서 세션 전용 잡 큐(`session:<id>`)에서 처리합니다.
//! 수신 버퍼는 다음 수신 때 재사용되므로 잡에 슬라이스를 넘기면 안 됩니다.
//!
//! 접속하면 기본 방에 자동으로 입장하고, 끊기면 방에서 나가고 등록을 해제합니다.
//! 세션 잡 큐는 연결이 실제로 시작된 뒤(`on_connected`)에만 매니저에 등록됩니다.

use anyhow::Result;
use bytes::Bytes;
use parking_lot::Mutex;
use servercore::{JobQueue, NetResult, Session, TaggedPacketHandler};
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use tracing::{debug, info};

use crate::error::TcpServerError;
use crate::protocol::{decode_packet, validate_chat_message, CChat, ClientCommand, PacketId, ServerResponse};
use crate::room::GameRoom;
use crate::server::ServerContext;

/// 세션 잡 큐 이름
pub fn session_queue_name(session_id: u64) -> String {
    format!("session:{}", session_id)
}

pub struct ClientSession {
    session_id: u64,
    session: Mutex<Weak<Session>>,
    room: Mutex<Option<Arc<GameRoom>>>,
    job_queue: JobQueue,
    context: Arc<ServerContext>,
}

impl ClientSession {
    pub fn new(context: Arc<ServerContext>) -> Arc<Self> {
        let session_id = context.sessions.generate_id();
        let job_queue = JobQueue::new(session_queue_name(session_id));
        Arc::new(Self {
            session_id,
            session: Mutex::new(Weak::new()),
            room: Mutex::new(None),
            job_queue,
            context,
        })
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn job_queue(&self) -> &JobQueue {
        &self.job_queue
    }

    pub fn current_room(&self) -> Option<Arc<GameRoom>> {
        self.room.lock().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.session
            .lock()
            .upgrade()
            .map_or(false, |session| session.is_connected())
    }

    /// 인코딩된 프레임을 송신 큐에 넣습니다.
    pub fn send(&self, frame: Bytes) -> Result<()> {
        let session = self
            .session
            .lock()
            .upgrade()
            .ok_or(TcpServerError::SessionClosed {
                session_id: self.session_id,
            })?;
        session.send(frame)?;
        Ok(())
    }

    pub fn send_response(&self, response: &ServerResponse) -> Result<()> {
        self.send(response.to_frame()?)
    }

    pub fn disconnect(&self) {
        if let Some(session) = self.session.lock().upgrade() {
            session.disconnect();
        }
    }

    fn handle_connected(self: &Arc<Self>, session: &Arc<Session>, peer: SocketAddr) {
        *self.session.lock() = Arc::downgrade(session);
        self.context.jobs.register_queue(self.job_queue.clone());
        self.context.sessions.add(self.clone());
        info!(session_id = self.session_id, peer = %peer, "클라이언트 접속");

        let client = self.clone();
        self.job_queue.push(move || {
            let default_room = client.context.rooms.default_room().to_string();
            client.join_room(&default_room);
        });
    }

    fn handle_packet(self: &Arc<Self>, packet_id: u16, payload: &[u8]) {
        debug!(session_id = self.session_id, packet_id, size = payload.len(), "패킷 수신");
        let data = payload.to_vec();
        let client = self.clone();
        self.job_queue
            .push_fallible(move || client.process_packet(packet_id, &data));
    }

    fn handle_json(self: &Arc<Self>, json: &str) {
        debug!(session_id = self.session_id, "JSON 패킷 수신: {}", json);
        let json = json.to_string();
        let client = self.clone();
        self.job_queue.push_fallible(move || client.process_json(&json));
    }

    fn handle_disconnected(self: &Arc<Self>, peer: SocketAddr) {
        info!(session_id = self.session_id, peer = %peer, "클라이언트 접속 종료");
        self.context.sessions.remove(self.session_id);

        let client = self.clone();
        self.job_queue.push(move || {
            client.leave_current_room();
            client
                .context
                .jobs
                .remove_queue(&session_queue_name(client.session_id));
        });
    }

    fn process_packet(self: &Arc<Self>, packet_id: u16, payload: &[u8]) -> Result<()> {
        match PacketId::try_from(packet_id)? {
            PacketId::CChat => {
                let chat: CChat = decode_packet(PacketId::CChat, payload)?;
                self.chat(chat.message)
            }
            PacketId::SChat | PacketId::RoomUpdate => {
                Err(TcpServerError::BadCommand(format!("서버 전용 패킷: {}", packet_id)).into())
            }
        }
    }

    fn process_json(self: &Arc<Self>, json: &str) -> Result<()> {
        let command = match ClientCommand::from_json(json) {
            Ok(command) => command,
            Err(e) => return self.reject(e.into()),
        };

        match command {
            ClientCommand::JoinRoom { room_id } => {
                self.join_room(&room_id);
                self.send_response(&ServerResponse::JoinRoomResponse {
                    success: true,
                    room_id,
                })
            }
            ClientCommand::LeaveRoom { room_id } => {
                if self.context.rooms.find(&room_id).is_none() {
                    return self.reject(TcpServerError::RoomNotFound { room_id }.into());
                }
                let in_room = self
                    .current_room()
                    .map_or(false, |room| room.id() == room_id);
                if in_room {
                    self.leave_current_room();
                }
                self.send_response(&ServerResponse::LeaveRoomResponse {
                    success: in_room,
                    room_id,
                })
            }
            ClientCommand::SendMessage { message } => match self.chat(message) {
                Ok(()) => Ok(()),
                Err(e) => self.reject(e),
            },
        }
    }

    /// 클라이언트에 Error 응답을 보내고 원래 에러를 그대로 반환합니다.
    fn reject(&self, e: anyhow::Error) -> Result<()> {
        let response = ServerResponse::Error {
            message: e.to_string(),
        };
        if let Err(send_error) = self.send_response(&response) {
            debug!(session_id = self.session_id, "Error 응답 전송 실패: {}", send_error);
        }
        Err(e)
    }

    fn chat(&self, message: String) -> Result<()> {
        validate_chat_message(&message)?;
        let room = self.current_room().ok_or(TcpServerError::NotInRoom {
            session_id: self.session_id,
        })?;
        room.broadcast_chat(self.session_id, message);
        Ok(())
    }

    /// 세션 잡 큐 안에서만 호출됩니다.
    fn join_room(self: &Arc<Self>, room_id: &str) {
        if let Some(current) = self.current_room() {
            if current.id() == room_id {
                // 이미 들어가 있으면 현재 인원만 다시 알림
                current.broadcast_room_update();
                return;
            }
        }
        self.leave_current_room();

        let room = self.context.rooms.enter_room(room_id, self.clone());
        *self.room.lock() = Some(room);
    }

    fn leave_current_room(&self) {
        let room = self.room.lock().take();
        if let Some(room) = room {
            self.context.rooms.leave_room(&room, self.session_id);
        }
    }
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("session_id", &self.session_id)
            .field("room", &self.current_room().map(|room| room.id().to_string()))
            .finish()
    }
}

/// 네트워크 코어에 등록되는 패킷 핸들러
pub struct ClientSessionHandler {
    client: Arc<ClientSession>,
}

impl ClientSessionHandler {
    pub fn new(client: Arc<ClientSession>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<ClientSession> {
        &self.client
    }
}

impl TaggedPacketHandler for ClientSessionHandler {
    fn on_connected(&self, session: &Arc<Session>, peer: SocketAddr) {
        self.client.handle_connected(session, peer);
    }

    fn on_recv_packet(&self, _session: &Arc<Session>, packet_id: u16, payload: &[u8]) -> NetResult<()> {
        self.client.handle_packet(packet_id, payload);
        Ok(())
    }

    fn on_recv_json(&self, _session: &Arc<Session>, json: &str) -> NetResult<()> {
        self.client.handle_json(json);
        Ok(())
    }

    fn on_send(&self, _session: &Arc<Session>, num_of_bytes: usize) {
        debug!(session_id = self.client.session_id, "송신 완료: {}바이트", num_of_bytes);
    }

    fn on_disconnected(&self, _session: &Arc<Session>, peer: SocketAddr) {
        self.client.handle_disconnected(peer);
    }
}

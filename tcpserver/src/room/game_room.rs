//! 게임 방
//!
//! 멤버 목록 변경과 브로드캐스트는 전부 방 전용 잡 큐(`room:<id>`)에서만 실행됩니다.
//! 덕분에 입장/퇴장/채팅이 한 줄로 직렬화되어 브로드캐스트 순서가 항상 일관됩니다.

use bytes::Bytes;
use parking_lot::Mutex;
use servercore::JobQueue;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::protocol::{encode_packet, PacketId, RoomEvent, RoomUpdate, SChat};
use crate::session::ClientSession;

pub struct GameRoom {
    room_id: String,
    queue: JobQueue,
    /// 방 잡 큐 안에서만 접근
    members: Mutex<HashMap<u64, Arc<ClientSession>>>,
    member_count: AtomicUsize,
    /// 큐에 들어갔지만 아직 처리되지 않은 입장 요청 수
    pending_enters: AtomicUsize,
}

impl GameRoom {
    pub fn new(room_id: impl Into<String>, queue: JobQueue) -> Self {
        Self {
            room_id: room_id.into(),
            queue,
            members: Mutex::new(HashMap::new()),
            member_count: AtomicUsize::new(0),
            pending_enters: AtomicUsize::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.room_id
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// 마지막으로 처리된 잡 기준의 인원 수
    pub fn member_count(&self) -> usize {
        self.member_count.load(Ordering::SeqCst)
    }

    /// 멤버도 없고 대기 중인 입장도 없는지
    pub fn is_vacant(&self) -> bool {
        self.member_count() == 0 && self.pending_enters.load(Ordering::SeqCst) == 0
    }

    pub fn enter(self: &Arc<Self>, client: Arc<ClientSession>) {
        self.pending_enters.fetch_add(1, Ordering::SeqCst);

        let room = self.clone();
        self.queue.push_fallible(move || {
            let player_id = client.session_id();
            let count = {
                let mut members = room.members.lock();
                members.insert(player_id, client);
                members.len()
            };
            room.member_count.store(count, Ordering::SeqCst);
            room.pending_enters.fetch_sub(1, Ordering::SeqCst);

            info!(room = %room.room_id, player_id, count, "방 입장");
            room.send_update(RoomEvent::Entered, Some(player_id))
        });
    }

    pub fn leave(self: &Arc<Self>, player_id: u64) {
        let room = self.clone();
        self.queue.push_fallible(move || {
            let (removed, count) = {
                let mut members = room.members.lock();
                let removed = members.remove(&player_id).is_some();
                (removed, members.len())
            };
            room.member_count.store(count, Ordering::SeqCst);

            if !removed {
                debug!(room = %room.room_id, player_id, "방에 없는 플레이어의 퇴장 요청");
                return Ok(());
            }
            info!(room = %room.room_id, player_id, count, "방 퇴장");
            room.send_update(RoomEvent::Left, Some(player_id))
        });
    }

    /// 채팅을 방 전체(보낸 사람 포함)에 전달합니다.
    pub fn broadcast_chat(self: &Arc<Self>, player_id: u64, message: String) {
        let room = self.clone();
        self.queue.push_fallible(move || {
            let packet = SChat {
                player_id,
                message,
                timestamp: chrono::Utc::now().timestamp_millis(),
            };
            let frame = encode_packet(PacketId::SChat, &packet)?;
            room.broadcast_frame(frame);
            Ok(())
        });
    }

    /// 현재 인원 스냅샷을 방 전체에 알립니다.
    pub fn broadcast_room_update(self: &Arc<Self>) {
        let room = self.clone();
        self.queue
            .push_fallible(move || room.send_update(RoomEvent::Snapshot, None));
    }

    fn send_update(&self, event: RoomEvent, player_id: Option<u64>) -> anyhow::Result<()> {
        let update = RoomUpdate {
            room_id: self.room_id.clone(),
            event,
            player_id,
            member_count: self.member_count(),
        };
        let frame = encode_packet(PacketId::RoomUpdate, &update)?;
        self.broadcast_frame(frame);
        Ok(())
    }

    /// 같은 세그먼트를 모든 멤버의 송신 큐에 넣습니다.
    fn broadcast_frame(&self, frame: Bytes) {
        let targets: Vec<Arc<ClientSession>> = self.members.lock().values().cloned().collect();
        for target in targets {
            if let Err(e) = target.send(frame.clone()) {
                debug!(room = %self.room_id, player_id = target.session_id(), "브로드캐스트 실패: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for GameRoom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameRoom")
            .field("room_id", &self.room_id)
            .field("member_count", &self.member_count())
            .finish()
    }
}

//! 방 관리자
//!
//! 방 이름으로 `GameRoom`을 찾거나 만들고, 비어 있는 일반 방을 정리합니다.
//! 기본 방은 비어도 유지됩니다. 방이 정리되면 그 방의 잡 큐도 등록 해제됩니다.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use servercore::JobQueueManager;
use std::sync::Arc;
use tracing::info;

use super::GameRoom;
use crate::session::ClientSession;

pub struct RoomManager {
    rooms: Arc<DashMap<String, Arc<GameRoom>>>,
    jobs: Arc<JobQueueManager>,
    default_room: String,
}

/// 방 잡 큐 이름
pub fn room_queue_name(room_id: &str) -> String {
    format!("room:{}", room_id)
}

impl RoomManager {
    pub fn new(jobs: Arc<JobQueueManager>, default_room: impl Into<String>) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            jobs,
            default_room: default_room.into(),
        }
    }

    pub fn default_room(&self) -> &str {
        &self.default_room
    }

    pub fn get_or_create(&self, room_id: &str) -> Arc<GameRoom> {
        self.rooms
            .entry(room_id.to_string())
            .or_insert_with(|| self.create_room(room_id))
            .clone()
    }

    pub fn find(&self, room_id: &str) -> Option<Arc<GameRoom>> {
        self.rooms.get(room_id).map(|room| room.clone())
    }

    /// 방에 입장시킵니다. 없으면 만듭니다.
    ///
    /// 입장 예약은 레지스트리 엔트리를 잡은 상태에서 걸리므로, 동시에 진행 중인
    /// 빈 방 정리가 이 방을 지우지 못합니다.
    pub fn enter_room(&self, room_id: &str, client: Arc<ClientSession>) -> Arc<GameRoom> {
        let entry = self
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(|| self.create_room(room_id));
        entry.value().enter(client);
        entry.value().clone()
    }

    /// 방에서 내보내고, 비게 된 일반 방은 레지스트리에서 지웁니다.
    pub fn leave_room(&self, room: &Arc<GameRoom>, player_id: u64) {
        room.leave(player_id);
        if room.id() == self.default_room {
            return;
        }

        let rooms = self.rooms.clone();
        let jobs = self.jobs.clone();
        let target = room.clone();
        room.queue().push(move || remove_if_vacant(&rooms, &jobs, &target));
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn room_ids(&self) -> Vec<String> {
        self.rooms.iter().map(|entry| entry.key().clone()).collect()
    }

    /// 방 생성은 항상 이 레지스트리 엔트리를 잡은 채로 일어납니다.
    fn create_room(&self, room_id: &str) -> Arc<GameRoom> {
        info!(room = room_id, "방 생성");
        let queue = self.jobs.get_or_create_queue(&room_queue_name(room_id));
        Arc::new(GameRoom::new(room_id, queue))
    }
}

/// 같은 방이 여전히 등록되어 있고 비어 있으면 방과 방 잡 큐를 함께 지웁니다.
///
/// 엔트리 잠금 안에서 처리하므로 같은 이름의 새 방 생성과 겹치지 않습니다.
/// 이미 큐에 들어간 잡은 큐 핸들을 쥔 드레인이 끝까지 실행합니다.
fn remove_if_vacant(rooms: &DashMap<String, Arc<GameRoom>>, jobs: &JobQueueManager, target: &Arc<GameRoom>) {
    if let Entry::Occupied(entry) = rooms.entry(target.id().to_string()) {
        if Arc::ptr_eq(entry.get(), target) && target.is_vacant() {
            jobs.remove_queue(&room_queue_name(target.id()));
            entry.remove();
            info!(room = %target.id(), "빈 방 제거");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TcpServerConfig;
    use crate::server::ServerContext;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(10);

    fn context() -> Arc<ServerContext> {
        ServerContext::new(TcpServerConfig::default(), Arc::new(JobQueueManager::new()))
    }

    #[test]
    fn test_get_or_create_reuses_room() {
        let context = context();
        let a = context.rooms.get_or_create("arena");
        let b = context.rooms.get_or_create("arena");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(context.rooms.room_count(), 1);
        assert_eq!(a.queue().name(), "room:arena");
        assert!(context.rooms.find("nowhere").is_none());
    }

    #[test]
    fn test_enter_and_leave_counts() {
        let context = context();
        let alice = ClientSession::new(context.clone());
        let bob = ClientSession::new(context.clone());

        let room = context.rooms.enter_room("arena", alice.clone());
        context.rooms.enter_room("arena", bob.clone());
        assert!(room.queue().wait_idle(WAIT));
        assert_eq!(room.member_count(), 2);

        context.rooms.leave_room(&room, alice.session_id());
        assert!(room.queue().wait_idle(WAIT));
        assert_eq!(room.member_count(), 1);
        assert!(context.rooms.find("arena").is_some());
    }

    #[test]
    fn test_empty_room_is_dropped_but_default_stays() {
        let context = context();
        let client = ClientSession::new(context.clone());

        let arena = context.rooms.enter_room("arena", client.clone());
        let lobby = context.rooms.enter_room(context.rooms.default_room(), client.clone());

        context.rooms.leave_room(&arena, client.session_id());
        context.rooms.leave_room(&lobby, client.session_id());
        assert!(arena.queue().wait_idle(WAIT));
        assert!(lobby.queue().wait_idle(WAIT));

        assert!(context.rooms.find("arena").is_none());
        assert!(context.rooms.find(context.rooms.default_room()).is_some());
        assert_eq!(lobby.member_count(), 0);
    }

    #[test]
    fn test_room_queues_released_after_leave() {
        let context = context();
        let client = ClientSession::new(context.clone());
        let baseline = context.jobs.queue_count();

        let rooms: Vec<Arc<GameRoom>> = (0..100)
            .map(|i| {
                let room = context.rooms.enter_room(&format!("room-{}", i), client.clone());
                context.rooms.leave_room(&room, client.session_id());
                room
            })
            .collect();
        for room in &rooms {
            assert!(room.queue().wait_idle(WAIT));
        }

        assert_eq!(context.rooms.room_count(), 0);
        assert_eq!(context.jobs.queue_count(), baseline);
    }

    #[test]
    fn test_default_room_queue_is_kept() {
        let context = context();
        let client = ClientSession::new(context.clone());
        let lobby = context.rooms.enter_room(context.rooms.default_room(), client.clone());
        context.rooms.leave_room(&lobby, client.session_id());
        assert!(lobby.queue().wait_idle(WAIT));

        let stats = context.jobs.queue_stats();
        assert!(stats.contains_key(&room_queue_name(context.rooms.default_room())));
    }

    #[test]
    fn test_pending_enter_keeps_room_alive() {
        let context = context();
        let first = ClientSession::new(context.clone());
        let second = ClientSession::new(context.clone());

        let room = context.rooms.enter_room("arena", first.clone());
        // 퇴장과 동시에 다른 플레이어의 입장이 예약됨
        context.rooms.leave_room(&room, first.session_id());
        let again = context.rooms.enter_room("arena", second.clone());
        assert!(room.queue().wait_idle(WAIT));
        // 정리가 먼저 끝났다면 새 방은 새 큐를 가짐
        assert!(again.queue().wait_idle(WAIT));

        let current = context.rooms.find("arena").expect("Test assertion failed");
        assert!(Arc::ptr_eq(&current, &again));
        assert_eq!(current.member_count(), 1);
    }
}

//! 세션 관리자
//!
//! 순차 세션 ID를 발급하고 살아 있는 클라이언트 세션을 보관합니다.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use super::ClientSession;

pub struct SessionManager {
    next_id: AtomicU64,
    sessions: DashMap<u64, Arc<ClientSession>>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            sessions: DashMap::new(),
        }
    }

    /// 1부터 시작하는 순차 ID
    pub fn generate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn add(&self, client: Arc<ClientSession>) {
        debug!(session_id = client.session_id(), "세션 등록");
        self.sessions.insert(client.session_id(), client);
    }

    pub fn find(&self, session_id: u64) -> Option<Arc<ClientSession>> {
        self.sessions.get(&session_id).map(|entry| entry.clone())
    }

    pub fn remove(&self, session_id: u64) -> Option<Arc<ClientSession>> {
        let removed = self.sessions.remove(&session_id).map(|(_, client)| client);
        if removed.is_some() {
            debug!(session_id, "세션 해제");
        }
        removed
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// 현재 등록된 세션 전부 (스냅샷)
    pub fn all(&self) -> Vec<Arc<ClientSession>> {
        self.sessions.iter().map(|entry| entry.value().clone()).collect()
    }
}

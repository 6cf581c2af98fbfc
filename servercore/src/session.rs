//! 세션
//!
//! 소켓 하나를 소유하고 비동기 수신/송신 루프를 돌립니다.
//! 패킷 해석은 `SessionHandler` 구현체(프레이밍 레이어)에 위임합니다.
//!
//! # 상태
//!
//! ```text
//! Created → Started → (수신/송신 동시 진행) → Disconnected (종료)
//! ```
//!
//! - 수신은 항상 하나만 걸려 있고, 완료 처리 후에만 다음 수신을 겁니다.
//! - 송신은 큐에 쌓고, 진행 중인 송신이 없을 때만 드레인 루프를 시작합니다.
//! - `disconnect()`는 atomic swap으로 정확히 한 번만 본문을 실행합니다.

use bytes::{Buf, Bytes};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::{self, IoSlice};
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::error::{NetError, NetResult};
use crate::recv_buffer::RecvBuffer;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// 세션 콜백 계약
///
/// 상위 프로토콜 구현체가 제공해야 하는 훅입니다. 모든 훅은 세션의
/// 수신 태스크 또는 송신 태스크, 혹은 `disconnect()`를 호출한 스레드에서 불립니다.
pub trait SessionHandler: Send + Sync + 'static {
    /// 연결 직후, 첫 수신을 걸기 전에 한 번 호출됩니다.
    fn on_connected(&self, session: &Arc<Session>, peer: SocketAddr);

    /// 미처리 수신 데이터 전체를 넘겨받아 완전히 처리한 바이트 수를 반환합니다.
    ///
    /// 버퍼 전체가 메시지 하나라고 가정하면 안 됩니다. 잘린 메시지는 남겨 두면
    /// 다음 수신 때 이어 붙은 상태로 다시 넘어옵니다. `Err`는 치명적인
    /// 파싱 오류로 간주되어 연결을 끊습니다.
    fn on_recv(&self, session: &Arc<Session>, buffer: &[u8]) -> NetResult<usize>;

    /// 한 번의 송신 배치가 완료되었을 때 호출됩니다.
    fn on_send(&self, session: &Arc<Session>, num_of_bytes: usize);

    /// 연결 종료 시 정확히 한 번 호출됩니다.
    fn on_disconnected(&self, session: &Arc<Session>, peer: SocketAddr);
}

/// 세션 누적 통계
#[derive(Debug, Default)]
struct SessionCounters {
    bytes_received: AtomicU64,
    bytes_sent: AtomicU64,
    recv_completions: AtomicU64,
    send_completions: AtomicU64,
}

/// 세션 통계 스냅샷
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub recv_completions: u64,
    pub send_completions: u64,
}

/// 송신 큐 상태. `pending`이 true인 동안에는 드레인 루프가 하나 살아 있습니다.
#[derive(Debug, Default)]
struct SendState {
    send_queue: VecDeque<Bytes>,
    pending: bool,
}

/// 연결 하나를 감싸는 세션
pub struct Session {
    id: u64,
    peer: SocketAddr,
    handler: Arc<dyn SessionHandler>,
    send_state: Mutex<SendState>,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    disconnected: AtomicBool,
    cancel: CancellationToken,
    runtime: Handle,
    recv_buffer_size: usize,
    counters: SessionCounters,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Session {
    /// 소켓을 바인딩하고 수신 루프를 시작합니다.
    ///
    /// tokio 런타임 안에서 호출해야 합니다. 잡히는 런타임 핸들은 이후
    /// 런타임 밖의 스레드(예: JobQueue 워커)에서 `send`할 때도 쓰입니다.
    pub fn start<H>(stream: TcpStream, handler: H, config: &SessionConfig) -> NetResult<Arc<Session>>
    where
        H: SessionHandler,
    {
        Self::start_shared(stream, Arc::new(handler), config)
    }

    pub(crate) fn start_shared(
        stream: TcpStream,
        handler: Arc<dyn SessionHandler>,
        config: &SessionConfig,
    ) -> NetResult<Arc<Session>> {
        let runtime = Handle::try_current()
            .map_err(|e| NetError::Io(io::Error::new(io::ErrorKind::Other, e.to_string())))?;
        let peer = stream.peer_addr()?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(peer = %peer, "TCP_NODELAY 설정 실패: {}", e);
        }
        let (reader, writer) = stream.into_split();

        let session = Arc::new(Session {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            peer,
            handler,
            send_state: Mutex::new(SendState::default()),
            writer: tokio::sync::Mutex::new(Some(writer)),
            disconnected: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            runtime,
            recv_buffer_size: config.recv_buffer_size,
            counters: SessionCounters::default(),
        });

        debug!(session_id = session.id, peer = %peer, "세션 시작");
        let recv_session = session.clone();
        session.runtime.spawn(recv_session.run_recv_loop(reader));
        Ok(session)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_connected(&self) -> bool {
        !self.disconnected.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            bytes_received: self.counters.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.counters.bytes_sent.load(Ordering::Relaxed),
            recv_completions: self.counters.recv_completions.load(Ordering::Relaxed),
            send_completions: self.counters.send_completions.load(Ordering::Relaxed),
        }
    }

    /// 송신 큐에 세그먼트를 넣습니다.
    ///
    /// 진행 중인 송신이 없으면 즉시 드레인 루프를 등록하고, 있으면 그 루프가
    /// 완료 직후 이어서 보냅니다. 큐에 들어간 순서대로 전송됩니다.
    pub fn send(self: &Arc<Self>, segment: Bytes) -> NetResult<()> {
        if !self.is_connected() {
            return Err(NetError::Disconnected { session_id: self.id });
        }
        if segment.is_empty() {
            return Ok(());
        }

        let mut state = self.send_state.lock();
        state.send_queue.push_back(segment);
        if !state.pending {
            state.pending = true;
            drop(state);
            self.register_send();
        }
        Ok(())
    }

    /// 여러 세그먼트를 순서대로 한 번에 큐잉합니다.
    pub fn send_many<I>(self: &Arc<Self>, segments: I) -> NetResult<()>
    where
        I: IntoIterator<Item = Bytes>,
    {
        if !self.is_connected() {
            return Err(NetError::Disconnected { session_id: self.id });
        }

        let mut state = self.send_state.lock();
        state
            .send_queue
            .extend(segments.into_iter().filter(|segment| !segment.is_empty()));
        if !state.pending && !state.send_queue.is_empty() {
            state.pending = true;
            drop(state);
            self.register_send();
        }
        Ok(())
    }

    /// 연결을 끊습니다. 여러 스레드에서 동시에 불려도 본문은 한 번만 실행됩니다.
    pub fn disconnect(self: &Arc<Self>) {
        if self.disconnected.swap(true, Ordering::AcqRel) {
            return;
        }

        info!(session_id = self.id, peer = %self.peer, "세션 연결 종료");
        self.guard_hook("on_disconnected", || {
            self.handler.on_disconnected(self, self.peer)
        });

        self.cancel.cancel();

        let session = self.clone();
        self.runtime.spawn(async move {
            let writer = session.writer.lock().await.take();
            if let Some(mut writer) = writer {
                if let Err(e) = writer.shutdown().await {
                    debug!(session_id = session.id, "소켓 shutdown 실패: {}", e);
                }
            }
            session.send_state.lock().send_queue.clear();
        });
    }

    async fn run_recv_loop(self: Arc<Self>, mut reader: OwnedReadHalf) {
        self.guard_hook("on_connected", || self.handler.on_connected(&self, self.peer));

        let mut recv_buffer = RecvBuffer::new(self.recv_buffer_size);
        loop {
            recv_buffer.clean();
            if recv_buffer.free_size() == 0 {
                warn!(
                    session_id = self.id,
                    "수신 버퍼가 가득 찼습니다: 버퍼({}바이트)보다 큰 패킷",
                    recv_buffer.capacity()
                );
                break;
            }

            let result = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = reader.read(recv_buffer.write_segment()) => result,
            };

            let num_of_bytes = match result {
                Ok(0) => {
                    debug!(session_id = self.id, "상대방이 연결을 닫았습니다");
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    debug!(session_id = self.id, "수신 실패: {}", e);
                    break;
                }
            };

            if !self.on_recv_completed(&mut recv_buffer, num_of_bytes) {
                break;
            }
        }

        self.disconnect();
    }

    /// 수신 완료 처리. false면 연결을 끊어야 합니다.
    fn on_recv_completed(self: &Arc<Self>, recv_buffer: &mut RecvBuffer, num_of_bytes: usize) -> bool {
        if !recv_buffer.on_write(num_of_bytes) {
            return false;
        }
        self.counters
            .bytes_received
            .fetch_add(num_of_bytes as u64, Ordering::Relaxed);
        self.counters.recv_completions.fetch_add(1, Ordering::Relaxed);

        let data_size = recv_buffer.data_size();
        let outcome = self.guard_hook("on_recv", || {
            self.handler.on_recv(self, recv_buffer.read_segment())
        });

        let process_len = match outcome {
            Some(Ok(process_len)) => process_len,
            Some(Err(e)) => {
                warn!(session_id = self.id, peer = %self.peer, "패킷 처리 실패, 연결을 끊습니다: {}", e);
                return false;
            }
            None => return false,
        };

        if process_len > data_size {
            warn!(
                session_id = self.id,
                "처리량({})이 수신 데이터({})보다 큽니다",
                process_len,
                data_size
            );
            return false;
        }

        recv_buffer.on_read(process_len)
    }

    fn register_send(self: &Arc<Self>) {
        let session = self.clone();
        self.runtime.spawn(session.run_send_loop());
    }

    /// 송신 드레인 루프. 큐가 빌 때까지 모아서 보내고, 비면 pending을 내리고 끝납니다.
    async fn run_send_loop(self: Arc<Self>) {
        let mut writer_guard = self.writer.lock().await;

        loop {
            let mut pending_list = {
                let mut state = self.send_state.lock();
                if state.send_queue.is_empty() || !self.is_connected() {
                    state.pending = false;
                    state.send_queue.clear();
                    return;
                }
                std::mem::take(&mut state.send_queue)
            };

            let Some(writer) = writer_guard.as_mut() else {
                self.clear_pending();
                return;
            };

            let result = tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.clear_pending();
                    return;
                }
                result = write_segments(writer, &mut pending_list) => result,
            };

            match result {
                Ok(num_of_bytes) => {
                    self.counters
                        .bytes_sent
                        .fetch_add(num_of_bytes as u64, Ordering::Relaxed);
                    self.counters.send_completions.fetch_add(1, Ordering::Relaxed);
                    self.guard_hook("on_send", || self.handler.on_send(&self, num_of_bytes));
                }
                Err(e) => {
                    debug!(session_id = self.id, "송신 실패: {}", e);
                    drop(writer_guard);
                    self.clear_pending();
                    self.disconnect();
                    return;
                }
            }
        }
    }

    fn clear_pending(&self) {
        let mut state = self.send_state.lock();
        state.pending = false;
        state.send_queue.clear();
    }

    /// 핸들러 훅 실행 중 패닉을 잡아 로그로 남깁니다. 패닉이면 None.
    fn guard_hook<R>(&self, hook: &'static str, f: impl FnOnce() -> R) -> Option<R> {
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => Some(value),
            Err(payload) => {
                error!(
                    session_id = self.id,
                    hook,
                    "세션 핸들러 패닉: {}",
                    panic_message(payload.as_ref())
                );
                None
            }
        }
    }
}

/// 세그먼트 목록을 scatter/gather로 전부 씁니다. 쓴 바이트 수를 반환합니다.
async fn write_segments(writer: &mut OwnedWriteHalf, segments: &mut VecDeque<Bytes>) -> io::Result<usize> {
    let mut total = 0;
    while !segments.is_empty() {
        let written = {
            let slices: Vec<IoSlice<'_>> = segments.iter().map(|s| IoSlice::new(&s[..])).collect();
            writer.write_vectored(&slices).await?
        };
        if written == 0 {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "소켓에 쓰지 못했습니다"));
        }
        total += written;
        advance_segments(segments, written);
    }
    Ok(total)
}

fn advance_segments(segments: &mut VecDeque<Bytes>, mut written: usize) {
    while written > 0 {
        let Some(front) = segments.front_mut() else {
            break;
        };
        if front.len() <= written {
            written -= front.len();
            segments.pop_front();
        } else {
            front.advance(written);
            written = 0;
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "알 수 없는 패닉".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;
    use tokio::time::{sleep, timeout, Duration};

    #[derive(Default)]
    struct EchoHandler {
        connected: AtomicUsize,
        disconnected: AtomicUsize,
    }

    impl SessionHandler for Arc<EchoHandler> {
        fn on_connected(&self, _session: &Arc<Session>, _peer: SocketAddr) {
            self.connected.fetch_add(1, Ordering::SeqCst);
        }

        fn on_recv(&self, session: &Arc<Session>, buffer: &[u8]) -> NetResult<usize> {
            if buffer.starts_with(b"boom") {
                return Err(NetError::protocol("boom"));
            }
            session.send(Bytes::copy_from_slice(buffer))?;
            Ok(buffer.len())
        }

        fn on_send(&self, _session: &Arc<Session>, _num_of_bytes: usize) {}

        fn on_disconnected(&self, _session: &Arc<Session>, _peer: SocketAddr) {
            self.disconnected.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn pair(handler: Arc<EchoHandler>) -> (Arc<Session>, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("Test assertion failed");
        let addr = listener.local_addr().expect("Test assertion failed");
        let client = TcpStream::connect(addr).await.expect("Test assertion failed");
        let (server, _) = listener.accept().await.expect("Test assertion failed");
        let session =
            Session::start(server, handler, &SessionConfig::default()).expect("Test assertion failed");
        (session, client)
    }

    #[test]
    fn test_advance_segments() {
        let mut segments: VecDeque<Bytes> = VecDeque::from(vec![
            Bytes::from_static(b"abc"),
            Bytes::from_static(b"defg"),
        ]);
        advance_segments(&mut segments, 5);
        assert_eq!(segments.len(), 1);
        assert_eq!(&segments[0][..], b"fg");
        advance_segments(&mut segments, 2);
        assert!(segments.is_empty());
    }

    #[tokio::test]
    async fn test_echo_roundtrip() {
        let handler = Arc::new(EchoHandler::default());
        let (session, mut client) = pair(handler.clone()).await;

        client.write_all(b"hello").await.expect("Test assertion failed");
        let mut reply = [0u8; 5];
        timeout(Duration::from_secs(5), client.read_exact(&mut reply))
            .await
            .expect("Test assertion failed")
            .expect("Test assertion failed");
        assert_eq!(&reply, b"hello");
        assert_eq!(handler.connected.load(Ordering::SeqCst), 1);

        let stats = session.stats();
        assert_eq!(stats.bytes_received, 5);
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn test_protocol_error_disconnects() {
        let handler = Arc::new(EchoHandler::default());
        let (session, mut client) = pair(handler.clone()).await;

        client.write_all(b"boom").await.expect("Test assertion failed");

        // 서버가 끊으면 클라이언트는 EOF를 받음
        let mut buf = [0u8; 8];
        let read = timeout(Duration::from_secs(5), client.read(&mut buf))
            .await
            .expect("Test assertion failed");
        assert!(matches!(read, Ok(0) | Err(_)));
        assert!(!session.is_connected());
        assert_eq!(handler.disconnected.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_send_after_disconnect_is_rejected() {
        let handler = Arc::new(EchoHandler::default());
        let (session, _client) = pair(handler.clone()).await;

        session.disconnect();
        session.disconnect();
        assert!(matches!(
            session.send(Bytes::from_static(b"late")),
            Err(NetError::Disconnected { .. })
        ));

        sleep(Duration::from_millis(50)).await;
        assert_eq!(handler.disconnected.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_peer_close_disconnects() {
        let handler = Arc::new(EchoHandler::default());
        let (session, client) = pair(handler.clone()).await;
        drop(client);

        for _ in 0..100 {
            if !session.is_connected() {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert!(!session.is_connected());
        assert_eq!(handler.disconnected.load(Ordering::SeqCst), 1);
    }
}

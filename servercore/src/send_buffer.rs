//! 송신 버퍼
//!
//! 작은 송신 데이터를 큰 청크 하나에 모아 할당 횟수를 줄입니다.
//! 확정(`close`)된 영역은 불변 `Bytes`가 되어 같은 청크를 공유한 채 송신 큐로 넘어갑니다.
//!
//! ```text
//! [ 확정된 영역들 (Bytes로 분리됨) | 예약 가능한 빈 영역 ]
//! 0                           use_offset              capacity
//! ```

use bytes::{Bytes, BytesMut};
use std::cell::RefCell;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::DEFAULT_SEND_CHUNK_SIZE;

/// 송신용 데이터를 임시 저장하는 청크
#[derive(Debug)]
pub struct SendBuffer {
    /// 아직 예약되지 않은 빈 영역. 길이 == free_size
    chunk: BytesMut,
    capacity: usize,
    use_offset: usize,
}

impl SendBuffer {
    pub fn new(capacity: usize) -> Self {
        let mut chunk = BytesMut::with_capacity(capacity);
        chunk.resize(capacity, 0);
        Self {
            chunk,
            capacity,
            use_offset: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 지금까지 확정된 바이트 수
    pub fn use_offset(&self) -> usize {
        self.use_offset
    }

    pub fn free_size(&self) -> usize {
        self.chunk.len()
    }

    /// 최대 `reserve_size`바이트를 쓸 영역을 예약합니다.
    ///
    /// 남은 공간이 부족하면 `None`을 반환하며, 호출자는 새 청크를 만들어야 합니다.
    pub fn open(&mut self, reserve_size: usize) -> Option<&mut [u8]> {
        if reserve_size > self.free_size() {
            return None;
        }
        Some(&mut self.chunk[..reserve_size])
    }

    /// 실제로 쓴 `used_size`만큼 확정하고 송신용 세그먼트를 반환합니다.
    pub fn close(&mut self, used_size: usize) -> Bytes {
        let used_size = used_size.min(self.chunk.len());
        self.use_offset += used_size;
        self.chunk.split_to(used_size).freeze()
    }
}

thread_local! {
    /// 워커 스레드별 현재 청크
    static CURRENT_BUFFER: RefCell<Option<SendBuffer>> = const { RefCell::new(None) };
}

static CHUNK_SIZE: AtomicUsize = AtomicUsize::new(DEFAULT_SEND_CHUNK_SIZE);

/// 워커별 송신 청크 풀
///
/// 예약과 확정을 하나의 클로저 안에서 끝내므로 예약 상태가 `.await` 너머로
/// 다른 워커에 넘어가는 일이 없습니다.
pub struct SendBufferHelper;

impl SendBufferHelper {
    pub fn chunk_size() -> usize {
        CHUNK_SIZE.load(Ordering::Relaxed)
    }

    /// 이후 새로 만들어지는 청크의 크기를 바꿉니다. 기존 청크는 그대로 소진됩니다.
    pub fn set_chunk_size(size: usize) {
        CHUNK_SIZE.store(size.max(1), Ordering::Relaxed);
    }

    /// `reserve_size`바이트를 예약해 `write`에 넘기고, `write`가 반환한 크기만큼 확정합니다.
    ///
    /// 현재 워커의 청크가 없거나 공간이 부족하면 새 청크를 할당합니다.
    /// 청크보다 큰 예약은 그 크기만큼의 전용 청크를 받습니다.
    pub fn write<F>(reserve_size: usize, write: F) -> Bytes
    where
        F: FnOnce(&mut [u8]) -> usize,
    {
        CURRENT_BUFFER.with(|cell| match cell.try_borrow_mut() {
            Ok(mut slot) => {
                if slot
                    .as_ref()
                    .map_or(true, |buffer| buffer.free_size() < reserve_size)
                {
                    *slot = None;
                }
                let buffer = slot.get_or_insert_with(|| {
                    SendBuffer::new(Self::chunk_size().max(reserve_size))
                });
                Self::fill(buffer, reserve_size, write)
            }
            // write 클로저 안에서 다시 호출된 경우
            Err(_) => {
                let mut buffer = SendBuffer::new(reserve_size);
                Self::fill(&mut buffer, reserve_size, write)
            }
        })
    }

    /// 슬라이스를 그대로 복사해 세그먼트로 만듭니다.
    pub fn copy_from_slice(data: &[u8]) -> Bytes {
        Self::write(data.len(), |region| {
            region.copy_from_slice(data);
            data.len()
        })
    }

    /// 현재 워커 청크의 남은 공간 (청크가 없으면 None)
    pub fn current_free_size() -> Option<usize> {
        CURRENT_BUFFER.with(|cell| {
            cell.try_borrow()
                .ok()
                .and_then(|slot| slot.as_ref().map(SendBuffer::free_size))
        })
    }

    fn fill<F>(buffer: &mut SendBuffer, reserve_size: usize, write: F) -> Bytes
    where
        F: FnOnce(&mut [u8]) -> usize,
    {
        let used = match buffer.open(reserve_size) {
            Some(region) => write(region).min(reserve_size),
            None => 0,
        };
        buffer.close(used)
    }
}

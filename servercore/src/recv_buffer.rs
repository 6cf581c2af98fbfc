//! 수신 버퍼
//!
//! 재할당 없이 연속 메모리를 재사용하는 슬라이딩 윈도우 버퍼입니다.
//!
//! ```text
//! [ 처리 완료 | 미처리 데이터 | 빈 공간 ]
//! 0      read_pos        write_pos   capacity
//! ```
//!
//! 네트워크 레이어는 `write_segment()`에 쓰고 `on_write()`로 커서를 옮기며,
//! 프레이밍 레이어는 `read_segment()`를 해석한 뒤 `on_read()`로 소비량을 알립니다.

/// 세션별 수신 버퍼
#[derive(Debug)]
pub struct RecvBuffer {
    buffer: Vec<u8>,
    read_pos: usize,
    write_pos: usize,
}

impl RecvBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0u8; capacity],
            read_pos: 0,
            write_pos: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// 쌓여 있는 미처리 데이터 크기
    pub fn data_size(&self) -> usize {
        self.write_pos - self.read_pos
    }

    /// 버퍼에 남은 공간
    pub fn free_size(&self) -> usize {
        self.buffer.len() - self.write_pos
    }

    pub fn read_pos(&self) -> usize {
        self.read_pos
    }

    pub fn write_pos(&self) -> usize {
        self.write_pos
    }

    /// 읽을 수 있는 범위 `[read_pos, write_pos)`
    pub fn read_segment(&self) -> &[u8] {
        &self.buffer[self.read_pos..self.write_pos]
    }

    /// 받을 수 있는 범위 `[write_pos, capacity)`
    pub fn write_segment(&mut self) -> &mut [u8] {
        &mut self.buffer[self.write_pos..]
    }

    /// 남은 데이터를 시작 위치로 당깁니다.
    ///
    /// 남은 데이터가 없으면 복사 없이 커서만 리셋합니다.
    pub fn clean(&mut self) {
        let data_size = self.data_size();
        if data_size == 0 {
            self.read_pos = 0;
            self.write_pos = 0;
        } else {
            self.buffer.copy_within(self.read_pos..self.write_pos, 0);
            self.read_pos = 0;
            self.write_pos = data_size;
        }
    }

    /// 컨텐츠 쪽에서 `num_of_bytes`만큼 처리했을 때 호출합니다.
    pub fn on_read(&mut self, num_of_bytes: usize) -> bool {
        if num_of_bytes > self.data_size() {
            return false;
        }
        self.read_pos += num_of_bytes;
        true
    }

    /// 소켓에서 `num_of_bytes`만큼 받았을 때 호출합니다.
    pub fn on_write(&mut self, num_of_bytes: usize) -> bool {
        if num_of_bytes > self.free_size() {
            return false;
        }
        self.write_pos += num_of_bytes;
        true
    }
}

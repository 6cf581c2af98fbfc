//! 방 관리 모듈

pub mod game_room;
pub mod room_manager;

pub use game_room::GameRoom;
pub use room_manager::{room_queue_name, RoomManager};

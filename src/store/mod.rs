//! Huddle Store
//!
//! Durable storage for accounts, rooms and chat history:
//!
//! - **types**: Core records (Identity, User, Room, Message)
//! - **sqlite**: SQLite implementation of every store trait
//! - **error**: Error types
//!
//! The hub only depends on [`MessageStore`]; the REST layer additionally
//! uses [`UserStore`] and [`RoomStore`]. All calls are synchronous and are
//! expected to run on the blocking thread pool.

pub mod error;
pub mod sqlite;
pub mod types;

use chrono::{DateTime, Utc};

pub use error::{StoreError, StoreResult};
pub use sqlite::SqliteStore;
pub use types::{Identity, Message, Room, RoomType, User};

/// Account persistence
pub trait UserStore: Send + Sync {
    /// Insert a new user. Fails with `Conflict` if the username is taken.
    fn create_user(&self, user: &User) -> StoreResult<()>;

    /// Look up a user by username
    fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;
}

/// Room and membership persistence
pub trait RoomStore: Send + Sync {
    /// Create a room with its owner as the first member, atomically
    fn create_room(&self, room: &Room) -> StoreResult<()>;

    fn get_room(&self, room_id: &str) -> StoreResult<Option<Room>>;

    /// All public rooms plus the private rooms the user is a member of
    fn list_rooms_for_user(&self, user_id: &str) -> StoreResult<Vec<Room>>;

    /// Add a member to a room. Adding an existing member is a no-op.
    fn add_member(&self, room_id: &str, user_id: &str) -> StoreResult<()>;

    fn is_member(&self, room_id: &str, user_id: &str) -> StoreResult<bool>;
}

/// Message persistence
pub trait MessageStore: Send + Sync {
    /// Durably append a message
    fn append(&self, message: &Message) -> StoreResult<()>;

    /// Messages in a room strictly after `since`, ascending by timestamp
    fn list_since(&self, room_id: &str, since: DateTime<Utc>) -> StoreResult<Vec<Message>>;

    /// The most recent `limit` messages in a room, ascending by timestamp
    fn list_recent(&self, room_id: &str, limit: usize) -> StoreResult<Vec<Message>>;
}

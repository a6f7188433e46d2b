//! SQLite Store - durable accounts, rooms and chat history
//!
//! A single connection guarded by a mutex. rusqlite is synchronous, so
//! callers on the async runtime go through `tokio::task::spawn_blocking`.
//!
//! # Schema
//! - `users`: accounts keyed by id, unique username
//! - `rooms`: rooms with owner and visibility
//! - `room_members`: (room, user) membership
//! - `messages`: chat history, indexed by (room_id, timestamp)

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::error::{StoreError, StoreResult};
use super::types::{Identity, Message, Room, RoomType, User};
use super::{MessageStore, RoomStore, UserStore};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS rooms (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        owner_id TEXT NOT NULL,
        room_type TEXT NOT NULL CHECK (room_type IN ('public', 'private'))
    );

    CREATE TABLE IF NOT EXISTS room_members (
        room_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'member',
        PRIMARY KEY (room_id, user_id)
    );

    CREATE TABLE IF NOT EXISTS messages (
        id TEXT PRIMARY KEY,
        room_id TEXT NOT NULL,
        sender_id TEXT NOT NULL,
        sender_name TEXT NOT NULL,
        content TEXT NOT NULL,
        timestamp INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_messages_room_time ON messages(room_id, timestamp);
";

/// SQLite-backed implementation of all store traits
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Create or open a database file
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            ",
        )?;

        Self::init(conn, Some(path.to_path_buf()))
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;

        tracing::debug!(path = ?path, "Store schema ready");

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Path of the database file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Cheap round trip to verify the database is usable
    pub fn health_check(&self) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    /// Number of persisted messages in a room
    pub fn message_count(&self, room_id: &str) -> StoreResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE room_id = ?1",
            params![room_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("store connection poisoned".to_string()))
    }
}

fn room_from_row(row: &Row<'_>) -> rusqlite::Result<(String, String, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn to_room((id, name, owner_id, room_type): (String, String, String, String)) -> StoreResult<Room> {
    let room_type = room_type
        .parse::<RoomType>()
        .map_err(StoreError::Corruption)?;
    Ok(Room {
        id,
        name,
        owner_id,
        room_type,
    })
}

type MessageRow = (String, String, String, String, String, i64);

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn to_message((id, room_id, sender_id, sender_name, content, millis): MessageRow) -> StoreResult<Message> {
    let timestamp = DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| StoreError::Corruption(format!("message {} has bad timestamp {}", id, millis)))?;
    Ok(Message {
        id,
        room_id,
        sender: Identity::new(sender_id, sender_name),
        content,
        timestamp,
    })
}

impl UserStore for SqliteStore {
    fn create_user(&self, user: &User) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO users (id, username, password_hash) VALUES (?1, ?2, ?3)",
            params![user.id, user.username, user.password_hash],
        )?;
        Ok(())
    }

    fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let conn = self.lock()?;
        let user = conn
            .query_row(
                "SELECT id, username, password_hash FROM users WHERE username = ?1",
                params![username],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        password_hash: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }
}

impl RoomStore for SqliteStore {
    fn create_room(&self, room: &Room) -> StoreResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO rooms (id, name, owner_id, room_type) VALUES (?1, ?2, ?3, ?4)",
            params![room.id, room.name, room.owner_id, room.room_type.as_str()],
        )?;
        tx.execute(
            "INSERT INTO room_members (room_id, user_id, status) VALUES (?1, ?2, 'member')",
            params![room.id, room.owner_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn get_room(&self, room_id: &str) -> StoreResult<Option<Room>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT id, name, owner_id, room_type FROM rooms WHERE id = ?1",
                params![room_id],
                room_from_row,
            )
            .optional()?;
        row.map(to_room).transpose()
    }

    fn list_rooms_for_user(&self, user_id: &str) -> StoreResult<Vec<Room>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT DISTINCT r.id, r.name, r.owner_id, r.room_type
             FROM rooms r
             LEFT JOIN room_members m ON r.id = m.room_id
             WHERE r.room_type = 'public' OR (m.user_id = ?1 AND m.status = 'member')
             ORDER BY r.name ASC",
        )?;

        let rows = stmt
            .query_map(params![user_id], room_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(to_room).collect()
    }

    fn add_member(&self, room_id: &str, user_id: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO room_members (room_id, user_id, status) VALUES (?1, ?2, 'member')
             ON CONFLICT (room_id, user_id) DO UPDATE SET status = 'member'",
            params![room_id, user_id],
        )?;
        Ok(())
    }

    fn is_member(&self, room_id: &str, user_id: &str) -> StoreResult<bool> {
        let conn = self.lock()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM room_members WHERE room_id = ?1 AND user_id = ?2 AND status = 'member'",
                params![room_id, user_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

impl MessageStore for SqliteStore {
    fn append(&self, message: &Message) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO messages (id, room_id, sender_id, sender_name, content, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                message.id,
                message.room_id,
                message.sender.id,
                message.sender.display_name,
                message.content,
                message.timestamp.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    fn list_since(&self, room_id: &str, since: DateTime<Utc>) -> StoreResult<Vec<Message>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, room_id, sender_id, sender_name, content, timestamp
             FROM messages
             WHERE room_id = ?1 AND timestamp > ?2
             ORDER BY timestamp ASC, rowid ASC",
        )?;

        let rows = stmt
            .query_map(params![room_id, since.timestamp_millis()], message_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(to_message).collect()
    }

    fn list_recent(&self, room_id: &str, limit: usize) -> StoreResult<Vec<Message>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, room_id, sender_id, sender_name, content, timestamp
             FROM messages
             WHERE room_id = ?1
             ORDER BY timestamp DESC, rowid DESC
             LIMIT ?2",
        )?;

        let rows = stmt
            .query_map(params![room_id, limit as i64], message_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut messages = rows
            .into_iter()
            .map(to_message)
            .collect::<StoreResult<Vec<_>>>()?;
        messages.reverse();
        Ok(messages)
    }
}

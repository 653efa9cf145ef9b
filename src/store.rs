use crate::{
    chat::{ChatMessage, ChatRoom, MessageKind, NewMessage, RoomState, Side},
    entity::{ConnectionId, PairKey, UserId, UserRecord, UserStatus},
    error::{ChatError, Result},
};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteRow},
    ConnectOptions, Row, SqlitePool,
};
use std::{path::Path, str::FromStr, time::Duration};
use tracing::debug;

const ROOM_COLUMNS: &str = "id, participant_a, participant_b, pair_key, connection_a, connection_b, \
     last_message, last_message_at, state, created_at";

/// How long a writer waits for the database lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

const MESSAGE_COLUMNS: &str =
    "seq, id, room_id, sender_id, kind, content, caption, thumbnail, created_at";

/// SQLite-backed persistence for rooms, messages and the user mirror.
///
/// Presence (the connection bound to each side of a room) lives on the room
/// row itself and is treated as a cache: it is rebuilt by clients re-initiating
/// after a restart.
#[derive(Clone, Debug)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if needed) the database file at `db_path`.
    pub async fn open(db_path: impl AsRef<Path>) -> anyhow::Result<Self> {
        use anyhow::Context;

        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create database directory")?;
            }
        }

        let db_url = format!("sqlite://{}", db_path.to_string_lossy());

        let options = SqliteConnectOptions::from_str(&db_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT)
            .log_statements(tracing::log::LevelFilter::Trace);

        let pool = SqlitePool::connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        Ok(Self { pool })
    }

    /// A private in-memory database. Pinned to one connection so every query
    /// sees the same data.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?
            .log_statements(tracing::log::LevelFilter::Trace);

        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chat_rooms (
                id TEXT PRIMARY KEY,
                participant_a TEXT NOT NULL,
                participant_b TEXT NOT NULL,
                pair_key TEXT NOT NULL UNIQUE,
                connection_a TEXT,
                connection_b TEXT,
                last_message TEXT,
                last_message_at DATETIME,
                state TEXT NOT NULL DEFAULT 'ACTIVE',
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_chat_rooms_participant_a ON chat_rooms(participant_a);
            CREATE INDEX IF NOT EXISTS idx_chat_rooms_participant_b ON chat_rooms(participant_b);

            CREATE TABLE IF NOT EXISTS chat_messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                room_id TEXT NOT NULL REFERENCES chat_rooms(id),
                sender_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                content TEXT NOT NULL,
                caption TEXT,
                thumbnail TEXT,
                created_at DATETIME NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_chat_messages_room_seq ON chat_messages(room_id, seq);

            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                status TEXT NOT NULL DEFAULT 'ACTIVE',
                is_active INTEGER NOT NULL DEFAULT 0,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ==================== Room directory ====================

    pub async fn find_room(&self, room_id: &str) -> Result<Option<ChatRoom>> {
        let row = sqlx::query(&format!("SELECT {ROOM_COLUMNS} FROM chat_rooms WHERE id = ?"))
            .bind(room_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(room_from_row).transpose()
    }

    /// Look up the room for `{a, b}`; argument order does not matter.
    pub async fn find_room_for_pair(&self, a: &UserId, b: &UserId) -> Result<Option<ChatRoom>> {
        let key = PairKey::new(a, b);
        let row = sqlx::query(&format!(
            "SELECT {ROOM_COLUMNS} FROM chat_rooms WHERE pair_key = ?"
        ))
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(room_from_row).transpose()
    }

    /// Create the room for `{initiator, peer}` with the initiator's side bound
    /// to `connection`.
    ///
    /// Uniqueness is enforced by the `pair_key` constraint; a concurrent
    /// creation for the same pair surfaces as [`ChatError::DuplicateRoom`].
    pub async fn create_room(
        &self,
        initiator: &UserId,
        peer: &UserId,
        connection: &ConnectionId,
    ) -> Result<ChatRoom> {
        if initiator == peer {
            return Err(ChatError::Validation(
                "senderId and receiverId must be different.".into(),
            ));
        }

        let now = Utc::now();
        let room = ChatRoom {
            id: uuid::Uuid::new_v4().to_string(),
            participant_a: initiator.clone(),
            participant_b: peer.clone(),
            pair_key: PairKey::new(initiator, peer),
            connection_a: Some(connection.clone()),
            connection_b: None,
            last_message_summary: None,
            last_message_at: None,
            state: RoomState::Active,
            created_at: now,
        };

        let result = sqlx::query(
            r#"
            INSERT INTO chat_rooms
                (id, participant_a, participant_b, pair_key, connection_a, state, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&room.id)
        .bind(room.participant_a.as_str())
        .bind(room.participant_b.as_str())
        .bind(room.pair_key.as_str())
        .bind(connection.as_str())
        .bind(room.state.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(room_id = %room.id, pair = %room.pair_key, "chat room created");
                Ok(room)
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(ChatError::DuplicateRoom(room.pair_key))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Bind `connection` to whichever side `participant` occupies, replacing
    /// any previous connection for that side.
    pub async fn bind_connection(
        &self,
        room_id: &str,
        participant: &UserId,
        connection: &ConnectionId,
    ) -> Result<ChatRoom> {
        let mut room = self
            .find_room(room_id)
            .await?
            .ok_or_else(|| ChatError::UnknownRoom(room_id.to_string()))?;

        let side = room
            .side_of(participant)
            .ok_or_else(|| ChatError::NotAParticipant {
                room_id: room_id.to_string(),
                user_id: participant.clone(),
            })?;

        let column = match side {
            Side::A => "connection_a",
            Side::B => "connection_b",
        };

        sqlx::query(&format!(
            "UPDATE chat_rooms SET {column} = ?, updated_at = ? WHERE id = ?"
        ))
        .bind(connection.as_str())
        .bind(Utc::now())
        .bind(room_id)
        .execute(&self.pool)
        .await?;

        match side {
            Side::A => room.connection_a = Some(connection.clone()),
            Side::B => room.connection_b = Some(connection.clone()),
        }

        Ok(room)
    }

    /// Clear `connection` from every room side it is bound to.
    /// Returns how many sides were cleared; zero is not an error.
    pub async fn release_connection(&self, connection: &ConnectionId) -> Result<u64> {
        let mut cleared = 0;
        for column in ["connection_a", "connection_b"] {
            let result = sqlx::query(&format!(
                "UPDATE chat_rooms SET {column} = NULL WHERE {column} = ?"
            ))
            .bind(connection.as_str())
            .execute(&self.pool)
            .await?;
            cleared += result.rows_affected();
        }
        Ok(cleared)
    }

    pub async fn set_room_state(&self, room_id: &str, state: RoomState) -> Result<()> {
        let result = sqlx::query("UPDATE chat_rooms SET state = ?, updated_at = ? WHERE id = ?")
            .bind(state.as_str())
            .bind(Utc::now())
            .bind(room_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ChatError::UnknownRoom(room_id.to_string()));
        }
        Ok(())
    }

    /// Every room `user` takes part in, most recent activity first.
    pub async fn rooms_for_user(&self, user: &UserId) -> Result<Vec<ChatRoom>> {
        let rows = sqlx::query(&format!(
            "SELECT {ROOM_COLUMNS} FROM chat_rooms WHERE participant_a = ? OR participant_b = ?"
        ))
        .bind(user.as_str())
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut rooms = rows.iter().map(room_from_row).collect::<Result<Vec<_>>>()?;
        // Timestamps are stored as text with variable precision, so order in memory.
        rooms.sort_by_key(|room| {
            std::cmp::Reverse(room.last_message_at.unwrap_or(room.created_at))
        });
        Ok(rooms)
    }

    // ==================== Message store ====================

    /// Persist a message and refresh the room's last-message cache.
    pub async fn append_message(&self, message: &NewMessage) -> Result<ChatMessage> {
        // Participants never change, so the check can run before the write
        // transaction. The transaction must open with a write: a deferred
        // transaction that reads first cannot wait for the write lock.
        let room = self
            .find_room(&message.room_id)
            .await?
            .ok_or_else(|| ChatError::UnknownRoom(message.room_id.clone()))?;

        if room.side_of(&message.sender_id).is_none() {
            return Err(ChatError::NotAParticipant {
                room_id: room.id,
                user_id: message.sender_id.clone(),
            });
        }

        let id = uuid::Uuid::new_v4().to_string();
        let created_at = Utc::now();

        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO chat_messages (id, room_id, sender_id, kind, content, caption, thumbnail, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&message.room_id)
        .bind(message.sender_id.as_str())
        .bind(message.kind.as_str())
        .bind(&message.content)
        .bind(&message.caption)
        .bind(&message.thumbnail)
        .bind(created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE chat_rooms SET last_message = ?, last_message_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(message.summary())
        .bind(created_at)
        .bind(created_at)
        .bind(&message.room_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(ChatMessage {
            id,
            seq: inserted.last_insert_rowid(),
            room_id: message.room_id.clone(),
            sender_id: message.sender_id.clone(),
            kind: message.kind,
            content: message.content.clone(),
            caption: message.caption.clone(),
            thumbnail: message.thumbnail.clone(),
            created_at,
        })
    }

    /// One page of a room's history, oldest first. `page` is 1-based; a page
    /// past the end is empty.
    pub async fn page_messages(
        &self,
        room_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<ChatMessage>> {
        let page = page.max(1);
        let limit = i64::from(page_size.max(1));
        let offset = i64::from(page - 1) * limit;

        let rows = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM chat_messages WHERE room_id = ? ORDER BY seq ASC LIMIT ? OFFSET ?"
        ))
        .bind(room_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(message_from_row).collect()
    }

    pub async fn count_messages(&self, room_id: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chat_messages WHERE room_id = ?")
            .bind(room_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // ==================== User mirror ====================

    pub async fn find_user(&self, user: &UserId) -> Result<Option<UserRecord>> {
        let row = sqlx::query("SELECT id, status, is_active FROM users WHERE id = ?")
            .bind(user.as_str())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let status: String = row.try_get("status")?;
        Ok(Some(UserRecord {
            id: UserId::new(row.try_get::<String, _>("id")?),
            status: UserStatus::parse(&status)
                .ok_or_else(|| decode_error(format!("unknown user status {status:?}")))?,
            is_active: row.try_get("is_active")?,
        }))
    }

    pub async fn upsert_user(&self, user: &UserRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, status, is_active, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user.id.as_str())
        .bind(user.status.as_str())
        .bind(user.is_active)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn decode_error(msg: String) -> ChatError {
    ChatError::Store(sqlx::Error::Decode(msg.into()))
}

fn room_from_row(row: &SqliteRow) -> Result<ChatRoom> {
    let participant_a = UserId::new(row.try_get::<String, _>("participant_a")?);
    let participant_b = UserId::new(row.try_get::<String, _>("participant_b")?);
    let state: String = row.try_get("state")?;

    Ok(ChatRoom {
        id: row.try_get("id")?,
        pair_key: PairKey::from_stored(row.try_get("pair_key")?),
        participant_a,
        participant_b,
        connection_a: row
            .try_get::<Option<String>, _>("connection_a")?
            .map(ConnectionId),
        connection_b: row
            .try_get::<Option<String>, _>("connection_b")?
            .map(ConnectionId),
        last_message_summary: row.try_get("last_message")?,
        last_message_at: row.try_get::<Option<DateTime<Utc>>, _>("last_message_at")?,
        state: RoomState::parse(&state)
            .ok_or_else(|| decode_error(format!("unknown room state {state:?}")))?,
        created_at: row.try_get("created_at")?,
    })
}

fn message_from_row(row: &SqliteRow) -> Result<ChatMessage> {
    let kind: String = row.try_get("kind")?;

    Ok(ChatMessage {
        seq: row.try_get("seq")?,
        id: row.try_get("id")?,
        room_id: row.try_get("room_id")?,
        sender_id: UserId::new(row.try_get::<String, _>("sender_id")?),
        kind: MessageKind::parse(&kind)
            .ok_or_else(|| decode_error(format!("unknown message kind {kind:?}")))?,
        content: row.try_get("content")?,
        caption: row.try_get("caption")?,
        thumbnail: row.try_get("thumbnail")?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(room_id: &str, sender: &UserId, content: &str) -> NewMessage {
        NewMessage {
            room_id: room_id.to_string(),
            sender_id: sender.clone(),
            kind: MessageKind::Text,
            content: content.to_string(),
            caption: None,
            thumbnail: None,
        }
    }

    async fn file_store(dir: &tempfile::TempDir) -> Store {
        let store = Store::open(dir.path().join("chat.db")).await.unwrap();
        store.init().await.unwrap();
        store
    }

    #[tokio::test]
    async fn pair_lookup_is_order_independent() {
        let store = Store::in_memory().await.unwrap();
        let (a, b) = (UserId::new("alice"), UserId::new("bob"));

        assert!(store.find_room_for_pair(&a, &b).await.unwrap().is_none());

        let room = store
            .create_room(&b, &a, &ConnectionId("c1".into()))
            .await
            .unwrap();
        assert_eq!(room.participant_a, b);
        assert_eq!(room.connection_a, Some(ConnectionId("c1".into())));
        assert_eq!(room.connection_b, None);

        let ab = store.find_room_for_pair(&a, &b).await.unwrap().unwrap();
        let ba = store.find_room_for_pair(&b, &a).await.unwrap().unwrap();
        assert_eq!(ab.id, room.id);
        assert_eq!(ba.id, room.id);
        assert_eq!(ab.pair_key, room.pair_key);
        assert_eq!(ab.pair_key.as_str(), "alice_bob");
    }

    #[tokio::test]
    async fn second_room_for_pair_is_rejected() {
        let store = Store::in_memory().await.unwrap();
        let (a, b) = (UserId::new("alice"), UserId::new("bob"));

        store
            .create_room(&a, &b, &ConnectionId("c1".into()))
            .await
            .unwrap();
        let err = store
            .create_room(&b, &a, &ConnectionId("c2".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::DuplicateRoom(_)));
    }

    #[tokio::test]
    async fn room_with_self_is_rejected() {
        let store = Store::in_memory().await.unwrap();
        let a = UserId::new("alice");
        let err = store
            .create_room(&a, &a, &ConnectionId("c1".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));
    }

    #[tokio::test]
    async fn bind_overwrites_and_release_clears() {
        let store = Store::in_memory().await.unwrap();
        let (a, b) = (UserId::new("alice"), UserId::new("bob"));
        let room = store
            .create_room(&a, &b, &ConnectionId("a-1".into()))
            .await
            .unwrap();

        store
            .bind_connection(&room.id, &b, &ConnectionId("b-1".into()))
            .await
            .unwrap();
        let room = store
            .bind_connection(&room.id, &a, &ConnectionId("a-2".into()))
            .await
            .unwrap();
        assert_eq!(room.connection_a, Some(ConnectionId("a-2".into())));
        assert_eq!(room.connection_b, Some(ConnectionId("b-1".into())));

        let stranger = store
            .bind_connection(&room.id, &UserId::new("eve"), &ConnectionId("e".into()))
            .await
            .unwrap_err();
        assert!(matches!(stranger, ChatError::NotAParticipant { .. }));

        assert_eq!(
            store
                .release_connection(&ConnectionId("b-1".into()))
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            store
                .release_connection(&ConnectionId("b-1".into()))
                .await
                .unwrap(),
            0
        );

        let room = store.find_room(&room.id).await.unwrap().unwrap();
        assert_eq!(room.connection_b, None);
        assert_eq!(room.connection_a, Some(ConnectionId("a-2".into())));
    }

    #[tokio::test]
    async fn pages_cover_history_without_gaps() {
        let store = Store::in_memory().await.unwrap();
        let (a, b) = (UserId::new("alice"), UserId::new("bob"));
        let room = store
            .create_room(&a, &b, &ConnectionId("c".into()))
            .await
            .unwrap();

        for i in 0..7 {
            let sender = if i % 2 == 0 { &a } else { &b };
            store
                .append_message(&text(&room.id, sender, &format!("m{i}")))
                .await
                .unwrap();
        }

        let mut all = Vec::new();
        for page in 1..=4 {
            all.extend(store.page_messages(&room.id, page, 3).await.unwrap());
        }

        let contents: Vec<_> = all.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["m0", "m1", "m2", "m3", "m4", "m5", "m6"]);
        assert!(all.windows(2).all(|w| w[0].seq < w[1].seq));
        assert!(all.windows(2).all(|w| w[0].created_at <= w[1].created_at));
        assert!(store.page_messages(&room.id, 9, 3).await.unwrap().is_empty());
        assert_eq!(store.count_messages(&room.id).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn append_updates_room_summary() {
        let store = Store::in_memory().await.unwrap();
        let (a, b) = (UserId::new("alice"), UserId::new("bob"));
        let room = store
            .create_room(&a, &b, &ConnectionId("c".into()))
            .await
            .unwrap();

        let sent = store.append_message(&text(&room.id, &b, "hello")).await.unwrap();

        let room = store.find_room(&room.id).await.unwrap().unwrap();
        assert_eq!(room.last_message_summary.as_deref(), Some("hello"));
        assert!(room.last_message_at.is_some());
        assert_eq!(sent.sender_id, b);
    }

    #[tokio::test]
    async fn append_rejects_unknown_room_and_stranger() {
        let store = Store::in_memory().await.unwrap();
        let (a, b) = (UserId::new("alice"), UserId::new("bob"));

        let err = store
            .append_message(&text("missing", &a, "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::UnknownRoom(_)));

        let room = store
            .create_room(&a, &b, &ConnectionId("c".into()))
            .await
            .unwrap();
        let err = store
            .append_message(&text(&room.id, &UserId::new("eve"), "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::NotAParticipant { .. }));
        assert_eq!(store.count_messages(&room.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn rooms_are_listed_by_recent_activity() {
        let store = Store::in_memory().await.unwrap();
        let a = UserId::new("alice");
        let (b, c) = (UserId::new("bob"), UserId::new("carol"));
        let conn = ConnectionId("c".into());

        let with_b = store.create_room(&a, &b, &conn).await.unwrap();
        let with_c = store.create_room(&a, &c, &conn).await.unwrap();
        store.append_message(&text(&with_b.id, &b, "latest")).await.unwrap();

        let rooms = store.rooms_for_user(&a).await.unwrap();
        let ids: Vec<_> = rooms.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, [with_b.id.as_str(), with_c.id.as_str()]);
        assert_eq!(store.rooms_for_user(&c).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn user_mirror_upserts() {
        let store = Store::in_memory().await.unwrap();
        let id = UserId::new("alice");
        assert!(store.find_user(&id).await.unwrap().is_none());

        store
            .upsert_user(&UserRecord::new("alice", UserStatus::Active, true))
            .await
            .unwrap();
        store
            .upsert_user(&UserRecord::new("alice", UserStatus::Block, false))
            .await
            .unwrap();

        let user = store.find_user(&id).await.unwrap().unwrap();
        assert_eq!(user.status, UserStatus::Block);
        assert!(!user.is_active);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_on_file_database_all_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let store = file_store(&dir).await;
        let (a, b) = (UserId::new("alice"), UserId::new("bob"));
        let room = store
            .create_room(&a, &b, &ConnectionId("c".into()))
            .await
            .unwrap();

        let mut tasks = Vec::new();
        for i in 0..40 {
            let store = store.clone();
            let room_id = room.id.clone();
            let sender = if i % 2 == 0 { a.clone() } else { b.clone() };
            tasks.push(tokio::spawn(async move {
                store
                    .append_message(&text(&room_id, &sender, &format!("m{i}")))
                    .await
            }));
        }

        let mut seqs = Vec::new();
        for task in tasks {
            let message = task.await.unwrap().expect("every concurrent append is stored");
            seqs.push(message.seq);
        }
        seqs.sort_unstable();
        seqs.dedup();
        assert_eq!(seqs.len(), 40);

        assert_eq!(store.count_messages(&room.id).await.unwrap(), 40);
        let history = store.page_messages(&room.id, 1, 100).await.unwrap();
        assert_eq!(history.len(), 40);
        assert!(history.windows(2).all(|w| w[0].seq < w[1].seq));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_creates_on_file_database_leave_one_room() {
        let dir = tempfile::tempdir().unwrap();
        let store = file_store(&dir).await;

        let mut tasks = Vec::new();
        for i in 0..10 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                let (me, peer) = if i % 2 == 0 {
                    (UserId::new("alice"), UserId::new("bob"))
                } else {
                    (UserId::new("bob"), UserId::new("alice"))
                };
                store
                    .create_room(&me, &peer, &ConnectionId(format!("c{i}")))
                    .await
            }));
        }

        let mut created = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => created += 1,
                Err(ChatError::DuplicateRoom(key)) => assert_eq!(key.as_str(), "alice_bob"),
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(created, 1);
        assert_eq!(
            store.rooms_for_user(&UserId::new("alice")).await.unwrap().len(),
            1
        );
    }
}

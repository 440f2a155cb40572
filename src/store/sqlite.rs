//! Chat Store - SQLite-backed document store
//!
//! Holds conversations (with their members), messages and read receipts.
//!
//! # Schema
//!
//! ```text
//! conversations(id, title, created_at)
//! members(conversation_id, user_id, role)        PK (conversation_id, user_id)
//! messages(id, conversation_id, sender_id, kind, body, ts)
//!                                                 INDEX (conversation_id, ts)
//! receipts(conversation_id, user_id, last_read_ts) PK (conversation_id, user_id)
//! ```
//!
//! Identifiers are stored as UUID text and timestamps as Unix milliseconds.

use rusqlite::{params, types::Type, Connection, OpenFlags, OptionalExtension, Row};
use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use super::error::{StoreError, StoreResult};
use super::types::{
    Conversation, ConversationSummary, CreatedConversation, Member, Message, MessageQuery, Role,
    UnreadState, DEFAULT_TITLE,
};
use crate::types::{now_millis, ConversationId, MessageId, UserId};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS conversations (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS members (
        conversation_id TEXT NOT NULL REFERENCES conversations(id),
        user_id TEXT NOT NULL,
        role TEXT NOT NULL,
        PRIMARY KEY (conversation_id, user_id)
    );
    CREATE INDEX IF NOT EXISTS idx_members_user ON members(user_id);
    CREATE TABLE IF NOT EXISTS messages (
        id TEXT PRIMARY KEY,
        conversation_id TEXT NOT NULL REFERENCES conversations(id),
        sender_id TEXT NOT NULL,
        kind TEXT NOT NULL,
        body TEXT NOT NULL,
        ts INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_messages_conversation_ts ON messages(conversation_id, ts);
    CREATE INDEX IF NOT EXISTS idx_messages_sender ON messages(sender_id);
    CREATE TABLE IF NOT EXISTS receipts (
        conversation_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        last_read_ts INTEGER NOT NULL,
        PRIMARY KEY (conversation_id, user_id)
    );
";

/// SQLite document store (std::sync::Mutex because rusqlite::Connection is !Sync)
pub struct ChatStore {
    conn: Mutex<Connection>,
}

impl ChatStore {
    /// Open or create a store at `path`
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
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
            PRAGMA foreign_keys = ON;
            ",
        )?;

        Self::init(conn)
    }

    /// Open a throwaway in-memory store
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(super) fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Lock(format!("Failed to acquire store lock: {}", e)))
    }

    /// Cheap round-trip used by readiness checks
    pub fn ping(&self) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    /// Create a conversation.
    ///
    /// The creator is always a member (role `owner`). Members are de-duplicated
    /// and at least two unique members are required. A two-member request
    /// returns the existing conversation between that pair, if any.
    pub fn create_conversation(
        &self,
        creator: UserId,
        title: &str,
        members: &[UserId],
    ) -> StoreResult<CreatedConversation> {
        let unique: BTreeSet<UserId> = members
            .iter()
            .copied()
            .chain(std::iter::once(creator))
            .collect();

        if unique.len() < 2 {
            return Err(StoreError::Validation(
                "at least 2 unique members required".to_string(),
            ));
        }

        let title = match title.trim() {
            "" => DEFAULT_TITLE.to_string(),
            t => t.to_string(),
        };

        let mut conn = self.conn()?;

        if unique.len() == 2 {
            let pair: Vec<UserId> = unique.iter().copied().collect();
            if let Some(existing) = find_direct(&conn, pair[0], pair[1])? {
                if let Some(conversation) = load_conversation(&conn, existing)? {
                    return Ok(CreatedConversation {
                        conversation,
                        reused: true,
                    });
                }
            }
        }

        let conversation = Conversation {
            id: ConversationId::new(),
            title,
            members: unique
                .iter()
                .map(|&user_id| Member {
                    user_id,
                    role: if user_id == creator {
                        Role::Owner
                    } else {
                        Role::Member
                    },
                })
                .collect(),
            created_at: now_millis(),
        };

        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO conversations (id, title, created_at) VALUES (?1, ?2, ?3)",
            params![
                conversation.id.to_string(),
                conversation.title,
                conversation.created_at
            ],
        )?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO members (conversation_id, user_id, role) VALUES (?1, ?2, ?3)",
            )?;
            for member in &conversation.members {
                stmt.execute(params![
                    conversation.id.to_string(),
                    member.user_id.to_string(),
                    member.role.as_str()
                ])?;
            }
        }
        tx.commit()?;

        tracing::debug!(
            conversation_id = %conversation.id,
            members = conversation.members.len(),
            "Created conversation"
        );

        Ok(CreatedConversation {
            conversation,
            reused: false,
        })
    }

    pub fn get_conversation(&self, id: ConversationId) -> StoreResult<Option<Conversation>> {
        let conn = self.conn()?;
        load_conversation(&conn, id)
    }

    /// Conversations of `user`, newest first, with unread counts and last message
    pub fn list_conversations(&self, user: UserId) -> StoreResult<Vec<ConversationSummary>> {
        let conn = self.conn()?;

        let ids: Vec<ConversationId> = {
            let mut stmt = conn.prepare_cached(
                "SELECT c.id FROM conversations c
                 JOIN members m ON m.conversation_id = c.id
                 WHERE m.user_id = ?1
                 ORDER BY c.created_at DESC, c.rowid DESC",
            )?;
            let rows = stmt.query_map(params![user.to_string()], |row| parse_column(row, 0))?;
            rows.collect::<Result<_, _>>()?
        };

        let mut summaries = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(conversation) = load_conversation(&conn, id)? else {
                continue;
            };
            let last_read = last_read(&conn, id, user)?;
            summaries.push(ConversationSummary {
                conversation,
                unread: count_newer(&conn, id, last_read)?,
                last_msg: last_message(&conn, id)?,
            });
        }

        Ok(summaries)
    }

    /// Whether `user` is a member of `conversation`
    pub fn has_member(&self, conversation: ConversationId, user: UserId) -> StoreResult<bool> {
        let conn = self.conn()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM members WHERE conversation_id = ?1 AND user_id = ?2",
                params![conversation.to_string(), user.to_string()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Append a message stamped with the current time
    pub fn insert_message(
        &self,
        conversation: ConversationId,
        sender: UserId,
        kind: &str,
        body: &str,
    ) -> StoreResult<Message> {
        let message = Message {
            id: MessageId::new(),
            conversation_id: conversation,
            sender_id: sender,
            kind: kind.to_string(),
            body: body.to_string(),
            ts: now_millis(),
        };

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO messages (id, conversation_id, sender_id, kind, body, ts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                message.id.to_string(),
                message.conversation_id.to_string(),
                message.sender_id.to_string(),
                message.kind,
                message.body,
                message.ts
            ],
        )?;

        Ok(message)
    }

    /// One page of history, newest first
    pub fn list_messages(
        &self,
        conversation: ConversationId,
        query: &MessageQuery,
    ) -> StoreResult<Vec<Message>> {
        let conn = self.conn()?;
        let limit = query.effective_limit() as i64;

        let (sql, bound) = match query.since.filter(|&s| s > 0) {
            Some(since) => (
                "SELECT id, conversation_id, sender_id, kind, body, ts FROM messages
                 WHERE conversation_id = ?1 AND ts > ?2
                 ORDER BY ts DESC, rowid DESC LIMIT ?3",
                since,
            ),
            None => (
                "SELECT id, conversation_id, sender_id, kind, body, ts FROM messages
                 WHERE conversation_id = ?1 AND ts < ?2
                 ORDER BY ts DESC, rowid DESC LIMIT ?3",
                query
                    .before
                    .filter(|&b| b > 0)
                    .unwrap_or_else(|| now_millis() + 1),
            ),
        };

        let mut stmt = conn.prepare_cached(sql)?;
        let rows = stmt.query_map(
            params![conversation.to_string(), bound, limit],
            message_from_row,
        )?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Move the read receipt of `user` forward to `ts`. Never moves it back.
    ///
    /// Returns the stored receipt timestamp.
    pub fn mark_read(&self, conversation: ConversationId, user: UserId, ts: i64) -> StoreResult<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO receipts (conversation_id, user_id, last_read_ts) VALUES (?1, ?2, ?3)
             ON CONFLICT(conversation_id, user_id)
             DO UPDATE SET last_read_ts = MAX(last_read_ts, excluded.last_read_ts)",
            params![conversation.to_string(), user.to_string(), ts],
        )?;
        last_read(&conn, conversation, user)
    }

    /// Messages newer than the member's receipt (0 when no receipt exists)
    pub fn unread_state(&self, conversation: ConversationId, user: UserId) -> StoreResult<UnreadState> {
        let conn = self.conn()?;
        let last_read_ts = last_read(&conn, conversation, user)?;
        Ok(UnreadState {
            unread: count_newer(&conn, conversation, last_read_ts)?,
            last_read_ts,
        })
    }
}

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: parse_column(row, 0)?,
        conversation_id: parse_column(row, 1)?,
        sender_id: parse_column(row, 2)?,
        kind: row.get(3)?,
        body: row.get(4)?,
        ts: row.get(5)?,
    })
}

fn load_conversation(conn: &Connection, id: ConversationId) -> StoreResult<Option<Conversation>> {
    let header = conn
        .query_row(
            "SELECT title, created_at FROM conversations WHERE id = ?1",
            params![id.to_string()],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
        )
        .optional()?;

    let Some((title, created_at)) = header else {
        return Ok(None);
    };

    let mut stmt = conn.prepare_cached(
        "SELECT user_id, role FROM members WHERE conversation_id = ?1 ORDER BY rowid",
    )?;
    let members = stmt
        .query_map(params![id.to_string()], |row| {
            let role: String = row.get(1)?;
            Ok(Member {
                user_id: parse_column(row, 0)?,
                role: role.parse().unwrap_or(Role::Member),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(Conversation {
        id,
        title,
        members,
        created_at,
    }))
}

/// Conversation with exactly the two given members
fn find_direct(conn: &Connection, a: UserId, b: UserId) -> StoreResult<Option<ConversationId>> {
    let mut stmt = conn.prepare_cached(
        "SELECT conversation_id FROM members
         WHERE conversation_id IN (SELECT conversation_id FROM members WHERE user_id = ?1)
           AND conversation_id IN (SELECT conversation_id FROM members WHERE user_id = ?2)
         GROUP BY conversation_id
         HAVING COUNT(*) = 2
         LIMIT 1",
    )?;
    let found = stmt
        .query_row(params![a.to_string(), b.to_string()], |row| parse_column(row, 0))
        .optional()?;
    Ok(found)
}

fn last_read(conn: &Connection, conversation: ConversationId, user: UserId) -> StoreResult<i64> {
    let ts = conn
        .query_row(
            "SELECT last_read_ts FROM receipts WHERE conversation_id = ?1 AND user_id = ?2",
            params![conversation.to_string(), user.to_string()],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(ts.unwrap_or(0))
}

fn count_newer(conn: &Connection, conversation: ConversationId, since: i64) -> StoreResult<i64> {
    let n = conn.query_row(
        "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1 AND ts > ?2",
        params![conversation.to_string(), since],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(n)
}

fn last_message(conn: &Connection, conversation: ConversationId) -> StoreResult<Option<Message>> {
    let msg = conn
        .query_row(
            "SELECT id, conversation_id, sender_id, kind, body, ts FROM messages
             WHERE conversation_id = ?1
             ORDER BY ts DESC, rowid DESC LIMIT 1",
            params![conversation.to_string()],
            message_from_row,
        )
        .optional()?;
    Ok(msg)
}

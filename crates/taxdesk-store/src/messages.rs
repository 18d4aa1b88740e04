use chrono::{SubsecRound, Utc};
use tracing::{debug, instrument};

use taxdesk_core::{CaseId, Message, MessageId, UserId};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

const COLUMNS: &str = "id, sender_id, recipient_id, case_id, body, is_read, created_at";

/// A message about to be stored.
#[derive(Clone, Debug)]
pub struct NewMessage {
    /// Author.
    pub sender_id: UserId,
    /// Addressee.
    pub recipient_id: UserId,
    /// Related case.
    pub case_id: Option<CaseId>,
    /// Text.
    pub body: String,
}

/// The directed message log.
pub struct MessageRepo {
    db: Database,
}

impl MessageRepo {
    /// Repository over `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Store a new unread message stamped with the current time, at the
    /// microsecond precision the store keeps.
    #[instrument(skip(self, new), fields(sender_id = %new.sender_id, recipient_id = %new.recipient_id))]
    pub fn send(&self, new: NewMessage) -> Result<Message, StoreError> {
        let message = Message {
            id: MessageId::new(),
            sender_id: new.sender_id,
            recipient_id: new.recipient_id,
            case_id: new.case_id,
            body: new.body,
            is_read: false,
            created_at: Utc::now().trunc_subsecs(6),
        };
        self.insert(&message)?;
        Ok(message)
    }

    /// Store a fully formed message as-is.
    pub fn insert(&self, message: &Message) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let _ = conn.execute(
                "INSERT INTO messages (id, sender_id, recipient_id, case_id, body, is_read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    message.id.as_str(),
                    message.sender_id.as_str(),
                    message.recipient_id.as_str(),
                    message.case_id.as_ref().map(CaseId::as_str),
                    message.body,
                    message.is_read,
                    row_helpers::format_timestamp(&message.created_at),
                ],
            )?;
            Ok(())
        })
    }

    /// Get a message by id.
    pub fn get(&self, id: &MessageId) -> Result<Message, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM messages WHERE id = ?1"))?;
            let mut rows = stmt.query([id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_message(row),
                None => Err(StoreError::NotFound(format!("message {id}"))),
            }
        })
    }

    /// Every message `user` sent or received, newest first. Messages with
    /// equal timestamps come back in reverse insertion order.
    #[instrument(skip(self), fields(user_id = %user))]
    pub fn list_for_user(&self, user: &UserId) -> Result<Vec<Message>, StoreError> {
        self.query(
            &format!(
                "SELECT {COLUMNS} FROM messages WHERE sender_id = ?1 OR recipient_id = ?1
                 ORDER BY created_at DESC, rowid DESC"
            ),
            rusqlite::params![user.as_str()],
        )
    }

    /// The thread between `user` and `counterpart` in both directions,
    /// oldest first.
    #[instrument(skip(self), fields(user_id = %user, counterpart_id = %counterpart))]
    pub fn list_between(&self, user: &UserId, counterpart: &UserId) -> Result<Vec<Message>, StoreError> {
        self.query(
            &format!(
                "SELECT {COLUMNS} FROM messages
                 WHERE (sender_id = ?1 AND recipient_id = ?2) OR (sender_id = ?2 AND recipient_id = ?1)
                 ORDER BY created_at ASC, rowid ASC"
            ),
            rusqlite::params![user.as_str(), counterpart.as_str()],
        )
    }

    /// Mark every unread message from `counterpart` to `user` as read.
    ///
    /// Messages in the opposite direction and from other senders are left
    /// untouched. Returns how many rows changed; a repeat call returns 0.
    #[instrument(skip(self), fields(user_id = %user, counterpart_id = %counterpart))]
    pub fn mark_conversation_read(&self, user: &UserId, counterpart: &UserId) -> Result<usize, StoreError> {
        let updated = self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE messages SET is_read = 1
                 WHERE sender_id = ?1 AND recipient_id = ?2 AND is_read = 0",
                rusqlite::params![counterpart.as_str(), user.as_str()],
            )
            .map_err(StoreError::from)
        })?;
        debug!(updated, "conversation marked read");
        Ok(updated)
    }

    /// Number of unread messages addressed to `user`.
    pub fn unread_count(&self, user: &UserId) -> Result<u32, StoreError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE recipient_id = ?1 AND is_read = 0",
                [user.as_str()],
                |row| row.get(0),
            )
            .map_err(StoreError::from)
        })
    }

    fn query(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Message>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let mut rows = stmt.query(params)?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_message(row)?);
            }
            Ok(results)
        })
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> Result<Message, StoreError> {
    let created_at: String = row_helpers::get(row, 6, "messages", "created_at")?;
    Ok(Message {
        id: MessageId::from_raw(row_helpers::get::<String>(row, 0, "messages", "id")?),
        sender_id: UserId::from_raw(row_helpers::get::<String>(row, 1, "messages", "sender_id")?),
        recipient_id: UserId::from_raw(row_helpers::get::<String>(row, 2, "messages", "recipient_id")?),
        case_id: row_helpers::get_opt::<String>(row, 3, "messages", "case_id")?.map(CaseId::from_raw),
        body: row_helpers::get(row, 4, "messages", "body")?,
        is_read: row_helpers::get(row, 5, "messages", "is_read")?,
        created_at: row_helpers::parse_timestamp(&created_at, "messages", "created_at")?,
    })
}

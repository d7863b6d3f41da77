// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound message persistence.

use relay_core::{InboundMessage, MessageScope, RawEvent, RelayError};
use rusqlite::{OptionalExtension, params};

use crate::database::Database;
use crate::queries::{format_ts, parse_ts};

/// Columns selected by [`message_from_row`], in order.
pub(crate) const MESSAGE_COLUMNS: &str = "m.id, m.chat_bot_id, m.platform_message_id, m.dedupe_key,
     m.is_dm, m.guild_id, m.channel_id, m.author_id, m.author_name, m.content,
     m.timestamp, m.created_at";

/// Map a row whose first 12 columns are [`MESSAGE_COLUMNS`], starting at `offset`.
pub(crate) fn message_from_row(
    row: &rusqlite::Row<'_>,
    offset: usize,
) -> Result<InboundMessage, rusqlite::Error> {
    let timestamp: String = row.get(offset + 10)?;
    Ok(InboundMessage {
        id: row.get(offset)?,
        chat_bot_id: row.get(offset + 1)?,
        platform_message_id: row.get(offset + 2)?,
        dedupe_key: row.get(offset + 3)?,
        scope: MessageScope {
            is_dm: row.get(offset + 4)?,
            guild_id: row.get(offset + 5)?,
            channel_id: row.get(offset + 6)?,
            author_id: row.get(offset + 7)?,
            author_name: row.get(offset + 8)?,
        },
        content: row.get(offset + 9)?,
        timestamp: parse_ts(&timestamp)?,
        created_at: row.get(offset + 11)?,
    })
}

/// Insert the message unless its dedupe key is already recorded.
///
/// Returns the stored row and whether this call created it. The existence
/// check and the insert run in one transaction, so a replayed event never
/// produces a second row.
pub async fn create_message(
    db: &Database,
    event: &RawEvent,
) -> Result<(InboundMessage, bool), RelayError> {
    let event = event.clone();
    let dedupe_key = event.dedupe_key();
    db.connection()
        .call(move |conn| -> Result<(InboundMessage, bool), rusqlite::Error> {
            let tx = conn.transaction()?;

            let existing = tx
                .query_row(
                    &format!("SELECT {MESSAGE_COLUMNS} FROM inbound_messages m WHERE m.dedupe_key = ?1"),
                    params![dedupe_key],
                    |row| message_from_row(row, 0),
                )
                .optional()?;
            if let Some(message) = existing {
                tx.commit()?;
                return Ok((message, false));
            }

            let id = uuid::Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO inbound_messages (id, chat_bot_id, platform_message_id, dedupe_key,
                     is_dm, guild_id, channel_id, author_id, author_name, content, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    id,
                    event.chat_bot_id,
                    event.platform_message_id,
                    dedupe_key,
                    event.scope.is_dm,
                    event.scope.guild_id,
                    event.scope.channel_id,
                    event.scope.author_id,
                    event.scope.author_name,
                    event.content,
                    format_ts(event.timestamp),
                ],
            )?;
            let message = tx.query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM inbound_messages m WHERE m.id = ?1"),
                params![id],
                |row| message_from_row(row, 0),
            )?;
            tx.commit()?;
            Ok((message, true))
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Fetch a message by id.
pub async fn get_message(db: &Database, id: &str) -> Result<Option<InboundMessage>, RelayError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<InboundMessage>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM inbound_messages m WHERE m.id = ?1"),
                params![id],
                |row| message_from_row(row, 0),
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Up to `limit` messages of the conversation `anchor` belongs to, oldest first.
///
/// A conversation is the anchor's chat bot plus its channel. Messages without a
/// channel id fall back to the direct-message thread with the same author. Only
/// messages at or before the anchor's timestamp are returned, never the anchor
/// itself.
pub async fn recent_messages(
    db: &Database,
    anchor: &InboundMessage,
    limit: u32,
) -> Result<Vec<InboundMessage>, RelayError> {
    let chat_bot_id = anchor.chat_bot_id.clone();
    let channel_id = anchor.scope.channel_id.clone();
    let author_id = anchor.scope.author_id.clone();
    let anchor_id = anchor.id.clone();
    let before = format_ts(anchor.timestamp);
    db.connection()
        .call(move |conn| -> Result<Vec<InboundMessage>, rusqlite::Error> {
            let mut rows: Vec<InboundMessage> = match channel_id {
                Some(channel_id) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {MESSAGE_COLUMNS} FROM inbound_messages m
                         WHERE m.chat_bot_id = ?1 AND m.channel_id = ?2
                           AND m.timestamp <= ?3 AND m.id != ?4
                         ORDER BY m.timestamp DESC, m.rowid DESC
                         LIMIT ?5"
                    ))?;
                    stmt.query_map(
                        params![chat_bot_id, channel_id, before, anchor_id, i64::from(limit)],
                        |row| message_from_row(row, 0),
                    )?
                    .collect::<Result<_, _>>()?
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {MESSAGE_COLUMNS} FROM inbound_messages m
                         WHERE m.chat_bot_id = ?1 AND m.channel_id IS NULL AND m.is_dm = 1
                           AND m.author_id = ?2 AND m.timestamp <= ?3 AND m.id != ?4
                         ORDER BY m.timestamp DESC, m.rowid DESC
                         LIMIT ?5"
                    ))?;
                    stmt.query_map(
                        params![chat_bot_id, author_id, before, anchor_id, i64::from(limit)],
                        |row| message_from_row(row, 0),
                    )?
                    .collect::<Result<_, _>>()?
                }
            };
            rows.reverse();
            Ok(rows)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Number of stored messages for a chat bot.
pub async fn count_messages(db: &Database, chat_bot_id: &str) -> Result<i64, RelayError> {
    let chat_bot_id = chat_bot_id.to_string();
    db.connection()
        .call(move |conn| -> Result<i64, rusqlite::Error> {
            conn.query_row(
                "SELECT COUNT(*) FROM inbound_messages WHERE chat_bot_id = ?1",
                params![chat_bot_id],
                |row| row.get(0),
            )
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn event(msg_id: &str) -> RawEvent {
        RawEvent {
            chat_bot_id: "bot-a".into(),
            platform_message_id: msg_id.into(),
            timestamp: Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap(),
            content: "hello".into(),
            scope: MessageScope {
                is_dm: false,
                guild_id: Some("g1".into()),
                channel_id: Some("c1".into()),
                author_id: "u1".into(),
                author_name: "User One".into(),
            },
        }
    }

    #[tokio::test]
    async fn create_message_is_idempotent_on_dedupe_key() {
        let (db, _dir) = setup_db().await;

        let (first, created) = create_message(&db, &event("100")).await.unwrap();
        assert!(created);
        assert_eq!(first.dedupe_key, "bot-a:100");
        assert_eq!(first.scope.guild_id.as_deref(), Some("g1"));

        let mut replay = event("100");
        replay.content = "edited on replay".into();
        let (second, created) = create_message(&db, &replay).await.unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
        assert_eq!(second.content, "hello", "existing row must not be mutated");

        assert_eq!(count_messages(&db, "bot-a").await.unwrap(), 1);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn same_platform_id_on_other_bot_is_distinct() {
        let (db, _dir) = setup_db().await;

        create_message(&db, &event("7")).await.unwrap();
        let mut other = event("7");
        other.chat_bot_id = "bot-b".into();
        let (_, created) = create_message(&db, &other).await.unwrap();
        assert!(created);

        db.close().await.unwrap();
    }

    fn event_at(msg_id: &str, channel: Option<&str>, minute: u32) -> RawEvent {
        let mut e = event(msg_id);
        e.timestamp = Utc.with_ymd_and_hms(2026, 2, 1, 12, minute, 0).unwrap();
        e.content = format!("message {msg_id}");
        e.scope.is_dm = channel.is_none();
        e.scope.channel_id = channel.map(String::from);
        e
    }

    #[tokio::test]
    async fn recent_messages_stay_in_the_anchor_channel() {
        let (db, _dir) = setup_db().await;

        for (id, channel, minute) in [
            ("1", "c1", 1),
            ("2", "c2", 2),
            ("3", "c1", 3),
            ("4", "c1", 4),
            ("6", "c1", 6),
        ] {
            create_message(&db, &event_at(id, Some(channel), minute)).await.unwrap();
        }
        let mut other_bot = event_at("9", Some("c1"), 2);
        other_bot.chat_bot_id = "bot-b".into();
        create_message(&db, &other_bot).await.unwrap();

        let (anchor, _) = create_message(&db, &event_at("5", Some("c1"), 5)).await.unwrap();
        let history = recent_messages(&db, &anchor, 10).await.unwrap();
        let ids: Vec<_> = history.iter().map(|m| m.platform_message_id.as_str()).collect();
        assert_eq!(ids, ["1", "3", "4"]);

        let limited = recent_messages(&db, &anchor, 2).await.unwrap();
        let ids: Vec<_> = limited.iter().map(|m| m.platform_message_id.as_str()).collect();
        assert_eq!(ids, ["3", "4"], "limit keeps the newest, oldest first");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn recent_messages_without_channel_follow_the_dm_author() {
        let (db, _dir) = setup_db().await;

        create_message(&db, &event_at("1", None, 1)).await.unwrap();
        let mut stranger = event_at("2", None, 2);
        stranger.scope.author_id = "u2".into();
        create_message(&db, &stranger).await.unwrap();
        create_message(&db, &event_at("3", Some("c1"), 3)).await.unwrap();

        let (anchor, _) = create_message(&db, &event_at("4", None, 4)).await.unwrap();
        let history = recent_messages(&db, &anchor, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].platform_message_id, "1");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn get_message_round_trips_timestamp() {
        let (db, _dir) = setup_db().await;

        let (msg, _) = create_message(&db, &event("1")).await.unwrap();
        let loaded = get_message(&db, &msg.id).await.unwrap().unwrap();
        assert_eq!(loaded.timestamp, Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap());
        assert!(get_message(&db, "missing").await.unwrap().is_none());

        db.close().await.unwrap();
    }
}

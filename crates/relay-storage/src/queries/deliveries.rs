// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery queue transitions: create, claim, ack, nack, reap.
//!
//! Each transition is a conditional `UPDATE` keyed by primary key and guarded
//! by the state it expects to leave, executed on the single writer thread.
//! A row therefore moves at most once per guarded statement, and the ack
//! guard (`lease_expires_at >= now`) and the reap guard
//! (`lease_expires_at < now`) can never both hold for the same `now`.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use relay_core::{
    AckOutcome, Delivery, DeliveryState, LeasedDelivery, NackOutcome, RejectReason, Rejection,
    RelayError,
};
use rusqlite::{OptionalExtension, Transaction, params};

use crate::database::Database;
use crate::queries::messages::{MESSAGE_COLUMNS, message_from_row};
use crate::queries::{format_ts, parse_ts};

const DELIVERY_COLUMNS: &str = "d.id, d.message_id, d.backend_bot_id, d.state, d.lease_id,
     d.lease_expires_at, d.attempts, d.last_error, d.acked_at, d.created_at, d.updated_at";

/// Number of columns in [`DELIVERY_COLUMNS`].
const DELIVERY_COLUMN_COUNT: usize = 11;

fn delivery_from_row(row: &rusqlite::Row<'_>) -> Result<Delivery, rusqlite::Error> {
    let state: String = row.get(3)?;
    let state = DeliveryState::from_str(&state).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let expires: Option<String> = row.get(5)?;
    Ok(Delivery {
        id: row.get(0)?,
        message_id: row.get(1)?,
        backend_bot_id: row.get(2)?,
        state,
        lease_id: row.get(4)?,
        lease_expires_at: expires.as_deref().map(parse_ts).transpose()?,
        attempts: row.get(6)?,
        last_error: row.get(7)?,
        acked_at: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

/// Create a pending delivery for (message, backend).
///
/// Returns `false` without touching the existing row if the pair already has one.
pub async fn create_delivery(
    db: &Database,
    message_id: &str,
    backend_bot_id: &str,
) -> Result<bool, RelayError> {
    let message_id = message_id.to_string();
    let backend_bot_id = backend_bot_id.to_string();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO deliveries (id, message_id, backend_bot_id)
                 VALUES (?1, ?2, ?3)",
                params![uuid::Uuid::new_v4().to_string(), message_id, backend_bot_id],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Lease up to `limit` pending deliveries for one backend.
///
/// Candidates are taken oldest message first. Every delivery in the batch
/// shares one freshly generated lease id and expires at `now + lease_secs`.
/// A candidate is only taken if it is still `pending` at the moment of the
/// write.
pub async fn claim_pending(
    db: &Database,
    backend_bot_id: &str,
    limit: u32,
    lease_secs: u32,
    now: DateTime<Utc>,
) -> Result<Vec<LeasedDelivery>, RelayError> {
    let backend_bot_id = backend_bot_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<LeasedDelivery>, rusqlite::Error> {
            let tx = conn.transaction()?;

            let candidates: Vec<String> = {
                let mut stmt = tx.prepare(
                    "SELECT d.id FROM deliveries d
                     JOIN inbound_messages m ON m.id = d.message_id
                     WHERE d.backend_bot_id = ?1 AND d.state = 'pending'
                     ORDER BY m.timestamp ASC, d.created_at ASC, d.rowid ASC
                     LIMIT ?2",
                )?;
                stmt.query_map(params![backend_bot_id, i64::from(limit)], |row| row.get(0))?
                    .collect::<Result<_, _>>()?
            };

            let lease_id = uuid::Uuid::new_v4().to_string();
            let expires_at = format_ts(now + Duration::seconds(i64::from(lease_secs)));
            let stamp = format_ts(now);

            let mut claimed = Vec::with_capacity(candidates.len());
            for id in candidates {
                let changed = tx.execute(
                    "UPDATE deliveries
                     SET state = 'leased', lease_id = ?1, lease_expires_at = ?2, updated_at = ?3
                     WHERE id = ?4 AND state = 'pending'",
                    params![lease_id, expires_at, stamp, id],
                )?;
                if changed == 1 {
                    claimed.push(load_leased(&tx, &id)?);
                }
            }

            tx.commit()?;
            Ok(claimed)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

fn load_leased(tx: &Transaction<'_>, id: &str) -> Result<LeasedDelivery, rusqlite::Error> {
    tx.query_row(
        &format!(
            "SELECT {DELIVERY_COLUMNS}, {MESSAGE_COLUMNS}
             FROM deliveries d JOIN inbound_messages m ON m.id = d.message_id
             WHERE d.id = ?1"
        ),
        params![id],
        |row| {
            Ok(LeasedDelivery {
                delivery: delivery_from_row(row)?,
                message: message_from_row(row, DELIVERY_COLUMN_COUNT)?,
            })
        },
    )
}

/// Mark deliveries acked.
///
/// An id is acked only if it belongs to `backend_bot_id`, is `leased` under
/// exactly `lease_id`, and the lease has not expired at `now`. Everything else
/// is rejected with a reason and left untouched; the batch never fails as a
/// whole because of a stale id.
pub async fn ack_deliveries(
    db: &Database,
    backend_bot_id: &str,
    lease_id: &str,
    delivery_ids: &[String],
    now: DateTime<Utc>,
) -> Result<AckOutcome, RelayError> {
    let backend_bot_id = backend_bot_id.to_string();
    let lease_id = lease_id.to_string();
    let delivery_ids = delivery_ids.to_vec();
    db.connection()
        .call(move |conn| -> Result<AckOutcome, rusqlite::Error> {
            let tx = conn.transaction()?;
            let stamp = format_ts(now);
            let mut outcome = AckOutcome::default();

            for id in delivery_ids {
                let changed = tx.execute(
                    "UPDATE deliveries
                     SET state = 'acked', lease_id = NULL, lease_expires_at = NULL,
                         acked_at = ?1, updated_at = ?1
                     WHERE id = ?2 AND backend_bot_id = ?3 AND state = 'leased'
                       AND lease_id = ?4 AND lease_expires_at >= ?1",
                    params![stamp, id, backend_bot_id, lease_id],
                )?;
                if changed == 1 {
                    outcome.acked.push(id);
                } else {
                    let reason = classify_rejection(&tx, &backend_bot_id, &id, &lease_id)?;
                    outcome.rejected.push(Rejection {
                        delivery_id: id,
                        reason,
                    });
                }
            }

            tx.commit()?;
            Ok(outcome)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Return leased deliveries to `pending` before their lease runs out.
///
/// Same acceptance rule as [`ack_deliveries`]. Released deliveries get their
/// attempt counter bumped and `last_error` set to `reason`.
pub async fn nack_deliveries(
    db: &Database,
    backend_bot_id: &str,
    lease_id: &str,
    delivery_ids: &[String],
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> Result<NackOutcome, RelayError> {
    let backend_bot_id = backend_bot_id.to_string();
    let lease_id = lease_id.to_string();
    let delivery_ids = delivery_ids.to_vec();
    let reason = reason.map(str::to_string);
    db.connection()
        .call(move |conn| -> Result<NackOutcome, rusqlite::Error> {
            let tx = conn.transaction()?;
            let stamp = format_ts(now);
            let mut outcome = NackOutcome::default();

            for id in delivery_ids {
                let changed = tx.execute(
                    "UPDATE deliveries
                     SET state = 'pending', lease_id = NULL, lease_expires_at = NULL,
                         attempts = attempts + 1, last_error = ?5, updated_at = ?1
                     WHERE id = ?2 AND backend_bot_id = ?3 AND state = 'leased'
                       AND lease_id = ?4 AND lease_expires_at >= ?1",
                    params![stamp, id, backend_bot_id, lease_id, reason],
                )?;
                if changed == 1 {
                    outcome.nacked.push(id);
                } else {
                    let why = classify_rejection(&tx, &backend_bot_id, &id, &lease_id)?;
                    outcome.rejected.push(Rejection {
                        delivery_id: id,
                        reason: why,
                    });
                }
            }

            tx.commit()?;
            Ok(outcome)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Explain why a guarded ack/nack update matched no row.
///
/// Deliveries of other backends are reported as unknown so a backend cannot
/// probe ids outside its own scope.
fn classify_rejection(
    tx: &Transaction<'_>,
    backend_bot_id: &str,
    id: &str,
    lease_id: &str,
) -> Result<RejectReason, rusqlite::Error> {
    let row: Option<(String, Option<String>)> = tx
        .query_row(
            "SELECT state, lease_id FROM deliveries WHERE id = ?1 AND backend_bot_id = ?2",
            params![id, backend_bot_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    Ok(match row {
        None => RejectReason::Unknown,
        Some((state, current_lease)) => match state.as_str() {
            "acked" => RejectReason::AlreadyAcked,
            "pending" => RejectReason::NotLeased,
            _ if current_lease.as_deref() == Some(lease_id) => RejectReason::LeaseExpired,
            _ => RejectReason::LeaseMismatch,
        },
    })
}

/// Return every lease with `lease_expires_at < now` to `pending`.
///
/// Clears the lease fields and increments the attempt counter by one.
/// Returns how many deliveries were reclaimed.
pub async fn reap_expired(db: &Database, now: DateTime<Utc>) -> Result<u64, RelayError> {
    db.connection()
        .call(move |conn| -> Result<u64, rusqlite::Error> {
            let stamp = format_ts(now);
            let changed = conn.execute(
                "UPDATE deliveries
                 SET state = 'pending', lease_id = NULL, lease_expires_at = NULL,
                     attempts = attempts + 1, last_error = 'lease expired', updated_at = ?1
                 WHERE state = 'leased' AND lease_expires_at < ?1",
                params![stamp],
            )?;
            Ok(changed as u64)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Fetch a delivery by id.
pub async fn get_delivery(db: &Database, id: &str) -> Result<Option<Delivery>, RelayError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Delivery>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {DELIVERY_COLUMNS} FROM deliveries d WHERE d.id = ?1"),
                params![id],
                delivery_from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// All deliveries of one message, in creation order.
pub async fn deliveries_for_message(
    db: &Database,
    message_id: &str,
) -> Result<Vec<Delivery>, RelayError> {
    let message_id = message_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<Delivery>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {DELIVERY_COLUMNS} FROM deliveries d
                 WHERE d.message_id = ?1 ORDER BY d.created_at ASC, d.rowid ASC"
            ))?;
            let rows = stmt.query_map(params![message_id], delivery_from_row)?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

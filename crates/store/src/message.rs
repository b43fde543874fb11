/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_postgres::{GenericClient, Row};

use crate::into_error;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageRecord {
    pub id: i64,
    pub vaultbox_id: i64,
    pub from_domain: String,
    pub to_alias: String,
    pub size_bytes: i64,
    pub received_at: DateTime<Utc>,
    pub storage: MessageStorage,
}

/// Where and how the ciphertext was stored. `recipients` holds the SHA-256
/// certificate fingerprints in the order they were fed to the encryptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageStorage {
    pub maildir_path: String,
    pub bytes: u64,
    pub alg: String,
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: i64,
    pub vaultbox_id: i64,
    pub from_domain: String,
    pub to_alias: String,
    pub size_bytes: i64,
    pub storage: MessageStorage,
}

impl MessageRecord {
    fn from_row(row: &Row) -> trc::Result<Self> {
        let storage: serde_json::Value = row.try_get("storage").map_err(into_error)?;
        Ok(MessageRecord {
            id: row.try_get("id").map_err(into_error)?,
            vaultbox_id: row.try_get("vaultbox_id").map_err(into_error)?,
            from_domain: row.try_get("from_domain").map_err(into_error)?,
            to_alias: row.try_get("to_alias").map_err(into_error)?,
            size_bytes: row.try_get("size_bytes").map_err(into_error)?,
            received_at: row.try_get("received_at").map_err(into_error)?,
            storage: serde_json::from_value(storage).map_err(|err| {
                trc::EventType::Store(trc::StoreEvent::DataCorruption).reason(err)
            })?,
        })
    }
}

const COLUMNS: &str = "id, vaultbox_id, from_domain, to_alias, size_bytes, received_at, storage";

pub async fn insert(client: &impl GenericClient, message: &NewMessage) -> trc::Result<MessageRecord> {
    let storage = serde_json::to_value(&message.storage).map_err(|err| {
        trc::EventType::Store(trc::StoreEvent::IngestError).reason(err)
    })?;
    let row = client
        .query_one(
            &format!(
                "INSERT INTO messages (id, vaultbox_id, from_domain, to_alias, size_bytes, storage) \
                 VALUES ($1, $2, $3, $4, $5, $6) RETURNING {COLUMNS}"
            ),
            &[
                &message.id,
                &message.vaultbox_id,
                &message.from_domain,
                &message.to_alias,
                &message.size_bytes,
                &storage,
            ],
        )
        .await
        .map_err(into_error)?;
    MessageRecord::from_row(&row)
}

/// Reconciliation dedup key is `(vaultbox_id, maildir_path)`.
pub async fn exists_by_path(
    client: &impl GenericClient,
    vaultbox_id: i64,
    maildir_path: &str,
) -> trc::Result<bool> {
    client
        .query_opt(
            "SELECT 1 FROM messages WHERE vaultbox_id = $1 AND storage ->> 'maildir_path' = $2",
            &[&vaultbox_id, &maildir_path],
        )
        .await
        .map_err(into_error)
        .map(|row| row.is_some())
}

pub async fn find_by_vaultbox(
    client: &impl GenericClient,
    vaultbox_id: i64,
    limit: i64,
) -> trc::Result<Vec<MessageRecord>> {
    client
        .query(
            &format!(
                "SELECT {COLUMNS} FROM messages WHERE vaultbox_id = $1 \
                 ORDER BY received_at DESC, id DESC LIMIT $2"
            ),
            &[&vaultbox_id, &limit],
        )
        .await
        .map_err(into_error)?
        .iter()
        .map(MessageRecord::from_row)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageRow {
    pub vaultbox_id: i64,
    pub message_count: i64,
    pub total_bytes: i64,
}

pub async fn usage_by_owner(
    client: &impl GenericClient,
    owner_user_id: &str,
) -> trc::Result<Vec<UsageRow>> {
    client
        .query(
            "SELECT v.id, COUNT(m.id), COALESCE(SUM(m.size_bytes), 0)::BIGINT \
             FROM vaultboxes v LEFT JOIN messages m ON m.vaultbox_id = v.id \
             WHERE v.owner_user_id = $1 GROUP BY v.id ORDER BY v.id",
            &[&owner_user_id],
        )
        .await
        .map_err(into_error)?
        .iter()
        .map(|row| {
            Ok(UsageRow {
                vaultbox_id: row.try_get(0).map_err(into_error)?,
                message_count: row.try_get(1).map_err(into_error)?,
                total_bytes: row.try_get(2).map_err(into_error)?,
            })
        })
        .collect()
}

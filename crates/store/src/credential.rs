/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_postgres::{GenericClient, Row};
use trc::StoreEvent;

use crate::into_error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SecurityMode {
    #[serde(rename = "STARTTLS")]
    StartTls,
    #[serde(rename = "TLS")]
    Tls,
    #[serde(rename = "PLAIN")]
    Plain,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImapCredential {
    pub id: i64,
    pub owner_user_id: String,
    pub vaultbox_id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SmtpCredential {
    pub id: i64,
    pub vaultbox_id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub host: String,
    pub port: i32,
    pub security_mode: SecurityMode,
    pub enabled: bool,
    pub messages_sent_count: i64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl SecurityMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityMode::StartTls => "STARTTLS",
            SecurityMode::Tls => "TLS",
            SecurityMode::Plain => "PLAIN",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "STARTTLS" => Some(SecurityMode::StartTls),
            "TLS" => Some(SecurityMode::Tls),
            "PLAIN" => Some(SecurityMode::Plain),
            _ => None,
        }
    }
}

impl ImapCredential {
    fn from_row(row: &Row) -> trc::Result<Self> {
        Ok(ImapCredential {
            id: row.try_get("id").map_err(into_error)?,
            owner_user_id: row.try_get("owner_user_id").map_err(into_error)?,
            vaultbox_id: row.try_get("vaultbox_id").map_err(into_error)?,
            username: row.try_get("username").map_err(into_error)?,
            password_hash: row.try_get("password_hash").map_err(into_error)?,
            revoked_at: row.try_get("revoked_at").map_err(into_error)?,
            created_at: row.try_get("created_at").map_err(into_error)?,
        })
    }
}

impl SmtpCredential {
    fn from_row(row: &Row) -> trc::Result<Self> {
        let security_mode: String = row.try_get("security_mode").map_err(into_error)?;
        Ok(SmtpCredential {
            id: row.try_get("id").map_err(into_error)?,
            vaultbox_id: row.try_get("vaultbox_id").map_err(into_error)?,
            username: row.try_get("username").map_err(into_error)?,
            password_hash: row.try_get("password_hash").map_err(into_error)?,
            host: row.try_get("host").map_err(into_error)?,
            port: row.try_get("port").map_err(into_error)?,
            security_mode: SecurityMode::parse(&security_mode).ok_or_else(|| {
                trc::EventType::Store(StoreEvent::DataCorruption)
                    .ctx(trc::Key::Value, security_mode.clone())
            })?,
            enabled: row.try_get("enabled").map_err(into_error)?,
            messages_sent_count: row.try_get("messages_sent_count").map_err(into_error)?,
            last_used_at: row.try_get("last_used_at").map_err(into_error)?,
            created_at: row.try_get("created_at").map_err(into_error)?,
        })
    }
}

const IMAP_COLUMNS: &str =
    "id, owner_user_id, vaultbox_id, username, password_hash, revoked_at, created_at";
const SMTP_COLUMNS: &str = "id, vaultbox_id, username, password_hash, host, port, \
                            security_mode, enabled, messages_sent_count, last_used_at, created_at";

/// The unified username for a vaultbox, regardless of which channel was
/// issued first. One query; the caller decides with one conditional.
pub async fn unified_username(
    client: &impl GenericClient,
    vaultbox_id: i64,
) -> trc::Result<Option<String>> {
    client
        .query_opt(
            "SELECT username::TEXT FROM imap_credentials \
             WHERE vaultbox_id = $1 AND revoked_at IS NULL \
             UNION \
             SELECT username::TEXT FROM smtp_credentials WHERE vaultbox_id = $1 \
             LIMIT 1",
            &[&vaultbox_id],
        )
        .await
        .map_err(into_error)?
        .map(|row| row.try_get(0).map_err(into_error))
        .transpose()
}

pub async fn insert_imap(
    client: &impl GenericClient,
    id: i64,
    owner_user_id: &str,
    vaultbox_id: i64,
    username: &str,
    password_hash: &str,
) -> trc::Result<ImapCredential> {
    let row = client
        .query_one(
            &format!(
                "INSERT INTO imap_credentials \
                 (id, owner_user_id, vaultbox_id, username, password_hash) \
                 VALUES ($1, $2, $3, $4, $5) RETURNING {IMAP_COLUMNS}"
            ),
            &[&id, &owner_user_id, &vaultbox_id, &username, &password_hash],
        )
        .await
        .map_err(into_error)?;
    ImapCredential::from_row(&row)
}

pub async fn imap_by_vaultbox(
    client: &impl GenericClient,
    vaultbox_id: i64,
) -> trc::Result<Option<ImapCredential>> {
    client
        .query_opt(
            &format!(
                "SELECT {IMAP_COLUMNS} FROM imap_credentials \
                 WHERE vaultbox_id = $1 AND revoked_at IS NULL"
            ),
            &[&vaultbox_id],
        )
        .await
        .map_err(into_error)?
        .map(|row| ImapCredential::from_row(&row))
        .transpose()
}

pub async fn imap_by_username(
    client: &impl GenericClient,
    username: &str,
) -> trc::Result<Option<ImapCredential>> {
    client
        .query_opt(
            &format!(
                "SELECT {IMAP_COLUMNS} FROM imap_credentials \
                 WHERE username = $1 AND revoked_at IS NULL"
            ),
            &[&username],
        )
        .await
        .map_err(into_error)?
        .map(|row| ImapCredential::from_row(&row))
        .transpose()
}

pub async fn update_imap_password(
    client: &impl GenericClient,
    vaultbox_id: i64,
    password_hash: &str,
) -> trc::Result<bool> {
    client
        .execute(
            "UPDATE imap_credentials SET password_hash = $2 \
             WHERE vaultbox_id = $1 AND revoked_at IS NULL",
            &[&vaultbox_id, &password_hash],
        )
        .await
        .map_err(into_error)
        .map(|rows| rows == 1)
}

pub async fn revoke_imap(client: &impl GenericClient, vaultbox_id: i64) -> trc::Result<bool> {
    client
        .execute(
            "UPDATE imap_credentials SET revoked_at = NOW() \
             WHERE vaultbox_id = $1 AND revoked_at IS NULL",
            &[&vaultbox_id],
        )
        .await
        .map_err(into_error)
        .map(|rows| rows > 0)
}

#[allow(clippy::too_many_arguments)]
pub async fn insert_smtp(
    client: &impl GenericClient,
    id: i64,
    vaultbox_id: i64,
    username: &str,
    password_hash: &str,
    host: &str,
    port: i32,
    security_mode: SecurityMode,
) -> trc::Result<SmtpCredential> {
    let row = client
        .query_one(
            &format!(
                "INSERT INTO smtp_credentials \
                 (id, vaultbox_id, username, password_hash, host, port, security_mode) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {SMTP_COLUMNS}"
            ),
            &[
                &id,
                &vaultbox_id,
                &username,
                &password_hash,
                &host,
                &port,
                &security_mode.as_str(),
            ],
        )
        .await
        .map_err(into_error)?;
    SmtpCredential::from_row(&row)
}

pub async fn smtp_by_vaultbox(
    client: &impl GenericClient,
    vaultbox_id: i64,
) -> trc::Result<Option<SmtpCredential>> {
    client
        .query_opt(
            &format!("SELECT {SMTP_COLUMNS} FROM smtp_credentials WHERE vaultbox_id = $1"),
            &[&vaultbox_id],
        )
        .await
        .map_err(into_error)?
        .map(|row| SmtpCredential::from_row(&row))
        .transpose()
}

pub async fn smtp_by_username(
    client: &impl GenericClient,
    username: &str,
) -> trc::Result<Option<SmtpCredential>> {
    client
        .query_opt(
            &format!("SELECT {SMTP_COLUMNS} FROM smtp_credentials WHERE username = $1"),
            &[&username],
        )
        .await
        .map_err(into_error)?
        .map(|row| SmtpCredential::from_row(&row))
        .transpose()
}

pub async fn update_smtp_password(
    client: &impl GenericClient,
    vaultbox_id: i64,
    password_hash: &str,
) -> trc::Result<bool> {
    client
        .execute(
            "UPDATE smtp_credentials SET password_hash = $2 WHERE vaultbox_id = $1",
            &[&vaultbox_id, &password_hash],
        )
        .await
        .map_err(into_error)
        .map(|rows| rows == 1)
}

pub async fn delete_smtp(client: &impl GenericClient, vaultbox_id: i64) -> trc::Result<bool> {
    client
        .execute(
            "DELETE FROM smtp_credentials WHERE vaultbox_id = $1",
            &[&vaultbox_id],
        )
        .await
        .map_err(into_error)
        .map(|rows| rows > 0)
}

pub async fn touch_smtp(client: &impl GenericClient, id: i64) -> trc::Result<()> {
    client
        .execute(
            "UPDATE smtp_credentials SET last_used_at = NOW(), \
             messages_sent_count = messages_sent_count + 1 WHERE id = $1",
            &[&id],
        )
        .await
        .map_err(into_error)
        .map(|_| ())
}

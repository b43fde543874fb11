/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_postgres::{GenericClient, Row};
use trc::StoreEvent;

use crate::{
    into_error,
    query::{build_where, Filter},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MailboxType {
    Encrypted,
    Simple,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VaultboxStatus {
    Active,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Vaultbox {
    pub id: i64,
    pub owner_user_id: String,
    pub domain: String,
    pub display_name: String,
    pub alias: Option<String>,
    pub mailbox_type: MailboxType,
    pub status: VaultboxStatus,
    pub smtp_enabled: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewVaultbox {
    pub id: i64,
    pub owner_user_id: String,
    pub domain: String,
    pub display_name: String,
    pub alias: Option<String>,
    pub mailbox_type: MailboxType,
    pub smtp_enabled: bool,
}

impl MailboxType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MailboxType::Encrypted => "encrypted",
            MailboxType::Simple => "simple",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "encrypted" => Some(MailboxType::Encrypted),
            "simple" => Some(MailboxType::Simple),
            _ => None,
        }
    }
}

impl VaultboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VaultboxStatus::Active => "active",
            VaultboxStatus::Disabled => "disabled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(VaultboxStatus::Active),
            "disabled" => Some(VaultboxStatus::Disabled),
            _ => None,
        }
    }
}

impl Vaultbox {
    /// The primary routed address, when the vaultbox has an alias.
    pub fn primary_address(&self) -> Option<String> {
        self.alias
            .as_ref()
            .map(|alias| format!("{}@{}", alias, self.domain))
    }

    pub(crate) fn from_row(row: &Row) -> trc::Result<Self> {
        let mailbox_type: String = row.try_get("mailbox_type").map_err(into_error)?;
        let status: String = row.try_get("status").map_err(into_error)?;
        Ok(Vaultbox {
            id: row.try_get("id").map_err(into_error)?,
            owner_user_id: row.try_get("owner_user_id").map_err(into_error)?,
            domain: row.try_get("domain").map_err(into_error)?,
            display_name: row.try_get("display_name").map_err(into_error)?,
            alias: row.try_get("alias").map_err(into_error)?,
            mailbox_type: MailboxType::parse(&mailbox_type).ok_or_else(|| {
                trc::EventType::Store(StoreEvent::DataCorruption)
                    .ctx(trc::Key::Value, mailbox_type.clone())
            })?,
            status: VaultboxStatus::parse(&status).ok_or_else(|| {
                trc::EventType::Store(StoreEvent::DataCorruption).ctx(trc::Key::Value, status)
            })?,
            smtp_enabled: row.try_get("smtp_enabled").map_err(into_error)?,
            created_at: row.try_get("created_at").map_err(into_error)?,
        })
    }
}

const COLUMNS: &str =
    "id, owner_user_id, domain, display_name, alias, mailbox_type, status, smtp_enabled, created_at";

pub async fn insert(client: &impl GenericClient, vaultbox: &NewVaultbox) -> trc::Result<Vaultbox> {
    let row = client
        .query_one(
            &format!(
                "INSERT INTO vaultboxes \
                 (id, owner_user_id, domain, display_name, alias, mailbox_type, smtp_enabled) \
                 VALUES ($1, $2, LOWER($3), $4, $5, $6, $7) RETURNING {COLUMNS}"
            ),
            &[
                &vaultbox.id,
                &vaultbox.owner_user_id,
                &vaultbox.domain,
                &vaultbox.display_name,
                &vaultbox.alias,
                &vaultbox.mailbox_type.as_str(),
                &vaultbox.smtp_enabled,
            ],
        )
        .await
        .map_err(into_error)?;
    Vaultbox::from_row(&row)
}

pub async fn find_by_id(client: &impl GenericClient, id: i64) -> trc::Result<Option<Vaultbox>> {
    client
        .query_opt(
            &format!("SELECT {COLUMNS} FROM vaultboxes WHERE id = $1"),
            &[&id],
        )
        .await
        .map_err(into_error)?
        .map(|row| Vaultbox::from_row(&row))
        .transpose()
}

pub async fn find_by_address(
    client: &impl GenericClient,
    domain: &str,
    alias: &str,
) -> trc::Result<Option<Vaultbox>> {
    client
        .query_opt(
            &format!("SELECT {COLUMNS} FROM vaultboxes WHERE domain = $1 AND alias = $2"),
            &[&domain, &alias],
        )
        .await
        .map_err(into_error)?
        .map(|row| Vaultbox::from_row(&row))
        .transpose()
}

pub async fn find(
    client: &impl GenericClient,
    filters: impl IntoIterator<Item = Filter>,
) -> trc::Result<Vec<Vaultbox>> {
    let clause = build_where(filters);
    client
        .query(
            &format!(
                "SELECT {COLUMNS} FROM vaultboxes{} ORDER BY created_at ASC, id ASC",
                clause.sql
            ),
            &clause.as_params(),
        )
        .await
        .map_err(into_error)?
        .iter()
        .map(Vaultbox::from_row)
        .collect()
}

pub async fn find_by_owner(
    client: &impl GenericClient,
    owner_user_id: &str,
) -> trc::Result<Vec<Vaultbox>> {
    find(
        client,
        [Filter::Eq("owner_user_id", owner_user_id.into())],
    )
    .await
}

pub async fn find_simple_by_domain(
    client: &impl GenericClient,
    domain: &str,
) -> trc::Result<Vec<Vaultbox>> {
    find(
        client,
        [
            Filter::Eq("domain", domain.into()),
            Filter::Eq("mailbox_type", "simple".into()),
        ],
    )
    .await
}

pub async fn count(
    client: &impl GenericClient,
    filters: impl IntoIterator<Item = Filter>,
) -> trc::Result<u64> {
    let clause = build_where(filters);
    let row = client
        .query_one(
            &format!("SELECT COUNT(*) FROM vaultboxes{}", clause.sql),
            &clause.as_params(),
        )
        .await
        .map_err(into_error)?;
    row.try_get::<_, i64>(0).map(|n| n as u64).map_err(into_error)
}

pub async fn update_status(
    client: &impl GenericClient,
    id: i64,
    status: VaultboxStatus,
) -> trc::Result<bool> {
    client
        .execute(
            "UPDATE vaultboxes SET status = $2 WHERE id = $1",
            &[&id, &status.as_str()],
        )
        .await
        .map_err(into_error)
        .map(|rows| rows == 1)
}

/// Deletes the vaultbox row; certificates, credentials, messages, aliases,
/// catch-all bindings and route audit rows follow via `ON DELETE CASCADE`.
pub async fn delete(client: &impl GenericClient, id: i64) -> trc::Result<bool> {
    client
        .execute("DELETE FROM vaultboxes WHERE id = $1", &[&id])
        .await
        .map_err(into_error)
        .map(|rows| rows == 1)
}

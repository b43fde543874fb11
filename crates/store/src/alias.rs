/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_postgres::{GenericClient, Row};

use crate::into_error;

pub const MAX_ACTIVE_ALIASES: u64 = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alias {
    pub id: i64,
    pub vaultbox_id: i64,
    pub alias_email: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Alias {
    fn from_row(row: &Row) -> trc::Result<Self> {
        Ok(Alias {
            id: row.try_get("id").map_err(into_error)?,
            vaultbox_id: row.try_get("vaultbox_id").map_err(into_error)?,
            alias_email: row.try_get("alias_email").map_err(into_error)?,
            active: row.try_get("active").map_err(into_error)?,
            created_at: row.try_get("created_at").map_err(into_error)?,
        })
    }
}

const COLUMNS: &str = "id, vaultbox_id, alias_email, active, created_at";

pub async fn insert(
    client: &impl GenericClient,
    id: i64,
    vaultbox_id: i64,
    alias_email: &str,
) -> trc::Result<Alias> {
    let row = client
        .query_one(
            &format!(
                "INSERT INTO aliases (id, vaultbox_id, alias_email) \
                 VALUES ($1, $2, LOWER($3)) RETURNING {COLUMNS}"
            ),
            &[&id, &vaultbox_id, &alias_email],
        )
        .await
        .map_err(into_error)?;
    Alias::from_row(&row)
}

pub async fn find_by_vaultbox(
    client: &impl GenericClient,
    vaultbox_id: i64,
) -> trc::Result<Vec<Alias>> {
    client
        .query(
            &format!(
                "SELECT {COLUMNS} FROM aliases WHERE vaultbox_id = $1 \
                 ORDER BY created_at ASC, id ASC"
            ),
            &[&vaultbox_id],
        )
        .await
        .map_err(into_error)?
        .iter()
        .map(Alias::from_row)
        .collect()
}

pub async fn find_by_email(
    client: &impl GenericClient,
    alias_email: &str,
) -> trc::Result<Option<Alias>> {
    client
        .query_opt(
            &format!("SELECT {COLUMNS} FROM aliases WHERE alias_email = $1"),
            &[&alias_email],
        )
        .await
        .map_err(into_error)?
        .map(|row| Alias::from_row(&row))
        .transpose()
}

pub async fn count_active(client: &impl GenericClient, vaultbox_id: i64) -> trc::Result<u64> {
    client
        .query_one(
            "SELECT COUNT(*) FROM aliases WHERE vaultbox_id = $1 AND active",
            &[&vaultbox_id],
        )
        .await
        .map_err(into_error)?
        .try_get::<_, i64>(0)
        .map(|n| n as u64)
        .map_err(into_error)
}

pub async fn find_by_domain(client: &impl GenericClient, domain: &str) -> trc::Result<Vec<Alias>> {
    client
        .query(
            &format!("SELECT {COLUMNS} FROM aliases WHERE alias_email LIKE $1"),
            &[&format!("%@{}", domain.to_lowercase())],
        )
        .await
        .map_err(into_error)?
        .iter()
        .map(Alias::from_row)
        .collect()
}

/// Deletes one alias of the vaultbox, returning the removed row so the
/// caller can take down its route.
pub async fn delete(
    client: &impl GenericClient,
    id: i64,
    vaultbox_id: i64,
) -> trc::Result<Option<Alias>> {
    client
        .query_opt(
            &format!(
                "DELETE FROM aliases WHERE id = $1 AND vaultbox_id = $2 RETURNING {COLUMNS}"
            ),
            &[&id, &vaultbox_id],
        )
        .await
        .map_err(into_error)?
        .map(|row| Alias::from_row(&row))
        .transpose()
}

pub async fn delete_by_vaultbox(
    client: &impl GenericClient,
    vaultbox_id: i64,
) -> trc::Result<Vec<Alias>> {
    client
        .query(
            &format!("DELETE FROM aliases WHERE vaultbox_id = $1 RETURNING {COLUMNS}"),
            &[&vaultbox_id],
        )
        .await
        .map_err(into_error)?
        .iter()
        .map(Alias::from_row)
        .collect()
}

/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use serde::Serialize;
use tokio_postgres::{GenericClient, Row};

use crate::into_error;

/// Outbound-only credential from the legacy database. The schema is owned
/// by the legacy deployment; it is queried, never created or migrated here.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegacyCredential {
    pub id: i64,
    pub user_id: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub domain: String,
    pub enabled: bool,
    pub max_messages_per_day: Option<i32>,
}

impl LegacyCredential {
    fn from_row(row: &Row) -> trc::Result<Self> {
        Ok(LegacyCredential {
            id: row.try_get("id").map_err(into_error)?,
            user_id: row.try_get("user_id").map_err(into_error)?,
            username: row.try_get("username").map_err(into_error)?,
            password_hash: row.try_get("password_hash").map_err(into_error)?,
            domain: row.try_get("domain").map_err(into_error)?,
            enabled: row.try_get("enabled").map_err(into_error)?,
            max_messages_per_day: row.try_get("max_messages_per_day").map_err(into_error)?,
        })
    }
}

pub async fn find_by_username(
    client: &impl GenericClient,
    username: &str,
) -> trc::Result<Option<LegacyCredential>> {
    client
        .query_opt(
            "SELECT id, user_id, username, password_hash, domain, enabled, \
             max_messages_per_day FROM smtp_accounts WHERE username = $1 AND enabled",
            &[&username],
        )
        .await
        .map_err(into_error)?
        .map(|row| LegacyCredential::from_row(&row))
        .transpose()
}

pub async fn touch(client: &impl GenericClient, id: i64) -> trc::Result<()> {
    client
        .execute(
            "UPDATE smtp_accounts SET last_used_at = NOW() WHERE id = $1",
            &[&id],
        )
        .await
        .map_err(into_error)
        .map(|_| ())
}

pub async fn update_password_hash(
    client: &impl GenericClient,
    id: i64,
    password_hash: &str,
) -> trc::Result<bool> {
    client
        .execute(
            "UPDATE smtp_accounts SET password_hash = $2 WHERE id = $1",
            &[&id, &password_hash],
        )
        .await
        .map_err(into_error)
        .map(|rows| rows == 1)
}

/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_postgres::{GenericClient, Row};

use crate::into_error;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatchAllBinding {
    pub domain: String,
    pub vaultbox_id: i64,
    pub enabled: bool,
    pub updated_at: DateTime<Utc>,
}

impl CatchAllBinding {
    fn from_row(row: &Row) -> trc::Result<Self> {
        Ok(CatchAllBinding {
            domain: row.try_get("domain").map_err(into_error)?,
            vaultbox_id: row.try_get("vaultbox_id").map_err(into_error)?,
            enabled: row.try_get("enabled").map_err(into_error)?,
            updated_at: row.try_get("updated_at").map_err(into_error)?,
        })
    }
}

const COLUMNS: &str = "domain, vaultbox_id, enabled, updated_at";

pub async fn upsert(
    client: &impl GenericClient,
    domain: &str,
    vaultbox_id: i64,
    enabled: bool,
) -> trc::Result<CatchAllBinding> {
    let row = client
        .query_one(
            &format!(
                "INSERT INTO catchall_bindings (domain, vaultbox_id, enabled) \
                 VALUES (LOWER($1), $2, $3) \
                 ON CONFLICT (domain) DO UPDATE SET \
                 vaultbox_id = EXCLUDED.vaultbox_id, enabled = EXCLUDED.enabled, \
                 updated_at = NOW() RETURNING {COLUMNS}"
            ),
            &[&domain, &vaultbox_id, &enabled],
        )
        .await
        .map_err(into_error)?;
    CatchAllBinding::from_row(&row)
}

pub async fn find_by_domain(
    client: &impl GenericClient,
    domain: &str,
) -> trc::Result<Option<CatchAllBinding>> {
    client
        .query_opt(
            &format!("SELECT {COLUMNS} FROM catchall_bindings WHERE domain = $1"),
            &[&domain],
        )
        .await
        .map_err(into_error)?
        .map(|row| CatchAllBinding::from_row(&row))
        .transpose()
}

pub async fn find_by_vaultbox(
    client: &impl GenericClient,
    vaultbox_id: i64,
) -> trc::Result<Vec<CatchAllBinding>> {
    client
        .query(
            &format!("SELECT {COLUMNS} FROM catchall_bindings WHERE vaultbox_id = $1"),
            &[&vaultbox_id],
        )
        .await
        .map_err(into_error)?
        .iter()
        .map(CatchAllBinding::from_row)
        .collect()
}

pub async fn set_enabled(
    client: &impl GenericClient,
    domain: &str,
    enabled: bool,
) -> trc::Result<bool> {
    client
        .execute(
            "UPDATE catchall_bindings SET enabled = $2, updated_at = NOW() WHERE domain = $1",
            &[&domain, &enabled],
        )
        .await
        .map_err(into_error)
        .map(|rows| rows == 1)
}

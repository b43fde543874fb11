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
#[serde(rename_all = "snake_case")]
pub enum RouteType {
    EncryptedImap,
    SimpleImap,
    Catchall,
}

/// Audit row mirroring a transport map change. The on-disk map is the
/// source of truth at delivery time; these rows exist for reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteAudit {
    pub id: i64,
    pub email_address: Option<String>,
    pub domain: Option<String>,
    pub vaultbox_id: i64,
    pub route_type: RouteType,
    pub priority: i32,
    pub active: bool,
    pub options: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRouteAudit {
    pub id: i64,
    pub email_address: Option<String>,
    pub domain: Option<String>,
    pub vaultbox_id: i64,
    pub route_type: RouteType,
    pub priority: i32,
    pub active: bool,
    pub options: serde_json::Value,
}

impl RouteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteType::EncryptedImap => "encrypted_imap",
            RouteType::SimpleImap => "simple_imap",
            RouteType::Catchall => "catchall",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "encrypted_imap" => Some(RouteType::EncryptedImap),
            "simple_imap" => Some(RouteType::SimpleImap),
            "catchall" => Some(RouteType::Catchall),
            _ => None,
        }
    }
}

impl RouteAudit {
    fn from_row(row: &Row) -> trc::Result<Self> {
        let route_type: String = row.try_get("route_type").map_err(into_error)?;
        Ok(RouteAudit {
            id: row.try_get("id").map_err(into_error)?,
            email_address: row.try_get("email_address").map_err(into_error)?,
            domain: row.try_get("domain").map_err(into_error)?,
            vaultbox_id: row.try_get("vaultbox_id").map_err(into_error)?,
            route_type: RouteType::parse(&route_type).ok_or_else(|| {
                trc::EventType::Store(StoreEvent::DataCorruption)
                    .ctx(trc::Key::Value, route_type.clone())
            })?,
            priority: row.try_get("priority").map_err(into_error)?,
            active: row.try_get("active").map_err(into_error)?,
            options: row.try_get("options").map_err(into_error)?,
            created_at: row.try_get("created_at").map_err(into_error)?,
            updated_at: row.try_get("updated_at").map_err(into_error)?,
        })
    }
}

const COLUMNS: &str = "id, email_address, domain, vaultbox_id, route_type, priority, active, \
                       options, created_at, updated_at";

pub async fn insert(client: &impl GenericClient, route: &NewRouteAudit) -> trc::Result<RouteAudit> {
    let row = client
        .query_one(
            &format!(
                "INSERT INTO routes \
                 (id, email_address, domain, vaultbox_id, route_type, priority, active, options) \
                 VALUES ($1, LOWER($2), LOWER($3), $4, $5, $6, $7, $8) RETURNING {COLUMNS}"
            ),
            &[
                &route.id,
                &route.email_address,
                &route.domain,
                &route.vaultbox_id,
                &route.route_type.as_str(),
                &route.priority,
                &route.active,
                &route.options,
            ],
        )
        .await
        .map_err(into_error)?;
    RouteAudit::from_row(&row)
}

pub async fn find_by_vaultbox(
    client: &impl GenericClient,
    vaultbox_id: i64,
) -> trc::Result<Vec<RouteAudit>> {
    client
        .query(
            &format!(
                "SELECT {COLUMNS} FROM routes WHERE vaultbox_id = $1 \
                 ORDER BY created_at ASC, id ASC"
            ),
            &[&vaultbox_id],
        )
        .await
        .map_err(into_error)?
        .iter()
        .map(RouteAudit::from_row)
        .collect()
}

pub async fn deactivate(
    client: &impl GenericClient,
    vaultbox_id: i64,
    email_address: Option<&str>,
) -> trc::Result<u64> {
    match email_address {
        Some(email_address) => client
            .execute(
                "UPDATE routes SET active = FALSE, updated_at = NOW() \
                 WHERE vaultbox_id = $1 AND email_address = $2",
                &[&vaultbox_id, &email_address],
            )
            .await
            .map_err(into_error),
        None => client
            .execute(
                "UPDATE routes SET active = FALSE, updated_at = NOW() WHERE vaultbox_id = $1",
                &[&vaultbox_id],
            )
            .await
            .map_err(into_error),
    }
}

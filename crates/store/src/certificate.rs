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
pub struct Certificate {
    pub id: i64,
    pub vaultbox_id: i64,
    pub label: Option<String>,
    pub public_cert_pem: String,
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCertificate {
    pub id: i64,
    pub vaultbox_id: i64,
    pub label: Option<String>,
    pub public_cert_pem: String,
    pub fingerprint: String,
}

impl Certificate {
    fn from_row(row: &Row) -> trc::Result<Self> {
        Ok(Certificate {
            id: row.try_get("id").map_err(into_error)?,
            vaultbox_id: row.try_get("vaultbox_id").map_err(into_error)?,
            label: row.try_get("label").map_err(into_error)?,
            public_cert_pem: row.try_get("public_cert_pem").map_err(into_error)?,
            fingerprint: row.try_get("fingerprint").map_err(into_error)?,
            created_at: row.try_get("created_at").map_err(into_error)?,
        })
    }
}

const COLUMNS: &str = "id, vaultbox_id, label, public_cert_pem, fingerprint, created_at";

pub async fn insert(
    client: &impl GenericClient,
    certificate: &NewCertificate,
) -> trc::Result<Certificate> {
    let row = client
        .query_one(
            &format!(
                "INSERT INTO certificates (id, vaultbox_id, label, public_cert_pem, fingerprint) \
                 VALUES ($1, $2, $3, $4, $5) RETURNING {COLUMNS}"
            ),
            &[
                &certificate.id,
                &certificate.vaultbox_id,
                &certificate.label,
                &certificate.public_cert_pem,
                &certificate.fingerprint,
            ],
        )
        .await
        .map_err(into_error)?;
    Certificate::from_row(&row)
}

/// Certificates in `created_at` ascending order; the encryption recipient
/// list and the stored fingerprint list both follow this order.
pub async fn find_by_vaultbox(
    client: &impl GenericClient,
    vaultbox_id: i64,
) -> trc::Result<Vec<Certificate>> {
    client
        .query(
            &format!(
                "SELECT {COLUMNS} FROM certificates WHERE vaultbox_id = $1 \
                 ORDER BY created_at ASC, id ASC"
            ),
            &[&vaultbox_id],
        )
        .await
        .map_err(into_error)?
        .iter()
        .map(Certificate::from_row)
        .collect()
}

pub async fn count_by_vaultbox(client: &impl GenericClient, vaultbox_id: i64) -> trc::Result<u64> {
    client
        .query_one(
            "SELECT COUNT(*) FROM certificates WHERE vaultbox_id = $1",
            &[&vaultbox_id],
        )
        .await
        .map_err(into_error)?
        .try_get::<_, i64>(0)
        .map(|n| n as u64)
        .map_err(into_error)
}

pub async fn delete(
    client: &impl GenericClient,
    id: i64,
    vaultbox_id: i64,
) -> trc::Result<bool> {
    client
        .execute(
            "DELETE FROM certificates WHERE id = $1 AND vaultbox_id = $2",
            &[&id, &vaultbox_id],
        )
        .await
        .map_err(into_error)
        .map(|rows| rows == 1)
}

/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::future::Future;

use common::Server;
use serde::Serialize;
use trc::AddContext;

use super::validate_domain;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimpleDomainStatus {
    pub domain: String,
    #[serde(rename = "simpleCount")]
    pub simple_count: u64,
    #[serde(rename = "catchallEnabled")]
    pub catchall_enabled: bool,
    #[serde(rename = "conversionEligible")]
    pub conversion_eligible: bool,
    #[serde(rename = "eligibleVaultboxId")]
    pub eligible_vaultbox_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VaultboxUsage {
    pub vaultbox_id: String,
    pub message_count: i64,
    pub total_bytes: i64,
}

pub trait StatusOps: Sync + Send {
    fn simple_domain_status(
        &self,
        domain: &str,
    ) -> impl Future<Output = trc::Result<SimpleDomainStatus>> + Send;

    fn usage_for_owner(
        &self,
        owner_user_id: &str,
    ) -> impl Future<Output = trc::Result<Vec<VaultboxUsage>>> + Send;
}

impl StatusOps for Server {
    async fn simple_domain_status(&self, domain: &str) -> trc::Result<SimpleDomainStatus> {
        let domain = validate_domain(domain)?;
        let client = self.core.storage.client().await.caused_by(trc::location!())?;
        let simple = store::vaultbox::find_simple_by_domain(&**client, &domain)
            .await
            .caused_by(trc::location!())?;
        let catchall_enabled = store::catchall::find_by_domain(&**client, &domain)
            .await
            .caused_by(trc::location!())?
            .is_some_and(|binding| binding.enabled);

        let conversion_eligible = simple.len() == 1 && !catchall_enabled;
        Ok(SimpleDomainStatus {
            domain,
            simple_count: simple.len() as u64,
            catchall_enabled,
            conversion_eligible,
            eligible_vaultbox_id: if conversion_eligible {
                simple.first().map(|vaultbox| vaultbox.id.to_string())
            } else {
                None
            },
        })
    }

    async fn usage_for_owner(&self, owner_user_id: &str) -> trc::Result<Vec<VaultboxUsage>> {
        let client = self.core.storage.client().await.caused_by(trc::location!())?;
        Ok(store::message::usage_by_owner(&**client, owner_user_id)
            .await
            .caused_by(trc::location!())?
            .into_iter()
            .map(|row| VaultboxUsage {
                vaultbox_id: row.vaultbox_id.to_string(),
                message_count: row.message_count,
                total_bytes: row.total_bytes,
            })
            .collect())
    }
}

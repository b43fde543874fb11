/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::future::Future;

use common::Server;
use trc::{AddContext, EventBuilder, ManageEvent};

use super::validate_domain;

pub trait CatchAllOps: Sync + Send {
    /// Turns the single simple mailbox of `domain` into its catch-all.
    /// Existing aliases block the switch unless `force` removes them and
    /// their routes first.
    fn enable_catchall(
        &self,
        domain: &str,
        vaultbox_id: i64,
        force: bool,
    ) -> impl Future<Output = trc::Result<()>> + Send;

    fn disable_catchall(
        &self,
        domain: &str,
        vaultbox_id: i64,
    ) -> impl Future<Output = trc::Result<()>> + Send;
}

impl CatchAllOps for Server {
    async fn enable_catchall(&self, domain: &str, vaultbox_id: i64, force: bool) -> trc::Result<()> {
        let domain = validate_domain(domain)?;

        let client = self.core.storage.client().await.caused_by(trc::location!())?;
        let simple = store::vaultbox::find_simple_by_domain(&**client, &domain)
            .await
            .caused_by(trc::location!())?;
        let vaultbox = match simple.as_slice() {
            [vaultbox] if vaultbox.id == vaultbox_id => vaultbox.clone(),
            [vaultbox] => {
                return Err(trc::EventType::Manage(ManageEvent::CatchAllConflict)
                    .details("vaultbox is not the simple mailbox of this domain")
                    .ctx(trc::Key::VaultboxId, vaultbox.id as u64))
            }
            [] => return Err(trc::EventType::Manage(ManageEvent::NotFound).into_err()),
            _ => {
                return Err(trc::EventType::Manage(ManageEvent::CatchAllConflict)
                    .details("domain has more than one simple mailbox")
                    .ctx(trc::Key::Total, simple.len()))
            }
        };

        let aliases = store::alias::find_by_vaultbox(&**client, vaultbox.id)
            .await
            .caused_by(trc::location!())?;
        if !aliases.is_empty() && !force {
            return Err(trc::EventType::Manage(ManageEvent::AliasPresent)
                .details("force required to drop existing aliases")
                .ctx(trc::Key::Total, aliases.len()));
        }

        // The rewrite target: the primary address when the mailbox has an
        // alias, otherwise the unified username.
        let target = match vaultbox.primary_address() {
            Some(address) => address,
            None => store::credential::unified_username(&**client, vaultbox.id)
                .await
                .caused_by(trc::location!())?
                .ok_or_else(|| {
                    trc::EventType::Manage(ManageEvent::InvalidParameter)
                        .details("create IMAP credentials before enabling catch-all")
                })?,
        };
        drop(client);

        if force {
            for alias in &aliases {
                self.core
                    .router
                    .remove_email_route(&alias.alias_email, Some(vaultbox.id))
                    .await
                    .caused_by(trc::location!())?;
            }
            let client = self.core.storage.client().await.caused_by(trc::location!())?;
            store::alias::delete_by_vaultbox(&**client, vaultbox.id)
                .await
                .caused_by(trc::location!())?;
        }

        let client = self.core.storage.client().await.caused_by(trc::location!())?;
        store::catchall::upsert(&**client, &domain, vaultbox.id, true)
            .await
            .caused_by(trc::location!())?;
        drop(client);

        self.core
            .router
            .add_catchall_route(&domain, &target, vaultbox.id)
            .await
            .caused_by(trc::location!())?;

        Ok(())
    }

    async fn disable_catchall(&self, domain: &str, vaultbox_id: i64) -> trc::Result<()> {
        let domain = validate_domain(domain)?;

        let client = self.core.storage.client().await.caused_by(trc::location!())?;
        let binding = store::catchall::find_by_domain(&**client, &domain)
            .await
            .caused_by(trc::location!())?
            .ok_or_else(|| trc::EventType::Manage(ManageEvent::NotFound).into_err())?;
        if binding.vaultbox_id != vaultbox_id {
            return Err(trc::EventType::Manage(ManageEvent::CatchAllConflict)
                .details("catch-all is bound to a different vaultbox"));
        }
        store::catchall::set_enabled(&**client, &domain, false)
            .await
            .caused_by(trc::location!())?;
        drop(client);

        self.core
            .router
            .remove_catchall_route(&domain)
            .await
            .caused_by(trc::location!())?;
        Ok(())
    }
}

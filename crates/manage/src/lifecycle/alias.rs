/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::future::Future;

use common::Server;
use router::RouteTarget;
use store::{
    alias::{Alias, MAX_ACTIVE_ALIASES},
    vaultbox::{MailboxType, Vaultbox},
    IsConstraintViolation,
};
use trc::{AddContext, EventBuilder, ManageEvent};
use utils::DomainPart;

use super::validate_local_part;

pub trait AliasOps: Sync + Send {
    fn list_aliases(
        &self,
        vaultbox_id: i64,
    ) -> impl Future<Output = trc::Result<Vec<Alias>>> + Send;

    fn create_alias(
        &self,
        vaultbox: &Vaultbox,
        alias_email: &str,
    ) -> impl Future<Output = trc::Result<Alias>> + Send;

    fn delete_alias(
        &self,
        vaultbox: &Vaultbox,
        alias_id: i64,
    ) -> impl Future<Output = trc::Result<()>> + Send;
}

impl AliasOps for Server {
    async fn list_aliases(&self, vaultbox_id: i64) -> trc::Result<Vec<Alias>> {
        let client = self.core.storage.client().await.caused_by(trc::location!())?;
        store::alias::find_by_vaultbox(&**client, vaultbox_id)
            .await
            .caused_by(trc::location!())
    }

    async fn create_alias(&self, vaultbox: &Vaultbox, alias_email: &str) -> trc::Result<Alias> {
        if vaultbox.mailbox_type != MailboxType::Simple {
            return Err(unprocessable(
                trc::EventType::Manage(ManageEvent::InvalidParameter)
                    .details("aliases are available on simple mailboxes only"),
            ));
        }

        let alias_email = alias_email.trim().to_lowercase();
        let local = alias_email.local_part().to_string();
        let domain = alias_email.domain_part().to_string();
        if domain.is_empty() {
            return Err(unprocessable(
                trc::EventType::Manage(ManageEvent::InvalidParameter)
                    .details("alias must be a full address"),
            ));
        }
        validate_local_part(&local).map_err(unprocessable)?;
        if domain != vaultbox.domain.to_lowercase() {
            return Err(unprocessable(
                trc::EventType::Manage(ManageEvent::InvalidParameter)
                    .details("alias must use the mailbox domain")
                    .ctx(trc::Key::Domain, domain),
            ));
        }

        let client = self.core.storage.client().await.caused_by(trc::location!())?;

        let catchall = store::catchall::find_by_domain(&**client, &domain)
            .await
            .caused_by(trc::location!())?;
        if catchall.is_some_and(|binding| binding.enabled) {
            return Err(trc::EventType::Manage(ManageEvent::DomainCatchAll)
                .details("aliases cannot be added while catch-all is enabled")
                .ctx(trc::Key::Domain, domain));
        }

        if store::alias::count_active(&**client, vaultbox.id)
            .await
            .caused_by(trc::location!())?
            >= MAX_ACTIVE_ALIASES
        {
            return Err(trc::EventType::Manage(ManageEvent::AliasLimitReached)
                .ctx(trc::Key::Total, MAX_ACTIVE_ALIASES));
        }

        // Collisions with any primary address or another alias.
        if store::vaultbox::find_by_address(&**client, &domain, &local)
            .await
            .caused_by(trc::location!())?
            .is_some()
            || store::alias::find_by_email(&**client, &alias_email)
                .await
                .caused_by(trc::location!())?
                .is_some()
        {
            return Err(trc::EventType::Manage(ManageEvent::AliasConflict)
                .ctx(trc::Key::Alias, alias_email));
        }

        // The route target is the unified username; aliases need issued
        // credentials first.
        let username = match store::credential::imap_by_vaultbox(&**client, vaultbox.id)
            .await
            .caused_by(trc::location!())?
        {
            Some(credential) => credential.username,
            None => {
                return Err(unprocessable(
                    trc::EventType::Manage(ManageEvent::InvalidParameter)
                        .details("IMAP credentials must be created before aliases"),
                ))
            }
        };

        let alias = store::alias::insert(&**client, self.generate_id(), vaultbox.id, &alias_email)
            .await
            .add_context(|err| {
                if err.is_constraint_violation("aliases_email_key") {
                    trc::EventType::Manage(ManageEvent::AliasConflict)
                        .ctx(trc::Key::Alias, alias_email.clone())
                } else {
                    err
                }
            })?;
        drop(client);

        if let Err(err) = self
            .core
            .router
            .add_email_route(
                &alias.alias_email,
                vaultbox.id,
                RouteTarget::SimpleMaildir(username),
            )
            .await
        {
            // Roll the row back rather than leave an alias that never
            // receives mail.
            let cleanup = async {
                let client = self.core.storage.client().await?;
                store::alias::delete(&**client, alias.id, vaultbox.id).await
            }
            .await;
            if let Err(cleanup_err) = cleanup {
                trc::error!(cleanup_err.ctx(trc::Key::Alias, alias.alias_email.clone()));
                trc::event!(
                    Manage(Inconsistency),
                    VaultboxId = vaultbox.id as u64,
                    Alias = alias.alias_email.clone(),
                    Details = "alias row left without a route"
                );
            }
            return Err(err);
        }

        Ok(alias)
    }

    async fn delete_alias(&self, vaultbox: &Vaultbox, alias_id: i64) -> trc::Result<()> {
        let client = self.core.storage.client().await.caused_by(trc::location!())?;
        let aliases = store::alias::find_by_vaultbox(&**client, vaultbox.id)
            .await
            .caused_by(trc::location!())?;
        let alias = aliases
            .into_iter()
            .find(|alias| alias.id == alias_id)
            .ok_or_else(|| trc::EventType::Manage(ManageEvent::NotFound).into_err())?;
        drop(client);

        // Route removal is best effort; the row always goes.
        if let Err(err) = self
            .core
            .router
            .remove_email_route(&alias.alias_email, Some(vaultbox.id))
            .await
        {
            trc::error!(err.ctx(trc::Key::Alias, alias.alias_email.clone()));
        }

        let client = self.core.storage.client().await.caused_by(trc::location!())?;
        store::alias::delete(&**client, alias_id, vaultbox.id)
            .await
            .caused_by(trc::location!())?;
        Ok(())
    }
}

fn unprocessable(err: trc::Error) -> trc::Error {
    err.ctx(trc::Key::Status, 422u64)
}

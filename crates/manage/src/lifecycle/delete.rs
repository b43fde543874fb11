/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::future::Future;

use common::Server;
use intake::maildir::Maildir;
use store::vaultbox::{MailboxType, Vaultbox};
use trc::{AddContext, EventBuilder, ManageEvent};

pub trait VaultboxDelete: Sync + Send {
    /// Tears a vaultbox down: routes out of the map first, then the
    /// database row (credentials, certificates, messages, aliases and the
    /// catch-all binding cascade), then the Maildir trees and the passwd
    /// line. Partial failures are recorded, never swallowed.
    fn delete_vaultbox(&self, vaultbox: &Vaultbox) -> impl Future<Output = trc::Result<()>> + Send;
}

impl VaultboxDelete for Server {
    async fn delete_vaultbox(&self, vaultbox: &Vaultbox) -> trc::Result<()> {
        let client = self.core.storage.client().await.caused_by(trc::location!())?;
        let aliases = store::alias::find_by_vaultbox(&**client, vaultbox.id)
            .await
            .caused_by(trc::location!())?;
        let bindings = store::catchall::find_by_vaultbox(&**client, vaultbox.id)
            .await
            .caused_by(trc::location!())?;
        let username = store::credential::unified_username(&**client, vaultbox.id)
            .await
            .caused_by(trc::location!())?;
        drop(client);

        // Routes first so no further deliveries target a dying mailbox.
        let mut route_errors = 0u32;
        if let Some(address) = vaultbox.primary_address() {
            if let Err(err) = self
                .core
                .router
                .remove_email_route(&address, Some(vaultbox.id))
                .await
            {
                route_errors += 1;
                trc::error!(err.ctx(trc::Key::VaultboxId, vaultbox.id as u64));
            }
        }
        for alias in &aliases {
            if let Err(err) = self
                .core
                .router
                .remove_email_route(&alias.alias_email, Some(vaultbox.id))
                .await
            {
                route_errors += 1;
                trc::error!(err.ctx(trc::Key::Alias, alias.alias_email.clone()));
            }
        }
        for binding in &bindings {
            if let Err(err) = self.core.router.remove_catchall_route(&binding.domain).await {
                route_errors += 1;
                trc::error!(err.ctx(trc::Key::Domain, binding.domain.clone()));
            }
        }

        let client = self.core.storage.client().await.caused_by(trc::location!())?;
        if !store::vaultbox::delete(&**client, vaultbox.id)
            .await
            .caused_by(trc::location!())?
        {
            return Err(trc::EventType::Manage(ManageEvent::NotFound).into_err());
        }
        drop(client);

        // Credential file entry and auth cache.
        if let Some(username) = &username {
            if let Err(err) = self.core.directory.remove_passwd_for(username).await {
                trc::error!(err.ctx(trc::Key::Username, username.clone()));
            }
        }

        // Maildir trees: id-keyed always, username-keyed for simple.
        let mut paths = vec![self.core.settings.maildir_root.join(vaultbox.id.to_string())];
        if vaultbox.mailbox_type == MailboxType::Simple {
            if let Some(username) = &username {
                paths.push(self.core.settings.maildir_root.join(username));
            }
        }
        for path in paths {
            if let Err(err) = Maildir::remove_tree(&path) {
                trc::error!(trc::EventType::Manage(ManageEvent::Inconsistency)
                    .reason(err)
                    .ctx(trc::Key::Path, path.display().to_string())
                    .details("maildir removal failed"));
            }
        }

        if route_errors > 0 {
            trc::event!(
                Manage(Inconsistency),
                VaultboxId = vaultbox.id as u64,
                Total = route_errors,
                Details = "vaultbox deleted with stale transport entries"
            );
        }

        Ok(())
    }
}

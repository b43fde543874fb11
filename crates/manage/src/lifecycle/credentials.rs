/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::future::Future;

use common::Server;
use directory::IssuedCredential;
use intake::maildir::Maildir;
use router::RouteTarget;
use store::{
    credential::{SecurityMode, SmtpCredential},
    vaultbox::{MailboxType, Vaultbox},
};
use trc::AddContext;

pub trait CredentialOps: Sync + Send {
    /// Issues IMAP credentials. For simple mailboxes this is the moment
    /// the delivery route exists: the map target is the username.
    fn create_imap_credentials(
        &self,
        vaultbox: &Vaultbox,
    ) -> impl Future<Output = trc::Result<IssuedCredential>> + Send;

    fn regenerate_imap_credentials(
        &self,
        vaultbox: &Vaultbox,
    ) -> impl Future<Output = trc::Result<IssuedCredential>> + Send;

    fn delete_imap_credentials(
        &self,
        vaultbox: &Vaultbox,
    ) -> impl Future<Output = trc::Result<bool>> + Send;

    fn create_smtp_credentials(
        &self,
        vaultbox: &Vaultbox,
        host: Option<String>,
        port: Option<i32>,
        security_mode: Option<SecurityMode>,
    ) -> impl Future<Output = trc::Result<(SmtpCredential, String)>> + Send;

    fn regenerate_smtp_credentials(
        &self,
        vaultbox: &Vaultbox,
    ) -> impl Future<Output = trc::Result<(SmtpCredential, String)>> + Send;
}

impl CredentialOps for Server {
    async fn create_imap_credentials(
        &self,
        vaultbox: &Vaultbox,
    ) -> trc::Result<IssuedCredential> {
        let issued = self
            .core
            .directory
            .issue_imap(vaultbox)
            .await
            .caused_by(trc::location!())?;

        if vaultbox.mailbox_type == MailboxType::Simple {
            self.provision_simple_delivery(vaultbox, &issued.username)
                .await
                .caused_by(trc::location!())?;
        }

        Ok(issued)
    }

    async fn regenerate_imap_credentials(
        &self,
        vaultbox: &Vaultbox,
    ) -> trc::Result<IssuedCredential> {
        self.core.directory.regenerate_imap(vaultbox).await
    }

    async fn delete_imap_credentials(&self, vaultbox: &Vaultbox) -> trc::Result<bool> {
        match self
            .core
            .directory
            .revoke_imap(vaultbox.id)
            .await
            .caused_by(trc::location!())?
        {
            Some(username) => {
                // The username-keyed route dies with the credential.
                if vaultbox.mailbox_type == MailboxType::Simple {
                    if let Some(address) = vaultbox.primary_address() {
                        self.core
                            .router
                            .remove_email_route(&address, Some(vaultbox.id))
                            .await
                            .caused_by(trc::location!())?;
                    }
                    let _ = username;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn create_smtp_credentials(
        &self,
        vaultbox: &Vaultbox,
        host: Option<String>,
        port: Option<i32>,
        security_mode: Option<SecurityMode>,
    ) -> trc::Result<(SmtpCredential, String)> {
        self.core
            .directory
            .issue_smtp(vaultbox, host, port, security_mode)
            .await
    }

    async fn regenerate_smtp_credentials(
        &self,
        vaultbox: &Vaultbox,
    ) -> trc::Result<(SmtpCredential, String)> {
        self.core.directory.regenerate_smtp(vaultbox.id).await
    }
}

trait SimpleDelivery: Sync + Send {
    fn provision_simple_delivery(
        &self,
        vaultbox: &Vaultbox,
        username: &str,
    ) -> impl Future<Output = trc::Result<()>> + Send;
}

impl SimpleDelivery for Server {
    async fn provision_simple_delivery(
        &self,
        vaultbox: &Vaultbox,
        username: &str,
    ) -> trc::Result<()> {
        let settings = &self.core.settings;
        let maildir = Maildir::at(&settings.maildir_root.join(username));
        let uid = settings.maildir_uid;
        let gid = settings.maildir_gid;
        tokio::task::spawn_blocking(move || maildir.ensure(uid, gid))
            .await
            .map_err(|err| trc::EventType::Server(trc::ServerEvent::ThreadError).reason(err))?
            .caused_by(trc::location!())?;

        if let Some(address) = vaultbox.primary_address() {
            self.core
                .router
                .add_email_route(
                    &address,
                    vaultbox.id,
                    RouteTarget::SimpleMaildir(username.to_string()),
                )
                .await
                .caused_by(trc::location!())?;
        }

        // A deferred catch-all (simple mailbox without an alias) resolves
        // its rewrite target to the username now.
        let client = self.core.storage.client().await.caused_by(trc::location!())?;
        let binding = store::catchall::find_by_domain(&**client, &vaultbox.domain)
            .await
            .caused_by(trc::location!())?;
        drop(client);
        if let Some(binding) = binding {
            if binding.enabled && binding.vaultbox_id == vaultbox.id && vaultbox.alias.is_none() {
                self.core
                    .router
                    .add_catchall_route(&vaultbox.domain, username, vaultbox.id)
                    .await
                    .caused_by(trc::location!())?;
            }
        }

        Ok(())
    }
}

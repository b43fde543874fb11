/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::future::Future;

use common::Server;
use router::RouteTarget;
use store::{
    certificate::NewCertificate,
    vaultbox::{MailboxType, NewVaultbox, Vaultbox, VaultboxStatus},
    IsConstraintViolation,
};
use trc::{AddContext, EventBuilder, ManageEvent};

use super::{certs, validate_domain, validate_local_part, welcome};

#[derive(Debug, Clone)]
pub struct CreateVaultboxParams {
    pub owner_user_id: String,
    pub domain: String,
    pub display_name: String,
    pub alias: Option<String>,
    pub mailbox_type: MailboxType,
    pub is_catch_all: bool,
    pub smtp_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct CreatedVaultbox {
    pub vaultbox: Vaultbox,
    /// Present when the server generated the keypair; the private half is
    /// handed out exactly once and never persisted.
    pub certificate: Option<certs::GeneratedCertificate>,
}

pub trait VaultboxCreate: Sync + Send {
    fn create_vaultbox(
        &self,
        params: CreateVaultboxParams,
    ) -> impl Future<Output = trc::Result<CreatedVaultbox>> + Send;
}

impl VaultboxCreate for Server {
    async fn create_vaultbox(&self, params: CreateVaultboxParams) -> trc::Result<CreatedVaultbox> {
        let domain = validate_domain(&params.domain)?;
        let alias = params
            .alias
            .as_deref()
            .map(validate_local_part)
            .transpose()?;
        if params.mailbox_type == MailboxType::Encrypted && alias.is_none() {
            return Err(trc::EventType::Manage(ManageEvent::MissingParameter)
                .details("encrypted mailboxes require an alias"));
        }

        if !self
            .core
            .subscription
            .domain_verified(&params.owner_user_id, &domain)
            .await
            .caused_by(trc::location!())?
        {
            return Err(trc::EventType::Manage(ManageEvent::DomainNotOwned)
                .ctx(trc::Key::Domain, domain));
        }

        // Simple-mailbox exclusivity gates run before anything durable.
        if params.mailbox_type == MailboxType::Simple {
            let client = self.core.storage.client().await.caused_by(trc::location!())?;
            let catchall = store::catchall::find_by_domain(&**client, &domain)
                .await
                .caused_by(trc::location!())?;
            if catchall.as_ref().is_some_and(|binding| binding.enabled) {
                return Err(trc::EventType::Manage(ManageEvent::DomainCatchAll)
                    .details("domain is in catch-all mode")
                    .ctx(trc::Key::Domain, domain));
            }
            if params.is_catch_all {
                let existing = store::vaultbox::find_simple_by_domain(&**client, &domain)
                    .await
                    .caused_by(trc::location!())?;
                if !existing.is_empty() {
                    return Err(trc::EventType::Manage(ManageEvent::CatchAllConflict)
                        .details("catch-all requires the only simple mailbox on the domain")
                        .ctx(trc::Key::Domain, domain));
                }
            }
        } else if params.is_catch_all {
            return Err(trc::EventType::Manage(ManageEvent::InvalidParameter)
                .details("catch-all applies to simple mailboxes only"));
        }

        // Key generation is slow; it happens before any row exists.
        let generated = if params.mailbox_type == MailboxType::Encrypted {
            let address = format!(
                "{}@{}",
                alias.as_deref().unwrap_or_default(),
                domain
            );
            Some(certs::generate_self_signed(address.clone(), address, None).await?)
        } else {
            None
        };

        let new_vaultbox = NewVaultbox {
            id: self.generate_id(),
            owner_user_id: params.owner_user_id,
            domain: domain.clone(),
            display_name: params.display_name,
            alias: alias.clone(),
            mailbox_type: params.mailbox_type,
            smtp_enabled: params.smtp_enabled,
        };
        let certificate_id = self.generate_id();

        let vaultbox = self
            .core
            .storage
            .transaction(store::Isolation::ReadCommitted, |tx| {
                let new_vaultbox = new_vaultbox.clone();
                let generated = generated.clone();
                Box::pin(async move {
                    let vaultbox = store::vaultbox::insert(tx, &new_vaultbox).await?;
                    if let Some(generated) = &generated {
                        store::certificate::insert(
                            tx,
                            &NewCertificate {
                                id: certificate_id,
                                vaultbox_id: vaultbox.id,
                                label: Some("generated".to_string()),
                                public_cert_pem: generated.certificate_pem.clone(),
                                fingerprint: generated.fingerprint.clone(),
                            },
                        )
                        .await?;
                    }
                    Ok(vaultbox)
                })
            })
            .await
            .add_context(|err| {
                if err.is_constraint_violation("vaultboxes_domain_alias_key") {
                    trc::EventType::Manage(ManageEvent::AlreadyExists)
                        .details("address is already taken")
                } else {
                    err
                }
            })?;

        // DB state is committed; the rest is filesystem + MTA. Failures
        // roll the vaultbox back, or disable it when the rollback itself
        // fails.
        if let Err(err) =
            finish_create(self, &vaultbox, generated.as_ref(), params.is_catch_all).await
        {
            compensate_create(self, &vaultbox).await;
            return Err(err);
        }

        Ok(CreatedVaultbox {
            vaultbox,
            certificate: generated,
        })
    }
}

async fn finish_create(
    server: &Server,
    vaultbox: &Vaultbox,
    generated: Option<&certs::GeneratedCertificate>,
    is_catch_all: bool,
) -> trc::Result<()> {
    match vaultbox.mailbox_type {
        MailboxType::Encrypted => {
            if let Some(generated) = generated {
                welcome::seed_welcome(server, vaultbox, &generated.certificate_pem)
                    .await
                    .caused_by(trc::location!())?;
            }
            let address = vaultbox
                .primary_address()
                .ok_or_else(|| trc::EventType::Manage(ManageEvent::Error).into_err())?;
            server
                .core
                .router
                .add_email_route(&address, vaultbox.id, RouteTarget::EncryptedPipe(vaultbox.id))
                .await
                .caused_by(trc::location!())?;
        }
        MailboxType::Simple => {
            // Delivery routes wait for credentials (the map target is the
            // username); the catch-all binding is durable now.
            if is_catch_all {
                let client = server
                    .core
                    .storage
                    .client()
                    .await
                    .caused_by(trc::location!())?;
                store::catchall::upsert(&**client, &vaultbox.domain, vaultbox.id, true)
                    .await
                    .caused_by(trc::location!())?;
                drop(client);
                if let Some(address) = vaultbox.primary_address() {
                    server
                        .core
                        .router
                        .add_catchall_route(&vaultbox.domain, &address, vaultbox.id)
                        .await
                        .caused_by(trc::location!())?;
                }
            }
        }
    }
    Ok(())
}

async fn compensate_create(server: &Server, vaultbox: &Vaultbox) {
    let _ = intake::maildir::Maildir::remove_tree(
        &server.core.settings.maildir_root.join(vaultbox.id.to_string()),
    );
    let result = async {
        let client = server.core.storage.client().await?;
        store::vaultbox::delete(&**client, vaultbox.id).await
    }
    .await;

    if let Err(err) = result {
        trc::error!(err.ctx(trc::Key::VaultboxId, vaultbox.id as u64));
        let disabled = async {
            let client = server.core.storage.client().await?;
            store::vaultbox::update_status(&**client, vaultbox.id, VaultboxStatus::Disabled).await
        }
        .await;
        if let Err(err) = disabled {
            trc::error!(err.ctx(trc::Key::VaultboxId, vaultbox.id as u64));
        }
        trc::event!(
            Manage(Inconsistency),
            VaultboxId = vaultbox.id as u64,
            Details = "vaultbox left disabled after failed provisioning"
        );
    }
}

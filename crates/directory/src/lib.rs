/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

pub mod imap;
pub mod issue;
pub mod passwd;
pub mod submission;

use std::{path::PathBuf, sync::Arc};

use imap::ImapDriver;
use passwd::{PasswdEntry, PasswdFile};
use store::{
    credential::{self, SecurityMode, SmtpCredential},
    vaultbox::{MailboxType, Vaultbox},
    Store,
};
use trc::{AddContext, ManageEvent};
use utils::snowflake::SnowflakeIdGenerator;

pub const DEFAULT_SMTP_PORT: i32 = 587;

/// Credential authority: issues the unified username/password pair for a
/// vaultbox, maintains the IMAP credential file and authenticates SMTP
/// submission.
pub struct Directory {
    pub store: Store,
    pub imap_driver: Arc<dyn ImapDriver>,
    pub passwd: PasswdFile,
    pub maildir_root: PathBuf,
    pub maildir_uid: Option<u32>,
    pub maildir_gid: Option<u32>,
    pub id_gen: Arc<SnowflakeIdGenerator>,
    pub smtp_host: String,
}

/// Plaintext is carried only in this return value, never persisted.
#[derive(Debug, Clone)]
pub struct IssuedCredential {
    pub id: i64,
    pub username: String,
    pub password: String,
}

impl Directory {
    /// Maildir home for the IMAP daemon: encrypted mailboxes are keyed by
    /// vaultbox id, simple mailboxes by username.
    pub fn maildir_home(&self, vaultbox: &Vaultbox, username: &str) -> PathBuf {
        match vaultbox.mailbox_type {
            MailboxType::Encrypted => self.maildir_root.join(vaultbox.id.to_string()),
            MailboxType::Simple => self.maildir_root.join(username),
        }
    }

    pub async fn issue_imap(&self, vaultbox: &Vaultbox) -> trc::Result<IssuedCredential> {
        let client = self.store.client().await.caused_by(trc::location!())?;
        if credential::imap_by_vaultbox(&**client, vaultbox.id)
            .await
            .caused_by(trc::location!())?
            .is_some()
        {
            return Err(trc::EventType::Manage(ManageEvent::AlreadyExists)
                .details("IMAP credentials already issued"));
        }
        let username = match credential::unified_username(&**client, vaultbox.id)
            .await
            .caused_by(trc::location!())?
        {
            Some(username) => username,
            None => issue::derive_username(vaultbox.alias.as_deref(), &vaultbox.domain),
        };
        drop(client);

        // KDF work happens off the pool and outside any transaction.
        let password = issue::generate_password();
        let hash = hash_blocking(password.clone()).await?;

        let client = self.store.client().await.caused_by(trc::location!())?;
        let record = credential::insert_imap(
            &**client,
            self.id_gen.generate() as i64,
            &vaultbox.owner_user_id,
            vaultbox.id,
            &username,
            &hash,
        )
        .await
        .caused_by(trc::location!())?;
        drop(client);

        self.write_passwd_entry(vaultbox, &username, &hash).await?;

        Ok(IssuedCredential {
            id: record.id,
            username,
            password,
        })
    }

    pub async fn regenerate_imap(&self, vaultbox: &Vaultbox) -> trc::Result<IssuedCredential> {
        let client = self.store.client().await.caused_by(trc::location!())?;
        let record = credential::imap_by_vaultbox(&**client, vaultbox.id)
            .await
            .caused_by(trc::location!())?
            .ok_or_else(|| trc::EventType::Manage(ManageEvent::NotFound).into_err())?;
        drop(client);

        let password = issue::generate_password();
        let hash = hash_blocking(password.clone()).await?;

        let client = self.store.client().await.caused_by(trc::location!())?;
        credential::update_imap_password(&**client, vaultbox.id, &hash)
            .await
            .caused_by(trc::location!())?;
        drop(client);

        self.write_passwd_entry(vaultbox, &record.username, &hash)
            .await?;

        Ok(IssuedCredential {
            id: record.id,
            username: record.username,
            password,
        })
    }

    pub async fn revoke_imap(&self, vaultbox_id: i64) -> trc::Result<Option<String>> {
        let client = self.store.client().await.caused_by(trc::location!())?;
        let record = credential::imap_by_vaultbox(&**client, vaultbox_id)
            .await
            .caused_by(trc::location!())?;
        let username = match record {
            Some(record) => record.username,
            None => return Ok(None),
        };
        credential::revoke_imap(&**client, vaultbox_id)
            .await
            .caused_by(trc::location!())?;
        drop(client);

        self.passwd.remove(&username).await?;
        self.imap_driver.flush_auth_cache(&username).await?;
        self.imap_driver.reload().await?;
        Ok(Some(username))
    }

    pub async fn issue_smtp(
        &self,
        vaultbox: &Vaultbox,
        host: Option<String>,
        port: Option<i32>,
        security_mode: Option<SecurityMode>,
    ) -> trc::Result<(SmtpCredential, String)> {
        let client = self.store.client().await.caused_by(trc::location!())?;
        if credential::smtp_by_vaultbox(&**client, vaultbox.id)
            .await
            .caused_by(trc::location!())?
            .is_some()
        {
            return Err(trc::EventType::Manage(ManageEvent::AlreadyExists)
                .details("SMTP credentials already issued"));
        }
        let username = match credential::unified_username(&**client, vaultbox.id)
            .await
            .caused_by(trc::location!())?
        {
            Some(username) => username,
            None => issue::derive_username(vaultbox.alias.as_deref(), &vaultbox.domain),
        };
        drop(client);

        let password = issue::generate_password();
        let hash = hash_blocking(password.clone()).await?;

        let client = self.store.client().await.caused_by(trc::location!())?;
        let record = credential::insert_smtp(
            &**client,
            self.id_gen.generate() as i64,
            vaultbox.id,
            &username,
            &hash,
            host.as_deref().unwrap_or(&self.smtp_host),
            port.unwrap_or(DEFAULT_SMTP_PORT),
            security_mode.unwrap_or(SecurityMode::StartTls),
        )
        .await
        .caused_by(trc::location!())?;

        Ok((record, password))
    }

    pub async fn regenerate_smtp(&self, vaultbox_id: i64) -> trc::Result<(SmtpCredential, String)> {
        let client = self.store.client().await.caused_by(trc::location!())?;
        let record = credential::smtp_by_vaultbox(&**client, vaultbox_id)
            .await
            .caused_by(trc::location!())?
            .ok_or_else(|| trc::EventType::Manage(ManageEvent::NotFound).into_err())?;
        drop(client);

        let password = issue::generate_password();
        let hash = hash_blocking(password.clone()).await?;

        let client = self.store.client().await.caused_by(trc::location!())?;
        credential::update_smtp_password(&**client, vaultbox_id, &hash)
            .await
            .caused_by(trc::location!())?;

        Ok((record, password))
    }

    pub async fn delete_smtp(&self, vaultbox_id: i64) -> trc::Result<bool> {
        let client = self.store.client().await.caused_by(trc::location!())?;
        credential::delete_smtp(&**client, vaultbox_id)
            .await
            .caused_by(trc::location!())
    }

    /// Removes the passwd line when a vaultbox goes away; route and row
    /// cleanup belong to the lifecycle service.
    pub async fn remove_passwd_for(&self, username: &str) -> trc::Result<bool> {
        let removed = self.passwd.remove(username).await?;
        if removed {
            self.imap_driver.flush_auth_cache(username).await?;
            self.imap_driver.reload().await?;
        }
        Ok(removed)
    }

    async fn write_passwd_entry(
        &self,
        vaultbox: &Vaultbox,
        username: &str,
        hash: &str,
    ) -> trc::Result<()> {
        let home = self.maildir_home(vaultbox, username);
        self.passwd
            .upsert(PasswdEntry {
                username: username.to_string(),
                password_hash: hash.to_string(),
                home: Some(home.display().to_string()),
                mail: Some(format!("maildir:{}", home.join("Maildir").display())),
                uid: self.maildir_uid,
                gid: self.maildir_gid,
            })
            .await?;
        self.imap_driver.reload().await?;
        self.imap_driver.flush_auth_cache(username).await?;
        Ok(())
    }
}

pub(crate) async fn hash_blocking(password: String) -> trc::Result<String> {
    tokio::task::spawn_blocking(move || issue::hash_password(&password))
        .await
        .map_err(|err| trc::EventType::Server(trc::ServerEvent::ThreadError).reason(err))?
}

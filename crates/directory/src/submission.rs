/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use serde::Serialize;
use store::{credential, legacy, vaultbox, vaultbox::VaultboxStatus};
use trc::{AddContext, AuthEvent, EventBuilder};

use crate::{issue, Directory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialType {
    Vaultbox,
    Legacy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionAuth {
    #[serde(rename = "type")]
    pub credential_type: CredentialType,
    pub credential_id: i64,
    pub owner_user_id: String,
    pub domain: String,
    pub username: String,
    pub rate_limit: RateLimit,
}

/// Returned so the SMTP front-end can enforce limits per credential type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimit {
    pub max_messages_per_day: u32,
    pub max_rcpt_per_message: u32,
}

const VAULTBOX_RATE_LIMIT: RateLimit = RateLimit {
    max_messages_per_day: 2000,
    max_rcpt_per_message: 50,
};

const LEGACY_DEFAULT_MESSAGES_PER_DAY: u32 = 200;

fn invalid_credentials() -> trc::Error {
    trc::EventType::Auth(AuthEvent::Failed).into_err()
}

/// Usernames in email form or carrying an issued prefix live in the
/// vaultbox credential table; everything else is tried against the legacy
/// outbound table first.
fn prefers_vaultbox(username: &str) -> bool {
    username.contains('@')
        || username.starts_with("vaultbox-")
        || username.starts_with("encimap-")
}

/// One lookup attempt against a credential table. `ran_kdf` is true when a
/// stored secret was actually verified; rejection paths use it to keep the
/// total KDF work identical whether or not the username exists.
struct Attempt {
    auth: Option<SubmissionAuth>,
    ran_kdf: bool,
}

impl Attempt {
    fn miss() -> Self {
        Attempt {
            auth: None,
            ran_kdf: false,
        }
    }
}

impl Directory {
    /// Authenticates an SMTP submission. Every rejection costs exactly one
    /// KDF round, the same as a success, and never discloses which table
    /// was consulted.
    pub async fn authenticate_submission(
        &self,
        username: &str,
        password: &str,
    ) -> trc::Result<SubmissionAuth> {
        let mut ran_kdf = false;
        let result = if prefers_vaultbox(username) {
            let attempt = self.try_vaultbox(username, password).await?;
            ran_kdf |= attempt.ran_kdf;
            match attempt.auth {
                Some(auth) => Some(auth),
                None => {
                    let attempt = self.try_legacy(username, password).await?;
                    ran_kdf |= attempt.ran_kdf;
                    attempt.auth
                }
            }
        } else {
            let attempt = self.try_legacy(username, password).await?;
            ran_kdf |= attempt.ran_kdf;
            match attempt.auth {
                Some(auth) => Some(auth),
                None => {
                    let attempt = self.try_vaultbox(username, password).await?;
                    ran_kdf |= attempt.ran_kdf;
                    attempt.auth
                }
            }
        };

        match result {
            Some(auth) => {
                trc::event!(
                    Auth(Success),
                    Username = auth.username.clone(),
                    Domain = auth.domain.clone()
                );
                Ok(auth)
            }
            None => {
                // A failed verification already did the KDF work; only the
                // cheap miss paths (unknown or disabled credentials) pay
                // the dummy round.
                if !ran_kdf {
                    let password = password.to_string();
                    tokio::task::spawn_blocking(move || issue::verify_dummy(&password))
                        .await
                        .map_err(|err| {
                            trc::EventType::Server(trc::ServerEvent::ThreadError).reason(err)
                        })?;
                }
                Err(invalid_credentials())
            }
        }
    }

    async fn try_vaultbox(&self, username: &str, password: &str) -> trc::Result<Attempt> {
        let client = self.store.client().await.caused_by(trc::location!())?;
        let record = match credential::smtp_by_username(&**client, username)
            .await
            .caused_by(trc::location!())?
        {
            Some(record) if record.enabled => record,
            _ => return Ok(Attempt::miss()),
        };
        let vaultbox = match vaultbox::find_by_id(&**client, record.vaultbox_id)
            .await
            .caused_by(trc::location!())?
        {
            Some(vaultbox)
                if vaultbox.status == VaultboxStatus::Active && vaultbox.smtp_enabled =>
            {
                vaultbox
            }
            _ => return Ok(Attempt::miss()),
        };
        drop(client);

        if !verify_blocking(password, &record.password_hash).await? {
            return Ok(Attempt {
                auth: None,
                ran_kdf: true,
            });
        }

        let client = self.store.client().await.caused_by(trc::location!())?;
        credential::touch_smtp(&**client, record.id)
            .await
            .caused_by(trc::location!())?;

        Ok(Attempt {
            auth: Some(SubmissionAuth {
                credential_type: CredentialType::Vaultbox,
                credential_id: record.id,
                owner_user_id: vaultbox.owner_user_id,
                domain: vaultbox.domain,
                username: record.username,
                rate_limit: VAULTBOX_RATE_LIMIT,
            }),
            ran_kdf: true,
        })
    }

    async fn try_legacy(&self, username: &str, password: &str) -> trc::Result<Attempt> {
        let client = match self.store.legacy_client().await.caused_by(trc::location!())? {
            Some(client) => client,
            None => return Ok(Attempt::miss()),
        };
        let record = match legacy::find_by_username(&**client, username)
            .await
            .caused_by(trc::location!())?
        {
            Some(record) => record,
            None => return Ok(Attempt::miss()),
        };
        drop(client);

        if !verify_blocking(password, &record.password_hash).await? {
            return Ok(Attempt {
                auth: None,
                ran_kdf: true,
            });
        }

        let client = self.store.legacy_client().await.caused_by(trc::location!())?;
        if let Some(client) = client {
            legacy::touch(&**client, record.id)
                .await
                .caused_by(trc::location!())?;
            // Stored crypt-scheme secrets migrate to the unified KDF on the
            // first successful login.
            if !record.password_hash.starts_with("$argon2") {
                let rehash = crate::hash_blocking(password.to_string()).await?;
                if let Err(err) = legacy::update_password_hash(&**client, record.id, &rehash).await
                {
                    trc::error!(err.ctx(trc::Key::Username, record.username.clone()));
                }
            }
        }

        let rate_limit = RateLimit {
            max_messages_per_day: record
                .max_messages_per_day
                .map(|n| n as u32)
                .unwrap_or(LEGACY_DEFAULT_MESSAGES_PER_DAY),
            max_rcpt_per_message: 50,
        };

        Ok(Attempt {
            auth: Some(SubmissionAuth {
                credential_type: CredentialType::Legacy,
                credential_id: record.id,
                owner_user_id: record.user_id,
                domain: record.domain,
                username: record.username,
                rate_limit,
            }),
            ran_kdf: true,
        })
    }
}

async fn verify_blocking(password: &str, stored: &str) -> trc::Result<bool> {
    let password = password.to_string();
    let stored = stored.to_string();
    tokio::task::spawn_blocking(move || issue::verify_password(&password, &stored))
        .await
        .map_err(|err| trc::EventType::Server(trc::ServerEvent::ThreadError).reason(err))
}

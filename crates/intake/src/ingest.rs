/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::{path::PathBuf, time::Duration};

use common::Server;
use store::message::{MessageStorage, NewMessage};
use trc::{AddContext, EventBuilder, IntakeEvent};

use crate::{envelope, maildir::Maildir, smime};

/// Upper bound for one message end to end; the MTA owns retries beyond it.
const SOFT_DEADLINE: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub maildir_path: PathBuf,
    pub bytes: usize,
    pub recipients: Vec<String>,
    pub message_id: Option<i64>,
}

pub async fn ingest(server: &Server, vaultbox_id: i64, raw: Vec<u8>) -> trc::Result<Delivery> {
    match tokio::time::timeout(SOFT_DEADLINE, ingest_inner(server, vaultbox_id, raw)).await {
        Ok(result) => result,
        Err(_) => Err(trc::EventType::Intake(IntakeEvent::Timeout)
            .ctx(trc::Key::VaultboxId, vaultbox_id as u64)),
    }
}

async fn ingest_inner(server: &Server, vaultbox_id: i64, raw: Vec<u8>) -> trc::Result<Delivery> {
    trc::event!(
        Intake(MessageReceived),
        VaultboxId = vaultbox_id as u64,
        Size = raw.len()
    );

    let client = server.core.storage.client().await.caused_by(trc::location!())?;
    let vaultbox = store::vaultbox::find_by_id(&**client, vaultbox_id)
        .await
        .caused_by(trc::location!())?
        .ok_or_else(|| {
            trc::EventType::Intake(IntakeEvent::UnknownVaultbox)
                .ctx(trc::Key::VaultboxId, vaultbox_id as u64)
        })?;

    // Only the From domain and the To local part leave the envelope; the
    // body is never inspected.
    let envelope = envelope::parse(&raw);

    let certificates = store::certificate::find_by_vaultbox(&**client, vaultbox.id)
        .await
        .caused_by(trc::location!())?;
    drop(client);
    if certificates.is_empty() {
        return Err(trc::EventType::Intake(IntakeEvent::NoCertificates)
            .ctx(trc::Key::VaultboxId, vaultbox_id as u64));
    }

    let recipients = certificates
        .iter()
        .map(|certificate| smime::Recipient::from_pem(&certificate.public_cert_pem))
        .collect::<trc::Result<Vec<_>>>()
        .caused_by(trc::location!())?;
    let fingerprints: Vec<String> = recipients
        .iter()
        .map(|recipient| recipient.fingerprint.clone())
        .collect();

    let ciphertext = tokio::task::spawn_blocking(move || {
        smime::encrypt(&recipients, &raw).map(|pkcs7| smime::wrap_mime(&pkcs7))
    })
    .await
    .map_err(|err| trc::EventType::Server(trc::ServerEvent::ThreadError).reason(err))?
    .caused_by(trc::location!())?;

    let settings = &server.core.settings;
    let maildir = Maildir::at(&settings.maildir_root.join(vaultbox.id.to_string()));
    let uid = settings.maildir_uid;
    let gid = settings.maildir_gid;
    let bytes = ciphertext.len();
    let new_path = {
        let maildir = maildir.clone();
        tokio::task::spawn_blocking(move || {
            maildir.ensure(uid, gid)?;
            maildir.deliver(&ciphertext, uid, gid)
        })
        .await
        .map_err(|err| trc::EventType::Server(trc::ServerEvent::ThreadError).reason(err))?
        .caused_by(trc::location!())?
    };

    // The ciphertext is on disk; a failed metadata write leaves the
    // message delivered and the gap logged for reconciliation.
    let message = NewMessage {
        id: server.generate_id(),
        vaultbox_id: vaultbox.id,
        from_domain: envelope.from_domain.clone(),
        to_alias: envelope.to_alias.clone(),
        size_bytes: bytes as i64,
        storage: MessageStorage {
            maildir_path: new_path.display().to_string(),
            bytes: bytes as u64,
            alg: smime::SMIME_ALG.to_string(),
            recipients: fingerprints.clone(),
        },
    };
    let message_id = match record_message(server, &message).await {
        Ok(id) => Some(id),
        Err(err) => {
            trc::error!(trc::EventType::Intake(IntakeEvent::MetadataError)
                .reason(err)
                .ctx(trc::Key::VaultboxId, vaultbox.id as u64)
                .ctx(trc::Key::Path, new_path.display().to_string()));
            None
        }
    };

    trc::event!(
        Intake(MessageDelivered),
        VaultboxId = vaultbox.id as u64,
        Path = new_path.display().to_string(),
        Size = bytes
    );

    Ok(Delivery {
        maildir_path: new_path,
        bytes,
        recipients: fingerprints,
        message_id,
    })
}

async fn record_message(server: &Server, message: &NewMessage) -> trc::Result<i64> {
    let client = server.core.storage.client().await?;
    if store::message::exists_by_path(&**client, message.vaultbox_id, &message.storage.maildir_path)
        .await?
    {
        return Ok(message.id);
    }
    store::message::insert(&**client, message).await.map(|record| record.id)
}

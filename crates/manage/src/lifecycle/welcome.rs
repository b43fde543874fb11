/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use common::Server;
use intake::{maildir::Maildir, smime};
use store::vaultbox::Vaultbox;
use trc::AddContext;

/// Seeds the freshly created mailbox with one encrypted message so the
/// first IMAP login shows the pipeline working. Written in the delivery
/// format, but never recorded as a message row; it does not count
/// against plan limits or usage.
pub async fn seed_welcome(
    server: &Server,
    vaultbox: &Vaultbox,
    certificate_pem: &str,
) -> trc::Result<()> {
    let address = vaultbox
        .primary_address()
        .unwrap_or_else(|| vaultbox.domain.clone());
    let body = format!(
        "From: Encimap <no-reply@{domain}>\r\n\
         To: {address}\r\n\
         Subject: Your encrypted mailbox is ready\r\n\
         MIME-Version: 1.0\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         \r\n\
         This mailbox encrypts every incoming message with your certificate.\r\n\
         Messages can only be read with your private key. Keep it safe;\r\n\
         it is not stored on the server and cannot be recovered.\r\n",
        domain = vaultbox.domain,
        address = address
    );

    let recipient = smime::Recipient::from_pem(certificate_pem).caused_by(trc::location!())?;
    let ciphertext = tokio::task::spawn_blocking(move || {
        smime::encrypt(&[recipient], body.as_bytes()).map(|pkcs7| smime::wrap_mime(&pkcs7))
    })
    .await
    .map_err(|err| trc::EventType::Server(trc::ServerEvent::ThreadError).reason(err))?
    .caused_by(trc::location!())?;

    let settings = &server.core.settings;
    let maildir = Maildir::at(&settings.maildir_root.join(vaultbox.id.to_string()));
    let uid = settings.maildir_uid;
    let gid = settings.maildir_gid;
    tokio::task::spawn_blocking(move || {
        maildir.ensure(uid, gid)?;
        maildir.deliver(&ciphertext, uid, gid)
    })
    .await
    .map_err(|err| trc::EventType::Server(trc::ServerEvent::ThreadError).reason(err))?
    .caused_by(trc::location!())?;

    Ok(())
}

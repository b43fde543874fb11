/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use manage::lifecycle::{
    create::{CreateVaultboxParams, VaultboxCreate},
    delete::VaultboxDelete,
};
use store::vaultbox::MailboxType;
use trc::IntakeEvent;

use crate::harness::build_env;

#[tokio::test]
async fn intake_encrypts_and_records() {
    let env = build_env(true).await;
    let domain = env.unique_domain("intake");

    let created = env
        .server
        .create_vaultbox(CreateVaultboxParams {
            owner_user_id: "user-1".to_string(),
            domain: domain.clone(),
            display_name: "Intake box".to_string(),
            alias: Some("cat".to_string()),
            mailbox_type: MailboxType::Encrypted,
            is_catch_all: false,
            smtp_enabled: false,
        })
        .await
        .unwrap();
    let vaultbox = &created.vaultbox;

    let raw = format!(
        "From: x@gmail.com\r\nTo: cat@{domain}\r\nSubject: T\r\n\r\nhi"
    );
    let delivery = intake::ingest::ingest(&env.server, vaultbox.id, raw.into_bytes())
        .await
        .unwrap();

    // Ciphertext landed in new/, never in tmp/.
    let maildir = env
        .server
        .core
        .settings
        .maildir_root
        .join(vaultbox.id.to_string())
        .join("Maildir");
    assert!(delivery.maildir_path.starts_with(maildir.join("new")));
    assert_eq!(std::fs::read_dir(maildir.join("tmp")).unwrap().count(), 0);

    let content = std::fs::read_to_string(&delivery.maildir_path).unwrap();
    assert!(content.starts_with("MIME-Version: 1.0"));
    assert!(content.contains("Content-Type: application/x-pkcs7-mime"));
    assert!(!content.contains("hi"));

    // Metadata row with the certificate fingerprint, in order.
    let expected_fingerprint = created.certificate.as_ref().unwrap().fingerprint.clone();
    assert_eq!(delivery.recipients, vec![expected_fingerprint.clone()]);
    let client = env.server.core.storage.client().await.unwrap();
    let records = store::message::find_by_vaultbox(&**client, vaultbox.id, 10)
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].from_domain, "gmail.com");
    assert_eq!(records[0].to_alias, "cat");
    assert_eq!(records[0].storage.alg, "smime-aes256");
    assert_eq!(records[0].storage.recipients, vec![expected_fingerprint]);
    assert_eq!(records[0].size_bytes as usize, delivery.bytes);
    drop(client);

    env.server.delete_vaultbox(vaultbox).await.unwrap();
    env.cleanup();
}

#[tokio::test]
async fn intake_without_certificates_is_permanent() {
    let env = build_env(true).await;
    let domain = env.unique_domain("nocert");

    let created = env
        .server
        .create_vaultbox(CreateVaultboxParams {
            owner_user_id: "user-1".to_string(),
            domain: domain.clone(),
            display_name: "No certs".to_string(),
            alias: Some("info".to_string()),
            mailbox_type: MailboxType::Simple,
            is_catch_all: false,
            smtp_enabled: false,
        })
        .await
        .unwrap();
    let vaultbox = &created.vaultbox;

    let err = intake::ingest::ingest(
        &env.server,
        vaultbox.id,
        b"From: a@b.c\r\n\r\nx".to_vec(),
    )
    .await
    .unwrap_err();
    assert!(err.matches(trc::EventType::Intake(IntakeEvent::NoCertificates)));

    // Nothing written, nothing recorded.
    let maildir = env
        .server
        .core
        .settings
        .maildir_root
        .join(vaultbox.id.to_string());
    assert!(!maildir.join("Maildir").join("new").exists() || {
        std::fs::read_dir(maildir.join("Maildir").join("new")).unwrap().count() == 0
    });
    let client = env.server.core.storage.client().await.unwrap();
    assert!(store::message::find_by_vaultbox(&**client, vaultbox.id, 10)
        .await
        .unwrap()
        .is_empty());
    drop(client);

    env.server.delete_vaultbox(vaultbox).await.unwrap();
    env.cleanup();
}

#[tokio::test]
async fn unknown_vaultbox_is_transient() {
    let env = build_env(true).await;
    let err = intake::ingest::ingest(&env.server, 1, b"From: a@b.c\r\n\r\nx".to_vec())
        .await
        .unwrap_err();
    assert!(err.matches(trc::EventType::Intake(IntakeEvent::UnknownVaultbox)));
    env.cleanup();
}

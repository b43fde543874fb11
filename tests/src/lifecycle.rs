/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use manage::lifecycle::{
    alias::AliasOps,
    catchall::CatchAllOps,
    create::{CreateVaultboxParams, VaultboxCreate},
    credentials::CredentialOps,
    delete::VaultboxDelete,
    status::StatusOps,
};
use store::vaultbox::MailboxType;
use trc::ManageEvent;

use crate::harness::build_env;

fn encrypted_params(domain: &str, alias: &str) -> CreateVaultboxParams {
    CreateVaultboxParams {
        owner_user_id: "user-1".to_string(),
        domain: domain.to_string(),
        display_name: "Test box".to_string(),
        alias: Some(alias.to_string()),
        mailbox_type: MailboxType::Encrypted,
        is_catch_all: false,
        smtp_enabled: true,
    }
}

fn simple_params(domain: &str, alias: Option<&str>) -> CreateVaultboxParams {
    CreateVaultboxParams {
        owner_user_id: "user-1".to_string(),
        domain: domain.to_string(),
        display_name: "Simple box".to_string(),
        alias: alias.map(str::to_string),
        mailbox_type: MailboxType::Simple,
        is_catch_all: false,
        smtp_enabled: false,
    }
}

#[tokio::test]
async fn encrypted_lifecycle() {
    let env = build_env(true).await;
    let domain = env.unique_domain("enc");

    let created = env
        .server
        .create_vaultbox(encrypted_params(&domain, "cat"))
        .await
        .unwrap();
    let vaultbox = &created.vaultbox;
    let generated = created.certificate.as_ref().unwrap();
    assert!(generated.private_key_pem.contains("BEGIN PRIVATE KEY"));

    // Welcome message seeded in new/.
    let new_dir = env
        .server
        .core
        .settings
        .maildir_root
        .join(vaultbox.id.to_string())
        .join("Maildir")
        .join("new");
    assert_eq!(std::fs::read_dir(&new_dir).unwrap().count(), 1);

    // Per-address route installed.
    let line = format!("cat@{domain}\tencimap-pipe:{}", vaultbox.id);
    assert!(env.transport_map().contains(&line));

    env.server.delete_vaultbox(vaultbox).await.unwrap();
    env.cleanup();
}

#[tokio::test]
async fn catchall_conversion_requires_force() {
    let env = build_env(true).await;
    let domain = env.unique_domain("convert");

    let created = env
        .server
        .create_vaultbox(simple_params(&domain, Some("info")))
        .await
        .unwrap();
    let vaultbox = &created.vaultbox;
    env.server.create_imap_credentials(vaultbox).await.unwrap();
    env.server
        .create_alias(vaultbox, &format!("sales@{domain}"))
        .await
        .unwrap();

    // Aliases present: refused without force.
    let err = env
        .server
        .enable_catchall(&domain, vaultbox.id, false)
        .await
        .unwrap_err();
    assert!(err.matches(trc::EventType::Manage(ManageEvent::AliasPresent)));

    // Forced: aliases and their routes are gone, the catch-all is in.
    env.server
        .enable_catchall(&domain, vaultbox.id, true)
        .await
        .unwrap();
    assert!(env.server.list_aliases(vaultbox.id).await.unwrap().is_empty());
    let map = env.transport_map();
    assert!(map.contains(&format!("@{domain}\tinfo@{domain}")));
    assert!(!map.contains(&format!("sales@{domain}")));

    // No further simple mailboxes on a catch-all domain.
    let err = env
        .server
        .create_vaultbox(simple_params(&domain, Some("other")))
        .await
        .unwrap_err();
    assert!(err.matches(trc::EventType::Manage(ManageEvent::DomainCatchAll)));

    // No aliases either.
    let err = env
        .server
        .create_alias(vaultbox, &format!("late@{domain}"))
        .await
        .unwrap_err();
    assert!(err.matches(trc::EventType::Manage(ManageEvent::DomainCatchAll)));

    // Status reflects the conversion.
    let status = env.server.simple_domain_status(&domain).await.unwrap();
    assert_eq!(status.simple_count, 1);
    assert!(status.catchall_enabled);
    assert!(!status.conversion_eligible);

    env.server.delete_vaultbox(vaultbox).await.unwrap();
    env.cleanup();
}

#[tokio::test]
async fn alias_limit_is_five() {
    let env = build_env(true).await;
    let domain = env.unique_domain("limit");

    let created = env
        .server
        .create_vaultbox(simple_params(&domain, Some("info")))
        .await
        .unwrap();
    let vaultbox = &created.vaultbox;
    env.server.create_imap_credentials(vaultbox).await.unwrap();

    for i in 0..5 {
        env.server
            .create_alias(vaultbox, &format!("alias{i}@{domain}"))
            .await
            .unwrap();
    }
    let err = env
        .server
        .create_alias(vaultbox, &format!("alias5@{domain}"))
        .await
        .unwrap_err();
    assert!(err.matches(trc::EventType::Manage(ManageEvent::AliasLimitReached)));
    assert_eq!(env.server.list_aliases(vaultbox.id).await.unwrap().len(), 5);

    // Duplicates and primary-address collisions are conflicts.
    let err = env
        .server
        .create_alias(vaultbox, &format!("info@{domain}"))
        .await
        .unwrap_err();
    assert!(err.matches(trc::EventType::Manage(ManageEvent::AliasConflict)));

    env.server.delete_vaultbox(vaultbox).await.unwrap();
    env.cleanup();
}

#[tokio::test]
async fn co_issuance_shares_the_username() {
    let env = build_env(true).await;
    let domain = env.unique_domain("cred");

    let created = env
        .server
        .create_vaultbox(encrypted_params(&domain, "cat"))
        .await
        .unwrap();
    let vaultbox = &created.vaultbox;

    let imap = env.server.create_imap_credentials(vaultbox).await.unwrap();
    assert_eq!(imap.username, format!("cat@{domain}"));

    let (smtp, smtp_password) = env
        .server
        .create_smtp_credentials(vaultbox, None, None, None)
        .await
        .unwrap();
    assert_eq!(smtp.username, imap.username);
    assert_ne!(smtp_password, imap.password);

    // Regeneration rotates the password, never the username.
    let (regenerated, new_password) = env
        .server
        .regenerate_smtp_credentials(vaultbox)
        .await
        .unwrap();
    assert_eq!(regenerated.username, imap.username);
    assert_ne!(new_password, smtp_password);

    let reissued = env.server.regenerate_imap_credentials(vaultbox).await.unwrap();
    assert_eq!(reissued.username, imap.username);
    assert_ne!(reissued.password, imap.password);

    // The passwd file carries exactly one line for the username.
    let passwd = env.server.core.directory.passwd.read().await.unwrap();
    assert_eq!(passwd.len(), 1);
    assert_eq!(passwd[0].username, imap.username);
    assert!(*env.imap_driver.reloads.lock() >= 2);

    env.server.delete_vaultbox(vaultbox).await.unwrap();
    env.cleanup();
}

#[tokio::test]
async fn delete_cascades_everywhere() {
    let env = build_env(true).await;
    let domain = env.unique_domain("del");

    let created = env
        .server
        .create_vaultbox(simple_params(&domain, Some("info")))
        .await
        .unwrap();
    let vaultbox = created.vaultbox.clone();
    let issued = env.server.create_imap_credentials(&vaultbox).await.unwrap();
    for name in ["a", "b"] {
        env.server
            .create_alias(&vaultbox, &format!("{name}@{domain}"))
            .await
            .unwrap();
    }

    env.server.delete_vaultbox(&vaultbox).await.unwrap();

    let client = env.server.core.storage.client().await.unwrap();
    assert!(store::vaultbox::find_by_id(&**client, vaultbox.id)
        .await
        .unwrap()
        .is_none());
    assert!(store::alias::find_by_vaultbox(&**client, vaultbox.id)
        .await
        .unwrap()
        .is_empty());
    assert!(store::credential::unified_username(&**client, vaultbox.id)
        .await
        .unwrap()
        .is_none());
    drop(client);

    let map = env.transport_map();
    assert!(!map.contains(&domain));
    assert!(env.server.core.directory.passwd.read().await.unwrap().is_empty());
    assert!(!env
        .server
        .core
        .settings
        .maildir_root
        .join(&issued.username)
        .exists());

    env.cleanup();
}

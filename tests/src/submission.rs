/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use directory::submission::CredentialType;
use manage::lifecycle::{
    create::{CreateVaultboxParams, VaultboxCreate},
    credentials::CredentialOps,
    delete::VaultboxDelete,
};
use store::vaultbox::MailboxType;
use trc::AuthEvent;

use crate::harness::build_env;

#[tokio::test]
async fn submission_auth_round_trip() {
    let env = build_env(true).await;
    let domain = env.unique_domain("smtp");

    let created = env
        .server
        .create_vaultbox(CreateVaultboxParams {
            owner_user_id: "user-9".to_string(),
            domain: domain.clone(),
            display_name: "Sender".to_string(),
            alias: Some("cat".to_string()),
            mailbox_type: MailboxType::Encrypted,
            is_catch_all: false,
            smtp_enabled: true,
        })
        .await
        .unwrap();
    let vaultbox = &created.vaultbox;

    let (credential, password) = env
        .server
        .create_smtp_credentials(vaultbox, None, None, None)
        .await
        .unwrap();

    let auth = env
        .server
        .core
        .directory
        .authenticate_submission(&credential.username, &password)
        .await
        .unwrap();
    assert_eq!(auth.credential_type, CredentialType::Vaultbox);
    assert_eq!(auth.owner_user_id, "user-9");
    assert_eq!(auth.username, credential.username);
    assert_eq!(auth.domain, vaultbox.domain);
    assert!(auth.rate_limit.max_messages_per_day > 0);

    // last_used_at moves on success.
    let client = env.server.core.storage.client().await.unwrap();
    let stored = store::credential::smtp_by_vaultbox(&**client, vaultbox.id)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.last_used_at.is_some());
    assert_eq!(stored.messages_sent_count, 1);
    drop(client);

    // Wrong password and unknown username fail identically.
    let wrong = env
        .server
        .core
        .directory
        .authenticate_submission(&credential.username, "wrong-password")
        .await
        .unwrap_err();
    let unknown = env
        .server
        .core
        .directory
        .authenticate_submission("nobody@nowhere.invalid", "wrong-password")
        .await
        .unwrap_err();
    assert!(wrong.matches(trc::EventType::Auth(AuthEvent::Failed)));
    assert!(unknown.matches(trc::EventType::Auth(AuthEvent::Failed)));
    assert_eq!(wrong.to_string(), unknown.to_string());

    env.server.delete_vaultbox(vaultbox).await.unwrap();
    env.cleanup();
}

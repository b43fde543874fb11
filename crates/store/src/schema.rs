/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

/// Idempotent schema pass executed at startup. Email and domain columns use
/// CITEXT so uniqueness is case-insensitive at the database level.
pub const STATEMENTS: &[&str] = &[
    "CREATE EXTENSION IF NOT EXISTS citext",
    concat!(
        "CREATE TABLE IF NOT EXISTS vaultboxes (",
        "id BIGINT PRIMARY KEY, ",
        "owner_user_id TEXT NOT NULL, ",
        "domain CITEXT NOT NULL, ",
        "display_name TEXT NOT NULL DEFAULT '', ",
        "alias CITEXT, ",
        "mailbox_type TEXT NOT NULL CHECK (mailbox_type IN ('encrypted', 'simple')), ",
        "status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'disabled')), ",
        "smtp_enabled BOOLEAN NOT NULL DEFAULT FALSE, ",
        "created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(), ",
        "CONSTRAINT vaultboxes_domain_alias_key UNIQUE (domain, alias))"
    ),
    "CREATE INDEX IF NOT EXISTS vaultboxes_owner_idx ON vaultboxes (owner_user_id)",
    "CREATE INDEX IF NOT EXISTS vaultboxes_domain_idx ON vaultboxes (domain)",
    concat!(
        "CREATE TABLE IF NOT EXISTS certificates (",
        "id BIGINT PRIMARY KEY, ",
        "vaultbox_id BIGINT NOT NULL REFERENCES vaultboxes (id) ON DELETE CASCADE, ",
        "label TEXT, ",
        "public_cert_pem TEXT NOT NULL, ",
        "fingerprint TEXT NOT NULL, ",
        "created_at TIMESTAMPTZ NOT NULL DEFAULT NOW())"
    ),
    "CREATE INDEX IF NOT EXISTS certificates_vaultbox_idx ON certificates (vaultbox_id)",
    concat!(
        "CREATE TABLE IF NOT EXISTS imap_credentials (",
        "id BIGINT PRIMARY KEY, ",
        "owner_user_id TEXT NOT NULL, ",
        "vaultbox_id BIGINT NOT NULL REFERENCES vaultboxes (id) ON DELETE CASCADE, ",
        "username CITEXT NOT NULL, ",
        "password_hash TEXT NOT NULL, ",
        "revoked_at TIMESTAMPTZ, ",
        "created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(), ",
        "CONSTRAINT imap_credentials_username_key UNIQUE (username))"
    ),
    concat!(
        "CREATE UNIQUE INDEX IF NOT EXISTS imap_credentials_vaultbox_active_key ",
        "ON imap_credentials (vaultbox_id) WHERE revoked_at IS NULL"
    ),
    concat!(
        "CREATE TABLE IF NOT EXISTS smtp_credentials (",
        "id BIGINT PRIMARY KEY, ",
        "vaultbox_id BIGINT NOT NULL REFERENCES vaultboxes (id) ON DELETE CASCADE, ",
        "username CITEXT NOT NULL, ",
        "password_hash TEXT NOT NULL, ",
        "host TEXT NOT NULL, ",
        "port INT NOT NULL, ",
        "security_mode TEXT NOT NULL CHECK (security_mode IN ('STARTTLS', 'TLS', 'PLAIN')), ",
        "enabled BOOLEAN NOT NULL DEFAULT TRUE, ",
        "messages_sent_count BIGINT NOT NULL DEFAULT 0, ",
        "last_used_at TIMESTAMPTZ, ",
        "created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(), ",
        "CONSTRAINT smtp_credentials_vaultbox_key UNIQUE (vaultbox_id))"
    ),
    concat!(
        "CREATE TABLE IF NOT EXISTS messages (",
        "id BIGINT PRIMARY KEY, ",
        "vaultbox_id BIGINT NOT NULL REFERENCES vaultboxes (id) ON DELETE CASCADE, ",
        "from_domain TEXT NOT NULL DEFAULT '', ",
        "to_alias TEXT NOT NULL DEFAULT '', ",
        "size_bytes BIGINT NOT NULL, ",
        "received_at TIMESTAMPTZ NOT NULL DEFAULT NOW(), ",
        "storage JSONB NOT NULL)"
    ),
    concat!(
        "CREATE UNIQUE INDEX IF NOT EXISTS messages_vaultbox_path_key ",
        "ON messages (vaultbox_id, (storage ->> 'maildir_path'))"
    ),
    concat!(
        "CREATE TABLE IF NOT EXISTS aliases (",
        "id BIGINT PRIMARY KEY, ",
        "vaultbox_id BIGINT NOT NULL REFERENCES vaultboxes (id) ON DELETE CASCADE, ",
        "alias_email CITEXT NOT NULL, ",
        "active BOOLEAN NOT NULL DEFAULT TRUE, ",
        "created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(), ",
        "CONSTRAINT aliases_email_key UNIQUE (alias_email))"
    ),
    "CREATE INDEX IF NOT EXISTS aliases_vaultbox_idx ON aliases (vaultbox_id)",
    concat!(
        "CREATE TABLE IF NOT EXISTS catchall_bindings (",
        "domain CITEXT PRIMARY KEY, ",
        "vaultbox_id BIGINT NOT NULL REFERENCES vaultboxes (id) ON DELETE CASCADE, ",
        "enabled BOOLEAN NOT NULL DEFAULT FALSE, ",
        "updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW())"
    ),
    concat!(
        "CREATE TABLE IF NOT EXISTS routes (",
        "id BIGINT PRIMARY KEY, ",
        "email_address CITEXT, ",
        "domain CITEXT, ",
        "vaultbox_id BIGINT NOT NULL REFERENCES vaultboxes (id) ON DELETE CASCADE, ",
        "route_type TEXT NOT NULL CHECK (route_type IN ",
        "('encrypted_imap', 'simple_imap', 'catchall')), ",
        "priority INT NOT NULL DEFAULT 0, ",
        "active BOOLEAN NOT NULL DEFAULT TRUE, ",
        "options JSONB NOT NULL DEFAULT '{}', ",
        "created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(), ",
        "updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW())"
    ),
    "CREATE INDEX IF NOT EXISTS routes_vaultbox_idx ON routes (vaultbox_id)",
];

/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use async_trait::async_trait;
use trc::{AuthEvent, EventBuilder};

#[async_trait]
pub trait ImapDriver: Sync + Send {
    /// Signals the IMAP daemon to pick up the rewritten credential file.
    async fn reload(&self) -> trc::Result<()>;

    /// Drops any cached authentication state for `username`.
    async fn flush_auth_cache(&self, username: &str) -> trc::Result<()>;
}

/// Default driver backed by `doveadm`.
pub struct DovecotDriver {
    pub doveadm_bin: String,
    pub disable_reload: bool,
}

impl Default for DovecotDriver {
    fn default() -> Self {
        DovecotDriver {
            doveadm_bin: "doveadm".to_string(),
            disable_reload: false,
        }
    }
}

async fn doveadm(bin: &str, args: &[&str]) -> trc::Result<()> {
    let output = tokio::process::Command::new(bin)
        .args(args)
        .output()
        .await
        .map_err(|err| trc::EventType::Auth(AuthEvent::Failed).reason(err))?;
    if output.status.success() {
        Ok(())
    } else {
        Err(trc::EventType::Auth(AuthEvent::Failed)
            .reason(String::from_utf8_lossy(&output.stderr).trim().to_string())
            .ctx(trc::Key::Status, output.status.code().unwrap_or(-1) as i64))
    }
}

#[async_trait]
impl ImapDriver for DovecotDriver {
    async fn reload(&self) -> trc::Result<()> {
        if self.disable_reload {
            return Ok(());
        }
        doveadm(&self.doveadm_bin, &["reload"]).await
    }

    async fn flush_auth_cache(&self, username: &str) -> trc::Result<()> {
        if self.disable_reload {
            return Ok(());
        }
        doveadm(&self.doveadm_bin, &["auth", "cache", "flush", username]).await
    }
}

#[cfg(any(test, feature = "test_mode"))]
pub mod test {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    pub struct RecordingImapDriver {
        pub reloads: Mutex<u64>,
        pub flushed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ImapDriver for RecordingImapDriver {
        async fn reload(&self) -> trc::Result<()> {
            *self.reloads.lock() += 1;
            Ok(())
        }

        async fn flush_auth_cache(&self, username: &str) -> trc::Result<()> {
            self.flushed.lock().push(username.to_string());
            Ok(())
        }
    }
}

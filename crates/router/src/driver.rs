/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::path::Path;

use async_trait::async_trait;
use trc::{EventBuilder, RouterEvent};

#[async_trait]
pub trait MtaDriver: Sync + Send {
    /// Compiles the on-disk map into whatever the MTA consumes at
    /// delivery time.
    async fn compile(&self, map_path: &Path) -> trc::Result<()>;

    /// Asks the MTA to pick up the new configuration.
    async fn reload(&self) -> trc::Result<()>;
}

/// Default driver: `postmap` + `systemctl reload postfix`.
pub struct PostfixDriver {
    pub postmap_bin: String,
    pub systemctl_bin: String,
    pub service: String,
    pub disable_reload: bool,
}

impl Default for PostfixDriver {
    fn default() -> Self {
        PostfixDriver {
            postmap_bin: "postmap".to_string(),
            systemctl_bin: "systemctl".to_string(),
            service: "postfix".to_string(),
            disable_reload: false,
        }
    }
}

async fn run_checked(
    command: &str,
    args: &[&str],
    event: RouterEvent,
) -> trc::Result<()> {
    let output = tokio::process::Command::new(command)
        .args(args)
        .output()
        .await
        .map_err(|err| trc::EventType::Router(event).reason(err))?;

    if output.status.success() {
        Ok(())
    } else {
        Err(trc::EventType::Router(event)
            .reason(String::from_utf8_lossy(&output.stderr).trim().to_string())
            .ctx(trc::Key::Status, output.status.code().unwrap_or(-1) as i64))
    }
}

#[async_trait]
impl MtaDriver for PostfixDriver {
    async fn compile(&self, map_path: &Path) -> trc::Result<()> {
        let path = map_path.to_string_lossy();
        run_checked(&self.postmap_bin, &[path.as_ref()], RouterEvent::CompileError).await
    }

    async fn reload(&self) -> trc::Result<()> {
        if self.disable_reload {
            return Ok(());
        }
        run_checked(
            &self.systemctl_bin,
            &["reload", &self.service],
            RouterEvent::ReloadError,
        )
        .await?;
        trc::event!(Router(ReloadSuccess));
        Ok(())
    }
}

#[cfg(any(test, feature = "test_mode"))]
pub mod test {
    use super::*;
    use parking_lot::Mutex;

    /// Records invocations instead of touching an MTA; optionally fails
    /// the reload to exercise partial-state reporting.
    #[derive(Default)]
    pub struct RecordingDriver {
        pub compiles: Mutex<Vec<std::path::PathBuf>>,
        pub reloads: Mutex<u64>,
        pub fail_reload: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl MtaDriver for RecordingDriver {
        async fn compile(&self, map_path: &Path) -> trc::Result<()> {
            self.compiles.lock().push(map_path.to_path_buf());
            Ok(())
        }

        async fn reload(&self) -> trc::Result<()> {
            if self.fail_reload.load(std::sync::atomic::Ordering::Relaxed) {
                return Err(trc::EventType::Router(RouterEvent::ReloadError)
                    .details("reload disabled by test"));
            }
            *self.reloads.lock() += 1;
            Ok(())
        }
    }
}

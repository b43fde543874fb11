/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::{
    io::Write,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use trc::{EventBuilder, IntakeEvent};

/// A `Maildir/` with its three standard subdirectories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Maildir {
    root: PathBuf,
}

impl Maildir {
    pub fn at(mailbox_home: &Path) -> Self {
        Maildir {
            root: mailbox_home.join("Maildir"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn new_dir(&self) -> PathBuf {
        self.root.join("new")
    }

    /// Creates `tmp/`, `new/` and `cur/` with `0700` and hands the tree to
    /// the IMAP service user.
    pub fn ensure(&self, uid: Option<u32>, gid: Option<u32>) -> trc::Result<()> {
        for sub in ["tmp", "new", "cur"] {
            let dir = self.root.join(sub);
            std::fs::create_dir_all(&dir).map_err(|err| self.io_error(err, &dir))?;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            for dir in [
                self.root.clone(),
                self.root.join("tmp"),
                self.root.join("new"),
                self.root.join("cur"),
            ] {
                std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))
                    .map_err(|err| self.io_error(err, &dir))?;
                std::os::unix::fs::chown(&dir, uid, gid)
                    .map_err(|err| self.io_error(err, &dir))?;
            }
        }
        #[cfg(not(unix))]
        {
            let _ = (uid, gid);
        }
        Ok(())
    }

    /// Atomic delivery: write to `tmp/`, fsync, rename into `new/`. The
    /// returned path is the file under `new/`.
    pub fn deliver(
        &self,
        contents: &[u8],
        uid: Option<u32>,
        gid: Option<u32>,
    ) -> trc::Result<PathBuf> {
        let filename = unique_filename();
        let tmp_path = self.root.join("tmp").join(&filename);
        let new_path = self.root.join("new").join(&filename);

        let result = (|| -> std::io::Result<()> {
            let mut file = std::fs::File::create(&tmp_path)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
            }
            file.write_all(contents)?;
            file.sync_all()?;
            drop(file);
            #[cfg(unix)]
            std::os::unix::fs::chown(&tmp_path, uid, gid)?;
            #[cfg(not(unix))]
            let _ = (uid, gid);
            std::fs::rename(&tmp_path, &new_path)?;
            utils::file::sync_directory(&self.root.join("new"));
            Ok(())
        })();

        match result {
            Ok(()) => Ok(new_path),
            Err(err) => {
                // Leave nothing behind in tmp/ on a failed delivery.
                let _ = std::fs::remove_file(&tmp_path);
                Err(self.io_error(err, &new_path))
            }
        }
    }

    pub fn remove_tree(mailbox_home: &Path) -> std::io::Result<()> {
        match std::fs::remove_dir_all(mailbox_home) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn io_error(&self, err: std::io::Error, path: &Path) -> trc::Error {
        trc::EventType::Intake(IntakeEvent::MaildirError)
            .reason(err)
            .ctx(trc::Key::Path, path.display().to_string())
    }
}

/// `<millis>.<random>.<host>`, unique per delivery.
fn unique_filename() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis());
    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "localhost".to_string());
    format!("{}.{:016x}.{}", millis, rand::random::<u64>(), host)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_home() -> PathBuf {
        std::env::temp_dir().join(format!(
            "maildir-test-{}-{}",
            std::process::id(),
            utils::rand_suffix(6)
        ))
    }

    #[test]
    fn skeleton_and_delivery() {
        let home = temp_home();
        let maildir = Maildir::at(&home);
        maildir.ensure(None, None).unwrap();
        for sub in ["tmp", "new", "cur"] {
            assert!(maildir.root().join(sub).is_dir());
        }

        let path = maildir.deliver(b"MIME-Version: 1.0\r\n\r\nx", None, None).unwrap();
        assert!(path.starts_with(maildir.new_dir()));
        assert_eq!(
            std::fs::read(&path).unwrap(),
            b"MIME-Version: 1.0\r\n\r\nx".to_vec()
        );

        // Nothing remains in tmp/ after a successful delivery.
        assert_eq!(
            std::fs::read_dir(maildir.root().join("tmp")).unwrap().count(),
            0
        );
        Maildir::remove_tree(&home).unwrap();
        assert!(!home.exists());
    }

    #[test]
    fn filenames_are_unique() {
        let a = unique_filename();
        let b = unique_filename();
        assert_ne!(a, b);
        assert_eq!(a.split('.').count() >= 3, true);
    }

    #[cfg(unix)]
    #[test]
    fn permissions_are_private() {
        use std::os::unix::fs::PermissionsExt;

        let home = temp_home();
        let maildir = Maildir::at(&home);
        maildir.ensure(None, None).unwrap();
        let mode = std::fs::metadata(maildir.root()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
        Maildir::remove_tree(&home).unwrap();
    }
}

/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::{
    fmt::Write as _,
    path::{Path, PathBuf},
};

use tokio::sync::Mutex;
use trc::{AuthEvent, EventBuilder};

/// The credential file consumed by the IMAP daemon. One line per user:
/// `username:{SCHEME}hash` followed by tab-separated `userdb_*` overrides
/// pinning the Maildir to the mailbox. Rewritten atomically, mode 0640.
pub struct PasswdFile {
    path: PathBuf,
    write_lock: Mutex<()>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswdEntry {
    pub username: String,
    pub password_hash: String,
    pub home: Option<String>,
    pub mail: Option<String>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

impl PasswdEntry {
    fn to_line(&self) -> String {
        let mut line = format!("{}:{{ARGON2ID}}{}", self.username, self.password_hash);
        if let Some(home) = &self.home {
            let _ = write!(line, "\tuserdb_home={home}");
        }
        if let Some(mail) = &self.mail {
            let _ = write!(line, "\tuserdb_mail={mail}");
        }
        if let Some(uid) = self.uid {
            let _ = write!(line, "\tuserdb_uid={uid}");
        }
        if let Some(gid) = self.gid {
            let _ = write!(line, "\tuserdb_gid={gid}");
        }
        line
    }

    fn parse(line: &str) -> Option<Self> {
        let (username, rest) = line.split_once(':')?;
        let mut fields = rest.split('\t');
        let password_hash = fields.next()?.to_string();
        let mut entry = PasswdEntry {
            username: username.to_string(),
            password_hash: password_hash
                .strip_prefix("{ARGON2ID}")
                .map(|hash| hash.to_string())
                .unwrap_or(password_hash),
            home: None,
            mail: None,
            uid: None,
            gid: None,
        };
        for field in fields {
            match field.split_once('=') {
                Some(("userdb_home", value)) => entry.home = Some(value.to_string()),
                Some(("userdb_mail", value)) => entry.mail = Some(value.to_string()),
                Some(("userdb_uid", value)) => entry.uid = value.parse().ok(),
                Some(("userdb_gid", value)) => entry.gid = value.parse().ok(),
                _ => (),
            }
        }
        Some(entry)
    }
}

impl PasswdFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        PasswdFile {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn upsert(&self, entry: PasswdEntry) -> trc::Result<()> {
        self.rewrite(|entries| {
            entries.retain(|existing| existing.username != entry.username);
            entries.push(entry);
        })
        .await
    }

    pub async fn remove(&self, username: &str) -> trc::Result<bool> {
        let mut removed = false;
        self.rewrite(|entries| {
            let before = entries.len();
            entries.retain(|existing| existing.username != username);
            removed = entries.len() != before;
        })
        .await?;
        Ok(removed)
    }

    pub async fn read(&self) -> trc::Result<Vec<PasswdEntry>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(content.lines().filter_map(PasswdEntry::parse).collect()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(trc::EventType::Auth(AuthEvent::Failed)
                .reason(err)
                .ctx(trc::Key::Path, self.path.display().to_string())
                .details("credential file read failed")),
        }
    }

    async fn rewrite(&self, mutate: impl FnOnce(&mut Vec<PasswdEntry>)) -> trc::Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.read().await?;
        mutate(&mut entries);

        let mut content = String::new();
        for entry in &entries {
            content.push_str(&entry.to_line());
            content.push('\n');
        }
        utils::file::atomic_write(&self.path, content.as_bytes(), Some(0o640)).map_err(|err| {
            trc::EventType::Auth(AuthEvent::Failed)
                .reason(err)
                .ctx(trc::Key::Path, self.path.display().to_string())
                .details("credential file write failed")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_passwd() -> PasswdFile {
        let dir = std::env::temp_dir().join(format!(
            "passwd-test-{}-{}",
            std::process::id(),
            utils::rand_suffix(6)
        ));
        std::fs::create_dir_all(&dir).unwrap();
        PasswdFile::new(dir.join("passwd"))
    }

    #[tokio::test]
    async fn upsert_remove_round_trip() {
        let passwd = temp_passwd();
        passwd
            .upsert(PasswdEntry {
                username: "cat@call.autoroad.lv".to_string(),
                password_hash: "$argon2id$v=19$m=65536,t=3,p=1$salt$hash".to_string(),
                home: Some("/var/vmail/42".to_string()),
                mail: Some("maildir:/var/vmail/42/Maildir".to_string()),
                uid: Some(5000),
                gid: Some(5000),
            })
            .await
            .unwrap();

        let entries = passwd.read().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].username, "cat@call.autoroad.lv");
        assert_eq!(
            entries[0].mail.as_deref(),
            Some("maildir:/var/vmail/42/Maildir")
        );
        assert!(entries[0].password_hash.starts_with("$argon2id$"));

        // Upserting the same user replaces the line.
        passwd
            .upsert(PasswdEntry {
                username: "cat@call.autoroad.lv".to_string(),
                password_hash: "$argon2id$new".to_string(),
                home: None,
                mail: None,
                uid: None,
                gid: None,
            })
            .await
            .unwrap();
        let entries = passwd.read().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].password_hash, "$argon2id$new");

        assert!(passwd.remove("cat@call.autoroad.lv").await.unwrap());
        assert!(passwd.read().await.unwrap().is_empty());
        let _ = std::fs::remove_dir_all(passwd.path().parent().unwrap());
    }

    #[test]
    fn line_format() {
        let entry = PasswdEntry {
            username: "info@carmarket.lv".to_string(),
            password_hash: "$argon2id$x".to_string(),
            home: Some("/var/vmail/info".to_string()),
            mail: Some("maildir:/var/vmail/info/Maildir".to_string()),
            uid: Some(5000),
            gid: Some(5000),
        };
        let line = entry.to_line();
        assert_eq!(
            line,
            "info@carmarket.lv:{ARGON2ID}$argon2id$x\tuserdb_home=/var/vmail/info\
             \tuserdb_mail=maildir:/var/vmail/info/Maildir\tuserdb_uid=5000\tuserdb_gid=5000"
        );
        assert_eq!(PasswdEntry::parse(&line), Some(entry));
    }
}

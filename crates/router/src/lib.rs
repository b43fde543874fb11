/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

pub mod driver;
pub mod map;

use std::{
    fmt::Display,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use driver::MtaDriver;
use map::TransportMap;
use store::{route::NewRouteAudit, route::RouteType, Store};
use tokio::sync::Mutex;
use trc::{AddContext, EventBuilder, RouterEvent};
use utils::snowflake::SnowflakeIdGenerator;

/// Transport target of a map entry. Catch-all entries carry a rewrite
/// address rather than a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTarget {
    EncryptedPipe(i64),
    SimpleMaildir(String),
    Rewrite(String),
}

impl Display for RouteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteTarget::EncryptedPipe(id) => write!(f, "encimap-pipe:{id}"),
            RouteTarget::SimpleMaildir(username) => write!(f, "simple-maildir:{username}"),
            RouteTarget::Rewrite(address) => f.write_str(address),
        }
    }
}

impl RouteTarget {
    pub fn route_type(&self) -> RouteType {
        match self {
            RouteTarget::EncryptedPipe(_) => RouteType::EncryptedImap,
            RouteTarget::SimpleMaildir(_) => RouteType::SimpleImap,
            RouteTarget::Rewrite(_) => RouteType::Catchall,
        }
    }
}

pub struct Router {
    map_path: PathBuf,
    driver: Arc<dyn MtaDriver>,
    store: Store,
    id_gen: Arc<SnowflakeIdGenerator>,
    write_lock: Mutex<()>,
    last_reload_ok: AtomicBool,
}

impl Router {
    pub fn new(
        map_path: impl Into<PathBuf>,
        driver: Arc<dyn MtaDriver>,
        store: Store,
        id_gen: Arc<SnowflakeIdGenerator>,
    ) -> Self {
        Router {
            map_path: map_path.into(),
            driver,
            store,
            id_gen,
            write_lock: Mutex::new(()),
            last_reload_ok: AtomicBool::new(true),
        }
    }

    pub fn map_path(&self) -> &Path {
        &self.map_path
    }

    pub fn last_reload_ok(&self) -> bool {
        self.last_reload_ok.load(Ordering::Relaxed)
    }

    pub async fn add_email_route(
        &self,
        address: &str,
        vaultbox_id: i64,
        target: RouteTarget,
    ) -> trc::Result<()> {
        let address = normalize_address(address);
        let target_str = target.to_string();
        self.apply(|map| {
            map.upsert(&address, &target_str);
        })
        .await
        .caused_by(trc::location!())?;

        trc::event!(
            Router(RouteAdded),
            Key = address.clone(),
            Value = target_str.clone(),
            VaultboxId = vaultbox_id as u64
        );
        self.audit(
            Some(address),
            None,
            vaultbox_id,
            target.route_type(),
            true,
            serde_json::json!({ "target": target_str }),
        )
        .await;
        Ok(())
    }

    pub async fn remove_email_route(
        &self,
        address: &str,
        vaultbox_id: Option<i64>,
    ) -> trc::Result<bool> {
        let address = normalize_address(address);
        let mut removed = false;
        self.apply(|map| {
            removed = map.remove(&address);
        })
        .await
        .caused_by(trc::location!())?;

        if removed {
            trc::event!(Router(RouteRemoved), Key = address.clone());
        }
        if let Some(vaultbox_id) = vaultbox_id {
            if let Err(err) = async {
                let client = self.store.client().await?;
                store::route::deactivate(&**client, vaultbox_id, Some(address.as_str())).await
            }
            .await
            {
                trc::error!(err.ctx(trc::Key::Details, "route audit deactivate failed"));
            }
        }
        Ok(removed)
    }

    /// Legacy per-domain route. Kept for deployments that still pipe whole
    /// domains; the lifecycle service never installs these.
    pub async fn add_domain_route(&self, domain: &str, vaultbox_id: i64) -> trc::Result<()> {
        let domain = domain.to_lowercase();
        let target = RouteTarget::EncryptedPipe(vaultbox_id);
        let target_str = target.to_string();
        self.apply(|map| {
            map.upsert(&domain, &target_str);
        })
        .await
        .caused_by(trc::location!())?;

        trc::event!(
            Router(RouteAdded),
            Key = domain.clone(),
            Value = target_str.clone()
        );
        self.audit(
            None,
            Some(domain),
            vaultbox_id,
            RouteType::EncryptedImap,
            true,
            serde_json::json!({ "target": target_str, "legacy": true }),
        )
        .await;
        Ok(())
    }

    pub async fn remove_domain_route(&self, domain: &str) -> trc::Result<bool> {
        let domain = domain.to_lowercase();
        let mut removed = false;
        self.apply(|map| {
            removed = map.remove(&domain);
        })
        .await
        .caused_by(trc::location!())?;
        Ok(removed)
    }

    pub async fn add_catchall_route(
        &self,
        domain: &str,
        target: &str,
        vaultbox_id: i64,
    ) -> trc::Result<()> {
        let key = format!("@{}", domain.to_lowercase());
        self.apply(|map| {
            map.upsert(&key, target);
        })
        .await
        .caused_by(trc::location!())?;

        trc::event!(
            Router(RouteAdded),
            Key = key,
            Value = target.to_string(),
            VaultboxId = vaultbox_id as u64
        );
        self.audit(
            None,
            Some(domain.to_lowercase()),
            vaultbox_id,
            RouteType::Catchall,
            true,
            serde_json::json!({ "target": target }),
        )
        .await;
        Ok(())
    }

    pub async fn remove_catchall_route(&self, domain: &str) -> trc::Result<bool> {
        let key = format!("@{}", domain.to_lowercase());
        let mut removed = false;
        self.apply(|map| {
            removed = map.remove(&key);
        })
        .await
        .caused_by(trc::location!())?;
        if removed {
            trc::event!(Router(RouteRemoved), Key = key);
        }
        Ok(removed)
    }

    pub async fn list_routes(&self) -> trc::Result<Vec<(String, String)>> {
        let map = self.read_map().await.caused_by(trc::location!())?;
        Ok(map
            .entries()
            .map(|(key, target)| (key.to_string(), target.to_string()))
            .collect())
    }

    /// Resolves `address` the way the MTA would: exact key first, then the
    /// `@domain` catch-all, then the bare domain.
    pub async fn test_route(&self, address: &str) -> trc::Result<Option<String>> {
        let address = normalize_address(address);
        let map = self.read_map().await.caused_by(trc::location!())?;
        if let Some(target) = map.lookup(&address) {
            return Ok(Some(target.to_string()));
        }
        if let Some((_, domain)) = address.rsplit_once('@') {
            if let Some(target) = map.lookup(&format!("@{domain}")) {
                return Ok(Some(target.to_string()));
            }
            if let Some(target) = map.lookup(domain) {
                return Ok(Some(target.to_string()));
            }
        }
        Ok(None)
    }

    pub async fn reload(&self) -> trc::Result<()> {
        self.driver.reload().await
    }

    async fn read_map(&self) -> trc::Result<TransportMap> {
        match tokio::fs::read_to_string(&self.map_path).await {
            Ok(content) => Ok(TransportMap::parse(&content)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Ok(TransportMap::default())
            }
            Err(err) => Err(trc::EventType::Router(RouterEvent::MapReadError)
                .reason(err)
                .ctx(trc::Key::Path, self.map_path.display().to_string())),
        }
    }

    /// Read-modify-write under the process-wide mutex plus an advisory
    /// file lock for multi-process deployments. The mutex is released
    /// before the MTA reload tail; a failed reload is reported and left
    /// for the next successful reload to repair.
    async fn apply(&self, mutate: impl FnOnce(&mut TransportMap)) -> trc::Result<()> {
        {
            let _guard = self.write_lock.lock().await;
            let _file_lock = FileLock::acquire(&self.map_path).await?;

            let mut map = self.read_map().await?;
            mutate(&mut map);
            utils::file::atomic_write(&self.map_path, map.serialize().as_bytes(), Some(0o644))
                .map_err(|err| {
                    trc::EventType::Router(RouterEvent::MapWriteError)
                        .reason(err)
                        .ctx(trc::Key::Path, self.map_path.display().to_string())
                })?;

            self.driver.compile(&self.map_path).await?;
        }

        match self.driver.reload().await {
            Ok(()) => {
                self.last_reload_ok.store(true, Ordering::Relaxed);
            }
            Err(err) => {
                self.last_reload_ok.store(false, Ordering::Relaxed);
                trc::error!(err.ctx(trc::Key::Details, "map written, reload pending"));
            }
        }
        Ok(())
    }

    async fn audit(
        &self,
        email_address: Option<String>,
        domain: Option<String>,
        vaultbox_id: i64,
        route_type: RouteType,
        active: bool,
        options: serde_json::Value,
    ) {
        let audit = NewRouteAudit {
            id: self.id_gen.generate() as i64,
            email_address,
            domain,
            vaultbox_id,
            route_type,
            priority: 0,
            active,
            options,
        };
        let result = async {
            let client = self.store.client().await?;
            store::route::insert(&**client, &audit).await
        }
        .await;
        if let Err(err) = result {
            trc::error!(trc::EventType::Router(RouterEvent::AuditError)
                .reason(err)
                .ctx(trc::Key::VaultboxId, vaultbox_id as u64));
        }
    }
}

fn normalize_address(address: &str) -> String {
    match address.rsplit_once('@') {
        Some((local, domain)) => format!("{}@{}", local, domain.to_lowercase()),
        None => address.to_lowercase(),
    }
}

/// Advisory lock on a sibling of the map file; serializes writers across
/// processes. Released when dropped.
struct FileLock {
    #[cfg(unix)]
    file: std::fs::File,
}

impl FileLock {
    async fn acquire(map_path: &Path) -> trc::Result<Self> {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;

            let lock_path = map_path.with_extension("lock");
            let file = tokio::task::spawn_blocking(move || {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .truncate(false)
                    .write(true)
                    .open(&lock_path)?;
                if unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) } != 0 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(file)
            })
            .await
            .map_err(|err| {
                trc::EventType::Server(trc::ServerEvent::ThreadError).reason(err)
            })?
            .map_err(|err: std::io::Error| {
                trc::EventType::Router(RouterEvent::MapWriteError)
                    .reason(err)
                    .details("failed to acquire map lock")
            })?;
            Ok(FileLock { file })
        }
        #[cfg(not(unix))]
        {
            let _ = map_path;
            Ok(FileLock {})
        }
    }
}

#[cfg(unix)]
impl Drop for FileLock {
    fn drop(&mut self) {
        use std::os::unix::io::AsRawFd;
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}

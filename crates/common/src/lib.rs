/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

pub mod auth;
pub mod config;
pub mod listener;
pub mod subscription;

use std::{sync::Arc, time::Instant};

use config::Settings;
use directory::{imap::ImapDriver, passwd::PasswdFile, Directory};
use router::{driver::MtaDriver, Router};
use store::Store;
use subscription::SubscriptionService;
use tokio::sync::watch;
use trc::AddContext;
use utils::snowflake::SnowflakeIdGenerator;

pub static DAEMON_NAME: &str = concat!("Encimap Server v", env!("CARGO_PKG_VERSION"));

/// Statically wired composition root. Every component receives its
/// collaborators here; nothing is looked up at request time.
#[derive(Clone)]
pub struct Server {
    pub inner: Arc<Inner>,
    pub core: Arc<Core>,
}

pub struct Inner {
    pub data: Data,
    pub shutdown_tx: watch::Sender<bool>,
}

pub struct Data {
    pub id_gen: Arc<SnowflakeIdGenerator>,
    pub start_time: Instant,
}

pub struct Core {
    pub settings: Settings,
    pub storage: Store,
    pub router: Router,
    pub directory: Directory,
    pub auth: auth::AuthValidator,
    pub subscription: Arc<dyn SubscriptionService>,
}

impl Server {
    pub async fn build(settings: Settings) -> trc::Result<Self> {
        let id_gen = Arc::new(SnowflakeIdGenerator::new());

        let storage = Store::open(
            &settings.database_url,
            settings.legacy_database_url.as_deref(),
            settings.db_pool_size,
        )
        .await
        .caused_by(trc::location!())?;
        storage.init().await.caused_by(trc::location!())?;

        let mta_driver: Arc<dyn MtaDriver> = Arc::new(router::driver::PostfixDriver {
            disable_reload: settings.mta_disable_reload,
            ..Default::default()
        });
        let imap_driver: Arc<dyn ImapDriver> = Arc::new(directory::imap::DovecotDriver {
            disable_reload: settings.mta_disable_reload,
            ..Default::default()
        });

        Ok(Self::with_adapters(
            settings, storage, id_gen, mta_driver, imap_driver,
        ))
    }

    /// Wires the composition root with explicit drivers; tests install
    /// recording drivers here.
    pub fn with_adapters(
        settings: Settings,
        storage: Store,
        id_gen: Arc<SnowflakeIdGenerator>,
        mta_driver: Arc<dyn MtaDriver>,
        imap_driver: Arc<dyn ImapDriver>,
    ) -> Self {
        let router = Router::new(
            settings.transport_map.clone(),
            mta_driver,
            storage.clone(),
            id_gen.clone(),
        );
        let directory = Directory {
            store: storage.clone(),
            imap_driver,
            passwd: PasswdFile::new(settings.imap_passwd_file.clone()),
            maildir_root: settings.maildir_root.clone(),
            maildir_uid: settings.maildir_uid,
            maildir_gid: settings.maildir_gid,
            id_gen: id_gen.clone(),
            smtp_host: settings.smtp_host.clone(),
        };
        let auth = auth::AuthValidator::new(&settings.jwt);
        let subscription = subscription::build(settings.subscription_url.as_deref());

        let (shutdown_tx, _) = watch::channel(false);

        Server {
            inner: Arc::new(Inner {
                data: Data {
                    id_gen,
                    start_time: Instant::now(),
                },
                shutdown_tx,
            }),
            core: Arc::new(Core {
                settings,
                storage,
                router,
                directory,
                auth,
                subscription,
            }),
        }
    }

    pub fn generate_id(&self) -> i64 {
        self.inner.data.id_gen.generate() as i64
    }

    pub fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.inner.shutdown_tx.subscribe()
    }

    pub fn shutdown(&self) {
        let _ = self.inner.shutdown_tx.send(true);
    }
}

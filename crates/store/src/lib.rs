/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

pub mod alias;
pub mod catchall;
pub mod certificate;
pub mod credential;
pub mod legacy;
pub mod message;
pub mod query;
pub mod route;
pub mod schema;
pub mod vaultbox;

use std::{future::Future, pin::Pin, str::FromStr, time::Duration};

use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::NoTls;
use trc::{AddContext, EventBuilder, StoreEvent};

pub use tokio_postgres::GenericClient;

/// Handle to the metadata store. `pool` holds the vaultbox metadata
/// database; `legacy_pool` (optional) holds the legacy outbound credential
/// database used by unified SMTP authentication.
#[derive(Clone)]
pub struct Store {
    pool: Pool,
    legacy_pool: Option<Pool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Isolation {
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl Isolation {
    fn as_sql(&self) -> &'static str {
        match self {
            Isolation::ReadCommitted => "READ COMMITTED",
            Isolation::RepeatableRead => "REPEATABLE READ",
            Isolation::Serializable => "SERIALIZABLE",
        }
    }
}

pub type TxFuture<'a, T> = Pin<Box<dyn Future<Output = trc::Result<T>> + Send + 'a>>;

impl Store {
    pub async fn open(url: &str, legacy_url: Option<&str>, pool_size: usize) -> trc::Result<Self> {
        let store = Self::open_lazy(url, legacy_url, pool_size)?;

        // Fail fast on an unreachable database.
        store
            .client()
            .await
            .caused_by(trc::location!())?
            .simple_query("SELECT 1")
            .await
            .map_err(into_error)?;

        Ok(store)
    }

    /// Builds the pools without probing connectivity; connections are
    /// established on first use.
    pub fn open_lazy(url: &str, legacy_url: Option<&str>, pool_size: usize) -> trc::Result<Self> {
        Ok(Store {
            pool: build_pool(url, pool_size)?,
            legacy_pool: legacy_url.map(|url| build_pool(url, pool_size)).transpose()?,
        })
    }

    pub async fn init(&self) -> trc::Result<()> {
        let client = self.client().await.caused_by(trc::location!())?;
        for statement in schema::STATEMENTS {
            client
                .simple_query(statement)
                .await
                .map_err(into_error)
                .add_context(|err| err.ctx(trc::Key::Details, *statement))?;
        }
        Ok(())
    }

    pub async fn client(&self) -> trc::Result<deadpool_postgres::Client> {
        self.pool.get().await.map_err(into_pool_error)
    }

    pub async fn legacy_client(&self) -> trc::Result<Option<deadpool_postgres::Client>> {
        match &self.legacy_pool {
            Some(pool) => pool.get().await.map_err(into_pool_error).map(Some),
            None => Ok(None),
        }
    }

    pub fn has_legacy(&self) -> bool {
        self.legacy_pool.is_some()
    }

    /// Runs `f` inside a transaction. Commits on `Ok`, rolls back and
    /// propagates the original error otherwise. Serialization failures are
    /// surfaced as retryable; retrying is the caller's decision.
    pub async fn transaction<T, F>(&self, isolation: Isolation, f: F) -> trc::Result<T>
    where
        T: Send,
        F: for<'a> FnOnce(&'a tokio_postgres::Transaction<'a>) -> TxFuture<'a, T>,
    {
        let mut client = self.client().await.caused_by(trc::location!())?;
        let tx = client.transaction().await.map_err(into_error)?;
        tx.execute(
            &format!("SET TRANSACTION ISOLATION LEVEL {}", isolation.as_sql()),
            &[],
        )
        .await
        .map_err(into_error)?;

        match f(&tx).await {
            Ok(value) => {
                tx.commit().await.map_err(into_error)?;
                Ok(value)
            }
            Err(err) => {
                // Rollback happens on drop; an explicit abort surfaces
                // connection errors instead of masking them.
                let _ = tx.rollback().await;
                Err(err)
            }
        }
    }

    pub async fn ping(&self) -> trc::Result<()> {
        self.client()
            .await?
            .simple_query("SELECT 1")
            .await
            .map_err(into_error)
            .map(|_| ())
    }
}

fn build_pool(url: &str, pool_size: usize) -> trc::Result<Pool> {
    let config = tokio_postgres::Config::from_str(url).map_err(|err| {
        trc::EventType::Config(trc::ConfigEvent::InvalidSetting)
            .reason(err)
            .details("Invalid database URL")
    })?;

    let manager = Manager::from_config(
        config,
        NoTls,
        ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        },
    );

    Pool::builder(manager)
        .max_size(pool_size)
        .create_timeout(Duration::from_secs(30).into())
        .wait_timeout(Duration::from_secs(30).into())
        .runtime(deadpool_postgres::Runtime::Tokio1)
        .build()
        .map_err(|err| {
            trc::EventType::Store(StoreEvent::PoolError)
                .reason(err)
                .caused_by(trc::location!())
        })
}

pub fn into_error(err: tokio_postgres::Error) -> trc::Error {
    use tokio_postgres::error::SqlState;

    if let Some(db_err) = err.as_db_error() {
        let code = db_err.code();
        if code == &SqlState::T_R_SERIALIZATION_FAILURE || code == &SqlState::T_R_DEADLOCK_DETECTED
        {
            trc::EventType::Store(StoreEvent::SerializationFailure).reason(db_err)
        } else if code.code().starts_with("23") {
            trc::EventType::Store(StoreEvent::ConstraintViolation)
                .reason(db_err)
                .ctx_opt(
                    trc::Key::Constraint,
                    db_err.constraint().map(|c| c.to_string()),
                )
        } else {
            trc::EventType::Store(StoreEvent::SqlQueryError).reason(db_err)
        }
    } else {
        trc::EventType::Store(StoreEvent::SqlQueryError).reason(err)
    }
}

fn into_pool_error(err: deadpool_postgres::PoolError) -> trc::Error {
    trc::EventType::Store(StoreEvent::PoolError).reason(err)
}

pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for trc::Error {
    fn is_retryable(&self) -> bool {
        matches!(
            self.inner,
            trc::EventType::Store(StoreEvent::SerializationFailure)
                | trc::EventType::Store(StoreEvent::PoolError)
        )
    }
}

pub trait IsConstraintViolation {
    fn is_constraint_violation(&self, constraint: &str) -> bool;
}

impl IsConstraintViolation for trc::Error {
    fn is_constraint_violation(&self, constraint: &str) -> bool {
        self.matches(trc::EventType::Store(StoreEvent::ConstraintViolation))
            && self.value_as_str(trc::Key::Constraint) == Some(constraint)
    }
}

//! Postgres backend for the database sink

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;
use tracing::info;

use super::{InsertBackend, SinkError};
use crate::config::DatabaseConfig;

/// A single Postgres connection with one open transaction at a time.
///
/// The pool is capped at one connection: the sink serializes all writes, and
/// the open transaction holds that connection until commit or rollback.
pub struct PostgresBackend {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
}

impl PostgresBackend {
    /// Connect eagerly, so an unreachable database fails before any worker starts
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, SinkError> {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.username)
            .password(&config.password)
            .database(&config.database);

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect_with(options)
            .await?;

        info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            "Database connection established"
        );

        Ok(Self { pool, tx: None })
    }
}

#[async_trait]
impl InsertBackend for PostgresBackend {
    async fn insert(&mut self, query: &str, values: &[String]) -> Result<(), SinkError> {
        if self.tx.is_none() {
            self.tx = Some(self.pool.begin().await?);
        }
        let tx = self.tx.as_mut().ok_or(SinkError::Closed)?;

        let mut query = sqlx::query(query);
        for value in values {
            query = query.bind(value.as_str());
        }
        query.execute(&mut **tx).await?;

        Ok(())
    }

    async fn commit(&mut self) -> Result<(), SinkError> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), SinkError> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        let result = self.rollback().await;
        self.pool.close().await;
        result
    }
}

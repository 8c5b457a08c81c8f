//! Shared helpers for credparse-ingest integration tests

#![allow(dead_code)]

use anyhow::{Context, Result};
use credparse_ingest::config::DatabaseConfig;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::path::{Path, PathBuf};
use std::time::Duration;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tracing::info;

pub fn init_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,credparse_ingest=debug,sqlx=warn,testcontainers=info")
        }))
        .with_test_writer()
        .try_init();
}

/// Write `content` to `dir/name` and return the path
pub fn write_input(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap_or_else(|e| panic!("writing {}: {e}", path.display()));
    path
}

/// `count` lines of the form `<prefix>user<i>:pass<i>`
pub fn numbered_lines(prefix: &str, count: usize) -> String {
    (0..count)
        .map(|i| format!("{prefix}user{i}:pass{i}\n"))
        .collect()
}

/// Postgres container with a ready `credentials` table
pub struct TestPostgres {
    container: ContainerAsync<Postgres>,
    pool: PgPool,
    host: String,
    port: u16,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        info!("Starting PostgreSQL test container...");

        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get container host")?
            .to_string();
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;

        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&format!("postgresql://postgres:postgres@{host}:{port}/postgres"))
            .await
            .context("Failed to connect to PostgreSQL")?;

        sqlx::query(
            "CREATE TABLE credentials (
                id BIGSERIAL PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                password TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .context("Failed to create credentials table")?;

        Ok(Self {
            container,
            pool,
            host,
            port,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Sink settings pointing at this container
    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig {
            host: self.host.clone(),
            port: self.port,
            username: "postgres".to_string(),
            password: "postgres".to_string(),
            database: "postgres".to_string(),
            table: "credentials".to_string(),
            ..DatabaseConfig::default()
        }
    }

    pub async fn usernames(&self) -> Result<Vec<String>> {
        sqlx::query_scalar("SELECT username FROM credentials ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .context("Failed to read credentials")
    }
}

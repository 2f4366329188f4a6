//! Best-effort MySQL mirror of the run's records.
//!
//! The workbook is the durable output; the mirror exists so downstream
//! consumers can query across runs. Connection parameters come from the
//! environment, one connection is opened per flush and closed right after,
//! and write failures are logged and swallowed by the sink.

use std::path::PathBuf;

use anyhow::{Context, Result};
use sqlx::mysql::{MySqlConnectOptions, MySqlSslMode};
use sqlx::{ConnectOptions, Connection};
use thiserror::Error;
use tracing::debug;

use crate::records::EnrichedRecord;

const ENV_HOST: &str = "SCRAPER_DB_HOST";
const ENV_PORT: &str = "SCRAPER_DB_PORT";
const ENV_USER: &str = "SCRAPER_DB_USER";
const ENV_PASSWORD: &str = "SCRAPER_DB_PASSWORD";
const ENV_NAME: &str = "SCRAPER_DB_NAME";
const ENV_SSL_CA: &str = "SCRAPER_DB_SSL_CA";

const CREATE_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS scraped_data (
        id            BIGINT AUTO_INCREMENT PRIMARY KEY,
        company_name  VARCHAR(512) NOT NULL,
        location      VARCHAR(255) NOT NULL,
        job_title     VARCHAR(512) NOT NULL,
        address       VARCHAR(1024) NOT NULL,
        phone_number  VARCHAR(64) NOT NULL,
        website_link  VARCHAR(512) NOT NULL,
        gst_number    VARCHAR(32) NOT NULL,
        scraped_at    DATETIME NOT NULL
    )";

const INSERT_ROW: &str = "
    INSERT INTO scraped_data
        (company_name, location, job_title, address, phone_number,
         website_link, gst_number, scraped_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)";

/// Startup-class configuration failures. These abort the run before the
/// browser is even launched; nothing about them is retryable.
#[derive(Debug, Error)]
pub enum DbConfigError {
    #[error("SCRAPER_DB_HOST is set but {0} is missing")]
    MissingVar(&'static str),
    #[error("SCRAPER_DB_PORT is not a port number: {0}")]
    BadPort(String),
    #[error("CA certificate {0} is not readable: {1}")]
    UnreadableCert(PathBuf, std::io::Error),
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    host: String,
    port: u16,
    user: String,
    password: String,
    database: String,
    ssl_ca: PathBuf,
}

impl DbConfig {
    /// Read the mirror configuration from the environment. `None` when no
    /// host is configured (workbook-only run); an unreadable CA certificate
    /// for a configured mirror is fatal.
    pub fn from_env() -> Result<Option<Self>, DbConfigError> {
        let Ok(host) = std::env::var(ENV_HOST) else {
            return Ok(None);
        };

        let var = |name: &'static str| {
            std::env::var(name).map_err(|_| DbConfigError::MissingVar(name))
        };
        let user = var(ENV_USER)?;
        let password = var(ENV_PASSWORD)?;
        let database = var(ENV_NAME)?;
        let ssl_ca = PathBuf::from(var(ENV_SSL_CA)?);
        let port = match std::env::var(ENV_PORT) {
            Ok(p) => p.parse().map_err(|_| DbConfigError::BadPort(p))?,
            Err(_) => 3306,
        };

        std::fs::metadata(&ssl_ca)
            .map_err(|e| DbConfigError::UnreadableCert(ssl_ca.clone(), e))?;

        Ok(Some(Self {
            host,
            port,
            user,
            password,
            database,
            ssl_ca,
        }))
    }

    fn connect_options(&self) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
            .ssl_mode(MySqlSslMode::VerifyCa)
            .ssl_ca(&self.ssl_ca)
    }
}

/// Insert `records` into the mirror over a fresh connection. The sink calls
/// this with only the not-yet-mirrored tail of the cumulative set, so a
/// repeated flush never duplicates rows.
pub async fn mirror_records(config: &DbConfig, records: &[EnrichedRecord]) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }

    let mut conn = config
        .connect_options()
        .connect()
        .await
        .context("connecting to mirror database")?;

    sqlx::query(CREATE_TABLE)
        .execute(&mut conn)
        .await
        .context("ensuring scraped_data table")?;

    let now = chrono::Utc::now().naive_utc();
    for record in records {
        sqlx::query(INSERT_ROW)
            .bind(&record.listing.entity_name)
            .bind(&record.listing.location)
            .bind(&record.listing.title)
            .bind(&record.address)
            .bind(&record.phone)
            .bind(&record.website)
            .bind(&record.gst_number)
            .bind(now)
            .execute(&mut conn)
            .await
            .context("inserting scraped row")?;
    }
    debug!("mirrored {} rows", records.len());

    conn.close().await.context("closing mirror connection")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One test for the whole env matrix: these mutate process env, so they
    /// can't run as separate parallel tests.
    #[test]
    fn env_configuration_matrix() {
        // no host -> mirror disabled, not an error
        std::env::remove_var(ENV_HOST);
        assert!(DbConfig::from_env().unwrap().is_none());

        // host set but user missing -> startup error
        std::env::set_var(ENV_HOST, "db.example");
        std::env::remove_var(ENV_USER);
        assert!(matches!(
            DbConfig::from_env(),
            Err(DbConfigError::MissingVar(_))
        ));

        // fully set but CA cert unreadable -> startup error
        std::env::set_var(ENV_USER, "scraper");
        std::env::set_var(ENV_PASSWORD, "secret");
        std::env::set_var(ENV_NAME, "listings");
        std::env::set_var(ENV_SSL_CA, "/nonexistent/ca.pem");
        assert!(matches!(
            DbConfig::from_env(),
            Err(DbConfigError::UnreadableCert(..))
        ));

        // readable cert -> configured
        let dir = tempfile::tempdir().unwrap();
        let ca = dir.path().join("ca.pem");
        std::fs::write(&ca, b"cert").unwrap();
        std::env::set_var(ENV_SSL_CA, &ca);
        let config = DbConfig::from_env().unwrap().unwrap();
        assert_eq!(config.host, "db.example");
        assert_eq!(config.port, 3306);

        std::env::remove_var(ENV_HOST);
    }
}

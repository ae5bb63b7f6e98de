//! Helpers for pointing integration tests at a disposable Postgres database.

use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow};
use postgres::NoTls;
use url::Url;

/// Handle to a test database created for one suite run.
pub struct TestDatabase {
    connection_string: String,
    admin_url: String,
    database: String,
}

impl TestDatabase {
    /// Connection string that can be passed to `sqlx` or other clients.
    #[must_use]
    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }
}

impl Drop for TestDatabase {
    fn drop(&mut self) {
        let _ = run_admin_query(
            &self.admin_url,
            &format!("DROP DATABASE IF EXISTS \"{}\"", self.database),
        );
    }
}

/// Create a uniquely named database on the server behind
/// `SWEEPARR_TEST_DATABASE_URL`.
///
/// Tests that cannot reach a server should probe availability first (see
/// `fixtures::docker_available` for container-backed suites) and skip.
///
/// # Errors
///
/// Returns an error when the env var is unset, the URL is malformed, or the
/// `CREATE DATABASE` statement fails.
pub fn create_test_database() -> Result<TestDatabase> {
    let base_url = std::env::var("SWEEPARR_TEST_DATABASE_URL")
        .map_err(|_| anyhow!("SWEEPARR_TEST_DATABASE_URL is not set"))?;
    create_database_on(&base_url)
}

/// Create a uniquely named database on an explicit server URL.
///
/// # Errors
///
/// Returns an error when the URL is malformed or database creation fails.
pub fn create_database_on(base_url: &str) -> Result<TestDatabase> {
    let parsed = Url::parse(base_url).context("invalid postgres connection url")?;
    let database = unique_database_name();

    let mut admin = parsed.clone();
    admin.set_path("/postgres");
    let mut database_url = parsed;
    database_url.set_path(&format!("/{database}"));

    run_admin_query(admin.as_str(), &format!("CREATE DATABASE \"{database}\""))?;

    Ok(TestDatabase {
        connection_string: database_url.to_string(),
        admin_url: admin.to_string(),
        database,
    })
}

fn run_admin_query(admin_url: &str, statement: &str) -> Result<()> {
    let config = postgres::Config::from_str(admin_url).context("invalid admin url")?;
    let mut client = config.connect(NoTls).context("failed to connect to postgres")?;
    client
        .simple_query(statement)
        .map(|_| ())
        .with_context(|| format!("failed to execute '{statement}'"))
}

fn unique_database_name() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let pid = std::process::id();
    format!("sweeparr_test_{pid}_{nanos}")
}

//! Shared fixtures for SEEK tests: config builders, in-memory collaborators and throwaway
//! Postgres databases.

pub mod fakes;

mod error;

pub use error::{Error, Result};

use std::{env, future::Future, str::FromStr, thread};

use sqlx::{
	ConnectOptions, Connection, Executor,
	postgres::{PgConnectOptions, PgConnection},
};
use tokio::runtime::Builder;
use uuid::Uuid;

use seek_config::{
	Config, Graph, Providers, Rerank, Search, Service, SourceConfig, SourceConnection,
	SourceType, Storage,
};

const ADMIN_DATABASES: [&str; 2] = ["postgres", "template1"];

/// A database created for one test and dropped afterwards.
pub struct TestDatabase {
	name: String,
	dsn: String,
	admin_options: PgConnectOptions,
	cleaned: bool,
}
impl TestDatabase {
	pub async fn new(base_dsn: &str) -> Result<Self> {
		let base_options: PgConnectOptions = PgConnectOptions::from_str(base_dsn)
			.map_err(|err| Error::Message(format!("Failed to parse SEEK_PG_DSN: {err}.")))?;
		let (admin_options, mut admin_conn) = connect_admin(&base_options).await?;
		let name = format!("seek_test_{}", Uuid::new_v4().simple());
		let create_sql = format!(r#"CREATE DATABASE "{name}""#);

		admin_conn
			.execute(create_sql.as_str())
			.await
			.map_err(|err| Error::Message(format!("Failed to create test database: {err}.")))?;

		let dsn = base_options.clone().database(&name).to_url_lossy().to_string();

		Ok(Self { name, dsn, admin_options, cleaned: false })
	}

	pub fn dsn(&self) -> &str {
		&self.dsn
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Creates `table` with `id`, `title`, `content` and `updated_at` columns and inserts `rows`
	/// as `(id, title, content)`.
	pub async fn seed_documents(&self, table: &str, rows: &[(&str, &str, &str)]) -> Result<()> {
		let mut conn = PgConnection::connect(&self.dsn).await?;
		let create_sql = format!(
			"CREATE TABLE {table} (id text PRIMARY KEY, title text NOT NULL, \
			 content text NOT NULL, updated_at timestamptz NOT NULL DEFAULT now())"
		);

		conn.execute(create_sql.as_str()).await?;

		let insert_sql = format!("INSERT INTO {table} (id, title, content) VALUES ($1, $2, $3)");

		for &(id, title, content) in rows {
			sqlx::query(&insert_sql).bind(id).bind(title).bind(content).execute(&mut conn).await?;
		}

		Ok(())
	}

	/// Creates a popularity table with `doc_id` and `score` columns.
	pub async fn seed_popularity(&self, table: &str, scores: &[(&str, f32)]) -> Result<()> {
		let mut conn = PgConnection::connect(&self.dsn).await?;
		let create_sql =
			format!("CREATE TABLE {table} (doc_id text PRIMARY KEY, score real NOT NULL)");

		conn.execute(create_sql.as_str()).await?;

		let insert_sql = format!("INSERT INTO {table} (doc_id, score) VALUES ($1, $2)");

		for &(doc_id, score) in scores {
			sqlx::query(&insert_sql).bind(doc_id).bind(score).execute(&mut conn).await?;
		}

		Ok(())
	}

	pub async fn cleanup(mut self) -> Result<()> {
		self.cleanup_inner().await
	}

	async fn cleanup_inner(&mut self) -> Result<()> {
		if self.cleaned {
			return Ok(());
		}

		cleanup_database(&self.name, &self.admin_options).await?;

		self.cleaned = true;

		Ok(())
	}
}
impl Drop for TestDatabase {
	fn drop(&mut self) {
		if self.cleaned {
			return;
		}

		let name = self.name.clone();
		let admin_options = self.admin_options.clone();
		let cleanup_thread = thread::spawn(move || {
			let runtime = match Builder::new_current_thread().enable_all().build() {
				Ok(runtime) => runtime,
				Err(err) => {
					eprintln!("Test database cleanup failed: {err}.");

					return;
				},
			};

			if let Err(err) = runtime.block_on(cleanup_database(&name, &admin_options)) {
				eprintln!("Test database cleanup failed: {err}.");
			}
		});
		let _ = cleanup_thread.join();
	}
}

pub fn env_dsn() -> Option<String> {
	env::var("SEEK_PG_DSN").ok()
}

pub async fn with_test_db<F, Fut, T>(base_dsn: &str, f: F) -> Result<T>
where
	F: FnOnce(&TestDatabase) -> Fut,
	Fut: Future<Output = Result<T>>,
{
	let db = TestDatabase::new(base_dsn).await?;
	let result = f(&db).await;
	let mut db = db;

	if let Err(err) = db.cleanup_inner().await {
		eprintln!("Test database cleanup warning: {err}.");

		if result.is_ok() {
			return Err(err);
		}
	}

	result
}

/// Defaults everywhere, no backends and the given sources.
pub fn test_config(sources: Vec<SourceConfig>) -> Config {
	Config {
		service: Service { log_level: "info".to_string() },
		providers: Providers::default(),
		storage: Storage::default(),
		sources,
		search: Search::default(),
		graph: Graph::default(),
		rerank: Rerank::default(),
	}
}

pub fn source_config(source_id: &str, source_type: SourceType) -> SourceConfig {
	SourceConfig {
		source_id: source_id.to_string(),
		source_type,
		enabled: true,
		weight: None,
		timeout_seconds: 10,
		max_results: 50,
		collection: None,
		connection: SourceConnection::default(),
	}
}

async fn connect_admin(
	base_options: &PgConnectOptions,
) -> Result<(PgConnectOptions, PgConnection)> {
	let mut last_err = None;

	for database in ADMIN_DATABASES {
		let options = base_options.clone().database(database);

		match PgConnection::connect_with(&options).await {
			Ok(conn) => return Ok((options, conn)),
			Err(err) => {
				last_err = Some(err);
			},
		}
	}

	Err(Error::Message(format!("Failed to connect to an admin database: {last_err:?}.")))
}

async fn cleanup_database(name: &str, admin_options: &PgConnectOptions) -> Result<()> {
	let mut conn = PgConnection::connect_with(admin_options).await.map_err(|err| {
		Error::Message(format!("Failed to connect to admin database for cleanup: {err}."))
	})?;
	let drop_sql = format!(r#"DROP DATABASE IF EXISTS "{name}" WITH (FORCE)"#);

	sqlx::query(drop_sql.as_str())
		.execute(&mut conn)
		.await
		.map_err(|err| Error::Message(format!("Failed to drop test database: {err}.")))?;

	Ok(())
}

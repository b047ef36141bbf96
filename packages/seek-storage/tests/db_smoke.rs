use std::env;

use tokio::runtime::Runtime;

use seek_config::{Postgres, SourceConnection};
use seek_storage::{
	db::Db,
	queries::{self, TableSpec},
};

#[test]
#[ignore = "Requires external Postgres. Set SEEK_PG_DSN to run."]
fn table_search_ranks_rows_by_matched_tokens() {
	let Some(dsn) = env::var("SEEK_PG_DSN").ok().filter(|dsn| !dsn.trim().is_empty()) else {
		eprintln!("Skipping table_search_ranks_rows_by_matched_tokens; set SEEK_PG_DSN to run.");

		return;
	};
	let rt = Runtime::new().expect("Failed to build runtime.");

	rt.block_on(async {
		// One connection so the temporary tables stay visible.
		let cfg = Postgres { dsn, pool_max_conns: 1, popularity_table: None };
		let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

		for statement in [
			"CREATE TEMP TABLE seek_docs (id int, name text, body text, changed date)",
			"INSERT INTO seek_docs VALUES \
			 (1, 'Docker basics', 'intro', '2024-01-01'), \
			 (2, 'Deploy', 'docker deployment runbook', NULL), \
			 (3, 'Unrelated', 'nothing here', NULL)",
			"CREATE TEMP TABLE seek_popularity (doc_id text, score double precision)",
			"INSERT INTO seek_popularity VALUES ('2', 0.9)",
		] {
			sqlx::query(statement).execute(&db.pool).await.expect("Failed to seed tables.");
		}

		let conn = SourceConnection {
			table: Some("seek_docs".to_string()),
			title_column: Some("name".to_string()),
			content_column: Some("body".to_string()),
			updated_at_column: Some("changed".to_string()),
			..Default::default()
		};
		let spec = TableSpec::from_connection(&conn).expect("Failed to build table spec.");
		let tokens = vec!["docker".to_string(), "deployment".to_string()];
		let rows = queries::search_documents(&db.pool, &spec, &tokens, 10, 0)
			.await
			.expect("Failed to search documents.");

		assert_eq!(rows.len(), 2);
		assert_eq!(rows[0].id, "2");
		assert_eq!(rows[0].matched, 2);
		assert!(rows[1].updated_at.is_some());

		let score = queries::fetch_popularity(&db.pool, "seek_popularity", "2")
			.await
			.expect("Failed to fetch popularity.");

		assert_eq!(score, Some(0.9));
		assert!(db.ping().await.is_ok());
	});
}

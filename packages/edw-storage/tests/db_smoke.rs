use std::time::Duration;

use edw_config::Postgres;
use edw_domain::{
	query::EntityQuery,
	relation::{RelationDirection, RelationSpec},
	term::{SemanticRule, SpecificationMode},
};
use edw_storage::{
	data_marts::{self, NewDataMart},
	db::Db,
	entities::{self, NewEntity},
	terms::{self, NewTerm, TermChanges},
};
use edw_testkit::TestDatabase;

fn new_term(parent_id: Option<i64>, name: &str, position: i32) -> NewTerm {
	NewTerm {
		parent_id,
		name: name.to_string(),
		slug: name.to_lowercase(),
		position,
		active: true,
		semantic_rule: SemanticRule::Or,
		specification_mode: SpecificationMode::Standard,
		system_flags: 0,
	}
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set EDW_PG_DSN to run."]
async fn db_connects_and_bootstraps() {
	let Some(base_dsn) = edw_testkit::env_dsn() else {
		eprintln!("Skipping db_connects_and_bootstraps; set EDW_PG_DSN to run this test.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let cfg = Postgres { dsn: test_db.dsn().to_string(), pool_max_conns: 1 };
	let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");
	db.ensure_schema().await.expect("Schema bootstrap must be idempotent.");

	let count: i64 = sqlx::query_scalar(
		"SELECT count(*) FROM information_schema.tables WHERE table_name = 'data_mart_relations'",
	)
	.fetch_one(&db.pool)
	.await
	.expect("Failed to query schema tables.");

	assert_eq!(count, 1);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set EDW_PG_DSN to run."]
async fn moving_a_term_renumbers_the_nested_set() {
	let Some(base_dsn) = edw_testkit::env_dsn() else {
		eprintln!("Skipping moving_a_term_renumbers_the_nested_set; set EDW_PG_DSN to run.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let cfg = Postgres { dsn: test_db.dsn().to_string(), pool_max_conns: 1 };
	let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	let mut conn = db.pool.acquire().await.expect("Failed to acquire connection.");
	let root = terms::insert_term(&mut conn, &new_term(None, "Root", 0)).await.expect("insert");
	let left = terms::insert_term(&mut conn, &new_term(Some(root.id), "Left", 0)).await.expect("insert");
	let right =
		terms::insert_term(&mut conn, &new_term(Some(root.id), "Right", 1)).await.expect("insert");
	let changes = TermChanges { parent_id: Some(Some(left.id)), ..TermChanges::default() };
	let moved = terms::update_term(&mut conn, right.id, &changes).await.expect("move");
	let tree = terms::load_tree(&mut conn).await.expect("Failed to load tree.");

	assert_eq!(moved.parent_id, Some(left.id));
	assert_eq!(moved.level, 2);
	assert_eq!(tree.descendants(left.id).len(), 1);
	assert_eq!(tree.get(root.id).map(|term| (term.lft, term.rght)), Some((1, 6)));

	let cycle = TermChanges { parent_id: Some(Some(right.id)), ..TermChanges::default() };

	assert!(terms::update_term(&mut conn, root.id, &cycle).await.is_err());

	let removed = terms::delete_term(&mut conn, left.id).await.expect("delete");

	assert_eq!(removed, vec![left.id, right.id]);

	drop(conn);
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set EDW_PG_DSN to run."]
async fn relation_queries_follow_edge_direction() {
	let Some(base_dsn) = edw_testkit::env_dsn() else {
		eprintln!("Skipping relation_queries_follow_edge_direction; set EDW_PG_DSN to run.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let cfg = Postgres { dsn: test_db.dsn().to_string(), pool_max_conns: 1 };
	let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	let mut conn = db.pool.acquire().await.expect("Failed to acquire connection.");
	let rubric = terms::insert_term(&mut conn, &new_term(None, "Located", 0)).await.expect("insert");
	let mut ids = Vec::new();

	for name in ["District", "School", "Park"] {
		let entity = entities::insert_entity(
			&mut conn,
			&NewEntity { entity_model: "entity".to_string(), name: name.to_string(), active: true },
		)
		.await
		.expect("insert entity");

		ids.push(entity.id);
	}

	let (district, school, park) = (ids[0], ids[1], ids[2]);

	entities::add_relation(&mut conn, district, school, rubric.id).await.expect("relate");
	entities::add_relation(&mut conn, park, district, rubric.id).await.expect("relate");

	let forward = RelationSpec { forward: vec![rubric.id], reverse: vec![] };
	let query = EntityQuery::all().subj_and_rel(vec![district], forward);

	assert_eq!(entities::count_entities(&mut conn, &query).await.expect("count"), 1);

	let both = RelationSpec { forward: vec![rubric.id], reverse: vec![rubric.id] };
	let query = EntityQuery::all().subj_and_rel(vec![district], both);

	assert_eq!(entities::count_entities(&mut conn, &query).await.expect("count"), 2);

	let data_mart_id = data_marts::insert_data_mart(
		&mut conn,
		&NewDataMart {
			name: "Schools".to_string(),
			slug: "schools".to_string(),
			active: true,
			entities_model: "entity".to_string(),
			ordering: vec!["name".to_string()],
			view_component: Some("tile".to_string()),
			term_ids: vec![rubric.id],
			relations: vec![(rubric.id, RelationDirection::Forward)],
		},
	)
	.await
	.expect("insert data mart");
	let data_mart = data_marts::get_active_data_mart(&mut conn, data_mart_id)
		.await
		.expect("load data mart")
		.expect("data mart must exist");

	assert_eq!(data_mart.relations, vec![(rubric.id, RelationDirection::Forward)]);
	assert_eq!(data_mart.view_component.as_deref(), Some("tile"));

	drop(conn);
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set EDW_PG_DSN to run."]
async fn concurrent_inserts_keep_the_nested_set_consistent() {
	let Some(base_dsn) = edw_testkit::env_dsn() else {
		eprintln!(
			"Skipping concurrent_inserts_keep_the_nested_set_consistent; set EDW_PG_DSN to run."
		);

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let cfg = Postgres { dsn: test_db.dsn().to_string(), pool_max_conns: 2 };
	let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	let mut conn = db.pool.acquire().await.expect("Failed to acquire connection.");
	let root = terms::insert_term(&mut conn, &new_term(None, "Root", 0)).await.expect("insert");

	drop(conn);

	let mut first = db.pool.begin().await.expect("Failed to begin transaction.");

	terms::insert_term(&mut first, &new_term(Some(root.id), "A", 0)).await.expect("insert");

	let pool = db.pool.clone();
	let root_id = root.id;
	let second = tokio::spawn(async move {
		let mut tx = pool.begin().await?;
		let term = terms::insert_term(&mut tx, &new_term(Some(root_id), "B", 1)).await?;

		tx.commit().await?;

		Ok::<_, edw_storage::Error>(term)
	});

	tokio::time::sleep(Duration::from_millis(200)).await;

	assert!(!second.is_finished(), "The second writer must wait for the first to commit.");

	first.commit().await.expect("Failed to commit.");

	let b = second.await.expect("Writer task panicked.").expect("insert");
	let mut conn = db.pool.acquire().await.expect("Failed to acquire connection.");
	let tree = terms::load_tree(&mut conn).await.expect("The tree must stay consistent.");
	let bounds = |id| tree.get(id).map(|term| (term.lft, term.rght));

	assert_eq!(bounds(root.id), Some((1, 6)));
	assert_eq!(bounds(b.id), Some((4, 5)));

	drop(conn);
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

use std::collections::{BTreeSet, HashSet};

use edw_domain::{
	classify,
	query::{EntityFacts, EntityQuery, RelationEdge},
	relation::{RelationSpec, RelationTokens},
	semantic::TermFilter,
	snapshot::{self, TermSnapshot},
	term::{self, SemanticRule, SpecificationMode, Term, TermId, TermTree, TreePlacement},
};

struct Row {
	id: TermId,
	parent_id: Option<TermId>,
	rule: SemanticRule,
	mode: SpecificationMode,
	active: bool,
}

fn row(id: TermId, parent_id: Option<TermId>, rule: SemanticRule) -> Row {
	Row { id, parent_id, rule, mode: SpecificationMode::Standard, active: true }
}

fn build(rows: &[Row]) -> TermTree {
	let placements: Vec<_> = rows
		.iter()
		.map(|row| TreePlacement { id: row.id, parent_id: row.parent_id, position: row.id as i32 })
		.collect();
	let numbered = term::number_nested_set(&placements).expect("Failed to number the tree.");
	let terms = numbered
		.iter()
		.map(|position| {
			let row = rows.iter().find(|row| row.id == position.id).expect("Missing row.");

			Term {
				id: row.id,
				parent_id: row.parent_id,
				name: format!("Term {}", row.id),
				slug: format!("term-{}", row.id),
				position: row.id as i32,
				lft: position.lft,
				rght: position.rght,
				level: position.level,
				active: row.active,
				semantic_rule: row.rule,
				specification_mode: row.mode,
				system_flags: 0,
			}
		})
		.collect();

	TermTree::new(terms).expect("Failed to build the tree.")
}

// 1 (AND)
// ├── 2 (OR)
// │   ├── 5
// │   ├── 6
// │   └── 7
// └── 3 (OR)
//     ├── 8
//     └── 9
//         └── 10
// 4 (AND)
fn catalog() -> TermTree {
	build(&[
		row(1, None, SemanticRule::And),
		row(2, Some(1), SemanticRule::Or),
		row(3, Some(1), SemanticRule::Or),
		row(4, None, SemanticRule::And),
		row(5, Some(2), SemanticRule::And),
		row(6, Some(2), SemanticRule::And),
		row(7, Some(2), SemanticRule::And),
		row(8, Some(3), SemanticRule::And),
		row(9, Some(3), SemanticRule::And),
		row(10, Some(9), SemanticRule::And),
	])
}

fn filter(tree: &TermTree, ids: &[TermId]) -> TermFilter {
	let snapshot = snapshot::decompress(tree, ids, false, true).expect("Failed to decompress.");

	TermFilter::from_snapshot(&snapshot, tree).expect("Expected a non-empty filter.")
}

fn tag_sets() -> Vec<HashSet<TermId>> {
	let universe: Vec<TermId> = (1..=10).collect();

	// Every subset of a handful of interesting tags plus singletons of the rest.
	let interesting = [5, 6, 8, 10];
	let mut sets = Vec::new();

	for mask in 0..(1 << interesting.len()) {
		let set: HashSet<TermId> = interesting
			.iter()
			.enumerate()
			.filter(|(bit, _)| mask & (1 << bit) != 0)
			.map(|(_, id)| *id)
			.collect();

		sets.push(set);
	}
	for id in universe {
		sets.push(HashSet::from([id]));
	}

	sets
}

fn matching(filter: &TermFilter) -> usize {
	tag_sets().iter().filter(|tags| filter.matches(tags)).count()
}

#[test]
fn decompress_keeps_exactly_the_ancestor_closure() {
	let tree = catalog();

	for input in [vec![5], vec![5, 10], vec![4, 6, 8], vec![10, 10, 9]] {
		let snapshot = snapshot::decompress(&tree, &input, false, false).expect("decompress");
		let mut expected = BTreeSet::new();

		for id in &input {
			expected.insert(*id);
			expected.extend(tree.ancestors(*id).iter().map(|term| term.id));
		}

		assert_eq!(snapshot.term_ids(), expected, "input {input:?}");
	}
}

#[test]
fn empty_selection_is_the_root_only_snapshot() {
	let tree = catalog();
	let first = snapshot::decompress(&tree, &[], true, true).expect("decompress");
	let second = snapshot::decompress(&tree, &[], true, true).expect("decompress");

	assert_eq!(first, second);
	assert_eq!(first, TermSnapshot::root_only(true));
	assert!(first.is_root_only());
	assert_eq!(first.to_value()["id"], serde_json::Value::Null);
}

#[test]
fn stale_ids_are_dropped_only_when_fixing() {
	let tree = catalog();
	let fixed = snapshot::decompress(&tree, &[5, 404], false, true).expect("decompress");

	assert_eq!(fixed.dropped(), &[404]);
	assert_eq!(fixed.selected_ids(), BTreeSet::from([5]));
	assert!(snapshot::decompress(&tree, &[5, 404], false, false).is_err());
}

#[test]
fn inactive_ancestors_hide_their_subtree_under_active_only() {
	let mut rows = vec![row(1, None, SemanticRule::Or), row(2, Some(1), SemanticRule::Or)];

	rows.push(Row { active: false, ..row(3, Some(1), SemanticRule::Or) });
	rows.push(row(4, Some(3), SemanticRule::Or));

	let tree = build(&rows);
	let snapshot = snapshot::decompress(&tree, &[2, 4], true, true).expect("decompress");

	assert_eq!(snapshot.dropped(), &[4]);

	let root_filter = filter(&tree, &[1]);

	assert!(root_filter.matches(&HashSet::from([4])));

	let active = snapshot::decompress(&tree, &[1], true, true).expect("decompress");
	let active_filter = TermFilter::from_snapshot(&active, &tree).expect("filter");

	assert!(!active_filter.matches(&HashSet::from([4])));
	assert!(active_filter.matches(&HashSet::from([2])));
}

#[test]
fn relation_tokens_partition_then_expand() {
	let raw = ["1", "2b", "3f", "4r", "5F", "6"];
	let tokens = RelationTokens::parse(&raw).expect("tokens");
	let total = tokens.bidirectional.len() + tokens.forward.len() + tokens.reverse.len();

	assert_eq!(total, raw.len());

	let bidirectional = tokens.bidirectional.clone();
	let spec = tokens.expand();

	for id in bidirectional {
		assert!(spec.forward.contains(&id) && spec.reverse.contains(&id));
	}

	assert!(spec.forward.contains(&3) && !spec.reverse.contains(&3));
	assert!(spec.reverse.contains(&4) && !spec.forward.contains(&4));
}

#[test]
fn and_narrows_and_or_widens() {
	let tree = catalog();
	// Adding a requirement under the AND root (branch 3) can only shrink the result.
	let base = matching(&filter(&tree, &[5]));
	let with_and = matching(&filter(&tree, &[5, 8]));

	assert!(with_and <= base);

	// Adding a sibling under the OR node 2 can only grow it.
	let with_or = matching(&filter(&tree, &[5, 6]));

	assert!(with_or >= base);

	let with_more_or = matching(&filter(&tree, &[5, 6, 7]));

	assert!(with_more_or >= with_or);
}

#[test]
fn descendants_satisfy_a_standard_leaf() {
	let tree = catalog();
	let filter = filter(&tree, &[9]);

	assert!(filter.matches(&HashSet::from([10])));
	assert!(filter.matches(&HashSet::from([9])));
	assert!(!filter.matches(&HashSet::from([8])));
}

#[test]
fn subject_and_relation_follow_edge_direction() {
	let edges = vec![
		RelationEdge { from_entity_id: 100, to_entity_id: 1, term_id: 12 },
		RelationEdge { from_entity_id: 2, to_entity_id: 100, term_id: 7 },
		RelationEdge { from_entity_id: 3, to_entity_id: 100, term_id: 12 },
		RelationEdge { from_entity_id: 100, to_entity_id: 4, term_id: 7 },
		RelationEdge { from_entity_id: 200, to_entity_id: 5, term_id: 12 },
	];
	let facts = |id| EntityFacts {
		id,
		active: true,
		terms: HashSet::new(),
		edges: edges
			.iter()
			.copied()
			.filter(|edge| edge.from_entity_id == id || edge.to_entity_id == id)
			.collect(),
	};
	let relations = RelationSpec::parse(&["12f", "7r"]).expect("relations");
	let query = EntityQuery::all().subj_and_rel(vec![100], relations);
	let matched: Vec<_> = [1, 2, 3, 4, 5].into_iter().filter(|&id| query.matches(&facts(id))).collect();

	assert_eq!(matched, vec![1, 2]);
}

#[test]
fn dissimilar_hits_subtract_from_the_same_category() {
	let result = serde_json::json!({
		"hits": { "hits": [
			{
				"_score": 5.0,
				"_source": { "categories": ["{\"id\": 42, \"name\": \"Школы\", \"similar\": true}"] },
				"_explanation": { "details": [{ "description": "weight(title:школа in 1)", "details": [] }] }
			},
			{
				"_score": 2.0,
				"_source": { "categories": ["{\"id\": 42, \"name\": \"Школы\", \"similar\": false}"] },
				"_explanation": { "details": [{ "description": "weight(title:парк in 2)", "details": [] }] }
			}
		]}
	});
	let report = classify::analyze_suggestions(&result);

	assert_eq!(report.suggestions.len(), 1);
	assert_eq!(report.suggestions[0].category.id, Some(42));
	assert!((report.suggestions[0].score - 3.0).abs() < f64::EPSILON);
	assert_eq!(report.suggestions[0].words, vec!["парк".to_string(), "школа".to_string()]);
	assert!(report.suggestions[0].category.similar);
}

#[test]
fn aggregated_similarity_follows_the_net_score() {
	let hit = |score: f64, similar: bool| {
		serde_json::json!({
			"_score": score,
			"_source": { "categories": [
				serde_json::json!({ "id": 42, "name": "Школы", "similar": similar }).to_string(),
			]},
		})
	};
	let dissimilar_first = serde_json::json!({ "hits": { "hits": [hit(2.0, false), hit(5.0, true)] } });
	let report = classify::analyze_suggestions(&dissimilar_first);

	assert_eq!(report.suggestions.len(), 1);
	assert!((report.suggestions[0].score - 3.0).abs() < f64::EPSILON);
	assert!(report.suggestions[0].category.similar);

	let net_negative = serde_json::json!({ "hits": { "hits": [hit(1.0, true), hit(4.0, false)] } });
	let report = classify::analyze_suggestions(&net_negative);

	assert!(!report.suggestions[0].category.similar);
}

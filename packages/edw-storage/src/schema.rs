pub fn render_schema() -> String {
	expand_includes(include_str!("../../../sql/init.sql"))
}

fn expand_includes(sql: &str) -> String {
	let mut out = String::new();

	for line in sql.lines() {
		let trimmed = line.trim();

		if let Some(path) = trimmed.strip_prefix("\\ir ") {
			match path.trim() {
				"tables/001_terms.sql" => out.push_str(include_str!("../../../sql/tables/001_terms.sql")),
				"tables/002_entities.sql" =>
					out.push_str(include_str!("../../../sql/tables/002_entities.sql")),
				"tables/003_entity_terms.sql" =>
					out.push_str(include_str!("../../../sql/tables/003_entity_terms.sql")),
				"tables/004_entity_relations.sql" =>
					out.push_str(include_str!("../../../sql/tables/004_entity_relations.sql")),
				"tables/005_data_marts.sql" =>
					out.push_str(include_str!("../../../sql/tables/005_data_marts.sql")),
				"tables/006_data_mart_terms.sql" =>
					out.push_str(include_str!("../../../sql/tables/006_data_mart_terms.sql")),
				"tables/007_data_mart_relations.sql" =>
					out.push_str(include_str!("../../../sql/tables/007_data_mart_relations.sql")),
				_ => out.push_str(line),
			}
		} else {
			out.push_str(line);
		}

		out.push('\n');
	}

	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn includes_are_expanded() {
		let schema = render_schema();

		assert!(!schema.contains("\\ir "));
		assert!(schema.contains("CREATE TABLE IF NOT EXISTS entity_relations"));
		assert!(schema.contains("CREATE TABLE IF NOT EXISTS data_mart_relations"));
	}
}

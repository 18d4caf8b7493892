use std::sync::LazyLock;

use regex::Regex;

use crate::{Error, Result, term::TermId};

static RELATION_TOKEN: LazyLock<Option<Regex>> =
	LazyLock::new(|| Regex::new(r"(?i)^\d+[bfr]?$").ok());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationDirection {
	Bidirectional,
	Forward,
	Reverse,
}
impl RelationDirection {
	pub fn as_char(&self) -> char {
		match self {
			Self::Bidirectional => 'b',
			Self::Forward => 'f',
			Self::Reverse => 'r',
		}
	}

	pub fn from_char(raw: char) -> Option<Self> {
		match raw.to_ascii_lowercase() {
			'b' => Some(Self::Bidirectional),
			'f' => Some(Self::Forward),
			'r' => Some(Self::Reverse),
			_ => None,
		}
	}
}

/// Renders the `<term_id><direction>` wire token.
pub fn relation_token(term_id: TermId, direction: RelationDirection) -> String {
	format!("{term_id}{}", direction.as_char())
}

/// Relation tokens split by direction, before bidirectional expansion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationTokens {
	pub bidirectional: Vec<TermId>,
	pub forward: Vec<TermId>,
	pub reverse: Vec<TermId>,
}
impl RelationTokens {
	/// Parses `<id><b|f|r>?` tokens. Suffixes are tried as `b`, then `f`, then `r`; a bare id is
	/// bidirectional. All malformed tokens are reported together.
	pub fn parse<S>(raw: &[S]) -> Result<Self>
	where
		S: AsRef<str>,
	{
		let mut out = Self::default();
		let mut invalid = Vec::new();

		for token in raw {
			let token = token.as_ref().trim();

			if !RELATION_TOKEN.as_ref().is_some_and(|pattern| pattern.is_match(token)) {
				invalid.push(token.to_string());

				continue;
			}

			let (digits, direction) = split_direction(token);
			let Ok(id) = digits.parse::<TermId>() else {
				invalid.push(token.to_string());

				continue;
			};

			match direction {
				RelationDirection::Bidirectional => out.bidirectional.push(id),
				RelationDirection::Forward => out.forward.push(id),
				RelationDirection::Reverse => out.reverse.push(id),
			}
		}

		if !invalid.is_empty() {
			return Err(Error::InvalidRelationTokens(invalid));
		}

		Ok(out)
	}

	pub fn expand(self) -> RelationSpec {
		let mut forward = self.forward;
		let mut reverse = self.reverse;

		forward.extend(self.bidirectional.iter().copied());
		reverse.extend(self.bidirectional);

		RelationSpec { forward, reverse }
	}
}

/// Relation term ids by the side of the edge they constrain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationSpec {
	pub forward: Vec<TermId>,
	pub reverse: Vec<TermId>,
}
impl RelationSpec {
	pub fn parse<S>(raw: &[S]) -> Result<Self>
	where
		S: AsRef<str>,
	{
		Ok(RelationTokens::parse(raw)?.expand())
	}

	pub fn is_empty(&self) -> bool {
		self.forward.is_empty() && self.reverse.is_empty()
	}
}

fn split_direction(token: &str) -> (&str, RelationDirection) {
	for direction in
		[RelationDirection::Bidirectional, RelationDirection::Forward, RelationDirection::Reverse]
	{
		if let Some(digits) = token
			.strip_suffix(direction.as_char())
			.or_else(|| token.strip_suffix(direction.as_char().to_ascii_uppercase()))
		{
			return (digits, direction);
		}
	}

	(token, RelationDirection::Bidirectional)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bare_and_suffixed_tokens_are_partitioned() {
		let tokens = RelationTokens::parse(&["12f", "7R", "3", " 4b "]).expect("tokens");

		assert_eq!(tokens.forward, vec![12]);
		assert_eq!(tokens.reverse, vec![7]);
		assert_eq!(tokens.bidirectional, vec![3, 4]);
	}

	#[test]
	fn malformed_tokens_are_listed() {
		let err = RelationTokens::parse(&["12x", "7", "f"]).expect_err("must reject");

		assert!(matches!(&err, Error::InvalidRelationTokens(tokens) if tokens == &["12x", "f"]));
	}

	#[test]
	fn token_rendering_uses_lowercase_suffix() {
		assert_eq!(relation_token(9, RelationDirection::Reverse), "9r");
	}
}

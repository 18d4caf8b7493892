use crate::term::TermId;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Unknown term: {0}.")]
	UnknownTerm(TermId),
	#[error("Invalid relation tokens: {}.", .0.join(", "))]
	InvalidRelationTokens(Vec<String>),
	#[error("Invalid semantic rule: {0}.")]
	InvalidSemanticRule(String),
	#[error("Invalid specification mode: {0}.")]
	InvalidSpecificationMode(String),
	#[error("Inconsistent term tree: {message}")]
	InconsistentTree { message: String },
	#[error("Improperly configured: {message}")]
	ImproperlyConfigured { message: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// `fields` names the offending parameters or tokens.
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String, fields: Vec<String> },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Conflict: {message}")]
	Conflict { message: String },
	#[error("Search index error: {message}")]
	SearchIndex { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
}
impl Error {
	pub fn invalid(message: impl Into<String>, field: &str) -> Self {
		Self::InvalidRequest { message: message.into(), fields: vec![field.to_string()] }
	}
}

impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}

impl From<edw_storage::Error> for Error {
	fn from(err: edw_storage::Error) -> Self {
		match err {
			edw_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			edw_storage::Error::InvalidArgument(message) =>
				Self::InvalidRequest { message, fields: vec![] },
			edw_storage::Error::NotFound(message) => Self::NotFound { message },
			edw_storage::Error::Conflict(message) => Self::Conflict { message },
			edw_storage::Error::Domain(inner) => inner.into(),
		}
	}
}

impl From<edw_domain::Error> for Error {
	fn from(err: edw_domain::Error) -> Self {
		let message = err.to_string();

		match err {
			edw_domain::Error::UnknownTerm(_) =>
				Self::InvalidRequest { message, fields: vec!["terms".to_string()] },
			edw_domain::Error::InvalidRelationTokens(tokens) =>
				Self::InvalidRequest { message, fields: tokens },
			edw_domain::Error::InvalidSemanticRule(_) =>
				Self::InvalidRequest { message, fields: vec!["semantic_rule".to_string()] },
			edw_domain::Error::InvalidSpecificationMode(_) =>
				Self::InvalidRequest { message, fields: vec!["specification_mode".to_string()] },
			edw_domain::Error::InconsistentTree { .. }
			| edw_domain::Error::ImproperlyConfigured { .. } => Self::Storage { message },
		}
	}
}

impl From<edw_providers::Error> for Error {
	fn from(err: edw_providers::Error) -> Self {
		Self::SearchIndex { message: err.to_string() }
	}
}

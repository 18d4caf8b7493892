//! Entity filter pipeline.
//!
//! A request is parsed into [`FilterParams`], then an ordered list of [`FilterStage`]s narrows two
//! entity queries: `queryset` (what the response lists) and `initial_queryset` (the facet universe
//! used for `initial_count` and `_initial_filter_meta`). Stages read parameter presence, not just
//! values, so an explicit client parameter can switch off the data mart's implicit clause.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use edw_domain::{
	query::{EntityId, EntityPredicate, EntityQuery},
	relation::RelationSpec,
	semantic::TermFilter,
	term::TermId,
};

use crate::{Error, Result, cache::Decompressor, data_mart::DataMartScope};

/// Parsed filter parameters. `Some` means the parameter was present, even if empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterParams {
	pub terms: Option<Vec<TermId>>,
	pub data_mart_pk: Option<i64>,
	pub subj: Option<Vec<EntityId>>,
	pub rel: Option<RelationSpec>,
	pub active: Option<bool>,
	pub use_cached_decompress: bool,
	pub view_component: Option<String>,
	pub ordering: Option<Vec<String>>,
	pub limit: Option<u32>,
	pub offset: Option<u32>,
}
impl FilterParams {
	pub fn from_query(query: &HashMap<String, String>) -> Result<Self> {
		let get = |name: &'static str| query.get(name).map(String::as_str);
		let rel = match get("rel") {
			Some(raw) => Some(RelationSpec::parse(&split_csv(raw))?),
			None => None,
		};

		Ok(Self {
			terms: get("terms").map(|raw| parse_ids(raw, "terms")).transpose()?,
			data_mart_pk: get("data_mart_pk")
				.map(|raw| parse_number::<i64>(raw, "data_mart_pk"))
				.transpose()?,
			subj: get("subj").map(|raw| parse_ids(raw, "subj")).transpose()?,
			rel,
			active: get("active").map(|raw| parse_bool(raw, "active")).transpose()?,
			use_cached_decompress: get("use_cached_decompress")
				.map(|raw| parse_bool(raw, "use_cached_decompress"))
				.transpose()?
				.unwrap_or(true),
			view_component: get("view_component")
				.map(str::trim)
				.filter(|value| !value.is_empty())
				.map(str::to_string),
			ordering: get("ordering").map(|raw| {
				split_csv(raw).into_iter().map(str::to_string).collect()
			}),
			limit: get("limit").map(|raw| parse_number::<u32>(raw, "limit")).transpose()?,
			offset: get("offset").map(|raw| parse_number::<u32>(raw, "offset")).transpose()?,
		})
	}
}
impl Default for FilterParams {
	fn default() -> Self {
		Self {
			terms: None,
			data_mart_pk: None,
			subj: None,
			rel: None,
			active: None,
			use_cached_decompress: true,
			view_component: None,
			ordering: None,
			limit: None,
			offset: None,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterSource {
	Client,
	DataMart,
}

/// Which of the two queries a clause narrowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterScope {
	Both,
	Initial,
	Queryset,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedFilter {
	pub stage: &'static str,
	pub source: FilterSource,
	pub scope: FilterScope,
	pub kind: &'static str,
	pub detail: Value,
}

pub struct FilterContext<'a> {
	pub params: &'a FilterParams,
	pub decompressor: &'a Decompressor<'a>,
	pub data_mart: Option<&'a DataMartScope>,
	pub queryset: EntityQuery,
	pub initial_queryset: EntityQuery,
	pub initial_filter_meta: Value,
	pub terms_filter_meta: Value,
	pub subj_ids: Vec<EntityId>,
	pub applied: Vec<AppliedFilter>,
}
impl<'a> FilterContext<'a> {
	/// Both metas start as the root-only snapshot.
	pub fn new(
		params: &'a FilterParams,
		decompressor: &'a Decompressor<'a>,
		data_mart: Option<&'a DataMartScope>,
	) -> Result<Self> {
		let root = decompressor.decompress(&[], true)?.to_value();

		Ok(Self {
			params,
			decompressor,
			data_mart,
			queryset: EntityQuery::all(),
			initial_queryset: EntityQuery::all(),
			initial_filter_meta: root.clone(),
			terms_filter_meta: root,
			subj_ids: Vec::new(),
			applied: Vec::new(),
		})
	}

	pub fn apply(
		&mut self,
		stage: &'static str,
		source: FilterSource,
		scope: FilterScope,
		predicate: EntityPredicate,
	) {
		self.applied.push(AppliedFilter {
			stage,
			source,
			scope,
			kind: predicate.kind(),
			detail: predicate.to_value(),
		});

		match scope {
			FilterScope::Both => {
				self.initial_queryset = std::mem::take(&mut self.initial_queryset).with(predicate.clone());
				self.queryset = std::mem::take(&mut self.queryset).with(predicate);
			},
			FilterScope::Initial =>
				self.initial_queryset = std::mem::take(&mut self.initial_queryset).with(predicate),
			FilterScope::Queryset => self.queryset = std::mem::take(&mut self.queryset).with(predicate),
		}
	}

	/// Decompresses `term_ids`, returning the compiled filter (none for an empty selection) and
	/// the snapshot metadata. Stale ids are dropped.
	fn semantic_filter(&self, term_ids: &[TermId]) -> Result<(Option<TermFilter>, Value)> {
		let snapshot = self.decompressor.decompress(term_ids, true)?;
		let filter = TermFilter::from_snapshot(&snapshot, self.decompressor.tree());

		Ok((filter, snapshot.to_value()))
	}
}

pub trait FilterStage
where
	Self: Send + Sync,
{
	fn name(&self) -> &'static str;

	fn apply(&self, ctx: &mut FilterContext<'_>) -> Result<()>;
}

pub struct FilterPipeline {
	stages: Vec<Box<dyn FilterStage>>,
}
impl FilterPipeline {
	pub fn new(stages: Vec<Box<dyn FilterStage>>) -> Self {
		Self { stages }
	}

	/// `active` -> `data_mart` -> `terms` -> `subj` -> `rel`.
	pub fn standard() -> Self {
		Self::new(vec![
			Box::new(ActiveStage),
			Box::new(DataMartStage),
			Box::new(TermsStage),
			Box::new(SubjectStage),
			Box::new(RelationStage),
		])
	}

	pub fn stage_names(&self) -> Vec<&'static str> {
		self.stages.iter().map(|stage| stage.name()).collect()
	}

	pub fn run(&self, ctx: &mut FilterContext<'_>) -> Result<()> {
		for stage in &self.stages {
			stage.apply(ctx)?;
		}

		tracing::debug!(
			applied = ctx.applied.len(),
			predicates = ctx.queryset.predicates().len(),
			"Filter pipeline finished."
		);

		Ok(())
	}
}
impl Default for FilterPipeline {
	fn default() -> Self {
		Self::standard()
	}
}

pub struct ActiveStage;
impl FilterStage for ActiveStage {
	fn name(&self) -> &'static str {
		"active"
	}

	fn apply(&self, ctx: &mut FilterContext<'_>) -> Result<()> {
		if let Some(active) = ctx.params.active {
			ctx.apply(
				self.name(),
				FilterSource::Client,
				FilterScope::Both,
				EntityPredicate::Active(active),
			);
		}

		Ok(())
	}
}

/// Seeds the request from the data mart.
///
/// The relation clause narrows both queries unless the client sent `subj` or `rel`. The mart's
/// terms always narrow the facet universe; they narrow the listed set only when the client sent
/// no `terms` of its own.
pub struct DataMartStage;
impl FilterStage for DataMartStage {
	fn name(&self) -> &'static str {
		"data_mart"
	}

	fn apply(&self, ctx: &mut FilterContext<'_>) -> Result<()> {
		let Some(data_mart) = ctx.data_mart else {
			return Ok(());
		};

		if ctx.params.subj.is_none() && ctx.params.rel.is_none() {
			let relations = data_mart.relations()?;

			if !relations.is_empty() {
				ctx.apply(
					self.name(),
					FilterSource::DataMart,
					FilterScope::Both,
					EntityPredicate::Relation(relations),
				);
			}
		}

		let (filter, meta) = ctx.semantic_filter(&data_mart.term_ids)?;

		if let Some(filter) = filter.clone() {
			ctx.apply(
				self.name(),
				FilterSource::DataMart,
				FilterScope::Initial,
				EntityPredicate::Terms(filter),
			);
		}

		ctx.initial_filter_meta = meta.clone();

		if ctx.params.terms.is_some() {
			return Ok(());
		}
		if let Some(filter) = filter {
			ctx.apply(
				self.name(),
				FilterSource::DataMart,
				FilterScope::Queryset,
				EntityPredicate::Terms(filter),
			);
		}

		ctx.terms_filter_meta = meta;

		Ok(())
	}
}

/// Client terms, combined with the data mart's terms into one selection.
pub struct TermsStage;
impl FilterStage for TermsStage {
	fn name(&self) -> &'static str {
		"terms"
	}

	fn apply(&self, ctx: &mut FilterContext<'_>) -> Result<()> {
		let params = ctx.params;
		let Some(terms) = params.terms.as_ref().filter(|terms| !terms.is_empty()) else {
			return Ok(());
		};
		let mut selected = terms.clone();

		if let Some(data_mart) = ctx.data_mart {
			selected.extend(data_mart.term_ids.iter().copied());
		}

		let (filter, meta) = ctx.semantic_filter(&selected)?;

		if let Some(filter) = filter {
			ctx.apply(
				self.name(),
				FilterSource::Client,
				FilterScope::Queryset,
				EntityPredicate::Terms(filter),
			);
		}

		ctx.terms_filter_meta = meta;

		Ok(())
	}
}

/// Entities connected to the given subjects, optionally through the client's relation terms.
pub struct SubjectStage;
impl FilterStage for SubjectStage {
	fn name(&self) -> &'static str {
		"subj"
	}

	fn apply(&self, ctx: &mut FilterContext<'_>) -> Result<()> {
		let params = ctx.params;
		let Some(subjects) = params.subj.as_ref().filter(|subjects| !subjects.is_empty()) else {
			return Ok(());
		};

		ctx.subj_ids = subjects.clone();

		let predicate = match params.rel.as_ref().filter(|relations| !relations.is_empty()) {
			Some(relations) => EntityPredicate::SubjectRelation {
				subjects: subjects.clone(),
				relations: relations.clone(),
			},
			None => EntityPredicate::Subject(subjects.clone()),
		};

		ctx.apply(self.name(), FilterSource::Client, FilterScope::Both, predicate);

		Ok(())
	}
}

/// Relation terms without subjects; with subjects they are consumed by [`SubjectStage`].
pub struct RelationStage;
impl FilterStage for RelationStage {
	fn name(&self) -> &'static str {
		"rel"
	}

	fn apply(&self, ctx: &mut FilterContext<'_>) -> Result<()> {
		let params = ctx.params;

		if params.subj.is_some() {
			return Ok(());
		}

		let Some(relations) = params.rel.as_ref().filter(|relations| !relations.is_empty())
		else {
			return Ok(());
		};

		ctx.apply(
			self.name(),
			FilterSource::Client,
			FilterScope::Both,
			EntityPredicate::Relation(relations.clone()),
		);

		Ok(())
	}
}

fn split_csv(raw: &str) -> Vec<&str> {
	raw.split(',').map(str::trim).filter(|piece| !piece.is_empty()).collect()
}

fn parse_ids(raw: &str, field: &str) -> Result<Vec<i64>> {
	split_csv(raw).into_iter().map(|piece| parse_number(piece, field)).collect()
}

fn parse_number<T>(raw: &str, field: &str) -> Result<T>
where
	T: std::str::FromStr,
{
	raw.trim()
		.parse()
		.map_err(|_| Error::invalid(format!("{field} must be a number, got {raw:?}."), field))
}

fn parse_bool(raw: &str, field: &str) -> Result<bool> {
	match raw.trim().to_ascii_lowercase().as_str() {
		"true" | "t" | "1" | "yes" | "on" => Ok(true),
		"false" | "f" | "0" | "no" | "off" => Ok(false),
		_ => Err(Error::invalid(format!("{field} must be a boolean, got {raw:?}."), field)),
	}
}

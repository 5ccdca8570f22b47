//! Query shape for listing sessions.
//!
//! Backends without server-side filtering call [`SessionFilter::apply`] so
//! that every provider yields the same result for the same filter: matches
//! first, then newest `updated_at` first, then `offset`/`limit`.

use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};
use crate::model::SessionMetadata;

/// Inclusive millisecond range. Either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// Lower bound (inclusive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<i64>,
    /// Upper bound (inclusive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<i64>,
}

impl DateRange {
    /// Range bounded on both sides.
    #[must_use]
    pub const fn between(from: i64, to: i64) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    /// Returns true if `at` lies inside the range.
    #[must_use]
    pub fn contains(&self, at: i64) -> bool {
        self.from.is_none_or(|from| at >= from) && self.to.is_none_or(|to| at <= to)
    }
}

/// Filter for `list` operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFilter {
    /// Case-insensitive substring match on the session name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Tags that must all be present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Creation time range.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateRange>,
    /// Update time range.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateRange>,
    /// Maximum number of results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Number of results to skip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

impl SessionFilter {
    /// Filter that matches everything.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Sets the name substring.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the required tags.
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the creation range.
    #[must_use]
    pub const fn with_created(mut self, range: DateRange) -> Self {
        self.created = Some(range);
        self
    }

    /// Sets the update range.
    #[must_use]
    pub const fn with_updated(mut self, range: DateRange) -> Self {
        self.updated = Some(range);
        self
    }

    /// Sets limit and offset.
    #[must_use]
    pub const fn paginate(mut self, limit: usize, offset: usize) -> Self {
        self.limit = Some(limit);
        self.offset = Some(offset);
        self
    }

    /// Returns true if the filter constrains nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Rejects malformed filters.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Validation`] for an inverted date range or a
    /// zero limit.
    pub fn validate(&self) -> StorageResult<()> {
        for (label, range) in [("created", self.created), ("updated", self.updated)] {
            if let Some(DateRange {
                from: Some(from),
                to: Some(to),
            }) = range
                && from > to
            {
                return Err(StorageError::validation(format!(
                    "{label} range is inverted: from {from} > to {to}"
                )));
            }
        }
        if self.limit == Some(0) {
            return Err(StorageError::validation("limit must be greater than zero"));
        }
        Ok(())
    }

    /// Returns true if `meta` satisfies every predicate (pagination aside).
    #[must_use]
    pub fn matches(&self, meta: &SessionMetadata) -> bool {
        if let Some(name) = &self.name
            && !meta.name.to_lowercase().contains(&name.to_lowercase())
        {
            return false;
        }
        if let Some(tags) = &self.tags
            && !meta.has_all_tags(tags)
        {
            return false;
        }
        if let Some(range) = &self.created
            && !range.contains(meta.created_at)
        {
            return false;
        }
        if let Some(range) = &self.updated
            && !range.contains(meta.updated_at)
        {
            return false;
        }
        true
    }

    /// Filters, sorts newest-first by `updated_at`, then paginates.
    ///
    /// Ties on `updated_at` are broken by id so the order is deterministic.
    #[must_use]
    pub fn apply(&self, items: Vec<SessionMetadata>) -> Vec<SessionMetadata> {
        let mut matched: Vec<SessionMetadata> =
            items.into_iter().filter(|m| self.matches(m)).collect();

        matched.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        matched
            .into_iter()
            .skip(self.offset.unwrap_or(0))
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

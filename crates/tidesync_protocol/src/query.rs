//! Local query representation.

use crate::entity::{Entity, EntityId};
use std::fmt;
use std::sync::Arc;

/// Predicate evaluated against local entities.
pub type Filter<T> = Arc<dyn Fn(&Entity<T>) -> bool + Send + Sync>;

/// A read or purge request against the local store.
///
/// A query may carry a name. Named queries have their own pull
/// checkpoint, which a purge of that query resets.
pub struct Query<T> {
    name: Option<String>,
    filter: Option<Filter<T>>,
    skip: usize,
    take: Option<usize>,
}

impl<T> Query<T> {
    /// Matches every entity.
    pub fn all() -> Self {
        Self {
            name: None,
            filter: None,
            skip: 0,
            take: None,
        }
    }

    /// Matches entities satisfying `predicate`.
    pub fn filter<F>(predicate: F) -> Self
    where
        F: Fn(&Entity<T>) -> bool + Send + Sync + 'static,
    {
        Self {
            filter: Some(Arc::new(predicate)),
            ..Self::all()
        }
    }

    /// Matches the single entity with `id`.
    pub fn by_id(id: EntityId) -> Self
    where
        T: 'static,
    {
        Self::filter(move |entity: &Entity<T>| entity.id == id)
    }

    /// Names the query.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Skips the first `count` matches.
    pub fn skip(mut self, count: usize) -> Self {
        self.skip = count;
        self
    }

    /// Returns at most `count` matches.
    pub fn take(mut self, count: usize) -> Self {
        self.take = Some(count);
        self
    }

    /// Returns the query name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the number of matches skipped.
    pub fn skipped(&self) -> usize {
        self.skip
    }

    /// Returns the match limit, if any.
    pub fn limit(&self) -> Option<usize> {
        self.take
    }

    /// Returns true if the query selects the whole collection.
    pub fn is_unrestricted(&self) -> bool {
        self.filter.is_none() && self.skip == 0 && self.take.is_none()
    }

    /// Evaluates the predicate only (ignores skip/take).
    pub fn matches(&self, entity: &Entity<T>) -> bool {
        self.filter.as_ref().map_or(true, |f| f(entity))
    }

    /// Applies predicate, skip and take to an ordered sequence.
    pub fn select<'a, I>(&self, entities: I) -> Vec<&'a Entity<T>>
    where
        I: IntoIterator<Item = &'a Entity<T>>,
        T: 'a,
    {
        entities
            .into_iter()
            .filter(|e| self.matches(e))
            .skip(self.skip)
            .take(self.take.unwrap_or(usize::MAX))
            .collect()
    }
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            filter: self.filter.clone(),
            skip: self.skip,
            take: self.take,
        }
    }
}

impl<T> Default for Query<T> {
    fn default() -> Self {
        Self::all()
    }
}

impl<T> fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("name", &self.name)
            .field("filtered", &self.filter.is_some())
            .field("skip", &self.skip)
            .field("take", &self.take)
            .finish()
    }
}

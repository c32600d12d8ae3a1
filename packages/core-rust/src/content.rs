//! Content algebra: sorted-unique sets of service and queue names, and their
//! resolved counterparts.
//!
//! Every constructor and operator re-establishes the sorted-unique invariant
//! before returning, so no caller ever observes duplicates or disorder.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Sorts `values` and removes duplicates in place.
fn normalize(values: &mut Vec<String>) {
    values.sort_unstable();
    values.dedup();
}

/// Returns `true` when every element of sorted `subset` exists in sorted `superset`.
fn sorted_includes(superset: &[String], subset: &[String]) -> bool {
    let mut candidates = superset.iter();
    subset
        .iter()
        .all(|wanted| candidates.by_ref().any(|have| have == wanted))
}

// ---------------------------------------------------------------------------
// Content
// ---------------------------------------------------------------------------

/// Names of services and queues, each sorted and duplicate-free.
///
/// Empty content is "falsy": see [`Content::is_empty`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawContent")]
pub struct Content {
    services: Vec<String>,
    queues: Vec<String>,
}

/// Unchecked wire shape; converted into [`Content`] with normalization.
#[derive(Deserialize)]
struct RawContent {
    #[serde(default)]
    services: Vec<String>,
    #[serde(default)]
    queues: Vec<String>,
}

impl From<RawContent> for Content {
    fn from(raw: RawContent) -> Self {
        Content::from_vecs(raw.services, raw.queues)
    }
}

impl Content {
    /// Builds content from arbitrary names.
    pub fn new<S, Q>(services: S, queues: Q) -> Self
    where
        S: IntoIterator,
        S::Item: Into<String>,
        Q: IntoIterator,
        Q::Item: Into<String>,
    {
        Content::from_vecs(
            services.into_iter().map(Into::into).collect(),
            queues.into_iter().map(Into::into).collect(),
        )
    }

    /// Content holding only services.
    pub fn services_only<S>(services: S) -> Self
    where
        S: IntoIterator,
        S::Item: Into<String>,
    {
        Content::new(services, Vec::<String>::new())
    }

    /// Content holding only queues.
    pub fn queues_only<Q>(queues: Q) -> Self
    where
        Q: IntoIterator,
        Q::Item: Into<String>,
    {
        Content::new(Vec::<String>::new(), queues)
    }

    fn from_vecs(mut services: Vec<String>, mut queues: Vec<String>) -> Self {
        normalize(&mut services);
        normalize(&mut queues);
        Self { services, queues }
    }

    #[must_use]
    pub fn services(&self) -> &[String] {
        &self.services
    }

    #[must_use]
    pub fn queues(&self) -> &[String] {
        &self.queues
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty() && self.queues.is_empty()
    }

    /// Total number of names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len() + self.queues.len()
    }

    /// Every name from both operands.
    #[must_use]
    pub fn union(&self, other: &Content) -> Content {
        Content::from_vecs(
            self.services.iter().chain(&other.services).cloned().collect(),
            self.queues.iter().chain(&other.queues).cloned().collect(),
        )
    }

    /// Names in `self` that are not in `other`.
    #[must_use]
    pub fn difference(&self, other: &Content) -> Content {
        let keep = |values: &[String], remove: &[String]| -> Vec<String> {
            values
                .iter()
                .filter(|v| remove.binary_search(v).is_err())
                .cloned()
                .collect()
        };
        Content {
            services: keep(&self.services, &other.services),
            queues: keep(&self.queues, &other.queues),
        }
    }

    /// Names present in both operands.
    #[must_use]
    pub fn intersection(&self, other: &Content) -> Content {
        let keep = |values: &[String], also: &[String]| -> Vec<String> {
            values
                .iter()
                .filter(|v| also.binary_search(v).is_ok())
                .cloned()
                .collect()
        };
        Content {
            services: keep(&self.services, &other.services),
            queues: keep(&self.queues, &other.queues),
        }
    }

    /// `true` when every name of `subset` is in `self`.
    #[must_use]
    pub fn includes(&self, subset: &Content) -> bool {
        sorted_includes(&self.services, &subset.services)
            && sorted_includes(&self.queues, &subset.queues)
    }

    /// `true` when the operands share at least one name.
    #[must_use]
    pub fn intersects(&self, other: &Content) -> bool {
        !self.intersection(other).is_empty()
    }

    /// Replaces every service name through `rename`, then restores the invariant.
    pub fn map_services(&self, rename: impl FnMut(&String) -> String) -> Content {
        Content::from_vecs(
            self.services.iter().map(rename).collect(),
            self.queues.clone(),
        )
    }
}

// ---------------------------------------------------------------------------
// Resolved entries
// ---------------------------------------------------------------------------

/// Transaction mode a service is configured with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransactionMode {
    #[default]
    Automatic,
    Join,
    Atomic,
    None,
    Branch,
}

/// A resolved service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyService {
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub transaction: TransactionMode,
    #[serde(default)]
    pub timeout: Duration,
    /// Number of domain hops from the answering domain.
    #[serde(default)]
    pub hops: u32,
}

impl ReplyService {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: String::new(),
            transaction: TransactionMode::default(),
            timeout: Duration::ZERO,
            hops: 0,
        }
    }

    /// Copy of this entry published under another name.
    #[must_use]
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }
}

/// A resolved queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyQueue {
    pub name: String,
    #[serde(default)]
    pub retries: u32,
}

impl ReplyQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            retries: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// ReplyContent
// ---------------------------------------------------------------------------

/// Resolved services and queues, sorted by name with one entry per name.
///
/// When two entries share a name the one with the fewest hops is kept for
/// services; for queues the first in (name, retries) order wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawReplyContent")]
pub struct ReplyContent {
    services: Vec<ReplyService>,
    queues: Vec<ReplyQueue>,
}

#[derive(Deserialize)]
struct RawReplyContent {
    #[serde(default)]
    services: Vec<ReplyService>,
    #[serde(default)]
    queues: Vec<ReplyQueue>,
}

impl From<RawReplyContent> for ReplyContent {
    fn from(raw: RawReplyContent) -> Self {
        ReplyContent::new(raw.services, raw.queues)
    }
}

impl ReplyContent {
    #[must_use]
    pub fn new(mut services: Vec<ReplyService>, mut queues: Vec<ReplyQueue>) -> Self {
        services.sort_by(|l, r| l.name.cmp(&r.name).then(l.hops.cmp(&r.hops)));
        services.dedup_by(|r, l| l.name == r.name);
        queues.sort_by(|l, r| l.name.cmp(&r.name).then(l.retries.cmp(&r.retries)));
        queues.dedup_by(|r, l| l.name == r.name);
        Self { services, queues }
    }

    #[must_use]
    pub fn services(&self) -> &[ReplyService] {
        &self.services
    }

    #[must_use]
    pub fn queues(&self) -> &[ReplyQueue] {
        &self.queues
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty() && self.queues.is_empty()
    }

    /// Names of everything resolved.
    #[must_use]
    pub fn names(&self) -> Content {
        Content {
            services: self.services.iter().map(|s| s.name.clone()).collect(),
            queues: self.queues.iter().map(|q| q.name.clone()).collect(),
        }
    }

    /// `true` when every name of `subset` is resolved.
    #[must_use]
    pub fn includes(&self, subset: &Content) -> bool {
        self.names().includes(subset)
    }

    #[must_use]
    pub fn union(&self, other: &ReplyContent) -> ReplyContent {
        ReplyContent::new(
            self.services.iter().chain(&other.services).cloned().collect(),
            self.queues.iter().chain(&other.queues).cloned().collect(),
        )
    }

    /// Entries whose names are not listed in `names`.
    #[must_use]
    pub fn without(&self, names: &Content) -> ReplyContent {
        ReplyContent {
            services: self
                .services
                .iter()
                .filter(|s| names.services().binary_search(&s.name).is_err())
                .cloned()
                .collect(),
            queues: self
                .queues
                .iter()
                .filter(|q| names.queues().binary_search(&q.name).is_err())
                .cloned()
                .collect(),
        }
    }

    /// Entries whose names are listed in `names`.
    #[must_use]
    pub fn filter(&self, names: &Content) -> ReplyContent {
        ReplyContent {
            services: self
                .services
                .iter()
                .filter(|s| names.services().binary_search(&s.name).is_ok())
                .cloned()
                .collect(),
            queues: self
                .queues
                .iter()
                .filter(|q| names.queues().binary_search(&q.name).is_ok())
                .cloned()
                .collect(),
        }
    }

    /// Rebuilds the service list through `expand`, which may emit any number
    /// of entries per input entry. Queues pass through unchanged.
    #[must_use]
    pub fn flat_map_services<I>(&self, expand: impl FnMut(&ReplyService) -> I) -> ReplyContent
    where
        I: IntoIterator<Item = ReplyService>,
    {
        ReplyContent::new(
            self.services.iter().flat_map(expand).collect(),
            self.queues.clone(),
        )
    }
}

impl FromIterator<ReplyContent> for ReplyContent {
    fn from_iter<T: IntoIterator<Item = ReplyContent>>(iter: T) -> Self {
        let mut services = Vec::new();
        let mut queues = Vec::new();
        for content in iter {
            services.extend(content.services);
            queues.extend(content.queues);
        }
        ReplyContent::new(services, queues)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Fan-out/fan-in coordination.
//!
//! A [`Coordinator`] is a continuation table: one group per fan-out, keyed by
//! the correlation of every request sent for it. The owning state implements
//! [`Coordinates`] for each reply type, and the free functions [`add`],
//! [`deliver`] and [`failed`] drive the groups. Callbacks receive the owning
//! state mutably, so a continuation can send, open further groups, or touch
//! any other part of the engine.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use discovery_core::{Correlated, Correlation, ProcessHandle};
use tracing::{debug, trace};

/// Returned by a message callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Keep waiting for the remaining replies.
    Pending,
    /// Close the group now; later replies are discarded.
    Done,
}

/// How a group ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every provider replied.
    Complete,
    /// The message callback closed the group before every provider replied.
    Early,
    /// At least one provider went away without replying.
    Degraded,
}

/// Requests sent for one fan-out: correlation to the provider it went to.
pub type Pendings = BTreeMap<Correlation, ProcessHandle>;

type OnMessage<R, S> = Box<dyn FnMut(&mut S, &R) -> Progress + Send>;
type OnDone<R, S> = Box<dyn FnOnce(&mut S, Vec<R>, Outcome) + Send>;

struct Group<R, S> {
    pending: Pendings,
    replies: Vec<R>,
    degraded: bool,
    on_message: OnMessage<R, S>,
    on_done: OnDone<R, S>,
}

impl<R, S> Group<R, S> {
    fn outcome(&self, progress: Progress) -> Outcome {
        if progress == Progress::Done && !self.pending.is_empty() {
            Outcome::Early
        } else if self.degraded {
            Outcome::Degraded
        } else {
            Outcome::Complete
        }
    }
}

/// Open fan-out groups for reply type `R`, owned by state `S`.
pub struct Coordinator<R, S> {
    groups: BTreeMap<u64, Group<R, S>>,
    index: HashMap<Correlation, u64>,
    next: u64,
}

impl<R, S> Default for Coordinator<R, S> {
    fn default() -> Self {
        Self {
            groups: BTreeMap::new(),
            index: HashMap::new(),
            next: 0,
        }
    }
}

impl<R, S> fmt::Debug for Coordinator<R, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("groups", &self.groups.len())
            .field("outstanding", &self.index.len())
            .finish()
    }
}

impl<R, S> Coordinator<R, S> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Number of replies still awaited across all groups.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.index.len()
    }

    fn open(&mut self, group: Group<R, S>) {
        let id = self.next;
        self.next += 1;
        for correlation in group.pending.keys() {
            self.index.insert(*correlation, id);
        }
        self.groups.insert(id, group);
    }

    fn take(&mut self, correlation: Correlation) -> Option<(u64, Group<R, S>)> {
        let id = self.index.remove(&correlation)?;
        self.groups.remove(&id).map(|group| (id, group))
    }

    fn forget(&mut self, pending: &Pendings) {
        for correlation in pending.keys() {
            self.index.remove(correlation);
        }
    }
}

/// State that owns a [`Coordinator`] for reply type `R`.
pub trait Coordinates<R>: Sized {
    fn coordinator(&mut self) -> &mut Coordinator<R, Self>;
}

/// Opens a group for `pendings`.
///
/// With nothing pending, `on_done` runs immediately with no replies and the
/// group is never created.
pub fn add<R, S, M, D>(state: &mut S, pendings: Pendings, on_message: M, on_done: D)
where
    R: 'static,
    S: Coordinates<R> + 'static,
    M: FnMut(&mut S, &R) -> Progress + Send + 'static,
    D: FnOnce(&mut S, Vec<R>, Outcome) + Send + 'static,
{
    if pendings.is_empty() {
        trace!("nothing pending, completing at once");
        on_done(state, Vec::new(), Outcome::Complete);
        return;
    }

    trace!(pending = pendings.len(), "opening group");
    state.coordinator().open(Group {
        pending: pendings,
        replies: Vec::new(),
        degraded: false,
        on_message: Box::new(on_message),
        on_done: Box::new(on_done),
    });
}

/// Routes `reply` to its group. Returns `false` when no open group awaits
/// its correlation; such replies are dropped.
pub fn deliver<R, S>(state: &mut S, reply: R) -> bool
where
    R: Correlated,
    S: Coordinates<R>,
{
    let correlation = reply.correlation();
    let Some((id, mut group)) = state.coordinator().take(correlation) else {
        debug!(%correlation, "discarding reply without an open group");
        return false;
    };

    group.pending.remove(&correlation);
    let progress = (group.on_message)(state, &reply);
    group.replies.push(reply);

    if progress == Progress::Done || group.pending.is_empty() {
        let outcome = group.outcome(progress);
        trace!(?outcome, replies = group.replies.len(), "closing group");
        state.coordinator().forget(&group.pending);
        (group.on_done)(state, group.replies, outcome);
    } else {
        state.coordinator().groups.insert(id, group);
    }
    true
}

/// Treats every pending request sent to a process matching `gone` as answered
/// with nothing. Groups left with nothing pending complete.
pub fn failed<R, S>(state: &mut S, gone: impl Fn(&ProcessHandle) -> bool)
where
    S: Coordinates<R>,
{
    let lost: Vec<(u64, Vec<Correlation>)> = state
        .coordinator()
        .groups
        .iter()
        .filter_map(|(id, group)| {
            let correlations: Vec<Correlation> = group
                .pending
                .iter()
                .filter(|(_, process)| gone(*process))
                .map(|(correlation, _)| *correlation)
                .collect();
            (!correlations.is_empty()).then_some((*id, correlations))
        })
        .collect();

    for (id, correlations) in lost {
        let coordinator = state.coordinator();
        let Some(mut group) = coordinator.groups.remove(&id) else {
            continue;
        };
        for correlation in &correlations {
            group.pending.remove(correlation);
            coordinator.index.remove(correlation);
        }
        group.degraded = true;
        debug!(lost = correlations.len(), remaining = group.pending.len(), "provider gone");

        if group.pending.is_empty() {
            (group.on_done)(state, group.replies, Outcome::Degraded);
        } else {
            state.coordinator().groups.insert(id, group);
        }
    }
}

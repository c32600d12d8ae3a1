//! Debounce buffer for discovery callers and topology updates.
//!
//! The first item of a batch arms a one-shot deadline; the dispatch loop
//! extracts the whole batch when it passes. Reaching the size limit asks for
//! an immediate flush instead.

use std::mem;
use std::time::Duration;

use discovery_core::messages::{DirectUpdate, ImplicitUpdate};
use discovery_core::ReplyContent;
use tokio::time::Instant;

use super::caller::Caller;
use crate::config::AccumulateConfig;

/// Everything gathered since the last flush.
#[derive(Debug, Default)]
pub(crate) struct Batch {
    pub discovery: Vec<Caller>,
    pub api: Vec<Caller>,
    /// What local lookups already resolved for the discovery callers.
    pub known: ReplyContent,
    pub direct: Vec<DirectUpdate>,
    pub implicit: Vec<ImplicitUpdate>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.discovery.len() + self.api.len() + self.direct.len() + self.implicit.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discovery and API callers, in that order.
    pub fn callers(&mut self) -> Vec<Caller> {
        let mut callers = mem::take(&mut self.discovery);
        callers.append(&mut self.api);
        callers
    }
}

#[derive(Debug)]
pub(crate) enum Item {
    Discovery { caller: Caller, known: ReplyContent },
    Api(Caller),
    Direct(DirectUpdate),
    Implicit(ImplicitUpdate),
}

/// Returned by [`Accumulator::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flush {
    /// Wait for the deadline.
    Later,
    /// The batch is full.
    Now,
}

#[derive(Debug)]
pub(crate) struct Accumulator {
    window: Duration,
    limit: usize,
    batch: Batch,
    deadline: Option<Instant>,
}

impl Accumulator {
    pub fn new(config: AccumulateConfig) -> Self {
        Self {
            window: config.window,
            limit: config.limit.max(1),
            batch: Batch::default(),
            deadline: None,
        }
    }

    /// Zero window means items are processed as they arrive.
    pub fn is_enabled(&self) -> bool {
        !self.window.is_zero()
    }

    pub fn add(&mut self, item: Item) -> Flush {
        if self.batch.is_empty() {
            self.deadline = Some(Instant::now() + self.window);
        }

        match item {
            Item::Discovery { caller, known } => {
                self.batch.known = self.batch.known.union(&known);
                self.batch.discovery.push(caller);
            }
            Item::Api(caller) => self.batch.api.push(caller),
            Item::Direct(update) => self.batch.direct.push(update),
            Item::Implicit(update) => self.batch.implicit.push(update),
        }

        if self.batch.len() >= self.limit {
            Flush::Now
        } else {
            Flush::Later
        }
    }

    /// When the current batch is due, if there is one.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Swaps out the batch and disarms the deadline.
    pub fn extract(&mut self) -> Batch {
        self.deadline = None;
        mem::take(&mut self.batch)
    }

    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use discovery_core::{Content, Correlation, IpcId, ProcessHandle, ReplyService};

    use super::*;
    use crate::engine::caller::CallerKind;

    fn api(service: &str) -> Item {
        Item::Api(Caller::new(
            CallerKind::Api,
            ProcessHandle::new(1, IpcId::new()),
            Correlation::new(),
            Content::services_only([service]),
        ))
    }

    fn accumulator(limit: usize) -> Accumulator {
        Accumulator::new(AccumulateConfig {
            window: Duration::from_millis(50),
            limit,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn first_item_arms_deadline_once() {
        let mut accumulator = accumulator(10);
        assert!(accumulator.deadline().is_none());

        let start = Instant::now();
        assert_eq!(accumulator.add(api("a")), Flush::Later);
        assert_eq!(accumulator.deadline(), Some(start + Duration::from_millis(50)));

        tokio::time::advance(Duration::from_millis(20)).await;
        accumulator.add(api("b"));
        assert_eq!(accumulator.deadline(), Some(start + Duration::from_millis(50)));
    }

    #[test]
    fn extract_swaps_batch_and_disarms() {
        let mut accumulator = accumulator(10);
        accumulator.add(api("a"));
        accumulator.add(Item::Direct(DirectUpdate {
            process: ProcessHandle::new(2, IpcId::new()),
            configured: Content::default(),
        }));

        let batch = accumulator.extract();
        assert_eq!(batch.len(), 2);
        assert!(accumulator.is_empty());
        assert!(accumulator.deadline().is_none());
        assert!(accumulator.extract().is_empty());
    }

    #[test]
    fn limit_requests_immediate_flush() {
        let mut accumulator = accumulator(2);
        assert_eq!(accumulator.add(api("a")), Flush::Later);
        assert_eq!(accumulator.add(api("b")), Flush::Now);
    }

    #[test]
    fn discovery_items_merge_known_content() {
        let mut accumulator = accumulator(10);
        for name in ["a", "b"] {
            let Item::Api(caller) = api(name) else { unreachable!() };
            accumulator.add(Item::Discovery {
                caller,
                known: ReplyContent::new(vec![ReplyService::new(name)], vec![]),
            });
        }

        let mut batch = accumulator.extract();
        assert_eq!(batch.known.names(), Content::services_only(["a", "b"]));
        assert_eq!(batch.callers().len(), 2);
    }

    #[test]
    fn zero_window_disables() {
        let accumulator = Accumulator::new(AccumulateConfig::disabled());
        assert!(!accumulator.is_enabled());
    }
}

//! Run state and dispatch budgeting
//!
//! This module handles:
//! - The run state machine (`Idle -> Running <-> Draining -> Done`, or `Cancelled`)
//! - The global concurrency limit (in-flight count)
//! - Global spacing between dispatches
//! - The request and wall-clock budgets
//!
//! Per-host politeness lives in the politeness gate, not here.

use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Lifecycle of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlState {
    /// Created, not started
    Idle,

    /// Work is pending or a discovery source is still open
    Running,

    /// Nothing left to dispatch; waiting for in-flight tasks
    Draining,

    /// Everything finished
    Done,

    /// Stopped early by the run token or a budget
    Cancelled,
}

impl CrawlState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrawlState::Idle => "idle",
            CrawlState::Running => "running",
            CrawlState::Draining => "draining",
            CrawlState::Done => "done",
            CrawlState::Cancelled => "cancelled",
        }
    }

    /// Returns true if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, CrawlState::Done | CrawlState::Cancelled)
    }

    /// Returns true while new work may be dispatched
    pub fn is_active(&self) -> bool {
        matches!(self, CrawlState::Running | CrawlState::Draining)
    }

    /// Checks if a transition from this state to another is valid
    pub fn can_transition_to(&self, next: CrawlState) -> bool {
        use CrawlState::*;
        matches!(
            (self, next),
            (Idle, Running)
                | (Running, Draining)
                | (Draining, Running)
                | (Running, Done)
                | (Draining, Done)
                | (Idle, Cancelled)
                | (Running, Cancelled)
                | (Draining, Cancelled)
        )
    }
}

impl fmt::Display for CrawlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a run stopped dispatching early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The run token was cancelled
    Interrupted,

    /// `max_requests` dispatches were made
    RequestBudget,

    /// `max_duration` elapsed
    Deadline,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Interrupted => f.write_str("cancellation requested"),
            StopReason::RequestBudget => f.write_str("request budget exhausted"),
            StopReason::Deadline => f.write_str("time budget exhausted"),
        }
    }
}

/// Limits applied by the [`Scheduler`]
#[derive(Debug, Clone, Copy)]
pub struct SchedulerLimits {
    pub concurrency: usize,
    pub dispatch_delay: Duration,
    pub max_requests: Option<u64>,
    pub max_duration: Option<Duration>,
}

/// Dispatch bookkeeping for the coordinator loop
#[derive(Debug)]
pub struct Scheduler {
    state: CrawlState,
    limits: SchedulerLimits,
    in_flight: usize,
    high_water: usize,
    dispatched: u64,
    last_dispatch: Option<Instant>,
    deadline: Option<Instant>,
    stop_reason: Option<StopReason>,
}

impl Scheduler {
    pub fn new(limits: SchedulerLimits) -> Self {
        Self {
            state: CrawlState::Idle,
            limits: SchedulerLimits {
                concurrency: limits.concurrency.max(1),
                ..limits
            },
            in_flight: 0,
            high_water: 0,
            dispatched: 0,
            last_dispatch: None,
            deadline: None,
            stop_reason: None,
        }
    }

    pub fn state(&self) -> CrawlState {
        self.state
    }

    fn transition(&mut self, next: CrawlState) {
        if self.state == next {
            return;
        }
        if !self.state.can_transition_to(next) {
            tracing::debug!("Ignoring invalid transition {} -> {}", self.state, next);
            return;
        }
        tracing::debug!("Crawl state {} -> {}", self.state, next);
        self.state = next;
    }

    /// Enters `Running` and arms the wall-clock budget
    pub fn start(&mut self, now: Instant) {
        self.deadline = self.limits.max_duration.map(|d| now + d);
        self.transition(CrawlState::Running);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Highest in-flight count observed
    pub fn high_water(&self) -> usize {
        self.high_water
    }

    /// Total dispatches so far
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    /// Returns true if another task may be started now (spacing aside)
    pub fn has_capacity(&self) -> bool {
        self.state.is_active() && self.in_flight < self.limits.concurrency
    }

    pub fn budget_exhausted(&self) -> bool {
        self.limits
            .max_requests
            .is_some_and(|max| self.dispatched >= max)
    }

    /// Time left before the global dispatch spacing allows another dispatch
    pub fn dispatch_wait(&self, now: Instant) -> Option<Duration> {
        let last = self.last_dispatch?;
        let elapsed = now.saturating_duration_since(last);
        (elapsed < self.limits.dispatch_delay).then(|| self.limits.dispatch_delay - elapsed)
    }

    pub fn record_dispatch(&mut self, now: Instant) {
        self.in_flight += 1;
        self.high_water = self.high_water.max(self.in_flight);
        self.dispatched += 1;
        self.last_dispatch = Some(now);
    }

    pub fn record_completion(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    /// Moves between `Running`, `Draining` and `Done`
    ///
    /// `pending` is true when the frontier has entries, `sources_open` while
    /// a discovery source may still produce URLs.
    pub fn update(&mut self, pending: bool, sources_open: bool) {
        if !self.state.is_active() {
            return;
        }

        if pending || sources_open {
            self.transition(CrawlState::Running);
        } else if self.in_flight > 0 {
            self.transition(CrawlState::Draining);
        } else {
            self.transition(CrawlState::Done);
        }
    }

    /// Stops dispatching; the first reason given is kept
    pub fn cancel(&mut self, reason: StopReason) {
        if self.state.is_terminal() {
            return;
        }
        self.stop_reason.get_or_insert(reason);
        self.transition(CrawlState::Cancelled);
    }
}

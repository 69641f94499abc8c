//! Crawl frontier
//!
//! The frontier holds the URLs waiting to be fetched, in breadth-first order,
//! and the set of every URL ever accepted during the run. It is owned by the
//! coordinator loop, so checking and inserting a URL is a single step.

use crate::url::CanonicalUrl;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

/// A URL waiting to be fetched
#[derive(Debug, Clone)]
pub struct FrontierEntry {
    pub url: CanonicalUrl,

    /// Hops from the nearest seed
    pub depth: u32,

    /// Page or sitemap the URL was first found on; `None` for seeds
    pub discovered_from: Option<String>,

    pub discovered_at: DateTime<Utc>,

    /// Insertion order, for FIFO within a depth
    seq: u64,
}

// BinaryHeap is a max-heap: shallower and older entries must compare greater
impl Ord for FrontierEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .depth
            .cmp(&self.depth)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for FrontierEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for FrontierEntry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for FrontierEntry {}

/// What happened to an offered URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Enqueued,

    /// Already pending, in flight or finished in this run
    AlreadySeen,

    /// Deeper than the configured maximum
    TooDeep,
}

/// Pending queue plus visited set
#[derive(Debug)]
pub struct Frontier {
    pending: BinaryHeap<FrontierEntry>,
    seen: HashSet<String>,
    max_depth: u32,
    next_seq: u64,
}

impl Frontier {
    pub fn new(max_depth: u32) -> Self {
        Self {
            pending: BinaryHeap::new(),
            seen: HashSet::new(),
            max_depth,
            next_seq: 0,
        }
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Offers a URL at `depth`
    ///
    /// The first offer of a URL wins; later offers are ignored even if they
    /// come with a smaller depth.
    pub fn offer(
        &mut self,
        url: CanonicalUrl,
        depth: u32,
        discovered_from: Option<&str>,
    ) -> Offer {
        if depth > self.max_depth {
            return Offer::TooDeep;
        }

        if !self.seen.insert(url.as_str().to_string()) {
            return Offer::AlreadySeen;
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        self.pending.push(FrontierEntry {
            url,
            depth,
            discovered_from: discovered_from.map(str::to_string),
            discovered_at: Utc::now(),
            seq,
        });

        Offer::Enqueued
    }

    /// Removes the next entry in breadth-first order
    pub fn pop(&mut self) -> Option<FrontierEntry> {
        self.pending.pop()
    }

    /// Returns true if `url` was ever accepted in this run
    pub fn contains(&self, url: &CanonicalUrl) -> bool {
        self.seen.contains(url.as_str())
    }

    /// Number of pending entries
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Number of distinct URLs accepted so far
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }
}

//! Per-run duplicate index.

use std::collections::{HashMap, HashSet, VecDeque};

use calsync_core::{Event, Fingerprint};

/// What [`DuplicateIndex::observe`] decided for one destination event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Seen earlier in this run, with every local copy already bound.
    Duplicate,
    /// Bound to the local event at this index.
    Matched(usize),
    /// No unmatched local event has this fingerprint.
    Unmatched,
}

/// Matches destination events to local events by fingerprint.
///
/// Built fresh for every run over the sorted local events. Each local event
/// can be matched once; identical local events are bound in index order.
#[derive(Debug)]
pub struct DuplicateIndex {
    unmatched_by_fingerprint: HashMap<Fingerprint, VecDeque<usize>>,
    seen: HashSet<Fingerprint>,
    matched: Vec<bool>,
}

impl DuplicateIndex {
    pub fn new(local_events: &[Event]) -> Self {
        let mut unmatched_by_fingerprint: HashMap<Fingerprint, VecDeque<usize>> = HashMap::new();
        for (i, event) in local_events.iter().enumerate() {
            unmatched_by_fingerprint
                .entry(event.fingerprint())
                .or_default()
                .push_back(i);
        }
        Self {
            unmatched_by_fingerprint,
            seen: HashSet::new(),
            matched: vec![false; local_events.len()],
        }
    }

    /// Binds a destination event to the first unmatched local event with the
    /// same fingerprint.
    ///
    /// When no unmatched local event is left, a fingerprint already observed
    /// in this run is reported as a duplicate. N identical local events thus
    /// absorb N identical destination events before any is a duplicate.
    /// Matching before the seen-check keeps a repeat run over identical
    /// local events from deleting and recreating them.
    pub fn observe(&mut self, fingerprint: &Fingerprint) -> Observation {
        let first_sighting = self.seen.insert(fingerprint.clone());
        match self
            .unmatched_by_fingerprint
            .get_mut(fingerprint)
            .and_then(VecDeque::pop_front)
        {
            Some(i) => {
                self.matched[i] = true;
                Observation::Matched(i)
            }
            None if first_sighting => Observation::Unmatched,
            None => Observation::Duplicate,
        }
    }

    pub fn is_matched(&self, index: usize) -> bool {
        self.matched.get(index).copied().unwrap_or(false)
    }

    /// Indices of local events never matched, ascending.
    pub fn unmatched(&self) -> impl Iterator<Item = usize> + '_ {
        self.matched
            .iter()
            .enumerate()
            .filter(|(_, matched)| !**matched)
            .map(|(i, _)| i)
    }

    pub fn matched_count(&self) -> usize {
        self.matched.iter().filter(|m| **m).count()
    }
}

// src/block.rs
//! Grouping of decoded sentences into per-update-cycle blocks

use crate::gps::data::{Constellation, DataKind, SatelliteRecord, Sentence};
use log::debug;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

/// Why a block was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    /// A repeated cycle-opening sentence (GGA, RMC, or GNS when neither is
    /// present) started the next cycle.
    Boundary,
    /// Nothing arrived for the configured idle duration.
    IdleTimeout,
    /// The caller flushed the aggregator before the idle duration elapsed.
    Flushed,
}

/// Sentences from one GPS update cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Block {
    pub sequence: u64,
    pub sentences: Vec<Sentence>,
    pub kinds: BTreeSet<DataKind>,
    /// GSV satellites of the block, concatenated per constellation in
    /// arrival order. Repeated PRNs are kept.
    pub satellites: BTreeMap<Constellation, Vec<SatelliteRecord>>,
    pub completion: Completion,
}

impl Block {
    fn open(sequence: u64) -> Self {
        Self {
            sequence,
            sentences: Vec::new(),
            kinds: BTreeSet::new(),
            satellites: BTreeMap::new(),
            completion: Completion::Boundary,
        }
    }

    fn push(&mut self, sentence: Sentence) {
        self.kinds.extend(sentence.kinds().iter().copied());
        if let Sentence::Gsv(gsv) = &sentence {
            self.satellites
                .entry(gsv.constellation)
                .or_default()
                .extend(gsv.satellites.iter().cloned());
        }
        self.sentences.push(sentence);
    }

    /// Whether `sentence` repeats this block's cycle-opening sentence.
    ///
    /// GGA and RMC open a cycle. GNS only does so for receivers that send
    /// neither, so a GNS-only stream still closes a block per cycle.
    fn starts_new_cycle(&self, sentence: &Sentence) -> bool {
        let repeated = self
            .sentences
            .iter()
            .any(|seen| std::mem::discriminant(seen) == std::mem::discriminant(sentence));
        match sentence {
            Sentence::Gga(_) | Sentence::Rmc(_) => repeated,
            Sentence::Gns(_) => repeated && !self.sentences.iter().any(Sentence::is_primary),
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    pub fn has_kind(&self, kind: DataKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn satellite_count(&self) -> usize {
        self.satellites.values().map(Vec::len).sum()
    }

    /// Short human-readable summary, e.g. `3 sentences, types: position, velocity`.
    pub fn description(&self) -> String {
        let kinds: Vec<&str> = self.kinds.iter().map(DataKind::name).collect();
        let kinds = if kinds.is_empty() {
            "none".to_string()
        } else {
            kinds.join(", ")
        };
        format!("{} sentences, types: {}", self.len(), kinds)
    }
}

enum State {
    Empty,
    Open { block: Block, last_seen: Instant },
}

/// Collects sentences until a cycle boundary or an idle timeout closes the block.
pub struct BlockAggregator {
    idle_timeout: Duration,
    state: State,
    next_sequence: u64,
}

impl BlockAggregator {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            idle_timeout,
            state: State::Empty,
            next_sequence: 1,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, State::Open { .. })
    }

    /// Number of sentences in the currently open block.
    pub fn pending(&self) -> usize {
        match &self.state {
            State::Open { block, .. } => block.len(),
            State::Empty => 0,
        }
    }

    /// Add a sentence received at `now`, returning any blocks it closed.
    ///
    /// An idle block is closed before the boundary check, so at most one
    /// block closes per call. The new sentence always ends up in the open block.
    pub fn push(&mut self, sentence: Sentence, now: Instant) -> Vec<Block> {
        let mut closed = Vec::new();
        if let Some(block) = self.tick(now) {
            closed.push(block);
        }

        let boundary = match &self.state {
            State::Open { block, .. } => block.starts_new_cycle(&sentence),
            State::Empty => false,
        };
        if boundary {
            debug!("{} starts a new update cycle", sentence.type_name());
            if let Some(block) = self.close(Completion::Boundary) {
                closed.push(block);
            }
        }

        match &mut self.state {
            State::Open { block, last_seen } => {
                block.push(sentence);
                *last_seen = now;
            }
            State::Empty => {
                let mut block = Block::open(self.next_sequence);
                self.next_sequence += 1;
                block.push(sentence);
                self.state = State::Open {
                    block,
                    last_seen: now,
                };
            }
        }

        closed
    }

    /// Close the open block if it has been idle longer than the timeout.
    pub fn tick(&mut self, now: Instant) -> Option<Block> {
        if self.idle_elapsed(now) {
            self.close(Completion::IdleTimeout)
        } else {
            None
        }
    }

    /// Close the open block regardless of idle time.
    pub fn flush(&mut self, now: Instant) -> Option<Block> {
        let completion = if self.idle_elapsed(now) {
            Completion::IdleTimeout
        } else {
            Completion::Flushed
        };
        self.close(completion)
    }

    fn idle_elapsed(&self, now: Instant) -> bool {
        match &self.state {
            State::Open { last_seen, .. } => {
                now.saturating_duration_since(*last_seen) > self.idle_timeout
            }
            State::Empty => false,
        }
    }

    fn close(&mut self, completion: Completion) -> Option<Block> {
        match std::mem::replace(&mut self.state, State::Empty) {
            State::Open { mut block, .. } => {
                block.completion = completion;
                debug!(
                    "Block {} closed ({:?}): {}",
                    block.sequence,
                    completion,
                    block.description()
                );
                Some(block)
            }
            State::Empty => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gps::{nmea::decode, token::tokenize};

    const GGA_1: &str = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";
    const GSV_1: &str = "$GPGSV,2,1,08,01,40,083,46,02,17,308,41,12,07,344,39,14,22,228,45*75";
    const GSV_2: &str = "$GPGSV,2,2,08,18,09,113,45,19,13,052,44,24,02,349,36,25,05,196,30*7E";
    const GSA: &str = "$GPGSA,A,3,01,02,12,14,18,19,24,25,,,,,1.5,0.9,1.2*39";
    const RMC: &str = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A";
    const GNS: &str = "$GNGNS,014035.00,4332.69262,S,17235.48549,E,RR,13,0.9,25.63,11.24,,*70";
    const GLGSV: &str = "$GLGSV,1,1,04,65,40,083,46,66,17,308,41,72,07,344,,80,22,228,45*67";

    fn sentence(line: &str) -> Sentence {
        decode(&tokenize(line).unwrap())
    }

    fn aggregator() -> BlockAggregator {
        BlockAggregator::new(Duration::from_millis(1000))
    }

    #[test]
    fn test_second_gga_closes_block() {
        let mut agg = aggregator();
        let start = Instant::now();

        for (i, line) in [GGA_1, GSV_1, GSV_2, GSA, RMC].iter().enumerate() {
            let closed = agg.push(sentence(line), start + Duration::from_millis(10 * i as u64));
            assert!(closed.is_empty());
        }
        assert_eq!(agg.pending(), 5);

        let closed = agg.push(sentence(GGA_1), start + Duration::from_millis(100));
        assert_eq!(closed.len(), 1);
        let block = &closed[0];
        assert_eq!(block.completion, Completion::Boundary);
        assert_eq!(block.sequence, 1);
        let types: Vec<&str> = block.sentences.iter().map(Sentence::type_name).collect();
        assert_eq!(types, vec!["GGA", "GSV", "GSV", "GSA", "RMC"]);

        // The boundary sentence opens the next block.
        assert!(agg.is_open());
        assert_eq!(agg.pending(), 1);
    }

    #[test]
    fn test_second_rmc_is_also_a_boundary() {
        let mut agg = aggregator();
        let now = Instant::now();
        assert!(agg.push(sentence(RMC), now).is_empty());
        assert!(agg.push(sentence(GSA), now).is_empty());
        let closed = agg.push(sentence(RMC), now);
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].len(), 2);
    }

    #[test]
    fn test_gns_only_stream_closes_a_block_per_cycle() {
        let mut agg = aggregator();
        let start = Instant::now();
        let mut closed = Vec::new();

        for second in 0..60u64 {
            let at = start + Duration::from_secs(second);
            closed.extend(agg.push(sentence(GNS), at));
            closed.extend(agg.push(sentence(GSA), at + Duration::from_millis(200)));
        }

        assert_eq!(closed.len(), 59);
        assert!(closed.iter().all(|b| b.completion == Completion::Boundary));
        assert!(closed.iter().all(|b| b.len() == 2));
        assert_eq!(agg.pending(), 2);
    }

    #[test]
    fn test_gns_is_not_a_boundary_next_to_gga() {
        let mut agg = aggregator();
        let now = Instant::now();
        for line in [GGA_1, GNS, GSA] {
            assert!(agg.push(sentence(line), now).is_empty());
        }
        assert!(agg.push(sentence(GNS), now).is_empty());
        assert_eq!(agg.pending(), 4);
    }

    #[test]
    fn test_block_kinds_summary() {
        let mut agg = aggregator();
        let now = Instant::now();
        for line in [GGA_1, GSV_1, RMC] {
            agg.push(sentence(line), now);
        }
        let block = agg.flush(now).unwrap();
        assert!(block.has_kind(DataKind::FixData));
        assert!(block.has_kind(DataKind::Position));
        assert!(block.has_kind(DataKind::Satellites));
        assert!(block.has_kind(DataKind::Velocity));
        assert_eq!(
            block.description(),
            "3 sentences, types: fix_data, position, satellites, velocity"
        );
    }

    #[test]
    fn test_gsv_pages_are_stitched_per_constellation() {
        let mut agg = aggregator();
        let now = Instant::now();
        for line in [GSV_1, GSV_2, GLGSV, GSV_1] {
            agg.push(sentence(line), now);
        }
        let block = agg.flush(now).unwrap();
        // Repeated GPS page keeps its duplicate PRNs.
        assert_eq!(block.satellites[&Constellation::Gps].len(), 12);
        assert_eq!(block.satellites[&Constellation::Glonass].len(), 4);
        assert_eq!(block.satellite_count(), 16);
        let prns: Vec<u16> = block.satellites[&Constellation::Gps]
            .iter()
            .map(|s| s.prn)
            .take(8)
            .collect();
        assert_eq!(prns, vec![1, 2, 12, 14, 18, 19, 24, 25]);
    }

    #[test]
    fn test_idle_timeout_closes_on_flush() {
        let mut agg = aggregator();
        let start = Instant::now();
        agg.push(sentence(GGA_1), start);

        assert!(agg.tick(start + Duration::from_millis(500)).is_none());
        let block = agg.flush(start + Duration::from_millis(1500)).unwrap();
        assert_eq!(block.completion, Completion::IdleTimeout);
        assert_eq!(block.len(), 1);
        assert!(!agg.is_open());
        assert!(agg.flush(start + Duration::from_millis(2000)).is_none());
    }

    #[test]
    fn test_flush_before_timeout() {
        let mut agg = aggregator();
        let start = Instant::now();
        agg.push(sentence(GSA), start);
        let block = agg.flush(start).unwrap();
        assert_eq!(block.completion, Completion::Flushed);
        assert!(!block.has_kind(DataKind::Position));
    }

    #[test]
    fn test_idle_block_closes_before_new_sentence() {
        let mut agg = aggregator();
        let start = Instant::now();
        agg.push(sentence(GGA_1), start);
        agg.push(sentence(GSA), start + Duration::from_millis(200));

        let closed = agg.push(sentence(GSV_1), start + Duration::from_millis(1300));
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].completion, Completion::IdleTimeout);
        assert_eq!(closed[0].len(), 2);
        assert_eq!(agg.pending(), 1);
    }

    #[test]
    fn test_sequence_numbers_increase() {
        let mut agg = aggregator();
        let now = Instant::now();
        agg.push(sentence(GGA_1), now);
        let first = agg.push(sentence(GGA_1), now).remove(0);
        let second = agg.flush(now).unwrap();
        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);
    }
}

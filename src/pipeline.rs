// src/pipeline.rs
//! The line-by-line decoding pipeline

use crate::{
    block::{Block, BlockAggregator},
    config::PipelineConfig,
    error::{DecodeError, Result},
    geofence::{self, GeofenceEvent, GeofenceStates, GeofenceStatus},
    gps::{
        data::Sentence,
        nmea,
        token::{self, Token},
    },
    position::{self, Fix, MovementDelta, PositionHistory},
};
use log::{debug, warn};
use serde::Serialize;
use std::time::Instant;

/// Everything the pipeline reports to its consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    SentenceDecoded {
        talker: String,
        checksum_valid: bool,
        sentence: Sentence,
    },
    BlockCompleted {
        block: Block,
    },
    PositionUpdated {
        fix: Fix,
        movement: Option<MovementDelta>,
        /// Whether `movement` exceeds `min_movement_meters`; false for the first fix.
        is_moving: bool,
    },
    GeofenceChanged {
        change: GeofenceEvent,
    },
    DecodeError {
        line: String,
        error: DecodeError,
    },
}

/// Running counters over everything fed to one pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineStats {
    pub lines: u64,
    pub sentences: u64,
    pub decode_errors: u64,
    pub checksum_errors: u64,
    pub unsupported: u64,
    pub blocks: u64,
    pub fixes: u64,
    pub geofence_transitions: u64,
    pub total_distance_m: f64,
    pub max_speed_knots: f64,
}

/// One decoding pipeline for one input source.
///
/// Owns the open block, the position history and the geofence states.
/// Lines must be fed in arrival order.
pub struct Pipeline {
    config: PipelineConfig,
    aggregator: BlockAggregator,
    history: PositionHistory,
    geofences: GeofenceStates,
    stats: PipelineStats,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            aggregator: BlockAggregator::new(config.idle_timeout()),
            history: PositionHistory::new(config.history_capacity),
            geofences: GeofenceStates::new(),
            stats: PipelineStats::default(),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn history(&self) -> &PositionHistory {
        &self.history
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn geofence_states(&self) -> &GeofenceStates {
        &self.geofences
    }

    pub fn geofence_status(&self, name: &str) -> Option<&GeofenceStatus> {
        self.geofences.by_name(&self.config.geofences, name)
    }

    /// Whether a sentence is waiting in an open block.
    pub fn has_open_block(&self) -> bool {
        self.aggregator.is_open()
    }

    /// Feed one raw line using the wall clock.
    pub fn feed(&mut self, line: &str) -> Vec<Event> {
        self.feed_at(line, Instant::now())
    }

    /// Feed one raw line received at `now`.
    pub fn feed_at(&mut self, line: &str, now: Instant) -> Vec<Event> {
        let mut events = Vec::new();
        self.stats.lines += 1;

        let token = match token::tokenize_unchecked(line) {
            Ok(token) => token,
            Err(error) => {
                debug!("Dropping line: {}", error);
                self.report(&mut events, line, error);
                return events;
            }
        };

        let checksum_valid = match token.verify_checksum() {
            Ok(()) => true,
            Err(error) => {
                warn!("{}: {}", token.address, error);
                self.stats.checksum_errors += 1;
                self.report(&mut events, line, error);
                if self.config.strict_checksum {
                    return events;
                }
                false
            }
        };

        let sentence = self.decode(&token, line, &mut events);
        events.push(Event::SentenceDecoded {
            talker: token.talker.clone(),
            checksum_valid,
            sentence: sentence.clone(),
        });

        for block in self.aggregator.push(sentence, now) {
            self.complete(block, &mut events);
        }
        events
    }

    /// Close the open block if it has been idle past the timeout.
    pub fn tick_at(&mut self, now: Instant) -> Vec<Event> {
        let mut events = Vec::new();
        if let Some(block) = self.aggregator.tick(now) {
            self.complete(block, &mut events);
        }
        events
    }

    /// Close any open block, e.g. at end of stream.
    pub fn flush(&mut self) -> Vec<Event> {
        self.flush_at(Instant::now())
    }

    pub fn flush_at(&mut self, now: Instant) -> Vec<Event> {
        let mut events = Vec::new();
        if let Some(block) = self.aggregator.flush(now) {
            self.complete(block, &mut events);
        }
        events
    }

    fn decode(&mut self, token: &Token, line: &str, events: &mut Vec<Event>) -> Sentence {
        let (sentence, issues) = nmea::decode_with_diagnostics(token);
        for issue in issues {
            self.report(events, line, issue);
        }
        if sentence.is_unsupported() {
            self.stats.unsupported += 1;
            self.report(
                events,
                line,
                DecodeError::UnsupportedType {
                    address: token.address.clone(),
                },
            );
        }
        self.stats.sentences += 1;
        sentence
    }

    fn report(&mut self, events: &mut Vec<Event>, line: &str, error: DecodeError) {
        self.stats.decode_errors += 1;
        events.push(Event::DecodeError {
            line: line.trim().to_string(),
            error,
        });
    }

    fn complete(&mut self, block: Block, events: &mut Vec<Event>) {
        self.stats.blocks += 1;
        let derived = position::derive(&block, &mut self.history);
        events.push(Event::BlockCompleted { block });

        let Some((fix, movement)) = derived else {
            return;
        };
        self.stats.fixes += 1;
        if let Some(delta) = &movement {
            self.stats.total_distance_m += delta.distance_m;
            if let Some(speed) = delta.speed_knots {
                self.stats.max_speed_knots = self.stats.max_speed_knots.max(speed);
            }
        }

        let changes = geofence::evaluate(&fix, &self.config.geofences, &mut self.geofences);
        let is_moving = movement
            .as_ref()
            .is_some_and(|delta| delta.is_significant(self.config.min_movement_meters));
        events.push(Event::PositionUpdated {
            fix,
            movement,
            is_moving,
        });
        for change in changes {
            self.stats.geofence_transitions += 1;
            events.push(Event::GeofenceChanged { change });
        }
    }
}

// src/geofence.rs
//! Circular geofences and entry/exit detection

use crate::position::{haversine_distance, Fix};
use log::info;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geofence {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(alias = "radius")]
    pub radius_m: f64,
}

impl Geofence {
    pub fn new(name: impl Into<String>, lat: f64, lon: f64, radius_m: f64) -> Self {
        Self {
            name: name.into(),
            lat,
            lon,
            radius_m,
        }
    }

    pub fn distance_from(&self, fix: &Fix) -> f64 {
        haversine_distance(fix.latitude, fix.longitude, self.lat, self.lon)
    }

    pub fn contains(&self, fix: &Fix) -> bool {
        self.distance_from(fix) <= self.radius_m
    }
}

/// Last known relation between the tracked position and one fence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct GeofenceStatus {
    pub inside: bool,
    /// `None` until the fence has been evaluated once.
    pub distance_m: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Entered,
    Exited,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeofenceEvent {
    pub fence: String,
    /// Position of the fence in the configured list.
    pub index: usize,
    pub transition: Transition,
    pub distance_m: f64,
}

/// Per-fence status, aligned with the configured fence list.
///
/// Fences are tracked by position, so two fences sharing a name are still
/// independent zones.
#[derive(Debug, Clone, Default)]
pub struct GeofenceStates {
    statuses: Vec<GeofenceStatus>,
}

impl GeofenceStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(&self, index: usize) -> Option<&GeofenceStatus> {
        self.statuses.get(index)
    }

    /// Status of the first fence named `name`.
    pub fn by_name<'a>(&'a self, fences: &[Geofence], name: &str) -> Option<&'a GeofenceStatus> {
        let index = fences.iter().position(|fence| fence.name == name)?;
        self.at(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &GeofenceStatus> {
        self.statuses.iter()
    }

    fn slot(&mut self, index: usize) -> &mut GeofenceStatus {
        if self.statuses.len() <= index {
            self.statuses.resize(index + 1, GeofenceStatus::default());
        }
        &mut self.statuses[index]
    }
}

/// Check a fix against every fence, in configured order.
///
/// Distances are refreshed for every fence; events are only produced when
/// a fence's inside/outside state flips. Fences start outside.
pub fn evaluate(fix: &Fix, fences: &[Geofence], states: &mut GeofenceStates) -> Vec<GeofenceEvent> {
    let mut events = Vec::new();

    for (index, fence) in fences.iter().enumerate() {
        let distance_m = fence.distance_from(fix);
        let inside = distance_m <= fence.radius_m;
        let status = states.slot(index);
        let was_inside = status.inside;
        status.inside = inside;
        status.distance_m = Some(distance_m);

        let transition = match (was_inside, inside) {
            (false, true) => Transition::Entered,
            (true, false) => Transition::Exited,
            _ => continue,
        };
        info!(
            "Geofence {} {:?} ({:.1} m from center)",
            fence.name, transition, distance_m
        );
        events.push(GeofenceEvent {
            fence: fence.name.clone(),
            index,
            transition,
            distance_m,
        });
    }

    events
}

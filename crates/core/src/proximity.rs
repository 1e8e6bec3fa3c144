//! Table of the nearest recently heard stations

use std::time::{Duration, Instant};

use log::{debug, trace};

use crate::slots::BoundedSlots;

pub const PROXIMITY_SLOTS: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct ProximityEntry {
    pub callsign: String,
    pub distance_km: f32,
    pub bearing: u16,
    pub last_heard: Instant,
}

impl ProximityEntry {
    pub fn describe(&self) -> String {
        format!("{}> {:.2}km {}", self.callsign, self.distance_km, self.bearing)
    }
}

/// Distance-ordered, time-expiring registry of heard stations.
///
/// Occupied slots always precede free ones and are ascending by distance.
/// A station already present is refreshed in place; a new one takes a free
/// slot or, when the table is full, pushes out the farthest station if it
/// is closer.
#[derive(Debug, Clone)]
pub struct ProximityTable {
    slots: BoundedSlots<ProximityEntry, PROXIMITY_SLOTS>,
    retention: Duration,
    last_expired: Instant,
    resort_needed: bool,
}

impl ProximityTable {
    pub fn new(retention: Duration, now: Instant) -> Self {
        Self {
            slots: BoundedSlots::new(),
            retention,
            last_expired: now,
            resort_needed: false,
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &ProximityEntry> {
        self.slots.iter()
    }

    pub fn get(&self, slot: usize) -> Option<&ProximityEntry> {
        self.slots.get(slot)
    }

    /// Records a heard station and keeps the table ordered.
    pub fn upsert(&mut self, callsign: &str, distance_km: f32, bearing: u16, now: Instant) {
        if callsign.is_empty() {
            return;
        }
        let bearing = bearing % 360;

        if let Some(index) = self.slots.position(|e| e.callsign == callsign) {
            if let Some(entry) = self.slots.get_mut(index) {
                entry.last_heard = now;
                entry.bearing = bearing;
                if entry.distance_km != distance_km {
                    entry.distance_km = distance_km;
                    self.resort_needed = true;
                }
            }
        } else {
            let entry = ProximityEntry {
                callsign: callsign.to_string(),
                distance_km,
                bearing,
                last_heard: now,
            };
            match self.slots.fill_free(entry) {
                Ok(index) => {
                    trace!("{} placed in free proximity slot {}", callsign, index);
                    self.resort_needed = true;
                }
                Err(entry) => {
                    match self.slots.position(|e| e.distance_km > distance_km) {
                        Some(index) => {
                            if let Some(evicted) = self.slots.insert_evicting(index, entry) {
                                debug!("{} replaces {} in proximity table", callsign, evicted.callsign);
                            }
                        }
                        None => trace!("{} farther than every tracked station, ignored", callsign),
                    }
                }
            }
        }

        if self.resort_needed {
            self.resort();
        }
    }

    pub fn resort(&mut self) {
        if !self.resort_needed {
            return;
        }
        self.slots
            .sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        self.resort_needed = false;
    }

    /// Clears every entry older than the retention window.
    pub fn expire(&mut self, now: Instant) -> usize {
        let retention = self.retention;
        let removed = self
            .slots
            .retain(|e| now.saturating_duration_since(e.last_heard) <= retention);
        if removed > 0 {
            debug!("Expired {} stations from proximity table", removed);
        }
        self.last_expired = now;
        removed
    }

    /// Runs [`expire`](Self::expire) at most once per retention window.
    pub fn maybe_expire(&mut self, now: Instant) -> usize {
        if now.saturating_duration_since(self.last_expired) > self.retention {
            self.expire(now)
        } else {
            0
        }
    }

    pub fn describe(&self, slot: usize) -> Option<String> {
        self.slots.get(slot).map(ProximityEntry::describe)
    }

    /// Rendered lines for every slot, free slots as empty strings
    pub fn describe_all(&self) -> [String; PROXIMITY_SLOTS] {
        std::array::from_fn(|i| self.describe(i).unwrap_or_default())
    }
}

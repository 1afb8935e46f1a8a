//
// Copyright 2025-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Aggro (threat) tracking
//!
//! Every AI context owns an [`AggroManager`] that maps attacking entities to a
//! non-negative threat value. Values decay over time and entries that fall to
//! the configured epsilon are forgotten.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thicket_common::EntityId;

/// How aggro values shrink over time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecayKind {
    /// Subtract `rate` per second
    #[default]
    Linear,
    /// Multiply by `1 - rate` per second
    Ratio,
}

/// Aggro decay settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggroConfig {
    pub decay: DecayKind,
    pub rate: f32,
    /// Entries at or below this value are removed during decay
    pub epsilon: f32,
    /// Ceiling of a single entry
    pub max: f32,
}

impl Default for AggroConfig {
    fn default() -> Self {
        Self {
            decay: DecayKind::Linear,
            rate: 1.0,
            epsilon: 0.01,
            max: 1_000_000.0,
        }
    }
}

/// Threat of a single target
#[derive(Debug, Clone, PartialEq)]
pub struct AggroEntry {
    pub target: EntityId,
    pub value: f32,
    /// Context time of the last [`AggroManager::add_aggro`] for this target
    pub last_updated: u64,
    sequence: u64,
}

impl AggroEntry {
    /// Monotonic insertion order, used to break ties between equal values
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

#[derive(Debug, Clone, Default)]
pub struct AggroManager {
    entries: HashMap<EntityId, AggroEntry>,
    config: AggroConfig,
    sequence: u64,
}

impl AggroManager {
    pub fn new(config: AggroConfig) -> Self {
        Self {
            entries: HashMap::new(),
            config,
            sequence: 0,
        }
    }

    pub fn config(&self) -> &AggroConfig {
        &self.config
    }

    /// Adjust the threat of `target` by `delta`, clamping the result to `[0, max]`.
    ///
    /// Returns the new value. Non-finite deltas are ignored.
    pub fn add_aggro(&mut self, target: EntityId, delta: f32, now_millis: u64) -> f32 {
        if !delta.is_finite() {
            tracing::warn!("Ignoring non-finite aggro delta {} for {}", delta, target);
            return self.value(target).unwrap_or(0.0);
        }

        self.sequence += 1;
        let sequence = self.sequence;
        let entry = self.entries.entry(target).or_insert(AggroEntry {
            target,
            value: 0.0,
            last_updated: now_millis,
            sequence,
        });
        entry.value = (entry.value + delta).clamp(0.0, self.config.max.max(0.0));
        entry.last_updated = now_millis;
        entry.sequence = sequence;
        entry.value
    }

    /// Shrink all values by the elapsed time and forget entries at or below epsilon.
    pub fn decay(&mut self, dt: Duration) {
        let shrink = self.config.rate.max(0.0) * dt.as_secs_f32();
        let epsilon = self.config.epsilon;

        for entry in self.entries.values_mut() {
            let decayed = match self.config.decay {
                DecayKind::Linear => (entry.value - shrink).max(0.0),
                DecayKind::Ratio => entry.value * (1.0 - shrink).clamp(0.0, 1.0),
            };
            // A shrink below the value's precision still takes it down one step
            entry.value = if shrink > 0.0 && decayed >= entry.value {
                entry.value * (1.0 - f32::EPSILON)
            } else {
                decayed
            };
        }
        self.entries.retain(|_, entry| entry.value > epsilon);
    }

    /// Target with the highest threat. Ties go to the most recently updated entry.
    pub fn highest_aggro(&self) -> Option<EntityId> {
        self.highest_entry().map(|entry| entry.target)
    }

    pub fn highest_entry(&self) -> Option<&AggroEntry> {
        self.entries.values().max_by(|a, b| {
            a.value
                .total_cmp(&b.value)
                .then_with(|| a.sequence.cmp(&b.sequence))
        })
    }

    /// All entries, highest threat first
    pub fn entries(&self) -> Vec<&AggroEntry> {
        let mut entries: Vec<&AggroEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| {
            b.value
                .total_cmp(&a.value)
                .then_with(|| b.sequence.cmp(&a.sequence))
        });
        entries
    }

    pub fn value(&self, target: EntityId) -> Option<f32> {
        self.entries.get(&target).map(|entry| entry.value)
    }

    pub fn remove(&mut self, target: EntityId) -> Option<AggroEntry> {
        self.entries.remove(&target)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn manager() -> AggroManager {
        AggroManager::new(AggroConfig::default())
    }

    #[test]
    fn test_add_aggro_floors_at_zero() {
        let mut aggro = manager();
        assert_eq!(aggro.add_aggro(EntityId(2), 5.0, 0), 5.0);
        assert_eq!(aggro.add_aggro(EntityId(2), -10.0, 10), 0.0);
        assert_eq!(aggro.value(EntityId(2)), Some(0.0));

        // Zero-valued entries disappear on the next decay
        aggro.decay(Duration::ZERO);
        assert!(aggro.is_empty());
    }

    #[test]
    fn test_highest_aggro_tie_breaks_on_recency() {
        let mut aggro = manager();
        aggro.add_aggro(EntityId(1), 10.0, 0);
        aggro.add_aggro(EntityId(2), 10.0, 0);
        assert_eq!(aggro.highest_aggro(), Some(EntityId(2)));

        aggro.add_aggro(EntityId(1), 0.0, 5);
        assert_eq!(aggro.highest_aggro(), Some(EntityId(1)));
    }

    #[test]
    fn test_linear_decay() {
        let mut aggro = manager();
        aggro.add_aggro(EntityId(1), 3.0, 0);
        aggro.add_aggro(EntityId(2), 0.5, 0);

        aggro.decay(Duration::from_secs(1));
        assert_eq!(aggro.value(EntityId(1)), Some(2.0));
        assert_eq!(aggro.value(EntityId(2)), None);
        assert_eq!(aggro.len(), 1);
    }

    #[test]
    fn test_ratio_decay() {
        let mut aggro = AggroManager::new(AggroConfig {
            decay: DecayKind::Ratio,
            rate: 0.5,
            ..Default::default()
        });
        aggro.add_aggro(EntityId(1), 8.0, 0);
        aggro.decay(Duration::from_secs(1));
        assert_eq!(aggro.value(EntityId(1)), Some(4.0));
    }

    #[test]
    fn test_entries_sorted_descending() {
        let mut aggro = manager();
        aggro.add_aggro(EntityId(1), 1.0, 0);
        aggro.add_aggro(EntityId(2), 7.0, 0);
        aggro.add_aggro(EntityId(3), 4.0, 0);

        let order: Vec<EntityId> = aggro.entries().iter().map(|e| e.target).collect();
        assert_eq!(order, vec![EntityId(2), EntityId(3), EntityId(1)]);
    }

    #[test]
    fn test_non_finite_delta_ignored() {
        let mut aggro = manager();
        aggro.add_aggro(EntityId(1), 2.0, 0);
        assert_eq!(aggro.add_aggro(EntityId(1), f32::NAN, 0), 2.0);
        assert_eq!(aggro.add_aggro(EntityId(9), f32::INFINITY, 0), 0.0);
        assert_eq!(aggro.len(), 1);
    }

    #[test]
    fn test_overflowing_adds_are_capped_and_still_decay() {
        let mut aggro = manager();
        aggro.add_aggro(EntityId(1), f32::MAX, 0);
        assert_eq!(aggro.add_aggro(EntityId(1), f32::MAX, 0), 1_000_000.0);

        for _ in 0..1000 {
            aggro.decay(Duration::from_secs(3600));
        }
        assert_eq!(aggro.value(EntityId(1)), None);
    }

    #[test]
    fn test_imprecise_decay_still_shrinks() {
        let mut aggro = AggroManager::new(AggroConfig {
            max: f32::MAX,
            ..Default::default()
        });
        aggro.add_aggro(EntityId(1), 1.0e9, 0);
        aggro.decay(Duration::from_millis(1));
        assert!(aggro.value(EntityId(1)).unwrap() < 1.0e9);
    }

    proptest! {
        #[test]
        fn prop_decay_alone_shrinks_then_forgets(
            values in prop::collection::vec(0.0f32..100.0, 1..8),
            millis in 100u64..1000,
            ratio in any::<bool>(),
        ) {
            let mut aggro = AggroManager::new(AggroConfig {
                decay: if ratio { DecayKind::Ratio } else { DecayKind::Linear },
                ..Default::default()
            });
            for (target, value) in values.iter().enumerate() {
                aggro.add_aggro(EntityId(target as u64), *value, 0);
            }

            let mut rounds = 0;
            while !aggro.is_empty() {
                prop_assert!(rounds < 2000, "aggro never drained");
                let before: HashMap<EntityId, f32> =
                    aggro.entries().iter().map(|e| (e.target, e.value)).collect();
                aggro.decay(Duration::from_millis(millis));
                for entry in aggro.entries() {
                    prop_assert!(entry.value <= before[&entry.target]);
                }
                rounds += 1;
            }
        }

        #[test]
        fn prop_tie_goes_to_latest_update(
            order in Just((0u64..6).collect::<Vec<u64>>()).prop_shuffle(),
            value in 1.0f32..100.0,
        ) {
            let mut aggro = manager();
            for target in &order {
                aggro.add_aggro(EntityId(*target), value, 0);
            }
            prop_assert_eq!(aggro.highest_aggro(), order.last().map(|t| EntityId(*t)));

            // A zero delta refreshes recency without changing the value
            let refreshed = EntityId(order[0]);
            aggro.add_aggro(refreshed, 0.0, 1);
            prop_assert_eq!(aggro.highest_aggro(), Some(refreshed));
        }

        #[test]
        fn prop_values_never_negative(
            ops in prop::collection::vec((0u64..4, -50.0f32..50.0, 0u64..500), 1..64)
        ) {
            let mut aggro = manager();
            for (target, delta, dt) in ops {
                aggro.add_aggro(EntityId(target), delta, 0);
                aggro.decay(Duration::from_millis(dt));
                for entry in aggro.entries() {
                    prop_assert!(entry.value >= 0.0);
                }
            }
        }

        #[test]
        fn prop_highest_is_maximum(
            ops in prop::collection::vec((0u64..8, 0.0f32..100.0), 1..32)
        ) {
            let mut aggro = manager();
            for (target, delta) in ops {
                aggro.add_aggro(EntityId(target), delta, 0);
            }
            let highest = aggro.highest_entry().map(|e| e.value).unwrap_or(0.0);
            for entry in aggro.entries() {
                prop_assert!(entry.value <= highest);
            }
        }
    }
}

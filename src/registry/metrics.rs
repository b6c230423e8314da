//! Process-wide loader metrics, aggregated per entity at the end of each
//! request scope. Only counters are kept here; no loaded values outlive
//! their request.

use super::LoaderRegistry;
use crate::loader::LoaderStats;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Accumulated stats for one entity across requests
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityMetrics {
    pub requests: u64,
    pub totals: LoaderStats,
    pub last_request_at: Option<DateTime<Utc>>,
}

impl EntityMetrics {
    /// Mean fetcher calls per request for this entity
    pub fn batches_per_request(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.totals.batches_dispatched as f64 / self.requests as f64
        }
    }
}

#[derive(Debug, Default)]
pub struct LoaderMetrics {
    entities: DashMap<&'static str, EntityMetrics>,
}

impl LoaderMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold every loader in a finished request into the totals
    pub fn record_request(&self, registry: &LoaderRegistry) {
        let now = Utc::now();
        for (entity, stats) in registry.stats() {
            let mut entry = self.entities.entry(entity).or_default();
            entry.requests += 1;
            entry.totals += stats;
            entry.last_request_at = Some(now);
        }
    }

    pub fn entity(&self, entity: &str) -> Option<EntityMetrics> {
        self.entities.get(entity).map(|entry| entry.value().clone())
    }

    /// Snapshot of every entity, sorted by name
    pub fn snapshot(&self) -> Vec<(&'static str, EntityMetrics)> {
        let mut snapshot: Vec<_> = self
            .entities
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        snapshot.sort_by_key(|(entity, _)| *entity);
        snapshot
    }

    pub fn reset(&self) {
        self.entities.clear();
    }
}

// src/engine/deadline.rs

use chrono::{DateTime, Utc};

use crate::{catalog::Catalog, models::session::SessionRecord};

/// Server-enforced remaining time, in whole seconds.
///
/// Question-level time is not part of this: the server keeps no per-question
/// start time, so the question countdown lives on the client only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Remaining {
    pub section: u64,
    pub total: u64,
}

impl Remaining {
    pub fn expired(&self) -> bool {
        self.section == 0 || self.total == 0
    }
}

/// `max(0, budget - floor((now - anchor) / 1000ms))`; a `now` before the
/// anchor counts as no time elapsed.
pub fn remaining_seconds(budget_seconds: u64, anchor: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let elapsed_ms = (now - anchor).num_milliseconds().max(0);
    let elapsed_seconds = (elapsed_ms / 1000) as u64;
    budget_seconds.saturating_sub(elapsed_seconds)
}

pub fn total_remaining(session: &SessionRecord, catalog: &Catalog, now: DateTime<Utc>) -> u64 {
    remaining_seconds(catalog.total_seconds(), session.test_started_at, now)
}

/// Zero when the section index is outside the catalog.
pub fn section_remaining(session: &SessionRecord, catalog: &Catalog, now: DateTime<Utc>) -> u64 {
    catalog
        .section(session.section_index)
        .map(|section| {
            remaining_seconds(
                section.config.section_budget_seconds(),
                session.section_started_at,
                now,
            )
        })
        .unwrap_or(0)
}

pub fn remaining(session: &SessionRecord, catalog: &Catalog, now: DateTime<Utc>) -> Remaining {
    Remaining {
        section: section_remaining(session, catalog, now),
        total: total_remaining(session, catalog, now),
    }
}

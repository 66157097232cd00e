//! Event-sourced ownership timeline
//!
//! Ownership is a step function over time: each event states the absolute
//! share in effect from its date forward. Events are kept sorted and the
//! derived series is recomputed from scratch whenever queried.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::dates::{add_months, end_of_month};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OwnershipTimeline {
    /// (effective month-end date, share) step changes
    events: Vec<(NaiveDate, f64)>,
    acquisition_date: Option<NaiveDate>,
}

impl OwnershipTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an absolute share effective from the month containing `date`.
    pub fn add_event(&mut self, date: NaiveDate, share: f64) {
        self.events.push((end_of_month(date), share));
        self.sort_events();
    }

    /// Initial share, effective the acquisition month.
    pub fn record_acquisition(&mut self, date: NaiveDate, share: f64) {
        let date = end_of_month(date);
        self.acquisition_date = Some(date);
        self.add_event(date, share);
    }

    /// Share drops to zero the month *after* disposition.
    pub fn record_disposition(&mut self, date: NaiveDate) {
        self.add_event(add_months(date, 1), 0.0);
    }

    /// Buying out a partner raises the share by `percent` (capped at 1.0),
    /// effective the buyout month.
    pub fn record_partner_buyout(&mut self, date: NaiveDate, percent: f64) {
        let effective = end_of_month(date);
        let share = (self.share_on(effective) + percent).min(1.0);
        self.add_event(effective, share);
    }

    /// A partial sale lowers the share by `percent` (floored at 0.0),
    /// effective the month *after* the sale.
    pub fn record_partial_sale(&mut self, date: NaiveDate, percent: f64) {
        let effective = add_months(date, 1);
        let share = (self.share_on(effective) - percent).max(0.0);
        self.add_event(effective, share);
    }

    fn sort_events(&mut self) {
        self.events.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then(a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
        });
    }

    pub fn acquisition_date(&self) -> Option<NaiveDate> {
        self.acquisition_date
    }

    pub fn events(&self) -> &[(NaiveDate, f64)] {
        &self.events
    }

    /// Share in effect on `query_date`: the latest event whose date is on
    /// or before the query; 0.0 before any event.
    pub fn share_on(&self, query_date: NaiveDate) -> f64 {
        for (date, share) in self.events.iter().rev() {
            if query_date >= *date {
                return *share;
            }
        }
        0.0
    }

    /// One share per analysis month, sweeping events forward. Months
    /// before acquisition are omitted.
    pub fn series(&self, months: &[NaiveDate]) -> BTreeMap<NaiveDate, f64> {
        let mut out = BTreeMap::new();
        let mut current = 0.0;
        let mut next_event = 0;

        for &month in months {
            if let Some(acquisition) = self.acquisition_date {
                if month < acquisition {
                    continue;
                }
            }
            while next_event < self.events.len() && self.events[next_event].0 <= month {
                current = self.events[next_event].1;
                next_event += 1;
            }
            out.insert(month, current);
        }
        out
    }
}

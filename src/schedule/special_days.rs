use super::model::SpecialDay;
use chrono::NaiveDate;
use std::collections::HashMap;

/// Special days indexed by calendar date.
pub struct SpecialDayIndex<'a> {
    by_date: HashMap<NaiveDate, Vec<&'a SpecialDay>>,
}

impl<'a> SpecialDayIndex<'a> {
    pub fn new(days: &'a [SpecialDay]) -> Self {
        let mut by_date: HashMap<NaiveDate, Vec<&'a SpecialDay>> = HashMap::new();
        for day in days {
            by_date.entry(day.date).or_default().push(day);
        }
        // Overlapping entries resolve to the oldest one.
        for entries in by_date.values_mut() {
            entries.sort_by_key(|d| d.id);
        }
        Self { by_date }
    }

    pub fn resolve(&self, date: NaiveDate, period: u32) -> Option<&'a SpecialDay> {
        self.by_date
            .get(&date)?
            .iter()
            .copied()
            .find(|d| d.periods.contains(&period))
    }
}

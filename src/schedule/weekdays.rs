//! Teaching-day sets and the two-level teaching-day filter.
//!
//! Weekday names are normalized once, when a configuration is saved or
//! loaded, into a small bitset over `chrono::Weekday`. The generation loop
//! only ever tests bits.

use chrono::{Datelike, NaiveDate, Weekday};
use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;

const ALL_DAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown weekday name: {0:?}")]
pub struct WeekdayParseError(pub String);

/// Parses a weekday name, full or three-letter, ignoring case.
pub fn parse_weekday(raw: &str) -> Result<Weekday, WeekdayParseError> {
    let trimmed = raw.trim();
    trimmed
        .parse::<Weekday>()
        .map_err(|_| WeekdayParseError(trimmed.to_string()))
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

fn bit(day: Weekday) -> u8 {
    1 << day.num_days_from_monday()
}

/// A set of weekdays on which teaching happens.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TeachingDays(u8);

impl TeachingDays {
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Monday through Friday.
    pub fn school_week() -> Self {
        Self::from_days(ALL_DAYS[..5].iter().copied())
    }

    pub fn from_days<I>(days: I) -> Self
    where
        I: IntoIterator<Item = Weekday>,
    {
        let mut out = Self::empty();
        for d in days {
            out.insert(d);
        }
        out
    }

    pub fn from_names<I, S>(names: I) -> Result<Self, WeekdayParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = Self::empty();
        for name in names {
            let name = name.as_ref();
            if name.trim().is_empty() {
                continue;
            }
            out.insert(parse_weekday(name)?);
        }
        Ok(out)
    }

    pub fn insert(&mut self, day: Weekday) {
        self.0 |= bit(day);
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & bit(day) != 0
    }

    pub fn includes_date(&self, date: NaiveDate) -> bool {
        self.contains(date.weekday())
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_subset_of(&self, other: &TeachingDays) -> bool {
        self.0 & !other.0 == 0
    }

    /// Days in `self` that are not in `other`.
    pub fn difference(&self, other: &TeachingDays) -> TeachingDays {
        TeachingDays(self.0 & !other.0)
    }

    /// Monday-first iteration.
    pub fn iter(&self) -> impl Iterator<Item = Weekday> + '_ {
        ALL_DAYS.iter().copied().filter(move |d| self.contains(*d))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.iter().map(weekday_name).collect()
    }
}

impl fmt::Debug for TeachingDays {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

impl Serialize for TeachingDays {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let names = self.names();
        let mut seq = serializer.serialize_seq(Some(names.len()))?;
        for n in names {
            seq.serialize_element(n)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for TeachingDays {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct NamesVisitor;

        impl<'de> Visitor<'de> for NamesVisitor {
            type Value = TeachingDays;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an array of weekday names")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut out = TeachingDays::empty();
                while let Some(name) = seq.next_element::<String>()? {
                    let day = parse_weekday(&name).map_err(de::Error::custom)?;
                    out.insert(day);
                }
                Ok(out)
            }
        }

        deserializer.deserialize_seq(NamesVisitor)
    }
}

/// Configuration-level filter: a day is processed at all only when its
/// weekday is a configuration teaching day.
pub fn day_qualifies(configuration_days: &TeachingDays, date: NaiveDate) -> bool {
    configuration_days.includes_date(date)
}

/// Period-level filter, applied on top of [`day_qualifies`].
pub fn period_fires(
    configuration_days: &TeachingDays,
    period_days: &TeachingDays,
    date: NaiveDate,
) -> bool {
    day_qualifies(configuration_days, date) && period_days.includes_date(date)
}

/// Dates in `[from, to]` passing the configuration-level filter.
pub fn teaching_dates(
    configuration_days: TeachingDays,
    from: NaiveDate,
    to: NaiveDate,
) -> impl Iterator<Item = NaiveDate> {
    from.iter_days()
        .take_while(move |d| *d <= to)
        .filter(move |d| day_qualifies(&configuration_days, *d))
}

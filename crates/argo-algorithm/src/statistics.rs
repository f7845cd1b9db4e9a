//! Statistics collected from algorithm runs

use std::{fmt, time::Duration};

/// Value of a single statistics entry
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatisticValue {
    /// A counter
    Count(usize),
    /// Time spent in a phase
    Duration(Duration),
    /// A yes / no fact about the run
    Flag(bool),
}

impl fmt::Display for StatisticValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatisticValue::Count(c) => write!(f, "{c}"),
            StatisticValue::Duration(d) => write!(f, "{:.3}s", d.as_secs_f64()),
            StatisticValue::Flag(b) => write!(f, "{}", if *b { "yes" } else { "no" }),
        }
    }
}

/// Ordered collection of named statistics entries
///
/// Entries keep the order in which they have been added, so that the output
/// of a pipeline lists the statistics of the innermost algorithm first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statistics {
    entries: Vec<(String, StatisticValue)>,
}

impl Statistics {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a counter
    pub fn add_count<S: Into<String>>(&mut self, name: S, count: usize) {
        self.entries.push((name.into(), StatisticValue::Count(count)));
    }

    /// Add a duration
    pub fn add_duration<S: Into<String>>(&mut self, name: S, duration: Duration) {
        self.entries
            .push((name.into(), StatisticValue::Duration(duration)));
    }

    /// Add a flag
    pub fn add_flag<S: Into<String>>(&mut self, name: S, flag: bool) {
        self.entries.push((name.into(), StatisticValue::Flag(flag)));
    }

    /// Get the first entry with the given name
    pub fn get(&self, name: &str) -> Option<&StatisticValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Iterate over all entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &StatisticValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Check whether no entry has been added
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.entries.iter().map(|(n, _)| n.len()).max().unwrap_or(0);

        for (name, value) in self.entries.iter() {
            writeln!(f, "{:<width$}  {value}", format!("{name}:"), width = width + 1)?;
        }

        Ok(())
    }
}

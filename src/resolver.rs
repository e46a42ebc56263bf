//! Resolution of a label filter against the series recorded for a metric.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::labels::{LabelFilter, LabelSet};

/// Outcome of matching a [`LabelFilter`] against recorded label-sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Exactly one series matched.
    Single(LabelSet),
    /// Two or more series matched, in discovery order.
    Many(Vec<LabelSet>),
}

impl Resolution {
    fn from_matches(mut matches: Vec<LabelSet>) -> Self {
        if matches.len() == 1 {
            Resolution::Single(matches.remove(0))
        } else {
            Resolution::Many(matches)
        }
    }

    /// Number of matched series.
    pub fn len(&self) -> usize {
        match self {
            Resolution::Single(_) => 1,
            Resolution::Many(all) => all.len(),
        }
    }

    /// Always `false`: resolution fails instead of matching nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flattens into the matched label-sets.
    pub fn into_label_sets(self) -> Vec<LabelSet> {
        match self {
            Resolution::Single(labels) => vec![labels],
            Resolution::Many(all) => all,
        }
    }
}

/// Matches `filter` against the label-sets recorded under `name`.
///
/// The null label-set never takes part in mapping filters: a metric that has
/// both label-less and labeled observations only exposes its label-less
/// series through [`LabelFilter::All`] and [`LabelFilter::Null`].
pub fn resolve(name: &str, available: Vec<LabelSet>, filter: &LabelFilter) -> Result<Resolution> {
    if available.is_empty() {
        return Err(Error::not_found(name, filter.to_string(), Vec::new()));
    }

    let resolution = match filter {
        LabelFilter::All => Resolution::from_matches(available),
        LabelFilter::Null => {
            if available.iter().any(LabelSet::is_null) {
                Resolution::Single(LabelSet::null())
            } else {
                return Err(not_found(name, filter, &available));
            }
        }
        LabelFilter::Exact(wanted) => {
            let matches: Vec<LabelSet> = available
                .iter()
                .filter(|labels| labels.as_map().is_some_and(|map| matches(map, wanted)))
                .cloned()
                .collect();
            if matches.is_empty() {
                return Err(not_found(name, filter, &available));
            }
            Resolution::from_matches(matches)
        }
    };

    #[cfg(feature = "logging")]
    log::debug!(
        "resolved metric '{name}' with filter {filter} to {} series",
        resolution.len()
    );

    Ok(resolution)
}

/// Structural equality of `series` restricted to the keys of `filter`.
///
/// Every filter key must be present on the series with the same value; keys
/// the filter does not name are ignored.
fn matches(series: &BTreeMap<String, String>, filter: &BTreeMap<String, String>) -> bool {
    filter
        .iter()
        .all(|(key, value)| series.get(key).is_some_and(|v| v == value))
}

fn not_found(name: &str, filter: &LabelFilter, available: &[LabelSet]) -> Error {
    Error::not_found(
        name,
        filter.to_string(),
        available.iter().map(LabelSet::canonical).collect(),
    )
}

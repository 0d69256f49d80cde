//! Year-built cohorts.
//!
//! A cohort is a named half-open `[low, high)` window on `year_built`.
//! Windows must not overlap, so a record lands in at most one cohort.
//! Records outside every window are left out of cohort statistics.

use serde::{Deserialize, Serialize};

use crate::{FeatureError, PropertyRecord};

/// A named half-open year range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CohortRange {
    /// Cohort name, e.g. `"1990_2000"`.
    pub name: String,
    /// First year included.
    pub low: i32,
    /// First year excluded.
    pub high: i32,
}

impl CohortRange {
    /// Creates a range.
    #[must_use]
    pub fn new(name: impl Into<String>, low: i32, high: i32) -> Self {
        Self {
            name: name.into(),
            low,
            high,
        }
    }

    /// Whether `year` falls in `[low, high)`.
    #[must_use]
    pub const fn contains(&self, year: i32) -> bool {
        self.low <= year && year < self.high
    }
}

/// A cohort's records.
#[derive(Debug, Clone, PartialEq)]
pub struct Cohort {
    /// The range that selected these records.
    pub range: CohortRange,
    /// Records whose year falls in the range, in input order.
    pub records: Vec<PropertyRecord>,
}

impl Cohort {
    /// Cohort name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.range.name
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the cohort has no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Cohorts in the order their ranges were given.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Cohorts(Vec<Cohort>);

impl Cohorts {
    /// Looks up a cohort by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Cohort> {
        self.0.iter().find(|c| c.name() == name)
    }

    /// Iterates cohorts in range order.
    pub fn iter(&self) -> std::slice::Iter<'_, Cohort> {
        self.0.iter()
    }

    /// Number of cohorts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no cohorts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a Cohorts {
    type Item = &'a Cohort;
    type IntoIter = std::slice::Iter<'a, Cohort>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Lowercase alphanumerics with every other character as `_`. Report
/// tables are named after cohorts this way.
fn file_key(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Checks that ranges are non-empty, uniquely named and non-overlapping.
/// Names that differ only in case or punctuation are rejected too, since
/// they would share output file names.
///
/// # Errors
///
/// Returns [`FeatureError::InvalidCohort`] describing the first problem.
pub fn validate_ranges(ranges: &[CohortRange]) -> Result<(), FeatureError> {
    for (i, range) in ranges.iter().enumerate() {
        if range.name.trim().is_empty() {
            return Err(FeatureError::InvalidCohort {
                message: format!("cohort #{} has an empty name", i + 1),
            });
        }
        if range.low >= range.high {
            return Err(FeatureError::InvalidCohort {
                message: format!(
                    "cohort '{}' has low {} >= high {}",
                    range.name, range.low, range.high
                ),
            });
        }
        for other in &ranges[..i] {
            if other.name == range.name {
                return Err(FeatureError::InvalidCohort {
                    message: format!("duplicate cohort name '{}'", range.name),
                });
            }
            if file_key(&other.name) == file_key(&range.name) {
                return Err(FeatureError::InvalidCohort {
                    message: format!(
                        "cohort names '{}' and '{}' map to the same output name '{}'",
                        other.name,
                        range.name,
                        file_key(&range.name)
                    ),
                });
            }
            if range.low < other.high && other.low < range.high {
                return Err(FeatureError::InvalidCohort {
                    message: format!(
                        "cohort '{}' [{}, {}) overlaps '{}' [{}, {})",
                        range.name, range.low, range.high, other.name, other.low, other.high
                    ),
                });
            }
        }
    }
    Ok(())
}

/// Sets each record's `cohort` label from `ranges`, clearing it for
/// records that match none. Returns the number of labelled records.
///
/// # Errors
///
/// Returns [`FeatureError::InvalidCohort`] if the ranges are invalid.
pub fn assign(
    records: &mut [PropertyRecord],
    ranges: &[CohortRange],
) -> Result<usize, FeatureError> {
    validate_ranges(ranges)?;

    let mut labelled = 0;
    for record in records.iter_mut() {
        record.cohort = record
            .year_built
            .and_then(|year| ranges.iter().find(|r| r.contains(year)))
            .map(|r| r.name.clone());
        if record.cohort.is_some() {
            labelled += 1;
        }
    }
    Ok(labelled)
}

/// Splits `records` into one [`Cohort`] per range, labelling each copied
/// record with its cohort name.
///
/// # Errors
///
/// Returns [`FeatureError::InvalidCohort`] if the ranges are invalid.
pub fn partition(
    records: &[PropertyRecord],
    ranges: &[CohortRange],
) -> Result<Cohorts, FeatureError> {
    validate_ranges(ranges)?;

    let mut cohorts: Vec<Cohort> = ranges
        .iter()
        .map(|range| Cohort {
            range: range.clone(),
            records: Vec::new(),
        })
        .collect();

    let mut dropped = 0usize;
    for record in records {
        let slot = record
            .year_built
            .and_then(|year| cohorts.iter().position(|c| c.range.contains(year)));

        match slot {
            Some(i) => {
                let mut record = record.clone();
                record.cohort = Some(cohorts[i].range.name.clone());
                cohorts[i].records.push(record);
            }
            None => dropped += 1,
        }
    }

    for cohort in &cohorts {
        log::info!(
            "Cohort '{}' [{}, {}): {} records",
            cohort.name(),
            cohort.range.low,
            cohort.range.high,
            cohort.len()
        );
    }
    log::debug!("{dropped} records fall outside every cohort");

    Ok(Cohorts(cohorts))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges() -> Vec<CohortRange> {
        vec![
            CohortRange::new("1990_2000", 1990, 2001),
            CohortRange::new("2010_2024", 2010, 2025),
        ]
    }

    fn records(years: &[Option<i32>]) -> Vec<PropertyRecord> {
        years
            .iter()
            .enumerate()
            .map(|(id, &year_built)| PropertyRecord {
                id,
                year_built,
                ..PropertyRecord::default()
            })
            .collect()
    }

    #[test]
    fn partition_is_disjoint_and_exhaustive_over_ranges() {
        let years: Vec<Option<i32>> = (1985..2030).map(Some).chain([None]).collect();
        let input = records(&years);
        let cohorts = partition(&input, &ranges()).unwrap();

        let early = cohorts.get("1990_2000").unwrap();
        let late = cohorts.get("2010_2024").unwrap();

        assert_eq!(early.len(), 11);
        assert_eq!(late.len(), 15);
        for r in &early.records {
            let y = r.year_built.unwrap();
            assert!((1990..2001).contains(&y));
            assert_eq!(r.cohort.as_deref(), Some("1990_2000"));
        }
        for r in &late.records {
            let y = r.year_built.unwrap();
            assert!((2010..2025).contains(&y));
            assert_eq!(r.cohort.as_deref(), Some("2010_2024"));
        }

        // Every in-range record lands in exactly one cohort.
        for record in &input {
            let hits = cohorts
                .iter()
                .filter(|c| c.records.iter().any(|r| r.id == record.id))
                .count();
            let expected = usize::from(
                record
                    .year_built
                    .is_some_and(|y| (1990..2001).contains(&y) || (2010..2025).contains(&y)),
            );
            assert_eq!(hits, expected, "record {:?}", record.year_built);
        }
    }

    #[test]
    fn upper_bound_is_exclusive() {
        let input = records(&[Some(2001), Some(2000), Some(2025), Some(2010)]);
        let cohorts = partition(&input, &ranges()).unwrap();
        assert_eq!(cohorts.get("1990_2000").unwrap().len(), 1);
        assert_eq!(cohorts.get("2010_2024").unwrap().len(), 1);
    }

    #[test]
    fn preserves_range_order() {
        let mut reversed = ranges();
        reversed.reverse();
        let cohorts = partition(&records(&[Some(1995)]), &reversed).unwrap();
        let names: Vec<&str> = cohorts.iter().map(Cohort::name).collect();
        assert_eq!(names, vec!["2010_2024", "1990_2000"]);
    }

    #[test]
    fn assign_labels_in_place() {
        let mut input = records(&[Some(1995), Some(2005), None, Some(2020)]);
        let labelled = assign(&mut input, &ranges()).unwrap();
        assert_eq!(labelled, 2);
        assert_eq!(input[0].cohort.as_deref(), Some("1990_2000"));
        assert_eq!(input[1].cohort, None);
        assert_eq!(input[2].cohort, None);
        assert_eq!(input[3].cohort.as_deref(), Some("2010_2024"));
    }

    #[test]
    fn rejects_overlapping_ranges() {
        let bad = vec![
            CohortRange::new("a", 1990, 2001),
            CohortRange::new("b", 2000, 2010),
        ];
        assert!(matches!(
            validate_ranges(&bad),
            Err(FeatureError::InvalidCohort { .. })
        ));
    }

    #[test]
    fn rejects_empty_and_duplicate_ranges() {
        assert!(validate_ranges(&[CohortRange::new("a", 2000, 2000)]).is_err());
        assert!(
            validate_ranges(&[
                CohortRange::new("a", 1990, 2000),
                CohortRange::new("a", 2000, 2010),
            ])
            .is_err()
        );
        assert!(validate_ranges(&[CohortRange::new("  ", 1990, 2000)]).is_err());
    }

    #[test]
    fn rejects_names_sharing_an_output_name() {
        let err = validate_ranges(&[
            CohortRange::new("1990-2000", 1990, 2000),
            CohortRange::new("1990_2000", 2000, 2010),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("same output name '1990_2000'"), "{err}");

        assert!(
            validate_ranges(&[
                CohortRange::new("Early", 1990, 2000),
                CohortRange::new("early", 2000, 2010),
            ])
            .is_err()
        );
    }
}

//! Explicit categorical factor with a declared reference level.

/// A categorical variable dummy-encoded against a reference level.
///
/// Levels are kept sorted so the encoding never depends on row order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Factor {
    name: String,
    levels: Vec<i64>,
    reference: i64,
}

impl Factor {
    /// Builds a factor from observed values.
    ///
    /// Uses `reference` as the reference level when it is one of the
    /// observed levels, otherwise the smallest level. Returns `None` when
    /// `values` is empty.
    #[must_use]
    pub fn from_values(
        name: impl Into<String>,
        values: &[i64],
        reference: Option<i64>,
    ) -> Option<Self> {
        let mut levels = values.to_vec();
        levels.sort_unstable();
        levels.dedup();

        let smallest = *levels.first()?;
        let name = name.into();
        let reference = match reference {
            Some(level) if levels.binary_search(&level).is_ok() => level,
            Some(level) => {
                log::warn!(
                    "Reference level {level} of '{name}' was not observed; using {smallest}"
                );
                smallest
            }
            None => smallest,
        };

        Some(Self {
            name,
            levels,
            reference,
        })
    }

    /// Factor name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All levels, ascending.
    #[must_use]
    pub fn levels(&self) -> &[i64] {
        &self.levels
    }

    /// The reference level.
    #[must_use]
    pub const fn reference(&self) -> i64 {
        self.reference
    }

    /// Levels that get a dummy column, ascending.
    pub fn dummy_levels(&self) -> impl Iterator<Item = i64> + '_ {
        self.levels
            .iter()
            .copied()
            .filter(move |&level| level != self.reference)
    }

    /// Term names of the dummy columns, e.g. `year_built[2001]`.
    #[must_use]
    pub fn terms(&self) -> Vec<String> {
        self.dummy_levels()
            .map(|level| format!("{}[{level}]", self.name))
            .collect()
    }

    /// Dummy encoding of one value: a 1 in the column of its level, 0
    /// elsewhere, all zeros for the reference level.
    #[must_use]
    pub fn encode(&self, value: i64) -> Vec<f64> {
        self.dummy_levels()
            .map(|level| if level == value { 1.0 } else { 0.0 })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_sorted_and_distinct() {
        let factor = Factor::from_values("year_built", &[2003, 2001, 2003, 2002], None).unwrap();
        assert_eq!(factor.levels(), &[2001, 2002, 2003]);
        assert_eq!(factor.reference(), 2001);
        assert_eq!(factor.terms(), vec!["year_built[2002]", "year_built[2003]"]);
        assert_eq!(factor.encode(2001), vec![0.0, 0.0]);
        assert_eq!(factor.encode(2003), vec![0.0, 1.0]);
    }

    #[test]
    fn honours_declared_reference() {
        let factor = Factor::from_values("year_built", &[1990, 1995, 2000], Some(1995)).unwrap();
        assert_eq!(factor.reference(), 1995);
        assert_eq!(factor.terms(), vec!["year_built[1990]", "year_built[2000]"]);
        assert_eq!(factor.encode(1995), vec![0.0, 0.0]);
    }

    #[test]
    fn unobserved_reference_falls_back_to_smallest() {
        let factor = Factor::from_values("year_built", &[1990, 1995], Some(1800)).unwrap();
        assert_eq!(factor.reference(), 1990);
    }

    #[test]
    fn empty_values_have_no_factor() {
        assert!(Factor::from_values("year_built", &[], None).is_none());
    }
}

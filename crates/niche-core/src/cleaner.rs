//! Missing-data removal for occurrence records.

use crate::Point;

/// Raw occurrence columns of one species, one column per niche variable.
/// `None` marks a variable whose input file was absent.
#[derive(Debug, Clone)]
pub struct RawObservations {
    pub species: String,
    pub columns: Vec<Option<Vec<f64>>>,
}

/// Result of cleaning every species.
#[derive(Debug, Default)]
pub struct CleanReport {
    /// Species with at least one complete observation, in input order.
    pub retained: Vec<(String, Vec<Point>)>,
    /// Species left with no complete observation.
    pub missing: Vec<String>,
}

impl CleanReport {
    pub fn species(&self) -> Vec<String> {
        self.retained.iter().map(|(s, _)| s.clone()).collect()
    }
}

/// Zip per-variable columns into observation tuples, dropping any tuple with a
/// sentinel (or non-finite) coordinate.
///
/// Columns are aligned by row index; unequal lengths truncate to the shortest.
pub fn clean_observations(columns: &[Vec<f64>], sentinel: f64) -> Vec<Point> {
    let Some(n_rows) = columns.iter().map(Vec::len).min() else {
        return Vec::new();
    };
    (0..n_rows)
        .map(|row| columns.iter().map(|col| col[row]).collect::<Point>())
        .filter(|p| p.iter().all(|&v| v != sentinel && v.is_finite()))
        .collect()
}

/// Clean every species, splitting them into retained and fully missing.
pub fn clean_species(raw: Vec<RawObservations>, sentinel: f64) -> CleanReport {
    let mut report = CleanReport::default();
    for obs in raw {
        let columns: Option<Vec<Vec<f64>>> = obs.columns.into_iter().collect();
        let points = match columns {
            Some(cols) => {
                let lengths: Vec<usize> = cols.iter().map(Vec::len).collect();
                if lengths.windows(2).any(|w| w[0] != w[1]) {
                    log::warn!(
                        "{}: variable columns have unequal lengths {:?}; truncating",
                        obs.species,
                        lengths
                    );
                }
                clean_observations(&cols, sentinel)
            }
            None => Vec::new(),
        };
        if points.is_empty() {
            log::debug!("{}: no complete observations", obs.species);
            report.missing.push(obs.species);
        } else {
            report.retained.push((obs.species, points));
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    const S: f64 = -9999.0;

    #[test]
    fn drops_tuples_with_sentinel() {
        let cols = vec![vec![1.0, S, 3.0], vec![4.0, 5.0, 6.0]];
        let pts = clean_observations(&cols, S);
        assert_eq!(pts, vec![vec![1.0, 4.0], vec![3.0, 6.0]]);
    }

    #[test]
    fn truncates_to_shortest_column() {
        let cols = vec![vec![1.0, 2.0, 3.0], vec![4.0]];
        assert_eq!(clean_observations(&cols, S), vec![vec![1.0, 4.0]]);
    }

    #[test]
    fn fully_missing_species_is_excluded() {
        let raw = vec![
            RawObservations {
                species: "a".into(),
                columns: vec![Some(vec![S, 1.0]), Some(vec![2.0, S])],
            },
            RawObservations {
                species: "b".into(),
                columns: vec![Some(vec![1.0]), Some(vec![2.0])],
            },
        ];
        let report = clean_species(raw, S);
        assert_eq!(report.missing, vec!["a".to_string()]);
        assert_eq!(report.species(), vec!["b".to_string()]);
    }

    #[test]
    fn absent_variable_file_excludes_species() {
        let raw = vec![RawObservations {
            species: "c".into(),
            columns: vec![Some(vec![1.0, 2.0]), None],
        }];
        let report = clean_species(raw, S);
        assert!(report.retained.is_empty());
        assert_eq!(report.missing, vec!["c".to_string()]);
    }
}

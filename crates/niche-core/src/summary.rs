use crate::error::{Error, Result};
use crate::Point;

/// Median of every coordinate over a point cloud.
///
/// Even counts average the two middle values.
pub fn median_features(points: &[Point]) -> Result<Vec<f64>> {
    let Some(first) = points.first() else {
        return Err(Error::degenerate("median of an empty point cloud"));
    };
    let dims = first.len();
    if points.iter().any(|p| p.len() != dims) {
        return Err(Error::degenerate("points in one cloud differ in dimension"));
    }
    Ok((0..dims)
        .map(|d| {
            let mut column: Vec<f64> = points.iter().map(|p| p[d]).collect();
            column.sort_by(|a, b| a.total_cmp(b));
            let mid = column.len() / 2;
            if column.len() % 2 == 0 {
                (column[mid - 1] + column[mid]) / 2.0
            } else {
                column[mid]
            }
        })
        .collect())
}

//! CSV readers and writers for every pipeline artifact.
//!
//! File names follow the fixed conventions of the upstream density
//! estimation step (`pno<var>_<species>.csv`) and of the outputs consumed by
//! downstream statistics tools.

use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};

use crate::cluster::Classification;
use crate::error::{Error, ProfileError, Result};
use crate::matrix::DistanceMatrix;
use crate::profile::{BinRecord, Profile};
use crate::Point;

pub const SPECIES_LIST: &str = "specieslist.csv";
pub const MISSING_SPECIES: &str = "missing_species.csv";
pub const AVERAGED_MATRIX: &str = "distancematrix_normalized_averaged.csv";
pub const POINT_CLOUD_MATRIX: &str = "distancematrix.csv";
pub const POINT_CLOUD_RAW_MATRIX: &str = "distancematrix_raw.csv";
pub const FINAL_CLASSIFICATION: &str = "final_classification.csv";
pub const MEDIANS: &str = "medians_data.csv";
pub const DISTORTIONS: &str = "distortions.csv";

pub fn pno_file_name(variable: usize, species: &str) -> String {
    format!("pno{variable}_{species}.csv")
}

pub fn occurrence_file_name(variable: usize, species: &str) -> String {
    format!("occ{variable}_{species}.csv")
}

pub fn cleaned_file_name(species: &str) -> String {
    format!("{species}_cleaned.csv")
}

pub fn raw_matrix_file_name(variable: usize) -> String {
    format!("distancematrix_raw_pno{variable}.csv")
}

pub fn normalized_matrix_file_name(variable: usize) -> String {
    format!("distancematrix_normalized_pno{variable}.csv")
}

pub fn classification_file_name(k: usize) -> String {
    format!("final_classification_k_{k}.csv")
}

fn malformed(path: &Path, reason: impl Into<String>) -> Error {
    Error::Malformed { path: path.to_path_buf(), reason: reason.into() }
}

fn require(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(Error::MissingInput { path: path.to_path_buf() })
    }
}

fn parse_cell(path: &Path, field: &str) -> Result<f64> {
    if field.is_empty() {
        return Ok(f64::NAN);
    }
    field
        .parse::<f64>()
        .map_err(|e| malformed(path, format!("'{field}': {e}")))
}

fn format_cell(v: f64) -> String {
    if v.is_nan() { String::new() } else { v.to_string() }
}

// ── Inputs ────────────────────────────────────────────────────────────────────

/// Species identifiers from the first column of a tab-delimited list.
pub fn read_species_list(path: &Path) -> Result<Vec<String>> {
    require(path)?;
    let mut rdr = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)?;
    let mut species = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        match rec.get(0) {
            Some(id) if !id.is_empty() => species.push(id.to_string()),
            _ => {}
        }
    }
    if species.is_empty() {
        return Err(malformed(path, "no species listed"));
    }
    Ok(species)
}

/// A PNO file: header row, then `(bin_index, bin_value, probability)` rows.
pub fn read_profile(path: &Path) -> std::result::Result<Profile, ProfileError> {
    if !path.is_file() {
        return Err(ProfileError::Missing { path: path.to_path_buf() });
    }
    let bad = |reason: String| ProfileError::Malformed { path: path.to_path_buf(), reason };
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_path(path)
        .map_err(|e| bad(e.to_string()))?;
    let mut bins = Vec::new();
    for rec in rdr.records() {
        let rec = rec.map_err(|e| bad(e.to_string()))?;
        let (_index, bin_value, probability): (String, f64, f64) =
            rec.deserialize(None).map_err(|e| bad(e.to_string()))?;
        bins.push(BinRecord { bin_value, probability });
    }
    if bins.is_empty() {
        return Err(bad("no bins".into()));
    }
    Ok(Profile::new(bins))
}

/// One variable's raw occurrence values for one species: header row, then the
/// value in the first column of each row. Empty fields read as `NaN`.
pub fn read_occurrence_column(path: &Path) -> Result<Vec<f64>> {
    require(path)?;
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)?;
    rdr.records()
        .map(|rec| {
            let rec = rec?;
            parse_cell(path, rec.get(0).unwrap_or(""))
        })
        .collect()
}

// ── Point clouds ──────────────────────────────────────────────────────────────

pub fn write_point_cloud(path: &Path, points: &[Point]) -> Result<()> {
    let mut wtr = WriterBuilder::new().has_headers(false).from_path(path)?;
    for p in points {
        wtr.write_record(p.iter().map(|v| v.to_string()))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Rows of comma-separated coordinates, no header.
pub fn read_point_cloud(path: &Path) -> Result<Vec<Point>> {
    require(path)?;
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .trim(Trim::All)
        .from_path(path)?;
    rdr.records()
        .map(|rec| {
            let rec = rec?;
            rec.iter().map(|f| parse_cell(path, f)).collect()
        })
        .collect()
}

// ── Matrices ──────────────────────────────────────────────────────────────────

/// Header `,<sp1>,<sp2>,...`; one labelled row per species; missing = empty.
pub fn write_matrix(path: &Path, m: &DistanceMatrix) -> Result<()> {
    let mut wtr = WriterBuilder::new().from_path(path)?;
    wtr.write_record(std::iter::once(String::new()).chain(m.species.iter().cloned()))?;
    for (r, name) in m.species.iter().enumerate() {
        let row = (0..m.n()).map(|c| format_cell(m.get(r, c)));
        wtr.write_record(std::iter::once(name.clone()).chain(row))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn read_matrix(path: &Path) -> Result<DistanceMatrix> {
    require(path)?;
    let mut rdr = ReaderBuilder::new().has_headers(true).trim(Trim::All).from_path(path)?;
    let species: Vec<String> = rdr.headers()?.iter().skip(1).map(str::to_string).collect();
    let mut data = Vec::with_capacity(species.len() * species.len());
    let mut rec = StringRecord::new();
    let mut row = 0;
    while rdr.read_record(&mut rec)? {
        if row >= species.len() || rec.get(0) != Some(species[row].as_str()) {
            return Err(Error::ShapeMismatch(format!(
                "{}: row {row} label does not match header order",
                path.display()
            )));
        }
        if rec.len() != species.len() + 1 {
            return Err(malformed(path, format!("row {row} has {} fields", rec.len())));
        }
        for field in rec.iter().skip(1) {
            data.push(parse_cell(path, field)?);
        }
        row += 1;
    }
    DistanceMatrix::from_rows(species, data)
}

// ── Outputs ───────────────────────────────────────────────────────────────────

/// `species,cluster` rows, no header.
pub fn write_classification(path: &Path, c: &Classification) -> Result<()> {
    let mut wtr = WriterBuilder::new().has_headers(false).from_path(path)?;
    for (sp, label) in c.species.iter().zip(&c.labels) {
        wtr.write_record([sp.clone(), label.to_string()])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_medians(path: &Path, species: &[String], medians: &[Vec<f64>]) -> Result<()> {
    let dims = medians.first().map_or(0, Vec::len);
    let mut wtr = WriterBuilder::new().from_path(path)?;
    wtr.write_record(
        std::iter::once("species".to_string()).chain((1..=dims).map(|v| format!("pno{v}"))),
    )?;
    for (sp, m) in species.iter().zip(medians) {
        wtr.write_record(std::iter::once(sp.clone()).chain(m.iter().map(|v| v.to_string())))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_distortions(path: &Path, runs: &[Classification]) -> Result<()> {
    let mut wtr = WriterBuilder::new().from_path(path)?;
    wtr.write_record(["k", "distortion"])?;
    for run in runs {
        wtr.write_record([run.k.to_string(), run.distortion.to_string()])?;
    }
    wtr.flush()?;
    Ok(())
}

/// One species per row, no header.
pub fn write_species_list(path: &Path, species: &[String]) -> Result<()> {
    let mut wtr = WriterBuilder::new().has_headers(false).from_path(path)?;
    for sp in species {
        wtr.write_record([sp])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Explicit manifest of per-variable normalised matrices under `dir`.
pub fn normalized_manifest(dir: &Path, variables: usize) -> Vec<PathBuf> {
    (1..=variables).map(|v| dir.join(normalized_matrix_file_name(v))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn species_list_reads_first_tab_column() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join(SPECIES_LIST);
        fs::write(&p, "Quercus_alba\tx\nQuercus_rubra\n\n").unwrap();
        assert_eq!(read_species_list(&p).unwrap(), vec!["Quercus_alba", "Quercus_rubra"]);
    }

    #[test]
    fn missing_species_list_is_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_species_list(&dir.path().join(SPECIES_LIST)).unwrap_err();
        assert!(err.is_data_absence());
    }

    #[test]
    fn profile_rows_are_typed() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join(pno_file_name(1, "a"));
        fs::write(&p, "\"\",\"bin\",\"prob\"\n\"1\",10.5,0.25\n\"2\",11.5,0.75\n").unwrap();
        let prof = read_profile(&p).unwrap();
        assert_eq!(prof.values(), vec![10.5, 11.5]);
        assert_eq!(prof.probabilities(), vec![0.25, 0.75]);
    }

    #[test]
    fn profile_missing_vs_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join(pno_file_name(2, "b"));
        assert!(matches!(read_profile(&p), Err(ProfileError::Missing { .. })));
        fs::write(&p, "i,bin,prob\n1,abc,0.5\n").unwrap();
        assert!(matches!(read_profile(&p), Err(ProfileError::Malformed { .. })));
    }

    #[test]
    fn matrix_round_trip_keeps_missing_diagonal() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join(POINT_CLOUD_MATRIX);
        let m = DistanceMatrix::from_rows(
            vec!["a".into(), "b".into()],
            vec![0.0, 1.25, 2.5, 0.0],
        )
        .unwrap();
        write_matrix(&p, &m).unwrap();
        let text = fs::read_to_string(&p).unwrap();
        assert!(text.starts_with(",a,b\na,,1.25\n"), "{text}");
        let back = read_matrix(&p).unwrap();
        assert_eq!(back.species, m.species);
        assert!(back.is_missing(0, 0));
        assert_eq!(back.get(1, 0), 2.5);
    }

    #[test]
    fn occurrence_column_reads_blank_as_nan() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join(occurrence_file_name(1, "a"));
        fs::write(&p, "value\n1.5\n\n-9999\n").unwrap();
        let col = read_occurrence_column(&p).unwrap();
        assert_eq!(col[0], 1.5);
        assert_eq!(*col.last().unwrap(), -9999.0);
    }

    #[test]
    fn classification_rows_have_no_header() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join(classification_file_name(2));
        let c = Classification {
            k: 2,
            species: vec!["a".into(), "b".into()],
            labels: vec![1, 0],
            distortion: 0.0,
        };
        write_classification(&p, &c).unwrap();
        assert_eq!(fs::read_to_string(&p).unwrap(), "a,1\nb,0\n");
    }
}

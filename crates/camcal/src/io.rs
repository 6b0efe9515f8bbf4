//! Plain-text persistence of calibration parameters.
//!
//! Every matrix is stored as comma-separated rows of `%.18e` numbers, the
//! layout `numpy.savetxt(path, m, delimiter=",")` produces. The intrinsic
//! matrix goes to [`INTRINSICS_FILE`], the distortion row to
//! [`DISTORTION_FILE`]. The CSV files carry no image size; the size the
//! camera was calibrated at lives in the JSON report ([`REPORT_FILE`]) or
//! comes from the caller.

use std::fs;
use std::path::{Path, PathBuf};

use camcal_core::{CalibrationParameters, CameraModelError, DistortionCoefficients, ImageSize};
use camcal_solver::CalibrationReport;
use nalgebra::Matrix3;

pub const INTRINSICS_FILE: &str = "mtx.csv";
pub const DISTORTION_FILE: &str = "dist.csv";
pub const REPORT_FILE: &str = "report.json";

#[derive(thiserror::Error, Debug)]
pub enum PersistenceError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}:{line}: cannot parse {value:?} as a number")]
    Parse {
        path: PathBuf,
        line: usize,
        value: String,
    },
    #[error("{path}: expected {expected}, found {found}")]
    Shape {
        path: PathBuf,
        expected: &'static str,
        found: String,
    },
    #[error("{path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("stored parameters are invalid: {0}")]
    Invalid(#[from] CameraModelError),
}

/// Format like C's `%.18e`: sign, one digit, 18 decimals, two-digit signed
/// exponent.
pub fn format_e18(v: f64) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let s = format!("{v:.18e}");
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exp.abs())
        }
        None => s,
    }
}

/// Render rows as comma-separated `%.18e` lines, each ending in `\n`.
pub fn format_matrix(rows: &[Vec<f64>]) -> String {
    let mut out = String::new();
    for row in rows {
        let line: Vec<String> = row.iter().map(|&v| format_e18(v)).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    out
}

/// Parse comma- (or whitespace-) separated rows. Blank lines and `#`
/// comments are skipped; rows must all have the same length.
pub fn parse_matrix(text: &str, path: &Path) -> Result<Vec<Vec<f64>>, PersistenceError> {
    let mut rows: Vec<Vec<f64>> = Vec::new();
    for (k, raw) in text.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let row = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
            .map(|t| {
                t.parse::<f64>().map_err(|_| PersistenceError::Parse {
                    path: path.to_path_buf(),
                    line: k + 1,
                    value: t.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(first) = rows.first() {
            if first.len() != row.len() {
                return Err(PersistenceError::Shape {
                    path: path.to_path_buf(),
                    expected: "rows of equal length",
                    found: format!("{} and {} columns", first.len(), row.len()),
                });
            }
        }
        rows.push(row);
    }
    Ok(rows)
}

pub fn write_matrix_csv(path: &Path, rows: &[Vec<f64>]) -> Result<(), PersistenceError> {
    fs::write(path, format_matrix(rows)).map_err(|source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn read_matrix_csv(path: &Path) -> Result<Vec<Vec<f64>>, PersistenceError> {
    let text = fs::read_to_string(path).map_err(|source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_matrix(&text, path)
}

fn shape_of(rows: &[Vec<f64>]) -> String {
    format!("{}x{}", rows.len(), rows.first().map_or(0, Vec::len))
}

/// Write `mtx.csv` and `dist.csv` into `dir`, creating it if needed.
pub fn save_parameters(dir: &Path, params: &CalibrationParameters) -> Result<(), PersistenceError> {
    fs::create_dir_all(dir).map_err(|source| PersistenceError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let k = &params.intrinsic_matrix;
    let rows: Vec<Vec<f64>> = (0..3).map(|r| (0..3).map(|c| k[(r, c)]).collect()).collect();
    write_matrix_csv(&dir.join(INTRINSICS_FILE), &rows)?;
    write_matrix_csv(
        &dir.join(DISTORTION_FILE),
        &[params.distortion.as_slice().to_vec()],
    )?;
    log::info!("saved calibration to {}", dir.display());
    Ok(())
}

/// Load parameters saved by [`save_parameters`] (or by numpy) for images of
/// `image_size`.
pub fn load_parameters(
    dir: &Path,
    image_size: ImageSize,
) -> Result<CalibrationParameters, PersistenceError> {
    let mtx_path = dir.join(INTRINSICS_FILE);
    let rows = read_matrix_csv(&mtx_path)?;
    if rows.len() != 3 || rows.iter().any(|r| r.len() != 3) {
        return Err(PersistenceError::Shape {
            path: mtx_path,
            expected: "3x3 matrix",
            found: shape_of(&rows),
        });
    }
    let k = Matrix3::from_fn(|r, c| rows[r][c]);

    let dist_path = dir.join(DISTORTION_FILE);
    let rows = read_matrix_csv(&dist_path)?;
    let values: Vec<f64> = match rows.as_slice() {
        [row] => row.clone(),
        many if !many.is_empty() && many.iter().all(|r| r.len() == 1) => {
            many.iter().map(|r| r[0]).collect()
        }
        _ => {
            return Err(PersistenceError::Shape {
                path: dist_path,
                expected: "a single row or column",
                found: shape_of(&rows),
            })
        }
    };
    let distortion = DistortionCoefficients::new(&values)?;
    Ok(CalibrationParameters::new(k, distortion, image_size)?)
}

/// Write the full calibration report as pretty JSON to `dir/report.json`.
pub fn save_report(dir: &Path, report: &CalibrationReport) -> Result<(), PersistenceError> {
    let path = dir.join(REPORT_FILE);
    let json = serde_json::to_string_pretty(report).map_err(|source| PersistenceError::Json {
        path: path.clone(),
        source,
    })?;
    fs::write(&path, json).map_err(|source| PersistenceError::Io { path, source })
}

#[derive(serde::Deserialize)]
struct ReportParameters {
    image_size: ImageSize,
}

#[derive(serde::Deserialize)]
struct ReportHeader {
    parameters: ReportParameters,
}

/// Image size recorded in `dir/report.json`, or `None` when no report was
/// saved next to the parameters.
pub fn load_calibration_size(dir: &Path) -> Result<Option<ImageSize>, PersistenceError> {
    let path = dir.join(REPORT_FILE);
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(PersistenceError::Io { path, source }),
    };
    let header: ReportHeader =
        serde_json::from_str(&text).map_err(|source| PersistenceError::Json { path, source })?;
    Ok(Some(header.parameters.image_size))
}

/// [`load_parameters`], mapping any failure to "not calibrated yet".
pub fn try_load_parameters(dir: &Path, image_size: ImageSize) -> Option<CalibrationParameters> {
    match load_parameters(dir, image_size) {
        Ok(p) => Some(p),
        Err(e) => {
            log::warn!("calibration not prepared: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_like_numpy() {
        assert_eq!(format_e18(600.0), "6.000000000000000000e+02");
        assert_eq!(format_e18(-0.1), "-1.000000000000000056e-01");
        assert_eq!(format_e18(0.0), "0.000000000000000000e+00");
        assert_eq!(format_e18(1.0), "1.000000000000000000e+00");
        assert_eq!(format_e18(1e-5), "1.000000000000000082e-05");
        assert_eq!(format_e18(2e120), "1.999999999999999960e+120");
    }

    #[test]
    fn parses_comments_blank_lines_and_whitespace() {
        let text = "# K\n1, 2,3\n\n4 5 6 # trailing\n";
        let rows = parse_matrix(text, Path::new("m.csv")).expect("parse");
        assert_eq!(rows, vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
    }

    #[test]
    fn ragged_rows_and_bad_numbers_fail() {
        let err = parse_matrix("1,2\n3\n", Path::new("m.csv")).unwrap_err();
        assert!(matches!(err, PersistenceError::Shape { .. }));
        let err = parse_matrix("1,x\n", Path::new("m.csv")).unwrap_err();
        assert!(matches!(err, PersistenceError::Parse { line: 1, .. }));
    }
}

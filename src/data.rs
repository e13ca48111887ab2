//! Scattering datasets and the uploads they are read from.
//!
//! A dataset is a `q, I, dI` table. Files are CSV with an optional header row,
//! `#` comment lines and any extra trailing columns ignored.

use csv::{ReaderBuilder, Trim, WriterBuilder};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use crate::error::{Result, SasFitError};

/// Measured intensities with their one-sigma uncertainties.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    q: Vec<f64>,
    intensity: Vec<f64>,
    error: Vec<f64>,
}

impl Dataset {
    /// Build a dataset, checking that the columns agree and every point is usable.
    pub fn new(q: Vec<f64>, intensity: Vec<f64>, error: Vec<f64>) -> Result<Self> {
        if q.len() != intensity.len() || q.len() != error.len() {
            return Err(SasFitError::DataFile(format!(
                "column lengths differ: q={}, I={}, dI={}",
                q.len(),
                intensity.len(),
                error.len()
            )));
        }
        if q.is_empty() {
            return Err(SasFitError::DataFile("dataset has no points".to_string()));
        }
        for (row, ((&q, &i), &di)) in q.iter().zip(&intensity).zip(&error).enumerate() {
            if !(q.is_finite() && q > 0.0) {
                return Err(SasFitError::DataFile(format!(
                    "row {}: q must be positive, got {q}",
                    row + 1
                )));
            }
            if !i.is_finite() {
                return Err(SasFitError::DataFile(format!(
                    "row {}: intensity is not finite",
                    row + 1
                )));
            }
            if !(di.is_finite() && di > 0.0) {
                return Err(SasFitError::DataFile(format!(
                    "row {}: uncertainty must be positive, got {di}",
                    row + 1
                )));
            }
        }
        Ok(Self { q, intensity, error })
    }

    /// Read a `q, I, dI` CSV file.
    pub fn from_csv(path: &Path) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .comment(Some(b'#'))
            .trim(Trim::All)
            .flexible(true)
            .from_path(path)
            .map_err(|e| SasFitError::DataFile(format!("{}: {e}", path.display())))?;

        let (mut q, mut intensity, mut error) = (Vec::new(), Vec::new(), Vec::new());
        for (line, record) in reader.records().enumerate() {
            let record =
                record.map_err(|e| SasFitError::DataFile(format!("{}: {e}", path.display())))?;
            if record.iter().all(|field| field.is_empty()) {
                continue;
            }
            if record.len() < 3 {
                return Err(SasFitError::DataFile(format!(
                    "{}: line {} has {} columns, expected q, I, dI",
                    path.display(),
                    line + 1,
                    record.len()
                )));
            }
            let parsed: Option<Vec<f64>> = record.iter().take(3).map(|f| f.parse().ok()).collect();
            match parsed {
                Some(values) => {
                    q.push(values[0]);
                    intensity.push(values[1]);
                    error.push(values[2]);
                }
                // A non-numeric first row is a header
                None if q.is_empty() && line == 0 => continue,
                None => {
                    return Err(SasFitError::DataFile(format!(
                        "{}: line {} is not numeric",
                        path.display(),
                        line + 1
                    )))
                }
            }
        }

        let dataset = Self::new(q, intensity, error)
            .map_err(|e| SasFitError::DataFile(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), points = dataset.len(), "loaded dataset");
        Ok(dataset)
    }

    /// Write the dataset as a headed `q,I,dI` CSV file.
    pub fn to_csv(&self, path: &Path) -> Result<()> {
        let mut writer = WriterBuilder::new()
            .from_path(path)
            .map_err(|e| SasFitError::DataFile(format!("{}: {e}", path.display())))?;
        let write_err = |e: csv::Error| SasFitError::DataFile(format!("{}: {e}", path.display()));
        writer.write_record(["q", "I", "dI"]).map_err(write_err)?;
        for ((q, i), di) in self.q.iter().zip(&self.intensity).zip(&self.error) {
            writer
                .write_record([q.to_string(), i.to_string(), di.to_string()])
                .map_err(write_err)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn q(&self) -> &[f64] {
        &self.q
    }

    pub fn intensity(&self) -> &[f64] {
        &self.intensity
    }

    pub fn error(&self) -> &[f64] {
        &self.error
    }

    pub fn len(&self) -> usize {
        self.q.len()
    }

    pub fn is_empty(&self) -> bool {
        self.q.is_empty()
    }
}

/// Locate an uploaded file under `root`, scoped to `user_id` when given.
///
/// A reference is tried as a relative path first; otherwise it is matched by file
/// name anywhere under the scoped directory and must match exactly one file.
/// References that escape the directory are rejected.
pub fn resolve_upload(root: &Path, user_id: Option<&str>, reference: &str) -> Result<PathBuf> {
    let uploads = match user_id {
        Some(user) if !user.is_empty() => {
            if !is_plain_relative(Path::new(user)) {
                return Err(SasFitError::DataFile(format!("invalid user scope '{user}'")));
            }
            root.join(user)
        }
        _ => root.to_path_buf(),
    };

    let reference_path = Path::new(reference.trim());
    let relative = if reference_path.is_absolute() {
        reference_path.strip_prefix(&uploads).map_err(|_| {
            SasFitError::DataFile(format!("'{reference}' is outside {}", uploads.display()))
        })?
    } else {
        reference_path
    };
    if relative.as_os_str().is_empty() || !is_plain_relative(relative) {
        return Err(SasFitError::DataFile(format!("invalid data reference '{reference}'")));
    }

    let direct = uploads.join(relative);
    if direct.is_file() {
        return Ok(direct);
    }

    let file_name = relative
        .file_name()
        .ok_or_else(|| SasFitError::DataFile(format!("invalid data reference '{reference}'")))?;
    let mut matches = Vec::new();
    find_by_name(&uploads, file_name, &mut matches)?;
    match matches.len() {
        1 => Ok(matches.remove(0)),
        0 => Err(SasFitError::DataFile(format!(
            "uploaded file '{reference}' not found under {}",
            uploads.display()
        ))),
        n => Err(SasFitError::DataFile(format!(
            "ambiguous file name '{}' ({n} matches); use the full relative path",
            file_name.to_string_lossy()
        ))),
    }
}

fn is_plain_relative(path: &Path) -> bool {
    path.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

fn find_by_name(dir: &Path, name: &std::ffi::OsStr, matches: &mut Vec<PathBuf>) -> Result<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            find_by_name(&path, name, matches)?;
        } else if file_type.is_file() && path.file_name() == Some(name) {
            matches.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_read_with_header_and_comments() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(&path, "# sample A\nq,I,dI\n0.01, 10.0, 0.5\n0.02,8.0,0.4,0.001\n\n").unwrap();

        let data = Dataset::from_csv(&path).unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data.q(), &[0.01, 0.02]);
        assert_eq!(data.error(), &[0.5, 0.4]);
    }

    #[test]
    fn test_rejects_bad_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.csv");

        fs::write(&path, "0.01,10.0\n").unwrap();
        assert!(matches!(Dataset::from_csv(&path), Err(SasFitError::DataFile(_))));

        fs::write(&path, "0.01,10.0,0.0\n").unwrap();
        assert!(matches!(Dataset::from_csv(&path), Err(SasFitError::DataFile(_))));

        fs::write(&path, "0.01,10.0,1.0\nx,y,z\n").unwrap();
        assert!(matches!(Dataset::from_csv(&path), Err(SasFitError::DataFile(_))));

        fs::write(&path, "q,I,dI\n").unwrap();
        assert!(matches!(Dataset::from_csv(&path), Err(SasFitError::DataFile(_))));
    }

    #[test]
    fn test_csv_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let data = Dataset::new(vec![0.01, 0.1], vec![3.5, 0.25], vec![0.1, 0.01]).unwrap();
        data.to_csv(&path).unwrap();
        assert_eq!(Dataset::from_csv(&path).unwrap(), data);
    }

    #[test]
    fn test_resolve_upload() {
        let root = TempDir::new().unwrap();
        let user = root.path().join("alice");
        fs::create_dir_all(user.join("run1")).unwrap();
        fs::create_dir_all(user.join("run2")).unwrap();
        fs::write(user.join("run1/cyl.csv"), "").unwrap();
        fs::write(user.join("run1/same.csv"), "").unwrap();
        fs::write(user.join("run2/same.csv"), "").unwrap();

        let direct = resolve_upload(root.path(), Some("alice"), "run1/cyl.csv").unwrap();
        assert_eq!(direct, user.join("run1/cyl.csv"));

        let by_name = resolve_upload(root.path(), Some("alice"), "cyl.csv").unwrap();
        assert_eq!(by_name, user.join("run1/cyl.csv"));

        let absolute = user.join("run1/cyl.csv");
        let resolved =
            resolve_upload(root.path(), Some("alice"), absolute.to_str().unwrap()).unwrap();
        assert_eq!(resolved, absolute);

        let ambiguous = resolve_upload(root.path(), Some("alice"), "same.csv").unwrap_err();
        assert!(ambiguous.to_string().contains("ambiguous"));

        assert!(resolve_upload(root.path(), Some("alice"), "missing.csv").is_err());
        assert!(resolve_upload(root.path(), Some("alice"), "../alice/run1/cyl.csv").is_err());
        assert!(resolve_upload(root.path(), Some("bob"), "cyl.csv").is_err());
        assert!(resolve_upload(root.path(), Some("../alice"), "cyl.csv").is_err());
        assert!(resolve_upload(root.path(), None, "/etc/passwd").is_err());
    }
}

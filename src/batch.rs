//! Batch input: enumerate request names from a CSV file.
//!
//! The CSV must carry a `serial` header; the column's values become the
//! request names in file order. Duplicates are kept, the downstream
//! conflict policy decides what happens to repeated names.

use std::path::{Path, PathBuf};

use log::debug;

use crate::config::Config;
use crate::error::{CertgenError, Result};
use crate::layout::{self, OutputLayout};

pub const SERIAL_COLUMN: &str = "serial";

/// Starter CSV written by `certgen init`: the header plus one sample row.
pub const STARTER_CSV: &str = "serial\n1234\n";

/// Pick the CSV source: an explicit argument wins over the configured
/// `custom.csvfile`; neither present is a hard error. Bare names resolve
/// against the managed csv folder.
pub fn resolve_source(
    explicit: Option<&str>,
    config: &Config,
    layout: &OutputLayout,
) -> Result<PathBuf> {
    let source = match explicit {
        Some(value) => value.to_string(),
        None => config
            .custom
            .csvfile
            .clone()
            .ok_or(CertgenError::NoCsvSource)?,
    };

    let path = if layout::is_bare_name(&source) {
        layout.csv.join(&source)
    } else {
        PathBuf::from(&source)
    };

    layout::check_extension(&path, "csv")?;
    if !path.is_file() {
        return Err(CertgenError::NotFound(path));
    }
    Ok(path)
}

/// Read every value of the `serial` column, in file order, without
/// deduplication.
pub fn list_names(csv_file: &Path) -> Result<Vec<String>> {
    let mut reader = csv::Reader::from_path(csv_file)?;

    let headers = reader.headers()?.clone();
    let column = headers
        .iter()
        .position(|h| h == SERIAL_COLUMN)
        .ok_or_else(|| CertgenError::MissingColumn {
            column: SERIAL_COLUMN,
            file: csv_file.to_path_buf(),
        })?;

    let mut names = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(value) = record.get(column) {
            let value = value.trim();
            if !value.is_empty() {
                names.push(value.to_string());
            }
        }
    }
    debug!("{} entries read from {}", names.len(), csv_file.display());
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_csv(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn names_come_back_in_file_order_with_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_csv(
            dir.path(),
            "serials.csv",
            "serial,site\nalice,paris\nbob,lyon\nalice,nice\n",
        );
        let names = list_names(&file).unwrap();
        assert_eq!(names, vec!["alice", "bob", "alice"]);
    }

    #[test]
    fn starter_csv_enumerates_its_sample_row() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_csv(dir.path(), "serial.csv", STARTER_CSV);
        assert_eq!(list_names(&file).unwrap(), vec!["1234"]);
    }

    #[test]
    fn missing_serial_column_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_csv(dir.path(), "serials.csv", "name,site\nalice,paris\n");
        match list_names(&file) {
            Err(CertgenError::MissingColumn { column, .. }) => assert_eq!(column, "serial"),
            other => panic!("expected MissingColumn, got {other:?}"),
        }
    }

    #[test]
    fn explicit_source_beats_configured_one() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::from_root(&dir.path().join("app"));
        layout.ensure().unwrap();

        let configured = write_csv(&layout.csv, "configured.csv", "serial\nconf\n");
        let explicit = write_csv(dir.path(), "explicit.csv", "serial\nexpl\n");

        let mut config = Config::default();
        config.custom.csvfile = Some(configured.display().to_string());

        let picked =
            resolve_source(Some(explicit.to_str().unwrap()), &config, &layout).unwrap();
        assert_eq!(picked, explicit);

        let picked = resolve_source(None, &config, &layout).unwrap();
        assert_eq!(picked, configured);
    }

    #[test]
    fn bare_configured_name_resolves_in_managed_folder() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::from_root(&dir.path().join("app"));
        layout.ensure().unwrap();
        write_csv(&layout.csv, "serials.csv", "serial\nalice\n");

        let mut config = Config::default();
        config.custom.csvfile = Some("serials.csv".to_string());

        let picked = resolve_source(None, &config, &layout).unwrap();
        assert_eq!(picked, layout.csv.join("serials.csv"));
    }

    #[test]
    fn no_source_at_all_is_a_hard_error() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::from_root(&dir.path().join("app"));
        let config = Config::default();
        assert!(matches!(
            resolve_source(None, &config, &layout),
            Err(CertgenError::NoCsvSource)
        ));
    }
}

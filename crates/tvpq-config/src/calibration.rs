//! Calibration cache persistence
//!
//! Persisted picture values are written through to a [`CalibrationSink`]
//! addressed by (source, pq_mode, hdr_type, control). [`CalibrationFile`]
//! keeps the cache as a JSON document and rewrites it atomically on every
//! store, so a crash never leaves a half-written cache behind.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tvpq_hal::{CellKey, CellValue, HdrType, SourceInput};

use crate::ConfigError;

const CACHE_VERSION: u32 = 1;

/// Picture mode saved for one source/format pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeSelection {
    pub source: SourceInput,
    pub hdr_type: HdrType,
    pub pq_mode: u8,
}

/// Everything a sink holds, as loaded at init
#[derive(Debug, Clone, Default)]
pub struct CalibrationSnapshot {
    pub cells: Vec<(CellKey, CellValue)>,
    pub selections: Vec<ModeSelection>,
}

/// Non-volatile key-value sink for persisted picture values
pub trait CalibrationSink: Send + Sync {
    /// Read every persisted cell and mode selection
    fn load(&self) -> Result<CalibrationSnapshot, ConfigError>;

    /// Persist one cell
    fn store_cell(&self, key: &CellKey, value: &CellValue) -> Result<(), ConfigError>;

    /// Persist the picture mode chosen for a source/format pair
    fn store_selection(&self, selection: ModeSelection) -> Result<(), ConfigError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct CellEntry {
    key: CellKey,
    value: CellValue,
}

#[derive(Debug, Serialize, Deserialize)]
struct CalibrationDocument {
    version: u32,
    #[serde(default)]
    cells: Vec<CellEntry>,
    #[serde(default)]
    selections: Vec<ModeSelection>,
}

#[derive(Debug, Clone, Default)]
struct Contents {
    cells: BTreeMap<CellKey, CellValue>,
    selections: BTreeMap<(SourceInput, HdrType), u8>,
}

impl Contents {
    fn read(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("No calibration cache at {}", path.display());
            return Ok(Self::default());
        }

        let document: CalibrationDocument = serde_json::from_str(&fs::read_to_string(path)?)?;
        if document.version != CACHE_VERSION {
            return Err(ConfigError::Invalid(format!(
                "calibration cache version {} (expected {})",
                document.version, CACHE_VERSION
            )));
        }

        let mut contents = Self::default();
        for entry in document.cells {
            if entry.key.source.is_all() {
                tracing::warn!("Skipping calibration cell {} with ALL source", entry.key);
                continue;
            }
            if let CellValue::Gamma(table) = &entry.value {
                if !table.is_well_formed() {
                    tracing::warn!("Skipping malformed gamma table for {}", entry.key);
                    continue;
                }
            }
            contents.cells.insert(entry.key, entry.value);
        }
        for selection in document.selections {
            contents
                .selections
                .insert((selection.source, selection.hdr_type), selection.pq_mode);
        }

        Ok(contents)
    }

    fn write(&self, path: &Path) -> Result<(), ConfigError> {
        let document = CalibrationDocument {
            version: CACHE_VERSION,
            cells: self
                .cells
                .iter()
                .map(|(key, value)| CellEntry {
                    key: *key,
                    value: value.clone(),
                })
                .collect(),
            selections: self
                .selections
                .iter()
                .map(|((source, hdr_type), pq_mode)| ModeSelection {
                    source: *source,
                    hdr_type: *hdr_type,
                    pq_mode: *pq_mode,
                })
                .collect(),
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_string_pretty(&document)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn snapshot(&self) -> CalibrationSnapshot {
        CalibrationSnapshot {
            cells: self
                .cells
                .iter()
                .map(|(k, v)| (*k, v.clone()))
                .collect(),
            selections: self
                .selections
                .iter()
                .map(|((source, hdr_type), pq_mode)| ModeSelection {
                    source: *source,
                    hdr_type: *hdr_type,
                    pq_mode: *pq_mode,
                })
                .collect(),
        }
    }
}

/// JSON calibration cache on disk
pub struct CalibrationFile {
    path: PathBuf,
    contents: Mutex<Option<Contents>>,
}

impl CalibrationFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            contents: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `update` to a copy of the contents and commit it only once the
    /// file has been rewritten
    fn update<F>(&self, update: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut Contents),
    {
        let mut guard = self
            .contents
            .lock()
            .map_err(|_| ConfigError::Invalid("calibration cache lock poisoned".to_string()))?;

        let mut next = match guard.as_ref() {
            Some(contents) => contents.clone(),
            None => Contents::read(&self.path)?,
        };
        update(&mut next);
        next.write(&self.path)?;

        *guard = Some(next);
        Ok(())
    }
}

impl CalibrationSink for CalibrationFile {
    fn load(&self) -> Result<CalibrationSnapshot, ConfigError> {
        let contents = Contents::read(&self.path)?;
        let snapshot = contents.snapshot();
        tracing::info!(
            "Loaded {} calibration cells from {}",
            snapshot.cells.len(),
            self.path.display()
        );

        if let Ok(mut guard) = self.contents.lock() {
            *guard = Some(contents);
        }
        Ok(snapshot)
    }

    fn store_cell(&self, key: &CellKey, value: &CellValue) -> Result<(), ConfigError> {
        if key.source.is_all() {
            return Err(ConfigError::Invalid(format!(
                "cannot persist {} under the ALL source",
                key
            )));
        }

        self.update(|contents| {
            contents.cells.insert(*key, value.clone());
        })?;
        tracing::debug!("Persisted {} = {}", key, value);
        Ok(())
    }

    fn store_selection(&self, selection: ModeSelection) -> Result<(), ConfigError> {
        self.update(|contents| {
            contents
                .selections
                .insert((selection.source, selection.hdr_type), selection.pq_mode);
        })?;
        tracing::debug!(
            "Persisted picture mode {} for {}/{}",
            selection.pq_mode,
            selection.source,
            selection.hdr_type
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tvpq_hal::{Control, GammaTable, PqParameter};

    fn hue_key(source: SourceInput, pq_mode: u8) -> CellKey {
        CellKey::new(
            source,
            pq_mode,
            HdrType::Hdr10,
            Control::pq(PqParameter::Hue),
        )
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let file = CalibrationFile::new(dir.path().join("cache.json"));

        let snapshot = file.load().unwrap();
        assert!(snapshot.cells.is_empty());
        assert!(snapshot.selections.is_empty());
    }

    #[test]
    fn test_store_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");

        let file = CalibrationFile::new(&path);
        file.store_cell(&hue_key(SourceInput::Hdmi, 2), &CellValue::Int(40))
            .unwrap();
        file.store_cell(&hue_key(SourceInput::Hdmi, 2), &CellValue::Int(60))
            .unwrap();
        file.store_cell(&hue_key(SourceInput::Tv, 2), &CellValue::Int(10))
            .unwrap();
        file.store_selection(ModeSelection {
            source: SourceInput::Tv,
            hdr_type: HdrType::Sdr,
            pq_mode: 4,
        })
        .unwrap();

        let reopened = CalibrationFile::new(&path);
        let snapshot = reopened.load().unwrap();
        assert_eq!(snapshot.cells.len(), 2);
        assert!(
            snapshot
                .cells
                .contains(&(hue_key(SourceInput::Hdmi, 2), CellValue::Int(60)))
        );
        assert_eq!(snapshot.selections.len(), 1);
        assert_eq!(snapshot.selections[0].pq_mode, 4);
    }

    #[test]
    fn test_gamma_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        let key = CellKey::new(SourceInput::Av, 0, HdrType::Sdr, Control::GammaTable);

        CalibrationFile::new(&path)
            .store_cell(&key, &CellValue::Gamma(GammaTable::linear()))
            .unwrap();

        let snapshot = CalibrationFile::new(&path).load().unwrap();
        assert_eq!(
            snapshot.cells,
            vec![(key, CellValue::Gamma(GammaTable::linear()))]
        );
    }

    #[test]
    fn test_rejects_all_source() {
        let dir = TempDir::new().unwrap();
        let file = CalibrationFile::new(dir.path().join("cache.json"));

        let err = file
            .store_cell(&hue_key(SourceInput::All, 0), &CellValue::Int(1))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_malformed_gamma_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        let content = r#"{
  "version": 1,
  "cells": [
    {
      "key": {"source": "HDMI", "pq_mode": 0, "hdr_type": "SDR", "control": {"kind": "gamma_table"}},
      "value": {"gamma": {"red": [1, 2], "green": [1, 2], "blue": [1, 2]}}
    },
    {
      "key": {"source": "HDMI", "pq_mode": 0, "hdr_type": "SDR", "control": {"kind": "pq", "parameter": "contrast"}},
      "value": {"int": 33}
    }
  ]
}"#;
        fs::write(&path, content).unwrap();

        let snapshot = CalibrationFile::new(&path).load().unwrap();
        assert_eq!(snapshot.cells.len(), 1);
        assert_eq!(snapshot.cells[0].1, CellValue::Int(33));
    }

    #[test]
    fn test_version_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, r#"{"version": 7}"#).unwrap();

        let err = CalibrationFile::new(&path).load().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_unwritable_path_fails() {
        let dir = TempDir::new().unwrap();
        // A non-empty directory in place of the file makes the rename fail
        let path = dir.path().join("cache.json");
        fs::create_dir_all(path.join("blocker")).unwrap();

        let file = CalibrationFile::new(&path);
        assert!(
            file.store_cell(&hue_key(SourceInput::Hdmi, 1), &CellValue::Int(5))
                .is_err()
        );
        assert!(path.is_dir());
    }
}

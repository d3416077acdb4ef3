//! Store of accepted, test-adequate patches.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::info;

use crate::schema::{Patch, PatchRecord};

/// Deduplicated set of accepted patches and their records.
#[derive(Debug, Default)]
pub struct PatchStore {
    /// Structural identities of accepted patches.
    patches: HashSet<Patch>,
    /// Records in acceptance order.
    records: Vec<PatchRecord>,
    /// Output directory for patch records.
    output_dir: Option<PathBuf>,
}

impl PatchStore {
    /// Create an in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set output directory for saving patch records.
    pub fn with_output_dir<P: AsRef<Path>>(mut self, dir: P) -> io::Result<Self> {
        let path = dir.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;
        self.output_dir = Some(path);
        Ok(self)
    }

    pub fn output_dir(&self) -> Option<&Path> {
        self.output_dir.as_deref()
    }

    /// Insert a patch. Returns whether it was new.
    pub fn add(&mut self, patch: Patch) -> bool {
        self.patches.insert(patch)
    }

    pub fn contains(&self, patch: &Patch) -> bool {
        self.patches.contains(patch)
    }

    /// Keep a record and write it to the output directory, if any.
    pub fn record(&mut self, record: PatchRecord) -> io::Result<Option<PathBuf>> {
        let saved = match &self.output_dir {
            Some(dir) => {
                let path = dir.join(format!("patch_{}.json", record.id));
                let json = serde_json::to_string_pretty(&record)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                fs::write(&path, json)?;
                info!("Saved patch {} to {}", record.id, path.display());
                Some(path)
            }
            None => None,
        };
        self.records.push(record);
        Ok(saved)
    }

    pub fn records(&self) -> &[PatchRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    /// Load patch records previously written to `dir`, ordered by id.
    pub fn load_records<P: AsRef<Path>>(dir: P) -> io::Result<Vec<PatchRecord>> {
        let mut records = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let is_record = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("patch_") && n.ends_with(".json"));
            if !is_record {
                continue;
            }
            let content = fs::read_to_string(&path)?;
            let record: PatchRecord = serde_json::from_str(&content)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            records.push(record);
        }
        records.sort_by_key(|r| r.id);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Location, Operator, PatchEdit, RecordedEdit};

    fn patch(op: usize, line: u32, ingredient: Option<usize>) -> Patch {
        Patch::new(vec![PatchEdit {
            operator_index: op,
            location: Location::new("A.java", line),
            ingredient_index: ingredient,
        }])
    }

    fn record(id: u64) -> PatchRecord {
        PatchRecord {
            id,
            evaluations: 12,
            elapsed_ms: 340,
            operators: vec![0],
            locations: vec![3],
            ingredients: vec![None],
            edits: vec![RecordedEdit {
                operator: Operator::Delete,
                location: Location::new("A.java", 7),
                statement: "x++;".to_string(),
                ingredient: None,
            }],
        }
    }

    #[test]
    fn test_duplicate_patch_counts_once() {
        let mut store = PatchStore::new();
        assert!(store.add(patch(1, 4, Some(2))));
        assert!(!store.add(patch(1, 4, Some(2))));
        assert_eq!(store.len(), 1);
        assert!(store.add(patch(1, 4, Some(3))));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_in_memory_record() {
        let mut store = PatchStore::new();
        assert_eq!(store.record(record(0)).unwrap(), None);
        assert_eq!(store.records().len(), 1);
    }

    #[test]
    fn test_records_round_trip_through_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = PatchStore::new().with_output_dir(dir.path()).unwrap();
        let path = store.record(record(1)).unwrap().unwrap();
        assert_eq!(path.file_name().unwrap(), "patch_1.json");
        store.record(record(0)).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let loaded = PatchStore::load_records(dir.path()).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0], record(0));
        assert_eq!(loaded[1].edits[0].statement, "x++;");
    }
}

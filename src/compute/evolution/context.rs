//! Run-scoped mutable state shared by the engine and the evaluator.

use std::time::{Duration, Instant};

use log::{info, warn};

use super::archive::PatchStore;
use super::fitness::AppliedEdit;
use crate::schema::{Patch, PatchRecord};

/// Evaluation counter, patch ids, start time and accepted patches of one run.
#[derive(Debug)]
pub struct RunContext {
    evaluations: u64,
    next_patch_id: u64,
    start: Instant,
    patches: PatchStore,
}

impl RunContext {
    pub fn new(patches: PatchStore) -> Self {
        Self {
            evaluations: 0,
            next_patch_id: 0,
            start: Instant::now(),
            patches,
        }
    }

    /// Count one evaluation and return its id.
    pub fn begin_evaluation(&mut self) -> u64 {
        let id = self.evaluations;
        self.evaluations += 1;
        id
    }

    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn patches(&self) -> &PatchStore {
        &self.patches
    }

    pub fn into_patches(self) -> PatchStore {
        self.patches
    }

    /// Record a test-adequate edit set. Returns the new patch id, or `None`
    /// when the same patch was accepted before.
    pub fn accept(&mut self, applied: &[AppliedEdit]) -> Option<u64> {
        let patch = Patch::new(applied.iter().map(AppliedEdit::patch_edit).collect());
        if !self.patches.add(patch) {
            return None;
        }

        let id = self.next_patch_id;
        self.next_patch_id += 1;
        let record = PatchRecord {
            id,
            evaluations: self.evaluations,
            elapsed_ms: self.elapsed().as_millis() as u64,
            operators: applied.iter().map(|e| e.operator_index).collect(),
            locations: applied.iter().map(|e| e.point).collect(),
            ingredients: applied.iter().map(|e| e.ingredient_index).collect(),
            edits: applied.iter().map(AppliedEdit::recorded).collect(),
        };
        info!(
            "Test-adequate patch {id} found after {} evaluations ({} edits)",
            self.evaluations,
            applied.len()
        );
        if let Err(e) = self.patches.record(record) {
            warn!("Failed to save patch {id}: {e}");
        }
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Location, Operator};

    fn applied(point: usize, line: u32) -> AppliedEdit {
        AppliedEdit {
            point,
            operator_index: 0,
            operator: Operator::Delete,
            ingredient_index: None,
            location: Location::new("A.java", line),
            statement: "x++;".to_string(),
            ingredient: None,
        }
    }

    #[test]
    fn test_counters_are_monotonic() {
        let mut ctx = RunContext::new(PatchStore::new());
        assert_eq!(ctx.begin_evaluation(), 0);
        assert_eq!(ctx.begin_evaluation(), 1);
        assert_eq!(ctx.evaluations(), 2);

        assert_eq!(ctx.accept(&[applied(0, 3)]), Some(0));
        assert_eq!(ctx.accept(&[applied(0, 3)]), None);
        assert_eq!(ctx.accept(&[applied(1, 5), applied(0, 3)]), Some(1));

        let records = ctx.patches().records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].locations, vec![1, 0]);
        assert_eq!(records[1].evaluations, 2);
    }
}

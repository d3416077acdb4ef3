//! Patch identity and the on-disk patch record format.

use serde::{Deserialize, Serialize};

use super::{Location, Operator};

/// One applied edit of an accepted candidate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PatchEdit {
    /// Index into the point's operator list.
    pub operator_index: usize,
    pub location: Location,
    /// Index into the point's ingredient list. `None` for `Delete`.
    pub ingredient_index: Option<usize>,
}

/// Structural identity of an accepted patch.
///
/// Edits are kept sorted, so two candidates that apply the same edits in a
/// different order are the same patch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Patch {
    edits: Vec<PatchEdit>,
}

impl Patch {
    pub fn new(mut edits: Vec<PatchEdit>) -> Self {
        edits.sort();
        edits.dedup();
        Self { edits }
    }

    pub fn edits(&self) -> &[PatchEdit] {
        &self.edits
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }
}

/// Human-readable form of one edit in a patch record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedEdit {
    pub operator: Operator,
    pub location: Location,
    /// Original statement text.
    pub statement: String,
    /// Ingredient text, if the operator uses one.
    pub ingredient: Option<String>,
}

/// Exported patch record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchRecord {
    /// Monotonically increasing patch ID.
    pub id: u64,
    /// Evaluations performed when the patch was accepted.
    pub evaluations: u64,
    /// Milliseconds since the run started.
    pub elapsed_ms: u64,
    /// Operator index per edit.
    pub operators: Vec<usize>,
    /// Modification point index per edit.
    pub locations: Vec<usize>,
    /// Ingredient index per edit.
    pub ingredients: Vec<Option<usize>>,
    /// Readable edits, in the same order.
    pub edits: Vec<RecordedEdit>,
}

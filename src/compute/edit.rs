//! Source edits: the `Patcher` contract and a line-based implementation.
//!
//! A patcher turns one `(point, operator, ingredient)` choice into an `Edit`.
//! Edits are collected into an `EditScript`, which groups them per file and
//! renders the edited files against a `SourceTree`. Edits on the same file are
//! applied from the bottom up so their line numbers stay valid.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::schema::{Ingredient, Location, ModificationPoint, Operator};

/// Patcher failures. Absorbed per candidate like a compile failure.
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    #[error("{operator} at {location} needs an ingredient")]
    MissingIngredient {
        operator: Operator,
        location: Location,
    },
    #[error("Unknown source file: {0}")]
    UnknownFile(String),
    #[error("{location} is outside the file ({lines} lines)")]
    LineOutOfRange { location: Location, lines: usize },
    #[error("Conflicting edits at {0}")]
    Conflict(Location),
}

/// What happens to the statement line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditKind {
    Delete,
    Replace(String),
    InsertBefore(String),
}

/// A single source-level edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub location: Location,
    pub kind: EditKind,
}

/// Produces the edit for one modification point.
pub trait Patcher: Send + Sync {
    fn edit(
        &self,
        point: &ModificationPoint,
        operator: Operator,
        ingredient: Option<&Ingredient>,
    ) -> Result<Edit, PatchError>;
}

/// Patcher that treats each statement as one source line.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinePatcher;

impl Patcher for LinePatcher {
    fn edit(
        &self,
        point: &ModificationPoint,
        operator: Operator,
        ingredient: Option<&Ingredient>,
    ) -> Result<Edit, PatchError> {
        let missing = || PatchError::MissingIngredient {
            operator,
            location: point.location.clone(),
        };
        let kind = match operator {
            Operator::Delete => EditKind::Delete,
            Operator::Replace => EditKind::Replace(ingredient.ok_or_else(missing)?.source.clone()),
            Operator::InsertBefore => {
                EditKind::InsertBefore(ingredient.ok_or_else(missing)?.source.clone())
            }
        };
        Ok(Edit {
            location: point.location.clone(),
            kind,
        })
    }
}

/// Unmodified program sources, keyed by path relative to the source root.
#[derive(Debug, Clone, Default)]
pub struct SourceTree {
    root: Option<PathBuf>,
    files: BTreeMap<String, String>,
}

impl SourceTree {
    pub fn from_files(files: BTreeMap<String, String>) -> Self {
        Self { root: None, files }
    }

    /// Load the named files from `root`.
    pub fn load<P, I, S>(root: P, files: I) -> io::Result<Self>
    where
        P: AsRef<Path>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let root = root.as_ref();
        let mut loaded = BTreeMap::new();
        for file in files {
            let file = file.into();
            if loaded.contains_key(&file) {
                continue;
            }
            let content = fs::read_to_string(root.join(&file))?;
            loaded.insert(file, content);
        }
        Ok(Self {
            root: Some(root.to_path_buf()),
            files: loaded,
        })
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn get(&self, file: &str) -> Option<&str> {
        self.files.get(file).map(String::as_str)
    }

    pub fn files(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files.iter().map(|(f, c)| (f.as_str(), c.as_str()))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Edits of one candidate, grouped per file.
#[derive(Debug, Clone, Default)]
pub struct EditScript {
    files: BTreeMap<String, Vec<(u32, EditKind)>>,
}

impl EditScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, edit: Edit) {
        self.files
            .entry(edit.location.file)
            .or_default()
            .push((edit.location.line, edit.kind));
    }

    pub fn len(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Edited text of every touched file.
    pub fn render(&self, tree: &SourceTree) -> Result<BTreeMap<String, String>, PatchError> {
        self.files
            .iter()
            .map(|(file, edits)| -> Result<(String, String), PatchError> {
                let original = tree
                    .get(file)
                    .ok_or_else(|| PatchError::UnknownFile(file.clone()))?;
                Ok((file.clone(), apply_edits(file, original, edits)?))
            })
            .collect()
    }
}

fn apply_edits(file: &str, original: &str, edits: &[(u32, EditKind)]) -> Result<String, PatchError> {
    let mut lines: Vec<String> = original.lines().map(str::to_string).collect();
    let line_count = lines.len();

    let mut ordered: Vec<&(u32, EditKind)> = edits.iter().collect();
    ordered.sort_by(|a, b| b.0.cmp(&a.0));
    if let Some(w) = ordered.windows(2).find(|w| w[0].0 == w[1].0) {
        return Err(PatchError::Conflict(Location::new(file, w[0].0)));
    }

    for (line, kind) in ordered {
        let location = || Location::new(file, *line);
        if *line == 0 || *line as usize > line_count {
            return Err(PatchError::LineOutOfRange {
                location: location(),
                lines: line_count,
            });
        }
        let idx = *line as usize - 1;
        let indent: String = lines[idx]
            .chars()
            .take_while(|c| c.is_whitespace())
            .collect();
        match kind {
            EditKind::Delete => {
                lines.remove(idx);
            }
            EditKind::Replace(text) => lines[idx] = format!("{indent}{}", text.trim()),
            EditKind::InsertBefore(text) => lines.insert(idx, format!("{indent}{}", text.trim())),
        }
    }

    // A file with any CRLF is rendered with CRLF throughout.
    let newline = if original.contains("\r\n") { "\r\n" } else { "\n" };
    let mut rendered = lines.join(newline);
    if original.ends_with('\n') {
        rendered.push_str(newline);
    }
    Ok(rendered)
}

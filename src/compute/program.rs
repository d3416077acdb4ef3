//! Program model: the trimmed set of modification points the search edits.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use rand::Rng;
use rand::seq::SliceRandom;

use super::suspicion::SuspicionMap;
use crate::schema::{Ingredient, ModificationPoint, Operator};

/// Errors that abort a run before the search starts.
#[derive(Debug, thiserror::Error)]
pub enum ModelBuildError {
    #[error("No failing tests: there is no fault signal to repair against")]
    NoFailingTests,
    #[error("Positive and negative test sets overlap in {0} tests")]
    OverlappingTests(usize),
    #[error("No editable locations found")]
    NoModificationPoints,
    #[error("Missing build input: {0}")]
    MissingInput(String),
    #[error("Failed to read catalog {path}: {source}")]
    Catalog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Builds the catalog of modification points for the suspicious locations.
pub trait ModelBuilder {
    fn build(&self, suspicion: &SuspicionMap) -> Result<Vec<ModificationPoint>, ModelBuildError>;
}

/// Model builder backed by a pre-extracted JSON catalog of modification points.
///
/// Only points whose location is in the suspicion map are kept, and each is
/// assigned its suspiciousness from the map.
#[derive(Debug, Clone)]
pub struct CatalogModelBuilder {
    points: Vec<ModificationPoint>,
}

impl CatalogModelBuilder {
    pub fn new(points: Vec<ModificationPoint>) -> Self {
        Self { points }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ModelBuildError> {
        let path = path.as_ref();
        let catalog_error = |source| ModelBuildError::Catalog {
            path: path.to_path_buf(),
            source,
        };
        let content = fs::read_to_string(path).map_err(catalog_error)?;
        let points = serde_json::from_str(&content)
            .map_err(|e| catalog_error(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        Ok(Self { points })
    }
}

impl ModelBuilder for CatalogModelBuilder {
    fn build(&self, suspicion: &SuspicionMap) -> Result<Vec<ModificationPoint>, ModelBuildError> {
        let points: Vec<ModificationPoint> = self
            .points
            .iter()
            .filter_map(|mp| {
                suspicion
                    .get(&mp.location)
                    .map(|score| mp.clone().with_suspiciousness(score))
            })
            .collect();
        info!(
            "Catalog: {} of {} points are suspicious",
            points.len(),
            self.points.len()
        );
        Ok(points)
    }
}

/// Trimmed, normalized modification points. Immutable during search.
#[derive(Debug, Clone)]
pub struct ProgramModel {
    points: Vec<ModificationPoint>,
}

impl ProgramModel {
    /// Trim the catalog to `max_points` and normalize every operator set.
    pub fn new<R: Rng + ?Sized>(
        catalog: Vec<ModificationPoint>,
        max_points: usize,
        rng: &mut R,
    ) -> Result<Self, ModelBuildError> {
        if catalog.is_empty() {
            return Err(ModelBuildError::NoModificationPoints);
        }

        let mut points = trim(catalog, max_points, rng);
        let mut without_ingredients = 0;
        for mp in &mut points {
            if mp.ingredients.is_empty() {
                without_ingredients += 1;
            }
            mp.normalize_operators();
        }
        if without_ingredients > 0 {
            warn!("{without_ingredients} modification points have no ingredients; only Delete applies");
        }
        info!("Program model: {} modification points", points.len());

        Ok(Self { points })
    }

    pub fn points(&self) -> &[ModificationPoint] {
        &self.points
    }

    pub fn get(&self, index: usize) -> Option<&ModificationPoint> {
        self.points.get(index)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn num_operators(&self, index: usize) -> usize {
        self.points[index].num_operators()
    }

    pub fn num_ingredients(&self, index: usize) -> usize {
        self.points[index].num_ingredients()
    }
}

/// Keep the `budget` most suspicious points, in a random order.
///
/// Catalogs within budget are returned unchanged.
pub fn trim<R: Rng + ?Sized>(
    mut points: Vec<ModificationPoint>,
    budget: usize,
    rng: &mut R,
) -> Vec<ModificationPoint> {
    if points.len() <= budget {
        return points;
    }
    points.sort_by(|a, b| b.suspiciousness.total_cmp(&a.suspiciousness));
    points.truncate(budget);
    points.shuffle(rng);
    points
}

/// Outcome of a filter rule for one encoded (operator, ingredient) choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVerdict {
    /// Apply as encoded.
    Accept,
    /// Apply with this ingredient index instead.
    Redirect(usize),
    /// Deactivate the point.
    Reject,
}

/// Pure predicate over `(operator, point, ingredient)`.
pub trait EditFilter: Send + Sync {
    fn check(
        &self,
        operator: Operator,
        point: &ModificationPoint,
        ingredient: Option<(usize, &Ingredient)>,
    ) -> FilterVerdict;
}

/// Rejects edits that leave the statement unchanged.
///
/// `Replace` or `InsertBefore` with an ingredient identical to the statement
/// itself is redirected to the first differing ingredient, or rejected when
/// every ingredient is identical.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedundantEditFilter;

impl EditFilter for RedundantEditFilter {
    fn check(
        &self,
        operator: Operator,
        point: &ModificationPoint,
        ingredient: Option<(usize, &Ingredient)>,
    ) -> FilterVerdict {
        if !operator.requires_ingredient() {
            return FilterVerdict::Accept;
        }
        let Some((_, ingredient)) = ingredient else {
            return FilterVerdict::Reject;
        };
        let statement = point.statement.trim();
        if ingredient.source.trim() != statement {
            return FilterVerdict::Accept;
        }
        point
            .ingredients
            .iter()
            .position(|i| i.source.trim() != statement)
            .map_or(FilterVerdict::Reject, FilterVerdict::Redirect)
    }
}

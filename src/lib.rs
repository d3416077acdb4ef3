//! evorepair - Search-based automated program repair.
//!
//! This crate searches combinations of statement-level edits (delete,
//! replace, insert-before) at suspicious program locations for patches that
//! make the failing tests pass without breaking the passing ones. Candidates
//! are evolved with NSGA-II over a configurable set of objectives, optionally
//! steered by behavioral novelty.
//!
//! # Architecture
//!
//! The crate is split into two main modules:
//!
//! - `schema`: Configuration, program model, coverage and patch record types
//! - `compute`: Fault localization, patching, the compile/test harness and the search
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use evorepair::{
//!     compute::{
//!         CatalogModelBuilder, LinePatcher, RepairSession, Sources, Toolchain,
//!         harness::{CommandCompiler, CommandTestHarness},
//!     },
//!     schema::RepairConfig,
//! };
//!
//! let builder = CatalogModelBuilder::from_file("catalog.json").unwrap();
//! let session =
//!     RepairSession::from_coverage(RepairConfig::default(), "coverage.json", Box::new(builder))
//!         .unwrap();
//! let toolchain = Toolchain {
//!     patcher: Box::new(LinePatcher),
//!     compiler: Arc::new(CommandCompiler::new("make", vec!["SRC={src}".into()], "work")),
//!     harness: Arc::new(CommandTestHarness::new("./run-tests.sh", vec!["{artifact}".into()])),
//! };
//!
//! let result = session.run(toolchain, Sources::Root("src".into())).unwrap();
//! println!("Found {} test-adequate patches", result.patches.len());
//! ```

pub mod compute;
pub mod schema;

// Re-export commonly used types
pub use compute::{RepairError, RepairSession, SuspicionScorer};
pub use schema::{PatchRecord, RepairConfig, SearchResult};

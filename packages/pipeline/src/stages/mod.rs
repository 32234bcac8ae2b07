//! The five pipeline stages.
//!
//! `generate` builds the search-URL artifact; the other four are
//! [`crate::runner::UnitOfWork`] implementations driven by the stage
//! runner over their checkpoint collections.

pub mod classify;
pub mod generate;
pub mod index;
pub mod job_pages;
pub mod search_pages;

pub use classify::ClassifyUnit;
pub use index::IndexUnit;
pub use job_pages::JobPageUnit;
pub use search_pages::SearchPageUnit;

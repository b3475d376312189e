//! Search backend implementations.
//!
//! Each module provides a struct implementing [`crate::backend::SearchBackend`]
//! over one data source: the catalog's GraphQL API, its search index, or a
//! direct listing of one bucket.

pub mod catalog_graph;
pub mod content_index;
pub mod object_listing;

pub use catalog_graph::CatalogGraphBackend;
pub use content_index::ContentIndexBackend;
pub use object_listing::ObjectListingBackend;

//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define explicit read/write contracts for products and their images.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`ProductNotFound`,
//!   `ImageNotFound`) in addition to DB transport errors.

pub mod image_repo;
pub mod product_repo;

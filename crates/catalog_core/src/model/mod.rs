//! Catalog domain model.
//!
//! # Responsibility
//! - Define the plain data records shared by repositories and services.
//! - Keep product invariants (title, slug, price, stock) in one place.
//!
//! # Invariants
//! - Every product and image is identified by a stable UUID.
//! - Records carry no persistence behavior; mutation happens in services.

pub mod image;
pub mod product;

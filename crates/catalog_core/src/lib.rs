//! Core domain logic for the product catalog.
//!
//! Products own an ordered image gallery. Updates reconcile the stored gallery
//! against a client-supplied desired list and apply the result in one SQLite
//! transaction.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod reconcile;
pub mod repo;
pub mod service;

pub use config::{CatalogConfig, ConfigError};
pub use db::{open_db, open_db_in_memory, run_in_transaction, DbError, UnitOfWork};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::image::{DesiredImage, ImageId, ProductImage};
pub use model::product::{
    normalize_slug, Gender, NewProduct, Product, ProductId, ProductPatch, ProductValidationError,
    UserId,
};
pub use reconcile::{
    reconcile, reconcile_images, ImageDiff, ImageOp, ReconcileError, UnknownImagePolicy,
};
pub use repo::image_repo::{ImageRepository, SqliteImageRepository};
pub use repo::product_repo::{
    ProductListQuery, ProductRepository, RepoError, RepoResult, SqliteProductRepository,
};
pub use service::product_service::{
    PageRequest, PlainProduct, ProductPage, ProductService, ProductServiceError, ServiceOptions,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}

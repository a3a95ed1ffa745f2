//! Product image repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide row-level access to `product_images`.
//!
//! # Invariants
//! - Every mutation is scoped to one owning product; an image id owned by
//!   another product is reported as not found.
//! - Mutations are expected to run inside a unit of work.

use crate::model::image::{ImageId, ProductImage};
use crate::model::product::ProductId;
use crate::repo::product_repo::{
    ensure_catalog_connection_ready, parse_uuid, RepoError, RepoResult,
};
use rusqlite::{params, Connection};

/// Repository interface for product image rows.
pub trait ImageRepository {
    /// Images owned by `product_id` in gallery order.
    fn list_images(&self, product_id: ProductId) -> RepoResult<Vec<ProductImage>>;
    fn insert_image(&self, image: &ProductImage, position: usize) -> RepoResult<ImageId>;
    fn update_image_url(&self, product_id: ProductId, id: ImageId, url: &str) -> RepoResult<()>;
    fn delete_image(&self, product_id: ProductId, id: ImageId) -> RepoResult<()>;
}

/// SQLite-backed image repository.
pub struct SqliteImageRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteImageRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_catalog_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl ImageRepository for SqliteImageRepository<'_> {
    fn list_images(&self, product_id: ProductId) -> RepoResult<Vec<ProductImage>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, url, product_id
             FROM product_images
             WHERE product_id = ?1
             ORDER BY position ASC, rowid ASC;",
        )?;
        let mut rows = stmt.query([product_id.to_string()])?;

        let mut images = Vec::new();
        while let Some(row) = rows.next()? {
            let id_text: String = row.get("id")?;
            let owner_text: String = row.get("product_id")?;
            let url: String = row.get("url")?;
            if url.trim().is_empty() {
                return Err(RepoError::InvalidData(format!(
                    "blank url for image `{id_text}` in product_images.url"
                )));
            }
            images.push(ProductImage {
                id: parse_uuid(&id_text, "product_images.id")?,
                url,
                product_id: parse_uuid(&owner_text, "product_images.product_id")?,
            });
        }
        Ok(images)
    }

    fn insert_image(&self, image: &ProductImage, position: usize) -> RepoResult<ImageId> {
        self.conn.execute(
            "INSERT INTO product_images (id, product_id, url, position)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                image.id.to_string(),
                image.product_id.to_string(),
                image.url.as_str(),
                position as i64,
            ],
        )?;
        Ok(image.id)
    }

    fn update_image_url(&self, product_id: ProductId, id: ImageId, url: &str) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE product_images
             SET url = ?3
             WHERE id = ?1
               AND product_id = ?2;",
            params![id.to_string(), product_id.to_string(), url],
        )?;
        if changed == 0 {
            return Err(RepoError::ImageNotFound(id));
        }
        Ok(())
    }

    fn delete_image(&self, product_id: ProductId, id: ImageId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM product_images
             WHERE id = ?1
               AND product_id = ?2;",
            params![id.to_string(), product_id.to_string()],
        )?;
        if changed == 0 {
            return Err(RepoError::ImageNotFound(id));
        }
        Ok(())
    }
}

//! Product repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD APIs over the `products` table.
//! - Own the persisted gallery order of each product.
//!
//! # Invariants
//! - Write paths call `Product::validate()` before SQL mutations.
//! - Read paths reject invalid persisted state instead of masking it.
//! - Loaded products always carry their images in gallery order.

use crate::db::migrations::{current_version, latest_version};
use crate::db::DbError;
use crate::model::image::ImageId;
use crate::model::product::{Gender, Product, ProductId, ProductValidationError};
use crate::repo::image_repo::{ImageRepository, SqliteImageRepository};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const PRODUCT_SELECT_SQL: &str = "SELECT
    id,
    title,
    price,
    description,
    slug,
    stock,
    sizes,
    gender,
    user_id,
    created_at,
    updated_at
FROM products";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for catalog persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(ProductValidationError),
    Db(DbError),
    ProductNotFound(ProductId),
    /// Image is absent or owned by another product.
    ImageNotFound(ImageId),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::ProductNotFound(id) => write!(f, "product not found: {id}"),
            Self::ImageNotFound(id) => write!(f, "product image not found: {id}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "catalog repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted catalog data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ProductValidationError> for RepoError {
    fn from(value: ProductValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Pagination window for product listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductListQuery {
    pub limit: u32,
    pub offset: u32,
}

/// Repository interface for product records.
pub trait ProductRepository {
    /// Inserts the scalar row. Images and timestamps on `product` are ignored.
    fn insert_product(&self, product: &Product) -> RepoResult<ProductId>;
    /// Persists scalar fields and rewrites the gallery order.
    fn save_product(&self, product: &Product, image_order: &[ImageId]) -> RepoResult<()>;
    fn get_product(&self, id: ProductId) -> RepoResult<Option<Product>>;
    /// Exact, case-sensitive match on title or slug.
    fn find_by_title_or_slug(&self, term: &str) -> RepoResult<Option<Product>>;
    /// Products in creation order.
    fn list_products(&self, query: &ProductListQuery) -> RepoResult<Vec<Product>>;
    fn count_products(&self) -> RepoResult<u64>;
    /// Deletes one product; owned images cascade.
    fn delete_product(&self, id: ProductId) -> RepoResult<()>;
    /// Deletes every product and returns how many were removed.
    fn delete_all_products(&self) -> RepoResult<usize>;
}

/// SQLite-backed product repository.
pub struct SqliteProductRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteProductRepository<'conn> {
    /// Wraps a connection without schema checks.
    ///
    /// Used for connections already verified, e.g. inside a unit of work.
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Wraps a connection after checking that catalog migrations are applied.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_catalog_connection_ready(conn)?;
        Ok(Self { conn })
    }

    fn with_images(&self, mut product: Product) -> RepoResult<Product> {
        product.images = SqliteImageRepository::new(self.conn).list_images(product.id)?;
        Ok(product)
    }
}

impl ProductRepository for SqliteProductRepository<'_> {
    fn insert_product(&self, product: &Product) -> RepoResult<ProductId> {
        product.validate()?;

        self.conn.execute(
            "INSERT INTO products (
                id,
                title,
                price,
                description,
                slug,
                stock,
                sizes,
                gender,
                user_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
            params![
                product.id.to_string(),
                product.title.as_str(),
                product.price,
                product.description.as_deref(),
                product.slug.as_str(),
                product.stock,
                sizes_to_db(&product.sizes)?,
                product.gender.as_str(),
                product.user_id.map(|id| id.to_string()),
            ],
        )?;

        Ok(product.id)
    }

    fn save_product(&self, product: &Product, image_order: &[ImageId]) -> RepoResult<()> {
        product.validate()?;
        let product_id = product.id.to_string();

        let changed = self.conn.execute(
            "UPDATE products
             SET
                title = ?2,
                price = ?3,
                description = ?4,
                slug = ?5,
                stock = ?6,
                sizes = ?7,
                gender = ?8,
                updated_at = CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER)
             WHERE id = ?1;",
            params![
                product_id.as_str(),
                product.title.as_str(),
                product.price,
                product.description.as_deref(),
                product.slug.as_str(),
                product.stock,
                sizes_to_db(&product.sizes)?,
                product.gender.as_str(),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::ProductNotFound(product.id));
        }

        for (position, image_id) in image_order.iter().enumerate() {
            let changed = self.conn.execute(
                "UPDATE product_images
                 SET position = ?3
                 WHERE id = ?1
                   AND product_id = ?2;",
                params![image_id.to_string(), product_id.as_str(), position as i64],
            )?;
            if changed == 0 {
                return Err(RepoError::ImageNotFound(*image_id));
            }
        }

        Ok(())
    }

    fn get_product(&self, id: ProductId) -> RepoResult<Option<Product>> {
        let product = self
            .conn
            .query_row(
                &format!("{PRODUCT_SELECT_SQL} WHERE id = ?1;"),
                [id.to_string()],
                |row| Ok(parse_product_row(row)),
            )
            .optional()?
            .transpose()?;

        product.map(|product| self.with_images(product)).transpose()
    }

    fn find_by_title_or_slug(&self, term: &str) -> RepoResult<Option<Product>> {
        let product = self
            .conn
            .query_row(
                &format!(
                    "{PRODUCT_SELECT_SQL}
                     WHERE title = ?1 OR slug = ?1
                     ORDER BY created_at ASC, rowid ASC
                     LIMIT 1;"
                ),
                [term],
                |row| Ok(parse_product_row(row)),
            )
            .optional()?
            .transpose()?;

        product.map(|product| self.with_images(product)).transpose()
    }

    fn list_products(&self, query: &ProductListQuery) -> RepoResult<Vec<Product>> {
        let mut stmt = self.conn.prepare(&format!(
            "{PRODUCT_SELECT_SQL}
             ORDER BY created_at ASC, rowid ASC
             LIMIT ?1 OFFSET ?2;"
        ))?;
        let mut rows = stmt.query(params![i64::from(query.limit), i64::from(query.offset)])?;

        let mut products = Vec::new();
        while let Some(row) = rows.next()? {
            products.push(parse_product_row(row)?);
        }

        products
            .into_iter()
            .map(|product| self.with_images(product))
            .collect()
    }

    fn count_products(&self) -> RepoResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM products;", [], |row| row.get(0))?;
        u64::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative product count `{count}`")))
    }

    fn delete_product(&self, id: ProductId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM products WHERE id = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(RepoError::ProductNotFound(id));
        }
        Ok(())
    }

    fn delete_all_products(&self) -> RepoResult<usize> {
        let removed = self.conn.execute("DELETE FROM products;", [])?;
        Ok(removed)
    }
}

/// Verifies the connection carries the catalog schema.
pub(crate) fn ensure_catalog_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version = current_version(conn)?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }
    Ok(())
}

pub(crate) fn parse_uuid(value: &str, column: &'static str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

fn parse_product_row(row: &Row<'_>) -> RepoResult<Product> {
    let id_text: String = row.get("id")?;
    let id = parse_uuid(&id_text, "products.id")?;

    let gender_text: String = row.get("gender")?;
    let gender = Gender::parse(&gender_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid gender `{gender_text}` in products.gender"))
    })?;

    let sizes_text: String = row.get("sizes")?;
    let sizes: Vec<String> = serde_json::from_str(&sizes_text).map_err(|err| {
        RepoError::InvalidData(format!("invalid sizes `{sizes_text}` in products.sizes: {err}"))
    })?;

    let user_id = row
        .get::<_, Option<String>>("user_id")?
        .map(|value| parse_uuid(&value, "products.user_id"))
        .transpose()?;

    let product = Product {
        id,
        title: row.get("title")?,
        price: row.get("price")?,
        description: row.get("description")?,
        slug: row.get("slug")?,
        stock: row.get("stock")?,
        sizes,
        gender,
        images: Vec::new(),
        user_id,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    };
    product.validate()?;
    Ok(product)
}

fn sizes_to_db(sizes: &[String]) -> RepoResult<String> {
    serde_json::to_string(sizes)
        .map_err(|err| RepoError::InvalidData(format!("cannot encode product sizes: {err}")))
}

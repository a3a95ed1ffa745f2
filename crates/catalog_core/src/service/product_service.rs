//! Product use-case service.
//!
//! # Responsibility
//! - Orchestrate product create/update/lookup/list/remove over repositories.
//! - Drive image reconciliation and apply its diff in one transaction.
//! - Translate repository failures into the service error taxonomy.
//!
//! # Invariants
//! - Updates merge only the fields present in the patch.
//! - Image mutations run deletes, then updates, then creates, then the product
//!   row, all inside one unit of work.
//! - Returned products are always re-read after commit.
//! - Unrecognized storage faults are logged once here and surfaced as
//!   `Unexpected` without detail.

use crate::db::run_in_transaction;
use crate::model::image::{DesiredImage, ImageId, ProductImage};
use crate::model::product::{
    normalize_slug, Gender, NewProduct, Product, ProductId, ProductPatch, ProductValidationError,
    UserId,
};
use crate::reconcile::{reconcile_images, ImageDiff, ImageOp, ReconcileError, UnknownImagePolicy};
use crate::repo::image_repo::ImageRepository;
use crate::repo::product_repo::{
    ensure_catalog_connection_ready, ProductListQuery, ProductRepository, RepoError, RepoResult,
    SqliteProductRepository,
};
use log::{error, info};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::Connection;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;
use uuid::Uuid;

/// Page size used when a listing request names none.
pub const DEFAULT_PAGE_SIZE: u32 = 10;
/// Largest page a listing request may ask for.
pub const PAGE_SIZE_MAX: u32 = 50;

static UUID_TERM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("valid uuid term regex")
});

/// Service error for product use-cases.
#[derive(Debug)]
pub enum ProductServiceError {
    /// Input breaks a product invariant.
    Validation(ProductValidationError),
    /// No product matches the id or lookup term.
    ProductNotFound(String),
    /// A referenced image is not owned by the product.
    ImageNotFound(ImageId),
    /// Title or slug already used by another product.
    Conflict(String),
    /// Storage failure; details are in the log only.
    Unexpected,
}

impl Display for ProductServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::ProductNotFound(term) => write!(f, "product `{term}` was not found"),
            Self::ImageNotFound(id) => write!(f, "image {id} is not owned by this product"),
            Self::Conflict(detail) => write!(f, "product already exists: {detail}"),
            Self::Unexpected => write!(f, "unexpected error, check server logs"),
        }
    }
}

impl Error for ProductServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ProductValidationError> for ProductServiceError {
    fn from(value: ProductValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<ReconcileError> for ProductServiceError {
    fn from(value: ReconcileError) -> Self {
        match value {
            ReconcileError::UnknownImage(id) => Self::ImageNotFound(id),
            ReconcileError::DuplicateImage(id) => {
                Self::Validation(ProductValidationError::DuplicateImageId(id))
            }
            ReconcileError::EmptyUrl { position } => {
                Self::Validation(ProductValidationError::EmptyImageUrl { position })
            }
            ReconcileError::IdSourceExhausted => {
                error!("event=image_id_alloc module=service status=error error={value}");
                Self::Unexpected
            }
        }
    }
}

/// Behavior switches for [`ProductService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceOptions {
    pub unknown_image_policy: UnknownImagePolicy,
    pub default_page_size: u32,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            unknown_image_policy: UnknownImagePolicy::default(),
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Listing window requested by a caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageRequest {
    /// `None` or `0` selects the configured default; capped at [`PAGE_SIZE_MAX`].
    pub limit: Option<u32>,
    pub offset: u32,
}

/// One page of products plus paging metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductPage {
    pub items: Vec<Product>,
    pub total_items: u64,
    pub current_page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

/// Product read model with images flattened to URLs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlainProduct {
    pub id: ProductId,
    pub title: String,
    pub price: Option<f64>,
    pub description: Option<String>,
    pub slug: String,
    pub stock: Option<i64>,
    pub sizes: Vec<String>,
    pub gender: Gender,
    pub images: Vec<String>,
    pub user_id: Option<UserId>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<Product> for PlainProduct {
    fn from(product: Product) -> Self {
        let images = product.image_urls();
        Self {
            id: product.id,
            title: product.title,
            price: product.price,
            description: product.description,
            slug: product.slug,
            stock: product.stock,
            sizes: product.sizes,
            gender: product.gender,
            images,
            user_id: product.user_id,
            created_at: product.created_at,
            updated_at: product.updated_at,
        }
    }
}

/// Product service facade over one SQLite connection.
///
/// Holds the connection exclusively for its lifetime; each write call opens
/// and closes its own transaction.
pub struct ProductService<'conn> {
    conn: &'conn mut Connection,
    options: ServiceOptions,
}

impl<'conn> ProductService<'conn> {
    /// Creates a service over a migrated connection.
    pub fn new(conn: &'conn mut Connection, options: ServiceOptions) -> Self {
        Self { conn, options }
    }

    /// Creates a service after checking that catalog migrations are applied.
    pub fn try_new(conn: &'conn mut Connection, options: ServiceOptions) -> RepoResult<Self> {
        ensure_catalog_connection_ready(conn)?;
        Ok(Self { conn, options })
    }

    /// Registers a product and its initial gallery.
    pub fn create_product(&mut self, input: &NewProduct) -> Result<Product, ProductServiceError> {
        const OPERATION: &str = "product_create";
        let started_at = Instant::now();

        let product = Product {
            id: Uuid::new_v4(),
            title: input.title.clone(),
            price: input.price,
            description: input.description.clone(),
            slug: input.effective_slug(),
            stock: input.stock,
            sizes: input.sizes.clone(),
            gender: input.gender,
            images: Vec::new(),
            user_id: input.user_id,
            created_at: 0,
            updated_at: 0,
        };
        product.validate()?;

        let desired: Vec<DesiredImage> = input.images.iter().map(DesiredImage::new).collect();
        let diff = reconcile_images(&[], &desired, self.options.unknown_image_policy)?;

        run_in_transaction(self.conn, OPERATION, |unit| {
            unit.products().insert_product(&product)?;
            apply_image_ops(&unit.images(), product.id, &diff)
        })
        .map_err(|err| storage_failure(OPERATION, err))?;

        info!(
            "event={OPERATION} module=service status=ok product_id={} images={} duration_ms={}",
            product.id,
            diff.to_create.len(),
            started_at.elapsed().as_millis()
        );
        self.read_back(product.id, OPERATION)
    }

    /// Applies a partial scalar patch and reconciles the gallery atomically.
    ///
    /// # Contract
    /// - `images` is the complete desired gallery; owned images it omits are
    ///   deleted, so an empty slice clears the gallery.
    /// - Fails with `ProductNotFound` before any write when `product_id` is
    ///   unknown.
    /// - Returns the product as re-read after commit.
    pub fn update_product(
        &mut self,
        product_id: ProductId,
        patch: &ProductPatch,
        images: &[DesiredImage],
    ) -> Result<Product, ProductServiceError> {
        const OPERATION: &str = "product_update";
        let started_at = Instant::now();

        let current = self
            .products()
            .get_product(product_id)
            .map_err(|err| storage_failure(OPERATION, err))?
            .ok_or_else(|| ProductServiceError::ProductNotFound(product_id.to_string()))?;

        let updated = merge_patch(&current, patch);
        updated.validate()?;
        let diff = reconcile_images(&current.images, images, self.options.unknown_image_policy)?;

        run_in_transaction(self.conn, OPERATION, |unit| {
            apply_product_update(&unit.images(), &unit.products(), &updated, &diff)
        })
        .map_err(|err| storage_failure(OPERATION, err))?;

        info!(
            "event={OPERATION} module=service status=ok product_id={product_id} scalars_patched={} deleted={} updated={} created={} duration_ms={}",
            !patch.is_empty(),
            diff.to_delete.len(),
            diff.to_update.len(),
            diff.to_create.len(),
            started_at.elapsed().as_millis()
        );
        self.read_back(product_id, OPERATION)
    }

    /// Finds one product by id, exact title or exact slug.
    ///
    /// A hyphenated UUID term is only matched against ids. Title and slug
    /// matching is case-sensitive.
    pub fn find_product(&self, term: &str) -> Result<Product, ProductServiceError> {
        let repo = self.products();
        let found = if UUID_TERM_RE.is_match(term) {
            match Uuid::parse_str(term) {
                Ok(id) => repo.get_product(id),
                Err(_) => Ok(None),
            }
        } else {
            repo.find_by_title_or_slug(term)
        };

        found
            .map_err(|err| storage_failure("product_find", err))?
            .ok_or_else(|| ProductServiceError::ProductNotFound(term.to_string()))
    }

    /// Same as [`Self::find_product`] with images flattened to URLs.
    pub fn find_product_plain(&self, term: &str) -> Result<PlainProduct, ProductServiceError> {
        self.find_product(term).map(PlainProduct::from)
    }

    /// Lists products in creation order.
    pub fn list_products(&self, page: &PageRequest) -> Result<ProductPage, ProductServiceError> {
        const OPERATION: &str = "product_list";
        let limit = normalize_page_limit(page.limit, self.options.default_page_size);
        let repo = self.products();

        let total_items = repo
            .count_products()
            .map_err(|err| storage_failure(OPERATION, err))?;
        let items = repo
            .list_products(&ProductListQuery {
                limit,
                offset: page.offset,
            })
            .map_err(|err| storage_failure(OPERATION, err))?;

        let total_pages = total_items.div_ceil(u64::from(limit));
        Ok(ProductPage {
            items,
            total_items,
            current_page: page.offset / limit + 1,
            page_size: limit,
            total_pages: u32::try_from(total_pages).unwrap_or(u32::MAX),
        })
    }

    /// Deletes one product together with its images.
    pub fn remove_product(&mut self, product_id: ProductId) -> Result<(), ProductServiceError> {
        const OPERATION: &str = "product_remove";
        run_in_transaction(self.conn, OPERATION, |unit| {
            unit.products().delete_product(product_id)
        })
        .map_err(|err| storage_failure(OPERATION, err))?;

        info!("event={OPERATION} module=service status=ok product_id={product_id}");
        Ok(())
    }

    /// Deletes every product and image. Returns the number of products removed.
    pub fn delete_all_products(&mut self) -> Result<usize, ProductServiceError> {
        const OPERATION: &str = "product_delete_all";
        let removed = run_in_transaction(self.conn, OPERATION, |unit| {
            unit.products().delete_all_products()
        })
        .map_err(|err| storage_failure(OPERATION, err))?;

        info!("event={OPERATION} module=service status=ok removed={removed}");
        Ok(removed)
    }

    fn products(&self) -> SqliteProductRepository<'_> {
        SqliteProductRepository::new(&*self.conn)
    }

    fn read_back(
        &self,
        product_id: ProductId,
        operation: &'static str,
    ) -> Result<Product, ProductServiceError> {
        match self.products().get_product(product_id) {
            Ok(Some(product)) => Ok(product),
            Ok(None) => {
                error!(
                    "event={operation} module=service status=error error_code=read_back_missing product_id={product_id}"
                );
                Err(ProductServiceError::Unexpected)
            }
            Err(err) => Err(storage_failure(operation, err)),
        }
    }
}

/// Clamps a requested page size into `1..=PAGE_SIZE_MAX`.
pub fn normalize_page_limit(limit: Option<u32>, default_limit: u32) -> u32 {
    let fallback = default_limit.clamp(1, PAGE_SIZE_MAX);
    match limit {
        None | Some(0) => fallback,
        Some(value) => value.min(PAGE_SIZE_MAX),
    }
}

/// Merges the fields present in `patch` over `current`.
///
/// A patched slug is normalized; an absent slug is kept even when the title
/// changes.
fn merge_patch(current: &Product, patch: &ProductPatch) -> Product {
    Product {
        title: patch.title.clone().unwrap_or_else(|| current.title.clone()),
        price: patch.price.unwrap_or(current.price),
        description: patch
            .description
            .clone()
            .unwrap_or_else(|| current.description.clone()),
        slug: patch
            .slug
            .as_deref()
            .map(normalize_slug)
            .unwrap_or_else(|| current.slug.clone()),
        stock: patch.stock.unwrap_or(current.stock),
        sizes: patch.sizes.clone().unwrap_or_else(|| current.sizes.clone()),
        gender: patch.gender.unwrap_or(current.gender),
        ..current.clone()
    }
}

fn apply_product_update<I, P>(
    images: &I,
    products: &P,
    product: &Product,
    diff: &ImageDiff,
) -> RepoResult<()>
where
    I: ImageRepository,
    P: ProductRepository,
{
    apply_image_ops(images, product.id, diff)?;
    products.save_product(product, &diff.order())
}

fn apply_image_ops<I: ImageRepository>(
    images: &I,
    product_id: ProductId,
    diff: &ImageDiff,
) -> RepoResult<()> {
    for op in diff.operations() {
        match op {
            ImageOp::Delete(id) => images.delete_image(product_id, id)?,
            ImageOp::Update(update) => {
                images.update_image_url(product_id, update.id, &update.url)?
            }
            ImageOp::Create(create) => {
                let image = ProductImage {
                    id: create.id,
                    url: create.url.clone(),
                    product_id,
                };
                images.insert_image(&image, create.position)?;
            }
        }
    }
    Ok(())
}

fn storage_failure(operation: &'static str, err: RepoError) -> ProductServiceError {
    if let RepoError::Db(db_err) = &err {
        if let Some(detail) = db_err.unique_violation() {
            return ProductServiceError::Conflict(detail);
        }
    }

    match err {
        RepoError::ProductNotFound(id) => ProductServiceError::ProductNotFound(id.to_string()),
        RepoError::ImageNotFound(id) => ProductServiceError::ImageNotFound(id),
        RepoError::Validation(err) => ProductServiceError::Validation(err),
        other => {
            error!("event=storage_fault module=service status=error operation={operation} error={other}");
            ProductServiceError::Unexpected
        }
    }
}

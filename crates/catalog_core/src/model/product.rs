//! Product domain model.
//!
//! # Responsibility
//! - Define the canonical product record and its create/patch inputs.
//! - Own slug normalization and scalar invariant checks.
//!
//! # Invariants
//! - `id` is stable and never reused for another product.
//! - `title` and `slug` are non-empty; both are unique in storage.
//! - `price` and `stock`, when present, are non-negative.
//! - `images` order is the display order of the product gallery.

use crate::model::image::{ImageId, ProductImage};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable product identifier.
pub type ProductId = Uuid;

/// Identifier of the user that registered a product.
///
/// Weak reference: users live outside this crate and no foreign key exists.
pub type UserId = Uuid;

static SLUG_WHITESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("valid slug whitespace regex"));
static SLUG_DISALLOWED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{Alphabetic}\p{Nd}_-]+").expect("valid slug symbol regex"));

/// Closed set of catalog audiences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Men,
    Women,
    Kid,
    Unisex,
}

impl Gender {
    /// Storage/wire spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Men => "men",
            Self::Women => "women",
            Self::Kid => "kid",
            Self::Unisex => "unisex",
        }
    }

    /// Parses the storage/wire spelling. Matching is exact.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "men" => Some(Self::Men),
            "women" => Some(Self::Women),
            "kid" => Some(Self::Kid),
            "unisex" => Some(Self::Unisex),
            _ => None,
        }
    }
}

/// Product invariant violations.
#[derive(Debug, Clone, PartialEq)]
pub enum ProductValidationError {
    /// `id` is nil.
    NilId,
    /// `title` is blank.
    EmptyTitle,
    /// `slug` normalizes to an empty string.
    EmptySlug,
    /// `price` is negative or not a finite number.
    InvalidPrice(f64),
    /// `stock` is negative.
    NegativeStock(i64),
    /// Image URL at the given gallery position is blank.
    EmptyImageUrl { position: usize },
    /// The same stored image was referenced twice in one request.
    DuplicateImageId(ImageId),
}

impl Display for ProductValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NilId => write!(f, "product id must not be nil"),
            Self::EmptyTitle => write!(f, "product title must not be blank"),
            Self::EmptySlug => write!(f, "product slug must contain at least one letter or digit"),
            Self::InvalidPrice(price) => {
                write!(f, "product price must be a non-negative number, got {price}")
            }
            Self::NegativeStock(stock) => {
                write!(f, "product stock must not be negative, got {stock}")
            }
            Self::EmptyImageUrl { position } => {
                write!(f, "image url at position {position} must not be blank")
            }
            Self::DuplicateImageId(id) => write!(f, "image {id} is referenced more than once"),
        }
    }
}

impl Error for ProductValidationError {}

/// Canonical product record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub title: String,
    pub price: Option<f64>,
    pub description: Option<String>,
    /// URL-friendly unique key, see [`normalize_slug`].
    pub slug: String,
    pub stock: Option<i64>,
    /// Size labels in display order.
    pub sizes: Vec<String>,
    pub gender: Gender,
    /// Owned images in gallery order.
    pub images: Vec<ProductImage>,
    pub user_id: Option<UserId>,
    /// Unix epoch milliseconds, assigned by storage.
    pub created_at: i64,
    /// Unix epoch milliseconds, refreshed by storage on every save.
    pub updated_at: i64,
}

impl Product {
    /// Checks scalar invariants. Image rows are validated by their writers.
    pub fn validate(&self) -> Result<(), ProductValidationError> {
        if self.id.is_nil() {
            return Err(ProductValidationError::NilId);
        }
        validate_scalars(&self.title, &self.slug, self.price, self.stock)
    }

    /// Image identifiers in gallery order.
    pub fn image_ids(&self) -> Vec<ImageId> {
        self.images.iter().map(|image| image.id).collect()
    }

    /// Image URLs in gallery order.
    pub fn image_urls(&self) -> Vec<String> {
        self.images.iter().map(|image| image.url.clone()).collect()
    }
}

/// Input for registering a new product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
    pub title: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
    /// Defaults to the title when absent.
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub stock: Option<i64>,
    #[serde(default)]
    pub sizes: Vec<String>,
    pub gender: Gender,
    /// Stored file URLs in gallery order.
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub user_id: Option<UserId>,
}

impl NewProduct {
    /// Minimal product input; optional attributes start empty.
    pub fn new(title: impl Into<String>, gender: Gender) -> Self {
        Self {
            title: title.into(),
            price: None,
            description: None,
            slug: None,
            stock: None,
            sizes: Vec::new(),
            gender,
            images: Vec::new(),
            user_id: None,
        }
    }

    /// Slug this product will be stored under.
    pub fn effective_slug(&self) -> String {
        normalize_slug(self.slug.as_deref().unwrap_or(self.title.as_str()))
    }
}

/// Partial scalar update. `None` leaves the stored value untouched.
///
/// Nullable attributes use a nested option: `Some(None)` clears the stored
/// value. On the wire an absent key is `None` and an explicit `null` is
/// `Some(None)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub price: Option<Option<f64>>,
    #[serde(
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub stock: Option<Option<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sizes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
}

impl ProductPatch {
    /// Whether no scalar field is set.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.price.is_none()
            && self.description.is_none()
            && self.slug.is_none()
            && self.stock.is_none()
            && self.sizes.is_none()
            && self.gender.is_none()
    }
}

/// Maps a present key to `Some`, keeping an explicit `null` as `Some(None)`.
fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Normalizes free text into a slug.
///
/// Lowercases, turns whitespace runs into `_`, and drops every character that
/// is not a letter, digit, `_` or `-`.
pub fn normalize_slug(value: &str) -> String {
    let lowered = value.trim().to_lowercase();
    let joined = SLUG_WHITESPACE_RE.replace_all(&lowered, "_");
    SLUG_DISALLOWED_RE.replace_all(&joined, "").into_owned()
}

pub(crate) fn validate_scalars(
    title: &str,
    slug: &str,
    price: Option<f64>,
    stock: Option<i64>,
) -> Result<(), ProductValidationError> {
    if title.trim().is_empty() {
        return Err(ProductValidationError::EmptyTitle);
    }
    if slug.is_empty() {
        return Err(ProductValidationError::EmptySlug);
    }
    if let Some(price) = price {
        if !price.is_finite() || price < 0.0 {
            return Err(ProductValidationError::InvalidPrice(price));
        }
    }
    if let Some(stock) = stock {
        if stock < 0 {
            return Err(ProductValidationError::NegativeStock(stock));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{normalize_slug, validate_scalars, ProductValidationError};

    #[test]
    fn slug_lowercases_and_joins_whitespace() {
        assert_eq!(normalize_slug("Men's  Chill Crew Neck"), "mens_chill_crew_neck");
    }

    #[test]
    fn slug_keeps_dashes_and_digits() {
        assert_eq!(normalize_slug(" Red-Shoe 2024! "), "red-shoe_2024");
    }

    #[test]
    fn slug_of_punctuation_only_is_empty() {
        assert_eq!(normalize_slug("?!."), "");
    }

    #[test]
    fn scalar_validation_rejects_negative_values() {
        assert_eq!(
            validate_scalars("shirt", "shirt", Some(-1.0), None),
            Err(ProductValidationError::InvalidPrice(-1.0))
        );
        assert_eq!(
            validate_scalars("shirt", "shirt", None, Some(-3)),
            Err(ProductValidationError::NegativeStock(-3))
        );
        assert!(validate_scalars("shirt", "shirt", Some(0.0), Some(0)).is_ok());
    }
}

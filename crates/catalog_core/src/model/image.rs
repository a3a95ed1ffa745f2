//! Product image records.
//!
//! # Responsibility
//! - Define the persisted image row and the request-scoped desired entry.
//!
//! # Invariants
//! - `ProductImage::id` is assigned once at creation and never reused.
//! - An image belongs to exactly one product.

use crate::model::product::ProductId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier of one product image.
pub type ImageId = Uuid;

/// Persisted image owned by a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductImage {
    pub id: ImageId,
    /// Stored file URL supplied by the upload collaborator.
    pub url: String,
    /// Owning product.
    pub product_id: ProductId,
}

/// One image a client wants associated with a product.
///
/// `id = Some(..)` targets an image the product already owns, `None` asks for
/// a new image. Never persisted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DesiredImage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ImageId>,
    pub url: String,
}

impl DesiredImage {
    /// Entry requesting a brand new image.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: None,
            url: url.into(),
        }
    }

    /// Entry targeting an already stored image.
    pub fn existing(id: ImageId, url: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            url: url.into(),
        }
    }
}

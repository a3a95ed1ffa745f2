//! Image reconciliation between stored and desired product galleries.
//!
//! # Responsibility
//! - Compute the delete/update/create operations that turn a product's stored
//!   images into a client-supplied desired list.
//! - Resolve the final gallery order.
//!
//! # Invariants
//! - No I/O. Output depends only on the inputs and the fresh-id source.
//! - Only identifiers of images the product already owns are update targets.
//! - Operations are walked in the order deletes, updates, creates.

use crate::model::image::{DesiredImage, ImageId, ProductImage};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const MAX_FRESH_ID_ATTEMPTS: usize = 8;

/// What to do with a desired entry whose id the product does not own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownImagePolicy {
    /// Ignore the client id and create a new image with a fresh id.
    #[default]
    CreateNew,
    /// Fail the whole reconciliation.
    Reject,
}

/// Reconciliation failures. All of them are detected before any write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    /// Desired entry targets an image the product does not own.
    UnknownImage(ImageId),
    /// Desired list references one owned image more than once.
    DuplicateImage(ImageId),
    /// Desired entry carries a blank URL.
    EmptyUrl { position: usize },
    /// The id source kept returning identifiers that are already taken.
    IdSourceExhausted,
}

impl Display for ReconcileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownImage(id) => write!(f, "image not owned by product: {id}"),
            Self::DuplicateImage(id) => write!(f, "image referenced more than once: {id}"),
            Self::EmptyUrl { position } => {
                write!(f, "image url at position {position} must not be blank")
            }
            Self::IdSourceExhausted => write!(f, "could not allocate a fresh image id"),
        }
    }
}

impl Error for ReconcileError {}

/// URL replacement for an owned image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpdate {
    pub id: ImageId,
    pub url: String,
}

/// New image to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCreate {
    pub id: ImageId,
    pub url: String,
    /// Index in the final gallery.
    pub position: usize,
}

/// One gallery slot after reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    pub id: ImageId,
    pub url: String,
}

/// Single storage mutation, borrowed from an [`ImageDiff`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOp<'a> {
    Delete(ImageId),
    Update(&'a ImageUpdate),
    Create(&'a ImageCreate),
}

/// Result of reconciling one product gallery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageDiff {
    /// Owned images absent from the desired list, in stored order.
    pub to_delete: Vec<ImageId>,
    /// Owned images kept with a different URL, in desired order.
    pub to_update: Vec<ImageUpdate>,
    /// New images, in desired order.
    pub to_create: Vec<ImageCreate>,
    /// Final gallery, one slot per desired entry.
    pub resolved: Vec<ResolvedImage>,
}

impl ImageDiff {
    /// True when applying the diff changes no image row.
    ///
    /// Gallery order may still differ from the stored one.
    pub fn is_empty(&self) -> bool {
        self.to_delete.is_empty() && self.to_update.is_empty() && self.to_create.is_empty()
    }

    /// Final gallery identifiers.
    pub fn order(&self) -> Vec<ImageId> {
        self.resolved.iter().map(|slot| slot.id).collect()
    }

    /// Desired list rewritten so every entry names its resolved identifier.
    pub fn resolved_entries(&self) -> Vec<DesiredImage> {
        self.resolved
            .iter()
            .map(|slot| DesiredImage::existing(slot.id, slot.url.clone()))
            .collect()
    }

    /// Walks every mutation: deletes first, then updates, then creates.
    pub fn operations(&self) -> impl Iterator<Item = ImageOp<'_>> + '_ {
        self.to_delete
            .iter()
            .copied()
            .map(ImageOp::Delete)
            .chain(self.to_update.iter().map(ImageOp::Update))
            .chain(self.to_create.iter().map(ImageOp::Create))
    }
}

/// Reconciles with random v4 identifiers for new images.
pub fn reconcile_images(
    existing: &[ProductImage],
    desired: &[DesiredImage],
    policy: UnknownImagePolicy,
) -> Result<ImageDiff, ReconcileError> {
    reconcile(existing, desired, policy, Uuid::new_v4)
}

/// Reconciles `existing` against `desired`, drawing new ids from `next_id`.
///
/// # Contract
/// - Every owned image whose id is not mentioned in `desired` is deleted.
/// - The first desired entry naming an owned id claims that image; its URL is
///   replaced when it differs.
/// - Entries without id, with an unknown id or with an already claimed id
///   become creates under [`UnknownImagePolicy::CreateNew`] and fail under
///   [`UnknownImagePolicy::Reject`].
/// - Fresh ids never collide with owned or previously issued ids.
pub fn reconcile<F>(
    existing: &[ProductImage],
    desired: &[DesiredImage],
    policy: UnknownImagePolicy,
    mut next_id: F,
) -> Result<ImageDiff, ReconcileError>
where
    F: FnMut() -> ImageId,
{
    if let Some(position) = desired.iter().position(|entry| entry.url.trim().is_empty()) {
        return Err(ReconcileError::EmptyUrl { position });
    }

    let owned: HashMap<ImageId, &ProductImage> =
        existing.iter().map(|image| (image.id, image)).collect();
    let mentioned: HashSet<ImageId> = desired.iter().filter_map(|entry| entry.id).collect();

    let mut diff = ImageDiff {
        to_delete: existing
            .iter()
            .filter(|image| !mentioned.contains(&image.id))
            .map(|image| image.id)
            .collect(),
        ..ImageDiff::default()
    };

    let mut claimed = HashSet::new();
    let mut issued = HashSet::new();
    for (position, entry) in desired.iter().enumerate() {
        let target = match entry.id {
            Some(id) => match owned.get(&id) {
                Some(image) if claimed.insert(id) => Some(*image),
                Some(_) if policy == UnknownImagePolicy::Reject => {
                    return Err(ReconcileError::DuplicateImage(id));
                }
                None if policy == UnknownImagePolicy::Reject => {
                    return Err(ReconcileError::UnknownImage(id));
                }
                _ => None,
            },
            None => None,
        };

        let id = match target {
            Some(image) => {
                if image.url != entry.url {
                    diff.to_update.push(ImageUpdate {
                        id: image.id,
                        url: entry.url.clone(),
                    });
                }
                image.id
            }
            None => {
                let id = fresh_id(&mut next_id, &owned, &mut issued)?;
                diff.to_create.push(ImageCreate {
                    id,
                    url: entry.url.clone(),
                    position,
                });
                id
            }
        };

        diff.resolved.push(ResolvedImage {
            id,
            url: entry.url.clone(),
        });
    }

    Ok(diff)
}

fn fresh_id<F>(
    next_id: &mut F,
    owned: &HashMap<ImageId, &ProductImage>,
    issued: &mut HashSet<ImageId>,
) -> Result<ImageId, ReconcileError>
where
    F: FnMut() -> ImageId,
{
    for _ in 0..MAX_FRESH_ID_ATTEMPTS {
        let candidate = next_id();
        if !candidate.is_nil() && !owned.contains_key(&candidate) && issued.insert(candidate) {
            return Ok(candidate);
        }
    }
    Err(ReconcileError::IdSourceExhausted)
}

#[cfg(test)]
mod tests {
    use super::{
        reconcile, reconcile_images, ImageDiff, ImageOp, ReconcileError, UnknownImagePolicy,
    };
    use crate::model::image::{DesiredImage, ImageId, ProductImage};
    use uuid::Uuid;

    fn id(n: u128) -> ImageId {
        Uuid::from_u128(n)
    }

    fn stored(n: u128, url: &str) -> ProductImage {
        ProductImage {
            id: id(n),
            url: url.to_string(),
            product_id: Uuid::from_u128(0xABCD),
        }
    }

    fn counter(start: u128) -> impl FnMut() -> ImageId {
        let mut next = start;
        move || {
            next += 1;
            Uuid::from_u128(next)
        }
    }

    fn run(existing: &[ProductImage], desired: &[DesiredImage]) -> ImageDiff {
        reconcile(existing, desired, UnknownImagePolicy::CreateNew, counter(1000)).unwrap()
    }

    #[test]
    fn update_delete_and_create_in_one_pass() {
        let existing = vec![stored(1, "a.jpg"), stored(2, "b.jpg")];
        let desired = vec![
            DesiredImage::existing(id(1), "a2.jpg"),
            DesiredImage::new("c.jpg"),
        ];

        let diff = run(&existing, &desired);
        assert_eq!(diff.to_delete, vec![id(2)]);
        assert_eq!(diff.to_update.len(), 1);
        assert_eq!(diff.to_update[0].id, id(1));
        assert_eq!(diff.to_update[0].url, "a2.jpg");
        assert_eq!(diff.to_create.len(), 1);
        assert_eq!(diff.to_create[0].url, "c.jpg");
        assert_eq!(diff.to_create[0].position, 1);
        assert_eq!(diff.order(), vec![id(1), diff.to_create[0].id]);
    }

    #[test]
    fn empty_gallery_only_creates() {
        let desired = vec![DesiredImage::new("x.jpg"), DesiredImage::new("y.jpg")];
        let diff = run(&[], &desired);
        assert!(diff.to_delete.is_empty());
        assert!(diff.to_update.is_empty());
        assert_eq!(diff.to_create.len(), 2);
        assert_ne!(diff.to_create[0].id, diff.to_create[1].id);
    }

    #[test]
    fn empty_desired_list_deletes_everything() {
        let existing = vec![stored(1, "a.jpg"), stored(2, "b.jpg")];
        let diff = run(&existing, &[]);
        assert_eq!(diff.to_delete, vec![id(1), id(2)]);
        assert!(diff.resolved.is_empty());
    }

    #[test]
    fn unchanged_url_keeps_slot_without_update() {
        let existing = vec![stored(1, "a.jpg"), stored(2, "b.jpg")];
        let desired = vec![
            DesiredImage::existing(id(2), "b.jpg"),
            DesiredImage::existing(id(1), "a.jpg"),
        ];
        let diff = run(&existing, &desired);
        assert!(diff.is_empty());
        assert_eq!(diff.order(), vec![id(2), id(1)]);
    }

    #[test]
    fn unknown_id_becomes_create_with_fresh_id() {
        let existing = vec![stored(1, "a.jpg")];
        let foreign = id(77);
        let desired = vec![DesiredImage::existing(foreign, "z.jpg")];

        let diff = run(&existing, &desired);
        assert_eq!(diff.to_delete, vec![id(1)]);
        assert_eq!(diff.to_create.len(), 1);
        assert_ne!(diff.to_create[0].id, foreign);
        assert_ne!(diff.to_create[0].id, id(1));
    }

    #[test]
    fn unknown_id_is_rejected_under_reject_policy() {
        let existing = vec![stored(1, "a.jpg")];
        let desired = vec![DesiredImage::existing(id(77), "z.jpg")];
        let err =
            reconcile(&existing, &desired, UnknownImagePolicy::Reject, counter(10)).unwrap_err();
        assert_eq!(err, ReconcileError::UnknownImage(id(77)));
    }

    #[test]
    fn duplicate_owned_id_claims_first_slot_only() {
        let existing = vec![stored(1, "a.jpg")];
        let desired = vec![
            DesiredImage::existing(id(1), "first.jpg"),
            DesiredImage::existing(id(1), "second.jpg"),
        ];

        let diff = run(&existing, &desired);
        assert_eq!(diff.to_update.len(), 1);
        assert_eq!(diff.to_update[0].url, "first.jpg");
        assert_eq!(diff.to_create.len(), 1);
        assert_eq!(diff.to_create[0].url, "second.jpg");

        let err = reconcile(&existing, &desired, UnknownImagePolicy::Reject, counter(10))
            .unwrap_err();
        assert_eq!(err, ReconcileError::DuplicateImage(id(1)));
    }

    #[test]
    fn blank_url_is_rejected_before_anything_else() {
        let desired = vec![DesiredImage::new("ok.jpg"), DesiredImage::new("   ")];
        let err = reconcile_images(&[], &desired, UnknownImagePolicy::CreateNew).unwrap_err();
        assert_eq!(err, ReconcileError::EmptyUrl { position: 1 });
    }

    #[test]
    fn fresh_ids_skip_owned_collisions() {
        let existing = vec![stored(1, "a.jpg")];
        let mut sequence = vec![id(1), id(1), id(5)].into_iter();
        let diff = reconcile(
            &existing,
            &[DesiredImage::new("n.jpg")],
            UnknownImagePolicy::CreateNew,
            move || sequence.next().unwrap_or_else(Uuid::nil),
        )
        .unwrap();
        assert_eq!(diff.to_create[0].id, id(5));
    }

    #[test]
    fn stuck_id_source_is_reported() {
        let err = reconcile(
            &[],
            &[DesiredImage::new("a.jpg"), DesiredImage::new("b.jpg")],
            UnknownImagePolicy::CreateNew,
            || id(9),
        )
        .unwrap_err();
        assert_eq!(err, ReconcileError::IdSourceExhausted);
    }

    #[test]
    fn operations_walk_deletes_then_updates_then_creates() {
        let existing = vec![stored(1, "a.jpg"), stored(2, "b.jpg")];
        let desired = vec![
            DesiredImage::new("new.jpg"),
            DesiredImage::existing(id(1), "a2.jpg"),
        ];
        let diff = run(&existing, &desired);

        let kinds: Vec<&str> = diff
            .operations()
            .map(|op| match op {
                ImageOp::Delete(_) => "delete",
                ImageOp::Update(_) => "update",
                ImageOp::Create(_) => "create",
            })
            .collect();
        assert_eq!(kinds, vec!["delete", "update", "create"]);
    }

    mod properties {
        use super::{counter, stored};
        use crate::model::image::{DesiredImage, ProductImage};
        use crate::reconcile::{reconcile, UnknownImagePolicy};
        use proptest::prelude::*;
        use std::collections::HashSet;
        use uuid::Uuid;

        // Desired entries: (Some(index into existing) | None | unknown, url).
        fn scenario() -> impl Strategy<Value = (Vec<ProductImage>, Vec<DesiredImage>)> {
            (0usize..6).prop_flat_map(|owned| {
                let existing: Vec<ProductImage> = (0..owned)
                    .map(|n| stored(n as u128 + 1, &format!("old-{n}.jpg")))
                    .collect();
                let entry = (0u8..3, 0u128..8, "[a-z]{1,6}\\.jpg");
                (
                    Just(existing),
                    prop::collection::vec(entry, 0..8).prop_map(move |entries| {
                        entries
                            .into_iter()
                            .map(|(kind, n, url)| match kind {
                                0 => DesiredImage::new(url),
                                1 => DesiredImage::existing(Uuid::from_u128(n % 6 + 1), url),
                                _ => DesiredImage::existing(Uuid::from_u128(500 + n), url),
                            })
                            .collect()
                    }),
                )
            })
        }

        proptest! {
            #[test]
            fn same_input_same_diff((existing, desired) in scenario()) {
                let first = reconcile(&existing, &desired, UnknownImagePolicy::CreateNew, counter(1000)).unwrap();
                let second = reconcile(&existing, &desired, UnknownImagePolicy::CreateNew, counter(1000)).unwrap();
                prop_assert_eq!(first, second);
            }

            #[test]
            fn unmentioned_images_are_deleted_exactly_once((existing, desired) in scenario()) {
                let diff = reconcile(&existing, &desired, UnknownImagePolicy::CreateNew, counter(1000)).unwrap();
                let mentioned: HashSet<Uuid> = desired.iter().filter_map(|entry| entry.id).collect();
                for image in &existing {
                    let hits = diff.to_delete.iter().filter(|id| **id == image.id).count();
                    prop_assert_eq!(hits, usize::from(!mentioned.contains(&image.id)));
                }
            }

            #[test]
            fn resolved_gallery_matches_desired_order((existing, desired) in scenario()) {
                let diff = reconcile(&existing, &desired, UnknownImagePolicy::CreateNew, counter(1000)).unwrap();
                prop_assert_eq!(diff.resolved.len(), desired.len());
                for (slot, entry) in diff.resolved.iter().zip(&desired) {
                    prop_assert_eq!(&slot.url, &entry.url);
                }
                let unique: HashSet<Uuid> = diff.order().into_iter().collect();
                prop_assert_eq!(unique.len(), desired.len());
            }

            #[test]
            fn creates_never_reuse_owned_ids((existing, desired) in scenario()) {
                let diff = reconcile(&existing, &desired, UnknownImagePolicy::CreateNew, counter(1000)).unwrap();
                let owned: HashSet<Uuid> = existing.iter().map(|image| image.id).collect();
                for create in &diff.to_create {
                    prop_assert!(!owned.contains(&create.id));
                }
                let mut claimed = HashSet::new();
                let creates_expected = desired
                    .iter()
                    .filter(|entry| match entry.id {
                        Some(id) => !(owned.contains(&id) && claimed.insert(id)),
                        None => true,
                    })
                    .count();
                prop_assert_eq!(diff.to_create.len(), creates_expected);
            }

            #[test]
            fn repeating_with_resolved_entries_is_a_no_op((existing, desired) in scenario()) {
                let diff = reconcile(&existing, &desired, UnknownImagePolicy::CreateNew, counter(1000)).unwrap();
                let product_id = Uuid::from_u128(0xABCD);
                let after: Vec<ProductImage> = diff
                    .resolved
                    .iter()
                    .map(|slot| ProductImage { id: slot.id, url: slot.url.clone(), product_id })
                    .collect();
                let again = reconcile(&after, &diff.resolved_entries(), UnknownImagePolicy::CreateNew, counter(5000)).unwrap();
                prop_assert!(again.is_empty());
                prop_assert_eq!(again.order(), diff.order());
            }
        }
    }
}

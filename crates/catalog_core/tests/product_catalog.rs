use catalog_core::db::open_db_in_memory;
use catalog_core::{
    Gender, NewProduct, PageRequest, ProductService, ProductServiceError, ProductValidationError,
    RepoError, ServiceOptions,
};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

fn input(title: &str) -> NewProduct {
    let mut input = NewProduct::new(title, Gender::Women);
    input.price = Some(35.0);
    input.sizes = vec!["S".to_string(), "M".to_string()];
    input
}

#[test]
fn create_stores_images_in_given_order_with_fresh_ids() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = ProductService::new(&mut conn, ServiceOptions::default());
    let owner = Uuid::new_v4();

    let mut new_product = input("Women's Cotton Tee");
    new_product.images = vec!["front.jpg".to_string(), "back.jpg".to_string()];
    new_product.user_id = Some(owner);
    let created = service.create_product(&new_product).unwrap();

    assert_eq!(created.slug, "womens_cotton_tee");
    assert_eq!(created.user_id, Some(owner));
    assert_eq!(created.image_urls(), vec!["front.jpg", "back.jpg"]);
    assert_ne!(created.images[0].id, created.images[1].id);
    assert!(created.created_at > 0);
}

#[test]
fn create_with_taken_title_is_conflict() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = ProductService::new(&mut conn, ServiceOptions::default());
    service.create_product(&input("Tote")).unwrap();

    let mut duplicate = input("Tote");
    duplicate.slug = Some("tote-2".to_string());
    duplicate.images = vec!["t.jpg".to_string()];
    let err = service.create_product(&duplicate).unwrap_err();

    assert!(matches!(err, ProductServiceError::Conflict(detail) if detail.contains("products.title")));
    drop(service);

    let images: i64 = conn
        .query_row("SELECT COUNT(*) FROM product_images;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(images, 0);
}

#[test]
fn create_rejects_slug_without_letters() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = ProductService::new(&mut conn, ServiceOptions::default());

    let mut bad = input("Tee");
    bad.slug = Some("!!!".to_string());
    let err = service.create_product(&bad).unwrap_err();
    assert!(matches!(
        err,
        ProductServiceError::Validation(ProductValidationError::EmptySlug)
    ));
}

#[test]
fn list_reports_page_metadata() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = ProductService::new(&mut conn, ServiceOptions::default());
    let titles: Vec<String> = (0..7).map(|n| format!("Item {n}")).collect();
    for title in &titles {
        service.create_product(&input(title)).unwrap();
    }

    let page = service
        .list_products(&PageRequest {
            limit: Some(3),
            offset: 3,
        })
        .unwrap();
    assert_eq!(page.total_items, 7);
    assert_eq!(page.page_size, 3);
    assert_eq!(page.current_page, 2);
    assert_eq!(page.total_pages, 3);
    let listed: Vec<&str> = page.items.iter().map(|item| item.title.as_str()).collect();
    assert_eq!(listed, vec!["Item 3", "Item 4", "Item 5"]);

    let defaulted = service.list_products(&PageRequest::default()).unwrap();
    assert_eq!(defaulted.page_size, 10);
    assert_eq!(defaulted.total_pages, 1);
    assert_eq!(defaulted.items.len(), 7);

    let capped = service
        .list_products(&PageRequest {
            limit: Some(500),
            offset: 0,
        })
        .unwrap();
    assert_eq!(capped.page_size, 50);
}

#[test]
fn list_of_empty_catalog_has_zero_pages() {
    let mut conn = open_db_in_memory().unwrap();
    let service = ProductService::new(&mut conn, ServiceOptions::default());

    let page = service.list_products(&PageRequest::default()).unwrap();
    assert!(page.items.is_empty());
    assert_eq!(page.total_items, 0);
    assert_eq!(page.total_pages, 0);
    assert_eq!(page.current_page, 1);
}

#[test]
fn plain_lookup_flattens_images_to_urls() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = ProductService::new(&mut conn, ServiceOptions::default());
    let mut new_product = input("Skirt");
    new_product.images = vec!["s1.jpg".to_string(), "s2.jpg".to_string()];
    service.create_product(&new_product).unwrap();

    let plain = service.find_product_plain("skirt").unwrap();
    assert_eq!(plain.images, vec!["s1.jpg", "s2.jpg"]);

    let value = serde_json::to_value(&plain).unwrap();
    assert_eq!(value["images"], json!(["s1.jpg", "s2.jpg"]));
    assert_eq!(value["gender"], json!("women"));
}

#[test]
fn remove_deletes_product_and_images() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = ProductService::new(&mut conn, ServiceOptions::default());
    let mut new_product = input("Dress");
    new_product.images = vec!["d.jpg".to_string()];
    let created = service.create_product(&new_product).unwrap();

    service.remove_product(created.id).unwrap();
    assert!(matches!(
        service.find_product("Dress"),
        Err(ProductServiceError::ProductNotFound(_))
    ));
    assert!(matches!(
        service.remove_product(created.id),
        Err(ProductServiceError::ProductNotFound(_))
    ));
    drop(service);

    let images: i64 = conn
        .query_row("SELECT COUNT(*) FROM product_images;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(images, 0);
}

#[test]
fn delete_all_empties_catalog() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = ProductService::new(&mut conn, ServiceOptions::default());
    for title in ["A", "B", "C"] {
        let mut new_product = input(title);
        new_product.images = vec![format!("{title}.jpg")];
        service.create_product(&new_product).unwrap();
    }

    assert_eq!(service.delete_all_products().unwrap(), 3);
    assert_eq!(service.delete_all_products().unwrap(), 0);
    assert_eq!(
        service
            .list_products(&PageRequest::default())
            .unwrap()
            .total_items,
        0
    );
}

#[test]
fn try_new_requires_migrated_connection() {
    let mut raw = Connection::open_in_memory().unwrap();
    let err = ProductService::try_new(&mut raw, ServiceOptions::default())
        .err()
        .unwrap();
    assert!(matches!(err, RepoError::UninitializedConnection { .. }));

    let mut conn = open_db_in_memory().unwrap();
    assert!(ProductService::try_new(&mut conn, ServiceOptions::default()).is_ok());
}

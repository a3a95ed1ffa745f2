//! CLI probe for the catalog core.
//!
//! # Responsibility
//! - Verify `catalog_core` linkage and open a catalog database.
//! - Print one product looked up by id, title or slug as JSON.
//!
//! Usage: `catalog_cli <db-path> <term>` or `catalog_cli --config <file> <term>`.

use catalog_core::{CatalogConfig, ProductService, ProductServiceError};
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("catalog_core version={}", catalog_core::core_version());

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (config, term) = match parse_args(&args) {
        Ok(parsed) => parsed,
        Err(message) => {
            eprintln!("{message}");
            eprintln!("usage: catalog_cli <db-path> <term> | catalog_cli --config <file> <term>");
            return ExitCode::from(2);
        }
    };

    match run(&config, &term) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn parse_args(args: &[String]) -> Result<(CatalogConfig, String), String> {
    match args {
        [flag, path, term] if flag == "--config" => CatalogConfig::from_json_file(path)
            .map(|config| (config, term.clone()))
            .map_err(|err| err.to_string()),
        [db_path, term] => Ok((
            CatalogConfig {
                db_path: Some(PathBuf::from(db_path)),
                ..CatalogConfig::default()
            },
            term.clone(),
        )),
        _ => Err("expected a database and a lookup term".to_string()),
    }
}

fn run(config: &CatalogConfig, term: &str) -> Result<String, String> {
    config.init_logging().map_err(|err| err.to_string())?;
    let mut conn = config.open_db().map_err(|err| err.to_string())?;
    let service = ProductService::try_new(&mut conn, config.service_options())
        .map_err(|err| err.to_string())?;

    match service.find_product_plain(term) {
        Ok(product) => serde_json::to_string_pretty(&product).map_err(|err| err.to_string()),
        Err(ProductServiceError::ProductNotFound(term)) => {
            Err(format!("no product matches `{term}`"))
        }
        Err(err) => Err(err.to_string()),
    }
}

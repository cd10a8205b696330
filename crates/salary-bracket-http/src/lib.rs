//! HTTP adapter and command-line front end for the salary bracket engine.

pub mod config;
pub mod http_client;
pub mod listing;

pub use config::{resolve_credentials, resolve_db_path, resolve_host, HttpConfig};
pub use http_client::{HttpClient, HttpResponse};
pub use listing::{decode_listing_page, search_form, ListingSource};

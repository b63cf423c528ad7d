pub mod app;
pub mod biolink;
pub mod config;
pub mod domain;
pub mod error;
pub mod extract;
pub mod fs_util;
pub mod kgx;
pub mod output;
pub mod phenopacket;
pub mod record;
pub mod registry;
pub mod store;
pub mod transform;
pub mod tui;

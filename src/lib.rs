//! A small blocking Rust client for the HydroShare REST API (`/hsapi`).
//!
//! Each method maps onto one endpoint: resource discovery, system and science metadata,
//! resource files and folders, sharing flags and BagIt archive downloads.
//!
//! ## Quick start
//! - Configure the server and credentials via environment variables (`HS_HOST`,
//!   `HS_USERNAME`, `HS_PASSWORD`, optionally `HS_CLIENT_ID`/`HS_CLIENT_SECRET` for OAuth2)
//!   or a `.hsrc` file (current directory or home directory), then call
//!   [`HydroShare::from_env`].
//! - Or build a [`ClientConfig`] explicitly and call [`HydroShare::new`].
//!
//! ```no_run
//! use hsclient::{Auth, ClientConfig, HydroShare, Overwrite, ResourceFilter};
//! use std::path::Path;
//!
//! fn main() -> hsclient::Result<()> {
//!     let cfg = ClientConfig::default().with_auth(Auth::basic("me", "secret"));
//!     let hs = HydroShare::new(cfg)?;
//!
//!     for resource in hs.get_resource_list(&ResourceFilter::new().creator("bmiles"))? {
//!         let resource = resource?;
//!         println!("{} {}", resource["resource_id"], resource["resource_title"]);
//!     }
//!
//!     hs.get_resource(
//!         "e62a438bec384087b6c00ddcd1b6475a",
//!         Path::new("."),
//!         Some(Overwrite::Replace),
//!     )?;
//!     Ok(())
//! }
//! ```
//!
//! Credentials are only ever sent over HTTPS. OAuth2 tokens are not refreshed by the
//! client: when a token expires, requests fail with [`Error::NotAuthorized`] and a new
//! client has to be built.

#![forbid(unsafe_code)]

mod auth;
mod bag;
mod client;
mod config;
mod download;
mod error;
mod pages;
mod query;
mod resource;

pub use auth::{Auth, OAuth2Credentials, OAuth2Grant, OAuth2Token};
pub use client::HydroShare;
pub use config::{ClientConfig, DEFAULT_HOST};
pub use download::{ByteStream, Overwrite, STREAM_CHUNK_SIZE, extract_zip};
pub use error::{Error, Result};
pub use pages::Pages;
pub use query::ResourceFilter;
pub use resource::{Flag, NewResource, UploadFile};

//! Command implementations
//!
//! Each module backs one binary in `src/bin/`.

pub mod auth_login;
pub mod download;

pub use auth_login::run as auth_login_run;
pub use download::{run as download_run, DownloadRequest};

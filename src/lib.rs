//! Managed file redirection.
//!
//! This crate ties the workspace together:
//!
//! * [`fs`] decides where a path really lives and merges directory listings,
//! * [`config`] loads the per-package redirection document,
//! * [`shim`] exposes Win32-shaped entry points for an interception layer.

pub use redirect_config as config;
pub use redirect_fs as fs;
pub use redirect_shim as shim;

//! The boundary between intercepted OS file APIs and the redirection engine.
//!
//! An interception layer (hooking is not part of this crate) forwards each
//! call to a [`Shim`] entry point and acts on the returned [`Outcome`]:
//! return the value, fail with the recorded Win32 error, or call the original
//! OS function.

mod error;
mod guard;
pub mod rewrite;
mod shim;

pub use crate::error::{last_error, set_last_error, Win32Error};
pub use crate::guard::ReentrancyGuard;
pub use crate::rewrite::rewrite_command_line;
pub use crate::shim::{
    global, install, Access, CreationDisposition, FindId, Outcome, ProcessLaunch, Shim, CONFIG_ENV,
    HOST_ROOT_ENV,
};

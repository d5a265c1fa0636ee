//! Interception shim between a libretro frontend and its core.
//!
//! The frontend routes whitelisted core entry points through
//! `retro_script_intercept_*`, which lets the shim run Lua scripts around the
//! core's lifecycle and hand debugger breakpoints to whichever script claimed
//! them. Everything the C side sees lives in [`ffi`]; the rest is plain Rust
//! and usable on its own through [`Shim`].

pub mod abi;
pub mod binding;
pub mod config;
pub mod error;
pub mod ffi;
pub mod hooks;
pub mod registry;
pub mod script;
pub mod shim;

/// A function placed in every script's `retro` table, registered with
/// `#[export]` and collected via `inventory`.
pub struct ScriptExport {
    pub name: &'static str,
    pub install: fn(&mlua::Lua) -> mlua::Result<mlua::Function>,
}

inventory::collect!(ScriptExport);

pub use config::ShimConfig;
pub use error::{LastError, ShimError};
pub use ffi::API_VERSION;
pub use registry::{Handle, HandleMap};
pub use script::{ScriptError, ScriptId};
pub use shim::Shim;

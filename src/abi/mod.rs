//! C ABI types shared with the frontend and the core.
//!
//! `libretro` mirrors the subset of `libretro.h` the shim touches; `hc`
//! mirrors the hackable-console debugger interface (`hcdebug.h`) that cores
//! expose through `retro_get_proc_address`.

pub mod hc;
pub mod libretro;

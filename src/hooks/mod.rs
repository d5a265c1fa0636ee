pub mod breakpoint;
pub mod intercept;

pub use breakpoint::{BreakpointCallback, BreakpointEntry, BreakpointUserdata, Breakpoints, Route};
pub use intercept::{EntryPoint, Intercepts, Layer, Slot};

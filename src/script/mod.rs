//! Script instances and the engine seam.
//!
//! [`Scripts`] hands out script handles, keeps the uncaught-error handler and
//! fans hooks out to every live script. Running the scripts is the engine's
//! job ([`ScriptEngine`]); the built-in one is [`lua::LuaEngine`].

pub mod exports;
pub mod lua;

use std::ffi::{CString, c_char, c_int};
use std::path::{Path, PathBuf};

use log::{debug, error, info};
use thiserror::Error;

use crate::binding::CoreView;
use crate::registry::{Handle, HandleMap};

pub type ScriptId = u32;

/// Returned in place of a handle when a script fails to load.
pub const INVALID_SCRIPT: ScriptId = 0;

// Status codes reported to the uncaught-error handler, matching Lua's.
pub const STATUS_RUNTIME: c_int = 2;
pub const STATUS_SYNTAX: c_int = 3;
pub const STATUS_MEMORY: c_int = 4;
pub const STATUS_ERROR_HANDLER: c_int = 5;
pub const STATUS_FILE: c_int = 6;

pub type UncaughtErrorFn =
    unsafe extern "C" fn(script_id: ScriptId, status: c_int, message: *const c_char);

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("setup callback rejected {}", .0.display())]
    Setup(PathBuf),
    #[error("{message}")]
    Lua { status: c_int, message: String },
    #[error("no script with handle {0}")]
    UnknownScript(ScriptId),
    #[error("no free script handles")]
    Exhausted,
}

impl ScriptError {
    pub fn status(&self) -> c_int {
        match self {
            ScriptError::Io { .. } => STATUS_FILE,
            ScriptError::Lua { status, .. } => *status,
            ScriptError::Setup(_) | ScriptError::UnknownScript(_) => STATUS_RUNTIME,
            ScriptError::Exhausted => STATUS_MEMORY,
        }
    }
}

/// Named points in the core's lifecycle at which scripts are called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    Init,
    RunBegin,
    RunEnd,
    Unload,
}

impl Hook {
    pub fn name(self) -> &'static str {
        match self {
            Hook::Init => "on_init",
            Hook::RunBegin => "on_run_begin",
            Hook::RunEnd => "on_run_end",
            Hook::Unload => "on_unload",
        }
    }
}

pub trait ScriptEngine {
    /// Frontend-supplied preparation run before the script body executes.
    type Setup;

    fn load(
        &mut self,
        id: ScriptId,
        path: &Path,
        setup: Option<Self::Setup>,
        view: &CoreView,
    ) -> Result<(), ScriptError>;

    /// Call `hook` in one script. Scripts without that hook succeed.
    fn dispatch(&mut self, id: ScriptId, hook: Hook, view: &CoreView) -> Result<(), ScriptError>;

    fn unload(&mut self, id: ScriptId);
}

/// A script error nobody caught, waiting to be reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFailure {
    pub script: ScriptId,
    pub status: c_int,
    pub message: String,
}

impl ScriptFailure {
    fn new(script: ScriptId, err: &ScriptError) -> Self {
        Self {
            script,
            status: err.status(),
            message: err.to_string(),
        }
    }

    /// Hand the failure to `handler`, or log it when none is installed.
    pub fn report(&self, handler: Option<UncaughtErrorFn>) {
        match handler {
            Some(handler) => {
                let message = CString::new(self.message.replace('\0', " ")).unwrap_or_default();
                // SAFETY: frontend-installed handler; `message` outlives the call.
                unsafe { handler(self.script, self.status, message.as_ptr()) };
            }
            None => error!(
                "script {} failed with status {}: {}",
                self.script, self.status, self.message
            ),
        }
    }
}

#[derive(Debug)]
struct ScriptRecord {
    path: PathBuf,
}

pub struct Scripts<E: ScriptEngine> {
    engine: E,
    live: HandleMap<ScriptId, ScriptRecord>,
    next_id: ScriptId,
    uncaught: Option<UncaughtErrorFn>,
}

impl<E: ScriptEngine> Scripts<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            live: HandleMap::new(),
            next_id: 1,
            uncaught: None,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn uncaught_handler(&self) -> Option<UncaughtErrorFn> {
        self.uncaught
    }

    pub fn set_uncaught_handler(&mut self, handler: Option<UncaughtErrorFn>) {
        self.uncaught = handler;
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn contains(&self, id: ScriptId) -> bool {
        self.live.contains(id)
    }

    pub fn path(&self, id: ScriptId) -> Option<&Path> {
        self.live.get(id).map(|record| record.path.as_path())
    }

    fn allocate_id(&mut self) -> Result<ScriptId, ScriptError> {
        for _ in 0..=ScriptId::MAX {
            let candidate = self.next_id;
            self.next_id = self.next_id.wrapping_add(1);
            if candidate.is_valid() && !self.live.contains(candidate) {
                return Ok(candidate);
            }
        }
        Err(ScriptError::Exhausted)
    }

    pub fn load(
        &mut self,
        path: &Path,
        setup: Option<E::Setup>,
        view: &CoreView,
    ) -> Result<ScriptId, ScriptError> {
        let id = self.allocate_id()?;
        self.engine.load(id, path, setup, view)?;
        if self
            .live
            .add(id, ScriptRecord { path: path.to_path_buf() })
            .is_none()
        {
            self.engine.unload(id);
            return Err(ScriptError::Exhausted);
        }
        info!("loaded script {id} from {}", path.display());
        Ok(id)
    }

    /// Run `on_unload` in one script and drop it.
    pub fn unload(
        &mut self,
        id: ScriptId,
        view: &CoreView,
    ) -> Result<Option<ScriptFailure>, ScriptError> {
        if !self.live.contains(id) {
            return Err(ScriptError::UnknownScript(id));
        }
        let failure = self
            .engine
            .dispatch(id, Hook::Unload, view)
            .err()
            .map(|err| ScriptFailure::new(id, &err));
        self.engine.unload(id);
        self.live.remove(id);
        info!("unloaded script {id}");
        Ok(failure)
    }

    /// Run `hook` in every live script, oldest handle first.
    pub fn dispatch(&mut self, hook: Hook, view: &CoreView) -> Vec<ScriptFailure> {
        let mut ids: Vec<ScriptId> = self.live.handles().collect();
        ids.sort_unstable();
        ids.into_iter()
            .filter_map(|id| {
                self.engine
                    .dispatch(id, hook, view)
                    .err()
                    .map(|err| ScriptFailure::new(id, &err))
            })
            .collect()
    }

    /// Run `on_unload` in every script, then drop them all.
    pub fn unload_all(&mut self, view: &CoreView) -> Vec<ScriptFailure> {
        let failures = self.dispatch(Hook::Unload, view);
        self.reset();
        failures
    }

    /// Drop every script without running hooks. Handlers stay installed.
    pub fn reset(&mut self) {
        for (id, _) in self.live.drain() {
            self.engine.unload(id);
        }
        self.next_id = 1;
        debug!("script table reset");
    }
}

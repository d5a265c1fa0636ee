//! Lua 5.4 script engine. Every script runs in a state of its own.

use std::ffi::c_int;
use std::path::Path;

use log::debug;
use mlua::{Function, Lua, Table, ffi};

use super::{
    Hook, STATUS_MEMORY, STATUS_RUNTIME, STATUS_SYNTAX, ScriptEngine, ScriptError, ScriptId,
};
use crate::ScriptExport;
use crate::abi::libretro;
use crate::binding::CoreView;
use crate::registry::HandleMap;

/// Raw setup callback: receives the script's state with the `retro` table on
/// top of the stack. A nonzero return accepts the script.
pub type SetupLuaFn = unsafe extern "C" fn(state: *mut ffi::lua_State) -> c_int;

/// Message handler for script errors. It runs at the point of the error,
/// before the stack unwinds, so it can build a traceback.
pub type LuaErrorHandler = ffi::lua_CFunction;

type NativeSetup = Box<dyn FnOnce(&Lua, &Table) -> mlua::Result<bool> + Send>;

pub enum LuaSetup {
    Raw(SetupLuaFn),
    Native(NativeSetup),
}

impl From<mlua::Error> for ScriptError {
    fn from(err: mlua::Error) -> Self {
        let status = match &err {
            mlua::Error::SyntaxError { .. } => STATUS_SYNTAX,
            mlua::Error::MemoryError(_) => STATUS_MEMORY,
            _ => STATUS_RUNTIME,
        };
        ScriptError::Lua {
            status,
            message: err.to_string(),
        }
    }
}

#[derive(Default)]
pub struct LuaEngine {
    states: HandleMap<ScriptId, Lua>,
    error_handler: Option<LuaErrorHandler>,
}

impl LuaEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error_handler(&self) -> Option<LuaErrorHandler> {
        self.error_handler
    }

    pub fn set_error_handler(&mut self, handler: Option<LuaErrorHandler>) {
        self.error_handler = handler;
    }

    pub fn state(&self, id: ScriptId) -> Option<&Lua> {
        self.states.get(id)
    }
}

fn retro_table(lua: &Lua, id: ScriptId) -> mlua::Result<Table> {
    let retro = lua.create_table()?;
    retro.set("script_id", id)?;
    retro.set("MEMORY_SAVE_RAM", libretro::MEMORY_SAVE_RAM)?;
    retro.set("MEMORY_RTC", libretro::MEMORY_RTC)?;
    retro.set("MEMORY_SYSTEM_RAM", libretro::MEMORY_SYSTEM_RAM)?;
    retro.set("MEMORY_VIDEO_RAM", libretro::MEMORY_VIDEO_RAM)?;
    for export in inventory::iter::<ScriptExport> {
        retro.set(export.name, (export.install)(lua)?)?;
    }
    Ok(retro)
}

fn run_setup(lua: &Lua, retro: &Table, setup: LuaSetup) -> mlua::Result<bool> {
    match setup {
        LuaSetup::Native(setup) => setup(lua, retro),
        LuaSetup::Raw(setup) => {
            let mut accepted = false;
            // SAFETY: the callback follows the Lua C API and only sees the
            // state for the duration of this call.
            unsafe {
                lua.exec_raw::<()>(retro.clone(), |state| {
                    accepted = setup(state) != 0;
                })?;
            }
            Ok(accepted)
        }
    }
}

/// Call `function` with no arguments. With a handler installed the call goes
/// through `lua_pcall` with the handler as message handler, and the Lua
/// status is kept as is.
fn call(
    lua: &Lua,
    function: Function,
    handler: Option<LuaErrorHandler>,
) -> Result<(), ScriptError> {
    let Some(handler) = handler else {
        return function.call::<()>(()).map_err(ScriptError::from);
    };
    // SAFETY: the stack holds only `function` on entry. Everything left on
    // it afterwards is read back as `(status, message)`.
    let (status, message): (c_int, Option<String>) = unsafe {
        lua.exec_raw(function, |state| {
            ffi::lua_pushcfunction(state, handler);
            ffi::lua_insert(state, 1);
            let status = ffi::lua_pcall(state, 0, 0, 1);
            if status == ffi::LUA_OK {
                ffi::lua_settop(state, 0);
                ffi::lua_pushinteger(state, 0);
                return;
            }
            ffi::luaL_tolstring(state, -1, std::ptr::null_mut());
            ffi::lua_pushinteger(state, ffi::lua_Integer::from(status));
            ffi::lua_insert(state, 1);
            // [status, handler, error, text] -> [status, text]
            ffi::lua_remove(state, 2);
            ffi::lua_remove(state, 2);
        })?
    };
    if status == ffi::LUA_OK {
        return Ok(());
    }
    Err(ScriptError::Lua {
        status,
        message: message.unwrap_or_default(),
    })
}

impl ScriptEngine for LuaEngine {
    type Setup = LuaSetup;

    fn load(
        &mut self,
        id: ScriptId,
        path: &Path,
        setup: Option<LuaSetup>,
        view: &CoreView,
    ) -> Result<(), ScriptError> {
        let source = std::fs::read(path).map_err(|source| ScriptError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let lua = Lua::new();
        lua.set_app_data(*view);
        let retro = retro_table(&lua, id)?;
        lua.globals().set("retro", &retro)?;

        if let Some(setup) = setup
            && !run_setup(&lua, &retro, setup)?
        {
            return Err(ScriptError::Setup(path.to_path_buf()));
        }

        let chunk = lua
            .load(source)
            .set_name(format!("@{}", path.display()))
            .into_function()?;
        call(&lua, chunk, self.error_handler)?;

        self.states.add(id, lua).ok_or(ScriptError::Exhausted)?;
        debug!("lua state {id} ready");
        Ok(())
    }

    fn dispatch(&mut self, id: ScriptId, hook: Hook, view: &CoreView) -> Result<(), ScriptError> {
        let lua = self.states.get(id).ok_or(ScriptError::UnknownScript(id))?;
        lua.set_app_data(*view);

        let retro: Option<Table> = lua.globals().get("retro")?;
        let Some(retro) = retro else {
            return Ok(());
        };
        let callback: Option<Function> = retro.get(hook.name())?;
        let Some(callback) = callback else {
            return Ok(());
        };
        call(lua, callback, self.error_handler)
    }

    fn unload(&mut self, id: ScriptId) {
        if self.states.remove(id) {
            debug!("lua state {id} closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{STATUS_ERROR_HANDLER, STATUS_FILE};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn script(source: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(source.as_bytes()).expect("write script");
        file
    }

    #[test]
    fn hooks_run_in_their_own_state() {
        let a = script("count = 0\nretro.on_run_begin = function() count = count + 1 end");
        let b = script("count = 100");
        let view = CoreView::default();

        let mut engine = LuaEngine::new();
        engine.load(1, a.path(), None, &view).expect("load a");
        engine.load(2, b.path(), None, &view).expect("load b");

        engine.dispatch(1, Hook::RunBegin, &view).expect("hook a");
        engine.dispatch(1, Hook::RunBegin, &view).expect("hook a");
        engine.dispatch(2, Hook::RunBegin, &view).expect("missing hook is skipped");

        let count: i64 = engine.state(1).unwrap().globals().get("count").unwrap();
        assert_eq!(count, 2);
        let count: i64 = engine.state(2).unwrap().globals().get("count").unwrap();
        assert_eq!(count, 100);
    }

    #[test]
    fn retro_table_carries_id_and_exports() {
        let file = script("seen = retro.script_id\nhas_log = type(retro.log) == 'function'");
        let mut engine = LuaEngine::new();
        engine.load(7, file.path(), None, &CoreView::default()).expect("load");

        let globals = engine.state(7).unwrap().globals();
        assert_eq!(globals.get::<u32>("seen").unwrap(), 7);
        assert!(globals.get::<bool>("has_log").unwrap());
    }

    #[test]
    fn syntax_and_file_errors_carry_status() {
        let mut engine = LuaEngine::new();
        let view = CoreView::default();

        let broken = script("this is not lua");
        let err = engine.load(1, broken.path(), None, &view).unwrap_err();
        assert_eq!(err.status(), STATUS_SYNTAX);

        let err = engine
            .load(2, Path::new("/nonexistent/script.lua"), None, &view)
            .unwrap_err();
        assert_eq!(err.status(), STATUS_FILE);
        assert!(engine.state(1).is_none());
        assert!(engine.state(2).is_none());
    }

    #[test]
    fn runtime_error_in_hook() {
        let file = script("retro.on_init = function() error('no rom') end");
        let mut engine = LuaEngine::new();
        let view = CoreView::default();
        engine.load(1, file.path(), None, &view).expect("load");

        let err = engine.dispatch(1, Hook::Init, &view).unwrap_err();
        assert_eq!(err.status(), STATUS_RUNTIME);
        assert!(err.to_string().contains("no rom"));
    }

    unsafe extern "C-unwind" fn tag_message(state: *mut ffi::lua_State) -> c_int {
        unsafe {
            ffi::lua_pushstring(state, c"handled".as_ptr());
        }
        1
    }

    unsafe extern "C-unwind" fn with_traceback(state: *mut ffi::lua_State) -> c_int {
        unsafe {
            let message = ffi::lua_tostring(state, 1);
            ffi::luaL_traceback(state, state, message, 1);
        }
        1
    }

    unsafe extern "C-unwind" fn rethrow(state: *mut ffi::lua_State) -> c_int {
        unsafe { ffi::lua_error(state) }
    }

    #[test]
    fn error_handler_rewrites_message() {
        let file = script("retro.on_run_end = function() error('raw') end");
        let mut engine = LuaEngine::new();
        let view = CoreView::default();
        engine.set_error_handler(Some(tag_message));
        engine.load(1, file.path(), None, &view).expect("load");

        let err = engine.dispatch(1, Hook::RunEnd, &view).unwrap_err();
        assert_eq!(err.to_string(), "handled");
        assert_eq!(err.status(), STATUS_RUNTIME);
    }

    #[test]
    fn error_handler_sees_the_failing_frame() {
        let file = script(
            "function explode() error('boom') end\n\
             retro.on_run_begin = function() explode() end",
        );
        let mut engine = LuaEngine::new();
        let view = CoreView::default();
        engine.set_error_handler(Some(with_traceback));
        engine.load(1, file.path(), None, &view).expect("load");

        let message = engine.dispatch(1, Hook::RunBegin, &view).unwrap_err().to_string();
        assert!(message.contains("boom"), "{message}");
        assert!(message.contains("stack traceback"), "{message}");
        assert!(message.contains("explode"), "{message}");
    }

    #[test]
    fn failing_error_handler_reports_its_own_status() {
        let file = script("error('load time')");
        let mut engine = LuaEngine::new();
        engine.set_error_handler(Some(rethrow));
        let err = engine
            .load(1, file.path(), None, &CoreView::default())
            .unwrap_err();
        assert_eq!(err.status(), STATUS_ERROR_HANDLER);
        assert!(engine.state(1).is_none());
    }

    #[test]
    fn error_handler_leaves_syntax_errors_alone() {
        let file = script("this is not lua");
        let mut engine = LuaEngine::new();
        engine.set_error_handler(Some(tag_message));
        let err = engine
            .load(1, file.path(), None, &CoreView::default())
            .unwrap_err();
        assert_eq!(err.status(), STATUS_SYNTAX);
        assert_ne!(err.to_string(), "handled");
    }

    #[test]
    fn native_setup_can_reject_or_prepare() {
        let file = script("result = retro.greeting .. ' world'");
        let mut engine = LuaEngine::new();
        let view = CoreView::default();

        let reject = LuaSetup::Native(Box::new(|_, _| Ok(false)));
        let err = engine.load(1, file.path(), Some(reject), &view).unwrap_err();
        assert!(matches!(err, ScriptError::Setup(_)));

        let prepare = LuaSetup::Native(Box::new(|_, retro| {
            retro.set("greeting", "hello")?;
            Ok(true)
        }));
        engine.load(2, file.path(), Some(prepare), &view).expect("load");
        let result: String = engine.state(2).unwrap().globals().get("result").unwrap();
        assert_eq!(result, "hello world");
    }

    unsafe extern "C" fn accept_raw(state: *mut ffi::lua_State) -> c_int {
        unsafe {
            ffi::lua_pushinteger(state, 5);
            ffi::lua_setfield(state, -2, c"from_setup".as_ptr());
        }
        1
    }

    #[test]
    fn raw_setup_sees_the_retro_table() {
        let file = script("copied = retro.from_setup");
        let mut engine = LuaEngine::new();
        engine
            .load(3, file.path(), Some(LuaSetup::Raw(accept_raw)), &CoreView::default())
            .expect("load");
        let copied: i64 = engine.state(3).unwrap().globals().get("copied").unwrap();
        assert_eq!(copied, 5);
    }

    #[test]
    fn unload_drops_the_state() {
        let file = script("");
        let mut engine = LuaEngine::new();
        engine.load(1, file.path(), None, &CoreView::default()).expect("load");
        engine.unload(1);
        assert!(engine.state(1).is_none());
        assert!(matches!(
            engine.dispatch(1, Hook::Init, &CoreView::default()),
            Err(ScriptError::UnknownScript(1))
        ));
    }
}

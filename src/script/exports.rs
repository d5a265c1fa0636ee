//! Functions placed in every script's `retro` table.

use std::ffi::c_uint;

use log::info;
use mlua::Lua;
use retro_script_macros::export;

use crate::binding::CoreView;

fn view(lua: &Lua) -> CoreView {
    lua.app_data_ref::<CoreView>()
        .map(|view| *view)
        .unwrap_or_default()
}

/// `retro.read_memory(region, offset)`: the byte, or nil when out of range.
#[export]
fn read_memory(lua: &Lua, (region, offset): (c_uint, usize)) -> mlua::Result<Option<u8>> {
    Ok(view(lua).read_byte(region, offset))
}

/// `retro.write_memory(region, offset, value)`: true when the byte was written.
#[export]
fn write_memory(lua: &Lua, (region, offset, value): (c_uint, usize, u8)) -> mlua::Result<bool> {
    Ok(view(lua).write_byte(region, offset, value))
}

#[export]
fn memory_size(lua: &Lua, region: c_uint) -> mlua::Result<usize> {
    Ok(view(lua).memory_size(region))
}

/// `retro.input_state(port, device, index, id)` through the frontend's callback.
#[export]
fn input_state(
    lua: &Lua,
    (port, device, index, id): (c_uint, c_uint, c_uint, c_uint),
) -> mlua::Result<i16> {
    Ok(view(lua).input_state(port, device, index, id))
}

#[export]
fn poll_input(lua: &Lua, (): ()) -> mlua::Result<bool> {
    Ok(view(lua).poll_input())
}

#[export(name = "log")]
fn script_log(_: &Lua, message: String) -> mlua::Result<()> {
    info!(target: "retro_script::lua", "{message}");
    Ok(())
}

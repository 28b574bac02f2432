//! Native capabilities exposed to transform scripts.
//!
//! Scripts get a global `json` table backed by `serde_json`, so structured
//! bodies can be decoded, edited as Lua tables, and re-encoded:
//!
//! ```lua
//! function transform(body)
//!   local doc = json.decode(body)
//!   doc.processed = true
//!   return json.encode(doc)
//! end
//! ```

use mlua::{Lua, LuaSerdeExt, Result as LuaResult};

/// Name of the global table holding the JSON codec.
pub const JSON_GLOBAL: &str = "json";

/// Install the `json` table (`json.decode`, `json.encode`) into the globals.
pub fn install_json_codec(lua: &Lua) -> LuaResult<()> {
    let json = lua.create_table()?;

    let decode = lua.create_function(|lua, text: mlua::String| {
        let value: serde_json::Value =
            serde_json::from_slice(&text.as_bytes()).map_err(mlua::Error::external)?;
        lua.to_value(&value)
    })?;

    let encode = lua.create_function(|lua, value: mlua::Value| {
        let value: serde_json::Value = lua.from_value(value)?;
        let encoded = serde_json::to_vec(&value).map_err(mlua::Error::external)?;
        lua.create_string(encoded)
    })?;

    json.set("decode", decode)?;
    json.set("encode", encode)?;
    // Scripts compare decoded nulls against `json.null`.
    json.set("null", lua.null())?;

    lua.globals().set(JSON_GLOBAL, json)
}

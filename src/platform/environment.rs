//! Runtime environment detection and build-time default lookup.

use std::env;
use std::fs;

use serde_json::{Map, Value};

/// Returns the parsed `__SHOP_LOGIN_DEFAULTS__` object when available.
///
/// Sources, in order: the environment variable itself, a JSON file named by
/// `__SHOP_LOGIN_DEFAULTS_PATH`, and on `wasm-web` builds a global of the same name.
pub fn shop_login_defaults() -> Option<Map<String, Value>> {
    defaults_from_env()
        .or_else(defaults_from_path)
        .or_else(defaults_from_global)
        .and_then(|value| match value {
            Value::Object(map) => Some(map),
            _ => None,
        })
}

fn defaults_from_env() -> Option<Value> {
    let raw = env::var("__SHOP_LOGIN_DEFAULTS__").ok()?;
    parse_json_value(&raw)
}

fn defaults_from_path() -> Option<Value> {
    let path = env::var("__SHOP_LOGIN_DEFAULTS_PATH").ok()?;
    let content = fs::read_to_string(path).ok()?;
    parse_json_value(&content)
}

#[cfg(all(target_arch = "wasm32", feature = "wasm-web"))]
fn defaults_from_global() -> Option<Value> {
    use wasm_bindgen::JsValue;

    let global = js_sys::global();
    let value =
        js_sys::Reflect::get(&global, &JsValue::from_str("__SHOP_LOGIN_DEFAULTS__")).ok()?;
    if value.is_null() || value.is_undefined() {
        return None;
    }
    let serialized = js_sys::JSON::stringify(&value).ok()?.as_string()?;
    parse_json_value(&serialized)
}

#[cfg(not(all(target_arch = "wasm32", feature = "wasm-web")))]
fn defaults_from_global() -> Option<Value> {
    None
}

fn parse_json_value(raw: &str) -> Option<Value> {
    serde_json::from_str::<Value>(raw).ok()
}

/// Looks up `key` in the defaults object first, then in the process environment.
pub fn setting(key: &str) -> Option<String> {
    shop_login_defaults()
        .and_then(|defaults| defaults.get(key).and_then(Value::as_str).map(str::to_owned))
        .or_else(|| env::var(key).ok())
        .filter(|value| !value.is_empty())
}

/// `true` when the SDK was built for a spin development instance.
pub fn is_spin() -> bool {
    setting("SHOP_LOGIN_ENV").is_some_and(|value| value.eq_ignore_ascii_case("spin"))
}

/// Current `navigator.userAgent`, or `SHOP_LOGIN_USER_AGENT` outside the browser.
pub fn user_agent() -> String {
    #[cfg(all(target_arch = "wasm32", feature = "wasm-web"))]
    {
        if let Some(agent) = web_sys::window().and_then(|window| window.navigator().user_agent().ok())
        {
            return agent;
        }
    }

    env::var("SHOP_LOGIN_USER_AGENT").unwrap_or_default()
}

pub fn is_mobile_user_agent(user_agent: &str) -> bool {
    const MARKERS: &[&str] = &["Android", "iPhone", "iPad", "iPod", "Mobile", "Opera Mini"];
    MARKERS.iter().any(|marker| user_agent.contains(marker))
}

/// Returns `true` when running inside a browser window.
pub fn is_browser() -> bool {
    #[cfg(all(target_arch = "wasm32", feature = "wasm-web"))]
    {
        web_sys::window().is_some()
    }

    #[cfg(not(all(target_arch = "wasm32", feature = "wasm-web")))]
    {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mobile_user_agents() {
        assert!(is_mobile_user_agent(
            "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15"
        ));
        assert!(is_mobile_user_agent("Mozilla/5.0 (Linux; Android 14; Pixel 8)"));
        assert!(!is_mobile_user_agent(
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_0) AppleWebKit/605.1.15"
        ));
    }

    #[test]
    fn non_object_defaults_are_ignored() {
        assert_eq!(parse_json_value("[1,2]").map(|v| v.is_object()), Some(false));
        assert_eq!(parse_json_value("not json"), None);
    }
}

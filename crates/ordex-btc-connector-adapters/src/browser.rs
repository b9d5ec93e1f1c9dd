use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use js_sys::{Array, Function, Promise, Reflect};
use serde::Serialize;
use serde_json::Value;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;

use ordex_btc_connector_core::ConnectorError;

use crate::transport::EventListener;
use crate::wallets::{event_from_payload, EVENT_NAMES};

pub(crate) fn injected(global: &str) -> bool {
    injected_object(global).is_ok()
}

fn injected_object(global: &str) -> Result<JsValue, ConnectorError> {
    let window =
        web_sys::window().ok_or_else(|| ConnectorError::Transport("missing window".to_owned()))?;
    let object = get_prop(&window.into(), global)?;
    if object.is_null() || object.is_undefined() {
        return Err(ConnectorError::Transport(format!("window.{global} missing")));
    }
    Ok(object)
}

fn get_prop(target: &JsValue, key: &str) -> Result<JsValue, ConnectorError> {
    Reflect::get(target, &JsValue::from_str(key)).map_err(|e| {
        ConnectorError::Transport(format!("read wallet property {key} failed: {e:?}"))
    })
}

pub(crate) async fn call(
    global: &str,
    method: &str,
    params: &Value,
) -> Result<Value, ConnectorError> {
    let object = injected_object(global)?;
    let function = get_prop(&object, method)?
        .dyn_into::<Function>()
        .map_err(|_| {
            ConnectorError::Transport(format!("window.{global}.{method} is not a function"))
        })?;

    let args = Array::new();
    for param in params.as_array().into_iter().flatten() {
        let value = param
            .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
            .map_err(|e| {
                ConnectorError::Transport(format!("failed to encode {method} params: {e}"))
            })?;
        args.push(&value);
    }

    let returned = function
        .apply(&object, &args)
        .map_err(|e| ConnectorError::Transport(format!("{method} threw: {}", js_message(&e))))?;
    let resolved = match returned.dyn_into::<Promise>() {
        Ok(promise) => JsFuture::from(promise).await.map_err(|e| {
            ConnectorError::Transport(format!("{method} rejected: {}", js_message(&e)))
        })?,
        Err(value) => value,
    };
    if resolved.is_null() || resolved.is_undefined() {
        return Ok(Value::Null);
    }
    serde_wasm_bindgen::from_value(resolved).map_err(|e| {
        ConnectorError::Transport(format!("failed to decode {method} response: {e}"))
    })
}

/// Registers one callback per lifecycle event through the wallet's `on`.
///
/// Callbacks stay attached for the page lifetime; bumping `generation` silences them.
pub(crate) fn listen(
    global: &str,
    listener: EventListener,
    generation: &Arc<AtomicU64>,
) -> Result<bool, ConnectorError> {
    let object = injected_object(global)?;
    let Some(on) = get_prop(&object, "on")
        .ok()
        .and_then(|v| v.dyn_into::<Function>().ok())
    else {
        return Ok(false);
    };

    let current = generation.load(Ordering::Acquire);
    for name in EVENT_NAMES {
        let listener = Arc::clone(&listener);
        let generation = Arc::clone(generation);
        let callback = Closure::<dyn FnMut(JsValue)>::new(move |value: JsValue| {
            if generation.load(Ordering::Acquire) != current {
                return;
            }
            let payload = serde_wasm_bindgen::from_value::<Value>(value).unwrap_or(Value::Null);
            if let Some(event) = event_from_payload(name, &payload) {
                listener(event);
            }
        });
        on.call2(&object, &JsValue::from_str(name), callback.as_ref().unchecked_ref())
            .map_err(|e| ConnectorError::Transport(format!("subscribe {name} failed: {e:?}")))?;
        callback.forget();
    }
    Ok(true)
}

fn js_message(value: &JsValue) -> String {
    get_prop(value, "message")
        .ok()
        .and_then(|m| m.as_string())
        .unwrap_or_else(|| format!("{value:?}"))
}

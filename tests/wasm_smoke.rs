#![cfg(all(target_arch = "wasm32", feature = "wasm-web"))]

use std::sync::{Arc, Mutex};

use serde_json::json;
use shop_login_rs_sdk::authorize::{BusOptions, MessageBus, SourceRef};
use shop_login_rs_sdk::diagnostics::RecordingReporter;
use shop_login_rs_sdk::element::HostEventEmitter;
use shop_login_rs_sdk::platform::browser::{window_id, ElementEventDispatcher, WindowMessageChannel};
use shop_login_rs_sdk::platform::{MessageChannel, MessageEnvelope};
use wasm_bindgen::JsCast;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

#[wasm_bindgen_test]
fn window_ids_are_stable() {
    let window = web_sys::window().expect("window");
    let first = window_id(window.unchecked_ref());
    let second = window_id(window.unchecked_ref());
    assert_eq!(first, second);
}

#[wasm_bindgen_test]
fn bus_attaches_and_destroys_on_window() {
    let channel = WindowMessageChannel::current().expect("window");
    let bus = MessageBus::new(
        &channel,
        BusOptions::new(vec!["https://shop.app".into()], SourceRef::window(None)),
    );
    assert!(!bus.is_destroyed());
    bus.destroy();
    assert!(bus.is_destroyed());

    let subscription = channel.listen(Arc::new(|_: &MessageEnvelope| {}));
    assert!(subscription.is_active());
}

#[wasm_bindgen_test]
fn host_events_reach_the_element() {
    let document = web_sys::window().and_then(|window| window.document()).expect("document");
    let element = document.create_element("shop-login-button").expect("element");

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let listener = wasm_bindgen::closure::Closure::wrap(Box::new(move |event: web_sys::CustomEvent| {
        sink.lock().unwrap().push(event.detail().as_f64());
    }) as Box<dyn FnMut(web_sys::CustomEvent)>);
    element
        .add_event_listener_with_callback("completed", listener.as_ref().unchecked_ref())
        .expect("listen");

    let emitter = HostEventEmitter::with_element(
        Arc::new(ElementEventDispatcher::new(element)),
        RecordingReporter::new(),
    );
    emitter.emit("completed", Some(json!(7)), true);

    assert_eq!(*seen.lock().unwrap(), [Some(7.0)]);
}

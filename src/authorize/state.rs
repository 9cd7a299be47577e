//! Modal visibility and session state.
//!
//! [`reducer`] is the single writer of [`AuthorizeState`]. [`AuthorizeStateStore`] wraps it
//! with the side effects of a transition: modal-state analytics, breadcrumbs and observer
//! notification.

use std::fmt;
use std::sync::{Arc, LazyLock, Mutex, Weak};

use crate::analytics::{AnalyticsTracker, ModalState, ModalStateChange};
use crate::diagnostics::{BreadcrumbMetadata, BreadcrumbType, ErrorReporter};
use crate::logger::Logger;
use crate::util::errors::{ErrorName, ShopJsError};
use crate::util::subscribe::Subscription;

static LOGGER: LazyLock<Logger> = LazyLock::new(|| Logger::new("@shop-login/authorize-state"));

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct AuthorizeState {
    pub loaded: bool,
    pub ui_rendered: bool,
    pub modal_dismissible: bool,
    pub modal_force_hidden: bool,
    pub modal_visible: bool,
}

/// Why the modal is being shown or hidden.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ModalReason {
    /// The buyer clicked a button. The only reason that overrides a force-hidden modal.
    UserButtonClicked,
    UserPromptContinueClicked,
    EventShopUserMatched,
    EventCloseRequested,
    EventCompleted,
    Custom(String),
}

impl ModalReason {
    pub fn as_str(&self) -> &str {
        match self {
            ModalReason::UserButtonClicked => "user_button_clicked",
            ModalReason::UserPromptContinueClicked => "user_prompt_continue_clicked",
            ModalReason::EventShopUserMatched => "event_shop_user_matched",
            ModalReason::EventCloseRequested => "event_close_requested",
            ModalReason::EventCompleted => "event_completed",
            ModalReason::Custom(reason) => reason,
        }
    }
}

impl From<&str> for ModalReason {
    fn from(reason: &str) -> Self {
        match reason {
            "user_button_clicked" => ModalReason::UserButtonClicked,
            "user_prompt_continue_clicked" => ModalReason::UserPromptContinueClicked,
            "event_shop_user_matched" => ModalReason::EventShopUserMatched,
            "event_close_requested" => ModalReason::EventCloseRequested,
            "event_completed" => ModalReason::EventCompleted,
            other => ModalReason::Custom(other.to_owned()),
        }
    }
}

impl fmt::Display for ModalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DismissMethod {
    CloseButton,
    EscapeKey,
    IframeClose,
    WindoidContinue,
    Custom(String),
}

impl DismissMethod {
    pub fn as_str(&self) -> &str {
        match self {
            DismissMethod::CloseButton => "close_button",
            DismissMethod::EscapeKey => "escape_key",
            DismissMethod::IframeClose => "iframe_close",
            DismissMethod::WindoidContinue => "windoid_continue",
            DismissMethod::Custom(method) => method,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthorizeAction {
    Loaded {
        auto_open: bool,
        session_detected: bool,
    },
    ShowModal {
        reason: ModalReason,
    },
    HideModal {
        reason: ModalReason,
        dismiss_method: Option<DismissMethod>,
    },
    WindoidOpened,
    WindoidClosed,
    Reset,
    ModalDismissible,
    UiRendered,
}

impl AuthorizeAction {
    pub fn name(&self) -> &'static str {
        match self {
            AuthorizeAction::Loaded { .. } => "loaded",
            AuthorizeAction::ShowModal { .. } => "showModal",
            AuthorizeAction::HideModal { .. } => "hideModal",
            AuthorizeAction::WindoidOpened => "windoidOpened",
            AuthorizeAction::WindoidClosed => "windoidClosed",
            AuthorizeAction::Reset => "reset",
            AuthorizeAction::ModalDismissible => "modalDismissible",
            AuthorizeAction::UiRendered => "uiRendered",
        }
    }
}

/// Pure transition function.
pub fn reducer(state: &AuthorizeState, action: &AuthorizeAction) -> AuthorizeState {
    match action {
        AuthorizeAction::Loaded {
            auto_open,
            session_detected,
        } => {
            let mut next = AuthorizeState {
                loaded: true,
                ..*state
            };
            // A force-hidden modal stays hidden: an open windoid wins over auto-open.
            if *auto_open && *session_detected && !state.modal_visible && !state.modal_force_hidden {
                next.modal_dismissible = false;
                next.modal_visible = true;
            }
            next
        }
        AuthorizeAction::ShowModal { reason } => {
            if state.modal_force_hidden
                && reason.as_str() != ModalReason::UserButtonClicked.as_str()
            {
                return *state;
            }
            AuthorizeState {
                modal_dismissible: false,
                modal_force_hidden: false,
                modal_visible: true,
                ..*state
            }
        }
        AuthorizeAction::HideModal { .. } => AuthorizeState {
            modal_visible: false,
            ..*state
        },
        AuthorizeAction::ModalDismissible => AuthorizeState {
            modal_dismissible: true,
            ..*state
        },
        AuthorizeAction::UiRendered => AuthorizeState {
            ui_rendered: true,
            ..*state
        },
        AuthorizeAction::WindoidOpened => AuthorizeState {
            modal_force_hidden: true,
            modal_visible: false,
            ..*state
        },
        AuthorizeAction::WindoidClosed => AuthorizeState {
            modal_force_hidden: false,
            ..*state
        },
        AuthorizeAction::Reset => AuthorizeState {
            modal_force_hidden: state.modal_force_hidden,
            ..AuthorizeState::default()
        },
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorizeStateChange {
    pub action: AuthorizeAction,
    pub previous_state: AuthorizeState,
    pub state: AuthorizeState,
}

impl AuthorizeStateChange {
    pub fn visibility_changed(&self) -> bool {
        self.previous_state.modal_visible != self.state.modal_visible
    }
}

pub type StateObserver = Arc<dyn Fn(&AuthorizeStateChange) + Send + Sync + 'static>;

#[derive(Default)]
struct ObserverSet {
    next_id: u64,
    observers: Vec<(u64, StateObserver)>,
}

struct StoreInner {
    state: Mutex<AuthorizeState>,
    observers: Mutex<ObserverSet>,
    tracker: Option<AnalyticsTracker>,
    reporter: Arc<dyn ErrorReporter>,
}

/// Shared state container for one widget instance.
#[derive(Clone)]
pub struct AuthorizeStateStore {
    inner: Arc<StoreInner>,
}

impl fmt::Debug for AuthorizeStateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizeStateStore")
            .field("state", &self.state())
            .finish()
    }
}

impl AuthorizeStateStore {
    pub fn new(tracker: Option<AnalyticsTracker>, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                state: Mutex::new(AuthorizeState::default()),
                observers: Mutex::new(ObserverSet::default()),
                tracker,
                reporter,
            }),
        }
    }

    pub fn state(&self) -> AuthorizeState {
        *self.inner.state.lock().unwrap()
    }

    /// Applies `action`, records its analytics and notifies observers. Returns the new
    /// state.
    pub fn dispatch(&self, action: AuthorizeAction) -> AuthorizeState {
        let (previous_state, state) = {
            let mut current = self.inner.state.lock().unwrap();
            let previous = *current;
            *current = reducer(&previous, &action);
            (previous, *current)
        };

        LOGGER.debug(format!("{} -> {state:?}", action.name()));
        let change = AuthorizeStateChange {
            action,
            previous_state,
            state,
        };
        self.process_modal_state_change(&change);

        let observers: Vec<StateObserver> = {
            let set = self.inner.observers.lock().unwrap();
            set.observers.iter().map(|(_, observer)| Arc::clone(observer)).collect()
        };
        for observer in observers {
            observer(&change);
        }

        state
    }

    /// Registers `observer` for every transition until the subscription is dropped.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&AuthorizeStateChange) + Send + Sync + 'static,
    {
        let id = {
            let mut set = self.inner.observers.lock().unwrap();
            set.next_id += 1;
            let id = set.next_id;
            set.observers.push((id, Arc::new(observer)));
            id
        };

        let weak: Weak<StoreInner> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                let removed = {
                    let mut set = inner.observers.lock().unwrap();
                    let position = set.observers.iter().position(|(observer_id, _)| *observer_id == id);
                    position.map(|position| set.observers.remove(position))
                };
                drop(removed);
            }
        })
    }

    pub fn show_modal(&self, reason: ModalReason) -> AuthorizeState {
        self.dispatch(AuthorizeAction::ShowModal { reason })
    }

    pub fn hide_modal(&self, reason: ModalReason, dismiss_method: Option<DismissMethod>) -> AuthorizeState {
        self.dispatch(AuthorizeAction::HideModal {
            reason,
            dismiss_method,
        })
    }

    fn track(&self, change: ModalStateChange) {
        if let Some(tracker) = &self.inner.tracker {
            tracker.track_modal_state_change(change);
        }
    }

    fn process_modal_state_change(&self, change: &AuthorizeStateChange) {
        let current_state = ModalState::from_visibility(change.state.modal_visible);

        if let AuthorizeAction::Loaded { .. } = change.action {
            self.track(ModalStateChange::new(ModalState::Loaded, "event_loaded"));
            self.inner.reporter.leave_breadcrumb(
                "iframe loaded",
                BreadcrumbMetadata::new(),
                BreadcrumbType::State,
            );
        }

        if !change.visibility_changed() {
            return;
        }

        match &change.action {
            AuthorizeAction::Loaded { .. } => {
                self.track(ModalStateChange::new(current_state, "event_loaded_with_auto_open"));
            }
            AuthorizeAction::WindoidOpened => self.track(
                ModalStateChange::new(current_state, "event_windoid_opened")
                    .dismissed_by(DismissMethod::WindoidContinue.as_str()),
            ),
            AuthorizeAction::ShowModal { reason } => {
                self.track(ModalStateChange::new(current_state, reason.as_str()));
            }
            AuthorizeAction::HideModal {
                reason,
                dismiss_method,
            } => {
                let mut modal_change = ModalStateChange::new(current_state, reason.as_str());
                if let Some(dismiss_method) = dismiss_method {
                    modal_change = modal_change.dismissed_by(dismiss_method.as_str());
                }
                self.track(modal_change);
            }
            AuthorizeAction::Reset => {
                self.track(ModalStateChange::new(current_state, "event_restarted"));
            }
            other => self.inner.reporter.notify(ShopJsError::new(
                format!(
                    "Could not determine state change reason for action: {}",
                    other.name()
                ),
                ErrorName::AuthorizeError,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::{AnalyticsData, MemorySink, MODAL_STATE_CHANGE_SCHEMA};
    use crate::diagnostics::RecordingReporter;
    use serde_json::json;

    fn all_actions() -> Vec<AuthorizeAction> {
        vec![
            AuthorizeAction::Loaded {
                auto_open: true,
                session_detected: true,
            },
            AuthorizeAction::Loaded {
                auto_open: false,
                session_detected: true,
            },
            AuthorizeAction::ShowModal {
                reason: ModalReason::Custom("auto".into()),
            },
            AuthorizeAction::ShowModal {
                reason: ModalReason::UserButtonClicked,
            },
            AuthorizeAction::HideModal {
                reason: ModalReason::EventCloseRequested,
                dismiss_method: Some(DismissMethod::CloseButton),
            },
            AuthorizeAction::WindoidOpened,
            AuthorizeAction::WindoidClosed,
            AuthorizeAction::Reset,
            AuthorizeAction::ModalDismissible,
            AuthorizeAction::UiRendered,
        ]
    }

    fn all_states() -> Vec<AuthorizeState> {
        (0..32u8)
            .map(|bits| AuthorizeState {
                loaded: bits & 1 != 0,
                ui_rendered: bits & 2 != 0,
                modal_dismissible: bits & 4 != 0,
                modal_force_hidden: bits & 8 != 0,
                modal_visible: bits & 16 != 0,
            })
            .collect()
    }

    #[test]
    fn reducer_is_pure() {
        for state in all_states() {
            for action in all_actions() {
                assert_eq!(reducer(&state, &action), reducer(&state, &action));
            }
        }
    }

    #[test]
    fn reset_preserves_only_force_hidden() {
        for state in all_states() {
            let next = reducer(&state, &AuthorizeAction::Reset);
            assert_eq!(
                next,
                AuthorizeState {
                    modal_force_hidden: state.modal_force_hidden,
                    ..AuthorizeState::default()
                }
            );
        }
    }

    #[test]
    fn force_hidden_blocks_all_but_user_clicks() {
        let state = AuthorizeState {
            modal_force_hidden: true,
            ..AuthorizeState::default()
        };

        let auto = reducer(
            &state,
            &AuthorizeAction::ShowModal {
                reason: ModalReason::Custom("auto".into()),
            },
        );
        assert_eq!(auto, state);

        let clicked = reducer(
            &state,
            &AuthorizeAction::ShowModal {
                reason: ModalReason::UserButtonClicked,
            },
        );
        assert!(!clicked.modal_force_hidden);
        assert!(clicked.modal_visible);
        assert!(!clicked.modal_dismissible);
    }

    #[test]
    fn string_reasons_map_to_known_variants() {
        assert_eq!(
            ModalReason::from("user_button_clicked"),
            ModalReason::UserButtonClicked
        );
        assert_eq!(
            ModalReason::from("host_defined"),
            ModalReason::Custom("host_defined".into())
        );

        let state = AuthorizeState {
            modal_force_hidden: true,
            ..AuthorizeState::default()
        };
        let clicked = reducer(
            &state,
            &AuthorizeAction::ShowModal {
                reason: ModalReason::Custom("user_button_clicked".into()),
            },
        );
        assert!(clicked.modal_visible);
        assert!(!clicked.modal_force_hidden);
    }

    #[test]
    fn loaded_auto_opens_with_session() {
        let opened = reducer(
            &AuthorizeState::default(),
            &AuthorizeAction::Loaded {
                auto_open: true,
                session_detected: true,
            },
        );
        assert!(opened.loaded && opened.modal_visible);

        let no_session = reducer(
            &AuthorizeState::default(),
            &AuthorizeAction::Loaded {
                auto_open: true,
                session_detected: false,
            },
        );
        assert!(no_session.loaded && !no_session.modal_visible);
    }

    #[test]
    fn windoid_wins_over_auto_open() {
        let hidden = reducer(&AuthorizeState::default(), &AuthorizeAction::WindoidOpened);
        let loaded = reducer(
            &hidden,
            &AuthorizeAction::Loaded {
                auto_open: true,
                session_detected: true,
            },
        );
        assert!(loaded.loaded);
        assert!(!loaded.modal_visible);
        assert!(loaded.modal_force_hidden);

        let closed = reducer(&loaded, &AuthorizeAction::WindoidClosed);
        assert!(!closed.modal_force_hidden);
        assert!(!closed.modal_visible);
    }

    fn tracked_store() -> (AuthorizeStateStore, Arc<MemorySink>, Arc<RecordingReporter>) {
        let sink = MemorySink::new();
        let reporter = RecordingReporter::new();
        let tracker = AnalyticsTracker::new(
            AnalyticsData::new("trace").with_flow("default"),
            sink.clone(),
            reporter.clone(),
        );
        (
            AuthorizeStateStore::new(Some(tracker), reporter.clone()),
            sink,
            reporter,
        )
    }

    #[test]
    fn store_tracks_loaded_and_auto_open() {
        let (store, sink, reporter) = tracked_store();

        store.dispatch(AuthorizeAction::Loaded {
            auto_open: true,
            session_detected: true,
        });

        let events = sink.events_for(MODAL_STATE_CHANGE_SCHEMA);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].field("currentState"), Some(&json!("loaded")));
        assert_eq!(events[0].field("reason"), Some(&json!("event_loaded")));
        assert_eq!(events[1].field("currentState"), Some(&json!("shown")));
        assert_eq!(
            events[1].field("reason"),
            Some(&json!("event_loaded_with_auto_open"))
        );
        assert_eq!(reporter.breadcrumbs()[0].name, "iframe loaded");
    }

    #[test]
    fn store_tracks_hide_with_dismiss_method() {
        let (store, sink, _reporter) = tracked_store();
        store.show_modal(ModalReason::UserButtonClicked);
        store.hide_modal(ModalReason::EventCloseRequested, Some(DismissMethod::CloseButton));
        store.dispatch(AuthorizeAction::UiRendered);

        let events = sink.events_for(MODAL_STATE_CHANGE_SCHEMA);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].field("reason"), Some(&json!("user_button_clicked")));
        assert_eq!(events[1].field("currentState"), Some(&json!("hidden")));
        assert_eq!(events[1].field("dismissMethod"), Some(&json!("close_button")));
        assert_eq!(events[1].field("previousState"), Some(&json!("shown")));
    }

    #[test]
    fn store_tracks_windoid_open_as_continue() {
        let (store, sink, _reporter) = tracked_store();
        store.show_modal(ModalReason::UserButtonClicked);
        store.dispatch(AuthorizeAction::WindoidOpened);

        let events = sink.events_for(MODAL_STATE_CHANGE_SCHEMA);
        assert_eq!(events[1].field("reason"), Some(&json!("event_windoid_opened")));
        assert_eq!(events[1].field("dismissMethod"), Some(&json!("windoid_continue")));
    }

    #[test]
    fn observers_see_every_transition() {
        let (store, _sink, _reporter) = tracked_store();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let subscription = {
            let seen = Arc::clone(&seen);
            store.subscribe(move |change| seen.lock().unwrap().push(change.action.name()))
        };

        store.dispatch(AuthorizeAction::UiRendered);
        store.dispatch(AuthorizeAction::ModalDismissible);
        drop(subscription);
        store.dispatch(AuthorizeAction::Reset);

        assert_eq!(*seen.lock().unwrap(), ["uiRendered", "modalDismissible"]);
        assert!(!store.state().ui_rendered);
    }

    #[test]
    fn observer_may_dispatch() {
        let (store, _sink, _reporter) = tracked_store();
        let inner = store.clone();
        let _subscription = store.subscribe(move |change| {
            if change.action == AuthorizeAction::UiRendered {
                inner.dispatch(AuthorizeAction::ModalDismissible);
            }
        });

        store.dispatch(AuthorizeAction::UiRendered);
        assert!(store.state().modal_dismissible);
    }
}

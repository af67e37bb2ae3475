//! Dioxus binding for [`ComponentSession`].
//!
//! The app root provides a [`Connection`] through context; components call
//! [`use_messaging`] once and get a reactive connection flag plus a send
//! handle. The session is dropped, and its subscriptions released, when the
//! component unmounts.

use std::cell::RefCell;
use std::rc::Rc;

use dioxus::prelude::*;
use pawtalk_shared::Frame;

use super::connection::Connection;
use super::lifecycle::{ComponentSession, MountOptions, StoredToken};
use super::registry::{Handler, Topic};

/// What a component gets back from [`use_messaging`].
#[derive(Clone)]
pub struct UseMessaging {
    connection: Connection,
    connected: Signal<bool>,
}

impl UseMessaging {
    /// Reactive: reading it subscribes the component to connection changes.
    pub fn is_connected(&self) -> bool {
        *self.connected.read()
    }

    pub fn send_message(&self, frame: &Frame) -> bool {
        self.connection.send(frame)
    }
}

/// Mount a [`ComponentSession`] for the calling component.
///
/// `subscriptions` runs once, on first render. Requires a `Connection` in
/// context.
pub fn use_messaging(
    component: &'static str,
    subscriptions: impl FnOnce() -> Vec<(Topic, Handler)>,
) -> UseMessaging {
    let connection = use_context::<Connection>();
    let mut connected = use_signal(|| connection.is_connected());

    let session = use_hook(|| {
        let mut session = ComponentSession::mount(
            &connection,
            component,
            &StoredToken::default(),
            MountOptions::default(),
        );
        for (topic, handler) in subscriptions() {
            session.subscribe_shared(topic, handler);
        }
        Rc::new(RefCell::new(Some(session)))
    });

    let watched = connection.clone();
    use_future(move || {
        let mut rx = watched.watch_state();
        async move {
            loop {
                connected.set(rx.borrow_and_update().is_open());
                if rx.changed().await.is_err() {
                    break;
                }
            }
        }
    });

    use_drop(move || {
        session.borrow_mut().take();
    });

    UseMessaging {
        connection,
        connected,
    }
}

//! MapSession - Everything the bridge holds for one map instance
//!
//! A session is created when the map view comes up and torn down with it. It owns the manager
//! registry (and through it the engine), the tap listeners and the event subscriptions. There is
//! no shared state between sessions.

use crate::annotation::NativeAnnotation;
use crate::command::MethodCall;
use crate::config::BridgeConfig;
use crate::dispatcher::{Dispatcher, Reply};
use crate::engine::MapEngine;
use crate::map_events::{MapEvent, MapEventKind};
use crate::registry::ManagerRegistry;
use crate::router::{EventRouter, ListenerTable, RouteOutcome};
use crate::transport::Messenger;
use crate::Result;
use std::rc::Rc;

pub struct MapSession<E: MapEngine, M: Messenger + 'static> {
    dispatcher: Dispatcher<E>,
    router: EventRouter,
    messenger: Rc<M>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<E: MapEngine, M: Messenger + 'static> MapSession<E, M> {
    /// Start a session: taps are forwarded to `messenger`, configured events are subscribed
    pub fn new(engine: E, messenger: M, config: &BridgeConfig) -> Self {
        let messenger = Rc::new(messenger);
        let mut dispatcher = Dispatcher::new(ManagerRegistry::new(engine, config));
        for name in &config.event_types {
            match name.parse::<MapEventKind>() {
                Ok(kind) => dispatcher.subscriptions_mut().subscribe(kind),
                Err(e) => tracing::warn!("Skipping configured event: {e}"),
            }
        }

        Self {
            dispatcher,
            router: EventRouter::new(ListenerTable::forwarding_to(Rc::clone(&messenger))),
            messenger,
        }
    }

    /// Handle one inbound call
    pub fn handle(&mut self, call: &MethodCall) -> Result<Reply> {
        self.dispatcher.dispatch(call)
    }

    /// Route a tap reported by the engine
    pub fn on_annotations_tapped(&mut self, annotations: &[NativeAnnotation]) -> RouteOutcome {
        self.router.route(annotations)
    }

    /// Forward a lifecycle event if the host subscribed to it
    pub fn on_map_event(&self, event: MapEvent) -> bool {
        self.dispatcher
            .subscriptions()
            .forward(&event, self.messenger.as_ref())
    }

    pub fn registry(&self) -> &ManagerRegistry<E> {
        self.dispatcher.registry()
    }

    pub fn engine(&self) -> &E {
        self.dispatcher.registry().engine()
    }

    pub fn engine_mut(&mut self) -> &mut E {
        self.dispatcher.registry_mut().engine_mut()
    }

    /// Replace or remove tap listeners, e.g. to stop forwarding one kind
    pub fn listeners_mut(&mut self) -> &mut ListenerTable {
        self.router.listeners_mut()
    }

    pub fn messenger(&self) -> &M {
        &self.messenger
    }

    /// Dispose every manager and listener, handing the engine back
    pub fn tear_down(mut self) -> E {
        let count = self.dispatcher.registry().len();
        self.router.listeners_mut().clear_all();
        let mut registry = self.dispatcher.into_registry();
        registry.remove_all();
        tracing::debug!("Session torn down, disposed {count} annotation managers");
        registry.into_engine()
    }
}

//! Tap event routing
//!
//! When the user taps the map, the engine reports every annotation under the finger. Only the
//! topmost one matters: it is converted to its bridge form and handed to the listener registered
//! for its kind.

use crate::annotation::{Annotation, AnnotationKind, NativeAnnotation};
use crate::transport::Messenger;
use std::fmt;
use std::rc::Rc;

/// Callback for taps on one annotation kind
pub type Listener = Box<dyn FnMut(&Annotation)>;

/// One optional listener slot per annotation kind
#[derive(Default)]
pub struct ListenerTable {
    circle: Option<Listener>,
    point: Option<Listener>,
    polygon: Option<Listener>,
    polyline: Option<Listener>,
}

impl fmt::Debug for ListenerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerTable")
            .field("circle", &self.circle.is_some())
            .field("point", &self.point.is_some())
            .field("polygon", &self.polygon.is_some())
            .field("polyline", &self.polyline.is_some())
            .finish()
    }
}

impl ListenerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A table sending every tap to the host on the kind's click channel
    pub fn forwarding_to<M: Messenger + 'static>(messenger: Rc<M>) -> Self {
        let mut table = Self::new();
        for kind in AnnotationKind::ALL {
            let messenger = Rc::clone(&messenger);
            let channel = kind.click_channel();
            table.set(
                kind,
                Box::new(move |annotation: &Annotation| match serde_json::to_value(annotation) {
                    Ok(payload) => messenger.send(&channel, payload),
                    Err(e) => tracing::warn!("Failed to serialize tapped annotation: {e}"),
                }),
            );
        }
        table
    }

    fn slot(&mut self, kind: AnnotationKind) -> &mut Option<Listener> {
        match kind {
            AnnotationKind::Circle => &mut self.circle,
            AnnotationKind::Point => &mut self.point,
            AnnotationKind::Polygon => &mut self.polygon,
            AnnotationKind::Polyline => &mut self.polyline,
        }
    }

    /// Register a listener, replacing any previous one for this kind
    pub fn set(&mut self, kind: AnnotationKind, listener: Listener) {
        *self.slot(kind) = Some(listener);
    }

    pub fn clear(&mut self, kind: AnnotationKind) {
        *self.slot(kind) = None;
    }

    pub fn clear_all(&mut self) {
        for kind in AnnotationKind::ALL {
            self.clear(kind);
        }
    }

    pub fn is_registered(&self, kind: AnnotationKind) -> bool {
        match kind {
            AnnotationKind::Circle => self.circle.is_some(),
            AnnotationKind::Point => self.point.is_some(),
            AnnotationKind::Polygon => self.polygon.is_some(),
            AnnotationKind::Polyline => self.polyline.is_some(),
        }
    }
}

/// What happened to a tap batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Delivered(AnnotationKind),
    NoListener(AnnotationKind),
    Unrecognized(String),
    Empty,
}

/// Sends tapped annotations to the listener for their kind
#[derive(Debug, Default)]
pub struct EventRouter {
    listeners: ListenerTable,
}

impl EventRouter {
    pub fn new(listeners: ListenerTable) -> Self {
        Self { listeners }
    }

    pub fn listeners(&self) -> &ListenerTable {
        &self.listeners
    }

    pub fn listeners_mut(&mut self) -> &mut ListenerTable {
        &mut self.listeners
    }

    /// Route the topmost annotation of a tap batch
    pub fn route(&mut self, annotations: &[NativeAnnotation]) -> RouteOutcome {
        let Some(topmost) = annotations.first() else {
            return RouteOutcome::Empty;
        };
        let annotation = match topmost.to_bridge() {
            Some(annotation) => annotation,
            None => {
                let type_name = match topmost {
                    NativeAnnotation::Unrecognized { type_name } => type_name.clone(),
                    other => format!("{other:?}"),
                };
                tracing::warn!("Dropping tap on unrecognized annotation type `{type_name}`");
                return RouteOutcome::Unrecognized(type_name);
            }
        };

        let kind = annotation.kind();
        match self.listeners.slot(kind) {
            Some(listener) => {
                listener(&annotation);
                RouteOutcome::Delivered(kind)
            }
            None => {
                tracing::debug!("No {kind} tap listener registered, dropping `{}`", annotation.id());
                RouteOutcome::NoListener(kind)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::fixtures::*;
    use crate::transport::RecordingMessenger;
    use std::cell::RefCell;

    type Seen = Rc<RefCell<Vec<(AnnotationKind, String)>>>;

    fn recording_listener(seen: &Seen, kind: AnnotationKind) -> Listener {
        let seen = Rc::clone(seen);
        Box::new(move |annotation: &Annotation| {
            seen.borrow_mut().push((kind, annotation.id().to_string()));
        })
    }

    fn router_with_all_listeners(seen: &Seen) -> EventRouter {
        let mut table = ListenerTable::new();
        for kind in AnnotationKind::ALL {
            table.set(kind, recording_listener(seen, kind));
        }
        EventRouter::new(table)
    }

    #[test]
    fn test_topmost_point_reaches_point_listener_once() {
        let seen = Seen::default();
        let mut router = router_with_all_listeners(&seen);

        let outcome = router.route(&[point("p1", "points"), circle("c1", "circles")]);
        assert_eq!(outcome, RouteOutcome::Delivered(AnnotationKind::Point));
        assert_eq!(
            *seen.borrow(),
            vec![(AnnotationKind::Point, "p1".to_string())]
        );
    }

    #[test]
    fn test_each_kind_is_routed() {
        let seen = Seen::default();
        let mut router = router_with_all_listeners(&seen);

        router.route(&[circle("c", "m")]);
        router.route(&[polygon("g", "m")]);
        router.route(&[polyline("l", "m")]);
        let kinds: Vec<AnnotationKind> = seen.borrow().iter().map(|(kind, _)| *kind).collect();
        assert_eq!(
            kinds,
            vec![
                AnnotationKind::Circle,
                AnnotationKind::Polygon,
                AnnotationKind::Polyline
            ]
        );
    }

    #[test]
    fn test_unrecognized_reaches_no_listener() {
        let seen = Seen::default();
        let mut router = router_with_all_listeners(&seen);

        let outcome = router.route(&[unrecognized(), point("p1", "points")]);
        assert_eq!(
            outcome,
            RouteOutcome::Unrecognized("HeatmapAnnotation".to_string())
        );
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_empty_batch() {
        let mut router = EventRouter::default();
        assert_eq!(router.route(&[]), RouteOutcome::Empty);
    }

    #[test]
    fn test_missing_listener() {
        let seen = Seen::default();
        let mut router = router_with_all_listeners(&seen);
        router.listeners_mut().clear(AnnotationKind::Polygon);

        assert!(!router.listeners().is_registered(AnnotationKind::Polygon));
        assert_eq!(
            router.route(&[polygon("g", "m")]),
            RouteOutcome::NoListener(AnnotationKind::Polygon)
        );
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_clear_all() {
        let seen = Seen::default();
        let mut router = router_with_all_listeners(&seen);
        router.listeners_mut().clear_all();
        for kind in AnnotationKind::ALL {
            assert!(!router.listeners().is_registered(kind));
        }
    }

    #[test]
    fn test_forwarding_table_sends_on_click_channel() {
        let messenger = Rc::new(RecordingMessenger::new());
        let mut router = EventRouter::new(ListenerTable::forwarding_to(Rc::clone(&messenger)));

        router.route(&[circle("c1", "circles")]);

        let messages = messenger.take();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].channel, "annotation#on_circle_annotation_click");
        assert_eq!(messages[0].payload["id"], "c1");
        assert_eq!(messages[0].payload["type"], "circle");
    }
}

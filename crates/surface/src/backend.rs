use foundation::Viewport;
use runtime::{EventRecord, Props};
use scene::{ControlDef, ControlKey, LayerDef, MapScalars, SourceDef};
use serde_json::Value;

use crate::error::BackendError;

/// Whether a freshly created instance accepts mutations right away.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// Mutations must wait for the backend's ready signal.
    Pending,
}

/// What a `set_property` call writes to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PropertyTarget<'a> {
    Paint(&'a str),
    Layout(&'a str),
    Filter(&'a str),
    /// Map-wide properties: style, terrain, fog, projection.
    Map,
}

impl PropertyTarget<'_> {
    pub fn layer(&self) -> Option<&str> {
        match *self {
            PropertyTarget::Paint(id) | PropertyTarget::Layout(id) | PropertyTarget::Filter(id) => {
                Some(id)
            }
            PropertyTarget::Map => None,
        }
    }
}

/// Primitives every rendering library has to provide.
///
/// The dispatcher owns the backend exclusively and calls these one at a
/// time, in order.
pub trait Backend {
    /// Creates (or re-creates) the live instance, discarding prior state.
    fn create_instance(
        &mut self,
        viewport: &Viewport,
        scalars: &MapScalars,
    ) -> Result<Readiness, BackendError>;

    fn add_source(&mut self, id: &str, def: &SourceDef) -> Result<(), BackendError>;

    fn add_layer(&mut self, def: &LayerDef, before_id: Option<&str>) -> Result<(), BackendError>;

    fn remove_layer(&mut self, id: &str) -> Result<(), BackendError>;

    fn remove_source(&mut self, id: &str) -> Result<(), BackendError>;

    fn set_property(
        &mut self,
        target: PropertyTarget<'_>,
        key: &str,
        value: &Value,
    ) -> Result<(), BackendError>;

    fn add_control(&mut self, def: &ControlDef) -> Result<(), BackendError>;

    fn remove_control(&mut self, key: &ControlKey) -> Result<(), BackendError>;

    /// Anything without a dedicated primitive: camera moves, markers, draw
    /// tools, screenshots.
    fn invoke(&mut self, method: &str, args: &[Value], kwargs: &Props) -> Result<(), BackendError>;

    /// Occurrences since the last poll, in arrival order.
    fn poll_events(&mut self) -> Vec<EventRecord>;
}

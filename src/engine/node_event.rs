//! Relay of scene-graph node events to a single native listener.

use super::ScriptEngine;
use crate::error::BridgeError;
use crate::object::NativePtr;
use crate::runtime::ScriptRuntime;

/// Lifecycle event of a scene-graph node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeEventType {
    Enter,
    Exit,
    EnterTransitionDidFinish,
    ExitTransitionDidStart,
    Cleanup,
}

/// Receives node events; the returned flag is handed back to the caller.
pub type NodeEventListener = Box<dyn FnMut(NativePtr, NodeEventType) -> bool>;

impl<R: ScriptRuntime> ScriptEngine<R> {
    /// Install the node event listener, replacing any previous one.
    pub fn set_node_event_listener(
        &mut self,
        listener: impl FnMut(NativePtr, NodeEventType) -> bool + 'static,
    ) {
        self.node_event_listener = Some(Box::new(listener));
    }

    pub fn has_node_event_listener(&self) -> bool {
        self.node_event_listener.is_some()
    }

    /// Forward an event to the listener and return its answer.
    pub fn on_receive_node_event(
        &mut self,
        node: NativePtr,
        event: NodeEventType,
    ) -> Result<bool, BridgeError> {
        let listener = self
            .node_event_listener
            .as_mut()
            .ok_or(BridgeError::NoNodeEventListener)?;
        tracing::trace!("Node {:#x} event {:?}", node.addr(), event);
        Ok(listener(node, event))
    }
}

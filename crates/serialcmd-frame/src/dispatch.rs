use std::collections::HashMap;

use tracing::{debug, trace};

use crate::command::CommandId;

/// Callback invoked with the command identifier and payload of a frame.
///
/// The payload slice length is the received length.
pub type Handler<C> = Box<dyn FnMut(C, &[u8]) + Send>;

/// Outcome of routing one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The handler registered for the command ran.
    Handled,
    /// No exact match; the fallback handler ran.
    Fallback,
    /// Neither a handler nor a fallback exists; the frame was dropped.
    Unhandled,
}

/// Command-keyed registry of frame handlers.
///
/// Registration takes `&mut self`, so handlers cannot change while a frame
/// is being dispatched. An optional fallback identifier names the handler
/// that receives frames for unregistered commands.
pub struct Dispatcher<C> {
    handlers: HashMap<C, Handler<C>>,
    fallback: Option<C>,
}

impl<C: CommandId> Dispatcher<C> {
    /// Create an empty dispatcher without a fallback.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            fallback: None,
        }
    }

    /// Create an empty dispatcher that falls back to the handler registered
    /// under `fallback` for unknown commands.
    pub fn with_fallback(fallback: C) -> Self {
        Self {
            handlers: HashMap::new(),
            fallback: Some(fallback),
        }
    }

    /// Start building a dispatcher.
    pub fn builder() -> DispatcherBuilder<C> {
        DispatcherBuilder {
            dispatcher: Self::new(),
        }
    }

    /// Install or replace the handler for `command`.
    ///
    /// Returns true if a previous handler was replaced.
    pub fn register<F>(&mut self, command: C, handler: F) -> bool
    where
        F: FnMut(C, &[u8]) + Send + 'static,
    {
        self.handlers.insert(command, Box::new(handler)).is_some()
    }

    /// Remove the handler for `command`, if any.
    pub fn unregister(&mut self, command: C) -> bool {
        self.handlers.remove(&command).is_some()
    }

    /// Route a frame to its handler.
    ///
    /// Looks up `command` first, then the fallback identifier. The fallback
    /// handler receives the original command identifier.
    pub fn dispatch(&mut self, command: C, payload: &[u8]) -> Dispatch {
        if let Some(handler) = self.handlers.get_mut(&command) {
            trace!(?command, len = payload.len(), "dispatching frame");
            handler(command, payload);
            return Dispatch::Handled;
        }

        if let Some(handler) = self.fallback.and_then(|id| self.handlers.get_mut(&id)) {
            debug!(?command, "no handler registered, using fallback");
            handler(command, payload);
            return Dispatch::Fallback;
        }

        debug!(?command, "no handler registered, frame dropped");
        Dispatch::Unhandled
    }

    /// True if a handler exists for exactly `command`.
    pub fn is_registered(&self, command: C) -> bool {
        self.handlers.contains_key(&command)
    }

    /// The fallback identifier, if configured.
    pub fn fallback(&self) -> Option<C> {
        self.fallback
    }

    /// Number of registered handlers (including the fallback).
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<C: CommandId> Default for Dispatcher<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: CommandId> std::fmt::Debug for Dispatcher<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("commands", &self.handlers.keys().collect::<Vec<_>>())
            .field("fallback", &self.fallback)
            .finish()
    }
}

/// Setup-phase builder for a [`Dispatcher`].
pub struct DispatcherBuilder<C> {
    dispatcher: Dispatcher<C>,
}

impl<C: CommandId> DispatcherBuilder<C> {
    /// Handle frames carrying `command`.
    pub fn on<F>(mut self, command: C, handler: F) -> Self
    where
        F: FnMut(C, &[u8]) + Send + 'static,
    {
        self.dispatcher.register(command, handler);
        self
    }

    /// Handle frames for unregistered commands, keyed under the reserved
    /// `invalid` identifier.
    pub fn fallback<F>(mut self, invalid: C, handler: F) -> Self
    where
        F: FnMut(C, &[u8]) + Send + 'static,
    {
        self.dispatcher.fallback = Some(invalid);
        self.dispatcher.register(invalid, handler);
        self
    }

    pub fn build(self) -> Dispatcher<C> {
        self.dispatcher
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::command::CommandPair;

    type Calls<C> = Arc<Mutex<Vec<(C, Vec<u8>)>>>;

    fn recorder<C: CommandId>(calls: &Calls<C>) -> impl FnMut(C, &[u8]) + Send + 'static {
        let calls = Arc::clone(calls);
        move |command, payload| calls.lock().unwrap().push((command, payload.to_vec()))
    }

    #[test]
    fn dispatches_to_registered_handler() {
        let calls: Calls<u8> = Arc::default();
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(0x02, recorder(&calls));

        assert_eq!(dispatcher.dispatch(0x02, b"v1"), Dispatch::Handled);
        assert_eq!(*calls.lock().unwrap(), vec![(0x02, b"v1".to_vec())]);
    }

    #[test]
    fn register_overwrites() {
        let first: Calls<u8> = Arc::default();
        let second: Calls<u8> = Arc::default();
        let mut dispatcher = Dispatcher::new();

        assert!(!dispatcher.register(0x01, recorder(&first)));
        assert!(dispatcher.register(0x01, recorder(&second)));
        dispatcher.dispatch(0x01, &[]);

        assert!(first.lock().unwrap().is_empty());
        assert_eq!(second.lock().unwrap().len(), 1);
    }

    #[test]
    fn unknown_command_uses_fallback_once() {
        let known: Calls<u8> = Arc::default();
        let fallback: Calls<u8> = Arc::default();
        let mut dispatcher = Dispatcher::builder()
            .on(0x01, recorder(&known))
            .fallback(28, recorder(&fallback))
            .build();

        assert_eq!(dispatcher.dispatch(0x13, &[9]), Dispatch::Fallback);
        assert!(known.lock().unwrap().is_empty());
        assert_eq!(*fallback.lock().unwrap(), vec![(0x13, vec![9])]);
    }

    #[test]
    fn unknown_command_without_fallback_is_dropped() {
        let mut dispatcher = Dispatcher::<u8>::with_fallback(28);
        assert_eq!(dispatcher.dispatch(0x05, &[]), Dispatch::Unhandled);
        assert_eq!(dispatcher.fallback(), Some(28));
        assert!(dispatcher.is_empty());
    }

    #[test]
    fn unregister_removes_handler() {
        let calls: Calls<CommandPair> = Arc::default();
        let vr = CommandPair::new(b'V', b'R');
        let mut dispatcher = Dispatcher::builder().on(vr, recorder(&calls)).build();

        assert!(dispatcher.is_registered(vr));
        assert!(dispatcher.unregister(vr));
        assert_eq!(dispatcher.dispatch(vr, &[]), Dispatch::Unhandled);
        assert_eq!(dispatcher.len(), 0);
    }
}

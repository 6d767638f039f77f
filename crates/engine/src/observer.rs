//! Observer registry: presentation code subscribes to state changes.

use crate::state::EconomyState;

/// Receives the state after every mutation.
pub trait StateObserver {
    fn on_state_changed(&mut self, state: &EconomyState);
}

impl<F> StateObserver for F
where
    F: FnMut(&EconomyState),
{
    fn on_state_changed(&mut self, state: &EconomyState) {
        self(state)
    }
}

/// Ordered list of observers, invoked synchronously in registration order.
#[derive(Default)]
pub struct ObserverRegistry {
    observers: Vec<Box<dyn StateObserver>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<O: StateObserver + 'static>(&mut self, observer: O) {
        self.observers.push(Box::new(observer));
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn notify(&mut self, state: &EconomyState) {
        for o in &mut self.observers {
            o.on_state_changed(state);
        }
    }
}

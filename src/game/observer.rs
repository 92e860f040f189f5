//! Change-notification lists shared by the observable state cells

use parking_lot::Mutex;

type Handler<T> = Box<dyn Fn(&T) + Send + Sync>;

/// Ordered list of state observers
pub struct Observers<T> {
    handlers: Mutex<Vec<Handler<T>>>,
}

impl<T> Observers<T> {
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
        }
    }

    /// Register an observer; it stays subscribed for the lifetime of the cell
    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.handlers.lock().push(Box::new(handler));
    }

    /// Invoke every observer in registration order.
    ///
    /// Handlers must not subscribe to the same list from inside the call.
    pub fn notify(&self, value: &T) {
        for handler in self.handlers.lock().iter() {
            handler(value);
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.lock().len()
    }
}

impl<T> Default for Observers<T> {
    fn default() -> Self {
        Self::new()
    }
}

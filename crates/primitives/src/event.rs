use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use parking_lot::RwLock;

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type BoxedListener<T> = Arc<dyn Fn(T) -> BoxFuture + Send + Sync>;

/// A subscription handle returned by [`Event::subscribe`]; pass it to
/// [`Event::unsubscribe`] to stop receiving future emissions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(usize);

/// A typed event with async listeners, replacing the event-emitter pattern
/// named in §9 ("Event emitters with async listeners. Replace with a typed
/// event value carrying `(subscribe, unsubscribe, emit)`"). Used for the
/// block cache's "new block" event (§4.2) and the block processor's
/// "new head" event (§4.3).
///
/// `emit` awaits each listener in registration order and does not return
/// until every listener has finished, matching §9's "`emit` awaits each
/// listener in registration order; there is no recursive re-entrance from
/// within a listener" - a listener that emits back into the same `Event`
/// while `emit` is running would deadlock on `listeners`' read lock only if
/// it tried to subscribe/unsubscribe, not on calling `emit` itself, since
/// the listener snapshot is taken before any listener runs.
pub struct Event<T: Clone + Send + 'static> {
    listeners: Arc<RwLock<Vec<(ListenerId, BoxedListener<T>)>>>,
    next_id: Arc<AtomicUsize>,
}

impl<T: Clone + Send + 'static> Default for Event<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> Clone for Event<T> {
    fn clone(&self) -> Self {
        Self { listeners: self.listeners.clone(), next_id: self.next_id.clone() }
    }
}

impl<T: Clone + Send + 'static> std::fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event").field("listener_count", &self.listeners.read().len()).finish()
    }
}

impl<T: Clone + Send + 'static> Event<T> {
    pub fn new() -> Self {
        Self { listeners: Arc::new(RwLock::new(Vec::new())), next_id: Arc::new(AtomicUsize::new(0)) }
    }

    /// Registers `listener`, called in order on every subsequent [`Event::emit`].
    pub fn subscribe<F, Fut>(&self, listener: F) -> ListenerId
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let boxed: BoxedListener<T> = Arc::new(move |value| Box::pin(listener(value)));
        self.listeners.write().push((id, boxed));
        id
    }

    /// Removes a previously-registered listener. A no-op if `id` is not
    /// currently registered (already unsubscribed, or from a different
    /// `Event`).
    pub fn unsubscribe(&self, id: ListenerId) {
        self.listeners.write().retain(|(listener_id, _)| *listener_id != id);
    }

    /// Invokes every currently-registered listener in registration order,
    /// awaiting each before starting the next.
    pub async fn emit(&self, value: T) {
        let snapshot: Vec<BoxedListener<T>> = self.listeners.read().iter().map(|(_, l)| l.clone()).collect();
        for listener in snapshot {
            listener(value.clone()).await;
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn listeners_run_in_registration_order() {
        let event: Event<u32> = Event::new();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let order_a = order.clone();
        event.subscribe(move |v| {
            let order_a = order_a.clone();
            async move { order_a.lock().push(("a", v)) }
        });
        let order_b = order.clone();
        event.subscribe(move |v| {
            let order_b = order_b.clone();
            async move { order_b.lock().push(("b", v)) }
        });

        event.emit(1).await;
        assert_eq!(*order.lock(), vec![("a", 1), ("b", 1)]);
    }

    #[tokio::test]
    async fn unsubscribe_stops_future_emissions() {
        let event: Event<u32> = Event::new();
        let count = Arc::new(AtomicU32::new(0));
        let count2 = count.clone();
        let id = event.subscribe(move |_| {
            let count2 = count2.clone();
            async move {
                count2.fetch_add(1, Ordering::SeqCst);
            }
        });

        event.emit(1).await;
        event.unsubscribe(id);
        event.emit(2).await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}

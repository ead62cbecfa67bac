//! Event queue module.
//!
//! Shared module providing the `event-queue` capability. Each region gets an
//! [`EventQueue`] that other modules obtain through
//! `World::request_interface`, and a poll handler at `/events/<region-id>`
//! that viewers long-poll for batches of events.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use uuid::Uuid;

use crate::codec::LlsdValue;
use crate::dispatch::poll::{PollEvents, PollServiceArgs};
use crate::error::HandlerError;
use crate::http::request::RequestBag;
use crate::http::response::ResponseDescriptor;
use crate::modules::module::{ModuleError, RegionModule};
use crate::modules::world::World;

pub const MODULE_NAME: &str = "event_queue";
pub const CAPABILITY: &str = "event-queue";

const DEFAULT_MAX_BATCH: usize = 100;

/// Poll path for a region's event queue.
pub fn events_path(region_id: Uuid) -> String {
    format!("/events/{}", region_id)
}

/// Pending events for one region.
pub struct EventQueue {
    region_id: Uuid,
    events: Mutex<VecDeque<LlsdValue>>,
    next_batch: AtomicI32,
    max_batch: Arc<AtomicUsize>,
}

impl EventQueue {
    fn new(region_id: Uuid, max_batch: Arc<AtomicUsize>) -> Self {
        Self {
            region_id,
            events: Mutex::new(VecDeque::new()),
            next_batch: AtomicI32::new(1),
            max_batch,
        }
    }

    pub fn region_id(&self) -> Uuid {
        self.region_id
    }

    /// Queue one event for delivery on the next poll.
    pub fn enqueue(&self, message: &str, body: LlsdValue) {
        let event = LlsdValue::Map(
            [
                ("message".to_string(), LlsdValue::String(message.to_string())),
                ("body".to_string(), body),
            ]
            .into_iter()
            .collect(),
        );
        self.events.lock().unwrap_or_else(PoisonError::into_inner).push_back(event);
    }

    pub fn pending(&self) -> usize {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Take up to `max_batch` events as `{ id, events: [...] }`.
    pub fn take_batch(&self) -> LlsdValue {
        let max = self.max_batch.load(Ordering::Relaxed).max(1);
        let events: Vec<LlsdValue> = {
            let mut queue = self.events.lock().unwrap_or_else(PoisonError::into_inner);
            let count = queue.len().min(max);
            queue.drain(..count).collect()
        };
        let id = self.next_batch.fetch_add(1, Ordering::Relaxed);
        LlsdValue::Map(
            [
                ("id".to_string(), LlsdValue::Integer(id)),
                ("events".to_string(), LlsdValue::Array(events)),
            ]
            .into_iter()
            .collect(),
        )
    }

    fn batch_response(&self) -> ResponseDescriptor {
        ResponseDescriptor::text("application/llsd+xml", self.take_batch().to_xml())
    }
}

impl PollEvents for EventQueue {
    fn has_events(&self, _request_id: Uuid) -> bool {
        self.pending() > 0
    }

    fn get_events(&self, _request_id: Uuid) -> ResponseDescriptor {
        self.batch_response()
    }

    fn no_events(&self, _request_id: Uuid) -> ResponseDescriptor {
        // Viewers treat 502 as "nothing happened, poll again".
        ResponseDescriptor::status(502)
            .with_content_type("text/plain")
            .with_body("Upstream error: ")
    }
}

/// The shared module serving every region's event queue.
pub struct EventQueueModule {
    queues: DashMap<Uuid, Arc<EventQueue>>,
    max_batch: Arc<AtomicUsize>,
    /// Poll timeout override in seconds; 0 uses the server default.
    poll_timeout_secs: AtomicU64,
}

impl EventQueueModule {
    pub fn new() -> Self {
        Self {
            queues: DashMap::new(),
            max_batch: Arc::new(AtomicUsize::new(DEFAULT_MAX_BATCH)),
            poll_timeout_secs: AtomicU64::new(0),
        }
    }

    /// The queue serving `region_id`, if attached.
    pub fn queue(&self, region_id: Uuid) -> Option<Arc<EventQueue>> {
        self.queues.get(&region_id).map(|entry| entry.value().clone())
    }
}

impl Default for EventQueueModule {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionModule for EventQueueModule {
    fn name(&self) -> &str {
        MODULE_NAME
    }

    fn replaceable_capability(&self) -> Option<&str> {
        Some(CAPABILITY)
    }

    fn initialise(&self, settings: &toml::Table) -> Result<(), ModuleError> {
        let max_batch = match settings.get("max_batch") {
            None => DEFAULT_MAX_BATCH,
            Some(value) => value
                .as_integer()
                .and_then(|n| usize::try_from(n).ok())
                .filter(|n| *n > 0)
                .ok_or_else(|| ModuleError::initialise(MODULE_NAME, "max_batch must be a positive integer"))?,
        };
        let timeout = match settings.get("poll_timeout_secs") {
            None => 0,
            Some(value) => value
                .as_integer()
                .and_then(|n| u64::try_from(n).ok())
                .ok_or_else(|| ModuleError::initialise(MODULE_NAME, "poll_timeout_secs must be a non-negative integer"))?,
        };

        self.max_batch.store(max_batch, Ordering::Relaxed);
        self.poll_timeout_secs.store(timeout, Ordering::Relaxed);
        tracing::debug!(max_batch, poll_timeout_secs = timeout, "Event queue configured");
        Ok(())
    }

    fn add_region(&self, world: &Arc<World>) -> Result<(), ModuleError> {
        let queue = Arc::new(EventQueue::new(world.id(), self.max_batch.clone()));
        if !world.register_capability(CAPABILITY, MODULE_NAME, queue.clone()) {
            return Err(ModuleError::attach(MODULE_NAME, world, "event-queue capability is held by another module"));
        }

        let mut args = PollServiceArgs::new(queue.clone());
        let timeout = self.poll_timeout_secs.load(Ordering::Relaxed);
        if timeout > 0 {
            args = args.with_timeout(Duration::from_secs(timeout));
        }

        // Served directly only if the poll hand-off is bypassed.
        let weak = Arc::downgrade(&queue);
        let fallback = move |_: &RequestBag| -> Result<ResponseDescriptor, HandlerError> {
            let queue = weak.upgrade().ok_or(HandlerError::NotFound)?;
            Ok(queue.batch_response())
        };

        let path = events_path(world.id());
        if !world.registries().add_poll_handler(&path, fallback, args) {
            return Err(ModuleError::attach(MODULE_NAME, world, format!("{} is already registered", path)));
        }

        self.queues.insert(world.id(), queue);
        tracing::info!(region = %world.name(), path = %path, "Event queue attached");
        Ok(())
    }

    fn remove_region(&self, world: &Arc<World>) {
        world.registries().remove_poll_handler(&events_path(world.id()));
        self.queues.remove(&world.id());
    }

    fn close(&self) {
        self.queues.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::registry::HandlerRegistries;

    fn attached() -> (EventQueueModule, Arc<World>) {
        let module = EventQueueModule::new();
        let world = Arc::new(World::new("Alpha", Arc::new(HandlerRegistries::new())));
        module.add_region(&world).unwrap();
        (module, world)
    }

    #[test]
    fn test_attach_registers_capability_and_poll_handler() {
        let (module, world) = attached();
        let path = events_path(world.id());
        assert!(world.registries().poll.get_exact(&path).is_some());
        assert!(world.registries().http.get_exact(&path).is_some());

        let queue = world.request_interface::<EventQueue>(CAPABILITY).unwrap();
        assert_eq!(queue.region_id(), world.id());
        assert!(Arc::ptr_eq(&queue, &module.queue(world.id()).unwrap()));

        module.remove_region(&world);
        assert!(world.registries().poll.get_exact(&path).is_none());
        assert!(world.registries().http.get_exact(&path).is_none());
        assert!(module.queue(world.id()).is_none());
    }

    #[test]
    fn test_batches_respect_max_batch() {
        let module = EventQueueModule::new();
        let mut settings = toml::Table::new();
        settings.insert("max_batch".to_string(), toml::Value::Integer(2));
        module.initialise(&settings).unwrap();

        let world = Arc::new(World::new("Alpha", Arc::new(HandlerRegistries::new())));
        module.add_region(&world).unwrap();
        let queue = module.queue(world.id()).unwrap();
        for n in 0..3 {
            queue.enqueue("Ping", LlsdValue::Integer(n));
        }
        assert!(queue.has_events(Uuid::nil()));

        let first = queue.take_batch();
        assert_eq!(first.get("id"), Some(&LlsdValue::Integer(1)));
        assert!(matches!(first.get("events"), Some(LlsdValue::Array(events)) if events.len() == 2));

        let second = queue.take_batch();
        assert_eq!(second.get("id"), Some(&LlsdValue::Integer(2)));
        assert!(matches!(second.get("events"), Some(LlsdValue::Array(events)) if events.len() == 1));
        assert!(!queue.has_events(Uuid::nil()));
    }

    #[test]
    fn test_no_events_is_502() {
        let (module, world) = attached();
        let descriptor = module.queue(world.id()).unwrap().no_events(Uuid::nil());
        assert_eq!(descriptor.status, Some(502));
    }

    #[test]
    fn test_bad_settings_rejected() {
        let module = EventQueueModule::new();
        let mut settings = toml::Table::new();
        settings.insert("max_batch".to_string(), toml::Value::Integer(0));
        assert!(matches!(module.initialise(&settings), Err(ModuleError::Initialise { .. })));
    }

    #[test]
    fn test_second_region_gets_its_own_queue() {
        let (module, first) = attached();
        let second = Arc::new(World::new("Beta", first.registries().clone()));
        module.add_region(&second).unwrap();
        assert!(!Arc::ptr_eq(
            &module.queue(first.id()).unwrap(),
            &module.queue(second.id()).unwrap()
        ));
    }
}

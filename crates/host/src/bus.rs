//! In-memory publish/subscribe bus
//!
//! Latest-value semantics per topic instance: publishers overwrite, every
//! subscriber sees the newest payload once. A condition variable backs the
//! engine's bounded wait on its pacing gyro.
//!
//! An instance can exist without being advertised (a subscriber arrived
//! first); only advertised instances count towards `group_count`, which is
//! what drives the engine's instance adoption.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use sensorvote_engine::bus::{Bus, BusMessage, SubHandle, WaitResult};

/// Default publisher priority, matching a plain onboard sensor.
pub const PRIORITY_DEFAULT: u8 = 75;

struct InstanceState {
    latest: Option<Box<dyn Any + Send>>,
    generation: u64,
    priority: u8,
    advertised: bool,
    /// Subscriber slot -> generation last copied.
    seen: HashMap<usize, u64>,
}

impl InstanceState {
    fn new() -> Self {
        Self {
            latest: None,
            generation: 0,
            priority: PRIORITY_DEFAULT,
            advertised: false,
            seen: HashMap::new(),
        }
    }
}

#[derive(Default)]
struct BusInner {
    topics: HashMap<&'static str, Vec<InstanceState>>,
    next_slot: usize,
}

impl BusInner {
    fn instance_mut(&mut self, topic: &'static str, instance: usize) -> &mut InstanceState {
        let instances = self.topics.entry(topic).or_default();
        while instances.len() <= instance {
            instances.push(InstanceState::new());
        }
        &mut instances[instance]
    }

    fn instance(&self, topic: &'static str, instance: usize) -> Option<&InstanceState> {
        self.topics.get(topic)?.get(instance)
    }
}

/// Shared in-memory bus; clones address the same topics.
#[derive(Clone, Default)]
pub struct MemoryBus {
    shared: Arc<(Mutex<BusInner>, Condvar)>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advertises a topic instance with an explicit priority, as a driver
    /// would at startup. Publishing also advertises (at default priority),
    /// so this only matters for multi-instance priority setups.
    pub fn advertise<M: BusMessage>(&self, instance: usize, priority: u8) {
        let (lock, cvar) = &*self.shared;
        let mut inner = lock.lock().unwrap();
        let state = inner.instance_mut(M::TOPIC, instance);
        state.priority = priority;
        state.advertised = true;
        cvar.notify_all();
    }

    fn updated_inner(inner: &BusInner, topic: &'static str, instance: usize, slot: usize) -> bool {
        match inner.instance(topic, instance) {
            Some(state) => {
                state.latest.is_some()
                    && state.generation > state.seen.get(&slot).copied().unwrap_or(0)
            }
            None => false,
        }
    }
}

impl Bus for MemoryBus {
    fn group_count<M: BusMessage>(&self) -> usize {
        let (lock, _) = &*self.shared;
        let inner = lock.lock().unwrap();
        inner
            .topics
            .get(M::TOPIC)
            .map(|instances| instances.iter().filter(|i| i.advertised).count())
            .unwrap_or(0)
    }

    fn subscribe<M: BusMessage>(&mut self, instance: usize) -> Option<SubHandle<M>> {
        let (lock, _) = &*self.shared;
        let mut inner = lock.lock().unwrap();
        let slot = inner.next_slot;
        inner.next_slot += 1;
        let state = inner.instance_mut(M::TOPIC, instance);
        state.seen.insert(slot, 0);
        Some(SubHandle::new(instance, slot))
    }

    fn priority<M: BusMessage>(&self, sub: &SubHandle<M>) -> u8 {
        let (lock, _) = &*self.shared;
        let inner = lock.lock().unwrap();
        inner
            .instance(M::TOPIC, sub.instance())
            .map(|state| state.priority)
            .unwrap_or(PRIORITY_DEFAULT)
    }

    fn updated<M: BusMessage>(&self, sub: &SubHandle<M>) -> bool {
        let (lock, _) = &*self.shared;
        let inner = lock.lock().unwrap();
        Self::updated_inner(&inner, M::TOPIC, sub.instance(), sub.slot())
    }

    fn copy<M: BusMessage>(&mut self, sub: &SubHandle<M>) -> Option<M> {
        let (lock, _) = &*self.shared;
        let mut inner = lock.lock().unwrap();
        let state = inner.instance_mut(M::TOPIC, sub.instance());
        let generation = state.generation;
        let payload = state.latest.as_ref()?.downcast_ref::<M>().cloned()?;
        state.seen.insert(sub.slot(), generation);
        Some(payload)
    }

    fn publish_instance<M: BusMessage>(&mut self, instance: usize, msg: &M) {
        let (lock, cvar) = &*self.shared;
        let mut inner = lock.lock().unwrap();
        let state = inner.instance_mut(M::TOPIC, instance);
        state.latest = Some(Box::new(msg.clone()));
        state.generation += 1;
        state.advertised = true;
        cvar.notify_all();
    }

    fn wait<M: BusMessage>(&self, sub: &SubHandle<M>, timeout_us: u64) -> WaitResult {
        let (lock, cvar) = &*self.shared;
        let deadline = Instant::now() + Duration::from_micros(timeout_us);
        let mut inner = lock.lock().unwrap();

        loop {
            if inner.instance(M::TOPIC, sub.instance()).is_none() {
                return WaitResult::NoSubscription;
            }
            if Self::updated_inner(&inner, M::TOPIC, sub.instance(), sub.slot()) {
                return WaitResult::Updated;
            }

            let now = Instant::now();
            if now >= deadline {
                return WaitResult::TimedOut;
            }

            let (guard, result) = cvar.wait_timeout(inner, deadline - now).unwrap();
            inner = guard;
            if result.timed_out() {
                // one last check before reporting the timeout
                if Self::updated_inner(&inner, M::TOPIC, sub.instance(), sub.slot()) {
                    return WaitResult::Updated;
                }
                return WaitResult::TimedOut;
            }
        }
    }

    fn unsubscribe<M: BusMessage>(&mut self, sub: SubHandle<M>) {
        let (lock, _) = &*self.shared;
        let mut inner = lock.lock().unwrap();
        if let Some(instances) = inner.topics.get_mut(M::TOPIC) {
            if let Some(state) = instances.get_mut(sub.instance()) {
                state.seen.remove(&sub.slot());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensorvote_core::msg::GyroSample;
    use std::thread;

    #[test]
    fn test_publish_subscribe_roundtrip() {
        let mut bus = MemoryBus::new();
        let sub = bus.subscribe::<GyroSample>(0).unwrap();

        assert!(!bus.updated(&sub));
        assert_eq!(bus.copy(&sub), None);

        let sample = GyroSample {
            timestamp: 1000,
            x: 0.1,
            ..Default::default()
        };
        bus.publish(&sample);

        assert!(bus.updated(&sub));
        assert_eq!(bus.copy(&sub), Some(sample));
        // copy consumed the update
        assert!(!bus.updated(&sub));
    }

    #[test]
    fn test_group_count_tracks_advertised_instances() {
        let mut bus = MemoryBus::new();
        assert_eq!(bus.group_count::<GyroSample>(), 0);

        // a subscriber alone does not advertise
        let _sub = bus.subscribe::<GyroSample>(0).unwrap();
        assert_eq!(bus.group_count::<GyroSample>(), 0);

        bus.publish_instance(0, &GyroSample::default());
        bus.publish_instance(1, &GyroSample::default());
        assert_eq!(bus.group_count::<GyroSample>(), 2);
    }

    #[test]
    fn test_subscribers_see_updates_independently() {
        let mut bus = MemoryBus::new();
        let sub_a = bus.subscribe::<GyroSample>(0).unwrap();
        let sub_b = bus.subscribe::<GyroSample>(0).unwrap();

        bus.publish(&GyroSample::default());
        assert!(bus.updated(&sub_a));
        assert!(bus.updated(&sub_b));

        let _ = bus.copy(&sub_a);
        assert!(!bus.updated(&sub_a));
        assert!(bus.updated(&sub_b));
    }

    #[test]
    fn test_priority_from_advertisement() {
        let mut bus = MemoryBus::new();
        bus.advertise::<GyroSample>(0, 125);
        let sub = bus.subscribe::<GyroSample>(0).unwrap();
        assert_eq!(bus.priority(&sub), 125);
    }

    #[test]
    fn test_wait_times_out() {
        let mut bus = MemoryBus::new();
        let sub = bus.subscribe::<GyroSample>(0).unwrap();
        assert_eq!(bus.wait(&sub, 10_000), WaitResult::TimedOut);
    }

    #[test]
    fn test_wait_wakes_on_publish() {
        let mut bus = MemoryBus::new();
        let sub = bus.subscribe::<GyroSample>(0).unwrap();

        let mut publisher = bus.clone();
        let handle = thread::spawn(move || {
            thread::sleep(std::time::Duration::from_millis(5));
            publisher.publish(&GyroSample::default());
        });

        assert_eq!(bus.wait(&sub, 500_000), WaitResult::Updated);
        handle.join().unwrap();
    }
}

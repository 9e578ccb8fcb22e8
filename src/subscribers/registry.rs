use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use indexmap::IndexMap;
use log::{debug, error, info};

use super::event::{ClientEvent, Event};
use super::sink::{Sink, SubscriberId};
use super::Broadcaster;
use crate::error::Result;
use crate::monitor::MonitorState;
use crate::settings::{Settings, SettingsStore};

/// Connected subscribers plus the settings they all share.
pub struct SubscriberRegistry {
    sinks: Mutex<IndexMap<SubscriberId, Arc<dyn Sink>>>,
    settings_store: Arc<SettingsStore>,
    settings: RwLock<Settings>,
    state: Arc<MonitorState>,
}

impl SubscriberRegistry {
    pub fn new(settings_store: Arc<SettingsStore>, state: Arc<MonitorState>) -> Self {
        let settings = settings_store.load_or_default();

        Self {
            sinks: Mutex::new(IndexMap::new()),
            settings_store,
            settings: RwLock::new(settings),
            state,
        }
    }

    fn sinks(&self) -> MutexGuard<'_, IndexMap<SubscriberId, Arc<dyn Sink>>> {
        self.sinks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sink(&self, id: SubscriberId) -> Option<Arc<dyn Sink>> {
        self.sinks().get(&id).cloned()
    }

    pub fn current_settings(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.sinks().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks().is_empty()
    }

    /// Adds a subscriber and replays the current snapshot and settings to it.
    ///
    /// Returns `false` (and sends nothing) if the id is already registered.
    pub fn register(&self, sink: Arc<dyn Sink>) -> bool {
        let id = sink.id();
        let mut sinks = self.sinks();
        if sinks.contains_key(&id) {
            debug!("Subscriber {id} already registered");
            return false;
        }

        // Replayed under the lock: concurrent broadcasts land after it.
        sinks.insert(id, Arc::clone(&sink));
        sink.send(Event::pipelines_updated(&self.state.snapshot()));
        sink.send(Event::SettingsUpdated(self.current_settings()));
        drop(sinks);

        info!("Subscriber {id} connected");
        true
    }

    /// Removes a subscriber; unknown ids are ignored.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let removed = self.sinks().shift_remove(&id).is_some();
        if removed {
            info!("Subscriber {id} disconnected");
        }
        removed
    }

    /// Sends `event` to every registered subscriber, best effort.
    pub fn broadcast(&self, event: &Event) {
        if self.is_empty() {
            debug!("No subscribers for {}", event.name());
            return;
        }

        let sinks: Vec<Arc<dyn Sink>> = self.sinks().values().cloned().collect();
        debug!("Broadcasting {} to {} subscribers", event.name(), sinks.len());

        for sink in sinks {
            if !sink.send(event.clone()) {
                debug!("Subscriber {} did not accept {}", sink.id(), event.name());
            }
        }
    }

    /// Persists settings sent by `origin` and broadcasts the saved result to
    /// every subscriber, `origin` included.
    ///
    /// On failure only `origin` is told, with a `settings:error` event.
    ///
    /// # Errors
    ///
    /// Returns the store error when the settings could not be saved.
    pub fn relay_settings_update(&self, origin: SubscriberId, settings: Settings) -> Result<Settings> {
        match self.settings_store.save(&settings) {
            Ok(saved) => {
                *self.settings.write().unwrap_or_else(PoisonError::into_inner) = saved.clone();
                self.broadcast(&Event::SettingsUpdated(saved.clone()));
                Ok(saved)
            }
            Err(e) => {
                error!("Failed to save settings from subscriber {origin}: {e}");
                if let Some(sink) = self.sink(origin) {
                    sink.send(Event::SettingsError(format!("Settings were not saved: {e}")));
                }
                Err(e)
            }
        }
    }

    /// Dispatches a request received from subscriber `origin`.
    pub fn handle_client_event(&self, origin: SubscriberId, event: ClientEvent) {
        match event {
            ClientEvent::SettingsUpdate(settings) => {
                // Failures are already reported to the originator.
                let _ = self.relay_settings_update(origin, settings);
            }
            ClientEvent::PipelinesGet => {
                if let Some(sink) = self.sink(origin) {
                    sink.send(Event::PipelinesNames(self.state.pipeline_names().to_vec()));
                }
            }
        }
    }
}

impl Broadcaster for SubscriberRegistry {
    fn publish(&self, event: Event) {
        self.broadcast(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MonitorError;
    use crate::monitor::Snapshot;
    use crate::settings::{DocumentStore, MemoryStore};
    use crate::status::{BuildStatus, PipelineStatus};
    use crate::subscribers::ChannelSink;
    use serde_json::Value;
    use tokio::sync::mpsc::UnboundedReceiver;

    /// Store whose writes always fail.
    #[derive(Default)]
    struct ReadOnlyStore(MemoryStore);

    impl DocumentStore for ReadOnlyStore {
        fn find_one(&self, filter: &Value) -> Result<Option<Value>> {
            self.0.find_one(filter)
        }
        fn insert(&self, _document: Value) -> Result<Value> {
            Err(MonitorError::Store("read-only".into()))
        }
        fn update(&self, _id: &str, _document: Value) -> Result<bool> {
            Err(MonitorError::Store("read-only".into()))
        }
        fn compact(&self) -> Result<()> {
            Ok(())
        }
        fn count(&self) -> Result<usize> {
            self.0.count()
        }
    }

    fn status(name: &str) -> PipelineStatus {
        PipelineStatus {
            name: name.to_string(),
            status: BuildStatus::Passed,
            health: 0,
            buildtime: 10,
            author: "Jane Doe".to_string(),
            counter: 1,
            stage_results: vec![],
        }
    }

    fn registry_with(store: Box<dyn DocumentStore>) -> (SubscriberRegistry, Arc<MonitorState>) {
        let state = Arc::new(MonitorState::default());
        state.replace_snapshot(Snapshot::from([("build".to_string(), status("build"))]));
        state.set_pipeline_names(vec!["build".to_string(), "deploy".to_string()]);

        let registry = SubscriberRegistry::new(
            Arc::new(SettingsStore::new(store)),
            Arc::clone(&state),
        );
        (registry, state)
    }

    fn registry() -> SubscriberRegistry {
        registry_with(Box::new(MemoryStore::default())).0
    }

    fn drain(rx: &mut UnboundedReceiver<Event>) -> Vec<Event> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    fn dark_settings() -> Settings {
        Settings {
            disabled_pipelines: vec!["deploy".to_string()],
            filter_regex: "^release-".to_string(),
            dark_theme: true,
            ..Settings::default()
        }
    }

    #[test]
    fn test_register_replays_snapshot_and_settings() {
        let registry = registry();
        let (sink, mut rx) = ChannelSink::new(1);

        assert!(registry.register(Arc::new(sink)));

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                Event::PipelinesUpdated(vec![status("build")]),
                Event::SettingsUpdated(Settings::default()),
            ]
        );
    }

    #[test]
    fn test_register_same_id_twice_pushes_once() {
        let registry = registry();
        let (first, mut first_rx) = ChannelSink::new(1);
        let (second, mut second_rx) = ChannelSink::new(1);

        assert!(registry.register(Arc::new(first)));
        assert!(!registry.register(Arc::new(second)));

        assert_eq!(registry.len(), 1);
        assert_eq!(drain(&mut first_rx).len(), 2);
        assert!(drain(&mut second_rx).is_empty());
    }

    #[test]
    fn test_replay_is_never_newer_than_the_last_broadcast() {
        let (registry, state) = registry_with(Box::new(MemoryStore::default()));
        let registry = Arc::new(registry);

        let publisher = {
            let registry = Arc::clone(&registry);
            let state = Arc::clone(&state);
            std::thread::spawn(move || {
                for counter in 1..=200 {
                    let mut current = status("build");
                    current.counter = counter;
                    let snapshot =
                        state.replace_snapshot(Snapshot::from([("build".to_string(), current)]));
                    registry.publish(Event::pipelines_updated(&snapshot));
                }
            })
        };

        let receivers: Vec<_> = (1..=50)
            .map(|id| {
                let (sink, rx) = ChannelSink::new(id);
                registry.register(Arc::new(sink));
                rx
            })
            .collect();
        publisher.join().unwrap();

        let latest = Event::pipelines_updated(&state.snapshot());
        for mut rx in receivers {
            let last_update = drain(&mut rx)
                .into_iter()
                .filter(|event| matches!(event, Event::PipelinesUpdated(_)))
                .last();
            assert_eq!(last_update, Some(latest.clone()));
        }
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let registry = registry();
        let (sink, _rx) = ChannelSink::new(4);
        registry.register(Arc::new(sink));

        assert!(registry.unregister(4));
        assert!(!registry.unregister(4));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_broadcast_reaches_every_subscriber() {
        let registry = registry();
        let (a, mut a_rx) = ChannelSink::new(1);
        let (b, mut b_rx) = ChannelSink::new(2);
        registry.register(Arc::new(a));
        registry.register(Arc::new(b));
        drain(&mut a_rx);
        drain(&mut b_rx);

        registry.publish(Event::PipelinesNames(vec!["x".to_string()]));

        assert_eq!(drain(&mut a_rx), vec![Event::PipelinesNames(vec!["x".to_string()])]);
        assert_eq!(drain(&mut b_rx), vec![Event::PipelinesNames(vec!["x".to_string()])]);
    }

    #[test]
    fn test_broadcast_tolerates_dropped_subscriber() {
        let registry = registry();
        let (gone, gone_rx) = ChannelSink::new(1);
        let (alive, mut alive_rx) = ChannelSink::new(2);
        registry.register(Arc::new(gone));
        registry.register(Arc::new(alive));
        drop(gone_rx);
        drain(&mut alive_rx);

        registry.broadcast(&Event::SettingsError("x".into()));

        // Pruned only on explicit unregister
        assert_eq!(registry.len(), 2);
        assert_eq!(drain(&mut alive_rx).len(), 1);
    }

    #[test]
    fn test_relay_saves_and_broadcasts_to_all_including_origin() {
        let registry = registry();
        let (origin, mut origin_rx) = ChannelSink::new(1);
        let (other, mut other_rx) = ChannelSink::new(2);
        registry.register(Arc::new(origin));
        registry.register(Arc::new(other));
        drain(&mut origin_rx);
        drain(&mut other_rx);

        let saved = registry.relay_settings_update(1, dark_settings()).unwrap();

        assert_eq!(saved, dark_settings());
        assert_eq!(registry.current_settings(), dark_settings());
        assert_eq!(registry.settings_store.get().unwrap(), Some(dark_settings()));
        assert_eq!(drain(&mut origin_rx), vec![Event::SettingsUpdated(dark_settings())]);
        assert_eq!(drain(&mut other_rx), vec![Event::SettingsUpdated(dark_settings())]);
    }

    #[test]
    fn test_relay_failure_notifies_only_origin() {
        let (registry, _state) = registry_with(Box::new(ReadOnlyStore::default()));
        let (origin, mut origin_rx) = ChannelSink::new(1);
        let (other, mut other_rx) = ChannelSink::new(2);
        registry.register(Arc::new(origin));
        registry.register(Arc::new(other));
        drain(&mut origin_rx);
        drain(&mut other_rx);

        let result = registry.relay_settings_update(1, dark_settings());

        assert!(result.is_err());
        assert_eq!(registry.current_settings(), Settings::default());
        assert!(matches!(
            drain(&mut origin_rx).as_slice(),
            [Event::SettingsError(_)]
        ));
        assert!(drain(&mut other_rx).is_empty());
    }

    #[test]
    fn test_pipelines_get_answers_only_requester() {
        let registry = registry();
        let (asker, mut asker_rx) = ChannelSink::new(1);
        let (other, mut other_rx) = ChannelSink::new(2);
        registry.register(Arc::new(asker));
        registry.register(Arc::new(other));
        drain(&mut asker_rx);
        drain(&mut other_rx);

        registry.handle_client_event(1, ClientEvent::PipelinesGet);

        assert_eq!(
            drain(&mut asker_rx),
            vec![Event::PipelinesNames(vec![
                "build".to_string(),
                "deploy".to_string()
            ])]
        );
        assert!(drain(&mut other_rx).is_empty());
    }

    #[test]
    fn test_new_registry_loads_stored_settings() {
        let store = MemoryStore::default();
        store
            .insert(serde_json::to_value(dark_settings()).unwrap())
            .unwrap();

        let (registry, _state) = registry_with(Box::new(store));

        assert_eq!(registry.current_settings(), dark_settings());
    }
}

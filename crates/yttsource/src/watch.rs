//! Backend watches and the routing of their events to YttSources.
//!
//! Each watched kind runs one task. The task turns raw watch events into
//! [`BackendEvent`]s, filters them, looks up the dependents in the
//! [`ReferenceIndex`] and pushes one reconcile request per dependent onto a
//! bounded queue consumed by the controller.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::StreamExt;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, Resource};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::api::{Bucket, GitRepository, OCIRepository, YttSource};
use crate::filter::{is_reconcile_worthy, BackendEvent, BackendObject};
use crate::index::ReferenceIndex;
use crate::reference::{ObjectKey, ReferenceKind};

/// Sending side of the reconcile queue.
pub type ReconcileQueue = mpsc::Sender<ObjectRef<YttSource>>;

/// Turns a watch stream into created/updated/deleted transitions.
///
/// The translator remembers the last object seen per key. After a relist,
/// objects that were known but did not reappear are reported as deleted.
#[derive(Debug)]
pub struct EventTranslator<K> {
    last_seen: HashMap<ObjectKey, K>,
    relisted: Option<HashSet<ObjectKey>>,
}

impl<K> Default for EventTranslator<K> {
    fn default() -> Self {
        Self {
            last_seen: HashMap::new(),
            relisted: None,
        }
    }
}

impl<K: Resource + Clone> EventTranslator<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn translate(&mut self, event: watcher::Event<K>) -> Vec<BackendEvent<K>> {
        match event {
            watcher::Event::Apply(obj) => vec![self.applied(obj)],
            watcher::Event::Delete(obj) => {
                self.last_seen.remove(&ObjectKey::from_resource(&obj));
                vec![BackendEvent::Deleted(obj)]
            }
            watcher::Event::Init => {
                self.relisted = Some(HashSet::new());
                Vec::new()
            }
            watcher::Event::InitApply(obj) => {
                if let Some(seen) = self.relisted.as_mut() {
                    seen.insert(ObjectKey::from_resource(&obj));
                }
                vec![self.applied(obj)]
            }
            watcher::Event::InitDone => {
                let seen = self.relisted.take().unwrap_or_default();
                let gone: Vec<ObjectKey> = self
                    .last_seen
                    .keys()
                    .filter(|key| !seen.contains(*key))
                    .cloned()
                    .collect();
                gone.into_iter()
                    .filter_map(|key| self.last_seen.remove(&key))
                    .map(BackendEvent::Deleted)
                    .collect()
            }
        }
    }

    fn applied(&mut self, obj: K) -> BackendEvent<K> {
        let key = ObjectKey::from_resource(&obj);
        match self.last_seen.insert(key, obj.clone()) {
            Some(old) => BackendEvent::Updated { old, new: obj },
            None => BackendEvent::Created(obj),
        }
    }
}

/// YttSources to reconcile because of `event`.
pub fn dependents_for_event<K: BackendObject>(
    index: &ReferenceIndex,
    event: &BackendEvent<K>,
) -> Vec<ObjectKey> {
    if !is_reconcile_worthy(event) {
        return Vec::new();
    }
    index.dependents_of(&event.object().external_reference())
}

/// Pushes a reconcile request for `key`, waiting for queue capacity.
pub async fn enqueue(
    queue: &ReconcileQueue,
    key: &ObjectKey,
) -> Result<(), mpsc::error::SendError<ObjectRef<YttSource>>> {
    queue
        .send(ObjectRef::new(&key.name).within(&key.namespace))
        .await
}

/// Starts backend watches on demand, at most once per kind.
pub struct WatchRegistry {
    client: Client,
    index: Arc<ReferenceIndex>,
    queue: ReconcileQueue,
    tasks: Mutex<HashMap<ReferenceKind, JoinHandle<()>>>,
}

impl WatchRegistry {
    pub fn new(client: Client, index: Arc<ReferenceIndex>, queue: ReconcileQueue) -> Self {
        Self {
            client,
            index,
            queue,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Starts watching `kind` cluster-wide. Returns false if it was already
    /// being watched.
    pub fn register(&self, kind: ReferenceKind) -> bool {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if tasks.contains_key(&kind) {
            return false;
        }

        let client = self.client.clone();
        let index = Arc::clone(&self.index);
        let queue = self.queue.clone();
        let handle = match kind {
            ReferenceKind::ConfigMap => {
                tokio::spawn(route_events(Api::<ConfigMap>::all(client), index, queue))
            }
            ReferenceKind::Secret => {
                tokio::spawn(route_events(Api::<Secret>::all(client), index, queue))
            }
            ReferenceKind::GitRepository => {
                tokio::spawn(route_events(Api::<GitRepository>::all(client), index, queue))
            }
            ReferenceKind::OCIRepository => {
                tokio::spawn(route_events(Api::<OCIRepository>::all(client), index, queue))
            }
            ReferenceKind::Bucket => {
                tokio::spawn(route_events(Api::<Bucket>::all(client), index, queue))
            }
        };
        tasks.insert(kind, handle);

        log::info!("Watching {} objects", kind);
        true
    }
}

impl Drop for WatchRegistry {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut().unwrap_or_else(PoisonError::into_inner);
        for (_, handle) in tasks.drain() {
            handle.abort();
        }
    }
}

async fn route_events<K: BackendObject>(
    api: Api<K>,
    index: Arc<ReferenceIndex>,
    queue: ReconcileQueue,
) {
    let mut events = watcher(api, watcher::Config::default())
        .default_backoff()
        .boxed();
    let mut translator = EventTranslator::<K>::new();

    while let Some(event) = events.next().await {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                log::warn!("{} watch error: {}", K::KIND, e);
                continue;
            }
        };

        for change in translator.translate(event) {
            for key in dependents_for_event(&index, &change) {
                log::debug!("{} change queues YttSource {}", K::KIND, key);
                if enqueue(&queue, &key).await.is_err() {
                    log::info!("Reconcile queue closed, stopping {} watch", K::KIND);
                    return;
                }
            }
        }
    }
}

/// Watches YttSources and drops deleted ones from `index`.
///
/// The reconcile loop never sees an object that has already vanished from
/// its cache, so deletions are handled here.
pub fn spawn_source_cleanup(api: Api<YttSource>, index: Arc<ReferenceIndex>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut events = watcher(api, watcher::Config::default())
            .default_backoff()
            .boxed();
        let mut translator = EventTranslator::<YttSource>::new();

        while let Some(event) = events.next().await {
            match event {
                Ok(event) => {
                    for change in translator.translate(event) {
                        if let BackendEvent::Deleted(source) = change {
                            let key = ObjectKey::from_resource(&source);
                            log::debug!("YttSource {} deleted, dropping its reference", key);
                            index.remove(&key);
                        }
                    }
                }
                Err(e) => log::warn!("YttSource watch error: {}", e),
            }
        }
    })
}

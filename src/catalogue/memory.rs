//! In-process catalogue.
//!
//! Behaves like the REST catalogue closely enough for the pipeline: records
//! get numeric ids, lists of objects inside a record get per-item ids the way
//! repeatable components do, and updates merge attributes. Every call is
//! recorded so tests can assert on what the pipeline sent.

use super::{CatalogueClient, CatalogueEntry, Collection};
use crate::error::Result;
use crate::types::RecordId;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A call received by [`InMemoryCatalogue`].
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogueCall {
    GetAll(Collection),
    FindOne {
        collection: Collection,
        field: String,
        value: String,
    },
    Create {
        collection: Collection,
        data: Value,
    },
    Update {
        collection: Collection,
        id: RecordId,
        data: Value,
    },
    Delete {
        collection: Collection,
        id: RecordId,
    },
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    records: HashMap<Collection, Vec<CatalogueEntry>>,
    calls: Vec<CatalogueCall>,
    failing_lists: HashSet<Collection>,
    failing_names: HashSet<String>,
}

impl State {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Give every object inside a list attribute an id if it has none.
    fn assign_item_ids(&mut self, attributes: &mut Map<String, Value>) {
        for value in attributes.values_mut() {
            let Value::Array(items) = value else { continue };
            for item in items {
                if let Value::Object(object) = item {
                    if !object.contains_key("id") {
                        let id = self.allocate();
                        object.insert("id".to_string(), Value::from(id));
                    }
                }
            }
        }
    }
}

/// Catalogue kept in memory.
#[derive(Debug, Default)]
pub struct InMemoryCatalogue {
    state: Mutex<State>,
    latency: Option<Duration>,
    unreachable: AtomicBool,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl InMemoryCatalogue {
    /// An empty catalogue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every write call, so concurrent callers overlap.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make [`CatalogueClient::ping`] fail.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Make listing a collection fail.
    pub fn fail_listing(&self, collection: Collection) {
        self.state().failing_lists.insert(collection);
    }

    /// Make writes of records with this `name` fail.
    pub fn fail_writes_for(&self, name: impl Into<String>) {
        self.state().failing_names.insert(name.into());
    }

    /// Seed a record without recording a call.
    pub fn insert(&self, collection: Collection, attributes: Value) -> RecordId {
        let mut state = self.state();
        let id = RecordId::Number(state.allocate());
        let mut attributes = match attributes {
            Value::Object(object) => object,
            _ => Map::new(),
        };
        state.assign_item_ids(&mut attributes);
        state.records.entry(collection).or_default().push(CatalogueEntry {
            id: id.clone(),
            attributes,
        });
        id
    }

    /// Current records of a collection.
    #[must_use]
    pub fn records(&self, collection: Collection) -> Vec<CatalogueEntry> {
        self.state().records.get(&collection).cloned().unwrap_or_default()
    }

    /// Names of the records in a collection, sorted.
    #[must_use]
    pub fn names(&self, collection: Collection) -> Vec<String> {
        let mut names: Vec<String> = self
            .records(collection)
            .iter()
            .filter_map(|entry| entry.name().map(str::to_string))
            .collect();
        names.sort();
        names
    }

    /// Every call received so far, in arrival order.
    #[must_use]
    pub fn calls(&self) -> Vec<CatalogueCall> {
        self.state().calls.clone()
    }

    /// Highest number of write calls observed in flight at once.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        InFlight(&self.in_flight)
    }

    fn rejected(operation: &'static str, collection: Collection, message: String) -> crate::DiscoveryError {
        crate::err!(Catalogue {
            operation,
            collection: collection.to_string(),
            message,
            status_code: Some(500),
        })
    }

    fn check_writable(&self, operation: &'static str, collection: Collection, name: Option<&str>) -> Result<()> {
        match name {
            Some(name) if self.state().failing_names.contains(name) => Err(Self::rejected(
                operation,
                collection,
                format!("injected failure for '{name}'"),
            )),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl CatalogueClient for InMemoryCatalogue {
    async fn ping(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(crate::err!(CatalogueUnavailable {
                url: "memory://catalogue".to_string(),
                message: "catalogue marked unreachable".to_string(),
            }));
        }
        Ok(())
    }

    async fn get_all(&self, collection: Collection) -> Result<Vec<CatalogueEntry>> {
        let mut state = self.state();
        state.calls.push(CatalogueCall::GetAll(collection));
        if state.failing_lists.contains(&collection) {
            return Err(Self::rejected("get", collection, "injected listing failure".to_string()));
        }
        Ok(state.records.get(&collection).cloned().unwrap_or_default())
    }

    async fn find_one(&self, collection: Collection, field: &str, value: &str) -> Result<Option<CatalogueEntry>> {
        let mut state = self.state();
        state.calls.push(CatalogueCall::FindOne {
            collection,
            field: field.to_string(),
            value: value.to_string(),
        });
        Ok(state
            .records
            .get(&collection)
            .and_then(|entries| {
                entries
                    .iter()
                    .find(|entry| entry.get(field).and_then(Value::as_str) == Some(value))
            })
            .cloned())
    }

    async fn create(&self, collection: Collection, data: &Value) -> Result<RecordId> {
        let _guard = self.enter().await;
        self.check_writable("create", collection, data.get("name").and_then(Value::as_str))?;

        let mut state = self.state();
        state.calls.push(CatalogueCall::Create {
            collection,
            data: data.clone(),
        });
        let id = RecordId::Number(state.allocate());
        let mut attributes = data.as_object().cloned().unwrap_or_default();
        state.assign_item_ids(&mut attributes);
        state.records.entry(collection).or_default().push(CatalogueEntry {
            id: id.clone(),
            attributes,
        });
        Ok(id)
    }

    async fn update(&self, collection: Collection, id: &RecordId, data: &Value) -> Result<()> {
        let _guard = self.enter().await;
        self.check_writable("update", collection, data.get("name").and_then(Value::as_str))?;

        let mut state = self.state();
        state.calls.push(CatalogueCall::Update {
            collection,
            id: id.clone(),
            data: data.clone(),
        });

        let mut incoming = data.as_object().cloned().unwrap_or_default();
        state.assign_item_ids(&mut incoming);
        let entry = state
            .records
            .get_mut(&collection)
            .and_then(|entries| entries.iter_mut().find(|entry| entry.id == *id))
            .ok_or_else(|| Self::rejected("update", collection, format!("no record with id {id}")))?;
        entry.attributes.extend(incoming);
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &RecordId) -> Result<()> {
        let _guard = self.enter().await;
        let name = self
            .records(collection)
            .into_iter()
            .find(|entry| entry.id == *id)
            .and_then(|entry| entry.name().map(str::to_string));
        self.check_writable("delete", collection, name.as_deref())?;

        let mut state = self.state();
        state.calls.push(CatalogueCall::Delete {
            collection,
            id: id.clone(),
        });
        let entries = state.records.entry(collection).or_default();
        let before = entries.len();
        entries.retain(|entry| entry.id != *id);
        if entries.len() == before {
            return Err(Self::rejected("delete", collection, format!("no record with id {id}")));
        }
        Ok(())
    }
}

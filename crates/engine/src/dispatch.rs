// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inline dispatchers.
//!
//! An inline dispatcher short-circuits event-facet execution when a handler
//! is available in-process: the `EventTransmit` handler consults it before
//! emitting a task. Handlers are synchronous functions over attribute maps;
//! runners adapt them to async execution themselves.
//!
//! Module loading is a static registry: the embedding application registers
//! [`HandlerModule`]s by URI at startup, and [`RegistryDispatcher`] resolves
//! persisted registrations against that table, caching resolved handlers by
//! `(module_uri, checksum)`.

use af_core::AttrMap;
use af_storage::Store;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// A synchronous handler: params in, returns out.
pub type HandlerFn = Arc<dyn Fn(&AttrMap) -> Result<AttrMap, DispatchError> + Send + Sync>;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("handler failed: {0}")]
    Handler(String),
    #[error("handler module '{uri}' is not loaded")]
    ModuleNotLoaded { uri: String },
    #[error("module '{uri}' has no entrypoint '{entrypoint}'")]
    EntrypointNotFound { uri: String, entrypoint: String },
    #[error(transparent)]
    Store(#[from] af_storage::StoreError),
}

impl DispatchError {
    /// Shorthand for handler-raised failures.
    pub fn handler(message: impl Into<String>) -> Self {
        DispatchError::Handler(message.into())
    }
}

/// In-process execution of event facets.
pub trait InlineDispatcher: Send + Sync {
    fn can_dispatch(&self, facet_name: &str) -> bool;
    /// Execute the facet. `Ok(None)` means "cannot handle after all" and
    /// falls through to task emission; `Err` fails the calling step.
    fn dispatch(&self, facet_name: &str, payload: &AttrMap)
        -> Result<Option<AttrMap>, DispatchError>;
}

/// No inline dispatch: every event facet spawns a task.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDispatcher;

impl InlineDispatcher for NullDispatcher {
    fn can_dispatch(&self, _facet_name: &str) -> bool {
        false
    }

    fn dispatch(
        &self,
        _facet_name: &str,
        _payload: &AttrMap,
    ) -> Result<Option<AttrMap>, DispatchError> {
        Ok(None)
    }
}

/// Function-map dispatcher with short-name fallback: a handler registered
/// as `Count` also serves `docs.Count`.
#[derive(Default)]
pub struct FnDispatcher {
    handlers: RwLock<HashMap<String, HandlerFn>>,
}

impl FnDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, facet_name: impl Into<String>, handler: F)
    where
        F: Fn(&AttrMap) -> Result<AttrMap, DispatchError> + Send + Sync + 'static,
    {
        self.handlers.write().insert(facet_name.into(), Arc::new(handler));
    }

    fn lookup(&self, facet_name: &str) -> Option<HandlerFn> {
        let handlers = self.handlers.read();
        if let Some(handler) = handlers.get(facet_name) {
            return Some(Arc::clone(handler));
        }
        let short = facet_name.rsplit('.').next()?;
        handlers.get(short).map(Arc::clone)
    }
}

impl InlineDispatcher for FnDispatcher {
    fn can_dispatch(&self, facet_name: &str) -> bool {
        self.lookup(facet_name).is_some()
    }

    fn dispatch(
        &self,
        facet_name: &str,
        payload: &AttrMap,
    ) -> Result<Option<AttrMap>, DispatchError> {
        match self.lookup(facet_name) {
            Some(handler) => handler(payload).map(Some),
            None => Ok(None),
        }
    }
}

/// Chains dispatchers in priority order; the first positive `can_dispatch`
/// wins.
#[derive(Default)]
pub struct CompositeDispatcher {
    chain: Vec<Arc<dyn InlineDispatcher>>,
}

impl CompositeDispatcher {
    pub fn new(chain: Vec<Arc<dyn InlineDispatcher>>) -> Self {
        Self { chain }
    }

    pub fn push(&mut self, dispatcher: Arc<dyn InlineDispatcher>) {
        self.chain.push(dispatcher);
    }
}

impl InlineDispatcher for CompositeDispatcher {
    fn can_dispatch(&self, facet_name: &str) -> bool {
        self.chain.iter().any(|d| d.can_dispatch(facet_name))
    }

    fn dispatch(
        &self,
        facet_name: &str,
        payload: &AttrMap,
    ) -> Result<Option<AttrMap>, DispatchError> {
        for dispatcher in &self.chain {
            if dispatcher.can_dispatch(facet_name) {
                return dispatcher.dispatch(facet_name, payload);
            }
        }
        Ok(None)
    }
}

/// A loadable handler module, addressed by URI. The embedding application
/// registers these at startup; there is no dynamic code loading.
pub trait HandlerModule: Send + Sync {
    fn resolve(&self, entrypoint: &str) -> Option<HandlerFn>;
}

/// A [`HandlerModule`] backed by a plain entrypoint map.
#[derive(Default)]
pub struct MapModule {
    entrypoints: HashMap<String, HandlerFn>,
}

impl MapModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<F>(mut self, entrypoint: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&AttrMap) -> Result<AttrMap, DispatchError> + Send + Sync + 'static,
    {
        self.entrypoints.insert(entrypoint.into(), Arc::new(handler));
        self
    }
}

impl HandlerModule for MapModule {
    fn resolve(&self, entrypoint: &str) -> Option<HandlerFn> {
        self.entrypoints.get(entrypoint).map(Arc::clone)
    }
}

/// Dispatcher backed by persisted [`HandlerRegistration`] records.
///
/// `can_dispatch` is true when a registration exists; resolution failures
/// (unknown module URI, missing entrypoint) surface from `dispatch` and
/// fail the calling step with a structured message. Resolved handlers are
/// cached per facet and invalidated when the registration checksum
/// changes.
///
/// [`HandlerRegistration`]: af_core::HandlerRegistration
pub struct RegistryDispatcher {
    store: Arc<dyn Store>,
    modules: RwLock<HashMap<String, Arc<dyn HandlerModule>>>,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

struct CacheEntry {
    module_uri: String,
    checksum: String,
    handler: HandlerFn,
}

impl RegistryDispatcher {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store, modules: RwLock::new(HashMap::new()), cache: Mutex::new(HashMap::new()) }
    }

    pub fn register_module(&self, uri: impl Into<String>, module: Arc<dyn HandlerModule>) {
        self.modules.write().insert(uri.into(), module);
    }

    fn resolve(&self, facet_name: &str) -> Result<Option<HandlerFn>, DispatchError> {
        let Some(reg) = self.store.get_handler_registration(facet_name)? else {
            return Ok(None);
        };

        {
            let cache = self.cache.lock();
            if let Some(entry) = cache.get(facet_name) {
                if entry.checksum == reg.checksum && entry.module_uri == reg.module_uri {
                    return Ok(Some(Arc::clone(&entry.handler)));
                }
            }
        }

        let module = self
            .modules
            .read()
            .get(&reg.module_uri)
            .map(Arc::clone)
            .ok_or_else(|| DispatchError::ModuleNotLoaded { uri: reg.module_uri.clone() })?;
        let handler = module.resolve(&reg.entrypoint).ok_or_else(|| {
            DispatchError::EntrypointNotFound {
                uri: reg.module_uri.clone(),
                entrypoint: reg.entrypoint.clone(),
            }
        })?;

        self.cache.lock().insert(
            facet_name.to_string(),
            CacheEntry {
                module_uri: reg.module_uri,
                checksum: reg.checksum,
                handler: Arc::clone(&handler),
            },
        );
        Ok(Some(handler))
    }
}

impl InlineDispatcher for RegistryDispatcher {
    fn can_dispatch(&self, facet_name: &str) -> bool {
        matches!(self.store.get_handler_registration(facet_name), Ok(Some(_)))
    }

    fn dispatch(
        &self,
        facet_name: &str,
        payload: &AttrMap,
    ) -> Result<Option<AttrMap>, DispatchError> {
        let Some(handler) = self.resolve(facet_name)? else {
            return Ok(None);
        };

        // Inject registration metadata so shared-dispatch modules can tell
        // facets apart.
        let mut enriched = payload.clone();
        if let Ok(Some(reg)) = self.store.get_handler_registration(facet_name) {
            if !reg.metadata.is_empty() {
                enriched.insert(
                    "_handler_metadata".to_string(),
                    af_core::Value::Map(reg.metadata.clone()),
                );
            }
        }
        handler(&enriched).map(Some)
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;

//! Plugin contract, registry, and dispatch.
//!
//! Plugins are compiled-in handler units registered under stable string
//! identifiers. The registry is an explicit table: load looks an id up
//! and instantiates it, reload does a fresh lookup so a swapped registry
//! takes effect without restarting the session.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context as _, Result, bail};

use crate::event::Event;
use crate::session::Session;

/// A loaded handler unit.
///
/// `handle` runs once per queued event, in queue order, for every flush.
/// An `Err` is logged and does not stop delivery to later plugins.
/// `teardown` runs on unload.
pub trait Plugin: Send {
    fn handle(&mut self, session: &mut Session, event: &Event, raw: &[String]) -> Result<()>;

    fn teardown(&mut self) {}
}

/// Constructor for a plugin instance; receives the session it will serve.
pub type PluginCtor = Arc<dyn Fn(&mut Session) -> Box<dyn Plugin> + Send + Sync>;

/// The explicit registration table, keyed by plugin identifier.
#[derive(Default, Clone)]
pub struct PluginRegistry {
    factories: BTreeMap<String, PluginCtor>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the factory under `id`.
    pub fn register<F>(&mut self, id: &str, ctor: F)
    where
        F: Fn(&mut Session) -> Box<dyn Plugin> + Send + Sync + 'static,
    {
        self.factories.insert(id.to_owned(), Arc::new(ctor));
    }

    /// Registered identifiers, in registration (sorted) order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub(crate) fn ctor(&self, id: &str) -> Option<PluginCtor> {
        self.factories.get(id).cloned()
    }
}

pub(crate) struct LoadedPlugin {
    pub id: String,
    pub instance: Box<dyn Plugin>,
}

/// Plugin-table mutations requested while a flush is being dispatched are
/// deferred until the flush completes.
pub(crate) enum PluginOp {
    Load(String),
    Unload(String),
    Reload(String),
}

impl Session {
    /// Instantiate the plugin registered under `id`, record it in load
    /// order, and make sure its private data directory exists.
    pub fn load_plugin(&mut self, id: &str) -> Result<()> {
        if self.dispatching {
            self.deferred_plugin_ops.push(PluginOp::Load(id.to_owned()));
            return Ok(());
        }
        if self.loaded_order.iter().any(|l| l == id) {
            bail!("plugin `{id}` is already loaded");
        }
        let ctor = self
            .registry
            .ctor(id)
            .with_context(|| format!("no plugin registered under `{id}`"))?;

        let data_dir = self.config.data_root().join(id);
        if !data_dir.exists() {
            std::fs::create_dir_all(&data_dir)
                .with_context(|| format!("creating plugin data dir {}", data_dir.display()))?;
        }

        let instance = ctor(self);
        self.plugins.push(LoadedPlugin {
            id: id.to_owned(),
            instance,
        });
        self.loaded_order.push(id.to_owned());
        tracing::info!(plugin = id, "plugin loaded");
        Ok(())
    }

    /// Tear the plugin down and drop it from the table.
    pub fn unload_plugin(&mut self, id: &str) -> Result<()> {
        if self.dispatching {
            self.deferred_plugin_ops.push(PluginOp::Unload(id.to_owned()));
            return Ok(());
        }
        let Some(pos) = self.plugins.iter().position(|p| p.id == id) else {
            bail!("plugin `{id}` is not loaded");
        };
        let mut loaded = self.plugins.remove(pos);
        self.loaded_order.retain(|l| l != id);
        loaded.instance.teardown();
        tracing::info!(plugin = id, "plugin unloaded");
        Ok(())
    }

    /// Unload then load `id` with a fresh registry lookup. The new
    /// instance's initializer runs again; no event is delivered between
    /// the unload and the completed reload.
    pub fn reload_plugin(&mut self, id: &str) -> Result<()> {
        if self.dispatching {
            self.deferred_plugin_ops.push(PluginOp::Reload(id.to_owned()));
            return Ok(());
        }
        self.unload_plugin(id)?;
        self.load_plugin(id)
    }

    /// Load every registered plugin, logging (not propagating) failures,
    /// so one broken unit doesn't keep the session from starting.
    pub fn load_startup_plugins(&mut self) {
        let ids: Vec<String> = self.registry.ids().map(str::to_owned).collect();
        for id in ids {
            if let Err(e) = self.load_plugin(&id) {
                tracing::error!(plugin = %id, error = %e, "failed to load plugin");
            }
        }
    }

    /// Identifiers of currently loaded plugins, in load order. Valid
    /// during dispatch as well.
    pub fn loaded_plugins(&self) -> Vec<String> {
        self.loaded_order.clone()
    }

    /// Flush the pending event queue to every loaded plugin.
    ///
    /// The plugin table is taken out of the session for the duration (the
    /// snapshot), so handlers get the session itself while table
    /// mutations they request are deferred and applied afterwards.
    pub(crate) fn dispatch_pending(&mut self, raw: &[String]) {
        let events = self.take_pending_events();
        if events.is_empty() {
            return;
        }
        let mut table = std::mem::take(&mut self.plugins);
        self.dispatching = true;
        for loaded in &mut table {
            for event in &events {
                if let Err(e) = loaded.instance.handle(self, event, raw) {
                    tracing::error!(plugin = %loaded.id, error = %e, "plugin handler failed");
                }
            }
        }
        self.dispatching = false;
        self.plugins = table;

        for op in std::mem::take(&mut self.deferred_plugin_ops) {
            let result = match &op {
                PluginOp::Load(id) => self.load_plugin(id),
                PluginOp::Unload(id) => self.unload_plugin(id),
                PluginOp::Reload(id) => self.reload_plugin(id),
            };
            if let Err(e) = result {
                let id = match op {
                    PluginOp::Load(id) | PluginOp::Unload(id) | PluginOp::Reload(id) => id,
                };
                tracing::error!(plugin = %id, error = %e, "deferred plugin operation failed");
            }
        }
    }

    pub(crate) fn unload_all_plugins(&mut self) {
        for mut loaded in self.plugins.drain(..) {
            loaded.instance.teardown();
            tracing::info!(plugin = %loaded.id, "plugin unloaded");
        }
        self.loaded_order.clear();
    }
}

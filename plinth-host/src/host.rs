//! Plugin lifecycle driver.
//!
//! Applies each plugin's [`Manifest`] to the shared [`Interop`] context as
//! the plugin moves through load, enable, disable and unload, and purges
//! everything it registered on the way out.

use crate::error::{HostError, Result};
use crate::interop::Interop;
use crate::manifest::Manifest;
use plinth_pipes::DisposeReport;
use plinth_types::{Owner, Plugin, PluginId, PluginStatus};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of [`PluginHost::load`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub pipes: usize,
    pub linked: usize,
    /// Link requests that could not be resolved.
    pub skipped: usize,
    pub handlers: usize,
}

struct LoadedPlugin {
    plugin: Plugin,
    manifest: Manifest,
}

/// Drives plugins through their lifecycle against one [`Interop`].
pub struct PluginHost {
    interop: Interop,
    plugins: HashMap<PluginId, LoadedPlugin>,
}

impl PluginHost {
    pub fn new(interop: Interop) -> Self {
        Self {
            interop,
            plugins: HashMap::new(),
        }
    }

    pub fn interop(&self) -> &Interop {
        &self.interop
    }

    // ================================================================
    // Loading / Unloading
    // ================================================================

    /// Attaches `id`, declares its pipes, resolves its links and registers
    /// its permission handlers.
    ///
    /// Invalid pipe declarations abort the load and leave nothing behind.
    /// Unresolvable links are skipped.
    pub fn load(&mut self, id: PluginId, manifest: Manifest) -> Result<LoadReport> {
        if self.plugins.contains_key(&id) {
            return Err(HostError::PluginAlreadyLoaded(id.to_string()));
        }
        let plugin = Plugin::new(id.clone());
        let pipes = self.interop.pipes();
        pipes.attach(&plugin)?;

        let mut report = LoadReport::default();
        for decl in &manifest.pipes {
            if let Err(e) = pipes.declare(&id, decl.clone()) {
                pipes.dispose(&id);
                warn!(plugin_id = %id, "Pipe declaration rejected: {}", e);
                return Err(e.into());
            }
            report.pipes += 1;
        }

        for missing in pipes
            .link_dependencies(manifest.links())
            .into_iter()
            .filter(|dep| !pipes.is_attached(dep))
        {
            warn!(plugin_id = %id, dependency = %missing, "Dependency not loaded; its links will be skipped");
        }
        for request in &manifest.links {
            match pipes.link_request(&id, request) {
                Ok(_) => report.linked += 1,
                Err(_) => report.skipped += 1,
            }
        }

        for handler in &manifest.handlers {
            let registered = self
                .interop
                .permissions()
                .register(Some(id.clone()), Arc::clone(handler));
            if registered.is_added() {
                report.handlers += 1;
            }
        }

        info!(
            plugin_id = %id,
            pipes = report.pipes,
            linked = report.linked,
            skipped = report.skipped,
            "Plugin loaded"
        );
        self.plugins.insert(id, LoadedPlugin { plugin, manifest });
        Ok(report)
    }

    /// Loads every plugin in dependency order.
    ///
    /// A plugin that fails to load is logged and skipped; the ids that
    /// loaded are returned in load order.
    pub fn load_all(&mut self, plugins: Vec<(PluginId, Manifest)>) -> Result<Vec<PluginId>> {
        let order = {
            let refs: Vec<(&PluginId, &Manifest)> = plugins.iter().map(|(id, m)| (id, m)).collect();
            dependency_order(&refs)?
        };
        let mut pending: HashMap<PluginId, Manifest> = plugins.into_iter().collect();
        let mut loaded = Vec::with_capacity(order.len());
        for id in order {
            let Some(manifest) = pending.remove(&id) else {
                continue;
            };
            match self.load(id.clone(), manifest) {
                Ok(_) => loaded.push(id),
                Err(e) => warn!(plugin_id = %id, "Plugin failed to load: {}", e),
            }
        }
        Ok(loaded)
    }

    /// Tears down everything the plugin registered and marks it destroyed.
    pub fn unload(&mut self, id: &PluginId) -> Result<DisposeReport> {
        let mut loaded = self
            .plugins
            .remove(id)
            .ok_or_else(|| HostError::PluginNotFound(id.to_string()))?;

        let report = self.interop.pipes().dispose(id);
        let handlers = self.interop.permissions().unregister_owner(id);
        let subscriptions = self.interop.bus().unsubscribe_all(&Owner::from(id));
        loaded.plugin.transition(PluginStatus::Destroyed)?;

        info!(
            plugin_id = %id,
            links = report.owned_links + report.dependent_links,
            handlers,
            subscriptions,
            "Plugin unloaded"
        );
        Ok(report)
    }

    /// Unloads every loaded plugin, dependents before the plugins they link
    /// against. Returns the ids in unload order.
    ///
    /// Plugins loaded one at a time can link in a cycle; those are torn down
    /// in id order instead.
    pub fn unload_all(&mut self) -> Vec<PluginId> {
        let mut ids: Vec<PluginId> = self.plugins.keys().cloned().collect();
        ids.sort();
        let order = {
            let loaded: Vec<(&PluginId, &Manifest)> =
                ids.iter().map(|id| (id, &self.plugins[id].manifest)).collect();
            match dependency_order(&loaded) {
                Ok(mut order) => {
                    order.reverse();
                    order
                }
                Err(e) => {
                    warn!("Unloading in id order: {}", e);
                    ids.clone()
                }
            }
        };

        let mut unloaded = Vec::with_capacity(order.len());
        for id in order {
            match self.unload(&id) {
                Ok(_) => unloaded.push(id),
                Err(e) => warn!(plugin_id = %id, "Plugin failed to unload: {}", e),
            }
        }
        unloaded
    }

    // ================================================================
    // Enable / Disable
    // ================================================================

    /// Subscribes the plugin's event bindings and marks it enabled.
    pub fn enable(&mut self, id: &PluginId) -> Result<()> {
        let bus = Arc::clone(self.interop.bus());
        let pipes = Arc::clone(self.interop.pipes());
        let loaded = self.loaded_mut(id)?;

        loaded.plugin.transition(PluginStatus::Enabling)?;
        pipes.set_status(id, PluginStatus::Enabling)?;

        let owner = Owner::from(id);
        for binding in &loaded.manifest.events {
            binding.apply(&bus, &owner);
            debug!(plugin_id = %id, event = binding.event(), "Event binding subscribed");
        }

        loaded.plugin.transition(PluginStatus::Enabled)?;
        pipes.set_status(id, PluginStatus::Enabled)?;
        info!(plugin_id = %id, "Plugin enabled");
        Ok(())
    }

    /// Drops the plugin's subscriptions and marks it disabled.
    pub fn disable(&mut self, id: &PluginId) -> Result<()> {
        let bus = Arc::clone(self.interop.bus());
        let pipes = Arc::clone(self.interop.pipes());
        let loaded = self.loaded_mut(id)?;

        loaded.plugin.transition(PluginStatus::Disabling)?;
        pipes.set_status(id, PluginStatus::Disabling)?;

        let removed = bus.unsubscribe_all(&Owner::from(id));

        loaded.plugin.transition(PluginStatus::Disabled)?;
        pipes.set_status(id, PluginStatus::Disabled)?;
        info!(plugin_id = %id, subscriptions = removed, "Plugin disabled");
        Ok(())
    }

    // ================================================================
    // Queries
    // ================================================================

    pub fn status(&self, id: &PluginId) -> Option<PluginStatus> {
        self.plugins.get(id).map(|p| p.plugin.status())
    }

    pub fn is_loaded(&self, id: &PluginId) -> bool {
        self.plugins.contains_key(id)
    }

    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    fn loaded_mut(&mut self, id: &PluginId) -> Result<&mut LoadedPlugin> {
        self.plugins
            .get_mut(id)
            .ok_or_else(|| HostError::PluginNotFound(id.to_string()))
    }
}

impl std::fmt::Debug for PluginHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHost")
            .field("plugins", &self.plugins.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Orders plugins so each comes after the plugins it links against.
///
/// Ties keep input order. Dependencies outside the given set are ignored.
pub fn dependency_order(plugins: &[(&PluginId, &Manifest)]) -> Result<Vec<PluginId>> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        Unvisited,
        Visiting,
        Done,
    }

    fn visit(
        index: usize,
        plugins: &[(&PluginId, &Manifest)],
        positions: &HashMap<&PluginId, usize>,
        marks: &mut [Mark],
        order: &mut Vec<PluginId>,
    ) -> Result<()> {
        match marks[index] {
            Mark::Done => return Ok(()),
            Mark::Visiting => return Err(HostError::DependencyCycle(plugins[index].0.to_string())),
            Mark::Unvisited => {}
        }
        marks[index] = Mark::Visiting;
        for dep in plugins[index].1.dependencies() {
            if let Some(&next) = positions.get(&dep) {
                if next != index {
                    visit(next, plugins, positions, marks, order)?;
                }
            }
        }
        marks[index] = Mark::Done;
        order.push(plugins[index].0.clone());
        Ok(())
    }

    let positions: HashMap<&PluginId, usize> = plugins.iter().enumerate().map(|(i, (id, _))| (*id, i)).collect();
    let mut marks = vec![Mark::Unvisited; plugins.len()];
    let mut order = Vec::with_capacity(plugins.len());
    for index in 0..plugins.len() {
        visit(index, plugins, &positions, &mut marks, &mut order)?;
    }
    Ok(order)
}

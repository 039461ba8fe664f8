//! The pipe registry.
//!
//! Plugins declare pipes against the registry; other plugins link slots to
//! them by `(target plugin, pipe name)`. Every link is recorded twice: in
//! the consumer's link list and in the target's back-reference bucket for
//! that consumer. Disposing either endpoint walks both indices, so slots
//! are cleared the moment a plugin goes away.
//!
//! Pipes live in a generational slab. A [`PipeRef`] stays valid until its
//! owner is disposed, after which every lookup through it fails with
//! [`PipeError::StaleRef`].

use crate::error::{PipeError, Result};
use crate::link::{LinkId, LinkInfo, LinkRequest, link_targets};
use crate::pipe::{Accessor, EventFn, MethodFn, PipeDecl, PipeInfo, PipeKind, PipeRef, Visibility};
use crate::slot::{Binding, Slot};
use crate::value::{PipeValue, ValueType};
use plinth_types::{Logger, Plugin, PluginId, PluginStatus};
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};

const TAG: &str = "pipes";

/// Counts of what [`PipeRegistry::dispose`] tore down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisposeReport {
    /// Links the disposed plugin held as consumer.
    pub owned_links: usize,
    /// Links other plugins held into the disposed plugin.
    pub dependent_links: usize,
    /// Pipes the disposed plugin declared.
    pub pipes: usize,
}

impl DisposeReport {
    pub fn is_empty(&self) -> bool {
        self.owned_links == 0 && self.dependent_links == 0 && self.pipes == 0
    }
}

struct PipeEntry {
    owner: PluginId,
    decl: PipeDecl,
}

impl PipeEntry {
    fn info(&self) -> PipeInfo {
        PipeInfo {
            owner: self.owner.clone(),
            name: self.decl.name.clone(),
            kind: self.decl.kind(),
            value_type: self.decl.value_type,
            readonly: self.decl.readonly,
        }
    }
}

#[derive(Default)]
struct PipeCell {
    generation: u32,
    entry: Option<PipeEntry>,
}

struct LinkRecord {
    consumer: PluginId,
    target: PluginId,
    pipe_name: String,
    slot: Slot,
}

#[derive(Default)]
struct PluginEntry {
    status: PluginStatus,
    pipes: HashMap<String, PipeRef>,
    links: Vec<LinkId>,
    /// Consumer plugin -> links it holds into this plugin.
    backrefs: HashMap<PluginId, Vec<LinkId>>,
}

#[derive(Default)]
struct Tables {
    plugins: HashMap<PluginId, PluginEntry>,
    pipes: Vec<PipeCell>,
    free: Vec<u32>,
    links: HashMap<LinkId, LinkRecord>,
    next_link: u64,
}

impl Tables {
    fn entry(&self, pipe: PipeRef) -> Option<&PipeEntry> {
        self.pipes
            .get(pipe.index as usize)
            .filter(|cell| cell.generation == pipe.generation)
            .and_then(|cell| cell.entry.as_ref())
    }

    fn find(&self, plugin: &PluginId, name: &str) -> Option<(PipeRef, &PipeEntry)> {
        let pipe = *self.plugins.get(plugin)?.pipes.get(name)?;
        self.entry(pipe).map(|entry| (pipe, entry))
    }

    fn insert_pipe(&mut self, entry: PipeEntry) -> PipeRef {
        if let Some(index) = self.free.pop() {
            let cell = &mut self.pipes[index as usize];
            cell.entry = Some(entry);
            return PipeRef {
                index,
                generation: cell.generation,
            };
        }
        let index = self.pipes.len() as u32;
        self.pipes.push(PipeCell {
            generation: 0,
            entry: Some(entry),
        });
        PipeRef { index, generation: 0 }
    }

    fn remove_pipe(&mut self, pipe: PipeRef) -> bool {
        match self.pipes.get_mut(pipe.index as usize) {
            Some(cell) if cell.generation == pipe.generation && cell.entry.is_some() => {
                cell.entry = None;
                cell.generation = cell.generation.wrapping_add(1);
                self.free.push(pipe.index);
                true
            }
            _ => false,
        }
    }

    /// Drops a link from both indices and clears its slot.
    fn remove_link(&mut self, id: LinkId) -> Option<LinkRecord> {
        let record = self.links.remove(&id)?;
        if let Some(consumer) = self.plugins.get_mut(&record.consumer) {
            consumer.links.retain(|l| *l != id);
        }
        if let Some(target) = self.plugins.get_mut(&record.target) {
            if let Some(bucket) = target.backrefs.get_mut(&record.consumer) {
                bucket.retain(|l| *l != id);
                if bucket.is_empty() {
                    target.backrefs.remove(&record.consumer);
                }
            }
        }
        record.slot.clear();
        Some(record)
    }

    fn info(&self, id: LinkId, record: &LinkRecord) -> LinkInfo {
        LinkInfo {
            id,
            consumer: record.consumer.clone(),
            slot: record.slot.name().to_string(),
            target: record.target.clone(),
            pipe: record.pipe_name.clone(),
        }
    }
}

/// Registry of declared pipes and the links between plugins.
pub struct PipeRegistry {
    tables: Mutex<Tables>,
    logger: Arc<dyn Logger>,
}

impl PipeRegistry {
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            logger,
        }
    }

    // ================================================================
    // Plugins
    // ================================================================

    /// Makes `plugin` known to the registry so it can declare and link.
    pub fn attach(&self, plugin: &Plugin) -> Result<()> {
        let mut tables = self.lock();
        if tables.plugins.contains_key(plugin.id()) {
            return Err(PipeError::AlreadyAttached(plugin.id().to_string()));
        }
        tables.plugins.insert(
            plugin.id().clone(),
            PluginEntry {
                status: plugin.status(),
                ..PluginEntry::default()
            },
        );
        Ok(())
    }

    pub fn is_attached(&self, plugin: &PluginId) -> bool {
        self.lock().plugins.contains_key(plugin)
    }

    /// Mirrors a lifecycle change; event pipes only fire for enabled owners.
    pub fn set_status(&self, plugin: &PluginId, status: PluginStatus) -> Result<()> {
        let mut tables = self.lock();
        let entry = tables
            .plugins
            .get_mut(plugin)
            .ok_or_else(|| PipeError::NotAttached(plugin.to_string()))?;
        entry.status = status;
        Ok(())
    }

    pub fn status(&self, plugin: &PluginId) -> Option<PluginStatus> {
        self.lock().plugins.get(plugin).map(|e| e.status)
    }

    // ================================================================
    // Declaring
    // ================================================================

    /// Declares a pipe owned by `owner`.
    pub fn declare(&self, owner: &PluginId, mut decl: PipeDecl) -> Result<PipeRef> {
        let name = decl.name.trim().to_string();
        if name.is_empty() {
            return Err(PipeError::EmptyName {
                owner: owner.to_string(),
            });
        }
        decl.name = name.clone();

        if let Accessor::Field(cell) = &decl.accessor {
            let found = cell.get().value_type();
            if !decl.value_type.accepts(found) {
                return Err(PipeError::TypeMismatch {
                    expected: decl.value_type,
                    found,
                });
            }
        }

        let kind = decl.kind();
        let visibility = decl.visibility;
        let pipe = {
            let mut tables = self.lock();
            let entry = tables
                .plugins
                .get(owner)
                .ok_or_else(|| PipeError::NotAttached(owner.to_string()))?;
            if entry.pipes.contains_key(&name) {
                return Err(PipeError::DuplicatePipe {
                    owner: owner.to_string(),
                    name,
                });
            }
            let pipe = tables.insert_pipe(PipeEntry {
                owner: owner.clone(),
                decl,
            });
            if let Some(entry) = tables.plugins.get_mut(owner) {
                entry.pipes.insert(name.clone(), pipe);
            }
            pipe
        };

        if visibility != Visibility::Public {
            self.logger.warn(
                TAG,
                &format!("{owner} exposes non-public {kind} '{name}' as a pipe"),
            );
        }
        Ok(pipe)
    }

    // ================================================================
    // Linking
    // ================================================================

    /// Links `slot` of `consumer` to the pipe `pipe_name` of `target`.
    ///
    /// Data pipes are read once and the converted value is stored in the
    /// slot; later changes on the target are not reflected until the slot
    /// is linked again. Method and event pipes store only the handle.
    /// Re-linking a slot replaces its previous link.
    pub fn link(&self, consumer: &PluginId, slot: &Slot, target: &PluginId, pipe_name: &str) -> Result<LinkId> {
        let resolved = {
            let tables = self.lock();
            Self::resolve(&tables, consumer, slot, target, pipe_name)
        };
        let (pipe, accessor) = match resolved {
            Ok(found) => found,
            Err(err) => return Err(self.link_failed(consumer, slot, target, pipe_name, err)),
        };

        let (_, slot_value_type) = slot.slot_type().base();
        let value = match Self::read_guarded(&accessor, pipe_name) {
            Ok(Some(raw)) => match raw.convert_to(slot_value_type) {
                Ok(value) => Some(value),
                Err(err) => return Err(self.link_failed(consumer, slot, target, pipe_name, err)),
            },
            Ok(None) => None,
            Err(err) => return Err(self.link_failed(consumer, slot, target, pipe_name, err)),
        };

        let committed = {
            let mut tables = self.lock();
            if tables.entry(pipe).is_none() {
                Err(PipeError::StaleRef)
            } else if !tables.plugins.contains_key(consumer) {
                Err(PipeError::NotAttached(consumer.to_string()))
            } else {
                Ok(Self::commit_link(&mut tables, consumer, slot, target, pipe_name, pipe, value))
            }
        };
        let id = committed.map_err(|err| self.link_failed(consumer, slot, target, pipe_name, err))?;

        self.logger.debug(
            TAG,
            &format!("{consumer}.{} linked to {target}.{pipe_name} ({id})", slot.name()),
        );
        Ok(id)
    }

    fn commit_link(
        tables: &mut Tables,
        consumer: &PluginId,
        slot: &Slot,
        target: &PluginId,
        pipe_name: &str,
        pipe: PipeRef,
        value: Option<PipeValue>,
    ) -> LinkId {
        let previous: Vec<LinkId> = tables
            .links
            .iter()
            .filter(|(_, record)| record.slot.same_as(slot))
            .map(|(id, _)| *id)
            .collect();
        for id in previous {
            tables.remove_link(id);
        }

        let id = LinkId(tables.next_link);
        tables.next_link += 1;
        tables.links.insert(
            id,
            LinkRecord {
                consumer: consumer.clone(),
                target: target.clone(),
                pipe_name: pipe_name.to_string(),
                slot: slot.clone(),
            },
        );
        if let Some(entry) = tables.plugins.get_mut(consumer) {
            entry.links.push(id);
        }
        if let Some(entry) = tables.plugins.get_mut(target) {
            entry.backrefs.entry(consumer.clone()).or_default().push(id);
        }
        slot.bind(Binding {
            target: target.clone(),
            pipe,
            value,
        });
        id
    }

    /// Reads a data pipe, turning a panicking getter into
    /// [`PipeError::Callback`].
    fn read_guarded(accessor: &Accessor, pipe_name: &str) -> Result<Option<PipeValue>> {
        panic::catch_unwind(AssertUnwindSafe(|| accessor.read())).map_err(|panic| PipeError::Callback {
            pipe: pipe_name.to_string(),
            message: format!("getter panicked: {}", panic_message(panic.as_ref())),
        })
    }

    /// Resolves a [`LinkRequest`] for `consumer`.
    pub fn link_request(&self, consumer: &PluginId, request: &LinkRequest) -> Result<LinkId> {
        let Some(target) = request.target_id() else {
            let raw = request.target.clone().unwrap_or_default();
            let err = PipeError::PluginNotFound(raw.clone());
            return Err(self.link_failed_raw(consumer, &request.slot, &raw, request.pipe_name(), err));
        };
        self.link(consumer, &request.slot, &target, request.pipe_name())
    }

    fn resolve(
        tables: &Tables,
        consumer: &PluginId,
        slot: &Slot,
        target: &PluginId,
        pipe_name: &str,
    ) -> Result<(PipeRef, Accessor)> {
        if !tables.plugins.contains_key(consumer) {
            return Err(PipeError::NotAttached(consumer.to_string()));
        }
        if !tables.plugins.contains_key(target) {
            return Err(PipeError::PluginNotFound(target.to_string()));
        }
        let (pipe, entry) = tables.find(target, pipe_name).ok_or_else(|| PipeError::PipeNotFound {
            plugin: target.to_string(),
            pipe: pipe_name.to_string(),
        })?;
        let kind = entry.decl.kind();
        let value_type = entry.decl.value_type;
        if !slot.slot_type().accepts(kind, value_type) {
            return Err(PipeError::Incompatible {
                slot: slot.name().to_string(),
                slot_type: slot.slot_type().to_string(),
                pipe: pipe_name.to_string(),
                pipe_type: format!("{kind}<{value_type}>"),
            });
        }
        Ok((pipe, entry.decl.accessor.clone()))
    }

    fn link_failed(&self, consumer: &PluginId, slot: &Slot, target: &PluginId, pipe: &str, err: PipeError) -> PipeError {
        self.link_failed_raw(consumer, slot, target.as_str(), pipe, err)
    }

    fn link_failed_raw(&self, consumer: &PluginId, slot: &Slot, target: &str, pipe: &str, err: PipeError) -> PipeError {
        self.logger.error(
            TAG,
            &format!(
                "{consumer}: cannot link slot '{}' ({}) to '{target}.{pipe}': {err}",
                slot.name(),
                slot.slot_type()
            ),
        );
        err
    }

    /// Removes one link and clears its slot.
    pub fn unlink(&self, id: LinkId) -> bool {
        self.lock().remove_link(id).is_some()
    }

    /// Distinct target plugins named by `requests`, in first-seen order.
    ///
    /// Requests without a usable target are logged and left out.
    pub fn link_dependencies(&self, requests: &[LinkRequest]) -> Vec<PluginId> {
        for request in requests.iter().filter(|r| r.target_id().is_none()) {
            self.logger.debug(
                TAG,
                &format!("slot '{}' has no usable link target, skipped", request.slot.name()),
            );
        }
        link_targets(requests)
    }

    // ================================================================
    // Teardown
    // ================================================================

    /// Tears down everything `plugin` owns or is linked to.
    ///
    /// Disposing a plugin the registry does not know is a no-op.
    pub fn dispose(&self, plugin: &PluginId) -> DisposeReport {
        let mut report = DisposeReport::default();
        {
            let mut tables = self.lock();
            let Some(entry) = tables.plugins.get(plugin) else {
                return report;
            };
            let mut ids: Vec<LinkId> = entry.links.clone();
            ids.extend(entry.backrefs.values().flatten().copied());
            let pipes: Vec<PipeRef> = entry.pipes.values().copied().collect();

            for id in ids {
                if let Some(record) = tables.remove_link(id) {
                    if &record.consumer == plugin {
                        report.owned_links += 1;
                    } else {
                        report.dependent_links += 1;
                    }
                }
            }
            for pipe in pipes {
                if tables.remove_pipe(pipe) {
                    report.pipes += 1;
                }
            }
            tables.plugins.remove(plugin);
        }

        self.logger.debug(
            TAG,
            &format!(
                "disposed {plugin}: {} owned link(s), {} dependent link(s), {} pipe(s)",
                report.owned_links, report.dependent_links, report.pipes
            ),
        );
        report
    }

    // ================================================================
    // Access
    // ================================================================

    /// Reads the current value of a field or property.
    pub fn read(&self, target: &PluginId, name: &str) -> Result<PipeValue> {
        let (accessor, _, _) = self.lookup(target, name)?;
        Self::read_guarded(&accessor, name)?.ok_or_else(|| PipeError::WrongKind {
            pipe: name.to_string(),
            expected: PipeKind::Field,
            found: accessor.kind(),
        })
    }

    /// Writes a field or settable property.
    pub fn write(&self, target: &PluginId, name: &str, value: impl Into<PipeValue>) -> Result<()> {
        let (accessor, value_type, readonly) = self.lookup(target, name)?;
        if !accessor.kind().is_data() {
            return Err(PipeError::WrongKind {
                pipe: name.to_string(),
                expected: PipeKind::Field,
                found: accessor.kind(),
            });
        }
        if readonly {
            return Err(PipeError::ReadOnly {
                plugin: target.to_string(),
                pipe: name.to_string(),
            });
        }
        let value = value.into().convert_to(value_type)?;
        match accessor {
            Accessor::Field(cell) => {
                cell.set(value);
                Ok(())
            }
            Accessor::Property { set: Some(set), .. } => set(value).map_err(|err| PipeError::Callback {
                pipe: name.to_string(),
                message: format!("{err:#}"),
            }),
            _ => Err(PipeError::ReadOnly {
                plugin: target.to_string(),
                pipe: name.to_string(),
            }),
        }
    }

    /// Calls a method pipe by name.
    pub fn call(&self, target: &PluginId, name: &str, args: &[PipeValue]) -> Result<PipeValue> {
        let (accessor, _, _) = self.lookup(target, name)?;
        Self::run_method(name, accessor, args)
    }

    /// Calls a method pipe through a handle stored in a slot.
    pub fn call_ref(&self, pipe: PipeRef, args: &[PipeValue]) -> Result<PipeValue> {
        let (name, accessor) = {
            let tables = self.lock();
            let entry = tables.entry(pipe).ok_or(PipeError::StaleRef)?;
            (entry.decl.name.clone(), entry.decl.accessor.clone())
        };
        Self::run_method(&name, accessor, args)
    }

    fn run_method(name: &str, accessor: Accessor, args: &[PipeValue]) -> Result<PipeValue> {
        let method: MethodFn = match accessor {
            Accessor::Method(method) => method,
            other => {
                return Err(PipeError::WrongKind {
                    pipe: name.to_string(),
                    expected: PipeKind::Method,
                    found: other.kind(),
                });
            }
        };
        method(args).map_err(|err| PipeError::Callback {
            pipe: name.to_string(),
            message: format!("{err:#}"),
        })
    }

    /// Triggers every event pipe named `name`.
    ///
    /// Pipes whose owner is not enabled, or whose allow-list excludes
    /// `caller`, are skipped. A failing handler is logged and the rest
    /// still run. Returns how many handlers were invoked.
    pub fn invoke(&self, name: &str, caller: &PluginId, args: &[PipeValue]) -> usize {
        let mut denied = Vec::new();
        let handlers: Vec<(PluginId, EventFn)> = {
            let tables = self.lock();
            tables
                .pipes
                .iter()
                .filter_map(|cell| cell.entry.as_ref())
                .filter(|entry| entry.decl.name == name)
                .filter_map(|entry| match &entry.decl.accessor {
                    Accessor::Event(handler) => Some((entry, Arc::clone(handler))),
                    _ => None,
                })
                .filter(|(entry, _)| {
                    tables
                        .plugins
                        .get(&entry.owner)
                        .is_some_and(|p| p.status.is_enabled())
                })
                .filter(|(entry, _)| {
                    let allowed = entry.decl.allowed_callers.is_empty()
                        || entry.decl.allowed_callers.contains(caller);
                    if !allowed {
                        denied.push(entry.owner.clone());
                    }
                    allowed
                })
                .map(|(entry, handler)| (entry.owner.clone(), handler))
                .collect()
        };

        for owner in denied {
            self.logger.debug(
                TAG,
                &format!("{caller} may not invoke '{name}' on {owner}, skipped"),
            );
        }

        let mut delivered = 0;
        for (owner, handler) in handlers {
            delivered += 1;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(caller, args)));
            let message = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => format!("{err:#}"),
                Err(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
            };
            self.logger.error(
                TAG,
                &format!("event pipe '{name}' of {owner} failed: {message}"),
            );
        }
        delivered
    }

    fn lookup(&self, target: &PluginId, name: &str) -> Result<(Accessor, ValueType, bool)> {
        let tables = self.lock();
        if !tables.plugins.contains_key(target) {
            return Err(PipeError::PluginNotFound(target.to_string()));
        }
        let (_, entry) = tables.find(target, name).ok_or_else(|| PipeError::PipeNotFound {
            plugin: target.to_string(),
            pipe: name.to_string(),
        })?;
        Ok((entry.decl.accessor.clone(), entry.decl.value_type, entry.decl.readonly))
    }

    // ================================================================
    // Introspection
    // ================================================================

    /// Live links held by `consumer`, oldest first.
    pub fn links_of(&self, consumer: &PluginId) -> Vec<LinkInfo> {
        let tables = self.lock();
        let Some(entry) = tables.plugins.get(consumer) else {
            return Vec::new();
        };
        entry
            .links
            .iter()
            .filter_map(|id| tables.links.get(id).map(|record| tables.info(*id, record)))
            .collect()
    }

    /// Plugins holding at least one live link into `target`.
    pub fn dependents_of(&self, target: &PluginId) -> Vec<PluginId> {
        let tables = self.lock();
        let mut dependents: Vec<PluginId> = tables
            .plugins
            .get(target)
            .map(|entry| entry.backrefs.keys().cloned().collect())
            .unwrap_or_default();
        dependents.sort();
        dependents
    }

    /// Pipes declared by `plugin`, in declaration slot order.
    pub fn pipes_of(&self, plugin: &PluginId) -> Vec<PipeInfo> {
        let tables = self.lock();
        let Some(entry) = tables.plugins.get(plugin) else {
            return Vec::new();
        };
        let mut refs: Vec<PipeRef> = entry.pipes.values().copied().collect();
        refs.sort_by_key(|r| r.index);
        refs.into_iter()
            .filter_map(|r| tables.entry(r).map(PipeEntry::info))
            .collect()
    }

    /// Describes the pipe behind `pipe`, `None` once it is disposed.
    pub fn pipe_info(&self, pipe: PipeRef) -> Option<PipeInfo> {
        self.lock().entry(pipe).map(PipeEntry::info)
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for PipeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tables = self.lock();
        f.debug_struct("PipeRegistry")
            .field("plugins", &tables.plugins.len())
            .field("links", &tables.links.len())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

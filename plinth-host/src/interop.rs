//! The shared interop context handed to every plugin.

use crate::config::HostConfig;
use crate::error::Result;
use plinth_events::{ArgPool, Event, EventBus};
use plinth_permissions::PermissionChain;
use plinth_pipes::PipeRegistry;
use plinth_types::Logger;
use std::sync::Arc;

/// Owns the event bus, pipe registry, permission chain and payload pool.
#[derive(Debug, Clone)]
pub struct Interop {
    bus: Arc<EventBus>,
    pipes: Arc<PipeRegistry>,
    permissions: Arc<PermissionChain>,
    pool: Arc<ArgPool>,
}

impl Interop {
    pub fn new(config: &HostConfig, logger: Arc<dyn Logger>) -> Self {
        let pool = Arc::new(ArgPool::with_growth(config.pool.growth));
        let bus = EventBus::with_config(config.events.clone(), Arc::clone(&pool), Arc::clone(&logger));
        Self {
            bus: Arc::new(bus),
            pipes: Arc::new(PipeRegistry::new(Arc::clone(&logger))),
            permissions: Arc::new(PermissionChain::new(&config.permissions.defaults, logger)),
            pool,
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn pipes(&self) -> &Arc<PipeRegistry> {
        &self.pipes
    }

    pub fn permissions(&self) -> &Arc<PermissionChain> {
        &self.permissions
    }

    pub fn pool(&self) -> &Arc<ArgPool> {
        &self.pool
    }

    /// Makes `E` wait for `threshold` subscribers before delivering.
    pub fn buffer_until<E: Event>(&self, threshold: usize) -> Result<()> {
        self.bus.set_threshold::<E>(threshold)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plinth_permissions::{PlayerId, Vote};
    use plinth_types::testing::RecordingLogger;

    struct Tick;

    impl Event for Tick {
        const NAME: &'static str = "tick";
    }

    #[test]
    fn config_reaches_every_component() {
        let mut config = HostConfig::default();
        config.pool.growth = 9;
        config.events.thresholds.insert("tick".into(), 1);
        config.permissions.defaults.push("Home.Set".into());

        let interop = Interop::new(&config, Arc::new(RecordingLogger::new()));

        assert_eq!(interop.pool().growth(), 9);
        assert!(interop.bus().is_buffering::<Tick>());
        assert_eq!(interop.permissions().check(&PlayerId::random(), "home.set"), Vote::Allow);
    }

    #[test]
    fn threshold_errors_convert_into_host_errors() {
        let interop = Interop::new(&HostConfig::default(), Arc::new(RecordingLogger::new()));
        interop.bus().publish(Tick);
        assert!(matches!(
            interop.buffer_until::<Tick>(2),
            Err(crate::HostError::Event(_))
        ));
    }
}

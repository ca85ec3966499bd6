use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rte_core::model::{FrameId, RteVersion};
use rte_core::{RteAdapter, RteValue};

use crate::handshake::Readiness;

struct InstalledFrame {
    adapter: Box<dyn RteAdapter>,
    readiness: Readiness,
    generation: u64,
}

/// The scope content reaches its adapter through: at most one adapter per
/// frame slot.
///
/// Installing into an occupied slot swaps the adapter in one step, so a call
/// is served either by the old session or by the new one, never by neither.
#[derive(Clone, Default)]
pub struct FrameRegistry {
    frames: Arc<Mutex<HashMap<FrameId, InstalledFrame>>>,
    next_generation: Arc<AtomicU64>,
}

impl FrameRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // Content calls must never take the host down, so a poisoned lock is
    // recovered rather than propagated.
    fn frames(&self) -> MutexGuard<'_, HashMap<FrameId, InstalledFrame>> {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install `adapter` for `frame`, replacing whatever was there.
    ///
    /// Returns the generation of this installation, used by
    /// [`FrameRegistry::uninstall_if`].
    pub fn install(&self, frame: FrameId, adapter: Box<dyn RteAdapter>, readiness: Readiness) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let version = adapter.version();
        readiness.reset();

        let previous = self.frames().insert(
            frame,
            InstalledFrame {
                adapter,
                readiness,
                generation,
            },
        );
        match previous {
            Some(old) => log::info!(
                "frame {frame}: replaced SCORM {} adapter (generation {}) with SCORM {version} (generation {generation})",
                old.adapter.version(),
                old.generation
            ),
            None => log::info!("frame {frame}: installed SCORM {version} adapter (generation {generation})"),
        }
        generation
    }

    /// Forward a content call to the adapter installed for `frame`.
    ///
    /// `None` when nothing is installed or the adapter does not define
    /// `method`.
    pub fn invoke(&self, frame: FrameId, method: &str, args: &[&str]) -> Option<RteValue> {
        let mut frames = self.frames();
        let installed = frames.get_mut(&frame)?;
        installed.adapter.invoke(method, args)
    }

    /// Remove the adapter for `frame` if it is still the installation
    /// identified by `generation`; a newer reload is left alone.
    pub fn uninstall_if(&self, frame: FrameId, generation: u64) -> Option<Box<dyn RteAdapter>> {
        let mut frames = self.frames();
        if frames.get(&frame)?.generation != generation {
            log::debug!("frame {frame}: generation {generation} already replaced");
            return None;
        }
        let removed = frames.remove(&frame)?;
        log::info!("frame {frame}: uninstalled generation {generation}");
        Some(removed.adapter)
    }

    #[must_use]
    pub fn is_installed(&self, frame: FrameId) -> bool {
        self.frames().contains_key(&frame)
    }

    #[must_use]
    pub fn is_ready(&self, frame: FrameId) -> bool {
        self.frames()
            .get(&frame)
            .is_some_and(|installed| installed.readiness.is_ready())
    }

    #[must_use]
    pub fn version(&self, frame: FrameId) -> Option<RteVersion> {
        self.frames().get(&frame).map(|installed| installed.adapter.version())
    }

    #[must_use]
    pub fn generation(&self, frame: FrameId) -> Option<u64> {
        self.frames().get(&frame).map(|installed| installed.generation)
    }

    /// Run `f` against the installed adapter, e.g. to inspect its session.
    pub fn with_adapter<R>(&self, frame: FrameId, f: impl FnOnce(&dyn RteAdapter) -> R) -> Option<R> {
        let frames = self.frames();
        frames.get(&frame).map(|installed| f(installed.adapter.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rte_core::{CmiStore, RteSession, adapter_for};

    fn adapter(version: RteVersion) -> Box<dyn RteAdapter> {
        adapter_for(RteSession::new(version, CmiStore::new()))
    }

    #[test]
    fn calls_reach_the_installed_adapter() {
        let registry = FrameRegistry::new();
        let frame = FrameId::generate();
        registry.install(frame, adapter(RteVersion::Scorm12), Readiness::new());

        assert_eq!(
            registry.invoke(frame, "LMSInitialize", &[""]),
            Some(RteValue::Bool(true))
        );
        assert_eq!(registry.invoke(frame, "Initialize", &[""]), None);
        assert_eq!(registry.invoke(FrameId::generate(), "LMSInitialize", &[""]), None);
    }

    #[test]
    fn reload_replaces_the_adapter() {
        let registry = FrameRegistry::new();
        let frame = FrameId::generate();
        let first = registry.install(frame, adapter(RteVersion::Scorm12), Readiness::new());
        registry.invoke(frame, "LMSInitialize", &[""]);

        let second = registry.install(frame, adapter(RteVersion::Scorm2004), Readiness::new());
        assert!(second > first);
        assert_eq!(registry.version(frame), Some(RteVersion::Scorm2004));
        assert_eq!(
            registry.invoke(frame, "Initialize", &[""]),
            Some(RteValue::Bool(true))
        );

        assert!(registry.uninstall_if(frame, first).is_none());
        assert!(registry.is_installed(frame));
        assert!(registry.uninstall_if(frame, second).is_some());
        assert!(!registry.is_installed(frame));
    }

    #[test]
    fn readiness_follows_the_installed_frame() {
        let registry = FrameRegistry::new();
        let frame = FrameId::generate();
        let readiness = Readiness::new();
        registry.install(frame, adapter(RteVersion::Scorm2004), readiness.clone());
        assert!(!registry.is_ready(frame));

        readiness.mark_ready();
        assert!(registry.is_ready(frame));
        assert!(!registry.is_ready(FrameId::generate()));
    }
}

use core::fmt;

use embassy_time::Instant;
use heapless::Vec;

use crate::types::KeyUsage;

/// What the timeout scheduler and the quick-release listener need from a translator.
pub trait HoldStepInstance: Sync {
    fn name(&self) -> &'static str;
    fn quick_release_enabled(&self) -> bool;
    fn quick_release(&self, key: KeyUsage, now: Instant) -> usize;
    fn expire(&self, now: Instant) -> Option<Instant>;
    fn next_deadline(&self) -> Option<Instant>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegistryFull {
    pub capacity: usize,
}

impl fmt::Display for RegistryFull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "translator registry full (capacity {})", self.capacity)
    }
}

impl core::error::Error for RegistryFull {}

/// Translators registered at start-up; read-only once the executor is running.
pub struct TranslatorRegistry<'a, const N: usize> {
    instances: Vec<&'a dyn HoldStepInstance, N>,
}

impl<'a, const N: usize> TranslatorRegistry<'a, N> {
    pub const fn new() -> Self {
        Self {
            instances: Vec::new(),
        }
    }

    pub fn register(&mut self, instance: &'a dyn HoldStepInstance) -> Result<(), RegistryFull> {
        self.instances.push(instance).map_err(|_| {
            log::warn!("registry full, {} not registered", instance.name());
            RegistryFull { capacity: N }
        })
    }

    pub fn for_each_instance(&self, mut f: impl FnMut(&dyn HoldStepInstance)) {
        for instance in &self.instances {
            f(*instance);
        }
    }

    /// Expires due slots everywhere and returns the earliest deadline left armed.
    pub fn expire_all(&self, now: Instant) -> Option<Instant> {
        let mut next: Option<Instant> = None;
        self.for_each_instance(|instance| {
            if let Some(deadline) = instance.expire(now) {
                next = Some(next.map_or(deadline, |earliest| earliest.min(deadline)));
            }
        });
        next
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.instances
            .iter()
            .filter_map(|instance| instance.next_deadline())
            .min()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

impl<const N: usize> Default for TranslatorRegistry<'_, N> {
    fn default() -> Self {
        Self::new()
    }
}

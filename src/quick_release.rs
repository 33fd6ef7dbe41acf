use embassy_sync::{blocking_mutex::raw::RawMutex, channel::Channel};

use crate::registry::TranslatorRegistry;
use crate::types::KeyStateChanged;

/// Force-releases held encoder keys when an unrelated key is pressed.
pub struct QuickReleaseListener<'r, 'a, const N: usize> {
    registry: &'r TranslatorRegistry<'a, N>,
}

impl<'r, 'a, const N: usize> QuickReleaseListener<'r, 'a, N> {
    pub const fn new(registry: &'r TranslatorRegistry<'a, N>) -> Self {
        Self { registry }
    }

    /// Returns the number of slots released across all translators.
    pub fn on_key_state_changed(&self, event: &KeyStateChanged) -> usize {
        if !event.pressed || event.usage.is_modifier() {
            return 0;
        }

        let mut released = 0;
        self.registry.for_each_instance(|instance| {
            if instance.quick_release_enabled() {
                released += instance.quick_release(event.usage, event.timestamp);
            }
        });
        released
    }

    pub async fn run<M: RawMutex, const C: usize>(
        &self,
        events: &Channel<M, KeyStateChanged, C>,
    ) -> ! {
        loop {
            let event = events.receive().await;
            self.on_key_state_changed(&event);
        }
    }
}

use core::sync::atomic::{AtomicU32, Ordering};

use crate::config::{LayerPolicy, LAYER_MASK_BITS};
use crate::types::LayerId;

pub trait LayerStack: Sync {
    fn topmost_active_layer(&self) -> LayerId;
}

impl LayerPolicy {
    /// Top-layer checks query `stack` on every call; the answer is never cached.
    pub fn allows(&self, layer: LayerId, stack: &dyn LayerStack) -> bool {
        match self {
            Self::Layers(mask) => mask.contains(layer),
            Self::TopLayerOnly => layer == stack.topmost_active_layer(),
        }
    }
}

/// Active-layer bitmask shared between the keymap and the translators.
pub struct ActiveLayers {
    bits: AtomicU32,
}

impl ActiveLayers {
    const DEFAULT_LAYER_BIT: u32 = 1;

    pub const fn new() -> Self {
        Self {
            bits: AtomicU32::new(Self::DEFAULT_LAYER_BIT),
        }
    }

    pub fn activate(&self, layer: LayerId) {
        if (layer as usize) < LAYER_MASK_BITS {
            self.bits.fetch_or(1 << layer, Ordering::AcqRel);
        }
    }

    pub fn deactivate(&self, layer: LayerId) {
        if layer == 0 || (layer as usize) >= LAYER_MASK_BITS {
            return;
        }
        self.bits.fetch_and(!(1 << layer), Ordering::AcqRel);
    }

    pub fn is_active(&self, layer: LayerId) -> bool {
        (layer as usize) < LAYER_MASK_BITS && self.bits.load(Ordering::Acquire) & (1 << layer) != 0
    }

    pub fn bits(&self) -> u32 {
        self.bits.load(Ordering::Acquire)
    }
}

impl Default for ActiveLayers {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerStack for ActiveLayers {
    fn topmost_active_layer(&self) -> LayerId {
        let bits = self.bits.load(Ordering::Acquire) | Self::DEFAULT_LAYER_BIT;
        (u32::BITS - 1 - bits.leading_zeros()) as LayerId
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayerMask;

    #[test]
    fn default_layer_is_topmost_until_another_activates() {
        let layers = ActiveLayers::new();
        assert_eq!(layers.topmost_active_layer(), 0);

        layers.activate(2);
        layers.activate(1);
        assert_eq!(layers.topmost_active_layer(), 2);

        layers.deactivate(2);
        assert_eq!(layers.topmost_active_layer(), 1);
    }

    #[test]
    fn default_layer_cannot_be_deactivated() {
        let layers = ActiveLayers::new();
        layers.deactivate(0);
        assert!(layers.is_active(0));
        assert_eq!(layers.topmost_active_layer(), 0);
    }

    #[test]
    fn mask_policy_gates_by_bit() {
        let layers = ActiveLayers::new();
        let policy = LayerPolicy::Layers(LayerMask::UNRESTRICTED.with_layer(1));
        assert!(policy.allows(1, &layers));
        assert!(!policy.allows(0, &layers));
        assert!(!policy.allows(40, &layers));
    }

    #[test]
    fn unrestricted_mask_allows_every_layer_below_the_ceiling() {
        let layers = ActiveLayers::new();
        let policy = LayerPolicy::Layers(LayerMask::UNRESTRICTED);
        assert!(policy.allows(0, &layers));
        assert!(policy.allows(31, &layers));
        assert!(!policy.allows(32, &layers));
    }

    #[test]
    fn top_layer_policy_follows_live_stack() {
        let layers = ActiveLayers::new();
        let policy = LayerPolicy::TopLayerOnly;
        assert!(policy.allows(0, &layers));

        layers.activate(3);
        assert!(!policy.allows(0, &layers));
        assert!(policy.allows(3, &layers));

        layers.deactivate(3);
        assert!(policy.allows(0, &layers));
    }
}

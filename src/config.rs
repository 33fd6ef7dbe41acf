use embassy_time::Duration;

use crate::types::{Direction, KeyBinding, KeyUsage, LayerId};

pub const DEFAULT_TIMEOUT_MS: u16 = 180;
pub const DEFAULT_STEP_GROUP_SIZE: u16 = 5;
pub const MIN_TIMEOUT_MS: u16 = 1;
pub const LAYER_MASK_BITS: usize = 32;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum DirectionHoldMode {
    /// Reversing releases the held binding and presses the other one.
    #[default]
    Switch = 0,
    /// Reversing keeps whatever is already held.
    Sticky = 1,
}

impl DirectionHoldMode {
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Switch),
            1 => Some(Self::Sticky),
            _ => None,
        }
    }
}

/// Bit `n` permits layer `n`. An empty mask permits every layer below 32; layers
/// at or above 32 are never permitted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LayerMask(u32);

impl LayerMask {
    pub const UNRESTRICTED: Self = Self(0);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn with_layer(self, layer: LayerId) -> Self {
        if (layer as usize) < LAYER_MASK_BITS {
            Self(self.0 | (1 << layer))
        } else {
            self
        }
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_unrestricted(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, layer: LayerId) -> bool {
        if (layer as usize) >= LAYER_MASK_BITS {
            return false;
        }
        self.is_unrestricted() || self.0 & (1 << layer) != 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayerPolicy {
    Layers(LayerMask),
    TopLayerOnly,
}

impl LayerPolicy {
    pub const fn from_parts(require_top_layer: bool, allowed_layers: u32) -> Self {
        if require_top_layer {
            Self::TopLayerOnly
        } else {
            Self::Layers(LayerMask::from_bits(allowed_layers))
        }
    }

    pub const fn requires_top_layer(self) -> bool {
        matches!(self, Self::TopLayerOnly)
    }
}

impl Default for LayerPolicy {
    fn default() -> Self {
        Self::Layers(LayerMask::UNRESTRICTED)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QuickReleaseConfig {
    pub enabled: bool,
    pub allow_list: &'static [KeyUsage],
}

impl QuickReleaseConfig {
    pub const DISABLED: Self = Self {
        enabled: false,
        allow_list: &[],
    };

    pub const fn enabled(allow_list: &'static [KeyUsage]) -> Self {
        Self {
            enabled: true,
            allow_list,
        }
    }

    pub fn allows(&self, usage: KeyUsage) -> bool {
        self.allow_list.contains(&usage)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HoldStepConfig {
    pub hold_cw: Option<KeyBinding>,
    pub hold_ccw: Option<KeyBinding>,
    pub step_cw: Option<KeyBinding>,
    pub step_ccw: Option<KeyBinding>,
    pub timeout_ms: u16,
    pub step_group_size: u16,
    pub direction_hold_mode: DirectionHoldMode,
    pub layer_policy: LayerPolicy,
    pub quick_release: QuickReleaseConfig,
    pub sensor_position_base: u32,
}

impl HoldStepConfig {
    pub const fn new(
        hold_cw: Option<KeyBinding>,
        hold_ccw: Option<KeyBinding>,
        step_cw: Option<KeyBinding>,
        step_ccw: Option<KeyBinding>,
    ) -> Self {
        Self {
            hold_cw,
            hold_ccw,
            step_cw,
            step_ccw,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            step_group_size: DEFAULT_STEP_GROUP_SIZE,
            direction_hold_mode: DirectionHoldMode::Switch,
            layer_policy: LayerPolicy::Layers(LayerMask::UNRESTRICTED),
            quick_release: QuickReleaseConfig::DISABLED,
            sensor_position_base: 0,
        }
    }

    pub const fn with_timeout_ms(mut self, timeout_ms: u16) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub const fn with_step_group_size(mut self, step_group_size: u16) -> Self {
        self.step_group_size = step_group_size;
        self
    }

    pub const fn with_direction_hold_mode(mut self, mode: DirectionHoldMode) -> Self {
        self.direction_hold_mode = mode;
        self
    }

    pub const fn with_layer_policy(mut self, layer_policy: LayerPolicy) -> Self {
        self.layer_policy = layer_policy;
        self
    }

    pub const fn with_quick_release(mut self, quick_release: QuickReleaseConfig) -> Self {
        self.quick_release = quick_release;
        self
    }

    pub const fn with_sensor_position_base(mut self, base: u32) -> Self {
        self.sensor_position_base = base;
        self
    }

    pub const fn effective_timeout_ms(&self) -> u16 {
        if self.timeout_ms < MIN_TIMEOUT_MS {
            MIN_TIMEOUT_MS
        } else {
            self.timeout_ms
        }
    }

    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.effective_timeout_ms() as u64)
    }

    pub const fn hold_binding(&self, direction: Direction) -> Option<KeyBinding> {
        match direction {
            Direction::Clockwise => self.hold_cw,
            Direction::CounterClockwise => self.hold_ccw,
            Direction::None => None,
        }
    }

    pub const fn step_binding(&self, direction: Direction) -> Option<KeyBinding> {
        match direction {
            Direction::Clockwise => self.step_cw,
            Direction::CounterClockwise => self.step_ccw,
            Direction::None => None,
        }
    }

    /// True when `usage` is what one of this config's own key-press bindings sends.
    pub fn emits_usage(&self, usage: KeyUsage) -> bool {
        [self.hold_cw, self.hold_ccw, self.step_cw, self.step_ccw]
            .into_iter()
            .flatten()
            .any(|binding| binding.key_usage() == Some(usage))
    }
}

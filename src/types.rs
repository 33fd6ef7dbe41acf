use core::fmt;

use embassy_time::Instant;
use heapless::Vec;

pub type LayerId = u8;

pub const HID_USAGE_KEYBOARD: u16 = 0x07;
pub const HID_USAGE_KEY_LEFT_CONTROL: u16 = 0xE0;
pub const HID_USAGE_KEY_RIGHT_GUI: u16 = 0xE7;

/// HID (usage-page, usage-id) pair as reported on the key-state bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct KeyUsage {
    pub page: u16,
    pub id: u16,
}

impl KeyUsage {
    pub const fn new(page: u16, id: u16) -> Self {
        Self { page, id }
    }

    pub const fn keyboard(id: u16) -> Self {
        Self::new(HID_USAGE_KEYBOARD, id)
    }

    pub const fn is_modifier(self) -> bool {
        self.page == HID_USAGE_KEYBOARD
            && self.id >= HID_USAGE_KEY_LEFT_CONTROL
            && self.id <= HID_USAGE_KEY_RIGHT_GUI
    }

    /// Packs the usage the way key-press bindings carry it in `param1`.
    pub const fn encoded(self) -> u32 {
        ((self.page as u32) << 16) | self.id as u32
    }

    pub const fn from_encoded(encoded: u32) -> Self {
        let page = (encoded >> 16) as u16;
        Self {
            page: if page == 0 { HID_USAGE_KEYBOARD } else { page },
            id: (encoded & 0xFFFF) as u16,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BehaviorId(pub u8);

impl BehaviorId {
    pub const KEY_PRESS: Self = Self(1);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct KeyBinding {
    pub behavior: BehaviorId,
    pub param1: u32,
    pub param2: u32,
}

impl KeyBinding {
    pub const fn new(behavior: BehaviorId, param1: u32, param2: u32) -> Self {
        Self {
            behavior,
            param1,
            param2,
        }
    }

    pub const fn key_press(usage: KeyUsage) -> Self {
        Self::new(BehaviorId::KEY_PRESS, usage.encoded(), 0)
    }

    pub fn key_usage(&self) -> Option<KeyUsage> {
        (self.behavior == BehaviorId::KEY_PRESS).then(|| KeyUsage::from_encoded(self.param1))
    }
}

/// Two-field sensor report; `minor` only counts when `major` is zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RawSample {
    pub major: i32,
    pub minor: i32,
}

impl RawSample {
    pub const fn new(major: i32, minor: i32) -> Self {
        Self { major, minor }
    }

    pub const fn ticks(delta: i32) -> Self {
        Self::new(delta, 0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum Direction {
    #[default]
    None = 0,
    Clockwise = 1,
    CounterClockwise = 2,
}

impl Direction {
    pub const fn is_none(self) -> bool {
        matches!(self, Self::None)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Clockwise => "cw",
            Self::CounterClockwise => "ccw",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessMode {
    Trigger,
    Discard,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BindingEvent {
    pub position: u32,
    pub layer: LayerId,
    pub timestamp: Instant,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BindingAction {
    pub event: BindingEvent,
    pub binding: KeyBinding,
    pub pressed: bool,
}

impl BindingAction {
    pub const fn press(event: BindingEvent, binding: KeyBinding) -> Self {
        Self {
            event,
            binding,
            pressed: true,
        }
    }

    pub const fn release(event: BindingEvent, binding: KeyBinding) -> Self {
        Self {
            event,
            binding,
            pressed: false,
        }
    }
}

/// A tap plus a release/press pair is the most one tick can emit.
const ACTION_BUFFER_MAX: usize = 4;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionBuffer {
    actions: Vec<BindingAction, ACTION_BUFFER_MAX>,
}

impl ActionBuffer {
    pub const MAX: usize = ACTION_BUFFER_MAX;

    pub const fn new() -> Self {
        Self {
            actions: Vec::new(),
        }
    }

    pub fn clear(&mut self) {
        self.actions.clear();
    }

    pub fn press(&mut self, event: BindingEvent, binding: Option<KeyBinding>) {
        if let Some(binding) = binding {
            self.push(BindingAction::press(event, binding));
        }
    }

    pub fn release(&mut self, event: BindingEvent, binding: Option<KeyBinding>) {
        if let Some(binding) = binding {
            self.push(BindingAction::release(event, binding));
        }
    }

    pub fn tap(&mut self, event: BindingEvent, binding: Option<KeyBinding>) {
        self.press(event, binding);
        self.release(event, binding);
    }

    fn push(&mut self, action: BindingAction) {
        if self.actions.push(action).is_err() {
            log::warn!("action buffer full, dropped {:?}", action);
        }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BindingAction> {
        self.actions.iter()
    }
}

impl Default for ActionBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyStateChanged {
    pub usage: KeyUsage,
    pub pressed: bool,
    pub timestamp: Instant,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HoldTransition {
    Started,
    Extended,
    Switched,
    StickyExtended,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickReport {
    pub transition: HoldTransition,
    pub step_fired: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IneligibleTick {
    EncoderOutOfRange,
    LayerOutOfRange,
    Discarded,
    LayerGated,
    NoPendingDirection,
}

impl IneligibleTick {
    pub const fn label(self) -> &'static str {
        match self {
            Self::EncoderOutOfRange => "encoder out of range",
            Self::LayerOutOfRange => "layer out of range",
            Self::Discarded => "discarded outside trigger phase",
            Self::LayerGated => "layer gated",
            Self::NoPendingDirection => "no pending direction",
        }
    }
}

impl fmt::Display for IneligibleTick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl core::error::Error for IneligibleTick {}

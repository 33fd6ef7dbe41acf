#![cfg_attr(not(test), no_std)]

//! Rotary encoder hold/step translation for keyboard firmware.
//!
//! Each tick presses (or keeps pressed) a direction's hold binding until the
//! encoder goes quiet, and every Nth tick taps a step binding. Holds can be
//! ejected by layer changes or by an unrelated key press.

pub mod config;
pub mod direction;
pub mod hold_step;
pub mod layer_gate;
pub mod queue;
pub mod quick_release;
pub mod refcount;
pub mod registry;
pub mod timeout;
pub mod types;

#[cfg(test)]
mod test_support;

pub use config::{
    DirectionHoldMode, HoldStepConfig, LayerMask, LayerPolicy, QuickReleaseConfig,
    DEFAULT_STEP_GROUP_SIZE, DEFAULT_TIMEOUT_MS,
};
pub use direction::resolve_tick;
pub use hold_step::{HoldStepTranslator, SlotIndex, SlotSnapshot};
pub use layer_gate::{ActiveLayers, LayerStack};
pub use queue::BindingQueue;
pub use quick_release::QuickReleaseListener;
pub use refcount::RefcountQueue;
pub use registry::{HoldStepInstance, RegistryFull, TranslatorRegistry};
pub use timeout::TimeoutScheduler;
pub use types::{
    BindingAction, BindingEvent, Direction, HoldTransition, IneligibleTick, KeyBinding,
    KeyStateChanged, KeyUsage, LayerId, ProcessMode, RawSample, TickReport,
};

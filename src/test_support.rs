use std::sync::Mutex as StdMutex;
use std::vec::Vec;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::Instant;

use crate::config::HoldStepConfig;
use crate::hold_step::HoldStepTranslator;
use crate::layer_gate::ActiveLayers;
use crate::queue::BindingQueue;
use crate::timeout::TimeoutScheduler;
use crate::types::{BindingAction, KeyBinding, KeyUsage};

pub const UP: KeyUsage = KeyUsage::keyboard(0x52);
pub const DOWN: KeyUsage = KeyUsage::keyboard(0x51);
pub const PAGE_UP: KeyUsage = KeyUsage::keyboard(0x4B);
pub const PAGE_DOWN: KeyUsage = KeyUsage::keyboard(0x4E);

pub type TestTranslator<'a> = HoldStepTranslator<'a, CriticalSectionRawMutex, 2, 4>;

/// Arrow keys held, page keys stepped.
pub fn arrow_config() -> HoldStepConfig {
    HoldStepConfig::new(
        Some(KeyBinding::key_press(UP)),
        Some(KeyBinding::key_press(DOWN)),
        Some(KeyBinding::key_press(PAGE_UP)),
        Some(KeyBinding::key_press(PAGE_DOWN)),
    )
}

pub fn at(ms: u64) -> Instant {
    Instant::from_millis(ms)
}

#[derive(Default)]
pub struct RecordingQueue {
    actions: StdMutex<Vec<BindingAction>>,
}

impl RecordingQueue {
    pub fn take(&self) -> Vec<BindingAction> {
        core::mem::take(&mut *self.actions.lock().unwrap())
    }

    /// `(usage id, pressed)` pairs, which is what most assertions care about.
    pub fn take_keys(&self) -> Vec<(u16, bool)> {
        self.take()
            .into_iter()
            .map(|action| {
                let usage = action.binding.key_usage().unwrap();
                (usage.id, action.pressed)
            })
            .collect()
    }
}

impl BindingQueue for RecordingQueue {
    fn enqueue(&self, action: BindingAction) {
        self.actions.lock().unwrap().push(action);
    }
}

pub struct Harness {
    pub layers: ActiveLayers,
    pub queue: RecordingQueue,
    pub scheduler: TimeoutScheduler<CriticalSectionRawMutex>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            layers: ActiveLayers::new(),
            queue: RecordingQueue::default(),
            scheduler: TimeoutScheduler::new(),
        }
    }

    pub fn translator(&self, name: &'static str, config: HoldStepConfig) -> TestTranslator<'_> {
        HoldStepTranslator::new(name, config, &self.layers, &self.queue, &self.scheduler)
    }
}

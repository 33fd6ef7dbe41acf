use core::cell::RefCell;

use embassy_sync::blocking_mutex::{raw::RawMutex, Mutex};
use embassy_time::Instant;

use crate::config::HoldStepConfig;
use crate::direction::resolve_tick;
use crate::layer_gate::LayerStack;
use crate::queue::{enqueue_all, BindingQueue};
use crate::registry::HoldStepInstance;
use crate::timeout::TimeoutScheduler;
use crate::types::{
    BindingEvent, Direction, IneligibleTick, KeyUsage, LayerId, ProcessMode, RawSample,
    TickReport,
};

use super::slot::{DispatchContext, SlotEvent, SlotSnapshot};
use super::table::{SlotIndex, SlotTable};

/// One configured hold/step encoder behavior with a slot per (encoder, layer).
///
/// Rotation triggers, deadline expiry and quick release all mutate slots under the
/// same lock, and actions reach the binding queue while that lock is held, so the
/// queue sees them in transition order.
pub struct HoldStepTranslator<'a, M: RawMutex, const ENCODERS: usize, const LAYERS: usize> {
    name: &'static str,
    config: HoldStepConfig,
    layers: &'a dyn LayerStack,
    queue: &'a dyn BindingQueue,
    scheduler: &'a TimeoutScheduler<M>,
    table: Mutex<M, RefCell<SlotTable<ENCODERS, LAYERS>>>,
}

impl<'a, M: RawMutex, const ENCODERS: usize, const LAYERS: usize>
    HoldStepTranslator<'a, M, ENCODERS, LAYERS>
{
    pub fn new(
        name: &'static str,
        config: HoldStepConfig,
        layers: &'a dyn LayerStack,
        queue: &'a dyn BindingQueue,
        scheduler: &'a TimeoutScheduler<M>,
    ) -> Self {
        Self {
            name,
            config,
            layers,
            queue,
            scheduler,
            table: Mutex::new(RefCell::new(SlotTable::new())),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn config(&self) -> &HoldStepConfig {
        &self.config
    }

    pub fn position_of(&self, encoder: usize) -> u32 {
        self.config
            .sensor_position_base
            .saturating_add(encoder as u32)
    }

    /// Stores the direction of `sample` until the next `trigger` for the same slot.
    pub fn accept(
        &self,
        encoder: usize,
        layer: LayerId,
        sample: RawSample,
    ) -> Result<Direction, IneligibleTick> {
        let index = SlotIndex::new::<ENCODERS, LAYERS>(encoder, layer)?;
        let direction = resolve_tick(sample);
        self.table
            .lock(|table| table.borrow_mut().set_pending(index, direction));
        log::trace!(
            "{}: accept enc={} layer={} major={} minor={} dir={}",
            self.name,
            encoder,
            layer,
            sample.major,
            sample.minor,
            direction.label()
        );
        Ok(direction)
    }

    /// Consumes the pending direction and runs one tick of the slot machine.
    pub fn trigger(
        &self,
        encoder: usize,
        layer: LayerId,
        mode: ProcessMode,
        now: Instant,
    ) -> Result<TickReport, IneligibleTick> {
        let index = SlotIndex::new::<ENCODERS, LAYERS>(encoder, layer)?;
        let result = self.table.lock(|table| {
            let mut table = table.borrow_mut();
            let direction = table.take_pending(index);

            if !self.config.layer_policy.allows(layer, self.layers) {
                if self
                    .dispatch(&mut table, index, SlotEvent::ForceRelease { now })
                    .released
                {
                    log::debug!(
                        "{}: layer gate released enc={} layer={}",
                        self.name,
                        encoder,
                        layer
                    );
                }
                return Err(IneligibleTick::LayerGated);
            }

            if mode != ProcessMode::Trigger {
                return Err(IneligibleTick::Discarded);
            }

            if direction.is_none() {
                return Err(IneligibleTick::NoPendingDirection);
            }

            let event = BindingEvent {
                position: self.position_of(encoder),
                layer,
                timestamp: now,
            };
            self.dispatch(&mut table, index, SlotEvent::Rotate { direction, event })
                .report
                .ok_or(IneligibleTick::NoPendingDirection)
        });

        if result.is_ok() {
            self.scheduler.rearm();
        }
        result
    }

    /// Forces one slot idle. Returns `Ok(false)` when nothing was held.
    pub fn release(
        &self,
        encoder: usize,
        layer: LayerId,
        now: Instant,
    ) -> Result<bool, IneligibleTick> {
        let index = SlotIndex::new::<ENCODERS, LAYERS>(encoder, layer)?;
        Ok(self.table.lock(|table| {
            let mut table = table.borrow_mut();
            table.clear_pending(index);
            self.dispatch(&mut table, index, SlotEvent::ForceRelease { now })
                .released
        }))
    }

    /// Releases every slot whose deadline is at or before `now` and returns the
    /// earliest deadline still armed.
    pub fn expire(&self, now: Instant) -> Option<Instant> {
        self.table.lock(|table| {
            let mut table = table.borrow_mut();
            let mut next: Option<Instant> = None;
            for index in SlotTable::<ENCODERS, LAYERS>::indices() {
                let Some(deadline) = table.slot(index).inner().deadline() else {
                    continue;
                };
                if deadline > now {
                    next = Some(next.map_or(deadline, |earliest| earliest.min(deadline)));
                    continue;
                }
                if self
                    .dispatch(&mut table, index, SlotEvent::Expire { now })
                    .released
                {
                    table.clear_pending(index);
                }
            }
            next
        })
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.table.lock(|table| {
            let table = table.borrow();
            SlotTable::<ENCODERS, LAYERS>::indices()
                .filter_map(|index| table.slot(index).inner().deadline())
                .min()
        })
    }

    /// Applies the quick-release policy for a key press seen elsewhere on the board.
    /// Returns how many held slots were released.
    pub fn quick_release(&self, key: KeyUsage, now: Instant) -> usize {
        let policy = &self.config.quick_release;
        if !policy.enabled {
            return 0;
        }

        let exempt = policy.allows(key) || self.config.emits_usage(key);
        let topmost = self
            .config
            .layer_policy
            .requires_top_layer()
            .then(|| self.layers.topmost_active_layer());
        if exempt && topmost.is_none() {
            return 0;
        }

        self.table.lock(|table| {
            let mut table = table.borrow_mut();
            let mut released = 0;
            for index in SlotTable::<ENCODERS, LAYERS>::indices() {
                let backgrounded = topmost.is_some_and(|top| index.layer() != top);
                if exempt && !backgrounded {
                    continue;
                }
                table.clear_pending(index);
                if !table.slot(index).inner().is_active() {
                    continue;
                }
                if self
                    .dispatch(&mut table, index, SlotEvent::ForceRelease { now })
                    .released
                {
                    released += 1;
                }
            }
            if released > 0 {
                log::debug!(
                    "{}: quick release page={:#04x} id={:#04x} released={}",
                    self.name,
                    key.page,
                    key.id,
                    released
                );
            }
            released
        })
    }

    pub fn slot(&self, encoder: usize, layer: LayerId) -> Result<SlotSnapshot, IneligibleTick> {
        let index = SlotIndex::new::<ENCODERS, LAYERS>(encoder, layer)?;
        Ok(self.table.lock(|table| table.borrow().snapshot(index)))
    }

    pub fn active_slots(&self) -> usize {
        self.table.lock(|table| {
            let table = table.borrow();
            SlotTable::<ENCODERS, LAYERS>::indices()
                .filter(|index| table.slot(*index).inner().is_active())
                .count()
        })
    }

    fn dispatch(
        &self,
        table: &mut SlotTable<ENCODERS, LAYERS>,
        index: SlotIndex,
        event: SlotEvent,
    ) -> DispatchContext {
        let mut context = DispatchContext::new(self.config);
        table
            .slot_mut(index)
            .handle_with_context(&event, &mut context);
        enqueue_all(self.queue, &context.actions);
        context
    }
}

impl<M, const ENCODERS: usize, const LAYERS: usize> HoldStepInstance
    for HoldStepTranslator<'_, M, ENCODERS, LAYERS>
where
    M: RawMutex + Sync,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn quick_release_enabled(&self) -> bool {
        self.config.quick_release.enabled
    }

    fn quick_release(&self, key: KeyUsage, now: Instant) -> usize {
        HoldStepTranslator::quick_release(self, key, now)
    }

    fn expire(&self, now: Instant) -> Option<Instant> {
        HoldStepTranslator::expire(self, now)
    }

    fn next_deadline(&self) -> Option<Instant> {
        HoldStepTranslator::next_deadline(self)
    }
}

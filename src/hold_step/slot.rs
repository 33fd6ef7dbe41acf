use embassy_time::{Duration, Instant};
use statig::{blocking::IntoStateMachineExt as _, prelude::*};

use crate::config::{DirectionHoldMode, HoldStepConfig};
use crate::types::{
    ActionBuffer, BindingEvent, Direction, HoldTransition, KeyBinding, LayerId, TickReport,
};

#[derive(Clone, Copy, Debug)]
pub(super) enum SlotEvent {
    Rotate {
        direction: Direction,
        event: BindingEvent,
    },
    /// Deadline check; only releases when the armed deadline has really passed.
    Expire {
        now: Instant,
    },
    ForceRelease {
        now: Instant,
    },
}

pub(super) struct DispatchContext {
    pub(super) config: HoldStepConfig,
    pub(super) actions: ActionBuffer,
    pub(super) report: Option<TickReport>,
    pub(super) released: bool,
}

impl DispatchContext {
    pub(super) fn new(config: HoldStepConfig) -> Self {
        Self {
            config,
            actions: ActionBuffer::new(),
            report: None,
            released: false,
        }
    }
}

/// Read-only view of one slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotSnapshot {
    pub active: bool,
    pub active_binding: Option<KeyBinding>,
    pub active_direction: Direction,
    pub step_count: u16,
    pub last_position: u32,
    pub last_layer: LayerId,
    pub deadline: Option<Instant>,
    pub pending: Direction,
}

pub(super) struct HoldSlot {
    active: bool,
    active_binding: Option<KeyBinding>,
    active_direction: Direction,
    step_count: u16,
    last_position: u32,
    last_layer: LayerId,
    deadline: Option<Instant>,
}

pub(super) type SlotMachine = statig::blocking::StateMachine<HoldSlot>;

impl HoldSlot {
    pub(super) fn new_machine() -> SlotMachine {
        Self {
            active: false,
            active_binding: None,
            active_direction: Direction::None,
            step_count: 0,
            last_position: 0,
            last_layer: 0,
            deadline: None,
        }
        .state_machine()
    }

    pub(super) fn snapshot(&self, pending: Direction) -> SlotSnapshot {
        SlotSnapshot {
            active: self.active,
            active_binding: self.active.then_some(self.active_binding).flatten(),
            active_direction: self.active_direction,
            step_count: self.step_count,
            last_position: self.last_position,
            last_layer: self.last_layer,
            deadline: self.deadline,
            pending,
        }
    }

    pub(super) fn is_active(&self) -> bool {
        self.active
    }

    pub(super) fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    fn record_event(&mut self, event: &BindingEvent) {
        self.last_position = event.position;
        self.last_layer = event.layer;
    }

    fn arm(&mut self, now: Instant, timeout: Duration) {
        self.deadline = Some(now + timeout);
    }

    fn count_step(
        &mut self,
        context: &mut DispatchContext,
        direction: Direction,
        event: &BindingEvent,
    ) -> bool {
        let group = context.config.step_group_size;
        if group == 0 {
            return false;
        }

        self.step_count += 1;
        if self.step_count < group {
            return false;
        }

        self.step_count = 0;
        log::debug!(
            "step fire dir={} n={} pos={}",
            direction.label(),
            group,
            event.position
        );
        context
            .actions
            .tap(*event, context.config.step_binding(direction));
        true
    }

    fn start_hold(
        &mut self,
        context: &mut DispatchContext,
        direction: Direction,
        event: &BindingEvent,
    ) {
        self.active = true;
        self.active_direction = direction;
        self.active_binding = context.config.hold_binding(direction);
        log::debug!(
            "hold press start dir={} pos={} layer={}",
            direction.label(),
            event.position,
            event.layer
        );
        context.actions.press(*event, self.active_binding);
        self.arm(event.timestamp, context.config.timeout());
    }

    fn continue_hold(
        &mut self,
        context: &mut DispatchContext,
        direction: Direction,
        event: &BindingEvent,
    ) -> HoldTransition {
        let transition = if direction == self.active_direction {
            HoldTransition::Extended
        } else {
            match context.config.direction_hold_mode {
                DirectionHoldMode::Switch => {
                    let next = context.config.hold_binding(direction);
                    if next != self.active_binding {
                        log::debug!("hold switch to {}", direction.label());
                        context.actions.release(*event, self.active_binding);
                        context.actions.press(*event, next);
                    }
                    self.active_binding = next;
                    self.active_direction = direction;
                    HoldTransition::Switched
                }
                DirectionHoldMode::Sticky => {
                    log::debug!("hold sticky extend");
                    HoldTransition::StickyExtended
                }
            }
        };
        self.arm(event.timestamp, context.config.timeout());
        transition
    }

    fn release_hold(&mut self, context: &mut DispatchContext, now: Instant) {
        let event = BindingEvent {
            position: self.last_position,
            layer: self.last_layer,
            timestamp: now,
        };
        context.actions.release(event, self.active_binding);
        context.released = true;
        self.clear();
    }

    fn clear(&mut self) {
        self.active = false;
        self.active_binding = None;
        self.active_direction = Direction::None;
        self.deadline = None;
        self.step_count = 0;
    }
}

#[state_machine(initial = "State::idle()")]
impl HoldSlot {
    #[state]
    fn idle(&mut self, context: &mut DispatchContext, event: &SlotEvent) -> Outcome<State> {
        match event {
            SlotEvent::Rotate { direction, event } => {
                self.record_event(event);
                let step_fired = self.count_step(context, *direction, event);
                self.start_hold(context, *direction, event);
                context.report = Some(TickReport {
                    transition: HoldTransition::Started,
                    step_fired,
                });
                Transition(State::holding())
            }
            SlotEvent::Expire { .. } | SlotEvent::ForceRelease { .. } => {
                self.clear();
                Handled
            }
        }
    }

    #[state]
    fn holding(
        &mut self,
        context: &mut DispatchContext,
        event: &SlotEvent,
    ) -> Outcome<State> {
        match event {
            SlotEvent::Rotate { direction, event } => {
                self.record_event(event);
                let step_fired = self.count_step(context, *direction, event);
                let transition = self.continue_hold(context, *direction, event);
                context.report = Some(TickReport {
                    transition,
                    step_fired,
                });
                Handled
            }
            SlotEvent::Expire { now } => {
                if !self.deadline.is_some_and(|deadline| deadline <= *now) {
                    return Handled;
                }
                log::debug!(
                    "timeout release pos={} layer={}",
                    self.last_position,
                    self.last_layer
                );
                self.release_hold(context, *now);
                Transition(State::idle())
            }
            SlotEvent::ForceRelease { now } => {
                log::debug!(
                    "forced release pos={} layer={}",
                    self.last_position,
                    self.last_layer
                );
                self.release_hold(context, *now);
                Transition(State::idle())
            }
        }
    }
}

use crate::types::{Direction, IneligibleTick, LayerId};

use super::slot::{HoldSlot, SlotMachine, SlotSnapshot};

/// Checked (encoder, layer) coordinates into a `SlotTable` of the same shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotIndex {
    encoder: usize,
    layer: usize,
}

impl SlotIndex {
    pub fn new<const ENCODERS: usize, const LAYERS: usize>(
        encoder: usize,
        layer: LayerId,
    ) -> Result<Self, IneligibleTick> {
        if encoder >= ENCODERS {
            return Err(IneligibleTick::EncoderOutOfRange);
        }
        let layer = layer as usize;
        if layer >= LAYERS {
            return Err(IneligibleTick::LayerOutOfRange);
        }
        Ok(Self { encoder, layer })
    }

    pub fn encoder(self) -> usize {
        self.encoder
    }

    pub fn layer(self) -> LayerId {
        self.layer as LayerId
    }
}

pub(super) struct SlotTable<const ENCODERS: usize, const LAYERS: usize> {
    pending: [[Direction; LAYERS]; ENCODERS],
    slots: [[SlotMachine; LAYERS]; ENCODERS],
}

impl<const ENCODERS: usize, const LAYERS: usize> SlotTable<ENCODERS, LAYERS> {
    pub(super) fn new() -> Self {
        Self {
            pending: [[Direction::None; LAYERS]; ENCODERS],
            slots: core::array::from_fn(|_| core::array::from_fn(|_| HoldSlot::new_machine())),
        }
    }

    pub(super) fn set_pending(&mut self, index: SlotIndex, direction: Direction) {
        self.pending[index.encoder][index.layer] = direction;
    }

    pub(super) fn take_pending(&mut self, index: SlotIndex) -> Direction {
        core::mem::take(&mut self.pending[index.encoder][index.layer])
    }

    pub(super) fn clear_pending(&mut self, index: SlotIndex) {
        self.pending[index.encoder][index.layer] = Direction::None;
    }

    pub(super) fn slot(&self, index: SlotIndex) -> &SlotMachine {
        &self.slots[index.encoder][index.layer]
    }

    pub(super) fn slot_mut(&mut self, index: SlotIndex) -> &mut SlotMachine {
        &mut self.slots[index.encoder][index.layer]
    }

    pub(super) fn snapshot(&self, index: SlotIndex) -> SlotSnapshot {
        self.slot(index)
            .inner()
            .snapshot(self.pending[index.encoder][index.layer])
    }

    pub(super) fn indices() -> impl Iterator<Item = SlotIndex> {
        (0..ENCODERS).flat_map(|encoder| (0..LAYERS).map(move |layer| SlotIndex { encoder, layer }))
    }
}

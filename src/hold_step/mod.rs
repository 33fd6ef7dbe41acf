//! Hold/step translation: one statig machine per (encoder, layer) slot.

mod slot;
mod table;
mod translator;


pub use slot::SlotSnapshot;
pub use table::SlotIndex;
pub use translator::HoldStepTranslator;

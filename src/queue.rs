use embassy_sync::{blocking_mutex::raw::RawMutex, channel::Channel};

use crate::types::{ActionBuffer, BindingAction};

/// Sink for press/release requests. Implementations keep FIFO order and never block.
pub trait BindingQueue: Sync {
    fn enqueue(&self, action: BindingAction);
}

pub fn enqueue_all(queue: &dyn BindingQueue, actions: &ActionBuffer) {
    for action in actions.iter() {
        queue.enqueue(*action);
    }
}

impl<M, const N: usize> BindingQueue for Channel<M, BindingAction, N>
where
    M: RawMutex + Sync,
{
    fn enqueue(&self, action: BindingAction) {
        if self.try_send(action).is_err() {
            log::warn!(
                "binding queue full, dropped {} pos={} layer={}",
                if action.pressed { "press" } else { "release" },
                action.event.position,
                action.event.layer
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    use embassy_time::Instant;

    use super::*;
    use crate::types::{BindingEvent, KeyBinding, KeyUsage};

    fn event() -> BindingEvent {
        BindingEvent {
            position: 4,
            layer: 0,
            timestamp: Instant::from_millis(10),
        }
    }

    #[test]
    fn channel_queue_preserves_order() {
        let channel: Channel<CriticalSectionRawMutex, BindingAction, 4> = Channel::new();
        let binding = KeyBinding::key_press(KeyUsage::keyboard(0x52));

        let mut actions = ActionBuffer::new();
        actions.tap(event(), Some(binding));
        enqueue_all(&channel, &actions);

        let first = channel.try_receive().expect("press queued");
        let second = channel.try_receive().expect("release queued");
        assert!(first.pressed);
        assert!(!second.pressed);
        assert!(channel.try_receive().is_err());
    }

    #[test]
    fn full_channel_drops_instead_of_blocking() {
        let channel: Channel<CriticalSectionRawMutex, BindingAction, 1> = Channel::new();
        let binding = KeyBinding::key_press(KeyUsage::keyboard(0x04));

        channel.enqueue(BindingAction::press(event(), binding));
        channel.enqueue(BindingAction::release(event(), binding));

        assert!(channel.try_receive().expect("first kept").pressed);
        assert!(channel.try_receive().is_err());
    }
}

use embassy_futures::select::select;
use embassy_sync::{blocking_mutex::raw::RawMutex, signal::Signal};
use embassy_time::{Instant, Timer};

use crate::registry::TranslatorRegistry;

/// Drives hold deadlines for every registered translator.
///
/// Deadlines live in the slots themselves; the scheduler only sleeps until the
/// earliest one and is woken early whenever a translator arms a new deadline.
pub struct TimeoutScheduler<M: RawMutex> {
    rearm: Signal<M, ()>,
}

impl<M: RawMutex> TimeoutScheduler<M> {
    pub const fn new() -> Self {
        Self {
            rearm: Signal::new(),
        }
    }

    pub fn rearm(&self) {
        self.rearm.signal(());
    }

    pub fn rearm_pending(&self) -> bool {
        self.rearm.signaled()
    }

    /// One scheduler pass: expires what is due at `now`.
    pub fn poll<const N: usize>(
        &self,
        registry: &TranslatorRegistry<'_, N>,
        now: Instant,
    ) -> Option<Instant> {
        self.rearm.reset();
        registry.expire_all(now)
    }

    pub async fn run<const N: usize>(&self, registry: &TranslatorRegistry<'_, N>) -> ! {
        loop {
            match self.poll(registry, Instant::now()) {
                Some(deadline) => {
                    select(Timer::at(deadline), self.rearm.wait()).await;
                }
                None => self.rearm.wait().await,
            }
        }
    }
}

impl<M: RawMutex> Default for TimeoutScheduler<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use embassy_futures::{block_on, select::select};
    use embassy_time::{Instant, Timer};

    use crate::registry::TranslatorRegistry;
    use crate::test_support::{arrow_config, at, Harness, UP};
    use crate::types::{ProcessMode, RawSample};

    #[test]
    fn trigger_requests_a_rearm_and_poll_consumes_it() {
        let harness = Harness::new();
        let translator = harness.translator("scroll", arrow_config());
        let mut registry: TranslatorRegistry<'_, 1> = TranslatorRegistry::new();
        registry.register(&translator).unwrap();

        assert!(!harness.scheduler.rearm_pending());
        translator.accept(0, 0, RawSample::ticks(1)).unwrap();
        translator
            .trigger(0, 0, ProcessMode::Trigger, at(100))
            .unwrap();
        assert!(harness.scheduler.rearm_pending());

        assert_eq!(harness.scheduler.poll(&registry, at(150)), Some(at(280)));
        assert!(!harness.scheduler.rearm_pending());

        assert_eq!(harness.scheduler.poll(&registry, at(280)), None);
        assert_eq!(harness.queue.take_keys(), [(UP.id, true), (UP.id, false)]);
    }

    #[test]
    fn run_releases_holds_once_their_deadline_passes() {
        let harness = Harness::new();
        let translator = harness.translator("scroll", arrow_config().with_timeout_ms(20));
        let mut registry: TranslatorRegistry<'_, 1> = TranslatorRegistry::new();
        registry.register(&translator).unwrap();

        translator.accept(0, 0, RawSample::ticks(1)).unwrap();
        translator
            .trigger(0, 0, ProcessMode::Trigger, Instant::now())
            .unwrap();

        block_on(select(
            harness.scheduler.run(&registry),
            Timer::after_millis(200),
        ));

        assert_eq!(translator.active_slots(), 0);
        assert_eq!(harness.queue.take_keys(), [(UP.id, true), (UP.id, false)]);
    }
}

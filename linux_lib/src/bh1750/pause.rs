use super::Pause;

use core::time::Duration;

use embedded_hal::blocking::delay::DelayUs;
use log::warn;
use nix::errno::Errno;
use nix::libc;
use nix::sys::time::{TimeSpec, TimeValLike};

/// `nanosleep(2)`. A signal cuts the sleep short and the kernel's remainder
/// is handed back.
#[derive(Debug, Default, Clone, Copy)]
pub struct Nanosleep;

impl Pause for Nanosleep {
    fn pause(&mut self, duration: Duration) -> Duration {
        let request = TimeSpec::from_duration(duration);
        let mut remaining = TimeSpec::nanoseconds(0);
        if unsafe { libc::nanosleep(request.as_ref(), remaining.as_mut()) } == 0 {
            return Duration::ZERO;
        }
        match Errno::last() {
            Errno::EINTR => Duration::new(remaining.tv_sec() as u64, remaining.tv_nsec() as u32),
            errno => {
                warn!("nanosleep({:?}) failed: {}", duration, errno);
                Duration::ZERO
            }
        }
    }
}

/// Any `embedded-hal` microsecond delay. Sleeps never end early, but a
/// single call is capped at `u32::MAX` microseconds.
pub struct HalDelay<D>(pub D);

impl<D: DelayUs<u32>> Pause for HalDelay<D> {
    fn pause(&mut self, duration: Duration) -> Duration {
        let us = (duration.as_nanos() + 999) / 1_000;
        let us = u32::try_from(us).unwrap_or(u32::MAX);
        self.0.delay_us(us);
        duration.saturating_sub(Duration::from_micros(u64::from(us)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use embedded_hal_mock::delay::MockNoop;
    use nix::sys::pthread::{pthread_kill, pthread_self};
    use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
    use std::thread;
    use std::time::Instant;

    extern "C" fn wake(_: libc::c_int) {}

    #[test]
    fn nanosleep_sleeps_the_full_duration() {
        let started = Instant::now();
        assert_eq!(Nanosleep.pause(Duration::from_millis(5)), Duration::ZERO);
        assert!(started.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn nanosleep_hands_back_remainder_when_signalled() {
        let action = SigAction::new(SigHandler::Handler(wake), SaFlags::empty(), SigSet::empty());
        unsafe { sigaction(Signal::SIGUSR1, &action) }.unwrap();

        let sleeper = pthread_self();
        let waker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            pthread_kill(sleeper, Signal::SIGUSR1).unwrap();
        });

        let started = Instant::now();
        let remaining = Nanosleep.pause(Duration::from_secs(2));
        let slept = started.elapsed();
        waker.join().unwrap();

        assert!(slept < Duration::from_millis(1_500), "slept {slept:?}");
        assert!(remaining > Duration::from_millis(500), "remaining {remaining:?}");
        assert!(remaining < Duration::from_secs(2), "remaining {remaining:?}");
    }

    #[test]
    fn hal_delay_rounds_up_to_whole_microseconds() {
        let mut pause = HalDelay(MockNoop::new());
        assert_eq!(pause.pause(Duration::from_nanos(662_608_695)), Duration::ZERO);
    }

    #[test]
    fn hal_delay_reports_what_did_not_fit() {
        let mut pause = HalDelay(MockNoop::new());
        let remaining = pause.pause(Duration::from_secs(5_000));
        assert_eq!(
            remaining,
            Duration::from_secs(5_000) - Duration::from_micros(u64::from(u32::MAX))
        );
    }
}

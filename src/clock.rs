use crate::error::Error;
use fugit::TimerDurationU32;
use fugit_timer::Timer;

/// Starts the timer with the given duration
pub(crate) fn arm<T: Timer<TIMER_HZ>, const TIMER_HZ: u32>(
    timer: &mut T,
    duration: TimerDurationU32<TIMER_HZ>,
) -> Result<(), Error> {
    timer.start(duration).map_err(|_| Error::TimerError)
}

/// Returns true once the armed duration has elapsed. Never blocks.
pub(crate) fn expired<T: Timer<TIMER_HZ>, const TIMER_HZ: u32>(timer: &mut T) -> Result<bool, Error> {
    match timer.wait() {
        Ok(_) => Ok(true),
        Err(nb::Error::WouldBlock) => Ok(false),
        Err(nb::Error::Other(_)) => Err(Error::TimerError),
    }
}

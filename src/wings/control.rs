//! Control thread and limit-switch interrupt handling.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use log::{debug, error, info, warn};

use super::{Shared, Side, WingState, lock};
use crate::drivers::motor::Direction;
use crate::error::{Error, Result};
use crate::events::Event;
use crate::timer;

pub(crate) enum Command {
    Calibrate(Arc<Signal<CriticalSectionRawMutex, Result<WingState>>>),
    MoveTo(Direction),
    Count(u32),
    Timed(Duration),
    Shutdown,
}

/// What the motor is currently doing on behalf of the control thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Activity {
    Idle,
    /// Energised in the default direction; either end-stop ends it.
    Calibrating,
    /// Energised toward one end-stop; only that switch ends it.
    Seeking(Direction),
    /// Energised for a fixed window; switches only update the state.
    Timed,
}

pub(crate) struct Recorded {
    pub state: WingState,
    pub activity: Activity,
    /// The wing left `state`'s end-stop without closing another one.
    pub off_stop: bool,
}

fn halt(shared: &Shared) {
    if let Err(e) = lock(&shared.motor).stop() {
        error!("WINGS[{}]: motor stop failed: {}", shared.component, e);
    }
}

fn millis(d: Duration) -> u32 {
    d.as_millis().min(u128::from(u32::MAX)) as u32
}

// ---------------------------------------------------------------------------
// Interrupt side
// ---------------------------------------------------------------------------

/// Falling-edge callback for either limit switch.
pub(crate) fn on_switch_closed(shared: &Shared, side: Side, pin: i32) {
    let event = Event {
        component: shared.component.clone(),
        pin_id: pin,
        name: side.switch_name(),
        timestamp_us: shared.clock.uptime_us(),
    };
    shared.events.push(event);

    let end = side.end_stop();
    let mut recorded = lock(&shared.recorded);
    match recorded.activity {
        Activity::Calibrating => {
            halt(shared);
            recorded.state = end.into();
            recorded.off_stop = false;
            recorded.activity = Activity::Idle;
            shared.reached.signal(end);
        }
        Activity::Seeking(target) if target == end => {
            halt(shared);
            recorded.state = end.into();
            recorded.off_stop = false;
            recorded.activity = Activity::Idle;
            shared.reached.signal(end);
        }
        Activity::Timed => {
            recorded.state = end.into();
            recorded.off_stop = false;
        }
        Activity::Seeking(_) | Activity::Idle => {
            debug!(
                "WINGS[{}]: {} closed (not expected)",
                shared.component,
                side.switch_name()
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Control thread
// ---------------------------------------------------------------------------

pub(crate) fn control_loop(shared: &Shared) {
    loop {
        let cmd = timer::block_on(shared.commands.receive());
        if matches!(cmd, Command::Shutdown) {
            break;
        }
        let outcome = if shared.shutdown.load(Ordering::Acquire) {
            Ok(())
        } else {
            match cmd {
                Command::Calibrate(reply) => {
                    reply.signal(calibrate(shared));
                    Ok(())
                }
                Command::MoveTo(end) => move_to(shared, end),
                Command::Count(n) => move_count(shared, n),
                Command::Timed(d) => move_time(shared, d),
                Command::Shutdown => Ok(()),
            }
        };
        if let Err(e) = outcome {
            *lock(&shared.last_error) = Some(e);
        }
        if shared.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            shared.idle.signal(());
        }
    }
    halt(shared);
    debug!("WINGS[{}]: control thread stopped", shared.component);
}

fn calibrate(shared: &Shared) -> Result<WingState> {
    {
        let mut recorded = lock(&shared.recorded);
        shared.reached.reset();
        recorded.state = WingState::Calibrating;
        recorded.activity = Activity::Calibrating;
        recorded.off_stop = false;
    }

    for side in [Side::Left, Side::Right] {
        match shared.switch_closed(side) {
            Ok(true) => {
                let state = WingState::from(side.end_stop());
                let mut recorded = lock(&shared.recorded);
                recorded.state = state;
                recorded.activity = Activity::Idle;
                info!(
                    "WINGS[{}]: calibrated, {} already closed -> {}",
                    shared.component,
                    side.switch_name(),
                    state
                );
                return Ok(state);
            }
            Ok(false) => {}
            Err(e) => {
                let mut recorded = lock(&shared.recorded);
                recorded.state = WingState::Unknown;
                recorded.activity = Activity::Idle;
                return Err(e);
            }
        }
    }

    {
        let mut recorded = lock(&shared.recorded);
        let started = lock(&shared.motor).run(shared.default_direction);
        if let Err(e) = started {
            recorded.state = WingState::Unknown;
            recorded.activity = Activity::Idle;
            halt(shared);
            return Err(e.into());
        }
    }
    info!(
        "WINGS[{}]: calibrating, driving {:?}",
        shared.component, shared.default_direction
    );

    if let Some(end) = timer::block_on_timeout(shared.reached.wait(), shared.calibration_timeout) {
        let state = WingState::from(end);
        info!("WINGS[{}]: calibrated -> {}", shared.component, state);
        return Ok(state);
    }

    let mut recorded = lock(&shared.recorded);
    if recorded.state.is_stable() {
        // Switch closed while the timer was firing.
        return Ok(recorded.state);
    }
    recorded.state = WingState::Unknown;
    recorded.activity = Activity::Idle;
    halt(shared);
    let timeout_ms = millis(shared.calibration_timeout);
    error!(
        "WINGS[{}]: calibration failed, no end-stop within {} ms",
        shared.component, timeout_ms
    );
    Err(Error::Calibration { timeout_ms })
}

/// One swing toward `end`, bounded by the watchdog.
fn activate(shared: &Shared, end: Direction) -> Result<()> {
    {
        let mut recorded = lock(&shared.recorded);
        shared.reached.reset();
        recorded.activity = Activity::Seeking(end);
        let started = lock(&shared.motor).run(end);
        if let Err(e) = started {
            recorded.activity = Activity::Idle;
            halt(shared);
            return Err(e.into());
        }
    }
    debug!("WINGS[{}]: seeking {:?}", shared.component, end);

    if timer::block_on_timeout(shared.reached.wait(), shared.watchdog).is_some() {
        return Ok(());
    }

    let mut recorded = lock(&shared.recorded);
    if recorded.activity != Activity::Seeking(end) {
        return Ok(());
    }
    recorded.activity = Activity::Idle;
    halt(shared);
    let timeout_ms = millis(shared.watchdog);
    error!(
        "WINGS[{}]: stuck, {:?} end-stop not reached within {} ms (state stays {})",
        shared.component, end, timeout_ms, recorded.state
    );
    Err(Error::StuckActuator {
        target: end.into(),
        timeout_ms,
    })
}

fn current_end(shared: &Shared) -> Result<Direction> {
    lock(&shared.recorded)
        .state
        .end_stop()
        .ok_or(Error::NotCalibrated)
}

/// End-stop whose switch currently reads closed, if any.
fn resting_end(shared: &Shared) -> Result<Option<Direction>> {
    for side in [Side::Left, Side::Right] {
        if shared.switch_closed(side)? {
            return Ok(Some(side.end_stop()));
        }
    }
    Ok(None)
}

fn move_to(shared: &Shared, end: Direction) -> Result<()> {
    let from = current_end(shared)?;
    let off_stop = lock(&shared.recorded).off_stop;
    if from == end && !off_stop {
        debug!("WINGS[{}]: already {:?}", shared.component, end);
        return Ok(());
    }
    activate(shared, end)
}

fn move_count(shared: &Shared, count: u32) -> Result<()> {
    for i in 0..count {
        if shared.shutdown.load(Ordering::Acquire) {
            warn!(
                "WINGS[{}]: shutdown after {}/{} swings",
                shared.component, i, count
            );
            break;
        }
        let from = current_end(shared)?;
        activate(shared, from.reversed())?;
    }
    Ok(())
}

fn move_time(shared: &Shared, duration: Duration) -> Result<()> {
    current_end(shared)?;
    {
        let mut recorded = lock(&shared.recorded);
        recorded.activity = Activity::Timed;
        let started = lock(&shared.motor).run(shared.default_direction);
        if let Err(e) = started {
            recorded.activity = Activity::Idle;
            halt(shared);
            return Err(e.into());
        }
    }
    debug!(
        "WINGS[{}]: timed move {:?} for {} ms",
        shared.component,
        shared.default_direction,
        millis(duration)
    );
    timer::sleep(duration);

    let mut recorded = lock(&shared.recorded);
    recorded.activity = Activity::Idle;
    halt(shared);
    match resting_end(shared) {
        Ok(Some(end)) => {
            recorded.state = end.into();
            recorded.off_stop = false;
            Ok(())
        }
        Ok(None) => {
            warn!(
                "WINGS[{}]: timed move stopped between end-stops, {} is stale",
                shared.component, recorded.state
            );
            recorded.off_stop = true;
            Ok(())
        }
        Err(e) => {
            recorded.off_stop = true;
            Err(e)
        }
    }
}

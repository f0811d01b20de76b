//! Clock manager with automatic fallback
//!
//! Owns the clock configuration and the low-level [`ClockControl`]. Two
//! producers mutate it: the dispatcher (`clk`) and the resuscitation handler,
//! which the hardware invokes asynchronously when the external reference is
//! lost. Both go through the same blocking mutex, so resuscitation may fire
//! between any two dispatcher steps.
//!
//! After resuscitation the dispatcher is notified through a [`Signal`] so it
//! can discard transport input and tell the host.

use core::cell::{Cell, RefCell};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use platform::clock::{ClockControl, ClockDomain, ClockError, ClockSource};
use platform::config::{BOARD, DEFAULT_SYSTEM_HZ};

/// Clock source and frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClockConfig {
    /// Where `clk_sys` comes from
    pub source: ClockSource,
    /// Requested `clk_sys` frequency (Hz)
    pub frequency_hz: u32,
}

impl ClockConfig {
    /// Boot and fallback configuration.
    pub const DEFAULT: Self = Self {
        source: ClockSource::Internal,
        frequency_hz: DEFAULT_SYSTEM_HZ,
    };
}

/// Shared clock state and primitives.
pub struct ClockManager<M: RawMutex, C> {
    control: Mutex<M, RefCell<C>>,
    config: Mutex<M, Cell<ClockConfig>>,
    resuscitated: Signal<M, ()>,
}

impl<M: RawMutex, C: ClockControl> ClockManager<M, C> {
    /// Wrap `control`; the configuration starts at [`ClockConfig::DEFAULT`].
    pub const fn new(control: C) -> Self {
        Self {
            control: Mutex::new(RefCell::new(control)),
            config: Mutex::new(Cell::new(ClockConfig::DEFAULT)),
            resuscitated: Signal::new(),
        }
    }

    /// Current configuration
    pub fn config(&self) -> ClockConfig {
        self.config.lock(Cell::get)
    }

    /// Reconfigure the system clock.
    ///
    /// Internal requests must be whole kHz and exactly reachable by PLL_SYS;
    /// on failure the previous configuration stays. External requests are
    /// accepted without confirming the reference, and the configuration is
    /// marked external before the mux switches so a resuscitation triggered by
    /// the switch wins.
    pub fn configure(&self, source: ClockSource, frequency_hz: u32) -> Result<(), ClockError> {
        if frequency_hz > BOARD.max_system_hz() {
            return Err(ClockError::FrequencyOutOfRange);
        }
        let config = ClockConfig {
            source,
            frequency_hz,
        };
        match source {
            ClockSource::Internal => {
                if frequency_hz % 1000 != 0 {
                    return Err(ClockError::FrequencyUnachievable);
                }
                self.with_control(|c| c.set_system_khz(frequency_hz / 1000))?;
                self.config.lock(|c| c.set(config));
            }
            ClockSource::External => {
                self.config.lock(|c| c.set(config));
                self.with_control(|c| c.use_external_reference(frequency_hz));
            }
        }
        #[cfg(feature = "defmt")]
        defmt::info!("clock: {} at {} Hz", config.source, config.frequency_hz);
        Ok(())
    }

    /// Apply the boot configuration.
    pub fn apply_default(&self) -> Result<(), ClockError> {
        self.configure(ClockConfig::DEFAULT.source, ClockConfig::DEFAULT.frequency_hz)
    }

    /// Fall back to the internal default and notify the dispatcher.
    ///
    /// Safe to call from interrupt context.
    pub fn resuscitate(&self) {
        self.with_control(|c| {
            if c.set_system_khz(DEFAULT_SYSTEM_HZ / 1000).is_err() {
                #[cfg(feature = "defmt")]
                defmt::error!("clock: default frequency rejected during resuscitation");
            }
            c.release_external_reference();
        });
        self.config.lock(|c| c.set(ClockConfig::DEFAULT));
        self.resuscitated.signal(());
    }

    /// Wait until [`resuscitate`](Self::resuscitate) has run.
    pub async fn wait_resuscitated(&self) {
        self.resuscitated.wait().await;
    }

    /// Measure one clock domain (kHz).
    pub fn measure_khz(&self, domain: ClockDomain) -> u32 {
        self.with_control(|c| c.measure_khz(domain))
    }

    /// Run `f` with exclusive access to the clock primitives.
    pub fn with_control<R>(&self, f: impl FnOnce(&mut C) -> R) -> R {
        self.control.lock(|cell| f(&mut cell.borrow_mut()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use platform::mocks::MockClock;

    fn manager() -> ClockManager<NoopRawMutex, MockClock> {
        ClockManager::new(MockClock::default())
    }

    #[test]
    fn internal_frequency_is_programmed() {
        let m = manager();
        m.configure(ClockSource::Internal, 125_000_000).unwrap();
        assert_eq!(m.config().frequency_hz, 125_000_000);
        assert_eq!(m.with_control(|c| c.system_khz), 125_000);
    }

    #[test]
    fn unachievable_frequency_keeps_previous_config() {
        let m = manager();
        m.apply_default().unwrap();
        assert_eq!(
            m.configure(ClockSource::Internal, 99_991_000),
            Err(ClockError::FrequencyUnachievable)
        );
        assert_eq!(
            m.configure(ClockSource::Internal, 100_000_500),
            Err(ClockError::FrequencyUnachievable)
        );
        assert_eq!(m.config(), ClockConfig::DEFAULT);
    }

    #[test]
    fn frequency_above_board_limit_is_out_of_range() {
        let m = manager();
        let limit = BOARD.max_system_hz();
        assert_eq!(
            m.configure(ClockSource::External, limit + 1),
            Err(ClockError::FrequencyOutOfRange)
        );
        assert_eq!(m.config(), ClockConfig::DEFAULT);
    }

    #[test]
    fn external_reference_is_optimistic() {
        let m = manager();
        m.configure(ClockSource::External, 10_000_000).unwrap();
        assert_eq!(m.config().source, ClockSource::External);
        assert_eq!(m.with_control(|c| c.external_hz), Some(10_000_000));
    }

    #[tokio::test]
    async fn resuscitation_forces_internal_default_and_signals() {
        let m = manager();
        m.configure(ClockSource::External, 10_000_000).unwrap();
        m.resuscitate();

        assert_eq!(m.config(), ClockConfig::DEFAULT);
        assert_eq!(m.with_control(|c| c.external_hz), None);
        assert_eq!(m.with_control(|c| c.system_khz), 100_000);
        // Signal was raised; waiting completes immediately.
        m.wait_resuscitated().await;
    }
}

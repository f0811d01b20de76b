//! System clock control
//!
//! The RP2040 derives `clk_sys` either from PLL_SYS (internal, fed by the
//! 12 MHz crystal) or from an external reference on a GPIN pin.
//!
//! # PLL_SYS
//!
//! ```text
//!   XOSC (12 MHz) -> REFDIV (1) -> VCO (x FBDIV) -> POSTDIV1 -> POSTDIV2 -> clk_sys
//! ```
//!
//! The VCO must stay within 750-1600 MHz and FBDIV within 16-320. Both post
//! dividers are 1-7. A requested frequency is only accepted when some divider
//! combination hits it exactly; [`sys_pll_params`] performs that search,
//! preferring the highest VCO (lowest jitter).

/// Crystal reference feeding PLL_SYS (kHz).
pub const XOSC_KHZ: u32 = 12_000;

/// Lowest permitted VCO frequency (kHz).
pub const VCO_MIN_KHZ: u32 = 750_000;

/// Highest permitted VCO frequency (kHz).
pub const VCO_MAX_KHZ: u32 = 1_600_000;

/// Feedback divider range.
pub const FBDIV_RANGE: core::ops::RangeInclusive<u16> = 16..=320;

/// Largest value of either post divider.
pub const POSTDIV_MAX: u8 = 7;

/// Where `clk_sys` comes from. Reported by `sts` as `clock-status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ClockSource {
    /// PLL_SYS from the crystal.
    Internal = 0,
    /// External reference on the GPIN pin.
    External = 1,
}

impl TryFrom<u32> for ClockSource {
    type Error = ClockError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Internal),
            1 => Ok(Self::External),
            _ => Err(ClockError::InvalidSource),
        }
    }
}

/// Clock domains reported by the `frq` command, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockDomain {
    /// PLL_SYS output
    PllSys,
    /// PLL_USB output
    PllUsb,
    /// Ring oscillator
    Rosc,
    /// System clock
    ClkSys,
    /// Peripheral clock
    ClkPeri,
    /// USB clock
    ClkUsb,
    /// ADC clock
    ClkAdc,
    /// RTC clock
    ClkRtc,
}

impl ClockDomain {
    /// Every domain, in report order.
    pub const ALL: [Self; 8] = [
        Self::PllSys,
        Self::PllUsb,
        Self::Rosc,
        Self::ClkSys,
        Self::ClkPeri,
        Self::ClkUsb,
        Self::ClkAdc,
        Self::ClkRtc,
    ];

    /// Name printed in the frequency report.
    pub const fn name(self) -> &'static str {
        match self {
            Self::PllSys => "pll_sys",
            Self::PllUsb => "pll_usb",
            Self::Rosc => "rosc",
            Self::ClkSys => "clk_sys",
            Self::ClkPeri => "clk_peri",
            Self::ClkUsb => "clk_usb",
            Self::ClkAdc => "clk_adc",
            Self::ClkRtc => "clk_rtc",
        }
    }
}

/// Clock configuration failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockError {
    /// Source selector is neither 0 nor 1.
    InvalidSource,
    /// Frequency above the board maximum.
    FrequencyOutOfRange,
    /// No PLL divider combination produces the frequency exactly.
    FrequencyUnachievable,
}

impl core::fmt::Display for ClockError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidSource => f.write_str("invalid clock source request"),
            Self::FrequencyOutOfRange => f.write_str("invalid clock frequency request"),
            Self::FrequencyUnachievable => {
                f.write_str("Failure. Cannot exactly achieve that clock frequency")
            }
        }
    }
}

/// PLL_SYS divider settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PllParams {
    /// Feedback divider
    pub fbdiv: u16,
    /// First post divider (the larger one)
    pub postdiv1: u8,
    /// Second post divider
    pub postdiv2: u8,
    /// Resulting VCO frequency (kHz)
    pub vco_khz: u32,
}

impl PllParams {
    /// Output frequency these settings produce (kHz).
    pub fn output_khz(&self) -> u32 {
        let div = u32::from(self.postdiv1).saturating_mul(u32::from(self.postdiv2));
        self.vco_khz.checked_div(div).unwrap_or(0)
    }
}

/// Find PLL_SYS settings producing exactly `khz`.
///
/// Searches from the highest feedback divider down, so the first hit runs the
/// VCO as fast as the range allows. Returns `None` when no combination is
/// exact.
pub fn sys_pll_params(khz: u32) -> Option<PllParams> {
    if khz == 0 {
        return None;
    }
    for fbdiv in FBDIV_RANGE.rev() {
        let vco_khz = XOSC_KHZ.saturating_mul(u32::from(fbdiv));
        if !(VCO_MIN_KHZ..=VCO_MAX_KHZ).contains(&vco_khz) {
            continue;
        }
        for postdiv1 in (1..=POSTDIV_MAX).rev() {
            for postdiv2 in (1..=postdiv1).rev() {
                let div = u32::from(postdiv1).saturating_mul(u32::from(postdiv2));
                if vco_khz.checked_rem(div) == Some(0) && vco_khz.checked_div(div) == Some(khz) {
                    return Some(PllParams {
                        fbdiv,
                        postdiv1,
                        postdiv2,
                        vco_khz,
                    });
                }
            }
        }
    }
    None
}

/// Polls allowed for a clock mux to report its new source.
///
/// A switch onto a running clock completes within a few cycles of the slower
/// source; the limit only matters when the target clock is absent.
pub const MUX_SPIN_LIMIT: u32 = 100_000;

/// Poll `done` up to `limit` times. Returns whether it reported true.
pub fn spin_until(limit: u32, mut done: impl FnMut() -> bool) -> bool {
    (0..limit).any(|_| done())
}

/// Low-level clock primitives.
pub trait ClockControl {
    /// Program PLL_SYS to `khz` and run `clk_sys` from it.
    ///
    /// Fails with [`ClockError::FrequencyUnachievable`] without touching the
    /// hardware when the frequency cannot be hit exactly.
    fn set_system_khz(&mut self, khz: u32) -> Result<(), ClockError>;

    /// Run `clk_sys` from the external reference pin at `freq_hz`.
    ///
    /// Returns once the mux is switched, or after [`MUX_SPIN_LIMIT`] polls
    /// when no reference is present; a missing reference is then caught by
    /// the resuscitation hardware.
    fn use_external_reference(&mut self, freq_hz: u32);

    /// Return the external reference pin to its null function.
    fn release_external_reference(&mut self);

    /// Measure a clock domain with the frequency counter (kHz).
    fn measure_khz(&mut self, domain: ClockDomain) -> u32;
}

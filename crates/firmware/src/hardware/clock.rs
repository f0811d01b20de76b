//! RP2040 clock primitives (PAC level)
//!
//! embassy-rp configures the clock tree once at init and offers no runtime
//! reconfiguration, so PLL_SYS, the `clk_sys` mux, GPIN0 and the frequency
//! counter are driven directly through the PAC here. `clk_peri` is left on
//! PLL_USB (see `boot::build_embassy_config`), so only `clk_sys` moves.
//!
//! Resuscitation: the `clk_sys` resus block switches `clk_sys` back to
//! `clk_ref` by itself when the clock stops, then raises `CLOCKS_IRQ`. The
//! handler here acknowledges it and hands off to
//! [`ClockManager::resuscitate`](crate::clock::ClockManager::resuscitate).

use embassy_rp::interrupt;
use embassy_rp::interrupt::InterruptExt;
use embassy_rp::pac;
use embassy_rp::pac::clocks::vals::{ClkSysCtrlAuxsrc, ClkSysCtrlSrc, Fc0src};
use platform::clock::{
    spin_until, sys_pll_params, ClockControl, ClockDomain, ClockError, PllParams, MUX_SPIN_LIMIT,
    XOSC_KHZ,
};
use platform::config::EXTERNAL_CLOCK_PIN;

use super::SHARED;

/// GPIO function select: clock input (GPIN0 on GP20).
const FUNCSEL_GPCK: u8 = 8;

/// GPIO function select: none.
const FUNCSEL_NULL: u8 = 0x1f;

/// `clk_sys_selected` bit for `clk_ref`.
const SELECTED_REF: u32 = 0b01;

/// `clk_sys_selected` bit for the aux mux.
const SELECTED_AUX: u32 = 0b10;

/// Resus timeout in `clk_ref` cycles.
const RESUS_TIMEOUT: u8 = 0xff;

/// Frequency-counter measurement interval (2^n µs).
const FC_INTERVAL: u8 = 10;

/// Handle to the PAC clock registers.
pub struct RpClockControl {
    _private: (),
}

impl RpClockControl {
    /// Create the handle. Only one exists, inside the shared static.
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Wait, bounded, for the `clk_sys` mux to report `selected`.
    ///
    /// Runs inside the clock manager's critical section, so it must not spin
    /// on a clock that never arrives.
    fn wait_selected(selected: u32) -> bool {
        spin_until(MUX_SPIN_LIMIT, || {
            pac::CLOCKS.clk_sys_selected().read() & selected != 0
        })
    }

    /// Glitchlessly move `clk_sys` to `clk_ref`.
    fn park_on_ref() {
        pac::CLOCKS
            .clk_sys_ctrl()
            .modify(|w| w.set_src(ClkSysCtrlSrc::CLK_REF));
        if !Self::wait_selected(SELECTED_REF) {
            defmt::warn!("clock: clk_sys did not reach clk_ref");
        }
    }

    /// Select `auxsrc` at divide-by-one and move `clk_sys` onto the aux mux.
    ///
    /// Returns whether the mux switched. If the aux source is not running the
    /// switch stays pending in hardware and completes when it starts.
    fn run_from_aux(auxsrc: ClkSysCtrlAuxsrc) -> bool {
        let clocks = pac::CLOCKS;
        clocks.clk_sys_ctrl().modify(|w| w.set_auxsrc(auxsrc));
        clocks.clk_sys_div().write(|w| w.set_int(1));
        clocks
            .clk_sys_ctrl()
            .modify(|w| w.set_src(ClkSysCtrlSrc::CLKSRC_CLK_SYS_AUX));
        Self::wait_selected(SELECTED_AUX)
    }

    /// Reprogram PLL_SYS. `clk_sys` must not be running from it.
    fn program_pll(params: PllParams) {
        let pll = pac::PLL_SYS;
        pac::RESETS.reset().modify(|w| w.set_pll_sys(true));
        pac::RESETS.reset().modify(|w| w.set_pll_sys(false));
        while !pac::RESETS.reset_done().read().pll_sys() {}

        pll.cs().write(|w| w.set_refdiv(1));
        pll.fbdiv_int().write(|w| w.set_fbdiv_int(params.fbdiv));
        pll.pwr().modify(|w| {
            w.set_pd(false);
            w.set_vcopd(false);
        });
        while !pll.cs().read().lock() {}

        pll.prim().write(|w| {
            w.set_postdiv1(params.postdiv1);
            w.set_postdiv2(params.postdiv2);
        });
        pll.pwr().modify(|w| w.set_postdivpd(false));
    }

    fn counter_source(domain: ClockDomain) -> Fc0src {
        match domain {
            ClockDomain::PllSys => Fc0src::PLL_SYS_CLKSRC_PRIMARY,
            ClockDomain::PllUsb => Fc0src::PLL_USB_CLKSRC_PRIMARY,
            ClockDomain::Rosc => Fc0src::ROSC_CLKSRC,
            ClockDomain::ClkSys => Fc0src::CLK_SYS,
            ClockDomain::ClkPeri => Fc0src::CLK_PERI,
            ClockDomain::ClkUsb => Fc0src::CLK_USB,
            ClockDomain::ClkAdc => Fc0src::CLK_ADC,
            ClockDomain::ClkRtc => Fc0src::CLK_RTC,
        }
    }
}

impl Default for RpClockControl {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockControl for RpClockControl {
    fn set_system_khz(&mut self, khz: u32) -> Result<(), ClockError> {
        let params = sys_pll_params(khz).ok_or(ClockError::FrequencyUnachievable)?;
        Self::park_on_ref();
        Self::program_pll(params);
        if !Self::run_from_aux(ClkSysCtrlAuxsrc::CLKSRC_PLL_SYS) {
            defmt::warn!("clock: clk_sys switch to PLL_SYS still pending");
        }
        defmt::info!(
            "clock: PLL_SYS fbdiv={=u16} postdiv={=u8}/{=u8} -> {=u32} kHz",
            params.fbdiv,
            params.postdiv1,
            params.postdiv2,
            khz
        );
        Ok(())
    }

    fn use_external_reference(&mut self, freq_hz: u32) {
        let pin = usize::from(EXTERNAL_CLOCK_PIN);
        pac::PADS_BANK0.gpio(pin).modify(|w| w.set_ie(true));
        pac::IO_BANK0
            .gpio(pin)
            .ctrl()
            .write(|w| w.set_funcsel(FUNCSEL_GPCK));
        Self::park_on_ref();
        if Self::run_from_aux(ClkSysCtrlAuxsrc::CLKSRC_GPIN0) {
            defmt::info!("clock: clk_sys from GPIN0 at {=u32} Hz", freq_hz);
        } else {
            defmt::warn!("clock: no reference on GPIN0 yet, switch pending ({=u32} Hz)", freq_hz);
        }
    }

    fn release_external_reference(&mut self) {
        pac::IO_BANK0
            .gpio(usize::from(EXTERNAL_CLOCK_PIN))
            .ctrl()
            .write(|w| w.set_funcsel(FUNCSEL_NULL));
    }

    fn measure_khz(&mut self, domain: ClockDomain) -> u32 {
        let clocks = pac::CLOCKS;
        while clocks.fc0_status().read().running() {}
        clocks.fc0_ref_khz().write(|w| w.set_fc0_ref_khz(XOSC_KHZ));
        clocks.fc0_interval().write(|w| w.set_fc0_interval(FC_INTERVAL));
        clocks.fc0_min_khz().write(|w| w.set_fc0_min_khz(0));
        clocks.fc0_max_khz().write(|w| w.set_fc0_max_khz(0x01ff_ffff));
        clocks
            .fc0_src()
            .write(|w| w.set_fc0_src(Self::counter_source(domain)));
        while !clocks.fc0_status().read().done() {}
        clocks.fc0_result().read().khz()
    }
}

/// Enable the `clk_sys` resus block and its interrupt.
///
/// Call after the default clock is applied.
pub fn enable_resuscitation() {
    let clocks = pac::CLOCKS;
    clocks.clk_sys_resus_ctrl().write(|w| {
        w.set_timeout(RESUS_TIMEOUT);
        w.set_enable(true);
    });
    clocks.inte().write(|w| w.set_clk_sys_resus(true));
    interrupt::CLOCKS_IRQ.unpend();
    // SAFETY: the handler below only touches the shared static, which is
    // interrupt-safe through its critical-section mutexes.
    unsafe { interrupt::CLOCKS_IRQ.enable() };
    defmt::info!("clock: resuscitation armed");
}

#[interrupt]
fn CLOCKS_IRQ() {
    let clocks = pac::CLOCKS;
    clocks.clk_sys_resus_ctrl().modify(|w| w.set_clear(true));
    clocks.clk_sys_resus_ctrl().modify(|w| w.set_clear(false));
    defmt::warn!("clock: clk_sys stopped, falling back to internal default");
    SHARED.clock.resuscitate();
}

//! PIO + DMA pulse sequencer
//!
//! The state machine autopulls 32-bit words: first the start-mode word pushed
//! by software, then the program streamed by DMA channel 0 from the
//! instruction store. Each instruction is `out pins` (output word) followed by
//! `out x` (stored duration); the delay loop makes one instruction last
//! `stored + 4` system clock cycles.
//!
//! A zero duration parks on the trigger input until the next rising edge. A
//! second consecutive zero ends the program with IRQ flag 0.

use embassy_rp::dma::{self, Transfer};
use embassy_rp::gpio::Level;
use embassy_rp::peripherals::{DMA_CH0, PIO0};
use embassy_rp::pio::{
    Common, Config, Direction, FifoJoin, IrqFlags, Pin, ShiftConfig, ShiftDirection, StateMachine,
};
use embassy_rp::{pac, Peripheral};
use platform::sequencer::{PulseSequencer, SequencerError};

use crate::program::OUTPUT_WIDTH;

/// DREQ of PIO0 TX FIFO 0.
const PIO0_TX0_DREQ: u8 = 0;

/// IRQ flag raised at the end of a program.
const COMPLETE_IRQ: u8 = 0;

/// Number of output pins, as a length.
const OUTPUT_PINS: usize = OUTPUT_WIDTH as usize;

/// Sequencer on PIO0 state machine 0.
pub struct RpSequencer<'d> {
    sm: StateMachine<'d, PIO0, 0>,
    irq_flags: IrqFlags<'d, PIO0>,
    dma: DMA_CH0,
    transfer: Option<Transfer<'static, DMA_CH0>>,
    origin: u8,
    outputs: [Pin<'d, PIO0>; OUTPUT_PINS],
}

impl<'d> RpSequencer<'d> {
    /// Load the program and configure the state machine.
    ///
    /// `outputs` must be consecutive pins starting at the output base;
    /// `trigger` is the hardware-start input.
    pub fn new(
        common: &mut Common<'d, PIO0>,
        mut sm: StateMachine<'d, PIO0, 0>,
        irq_flags: IrqFlags<'d, PIO0>,
        dma: DMA_CH0,
        outputs: [Pin<'d, PIO0>; OUTPUT_PINS],
        trigger: Pin<'d, PIO0>,
    ) -> Self {
        let program = pio_proc::pio_asm!(
            // Start mode: zero runs immediately, otherwise wait for a rising edge.
            "out x, 32"
            "jmp !x instr"
            "wait 0 pin 0"
            "wait 1 pin 0"
            ".wrap_target"
            "instr:"
                "out pins, 32"
                "out x, 32"
                "jmp !x hold"
            "delay:"
                "jmp x-- delay"
            ".wrap"
            "hold:"
                "out y, 32"
                "out x, 32"
                "jmp !x finish"
                "wait 0 pin 0"
                "wait 1 pin 0"
                "mov pins, y [1]"
                "jmp delay"
            "finish:"
                "irq 0"
            "park:"
                "jmp park"
        );
        let loaded = common.load_program(&program.program);

        let pins = outputs.each_ref();
        let mut cfg = Config::default();
        cfg.use_program(&loaded, &[]);
        cfg.set_out_pins(&pins);
        cfg.set_in_pins(&[&trigger]);
        cfg.shift_out = ShiftConfig {
            threshold: 32,
            direction: ShiftDirection::Right,
            auto_fill: true,
        };
        cfg.fifo_join = FifoJoin::TxOnly;
        sm.set_config(&cfg);
        sm.set_pin_dirs(Direction::Out, &pins);
        sm.set_pin_dirs(Direction::In, &[&trigger]);

        defmt::info!("sequencer: program loaded at {=u8}", loaded.origin);
        Self {
            sm,
            irq_flags,
            dma,
            transfer: None,
            origin: loaded.origin,
            outputs,
        }
    }
}

impl PulseSequencer for RpSequencer<'_> {
    fn arm(&mut self, words: &[u32], hardware_start: bool) -> Result<(), SequencerError> {
        if u32::try_from(words.len()).is_err() {
            return Err(SequencerError::ProgramTooLong);
        }
        self.stop();
        self.irq_flags.clear(COMPLETE_IRQ);
        self.sm.restart();
        // SAFETY: the state machine is disabled and `origin` is the first
        // instruction of the loaded program.
        unsafe { self.sm.exec_jmp(self.origin) };
        self.sm.tx().push(u32::from(hardware_start));

        // SAFETY: the caller keeps `words` alive and unmodified until `stop`,
        // which drops (aborts) this transfer. DMA_CH0 is owned by this
        // sequencer, so no other transfer uses the channel.
        let transfer = unsafe {
            dma::write(
                self.dma.clone_unchecked(),
                core::ptr::from_ref(words),
                pac::PIO0.txf(0).as_ptr(),
                PIO0_TX0_DREQ,
            )
        };
        self.transfer = Some(transfer);
        self.sm.set_enable(true);
        Ok(())
    }

    fn stop(&mut self) {
        // Dropping the transfer aborts the channel.
        self.transfer = None;
        self.sm.set_enable(false);
        self.sm.clear_fifos();
    }

    fn is_complete(&self) -> bool {
        self.irq_flags.check(COMPLETE_IRQ)
    }

    fn clear_complete(&mut self) {
        self.irq_flags.clear(COMPLETE_IRQ);
    }

    fn position(&self) -> u8 {
        pac::PIO0.sm(0).addr().read().addr().wrapping_sub(self.origin)
    }

    fn drive_outputs(&mut self, word: u32) {
        for (bit, pin) in (0u32..).zip(self.outputs.iter()) {
            let level = if word.checked_shr(bit).unwrap_or(0) & 1 == 1 {
                Level::High
            } else {
                Level::Low
            };
            self.sm.set_pins(level, &[pin]);
        }
    }
}

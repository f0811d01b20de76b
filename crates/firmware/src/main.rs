//! Prawn Digital Output - Main Entry Point
//!
//! Hardware-only entry point for the Raspberry Pi Pico (RP2040).
//! Core 0 runs the protocol dispatcher; core 1 runs the execution controller.

#![no_std]
#![no_main]

use embassy_executor::{Executor, Spawner};
use embassy_rp::bind_interrupts;
use embassy_rp::gpio::{Level, Output};
use embassy_rp::multicore::{spawn_core1, Stack};
use embassy_rp::peripherals::{PIO0, UART0};
use embassy_rp::pio::{self, Pio};
use embassy_rp::uart::{self, BufferedUart};
use embassy_time::{Duration, Timer};
use platform::config::SERIAL_BUFFER_SIZE;
use platform::serial::IoTransport;
use static_cell::StaticCell;

use firmware::hardware::{enable_resuscitation, RpBoard, RpSequencer, HOST_BAUD, SHARED};
use firmware::{boot, Dispatcher, ExecutionController};

// Panic handler
use defmt_rtt as _;
use panic_probe as _;

bind_interrupts!(struct Irqs {
    UART0_IRQ => uart::BufferedInterruptHandler<UART0>;
    PIO0_IRQ_0 => pio::InterruptHandler<PIO0>;
});

/// Pause after a UART error before reading again.
const TRANSPORT_BACKOFF_MS: u64 = 5;

static CORE1_STACK: StaticCell<Stack<4096>> = StaticCell::new();
static CORE1_EXECUTOR: StaticCell<Executor> = StaticCell::new();
static UART_TX_BUF: StaticCell<[u8; SERIAL_BUFFER_SIZE]> = StaticCell::new();
static UART_RX_BUF: StaticCell<[u8; SERIAL_BUFFER_SIZE]> = StaticCell::new();

#[embassy_executor::task]
async fn controller_task(sequencer: RpSequencer<'static>) {
    let mut controller = ExecutionController::new(&SHARED, sequencer);
    defmt::info!("core1: execution controller ready");
    controller.run().await
}

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    defmt::info!(
        "{=str} v{=str}",
        platform::config::APP_NAME,
        platform::config::FIRMWARE_VERSION
    );
    let p = embassy_rp::init(boot::build_embassy_config());

    // Host link: UART0, GP16 TX / GP17 RX
    let mut uart_config = uart::Config::default();
    uart_config.baudrate = HOST_BAUD;
    let uart = BufferedUart::new(
        p.UART0,
        Irqs,
        p.PIN_16,
        p.PIN_17,
        UART_TX_BUF.init([0; SERIAL_BUFFER_SIZE]),
        UART_RX_BUF.init([0; SERIAL_BUFFER_SIZE]),
        uart_config,
    );
    let mut transport = IoTransport::new(uart);
    let mut board = RpBoard::new(Output::new(p.PIN_25, Level::Low));

    // Steps 2-4: default clock, resus, banner
    if let Err(e) = boot::announce(&SHARED, &mut transport, &mut board, enable_resuscitation).await {
        defmt::warn!("boot: banner not sent: {}", defmt::Debug2Format(&e));
    }

    // Sequencer: PIO0 SM0, outputs GP0-GP15, trigger GP22, DMA CH0
    let Pio {
        mut common,
        irq_flags,
        sm0,
        ..
    } = Pio::new(p.PIO0, Irqs);
    let outputs = [
        common.make_pio_pin(p.PIN_0),
        common.make_pio_pin(p.PIN_1),
        common.make_pio_pin(p.PIN_2),
        common.make_pio_pin(p.PIN_3),
        common.make_pio_pin(p.PIN_4),
        common.make_pio_pin(p.PIN_5),
        common.make_pio_pin(p.PIN_6),
        common.make_pio_pin(p.PIN_7),
        common.make_pio_pin(p.PIN_8),
        common.make_pio_pin(p.PIN_9),
        common.make_pio_pin(p.PIN_10),
        common.make_pio_pin(p.PIN_11),
        common.make_pio_pin(p.PIN_12),
        common.make_pio_pin(p.PIN_13),
        common.make_pio_pin(p.PIN_14),
        common.make_pio_pin(p.PIN_15),
    ];
    let trigger = common.make_pio_pin(p.PIN_22);
    let sequencer = RpSequencer::new(&mut common, sm0, irq_flags, p.DMA_CH0, outputs, trigger);

    // Step 5: core 1 owns the sequencer
    spawn_core1(p.CORE1, CORE1_STACK.init(Stack::new()), move || {
        let executor = CORE1_EXECUTOR.init(Executor::new());
        executor.run(|spawner| spawner.must_spawn(controller_task(sequencer)))
    });

    // Step 6: dispatcher loop
    let mut dispatcher = Dispatcher::new(&SHARED, transport, board);
    defmt::info!("core0: dispatcher ready");
    loop {
        if let Err(e) = dispatcher.process_next().await {
            defmt::warn!("dispatcher: transport error: {}", defmt::Debug2Format(&e));
            // Line errors (break, framing) come in bursts.
            Timer::after(Duration::from_millis(TRANSPORT_BACKOFF_MS)).await;
        }
    }
}

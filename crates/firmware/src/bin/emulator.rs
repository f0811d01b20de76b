//! Prawn Digital Output - Desktop Emulator
//!
//! Runs the protocol engine and execution controller on one thread, with the
//! host link on stdin/stdout and logs on stderr. Exits when stdin closes.
//!
//! ```bash
//! printf 'cls\nset 0 1 100\nset 1 0 0\nset 2 0 0\nrun\nsts\n' \
//!     | RUST_LOG=firmware=debug cargo run --features emulator --bin emulator
//! ```

use embassy_futures::select::{select, Either};
use platform::serial::{IoTransport, IoTransportError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use firmware::emulator::{EmulatedBoard, EmulatedSequencer, StdioPort, SHARED};
use firmware::{boot, Dispatcher, ExecutionController};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "firmware=info,emulator=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!(
        "{} v{} (emulator)",
        platform::config::APP_NAME,
        platform::config::FIRMWARE_VERSION
    );

    let mut transport = IoTransport::new(StdioPort::new());
    let mut board = EmulatedBoard::new();
    let resus = || tracing::debug!("boot: no resus block in the emulator");
    if let Err(e) = boot::announce(&SHARED, &mut transport, &mut board, resus).await {
        tracing::error!("boot: banner not sent: {e}");
        return;
    }

    let mut controller = ExecutionController::new(&SHARED, EmulatedSequencer::new());
    let mut dispatcher = Dispatcher::new(&SHARED, transport, board);

    let host = async {
        loop {
            match dispatcher.process_next().await {
                Ok(()) => {}
                Err(IoTransportError::Eof) => break,
                Err(e) => tracing::warn!("dispatcher: transport error: {e}"),
            }
        }
    };

    match select(controller.run(), host).await {
        Either::First(never) => match never {},
        Either::Second(()) => tracing::info!("stdin closed, exiting"),
    }
}

//! UART transport to the co-processor.
//!
//! Implements [`Transport`](crate::rpc::transport::Transport) over an
//! ESP-IDF UART driver. `open` applies the requested baud rate and splits
//! the driver into its RX and TX halves; reads never block.

use esp_idf_hal::delay::NON_BLOCK;
use esp_idf_hal::uart::{UartDriver, UartRxDriver, UartTxDriver};
use esp_idf_hal::units::Hertz;
use log::{info, warn};

use crate::error::TransportError;
use crate::rpc::transport::{Transport, TransportRx, TransportTx};

/// Ticks a flush may wait for the TX FIFO to drain.
const FLUSH_TIMEOUT_TICKS: u32 = 100;

/// Unopened UART link.
pub struct UartTransport {
    driver: UartDriver<'static>,
}

impl UartTransport {
    pub fn new(driver: UartDriver<'static>) -> Self {
        Self { driver }
    }
}

impl Transport for UartTransport {
    fn open(
        self: Box<Self>,
        baud_rate: u32,
    ) -> Result<(Box<dyn TransportRx>, Box<dyn TransportTx>), TransportError> {
        self.driver
            .change_baudrate(Hertz(baud_rate))
            .map_err(|e| {
                warn!("UART: baud change to {} failed: {}", baud_rate, e);
                TransportError::OpenFailed
            })?;
        let (tx, rx) = self.driver.into_split();
        info!("UART: open at {} baud", baud_rate);
        Ok((Box::new(UartRx { rx }), Box::new(UartTx { tx })))
    }
}

struct UartRx {
    rx: UartRxDriver<'static>,
}

impl TransportRx for UartRx {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.rx
            .read(buf, NON_BLOCK)
            .map_err(|_| TransportError::ReadFailed)
    }
}

struct UartTx {
    tx: UartTxDriver<'static>,
}

impl TransportTx for UartTx {
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        self.tx.write(data).map_err(|_| TransportError::WriteFailed)
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        self.tx
            .wait_done(FLUSH_TIMEOUT_TICKS)
            .map_err(|_| TransportError::WriteFailed)
    }
}

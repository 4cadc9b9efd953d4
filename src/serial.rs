//! 16550 UART log sink, the default console transport on hardware.

use core::fmt::Write;

use spin::Mutex;
use uart_16550::SerialPort;

use crate::logger::{LogLevel, LogSink};

const COM1: u16 = 0x3F8;

struct SerialPortWrapper {
    port: Option<SerialPort>,
}

impl SerialPortWrapper {
    const fn new() -> Self {
        Self { port: None }
    }

    fn ensure_init(&mut self) {
        if self.port.is_none() {
            let mut port = unsafe { SerialPort::new(COM1) };
            port.init();
            self.port = Some(port);
        }
    }
}

static SERIAL1: Mutex<SerialPortWrapper> = Mutex::new(SerialPortWrapper::new());

pub fn init() {
    SERIAL1.lock().ensure_init();
}

/// Writes each log line to COM1. Register with `logger::set_sink(&SERIAL_SINK)`.
pub struct SerialSink;

pub static SERIAL_SINK: SerialSink = SerialSink;

impl LogSink for SerialSink {
    fn write_line(&self, _level: LogLevel, line: &str) {
        let mut serial = SERIAL1.lock();
        serial.ensure_init();
        if let Some(ref mut port) = serial.port {
            let _ = port.write_str(line);
            let _ = port.write_str("\n");
        }
    }
}

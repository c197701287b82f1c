//! Driver de porta serial (UART 16550).
//!
//! Saída de diagnóstico do kernel. Todos os macros de log
//! (`kinfo!`, `kerror!`, ...) terminam aqui.

use crate::arch::x86_64::ports::{inb, outb};
use spin::Mutex;

/// Porta COM1
const COM1_PORT: u16 = 0x3F8;

/// Estado da serial
static SERIAL: Mutex<SerialPort> = Mutex::new(SerialPort::new(COM1_PORT));

struct SerialPort {
    port: u16,
    initialized: bool,
}

impl SerialPort {
    const fn new(port: u16) -> Self {
        Self {
            port,
            initialized: false,
        }
    }

    fn init(&mut self) {
        if self.initialized {
            return;
        }

        // Desabilitar interrupções da UART
        outb(self.port + 1, 0x00);
        // Habilitar DLAB (set baud rate)
        outb(self.port + 3, 0x80);
        // Divisor low byte (115200 baud)
        outb(self.port, 0x03);
        // Divisor high byte
        outb(self.port + 1, 0x00);
        // 8 bits, no parity, 1 stop bit
        outb(self.port + 3, 0x03);
        // Enable FIFO
        outb(self.port + 2, 0xC7);
        // RTS/DSR set
        outb(self.port + 4, 0x0B);

        self.initialized = true;
    }

    fn is_transmit_empty(&self) -> bool {
        (inb(self.port + 5) & 0x20) != 0
    }

    fn write_byte(&self, byte: u8) {
        while !self.is_transmit_empty() {
            core::hint::spin_loop();
        }
        outb(self.port, byte);
    }
}

/// Inicializa a serial (idempotente).
pub fn init() {
    SERIAL.lock().init();
}

/// Escreve string literal.
pub fn emit_str(s: &str) {
    let serial = SERIAL.lock();
    for byte in s.bytes() {
        serial.write_byte(byte);
    }
}

/// Escreve valor em hexadecimal fixo (16 dígitos, prefixo 0x).
pub fn emit_hex(value: u64) {
    let serial = SERIAL.lock();
    serial.write_byte(b'0');
    serial.write_byte(b'x');
    for i in (0..16).rev() {
        let digit = ((value >> (i * 4)) & 0xF) as u8;
        let c = if digit < 10 {
            b'0' + digit
        } else {
            b'A' + digit - 10
        };
        serial.write_byte(c);
    }
}

/// Escreve newline (CRLF para terminais seriais).
pub fn emit_nl() {
    let serial = SERIAL.lock();
    serial.write_byte(b'\r');
    serial.write_byte(b'\n');
}

/// Adaptador `core::fmt::Write` para os poucos pontos que precisam de
/// formatação completa (panic handler). Não usar em early-boot.
pub struct Writer;

impl core::fmt::Write for Writer {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        emit_str(s);
        Ok(())
    }
}

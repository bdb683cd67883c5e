//! Static buffers backing the single secured session
//!
//! The TCP socket, TLS records and MQTT packets of the session outlive any
//! one function call, so their storage lives in main SRAM for the whole
//! program. Exactly one session exists and it drops its connection before
//! reconnecting, so the buffers are handed out to one owner at a time.
//!
//! **TLS read (18 KB)**: 16 KB maximum TLS 1.3 plaintext, record header,
//! AEAD tag and padding. **TLS write (16 KB)**: we control outgoing record
//! sizes. **TCP**: 4 KB each way. **MQTT**: 2 KB packet assembly area.

#![allow(unsafe_code)] // static mut buffers

use core::cell::RefCell;
use core::ptr::addr_of_mut;

use embassy_net::tcp::TcpSocket;
use embassy_net::Stack;
use rust_mqtt::buffer::BumpBuffer;

use crate::network::SharedSocket;

const TLS_READ_BUF_SIZE: usize = 18 * 1024;
const TLS_WRITE_BUF_SIZE: usize = 16 * 1024;
const TCP_BUF_SIZE: usize = 4096;
pub const MQTT_BUF_SIZE: usize = 2048;

static mut TLS_READ_BUF: [u8; TLS_READ_BUF_SIZE] = [0; TLS_READ_BUF_SIZE];
static mut TLS_WRITE_BUF: [u8; TLS_WRITE_BUF_SIZE] = [0; TLS_WRITE_BUF_SIZE];
static mut TCP_RX_BUF: [u8; TCP_BUF_SIZE] = [0; TCP_BUF_SIZE];
static mut TCP_TX_BUF: [u8; TCP_BUF_SIZE] = [0; TCP_BUF_SIZE];
static mut MQTT_BUF: [u8; MQTT_BUF_SIZE] = [0; MQTT_BUF_SIZE];
static mut MQTT_BUMP: Option<BumpBuffer<'static>> = None;
static mut TCP_SOCKET: Option<RefCell<TcpSocket<'static>>> = None;

/// Storage for one connection attempt
pub struct SessionBuffers {
    pub socket: SharedSocket,
    pub tls_read: &'static mut [u8],
    pub tls_write: &'static mut [u8],
    pub mqtt: &'static mut BumpBuffer<'static>,
}

/// Open a fresh socket and hand out every session buffer, resetting the MQTT
/// bump allocator
///
/// # Safety
///
/// Every reference returned by a previous call must be dead: the previous
/// connection (socket, TLS stream and MQTT client) has been dropped.
pub unsafe fn take(stack: Stack<'static>) -> SessionBuffers {
    // SAFETY: caller guarantees no earlier borrow is alive
    let slot = &mut *addr_of_mut!(TCP_SOCKET);
    // The old socket still borrows the TCP buffers; release it first
    *slot = None;
    let socket = slot.insert(RefCell::new(TcpSocket::new(
        stack,
        &mut *addr_of_mut!(TCP_RX_BUF),
        &mut *addr_of_mut!(TCP_TX_BUF),
    )));
    let mqtt_bytes: &'static mut [u8] = &mut *addr_of_mut!(MQTT_BUF);
    let bump = &mut *addr_of_mut!(MQTT_BUMP);
    SessionBuffers {
        socket,
        tls_read: &mut *addr_of_mut!(TLS_READ_BUF),
        tls_write: &mut *addr_of_mut!(TLS_WRITE_BUF),
        mqtt: bump.insert(BumpBuffer::new(mqtt_bytes)),
    }
}

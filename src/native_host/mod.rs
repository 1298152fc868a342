//! Native messaging host: lets the browser add-on talk to the store.
//!
//! Each frame is a 4-byte little-endian length followed by that many bytes
//! of JSON.

use crate::bridge::{encode, Outbound, SyncBridge};
use crate::constants::MAX_NATIVE_MESSAGE_SIZE;
use log::{debug, info, warn};
use std::io::{self, Read, Write};
use std::sync::mpsc::Receiver;
use std::sync::Arc;

/// Read one frame. `Ok(None)` on a clean end of input.
pub fn read_message<R: Read>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    // Chrome Native Messaging protocol specifies little-endian byte order
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = usize::try_from(u32::from_le_bytes(len_bytes))
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    if len > MAX_NATIVE_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Message too large: {len} bytes (max: {MAX_NATIVE_MESSAGE_SIZE} bytes)"),
        ));
    }

    let mut buffer = vec![0u8; len];
    reader.read_exact(&mut buffer)?;
    Ok(Some(buffer))
}

pub fn write_message<W: Write>(writer: &mut W, message: &[u8]) -> io::Result<()> {
    if message.len() > MAX_NATIVE_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Outgoing message too large: {} bytes", message.len()),
        ));
    }
    let len = u32::try_from(message.len()).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(message)?;
    writer.flush()
}

pub struct NativeHost {
    bridge: Arc<SyncBridge>,
    updates: Receiver<String>,
}

impl NativeHost {
    pub fn new(bridge: Arc<SyncBridge>) -> Self {
        let updates = bridge.listen();
        Self { bridge, updates }
    }

    /// Serve frames until the browser closes the pipe.
    pub fn run<R: Read, W: Write>(&self, reader: &mut R, writer: &mut W) -> io::Result<()> {
        info!("Native host started");
        while let Some(frame) = read_message(reader)? {
            if let Some(reply) = self.handle_frame(&frame) {
                write_message(writer, reply.as_bytes())?;
            }
            self.forward_updates(writer)?;
        }
        info!("Native host input closed");
        Ok(())
    }

    fn handle_frame(&self, frame: &[u8]) -> Option<String> {
        let raw = match std::str::from_utf8(frame) {
            Ok(raw) => raw,
            Err(e) => return Some(error_reply(&format!("Message is not UTF-8: {e}"))),
        };
        match self.bridge.handle_inbound(raw) {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Rejected companion message: {e}");
                Some(error_reply(&e.to_string()))
            }
        }
    }

    /// Send every snapshot broadcast since the last frame.
    fn forward_updates<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        while let Ok(update) = self.updates.try_recv() {
            debug!("Forwarding sync update to companion");
            write_message(writer, update.as_bytes())?;
        }
        Ok(())
    }
}

fn error_reply(message: &str) -> String {
    encode(&Outbound::Error { message })
        .unwrap_or_else(|_| String::from(r#"{"version":1,"type":"error"}"#))
}

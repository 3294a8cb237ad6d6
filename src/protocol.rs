use std::io::{Read, Write};
use std::net::TcpStream;

use thiserror::Error;

/// End-of-response sentinel (ASCII EOT). Only ever emitted by
/// [`send_eof`], so it cannot appear mid-stream.
pub const EOF_CHAR: u8 = 0x04;
/// Maximum buffered request size. A request without a null terminator
/// within this bound is a framing error.
pub const RDSH_COMM_BUFF_SZ: usize = 64 * 1024;

pub const DEF_PORT: u16 = 1234;
pub const DEF_SVR_INTFACE: &str = "0.0.0.0";
pub const DEF_CLI_CONNECT: &str = "127.0.0.1";

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("communications error: {0}")]
    Io(#[from] std::io::Error),
    #[error("command too long or missing null terminator")]
    RequestTooLong,
}

/// Read one `0x00`-terminated request, buffering partial reads in `buf`
/// across calls. `Ok(None)` means the peer disconnected. On overflow the
/// buffer is discarded and the connection remains usable.
pub fn read_request(
    stream: &mut TcpStream,
    buf: &mut Vec<u8>,
) -> Result<Option<String>, ProtocolError> {
    loop {
        if let Some(pos) = buf.iter().position(|b| *b == 0) {
            let req: Vec<u8> = buf.drain(..=pos).collect();
            return Ok(Some(String::from_utf8_lossy(&req[..pos]).into_owned()));
        }
        if buf.len() >= RDSH_COMM_BUFF_SZ {
            buf.clear();
            return Err(ProtocolError::RequestTooLong);
        }
        let mut chunk = [0u8; 4096];
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

pub fn send_eof(stream: &mut TcpStream) -> Result<(), ProtocolError> {
    stream.write_all(&[EOF_CHAR])?;
    stream.flush()?;
    Ok(())
}

/// Send a text payload followed by the end-of-response sentinel.
pub fn send_message(stream: &mut TcpStream, text: &str) -> Result<(), ProtocolError> {
    stream.write_all(text.as_bytes())?;
    send_eof(stream)
}

/// Copy response bytes to `out` until the sentinel. Returns `false` if the
/// server closed the connection before terminating the response.
pub fn read_response(stream: &mut TcpStream, out: &mut impl Write) -> Result<bool, ProtocolError> {
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            return Ok(false);
        }
        match chunk[..n].iter().position(|b| *b == EOF_CHAR) {
            Some(pos) => {
                out.write_all(&chunk[..pos])?;
                out.flush()?;
                return Ok(true);
            }
            None => out.write_all(&chunk[..n])?,
        }
    }
}

//! Framed RPC transport.
//!
//! One message per direction per frame:
//!
//! ```text
//! [ 24-byte nonce, only when the connection is encrypted ]
//! [ 4-byte big-endian length L ]
//! [ L bytes of payload ]
//! ```
//!
//! The payload is the gzip-compressed MessagePack envelope; on encrypted
//! connections the compressed bytes are sealed with the connection's shared
//! secret and the ciphertext replaces them. The receive path is a single
//! bounded read: the socket deadline set by the caller covers nonce, length
//! word and body.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::crypto::{SharedSecret, NONCE_LEN};
use crate::errors::*;
use crate::protocol::{Request, Response};

pub const SEND_TIMEOUT: Duration = Duration::from_secs(60);
/// Bound on the full RPC round trip observed by a client: a compile can
/// legitimately run for minutes on a loaded worker.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(600);
pub const MAX_FRAME_LEN: u32 = 1024 * 1024 * 1024; // 1GiB

fn io_chain(err: io::Error, op: &'static str, what: &'static str) -> Error {
    match err.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => ErrorKind::Timeout(op).into(),
        _ => Error::with_chain(err, what),
    }
}

fn gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .chain_err(|| "failed to compress frame")?;
    encoder.finish().chain_err(|| "failed to compress frame")
}

fn gunzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(data)
        .read_to_end(&mut out)
        .chain_err(|| "failed to decompress frame")?;
    Ok(out)
}

pub fn send_frame<W: Write>(
    conn: &mut W,
    secret: Option<&SharedSecret>,
    data: &[u8],
) -> Result<()> {
    let payload = match secret {
        Some(secret) => {
            let (nonce, sealed) = secret.seal(&gzip(data)?)?;
            conn.write_all(&nonce)
                .map_err(|e| io_chain(e, "send", "failed to write nonce"))?;
            sealed
        }
        None => gzip(data)?,
    };
    if payload.len() > MAX_FRAME_LEN as usize {
        bail!(ErrorKind::FrameTooLarge(payload.len()));
    }
    conn.write_u32::<BigEndian>(payload.len() as u32)
        .map_err(|e| io_chain(e, "send", "failed to write len"))?;
    conn.write_all(&payload)
        .map_err(|e| io_chain(e, "send", "failed to write msg"))?;
    Ok(())
}

/// Fill `buf` completely. `Ok(false)` means the peer closed the connection
/// cleanly before the first byte.
fn read_full_or_eof<R: Read>(conn: &mut R, buf: &mut [u8]) -> Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = conn
            .read(&mut buf[filled..])
            .map_err(|e| io_chain(e, "recv", "failed to read frame"))?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            bail!("connection closed mid-frame");
        }
        filled += n;
    }
    Ok(true)
}

/// Receive one frame. `Ok(None)` signals a clean EOF at a frame boundary.
pub fn recv_frame<R: Read>(
    conn: &mut R,
    secret: Option<&SharedSecret>,
) -> Result<Option<Vec<u8>>> {
    let mut nonce = [0u8; NONCE_LEN];
    if secret.is_some() && !read_full_or_eof(conn, &mut nonce)? {
        return Ok(None);
    }
    let mut size_buf = [0u8; 4];
    if !read_full_or_eof(conn, &mut size_buf)? {
        if secret.is_some() {
            bail!("connection closed mid-frame");
        }
        return Ok(None);
    }
    let mut size_reader = &size_buf[..];
    let size = size_reader
        .read_u32::<BigEndian>()
        .chain_err(|| "failed to read frame size")?;
    if size > MAX_FRAME_LEN {
        bail!(ErrorKind::FrameTooLarge(size as usize));
    }
    let mut payload = vec![0u8; size as usize];
    if !read_full_or_eof(conn, &mut payload)? {
        bail!("connection closed mid-frame");
    }
    let payload = match secret {
        Some(secret) => secret.open(&nonce, &payload)?,
        None => payload,
    };
    gunzip(&payload).map(Some)
}

/// Drive one full request/response exchange on an established connection.
pub fn call<Req, Payload>(
    conn: &mut TcpStream,
    secret: Option<&SharedSecret>,
    method: &str,
    args: &Req,
) -> Result<Payload>
where
    Req: Serialize,
    Payload: DeserializeOwned,
{
    let request = Request {
        name: method.to_string(),
        args: rmp_serde::to_vec_named(args).chain_err(|| "failed to encode req args")?,
    };
    let frame = rmp_serde::to_vec_named(&request).chain_err(|| "failed to encode req")?;

    conn.set_write_timeout(Some(SEND_TIMEOUT))
        .chain_err(|| "failed to set send deadline")?;
    send_frame(conn, secret, &frame)?;

    conn.set_read_timeout(Some(RECV_TIMEOUT))
        .chain_err(|| "failed to set recv deadline")?;
    let raw = match recv_frame(conn, secret)? {
        Some(raw) => raw,
        None => bail!("connection closed before response"),
    };
    let response: Response =
        rmp_serde::from_slice(&raw).chain_err(|| "failed to decode response")?;
    if !response.success {
        bail!(ErrorKind::Rpc(
            response
                .error_msg
                .unwrap_or_else(|| "unknown remote error".to_string())
        ));
    }
    rmp_serde::from_slice(&response.payload).chain_err(|| "failed to decode payload")
}

/// Encode the server's reply to one request. Failures collapse into
/// `{success: false, error_msg}` with the full cause chain flattened.
pub fn encode_response<P: Serialize>(result: &Result<P>) -> Result<Vec<u8>> {
    let response = match result {
        Ok(payload) => Response {
            success: true,
            error_msg: None,
            payload: rmp_serde::to_vec_named(payload)
                .chain_err(|| "failed to encode payload")?,
        },
        Err(err) => Response {
            success: false,
            error_msg: Some(error_string(err)),
            payload: Vec::new(),
        },
    };
    rmp_serde::to_vec_named(&response).chain_err(|| "failed to encode response")
}

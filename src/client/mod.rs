//! Client-side pipeline: configuration, preprocessing, remote selection and
//! the dispatcher driving one compiler invocation end to end.

use std::io::Write;
use std::net::TcpStream;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::crypto::{PublicKey, SharedSecret};
use crate::errors::*;
use crate::protocol::{StatusRequest, StatusResponse, METHOD_STATUS};
use crate::rpc;

pub mod config;
pub mod dispatch;
pub mod includes;
pub mod preprocess;
pub mod remote_preprocess;
pub mod select;

/// Capabilities a configured remote advertises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Power {
    Compile,
    Preprocess,
}

/// One configured worker host.
#[derive(Debug, Clone)]
pub struct Remote {
    pub address: String,
    pub public_key: Option<PublicKey>,
    pub powers: Vec<Power>,
}

impl Remote {
    pub fn has_power(&self, power: Power) -> bool {
        self.powers.contains(&power)
    }
}

/// An established connection to a remote, encrypted when the remote has a
/// configured public key.
pub struct RemoteConn {
    conn: TcpStream,
    secret: Option<SharedSecret>,
}

impl RemoteConn {
    pub fn call<Req, Payload>(&mut self, method: &str, args: &Req) -> Result<Payload>
    where
        Req: Serialize,
        Payload: DeserializeOwned,
    {
        rpc::call(&mut self.conn, self.secret.as_ref(), method, args)
    }
}

pub fn dial_remote(remote: &Remote) -> Result<RemoteConn> {
    let mut conn = TcpStream::connect(&remote.address)
        .chain_err(|| format!("failed to dial {}", remote.address))?;
    let secret = match remote.public_key {
        Some(ref server_key) => {
            let (public, secret) = SharedSecret::client_handshake(server_key);
            conn.set_write_timeout(Some(rpc::SEND_TIMEOUT))
                .chain_err(|| "failed to set send deadline")?;
            conn.write_all(public.as_bytes())
                .chain_err(|| "failed to send handshake key")?;
            Some(secret)
        }
        None => None,
    };
    Ok(RemoteConn { conn, secret })
}

/// One status probe, shared by the queue-depth selector and the status UI.
pub fn remote_status(remote: &Remote) -> Result<StatusResponse> {
    dial_remote(remote)?.call(METHOD_STATUS, &StatusRequest {})
}

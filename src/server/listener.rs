//! TCP acceptor and per-connection sessions.
//!
//! Each accepted connection gets its own thread running the session state
//! machine: optional handshake, then a strict request/response loop. The
//! accept loop itself runs on a helper thread so the main loop can select
//! between new connections and the shutdown signal.

use std::io::Read;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{unbounded, Receiver};

use crate::crypto::{KeyPair, PublicKey, SharedSecret, KEY_LEN};
use crate::errors::*;
use crate::protocol::{
    CompileRequest, PreprocessRequest, Request, StatusResponse, METHOD_COMPILE,
    METHOD_PREPROCESS, METHOD_STATUS,
};
use crate::rpc;
use crate::server::runner::Runner;

pub struct Listener {
    runner: Arc<Runner>,
    address: String,
    keypair: Option<KeyPair>,
    shutdown: Receiver<()>,
}

impl Listener {
    pub fn new(
        runner: Arc<Runner>,
        address: &str,
        keypair: Option<KeyPair>,
        shutdown: Receiver<()>,
    ) -> Listener {
        Listener {
            runner,
            address: address.to_string(),
            keypair,
            shutdown,
        }
    }

    pub fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.address)
            .chain_err(|| format!("failed to listen on {}", self.address))?;
        info!("listening on {}", self.address);
        self.run_on(listener)
    }

    /// Serve on an already-bound listener (tests bind to an ephemeral port).
    pub fn run_on(&self, listener: TcpListener) -> Result<()> {
        let (conn_tx, conn_rx) = unbounded();
        thread::spawn(move || loop {
            let conn = listener.accept().map(|(conn, _addr)| conn);
            if conn_tx.send(conn).is_err() {
                return;
            }
        });

        loop {
            crossbeam_channel::select! {
                recv(self.shutdown) -> _ => {
                    info!("shutdown signal received, no longer accepting connections");
                    return Ok(());
                }
                recv(conn_rx) -> msg => match msg {
                    Ok(Ok(conn)) => {
                        let runner = self.runner.clone();
                        let keypair = self.keypair.clone();
                        thread::spawn(move || serve(conn, runner, keypair));
                    }
                    Ok(Err(err)) => error!("failed to accept connection: {}", err),
                    Err(_) => return Ok(()),
                },
            }
        }
    }
}

fn serve(mut conn: TcpStream, runner: Arc<Runner>, keypair: Option<KeyPair>) {
    let peer = conn
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    debug!("serve: connection from {}", peer);
    match session(&mut conn, &runner, keypair.as_ref(), &peer) {
        Ok(()) => debug!("serve: {} disconnected", peer),
        Err(err) => debug!("serve: {} session ended: {}", peer, error_string(&err)),
    }
}

fn session(
    conn: &mut TcpStream,
    runner: &Runner,
    keypair: Option<&KeyPair>,
    peer: &str,
) -> Result<()> {
    let secret = match keypair {
        Some(keypair) => {
            let mut raw = [0u8; KEY_LEN];
            conn.read_exact(&mut raw)
                .chain_err(|| "failed to read client public key")?;
            Some(SharedSecret::precompute(
                &keypair.private,
                &PublicKey::from_bytes(raw),
            ))
        }
        None => None,
    };
    conn.set_write_timeout(Some(rpc::SEND_TIMEOUT))
        .chain_err(|| "failed to set send deadline")?;

    loop {
        let frame = match rpc::recv_frame(conn, secret.as_ref())? {
            Some(frame) => frame,
            None => return Ok(()),
        };
        let request: Request =
            rmp_serde::from_slice(&frame).chain_err(|| "invalid request envelope")?;
        trace!("session: {} request: {}", peer, request.name);

        let unknown_method = request.name != METHOD_COMPILE
            && request.name != METHOD_PREPROCESS
            && request.name != METHOD_STATUS;
        let reply = dispatch(runner, &request, peer)?;
        rpc::send_frame(conn, secret.as_ref(), &reply)?;
        if unknown_method {
            bail!(ErrorKind::UnknownMethod(request.name.clone()));
        }
    }
}

/// Route one request to the runner and encode the reply. Malformed args and
/// unknown methods produce an error reply rather than an I/O failure.
fn dispatch(runner: &Runner, request: &Request, peer: &str) -> Result<Vec<u8>> {
    match request.name.as_str() {
        METHOD_COMPILE => {
            let result = rmp_serde::from_slice::<CompileRequest>(&request.args)
                .chain_err(|| "failed to parse compile args")
                .and_then(|args| runner.compile(args, peer));
            rpc::encode_response(&result)
        }
        METHOD_PREPROCESS => {
            let result = rmp_serde::from_slice::<PreprocessRequest>(&request.args)
                .chain_err(|| "failed to parse preprocess args")
                .and_then(|args| runner.preprocess(args, peer));
            rpc::encode_response(&result)
        }
        METHOD_STATUS => rpc::encode_response(&Ok(runner.status())),
        other => {
            debug!("dispatch: unknown method: {}", other);
            rpc::encode_response::<StatusResponse>(&Err(
                ErrorKind::UnknownMethod(other.to_string()).into()
            ))
        }
    }
}

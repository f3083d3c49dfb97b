//! Local RPC endpoint: newline-delimited JSON over loopback TCP.

use crate::config::types::{Result, SupervisorError};
use crate::service::{ErrorCode, Request, Response, ServiceRegistry};
use crate::utils::cancel::CancelToken;
use log::{debug, info, warn};
use std::io::{self, BufRead, BufReader, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const ACCEPT_POLL: Duration = Duration::from_millis(100);

pub struct Endpoint {
    listener: TcpListener,
    services: Arc<ServiceRegistry>,
}

impl Endpoint {
    /// Bind on loopback. Port 0 picks a free port.
    pub fn bind(port: u16, services: Arc<ServiceRegistry>) -> Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port)).map_err(|e| {
            SupervisorError::Service(format!("cannot listen on 127.0.0.1:{}: {}", port, e))
        })?;
        listener.set_nonblocking(true)?;
        Ok(Self { listener, services })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `cancel` fires.
    pub fn serve(&self, cancel: &CancelToken) -> Result<()> {
        info!("endpoint listening on {}", self.local_addr()?);
        while !cancel.is_cancelled() {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    debug!("endpoint connection from {}", peer);
                    let services = Arc::clone(&self.services);
                    thread::Builder::new()
                        .name("endpoint-conn".to_string())
                        .spawn(move || {
                            if let Err(e) = handle_connection(stream, &services) {
                                debug!("endpoint connection from {} closed: {}", peer, e);
                            }
                        })?;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    cancel.wait_timeout(ACCEPT_POLL);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!("endpoint accept failed: {}", e);
                    cancel.wait_timeout(ACCEPT_POLL);
                }
            }
        }
        info!("endpoint stopped");
        Ok(())
    }
}

fn handle_connection(stream: TcpStream, services: &ServiceRegistry) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    let mut writer = stream.try_clone()?;
    let reader = BufReader::new(stream);

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let response = respond(services, &line);
        let encoded = serde_json::to_string(&response)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        writer.write_all(encoded.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
    }
    Ok(())
}

fn respond(services: &ServiceRegistry, line: &str) -> Response {
    let request: Request = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => return Response::error(ErrorCode::BadRequest, format!("invalid request: {}", e)),
    };

    match catch_unwind(AssertUnwindSafe(|| services.handle(&request))) {
        Ok(response) => response,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            log::error!("handler for {:?} panicked: {}", request, reason);
            Response::error(ErrorCode::Internal, format!("internal error: {}", reason))
        }
    }
}

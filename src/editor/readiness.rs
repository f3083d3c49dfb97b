//! Readiness probes.

use crate::config::editor::{ReadinessProbeConfig, ReadinessProbeType};
use crate::config::types::{Result, SupervisorError};
use crossbeam_channel::{select, Receiver};
use std::time::Duration;

const HTTP_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

pub trait ReadinessProbe: Send + Sync {
    /// Block until the editor is ready (true) or `stopped` fires or
    /// disconnects (false). No overall timeout.
    fn wait_ready(&self, stopped: &Receiver<()>) -> bool;
}

/// Ready as soon as the process has started.
pub struct ProcessProbe;

impl ReadinessProbe for ProcessProbe {
    fn wait_ready(&self, _stopped: &Receiver<()>) -> bool {
        true
    }
}

/// Ready once a GET answers 200.
pub struct HttpProbe {
    url: String,
    interval: Duration,
    client: reqwest::blocking::Client,
}

impl HttpProbe {
    pub fn new(url: String, interval: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(HTTP_PROBE_TIMEOUT)
            .build()
            .map_err(|e| SupervisorError::Probe(format!("cannot build probe client: {}", e)))?;
        Ok(Self {
            url,
            interval,
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn probe_once(&self) -> bool {
        match self.client.get(&self.url).send() {
            Ok(resp) => resp.status() == reqwest::StatusCode::OK,
            Err(e) => {
                log::debug!("readiness probe {} failed: {}", self.url, e);
                false
            }
        }
    }
}

impl ReadinessProbe for HttpProbe {
    fn wait_ready(&self, stopped: &Receiver<()>) -> bool {
        loop {
            if self.probe_once() {
                return true;
            }
            select! {
                recv(stopped) -> _ => return false,
                default(self.interval) => {}
            }
        }
    }
}

pub fn probe_for(config: &ReadinessProbeConfig, interval: Duration) -> Result<Box<dyn ReadinessProbe>> {
    match config.probe_type {
        ReadinessProbeType::Process => Ok(Box::new(ProcessProbe)),
        ReadinessProbeType::Http => Ok(Box::new(HttpProbe::new(config.http.url(), interval)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    /// Answers the first `failures` requests with 503, then 200.
    fn serve(failures: usize) -> (String, std::thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = std::thread::spawn(move || {
            for (i, stream) in listener.incoming().enumerate() {
                let mut stream = stream.unwrap();
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf);
                let status = if i < failures { "503 Service Unavailable" } else { "200 OK" };
                let _ = write!(stream, "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n", status);
                if i >= failures {
                    return;
                }
            }
        });
        (format!("http://{}/healthz", addr), handle)
    }

    #[test]
    fn process_probe_is_immediate() {
        let (_tx, rx) = crossbeam_channel::bounded::<()>(0);
        assert!(ProcessProbe.wait_ready(&rx));
    }

    #[test]
    fn http_probe_polls_until_ok() {
        let (url, server) = serve(2);
        let probe = HttpProbe::new(url, Duration::from_millis(20)).unwrap();
        let (_tx, rx) = crossbeam_channel::bounded::<()>(0);
        assert!(probe.wait_ready(&rx));
        server.join().unwrap();
    }

    #[test]
    fn http_probe_stops_when_process_stops() {
        let probe = HttpProbe::new("http://127.0.0.1:1/".to_string(), Duration::from_millis(20)).unwrap();
        let (tx, rx) = crossbeam_channel::bounded::<()>(0);
        drop(tx);
        assert!(!probe.wait_ready(&rx));
    }

    #[test]
    fn probe_selection_follows_config() {
        let mut config = ReadinessProbeConfig::default();
        assert!(probe_for(&config, Duration::from_millis(250)).is_ok());
        config.probe_type = ReadinessProbeType::Http;
        assert!(probe_for(&config, Duration::from_millis(250)).is_ok());
    }
}

/// Output pumping for supervised processes
/// Copies a child's stdout/stderr into the supervisor's own streams,
/// optionally through a rate-capped writer, while retaining the most recent
/// bytes for crash diagnostics.
use crate::utils::rate_limit::{Bucket, DropWriter};
use crate::utils::ring_buffer::RingBuffer;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Retained output shared by the stdout and stderr pumps.
pub type SharedRing = Arc<Mutex<RingBuffer>>;

const PUMP_CHUNK: usize = 8 * 1024;

/// Wrap `sink` in a rate-capped writer when a limit (kb/sec) is configured.
pub fn limited_sink(sink: Box<dyn Write + Send>, rate_limit_kb: u64) -> Box<dyn Write + Send> {
    if rate_limit_kb == 0 {
        return sink;
    }
    Box::new(DropWriter::new(sink, Arc::new(Bucket::for_log_rate(rate_limit_kb))))
}

/// Copy `reader` to `sink` until EOF on a dedicated thread.
pub fn pump<R>(
    name: &str,
    mut reader: R,
    mut sink: Box<dyn Write + Send>,
    retention: Option<SharedRing>,
) -> io::Result<JoinHandle<()>>
where
    R: Read + Send + 'static,
{
    thread::Builder::new()
        .name(format!("pump-{}", name))
        .spawn(move || {
            let mut buf = [0u8; PUMP_CHUNK];
            loop {
                let n = match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(_) => break,
                };
                if let Some(ring) = &retention {
                    if let Ok(mut ring) = ring.lock() {
                        ring.push(&buf[..n]);
                    }
                }
                // Sink failures only lose log output.
                let _ = sink.write_all(&buf[..n]);
                let _ = sink.flush();
            }
        })
}

/// Wait up to `settle` for the pumps to reach EOF. Pumps still running
/// afterwards (a descendant holds the pipe open) are left to finish on
/// their own. Returns whether all of them finished.
pub fn drain(pumps: Vec<JoinHandle<()>>, settle: Duration) -> bool {
    if pumps.is_empty() {
        return true;
    }
    let (tx, rx) = crossbeam_channel::bounded(1);
    let spawned = thread::Builder::new()
        .name("pump-drain".to_string())
        .spawn(move || {
            for pump in pumps {
                let _ = pump.join();
            }
            let _ = tx.send(());
        });
    spawned.is_ok() && rx.recv_timeout(settle).is_ok()
}

/// Retained output as lossy UTF-8.
pub fn tail_text(ring: &SharedRing) -> String {
    match ring.lock() {
        Ok(ring) => String::from_utf8_lossy(&ring.bytes()).into_owned(),
        Err(poisoned) => String::from_utf8_lossy(&poisoned.into_inner().bytes()).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct SharedVec(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedVec {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn pump_copies_and_retains_tail() {
        let out = SharedVec::default();
        let ring: SharedRing = Arc::new(Mutex::new(RingBuffer::new(5).unwrap()));
        let input = io::Cursor::new(b"hello world".to_vec());

        pump("test", input, Box::new(out.clone()), Some(ring.clone()))
            .unwrap()
            .join()
            .unwrap();

        assert_eq!(out.0.lock().unwrap().as_slice(), b"hello world");
        assert_eq!(tail_text(&ring), "world");
    }

    #[test]
    fn drain_gives_up_on_open_pipes() {
        let finished = pump("done", io::Cursor::new(b"x".to_vec()), Box::new(io::sink()), None).unwrap();
        assert!(drain(vec![finished], Duration::from_secs(5)));

        // A reader that never reaches EOF.
        let (_keep_open, rx) = crossbeam_channel::unbounded::<u8>();
        struct Blocked(crossbeam_channel::Receiver<u8>);
        impl Read for Blocked {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                let _ = self.0.recv();
                Ok(0)
            }
        }
        let stuck = pump("stuck", Blocked(rx), Box::new(io::sink()), None).unwrap();
        let start = std::time::Instant::now();
        assert!(!drain(vec![stuck], Duration::from_millis(100)));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn limited_sink_caps_output() {
        let out = SharedVec::default();
        let mut sink = limited_sink(Box::new(out.clone()), 1);
        let big = vec![b'x'; 10 * 1024];
        sink.write_all(&big).unwrap();
        // 1 kb/sec bursts three seconds worth.
        assert_eq!(out.0.lock().unwrap().len(), 3 * 1024);
    }

    #[test]
    fn zero_limit_is_passthrough() {
        let out = SharedVec::default();
        let mut sink = limited_sink(Box::new(out.clone()), 0);
        sink.write_all(&[b'y'; 4096]).unwrap();
        assert_eq!(out.0.lock().unwrap().len(), 4096);
    }
}

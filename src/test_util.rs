//! Shared test bridges: a scripted mock and a real socket-backed one.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::bridge::{SocketBridge, WriteResult};
use crate::error::Result;

/// Poll `cond` until it holds or `deadline` passes.
pub(crate) fn wait_until(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

/// A bridge whose write results are scripted, for scheduler tests.
///
/// Unscripted drains fall back to a settable default
/// (`NothingToDo`), and unscripted confirms clear the queued flag and
/// succeed. The gate lets a test park a drainer thread inside
/// `write_queue`.
pub(crate) struct MockBridge {
    queued: AtomicI32,
    script: Mutex<VecDeque<WriteResult>>,
    confirm_script: Mutex<VecDeque<bool>>,
    default_result: Mutex<WriteResult>,
    write_delay: Mutex<Duration>,
    gate_open: Mutex<bool>,
    gate_signal: Condvar,
    data_available: AtomicBool,
    heartbeat_fails: AtomicBool,
    pub write_calls: AtomicUsize,
    pub confirm_calls: AtomicUsize,
    pub read_calls: AtomicUsize,
    pub error_calls: AtomicUsize,
    pub heartbeat_calls: AtomicUsize,
    pub stale_calls: AtomicUsize,
}

impl MockBridge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            queued: AtomicI32::new(0),
            script: Mutex::new(VecDeque::new()),
            confirm_script: Mutex::new(VecDeque::new()),
            default_result: Mutex::new(WriteResult::NothingToDo),
            write_delay: Mutex::new(Duration::ZERO),
            gate_open: Mutex::new(true),
            gate_signal: Condvar::new(),
            data_available: AtomicBool::new(false),
            heartbeat_fails: AtomicBool::new(false),
            write_calls: AtomicUsize::new(0),
            confirm_calls: AtomicUsize::new(0),
            read_calls: AtomicUsize::new(0),
            error_calls: AtomicUsize::new(0),
            heartbeat_calls: AtomicUsize::new(0),
            stale_calls: AtomicUsize::new(0),
        })
    }

    pub fn script_writes(&self, results: &[WriteResult]) {
        self.script.lock().unwrap().extend(results.iter().copied());
    }

    pub fn script_confirms(&self, outcomes: &[bool]) {
        self.confirm_script
            .lock()
            .unwrap()
            .extend(outcomes.iter().copied());
    }

    pub fn set_default_result(&self, result: WriteResult) {
        *self.default_result.lock().unwrap() = result;
    }

    pub fn set_write_delay(&self, delay: Duration) {
        *self.write_delay.lock().unwrap() = delay;
    }

    pub fn set_data_available(&self, available: bool) {
        self.data_available.store(available, Ordering::SeqCst);
    }

    pub fn fail_heartbeats(&self) {
        self.heartbeat_fails.store(true, Ordering::SeqCst);
    }

    pub fn close_gate(&self) {
        *self.gate_open.lock().unwrap() = false;
    }

    pub fn open_gate(&self) {
        *self.gate_open.lock().unwrap() = true;
        self.gate_signal.notify_all();
    }
}

impl SocketBridge for MockBridge {
    fn connected(&self, _stream: TcpStream) -> Result<bool> {
        Ok(true)
    }

    fn read(&self) -> Result<()> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn error(&self) {
        self.error_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn on_heartbeat(&self) -> Result<()> {
        self.heartbeat_calls.fetch_add(1, Ordering::SeqCst);
        if self.heartbeat_fails.load(Ordering::SeqCst) {
            return Err(std::io::Error::new(std::io::ErrorKind::Other, "scripted fault").into());
        }
        Ok(())
    }

    fn check_for_stale_connection(&self) -> Result<()> {
        self.stale_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_data_available(&self) -> bool {
        self.data_available.load(Ordering::SeqCst)
    }

    fn write_queue(&self, _budget: Option<Duration>) -> WriteResult {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut open = self.gate_open.lock().unwrap();
            while !*open {
                open = self.gate_signal.wait(open).unwrap();
            }
        }
        let delay = *self.write_delay.lock().unwrap();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if let Some(result) = self.script.lock().unwrap().pop_front() {
            return result;
        }
        *self.default_result.lock().unwrap()
    }

    fn confirm_remove_from_write_queue(&self) -> bool {
        self.confirm_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(outcome) = self.confirm_script.lock().unwrap().pop_front() {
            if outcome {
                self.queued.store(0, Ordering::Release);
            }
            return outcome;
        }
        self.queued.store(0, Ordering::Release);
        true
    }

    fn queued(&self) -> &AtomicI32 {
        &self.queued
    }
}

/// A bridge over a real socket: an outbound queue of payloads, greedy
/// reads into an inbound buffer, and the full confirm-remove
/// handshake.
pub(crate) struct StreamBridge {
    queued: AtomicI32,
    accept: bool,
    stream: Mutex<Option<TcpStream>>,
    outbound: Mutex<VecDeque<Bytes>>,
    inbound: Mutex<Vec<u8>>,
    writing: Mutex<()>,
    pub connected_calls: AtomicUsize,
    pub error_calls: AtomicUsize,
    pub heartbeat_calls: AtomicUsize,
}

impl StreamBridge {
    pub fn new() -> Arc<Self> {
        Self::with_accept(true)
    }

    /// A bridge that declines its connection.
    pub fn declining() -> Arc<Self> {
        Self::with_accept(false)
    }

    fn with_accept(accept: bool) -> Arc<Self> {
        Arc::new(Self {
            queued: AtomicI32::new(0),
            accept,
            stream: Mutex::new(None),
            outbound: Mutex::new(VecDeque::new()),
            inbound: Mutex::new(Vec::new()),
            writing: Mutex::new(()),
            connected_calls: AtomicUsize::new(0),
            error_calls: AtomicUsize::new(0),
            heartbeat_calls: AtomicUsize::new(0),
        })
    }

    pub fn queue_write(&self, payload: &[u8]) {
        self.outbound
            .lock()
            .unwrap()
            .push_back(Bytes::copy_from_slice(payload));
    }

    pub fn received(&self) -> Vec<u8> {
        self.inbound.lock().unwrap().clone()
    }
}

impl SocketBridge for StreamBridge {
    fn connected(&self, stream: TcpStream) -> Result<bool> {
        self.connected_calls.fetch_add(1, Ordering::SeqCst);
        if !self.accept {
            return Ok(false);
        }
        *self.stream.lock().unwrap() = Some(stream);
        Ok(true)
    }

    fn read(&self) -> Result<()> {
        let guard = self.stream.lock().unwrap();
        let Some(stream) = guard.as_ref() else {
            return Ok(());
        };
        loop {
            let available = crate::token::available_bytes(stream)?;
            if available == 0 {
                return Ok(());
            }
            let mut buf = vec![0u8; available];
            let mut reader = stream;
            let n = reader.read(&mut buf)?;
            if n == 0 {
                return Ok(());
            }
            self.inbound.lock().unwrap().extend_from_slice(&buf[..n]);
        }
    }

    fn error(&self) {
        self.error_calls.fetch_add(1, Ordering::SeqCst);
        *self.stream.lock().unwrap() = None;
    }

    fn on_heartbeat(&self) -> Result<()> {
        self.heartbeat_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_data_available(&self) -> bool {
        let guard = self.stream.lock().unwrap();
        guard
            .as_ref()
            .and_then(|stream| crate::token::available_bytes(stream).ok())
            .map(|n| n > 0)
            .unwrap_or(false)
    }

    fn write_queue(&self, budget: Option<Duration>) -> WriteResult {
        let Ok(_writing) = self.writing.try_lock() else {
            return WriteResult::CompetingWriter;
        };
        let mut guard = self.stream.lock().unwrap();
        if guard.is_none() {
            return WriteResult::NoConnection;
        }
        let start = Instant::now();
        let mut wrote = false;
        loop {
            let next = self.outbound.lock().unwrap().pop_front();
            let Some(payload) = next else {
                return if wrote {
                    WriteResult::QueueEmptyAfterWrite
                } else {
                    WriteResult::NothingToDo
                };
            };
            let failed = {
                let mut writer = guard.as_ref().unwrap();
                writer.write_all(&payload).is_err()
            };
            if failed {
                *guard = None;
                return WriteResult::NoConnection;
            }
            wrote = true;
            if let Some(budget) = budget {
                if start.elapsed() >= budget {
                    return WriteResult::MoreWork;
                }
            }
        }
    }

    fn confirm_remove_from_write_queue(&self) -> bool {
        if self.outbound.lock().unwrap().is_empty() {
            self.queued.store(0, Ordering::Release);
            true
        } else {
            false
        }
    }

    fn queued(&self) -> &AtomicI32 {
        &self.queued
    }
}

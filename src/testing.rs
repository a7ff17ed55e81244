//! Test doubles: a scripted TCP lamp and a counting in-memory transport.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde_json::{Value, json};

use crate::errors::Error;
use crate::request::{CommandType, DeviceAddress, Request};
use crate::transport::Transport;

/// What the fake lamp does with one request.
pub enum Reply {
    /// Write these chunks, pausing between them, then close.
    Frames(Vec<Vec<u8>>),
    /// Write these bytes in one go, then close.
    Raw(Vec<u8>),
    /// Hold the connection open without answering.
    Silent(Duration),
}

impl Reply {
    /// `value` behind the lamp's 4-byte length header.
    pub fn prefixed(value: &Value) -> Self {
        Reply::Raw(frame(value))
    }

    /// Like [`Reply::prefixed`], but split into two writes after `split` bytes.
    pub fn fragmented(value: &Value, split: usize) -> Self {
        let mut first = frame(value);
        let second = first.split_off(split);
        Reply::Frames(vec![first, second])
    }
}

fn frame(value: &Value) -> Vec<u8> {
    let body = serde_json::to_vec(value).unwrap();
    let mut bytes = format!("{:04}", body.len() % 10_000).into_bytes();
    bytes.extend_from_slice(&body);
    bytes
}

/// A lamp on 127.0.0.1 that answers every connection through a script.
pub struct FakeDevice {
    port: u16,
    requests: Arc<Mutex<Vec<Value>>>,
    stop: Arc<AtomicBool>,
    accept_thread: Option<JoinHandle<()>>,
}

impl FakeDevice {
    pub fn start<F>(script: F) -> Self
    where
        F: Fn(&Value) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let port = listener.local_addr().unwrap().port();

        let requests = Arc::new(Mutex::new(Vec::new()));
        let stop = Arc::new(AtomicBool::new(false));
        let script = Arc::new(script);

        let accept_thread = {
            let requests = Arc::clone(&requests);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    match listener.accept() {
                        Ok((stream, _)) => {
                            let requests = Arc::clone(&requests);
                            let script = Arc::clone(&script);
                            thread::spawn(move || serve(stream, &requests, script.as_ref()));
                        }
                        Err(_) => thread::sleep(Duration::from_millis(5)),
                    }
                }
            })
        };

        FakeDevice {
            port,
            requests,
            stop,
            accept_thread: Some(accept_thread),
        }
    }

    pub fn address(&self, device_id: &str) -> DeviceAddress {
        DeviceAddress::new("127.0.0.1", self.port, device_id)
    }

    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for FakeDevice {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.accept_thread.take() {
            let _ = handle.join();
        }
    }
}

fn serve<F>(mut stream: TcpStream, requests: &Mutex<Vec<Value>>, script: &F)
where
    F: Fn(&Value) -> Reply,
{
    let _ = stream.set_nonblocking(false);
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));

    let mut received = Vec::new();
    let mut buf = [0u8; 1024];
    let request = loop {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => return,
            Ok(n) => received.extend_from_slice(&buf[..n]),
        }
        if let Ok(value) = serde_json::from_slice::<Value>(&received) {
            break value;
        }
    };
    requests.lock().unwrap().push(request.clone());

    match script(&request) {
        Reply::Raw(bytes) => {
            let _ = stream.write_all(&bytes);
        }
        Reply::Frames(frames) => {
            for (i, chunk) in frames.iter().enumerate() {
                if i > 0 {
                    thread::sleep(Duration::from_millis(100));
                }
                let _ = stream.write_all(chunk);
                let _ = stream.flush();
            }
        }
        Reply::Silent(hold) => thread::sleep(hold),
    }
}

/// An in-memory lamp that counts calls and can be slowed down or failed.
#[derive(Clone)]
pub struct StubTransport {
    pub state: Arc<Mutex<Value>>,
    pub state_queries: Arc<AtomicUsize>,
    pub executes: Arc<AtomicUsize>,
    pub info_queries: Arc<AtomicUsize>,
    pub delay: Duration,
    failures: Arc<Mutex<VecDeque<(Option<CommandType>, Error)>>>,
}

impl StubTransport {
    pub fn new(states: Value) -> Self {
        StubTransport {
            state: Arc::new(Mutex::new(states)),
            state_queries: Arc::new(AtomicUsize::new(0)),
            executes: Arc::new(AtomicUsize::new(0)),
            info_queries: Arc::new(AtomicUsize::new(0)),
            delay: Duration::ZERO,
            failures: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Make the next call fail with `err`.
    pub fn fail_next(&self, err: Error) {
        self.failures.lock().unwrap().push_back((None, err));
    }

    /// Make the next call of `command_type` fail with `err`.
    pub fn fail_next_on(&self, command_type: CommandType, err: Error) {
        self.failures.lock().unwrap().push_back((Some(command_type), err));
    }

    pub fn state_queries(&self) -> usize {
        self.state_queries.load(Ordering::SeqCst)
    }

    pub fn executes(&self) -> usize {
        self.executes.load(Ordering::SeqCst)
    }
}

impl Transport for StubTransport {
    async fn execute(&self, _address: &DeviceAddress, request: &Request) -> Result<Value, Error> {
        match request.command_type() {
            CommandType::QueryDeviceStates => self.state_queries.fetch_add(1, Ordering::SeqCst),
            CommandType::Execute => self.executes.fetch_add(1, Ordering::SeqCst),
            CommandType::QueryDeviceInfo => self.info_queries.fetch_add(1, Ordering::SeqCst),
        };

        if !self.delay.is_zero() {
            crate::runtime::sleep(self.delay).await;
        }
        {
            let mut failures = self.failures.lock().unwrap();
            let due = failures
                .iter()
                .position(|(only, _)| only.is_none_or(|t| t == request.command_type()));
            if let Some((_, err)) = due.and_then(|i| failures.remove(i)) {
                return Err(err);
            }
        }

        match request.command_type() {
            CommandType::QueryDeviceStates => Ok(json!({"states": self.state.lock().unwrap().clone()})),
            CommandType::QueryDeviceInfo => Ok(json!({"deviceModel": "dLight", "deviceId": request.device_id()})),
            CommandType::Execute => {
                let mut state = self.state.lock().unwrap();
                for command in request.commands().unwrap_or_default() {
                    let patch = serde_json::to_value(command).unwrap();
                    merge(&mut state, &patch);
                }
                Ok(json!({"status": "SUCCESS"}))
            }
        }
    }
}

fn merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                merge(target.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

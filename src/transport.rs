//! One request/response exchange with a lamp over TCP.

use std::future::Future;
use std::time::Duration;

use log::debug;
use serde::de::IgnoredAny;
use serde_json::Value;

use crate::config::{Framing, TransportOptions};
use crate::errors::{Error, ProtocolError};
use crate::request::{DeviceAddress, Request};
use crate::runtime::{self, AsyncTcpStream, Instant, TcpStream};

type Result<T> = std::result::Result<T, Error>;

/// Executes exactly one request against a lamp.
///
/// Implementations must not retry; the caller decides what a failure means.
pub trait Transport: Send + Sync + 'static {
    fn execute(
        &self,
        address: &DeviceAddress,
        request: &Request,
    ) -> impl Future<Output = Result<Value>> + Send;
}

/// The lamp's native transport: a fresh TCP connection per request.
///
/// The request body is written as plain JSON. The reply starts with a
/// fixed-size prefix that is skipped before the rest is parsed as JSON.
#[derive(Debug, Clone, Default)]
pub struct TcpTransport {
    options: TransportOptions,
}

impl TcpTransport {
    pub fn new(options: TransportOptions) -> Self {
        TcpTransport { options }
    }

    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    async fn exchange(&self, addr: &str, body: &[u8]) -> Result<Vec<u8>> {
        let timeout = self.options.timeout;

        let mut stream = runtime::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::timeout("connect", timeout))?
            .map_err(|e| Error::io("connect", e, timeout))?;

        runtime::timeout(timeout, stream.write_all(body))
            .await
            .map_err(|_| Error::timeout("send", timeout))?
            .map_err(|e| Error::io("send", e, timeout))?;

        self.read_reply(&mut stream).await
        // `stream` is dropped here on every path, closing the connection.
    }

    async fn read_reply(&self, stream: &mut TcpStream) -> Result<Vec<u8>> {
        let TransportOptions {
            timeout,
            framing,
            response_prefix_len: prefix,
            max_response_size: max,
        } = self.options;

        let started = Instant::now();
        let mut reply = Vec::new();
        let mut chunk = vec![0u8; max];

        while reply.len() < max {
            let remaining = remaining(timeout, started.elapsed())
                .ok_or_else(|| Error::timeout("receive", timeout))?;
            let room = max - reply.len();

            let n = runtime::timeout(remaining, stream.read(&mut chunk[..room]))
                .await
                .map_err(|_| Error::timeout("receive", timeout))?
                .map_err(|e| Error::io("receive", e, timeout))?;
            if n == 0 {
                break;
            }
            reply.extend_from_slice(&chunk[..n]);

            match framing {
                Framing::SingleRead => break,
                Framing::UntilComplete if is_complete(&reply, prefix) => break,
                Framing::UntilComplete | Framing::UntilClose => {}
            }
        }

        Ok(reply)
    }
}

impl Transport for TcpTransport {
    async fn execute(&self, address: &DeviceAddress, request: &Request) -> Result<Value> {
        let body = serde_json::to_vec(request).map_err(Error::JsonDump)?;
        let addr = address.to_string();
        debug!("-> {addr}: {}", String::from_utf8_lossy(&body));

        let reply = self.exchange(&addr, &body).await?;
        debug!("<- {addr}: {}", String::from_utf8_lossy(&reply));

        let capped = reply.len() >= self.options.max_response_size;
        decode_reply(reply, self.options.response_prefix_len).map_err(|e| match e {
            ProtocolError::Json(_) | ProtocolError::Utf8(_) if capped => {
                ProtocolError::TooLarge {
                    max: self.options.max_response_size,
                }
                .into()
            }
            other => other.into(),
        })
    }
}

/// Strip `prefix_len` bytes and parse the remainder as UTF-8 JSON.
///
/// # Examples
///
/// ```
/// use dlight_rs::decode_reply;
/// use serde_json::json;
///
/// let value = decode_reply(br#"0034{"states":{"on":true}}"#.to_vec(), 4).unwrap();
/// assert_eq!(value, json!({"states": {"on": true}}));
/// ```
pub fn decode_reply(
    mut reply: Vec<u8>,
    prefix_len: usize,
) -> std::result::Result<Value, ProtocolError> {
    if reply.len() < prefix_len {
        return Err(ProtocolError::Truncated {
            len: reply.len(),
            prefix: prefix_len,
        });
    }
    let text = String::from_utf8(reply.split_off(prefix_len))?;
    Ok(serde_json::from_str(&text)?)
}

/// Whether the bytes after the prefix hold a whole JSON value, or are broken
/// beyond what more bytes could fix.
fn is_complete(reply: &[u8], prefix_len: usize) -> bool {
    if reply.len() <= prefix_len {
        return false;
    }
    match serde_json::from_slice::<IgnoredAny>(&reply[prefix_len..]) {
        Ok(_) => true,
        Err(e) => !e.is_eof(),
    }
}

fn remaining(timeout: Duration, elapsed: Duration) -> Option<Duration> {
    timeout.checked_sub(elapsed).filter(|d| !d.is_zero())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDevice, Reply};
    use serde_json::json;
    use std::net::TcpListener;

    fn transport(framing: Framing) -> TcpTransport {
        TcpTransport::new(TransportOptions {
            timeout: Duration::from_millis(500),
            framing,
            ..TransportOptions::default()
        })
    }

    #[test]
    fn test_decode_skips_exactly_the_prefix() {
        let mut binary = vec![0u8, 0, 0, 0x47];
        binary.extend_from_slice(
            br#"{"states":{"on":true,"brightness":50,"color":{"temperature":4000}}}"#,
        );
        assert_eq!(
            decode_reply(binary, 4).unwrap(),
            json!({"states": {"on": true, "brightness": 50, "color": {"temperature": 4000}}})
        );
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            decode_reply(b"00".to_vec(), 4),
            Err(ProtocolError::Truncated { len: 2, prefix: 4 })
        ));
        assert!(matches!(
            decode_reply(b"0000{not json".to_vec(), 4),
            Err(ProtocolError::Json(_))
        ));
        assert!(matches!(
            decode_reply(vec![b'0', b'0', b'0', b'0', 0xff, 0xfe], 4),
            Err(ProtocolError::Utf8(_))
        ));
    }

    #[test]
    fn test_configurable_prefix_length() {
        assert_eq!(decode_reply(b"{}".to_vec(), 0).unwrap(), json!({}));
        assert_eq!(decode_reply(b"XY[1]".to_vec(), 2).unwrap(), json!([1]));
    }

    #[test]
    fn test_is_complete() {
        assert!(!is_complete(b"0000", 4));
        assert!(!is_complete(br#"0000{"states":{"on":"#, 4));
        assert!(is_complete(br#"0000{"states":{}}"#, 4));
        assert!(is_complete(b"0000}garbage", 4));
    }

    #[tokio::test]
    async fn test_execute_round_trip() {
        let device = FakeDevice::start(|_| {
            Reply::prefixed(&json!({"states": {"on": true, "brightness": 50, "color": {"temperature": 4000}}}))
        });
        let address = device.address("lamp-1");

        let value = transport(Framing::UntilComplete)
            .execute(&address, &Request::query_states(&address))
            .await
            .unwrap();

        assert_eq!(
            value,
            json!({"states": {"on": true, "brightness": 50, "color": {"temperature": 4000}}})
        );
        assert_eq!(
            device.requests(),
            vec![json!({"commandId": "2", "deviceId": "lamp-1", "commandType": "QUERY_DEVICE_STATES"})]
        );
    }

    #[tokio::test]
    async fn test_fragmented_reply_is_reassembled() {
        let device = FakeDevice::start(|_| {
            Reply::fragmented(&json!({"states": {"on": false, "brightness": 10}}), 9)
        });
        let address = device.address("lamp-1");

        for framing in [Framing::UntilComplete, Framing::UntilClose] {
            let value = transport(framing)
                .execute(&address, &Request::query_states(&address))
                .await
                .unwrap();
            assert_eq!(value["states"]["brightness"], 10);
        }
    }

    #[tokio::test]
    async fn test_single_read_does_not_reassemble() {
        let device = FakeDevice::start(|_| {
            Reply::fragmented(&json!({"states": {"on": false, "brightness": 10}}), 9)
        });
        let address = device.address("lamp-1");

        let err = transport(Framing::SingleRead)
            .execute(&address, &Request::query_states(&address))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_silent_device_times_out() {
        let device = FakeDevice::start(|_| Reply::Silent(Duration::from_secs(3)));
        let address = device.address("lamp-1");

        let started = std::time::Instant::now();
        let err = transport(Framing::UntilComplete)
            .execute(&address, &Request::query_states(&address))
            .await
            .unwrap_err();

        assert!(err.is_timeout(), "{err:?}");
        assert!(started.elapsed() < Duration::from_millis(750));
    }

    #[tokio::test]
    async fn test_refused_connection() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let address = DeviceAddress::new("127.0.0.1", port, "lamp-1");

        let err = transport(Framing::UntilComplete)
            .execute(&address, &Request::query_states(&address))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Connection { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_garbage_reply_is_protocol_error() {
        let device = FakeDevice::start(|_| Reply::Raw(b"0000this is not json".to_vec()));
        let address = device.address("lamp-1");

        let err = transport(Framing::UntilComplete)
            .execute(&address, &Request::query_states(&address))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::Json(_))), "{err:?}");
    }

    #[tokio::test]
    async fn test_oversized_reply() {
        let big = json!({"states": {"note": "x".repeat(200)}});
        let device = FakeDevice::start(move |_| Reply::prefixed(&big));
        let address = device.address("lamp-1");

        let transport = TcpTransport::new(TransportOptions {
            timeout: Duration::from_millis(500),
            max_response_size: 64,
            ..TransportOptions::default()
        });
        let err = transport
            .execute(&address, &Request::query_states(&address))
            .await
            .unwrap_err();
        assert!(
            matches!(err, Error::Protocol(ProtocolError::TooLarge { max: 64 })),
            "{err:?}"
        );
    }
}

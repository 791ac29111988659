//! Client control-line parsing.
//!
//! Control lines are `\r\n` terminated (a bare `\n` is tolerated). `PUB` is
//! followed by a payload of the announced size plus its own `\r\n`.

use serde::Deserialize;
use thiserror::Error;

use crate::server::auth::Credentials;

/// Longest control line accepted before the connection is dropped.
pub const MAX_CONTROL_LINE: usize = 1024;

pub const OK: &[u8] = b"+OK\r\n";
pub const PING: &[u8] = b"PING\r\n";
pub const PONG: &[u8] = b"PONG\r\n";

/// Options sent by the client in `CONNECT`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConnectOptions {
    pub verbose: bool,
    pub pedantic: bool,
    #[serde(flatten)]
    pub credentials: Credentials,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            verbose: true,
            pedantic: true,
            credentials: Credentials::default(),
        }
    }
}

/// A parsed client operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientOp {
    Connect(ConnectOptions),
    Ping,
    Pong,
    Sub {
        subject: String,
        queue: Option<String>,
        sid: String,
    },
    Unsub {
        sid: String,
        max: Option<u64>,
    },
    Pub {
        subject: String,
        reply: Option<String>,
        size: usize,
    },
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown protocol operation: {0}")]
    UnknownOp(String),

    #[error("invalid arguments for {0}")]
    InvalidArguments(&'static str),

    #[error("invalid CONNECT options: {0}")]
    InvalidConnect(#[from] serde_json::Error),

    #[error("control line is not valid UTF-8")]
    InvalidEncoding,

    #[error("control line exceeds the maximum length")]
    ControlLineTooLong,

    #[error("payload of {size} bytes exceeds maximum of {max}")]
    MaxPayload { size: usize, max: usize },

    #[error("payload is not terminated by CRLF")]
    UnterminatedPayload,
}

impl ProtocolError {
    /// Text sent to the client in the `-ERR` line.
    pub fn client_message(&self) -> &'static str {
        match self {
            ProtocolError::UnknownOp(_)
            | ProtocolError::InvalidEncoding
            | ProtocolError::UnterminatedPayload => {
                "Unknown Protocol Operation"
            }
            ProtocolError::InvalidArguments(_) => "Invalid Protocol Arguments",
            ProtocolError::InvalidConnect(_) => "Invalid Connect Options",
            ProtocolError::ControlLineTooLong => "Maximum Control Line Exceeded",
            ProtocolError::MaxPayload { .. } => "Maximum Payload Violation",
        }
    }
}

/// Render an `-ERR` line.
pub fn err_line(message: &str) -> Vec<u8> {
    format!("-ERR '{message}'\r\n").into_bytes()
}

/// Parse one control line (without its terminator).
pub fn parse_op(line: &str) -> Result<ClientOp, ProtocolError> {
    let line = line.trim();
    let (op, rest) = match line.split_once(char::is_whitespace) {
        Some((op, rest)) => (op, rest.trim()),
        None => (line, ""),
    };
    let args: Vec<&str> = rest.split_whitespace().collect();

    match op.to_ascii_uppercase().as_str() {
        "CONNECT" => {
            let options = if rest.is_empty() {
                ConnectOptions::default()
            } else {
                serde_json::from_str(rest)?
            };
            Ok(ClientOp::Connect(options))
        }
        "PING" => Ok(ClientOp::Ping),
        "PONG" => Ok(ClientOp::Pong),
        "SUB" => match args.as_slice() {
            [subject, sid] => Ok(ClientOp::Sub {
                subject: subject.to_string(),
                queue: None,
                sid: sid.to_string(),
            }),
            [subject, queue, sid] => Ok(ClientOp::Sub {
                subject: subject.to_string(),
                queue: Some(queue.to_string()),
                sid: sid.to_string(),
            }),
            _ => Err(ProtocolError::InvalidArguments("SUB")),
        },
        "UNSUB" => match args.as_slice() {
            [sid] => Ok(ClientOp::Unsub {
                sid: sid.to_string(),
                max: None,
            }),
            [sid, max] => {
                let max = max
                    .parse()
                    .map_err(|_| ProtocolError::InvalidArguments("UNSUB"))?;
                Ok(ClientOp::Unsub {
                    sid: sid.to_string(),
                    max: Some(max),
                })
            }
            _ => Err(ProtocolError::InvalidArguments("UNSUB")),
        },
        "PUB" => {
            let (subject, reply, size) = match args.as_slice() {
                [subject, size] => (subject, None, size),
                [subject, reply, size] => (subject, Some(reply.to_string()), size),
                _ => return Err(ProtocolError::InvalidArguments("PUB")),
            };
            let size = size
                .parse()
                .map_err(|_| ProtocolError::InvalidArguments("PUB"))?;
            Ok(ClientOp::Pub {
                subject: subject.to_string(),
                reply,
                size,
            })
        }
        _ => Err(ProtocolError::UnknownOp(op.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_with_token() {
        let op = parse_op(r#"CONNECT {"verbose":false,"auth_token":"s3cr3t"}"#).unwrap();
        let options = match op {
            ClientOp::Connect(options) => options,
            other => panic!("expected CONNECT, got {other:?}"),
        };
        assert!(!options.verbose);
        assert!(options.pedantic);
        assert_eq!(options.credentials.auth_token.as_deref(), Some("s3cr3t"));
    }

    #[test]
    fn connect_with_user_and_pass() {
        let op = parse_op(r#"connect {"user":"derek","pass":"foo"}"#).unwrap();
        let options = match op {
            ClientOp::Connect(options) => options,
            other => panic!("expected CONNECT, got {other:?}"),
        };
        assert_eq!(options.credentials.user.as_deref(), Some("derek"));
        assert_eq!(options.credentials.pass.as_deref(), Some("foo"));
    }

    #[test]
    fn bad_connect_json() {
        let err = parse_op("CONNECT {verbose:").unwrap_err();
        assert_eq!(err.client_message(), "Invalid Connect Options");
    }

    #[test]
    fn ping_pong_case_insensitive() {
        assert_eq!(parse_op("PING").unwrap(), ClientOp::Ping);
        assert_eq!(parse_op("ping").unwrap(), ClientOp::Ping);
        assert_eq!(parse_op("PONG ").unwrap(), ClientOp::Pong);
    }

    #[test]
    fn sub_with_and_without_queue() {
        assert_eq!(
            parse_op("SUB foo.bar 1").unwrap(),
            ClientOp::Sub {
                subject: "foo.bar".into(),
                queue: None,
                sid: "1".into()
            }
        );
        assert_eq!(
            parse_op("SUB foo workers 2").unwrap(),
            ClientOp::Sub {
                subject: "foo".into(),
                queue: Some("workers".into()),
                sid: "2".into()
            }
        );
        assert!(parse_op("SUB foo").is_err());
    }

    #[test]
    fn unsub_with_max() {
        assert_eq!(
            parse_op("UNSUB 1 5").unwrap(),
            ClientOp::Unsub {
                sid: "1".into(),
                max: Some(5)
            }
        );
        assert!(parse_op("UNSUB 1 many").is_err());
    }

    #[test]
    fn pub_with_reply() {
        assert_eq!(
            parse_op("PUB foo INBOX.1 11").unwrap(),
            ClientOp::Pub {
                subject: "foo".into(),
                reply: Some("INBOX.1".into()),
                size: 11
            }
        );
        assert!(matches!(
            parse_op("PUB foo x"),
            Err(ProtocolError::InvalidArguments("PUB"))
        ));
    }

    #[test]
    fn unknown_op() {
        let err = parse_op("HELO world").unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownOp(ref op) if op == "HELO"));
        assert_eq!(err_line(err.client_message()), b"-ERR 'Unknown Protocol Operation'\r\n");
    }

    #[test]
    fn unterminated_payload_is_a_parse_error() {
        assert_eq!(
            ProtocolError::UnterminatedPayload.client_message(),
            "Unknown Protocol Operation"
        );
    }
}

//! Async client for a SnapKV (or any RESP) server, plus the command-line
//! splitting used by `snapkv-cli`.

use crate::protocol::{ParseError, RespParser, RespValue};
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, trace};

/// Errors that can occur on the client side.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ParseError),

    #[error("Connection closed by server")]
    ConnectionClosed,

    #[error("Invalid argument(s): unbalanced quotes")]
    UnbalancedQuotes,
}

/// A single connection to the server.
///
/// Requests are written as RESP arrays of bulk strings; replies are parsed
/// with the same parser the server uses.
pub struct Client {
    stream: BufWriter<TcpStream>,
    buffer: BytesMut,
    parser: RespParser,
    addr: String,
}

impl Client {
    /// Connects to `host:port`.
    pub async fn connect(host: &str, port: u16) -> Result<Self, ClientError> {
        let addr = format!("{}:{}", host, port);
        let stream = TcpStream::connect(&addr).await?;
        stream.set_nodelay(true)?;
        debug!(addr = %addr, "Connected");

        Ok(Self {
            stream: BufWriter::new(stream),
            buffer: BytesMut::with_capacity(4096),
            parser: RespParser::new(),
            addr,
        })
    }

    /// The `host:port` this client is connected to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Sends one command and waits for its reply.
    ///
    /// Error replies from the server are returned as `Ok(RespValue::Error)`.
    pub async fn send<I, T>(&mut self, args: I) -> Result<RespValue, ClientError>
    where
        I: IntoIterator<Item = T>,
        T: Into<Bytes>,
    {
        let request = RespValue::command(args).serialize();
        trace!(bytes = request.len(), "Sending request");
        self.stream.write_all(&request).await?;
        self.stream.flush().await?;
        self.read_reply().await
    }

    /// Reads the next complete reply.
    pub async fn read_reply(&mut self) -> Result<RespValue, ClientError> {
        loop {
            if let Some((value, consumed)) = self.parser.parse(&self.buffer)? {
                let _ = self.buffer.split_to(consumed);
                return Ok(value);
            }

            if self.stream.get_mut().read_buf(&mut self.buffer).await? == 0 {
                return Err(ClientError::ConnectionClosed);
            }
        }
    }
}

/// Splits a line typed at the prompt into arguments.
///
/// Whitespace separates arguments. Double quotes group words and honour
/// backslash escapes (`\n`, `\r`, `\t`, `\"`, `\\`, `\xHH`); single quotes
/// group words literally (only `\'` is special). A closing quote must be
/// followed by whitespace or the end of the line.
pub fn split_command_line(line: &str) -> Result<Vec<String>, ClientError> {
    let mut args = Vec::new();
    let mut chars = line.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let Some(&first) = chars.peek() else {
            return Ok(args);
        };

        let mut current = String::new();
        match first {
            '"' => {
                chars.next();
                loop {
                    match chars.next().ok_or(ClientError::UnbalancedQuotes)? {
                        '"' => break,
                        '\\' => {
                            let escaped = chars.next().ok_or(ClientError::UnbalancedQuotes)?;
                            match escaped {
                                'n' => current.push('\n'),
                                'r' => current.push('\r'),
                                't' => current.push('\t'),
                                'x' => match hex_escape(&mut chars) {
                                    Some(c) => current.push(c),
                                    None => current.push('x'),
                                },
                                other => current.push(other),
                            }
                        }
                        c => current.push(c),
                    }
                }
                ensure_separated(&mut chars)?;
            }
            '\'' => {
                chars.next();
                loop {
                    match chars.next().ok_or(ClientError::UnbalancedQuotes)? {
                        '\'' => break,
                        '\\' if chars.peek() == Some(&'\'') => {
                            chars.next();
                            current.push('\'');
                        }
                        c => current.push(c),
                    }
                }
                ensure_separated(&mut chars)?;
            }
            _ => {
                while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                    current.push(c);
                }
            }
        }
        args.push(current);
    }
}

fn ensure_separated(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
) -> Result<(), ClientError> {
    match chars.peek() {
        Some(c) if !c.is_whitespace() => Err(ClientError::UnbalancedQuotes),
        _ => Ok(()),
    }
}

/// Consumes two hex digits after `\x`, if present.
fn hex_escape(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<char> {
    let mut lookahead = chars.clone();
    let hi = lookahead.next()?.to_digit(16)?;
    let lo = lookahead.next()?.to_digit(16)?;
    chars.next();
    chars.next();
    char::from_u32(hi * 16 + lo)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(line: &str) -> Vec<String> {
        split_command_line(line).unwrap()
    }

    #[test]
    fn test_split_plain_words() {
        assert_eq!(split("SET key value"), vec!["SET", "key", "value"]);
        assert_eq!(split("  GET   key  "), vec!["GET", "key"]);
        assert!(split("").is_empty());
        assert!(split("   \t ").is_empty());
    }

    #[test]
    fn test_split_quotes() {
        assert_eq!(
            split(r#"SET greeting "hello world""#),
            vec!["SET", "greeting", "hello world"]
        );
        assert_eq!(
            split("SET 'my key' 'two words'"),
            vec!["SET", "my key", "two words"]
        );
    }

    #[test]
    fn test_split_escapes() {
        assert_eq!(split(r#"SET k "a\"b""#), vec!["SET", "k", "a\"b"]);
        assert_eq!(split(r#"SET k "line\nbreak""#), vec!["SET", "k", "line\nbreak"]);
        assert_eq!(split(r#"SET k "\x41\x42""#), vec!["SET", "k", "AB"]);
        assert_eq!(split(r"SET k 'it\'s'"), vec!["SET", "k", "it's"]);
        assert_eq!(split(r#"SET k 'no \n escape'"#), vec!["SET", "k", r"no \n escape"]);
        assert_eq!(split(r#"SET k """#), vec!["SET", "k", ""]);
    }

    #[test]
    fn test_split_unbalanced_quotes() {
        assert!(matches!(
            split_command_line(r#"SET k "open"#),
            Err(ClientError::UnbalancedQuotes)
        ));
        assert!(matches!(
            split_command_line("SET k 'open"),
            Err(ClientError::UnbalancedQuotes)
        ));
        assert!(matches!(
            split_command_line(r#"SET k "a"b"#),
            Err(ClientError::UnbalancedQuotes)
        ));
    }

    #[tokio::test]
    async fn test_client_round_trip() {
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 64];
            let mut seen = 0;
            let request = b"*2\r\n$4\r\nECHO\r\n$2\r\nhi\r\n";
            while seen < request.len() {
                let n = socket.read(&mut buf[seen..]).await.unwrap();
                assert!(n > 0);
                seen += n;
            }
            assert_eq!(&buf[..seen], request);
            // Reply split in two writes.
            socket.write_all(b"$2\r\n").await.unwrap();
            socket.flush().await.unwrap();
            socket.write_all(b"hi\r\n").await.unwrap();
        });

        let mut client = Client::connect("127.0.0.1", port).await.unwrap();
        let reply = client.send(["ECHO", "hi"]).await.unwrap();
        assert_eq!(reply, RespValue::bulk_string(Bytes::from("hi")));

        assert!(matches!(
            client.read_reply().await,
            Err(ClientError::ConnectionClosed)
        ));
    }
}

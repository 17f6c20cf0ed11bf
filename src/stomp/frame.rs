use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Message,
    Receipt,
    Error,
    Disconnect,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Connected => "CONNECTED",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
            Command::Disconnect => "DISCONNECT",
        }
    }

    fn parse(line: &str) -> Result<Self, FrameError> {
        match line {
            "CONNECT" | "STOMP" => Ok(Command::Connect),
            "CONNECTED" => Ok(Command::Connected),
            "SEND" => Ok(Command::Send),
            "SUBSCRIBE" => Ok(Command::Subscribe),
            "UNSUBSCRIBE" => Ok(Command::Unsubscribe),
            "MESSAGE" => Ok(Command::Message),
            "RECEIPT" => Ok(Command::Receipt),
            "ERROR" => Ok(Command::Error),
            "DISCONNECT" => Ok(Command::Disconnect),
            other => Err(FrameError::UnknownCommand(other.to_string())),
        }
    }

    /// CONNECT and CONNECTED headers are sent verbatim
    fn escapes_headers(self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("header line without ':' : '{0}'")]
    MalformedHeader(String),

    #[error("invalid escape sequence in header '{0}'")]
    BadEscape(String),

    #[error("invalid content-length '{0}'")]
    BadContentLength(String),

    #[error("frame is missing its NUL terminator")]
    Unterminated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self { command, headers: Vec::new(), body: String::new() }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header; repeated headers keep the first occurrence.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn connect(host: &str, token: Option<&str>, heartbeat_out: Duration, heartbeat_in: Duration) -> Self {
        let mut frame = Frame::new(Command::Connect)
            .header("accept-version", "1.2,1.1,1.0")
            .header("host", host)
            .header(
                "heart-beat",
                format!("{},{}", heartbeat_out.as_millis(), heartbeat_in.as_millis()),
            );
        if let Some(token) = token {
            frame = frame.header("Authorization", format!("Bearer {}", token));
        }
        frame
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new(Command::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    pub fn send(destination: &str, body: impl Into<String>) -> Self {
        let body = body.into();
        Frame::new(Command::Send)
            .header("destination", destination)
            .header("content-type", "application/json")
            .header("content-length", body.len().to_string())
            .body(body)
    }

    pub fn disconnect() -> Self {
        Frame::new(Command::Disconnect)
    }

    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.body.len() + 64);
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if self.command.escapes_headers() {
                out.push_str(&escape(name));
                out.push(':');
                out.push_str(&escape(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Decode every frame in one transport message, skipping heart-beat EOLs.
    pub fn decode_all(mut input: &str) -> Result<Vec<Frame>, FrameError> {
        let mut frames = Vec::new();
        loop {
            input = input.trim_start_matches(['\r', '\n']);
            if input.is_empty() {
                return Ok(frames);
            }
            let (frame, rest) = Frame::decode_one(input)?;
            frames.push(frame);
            input = rest;
        }
    }

    fn decode_one(input: &str) -> Result<(Frame, &str), FrameError> {
        let (head, after_head) = split_head(input).ok_or(FrameError::Unterminated)?;
        let mut lines = head.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l));

        let command = Command::parse(lines.next().unwrap_or_default())?;
        let mut headers = Vec::new();
        for line in lines {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
            if command.escapes_headers() {
                headers.push((unescape(name)?, unescape(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let content_length = headers
            .iter()
            .find(|(k, _)| k == "content-length")
            .map(|(_, v)| v.trim().parse::<usize>().map_err(|_| FrameError::BadContentLength(v.clone())))
            .transpose()?;

        let (body, rest) = match content_length {
            Some(len) => {
                let body = after_head
                    .get(..len)
                    .ok_or(FrameError::Unterminated)?;
                let rest = after_head[len..]
                    .strip_prefix('\0')
                    .ok_or(FrameError::Unterminated)?;
                (body, rest)
            }
            None => {
                let end = after_head.find('\0').ok_or(FrameError::Unterminated)?;
                (&after_head[..end], &after_head[end + 1..])
            }
        };

        Ok((Frame { command, headers, body: body.to_string() }, rest))
    }
}

/// Split at the blank line ending the header block
fn split_head(input: &str) -> Option<(&str, &str)> {
    let lf = input.find("\n\n").map(|i| (i, 2));
    let crlf = input.find("\r\n\r\n").map(|i| (i, 4));
    let (at, len) = match (lf, crlf) {
        (Some(a), Some(b)) => if a.0 <= b.0 { a } else { b },
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => return None,
    };
    Some((&input[..at], &input[at + len..]))
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(raw: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(FrameError::BadEscape(raw.to_string())),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_connect_with_auth_and_heartbeat() {
        let frame = Frame::connect("api.inlyne.link", Some("tok"), Duration::from_secs(20), Duration::ZERO);
        assert_eq!(
            frame.encode(),
            "CONNECT\naccept-version:1.2,1.1,1.0\nhost:api.inlyne.link\nheart-beat:20000,0\nAuthorization:Bearer tok\n\n\0"
        );
    }

    #[test]
    fn send_carries_byte_length() {
        let frame = Frame::send("/app/edit/abcd1234", "{\"content\":\"é\"}");
        assert_eq!(frame.get("content-length"), Some("16"));
        let decoded = Frame::decode_all(&frame.encode()).unwrap();
        assert_eq!(decoded, vec![frame]);
    }

    #[test]
    fn decodes_message_without_content_length() {
        let raw = "MESSAGE\ndestination:/topic/docs/abcd1234\nsubscription:sub-0\nmessage-id:1\n\n{\"content\":\"<p>hi</p>\"}\0";
        let frames = Frame::decode_all(raw).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].command, Command::Message);
        assert_eq!(frames[0].get("destination"), Some("/topic/docs/abcd1234"));
        assert_eq!(frames[0].body, "{\"content\":\"<p>hi</p>\"}");
    }

    #[test]
    fn content_length_allows_nul_in_body() {
        let raw = "MESSAGE\ncontent-length:3\n\na\0b\0";
        let frames = Frame::decode_all(raw).unwrap();
        assert_eq!(frames[0].body, "a\0b");
    }

    #[test]
    fn splits_batched_frames_and_skips_heartbeats() {
        let raw = "\nRECEIPT\nreceipt-id:7\n\n\0\r\n\nERROR\nmessage:boom\n\nbad\0\n";
        let frames = Frame::decode_all(raw).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].command, Command::Receipt);
        assert_eq!(frames[1].get("message"), Some("boom"));
        assert_eq!(frames[1].body, "bad");
        assert!(Frame::decode_all("\n\n").unwrap().is_empty());
    }

    #[test]
    fn header_escaping_round_trips() {
        let frame = Frame::new(Command::Send).header("note", "a:b\\c\nd");
        let encoded = frame.encode();
        assert!(encoded.contains("note:a\\cb\\\\c\\nd\n"));
        assert_eq!(Frame::decode_all(&encoded).unwrap()[0].get("note"), Some("a:b\\c\nd"));
    }

    #[test]
    fn connected_headers_are_not_unescaped() {
        let raw = "CONNECTED\nversion:1.2\nserver:x\\y\n\n\0";
        let frames = Frame::decode_all(raw).unwrap();
        assert_eq!(frames[0].get("server"), Some("x\\y"));
    }

    #[test]
    fn reports_malformed_frames() {
        assert_eq!(
            Frame::decode_all("BOGUS\n\n\0"),
            Err(FrameError::UnknownCommand("BOGUS".into()))
        );
        assert!(matches!(Frame::decode_all("MESSAGE\nnocolon\n\n\0"), Err(FrameError::MalformedHeader(_))));
        assert_eq!(Frame::decode_all("MESSAGE\n\nbody"), Err(FrameError::Unterminated));
        assert!(matches!(
            Frame::decode_all("MESSAGE\ncontent-length:x\n\n\0"),
            Err(FrameError::BadContentLength(_))
        ));
        assert!(matches!(Frame::decode_all("SEND\nbad:\\q\n\n\0"), Err(FrameError::BadEscape(_))));
    }
}

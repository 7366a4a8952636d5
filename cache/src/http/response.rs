use super::CacheControl;

use std::io::{self, BufRead, Write};

use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName, HeaderValue};

/// The metadata stored next to a cached response body.
///
/// Serialized as newline-terminated UTF-8 lines: the request send time, the
/// response receive time (both epoch milliseconds), `1` or `0` for TLS, the
/// number of header lines, then one `Name: value` line per header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheResponse {
  pub sent_request_at_millis: i64,
  pub received_response_at_millis: i64,
  pub is_tls: bool,
  pub headers: HeaderMap,
}

impl CacheResponse {
  pub fn new(
    sent_request_at_millis: i64,
    received_response_at_millis: i64,
    is_tls: bool,
    headers: HeaderMap,
  ) -> Self {
    Self {
      sent_request_at_millis,
      received_response_at_millis,
      is_tls,
      headers,
    }
  }

  pub fn cache_control(&self) -> CacheControl {
    CacheControl::parse(&self.headers)
  }

  pub fn content_type(&self) -> Option<&str> {
    self.headers.get(CONTENT_TYPE)?.to_str().ok()
  }

  pub fn read_from(source: &mut impl BufRead) -> io::Result<Self> {
    let sent_request_at_millis = parse_line(&read_line(source)?)?;
    let received_response_at_millis = parse_line(&read_line(source)?)?;
    let is_tls = parse_line::<i64>(&read_line(source)?)? > 0;
    let header_count = parse_line::<usize>(&read_line(source)?)?;

    // The count comes from disk, so it only bounds the loop.
    let mut headers = HeaderMap::new();
    for _ in 0..header_count {
      let line = read_line(source)?;
      let (name, value) = line
        .split_once(':')
        .ok_or_else(|| invalid(format!("malformed header line: {line:?}")))?;
      let name = HeaderName::from_bytes(name.trim().as_bytes()).map_err(invalid)?;
      let value = HeaderValue::from_str(value.trim()).map_err(invalid)?;
      headers.append(name, value);
    }

    Ok(Self {
      sent_request_at_millis,
      received_response_at_millis,
      is_tls,
      headers,
    })
  }

  pub fn write_to(&self, sink: &mut impl Write) -> io::Result<()> {
    writeln!(sink, "{}", self.sent_request_at_millis)?;
    writeln!(sink, "{}", self.received_response_at_millis)?;
    writeln!(sink, "{}", u8::from(self.is_tls))?;
    writeln!(sink, "{}", self.headers.len())?;
    for (name, value) in &self.headers {
      sink.write_all(name.as_str().as_bytes())?;
      sink.write_all(b": ")?;
      sink.write_all(value.as_bytes())?;
      sink.write_all(b"\n")?;
    }
    Ok(())
  }
}

fn invalid(error: impl ToString) -> io::Error {
  io::Error::new(io::ErrorKind::InvalidData, error.to_string())
}

/// Reads one line, failing on end of input or a missing terminator.
fn read_line(source: &mut impl BufRead) -> io::Result<String> {
  let mut line = String::new();
  source.read_line(&mut line)?;
  match line.strip_suffix('\n') {
    Some(stripped) => Ok(stripped.strip_suffix('\r').unwrap_or(stripped).to_owned()),
    None => Err(io::Error::new(
      io::ErrorKind::UnexpectedEof,
      "cached response metadata ended early",
    )),
  }
}

fn parse_line<T: std::str::FromStr>(line: &str) -> io::Result<T> {
  line
    .trim()
    .parse()
    .map_err(|_| invalid(format!("expected a number, got {line:?}")))
}

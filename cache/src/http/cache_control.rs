use http::header::{CACHE_CONTROL, PRAGMA};
use http::HeaderMap;

/// Parsed `Cache-Control` directives of a request or response.
///
/// `Pragma: no-cache` is honored as `no-cache`. Unknown directives are
/// ignored. Negative ages read as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControl {
  pub no_cache: bool,
  pub no_store: bool,
  pub max_age_seconds: Option<u32>,
  pub s_max_age_seconds: Option<u32>,
  pub is_private: bool,
  pub is_public: bool,
  pub must_revalidate: bool,
  /// A bare `max-stale` accepts any staleness and reads as `u32::MAX`.
  pub max_stale_seconds: Option<u32>,
  pub min_fresh_seconds: Option<u32>,
  pub only_if_cached: bool,
  pub no_transform: bool,
  pub immutable: bool,
}

impl CacheControl {
  pub fn parse(headers: &HeaderMap) -> Self {
    let mut control = CacheControl::default();

    let values = headers
      .get_all(CACHE_CONTROL)
      .iter()
      .chain(headers.get_all(PRAGMA).iter());
    for value in values {
      let Ok(value) = value.to_str() else {
        continue;
      };
      for (name, argument) in directives(value) {
        match name.as_str() {
          "no-cache" => control.no_cache = true,
          "no-store" => control.no_store = true,
          "max-age" => control.max_age_seconds = seconds(argument),
          "s-maxage" => control.s_max_age_seconds = seconds(argument),
          "private" => control.is_private = true,
          "public" => control.is_public = true,
          "must-revalidate" => control.must_revalidate = true,
          "max-stale" => control.max_stale_seconds = Some(seconds(argument).unwrap_or(u32::MAX)),
          "min-fresh" => control.min_fresh_seconds = seconds(argument),
          "only-if-cached" => control.only_if_cached = true,
          "no-transform" => control.no_transform = true,
          "immutable" => control.immutable = true,
          _ => {}
        }
      }
    }
    control
  }
}

/// Splits a header value into lowercase directive names and their optional
/// arguments. Quoted arguments may contain separators.
fn directives(header: &str) -> Vec<(String, Option<&str>)> {
  let is_separator = |c: char| c == ',' || c == ';';
  let mut directives = Vec::new();
  let mut rest = header;

  loop {
    rest = rest.trim_start_matches(|c: char| is_separator(c) || c.is_whitespace());
    if rest.is_empty() {
      break;
    }

    let end = rest.find(|c: char| c == '=' || is_separator(c)).unwrap_or(rest.len());
    let name = rest[..end].trim().to_ascii_lowercase();
    rest = &rest[end..];

    let mut argument = None;
    if let Some(after) = rest.strip_prefix('=') {
      let after = after.trim_start();
      if let Some(quoted) = after.strip_prefix('"') {
        let close = quoted.find('"').unwrap_or(quoted.len());
        argument = Some(&quoted[..close]);
        rest = quoted.get(close + 1..).unwrap_or("");
      } else {
        let end = after.find(is_separator).unwrap_or(after.len());
        argument = Some(after[..end].trim());
        rest = &after[end..];
      }
    }
    directives.push((name, argument));
  }
  directives
}

fn seconds(argument: Option<&str>) -> Option<u32> {
  let argument = argument?.trim();
  match argument.parse::<i64>() {
    Ok(value) => Some(value.clamp(0, u32::MAX as i64) as u32),
    // Too many digits for an i64 is still a valid, very long age.
    Err(_) if !argument.is_empty() && argument.bytes().all(|b| b.is_ascii_digit()) => Some(u32::MAX),
    Err(_) => None,
  }
}

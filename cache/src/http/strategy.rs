use super::{CacheControl, CacheResponse};

use chrono::DateTime;
use http::header::{
  AGE, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, DATE, ETAG, EXPIRES, IF_MODIFIED_SINCE, IF_NONE_MATCH,
  LAST_MODIFIED, VARY, WARNING,
};
use http::{HeaderMap, HeaderName, HeaderValue, Request};
use tracing::trace;

/// What to do with a request given the response cached for it, if any.
#[derive(Debug)]
pub enum CacheDecision {
  /// The cached response is fresh enough to serve without a network call.
  Cached(CacheResponse),
  /// Send `request`, which carries a validator. A `304 Not Modified` reply
  /// means `cached` may be served with its headers combined with the reply's.
  Revalidate {
    request: Request<()>,
    cached: CacheResponse,
  },
  /// Ignore the cache and send `request` as is.
  Network(Request<()>),
  /// The request forbids the network and the cache can't answer it.
  Unsatisfiable,
}

impl CacheDecision {
  pub fn network_request(&self) -> Option<&Request<()>> {
    match self {
      CacheDecision::Revalidate { request, .. } | CacheDecision::Network(request) => Some(request),
      CacheDecision::Cached(_) | CacheDecision::Unsatisfiable => None,
    }
  }

  pub fn cache_response(&self) -> Option<&CacheResponse> {
    match self {
      CacheDecision::Cached(cached) | CacheDecision::Revalidate { cached, .. } => Some(cached),
      CacheDecision::Network(_) | CacheDecision::Unsatisfiable => None,
    }
  }
}

/// Decides between the cache and the network following HTTP caching rules.
///
/// Only the ages and validators of the cached response matter; status codes
/// are not consulted since only successful responses are ever written.
#[derive(Debug)]
pub struct CacheStrategy<'a> {
  now_millis: i64,
  request: &'a Request<()>,
  cached: Option<CacheResponse>,
  served_date: Option<i64>,
  served_date_text: Option<String>,
  last_modified: Option<i64>,
  last_modified_text: Option<String>,
  expires: Option<i64>,
  etag: Option<String>,
  age_seconds: Option<u32>,
}

impl<'a> CacheStrategy<'a> {
  pub fn new(request: &'a Request<()>, cached: Option<CacheResponse>, now_millis: i64) -> Self {
    let mut strategy = Self {
      now_millis,
      request,
      cached: None,
      served_date: None,
      served_date_text: None,
      last_modified: None,
      last_modified_text: None,
      expires: None,
      etag: None,
      age_seconds: None,
    };

    if let Some(response) = &cached {
      let headers = &response.headers;
      strategy.served_date_text = header_text(headers, DATE);
      strategy.served_date = strategy.served_date_text.as_deref().and_then(parse_http_date);
      strategy.last_modified_text = header_text(headers, LAST_MODIFIED);
      strategy.last_modified = strategy.last_modified_text.as_deref().and_then(parse_http_date);
      strategy.expires = header_text(headers, EXPIRES).as_deref().and_then(parse_http_date);
      strategy.etag = header_text(headers, ETAG);
      strategy.age_seconds = header_text(headers, AGE).and_then(|age| parse_seconds(&age));
    }
    strategy.cached = cached;
    strategy
  }

  /// Convenience for `CacheStrategy::new(..).compute()`.
  pub fn decide(request: &'a Request<()>, cached: Option<CacheResponse>, now_millis: i64) -> CacheDecision {
    Self::new(request, cached, now_millis).compute()
  }

  pub fn compute(self) -> CacheDecision {
    let only_if_cached = CacheControl::parse(self.request.headers()).only_if_cached;
    let decision = self.compute_candidate();
    if only_if_cached && decision.network_request().is_some() {
      return CacheDecision::Unsatisfiable;
    }
    decision
  }

  fn compute_candidate(mut self) -> CacheDecision {
    let request = self.request;
    let Some(cached) = self.cached.take() else {
      return CacheDecision::Network(copy_request(request));
    };

    let is_https = request.uri().scheme_str() == Some("https");
    if is_https && !cached.is_tls {
      trace!(uri = %request.uri(), "cached response was not fetched over TLS");
      return CacheDecision::Network(copy_request(request));
    }

    if !is_cacheable(request, &cached) {
      return CacheDecision::Network(copy_request(request));
    }

    let request_caching = CacheControl::parse(request.headers());
    if request_caching.no_cache || has_conditions(request) {
      return CacheDecision::Network(copy_request(request));
    }

    let response_caching = cached.cache_control();
    let age_millis = self.cache_response_age(&cached);
    let mut fresh_millis = self.freshness_lifetime(&cached, &response_caching);
    if let Some(max_age) = request_caching.max_age_seconds {
      fresh_millis = fresh_millis.min(seconds_to_millis(max_age));
    }
    let min_fresh_millis = request_caching.min_fresh_seconds.map_or(0, seconds_to_millis);
    let max_stale_millis = match request_caching.max_stale_seconds {
      Some(max_stale) if !response_caching.must_revalidate => seconds_to_millis(max_stale),
      _ => 0,
    };

    if !response_caching.no_cache
      && age_millis.saturating_add(min_fresh_millis) < fresh_millis.saturating_add(max_stale_millis)
    {
      trace!(age_millis, fresh_millis, "serving cached response");
      return CacheDecision::Cached(cached);
    }

    // Prefer the strongest validator available.
    let condition = if let Some(etag) = self.etag {
      Some((IF_NONE_MATCH, etag))
    } else if let (Some(_), Some(text)) = (self.last_modified, self.last_modified_text) {
      Some((IF_MODIFIED_SINCE, text))
    } else if let (Some(_), Some(text)) = (self.served_date, self.served_date_text) {
      Some((IF_MODIFIED_SINCE, text))
    } else {
      None
    };

    let mut conditional = copy_request(request);
    let Some((name, value)) = condition else {
      return CacheDecision::Network(conditional);
    };
    match HeaderValue::from_str(&value) {
      Ok(value) => {
        conditional.headers_mut().append(name, value);
        CacheDecision::Revalidate {
          request: conditional,
          cached,
        }
      }
      Err(_) => CacheDecision::Network(conditional),
    }
  }

  /// How long the cached response stays fresh, counted from when it was
  /// served.
  fn freshness_lifetime(&self, cached: &CacheResponse, response_caching: &CacheControl) -> i64 {
    if let Some(max_age) = response_caching.max_age_seconds {
      return seconds_to_millis(max_age);
    }

    if let Some(expires) = self.expires {
      let served = self.served_date.unwrap_or(cached.received_response_at_millis);
      return (expires - served).max(0);
    }

    // Heuristic: 10% of the document's age when it was served. Skipped for
    // URLs with a query, which are likely dynamic.
    if let Some(last_modified) = self.last_modified {
      if self.request.uri().query().is_none() {
        let served = self.served_date.unwrap_or(cached.sent_request_at_millis);
        let delta = served - last_modified;
        return if delta > 0 { delta / 10 } else { 0 };
      }
    }
    0
  }

  /// The current age of the cached response.
  fn cache_response_age(&self, cached: &CacheResponse) -> i64 {
    let received = cached.received_response_at_millis;

    let apparent_received_age = self.served_date.map_or(0, |served| (received - served).max(0));
    let received_age = match self.age_seconds {
      Some(age) => apparent_received_age.max(seconds_to_millis(age)),
      None => apparent_received_age,
    };
    let response_duration = received - cached.sent_request_at_millis;
    let resident_duration = self.now_millis - received;
    received_age + response_duration + resident_duration
  }
}

/// Whether `response` may be stored and later served for `request`.
pub fn is_cacheable(request: &Request<()>, response: &CacheResponse) -> bool {
  let varies_on_everything = response
    .headers
    .get_all(VARY)
    .iter()
    .any(|value| value.to_str().is_ok_and(|value| value.trim() == "*"));
  !CacheControl::parse(request.headers()).no_store && !response.cache_control().no_store && !varies_on_everything
}

/// Merges the headers of a cached response with those of a `304` reply.
///
/// 1xx warnings of the cached response are dropped, as are hop-by-hop
/// headers from either side. Content headers are always taken from the
/// cached response; any other header present in both comes from the network.
pub fn combine_headers(cached: &HeaderMap, network: &HeaderMap) -> HeaderMap {
  let mut combined = HeaderMap::with_capacity(cached.len() + network.len());

  for (name, value) in cached {
    if *name == WARNING && value.as_bytes().starts_with(b"1") {
      continue;
    }
    if !is_end_to_end(name) {
      continue;
    }
    if is_content_specific(name) || !network.contains_key(name) {
      combined.append(name.clone(), value.clone());
    }
  }

  for (name, value) in network {
    if is_end_to_end(name) && !is_content_specific(name) {
      combined.append(name.clone(), value.clone());
    }
  }
  combined
}

fn is_end_to_end(name: &HeaderName) -> bool {
  !matches!(
    name.as_str(),
    "connection"
      | "keep-alive"
      | "proxy-authenticate"
      | "proxy-authorization"
      | "te"
      | "trailer"
      | "trailers"
      | "transfer-encoding"
      | "upgrade"
  )
}

fn is_content_specific(name: &HeaderName) -> bool {
  *name == CONTENT_LENGTH || *name == CONTENT_ENCODING || *name == CONTENT_TYPE
}

fn has_conditions(request: &Request<()>) -> bool {
  request.headers().contains_key(IF_MODIFIED_SINCE) || request.headers().contains_key(IF_NONE_MATCH)
}

fn copy_request(request: &Request<()>) -> Request<()> {
  let mut copy = Request::new(());
  *copy.method_mut() = request.method().clone();
  *copy.uri_mut() = request.uri().clone();
  *copy.version_mut() = request.version();
  *copy.headers_mut() = request.headers().clone();
  copy
}

fn header_text(headers: &HeaderMap, name: HeaderName) -> Option<String> {
  headers.get(name)?.to_str().ok().map(str::to_owned)
}

/// Parses an HTTP date into epoch milliseconds.
pub fn parse_http_date(text: &str) -> Option<i64> {
  DateTime::parse_from_rfc2822(text.trim())
    .ok()
    .map(|date| date.timestamp_millis())
}

fn parse_seconds(text: &str) -> Option<u32> {
  let value = text.trim().parse::<i64>().ok()?;
  Some(value.clamp(0, u32::MAX as i64) as u32)
}

fn seconds_to_millis(seconds: u32) -> i64 {
  seconds as i64 * 1000
}

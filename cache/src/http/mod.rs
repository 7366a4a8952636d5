//! HTTP freshness rules for responses kept in the disk cache.
//!
//! A [`CacheResponse`] is the metadata stored beside a cached body. Given the
//! next request for the same URL, [`CacheStrategy`] decides whether the body
//! can be served as is, must be revalidated with a conditional request, or
//! must be fetched again.

mod cache_control;
mod response;
mod strategy;

pub use cache_control::CacheControl;
pub use response::CacheResponse;
pub use strategy::{combine_headers, is_cacheable, parse_http_date, CacheDecision, CacheStrategy};

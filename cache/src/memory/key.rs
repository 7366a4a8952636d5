use std::collections::BTreeMap;
use std::fmt;

/// The key for a memory cache entry.
///
/// `extras` carries request parameters that change the decoded output (target
/// size, transformations) so that two decodes of the same source with
/// different parameters never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemoryCacheKey {
  pub key: String,
  pub extras: BTreeMap<String, String>,
}

impl MemoryCacheKey {
  pub fn new(key: impl Into<String>) -> Self {
    Self {
      key: key.into(),
      extras: BTreeMap::new(),
    }
  }

  pub fn with_extra(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.extras.insert(name.into(), value.into());
    self
  }
}

impl From<&str> for MemoryCacheKey {
  fn from(key: &str) -> Self {
    Self::new(key)
  }
}

impl From<String> for MemoryCacheKey {
  fn from(key: String) -> Self {
    Self::new(key)
  }
}

impl fmt::Display for MemoryCacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.key)?;
    if !self.extras.is_empty() {
      f.write_str("{")?;
      for (i, (name, value)) in self.extras.iter().enumerate() {
        if i > 0 {
          f.write_str(", ")?;
        }
        write!(f, "{name}={value}")?;
      }
      f.write_str("}")?;
    }
    Ok(())
  }
}

/// Derives a cache key from request data.
///
/// Returning `None` means the data must not be cached in memory.
pub trait Keyer<T: ?Sized, O: ?Sized = ()> {
  fn key(&self, data: &T, options: &O) -> Option<String>;
}

impl<T: ?Sized, O: ?Sized, F> Keyer<T, O> for F
where
  F: Fn(&T, &O) -> Option<String>,
{
  fn key(&self, data: &T, options: &O) -> Option<String> {
    self(data, options)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn extras_distinguish_keys() {
    let plain = MemoryCacheKey::from("https://example.com/a.png");
    let sized = plain.clone().with_extra("size", "100x100");
    assert_ne!(plain, sized);
    assert_eq!(sized.to_string(), "https://example.com/a.png{size=100x100}");
    assert_eq!(plain.to_string(), "https://example.com/a.png");
  }

  #[test]
  fn closures_are_keyers() {
    let keyer = |url: &str, _: &()| (!url.is_empty()).then(|| url.to_owned());
    assert_eq!(Keyer::<str>::key(&keyer, "a", &()), Some("a".to_owned()));
    assert_eq!(Keyer::<str>::key(&keyer, "", &()), None);
  }
}

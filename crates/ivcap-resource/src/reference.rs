use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

/// Prefix identifying a reference to an artifact in the storage service.
pub const ARTIFACT_SCHEME: &str = "urn:";

/// A parsed resource reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceRef<'a> {
  /// An artifact held by the storage service.
  Artifact(&'a str),
  /// Anything else, fetched as a URL.
  External(&'a str),
}

impl<'a> ResourceRef<'a> {
  pub fn parse(reference: &'a str) -> Self {
    if reference.starts_with(ARTIFACT_SCHEME) {
      Self::Artifact(reference)
    } else {
      Self::External(reference)
    }
  }

  pub fn as_str(&self) -> &'a str {
    match self {
      Self::Artifact(s) | Self::External(s) => *s,
    }
  }
}

/// The path segment a caching proxy keys `url` under.
pub fn cache_key(url: &str) -> String {
  URL_SAFE_NO_PAD.encode(url.as_bytes())
}

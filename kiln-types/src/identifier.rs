//! Document identifiers
//!
//! An identifier is an immutable, slash-delimited path. Full identifiers
//! carry the file extension (`/posts/hello.md`); legacy identifiers are
//! extension-less and always wrapped in slashes (`/posts/hello/`).

use crate::error::IdentifierError;
use crate::pattern::Pattern;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;

/// Shape of an identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierKind {
    /// Includes the extension, starts with `/`, never ends with `/`
    Full,
    /// Extension-less, normalized to start and end with `/`
    Legacy,
}

impl FromStr for IdentifierKind {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(IdentifierKind::Full),
            "legacy" => Ok(IdentifierKind::Legacy),
            other => Err(IdentifierError::InvalidIdentifierType(other.to_string())),
        }
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentifierKind::Full => write!(f, "full"),
            IdentifierKind::Legacy => write!(f, "legacy"),
        }
    }
}

/// Immutable document identifier
///
/// Equality, ordering and hashing only look at the string form, so a full
/// and a legacy identifier with the same string compare equal.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "RawIdentifier", into = "RawIdentifier")]
pub struct Identifier {
    kind: IdentifierKind,
    string: Arc<str>,
}

#[derive(Serialize, Deserialize)]
struct RawIdentifier {
    kind: IdentifierKind,
    string: String,
}

impl TryFrom<RawIdentifier> for Identifier {
    type Error = IdentifierError;

    fn try_from(raw: RawIdentifier) -> Result<Self, Self::Error> {
        Identifier::new(&raw.string, raw.kind)
    }
}

impl From<Identifier> for RawIdentifier {
    fn from(id: Identifier) -> Self {
        RawIdentifier {
            kind: id.kind,
            string: id.string.to_string(),
        }
    }
}

impl Identifier {
    /// Build an identifier of the given kind, validating (full) or
    /// normalizing (legacy) its shape.
    pub fn new(raw: &str, kind: IdentifierKind) -> Result<Self, IdentifierError> {
        let string = match kind {
            IdentifierKind::Full => {
                if !raw.starts_with('/') {
                    return Err(IdentifierError::InvalidIdentifier(raw.to_string()));
                }
                if raw.ends_with('/') {
                    return Err(IdentifierError::InvalidFullIdentifier(raw.to_string()));
                }
                raw.to_string()
            }
            IdentifierKind::Legacy => normalize_legacy(raw),
        };

        Ok(Identifier {
            kind,
            string: Arc::from(string),
        })
    }

    /// Shorthand for a full identifier
    pub fn full(raw: &str) -> Result<Self, IdentifierError> {
        Self::new(raw, IdentifierKind::Full)
    }

    /// Shorthand for a legacy identifier (never fails)
    pub fn legacy(raw: &str) -> Self {
        Identifier {
            kind: IdentifierKind::Legacy,
            string: Arc::from(normalize_legacy(raw)),
        }
    }

    pub fn kind(&self) -> IdentifierKind {
        self.kind
    }

    pub fn is_full(&self) -> bool {
        self.kind == IdentifierKind::Full
    }

    pub fn is_legacy(&self) -> bool {
        self.kind == IdentifierKind::Legacy
    }

    pub fn as_str(&self) -> &str {
        &self.string
    }

    /// Prepend `prefix` (which must start with a slash) to this identifier.
    ///
    /// Trailing slashes on the prefix are dropped, so `/blog/` and `/blog`
    /// produce the same result.
    pub fn prefix(&self, prefix: &str) -> Result<Identifier, IdentifierError> {
        if !prefix.starts_with('/') {
            return Err(IdentifierError::InvalidPrefix(prefix.to_string()));
        }

        let joined = format!("{}{}", prefix.trim_end_matches('/'), self.string);
        Identifier::new(&joined, self.kind)
    }

    /// The identifier with its last extension removed
    pub fn without_ext(&self) -> Result<String, IdentifierError> {
        self.require_full()?;

        match extname(self.basename()) {
            Some(ext) => {
                let cut = self.string.len() - ext.len() - 1;
                Ok(self.string[..cut].to_string())
            }
            None => Ok(self.string.to_string()),
        }
    }

    /// The last extension, without the leading dot
    pub fn ext(&self) -> Result<Option<String>, IdentifierError> {
        self.require_full()?;
        Ok(extname(self.basename()).map(str::to_string))
    }

    /// The identifier with every extension removed
    pub fn without_exts(&self) -> Result<String, IdentifierError> {
        let exts = self.exts()?;
        if exts.is_empty() {
            return Ok(self.string.to_string());
        }

        let suffix_len = exts.iter().map(|e| e.len() + 1).sum::<usize>();
        Ok(self.string[..self.string.len() - suffix_len].to_string())
    }

    /// Every extension of the final segment, without leading dots
    pub fn exts(&self) -> Result<Vec<String>, IdentifierError> {
        self.require_full()?;

        let stem = strip_leading_dots(self.basename());
        Ok(stem.split('.').skip(1).map(str::to_string).collect())
    }

    /// Path segments, without the leading empty segment
    pub fn components(&self) -> Vec<String> {
        self.string
            .trim_end_matches('/')
            .split('/')
            .skip(1)
            .map(str::to_string)
            .collect()
    }

    /// Whether this identifier matches the given pattern
    pub fn matches(&self, pattern: &Pattern) -> bool {
        pattern.matches(self.as_str())
    }

    fn basename(&self) -> &str {
        match self.string.rfind('/') {
            Some(idx) => &self.string[idx + 1..],
            None => &self.string,
        }
    }

    fn require_full(&self) -> Result<(), IdentifierError> {
        if self.is_full() {
            Ok(())
        } else {
            Err(IdentifierError::UnsupportedOnLegacyIdentifier)
        }
    }
}

fn normalize_legacy(raw: &str) -> String {
    let inner = raw.trim_matches('/');
    if inner.is_empty() {
        "/".to_string()
    } else {
        format!("/{inner}/")
    }
}

fn strip_leading_dots(basename: &str) -> &str {
    basename.trim_start_matches('.')
}

/// Extension of a basename: the text after the final dot, ignoring leading
/// dots (so `.htaccess` has no extension).
fn extname(basename: &str) -> Option<&str> {
    let stem = strip_leading_dots(basename);
    stem.rfind('.').map(|idx| &stem[idx + 1..])
}

impl PartialEq for Identifier {
    fn eq(&self, other: &Self) -> bool {
        self.string == other.string
    }
}

impl Eq for Identifier {}

impl PartialEq<str> for Identifier {
    fn eq(&self, other: &str) -> bool {
        &*self.string == other
    }
}

impl PartialEq<&str> for Identifier {
    fn eq(&self, other: &&str) -> bool {
        &*self.string == *other
    }
}

impl Hash for Identifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.string.hash(state);
    }
}

impl PartialOrd for Identifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Identifier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.string.cmp(&other.string)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.string
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.string)
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({} {:?})", self.kind, &*self.string)
    }
}

impl FromStr for Identifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Identifier::full(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full(s: &str) -> Identifier {
        Identifier::full(s).unwrap()
    }

    #[test]
    fn test_full_round_trips() {
        for s in ["/foo", "/foo/bar.md", "/a.b.c", "/.htaccess"] {
            assert_eq!(full(s).to_string(), s);
        }
    }

    #[test]
    fn test_full_rejects_bad_shapes() {
        assert_eq!(
            Identifier::full("foo.md"),
            Err(IdentifierError::InvalidIdentifier("foo.md".into()))
        );
        assert_eq!(
            Identifier::full("/foo/"),
            Err(IdentifierError::InvalidFullIdentifier("/foo/".into()))
        );
        assert!(Identifier::full("/").is_err());
    }

    #[test]
    fn test_legacy_normalizes() {
        assert_eq!(Identifier::legacy("foo").as_str(), "/foo/");
        assert_eq!(Identifier::legacy("//foo//").as_str(), "/foo/");
        assert_eq!(Identifier::legacy("/foo/bar").as_str(), "/foo/bar/");
        assert_eq!(Identifier::legacy("").as_str(), "/");
        assert_eq!(Identifier::legacy("///").as_str(), "/");
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("full".parse::<IdentifierKind>(), Ok(IdentifierKind::Full));
        assert_eq!(
            "weird".parse::<IdentifierKind>(),
            Err(IdentifierError::InvalidIdentifierType("weird".into()))
        );
    }

    #[test]
    fn test_prefix() {
        let id = full("/foo.md");
        assert_eq!(id.prefix("/blog").unwrap().as_str(), "/blog/foo.md");
        assert_eq!(id.prefix("/blog///").unwrap().as_str(), "/blog/foo.md");
        assert_eq!(
            id.prefix("blog"),
            Err(IdentifierError::InvalidPrefix("blog".into()))
        );

        let legacy = Identifier::legacy("foo");
        let prefixed = legacy.prefix("/blog/").unwrap();
        assert_eq!(prefixed.as_str(), "/blog/foo/");
        assert!(prefixed.is_legacy());
    }

    #[test]
    fn test_extensions() {
        let id = full("/posts/archive.tar.gz");
        assert_eq!(id.ext().unwrap(), Some("gz".to_string()));
        assert_eq!(id.without_ext().unwrap(), "/posts/archive.tar");
        assert_eq!(id.exts().unwrap(), vec!["tar", "gz"]);
        assert_eq!(id.without_exts().unwrap(), "/posts/archive");
    }

    #[test]
    fn test_extensions_ignore_directories_and_leading_dots() {
        let id = full("/v1.2/readme");
        assert_eq!(id.ext().unwrap(), None);
        assert_eq!(id.without_ext().unwrap(), "/v1.2/readme");
        assert!(id.exts().unwrap().is_empty());

        let dotfile = full("/.htaccess");
        assert_eq!(dotfile.ext().unwrap(), None);
        assert!(dotfile.exts().unwrap().is_empty());
        assert_eq!(dotfile.without_exts().unwrap(), "/.htaccess");

        let hidden = full("/.config.yml");
        assert_eq!(hidden.exts().unwrap(), vec!["yml"]);
        assert_eq!(hidden.without_ext().unwrap(), "/.config");
    }

    #[test]
    fn test_extension_ops_fail_on_legacy() {
        let id = Identifier::legacy("foo");
        let unsupported = IdentifierError::UnsupportedOnLegacyIdentifier;
        assert_eq!(id.ext(), Err(unsupported.clone()));
        assert_eq!(id.exts(), Err(unsupported.clone()));
        assert_eq!(id.without_ext(), Err(unsupported.clone()));
        assert_eq!(id.without_exts(), Err(unsupported));
    }

    #[test]
    fn test_components() {
        assert_eq!(full("/foo/bar.md").components(), vec!["foo", "bar.md"]);
        assert_eq!(Identifier::legacy("foo/bar").components(), vec!["foo", "bar"]);
        assert!(Identifier::legacy("").components().is_empty());
    }

    #[test]
    fn test_equality_is_by_string() {
        let legacy = Identifier::legacy("foo");
        let other = Identifier::legacy("/foo/");
        assert_eq!(legacy, other);
        assert_eq!(full("/a"), "/a");
        assert!(full("/a") < full("/b"));
    }

    #[test]
    fn test_serde_validates() {
        let id = full("/foo.md");
        let json = serde_json::to_string(&id).unwrap();
        let back: Identifier = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(back.is_full());

        let bad = r#"{"kind":"full","string":"nope"}"#;
        assert!(serde_json::from_str::<Identifier>(bad).is_err());
    }
}

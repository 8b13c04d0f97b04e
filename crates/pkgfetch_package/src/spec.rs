use std::{fmt::Display, str::FromStr};

use pkgfetch_consts::consts;
use thiserror::Error;

/// Identifies a package: a repository slug and a version specifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageSpec {
    owner: String,
    name: String,
    version_spec: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParsePackageSpecError {
    #[error("'{0}' is not of the form owner/name[@version]")]
    MissingSlash(String),

    #[error("'{0}' has an empty owner")]
    EmptyOwner(String),

    #[error("'{0}' has an empty or invalid repository name")]
    InvalidName(String),

    #[error("'{0}' has an empty version specifier after '@'")]
    EmptyVersionSpec(String),
}

impl PackageSpec {
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        version_spec: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            version_spec: version_spec.into(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version_spec(&self) -> &str {
        &self.version_spec
    }

    /// `owner/name`
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// `owner-name`, the prefix of every cache key for this repository.
    pub fn ident(&self) -> String {
        format!("{}-{}", self.owner, self.name)
    }

    /// `owner-name@versionSpec`, used to deduplicate work before the version
    /// specifier has been resolved.
    pub fn dedup_key(&self) -> String {
        self.ident_at(&self.version_spec)
    }

    /// `owner-name@reference`, used to label errors and log lines.
    pub(crate) fn ident_at(&self, reference: &str) -> String {
        format!("{}{}{}", self.ident(), consts::REF_SEPARATOR, reference)
    }
}

impl FromStr for PackageSpec {
    type Err = ParsePackageSpecError;

    /// Parses `owner/name@version`; the version defaults to `*`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (slug, version_spec) = match s.split_once(consts::REF_SEPARATOR) {
            Some((_, "")) => return Err(ParsePackageSpecError::EmptyVersionSpec(s.to_string())),
            Some((slug, version_spec)) => (slug, version_spec),
            None => (s, consts::DEFAULT_VERSION_SPEC),
        };

        let Some((owner, name)) = slug.split_once('/') else {
            return Err(ParsePackageSpecError::MissingSlash(s.to_string()));
        };
        if owner.is_empty() {
            return Err(ParsePackageSpecError::EmptyOwner(s.to_string()));
        }
        if name.is_empty() || name.contains('/') {
            return Err(ParsePackageSpecError::InvalidName(s.to_string()));
        }

        Ok(Self::new(owner, name, version_spec))
    }
}

impl Display for PackageSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.slug(),
            consts::REF_SEPARATOR,
            self.version_spec
        )
    }
}

/// A concrete tag name, branch head commit or commit that satisfied a version
/// specifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedRef(String);

impl ResolvedRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Display for ResolvedRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ResolvedRef {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// `owner-name@resolvedRef`: the identity of a materialized package and the
/// name of its directory below the cache root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(spec: &PackageSpec, reference: &ResolvedRef) -> Self {
        // Tags may contain path separators, the key must stay one component.
        // Escaping `%` first keeps distinct refs on distinct keys.
        let reference = reference
            .as_str()
            .replace('%', "%25")
            .replace('/', "%2F")
            .replace('\\', "%5C");
        Self(spec.ident_at(&reference))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("component/type@1.0.0", "component", "type", "1.0.0")]
    #[case("component/type@master", "component", "type", "master")]
    #[case("component/tip@1.x", "component", "tip", "1.x")]
    #[case("segmentio/marked", "segmentio", "marked", "*")]
    #[case("twbs/bootstrap@>=3.0.0 <4", "twbs", "bootstrap", ">=3.0.0 <4")]
    fn test_parse_package_spec(
        #[case] input: &str,
        #[case] owner: &str,
        #[case] name: &str,
        #[case] version_spec: &str,
    ) {
        let spec: PackageSpec = input.parse().unwrap();
        assert_eq!(spec.owner(), owner);
        assert_eq!(spec.name(), name);
        assert_eq!(spec.version_spec(), version_spec);
    }

    #[rstest]
    #[case("component", ParsePackageSpecError::MissingSlash("component".into()))]
    #[case("/type@1.0.0", ParsePackageSpecError::EmptyOwner("/type@1.0.0".into()))]
    #[case("component/@1.0.0", ParsePackageSpecError::InvalidName("component/@1.0.0".into()))]
    #[case("a/b/c", ParsePackageSpecError::InvalidName("a/b/c".into()))]
    #[case("component/type@", ParsePackageSpecError::EmptyVersionSpec("component/type@".into()))]
    fn test_parse_package_spec_errors(
        #[case] input: &str,
        #[case] expected: ParsePackageSpecError,
    ) {
        assert_eq!(input.parse::<PackageSpec>().unwrap_err(), expected);
    }

    #[test]
    fn test_keys() {
        let spec = PackageSpec::new("component", "type", "1.x");
        assert_eq!(spec.slug(), "component/type");
        assert_eq!(spec.ident(), "component-type");
        assert_eq!(spec.dedup_key(), "component-type@1.x");
        assert_eq!(spec.to_string(), "component/type@1.x");

        let key = CacheKey::new(&spec, &ResolvedRef::new("1.0.3"));
        assert_eq!(key.as_str(), "component-type@1.0.3");
    }

    #[test]
    fn test_cache_key_is_single_component() {
        let spec = PackageSpec::new("owner", "repo", "release/1.0");
        let key = CacheKey::new(&spec, &ResolvedRef::new("release/1.0"));
        assert_eq!(key.as_str(), "owner-repo@release%2F1.0");
    }

    #[test]
    fn test_cache_keys_of_distinct_refs_differ() {
        let spec = PackageSpec::new("owner", "repo", "*");
        let keys: Vec<CacheKey> = ["a/b", "a-b", "a%2Fb", "a\\b"]
            .into_iter()
            .map(|reference| CacheKey::new(&spec, &ResolvedRef::new(reference)))
            .collect();
        for (i, key) in keys.iter().enumerate() {
            assert!(!key.as_str().contains(['/', '\\']));
            assert!(keys[i + 1..].iter().all(|other| other != key), "{key}");
        }
    }
}

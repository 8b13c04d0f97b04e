//! Turns a version specifier into a concrete reference.
//!
//! Resolution tries, in order:
//!
//!   1. a tag with exactly the name of the specifier,
//!   2. a branch with exactly the name of the specifier (resolved to the commit
//!      at its head),
//!   3. a full commit hash,
//!   4. the specifier as a semantic version range, matched against every tag
//!      that parses as a version once its leading non-digit characters are
//!      stripped.
//!
//! Literal matches come first so that repositories with non-semver tags, or a
//! branch named like a range, are never misread as a range expression.

use std::sync::Arc;

use semver::{Version, VersionReq};
use tracing::{debug, instrument};

use crate::{
    error::FetchError,
    remote::{RefListing, RepositoryClient},
    spec::{PackageSpec, ResolvedRef},
};

/// Resolves [`PackageSpec`]s against the references of their repository.
#[derive(Clone)]
pub struct RefResolver {
    client: Arc<dyn RepositoryClient>,
}

impl RefResolver {
    pub fn new(client: Arc<dyn RepositoryClient>) -> Self {
        Self { client }
    }

    /// Lists the references of the repository and selects the one that
    /// satisfies the version specifier.
    #[instrument(skip_all, fields(package = %spec))]
    pub async fn resolve(
        &self,
        spec: &PackageSpec,
        token: Option<&str>,
    ) -> Result<ResolvedRef, FetchError> {
        let listing = self
            .client
            .list_refs(spec.owner(), spec.name(), token)
            .await
            .map_err(|err| FetchError::from_remote(spec.dedup_key(), err, token.is_some()))?;

        select_ref(spec, &listing)
    }
}

/// Selects the reference of `listing` that satisfies the version specifier
/// of `spec`.
pub fn select_ref(spec: &PackageSpec, listing: &RefListing) -> Result<ResolvedRef, FetchError> {
    let version_spec = spec.version_spec();

    if listing.has_tag(version_spec) {
        debug!("'{version_spec}' is a tag");
        return Ok(ResolvedRef::new(version_spec));
    }

    if let Some(commit) = listing.branch_head(version_spec) {
        debug!("'{version_spec}' is a branch at {commit}");
        return Ok(ResolvedRef::new(commit));
    }

    if is_commit_hash(version_spec) {
        debug!("'{version_spec}' is a commit");
        return Ok(ResolvedRef::new(version_spec));
    }

    let not_found = || FetchError::RefNotFound {
        package: spec.dedup_key(),
        version_spec: version_spec.to_string(),
    };

    let range = VersionRange::parse(version_spec).ok_or_else(not_found)?;
    let tag = highest_matching_tag(&range, &listing.tags).ok_or_else(not_found)?;
    debug!("'{version_spec}' matched tag '{tag}'");
    Ok(ResolvedRef::new(tag))
}

/// Returns the tag with the highest version that satisfies `range`. Tags that
/// map to the same version keep the one listed first.
fn highest_matching_tag<'a>(range: &VersionRange, tags: &'a [String]) -> Option<&'a str> {
    let mut best: Option<(Version, &str)> = None;
    for tag in tags {
        let Some(version) = tag_version(tag) else {
            continue;
        };
        if !range.matches(&version) {
            continue;
        }
        // build metadata does not order versions, equal precedence keeps the first
        if best
            .as_ref()
            .is_none_or(|(current, _)| version.cmp_precedence(current).is_gt())
        {
            best = Some((version, tag));
        }
    }
    best.map(|(_, tag)| tag)
}

/// Parses a tag name as a version after stripping every leading non-digit
/// character, so `v1.2.3`, `release-1.2.3` and `1.2.3` all read as `1.2.3`.
///
/// This is a heuristic: unrelated tags may strip to the same version.
pub fn tag_version(tag: &str) -> Option<Version> {
    Version::parse(tag.trim_start_matches(|c: char| !c.is_ascii_digit())).ok()
}

fn is_commit_hash(s: &str) -> bool {
    s.len() == 40 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// A version range: satisfied when any of its alternatives is.
///
/// Accepts the syntax of [`VersionReq`] plus the npm conventions that
/// package authors commonly write: whitespace separated comparators,
/// `||` alternatives, `latest`/`x`/empty for any version, a bare version
/// meaning exactly that version, a partial version such as `1.2` meaning
/// `1.2.x`, and hyphen ranges such as `1.0.0 - 2.0.0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    alternatives: Vec<VersionReq>,
}

impl VersionRange {
    pub fn parse(spec: &str) -> Option<Self> {
        let alternatives = spec
            .split("||")
            .map(parse_alternative)
            .collect::<Option<Vec<_>>>()?;
        Some(Self { alternatives })
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }
}

fn parse_alternative(spec: &str) -> Option<VersionReq> {
    let spec = spec.trim();
    if matches!(spec, "" | "*" | "x" | "X" | "latest") {
        return Some(VersionReq::STAR);
    }

    if let Some((lower, upper)) = spec.split_once(" - ") {
        return hyphen_range(lower.trim(), upper.trim());
    }

    let bare = spec.trim_start_matches(['v', 'V', '=']);
    if let Ok(version) = Version::parse(bare) {
        return VersionReq::parse(&format!("={version}")).ok();
    }
    if partial_version(bare).is_some() {
        return VersionReq::parse(&format!("{bare}.*")).ok();
    }

    VersionReq::parse(&join_comparators(spec)).ok()
}

/// The numeric components of `1` or `1.2`.
fn partial_version(spec: &str) -> Option<Vec<u64>> {
    let parts = spec
        .split('.')
        .map(|part| part.parse().ok())
        .collect::<Option<Vec<u64>>>()?;
    (1..=2).contains(&parts.len()).then_some(parts)
}

/// `A - B` is `>=A, <=B`. A partial upper bound includes everything it
/// covers, so `1.0.0 - 2` is `>=1.0.0, <3.0.0`.
fn hyphen_range(lower: &str, upper: &str) -> Option<VersionReq> {
    let lower = lower.trim_start_matches(['v', 'V']);
    let upper = upper
        .trim_start_matches(['v', 'V'])
        .trim_end_matches(['.', 'x', 'X', '*']);
    let upper_bound = match Version::parse(upper) {
        Ok(version) => format!("<={version}"),
        Err(_) => match partial_version(upper)?.as_slice() {
            [major] => format!("<{}.0.0", major + 1),
            [major, minor] => format!("<{major}.{}.0", minor + 1),
            _ => return None,
        },
    };
    VersionReq::parse(&format!(">={lower}, {upper_bound}")).ok()
}

/// Rewrites `>= 1.0.0 <2` into `>=1.0.0, <2`.
fn join_comparators(spec: &str) -> String {
    let mut comparators: Vec<String> = Vec::new();
    let mut pending_op = String::new();
    for token in spec.split([' ', '\t', ',']).filter(|t| !t.is_empty()) {
        if token.chars().all(|c| matches!(c, '<' | '>' | '=' | '~' | '^')) {
            pending_op.push_str(token);
            continue;
        }
        comparators.push(format!("{}{token}", std::mem::take(&mut pending_op)));
    }
    comparators.join(", ")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rstest::rstest;

    use super::*;

    fn listing(tags: &[&str], branches: &[(&str, &str)]) -> RefListing {
        RefListing {
            tags: tags.iter().map(|t| t.to_string()).collect(),
            branches: branches
                .iter()
                .map(|(name, sha)| (name.to_string(), sha.to_string()))
                .collect::<HashMap<_, _>>(),
        }
    }

    fn resolve(version_spec: &str, listing: &RefListing) -> Result<ResolvedRef, FetchError> {
        select_ref(&PackageSpec::new("owner", "repo", version_spec), listing)
    }

    #[rstest]
    #[case("1.0.0", "v1.0.0")]
    #[case("*", "v2.1.0")]
    #[case("", "v2.1.0")]
    #[case("latest", "v2.1.0")]
    #[case("1.x", "v1.2.0")]
    #[case("^1.0.0", "v1.2.0")]
    #[case("~1.0.0", "v1.0.1")]
    #[case(">=1.0.0 <1.2.0", "v1.0.1")]
    #[case(">= 1.0.0, < 1.2.0", "v1.0.1")]
    #[case("0.0.x || ^2", "v2.1.0")]
    #[case("=1.0.1", "v1.0.1")]
    #[case("1.0", "v1.0.1")]
    #[case("v1", "v1.2.0")]
    #[case("1.0.0 - 1.2.0", "v1.2.0")]
    #[case("1.0.0 - 1.1.0", "v1.0.1")]
    #[case("1.0.0 - 1.0", "v1.0.1")]
    #[case("1.0.0 - 2", "v2.1.0")]
    #[case("v1.0.0 - 1.x", "v1.2.0")]
    fn test_semver_ranges(#[case] version_spec: &str, #[case] expected: &str) {
        let listing = listing(
            &["v2.1.0", "v1.2.0", "v1.0.1", "v1.0.0", "v2.2.0-beta.1", "docs"],
            &[],
        );
        assert_eq!(resolve(version_spec, &listing).unwrap().as_str(), expected);
    }

    #[test]
    fn test_exact_tag_is_returned_unchanged() {
        let listing = listing(&["release-candidate", "1.0.0", "v1.0.0"], &[]);
        assert_eq!(
            resolve("release-candidate", &listing).unwrap().as_str(),
            "release-candidate"
        );
        // The literal tag wins over the range interpretation of `1.0.0`.
        assert_eq!(resolve("v1.0.0", &listing).unwrap().as_str(), "v1.0.0");
        assert_eq!(resolve("1.0.0", &listing).unwrap().as_str(), "1.0.0");
    }

    #[test]
    fn test_branch_resolves_to_head_commit() {
        let listing = listing(
            &["1.0.0"],
            &[("master", "6c1b2a2f6d3e4b5a6978877665544332211aabbc")],
        );
        assert_eq!(
            resolve("master", &listing).unwrap().as_str(),
            "6c1b2a2f6d3e4b5a6978877665544332211aabbc"
        );
    }

    #[test]
    fn test_tag_wins_over_branch() {
        let listing = listing(&["stable"], &[("stable", "abc")]);
        assert_eq!(resolve("stable", &listing).unwrap().as_str(), "stable");
    }

    #[test]
    fn test_commit_hash_is_accepted() {
        let sha = "0123456789abcdef0123456789abcdef01234567";
        assert_eq!(resolve(sha, &listing(&[], &[])).unwrap().as_str(), sha);
    }

    #[test]
    fn test_weird_forked_prefixes() {
        let listing = listing(&["marked-v0.3.2", "release_0.3.5", "v0.3.3", "latest-build"], &[]);
        assert_eq!(resolve("*", &listing).unwrap().as_str(), "release_0.3.5");
    }

    #[test]
    fn test_prefix_collision_keeps_first_listed() {
        let listing = listing(&["v1.0.0", "1.0.0-final", "1.0.0"], &[]);
        assert_eq!(resolve("^1", &listing).unwrap().as_str(), "v1.0.0");
    }

    #[test]
    fn test_partial_version_stays_on_minor() {
        let listing = listing(&["1.0.0", "1.0.5", "1.5.0"], &[]);
        assert_eq!(resolve("1.0", &listing).unwrap().as_str(), "1.0.5");
    }

    #[test]
    fn test_hyphen_range_is_inclusive() {
        let listing = listing(&["1.0.0", "1.5.0", "2.5.0"], &[]);
        assert_eq!(resolve("1.0.0 - 2.0.0", &listing).unwrap().as_str(), "1.5.0");
        assert_eq!(resolve("1.0.0 - 2.5.0", &listing).unwrap().as_str(), "2.5.0");
    }

    #[test]
    fn test_build_metadata_keeps_first_listed() {
        let listing = listing(&["1.0.0+a", "1.0.0+b"], &[]);
        assert_eq!(resolve("^1", &listing).unwrap().as_str(), "1.0.0+a");
    }

    #[test]
    fn test_prerelease_needs_explicit_request() {
        let listing = listing(&["v1.0.0", "v1.1.0-rc.1"], &[]);
        assert_eq!(resolve("^1", &listing).unwrap().as_str(), "v1.0.0");
        assert_eq!(
            resolve(">=1.1.0-rc.0", &listing).unwrap().as_str(),
            "v1.1.0-rc.1"
        );
    }

    #[rstest]
    #[case("^2.0.0")]
    #[case("not-a-ref")]
    #[case("3.0.0")]
    fn test_no_match(#[case] version_spec: &str) {
        let listing = listing(&["v1.0.0", "v1.5.0"], &[("master", "abc")]);
        let err = resolve(version_spec, &listing).unwrap_err();
        assert!(matches!(err, FetchError::RefNotFound { .. }), "{err:?}");
        assert_eq!(err.package(), format!("owner-repo@{version_spec}"));
    }

    #[rstest]
    #[case("v1.2.3", Some("1.2.3"))]
    #[case("release-1.2.3", Some("1.2.3"))]
    #[case("1.2.3-beta.1", Some("1.2.3-beta.1"))]
    #[case("v1.2", None)]
    #[case("master", None)]
    fn test_tag_version(#[case] tag: &str, #[case] expected: Option<&str>) {
        assert_eq!(
            tag_version(tag),
            expected.map(|v| Version::parse(v).unwrap())
        );
    }

    #[test]
    fn test_join_comparators() {
        assert_eq!(join_comparators(">= 1.0.0 <2"), ">=1.0.0, <2");
        assert_eq!(join_comparators(">=1.0.0, <2"), ">=1.0.0, <2");
        assert_eq!(join_comparators("^1.2"), "^1.2");
    }
}

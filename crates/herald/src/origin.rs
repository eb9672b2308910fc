use std::collections::HashSet;

/// Case-insensitive set of allowed values (origins or hosts).
///
/// Entries are trimmed and lower-cased on construction; blank entries are
/// dropped, so `"a, ,B"` yields `{"a", "b"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    entries: HashSet<String>,
}

impl AllowList {
    /// Parse a comma-separated list.
    #[must_use]
    pub fn parse(csv: &str) -> Self {
        Self::from_entries(csv.split(','))
    }

    /// Build from individual entries.
    #[must_use]
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries = entries
            .into_iter()
            .map(|e| e.as_ref().trim().to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        Self { entries }
    }

    /// Returns `true` if no entry survived normalization.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Case-insensitive membership test.
    #[must_use]
    pub fn contains(&self, value: &str) -> bool {
        self.entries.contains(&value.to_ascii_lowercase())
    }
}

/// Decide whether an upgrade request with the given `Origin` may connect.
///
/// - An empty origin is allowed (same-origin upgrades from some browsers and
///   non-browser clients omit the header).
/// - With an empty allow-list only the request's own origin,
///   `{request_scheme}://{request_host}`, is accepted.
/// - Otherwise the origin must be a member of the allow-list.
///
/// All comparisons ignore ASCII case.
#[must_use]
pub fn is_allowed(
    declared_origin: &str,
    allow_list: &AllowList,
    request_scheme: &str,
    request_host: &str,
) -> bool {
    if declared_origin.is_empty() {
        return true;
    }
    if allow_list.is_empty() {
        let expected = format!("{request_scheme}://{request_host}");
        return declared_origin.eq_ignore_ascii_case(&expected);
    }
    allow_list.contains(declared_origin)
}

/// Decide whether the `Host` header passes the optional host allow-list.
///
/// An empty list admits every host.
#[must_use]
pub fn is_host_allowed(host: &str, allow_list: &AllowList) -> bool {
    allow_list.is_empty() || allow_list.contains(host)
}

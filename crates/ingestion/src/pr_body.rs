//! Managed-section codec for pull request bodies.
//!
//! The bot owns one section of a pull request body, delimited by a start and
//! an end marker. Text outside the markers belongs to whoever edited the pull
//! request and is carried over on every update; text between them is replaced
//! wholesale.
//!
//! The markers must never change between releases: a body written with old
//! markers would no longer be recognised and a second managed section would be
//! appended.

const START_MARKER: &str =
    "<!-- This section is manged by repo-ingestion-bot. Please Do not edit manually! -->";
const END_MARKER: &str = "<!-- End of section managed by repo-ingestion-bot -->";

/// The pair of sentinel strings bounding the managed section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionMarkers {
    start: String,
    end: String,
}

impl Default for SectionMarkers {
    fn default() -> Self {
        Self {
            start: START_MARKER.to_string(),
            end: END_MARKER.to_string(),
        }
    }
}

impl SectionMarkers {
    /// Creates a custom marker pair. Returns `None` if either is empty or
    /// they are equal.
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Option<Self> {
        let (start, end) = (start.into(), end.into());
        if start.is_empty() || end.is_empty() || start == end {
            None
        } else {
            Some(Self { start, end })
        }
    }

    /// Byte offsets of the first start marker and of the first end marker
    /// after it.
    fn locate(&self, body: &str) -> Option<(usize, usize)> {
        let start = body.find(&self.start)?;
        let content_from = start + self.start.len();
        let end = body[content_from..].find(&self.end)? + content_from;
        Some((start, end))
    }

    /// Surrounds `content` with the markers and blank-line padding.
    pub fn wrap(&self, content: &str) -> String {
        format!("\n\n{}\n{content}\n{}\n\n", self.start, self.end)
    }

    /// Returns the managed content of `body`, or `""` if `body` has no
    /// complete managed section.
    ///
    /// The single padding newline [`wrap`](Self::wrap) places inside each
    /// marker is removed, so `extract_managed(&merge_managed(b, m)) == m`.
    pub fn extract_managed<'a>(&self, body: &'a str) -> &'a str {
        let Some((start, end)) = self.locate(body) else {
            return "";
        };
        let inner = &body[start + self.start.len()..end];
        let inner = inner.strip_prefix('\n').unwrap_or(inner);
        inner.strip_suffix('\n').unwrap_or(inner)
    }

    /// Returns `body` with its managed section replaced by `content`.
    ///
    /// - Empty body: just the wrapped section.
    /// - No managed section: the wrapped section appended after `body`.
    /// - Otherwise: text before the start marker (right-trimmed), the wrapped
    ///   section, then text after the end marker (left-trimmed).
    pub fn merge_managed(&self, body: &str, content: &str) -> String {
        if body.is_empty() {
            return self.wrap(content);
        }
        match self.locate(body) {
            None => format!("{body}{}", self.wrap(content)),
            Some((start, end)) => {
                let before = body[..start].trim_end();
                let after = body[end + self.end.len()..].trim_start();
                format!("{before}{}{after}", self.wrap(content))
            }
        }
    }
}

/// Compares two texts line by line, ignoring leading and trailing blank space
/// and line-ending style.
pub fn same_lines(a: &str, b: &str) -> bool {
    a.trim().lines().eq(b.trim().lines())
}

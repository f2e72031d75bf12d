use std::borrow::Cow;

/// Byte order mark, which some sources emit in the middle of a document.
const BOM: char = '\u{feff}';

/// Removes characters that cannot appear in a well-formed feed document.
///
/// Strips C0/C1 control characters (keeping tab, newline and carriage return),
/// DEL, and stray byte order marks. Sources frequently leak these through
/// broken encoders and XML parsers reject the whole document because of them.
///
/// # Returns
///
/// A `Cow<str>`:
/// - `Cow::Borrowed(s)` if nothing had to be removed (no allocation)
/// - `Cow::Owned` with the offending characters dropped otherwise
///
/// # Examples
///
/// ```
/// use newsroll::util::strip_unprintable;
///
/// assert_eq!(strip_unprintable("plain <rss>"), "plain <rss>");
/// assert_eq!(strip_unprintable("bad\u{0}\u{8}byte"), "badbyte");
/// ```
pub fn strip_unprintable(s: &str) -> Cow<'_, str> {
    let needs_strip = s.chars().any(is_unprintable);
    if !needs_strip {
        return Cow::Borrowed(s);
    }
    Cow::Owned(s.chars().filter(|c| !is_unprintable(*c)).collect())
}

fn is_unprintable(c: char) -> bool {
    match c {
        '\t' | '\n' | '\r' => false,
        BOM => true,
        c => c.is_control(),
    }
}

/// Turns the interesting part of a URL into a short, readable label.
///
/// Uses the last non-empty path segment, or the host when the path is empty.
/// The result is lower-cased, runs of anything other than ASCII alphanumerics
/// and `.` collapse into a single `-`, and leading/trailing dashes are trimmed.
///
/// Returns an empty string when nothing usable remains; callers fall back to
/// the raw URL in that case.
///
/// # Examples
///
/// ```
/// use newsroll::util::url_slug;
///
/// assert_eq!(url_slug("https://example.com/posts/Hello_World/"), "hello-world");
/// assert_eq!(url_slug("https://example.com/"), "example.com");
/// assert_eq!(url_slug("???"), "");
/// ```
pub fn url_slug(raw: &str) -> String {
    let (host, path) = match url::Url::parse(raw.trim()) {
        Ok(u) => (u.host_str().unwrap_or_default().to_owned(), u.path().to_owned()),
        Err(_) => (String::new(), raw.trim().to_owned()),
    };

    let segment = path
        .rsplit('/')
        .find(|s| !s.is_empty())
        .map(|s| {
            urlencoding::decode(s)
                .map(|d| d.into_owned())
                .unwrap_or_else(|_| s.to_owned())
        })
        .unwrap_or(host);

    let mut slug = String::with_capacity(segment.len());
    let mut pending_dash = false;
    for c in segment.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() || c == '.' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // strip_unprintable tests
    // ========================================================================

    #[test]
    fn test_strip_clean_text_returns_borrowed() {
        let input = "<rss version=\"2.0\"><channel></channel></rss>";
        let result = strip_unprintable(input);
        assert!(matches!(result, Cow::Borrowed(_)));
        assert_eq!(result, input);
    }

    #[test]
    fn test_strip_preserves_tabs_newlines_cr() {
        let input = "<title>\n\tHello\r\n</title>";
        let result = strip_unprintable(input);
        assert!(matches!(result, Cow::Borrowed(_)));
        assert_eq!(result, input);
    }

    #[test]
    fn test_strip_removes_c0_and_del() {
        let input = "he\x00ll\x07o\x08 w\x0bor\x0cld\x7f!";
        let result = strip_unprintable(input);
        assert!(matches!(result, Cow::Owned(_)));
        assert_eq!(result, "hello world!");
    }

    #[test]
    fn test_strip_removes_c1_and_bom() {
        let input = "\u{feff}<rss>\u{85}caf\u{e9}</rss>";
        assert_eq!(strip_unprintable(input), "<rss>caf\u{e9}</rss>");
    }

    #[test]
    fn test_strip_keeps_non_ascii_text() {
        let input = "日本語のニュース — résumé";
        assert!(matches!(strip_unprintable(input), Cow::Borrowed(_)));
    }

    // ========================================================================
    // url_slug tests
    // ========================================================================

    #[test]
    fn test_slug_uses_last_segment() {
        assert_eq!(
            url_slug("https://blog.example.com/2024/05/My Great Post"),
            "my-great-post"
        );
    }

    #[test]
    fn test_slug_keeps_dots() {
        assert_eq!(url_slug("https://example.com/files/report.pdf"), "report.pdf");
    }

    #[test]
    fn test_slug_falls_back_to_host() {
        assert_eq!(url_slug("https://www.example.com"), "www.example.com");
    }

    #[test]
    fn test_slug_trims_dashes() {
        assert_eq!(url_slug("https://example.com/--odd__name--"), "odd-name");
    }

    #[test]
    fn test_slug_of_relative_path() {
        assert_eq!(url_slug("/story/42"), "42");
    }

    #[test]
    fn test_slug_empty_when_nothing_usable() {
        assert_eq!(url_slug("https://example.com/%%%/"), "");
        assert_eq!(url_slug(""), "");
    }
}

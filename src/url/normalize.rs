use crate::UrlError;
use url::Url;

/// Query parameters that only carry tracking information
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "mc_eid",
    "ref",
    "source",
];

/// Normalizes a URL so that equivalent links compare equal
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Require an http or https scheme
/// 3. Lowercase the host
/// 4. Normalize path:
///    - Remove dot segments (. and ..) and repeated slashes
///    - Remove trailing slash (except for root /)
///    - Empty path becomes /
/// 5. Remove fragment (everything after #)
/// 6. Remove tracking query parameters
/// 7. Sort remaining query parameters alphabetically
/// 8. Remove empty query string (trailing ?)
///
/// # Arguments
///
/// * `url_str` - The URL string to normalize
///
/// # Returns
///
/// * `Ok(Url)` - Normalized URL
/// * `Err(UrlError)` - Failed to parse or normalize the URL
///
/// # Examples
///
/// ```
/// use tide_crawl::url::normalize_url;
///
/// let url = normalize_url("http://EXAMPLE.COM/a/../page/#top").unwrap();
/// assert_eq!(url.as_str(), "http://example.com/page");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    let host = url
        .host_str()
        .ok_or(UrlError::MissingDomain)?
        .to_lowercase();
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    url.set_fragment(None);

    if url.query().is_some() {
        let filtered_params = filter_and_sort_query_params(&url);

        if filtered_params.is_empty() {
            url.set_query(None);
        } else {
            let query_string = filtered_params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&");
            url.set_query(Some(&query_string));
        }
    }

    Ok(url)
}

/// Resolves dot segments, drops empty segments and any trailing slash
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    format!("/{}", segments.join("/"))
}

/// Drops tracking parameters and sorts the rest by key
fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    params.sort_by(|a, b| a.0.cmp(&b.0));
    params
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_preserved() {
        let result = normalize_url("http://example.com/page").unwrap();
        assert_eq!(result.as_str(), "http://example.com/page");
    }

    #[test]
    fn test_www_preserved() {
        let result = normalize_url("https://WWW.example.com/").unwrap();
        assert_eq!(result.as_str(), "https://www.example.com/");
    }

    #[test]
    fn test_port_preserved() {
        let result = normalize_url("http://127.0.0.1:8080/a/").unwrap();
        assert_eq!(result.as_str(), "http://127.0.0.1:8080/a");
    }

    #[test]
    fn test_remove_trailing_slash() {
        let result = normalize_url("https://example.com/page/").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_keep_root_slash() {
        let result = normalize_url("https://example.com/").unwrap();
        assert_eq!(result.as_str(), "https://example.com/");
    }

    #[test]
    fn test_remove_fragment() {
        let result = normalize_url("https://example.com/page#section").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_remove_tracking_params() {
        let result = normalize_url("https://example.com/page?utm_source=twitter").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_sort_query_params() {
        let result = normalize_url("https://example.com/page?b=2&a=1").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page?a=1&b=2");
    }

    #[test]
    fn test_normalize_path_with_dots() {
        let result = normalize_url("https://example.com/a/../b/./c").unwrap();
        assert_eq!(result.as_str(), "https://example.com/b/c");
    }

    #[test]
    fn test_lowercase_domain() {
        let result = normalize_url("https://EXAMPLE.COM/Page").unwrap();
        assert_eq!(result.as_str(), "https://example.com/Page");
    }

    #[test]
    fn test_mixed_query_params() {
        let result = normalize_url(
            "https://example.com/page?keep=yes&utm_medium=email&another=value&fbclid=123",
        )
        .unwrap();
        assert_eq!(
            result.as_str(),
            "https://example.com/page?another=value&keep=yes"
        );
    }

    #[test]
    fn test_all_tracking_params_removed() {
        let result =
            normalize_url("https://example.com/page?utm_source=a&fbclid=b&gclid=c").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_complex_normalization() {
        let result =
            normalize_url("http://WWW.EXAMPLE.COM/a/../b/?utm_source=test#fragment").unwrap();
        assert_eq!(result.as_str(), "http://www.example.com/b");
    }

    #[test]
    fn test_invalid_scheme() {
        let result = normalize_url("ftp://example.com/page");
        assert!(result.is_err());
        assert!(matches!(result.unwrap_err(), UrlError::InvalidScheme(_)));
    }

    #[test]
    fn test_malformed_url() {
        let result = normalize_url("not a url");
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_path_becomes_root() {
        let result = normalize_url("https://example.com").unwrap();
        assert_eq!(result.as_str(), "https://example.com/");
    }

    #[test]
    fn test_multiple_slashes() {
        let result = normalize_url("https://example.com///path//to///page").unwrap();
        assert_eq!(result.as_str(), "https://example.com/path/to/page");
    }

    #[test]
    fn test_parent_directory_at_root() {
        let result = normalize_url("https://example.com/../page").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_all_tracking_params() {
        let params = vec![
            "utm_source",
            "utm_medium",
            "utm_campaign",
            "utm_term",
            "utm_content",
            "fbclid",
            "gclid",
            "mc_eid",
            "ref",
            "source",
        ];

        for param in params {
            let url = format!("https://example.com/page?{}=value", param);
            let result = normalize_url(&url).unwrap();
            assert_eq!(
                result.as_str(),
                "https://example.com/page",
                "Failed to remove {}",
                param
            );
        }
    }

    #[test]
    fn test_custom_utm_param() {
        let result = normalize_url("https://example.com/page?utm_custom=value").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }
}

// Playlist URL resolution: turns raw playlist text into absolute child URLs.
//
// Child URLs inherit query parameters from the playlist they were listed in,
// which carries auth/session tokens from the original request down to every
// segment fetch.

use tracing::trace;
use url::Url;

const PLAYLIST_EXTENSION: &str = "m3u8";

/// Whether the URL path carries an HLS playlist extension (case-insensitive).
pub fn is_playlist_url(url: &Url) -> bool {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|file| file.rsplit_once('.'))
        .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case(PLAYLIST_EXTENSION))
}

/// Resolves every URI line of `playlist` against `base_url`.
///
/// Blank lines and `#` lines are skipped, absolute URLs are kept, a leading
/// `./` is stripped and anything else is joined onto the base. Lines that
/// cannot be resolved are dropped. The result keeps playlist order.
pub fn resolve_child_urls(playlist: &str, base_url: &Url) -> Vec<Url> {
    playlist
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| resolve_line(line, base_url))
        .map(|child| merge_query(child, base_url))
        .collect()
}

fn resolve_line(line: &str, base_url: &Url) -> Option<Url> {
    let line = line.strip_prefix("./").unwrap_or(line);

    match Url::parse(line) {
        Ok(absolute) => Some(absolute),
        Err(url::ParseError::RelativeUrlWithoutBase) => match base_url.join(line) {
            Ok(resolved) => {
                trace!("Resolved URI: {} + {} -> {}", base_url, line, resolved);
                Some(resolved)
            }
            Err(e) => {
                trace!(line, error = %e, "Skipping unresolvable playlist line");
                None
            }
        },
        Err(e) => {
            trace!(line, error = %e, "Skipping malformed playlist line");
            None
        }
    }
}

/// Union of the child's and the base's query parameters by name.
///
/// The base value wins when both carry the same name.
pub fn merge_query(mut child: Url, base_url: &Url) -> Url {
    let base_params: Vec<(String, String)> = base_url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if base_params.is_empty() {
        return child;
    }

    let mut merged: Vec<(String, String)> = child
        .query_pairs()
        .map(|(k, v)| {
            let value = base_params
                .iter()
                .find(|(base_key, _)| *base_key == k)
                .map(|(_, base_value)| base_value.clone())
                .unwrap_or_else(|| v.into_owned());
            (k.into_owned(), value)
        })
        .collect();

    for (k, v) in &base_params {
        if !merged.iter().any(|(existing, _)| existing == k) {
            merged.push((k.clone(), v.clone()));
        }
    }

    let original = child.to_string();
    child.query_pairs_mut().clear().extend_pairs(merged);
    if child.as_str() != original {
        trace!("Merged query params: {} -> {}", original, child);
    }
    child
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).expect("valid url")
    }

    #[test]
    fn relative_segment_inherits_token() {
        let base = url("https://host/a/master.m3u8?token=X");
        let children = resolve_child_urls("#EXTM3U\n#EXTINF:4.0,\nsegment1.ts\n", &base);
        assert_eq!(children, vec![url("https://host/a/segment1.ts?token=X")]);
    }

    #[test]
    fn skips_blank_and_comment_lines() {
        let base = url("https://host/live/index.m3u8");
        let playlist = "#EXTM3U\n\n#EXT-X-TARGETDURATION:4\n   \n#EXTINF:4.0,\nseg0.ts\n#EXTINF:4.0,\nseg1.ts\n#EXT-X-ENDLIST\n";
        let children = resolve_child_urls(playlist, &base);
        assert_eq!(
            children,
            vec![
                url("https://host/live/seg0.ts"),
                url("https://host/live/seg1.ts"),
            ]
        );
    }

    #[test]
    fn absolute_urls_pass_through() {
        let base = url("https://host/a/master.m3u8");
        let children = resolve_child_urls("https://cdn.example.com/v/seg.ts\n", &base);
        assert_eq!(children, vec![url("https://cdn.example.com/v/seg.ts")]);
    }

    #[test]
    fn dot_slash_prefix_is_stripped() {
        let base = url("https://host/a/master.m3u8");
        let children = resolve_child_urls("./720p/index.m3u8\n", &base);
        assert_eq!(children, vec![url("https://host/a/720p/index.m3u8")]);
    }

    #[test]
    fn root_relative_lines_resolve_against_host() {
        let base = url("https://host/a/b/master.m3u8");
        let children = resolve_child_urls("/media/seg.ts\n../up.ts\n", &base);
        assert_eq!(
            children,
            vec![url("https://host/media/seg.ts"), url("https://host/a/up.ts")]
        );
    }

    #[test]
    fn base_query_wins_on_conflict_and_child_keeps_its_own() {
        let base = url("https://host/a/master.m3u8?token=BASE&session=1");
        let children = resolve_child_urls("seg.ts?token=CHILD&part=2\n", &base);
        assert_eq!(children.len(), 1);

        let pairs: Vec<(String, String)> = children[0]
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("token".to_string(), "BASE".to_string()),
                ("part".to_string(), "2".to_string()),
                ("session".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn base_without_query_leaves_children_untouched() {
        let base = url("https://host/a/master.m3u8");
        let children = resolve_child_urls("seg.ts?x=1\n", &base);
        assert_eq!(children, vec![url("https://host/a/seg.ts?x=1")]);
    }

    #[test]
    fn playlist_extension_detection() {
        assert!(is_playlist_url(&url("https://host/a/master.m3u8")));
        assert!(is_playlist_url(&url("https://host/a/MASTER.M3U8?token=1")));
        assert!(!is_playlist_url(&url("https://host/a/seg.ts")));
        assert!(!is_playlist_url(&url("https://host/m3u8")));
        assert!(!is_playlist_url(&url("https://host/")));
    }
}

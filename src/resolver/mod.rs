//! Video source resolver and embed dispatcher
//!
//! [`resolve`] classifies an episode URL into exactly one [`VideoSource`]
//! kind. Matchers run in a fixed order and the first hit wins: named
//! providers, then passthrough hosts, then stream manifests, then direct
//! media files, with a generic iframe as the catch-all.
//!
//! [`embed`] turns a source into a [`Playback`] directive for a player with
//! the given [`PlayerCapabilities`].

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use utoipa::ToSchema;

use crate::constants::catalog::PASSTHROUGH_HOSTS;

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

const YOUTUBE_ID_LEN: usize = 11;

// Ids are captured greedily so that over-long ids can be rejected by length
regex!(
    YOUTUBE_REGEX,
    r"(?:(?i:youtube\.com)/(?:watch\?(?:[^#]*&)?v=|embed/|v/|shorts/)|(?i:youtu\.be)/)([A-Za-z0-9_-]+)"
);
regex!(VIMEO_REGEX, r"(?i:vimeo\.com)/(?:video/)?(\d+)");
regex!(
    DAILYMOTION_REGEX,
    r"(?i:dailymotion\.com)/(?:embed/video/|video/)([A-Za-z0-9]+)"
);
regex!(OKRU_REGEX, r"(?i:ok\.ru)/video(?:embed)?/(\d+)");
regex!(RUMBLE_REGEX, r"(?i:rumble\.com)/embed/([A-Za-z0-9]+)");
regex!(TWITCH_REGEX, r"(?i:twitch\.tv)/videos/(\d+)");
regex!(HLS_REGEX, r"(?i)\.m3u8");
regex!(DASH_REGEX, r"(?i)\.mpd");
regex!(
    DIRECT_FILE_REGEX,
    r"(?i)\.(mp4|webm|ogg|mov|avi|mkv|flv)(?:[?#]|$)"
);

pub const HLS_MIME_TYPE: &str = "application/vnd.apple.mpegurl";
pub const DASH_MIME_TYPE: &str = "application/dash+xml";

/// Playable source derived from an episode URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum VideoSource {
    /// No URL was provided
    Unavailable,
    DirectFile {
        url: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    HlsManifest {
        url: String,
    },
    DashManifest {
        url: String,
    },
    Youtube {
        id: String,
    },
    Vimeo {
        id: String,
    },
    Dailymotion {
        id: String,
    },
    Okru {
        id: String,
    },
    Rumble {
        id: String,
    },
    Twitch {
        id: String,
    },
    /// Embedded as-is in an iframe
    GenericIframe {
        url: String,
    },
}

impl VideoSource {
    /// Kebab-case kind name, as serialized
    pub fn kind(&self) -> &'static str {
        match self {
            VideoSource::Unavailable => "unavailable",
            VideoSource::DirectFile { .. } => "direct-file",
            VideoSource::HlsManifest { .. } => "hls-manifest",
            VideoSource::DashManifest { .. } => "dash-manifest",
            VideoSource::Youtube { .. } => "youtube",
            VideoSource::Vimeo { .. } => "vimeo",
            VideoSource::Dailymotion { .. } => "dailymotion",
            VideoSource::Okru { .. } => "okru",
            VideoSource::Rumble { .. } => "rumble",
            VideoSource::Twitch { .. } => "twitch",
            VideoSource::GenericIframe { .. } => "generic-iframe",
        }
    }

    /// Provider id for hosted-video kinds
    pub fn id(&self) -> Option<&str> {
        match self {
            VideoSource::Youtube { id }
            | VideoSource::Vimeo { id }
            | VideoSource::Dailymotion { id }
            | VideoSource::Okru { id }
            | VideoSource::Rumble { id }
            | VideoSource::Twitch { id } => Some(id),
            _ => None,
        }
    }
}

/// Classify a URL. Total: never fails, never panics.
pub fn resolve(url: Option<&str>) -> VideoSource {
    let url = match url.map(str::trim) {
        Some(url) if !url.is_empty() => url,
        _ => return VideoSource::Unavailable,
    };

    if let Some(id) = capture(&YOUTUBE_REGEX, url).filter(|id| id.len() == YOUTUBE_ID_LEN) {
        return VideoSource::Youtube { id };
    }
    if let Some(id) = capture(&VIMEO_REGEX, url) {
        return VideoSource::Vimeo { id };
    }
    if let Some(id) = capture(&DAILYMOTION_REGEX, url) {
        return VideoSource::Dailymotion { id };
    }
    if let Some(id) = capture(&OKRU_REGEX, url) {
        return VideoSource::Okru { id };
    }
    if let Some(id) = capture(&RUMBLE_REGEX, url) {
        return VideoSource::Rumble { id };
    }
    if let Some(id) = capture(&TWITCH_REGEX, url) {
        return VideoSource::Twitch { id };
    }

    let lowered = url.to_lowercase();
    if PASSTHROUGH_HOSTS.iter().any(|host| lowered.contains(host)) {
        return VideoSource::GenericIframe {
            url: url.to_string(),
        };
    }

    if HLS_REGEX.is_match(url) {
        return VideoSource::HlsManifest {
            url: url.to_string(),
        };
    }
    if DASH_REGEX.is_match(url) {
        return VideoSource::DashManifest {
            url: url.to_string(),
        };
    }
    if let Some(extension) = capture(&DIRECT_FILE_REGEX, url) {
        return VideoSource::DirectFile {
            url: url.to_string(),
            mime_type: mime_type_for(&extension).to_string(),
        };
    }

    VideoSource::GenericIframe {
        url: url.to_string(),
    }
}

fn capture(regex: &Regex, url: &str) -> Option<String> {
    regex
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn mime_type_for(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "ogg" => "video/ogg",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        "flv" => "video/x-flv",
        _ => "application/octet-stream",
    }
}

/// What the client runtime can play
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerCapabilities {
    /// Media Source Extensions are available, so hls.js / dash.js can attach
    pub media_source_extensions: bool,
    /// `<video>` plays `application/vnd.apple.mpegurl` directly
    pub native_hls: bool,
    /// `<video>` plays `application/dash+xml` directly
    pub native_dash: bool,
}

impl Default for PlayerCapabilities {
    fn default() -> Self {
        Self {
            media_source_extensions: true,
            native_hls: false,
            native_dash: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerEnvironment {
    pub capabilities: PlayerCapabilities,
    /// Hostname of the embedding page, required by Twitch
    pub parent_host: String,
}

/// Player that drives a `<video>` element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PlayerEngine {
    /// Plain `<video src>`
    Native,
    /// hls.js over Media Source Extensions
    Hls,
    /// dash.js over Media Source Extensions
    Dash,
}

/// Embedding directive for a resolved source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Playback {
    Iframe {
        src: String,
        allow: String,
    },
    Video {
        src: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
        engine: PlayerEngine,
    },
    Unavailable,
    Unsupported {
        reason: String,
    },
}

/// Pick the embedding for a source in the given player environment.
pub fn embed(source: &VideoSource, env: &PlayerEnvironment) -> Playback {
    let caps = env.capabilities;
    match source {
        VideoSource::Unavailable => Playback::Unavailable,
        VideoSource::Youtube { id } => iframe(
            format!(
                "https://www.youtube.com/embed/{}?autoplay=1&modestbranding=1&rel=0",
                id
            ),
            "autoplay; encrypted-media",
        ),
        VideoSource::Vimeo { id } => iframe(
            format!("https://player.vimeo.com/video/{}?autoplay=1", id),
            "autoplay",
        ),
        VideoSource::Dailymotion { id } => iframe(
            format!("https://www.dailymotion.com/embed/video/{}", id),
            "autoplay",
        ),
        VideoSource::Okru { id } => {
            iframe(format!("https://ok.ru/videoembed/{}", id), "autoplay")
        }
        VideoSource::Rumble { id } => {
            iframe(format!("https://rumble.com/embed/{}/", id), "autoplay")
        }
        VideoSource::Twitch { id } => iframe(
            format!(
                "https://player.twitch.tv/?video={}&parent={}&autoplay=true",
                id,
                urlencoding::encode(&env.parent_host)
            ),
            "autoplay",
        ),
        VideoSource::GenericIframe { url } => iframe(url.clone(), "autoplay"),
        VideoSource::DirectFile { url, mime_type } => Playback::Video {
            src: url.clone(),
            mime_type: mime_type.clone(),
            engine: PlayerEngine::Native,
        },
        VideoSource::HlsManifest { url } => stream(
            url,
            HLS_MIME_TYPE,
            PlayerEngine::Hls,
            caps.media_source_extensions,
            caps.native_hls,
            "HLS",
        ),
        VideoSource::DashManifest { url } => stream(
            url,
            DASH_MIME_TYPE,
            PlayerEngine::Dash,
            caps.media_source_extensions,
            caps.native_dash,
            "DASH",
        ),
    }
}

fn iframe(src: String, allow: &str) -> Playback {
    Playback::Iframe {
        src,
        allow: allow.to_string(),
    }
}

// MSE library first, then native playback, else give up
fn stream(
    url: &str,
    mime_type: &str,
    library: PlayerEngine,
    mse: bool,
    native: bool,
    label: &str,
) -> Playback {
    let engine = if mse {
        library
    } else if native {
        PlayerEngine::Native
    } else {
        return Playback::Unsupported {
            reason: format!("{} streams are not supported by this player", label),
        };
    };
    Playback::Video {
        src: url.to_string(),
        mime_type: mime_type.to_string(),
        engine,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn env(mse: bool, native_hls: bool, native_dash: bool) -> PlayerEnvironment {
        PlayerEnvironment {
            capabilities: PlayerCapabilities {
                media_source_extensions: mse,
                native_hls,
                native_dash,
            },
            parent_host: "anime.example.com".to_string(),
        }
    }

    #[test]
    fn test_empty_and_missing_urls_are_unavailable() {
        assert_eq!(resolve(None), VideoSource::Unavailable);
        assert_eq!(resolve(Some("")), VideoSource::Unavailable);
        assert_eq!(resolve(Some("   ")), VideoSource::Unavailable);
    }

    #[test]
    fn test_youtube_shapes() {
        for url in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtube.com/watch?feature=share&v=dQw4w9WgXcQ&t=42",
            "youtube.com/embed/dQw4w9WgXcQ",
            "https://www.youtube.com/v/dQw4w9WgXcQ",
            "https://www.youtube.com/shorts/dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ",
            "http://youtu.be/dQw4w9WgXcQ?si=abc",
        ] {
            assert_eq!(
                resolve(Some(url)),
                VideoSource::Youtube {
                    id: "dQw4w9WgXcQ".to_string()
                },
                "{}",
                url
            );
        }
    }

    #[test]
    fn test_youtube_wrong_length_falls_through() {
        assert_eq!(
            resolve(Some("https://youtu.be/short")),
            VideoSource::GenericIframe {
                url: "https://youtu.be/short".to_string()
            }
        );
        assert!(!matches!(
            resolve(Some("https://www.youtube.com/watch?v=dQw4w9WgXcQX")),
            VideoSource::Youtube { .. }
        ));
    }

    #[test]
    fn test_provider_ids() {
        let cases = [
            ("https://vimeo.com/76979871", "vimeo", "76979871"),
            ("https://player.vimeo.com/video/76979871", "vimeo", "76979871"),
            ("https://www.dailymotion.com/video/x8abcd1", "dailymotion", "x8abcd1"),
            ("https://geo.dailymotion.com/embed/video/x8abcd1", "dailymotion", "x8abcd1"),
            ("https://ok.ru/videoembed/123456789", "okru", "123456789"),
            ("https://ok.ru/video/123456789", "okru", "123456789"),
            ("https://rumble.com/embed/v2abc9", "rumble", "v2abc9"),
            ("https://www.twitch.tv/videos/1987654321", "twitch", "1987654321"),
        ];
        for (url, kind, id) in cases {
            let source = resolve(Some(url));
            assert_eq!(source.kind(), kind, "{}", url);
            assert_eq!(source.id(), Some(id), "{}", url);
        }
    }

    #[test]
    fn test_passthrough_hosts_win_over_extensions() {
        let url = "https://www.terabox.com/sharing/embed?surl=abc&file=ep1.mp4";
        assert_eq!(
            resolve(Some(url)),
            VideoSource::GenericIframe {
                url: url.to_string()
            }
        );
        assert_eq!(
            resolve(Some("https://anichin.click/embed/ep-12.m3u8")).kind(),
            "generic-iframe"
        );
    }

    #[test]
    fn test_manifests() {
        assert_eq!(
            resolve(Some("https://cdn.example.com/live/master.m3u8?token=1")),
            VideoSource::HlsManifest {
                url: "https://cdn.example.com/live/master.m3u8?token=1".to_string()
            }
        );
        assert_eq!(
            resolve(Some("https://cdn.example.com/vod/manifest.MPD")).kind(),
            "dash-manifest"
        );
    }

    #[test]
    fn test_direct_file_mime_types() {
        let source = resolve(Some("https://cdn.example.com/ep1.MKV?dl=1"));
        assert_eq!(
            source,
            VideoSource::DirectFile {
                url: "https://cdn.example.com/ep1.MKV?dl=1".to_string(),
                mime_type: "video/x-matroska".to_string()
            }
        );
        assert_eq!(mime_type_for("mov"), "video/quicktime");
        assert_eq!(mime_type_for("flv"), "video/x-flv");
    }

    #[test]
    fn test_unknown_url_is_generic_iframe_verbatim() {
        assert_eq!(
            resolve(Some("https://example.com/whatever")),
            VideoSource::GenericIframe {
                url: "https://example.com/whatever".to_string()
            }
        );
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(resolve(Some("https://youtu.be/dQw4w9WgXcQ"))).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "youtube", "id": "dQw4w9WgXcQ"}));

        let json = serde_json::to_value(resolve(Some("https://a.example/x.webm"))).unwrap();
        assert_eq!(json["kind"], "direct-file");
        assert_eq!(json["mimeType"], "video/webm");

        let json = serde_json::to_value(resolve(None)).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "unavailable"}));
    }

    #[test]
    fn test_embed_iframes() {
        let env = env(true, false, false);
        assert_eq!(
            embed(&resolve(Some("https://youtu.be/dQw4w9WgXcQ")), &env),
            Playback::Iframe {
                src: "https://www.youtube.com/embed/dQw4w9WgXcQ?autoplay=1&modestbranding=1&rel=0"
                    .to_string(),
                allow: "autoplay; encrypted-media".to_string()
            }
        );
        match embed(&resolve(Some("https://www.twitch.tv/videos/42")), &env) {
            Playback::Iframe { src, .. } => assert_eq!(
                src,
                "https://player.twitch.tv/?video=42&parent=anime.example.com&autoplay=true"
            ),
            other => panic!("unexpected playback {:?}", other),
        }
        match embed(&resolve(Some("https://rumble.com/embed/v2abc9")), &env) {
            Playback::Iframe { src, .. } => assert_eq!(src, "https://rumble.com/embed/v2abc9/"),
            other => panic!("unexpected playback {:?}", other),
        }
    }

    #[test]
    fn test_embed_stream_engine_selection() {
        let hls = resolve(Some("https://cdn.example.com/a.m3u8"));

        assert!(matches!(
            embed(&hls, &env(true, true, false)),
            Playback::Video { engine: PlayerEngine::Hls, .. }
        ));
        assert_eq!(
            embed(&hls, &env(false, true, false)),
            Playback::Video {
                src: "https://cdn.example.com/a.m3u8".to_string(),
                mime_type: HLS_MIME_TYPE.to_string(),
                engine: PlayerEngine::Native
            }
        );
        assert!(matches!(
            embed(&hls, &env(false, false, true)),
            Playback::Unsupported { .. }
        ));

        let dash = resolve(Some("https://cdn.example.com/a.mpd"));
        assert!(matches!(
            embed(&dash, &env(true, false, false)),
            Playback::Video { engine: PlayerEngine::Dash, .. }
        ));
        assert!(matches!(
            embed(&dash, &env(false, false, true)),
            Playback::Video { engine: PlayerEngine::Native, .. }
        ));
        assert!(matches!(
            embed(&dash, &env(false, true, false)),
            Playback::Unsupported { .. }
        ));
    }

    #[test]
    fn test_embed_direct_and_unavailable() {
        let env = env(false, false, false);
        assert!(matches!(
            embed(&resolve(Some("https://a.example/x.mp4")), &env),
            Playback::Video { engine: PlayerEngine::Native, .. }
        ));
        assert_eq!(embed(&VideoSource::Unavailable, &env), Playback::Unavailable);
    }

    fn mixed_case(ext: &'static str) -> impl Strategy<Value = String> {
        proptest::collection::vec(any::<bool>(), ext.len()).prop_map(move |upper| {
            ext.chars()
                .zip(upper)
                .map(|(c, u)| if u { c.to_ascii_uppercase() } else { c })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_resolve_never_panics(url in ".*") {
            let source = resolve(Some(&url));
            prop_assert_eq!(source == VideoSource::Unavailable, url.trim().is_empty());
        }

        #[test]
        fn prop_eleven_char_ids_are_youtube(
            id in "[A-Za-z0-9_-]{11}",
            shape in 0usize..5,
        ) {
            let url = match shape {
                0 => format!("https://www.youtube.com/watch?v={}", id),
                1 => format!("https://www.youtube.com/embed/{}", id),
                2 => format!("https://youtube.com/v/{}", id),
                3 => format!("https://www.youtube.com/shorts/{}", id),
                _ => format!("https://youtu.be/{}", id),
            };
            prop_assert_eq!(resolve(Some(&url)), VideoSource::Youtube { id });
        }

        #[test]
        fn prop_other_length_ids_are_not_youtube(
            id in "[A-Za-z0-9_-]{1,10}|[A-Za-z0-9_-]{12,24}",
            short in any::<bool>(),
        ) {
            let url = if short {
                format!("https://youtu.be/{}", id)
            } else {
                format!("https://www.youtube.com/watch?v={}", id)
            };
            prop_assert_ne!(resolve(Some(&url)).kind(), "youtube");
        }

        #[test]
        fn prop_direct_extensions_any_case(
            name in "[a-z0-9]{1,12}",
            ext in prop::sample::select(vec!["mp4", "webm", "ogg", "mov", "avi", "mkv", "flv"])
                .prop_flat_map(mixed_case),
            query in proptest::option::of("[a-z]{1,5}=[0-9]{1,3}"),
        ) {
            let url = match query {
                Some(q) => format!("https://cdn.example.com/{}.{}?{}", name, ext, q),
                None => format!("https://cdn.example.com/{}.{}", name, ext),
            };
            prop_assert_eq!(resolve(Some(&url)).kind(), "direct-file");
        }
    }
}

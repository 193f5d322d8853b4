//! Canonical media identity resolution.
//!
//! Tracks reach a shared queue from three providers (local library, Tidal,
//! YouTube Music) and in several historical shapes. [`resolve`] folds any of
//! those shapes into one [`CanonicalTrackIdentity`] so every member of a
//! session addresses the same track, whichever provider their own client
//! streams it from.
//!
//! # Resolution order
//!
//! First match wins:
//!
//! 1. explicit `mediaSource` tag
//! 2. legacy `streamSource` tag
//! 3. generic `sourceType` tag
//! 4. a positive finite Tidal id
//! 5. a non-empty YouTube video id
//! 6. `local`
//!
//! A tag naming a provider whose id is missing from the input does not match.
//! Resolution is total: unrecognized input always ends at `local`.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::protocol_constants::YTMUSIC_ALIAS;
use crate::utils::non_blank;

// ─────────────────────────────────────────────────────────────────────────────
// Source Tags
// ─────────────────────────────────────────────────────────────────────────────

/// Provider discriminant of a canonical identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanonicalMediaSource {
    /// Track from the local library.
    Local,
    /// Track from the paid streaming API.
    Tidal,
    /// Track from the video-platform music API.
    Youtube,
}

impl CanonicalMediaSource {
    /// Returns the canonical tag string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Tidal => "tidal",
            Self::Youtube => "youtube",
        }
    }

    /// Parses a provider tag, accepting the `ytmusic` alias.
    ///
    /// Matching trims whitespace and ignores ASCII case.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let tag = tag.trim();
        if tag.eq_ignore_ascii_case("local") {
            Some(Self::Local)
        } else if tag.eq_ignore_ascii_case("tidal") {
            Some(Self::Tidal)
        } else if tag.eq_ignore_ascii_case("youtube") || tag.eq_ignore_ascii_case(YTMUSIC_ALIAS) {
            Some(Self::Youtube)
        } else {
            None
        }
    }
}

impl fmt::Display for CanonicalMediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source enumeration understood by the audio engine.
///
/// Identical to [`CanonicalMediaSource`] except that the video provider is
/// spelled `ytmusic`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioEngineSourceType {
    Local,
    Tidal,
    Ytmusic,
}

/// Maps a canonical source to the audio engine's enumeration.
pub fn to_audio_engine_source_type(source: CanonicalMediaSource) -> AudioEngineSourceType {
    match source {
        CanonicalMediaSource::Local => AudioEngineSourceType::Local,
        CanonicalMediaSource::Tidal => AudioEngineSourceType::Tidal,
        CanonicalMediaSource::Youtube => AudioEngineSourceType::Ytmusic,
    }
}

/// Maps the audio engine's enumeration back to a canonical source.
pub fn from_audio_engine_source_type(source: AudioEngineSourceType) -> CanonicalMediaSource {
    match source {
        AudioEngineSourceType::Local => CanonicalMediaSource::Local,
        AudioEngineSourceType::Tidal => CanonicalMediaSource::Tidal,
        AudioEngineSourceType::Ytmusic => CanonicalMediaSource::Youtube,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Loose Input
// ─────────────────────────────────────────────────────────────────────────────

/// Identifier that may arrive as a JSON number or a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Integer(u64),
    Number(f64),
    Text(String),
}

impl RawId {
    /// Interprets the value as a Tidal id.
    ///
    /// Strings are trimmed and parsed as numbers first.
    pub fn as_tidal_id(&self) -> Option<u64> {
        match self {
            Self::Integer(0) => None,
            Self::Integer(n) => Some(*n),
            Self::Number(n) => normalize_tidal_id(*n),
            Self::Text(s) => s.trim().parse::<f64>().ok().and_then(normalize_tidal_id),
        }
    }

    /// Interprets the value as an opaque identifier string.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Integer(n) => Some(n.to_string()),
            Self::Number(n) if n.is_finite() => {
                if n.fract() == 0.0 && n.abs() < 9.0e15 {
                    Some(format!("{}", *n as i64))
                } else {
                    Some(n.to_string())
                }
            }
            Self::Number(_) => None,
            Self::Text(s) => non_blank(Some(s.as_str())),
        }
    }
}

impl From<u64> for RawId {
    fn from(value: u64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for RawId {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for RawId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Accepts a numeric Tidal id only if it is finite and strictly positive.
///
/// Fractional values are truncated; a value that truncates to zero is absent.
pub fn normalize_tidal_id(value: f64) -> Option<u64> {
    if !value.is_finite() || value <= 0.0 {
        return None;
    }
    let truncated = value.trunc();
    if truncated < 1.0 {
        return None;
    }
    Some(truncated as u64)
}

/// Loosely-typed track reference as sent by clients and legacy collaborators.
///
/// Any subset of fields may be present; unknown fields are ignored and a
/// field of the wrong JSON type reads as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackReference {
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_text")]
    pub media_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_text")]
    pub stream_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_text")]
    pub source_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_raw_id")]
    pub provider_track_id: Option<RawId>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_raw_id")]
    pub tidal_track_id: Option<RawId>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_text")]
    pub youtube_video_id: Option<String>,
}

/// Reads a string field; any other JSON type is treated as absent.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Some(s),
        _ => None,
    })
}

/// Reads a string or numeric id; any other JSON type is treated as absent.
fn lenient_raw_id<'de, D>(deserializer: D) -> Result<Option<RawId>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Some(RawId::Text(s)),
        serde_json::Value::Number(n) => n
            .as_u64()
            .map(RawId::Integer)
            .or_else(|| n.as_f64().map(RawId::Number)),
        _ => None,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Canonical Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Provider-specific payload; each variant only carries its own fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ProviderRef {
    Local { track_id: String },
    Tidal { numeric_id: u64 },
    Youtube { video_id: String },
}

/// Normalized, provider-tagged reference to a single track.
///
/// Only [`resolve`] constructs values of this type (deserialization goes
/// through it as well), so the provider fields always agree with the source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "IdentityWire", into = "IdentityWire")]
pub struct CanonicalTrackIdentity {
    provider: ProviderRef,
}

impl CanonicalTrackIdentity {
    /// Returns the provider discriminant.
    pub fn source(&self) -> CanonicalMediaSource {
        match self.provider {
            ProviderRef::Local { .. } => CanonicalMediaSource::Local,
            ProviderRef::Tidal { .. } => CanonicalMediaSource::Tidal,
            ProviderRef::Youtube { .. } => CanonicalMediaSource::Youtube,
        }
    }

    /// Returns the provider track id in string form.
    ///
    /// Empty for local tracks that arrived without any id.
    pub fn provider_track_id(&self) -> String {
        match &self.provider {
            ProviderRef::Local { track_id } => track_id.clone(),
            ProviderRef::Tidal { numeric_id } => numeric_id.to_string(),
            ProviderRef::Youtube { video_id } => video_id.clone(),
        }
    }

    /// Returns the Tidal numeric id, if this is a Tidal track.
    pub fn tidal_numeric_id(&self) -> Option<u64> {
        match self.provider {
            ProviderRef::Tidal { numeric_id } => Some(numeric_id),
            _ => None,
        }
    }

    /// Returns the YouTube video id, if this is a YouTube track.
    pub fn youtube_video_id(&self) -> Option<&str> {
        match &self.provider {
            ProviderRef::Youtube { video_id } => Some(video_id),
            _ => None,
        }
    }

    /// Returns the source in the audio engine's enumeration.
    pub fn audio_engine_source_type(&self) -> AudioEngineSourceType {
        to_audio_engine_source_type(self.source())
    }

    fn local(track_id: Option<String>) -> Self {
        Self {
            provider: ProviderRef::Local {
                track_id: track_id.unwrap_or_default(),
            },
        }
    }

    fn tidal(numeric_id: u64) -> Self {
        Self {
            provider: ProviderRef::Tidal { numeric_id },
        }
    }

    fn youtube(video_id: String) -> Self {
        Self {
            provider: ProviderRef::Youtube { video_id },
        }
    }
}

impl fmt::Display for CanonicalTrackIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source(), self.provider_track_id())
    }
}

/// Wire shape of a canonical identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityWire {
    source: String,
    #[serde(default, deserialize_with = "lenient_raw_id")]
    provider_track_id: Option<RawId>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_raw_id"
    )]
    tidal_numeric_id: Option<RawId>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_text"
    )]
    youtube_video_id: Option<String>,
}

impl From<CanonicalTrackIdentity> for IdentityWire {
    fn from(identity: CanonicalTrackIdentity) -> Self {
        Self {
            source: identity.source().as_str().to_string(),
            provider_track_id: Some(RawId::Text(identity.provider_track_id())),
            tidal_numeric_id: identity.tidal_numeric_id().map(RawId::from),
            youtube_video_id: identity.youtube_video_id().map(str::to_string),
        }
    }
}

impl From<IdentityWire> for CanonicalTrackIdentity {
    fn from(wire: IdentityWire) -> Self {
        resolve(&TrackReference {
            media_source: Some(wire.source),
            provider_track_id: wire.provider_track_id,
            tidal_track_id: wire.tidal_numeric_id,
            youtube_video_id: wire.youtube_video_id,
            ..Default::default()
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolution
// ─────────────────────────────────────────────────────────────────────────────

/// Resolves a loosely-typed reference into a canonical identity.
///
/// Never fails. Conflicting provider signals are settled by the priority
/// order and logged at debug level.
pub fn resolve(input: &TrackReference) -> CanonicalTrackIdentity {
    let tidal_id = input.tidal_track_id.as_ref().and_then(RawId::as_tidal_id);
    let video_id = non_blank(input.youtube_video_id.as_deref());
    let provider_id = input.provider_track_id.as_ref().and_then(RawId::as_text);

    if tidal_id.is_some() && video_id.is_some() {
        log::debug!(
            "[Resolver] Ambiguous reference carries both tidal id {:?} and youtube id {:?}",
            tidal_id,
            video_id
        );
    }

    let tags = [
        ("mediaSource", input.media_source.as_deref()),
        ("streamSource", input.stream_source.as_deref()),
        ("sourceType", input.source_type.as_deref()),
    ];

    for (field, tag) in tags {
        let Some(raw) = tag else {
            continue;
        };
        match CanonicalMediaSource::from_tag(raw) {
            Some(source) => {
                if let Some(identity) =
                    build_for_source(source, tidal_id, video_id.as_deref(), provider_id.as_deref())
                {
                    return identity;
                }
                log::debug!(
                    "[Resolver] {}={} names a provider but no usable id was supplied",
                    field,
                    raw
                );
            }
            None if !raw.trim().is_empty() => {
                log::debug!("[Resolver] Ignoring unrecognized {}={}", field, raw);
            }
            None => {}
        }
    }

    if let Some(numeric_id) = tidal_id {
        return CanonicalTrackIdentity::tidal(numeric_id);
    }
    if let Some(video_id) = video_id {
        return CanonicalTrackIdentity::youtube(video_id);
    }
    CanonicalTrackIdentity::local(provider_id)
}

fn build_for_source(
    source: CanonicalMediaSource,
    tidal_id: Option<u64>,
    video_id: Option<&str>,
    provider_id: Option<&str>,
) -> Option<CanonicalTrackIdentity> {
    match source {
        CanonicalMediaSource::Local => Some(CanonicalTrackIdentity::local(
            provider_id.map(str::to_string),
        )),
        CanonicalMediaSource::Tidal => tidal_id
            .or_else(|| {
                provider_id
                    .and_then(|id| id.parse::<f64>().ok())
                    .and_then(normalize_tidal_id)
            })
            .map(CanonicalTrackIdentity::tidal),
        CanonicalMediaSource::Youtube => video_id
            .or(provider_id)
            .map(|id| CanonicalTrackIdentity::youtube(id.to_string())),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Legacy Fields
// ─────────────────────────────────────────────────────────────────────────────

/// Two-field representation used by collaborators that predate canonical ids.
///
/// Versioned by [`crate::protocol_constants::LEGACY_FIELDS_CONTRACT_VERSION`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyStreamFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tidal_track_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youtube_video_id: Option<String>,
}

impl LegacyStreamFields {
    /// Returns true for the empty object produced for local tracks.
    pub fn is_empty(&self) -> bool {
        self.stream_source.is_none() && self.tidal_track_id.is_none() && self.youtube_video_id.is_none()
    }
}

impl From<&LegacyStreamFields> for TrackReference {
    fn from(fields: &LegacyStreamFields) -> Self {
        Self {
            stream_source: fields.stream_source.clone(),
            tidal_track_id: fields.tidal_track_id.map(RawId::from),
            youtube_video_id: fields.youtube_video_id.clone(),
            ..Default::default()
        }
    }
}

/// Rebuilds the legacy stream fields for an identity.
///
/// Resolving the result again yields the same identity for Tidal and YouTube
/// tracks. Local tracks produce an empty object.
pub fn to_legacy_stream_fields(identity: &CanonicalTrackIdentity) -> LegacyStreamFields {
    match &identity.provider {
        ProviderRef::Local { .. } => LegacyStreamFields::default(),
        ProviderRef::Tidal { numeric_id } => LegacyStreamFields {
            stream_source: Some(CanonicalMediaSource::Tidal.as_str().to_string()),
            tidal_track_id: Some(*numeric_id),
            youtube_video_id: None,
        },
        ProviderRef::Youtube { video_id } => LegacyStreamFields {
            stream_source: Some(CanonicalMediaSource::Youtube.as_str().to_string()),
            tidal_track_id: None,
            youtube_video_id: Some(video_id.clone()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn from_json(value: serde_json::Value) -> CanonicalTrackIdentity {
        let reference: TrackReference = serde_json::from_value(value).expect("valid reference");
        resolve(&reference)
    }

    #[test]
    fn tidal_id_zero_resolves_local() {
        let identity = from_json(json!({ "tidalTrackId": 0 }));
        assert_eq!(identity.source(), CanonicalMediaSource::Local);
        assert_eq!(identity.tidal_numeric_id(), None);
    }

    #[test]
    fn positive_tidal_id_infers_tidal() {
        let identity = from_json(json!({ "tidalTrackId": 42 }));
        assert_eq!(identity.source(), CanonicalMediaSource::Tidal);
        assert_eq!(identity.provider_track_id(), "42");
        assert_eq!(identity.tidal_numeric_id(), Some(42));
    }

    #[test]
    fn non_finite_and_negative_tidal_ids_are_rejected() {
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, -7.0, 0.0, 0.4] {
            let reference = TrackReference {
                tidal_track_id: Some(RawId::Number(value)),
                ..Default::default()
            };
            assert_eq!(
                resolve(&reference).source(),
                CanonicalMediaSource::Local,
                "value {value} should be rejected"
            );
        }
        assert_eq!(normalize_tidal_id(12.9), Some(12));
    }

    #[test]
    fn numeric_string_tidal_id_is_accepted() {
        let identity = from_json(json!({ "tidalTrackId": " 1234 " }));
        assert_eq!(identity.tidal_numeric_id(), Some(1234));
    }

    #[test]
    fn ytmusic_source_type_is_youtube() {
        let identity = from_json(json!({ "sourceType": "ytmusic", "youtubeVideoId": "abc123" }));
        assert_eq!(identity.source(), CanonicalMediaSource::Youtube);
        assert_eq!(identity.youtube_video_id(), Some("abc123"));
    }

    #[test]
    fn ytmusic_source_type_uses_provider_id_when_video_id_missing() {
        let identity = from_json(json!({ "sourceType": "ytmusic", "providerTrackId": "vid-9" }));
        assert_eq!(identity.source(), CanonicalMediaSource::Youtube);
        assert_eq!(identity.provider_track_id(), "vid-9");
    }

    #[test]
    fn tag_without_id_falls_through() {
        let identity = from_json(json!({ "sourceType": "ytmusic" }));
        assert_eq!(identity.source(), CanonicalMediaSource::Local);
    }

    #[test]
    fn explicit_tag_beats_inferred_provider() {
        let identity = from_json(json!({
            "mediaSource": "youtube",
            "tidalTrackId": 99,
            "youtubeVideoId": "yt-1"
        }));
        assert_eq!(identity.source(), CanonicalMediaSource::Youtube);

        let identity = from_json(json!({
            "streamSource": "tidal",
            "sourceType": "ytmusic",
            "tidalTrackId": 99,
            "youtubeVideoId": "yt-1"
        }));
        assert_eq!(identity.source(), CanonicalMediaSource::Tidal);
    }

    #[test]
    fn tidal_id_wins_over_video_id_without_tags() {
        let identity = from_json(json!({ "tidalTrackId": 5, "youtubeVideoId": "yt" }));
        assert_eq!(identity.source(), CanonicalMediaSource::Tidal);
    }

    #[test]
    fn blank_video_id_is_absent() {
        let identity = from_json(json!({ "youtubeVideoId": "   " }));
        assert_eq!(identity.source(), CanonicalMediaSource::Local);
        assert_eq!(identity.youtube_video_id(), None);
    }

    #[test]
    fn unknown_fields_are_tolerated() {
        let identity = from_json(json!({ "title": "Song", "providerTrackId": "lib-7" }));
        assert_eq!(identity.source(), CanonicalMediaSource::Local);
        assert_eq!(identity.provider_track_id(), "lib-7");
    }

    #[test]
    fn mistyped_fields_read_as_absent() {
        let identity = from_json(json!({ "youtubeVideoId": 12345, "tidalTrackId": 42 }));
        assert_eq!(identity.source(), CanonicalMediaSource::Tidal);
        assert_eq!(identity.tidal_numeric_id(), Some(42));

        let identity = from_json(json!({ "tidalTrackId": true, "youtubeVideoId": "dQw4w9WgXcQ" }));
        assert_eq!(identity.youtube_video_id(), Some("dQw4w9WgXcQ"));

        let identity = from_json(json!({
            "streamSource": 7,
            "mediaSource": ["tidal"],
            "sourceType": { "kind": "youtube" },
            "providerTrackId": null,
        }));
        assert_eq!(identity.source(), CanonicalMediaSource::Local);
    }

    #[test]
    fn legacy_fields_round_trip_for_remote_sources() {
        let inputs = [
            json!({ "tidalTrackId": 42 }),
            json!({ "sourceType": "ytmusic", "youtubeVideoId": " dQw4w9WgXcQ " }),
            json!({ "mediaSource": "tidal", "providerTrackId": "77" }),
        ];
        for input in inputs {
            let identity = from_json(input);
            let legacy = to_legacy_stream_fields(&identity);
            assert_eq!(resolve(&TrackReference::from(&legacy)), identity);
        }
    }

    #[test]
    fn legacy_fields_are_empty_for_local() {
        let identity = from_json(json!({ "providerTrackId": "lib-1" }));
        let legacy = to_legacy_stream_fields(&identity);
        assert!(legacy.is_empty());
        assert_eq!(serde_json::to_value(&legacy).unwrap(), json!({}));
    }

    #[test]
    fn audio_engine_mapping_is_inverse() {
        assert_eq!(
            to_audio_engine_source_type(CanonicalMediaSource::Youtube),
            AudioEngineSourceType::Ytmusic
        );
        for source in [
            CanonicalMediaSource::Local,
            CanonicalMediaSource::Tidal,
            CanonicalMediaSource::Youtube,
        ] {
            assert_eq!(
                from_audio_engine_source_type(to_audio_engine_source_type(source)),
                source
            );
        }
    }

    #[test]
    fn identity_serializes_with_provider_fields() {
        let identity = from_json(json!({ "tidalTrackId": 42 }));
        let value = serde_json::to_value(&identity).unwrap();
        assert_eq!(value["source"], "tidal");
        assert_eq!(value["providerTrackId"], "42");
        assert_eq!(value["tidalNumericId"], 42);
        assert!(value.get("youtubeVideoId").is_none());

        let back: CanonicalTrackIdentity = serde_json::from_value(value).unwrap();
        assert_eq!(back, identity);
    }
}

//! Verse → audio source resolution
//!
//! Recitation audio is laid out as `{audio_base}/{language}/{reciter}/{verse_id}.mp3`,
//! where `audio_base` is either a local directory or an HTTP(S) root.

use crate::audio::source::TrackSource;
use crate::error::{Error, Result};
use std::ops::RangeInclusive;
use std::path::PathBuf;
use tilawa_common::config::TomlConfig;

/// Maps a verse id to the byte source holding its recitation
pub trait TrackResolver: Send + Sync {
    fn resolve(&self, verse_id: u32) -> Result<TrackSource>;

    /// Ordered sources for every verse in `verses`
    ///
    /// An empty or inverted range is `EmptyTrackList`.
    fn playlist(&self, verses: RangeInclusive<u32>) -> Result<Vec<TrackSource>> {
        if verses.is_empty() {
            return Err(Error::EmptyTrackList);
        }
        verses.map(|id| self.resolve(id)).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum AudioRoot {
    Dir(PathBuf),
    Url(reqwest::Url),
}

/// Resolves verses against the standard recitation directory layout
#[derive(Debug, Clone)]
pub struct VerseAudioLocator {
    root: AudioRoot,
    language: String,
    reciter: String,
}

impl VerseAudioLocator {
    pub fn new(audio_base: &str, language: &str, reciter: &str) -> Result<Self> {
        let root = match audio_base.parse::<TrackSource>() {
            Ok(TrackSource::Url(url)) => {
                if url.cannot_be_a_base() {
                    return Err(Error::Config(format!(
                        "audio_base '{}' cannot be used as a URL root",
                        audio_base
                    )));
                }
                AudioRoot::Url(url)
            }
            Ok(TrackSource::File(path)) => AudioRoot::Dir(path),
            Err(e) => return Err(Error::Config(e.to_string())),
        };

        Ok(Self {
            root,
            language: language.to_string(),
            reciter: reciter.to_string(),
        })
    }

    pub fn from_config(config: &TomlConfig) -> Result<Self> {
        Self::new(&config.audio_base, &config.language, &config.reciter)
    }
}

impl TrackResolver for VerseAudioLocator {
    fn resolve(&self, verse_id: u32) -> Result<TrackSource> {
        let file_name = format!("{}.mp3", verse_id);
        match &self.root {
            AudioRoot::Dir(base) => Ok(TrackSource::File(
                base.join(&self.language).join(&self.reciter).join(file_name),
            )),
            AudioRoot::Url(base) => {
                let mut url = base.clone();
                url.path_segments_mut()
                    .map_err(|_| Error::Config(format!("audio_base '{}' is not a URL root", base)))?
                    .pop_if_empty()
                    .extend([self.language.as_str(), self.reciter.as_str(), file_name.as_str()]);
                Ok(TrackSource::Url(url))
            }
        }
    }
}

/// Parse `FIRST..=LAST` or `FIRST-LAST` into a verse range
pub fn parse_verse_range(s: &str) -> std::result::Result<RangeInclusive<u32>, String> {
    let (first, last) = s
        .split_once("..=")
        .or_else(|| s.split_once('-'))
        .ok_or_else(|| format!("expected FIRST..=LAST, got '{}'", s))?;

    let first: u32 = first
        .trim()
        .parse()
        .map_err(|e| format!("invalid first verse '{}': {}", first, e))?;
    let last: u32 = last
        .trim()
        .parse()
        .map_err(|e| format!("invalid last verse '{}': {}", last, e))?;

    if first > last {
        return Err(format!("verse range {}..={} is inverted", first, last));
    }
    Ok(first..=last)
}

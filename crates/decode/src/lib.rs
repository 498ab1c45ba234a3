//! Decoding of lick uploads and generated backing audio into [`AudioArc`]s,
//! plus a cache keyed by the clip's audio reference.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use riff_transport::AudioArc;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Map an audio reference to a local file.
///
/// Accepts `file://` URLs, absolute paths, and paths relative to `media_root`.
/// Remote URLs return `None`; the host registers their audio with
/// [`AudioCache::insert`].
pub fn resolve_reference(reference: &str, media_root: Option<&Path>) -> Option<PathBuf> {
    if reference.starts_with("http://") || reference.starts_with("https://") {
        return None;
    }
    let raw = reference.strip_prefix("file://").unwrap_or(reference);
    let path = Path::new(raw);
    if path.is_absolute() {
        return path.exists().then(|| path.to_path_buf());
    }
    if let Some(root) = media_root {
        let joined = root.join(path);
        if joined.exists() {
            return Some(joined);
        }
    }
    path.exists().then(|| path.to_path_buf())
}

pub fn decode_file(path: &Path) -> anyhow::Result<AudioArc> {
    let file = File::open(path)?;
    let extension = path.extension().and_then(|e| e.to_str());
    decode_source(Box::new(file), extension)
}

fn decode_source(source: Box<dyn MediaSource>, extension: Option<&str>) -> anyhow::Result<AudioArc> {
    let mss = MediaSourceStream::new(source, Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| anyhow::anyhow!("no default track"))?;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
    let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2) as u16;
    let track_id = track.id;

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder.decode(&packet)?;
        let spec = *decoded.spec();
        sample_rate = spec.rate;
        channels = spec.channels.count() as u16;

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    if channels == 0 {
        anyhow::bail!("decoded stream reports zero channels");
    }
    let whole = samples.len() - samples.len() % channels as usize;
    samples.truncate(whole);
    Ok(AudioArc::new(samples, sample_rate, channels))
}

/// Decoded audio by reference, resampled to one target rate.
///
/// Each reference is decoded at most once per target rate; clips sharing a
/// lick share the same samples.
#[derive(Debug, Default)]
pub struct AudioCache {
    media_root: Option<PathBuf>,
    entries: Mutex<HashMap<(String, u32), AudioArc>>,
}

impl AudioCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative references against `root`.
    pub fn with_media_root(root: impl Into<PathBuf>) -> Self {
        Self {
            media_root: Some(root.into()),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Register audio the host already has in memory (e.g. downloaded).
    pub fn insert(&self, reference: impl Into<String>, audio: AudioArc) {
        let key = (reference.into(), audio.sample_rate());
        self.lock().insert(key, audio);
    }

    /// Audio for `reference` at `sample_rate`, decoding and resampling on a miss.
    pub fn get_or_load(&self, reference: &str, sample_rate: u32) -> anyhow::Result<AudioArc> {
        let key = (reference.to_string(), sample_rate);
        if let Some(audio) = self.lock().get(&key) {
            return Ok(audio.clone());
        }

        let source = match self.lookup_any_rate(reference) {
            Some(audio) => audio,
            None => {
                let path = resolve_reference(reference, self.media_root.as_deref())
                    .ok_or_else(|| anyhow::anyhow!("audio not found: {reference}"))?;
                log::debug!("decoding {}", path.display());
                decode_file(&path)?
            }
        };

        let audio = source.resample(sample_rate)?;
        self.lock().insert(key, audio.clone());
        Ok(audio)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lookup_any_rate(&self, reference: &str) -> Option<AudioArc> {
        self.lock()
            .iter()
            .find(|((r, _), _)| r == reference)
            .map(|(_, audio)| audio.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, u32), AudioArc>> {
        // A poisoned cache only ever holds complete entries.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

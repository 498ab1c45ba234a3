#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSignature {
    pub numerator: u32,
    pub denominator: u32,
}

impl TimeSignature {
    pub fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    pub fn beats_per_bar(&self) -> u32 {
        self.numerator
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::new(4, 4)
    }
}

impl From<(u32, u32)> for TimeSignature {
    fn from((numerator, denominator): (u32, u32)) -> Self {
        Self::new(numerator, denominator)
    }
}

impl From<TimeSignature> for (u32, u32) {
    fn from(ts: TimeSignature) -> Self {
        (ts.numerator, ts.denominator)
    }
}

/// Conversions between beats, seconds and pixels.
///
/// Tempo and zoom are validated where projects and views are created, so
/// nothing here checks them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeContext {
    pub tempo: f64,
    pub time_signature: TimeSignature,
    pub base_pixels_per_second: f64,
    pub zoom: f64,
}

impl TimeContext {
    pub fn new(tempo: f64, time_signature: impl Into<TimeSignature>, base_pixels_per_second: f64) -> Self {
        Self {
            tempo,
            time_signature: time_signature.into(),
            base_pixels_per_second,
            zoom: 1.0,
        }
    }

    pub fn with_zoom(mut self, zoom: f64) -> Self {
        self.zoom = zoom;
        self
    }

    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.tempo
    }

    pub fn pixels_per_second(&self) -> f64 {
        self.base_pixels_per_second * self.zoom
    }

    pub fn pixels_per_beat(&self) -> f64 {
        self.pixels_per_second() * self.seconds_per_beat()
    }

    /// One bar: `numerator` beats.
    pub fn measure_duration(&self) -> f64 {
        self.time_signature.beats_per_bar() as f64 * self.seconds_per_beat()
    }

    pub fn beats_to_seconds(&self, beats: f64) -> f64 {
        beats * self.seconds_per_beat()
    }

    pub fn seconds_to_beats(&self, seconds: f64) -> f64 {
        seconds / self.seconds_per_beat()
    }

    pub fn seconds_to_pixels(&self, seconds: f64) -> f64 {
        seconds * self.pixels_per_second()
    }

    pub fn pixels_to_seconds(&self, pixels: f64) -> f64 {
        pixels / self.pixels_per_second()
    }

    /// The beat-grid line closest to `seconds`, in seconds.
    pub fn nearest_beat(&self, seconds: f64) -> f64 {
        self.beats_to_seconds(self.seconds_to_beats(seconds).round())
    }

    pub fn format_position(&self, seconds: f64) -> MusicalPosition {
        let seconds = seconds.max(0.0);
        let total_beats = self.seconds_to_beats(seconds);
        let beats_per_bar = self.time_signature.beats_per_bar().max(1) as f64;

        let bar = (total_beats / beats_per_bar).floor() as u32 + 1;
        let beat = (total_beats % beats_per_bar).floor() as u32 + 1;
        let into_beat = seconds - self.beats_to_seconds(total_beats.floor());
        let millis = (into_beat * 1000.0).floor() as u32;

        MusicalPosition { bar, beat, millis }
    }
}

impl Default for TimeContext {
    fn default() -> Self {
        Self::new(120.0, TimeSignature::default(), 100.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MusicalPosition {
    pub bar: u32,
    pub beat: u32,
    pub millis: u32,
}

impl std::fmt::Display for MusicalPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{:03}", self.bar, self.beat, self.millis)
    }
}

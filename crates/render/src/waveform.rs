/// Lowest value any point of the display waveform takes.
const FLOOR: f32 = 0.1;

/// Summarize the first channel of interleaved `samples` into `points` values.
///
/// Each point is the mean absolute amplitude of its block, normalized by the
/// loudest block and floored at 0.1. Silent input yields all-floor output.
pub fn waveform_envelope(samples: &[f32], channels: u16, points: usize) -> Vec<f32> {
    let channels = channels.max(1) as usize;
    let frames = samples.len() / channels;
    if points == 0 {
        return Vec::new();
    }
    if frames == 0 {
        return vec![FLOOR; points];
    }

    // Proportional bounds; with fewer frames than points a frame repeats.
    let means: Vec<f32> = (0..points)
        .map(|p| {
            let start = p * frames / points;
            let end = ((p + 1) * frames / points).clamp(start + 1, frames);
            let sum: f32 = (start..end).map(|f| samples[f * channels].abs()).sum();
            sum / (end - start) as f32
        })
        .collect();

    let peak = means.iter().copied().fold(0.0f32, f32::max);
    means
        .into_iter()
        .map(|m| {
            let normalized = if peak > 0.0 { m / peak } else { 0.0 };
            normalized.clamp(FLOOR, 1.0)
        })
        .collect()
}

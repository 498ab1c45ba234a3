use rayon::prelude::*;

use crate::schedule::{Schedule, TrackSchedule};

fn render_track(track: &TrackSchedule, total_frames: usize, channels: usize) -> Vec<f32> {
    let mut buffer = vec![0.0f32; total_frames * channels];

    for clip in &track.clips {
        let end_frame = (clip.start_frame + clip.frames).min(total_frames);
        for frame_idx in clip.start_frame..end_frame {
            let Some(pos) = clip.source_position(frame_idx - clip.start_frame) else {
                break;
            };
            for (ch, gain) in track.gains.iter().enumerate().take(channels) {
                buffer[frame_idx * channels + ch] += clip.audio.sample_at(pos, ch) * gain;
            }
        }
    }
    buffer
}

/// Sum every scheduled track into one interleaved buffer of
/// `duration` seconds. Tracks render in parallel.
pub fn mix_schedule(schedule: &Schedule, duration: f64, sample_rate: u32, channels: u16) -> Vec<f32> {
    let total_frames = (duration.max(0.0) * sample_rate as f64).ceil() as usize;
    let channels = channels as usize;
    let len = total_frames * channels;

    schedule
        .tracks
        .par_iter()
        .map(|track| render_track(track, total_frames, channels))
        .reduce(
            || vec![0.0f32; len],
            |mut acc, track| {
                for (out, sample) in acc.iter_mut().zip(&track) {
                    *out += sample;
                }
                acc
            },
        )
}

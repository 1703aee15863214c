//! Nearest-neighbour sample rate conversion.
//!
//! Cheap enough to run inside the per-frame path. There is no band limiting,
//! so downsampling aliases; latency wins over fidelity here.

use std::borrow::Cow;

/// Convert `samples` captured at `source_rate` to `target_rate`.
///
/// Output sample `i` is the input sample nearest to `i * source_rate / target_rate`.
/// The output holds `round(len * target_rate / source_rate)` samples. Equal rates
/// (or a zero rate on either side) return the input as-is without copying.
///
/// A final position that rounds to one past the end repeats the last input
/// sample. It is not read as a missing value that would encode as silence (0).
pub fn resample(samples: &[f32], source_rate: u32, target_rate: u32) -> Cow<'_, [f32]> {
    if source_rate == target_rate || source_rate == 0 || target_rate == 0 {
        return Cow::Borrowed(samples);
    }
    if samples.is_empty() {
        return Cow::Owned(Vec::new());
    }

    let ratio = source_rate as f64 / target_rate as f64;
    let input_len = samples.len() as f64;
    let out_len = (input_len / ratio).round() as usize;
    let last = samples.len() - 1;

    let mut output = Vec::with_capacity(out_len);
    let mut cursor = 0.0_f64;
    while output.len() < out_len && cursor < input_len {
        // round() can land one past the end on the final step
        let idx = (cursor.round() as usize).min(last);
        output.push(samples[idx]);
        cursor += ratio;
    }

    Cow::Owned(output)
}

/// Average interleaved channels down to mono.
pub fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let ch = channels as usize;
    samples
        .chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_borrows_input() {
        let input = [0.1, 0.2, 0.3];
        let out = resample(&input, 16000, 16000);
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(&*out, &input);
    }

    #[test]
    fn downsample_by_three_takes_every_third_sample() {
        let input: Vec<f32> = (0..9).map(|i| i as f32).collect();
        let out = resample(&input, 48000, 16000);
        assert_eq!(&*out, &[0.0, 3.0, 6.0]);
    }

    #[test]
    fn upsample_by_two_repeats_nearest_sample() {
        let input = [0.0, 1.0, 2.0];
        let out = resample(&input, 8000, 16000);
        // cursor: 0, 0.5, 1.0, 1.5, 2.0, 2.5 -> round half away from zero
        assert_eq!(&*out, &[0.0, 1.0, 1.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn position_past_end_repeats_last_sample() {
        let input = [0.25, 0.75];
        let out = resample(&input, 16000, 32000);
        // final cursor 1.5 rounds to index 2
        assert_eq!(&*out, &[0.25, 0.75, 0.75, 0.75]);
        assert_ne!(out[3], 0.0);
    }

    #[test]
    fn empty_input_stays_empty() {
        assert!(resample(&[], 44100, 16000).is_empty());
    }

    #[test]
    fn zero_rate_is_passthrough() {
        let input = [0.5, -0.5];
        assert_eq!(&*resample(&input, 0, 16000), &input);
        assert_eq!(&*resample(&input, 48000, 0), &input);
    }

    #[test]
    fn downmix_averages_stereo() {
        let stereo = [1.0, 0.0, 0.5, 0.5, -1.0, 1.0];
        assert_eq!(downmix(&stereo, 2), vec![0.5, 0.5, 0.0]);
        assert_eq!(downmix(&stereo, 1), stereo.to_vec());
    }
}

use crate::error::{CaptureError, Result};

/// Number of samples a block of `input_len` samples becomes when converted
/// from `source_rate_hz` to `target_rate_hz`.
pub fn resampled_len(input_len: usize, source_rate_hz: u32, target_rate_hz: u32) -> usize {
    let ratio = f64::from(source_rate_hz) / f64::from(target_rate_hz);
    (input_len as f64 / ratio).round() as usize
}

/// Linear-interpolation resampler.
///
/// Output sample `i` reads the fractional source position `i * ratio` and
/// blends the two neighbouring input samples. The upper neighbour is clamped
/// to the last input sample, so the tail never reads past the block.
pub fn resample_linear(
    input: &[f32],
    source_rate_hz: u32,
    target_rate_hz: u32,
) -> Result<Vec<f32>> {
    if source_rate_hz == 0 {
        return Err(CaptureError::InvalidSampleRate(source_rate_hz));
    }
    if target_rate_hz == 0 {
        return Err(CaptureError::InvalidSampleRate(target_rate_hz));
    }

    if input.is_empty() {
        return Ok(Vec::new());
    }

    if source_rate_hz == target_rate_hz {
        return Ok(input.to_vec());
    }

    let ratio = f64::from(source_rate_hz) / f64::from(target_rate_hz);
    let output_length = resampled_len(input.len(), source_rate_hz, target_rate_hz);
    let last = input.len() - 1;

    let mut output = Vec::with_capacity(output_length);
    for index in 0..output_length {
        let position = index as f64 * ratio;
        let lower = (position.floor() as usize).min(last);
        let upper = (lower + 1).min(last);
        let weight = (position - lower as f64) as f32;
        let start = input[lower];
        output.push(start + (input[upper] - start) * weight);
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downsamples_48k_block_by_three() {
        let input = vec![0.0_f32; 4_096];
        let output = resample_linear(&input, 48_000, 16_000).expect("valid rates");
        assert_eq!(output.len(), 1_365);
        assert_eq!(output.len(), resampled_len(4_096, 48_000, 16_000));
    }

    #[test]
    fn output_length_rounds_to_nearest() {
        assert_eq!(resampled_len(4_096, 44_100, 16_000), 1_486);
        assert_eq!(resampled_len(10, 48_000, 16_000), 3);
        assert_eq!(resampled_len(11, 48_000, 16_000), 4);
        assert_eq!(resampled_len(3, 8_000, 16_000), 6);
    }

    #[test]
    fn constant_block_stays_constant() {
        for source in [22_050_u32, 44_100, 48_000, 96_000, 8_000] {
            let input = vec![0.37_f32; 4_096];
            let output = resample_linear(&input, source, 16_000).expect("valid rates");
            assert_eq!(output.len(), resampled_len(4_096, source, 16_000));
            assert!(output.iter().all(|sample| *sample == 0.37));
        }
    }

    #[test]
    fn interpolates_between_neighbours() {
        let input = [0.0_f32, 1.0, 0.0, -1.0];
        let output = resample_linear(&input, 16_000, 32_000).expect("valid rates");
        assert_eq!(output.len(), 8);
        assert_eq!(output[0], 0.0);
        assert_eq!(output[1], 0.5);
        assert_eq!(output[2], 1.0);
        assert_eq!(output[3], 0.5);
        assert_eq!(output[5], -0.5);
    }

    #[test]
    fn clamps_trailing_index_to_last_sample() {
        let input = [0.25_f32, 0.75];
        let output = resample_linear(&input, 16_000, 32_000).expect("valid rates");
        assert_eq!(output.len(), 4);
        assert_eq!(output[2], 0.75);
        assert_eq!(output[3], 0.75);
    }

    #[test]
    fn passes_through_matching_rates() {
        let input = vec![0.1_f32, -0.2, 0.3];
        let output = resample_linear(&input, 16_000, 16_000).expect("valid rates");
        assert_eq!(output, input);
    }

    #[test]
    fn rejects_zero_rates() {
        assert!(matches!(
            resample_linear(&[0.0; 4], 0, 16_000),
            Err(CaptureError::InvalidSampleRate(0))
        ));
        assert!(matches!(
            resample_linear(&[0.0; 4], 48_000, 0),
            Err(CaptureError::InvalidSampleRate(0))
        ));
    }

    #[test]
    fn empty_block_resamples_to_empty() {
        let output = resample_linear(&[], 48_000, 16_000).expect("valid rates");
        assert!(output.is_empty());
    }
}

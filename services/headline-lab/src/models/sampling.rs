//! Maps `SamplingParams` onto candle's `LogitsProcessor`: greedy when sampling
//! is off, otherwise top-k at temperature 1.

use super::SamplingParams;
use candle_transformers::generation::{LogitsProcessor, Sampling};

pub const TEMPERATURE: f64 = 1.0;

pub fn sampling_for(params: &SamplingParams) -> Sampling {
    match (params.do_sample, params.top_k) {
        (false, _) => Sampling::ArgMax,
        (true, 0) => Sampling::All { temperature: TEMPERATURE },
        (true, k) => Sampling::TopK { k, temperature: TEMPERATURE },
    }
}

/// Unseeded params draw a fresh seed per call.
pub fn logits_processor(params: &SamplingParams) -> LogitsProcessor {
    let seed = params.seed.unwrap_or_else(rand::random);
    LogitsProcessor::from_sampling(seed, sampling_for(params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{Device, Tensor};

    #[test]
    fn params_map_onto_candle_sampling() {
        assert!(matches!(sampling_for(&SamplingParams::headline()), Sampling::TopK { k: 50, temperature } if temperature == 1.0));
        let greedy = SamplingParams { do_sample: false, ..SamplingParams::headline() };
        assert!(matches!(sampling_for(&greedy), Sampling::ArgMax));
        let unbounded = SamplingParams { top_k: 0, ..SamplingParams::headline() };
        assert!(matches!(sampling_for(&unbounded), Sampling::All { .. }));
    }

    #[test]
    fn sampling_stays_inside_top_k() {
        let mut row = vec![0.0f32; 200];
        for (i, l) in row.iter_mut().enumerate().take(50) { *l = 10.0 + i as f32 * 0.01; }
        let logits = Tensor::new(row.as_slice(), &Device::Cpu).unwrap();
        let mut lp = logits_processor(&SamplingParams::headline().with_seed(Some(7)));
        for _ in 0..500 {
            assert!(lp.sample(&logits).unwrap() < 50);
        }
    }

    #[test]
    fn seeded_sampling_is_reproducible() {
        let row: Vec<f32> = (0..100).map(|i| (i % 7) as f32).collect();
        let logits = Tensor::new(row.as_slice(), &Device::Cpu).unwrap();
        let params = SamplingParams::headline().with_seed(Some(99));
        let (mut a, mut b) = (logits_processor(&params), logits_processor(&params));
        let xs: Vec<u32> = (0..20).map(|_| a.sample(&logits).unwrap()).collect();
        let ys: Vec<u32> = (0..20).map(|_| b.sample(&logits).unwrap()).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn greedy_picks_argmax() {
        let params = SamplingParams { do_sample: false, ..SamplingParams::headline() };
        let logits = Tensor::new(&[0.5f32, 2.0, 1.0], &Device::Cpu).unwrap();
        assert_eq!(logits_processor(&params).sample(&logits).unwrap(), 1);
    }
}

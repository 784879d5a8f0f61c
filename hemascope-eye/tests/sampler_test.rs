//! Property tests for frame sampling

use hemascope_eye::video::{sampling_step, FrameSampler, MemoryDecoder};
use image::RgbImage;
use proptest::prelude::*;

fn decoder(total: usize) -> MemoryDecoder {
    MemoryDecoder::new((0..total).map(|_| RgbImage::new(1, 1)).collect(), 30.0)
}

proptest! {
    #[test]
    fn prop_step_is_at_least_one(total in proptest::option::of(0u64..1_000_000), cap in 0usize..500) {
        prop_assert!(sampling_step(total, cap) >= 1);
    }

    #[test]
    fn prop_emitted_count(total in 0usize..400, cap in 1usize..120) {
        let step = sampling_step(Some(total as u64), cap) as usize;
        let emitted = FrameSampler::new(Box::new(decoder(total)), cap).count();
        let expected = ((total + step - 1) / step).min(cap);
        prop_assert_eq!(emitted, expected);
    }

    #[test]
    fn prop_indices_are_multiples_of_step(total in 1usize..400, cap in 1usize..120) {
        let sampler = FrameSampler::new(Box::new(decoder(total)), cap);
        let step = sampler.step();
        let indices: Vec<u64> = sampler.map(|f| f.source_index).collect();

        prop_assert!(indices.iter().all(|i| i % step == 0));
        prop_assert!(indices.windows(2).all(|w| w[1] == w[0] + step));
        prop_assert_eq!(indices.first().copied(), Some(0));
    }

    #[test]
    fn prop_unknown_length_emits_prefix(total in 0usize..200, cap in 1usize..60) {
        let sampler = FrameSampler::new(Box::new(decoder(total).with_unknown_length()), cap);
        let indices: Vec<u64> = sampler.map(|f| f.source_index).collect();
        let expected: Vec<u64> = (0..total.min(cap) as u64).collect();
        prop_assert_eq!(indices, expected);
    }
}

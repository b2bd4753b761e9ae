use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::DynamicImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use gaugeread::{
    detect_needle, locate_circle, AnalogGaugeProcessor, CircleLocatorConfig, GaugeCalibration,
    NeedleDetectorConfig, SyntheticGauge,
};

fn noisy_gauges(n: usize) -> Vec<SyntheticGauge> {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    (0..n)
        .map(|_| SyntheticGauge {
            width: 640,
            height: 480,
            center: [rng.gen_range(260.0..380.0), rng.gen_range(200.0..280.0)],
            radius: rng.gen_range(140.0..180.0),
            needle_math_deg: rng.gen_range(0.0..360.0),
            noise_sigma: 4.0,
            seed: rng.gen(),
            ..SyntheticGauge::default()
        })
        .collect()
}

fn bench_hotpaths(c: &mut Criterion) {
    let gauges = noisy_gauges(4);
    let images: Vec<_> = gauges.iter().map(SyntheticGauge::render).collect();

    let circle_cfg = CircleLocatorConfig::default();
    c.bench_function("circle_locate_640x480", |b| {
        b.iter(|| {
            for img in &images {
                black_box(locate_circle(black_box(img), &circle_cfg).ok());
            }
        })
    });

    let needle_cfg = NeedleDetectorConfig::default();
    c.bench_function("needle_scan", |b| {
        b.iter(|| {
            for (g, img) in gauges.iter().zip(&images) {
                black_box(detect_needle(black_box(img), &g.circle(), &needle_cfg).ok());
            }
        })
    });

    let processor = AnalogGaugeProcessor::default();
    let calibration = GaugeCalibration::default();
    let dyn_images: Vec<_> = images
        .iter()
        .map(|img| DynamicImage::ImageLuma8(img.clone()))
        .collect();
    c.bench_function("full_pipeline", |b| {
        b.iter(|| {
            for img in &dyn_images {
                black_box(processor.process(black_box(img), &calibration, None).ok());
            }
        })
    });
}

criterion_group!(benches, bench_hotpaths);
criterion_main!(benches);

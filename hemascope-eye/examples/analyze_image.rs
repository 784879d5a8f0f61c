//! Run the detector over a single image and print a per-class summary
//!
//! ```text
//! cargo run -p hemascope-eye --example analyze_image -- smear.jpg [threshold]
//! ```

use hemascope_core::HemascopeConfig;
use hemascope_eye::{load_model, VideoPipeline};
use std::collections::BTreeMap;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let path = args.next().ok_or("usage: analyze_image <image> [threshold]")?;
    let threshold: f32 = match args.next() {
        Some(raw) => raw.parse()?,
        None => 0.5,
    };

    let config = HemascopeConfig::from_env();
    let model = load_model(&config.model, config.detection.input_size);
    if let Some(reason) = model.status.reason() {
        eprintln!("warning: {}", reason);
    }

    let pipeline = VideoPipeline::from_config(&config, &model)?;
    let bytes = std::fs::read(&path)?;
    let analysis = pipeline.process_image(&bytes, threshold)?;

    let mut per_class: BTreeMap<&str, usize> = BTreeMap::new();
    for detection in &analysis.detections {
        *per_class.entry(detection.class_name.as_str()).or_default() += 1;
    }

    let [width, height] = analysis.original_image_size;
    println!("{} ({}x{}): {} detections", path, width, height, analysis.total_detections);
    for (class, count) in per_class {
        println!("  {:<10} {}", class, count);
    }

    Ok(())
}

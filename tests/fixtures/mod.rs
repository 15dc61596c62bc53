//! Canned payloads for queue and worker tests.

use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Minimal bytes that sniff as a JPEG.
pub fn sample_jpeg() -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
    bytes.extend(std::iter::repeat(0u8).take(100));
    bytes
}

/// Minimal bytes that sniff as a PNG.
pub fn sample_png() -> Vec<u8> {
    let mut bytes = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.extend(std::iter::repeat(0u8).take(100));
    bytes
}

pub fn ground_truth_json(brand: &str, abv: f64) -> String {
    serde_json::json!({
        "brand_name": brand,
        "class_type": "Wine",
        "abv": abv,
        "net_contents": "750 mL"
    })
    .to_string()
}

/// Build an in-memory ZIP archive with the given entries.
pub fn build_zip(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for (name, data) in entries {
        writer.start_file(*name, options).expect("start zip entry");
        writer.write_all(data).expect("write zip entry");
    }

    writer.finish().expect("finish zip").into_inner()
}

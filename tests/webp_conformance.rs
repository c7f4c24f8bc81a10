//! Reference fixture tests.
//!
//! Every `name.webp` under `$WEBP_FIXTURES_DIR` that has a sibling
//! `name.png` (as written by `dwebp -png`) is decoded and compared against
//! the PNG. Run with: `WEBP_FIXTURES_DIR=... cargo test --test webp_conformance -- --ignored`
#![cfg(not(target_arch = "wasm32"))]

use std::fs;
use std::path::{Path, PathBuf};

use webp_still::WebPDecoder;

fn fixtures_dir() -> Option<PathBuf> {
    let dir = PathBuf::from(std::env::var_os("WEBP_FIXTURES_DIR")?);
    dir.is_dir().then_some(dir)
}

/// Reads a PNG reference as RGBA.
fn read_png_rgba(path: &Path) -> Option<(Vec<u8>, u32, u32)> {
    let file = fs::File::open(path).ok()?;
    let mut decoder = png::Decoder::new(file);
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder.read_info().ok()?;
    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buf).ok()?;
    let buf = &buf[..info.buffer_size()];

    let rgba = match info.color_type {
        png::ColorType::Rgba => buf.to_vec(),
        png::ColorType::Rgb => buf
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], 255])
            .collect(),
        png::ColorType::GrayscaleAlpha => buf
            .chunks_exact(2)
            .flat_map(|p| [p[0], p[0], p[0], p[1]])
            .collect(),
        png::ColorType::Grayscale => buf.iter().flat_map(|&g| [g, g, g, 255]).collect(),
        png::ColorType::Indexed => return None,
    };
    Some((rgba, info.width, info.height))
}

fn webp_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .expect("Failed to read fixtures directory")
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("webp"))
        .collect();
    files.sort();
    files
}

#[test]
#[ignore]
fn test_webp_matches_png_references() {
    let Some(dir) = fixtures_dir() else {
        eprintln!("Skipping: set WEBP_FIXTURES_DIR to a directory of .webp/.png pairs");
        return;
    };

    let mut tested = 0;
    let mut failures = Vec::new();

    for path in webp_files(&dir) {
        let Some((expected, ref_width, ref_height)) = read_png_rgba(&path.with_extension("png"))
        else {
            continue;
        };
        tested += 1;

        let data = fs::read(&path).expect("Failed to read WebP file");
        let mut decoder = match WebPDecoder::new(&data) {
            Ok(decoder) => decoder,
            Err(e) => {
                failures.push(format!("{}: header parse error: {}", path.display(), e));
                continue;
            }
        };

        if decoder.dimensions() != (ref_width, ref_height) {
            failures.push(format!(
                "{}: dimensions {:?}, reference {}x{}",
                path.display(),
                decoder.dimensions(),
                ref_width,
                ref_height
            ));
            continue;
        }

        let mut output = vec![0u8; decoder.output_buffer_size().unwrap()];
        if let Err(e) = decoder.read_image(&mut output) {
            failures.push(format!("{}: decode error: {}", path.display(), e));
            continue;
        }

        let max_diff = output
            .iter()
            .zip(&expected)
            .map(|(&a, &b)| a.abs_diff(b))
            .max()
            .unwrap_or(0);
        if max_diff != 0 {
            failures.push(format!("{}: max channel difference {}", path.display(), max_diff));
        }
    }

    if tested == 0 {
        eprintln!("No .webp/.png pairs found in {}", dir.display());
        return;
    }

    println!(
        "WebP reference test: {}/{} files match",
        tested - failures.len(),
        tested
    );
    assert!(failures.is_empty(), "mismatches:\n{}", failures.join("\n"));
}

#[test]
#[ignore]
fn test_webp_fixtures_decode_without_panic() {
    let Some(dir) = fixtures_dir() else {
        eprintln!("Skipping: WEBP_FIXTURES_DIR not set");
        return;
    };

    let mut crashed = 0;
    for path in webp_files(&dir) {
        let data = match fs::read(&path) {
            Ok(d) => d,
            Err(_) => continue,
        };

        // Ok or Err are both acceptable; panics are not
        if std::panic::catch_unwind(|| {
            let _ = webp_still::decode_rgba(&data);
        })
        .is_err()
        {
            crashed += 1;
            eprintln!("CRASH: {}", path.display());
        }
    }
    assert_eq!(crashed, 0);
}

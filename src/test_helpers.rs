//! Shared test utilities for the lowres-sync test suite.
//!
//! Provides synthetic JPEG writers, a byte-level EXIF builder (so extractor
//! tests don't depend on binary fixtures), and a helper that lays out a
//! source tree from a compact description.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! write_tree(tmp.path(), &[("A/1.jpg", 50, 50), ("A/B/2.jpg", 80, 60)]);
//!
//! let exif = ExifFixture {
//!     make: Some("Canon"),
//!     aperture_apex: Some((4, 1)),
//!     ..ExifFixture::default()
//! };
//! create_jpeg_with_exif(&tmp.path().join("c.jpg"), 32, 24, &exif);
//! ```

use image::{ImageEncoder, RgbImage};
use std::path::Path;

// =========================================================================
// JPEG writers
// =========================================================================

fn encode_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut bytes = Vec::new();
    image::codecs::jpeg::JpegEncoder::new(&mut bytes)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
    bytes
}

/// Create a small valid JPEG file with the given dimensions.
pub fn create_test_jpeg(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, encode_jpeg(width, height)).unwrap();
}

/// Create a JPEG carrying an APP1 EXIF segment built from `exif`.
pub fn create_jpeg_with_exif(path: &Path, width: u32, height: u32, exif: &ExifFixture) {
    let jpeg = encode_jpeg(width, height);
    let tiff = exif.build_tiff();

    let mut app1 = Vec::new();
    app1.extend_from_slice(b"Exif\0\0");
    app1.extend_from_slice(&tiff);
    let seg_len = (app1.len() + 2) as u16;

    // SOI, then APP1, then the rest of the encoded stream
    let mut out = Vec::with_capacity(jpeg.len() + app1.len() + 4);
    out.extend_from_slice(&jpeg[..2]);
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&seg_len.to_be_bytes());
    out.extend_from_slice(&app1);
    out.extend_from_slice(&jpeg[2..]);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, out).unwrap();
}

/// Lay out JPEGs under `root`: each entry is `(relative path, width, height)`.
pub fn write_tree(root: &Path, files: &[(&str, u32, u32)]) {
    for (rel, w, h) in files {
        create_test_jpeg(&root.join(rel), *w, *h);
    }
}

// =========================================================================
// EXIF builder
// =========================================================================

/// Tags to embed in a synthetic EXIF block. `None` fields are omitted.
#[derive(Debug, Default, Clone)]
pub struct ExifFixture {
    pub make: Option<&'static str>,
    pub model: Option<&'static str>,
    pub software: Option<&'static str>,
    pub date_time: Option<&'static str>,
    pub date_time_original: Option<&'static str>,
    pub iso: Option<u16>,
    pub focal_length: Option<(u32, u32)>,
    pub aperture_apex: Option<(u32, u32)>,
    pub shutter_apex: Option<(i32, i32)>,
}

const ASCII: u16 = 2;
const SHORT: u16 = 3;
const LONG: u16 = 4;
const RATIONAL: u16 = 5;
const SRATIONAL: u16 = 10;

struct Entry {
    tag: u16,
    typ: u16,
    count: u32,
    data: Vec<u8>,
}

impl Entry {
    fn ascii(tag: u16, s: &str) -> Self {
        let mut data = s.as_bytes().to_vec();
        data.push(0);
        Self {
            tag,
            typ: ASCII,
            count: data.len() as u32,
            data,
        }
    }

    fn short(tag: u16, v: u16) -> Self {
        Self {
            tag,
            typ: SHORT,
            count: 1,
            data: v.to_le_bytes().to_vec(),
        }
    }

    fn long(tag: u16, v: u32) -> Self {
        Self {
            tag,
            typ: LONG,
            count: 1,
            data: v.to_le_bytes().to_vec(),
        }
    }

    fn rational(tag: u16, (n, d): (u32, u32)) -> Self {
        let mut data = n.to_le_bytes().to_vec();
        data.extend_from_slice(&d.to_le_bytes());
        Self {
            tag,
            typ: RATIONAL,
            count: 1,
            data,
        }
    }

    fn srational(tag: u16, (n, d): (i32, i32)) -> Self {
        let mut data = n.to_le_bytes().to_vec();
        data.extend_from_slice(&d.to_le_bytes());
        Self {
            tag,
            typ: SRATIONAL,
            count: 1,
            data,
        }
    }

    /// Bytes this entry needs in the IFD's data area (0 if stored inline).
    fn external_len(&self) -> usize {
        if self.data.len() <= 4 {
            0
        } else {
            self.data.len() + self.data.len() % 2
        }
    }
}

fn ifd_len(entries: &[Entry]) -> usize {
    2 + 12 * entries.len() + 4 + entries.iter().map(Entry::external_len).sum::<usize>()
}

/// Append an IFD at the current end of `buf` (which is its TIFF offset).
fn write_ifd(buf: &mut Vec<u8>, entries: &[Entry]) {
    let start = buf.len();
    let mut data_offset = start + 2 + 12 * entries.len() + 4;
    let mut data_area = Vec::new();

    buf.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    for e in entries {
        buf.extend_from_slice(&e.tag.to_le_bytes());
        buf.extend_from_slice(&e.typ.to_le_bytes());
        buf.extend_from_slice(&e.count.to_le_bytes());
        if e.data.len() <= 4 {
            let mut inline = e.data.clone();
            inline.resize(4, 0);
            buf.extend_from_slice(&inline);
        } else {
            buf.extend_from_slice(&(data_offset as u32).to_le_bytes());
            data_area.extend_from_slice(&e.data);
            if e.data.len() % 2 == 1 {
                data_area.push(0);
            }
            data_offset += e.external_len();
        }
    }
    buf.extend_from_slice(&0u32.to_le_bytes()); // no next IFD
    buf.extend_from_slice(&data_area);
}

impl ExifFixture {
    /// Serialize to a little-endian TIFF structure: IFD0 with the camera
    /// tags plus a pointer to an Exif sub-IFD with the exposure tags.
    pub fn build_tiff(&self) -> Vec<u8> {
        let mut ifd0 = Vec::new();
        if let Some(v) = self.make {
            ifd0.push(Entry::ascii(0x010F, v));
        }
        if let Some(v) = self.model {
            ifd0.push(Entry::ascii(0x0110, v));
        }
        if let Some(v) = self.software {
            ifd0.push(Entry::ascii(0x0131, v));
        }
        if let Some(v) = self.date_time {
            ifd0.push(Entry::ascii(0x0132, v));
        }

        let mut exif = Vec::new();
        if let Some(v) = self.iso {
            exif.push(Entry::short(0x8827, v));
        }
        if let Some(v) = self.date_time_original {
            exif.push(Entry::ascii(0x9003, v));
        }
        if let Some(v) = self.shutter_apex {
            exif.push(Entry::srational(0x9201, v));
        }
        if let Some(v) = self.aperture_apex {
            exif.push(Entry::rational(0x9202, v));
        }
        if let Some(v) = self.focal_length {
            exif.push(Entry::rational(0x920A, v));
        }

        let mut buf = Vec::new();
        buf.extend_from_slice(b"II");
        buf.extend_from_slice(&42u16.to_le_bytes());
        buf.extend_from_slice(&8u32.to_le_bytes());

        if exif.is_empty() {
            write_ifd(&mut buf, &ifd0);
        } else {
            // Pointer entry is inline, so adding it doesn't change the data area
            ifd0.push(Entry::long(0x8769, 0));
            let exif_offset = 8 + ifd_len(&ifd0);
            ifd0.pop();
            ifd0.push(Entry::long(0x8769, exif_offset as u32));
            write_ifd(&mut buf, &ifd0);
            debug_assert_eq!(buf.len(), exif_offset);
            write_ifd(&mut buf, &exif);
        }
        buf
    }
}

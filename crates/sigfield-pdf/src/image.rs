use std::io::Write;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::error::PdfEmbedError;

const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// A decoded signature image, normalized to 8-bit RGB with an optional
/// alpha channel. PNG is the only accepted input format.
#[derive(Debug, Clone)]
pub struct SignatureImage {
    pub width: u32,
    pub height: u32,
    rgb: Vec<u8>,
    alpha: Option<Vec<u8>>,
}

impl SignatureImage {
    pub fn from_png(bytes: &[u8]) -> Result<Self, PdfEmbedError> {
        if !bytes.starts_with(&PNG_MAGIC) {
            return Err(PdfEmbedError::Image("not a PNG image".to_string()));
        }

        let mut decoder = png::Decoder::new(bytes);
        decoder.set_transformations(png::Transformations::normalize_to_color8());
        let mut reader = decoder
            .read_info()
            .map_err(|e| PdfEmbedError::Image(e.to_string()))?;
        let mut buf = vec![0u8; reader.output_buffer_size()];
        let info = reader
            .next_frame(&mut buf)
            .map_err(|e| PdfEmbedError::Image(e.to_string()))?;
        buf.truncate(info.buffer_size());

        if info.width == 0 || info.height == 0 {
            return Err(PdfEmbedError::Image("image has zero dimensions".to_string()));
        }

        let (rgb, alpha) = match info.color_type {
            png::ColorType::Rgb => (buf, None),
            png::ColorType::Rgba => {
                let pixels = buf.len() / 4;
                let mut rgb = Vec::with_capacity(pixels * 3);
                let mut alpha = Vec::with_capacity(pixels);
                for px in buf.chunks_exact(4) {
                    rgb.extend_from_slice(&px[..3]);
                    alpha.push(px[3]);
                }
                (rgb, Some(alpha))
            }
            png::ColorType::Grayscale => {
                let mut rgb = Vec::with_capacity(buf.len() * 3);
                for &g in &buf {
                    rgb.extend_from_slice(&[g, g, g]);
                }
                (rgb, None)
            }
            png::ColorType::GrayscaleAlpha => {
                let pixels = buf.len() / 2;
                let mut rgb = Vec::with_capacity(pixels * 3);
                let mut alpha = Vec::with_capacity(pixels);
                for px in buf.chunks_exact(2) {
                    rgb.extend_from_slice(&[px[0], px[0], px[0]]);
                    alpha.push(px[1]);
                }
                (rgb, Some(alpha))
            }
            other => {
                return Err(PdfEmbedError::Image(format!(
                    "unsupported PNG color type {:?}",
                    other
                )))
            }
        };

        Ok(Self {
            width: info.width,
            height: info.height,
            rgb,
            alpha,
        })
    }

    /// Decodes a `data:image/png;base64,...` URL as captured by signature pads.
    pub fn from_data_url(url: &str) -> Result<Self, PdfEmbedError> {
        let payload = url
            .strip_prefix("data:")
            .and_then(|rest| rest.split_once(";base64,"))
            .map(|(_, b64)| b64)
            .ok_or_else(|| PdfEmbedError::Image("unsupported data URL".to_string()))?;
        let bytes = BASE64
            .decode(payload.trim())
            .map_err(|e| PdfEmbedError::Image(format!("invalid base64 image: {}", e)))?;
        Self::from_png(&bytes)
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    pub fn has_alpha(&self) -> bool {
        self.alpha.is_some()
    }

    /// Register the image as a Flate-compressed RGB XObject, with the
    /// alpha channel attached as a DeviceGray SMask when present.
    pub(crate) fn add_to_document(&self, doc: &mut Document) -> Result<ObjectId, PdfEmbedError> {
        let mut dict = self.xobject_dict(b"DeviceRGB");

        if let Some(alpha) = &self.alpha {
            let smask = Stream::new(self.xobject_dict(b"DeviceGray"), deflate(alpha)?);
            let smask_id = doc.add_object(smask);
            dict.set("SMask", Object::Reference(smask_id));
        }

        Ok(doc.add_object(Stream::new(dict, deflate(&self.rgb)?)))
    }

    fn xobject_dict(&self, color_space: &[u8]) -> Dictionary {
        let mut dict = Dictionary::new();
        dict.set("Type", Object::Name(b"XObject".to_vec()));
        dict.set("Subtype", Object::Name(b"Image".to_vec()));
        dict.set("Width", Object::Integer(self.width as i64));
        dict.set("Height", Object::Integer(self.height as i64));
        dict.set("ColorSpace", Object::Name(color_space.to_vec()));
        dict.set("BitsPerComponent", Object::Integer(8));
        dict.set("Filter", Object::Name(b"FlateDecode".to_vec()));
        dict
    }
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, PdfEmbedError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

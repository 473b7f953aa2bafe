//! Content-encoding negotiation and payload compression.

use std::io::{self, Cursor, Write};

use flate2::{Compression, write::GzEncoder};

const BROTLI_QUALITY: i32 = 11;
const BROTLI_WINDOW: i32 = 22;

/// Encodings the server can produce, in fixed preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentEncoding {
    Brotli,
    Gzip,
    Identity,
}

impl ContentEncoding {
    /// Pick the best encoding the client accepts: brotli, then gzip, then none.
    pub fn negotiate(accept_encoding: Option<&str>) -> Self {
        let Some(header) = accept_encoding else {
            return Self::Identity;
        };

        let mut brotli = false;
        let mut gzip = false;
        for token in header.split(',') {
            let mut parts = token.split(';');
            let name = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
            let rejected = parts.any(|param| {
                param
                    .trim()
                    .strip_prefix("q=")
                    .and_then(|q| q.trim().parse::<f32>().ok())
                    .is_some_and(|q| q <= 0.0)
            });
            if rejected {
                continue;
            }
            match name.as_str() {
                "br" => brotli = true,
                "gzip" | "x-gzip" => gzip = true,
                "*" => {
                    brotli = true;
                    gzip = true;
                }
                _ => {}
            }
        }

        if brotli {
            Self::Brotli
        } else if gzip {
            Self::Gzip
        } else {
            Self::Identity
        }
    }

    /// Value for the `Content-Encoding` header; `None` for identity.
    pub fn header_value(self) -> Option<&'static str> {
        match self {
            Self::Brotli => Some("br"),
            Self::Gzip => Some("gzip"),
            Self::Identity => None,
        }
    }
}

/// Compress `body` with the given encoding. Identity returns a copy.
pub fn compress(body: &[u8], encoding: ContentEncoding) -> io::Result<Vec<u8>> {
    match encoding {
        ContentEncoding::Gzip => {
            let buffer = Vec::with_capacity(body.len() / 2);
            let mut encoder = GzEncoder::new(buffer, Compression::default());
            encoder.write_all(body)?;
            encoder.finish()
        }
        ContentEncoding::Brotli => {
            let mut compressed = Vec::with_capacity(body.len() / 2);
            let params = brotli::enc::BrotliEncoderParams {
                quality: BROTLI_QUALITY,
                lgwin: BROTLI_WINDOW,
                ..Default::default()
            };
            let mut input = Cursor::new(body);
            brotli::BrotliCompress(&mut input, &mut compressed, &params)?;
            Ok(compressed)
        }
        ContentEncoding::Identity => Ok(body.to_vec()),
    }
}

/// Whether a MIME essence belongs to the compressible set (text, script,
/// structured data, vector image, markup).
pub fn is_compressible(mime: &str) -> bool {
    let essence = mime.split(';').next().unwrap_or_default().trim();
    if essence.starts_with("text/") {
        return true;
    }
    matches!(
        essence,
        "application/javascript"
            | "application/x-javascript"
            | "application/ecmascript"
            | "application/json"
            | "application/ld+json"
            | "application/manifest+json"
            | "application/xml"
            | "application/xhtml+xml"
            | "application/rss+xml"
            | "application/atom+xml"
            | "image/svg+xml"
    )
}

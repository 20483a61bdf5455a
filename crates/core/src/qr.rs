//! QR rendering for payment links.

use anyhow::{Context, Result};
use base64::prelude::*;
use qrcode::render::svg;
use qrcode::{EcLevel, QrCode};

/// Smallest rendered edge, in pixels.
pub const MIN_QR_DIMENSION: u32 = 200;

/// Render `data` as a standalone SVG document, black on white with a quiet zone.
pub fn render_svg(data: &str, size: u32) -> Result<String> {
    let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::M)
        .context("failed to encode QR data")?;
    let size = size.max(MIN_QR_DIMENSION);
    Ok(code
        .render::<svg::Color>()
        .min_dimensions(size, size)
        .quiet_zone(true)
        .dark_color(svg::Color("#000000"))
        .light_color(svg::Color("#FFFFFF"))
        .build())
}

/// `data:` URI suitable for an `<img src>` attribute.
pub fn render_svg_data_uri(data: &str, size: u32) -> Result<String> {
    let svg = render_svg(data, size)?;
    Ok(format!(
        "data:image/svg+xml;base64,{}",
        BASE64_STANDARD.encode(svg.as_bytes())
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_svg_document() {
        let svg = render_svg("https://pay.example.com/pay/abc?amount=1", 0).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("#000000"));
    }

    #[test]
    fn data_uri_is_base64_svg() {
        let uri = render_svg_data_uri("hello", 256).unwrap();
        let body = uri.strip_prefix("data:image/svg+xml;base64,").unwrap();
        let decoded = BASE64_STANDARD.decode(body).unwrap();
        assert!(String::from_utf8(decoded).unwrap().contains("<svg"));
    }
}

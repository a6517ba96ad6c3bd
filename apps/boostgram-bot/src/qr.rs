use anyhow::Result;
use image::Luma;
use qrcode::QrCode;

/// Renders a UPI deep-link QR as in-memory PNG bytes. The amount is fixed in
/// the link so the payer's app pre-fills it.
pub fn upi_qr_png(upi_id: &str, payee_name: &str, amount: f64, order_id: &str) -> Result<Vec<u8>> {
    let link = format!(
        "upi://pay?pa={}&pn={}&am={:.2}&cu=INR&tn=Order{}",
        urlencoding::encode(upi_id),
        urlencoding::encode(payee_name),
        amount,
        order_id
    );

    let code = QrCode::new(link.as_bytes())?;
    let rendered = code
        .render::<Luma<u8>>()
        .min_dimensions(512, 512)
        .build();

    let mut png = Vec::new();
    image::DynamicImage::ImageLuma8(rendered)
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)?;
    Ok(png)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_a_png() {
        let png = upi_qr_png("shop@upi", "Boostgram", 70.0, "77_1700000000").unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }
}

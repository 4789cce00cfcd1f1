use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{ImageFormat, RgbImage};
use vlm_chat_model::{ErrorKind, ImageHandle};

use crate::Error;

/// Encodes the image as a PNG `data:` URL.
pub fn png_data_url(image: &ImageHandle) -> Result<String, Error> {
    let buffer = RgbImage::from_raw(
        image.width(),
        image.height(),
        image.pixels().to_vec(),
    )
    .ok_or_else(|| {
        Error::new("pixels don't match the image size", ErrorKind::InvalidInput)
    })?;

    let mut png = Vec::new();
    buffer
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|err| {
            let message = format!("failed to encode image: {err}");
            Error::new(message, ErrorKind::Other)
        })?;
    trace!("encoded a {}x{} image", image.width(), image.height());

    Ok(format!("data:{};base64,{}", mime::IMAGE_PNG, STANDARD.encode(png)))
}

//! Image attachments and their conversion into model images.

use std::fmt::{self, Debug, Display, Formatter};

use bytes::Bytes;
use image::ImageFormat;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use vlm_chat_model::ImageHandle;

/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The attachment has no data.
    Empty,
    /// The data is not in a format we can decode.
    UnsupportedFormat,
    /// The data looked like an image but failed to decode.
    Malformed,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Empty => write!(f, "Empty image"),
            ErrorKind::UnsupportedFormat => write!(f, "Unsupported format"),
            ErrorKind::Malformed => write!(f, "Malformed image"),
        }
    }
}

/// Describes an image conversion error.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    source: Option<image::ImageError>,
}

impl Error {
    #[inline]
    pub(crate) fn new(kind: ErrorKind) -> Self {
        Self { kind, source: None }
    }

    /// Returns the kind of this error.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}: {source}", self.kind),
            None => Display::fmt(&self.kind, f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|err| err as &(dyn std::error::Error + 'static))
    }
}

/// An image picked by the user, still in its encoded form.
///
/// The data is reference-counted, so attachments are cheap to clone into
/// messages and snapshots.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ImageAttachment {
    data: Bytes,
}

impl ImageAttachment {
    /// Creates an attachment from encoded image data (PNG, JPEG, ...).
    #[inline]
    pub fn new<B: Into<Bytes>>(data: B) -> Self {
        Self { data: data.into() }
    }

    /// Returns the encoded data.
    #[inline]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Guesses the format from the data's magic bytes.
    #[inline]
    pub fn format(&self) -> Option<ImageFormat> {
        image::guess_format(&self.data).ok()
    }

    /// Decodes the attachment into the representation models consume.
    pub fn to_model_image(&self) -> Result<ImageHandle, Error> {
        if self.data.is_empty() {
            return Err(Error::new(ErrorKind::Empty));
        }
        let Some(format) = self.format() else {
            return Err(Error::new(ErrorKind::UnsupportedFormat));
        };

        let decoded = image::load_from_memory_with_format(&self.data, format)
            .map_err(|err| {
                let kind = match err {
                    image::ImageError::Unsupported(_) => {
                        ErrorKind::UnsupportedFormat
                    }
                    _ => ErrorKind::Malformed,
                };
                Error {
                    kind,
                    source: Some(err),
                }
            })?;
        let rgb = decoded.into_rgb8();
        let (width, height) = rgb.dimensions();
        ImageHandle::from_rgb8(width, height, rgb.into_raw())
            .ok_or_else(|| Error::new(ErrorKind::Malformed))
    }
}

impl Debug for ImageAttachment {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageAttachment")
            .field("len", &self.data.len())
            .field("format", &self.format())
            .finish()
    }
}

impl Serialize for ImageAttachment {
    fn serialize<S: Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mime_type = self.format().map(|format| format.to_mime_type());
        let mut s = serializer.serialize_struct("ImageAttachment", 2)?;
        s.serialize_field("mime_type", &mime_type)?;
        s.serialize_field("byte_len", &self.data.len())?;
        s.end()
    }
}

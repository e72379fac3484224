//! Lossless RGBA codec tuned for game-UI art: large flat regions and
//! sharp edges. Each tile of the raster picks a spatial predictor and a
//! reversible color transform; the residuals are entropy coded by a bank
//! of Huffman coders selected per pixel by a chaos metric over recently
//! coded residuals, with a shortcut symbol for recently repeated tuples.
//!
//! Pixels claimed by the dominant-color mask or the 2-D LZ matcher are
//! skipped entirely; those subsystems are external and reach the core
//! through the [`mask`] traits.

#![forbid(unsafe_code)]

pub mod bitio;
pub mod chaos;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod estimator;
pub mod filters;
pub mod huffman;
pub mod mask;
pub mod rgba;
pub mod tilemap;

pub use decoder::{decode, decode_into, DecoderConfig};
pub use encoder::{encode, EncoderConfig};
pub use error::{DecodeError, EncodeError};
pub use mask::{BitmapMask, DominantMask, LzOracle, NoLz, NoMask};
pub use rgba::RgbaImage;

/// Encode with no mask or LZ coverage and default settings.
pub fn encode_rgba(img: &RgbaImage) -> Result<Vec<u8>, EncodeError> {
    encode(img, &NoMask, &NoLz, &EncoderConfig::default())
}

/// Decode a stream produced by [`encode_rgba`]. Dimensions come from the
/// surrounding container.
pub fn decode_rgba(data: &[u8], width: u32, height: u32) -> Result<RgbaImage, DecodeError> {
    decode(data, width, height, &NoMask, &NoLz, &DecoderConfig::default())
}

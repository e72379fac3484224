//! Single-pass decoder: rebuilds the Huffman tables, then raster-scans,
//! decoding each pixel through the same chaos context and recent-symbol
//! ring evolution the encoder ran.

use tracing::debug;

use crate::bitio::BitReader;
use crate::chaos::{ChaosContext, RecentRing, NUM_Y_SYMS, PLANES};
use crate::encoder::DESYNC_MAGIC;
use crate::error::DecodeError;
use crate::filters::{Neighbors, CF_COUNT, SF_COUNT, SPATIAL_FILTERS, YUV_TO_RGB};
use crate::huffman::HuffmanDecoder;
use crate::mask::{DominantMask, LzOracle};
use crate::rgba::RgbaImage;
use crate::tilemap::FilterMap;

#[derive(Debug, Clone, Default)]
pub struct DecoderConfig {
    /// Must match the encoder's setting; marker words are consumed and
    /// verified at the same table boundaries they were written.
    pub desync_checks: bool,
}

fn check_desync(
    r: &mut BitReader,
    on: bool,
    context: &'static str,
) -> Result<(), DecodeError> {
    if on && r.read_word()? != DESYNC_MAGIC {
        return Err(DecodeError::Desync { context });
    }
    Ok(())
}

pub fn decode<M: DominantMask, L: LzOracle>(
    data: &[u8],
    width: u32,
    height: u32,
    mask: &M,
    lz: &L,
    config: &DecoderConfig,
) -> Result<RgbaImage, DecodeError> {
    let mut img = RgbaImage::new(width, height);
    decode_into(data, &mut img, mask, lz, config)?;
    Ok(img)
}

/// Decode into a caller-owned raster. The image dimensions select the
/// raster geometry; tile counts are rounded up, so any size works.
pub fn decode_into<M: DominantMask, L: LzOracle>(
    data: &[u8],
    img: &mut RgbaImage,
    mask: &M,
    lz: &L,
    config: &DecoderConfig,
) -> Result<(), DecodeError> {
    let (width, height) = (img.width, img.height);
    let need = (width * height * 4) as usize;
    if img.pixels.len() != need {
        return Err(DecodeError::BadOutputSize {
            got: img.pixels.len(),
            need,
        });
    }

    let mut r = BitReader::new(data);

    let tile_bits = r.read_bits(3)? as u32 + 1;
    let sf_count = r.read_bits(5)? as usize + 1;
    let mut sf_ids = Vec::with_capacity(sf_count);
    for _ in 0..sf_count {
        let id = r.read_bits(7)? as u8;
        if id as usize >= SF_COUNT {
            return Err(DecodeError::BadFilterId {
                id,
                max: SF_COUNT as u8,
            });
        }
        sf_ids.push(id);
    }
    check_desync(&mut r, config.desync_checks, "filter ids")?;

    let sf_dec = HuffmanDecoder::read_table(sf_count, &mut r)?;
    check_desync(&mut r, config.desync_checks, "sf table")?;
    let cf_dec = HuffmanDecoder::read_table(CF_COUNT, &mut r)?;
    check_desync(&mut r, config.desync_checks, "cf table")?;

    let chaos_levels = r.read_bits(4)? as u8 + 1;
    let levels = chaos_levels as usize;
    let mut coders: Vec<Vec<HuffmanDecoder>> = (0..PLANES).map(|_| Vec::new()).collect();
    for _level in 0..levels {
        for (p, coder_row) in coders.iter_mut().enumerate() {
            let syms = if p == 0 { NUM_Y_SYMS } else { 256 };
            coder_row.push(HuffmanDecoder::read_table(syms, &mut r)?);
            check_desync(&mut r, config.desync_checks, "plane table")?;
        }
    }

    let mut map = FilterMap::new(width, height, tile_bits);
    let mut ctx = ChaosContext::new(chaos_levels, width);
    let mut ring = RecentRing::new();
    let tile_mask = (1u32 << tile_bits) - 1;
    let mask_color = mask.color();
    let (mut fresh, mut matched, mut skipped) = (0u64, 0u64, 0u64);

    for y in 0..height {
        // row bitmap fast path; an empty slice defers to the per-pixel oracle
        let row_mask = mask.next_scanline(y);
        for x in 0..width {
            if x & tile_mask == 0 && y & tile_mask == 0 {
                let s = sf_dec.decode(&mut r)? as usize;
                let c = cf_dec.decode(&mut r)? as u16;
                map.set(x, y, ((sf_ids[s] as u16) << 8) | c);
            }

            let covered = if row_mask.is_empty() {
                mask.has_rgb(x, y)
            } else {
                row_mask[x as usize]
            };
            if covered {
                img.set_px(x, y, mask_color);
                ctx.zero(x);
                skipped += 1;
                continue;
            }
            if lz.visited(x, y) {
                // payload written by the LZ decoder, not here
                ctx.zero(x);
                skipped += 1;
                continue;
            }

            let filter = map.get(x, y);
            let sf = (filter >> 8) as usize;
            let cf = (filter & 0xFF) as usize;

            let y_sym = coders[0][ctx.chaos(x, 0)].decode(&mut r)? as usize;
            let tuple = if y_sym >= 256 {
                matched += 1;
                ring.get(y_sym - 256)
            } else {
                fresh += 1;
                let u = coders[1][ctx.chaos(x, 1)].decode(&mut r)? as u8;
                let v = coders[2][ctx.chaos(x, 2)].decode(&mut r)? as u8;
                let a = coders[3][ctx.chaos(x, 3)].decode(&mut r)? as u8;
                [y_sym as u8, u, v, a]
            };

            let temp = YUV_TO_RGB[cf]([tuple[0], tuple[1], tuple[2]]);
            let n = Neighbors::gather(img, x, y);
            let pred = SPATIAL_FILTERS[sf](&n);
            let prev_a = if x > 0 { img.alpha(x - 1, y) } else { 255 };
            img.set_px(
                x,
                y,
                [
                    temp[0].wrapping_add(pred[0]),
                    temp[1].wrapping_add(pred[1]),
                    temp[2].wrapping_add(pred[2]),
                    prev_a.wrapping_sub(tuple[3]),
                ],
            );

            ctx.store(x, tuple);
            ring.push(tuple);
        }
    }

    debug!(
        width,
        height,
        fresh,
        matched,
        skipped,
        consumed_bits = r.bit_pos(),
        "decoded rgba image"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitio::BitWriter;
    use crate::mask::{NoLz, NoMask};

    #[test]
    fn empty_stream_is_truncated() {
        let err = decode(&[], 8, 8, &NoMask, &NoLz, &DecoderConfig::default()).unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { .. }));
    }

    #[test]
    fn out_of_range_filter_id_is_fatal() {
        let mut w = BitWriter::new();
        w.write_bits(2, 3); // tile bits
        w.write_bits(0, 5); // one enabled filter
        w.write_bits(100, 7); // bogus catalogue index
        let bytes = w.finalize();
        let err = decode(&bytes, 8, 8, &NoMask, &NoLz, &DecoderConfig::default()).unwrap_err();
        assert_eq!(
            err,
            DecodeError::BadFilterId {
                id: 100,
                max: SF_COUNT as u8
            }
        );
    }

    #[test]
    fn truncated_payload_is_detected() {
        let img = RgbaImage::solid(8, 8, [10, 200, 30, 255]);
        let full = crate::encoder::encode(
            &img,
            &NoMask,
            &NoLz,
            &crate::encoder::EncoderConfig::default(),
        )
        .unwrap();
        let cut = &full[..full.len() / 2];
        let err = decode(cut, 8, 8, &NoMask, &NoLz, &DecoderConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Truncated { .. } | DecodeError::BadSymbol(_) | DecodeError::BadCodeLengths(_)
        ));
    }

    #[test]
    fn mismatched_output_buffer_is_rejected() {
        let mut img = RgbaImage::new(8, 8);
        img.pixels.truncate(10);
        let err = decode_into(&[0u8; 16], &mut img, &NoMask, &NoLz, &DecoderConfig::default())
            .unwrap_err();
        assert_eq!(
            err,
            DecodeError::BadOutputSize {
                got: 10,
                need: 256
            }
        );
    }

    #[test]
    fn desync_mismatch_is_reported() {
        let img = RgbaImage::solid(8, 8, [1, 2, 3, 255]);
        let plain = crate::encoder::encode(
            &img,
            &NoMask,
            &NoLz,
            &crate::encoder::EncoderConfig::default(),
        )
        .unwrap();
        // decoding a plain stream with checks on must trip a marker or die
        let config = DecoderConfig {
            desync_checks: true,
        };
        assert!(decode(&plain, 8, 8, &NoMask, &NoLz, &config).is_err());
    }
}

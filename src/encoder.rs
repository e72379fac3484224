//! Two-pass residual encoder: the first pass gathers per-coder symbol
//! statistics, the second emits the bitstream. Both passes must walk the
//! chaos context and recent-symbol ring identically.

use tracing::debug;

use crate::bitio::BitWriter;
use crate::chaos::{ChaosContext, RecentRing, NUM_Y_SYMS, PLANES};
use crate::error::EncodeError;
use crate::filters::{Neighbors, CF_COUNT, RGB_TO_YUV, SF_COUNT, SPATIAL_FILTERS};
use crate::huffman::{FreqHistogram, HuffmanEncoder};
use crate::mask::{DominantMask, LzOracle};
use crate::rgba::RgbaImage;
use crate::tilemap::{decide_filters, FilterMap, UNUSED_FILTER};

/// Marker word interleaved at table boundaries when desync checks are on.
pub const DESYNC_MAGIC: u32 = 1234567;

#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// 0 picks tile filters by residual magnitude alone; 1 and up re-rank
    /// the best candidates by true entropy.
    pub compress_level: u8,
    /// log2 of the tile size, 1..=8.
    pub tile_bits: u32,
    /// Number of chaos-indexed coder banks per plane, 1..=16.
    pub chaos_levels: u8,
    /// Interleave marker words so a desynchronized decoder fails fast.
    pub desync_checks: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            compress_level: 1,
            tile_bits: 3,
            chaos_levels: 8,
            desync_checks: false,
        }
    }
}

/// Residual tuple (y, u, v, a) for an unmasked pixel under the tile's
/// filter pair. Alpha is predicted from the left pixel, 255 at x = 0.
fn residual_tuple(img: &RgbaImage, x: u32, y: u32, filter: u16) -> [u8; PLANES] {
    let sf = (filter >> 8) as usize;
    let cf = (filter & 0xFF) as usize;
    let n = Neighbors::gather(img, x, y);
    let pred = SPATIAL_FILTERS[sf](&n);
    let rgb = img.rgb(x, y);
    let temp = [
        rgb[0].wrapping_sub(pred[0]),
        rgb[1].wrapping_sub(pred[1]),
        rgb[2].wrapping_sub(pred[2]),
    ];
    let yuv = RGB_TO_YUV[cf](temp);
    let prev_a = if x > 0 { img.alpha(x - 1, y) } else { 255 };
    [yuv[0], yuv[1], yuv[2], prev_a.wrapping_sub(img.alpha(x, y))]
}

fn desync(w: &mut BitWriter, on: bool) {
    if on {
        w.write_bits(DESYNC_MAGIC as u64, 32);
    }
}

pub fn encode<M: DominantMask, L: LzOracle>(
    img: &RgbaImage,
    mask: &M,
    lz: &L,
    config: &EncoderConfig,
) -> Result<Vec<u8>, EncodeError> {
    if !(1..=8).contains(&config.tile_bits) {
        return Err(EncodeError::BadTileBits(config.tile_bits));
    }
    if !(1..=16).contains(&config.chaos_levels) {
        return Err(EncodeError::BadChaosLevels(config.chaos_levels));
    }

    let tile = 1u32 << config.tile_bits;
    let (width, height) = (img.width, img.height);
    if width < tile || height < tile || width % tile != 0 || height % tile != 0 {
        return Err(EncodeError::BadDimensions {
            width,
            height,
            tile,
        });
    }

    let mut map = FilterMap::new(width, height, config.tile_bits);
    decide_filters(img, mask, lz, &mut map, config.compress_level);

    // Tile-header codec: histogram real tiles, park fully covered ones on
    // the UNUSED sentinel and fold their count onto the most common real
    // symbol so they compress to nothing.
    let mut sf_hist = FreqHistogram::new(SF_COUNT);
    let mut cf_hist = FreqHistogram::new(CF_COUNT);
    let mut unused_count = 0u32;
    for ty in 0..map.tiles_y() {
        for tx in 0..map.tiles_x() {
            let x0 = tx * tile;
            let y0 = ty * tile;
            let mut on = false;
            'scan: for yy in y0..y0 + tile {
                for xx in x0..x0 + tile {
                    if !lz.visited(xx, yy) && !mask.has_rgb(xx, yy) {
                        on = true;
                        break 'scan;
                    }
                }
            }
            if on {
                let f = map.get_tile(tx, ty);
                sf_hist.add((f >> 8) as usize);
                cf_hist.add((f & 0xFF) as usize);
            } else {
                map.set_tile(tx, ty, UNUSED_FILTER);
                unused_count += 1;
            }
        }
    }
    let sf_unused_sym = sf_hist.first_highest_peak();
    let cf_unused_sym = cf_hist.first_highest_peak();
    sf_hist.add_more(sf_unused_sym, unused_count);
    cf_hist.add_more(cf_unused_sym, unused_count);
    let sf_enc = HuffmanEncoder::from_histogram(&sf_hist);
    let cf_enc = HuffmanEncoder::from_histogram(&cf_hist);

    // Pass 1: symbol statistics per (plane, chaos level).
    let levels = config.chaos_levels as usize;
    let mut hists: Vec<Vec<FreqHistogram>> = (0..PLANES)
        .map(|p| {
            let syms = if p == 0 { NUM_Y_SYMS } else { 256 };
            (0..levels).map(|_| FreqHistogram::new(syms)).collect()
        })
        .collect();

    {
        let mut ctx = ChaosContext::new(config.chaos_levels, width);
        let mut ring = RecentRing::new();
        for y in 0..height {
            for x in 0..width {
                if lz.visited(x, y) || mask.has_rgb(x, y) {
                    ctx.zero(x);
                    continue;
                }
                let tuple = residual_tuple(img, x, y, map.get(x, y));
                match ring.find(tuple) {
                    Some(j) => hists[0][ctx.chaos(x, 0)].add(256 + j),
                    None => {
                        for (p, hist_row) in hists.iter_mut().enumerate() {
                            hist_row[ctx.chaos(x, p)].add(tuple[p] as usize);
                        }
                    }
                }
                ctx.store(x, tuple);
                ring.push(tuple);
            }
        }
    }

    let coders: Vec<Vec<HuffmanEncoder>> = hists
        .iter()
        .map(|row| row.iter().map(HuffmanEncoder::from_histogram).collect())
        .collect();

    // Header: tile geometry, enabled spatial filters, tile-symbol tables,
    // then every (plane, level) coder table.
    let mut w = BitWriter::new();
    w.write_bits((config.tile_bits - 1) as u64, 3);
    w.write_bits((SF_COUNT - 1) as u64, 5);
    for id in 0..SF_COUNT {
        w.write_bits(id as u64, 7);
    }
    desync(&mut w, config.desync_checks);
    sf_enc.write_table(&mut w);
    desync(&mut w, config.desync_checks);
    cf_enc.write_table(&mut w);
    desync(&mut w, config.desync_checks);
    w.write_bits((config.chaos_levels - 1) as u64, 4);
    for level in 0..levels {
        for coder_row in coders.iter() {
            coder_row[level].write_table(&mut w);
            desync(&mut w, config.desync_checks);
        }
    }
    let header_bits = w.bit_len();

    // Pass 2: emit, replaying pass 1's context evolution exactly, with
    // tile filter symbols interleaved at tile corners.
    let tile_mask = tile - 1;
    let (mut fresh, mut matched, mut skipped) = (0u64, 0u64, 0u64);
    let mut ctx = ChaosContext::new(config.chaos_levels, width);
    let mut ring = RecentRing::new();
    for y in 0..height {
        for x in 0..width {
            if x & tile_mask == 0 && y & tile_mask == 0 {
                let f = map.get(x, y);
                let (s, c) = if f == UNUSED_FILTER {
                    (sf_unused_sym, cf_unused_sym)
                } else {
                    ((f >> 8) as usize, (f & 0xFF) as usize)
                };
                sf_enc.encode(s, &mut w);
                cf_enc.encode(c, &mut w);
            }
            if lz.visited(x, y) || mask.has_rgb(x, y) {
                ctx.zero(x);
                skipped += 1;
                continue;
            }
            let tuple = residual_tuple(img, x, y, map.get(x, y));
            match ring.find(tuple) {
                Some(j) => {
                    coders[0][ctx.chaos(x, 0)].encode(256 + j, &mut w);
                    matched += 1;
                }
                None => {
                    for (p, coder_row) in coders.iter().enumerate() {
                        coder_row[ctx.chaos(x, p)].encode(tuple[p] as usize, &mut w);
                    }
                    fresh += 1;
                }
            }
            ctx.store(x, tuple);
            ring.push(tuple);
        }
    }

    let out = w.finalize();
    debug!(
        width,
        height,
        fresh,
        matched,
        skipped,
        unused_tiles = unused_count,
        header_bits,
        total_bytes = out.len(),
        "encoded rgba image"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::{NoLz, NoMask};

    fn cfg() -> EncoderConfig {
        EncoderConfig::default()
    }

    #[test]
    fn rejects_dimensions_below_tile() {
        let img = RgbaImage::solid(4, 8, [0, 0, 0, 255]);
        assert_eq!(
            encode(&img, &NoMask, &NoLz, &cfg()).unwrap_err(),
            EncodeError::BadDimensions {
                width: 4,
                height: 8,
                tile: 8
            }
        );
    }

    #[test]
    fn rejects_unaligned_dimensions() {
        let img = RgbaImage::solid(12, 8, [0, 0, 0, 255]);
        assert!(matches!(
            encode(&img, &NoMask, &NoLz, &cfg()),
            Err(EncodeError::BadDimensions { .. })
        ));
    }

    #[test]
    fn rejects_bad_tile_bits() {
        let img = RgbaImage::solid(8, 8, [0, 0, 0, 255]);
        let config = EncoderConfig {
            tile_bits: 0,
            ..cfg()
        };
        assert_eq!(
            encode(&img, &NoMask, &NoLz, &config).unwrap_err(),
            EncodeError::BadTileBits(0)
        );
        let config = EncoderConfig {
            tile_bits: 9,
            ..cfg()
        };
        assert!(encode(&img, &NoMask, &NoLz, &config).is_err());
    }

    #[test]
    fn rejects_bad_chaos_levels() {
        let img = RgbaImage::solid(8, 8, [0, 0, 0, 255]);
        let config = EncoderConfig {
            chaos_levels: 0,
            ..cfg()
        };
        assert_eq!(
            encode(&img, &NoMask, &NoLz, &config).unwrap_err(),
            EncodeError::BadChaosLevels(0)
        );
        let config = EncoderConfig {
            chaos_levels: 17,
            ..cfg()
        };
        assert!(encode(&img, &NoMask, &NoLz, &config).is_err());
    }

    #[test]
    fn encode_is_deterministic() {
        let mut img = RgbaImage::new(16, 16);
        for y in 0..16u32 {
            for x in 0..16u32 {
                img.set_px(x, y, [(x * 9) as u8, (y * 5) as u8, 77, 255]);
            }
        }
        let a = encode(&img, &NoMask, &NoLz, &cfg()).unwrap();
        let b = encode(&img, &NoMask, &NoLz, &cfg()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn fast_and_quality_tiers_both_produce_output() {
        let mut img = RgbaImage::new(16, 16);
        for y in 0..16u32 {
            for x in 0..16u32 {
                img.set_px(x, y, [(x * x) as u8, (x + y) as u8, (y * 3) as u8, 255]);
            }
        }
        for level in [0u8, 1, 2] {
            let config = EncoderConfig {
                compress_level: level,
                ..cfg()
            };
            assert!(!encode(&img, &NoMask, &NoLz, &config).unwrap().is_empty());
        }
    }
}

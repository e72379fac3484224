//! Per-tile filter selection: every tile shares one spatial and one color
//! filter, chosen to minimize the residual cost over the tile.

use crate::chaos::chaos_score;
use crate::estimator::{EntropyEstimator, FilterScorer};
use crate::filters::{Neighbors, CF_COUNT, RGB_TO_YUV, SF_COUNT, SPATIAL_FILTERS};
use crate::mask::{DominantMask, LzOracle};
use crate::rgba::RgbaImage;

/// Sentinel for tiles fully covered by mask or LZ.
pub const UNUSED_FILTER: u16 = 0xFFFF;

/// Candidates re-ranked by true entropy in the quality tier.
pub const FILTER_SELECT_FUZZ: usize = 20;

pub struct FilterMap {
    tile_bits: u32,
    tiles_x: u32,
    tiles_y: u32,
    map: Vec<u16>,
}

impl FilterMap {
    pub fn new(width: u32, height: u32, tile_bits: u32) -> Self {
        let tile = 1u32 << tile_bits;
        let tiles_x = width.div_ceil(tile);
        let tiles_y = height.div_ceil(tile);
        Self {
            tile_bits,
            tiles_x,
            tiles_y,
            map: vec![0; (tiles_x * tiles_y) as usize],
        }
    }

    pub fn tile_size(&self) -> u32 {
        1 << self.tile_bits
    }

    pub fn tiles_x(&self) -> u32 {
        self.tiles_x
    }

    pub fn tiles_y(&self) -> u32 {
        self.tiles_y
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> u16 {
        self.map[((x >> self.tile_bits) + (y >> self.tile_bits) * self.tiles_x) as usize]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, filter: u16) {
        self.map[((x >> self.tile_bits) + (y >> self.tile_bits) * self.tiles_x) as usize] = filter;
    }

    #[inline]
    pub fn get_tile(&self, tx: u32, ty: u32) -> u16 {
        self.map[(tx + ty * self.tiles_x) as usize]
    }

    #[inline]
    pub fn set_tile(&mut self, tx: u32, ty: u32, filter: u16) {
        self.map[(tx + ty * self.tiles_x) as usize] = filter;
    }
}

#[inline]
fn score_yuv(yuv: [u8; 3]) -> i64 {
    chaos_score(yuv[0]) as i64 + chaos_score(yuv[1]) as i64 + chaos_score(yuv[2]) as i64
}

/// Choose (sf, cf) per tile. Level 0 keeps the cheapest
/// sum-of-magnitudes candidate; level 1 and up re-rank the top
/// candidates by true residual entropy, committing the winner's counts
/// so later tiles are judged against accumulated statistics.
pub fn decide_filters<M: DominantMask, L: LzOracle>(
    img: &RgbaImage,
    mask: &M,
    lz: &L,
    map: &mut FilterMap,
    compress_level: u8,
) {
    let tile = map.tile_size();
    let mut scores = FilterScorer::new(SF_COUNT * CF_COUNT);
    let mut ee: [EntropyEstimator; 3] = std::array::from_fn(|_| EntropyEstimator::new());

    for ty in 0..map.tiles_y() {
        for tx in 0..map.tiles_x() {
            let x0 = tx * tile;
            let y0 = ty * tile;
            let x1 = (x0 + tile).min(img.width);
            let y1 = (y0 + tile).min(img.height);

            scores.reset();
            for yy in y0..y1 {
                for xx in x0..x1 {
                    if mask.has_rgb(xx, yy) || lz.visited(xx, yy) {
                        continue;
                    }
                    let n = Neighbors::gather(img, xx, yy);
                    let rgb = img.rgb(xx, yy);
                    for (sf, filter) in SPATIAL_FILTERS.iter().enumerate() {
                        let pred = filter(&n);
                        let temp = [
                            rgb[0].wrapping_sub(pred[0]),
                            rgb[1].wrapping_sub(pred[1]),
                            rgb[2].wrapping_sub(pred[2]),
                        ];
                        for (cf, to_yuv) in RGB_TO_YUV.iter().enumerate() {
                            scores.add(sf + cf * SF_COUNT, score_yuv(to_yuv(temp)));
                        }
                    }
                }
            }

            let (mut best, best_score) = scores.lowest();

            if compress_level > 0 && best_score > 4 {
                let top = scores.top(FILTER_SELECT_FUZZ);
                let mut best_entropy = 0.0;

                for (rank, &cand) in top.iter().enumerate() {
                    let sf = cand % SF_COUNT;
                    let cf = cand / SF_COUNT;
                    for e in ee.iter_mut() {
                        e.setup();
                    }
                    for yy in y0..y1 {
                        for xx in x0..x1 {
                            if mask.has_rgb(xx, yy) || lz.visited(xx, yy) {
                                continue;
                            }
                            let n = Neighbors::gather(img, xx, yy);
                            let rgb = img.rgb(xx, yy);
                            let pred = SPATIAL_FILTERS[sf](&n);
                            let temp = [
                                rgb[0].wrapping_sub(pred[0]),
                                rgb[1].wrapping_sub(pred[1]),
                                rgb[2].wrapping_sub(pred[2]),
                            ];
                            let yuv = RGB_TO_YUV[cf](temp);
                            ee[0].push(yuv[0]);
                            ee[1].push(yuv[1]);
                            ee[2].push(yuv[2]);
                        }
                    }
                    let entropy = ee[0].entropy() + ee[1].entropy() + ee[2].entropy();
                    if rank == 0 || entropy < best_entropy {
                        best_entropy = entropy;
                        best = cand;
                        for e in ee.iter_mut() {
                            e.save();
                        }
                    }
                }

                for e in ee.iter_mut() {
                    e.commit();
                }
            }

            let sf = (best % SF_COUNT) as u16;
            let cf = (best / SF_COUNT) as u16;
            map.set_tile(tx, ty, (sf << 8) | cf);
        }
    }
}

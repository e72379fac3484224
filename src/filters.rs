//! Spatial and color filter catalogues. Both tables are process-wide
//! constants; indices into them are serialized in the bitstream.

use crate::rgba::RgbaImage;

pub const SF_COUNT: usize = 16;
pub const CF_COUNT: usize = 16;

/// Causal neighborhood of a pixel. Any neighbor outside the image reads
/// as zero, on both the encode and decode side.
#[derive(Clone, Copy, Default)]
pub struct Neighbors {
    /// left
    pub a: [u8; 3],
    /// up
    pub b: [u8; 3],
    /// up-left
    pub c: [u8; 3],
    /// up-right
    pub d: [u8; 3],
}

impl Neighbors {
    pub fn gather(img: &RgbaImage, x: u32, y: u32) -> Self {
        let a = if x > 0 { img.rgb(x - 1, y) } else { [0; 3] };
        let b = if y > 0 { img.rgb(x, y - 1) } else { [0; 3] };
        let c = if x > 0 && y > 0 {
            img.rgb(x - 1, y - 1)
        } else {
            [0; 3]
        };
        let d = if y > 0 && x + 1 < img.width {
            img.rgb(x + 1, y - 1)
        } else {
            [0; 3]
        };
        Self { a, b, c, d }
    }
}

pub type SpatialFilter = fn(&Neighbors) -> [u8; 3];

pub static SPATIAL_FILTERS: [SpatialFilter; SF_COUNT] = [
    sf_left,
    sf_up,
    sf_upleft,
    sf_upright,
    sf_avg_ab,
    sf_avg_ac,
    sf_avg_ad,
    sf_avg_bc,
    sf_avg_bd,
    sf_avg_cd,
    sf_grad,
    sf_grad_clamp,
    sf_paeth,
    sf_med,
    sf_avg_abc,
    sf_zero,
];

#[inline]
fn avg(x: u8, y: u8) -> u8 {
    ((x as u16 + y as u16) >> 1) as u8
}

#[inline]
fn each3(f: impl Fn(usize) -> u8) -> [u8; 3] {
    [f(0), f(1), f(2)]
}

fn sf_left(n: &Neighbors) -> [u8; 3] {
    n.a
}

fn sf_up(n: &Neighbors) -> [u8; 3] {
    n.b
}

fn sf_upleft(n: &Neighbors) -> [u8; 3] {
    n.c
}

fn sf_upright(n: &Neighbors) -> [u8; 3] {
    n.d
}

fn sf_avg_ab(n: &Neighbors) -> [u8; 3] {
    each3(|i| avg(n.a[i], n.b[i]))
}

fn sf_avg_ac(n: &Neighbors) -> [u8; 3] {
    each3(|i| avg(n.a[i], n.c[i]))
}

fn sf_avg_ad(n: &Neighbors) -> [u8; 3] {
    each3(|i| avg(n.a[i], n.d[i]))
}

fn sf_avg_bc(n: &Neighbors) -> [u8; 3] {
    each3(|i| avg(n.b[i], n.c[i]))
}

fn sf_avg_bd(n: &Neighbors) -> [u8; 3] {
    each3(|i| avg(n.b[i], n.d[i]))
}

fn sf_avg_cd(n: &Neighbors) -> [u8; 3] {
    each3(|i| avg(n.c[i], n.d[i]))
}

fn sf_grad(n: &Neighbors) -> [u8; 3] {
    each3(|i| n.a[i].wrapping_add(n.b[i]).wrapping_sub(n.c[i]))
}

fn sf_grad_clamp(n: &Neighbors) -> [u8; 3] {
    each3(|i| {
        let p = n.a[i] as i16 + n.b[i] as i16 - n.c[i] as i16;
        p.clamp(0, 255) as u8
    })
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

fn sf_paeth(n: &Neighbors) -> [u8; 3] {
    each3(|i| paeth(n.a[i], n.b[i], n.c[i]))
}

fn med(a: u8, b: u8, c: u8) -> u8 {
    let mn = a.min(b);
    let mx = a.max(b);
    if c >= mx {
        mn
    } else if c <= mn {
        mx
    } else {
        // c strictly between mn and mx keeps a + b - c in 0..=255
        (a as i16 + b as i16 - c as i16) as u8
    }
}

fn sf_med(n: &Neighbors) -> [u8; 3] {
    each3(|i| med(n.a[i], n.b[i], n.c[i]))
}

fn sf_avg_abc(n: &Neighbors) -> [u8; 3] {
    each3(|i| avg(avg(n.a[i], n.b[i]), n.c[i]))
}

fn sf_zero(_n: &Neighbors) -> [u8; 3] {
    [0; 3]
}

/// Color filters map an RGB residual triple to YUV. Every entry is a
/// composition of modulo-256 shears and channel permutations, so each has
/// an exact inverse at the same index of [`YUV_TO_RGB`].
pub type ColorFilter = fn([u8; 3]) -> [u8; 3];

pub static RGB_TO_YUV: [ColorFilter; CF_COUNT] = [
    cf_ycgco_r,
    cf_g_rg_bg,
    cf_g_bg_rg,
    cf_r_gr_br,
    cf_b_gb_rb,
    cf_g_rg_bavg,
    cf_r_br_gavg,
    cf_b_rb_gavg,
    cf_ycgco_r_alt,
    cf_g_bg_ravg,
    cf_r_g_bavg,
    cf_g_b_ravg,
    cf_perm_gbr,
    cf_perm_bgr,
    cf_g_rg_br,
    cf_identity,
];

pub static YUV_TO_RGB: [ColorFilter; CF_COUNT] = [
    icf_ycgco_r,
    icf_g_rg_bg,
    icf_g_bg_rg,
    icf_r_gr_br,
    icf_b_gb_rb,
    icf_g_rg_bavg,
    icf_r_br_gavg,
    icf_b_rb_gavg,
    icf_ycgco_r_alt,
    icf_g_bg_ravg,
    icf_r_g_bavg,
    icf_g_b_ravg,
    icf_perm_gbr,
    icf_perm_bgr,
    icf_g_rg_br,
    icf_identity,
];

fn cf_ycgco_r([r, g, b]: [u8; 3]) -> [u8; 3] {
    let co = r.wrapping_sub(b);
    let t = b.wrapping_add(co >> 1);
    let cg = g.wrapping_sub(t);
    let y = t.wrapping_add(cg >> 1);
    [y, cg, co]
}

fn icf_ycgco_r([y, cg, co]: [u8; 3]) -> [u8; 3] {
    let t = y.wrapping_sub(cg >> 1);
    let g = cg.wrapping_add(t);
    let b = t.wrapping_sub(co >> 1);
    let r = b.wrapping_add(co);
    [r, g, b]
}

fn cf_ycgco_r_alt([r, g, b]: [u8; 3]) -> [u8; 3] {
    let co = g.wrapping_sub(b);
    let t = b.wrapping_add(co >> 1);
    let cg = r.wrapping_sub(t);
    let y = t.wrapping_add(cg >> 1);
    [y, cg, co]
}

fn icf_ycgco_r_alt([y, cg, co]: [u8; 3]) -> [u8; 3] {
    let t = y.wrapping_sub(cg >> 1);
    let r = cg.wrapping_add(t);
    let b = t.wrapping_sub(co >> 1);
    let g = b.wrapping_add(co);
    [r, g, b]
}

fn cf_g_rg_bg([r, g, b]: [u8; 3]) -> [u8; 3] {
    [g, r.wrapping_sub(g), b.wrapping_sub(g)]
}

fn icf_g_rg_bg([y, u, v]: [u8; 3]) -> [u8; 3] {
    [u.wrapping_add(y), y, v.wrapping_add(y)]
}

fn cf_g_bg_rg([r, g, b]: [u8; 3]) -> [u8; 3] {
    [g, b.wrapping_sub(g), r.wrapping_sub(g)]
}

fn icf_g_bg_rg([y, u, v]: [u8; 3]) -> [u8; 3] {
    [v.wrapping_add(y), y, u.wrapping_add(y)]
}

fn cf_r_gr_br([r, g, b]: [u8; 3]) -> [u8; 3] {
    [r, g.wrapping_sub(r), b.wrapping_sub(r)]
}

fn icf_r_gr_br([y, u, v]: [u8; 3]) -> [u8; 3] {
    [y, u.wrapping_add(y), v.wrapping_add(y)]
}

fn cf_b_gb_rb([r, g, b]: [u8; 3]) -> [u8; 3] {
    [b, g.wrapping_sub(b), r.wrapping_sub(b)]
}

fn icf_b_gb_rb([y, u, v]: [u8; 3]) -> [u8; 3] {
    [v.wrapping_add(y), u.wrapping_add(y), y]
}

fn cf_g_rg_bavg([r, g, b]: [u8; 3]) -> [u8; 3] {
    [g, r.wrapping_sub(g), b.wrapping_sub(avg(r, g))]
}

fn icf_g_rg_bavg([y, u, v]: [u8; 3]) -> [u8; 3] {
    let g = y;
    let r = u.wrapping_add(g);
    let b = v.wrapping_add(avg(r, g));
    [r, g, b]
}

fn cf_r_br_gavg([r, g, b]: [u8; 3]) -> [u8; 3] {
    [r, b.wrapping_sub(r), g.wrapping_sub(avg(r, b))]
}

fn icf_r_br_gavg([y, u, v]: [u8; 3]) -> [u8; 3] {
    let r = y;
    let b = u.wrapping_add(r);
    let g = v.wrapping_add(avg(r, b));
    [r, g, b]
}

fn cf_b_rb_gavg([r, g, b]: [u8; 3]) -> [u8; 3] {
    [b, r.wrapping_sub(b), g.wrapping_sub(avg(r, b))]
}

fn icf_b_rb_gavg([y, u, v]: [u8; 3]) -> [u8; 3] {
    let b = y;
    let r = u.wrapping_add(b);
    let g = v.wrapping_add(avg(r, b));
    [r, g, b]
}

fn cf_g_bg_ravg([r, g, b]: [u8; 3]) -> [u8; 3] {
    [g, b.wrapping_sub(g), r.wrapping_sub(avg(g, b))]
}

fn icf_g_bg_ravg([y, u, v]: [u8; 3]) -> [u8; 3] {
    let g = y;
    let b = u.wrapping_add(g);
    let r = v.wrapping_add(avg(g, b));
    [r, g, b]
}

fn cf_r_g_bavg([r, g, b]: [u8; 3]) -> [u8; 3] {
    [r, g, b.wrapping_sub(avg(r, g))]
}

fn icf_r_g_bavg([y, u, v]: [u8; 3]) -> [u8; 3] {
    [y, u, v.wrapping_add(avg(y, u))]
}

fn cf_g_b_ravg([r, g, b]: [u8; 3]) -> [u8; 3] {
    [g, b, r.wrapping_sub(avg(g, b))]
}

fn icf_g_b_ravg([y, u, v]: [u8; 3]) -> [u8; 3] {
    [v.wrapping_add(avg(y, u)), y, u]
}

fn cf_perm_gbr([r, g, b]: [u8; 3]) -> [u8; 3] {
    [g, b, r]
}

fn icf_perm_gbr([y, u, v]: [u8; 3]) -> [u8; 3] {
    [v, y, u]
}

fn cf_perm_bgr([r, g, b]: [u8; 3]) -> [u8; 3] {
    [b, g, r]
}

fn icf_perm_bgr([y, u, v]: [u8; 3]) -> [u8; 3] {
    [v, u, y]
}

fn cf_g_rg_br([r, g, b]: [u8; 3]) -> [u8; 3] {
    [g, r.wrapping_sub(g), b.wrapping_sub(r)]
}

fn icf_g_rg_br([y, u, v]: [u8; 3]) -> [u8; 3] {
    let g = y;
    let r = u.wrapping_add(g);
    let b = v.wrapping_add(r);
    [r, g, b]
}

fn cf_identity(rgb: [u8; 3]) -> [u8; 3] {
    rgb
}

fn icf_identity(yuv: [u8; 3]) -> [u8; 3] {
    yuv
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tuples() -> Vec<[u8; 3]> {
        // all (r, g) pairs with a varying b, plus every corner
        let mut out = Vec::with_capacity(1 << 16);
        for i in 0..(1u32 << 16) {
            out.push([(i & 0xFF) as u8, ((i >> 8) & 0xFF) as u8, ((i * 31) & 0xFF) as u8]);
        }
        for &r in &[0u8, 255] {
            for &g in &[0u8, 255] {
                for &b in &[0u8, 255] {
                    out.push([r, g, b]);
                }
            }
        }
        out
    }

    #[test]
    fn every_color_filter_inverts_exactly() {
        let tuples = sample_tuples();
        for cf in 0..CF_COUNT {
            for &t in &tuples {
                let yuv = RGB_TO_YUV[cf](t);
                let back = YUV_TO_RGB[cf](yuv);
                assert_eq!(back, t, "cf={} tuple={:?}", cf, t);
            }
        }
    }

    #[test]
    fn neighbors_outside_image_read_zero() {
        let img = RgbaImage::solid(2, 2, [10, 20, 30, 255]);
        let n = Neighbors::gather(&img, 0, 0);
        assert_eq!(n.a, [0; 3]);
        assert_eq!(n.b, [0; 3]);
        assert_eq!(n.c, [0; 3]);
        assert_eq!(n.d, [0; 3]);

        let n = Neighbors::gather(&img, 1, 1);
        assert_eq!(n.a, [10, 20, 30]);
        assert_eq!(n.b, [10, 20, 30]);
        assert_eq!(n.c, [10, 20, 30]);
        // (2, 0) is outside
        assert_eq!(n.d, [0; 3]);
    }

    #[test]
    fn paeth_picks_nearest_operand() {
        assert_eq!(paeth(10, 10, 10), 10);
        assert_eq!(paeth(100, 20, 20), 100);
        assert_eq!(paeth(20, 100, 20), 100);
        assert_eq!(paeth(50, 60, 100), 50);
    }

    #[test]
    fn med_clamps_to_gradient_bounds() {
        assert_eq!(med(10, 30, 40), 10);
        assert_eq!(med(10, 30, 5), 30);
        assert_eq!(med(10, 30, 20), 20);
    }

    #[test]
    fn left_filter_predicts_horizontal_run() {
        let mut img = RgbaImage::solid(4, 1, [7, 7, 7, 255]);
        img.set_px(3, 0, [9, 9, 9, 255]);
        let n = Neighbors::gather(&img, 3, 0);
        assert_eq!(SPATIAL_FILTERS[0](&n), [7, 7, 7]);
    }

    #[test]
    fn grad_wraps_modulo_256() {
        let n = Neighbors {
            a: [250, 0, 0],
            b: [10, 0, 0],
            c: [2, 0, 0],
            d: [0; 3],
        };
        assert_eq!(sf_grad(&n)[0], 250u8.wrapping_add(10).wrapping_sub(2));
        assert_eq!(sf_grad_clamp(&n)[0], 255);
    }
}

use image::RgbaImage;
use kurbo::Rect;

use crate::error::{GiftboxError, GiftboxResult};

/// Owned raster surface in premultiplied RGBA8, row-major, tightly packed.
#[derive(Clone, Debug)]
pub struct Surface {
    pub width: u32,
    pub height: u32,
    data: Vec<u8>,
}

pub type PremulRgba8 = [u8; 4];

impl Surface {
    /// Fully transparent surface.
    pub fn new(width: u32, height: u32) -> GiftboxResult<Self> {
        if width == 0 || height == 0 {
            return Err(GiftboxError::validation("surface width/height must be > 0"));
        }
        Ok(Self {
            width,
            height,
            data: vec![0u8; (width as usize) * (height as usize) * 4],
        })
    }

    /// Surface cleared to an opaque color.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> GiftboxResult<Self> {
        let mut s = Self::new(width, height)?;
        s.fill([rgb[0], rgb[1], rgb[2], 255]);
        Ok(s)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn fill(&mut self, straight_rgba: [u8; 4]) {
        let px = premul(straight_rgba);
        for chunk in self.data.chunks_exact_mut(4) {
            chunk.copy_from_slice(&px);
        }
    }

    /// Blends an axis-aligned rectangle of one straight-alpha color over the surface.
    pub fn fill_rect(&mut self, rect: Rect, straight_rgba: [u8; 4]) {
        let src = premul(straight_rgba);
        if src[3] == 0 {
            return;
        }
        let x0 = rect.x0.floor().max(0.0) as u32;
        let y0 = rect.y0.floor().max(0.0) as u32;
        let x1 = (rect.x1.ceil().min(f64::from(self.width))).max(0.0) as u32;
        let y1 = (rect.y1.ceil().min(f64::from(self.height))).max(0.0) as u32;
        for y in y0..y1 {
            for x in x0..x1 {
                let i = self.index(x, y);
                let dst = [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]];
                let out = over(dst, src);
                self.data[i..i + 4].copy_from_slice(&out);
            }
        }
    }

    /// Draws `src` scaled into `dst` with bilinear sampling. The destination
    /// rect may extend past the surface on any side; only the intersection is
    /// touched. Source pixels are treated as straight RGBA8.
    pub fn draw_image_scaled(&mut self, src: &RgbaImage, dst: Rect) {
        if dst.width() <= 0.0 || dst.height() <= 0.0 || src.width() == 0 || src.height() == 0 {
            return;
        }
        let x0 = dst.x0.floor().max(0.0) as u32;
        let y0 = dst.y0.floor().max(0.0) as u32;
        let x1 = (dst.x1.ceil().min(f64::from(self.width))).max(0.0) as u32;
        let y1 = (dst.y1.ceil().min(f64::from(self.height))).max(0.0) as u32;

        for y in y0..y1 {
            for x in x0..x1 {
                // Inverse-map the output pixel center into source space.
                let u = ((f64::from(x) + 0.5 - dst.x0) / dst.width()) * f64::from(src.width()) - 0.5;
                let v =
                    ((f64::from(y) + 0.5 - dst.y0) / dst.height()) * f64::from(src.height()) - 0.5;
                let sampled = sample_bilinear(src, u, v);
                let i = self.index(x, y);
                let dst = [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]];
                let out = over(dst, premul(sampled));
                self.data[i..i + 4].copy_from_slice(&out);
            }
        }
    }

    /// Dims the whole surface toward black by `amount` in 0..1.
    pub fn dim(&mut self, amount: f64) {
        let keep = ((1.0 - amount.clamp(0.0, 1.0)) * 255.0).round() as u16;
        for chunk in self.data.chunks_exact_mut(4) {
            chunk[0] = mul_div255(u16::from(chunk[0]), keep);
            chunk[1] = mul_div255(u16::from(chunk[1]), keep);
            chunk[2] = mul_div255(u16::from(chunk[2]), keep);
        }
    }

    /// Straight-alpha copy for encoders.
    pub fn to_rgba_image(&self) -> GiftboxResult<RgbaImage> {
        let mut out = self.data.clone();
        unpremultiply_rgba8_in_place(&mut out);
        RgbaImage::from_raw(self.width, self.height, out)
            .ok_or_else(|| GiftboxError::validation("surface buffer does not match dimensions"))
    }

    pub fn from_rgba_image(img: &RgbaImage) -> Self {
        let mut data = img.as_raw().clone();
        premultiply_rgba8_in_place(&mut data);
        Self {
            width: img.width(),
            height: img.height(),
            data,
        }
    }

    fn index(&self, x: u32, y: u32) -> usize {
        ((y as usize) * (self.width as usize) + (x as usize)) * 4
    }
}

pub fn over(dst: PremulRgba8, src: PremulRgba8) -> PremulRgba8 {
    if src[3] == 255 {
        return src;
    }
    if src[3] == 0 {
        return dst;
    }
    let inv = 255u16 - u16::from(src[3]);
    let mut out = [0u8; 4];
    for i in 0..4 {
        out[i] = src[i].saturating_add(mul_div255(u16::from(dst[i]), inv));
    }
    out
}

fn premul(straight: [u8; 4]) -> PremulRgba8 {
    let a = u16::from(straight[3]);
    if a == 255 {
        return straight;
    }
    if a == 0 {
        return [0, 0, 0, 0];
    }
    [
        mul_div255(u16::from(straight[0]), a),
        mul_div255(u16::from(straight[1]), a),
        mul_div255(u16::from(straight[2]), a),
        straight[3],
    ]
}

fn sample_bilinear(src: &RgbaImage, u: f64, v: f64) -> [u8; 4] {
    let max_x = (src.width() - 1) as f64;
    let max_y = (src.height() - 1) as f64;
    let u = u.clamp(0.0, max_x);
    let v = v.clamp(0.0, max_y);
    let x0 = u.floor() as u32;
    let y0 = v.floor() as u32;
    let x1 = (x0 + 1).min(src.width() - 1);
    let y1 = (y0 + 1).min(src.height() - 1);
    let fx = u - f64::from(x0);
    let fy = v - f64::from(y0);

    let p00 = src.get_pixel(x0, y0).0;
    let p10 = src.get_pixel(x1, y0).0;
    let p01 = src.get_pixel(x0, y1).0;
    let p11 = src.get_pixel(x1, y1).0;

    let mut out = [0u8; 4];
    for i in 0..4 {
        let top = f64::from(p00[i]) * (1.0 - fx) + f64::from(p10[i]) * fx;
        let bot = f64::from(p01[i]) * (1.0 - fx) + f64::from(p11[i]) * fx;
        out[i] = (top * (1.0 - fy) + bot * fy).round().clamp(0.0, 255.0) as u8;
    }
    out
}

pub fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 255 {
            continue;
        }
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = mul_div255(px[0] as u16, a);
        px[1] = mul_div255(px[1] as u16, a);
        px[2] = mul_div255(px[2] as u16, a);
    }
}

pub fn unpremultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u32;
        if a == 255 || a == 0 {
            continue;
        }
        px[0] = ((u32::from(px[0]) * 255 + a / 2) / a).min(255) as u8;
        px[1] = ((u32::from(px[1]) * 255 + a / 2) / a).min(255) as u8;
        px[2] = ((u32::from(px[2]) * 255 + a / 2) / a).min(255) as u8;
    }
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}

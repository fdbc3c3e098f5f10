//! CPU pixel primitives for the segmenter filter chain.
//!
//! Functions are generic over `ImageStride<Mono8>` images. Both filters are
//! separable and run as a horizontal pass into a scratch buffer followed by
//! a vertical pass into the destination. Windows are clamped at the image
//! border.

use machine_vision_formats::{pixel_format::Mono8, ImageData, ImageMutData, ImageStride};

fn assert_same_size<SRC, DST>(src: &SRC, dst: &DST)
where
    SRC: ImageStride<Mono8>,
    DST: ImageStride<Mono8>,
{
    assert_eq!(src.width(), dst.width());
    assert_eq!(src.height(), dst.height());
}

/// Morphological erosion with a rectangular structuring element of size
/// (2·radius+1)².
#[inline]
pub fn erode_rect<SRC, DST>(src: &SRC, dst: &mut DST, radius: usize)
where
    SRC: ImageStride<Mono8>,
    DST: ImageStride<Mono8> + ImageMutData<Mono8>,
{
    assert_same_size(src, dst);
    let w = src.width() as usize;
    let h = src.height() as usize;
    let r = radius as isize;

    let src_stride = src.stride();
    let src_data = src.image_data();

    // Horizontal minimum into scratch, row-major with stride == width.
    let mut scratch = vec![0u8; w * h];
    for y in 0..h {
        let row = &src_data[y * src_stride..y * src_stride + w];
        let out = &mut scratch[y * w..(y + 1) * w];
        for x in 0..w as isize {
            let lo = (x - r).max(0) as usize;
            let hi = ((x + r) as usize).min(w - 1);
            out[x as usize] = row[lo..=hi].iter().copied().min().unwrap_or(0);
        }
    }

    // Vertical minimum into the destination.
    let dst_stride = dst.stride();
    let dst_data = &mut dst.buffer_mut_ref().data[..];
    for y in 0..h as isize {
        let lo = (y - r).max(0) as usize;
        let hi = ((y + r) as usize).min(h - 1);
        for x in 0..w {
            let mut m = u8::MAX;
            for yy in lo..=hi {
                m = m.min(scratch[yy * w + x]);
            }
            dst_data[y as usize * dst_stride + x] = m;
        }
    }
}

fn gaussian_kernel(ksize: usize, sigma: f32) -> Vec<f32> {
    debug_assert!(ksize % 2 == 1);
    let r = (ksize / 2) as isize;
    let mut k: Vec<f32> = (-r..=r)
        .map(|i| (-((i * i) as f32) / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f32 = k.iter().sum();
    for v in &mut k {
        *v /= sum;
    }
    k
}

/// Separable Gaussian smoothing with an odd `ksize`×`ksize` kernel.
#[inline]
pub fn gaussian_blur<SRC, DST>(src: &SRC, dst: &mut DST, ksize: usize, sigma: f32)
where
    SRC: ImageStride<Mono8>,
    DST: ImageStride<Mono8> + ImageMutData<Mono8>,
{
    assert_same_size(src, dst);
    let w = src.width() as usize;
    let h = src.height() as usize;
    let kernel = gaussian_kernel(ksize, sigma);
    let r = (ksize / 2) as isize;

    let src_stride = src.stride();
    let src_data = src.image_data();

    let mut scratch = vec![0f32; w * h];
    for y in 0..h {
        let row = &src_data[y * src_stride..y * src_stride + w];
        let out = &mut scratch[y * w..(y + 1) * w];
        for x in 0..w as isize {
            let mut acc = 0f32;
            for (ki, kv) in kernel.iter().enumerate() {
                let xx = (x + ki as isize - r).clamp(0, w as isize - 1) as usize;
                acc += kv * row[xx] as f32;
            }
            out[x as usize] = acc;
        }
    }

    let dst_stride = dst.stride();
    let dst_data = &mut dst.buffer_mut_ref().data[..];
    for y in 0..h as isize {
        for x in 0..w {
            let mut acc = 0f32;
            for (ki, kv) in kernel.iter().enumerate() {
                let yy = (y + ki as isize - r).clamp(0, h as isize - 1) as usize;
                acc += kv * scratch[yy * w + x];
            }
            dst_data[y as usize * dst_stride + x] = acc.round().clamp(0.0, 255.0) as u8;
        }
    }
}

// THEORY:
// The comparator never touches codecs or convolution math directly. It talks
// to an `ImagingBackend`, a narrow capability interface with eight primitives:
//
//   load, select_rgb, blur, absolute_difference, colormap, multiply, add, write
//
// plus read accessors (`dimensions`, `samples`, `channels`) for the statistics pass.
// Any imaging library that offers these can drive the pipeline.
//
// `ImageCrateBackend` binds the interface to the `image` crate. Its buffer,
// `Frame`, stores interleaved `f32` samples. Integer sources are normalized
// to [0, 1] on load, so thresholds mean the same thing for 8-bit PNGs,
// 16-bit TIFFs and float EXRs. The frame remembers the sample depth of its
// source so derived images are written back at the same depth.

use crate::core_modules::colormap::Colormap;
use crate::error::{CompareError, Result};
use image::{ColorType, DynamicImage, Rgb32FImage, Rgba32FImage};
use std::path::Path;

/// Narrowest kernel, in pixels, that still blurs. Anything smaller is identity.
pub const MIN_BLUR_SIZE: f32 = 2.0;

/// True when a blur of `size` pixels changes the image.
pub fn is_effective_blur(size: f32) -> bool {
    size.is_finite() && size >= MIN_BLUR_SIZE
}

/// Capability interface the comparison pipeline is written against.
pub trait ImagingBackend {
    type Buffer: Clone;

    /// Decodes the file at `path`.
    fn load(&self, path: &Path) -> Result<Self::Buffer>;

    /// Reduces a buffer to exactly its red, green and blue channels.
    fn select_rgb(&self, buffer: Self::Buffer) -> Self::Buffer;

    /// Gaussian blur with a kernel `size` pixels wide. Sizes below
    /// `MIN_BLUR_SIZE` are identity.
    fn blur(&self, buffer: &Self::Buffer, size: f32) -> Self::Buffer;

    /// Per-sample `|a - b|`. Both buffers must share dimensions.
    fn absolute_difference(&self, a: &Self::Buffer, b: &Self::Buffer) -> Self::Buffer;

    fn colormap(&self, buffer: &Self::Buffer, map: Colormap) -> Self::Buffer;

    fn multiply(&self, buffer: &Self::Buffer, factor: f32) -> Self::Buffer;

    /// Per-sample `a + b`. Both buffers must share dimensions.
    fn add(&self, a: &Self::Buffer, b: &Self::Buffer) -> Self::Buffer;

    /// Encodes the buffer to `path`, choosing the container from the extension.
    fn write(&self, buffer: &Self::Buffer, path: &Path) -> Result<()>;

    fn dimensions(&self, buffer: &Self::Buffer) -> (u32, u32);

    /// Interleaved samples, `channels` per pixel, row-major.
    fn samples<'a>(&self, buffer: &'a Self::Buffer) -> &'a [f32];

    fn channels(&self, buffer: &Self::Buffer) -> usize;
}

/// Bit depth of the file a frame was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleDepth {
    Eight,
    Sixteen,
    Float,
}

impl SampleDepth {
    fn of(color: ColorType) -> Self {
        match color {
            ColorType::L16 | ColorType::La16 | ColorType::Rgb16 | ColorType::Rgba16 => {
                SampleDepth::Sixteen
            }
            ColorType::Rgb32F | ColorType::Rgba32F => SampleDepth::Float,
            _ => SampleDepth::Eight,
        }
    }
}

#[derive(Debug, Clone)]
enum FramePixels {
    Rgb(Rgb32FImage),
    Rgba(Rgba32FImage),
}

/// A decoded image held as normalized floating point samples.
#[derive(Debug, Clone)]
pub struct Frame {
    pixels: FramePixels,
    /// The sample depth of the source; derived images are written at this depth.
    pub depth: SampleDepth,
}

impl Frame {
    pub fn from_rgb(pixels: Rgb32FImage, depth: SampleDepth) -> Self {
        Self {
            pixels: FramePixels::Rgb(pixels),
            depth,
        }
    }

    pub fn from_rgba(pixels: Rgba32FImage, depth: SampleDepth) -> Self {
        Self {
            pixels: FramePixels::Rgba(pixels),
            depth,
        }
    }

    /// Decodes a `DynamicImage`, keeping alpha when the source has it.
    pub fn from_dynamic(image: &DynamicImage) -> Self {
        let depth = SampleDepth::of(image.color());
        if image.color().has_alpha() {
            Self::from_rgba(image.to_rgba32f(), depth)
        } else {
            Self::from_rgb(image.to_rgb32f(), depth)
        }
    }

    pub fn width(&self) -> u32 {
        match &self.pixels {
            FramePixels::Rgb(img) => img.width(),
            FramePixels::Rgba(img) => img.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match &self.pixels {
            FramePixels::Rgb(img) => img.height(),
            FramePixels::Rgba(img) => img.height(),
        }
    }

    pub fn channels(&self) -> usize {
        match &self.pixels {
            FramePixels::Rgb(_) => 3,
            FramePixels::Rgba(_) => 4,
        }
    }

    pub fn samples(&self) -> &[f32] {
        match &self.pixels {
            FramePixels::Rgb(img) => img.as_raw(),
            FramePixels::Rgba(img) => img.as_raw(),
        }
    }

    /// The RGB view of the frame; alpha, if any, is dropped.
    pub fn to_rgb(&self) -> Rgb32FImage {
        match &self.pixels {
            FramePixels::Rgb(img) => img.clone(),
            FramePixels::Rgba(img) => Rgb32FImage::from_fn(img.width(), img.height(), |x, y| {
                let [r, g, b, _] = img.get_pixel(x, y).0;
                image::Rgb([r, g, b])
            }),
        }
    }

    fn to_dynamic(&self) -> DynamicImage {
        let float = match &self.pixels {
            FramePixels::Rgb(img) => DynamicImage::ImageRgb32F(img.clone()),
            FramePixels::Rgba(img) => DynamicImage::ImageRgba32F(img.clone()),
        };
        match (self.depth, &self.pixels) {
            (SampleDepth::Float, _) => float,
            (SampleDepth::Sixteen, FramePixels::Rgb(_)) => DynamicImage::ImageRgb16(float.to_rgb16()),
            (SampleDepth::Sixteen, FramePixels::Rgba(_)) => {
                DynamicImage::ImageRgba16(float.to_rgba16())
            }
            (SampleDepth::Eight, FramePixels::Rgb(_)) => DynamicImage::ImageRgb8(float.to_rgb8()),
            (SampleDepth::Eight, FramePixels::Rgba(_)) => DynamicImage::ImageRgba8(float.to_rgba8()),
        }
    }
}

/// Combines two RGB frames sample by sample. The result keeps `a`'s depth.
fn zip_rgb(a: &Frame, b: &Frame, op: impl Fn(f32, f32) -> f32) -> Frame {
    let left = a.to_rgb();
    let right = b.to_rgb();
    debug_assert_eq!(left.dimensions(), right.dimensions());

    let samples: Vec<f32> = left
        .as_raw()
        .iter()
        .zip(right.as_raw().iter())
        .map(|(x, y)| op(*x, *y))
        .collect();
    let pixels = Rgb32FImage::from_raw(left.width(), left.height(), samples)
        .unwrap_or_else(|| Rgb32FImage::new(left.width(), left.height()));
    Frame::from_rgb(pixels, a.depth)
}

/// `ImagingBackend` over the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrateBackend;

impl ImagingBackend for ImageCrateBackend {
    type Buffer = Frame;

    fn load(&self, path: &Path) -> Result<Frame> {
        let image = image::open(path).map_err(|source| CompareError::ImageLoad {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!(
            "loaded {} ({}x{}, {:?})",
            path.display(),
            image.width(),
            image.height(),
            image.color()
        );
        Ok(Frame::from_dynamic(&image))
    }

    fn select_rgb(&self, buffer: Frame) -> Frame {
        match buffer.pixels {
            FramePixels::Rgb(_) => buffer,
            FramePixels::Rgba(_) => Frame::from_rgb(buffer.to_rgb(), buffer.depth),
        }
    }

    fn blur(&self, buffer: &Frame, size: f32) -> Frame {
        if !is_effective_blur(size) {
            return buffer.clone();
        }
        // A gaussian kernel `size` pixels wide falls to zero at two standard
        // deviations from its center on each side. Below sigma 0.5 the outer
        // taps underflow and `imageops::blur` darkens the border.
        let sigma = size / 4.0;
        let pixels = match &buffer.pixels {
            FramePixels::Rgb(img) => FramePixels::Rgb(image::imageops::blur(img, sigma)),
            FramePixels::Rgba(img) => FramePixels::Rgba(image::imageops::blur(img, sigma)),
        };
        Frame {
            pixels,
            depth: buffer.depth,
        }
    }

    fn absolute_difference(&self, a: &Frame, b: &Frame) -> Frame {
        zip_rgb(a, b, |x, y| (x - y).abs())
    }

    fn colormap(&self, buffer: &Frame, map: Colormap) -> Frame {
        let source = buffer.to_rgb();
        let mut mapped = Rgb32FImage::new(source.width(), source.height());
        for (out, pixel) in mapped.pixels_mut().zip(source.pixels()) {
            out.0 = map.map_pixel(pixel.0);
        }
        Frame::from_rgb(mapped, buffer.depth)
    }

    fn multiply(&self, buffer: &Frame, factor: f32) -> Frame {
        let mut scaled = buffer.to_rgb();
        for sample in scaled.iter_mut() {
            *sample *= factor;
        }
        Frame::from_rgb(scaled, buffer.depth)
    }

    fn add(&self, a: &Frame, b: &Frame) -> Frame {
        zip_rgb(a, b, |x, y| x + y)
    }

    fn write(&self, buffer: &Frame, path: &Path) -> Result<()> {
        buffer
            .to_dynamic()
            .save(path)
            .map_err(|source| CompareError::ImageWrite {
                path: path.to_path_buf(),
                source,
            })?;
        log::debug!("wrote {}", path.display());
        Ok(())
    }

    fn dimensions(&self, buffer: &Frame) -> (u32, u32) {
        (buffer.width(), buffer.height())
    }

    fn samples<'a>(&self, buffer: &'a Frame) -> &'a [f32] {
        buffer.samples()
    }

    fn channels(&self, buffer: &Frame) -> usize {
        buffer.channels()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, Rgba};

    fn solid_rgb(width: u32, height: u32, rgb: [f32; 3]) -> Frame {
        Frame::from_rgb(
            Rgb32FImage::from_pixel(width, height, Rgb(rgb)),
            SampleDepth::Eight,
        )
    }

    #[test]
    fn select_rgb_drops_alpha() {
        let rgba = Frame::from_rgba(
            Rgba32FImage::from_pixel(2, 3, Rgba([0.1, 0.2, 0.3, 0.5])),
            SampleDepth::Eight,
        );
        let backend = ImageCrateBackend;
        let rgb = backend.select_rgb(rgba);
        assert_eq!(rgb.channels(), 3);
        assert_eq!(backend.dimensions(&rgb), (2, 3));
        assert_eq!(&rgb.samples()[..3], &[0.1, 0.2, 0.3]);
        assert_eq!(rgb.samples().len(), 2 * 3 * 3);
    }

    #[test]
    fn zero_blur_is_identity() {
        let mut img = Rgb32FImage::new(4, 4);
        img.put_pixel(1, 2, Rgb([1.0, 0.0, 0.5]));
        let frame = Frame::from_rgb(img, SampleDepth::Eight);
        let backend = ImageCrateBackend;
        assert_eq!(backend.blur(&frame, 0.0).samples(), frame.samples());
        assert_eq!(backend.blur(&frame, -2.0).samples(), frame.samples());
        assert_eq!(backend.blur(&frame, f32::NAN).samples(), frame.samples());
        assert_eq!(backend.blur(&frame, 0.1).samples(), frame.samples());
        assert_eq!(backend.blur(&frame, 1.9).samples(), frame.samples());
    }

    #[test]
    fn narrowest_blur_keeps_flat_borders() {
        let frame = solid_rgb(6, 5, [0.5, 0.5, 0.5]);
        for size in [MIN_BLUR_SIZE, 3.0, 10.0] {
            let blurred = ImageCrateBackend.blur(&frame, size);
            for corner in [(0, 0), (5, 0), (0, 4), (5, 4)] {
                let [r, g, b] = blurred.to_rgb().get_pixel(corner.0, corner.1).0;
                for sample in [r, g, b] {
                    assert!((sample - 0.5).abs() < 1e-3, "size {size} corner {corner:?}: {sample}");
                }
            }
        }
    }

    #[test]
    fn blur_spreads_a_single_spike() {
        let mut img = Rgb32FImage::new(9, 9);
        img.put_pixel(4, 4, Rgb([1.0, 1.0, 1.0]));
        let frame = Frame::from_rgb(img, SampleDepth::Eight);
        let blurred = ImageCrateBackend.blur(&frame, 4.0);
        let center = blurred.to_rgb().get_pixel(4, 4).0[0];
        let neighbor = blurred.to_rgb().get_pixel(5, 4).0[0];
        assert!(center < 1.0);
        assert!(neighbor > 0.0);
    }

    #[test]
    fn difference_scale_and_add() {
        let backend = ImageCrateBackend;
        let a = solid_rgb(2, 2, [0.75, 0.25, 0.5]);
        let b = solid_rgb(2, 2, [0.25, 0.5, 0.5]);

        let diff = backend.absolute_difference(&a, &b);
        assert_eq!(&diff.samples()[..3], &[0.5, 0.25, 0.0]);

        let scaled = backend.multiply(&diff, 2.0);
        assert_eq!(&scaled.samples()[..3], &[1.0, 0.5, 0.0]);

        let sum = backend.add(&a, &scaled);
        assert_eq!(&sum.samples()[..3], &[1.75, 0.75, 0.5]);
    }

    #[test]
    fn colormap_maps_zero_difference_to_first_stop() {
        let backend = ImageCrateBackend;
        let black = solid_rgb(1, 1, [0.0, 0.0, 0.0]);
        let mapped = backend.colormap(&black, Colormap::Heat);
        assert_eq!(mapped.samples(), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn depth_follows_source_color_type() {
        assert_eq!(SampleDepth::of(ColorType::Rgba8), SampleDepth::Eight);
        assert_eq!(SampleDepth::of(ColorType::L8), SampleDepth::Eight);
        assert_eq!(SampleDepth::of(ColorType::Rgb16), SampleDepth::Sixteen);
        assert_eq!(SampleDepth::of(ColorType::Rgba32F), SampleDepth::Float);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = ImageCrateBackend
            .load(Path::new("definitely/not/here.png"))
            .unwrap_err();
        assert!(matches!(err, CompareError::ImageLoad { .. }));
    }
}

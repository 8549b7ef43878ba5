use std::{borrow::Cow, path::Path};

use crate::{
    data_structures::texture::Texture,
    error::{Error, Result},
};

/// An equirectangular high dynamic range environment image.
///
/// Row 0 is the top of the sky; the projection pass samples it with
/// `v = 0.5 - asin(dir.y) / pi`.
pub struct HdrPanorama {
    pixels: image::Rgba32FImage,
}

impl HdrPanorama {
    /// Reads a Radiance `.hdr` or OpenEXR file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let img = image::open(path).map_err(|e| Error::AssetDecode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if img.width() != 2 * img.height() {
            log::warn!(
                "{}: {}x{} is not a 2:1 equirectangular panorama",
                path.display(),
                img.width(),
                img.height()
            );
        }
        Ok(Self::from_image(img.to_rgba32f()))
    }

    pub fn from_image(pixels: image::Rgba32FImage) -> Self {
        Self { pixels }
    }

    /// Fills a `width` x `height` panorama with one radiance value.
    pub fn uniform(width: u32, height: u32, rgb: [f32; 3]) -> Self {
        Self::from_image(image::Rgba32FImage::from_pixel(
            width,
            height,
            image::Rgba([rgb[0], rgb[1], rgb[2], 1.0]),
        ))
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn pixels(&self) -> &image::Rgba32FImage {
        &self.pixels
    }

    /// Uploads the panorama, downscaled first if it exceeds the device's
    /// 2D texture limit.
    pub fn upload(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Texture {
        let pixels = self.fitted(device.limits().max_texture_dimension_2d);
        Texture::from_hdr(device, queue, &pixels, "hdr panorama")
    }

    /// The pixels scaled down, aspect kept, so neither edge exceeds `max_dimension`.
    pub fn fitted(&self, max_dimension: u32) -> Cow<'_, image::Rgba32FImage> {
        let (width, height) = self.pixels.dimensions();
        let max_dimension = max_dimension.max(1);
        if width <= max_dimension && height <= max_dimension {
            return Cow::Borrowed(&self.pixels);
        }
        let scale = max_dimension as f64 / width.max(height) as f64;
        let fit = |edge: u32| ((edge as f64 * scale).round() as u32).clamp(1, max_dimension);
        let (new_width, new_height) = (fit(width), fit(height));
        log::warn!(
            "{width}x{height} panorama exceeds the device limit of {max_dimension}, \
             downscaling to {new_width}x{new_height}"
        );
        Cow::Owned(image::imageops::resize(
            &self.pixels,
            new_width,
            new_height,
            image::imageops::FilterType::Triangle,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_panorama_has_opaque_alpha() {
        let panorama = HdrPanorama::uniform(8, 4, [2.0, 1.0, 0.5]);
        assert_eq!(panorama.dimensions(), (8, 4));
        assert_eq!(panorama.pixels().get_pixel(7, 3).0, [2.0, 1.0, 0.5, 1.0]);
    }

    #[test]
    fn oversized_panorama_is_downscaled_to_the_limit() {
        let panorama = HdrPanorama::uniform(64, 32, [0.5, 0.5, 0.5]);

        assert!(matches!(panorama.fitted(64), Cow::Borrowed(_)));
        let fitted = panorama.fitted(16);
        assert_eq!(fitted.dimensions(), (16, 8));
        let texel = fitted.get_pixel(3, 5).0;
        assert!(texel.iter().zip([0.5, 0.5, 0.5, 1.0]).all(|(a, b)| (a - b).abs() < 1e-4));
    }

    #[test]
    fn unreadable_file_is_a_decode_error() {
        let result = HdrPanorama::open("/nonexistent/sky.hdr");
        assert!(matches!(result, Err(Error::AssetDecode { .. })));
    }
}

use image::{DynamicImage, RgbImage};
use image_hasher::{HashAlg, HasherConfig, ImageHash};

pub fn compute_phash(image: &RgbImage) -> ImageHash {
    let hasher = HasherConfig::new()
        .hash_alg(HashAlg::DoubleGradient)
        .hash_size(8, 8)
        .to_hasher();

    hasher.hash_image(&DynamicImage::ImageRgb8(image.clone()))
}

pub fn hamming_distance(lhs: &ImageHash, rhs: &ImageHash) -> u32 {
    lhs.dist(rhs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn half_lit(left: bool) -> RgbImage {
        RgbImage::from_fn(64, 64, |x, _| {
            if (x < 32) == left {
                Rgb([250, 250, 250])
            } else {
                Rgb([10, 10, 10])
            }
        })
    }

    #[test]
    fn identical_images_have_zero_distance() {
        let a = compute_phash(&half_lit(true));
        let b = compute_phash(&half_lit(true));
        assert_eq!(hamming_distance(&a, &b), 0);
    }

    #[test]
    fn different_layouts_are_far_apart() {
        let a = compute_phash(&half_lit(true));
        let b = compute_phash(&half_lit(false));
        assert!(hamming_distance(&a, &b) > 0);
    }
}

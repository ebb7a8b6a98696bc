//! Image parameters and their derivation from decoder output
//!
//! The decoder reports raw parameters with every frame. The pipeline derives
//! the parameters it actually hands downstream (aspect, rotation, stereo,
//! color and spherical metadata) and caches them until the decoder reports
//! something different.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::types::CodecParams;
use crate::config::{AspectMethod, DecoderOptions};

/// Stereo 3D layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StereoMode {
    #[default]
    Mono,
    SideBySideLeftFirst,
    SideBySideRightFirst,
    TopBottomLeftFirst,
    TopBottomRightFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    Bt601,
    Bt709,
    Bt2020Ncl,
    Bt2020Cl,
    Rgb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorLevels {
    Limited,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorPrimaries {
    Bt601_525,
    Bt601_625,
    Bt709,
    Bt2020,
    DciP3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferFunction {
    Bt1886,
    Srgb,
    Linear,
    Pq,
    Hlg,
}

/// Color description; unset fields are `None`, an unset peak is 0
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ColorParams {
    pub space: Option<ColorSpace>,
    pub levels: Option<ColorLevels>,
    pub primaries: Option<ColorPrimaries>,
    pub transfer: Option<TransferFunction>,
    /// HDR signal peak, relative to reference white
    pub sig_peak: f32,
}

impl ColorParams {
    /// Fill every unset field from `other`
    pub fn merge(&mut self, other: &ColorParams) {
        self.space = self.space.or(other.space);
        self.levels = self.levels.or(other.levels);
        self.primaries = self.primaries.or(other.primaries);
        self.transfer = self.transfer.or(other.transfer);
        if self.sig_peak == 0.0 {
            self.sig_peak = other.sig_peak;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SphericalKind {
    #[default]
    Auto,
    None,
    Unknown,
    Equirect,
}

/// Spherical (360°) video metadata
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Spherical {
    pub kind: SphericalKind,
    /// yaw, pitch, roll in degrees
    pub ref_angles: [f32; 3],
}

/// Image parameters of a decoded frame
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ImageParams {
    /// Opaque pixel format identifier, passed through untouched
    pub pixel_format: u32,
    pub w: u32,
    pub h: u32,
    /// Pixel aspect ratio; 0:0 means unknown
    pub p_w: u32,
    pub p_h: u32,
    pub color: ColorParams,
    /// Rotation in degrees, clockwise
    pub rotate: u32,
    pub stereo_in: StereoMode,
    pub stereo_out: StereoMode,
    pub spherical: Spherical,
}

impl ImageParams {
    /// Create parameters for a `w`x`h` image with unknown aspect
    pub fn new(w: u32, h: u32) -> Self {
        Self {
            w,
            h,
            ..Default::default()
        }
    }

    /// Set the pixel aspect so the display aspect becomes `d_w:d_h`
    pub fn set_display_size(&mut self, d_w: u64, d_h: u64) {
        let (p_w, p_h) = reduce(
            d_w.saturating_mul(self.h as u64),
            d_h.saturating_mul(self.w as u64),
        );
        self.p_w = u32::try_from(p_w).unwrap_or(0);
        self.p_h = u32::try_from(p_h).unwrap_or(0);
    }
}

impl std::fmt::Display for ImageParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{} [{}:{}] fmt={} rot={} peak={}",
            self.w, self.h, self.p_w, self.p_h, self.pixel_format, self.rotate, self.color.sig_peak
        )
    }
}

/// Largest display aspect accepted from the user
const MAX_MOVIE_ASPECT: f64 = 10.0;

/// A peak is valid when unset or within [1, 100]
pub fn is_valid_peak(sig_peak: f32) -> bool {
    sig_peak == 0.0 || (1.0..=100.0).contains(&sig_peak)
}

/// Derive the output parameters from what the decoder reported
pub fn fix_image_params(
    params: &ImageParams,
    codec: &CodecParams,
    opts: &DecoderOptions,
) -> ImageParams {
    let mut p = *params;

    // The decoder signals an unknown bitstream aspect with 0:0.
    let mut use_container = true;
    if opts.aspect_method == AspectMethod::Bitstream && p.p_w > 0 && p.p_h > 0 {
        debug!("Decoder: using bitstream aspect ratio");
        use_container = false;
    }

    if use_container && codec.par_w > 0 && codec.par_h > 0 {
        debug!("Decoder: using container aspect ratio");
        p.p_w = codec.par_w;
        p.p_h = codec.par_h;
    }

    if let Some(aspect) = opts.movie_aspect.filter(|a| *a >= 0.0) {
        debug!("Decoder: forcing user-set aspect ratio");
        if aspect == 0.0 {
            p.p_w = 1;
            p.p_h = 1;
        } else {
            let (num, den) = approximate_ratio(aspect.min(MAX_MOVIE_ASPECT), 10_000);
            p.set_display_size(num, den);
        }
    }

    // Assume square pixels if no aspect ratio is set at all.
    if p.p_w == 0 || p.p_h == 0 {
        p.p_w = 1;
        p.p_h = 1;
    }

    p.stereo_in = codec.stereo_mode;
    p.rotate = match opts.video_rotate {
        Some(user) => (codec.rotate % 360 + user % 360) % 360,
        None => 0,
    };
    p.stereo_out = opts.stereo_out;

    p.color.merge(&codec.color);

    if !is_valid_peak(p.color.sig_peak) {
        warn!("Decoder: invalid HDR peak in stream: {}", p.color.sig_peak);
        p.color.sig_peak = 0.0;
    }

    p.spherical = codec.spherical;
    if p.spherical.kind == SphericalKind::Auto {
        p.spherical.kind = SphericalKind::None;
    }

    p
}

/// Cached raw and derived parameters
///
/// Recomputation happens only when the decoder reports a parameter set that
/// differs from the last one seen.
#[derive(Debug, Clone, Default)]
pub struct ParamsCache {
    last: Option<ImageParams>,
    fixed: ImageParams,
    dec_format: ImageParams,
    updates: u64,
}

impl ParamsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the derived parameters for `incoming`, recomputing if needed
    pub fn apply(
        &mut self,
        incoming: &ImageParams,
        codec: &CodecParams,
        opts: &DecoderOptions,
    ) -> ImageParams {
        if self.last.as_ref() != Some(incoming) {
            debug!("Decoder: format {}", incoming);
            self.dec_format = *incoming;
            self.fixed = fix_image_params(incoming, codec, opts);
            self.last = Some(*incoming);
            self.updates += 1;
        }
        self.fixed
    }

    /// Number of times the derived parameters were recomputed
    pub fn updates(&self) -> u64 {
        self.updates
    }

    /// Raw parameters last reported by the decoder
    pub fn decoder_format(&self) -> ImageParams {
        self.dec_format
    }

    /// Force recomputation on the next frame
    pub fn invalidate(&mut self) {
        self.last = None;
    }

    /// Forget everything
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn reduce(num: u64, den: u64) -> (u64, u64) {
    match gcd(num, den) {
        0 => (0, 0),
        g => (num / g, den / g),
    }
}

/// Best rational approximation of `value` with a denominator up to `max_den`
fn approximate_ratio(value: f64, max_den: u64) -> (u64, u64) {
    if !value.is_finite() || value <= 0.0 {
        return (0, 1);
    }

    let (mut h0, mut h1) = (0u64, 1u64);
    let (mut k0, mut k1) = (1u64, 0u64);
    let mut x = value;

    loop {
        let a = x.floor() as u64;
        let h2 = a.saturating_mul(h1).saturating_add(h0);
        let k2 = a.saturating_mul(k1).saturating_add(k0);
        if k2 > max_den {
            break;
        }
        (h0, h1) = (h1, h2);
        (k0, k1) = (k1, k2);

        let frac = x - x.floor();
        if frac < 1e-9 {
            break;
        }
        x = 1.0 / frac;
    }

    if k1 == 0 { (0, 1) } else { (h1, k1) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> DecoderOptions {
        DecoderOptions::default()
    }

    #[test]
    fn test_valid_peak() {
        assert!(is_valid_peak(0.0));
        assert!(is_valid_peak(1.0));
        assert!(is_valid_peak(100.0));
        assert!(!is_valid_peak(0.5));
        assert!(!is_valid_peak(150.0));
    }

    #[test]
    fn test_square_pixel_fallback() {
        let fixed = fix_image_params(&ImageParams::new(640, 480), &CodecParams::new("h264"), &opts());
        assert_eq!((fixed.p_w, fixed.p_h), (1, 1));
    }

    #[test]
    fn test_bitstream_aspect_beats_container() {
        let mut params = ImageParams::new(720, 576);
        params.p_w = 16;
        params.p_h = 15;
        let mut codec = CodecParams::new("mpeg2video");
        codec.par_w = 64;
        codec.par_h = 45;

        let fixed = fix_image_params(&params, &codec, &opts());
        assert_eq!((fixed.p_w, fixed.p_h), (16, 15));

        let container = DecoderOptions {
            aspect_method: AspectMethod::Container,
            ..opts()
        };
        let fixed = fix_image_params(&params, &codec, &container);
        assert_eq!((fixed.p_w, fixed.p_h), (64, 45));
    }

    #[test]
    fn test_user_aspect_always_wins() {
        let mut params = ImageParams::new(1440, 1080);
        params.p_w = 4;
        params.p_h = 3;
        let o = DecoderOptions {
            movie_aspect: Some(16.0 / 9.0),
            ..opts()
        };

        let fixed = fix_image_params(&params, &CodecParams::new("h264"), &o);
        // 16:9 display on 1440x1080 -> 4:3 pixels
        assert_eq!((fixed.p_w, fixed.p_h), (4, 3));

        let o = DecoderOptions {
            movie_aspect: Some(0.0),
            ..opts()
        };
        let fixed = fix_image_params(&params, &CodecParams::new("h264"), &o);
        assert_eq!((fixed.p_w, fixed.p_h), (1, 1));
    }

    #[test]
    fn test_rotation_composition() {
        let mut codec = CodecParams::new("h264");
        codec.rotate = 270;
        let o = DecoderOptions {
            video_rotate: Some(180),
            ..opts()
        };
        let fixed = fix_image_params(&ImageParams::new(10, 10), &codec, &o);
        assert_eq!(fixed.rotate, 90);

        let o = DecoderOptions {
            video_rotate: None,
            ..opts()
        };
        let fixed = fix_image_params(&ImageParams::new(10, 10), &codec, &o);
        assert_eq!(fixed.rotate, 0);
    }

    #[test]
    fn test_huge_user_rotation_wraps() {
        let mut codec = CodecParams::new("h264");
        codec.rotate = 90;
        let o = DecoderOptions {
            video_rotate: Some(u32::MAX),
            ..opts()
        };
        let fixed = fix_image_params(&ImageParams::new(10, 10), &codec, &o);
        // u32::MAX % 360 == 255
        assert_eq!(fixed.rotate, 345);
    }

    #[test]
    fn test_huge_user_aspect_is_clamped() {
        let o = DecoderOptions {
            movie_aspect: Some(1e20),
            ..opts()
        };
        let fixed = fix_image_params(&ImageParams::new(1920, 1080), &CodecParams::new("h264"), &o);
        // clamped to a 10:1 display
        assert_eq!((fixed.p_w, fixed.p_h), (45, 8));

        let mut params = ImageParams::new(1920, 1080);
        params.set_display_size(u64::MAX, 1);
        assert_eq!((params.p_w, params.p_h), (0, 128));
    }

    #[test]
    fn test_color_merge_and_peak_sanitize() {
        let mut params = ImageParams::new(10, 10);
        params.color.space = Some(ColorSpace::Bt709);
        params.color.sig_peak = 150.0;
        let mut codec = CodecParams::new("hevc");
        codec.color.space = Some(ColorSpace::Bt2020Ncl);
        codec.color.transfer = Some(TransferFunction::Pq);

        let fixed = fix_image_params(&params, &codec, &opts());
        assert_eq!(fixed.color.space, Some(ColorSpace::Bt709));
        assert_eq!(fixed.color.transfer, Some(TransferFunction::Pq));
        assert_eq!(fixed.color.sig_peak, 0.0);
    }

    #[test]
    fn test_spherical_and_stereo_defaults() {
        let mut codec = CodecParams::new("h264");
        codec.stereo_mode = StereoMode::TopBottomLeftFirst;
        let fixed = fix_image_params(&ImageParams::new(10, 10), &codec, &opts());
        assert_eq!(fixed.spherical.kind, SphericalKind::None);
        assert_eq!(fixed.stereo_in, StereoMode::TopBottomLeftFirst);
        assert_eq!(fixed.stereo_out, StereoMode::Mono);
    }

    #[test]
    fn test_cache_recomputes_only_on_change() {
        let mut cache = ParamsCache::new();
        let codec = CodecParams::new("h264");
        let mut params = ImageParams::new(10, 10);
        params.color.sig_peak = 150.0;

        let first = cache.apply(&params, &codec, &opts());
        assert_eq!(first.color.sig_peak, 0.0);
        assert_eq!(cache.decoder_format().color.sig_peak, 150.0);

        // Changing the codec does not matter while the incoming set is unchanged
        let mut rotated = codec.clone();
        rotated.rotate = 90;
        assert_eq!(cache.apply(&params, &rotated, &opts()).rotate, 0);

        cache.invalidate();
        assert_eq!(cache.apply(&params, &rotated, &opts()).rotate, 90);
    }

    #[test]
    fn test_approximate_ratio() {
        assert_eq!(approximate_ratio(16.0 / 9.0, 10_000), (16, 9));
        assert_eq!(approximate_ratio(2.35, 10_000), (47, 20));
        assert_eq!(approximate_ratio(-1.0, 10_000), (0, 1));
    }
}

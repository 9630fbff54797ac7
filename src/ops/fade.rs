// ============================================================================
// FILL FADE - time-boxed ease-out reveal of a freshly computed region
// ============================================================================

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::canvas::{blend_over, Surface};
use crate::ops::flood_fill::FillRegion;

pub const FILL_FADE: Duration = Duration::from_millis(300);

/// 1 - (1 - t)^3, clamped to `0..=1`.
pub fn ease_out_cubic(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t).powi(3)
}

/// An in-flight reveal. Remembers what the fill surface held under each
/// point so every frame can blend from the original pixels.
pub struct FillFade {
    region: Arc<FillRegion>,
    started: Instant,
    duration: Duration,
    base: Vec<[u8; 4]>,
}

impl FillFade {
    pub fn start(region: Arc<FillRegion>, fill: &Surface, now: Instant, duration: Duration) -> Self {
        let base = region
            .points()
            .iter()
            .map(|&(x, y)| fill.get_pixel(x, y))
            .collect();
        Self {
            region,
            started: now,
            duration,
            base,
        }
    }

    pub fn region(&self) -> &Arc<FillRegion> {
        &self.region
    }

    /// Linear progress in `0..=1`.
    pub fn progress(&self, now: Instant) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.started);
        (elapsed.as_secs_f32() / self.duration.as_secs_f32()).min(1.0)
    }

    pub fn is_finished(&self, now: Instant) -> bool {
        self.progress(now) >= 1.0
    }

    /// Render the frame for `now`. Returns `true` once the region is fully
    /// opaque.
    pub fn apply(&self, fill: &mut Surface, now: Instant) -> bool {
        if self.is_finished(now) {
            self.complete(fill);
            return true;
        }
        let alpha = (ease_out_cubic(self.progress(now)) * 255.0).round() as u8;
        let top = self.region.color().to_rgba(alpha);
        for (&(x, y), &under) in self.region.points().iter().zip(&self.base) {
            fill.put_pixel(x, y, blend_over(under, top));
        }
        false
    }

    /// Snap straight to the final, fully opaque state.
    pub fn complete(&self, fill: &mut Surface) {
        self.region.paint_onto(fill, 255);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::PixelRect;
    use crate::components::colors::Rgb;

    fn region() -> Arc<FillRegion> {
        Arc::new(FillRegion::new(
            Rgb::new(200, 0, 0),
            vec![(0, 0), (1, 0)],
            PixelRect::new(0, 0, 2, 1),
        ))
    }

    #[test]
    fn easing_is_monotonic_and_bounded() {
        assert_eq!(ease_out_cubic(0.0), 0.0);
        assert_eq!(ease_out_cubic(1.0), 1.0);
        assert_eq!(ease_out_cubic(3.0), 1.0);
        let mut prev = 0.0;
        for i in 1..=20 {
            let v = ease_out_cubic(i as f32 / 20.0);
            assert!(v >= prev);
            prev = v;
        }
        // ease-out front-loads the change
        assert!(ease_out_cubic(0.5) > 0.5);
    }

    #[test]
    fn fade_reaches_full_opacity_at_the_end() {
        let t0 = Instant::now();
        let mut fill = Surface::new(2, 1);
        let fade = FillFade::start(region(), &fill, t0, FILL_FADE);

        assert!(!fade.apply(&mut fill, t0 + Duration::from_millis(100)));
        let mid = fill.get_pixel(0, 0);
        assert!(mid[3] > 0 && mid[3] < 255);

        assert!(fade.apply(&mut fill, t0 + FILL_FADE));
        assert_eq!(fill.get_pixel(0, 0), [200, 0, 0, 255]);
        assert_eq!(fill.get_pixel(1, 0), [200, 0, 0, 255]);
    }

    #[test]
    fn zero_duration_completes_immediately() {
        let t0 = Instant::now();
        let mut fill = Surface::new(2, 1);
        let fade = FillFade::start(region(), &fill, t0, Duration::ZERO);
        assert!(fade.apply(&mut fill, t0));
        assert_eq!(fill.get_pixel(1, 0), [200, 0, 0, 255]);
    }

    #[test]
    fn fade_blends_from_previous_fill_colour() {
        let t0 = Instant::now();
        let mut fill = Surface::new(2, 1);
        fill.put_pixel(0, 0, [0, 0, 200, 255]);
        let fade = FillFade::start(region(), &fill, t0, FILL_FADE);
        fade.apply(&mut fill, t0 + Duration::from_millis(30));
        let px = fill.get_pixel(0, 0);
        assert_eq!(px[3], 255);
        assert!(px[2] > 0 && px[0] > 0);
    }
}

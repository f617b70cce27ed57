// THEORY:
// A difference image is mostly black: the interesting pixels are sparse and
// their magnitude is small. A colormap turns the scalar magnitude of each
// difference pixel into a color that stands out against the candidate once
// the two are blended, so a reviewer can see *where* a render drifted.
//
// The maps are fixed tables of key stops. A lookup clamps its input to
// [0, 1], finds the bracketing pair of stops and interpolates linearly.

/// Rec. 709 luma weights, used to collapse an RGB difference into one scalar.
const LUMA_WEIGHTS: [f32; 3] = [0.2126, 0.7152, 0.0722];

// Key stops sampled from matplotlib's inferno at 1/8 intervals.
const INFERNO_STOPS: [[f32; 3]; 9] = [
    [0.001462, 0.000466, 0.013866],
    [0.121380, 0.047098, 0.281477],
    [0.334994, 0.058950, 0.427397],
    [0.533488, 0.133743, 0.415692],
    [0.729909, 0.212759, 0.333861],
    [0.890340, 0.347814, 0.199460],
    [0.976690, 0.556586, 0.034930],
    [0.972355, 0.788025, 0.196453],
    [0.988362, 0.998364, 0.644924],
];

// Black through blue and yellow to red.
const HEAT_STOPS: [[f32; 3]; 4] = [
    [0.0, 0.0, 0.0],
    [0.0, 0.0, 1.0],
    [1.0, 1.0, 0.0],
    [1.0, 0.0, 0.0],
];

const GRAYSCALE_STOPS: [[f32; 3]; 2] = [[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]];

/// A scalar-to-color lookup applied to difference images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Colormap {
    /// Perceptually uniform dark-to-bright heat scale.
    #[default]
    Inferno,
    /// Black to blue to yellow to red ramp.
    Heat,
    /// Identity: the scalar becomes a gray level.
    Grayscale,
}

impl Colormap {
    fn stops(&self) -> &'static [[f32; 3]] {
        match self {
            Colormap::Inferno => &INFERNO_STOPS,
            Colormap::Heat => &HEAT_STOPS,
            Colormap::Grayscale => &GRAYSCALE_STOPS,
        }
    }

    /// Maps a scalar in `[0, 1]` to an RGB triple. Out-of-range input is clamped.
    pub fn lookup(&self, value: f32) -> [f32; 3] {
        let stops = self.stops();
        let value = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };

        let segments = (stops.len() - 1) as f32;
        let position = value * segments;
        let index = (position.floor() as usize).min(stops.len() - 2);
        let t = position - index as f32;

        let low = stops[index];
        let high = stops[index + 1];
        [
            low[0] + (high[0] - low[0]) * t,
            low[1] + (high[1] - low[1]) * t,
            low[2] + (high[2] - low[2]) * t,
        ]
    }

    /// Collapses an RGB pixel to luminance and maps it.
    pub fn map_pixel(&self, rgb: [f32; 3]) -> [f32; 3] {
        self.lookup(luminance(rgb))
    }
}

pub fn luminance(rgb: [f32; 3]) -> f32 {
    rgb[0] * LUMA_WEIGHTS[0] + rgb[1] * LUMA_WEIGHTS[1] + rgb[2] * LUMA_WEIGHTS[2]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: [f32; 3], b: [f32; 3]) -> bool {
        a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < 1e-5)
    }

    #[test]
    fn endpoints_hit_first_and_last_stop() {
        for map in [Colormap::Inferno, Colormap::Heat, Colormap::Grayscale] {
            let stops = map.stops();
            assert!(close(map.lookup(0.0), stops[0]));
            assert!(close(map.lookup(1.0), stops[stops.len() - 1]));
        }
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let map = Colormap::Heat;
        assert!(close(map.lookup(-3.0), map.lookup(0.0)));
        assert!(close(map.lookup(7.5), map.lookup(1.0)));
        assert!(close(map.lookup(f32::NAN), map.lookup(0.0)));
    }

    #[test]
    fn heat_ramps_from_black_through_yellow() {
        assert!(close(Colormap::Heat.lookup(0.0), [0.0, 0.0, 0.0]));
        assert!(close(Colormap::Heat.lookup(1.0 / 3.0), [0.0, 0.0, 1.0]));
        assert!(close(Colormap::Heat.lookup(0.5), [0.5, 0.5, 0.5]));
        assert!(close(Colormap::Heat.lookup(2.0 / 3.0), [1.0, 1.0, 0.0]));
    }

    #[test]
    fn every_map_sends_zero_to_black() {
        for map in [Colormap::Inferno, Colormap::Heat, Colormap::Grayscale] {
            assert!(luminance(map.lookup(0.0)) < 0.01, "{map:?}");
        }
    }

    #[test]
    fn grayscale_is_identity_on_luminance() {
        let mapped = Colormap::Grayscale.map_pixel([0.4, 0.4, 0.4]);
        assert!(close(mapped, [0.4, 0.4, 0.4]));
    }

    #[test]
    fn inferno_brightens_monotonically() {
        let mut previous = -1.0;
        for step in 0..=32 {
            let rgb = Colormap::Inferno.lookup(step as f32 / 32.0);
            let lum = luminance(rgb);
            assert!(lum >= previous, "luminance dropped at step {step}");
            previous = lum;
        }
    }
}

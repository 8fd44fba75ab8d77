//! `Color` — a Lab-space color value used throughout the engine.
//!
//! `L` is stored in `[0,100]`, `a`/`b` roughly in `[-128,127]`, matching the
//! CIELAB convention the rest of the pack's color crates (`palette`) use.

use std::{
    iter::Sum,
    ops::{Add, AddAssign, Div, DivAssign, Mul, Sub},
};

use glam::DVec3;
use palette::{white_point::D65, FromColor, IntoColor, Lab, Srgb};

/// A single Lab color value, `(L, a, b)`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(transparent)]
pub struct Color(DVec3);

impl Color {
    /// `L=a=b=0`.
    pub const BLACK: Color = Color(DVec3::ZERO);

    /// Construct a color from its Lab components.
    pub fn new(l: f64, a: f64, b: f64) -> Self {
        Color(DVec3 { x: l, y: a, z: b })
    }

    /// The components as `[L, a, b]`.
    pub fn to_array(&self) -> [f64; 3] {
        [self.0.x, self.0.y, self.0.z]
    }

    /// Euclidean distance in Lab space.
    pub fn distance(&self, rhs: Color) -> f64 {
        self.0.distance(rhs.0)
    }

    /// The arithmetic mean of a slice of colors.
    pub fn average(colors: &[Color]) -> Color {
        if colors.is_empty() {
            return Color::BLACK;
        }
        colors.iter().copied().sum::<Color>() / colors.len() as f64
    }

    /// Shift this color by `delta`, added componentwise to `L,a,b`.
    pub fn perturb(&mut self, delta: DVec3) {
        self.0 += delta;
    }

    /// Scale the `a`,`b` channels by `saturation`, leaving `L` untouched.
    pub fn saturated(&self, saturation: f64) -> Color {
        Color::new(self.l(), self.a() * saturation, self.b() * saturation)
    }

    /// Convert to 8-bit sRGB, clamping out-of-gamut values.
    pub fn to_rgb8(&self) -> [u8; 3] {
        let lab = Lab::<D65, f64>::new(self.l(), self.a(), self.b());
        let srgb: Srgb<f64> = Srgb::from_color(lab);
        let srgb = srgb.into_format::<u8>();
        [srgb.red, srgb.green, srgb.blue]
    }

    /// Build a `Color` from an 8-bit sRGB triplet.
    pub fn from_rgb8(rgb: [u8; 3]) -> Color {
        let srgb: Srgb<f64> = Srgb::new(rgb[0], rgb[1], rgb[2]).into_format();
        let lab: Lab<D65, f64> = srgb.into_color();
        Color::new(lab.l, lab.a, lab.b)
    }

    pub fn l(&self) -> f64 {
        self.0.x
    }

    pub fn a(&self) -> f64 {
        self.0.y
    }

    pub fn b(&self) -> f64 {
        self.0.z
    }
}

impl Add for Color {
    type Output = Color;

    fn add(self, rhs: Self) -> Self::Output {
        Color(self.0 + rhs.0)
    }
}

impl AddAssign<Color> for Color {
    fn add_assign(&mut self, rhs: Color) {
        self.0 += rhs.0;
    }
}

impl Sub for Color {
    type Output = Color;

    fn sub(self, rhs: Self) -> Self::Output {
        Color(self.0 - rhs.0)
    }
}

impl Sum for Color {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        let mut color = Color::BLACK;
        for c in iter {
            color += c;
        }
        color
    }
}

impl Mul<f64> for Color {
    type Output = Color;

    fn mul(self, rhs: f64) -> Self::Output {
        Color(self.0 * rhs)
    }
}

impl Div<f64> for Color {
    type Output = Color;

    fn div(self, rhs: f64) -> Self::Output {
        Color(self.0 / rhs)
    }
}

impl DivAssign<f64> for Color {
    fn div_assign(&mut self, rhs: f64) {
        self.0 /= rhs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_symmetric_and_zero_for_self() {
        let a = Color::new(50.0, 10.0, -5.0);
        let b = Color::new(30.0, -2.0, 8.0);
        assert_eq!(a.distance(a), 0.0);
        assert!((a.distance(b) - b.distance(a)).abs() < 1e-12);
    }

    #[test]
    fn average_of_empty_is_black() {
        assert_eq!(Color::average(&[]), Color::BLACK);
    }

    #[test]
    fn saturated_leaves_l_untouched() {
        let c = Color::new(40.0, 10.0, -10.0);
        let s = c.saturated(1.5);
        assert_eq!(s.l(), 40.0);
        assert!((s.a() - 15.0).abs() < 1e-9);
        assert!((s.b() + 15.0).abs() < 1e-9);
    }
}

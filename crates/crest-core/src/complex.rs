//! Minimal complex pair for the wave extractor. Only the operations the
//! controller needs; not a general complex-number library.

use std::ops::{Add, Div, Mul, Sub};

/// A complex amplitude as an explicit `(re, im)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Complex {
    pub re: f64,
    pub im: f64,
}

impl Complex {
    pub const ZERO: Complex = Complex { re: 0.0, im: 0.0 };

    pub fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    /// Magnitude of the component.
    pub fn abs(self) -> f64 {
        self.re.hypot(self.im)
    }
}

impl Add for Complex {
    type Output = Complex;

    fn add(self, rhs: Complex) -> Complex {
        Complex::new(self.re + rhs.re, self.im + rhs.im)
    }
}

impl Sub for Complex {
    type Output = Complex;

    fn sub(self, rhs: Complex) -> Complex {
        Complex::new(self.re - rhs.re, self.im - rhs.im)
    }
}

impl Mul<f64> for Complex {
    type Output = Complex;

    fn mul(self, scale: f64) -> Complex {
        Complex::new(self.re * scale, self.im * scale)
    }
}

impl Div<f64> for Complex {
    type Output = Complex;

    fn div(self, scale: f64) -> Complex {
        Complex::new(self.re / scale, self.im / scale)
    }
}

impl Div for Complex {
    type Output = Complex;

    fn div(self, rhs: Complex) -> Complex {
        let denom = rhs.re * rhs.re + rhs.im * rhs.im;
        Complex::new(
            (self.re * rhs.re + self.im * rhs.im) / denom,
            (self.im * rhs.re - self.re * rhs.im) / denom,
        )
    }
}

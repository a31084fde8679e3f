// Frequency analysis for the level meter
//
// Mirrors the behaviour of a Web Audio AnalyserNode: the most recent
// `fft_size` samples are Blackman-windowed, transformed, smoothed over time
// and mapped from decibels onto an 8-bit magnitude scale.

use anyhow::{bail, Result};
use std::collections::VecDeque;
use std::f32::consts::PI;

pub const DEFAULT_FFT_SIZE: usize = 256;
pub const DEFAULT_SMOOTHING: f32 = 0.8;
pub const DEFAULT_MIN_DECIBELS: f32 = -100.0;
pub const DEFAULT_MAX_DECIBELS: f32 = -30.0;

pub struct Analyser {
    fft_size: usize,
    smoothing: f32,
    min_decibels: f32,
    max_decibels: f32,
    window: Vec<f32>,
    samples: VecDeque<f32>,
    smoothed: Vec<f32>,
}

impl Analyser {
    pub fn new(fft_size: usize) -> Result<Self> {
        if !fft_size.is_power_of_two() || !(32..=32768).contains(&fft_size) {
            bail!(
                "FFT size must be a power of two between 32 and 32768, got {}",
                fft_size
            );
        }

        Ok(Self {
            fft_size,
            smoothing: DEFAULT_SMOOTHING,
            min_decibels: DEFAULT_MIN_DECIBELS,
            max_decibels: DEFAULT_MAX_DECIBELS,
            window: blackman_window(fft_size),
            samples: VecDeque::from(vec![0.0; fft_size]),
            smoothed: vec![0.0; fft_size / 2],
        })
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Append mono samples, keeping only the most recent window.
    pub fn push_samples(&mut self, samples: &[f32]) {
        for &sample in samples {
            if self.samples.len() == self.fft_size {
                self.samples.pop_front();
            }
            self.samples.push_back(sample);
        }
    }

    /// Fill `out` with 8-bit magnitudes, one per frequency bin.
    pub fn byte_frequency_data(&mut self, out: &mut [u8]) {
        let mut spectrum: Vec<Complex> = self
            .samples
            .iter()
            .zip(&self.window)
            .map(|(s, w)| Complex::new(s * w, 0.0))
            .collect();
        fft(&mut spectrum);

        let n = self.fft_size as f32;
        let range = self.max_decibels - self.min_decibels;
        let tau = self.smoothing;

        for (k, bin) in self.smoothed.iter_mut().enumerate() {
            let magnitude = spectrum[k].norm() / n;
            let next = tau * *bin + (1.0 - tau) * magnitude;
            *bin = if next.is_finite() { next } else { 0.0 };
        }

        for (slot, &magnitude) in out.iter_mut().zip(&self.smoothed) {
            let db = 20.0 * magnitude.log10();
            let scaled = (255.0 / range * (db - self.min_decibels)).floor();
            *slot = if scaled.is_nan() {
                0
            } else {
                scaled.clamp(0.0, 255.0) as u8
            };
        }
    }
}

/// Mean of 8-bit magnitudes, normalized to [0, 1].
pub fn normalized_level(bins: &[u8]) -> f32 {
    if bins.is_empty() {
        return 0.0;
    }
    let sum: u64 = bins.iter().map(|&b| b as u64).sum();
    (sum as f64 / bins.len() as f64 / 255.0) as f32
}

fn blackman_window(size: usize) -> Vec<f32> {
    let alpha = 0.16;
    let a0 = (1.0 - alpha) / 2.0;
    let a1 = 0.5;
    let a2 = alpha / 2.0;
    (0..size)
        .map(|i| {
            let x = i as f32 / size as f32;
            a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
struct Complex {
    re: f32,
    im: f32,
}

impl Complex {
    fn new(re: f32, im: f32) -> Self {
        Self { re, im }
    }

    fn norm(self) -> f32 {
        (self.re * self.re + self.im * self.im).sqrt()
    }

    fn mul(self, other: Complex) -> Complex {
        Complex::new(
            self.re * other.re - self.im * other.im,
            self.re * other.im + self.im * other.re,
        )
    }
}

/// In-place iterative radix-2 FFT. Length must be a power of two.
fn fft(data: &mut [Complex]) {
    let n = data.len();
    if n <= 1 {
        return;
    }

    // Bit-reversal permutation
    let mut j = 0;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j |= bit;
        if i < j {
            data.swap(i, j);
        }
    }

    let mut len = 2;
    while len <= n {
        let angle = -2.0 * PI / len as f32;
        let step = Complex::new(angle.cos(), angle.sin());
        for start in (0..n).step_by(len) {
            let mut w = Complex::new(1.0, 0.0);
            for k in 0..len / 2 {
                let even = data[start + k];
                let odd = data[start + k + len / 2].mul(w);
                data[start + k] = Complex::new(even.re + odd.re, even.im + odd.im);
                data[start + k + len / 2] = Complex::new(even.re - odd.re, even.im - odd.im);
                w = w.mul(step);
            }
        }
        len <<= 1;
    }
}

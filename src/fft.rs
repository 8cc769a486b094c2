use num::{Complex, Zero};

use rustfft::{FftDirection, FftNum, FftPlanner};

/// FFT helper reused across the rings of one harmonic transform.
///
/// Rings of a HEALPix map have many different lengths; the planner caches one
/// plan per length and the scratch buffer only grows.
pub struct RingFft<T: FftNum> {
    planner: FftPlanner<T>,
    scratch: Vec<Complex<T>>,
}

impl<T: FftNum> Default for RingFft<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: FftNum> RingFft<T> {
    pub fn new() -> Self {
        RingFft {
            planner: FftPlanner::new(),
            scratch: Vec::new(),
        }
    }

    fn _fft(&mut self, input: &mut [Complex<T>], output: &mut [Complex<T>], inverse: bool) {
        assert_eq!(input.len(), output.len());
        let len = input.len();
        let fft = self.planner.plan_fft(
            len,
            if inverse {
                FftDirection::Inverse
            } else {
                FftDirection::Forward
            },
        );
        let scratch_len = fft.get_outofplace_scratch_len();
        if self.scratch.len() < scratch_len {
            self.scratch.resize(scratch_len, Complex::zero());
        }
        fft.process_outofplace_with_scratch(input, output, &mut self.scratch[..scratch_len]);
    }

    pub fn fft(&mut self, input: &mut [Complex<T>], output: &mut [Complex<T>]) {
        self._fft(input, output, false);
    }

    /// Unnormalised inverse transform.
    pub fn ifft(&mut self, input: &mut [Complex<T>], output: &mut [Complex<T>]) {
        self._fft(input, output, true);
    }
}

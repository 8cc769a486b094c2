use std::f64::consts::PI;

pub fn nside2npix(nside: usize) -> usize {
    12 * nside * nside
}

pub fn npix2nside(npix: usize) -> usize {
    ((npix / 12) as f64).sqrt().round() as usize
}

pub fn nside2nring(nside: usize) -> usize {
    4 * nside - 1
}

/// Largest resolution of the 64-bit HEALPix scheme.
pub const MAX_NSIDE: usize = 1 << 29;

pub fn is_valid_nside(nside: usize) -> bool {
    nside > 0 && nside <= MAX_NSIDE && nside.is_power_of_two()
}

pub fn pix_area(nside: usize) -> f64 {
    4.0 * PI / nside2npix(nside) as f64
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ring {
    pub z: f64,
    pub nphi: usize,
    pub phi0: f64,
    pub first_pix: usize,
}

pub fn ring_info(nside: usize, iring: usize) -> Ring {
    assert!(iring >= 1 && iring <= nside2nring(nside));
    let nsidef = nside as f64;
    let npix = nside2npix(nside);
    let ncap = 2 * nside * (nside - 1);
    if iring < nside {
        let r = iring as f64;
        Ring {
            z: 1.0 - r * r / (3.0 * nsidef * nsidef),
            nphi: 4 * iring,
            phi0: PI / (4.0 * r),
            first_pix: 2 * iring * (iring - 1),
        }
    } else if iring <= 3 * nside {
        let shifted = (iring + nside) % 2 == 0;
        Ring {
            z: 4.0 / 3.0 - 2.0 * iring as f64 / (3.0 * nsidef),
            nphi: 4 * nside,
            phi0: if shifted { PI / (4.0 * nsidef) } else { 0.0 },
            first_pix: ncap + (iring - nside) * 4 * nside,
        }
    } else {
        let is = 4 * nside - iring;
        let r = is as f64;
        Ring {
            z: -(1.0 - r * r / (3.0 * nsidef * nsidef)),
            nphi: 4 * is,
            phi0: PI / (4.0 * r),
            first_pix: npix - 2 * is * (is + 1),
        }
    }
}

pub fn rings(nside: usize) -> impl Iterator<Item = Ring> {
    (1..=nside2nring(nside)).map(move |iring| ring_info(nside, iring))
}

/// Pixelisation attenuation of a map at resolution `nside`.
pub trait PixelWindow: Send + Sync {
    fn pixel_window(&self, nside: usize, l: usize) -> f64;
}

/// Gaussian limit of a disc with the pixel's area:
/// `w_l = exp(-l (l + 1) Omega_pix / (8 pi))`.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiscPixelWindow;

impl PixelWindow for DiscPixelWindow {
    fn pixel_window(&self, nside: usize, l: usize) -> f64 {
        let l = l as f64;
        (-l * (l + 1.0) * pix_area(nside) / (8.0 * PI)).exp()
    }
}

use std::f64::consts::PI;

use ndarray::Array2;

pub fn linspace(start: f64, stop: f64, num: usize) -> Vec<f64> {
    match num {
        0 => vec![],
        1 => vec![start],
        _ => {
            let step = (stop - start) / (num - 1) as f64;
            (0..num)
                .map(|i| if i == num - 1 { stop } else { start + step * i as f64 })
                .collect()
        }
    }
}

pub fn trapz(y: &[f64], x: &[f64]) -> f64 {
    assert_eq!(y.len(), x.len());
    x.windows(2)
        .zip(y.windows(2))
        .map(|(x, y)| 0.5 * (x[1] - x[0]) * (y[0] + y[1]))
        .sum()
}

/// Linear interpolation on an ascending grid, zero outside `[xp[0], xp[n-1]]`.
pub fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    assert_eq!(xp.len(), fp.len());
    let n = xp.len();
    if n == 0 || x < xp[0] || x > xp[n - 1] {
        return 0.0;
    }
    if n == 1 {
        return fp[0];
    }
    let i = xp.partition_point(|&v| v <= x).clamp(1, n - 1);
    let (x0, x1) = (xp[i - 1], xp[i]);
    if x1 == x0 {
        return fp[i];
    }
    let t = (x - x0) / (x1 - x0);
    fp[i - 1] + t * (fp[i] - fp[i - 1])
}

/// Composite Simpson rule with `n` (rounded up to even) intervals.
pub fn simpson<F>(f: F, a: f64, b: f64, n: usize) -> f64
where
    F: Fn(f64) -> f64,
{
    let n = (n.max(2) + 1) / 2 * 2;
    let h = (b - a) / n as f64;
    let inner = (1..n)
        .map(|i| {
            let w = if i % 2 == 1 { 4.0 } else { 2.0 };
            w * f(a + h * i as f64)
        })
        .sum::<f64>();
    (f(a) + inner + f(b)) * h / 3.0
}

/// Gauss-Legendre nodes (ascending) and weights on `[-1, 1]`.
pub fn gauss_legendre(n: usize) -> (Vec<f64>, Vec<f64>) {
    let mut x = vec![0.0; n];
    let mut w = vec![0.0; n];
    for i in 0..(n + 1) / 2 {
        let mut z = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        let mut dp = 1.0;
        for _ in 0..100 {
            let mut p1 = 1.0;
            let mut p2 = 0.0;
            for j in 0..n {
                let p3 = p2;
                p2 = p1;
                p1 = ((2 * j + 1) as f64 * z * p2 - j as f64 * p3) / (j + 1) as f64;
            }
            dp = n as f64 * (z * p1 - p2) / (z * z - 1.0);
            let z_old = z;
            z = z_old - p1 / dp;
            if (z - z_old).abs() < 1E-15 {
                break;
            }
        }
        x[i] = -z;
        x[n - 1 - i] = z;
        w[i] = 2.0 / ((1.0 - z * z) * dp * dp);
        w[n - 1 - i] = w[i];
    }
    (x, w)
}

/// `P_l(x)` for `l = 0..=lmax` (rows) at every `x` (columns).
pub fn legendre_table(lmax: usize, x: &[f64]) -> Array2<f64> {
    let mut table = Array2::<f64>::zeros((lmax + 1, x.len()));
    for (k, &xk) in x.iter().enumerate() {
        table[(0, k)] = 1.0;
        if lmax >= 1 {
            table[(1, k)] = xk;
        }
        for l in 2..=lmax {
            let lf = l as f64;
            table[(l, k)] =
                ((2.0 * lf - 1.0) * xk * table[(l - 1, k)] - (lf - 1.0) * table[(l - 2, k)]) / lf;
        }
    }
    table
}

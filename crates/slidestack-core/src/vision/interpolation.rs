use ndarray::Array2;

/// Catmull-Rom bicubic kernel (a = -0.5).
#[inline]
pub fn bicubic_kernel(x: f32) -> f32 {
    const A: f32 = -0.5;
    let t = x.abs();
    if t <= 1.0 {
        ((A + 2.0) * t - (A + 3.0)) * t * t + 1.0
    } else if t < 2.0 {
        ((A * t - 5.0 * A) * t + 8.0 * A) * t - 4.0 * A
    } else {
        0.0
    }
}

#[inline]
fn sample(data: &Array2<f32>, row: i64, col: i64) -> f32 {
    let (h, w) = data.dim();
    if row >= 0 && row < h as i64 && col >= 0 && col < w as i64 {
        data[[row as usize, col as usize]]
    } else {
        0.0
    }
}

/// Bilinear sample at sub-pixel `(y, x)`; zero outside the image.
pub fn bilinear_sample(data: &Array2<f32>, y: f64, x: f64) -> f32 {
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = (x - x0 as f64) as f32;
    let fy = (y - y0 as f64) as f32;

    let v00 = sample(data, y0, x0);
    let v10 = sample(data, y0, x0 + 1);
    let v01 = sample(data, y0 + 1, x0);
    let v11 = sample(data, y0 + 1, x0 + 1);

    v00 * (1.0 - fx) * (1.0 - fy) + v10 * fx * (1.0 - fy) + v01 * (1.0 - fx) * fy + v11 * fx * fy
}

/// Bicubic sample at sub-pixel `(y, x)`, clamped to [0, 1]; zero outside the
/// image.
pub fn bicubic_sample(data: &Array2<f32>, y: f64, x: f64) -> f32 {
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = (x - x0 as f64) as f32;
    let fy = (y - y0 as f64) as f32;

    let wx = [
        bicubic_kernel(fx + 1.0),
        bicubic_kernel(fx),
        bicubic_kernel(fx - 1.0),
        bicubic_kernel(fx - 2.0),
    ];
    let wy = [
        bicubic_kernel(fy + 1.0),
        bicubic_kernel(fy),
        bicubic_kernel(fy - 1.0),
        bicubic_kernel(fy - 2.0),
    ];

    let mut sum = 0.0;
    for (j, &wyj) in wy.iter().enumerate() {
        let row = y0 - 1 + j as i64;
        for (i, &wxi) in wx.iter().enumerate() {
            sum += sample(data, row, x0 - 1 + i as i64) * wxi * wyj;
        }
    }
    // Catmull-Rom overshoots at edges.
    sum.clamp(0.0, 1.0)
}

/// True when `(y, x)` falls within the sampled area of a `(h, w)` image.
#[inline]
pub fn inside(h: usize, w: usize, y: f64, x: f64) -> bool {
    x >= -0.5 && y >= -0.5 && x <= w as f64 - 0.5 && y <= h as f64 - 0.5
}

//! Face alignment via 4-DOF similarity transform.
//!
//! Warps a detected face onto the canonical 112×112 ArcFace layout using the
//! five InsightFace reference landmarks, or falls back to a centred square
//! crop of the whole image when no face is available.

use crate::frame::{Frame, CHANNELS};

/// ArcFace reference landmarks for a 112×112 output.
const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

/// Side length of an aligned crop.
pub const ALIGNED_SIZE: usize = 112;

/// Estimate a 2×3 similarity transform (scale, rotation, translation)
/// from `src` landmarks to `dst` landmarks using least squares.
///
/// Returns [a, -b, tx, b, a, ty]:
/// ```text
/// | a  -b  tx |
/// | b   a  ty |
/// ```
fn estimate_similarity_transform(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> [f32; 6] {
    // Normal equations for A * [a, b, tx, ty]^T = B, two rows per point:
    //   sx * a - sy * b + tx = dx
    //   sy * a + sx * b + ty = dy
    let mut ata = [0.0f32; 16];
    let mut atb = [0.0f32; 4];

    for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
        let r1 = [sx, -sy, 1.0, 0.0];
        let r2 = [sy, sx, 0.0, 1.0];

        for j in 0..4 {
            for k in 0..4 {
                ata[j * 4 + k] += r1[j] * r1[k] + r2[j] * r2[k];
            }
            atb[j] += r1[j] * dx + r2[j] * dy;
        }
    }

    let x = solve_4x4(&ata, &atb);
    let (a, b, tx, ty) = (x[0], x[1], x[2], x[3]);

    [a, -b, tx, b, a, ty]
}

/// Solve a 4×4 linear system via Gaussian elimination with partial pivoting.
#[allow(clippy::needless_range_loop)]
fn solve_4x4(ata: &[f32; 16], atb: &[f32; 4]) -> [f32; 4] {
    let mut m = [[0.0f32; 5]; 4];
    for i in 0..4 {
        for j in 0..4 {
            m[i][j] = ata[i * 4 + j];
        }
        m[i][4] = atb[i];
    }

    for col in 0..4 {
        let mut max_row = col;
        let mut max_val = m[col][col].abs();
        for row in (col + 1)..4 {
            if m[row][col].abs() > max_val {
                max_val = m[row][col].abs();
                max_row = row;
            }
        }
        m.swap(col, max_row);

        let pivot = m[col][col];
        if pivot.abs() < 1e-12 {
            // Degenerate landmarks (all coincident): identity scale, no shift.
            return [1.0, 0.0, 0.0, 0.0];
        }

        for row in (col + 1)..4 {
            let factor = m[row][col] / pivot;
            for j in col..5 {
                m[row][j] -= factor * m[col][j];
            }
        }
    }

    let mut x = [0.0f32; 4];
    for i in (0..4).rev() {
        x[i] = m[i][4];
        for j in (i + 1)..4 {
            x[i] -= m[i][j] * x[j];
        }
        x[i] /= m[i][i];
    }

    x
}

/// Apply a 2×3 similarity warp to an RGB frame, producing a square RGB crop.
///
/// Bilinear interpolation per channel; pixels mapped from outside the source
/// are black.
fn warp_affine(frame: &Frame, matrix: &[f32; 6], out_size: usize) -> Vec<u8> {
    let (a, tx) = (matrix[0], matrix[2]);
    let (b, ty) = (matrix[3], matrix[5]);

    let mut output = vec![0u8; out_size * out_size * CHANNELS];

    // M = [[a, -b], [b, a]], det = a^2 + b^2
    let det = a * a + b * b;
    if det.abs() < 1e-12 {
        return output;
    }
    let ia = a / det;
    let ib = b / det;

    let w = frame.width as i32;
    let h = frame.height as i32;
    let stride = frame.width as usize * CHANNELS;
    let sample = |x: i32, y: i32, c: usize| -> f32 {
        if x >= 0 && x < w && y >= 0 && y < h {
            frame.data[y as usize * stride + x as usize * CHANNELS + c] as f32
        } else {
            0.0
        }
    };

    for oy in 0..out_size {
        for ox in 0..out_size {
            // src = M^-1 * (dst - t)
            let dx = ox as f32 - tx;
            let dy = oy as f32 - ty;
            let sx = ia * dx + ib * dy;
            let sy = -ib * dx + ia * dy;

            let x0 = sx.floor() as i32;
            let y0 = sy.floor() as i32;
            let fx = sx - x0 as f32;
            let fy = sy - y0 as f32;

            let out = (oy * out_size + ox) * CHANNELS;
            for c in 0..CHANNELS {
                let val = sample(x0, y0, c) * (1.0 - fx) * (1.0 - fy)
                    + sample(x0 + 1, y0, c) * fx * (1.0 - fy)
                    + sample(x0, y0 + 1, c) * (1.0 - fx) * fy
                    + sample(x0 + 1, y0 + 1, c) * fx * fy;
                output[out + c] = val.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    output
}

/// Align a detected face to a canonical 112×112 RGB crop.
pub fn align_face(frame: &Frame, landmarks: &[(f32, f32); 5]) -> Vec<u8> {
    let matrix = estimate_similarity_transform(landmarks, &REFERENCE_LANDMARKS_112);
    warp_affine(frame, &matrix, ALIGNED_SIZE)
}

/// Centre-crop the largest square of the frame and resize it to 112×112.
///
/// Used when detection is not enforced and no face was found.
pub fn crop_whole_frame(frame: &Frame) -> Vec<u8> {
    let side = frame.width.min(frame.height) as f32;
    if side <= 0.0 {
        return vec![0u8; ALIGNED_SIZE * ALIGNED_SIZE * CHANNELS];
    }
    let scale = ALIGNED_SIZE as f32 / side;
    let off_x = (frame.width as f32 - side) / 2.0;
    let off_y = (frame.height as f32 - side) / 2.0;

    // dst = scale * (src - offset): a = scale, b = 0.
    let matrix = [scale, 0.0, -off_x * scale, 0.0, scale, -off_y * scale];
    warp_affine(frame, &matrix, ALIGNED_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(width: u32, height: u32, value: u8) -> Frame {
        Frame::from_rgb(vec![value; (width * height) as usize * CHANNELS], width, height).unwrap()
    }

    #[test]
    fn test_identity_transform() {
        let pts = REFERENCE_LANDMARKS_112;
        let m = estimate_similarity_transform(&pts, &pts);

        assert!((m[0] - 1.0).abs() < 1e-4, "a = {}", m[0]);
        assert!(m[1].abs() < 1e-4, "-b = {}", m[1]);
        assert!(m[2].abs() < 1e-3, "tx = {}", m[2]);
        assert!(m[3].abs() < 1e-4, "b = {}", m[3]);
        assert!((m[4] - 1.0).abs() < 1e-4, "a2 = {}", m[4]);
        assert!(m[5].abs() < 1e-3, "ty = {}", m[5]);
    }

    #[test]
    fn test_scaled_transform() {
        // Landmarks at 2x scale: a ≈ 0.5
        let src = REFERENCE_LANDMARKS_112.map(|(x, y)| (x * 2.0, y * 2.0));
        let m = estimate_similarity_transform(&src, &REFERENCE_LANDMARKS_112);
        assert!((m[0] - 0.5).abs() < 0.01, "a = {}, expected ~0.5", m[0]);
    }

    #[test]
    fn test_degenerate_landmarks_do_not_panic() {
        let src = [(10.0, 10.0); 5];
        let frame = uniform(64, 64, 50);
        let aligned = align_face(&frame, &src);
        assert_eq!(aligned.len(), ALIGNED_SIZE * ALIGNED_SIZE * CHANNELS);
    }

    #[test]
    fn test_align_face_output_size() {
        let frame = uniform(640, 480, 128);
        let aligned = align_face(&frame, &REFERENCE_LANDMARKS_112);
        assert_eq!(aligned.len(), ALIGNED_SIZE * ALIGNED_SIZE * CHANNELS);
    }

    #[test]
    fn test_align_preserves_colour_channels() {
        let (w, h) = (200u32, 200u32);
        let mut data = Vec::with_capacity((w * h) as usize * CHANNELS);
        for _ in 0..w * h {
            data.extend_from_slice(&[200, 100, 20]);
        }
        let frame = Frame::from_rgb(data, w, h).unwrap();
        let src = REFERENCE_LANDMARKS_112.map(|(x, y)| (x + 40.0, y + 40.0));
        let aligned = align_face(&frame, &src);

        let centre = (56 * ALIGNED_SIZE + 56) * CHANNELS;
        assert_eq!(&aligned[centre..centre + 3], &[200, 100, 20]);
    }

    #[test]
    fn test_landmark_roundtrip() {
        // A bright patch at the left eye lands near the reference left eye.
        let w = 200usize;
        let h = 200usize;
        let mut data = vec![0u8; w * h * CHANNELS];

        let src_landmarks: [(f32, f32); 5] = [
            (80.0, 60.0),
            (120.0, 60.0),
            (100.0, 85.0),
            (85.0, 110.0),
            (115.0, 110.0),
        ];

        let lx = src_landmarks[0].0 as usize;
        let ly = src_landmarks[0].1 as usize;
        for dy in 0..5 {
            for dx in 0..5 {
                let off = ((ly - 2 + dy) * w + (lx - 2 + dx)) * CHANNELS;
                data[off..off + CHANNELS].fill(255);
            }
        }
        let frame = Frame::from_rgb(data, w as u32, h as u32).unwrap();

        let aligned = align_face(&frame, &src_landmarks);

        let ref_x = REFERENCE_LANDMARKS_112[0].0.round() as usize;
        let ref_y = REFERENCE_LANDMARKS_112[0].1.round() as usize;

        let mut max_val = 0u8;
        for y in ref_y - 1..=ref_y + 1 {
            for x in ref_x - 1..=ref_x + 1 {
                max_val = max_val.max(aligned[(y * ALIGNED_SIZE + x) * CHANNELS]);
            }
        }
        assert!(max_val > 100, "expected bright patch near ({ref_x}, {ref_y}), max={max_val}");
    }

    #[test]
    fn test_crop_whole_frame_uniform() {
        let frame = uniform(300, 150, 90);
        let crop = crop_whole_frame(&frame);
        assert_eq!(crop.len(), ALIGNED_SIZE * ALIGNED_SIZE * CHANNELS);
        // Interior pixels come entirely from the source.
        let mid = (56 * ALIGNED_SIZE + 56) * CHANNELS;
        assert_eq!(crop[mid], 90);
    }

    #[test]
    fn test_crop_whole_frame_is_centred() {
        // Left third red, middle green, right third blue; a centred square
        // crop of a 3:1 frame sees only green.
        let (w, h) = (90u32, 30u32);
        let mut data = Vec::new();
        for _y in 0..h {
            for x in 0..w {
                let px = match x {
                    0..=29 => [255, 0, 0],
                    30..=59 => [0, 255, 0],
                    _ => [0, 0, 255],
                };
                data.extend_from_slice(&px);
            }
        }
        let frame = Frame::from_rgb(data, w, h).unwrap();
        let crop = crop_whole_frame(&frame);
        let mid = (56 * ALIGNED_SIZE + 56) * CHANNELS;
        assert_eq!(&crop[mid..mid + 3], &[0, 255, 0]);
    }
}

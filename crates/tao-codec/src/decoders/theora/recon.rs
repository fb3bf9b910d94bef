//! 像素重建: 预测块 + 反量化残差.

use super::error::{TheoraError, TheoraResult};
use super::frame::{CodingMode, MotionVector, Plane, TheoraFrame};
use super::headers::{TheoraHeaders, TheoraPixelFormat};
use super::idct::idct_8x8;
use super::mapping::MappingTables;
use super::tables::ZIGZAG;

fn trunc16(v: i32) -> i16 {
    v as i16
}

/// 运动矢量分量拆分为两个整像素偏移, 没有小数部分时两者相同
fn split_component(v: i32, quarter: bool) -> (isize, isize) {
    let div = if quarter { 4 } else { 2 };
    let whole = (v / div) as isize;
    if v % div != 0 {
        (whole, whole + v.signum() as isize)
    } else {
        (whole, whole)
    }
}

/// 生成 8x8 预测块, 行优先, 第 0 行为底行
fn predict_block(
    reference: Option<&Plane>,
    x0: usize,
    y0: usize,
    mv: MotionVector,
    quarter_x: bool,
    quarter_y: bool,
) -> [u8; 64] {
    let Some(plane) = reference else {
        return [128; 64];
    };
    let (x1, x2) = split_component(mv.x, quarter_x);
    let (y1, y2) = split_component(mv.y, quarter_y);
    let averaged = x1 != x2 || y1 != y2;

    let mut out = [0u8; 64];
    for j in 0..8 {
        for i in 0..8 {
            let x = (x0 + i) as isize;
            let y = (y0 + j) as isize;
            let a = plane.at_clamped(x + x1, y + y1);
            out[j * 8 + i] = if averaged {
                let b = plane.at_clamped(x + x2, y + y2);
                ((u16::from(a) + u16::from(b)) >> 1) as u8
            } else {
                a
            };
        }
    }
    out
}

/// 反量化并逆变换, 得到 8x8 残差
fn residual(
    headers: &TheoraHeaders,
    frame: &TheoraFrame,
    bi: usize,
    pli: usize,
    qti: usize,
) -> [i16; 64] {
    let coeffs = &frame.coeffs[bi];
    let dc_quant = headers.quant_matrices.get(qti, pli, frame.qis[0] as usize);

    if frame.ncoeffs[bi] < 2 {
        let v = trunc16((i32::from(coeffs[0]) * i32::from(dc_quant[0]) + 15) >> 5);
        return [v; 64];
    }

    let qi = frame.qis[frame.qiis[bi] as usize] as usize;
    let ac_quant = headers.quant_matrices.get(qti, pli, qi);
    let mut dequant = [0i16; 64];
    dequant[0] = trunc16(i32::from(coeffs[0]) * i32::from(dc_quant[0]));
    for zzi in 1..64 {
        let ci = ZIGZAG[zzi];
        dequant[ci] = trunc16(i32::from(coeffs[zzi]) * i32::from(ac_quant[ci]));
    }
    idct_8x8(&dequant)
}

/// 重建所有已编码块, 未编码块保持原值
pub(crate) fn reconstruct(
    headers: &TheoraHeaders,
    mapping: &MappingTables,
    previous: Option<&TheoraFrame>,
    golden: Option<&TheoraFrame>,
    frame: &mut TheoraFrame,
) -> TheoraResult<()> {
    let pixel_format = headers.identification.pixel_format;

    for bi in 0..mapping.num_blocks() {
        if !frame.coded[bi] {
            continue;
        }
        let (pli, bx, by) = mapping.block_position(bi);
        let mode = frame.modes[mapping.block_mb[bi]];
        let reference = match mode.reference_index() {
            0 => None,
            1 => Some(previous.ok_or_else(|| {
                TheoraError::InvalidFramePacket("缺少上一参考帧".into())
            })?),
            _ => Some(golden.ok_or_else(|| {
                TheoraError::InvalidFramePacket("缺少黄金参考帧".into())
            })?),
        };

        let quarter_x = pli != 0 && pixel_format != TheoraPixelFormat::Yuv444;
        let quarter_y = pli != 0 && pixel_format == TheoraPixelFormat::Yuv420;
        let x0 = bx * 8;
        let y0 = by * 8;
        let pred = predict_block(
            reference.map(|f| &f.planes[pli]),
            x0,
            y0,
            frame.mvs[bi],
            quarter_x,
            quarter_y,
        );
        let qti = usize::from(mode != CodingMode::Intra);
        let res = residual(headers, frame, bi, pli, qti);

        let plane = &mut frame.planes[pli];
        for j in 0..8 {
            for i in 0..8 {
                let v = (i32::from(pred[j * 8 + i]) + i32::from(res[j * 8 + i])).clamp(0, 255);
                plane.set(x0 + i, y0 + j, v as u8);
            }
        }
        if pli == 0 {
            for j in 0..8 {
                for i in 0..8 {
                    frame.changed_pixels.push(((x0 + i) as u32, (y0 + j) as u32));
                }
            }
        }
    }
    Ok(())
}

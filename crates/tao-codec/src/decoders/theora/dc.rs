//! DC 系数预测.
//!
//! 按平面内光栅序 (自底向上) 处理已编码块, 用左, 左下, 下, 右下四个邻居中
//! 参考帧相同的已编码块加权预测. 没有可用邻居时沿用同参考帧上一个块的 DC.

use super::frame::TheoraFrame;
use super::mapping::MappingTables;
use super::tables::DC_WEIGHTS;

fn trunc16(v: i32) -> i16 {
    v as i16
}

/// 对帧内所有已编码块的 DC 系数 (之字形序第 0 个) 加上预测值
pub(crate) fn predict_dc(mapping: &MappingTables, frame: &mut TheoraFrame) {
    for plane in &mapping.planes {
        let mut last_dc = [0i32; 3];
        let coded_at = |bx: usize, by: usize| mapping.raster_to_coded[plane.raster_index(bx, by)];
        let rfi_of = |frame: &TheoraFrame, bi: usize| {
            frame.modes[mapping.block_mb[bi]].reference_index()
        };

        for by in 0..plane.block_rows {
            for bx in 0..plane.block_cols {
                let bi = coded_at(bx, by);
                if !frame.coded[bi] {
                    continue;
                }
                let rfi = rfi_of(frame, bi);

                let neighbors = [
                    (bx > 0).then(|| (bx - 1, by)),
                    (bx > 0 && by > 0).then(|| (bx - 1, by - 1)),
                    (by > 0).then(|| (bx, by - 1)),
                    (by > 0 && bx + 1 < plane.block_cols).then(|| (bx + 1, by - 1)),
                ];
                let mut key = 0usize;
                let mut p = [0i32; 4];
                for (i, pos) in neighbors.iter().enumerate() {
                    let Some((nx, ny)) = *pos else { continue };
                    let nbi = coded_at(nx, ny);
                    if frame.coded[nbi] && rfi_of(frame, nbi) == rfi {
                        key |= 1 << i;
                        p[i] = i32::from(frame.coeffs[nbi][0]);
                    }
                }

                let pred = if key == 0 {
                    last_dc[rfi]
                } else {
                    let w = &DC_WEIGHTS[key];
                    let mut pred = (w[0] * p[0] + w[1] * p[1] + w[2] * p[2] + w[3] * p[3]) / w[4];
                    if key & 7 == 7 {
                        if (pred - p[2]).abs() > 128 {
                            pred = p[2];
                        } else if (pred - p[0]).abs() > 128 {
                            pred = p[0];
                        } else if (pred - p[1]).abs() > 128 {
                            pred = p[1];
                        }
                    }
                    pred
                };

                let dc = trunc16(i32::from(frame.coeffs[bi][0]) + pred);
                frame.coeffs[bi][0] = dc;
                last_dc[rfi] = i32::from(dc);
            }
        }
    }
}

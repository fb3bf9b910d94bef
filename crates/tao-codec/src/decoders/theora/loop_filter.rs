//! 环路滤波, 平滑已编码块的边缘.

use super::frame::{Plane, TheoraFrame};
use super::mapping::MappingTables;

/// 滤波响应函数
fn lflim(r: i32, limit: i32) -> i32 {
    if r <= -2 * limit {
        0
    } else if r <= -limit {
        -r - 2 * limit
    } else if r < limit {
        r
    } else if r < 2 * limit {
        -r + 2 * limit
    } else {
        0
    }
}

/// 对 4 个连续像素 (p[-2], p[-1], p[0], p[1]) 滤波, 只修改中间两个
fn filter_pixels(plane: &mut Plane, at: [(usize, usize); 4], limit: i32) {
    let p: [i32; 4] = at.map(|(x, y)| i32::from(plane.at(x, y)));
    let r = (p[0] - 3 * p[1] + 3 * p[2] - p[3] + 4) >> 3;
    let f = lflim(r, limit);
    if f == 0 {
        return;
    }
    plane.set(at[1].0, at[1].1, (p[1] + f).clamp(0, 255) as u8);
    plane.set(at[2].0, at[2].1, (p[2] - f).clamp(0, 255) as u8);
}

/// 竖直边缘, 位于第 x 列左侧
fn filter_vertical_edge(plane: &mut Plane, x: usize, y0: usize, limit: i32) {
    for y in y0..y0 + 8 {
        filter_pixels(plane, [(x - 2, y), (x - 1, y), (x, y), (x + 1, y)], limit);
    }
}

/// 水平边缘, 位于第 y 行下方
fn filter_horizontal_edge(plane: &mut Plane, x0: usize, y: usize, limit: i32) {
    for x in x0..x0 + 8 {
        filter_pixels(plane, [(x, y - 2), (x, y - 1), (x, y), (x, y + 1)], limit);
    }
}

pub(crate) fn apply_loop_filter(mapping: &MappingTables, frame: &mut TheoraFrame, limit: u8) {
    if limit == 0 {
        return;
    }
    let limit = i32::from(limit);

    for (pli, layout) in mapping.planes.iter().enumerate() {
        let coded_at = |bx: usize, by: usize| {
            frame.coded[mapping.raster_to_coded[layout.raster_index(bx, by)]]
        };
        // (列, 行, 右侧未编码, 上方未编码)
        let mut blocks = Vec::new();
        for by in 0..layout.block_rows {
            for bx in 0..layout.block_cols {
                if coded_at(bx, by) {
                    let right = bx + 1 < layout.block_cols && !coded_at(bx + 1, by);
                    let top = by + 1 < layout.block_rows && !coded_at(bx, by + 1);
                    blocks.push((bx, by, right, top));
                }
            }
        }

        let plane = &mut frame.planes[pli];
        for (bx, by, right, top) in blocks {
            let x0 = bx * 8;
            let y0 = by * 8;
            if bx > 0 {
                filter_vertical_edge(plane, x0, y0, limit);
            }
            if by > 0 {
                filter_horizontal_edge(plane, x0, y0, limit);
            }
            if right {
                filter_vertical_edge(plane, x0 + 8, y0, limit);
            }
            if top {
                filter_horizontal_edge(plane, x0, y0 + 8, limit);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoders::theora::frame::FrameType;
    use crate::decoders::theora::headers::parse_identification_header;
    use crate::decoders::theora::test_util::{IdentParams, build_identification_header};

    /// 单宏块 4:2:0 帧, 只有左下角亮度块 (0, 0) 已编码
    fn single_coded_block(luma: Plane) -> (MappingTables, TheoraFrame) {
        let id = parse_identification_header(&build_identification_header(&IdentParams::new(
            1, 1, 0,
        )))
        .unwrap();
        let mapping = MappingTables::new(&id);
        let mut coded = vec![false; mapping.num_blocks()];
        coded[mapping.raster_to_coded[mapping.planes[0].raster_index(0, 0)]] = true;
        let frame = TheoraFrame {
            frame_type: FrameType::Inter,
            qis: vec![0],
            planes: [luma, Plane::new(8, 8, 128), Plane::new(8, 8, 128)],
            changed_pixels: Vec::new(),
            coded,
            modes: Vec::new(),
            mvs: Vec::new(),
            qiis: Vec::new(),
            coeffs: Vec::new(),
            ncoeffs: Vec::new(),
        };
        (mapping, frame)
    }

    #[test]
    fn test_滤波响应函数() {
        let l = 4;
        assert_eq!(lflim(-9, l), 0);
        assert_eq!(lflim(-8, l), 0);
        assert_eq!(lflim(-6, l), -2);
        assert_eq!(lflim(-3, l), -3);
        assert_eq!(lflim(0, l), 0);
        assert_eq!(lflim(3, l), 3);
        assert_eq!(lflim(5, l), 3);
        assert_eq!(lflim(8, l), 0);
    }

    #[test]
    fn test_竖直边缘_小台阶被平滑() {
        let mut plane = Plane::new(16, 8, 100);
        for y in 0..8 {
            for x in 8..16 {
                plane.set(x, y, 104);
            }
        }
        filter_vertical_edge(&mut plane, 8, 0, 8);
        // R = (100 - 300 + 312 - 104 + 4) >> 3 = 1
        assert_eq!(plane.at(7, 3), 101);
        assert_eq!(plane.at(8, 3), 103);
        assert_eq!(plane.at(6, 3), 100);
    }

    #[test]
    fn test_水平边缘_大台阶保持不变() {
        let mut plane = Plane::new(8, 16, 0);
        for y in 8..16 {
            for x in 0..8 {
                plane.set(x, y, 200);
            }
        }
        let before = plane.clone();
        filter_horizontal_edge(&mut plane, 0, 8, 2);
        assert_eq!(plane, before);
    }

    #[test]
    fn test_右侧未编码邻块_代为滤波共享竖直边() {
        let mut luma = Plane::new(16, 16, 100);
        for y in 0..16 {
            for x in 8..16 {
                luma.set(x, y, 104);
            }
        }
        let (mapping, mut frame) = single_coded_block(luma);
        apply_loop_filter(&mapping, &mut frame, 8);

        let plane = &frame.planes[0];
        for y in 0..8 {
            assert_eq!((plane.at(7, y), plane.at(8, y)), (101, 103), "行 {y}");
            assert_eq!((plane.at(6, y), plane.at(9, y)), (100, 104), "行 {y}");
        }
        // 上方两块都未编码, 它们之间的边缘不处理
        for y in 8..16 {
            assert_eq!((plane.at(7, y), plane.at(8, y)), (100, 104), "行 {y}");
        }
    }

    #[test]
    fn test_上方未编码邻块_代为滤波共享水平边() {
        let mut luma = Plane::new(16, 16, 100);
        for y in 8..16 {
            for x in 0..16 {
                luma.set(x, y, 104);
            }
        }
        let (mapping, mut frame) = single_coded_block(luma);
        apply_loop_filter(&mapping, &mut frame, 8);

        let plane = &frame.planes[0];
        for x in 0..8 {
            assert_eq!((plane.at(x, 7), plane.at(x, 8)), (101, 103), "列 {x}");
            assert_eq!((plane.at(x, 6), plane.at(x, 9)), (100, 104), "列 {x}");
        }
        for x in 8..16 {
            assert_eq!((plane.at(x, 7), plane.at(x, 8)), (100, 104), "列 {x}");
        }
        assert!(frame.planes[1].data.iter().all(|&v| v == 128));
    }
}

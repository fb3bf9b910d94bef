//! 块, 超级块与宏块之间的索引映射.
//!
//! 块有两种编号:
//! - 编码序: 平面依次排列, 平面内按超级块光栅序, 超级块内按 Hilbert 曲线
//! - 光栅序: 平面依次排列, 平面内自底向上逐行, 行内自左向右
//!
//! 解码过程中的逐块数组 (编码标志, 运动矢量, 系数等) 一律按编码序存放.

use super::headers::{IdentificationHeader, TheoraPixelFormat};
use super::tables::{HILBERT_ORDER, MACROBLOCK_ORDER};

/// 单个平面的块网格布局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PlaneLayout {
    pub(crate) block_cols: usize,
    pub(crate) block_rows: usize,
    /// 本平面第一个块的全局序号 (编码序与光栅序相同)
    pub(crate) first_block: usize,
    pub(crate) sb_cols: usize,
    pub(crate) sb_rows: usize,
    pub(crate) first_sb: usize,
}

impl PlaneLayout {
    pub(crate) fn num_blocks(&self) -> usize {
        self.block_cols * self.block_rows
    }

    pub(crate) fn num_super_blocks(&self) -> usize {
        self.sb_cols * self.sb_rows
    }

    /// 平面内块坐标对应的全局光栅序号
    pub(crate) fn raster_index(&self, bx: usize, by: usize) -> usize {
        self.first_block + by * self.block_cols + bx
    }
}

/// 宏块
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Macroblock {
    /// 宏块坐标 (自底向上)
    pub(crate) x: usize,
    pub(crate) y: usize,
    /// 4 个亮度块的编码序号, 宏块内光栅序: 左下, 右下, 左上, 右上
    pub(crate) luma: [usize; 4],
    /// 色度块的编码序号, 先 Cb 后 Cr, 每个平面内按光栅序
    pub(crate) chroma: Vec<usize>,
}

/// 解码所需的全部索引映射
#[derive(Debug, Clone)]
pub(crate) struct MappingTables {
    pub(crate) planes: [PlaneLayout; 3],
    /// 每个超级块包含的有效块数
    pub(crate) sb_sizes: Vec<u8>,
    /// 编码序块号 -> 超级块号
    pub(crate) block_sb: Vec<usize>,
    pub(crate) coded_to_raster: Vec<usize>,
    pub(crate) raster_to_coded: Vec<usize>,
    /// 编码序块号 -> 所属宏块号
    pub(crate) block_mb: Vec<usize>,
    /// 按编码序排列的宏块
    pub(crate) macroblocks: Vec<Macroblock>,
}

/// 计算平面内每个超级块包含的块数 (边缘超级块可能不满 16 个)
pub(crate) fn compute_super_block_sizes(block_cols: usize, block_rows: usize) -> Vec<u8> {
    let sb_cols = block_cols.div_ceil(4);
    let sb_rows = block_rows.div_ceil(4);
    let mut sizes = Vec::with_capacity(sb_cols * sb_rows);
    for sby in 0..sb_rows {
        for sbx in 0..sb_cols {
            let w = (block_cols - sbx * 4).min(4);
            let h = (block_rows - sby * 4).min(4);
            sizes.push((w * h) as u8);
        }
    }
    sizes
}

/// 编码序块号 -> 超级块号: 按超级块声明的大小依次分配
pub(crate) fn compute_block_to_super_block(sb_sizes: &[u8]) -> Vec<usize> {
    let mut table = Vec::with_capacity(sb_sizes.iter().map(|&s| s as usize).sum());
    for (sbi, &size) in sb_sizes.iter().enumerate() {
        table.extend(std::iter::repeat_n(sbi, size as usize));
    }
    table
}

/// 编码序块号 -> 光栅序块号
pub(crate) fn compute_coded_to_raster(planes: &[PlaneLayout; 3]) -> Vec<usize> {
    let total: usize = planes.iter().map(PlaneLayout::num_blocks).sum();
    let mut table = Vec::with_capacity(total);
    for plane in planes {
        for sby in 0..plane.sb_rows {
            for sbx in 0..plane.sb_cols {
                for &(dx, dy) in &HILBERT_ORDER {
                    let bx = sbx * 4 + dx;
                    let by = sby * 4 + dy;
                    if bx < plane.block_cols && by < plane.block_rows {
                        table.push(plane.raster_index(bx, by));
                    }
                }
            }
        }
    }
    table
}

/// 光栅序块号 -> 编码序块号
pub(crate) fn compute_raster_to_coded(coded_to_raster: &[usize]) -> Vec<usize> {
    let mut table = vec![0usize; coded_to_raster.len()];
    for (bi, &ri) in coded_to_raster.iter().enumerate() {
        table[ri] = bi;
    }
    table
}

/// 按编码序生成宏块列表
fn compute_macroblocks(
    planes: &[PlaneLayout; 3],
    raster_to_coded: &[usize],
    pixel_format: TheoraPixelFormat,
) -> Vec<Macroblock> {
    let luma = &planes[0];
    let mb_cols = luma.block_cols / 2;
    let mb_rows = luma.block_rows / 2;
    let mut macroblocks = Vec::with_capacity(mb_cols * mb_rows);

    for sby in 0..luma.sb_rows {
        for sbx in 0..luma.sb_cols {
            for &(dx, dy) in &MACROBLOCK_ORDER {
                let x = sbx * 2 + dx;
                let y = sby * 2 + dy;
                if x >= mb_cols || y >= mb_rows {
                    continue;
                }

                let luma_at = |bx: usize, by: usize| raster_to_coded[luma.raster_index(bx, by)];
                let luma_blocks = [
                    luma_at(2 * x, 2 * y),
                    luma_at(2 * x + 1, 2 * y),
                    luma_at(2 * x, 2 * y + 1),
                    luma_at(2 * x + 1, 2 * y + 1),
                ];

                let positions: Vec<(usize, usize)> = match pixel_format {
                    TheoraPixelFormat::Yuv420 => vec![(x, y)],
                    TheoraPixelFormat::Yuv422 => vec![(x, 2 * y), (x, 2 * y + 1)],
                    TheoraPixelFormat::Yuv444 => vec![
                        (2 * x, 2 * y),
                        (2 * x + 1, 2 * y),
                        (2 * x, 2 * y + 1),
                        (2 * x + 1, 2 * y + 1),
                    ],
                };
                let chroma = planes[1..]
                    .iter()
                    .flat_map(|plane| {
                        positions
                            .iter()
                            .map(move |&(bx, by)| raster_to_coded[plane.raster_index(bx, by)])
                    })
                    .collect();

                macroblocks.push(Macroblock {
                    x,
                    y,
                    luma: luma_blocks,
                    chroma,
                });
            }
        }
    }
    macroblocks
}

impl MappingTables {
    pub(crate) fn new(header: &IdentificationHeader) -> Self {
        let mut first_block = 0;
        let mut first_sb = 0;
        let planes: [PlaneLayout; 3] = std::array::from_fn(|pli| {
            let (block_cols, block_rows) = header.plane_blocks(pli);
            let layout = PlaneLayout {
                block_cols,
                block_rows,
                first_block,
                sb_cols: block_cols.div_ceil(4),
                sb_rows: block_rows.div_ceil(4),
                first_sb,
            };
            first_block += layout.num_blocks();
            first_sb += layout.num_super_blocks();
            layout
        });

        let sb_sizes: Vec<u8> = planes
            .iter()
            .flat_map(|p| compute_super_block_sizes(p.block_cols, p.block_rows))
            .collect();
        let block_sb = compute_block_to_super_block(&sb_sizes);
        let coded_to_raster = compute_coded_to_raster(&planes);
        let raster_to_coded = compute_raster_to_coded(&coded_to_raster);
        let macroblocks = compute_macroblocks(&planes, &raster_to_coded, header.pixel_format);

        let mut block_mb = vec![0usize; coded_to_raster.len()];
        for (mbi, mb) in macroblocks.iter().enumerate() {
            for &bi in mb.luma.iter().chain(mb.chroma.iter()) {
                block_mb[bi] = mbi;
            }
        }

        Self {
            planes,
            sb_sizes,
            block_sb,
            coded_to_raster,
            raster_to_coded,
            block_mb,
            macroblocks,
        }
    }

    pub(crate) fn num_blocks(&self) -> usize {
        self.coded_to_raster.len()
    }

    pub(crate) fn num_super_blocks(&self) -> usize {
        self.sb_sizes.len()
    }

    /// 编码序块号所在的平面
    pub(crate) fn plane_of(&self, bi: usize) -> usize {
        let ri = self.coded_to_raster[bi];
        if ri < self.planes[1].first_block {
            0
        } else if ri < self.planes[2].first_block {
            1
        } else {
            2
        }
    }

    /// 编码序块号对应的 (平面, 列, 行)
    pub(crate) fn block_position(&self, bi: usize) -> (usize, usize, usize) {
        let ri = self.coded_to_raster[bi];
        let pli = self.plane_of(bi);
        let plane = &self.planes[pli];
        let local = ri - plane.first_block;
        (pli, local % plane.block_cols, local / plane.block_cols)
    }
}

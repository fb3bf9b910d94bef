//! 测试用 Theora 码流构造工具.
//!
//! 仅依赖 `tao_core::bitwriter`, 单元测试与集成测试共用.
//! 构造出的 setup 头使用平坦量化 (DC/AC 量化步长均为 32, 即 DC 系数 c 还原为像素偏移 c)
//! 与 5 位等长 token 码表.

#![allow(dead_code)]

use tao_core::bitwriter::BitWriter;

/// identification 头字段
#[derive(Debug, Clone)]
pub struct IdentParams {
    pub version_minor: u8,
    pub mb_width: u32,
    pub mb_height: u32,
    pub pic_width: u32,
    pub pic_height: u32,
    pub pic_x: u32,
    pub pic_y: u32,
    pub fps_num: u32,
    pub fps_den: u32,
    pub aspect_num: u32,
    pub aspect_den: u32,
    pub colorspace: u8,
    pub bitrate: u32,
    pub quality: u8,
    pub kfgshift: u8,
    pub pixel_format: u8,
}

impl IdentParams {
    pub fn new(mb_width: u32, mb_height: u32, pixel_format: u8) -> Self {
        Self {
            version_minor: 2,
            mb_width,
            mb_height,
            pic_width: mb_width * 16,
            pic_height: mb_height * 16,
            pic_x: 0,
            pic_y: 0,
            fps_num: 30,
            fps_den: 1,
            aspect_num: 1,
            aspect_den: 1,
            colorspace: 0,
            bitrate: 0,
            quality: 48,
            kfgshift: 6,
            pixel_format,
        }
    }
}

pub fn build_identification_header(p: &IdentParams) -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_bytes(b"\x80theora");
    bw.write_bits(3, 8);
    bw.write_bits(u32::from(p.version_minor), 8);
    bw.write_bits(1, 8);
    bw.write_bits(p.mb_width, 16);
    bw.write_bits(p.mb_height, 16);
    bw.write_bits(p.pic_width, 24);
    bw.write_bits(p.pic_height, 24);
    bw.write_bits(p.pic_x, 8);
    bw.write_bits(p.pic_y, 8);
    bw.write_bits(p.fps_num, 32);
    bw.write_bits(p.fps_den, 32);
    bw.write_bits(p.aspect_num, 24);
    bw.write_bits(p.aspect_den, 24);
    bw.write_bits(u32::from(p.colorspace), 8);
    bw.write_bits(p.bitrate, 24);
    bw.write_bits(u32::from(p.quality), 6);
    bw.write_bits(u32::from(p.kfgshift), 5);
    bw.write_bits(u32::from(p.pixel_format), 2);
    bw.write_bits(0, 3);
    bw.finish()
}

pub fn build_comment_header(vendor: &str, entries: &[&str]) -> Vec<u8> {
    let mut out = b"\x81theora".to_vec();
    out.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    out.extend_from_slice(vendor.as_bytes());
    out.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    for entry in entries {
        out.extend_from_slice(&(entry.len() as u32).to_le_bytes());
        out.extend_from_slice(entry.as_bytes());
    }
    out
}

/// 5 层满二叉树: token t 的码字即 t 的 5 位二进制
fn write_flat_tree(bw: &mut BitWriter, depth: u32, code: u32) {
    if depth == 5 {
        bw.write_bit(1);
        bw.write_bits(code, 5);
    } else {
        bw.write_bit(0);
        write_flat_tree(bw, depth + 1, code << 1);
        write_flat_tree(bw, depth + 1, (code << 1) | 1);
    }
}

/// 构造 setup 头, 所有 qi 的环路滤波限值均为 `loop_filter_limit` (<= 7)
pub fn build_setup_header(loop_filter_limit: u8) -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_bytes(b"\x82theora");

    bw.write_bits(3, 3);
    for _ in 0..64 {
        bw.write_bits(u32::from(loop_filter_limit), 3);
    }

    // ACSCALE / DCSCALE: 7 位, 全部 100
    for _ in 0..2 {
        bw.write_bits(6, 4);
        for _ in 0..64 {
            bw.write_bits(100, 7);
        }
    }
    // 1 个基础矩阵, 全部 8
    bw.write_bits(0, 9);
    for _ in 0..64 {
        bw.write_bits(8, 8);
    }
    // (0, 0): 单区间覆盖 qi 0..=63, 基础矩阵下标位宽为 0
    bw.write_bits(62, 6);
    for qti in 0..2 {
        for pli in 0..3 {
            if qti == 0 && pli == 0 {
                continue;
            }
            // NEWQR = 0
            bw.write_bit(0);
            if qti > 0 {
                // RPQR = 1: 复制上一 qti 的同平面配置
                bw.write_bit(1);
            }
        }
    }

    for _ in 0..80 {
        write_flat_tree(&mut bw, 0, 0);
    }
    bw.finish()
}

/// 三个头包
pub fn build_header_packets(p: &IdentParams, loop_filter_limit: u8) -> [Vec<u8>; 3] {
    [
        build_identification_header(p),
        build_comment_header("tao test encoder", &["ENCODER=tao"]),
        build_setup_header(loop_filter_limit),
    ]
}

/// (基础长度, 附加位数, 前缀码, 前缀长度)
const LONG_RUN_CODES: [(usize, u32, u32, u32); 7] = [
    (1, 0, 0b0, 1),
    (2, 1, 0b10, 2),
    (4, 1, 0b110, 3),
    (6, 2, 0b1110, 4),
    (10, 3, 0b11110, 5),
    (18, 4, 0b111110, 6),
    (34, 12, 0b111111, 6),
];

const SHORT_RUN_CODES: [(usize, u32, u32, u32); 6] = [
    (1, 1, 0b0, 1),
    (3, 1, 0b10, 2),
    (5, 1, 0b110, 3),
    (7, 2, 0b1110, 4),
    (11, 2, 0b11110, 5),
    (15, 4, 0b11111, 5),
];

fn write_run(bw: &mut BitWriter, codes: &[(usize, u32, u32, u32)], run: usize) {
    for &(base, extra, prefix, prefix_len) in codes {
        if run >= base && run < base + (1usize << extra) {
            bw.write_bits(prefix, prefix_len);
            bw.write_bits((run - base) as u32, extra);
            return;
        }
    }
    panic!("游程长度无法编码: {run}");
}

fn write_runs(bw: &mut BitWriter, bits: &[bool], codes: &[(usize, u32, u32, u32)], long: bool) {
    if bits.is_empty() {
        return;
    }
    let max_run = if long { 4129 } else { 30 };
    let mut bit = bits[0];
    bw.write_bit(u32::from(bit));
    let mut i = 0;
    loop {
        let mut run = 0;
        while i + run < bits.len() && bits[i + run] == bit && run < max_run {
            run += 1;
        }
        write_run(bw, codes, run);
        i += run;
        if i == bits.len() {
            break;
        }
        if long && run == 4129 {
            bit = bits[i];
            bw.write_bit(u32::from(bit));
        } else {
            assert!(run < max_run, "短游程超过 30 无法编码");
            bit = !bit;
        }
    }
}

/// 以长游程编码写入比特串
pub fn write_long_run(bw: &mut BitWriter, bits: &[bool]) {
    write_runs(bw, bits, &LONG_RUN_CODES, true);
}

/// 以短游程编码写入比特串
pub fn write_short_run(bw: &mut BitWriter, bits: &[bool]) {
    write_runs(bw, bits, &SHORT_RUN_CODES, false);
}

/// 帧头: 数据包标志, 帧类型, qi 列表 (1..=3 个)
pub fn write_frame_header(bw: &mut BitWriter, intra: bool, qis: &[u8]) {
    bw.write_bit(0);
    bw.write_bit(u32::from(!intra));
    for (i, &qi) in qis.iter().enumerate() {
        bw.write_bits(u32::from(qi), 6);
        if i + 1 < 3 {
            bw.write_bit(u32::from(i + 1 < qis.len()));
        }
    }
    if intra {
        bw.write_bits(0, 3);
    }
}

/// 写入一个 token (5 位等长码)
pub fn write_token(bw: &mut BitWriter, token: u32) {
    bw.write_bits(token, 5);
}

/// 写入单个系数值: 0 用长度 1 的零游程表示
pub fn write_coefficient(bw: &mut BitWriter, value: i32) {
    let mag = value.unsigned_abs();
    let sign = u32::from(value < 0);
    match mag {
        0 => {
            write_token(bw, 7);
            bw.write_bits(0, 3);
        }
        1 => write_token(bw, 9 + sign),
        2 => write_token(bw, 11 + sign),
        3..=6 => {
            write_token(bw, mag + 10);
            bw.write_bit(sign);
        }
        _ => {
            const BASES: [u32; 6] = [7, 9, 13, 21, 37, 69];
            const BITS: [u32; 6] = [1, 2, 3, 4, 5, 9];
            let i = (0..6)
                .rev()
                .find(|&i| mag >= BASES[i])
                .filter(|&i| mag < BASES[i] + (1 << BITS[i]))
                .unwrap_or_else(|| panic!("系数幅值过大: {mag}"));
            write_token(bw, 17 + i as u32);
            bw.write_bit(sign);
            bw.write_bits(mag - BASES[i], BITS[i]);
        }
    }
}

/// 写入覆盖所有剩余块的 EOB 游程
pub fn write_eob_all(bw: &mut BitWriter) {
    write_token(bw, 6);
    bw.write_bits(0, 12);
}

/// 写入只含 DC 系数的 token 段: `dcs` 为编码序下每个已编码块的 DC 残差
pub fn write_dc_only_tokens(bw: &mut BitWriter, dcs: &[i32]) {
    bw.write_bits(0, 4);
    bw.write_bits(0, 4);
    for &dc in dcs {
        write_coefficient(bw, dc);
    }
    bw.write_bits(0, 4);
    bw.write_bits(0, 4);
    if !dcs.is_empty() {
        write_eob_all(bw);
    }
}

/// 构造只含 DC 的帧内帧
pub fn build_intra_frame(qi: u8, dcs: &[i32]) -> Vec<u8> {
    let mut bw = BitWriter::new();
    write_frame_header(&mut bw, true, &[qi]);
    write_dc_only_tokens(&mut bw, dcs);
    bw.finish()
}

/// 构造所有超级块均未编码的帧间帧
pub fn build_empty_inter_frame(qi: u8, num_super_blocks: usize) -> Vec<u8> {
    let mut bw = BitWriter::new();
    write_frame_header(&mut bw, false, &[qi]);
    let none = vec![false; num_super_blocks];
    write_long_run(&mut bw, &none);
    write_long_run(&mut bw, &none);
    // 模式方案 7, 没有需要读取模式的宏块
    bw.write_bits(7, 3);
    // 运动矢量编码方式
    bw.write_bit(0);
    write_dc_only_tokens(&mut bw, &[]);
    bw.finish()
}

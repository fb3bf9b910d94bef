//! 集成测试共用: 内存 Ogg 页面构造.

#![allow(dead_code)]

pub const FLAG_CONTINUED: u8 = 0x01;
pub const FLAG_BOS: u8 = 0x02;
pub const FLAG_EOS: u8 = 0x04;

/// Ogg 页面 CRC (多项式 0x04C11DB7, 不反射, 初值 0)
pub fn ogg_crc32(data: &[u8]) -> u32 {
    let mut crc = 0u32;
    for &byte in data {
        crc ^= u32::from(byte) << 24;
        for _ in 0..8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ 0x04C1_1DB7
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// 按页面写出一条逻辑流, 自动维护页面序号
pub struct OggWriter {
    serial: u32,
    sequence: u32,
    data: Vec<u8>,
}

impl OggWriter {
    pub fn new(serial: u32) -> Self {
        Self {
            serial,
            sequence: 0,
            data: Vec::new(),
        }
    }

    /// 写入一页, `last_open` 为真时最后一个包延续到下一页
    pub fn page(&mut self, flags: u8, granule: i64, packets: &[&[u8]], last_open: bool) -> &mut Self {
        let page = build_page(flags, granule, self.serial, self.sequence, packets, last_open);
        self.data.extend_from_slice(&page);
        self.sequence += 1;
        self
    }

    /// 跳过一个页面序号, 模拟丢页
    pub fn skip_sequence(&mut self) -> &mut Self {
        self.sequence += 1;
        self
    }

    pub fn finish(&self) -> Vec<u8> {
        self.data.clone()
    }
}

pub fn build_page(
    flags: u8,
    granule: i64,
    serial: u32,
    sequence: u32,
    packets: &[&[u8]],
    last_open: bool,
) -> Vec<u8> {
    let mut segments = Vec::new();
    for (i, packet) in packets.iter().enumerate() {
        let mut remaining = packet.len();
        while remaining >= 255 {
            segments.push(255u8);
            remaining -= 255;
        }
        if !(last_open && i + 1 == packets.len()) {
            segments.push(remaining as u8);
        }
    }
    assert!(segments.len() <= 255, "单页段数超过 255");

    let mut page = b"OggS\0".to_vec();
    page.push(flags);
    page.extend_from_slice(&granule.to_le_bytes());
    page.extend_from_slice(&serial.to_le_bytes());
    page.extend_from_slice(&sequence.to_le_bytes());
    page.extend_from_slice(&[0; 4]);
    page.push(segments.len() as u8);
    page.extend_from_slice(&segments);
    for packet in packets {
        page.extend_from_slice(packet);
    }
    let crc = ogg_crc32(&page);
    page[22..26].copy_from_slice(&crc.to_le_bytes());
    page
}

/// 3.2.1 码流的 granule: 关键帧序号从 1 开始计数
pub fn granule(keyframe: i64, delta: i64, shift: u32) -> i64 {
    ((keyframe + 1) << shift) | delta
}

/// 样本文件路径, 不存在时打印提示并返回 None
pub fn sample_path(name: &str) -> Option<String> {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("data").join(name);
    if path.exists() {
        Some(path.to_string_lossy().into_owned())
    } else {
        eprintln!("跳过: 样本文件 {} 不存在", path.display());
        None
    }
}

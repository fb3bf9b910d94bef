//! 解码帧输出: YUV4MPEG2 与原始平面.

use std::io::Write;

use anyhow::{Result, bail};
use clap::ValueEnum;
use tao_codec::frame::VideoFrame;
use tao_core::{PixelFormat, Rational};

/// 输出文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// 逐帧拼接的 Y, U, V 平面
    Yuv,
    /// YUV4MPEG2 (带文件头与 FRAME 标记)
    Y4m,
}

impl OutputFormat {
    /// 根据输出文件扩展名推断, 无法识别时为 Y4m
    pub fn from_path(path: &str) -> Self {
        match path.rsplit('.').next().map(str::to_ascii_lowercase) {
            Some(ext) if ext == "yuv" => Self::Yuv,
            _ => Self::Y4m,
        }
    }
}

/// 输出流的固定参数, 来自 identification 头
#[derive(Debug, Clone, Copy)]
pub struct StreamDescription {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub frame_rate: Rational,
    pub sample_aspect_ratio: Rational,
}

/// Y4M 的 `C` 标记
fn y4m_chroma_tag(pixel_format: PixelFormat) -> Result<&'static str> {
    Ok(match pixel_format {
        PixelFormat::Yuv420p => "420jpeg",
        PixelFormat::Yuv422p => "422",
        PixelFormat::Yuv444p => "444",
        other => bail!("Y4M 不支持像素格式 {other}"),
    })
}

/// 逐帧写出解码结果
pub struct FrameWriter<W: Write> {
    out: W,
    format: OutputFormat,
    desc: StreamDescription,
    header_written: bool,
}

impl<W: Write> FrameWriter<W> {
    pub fn new(out: W, format: OutputFormat, desc: StreamDescription) -> Self {
        Self {
            out,
            format,
            desc,
            header_written: false,
        }
    }

    fn write_header(&mut self) -> Result<()> {
        let d = &self.desc;
        let sar = if d.sample_aspect_ratio.is_valid() {
            d.sample_aspect_ratio
        } else {
            Rational::new(0, 0)
        };
        write!(
            self.out,
            "YUV4MPEG2 W{} H{} F{}:{} Ip A{}:{} C{}",
            d.width,
            d.height,
            d.frame_rate.num,
            d.frame_rate.den,
            sar.num,
            sar.den,
            y4m_chroma_tag(d.pixel_format)?
        )?;
        writeln!(self.out, " XCOLORRANGE=LIMITED")?;
        Ok(())
    }

    /// 写出一帧, 帧尺寸必须与流描述一致
    pub fn write_frame(&mut self, frame: &VideoFrame) -> Result<()> {
        if frame.width != self.desc.width
            || frame.height != self.desc.height
            || frame.pixel_format != self.desc.pixel_format
        {
            bail!(
                "帧参数与流不一致: {}x{} {} != {}x{} {}",
                frame.width,
                frame.height,
                frame.pixel_format,
                self.desc.width,
                self.desc.height,
                self.desc.pixel_format
            );
        }
        if self.format == OutputFormat::Y4m {
            if !self.header_written {
                self.write_header()?;
                self.header_written = true;
            }
            self.out.write_all(b"FRAME\n")?;
        }

        // 奇数裁剪偏移的色度平面可能多出一列或一行, 按输出格式的平面尺寸截取
        let pf = frame.pixel_format;
        for plane in 0..pf.plane_count() as usize {
            let width = pf.plane_linesize(plane, frame.width).unwrap_or(0);
            let rows = pf.plane_height(plane, frame.height).unwrap_or(0);
            for row in 0..rows {
                let data = frame.plane_row(plane, row);
                self.out.write_all(&data[..width.min(data.len())])?;
            }
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

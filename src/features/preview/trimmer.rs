//! 试听音频裁剪。
//!
//! 从谱面主音轨截取一段固定规格的试听：起点取谱面声明的 PreviewTime
//! （缺失或越界回退到 0），长度至多 10 秒，输出 22.05kHz / 64kbps 的单声道 MP3。
//! 源音频先整体解码为单声道 PCM，再做窗口截取、重采样与编码；
//! 任何解码失败都归为 `UnsupportedAudio`，不产出半成品。

use std::io::Cursor;

use mp3lame_encoder::{Bitrate, Builder, FlushNoGap, MonoPcm, Quality};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::AssetGenError;

/// 试听窗口长度（秒）
pub const PREVIEW_WINDOW_SECS: u64 = 10;
/// 试听输出采样率（Hz）
pub const PREVIEW_SAMPLE_RATE: u32 = 22_050;

struct DecodedAudio {
    /// 单声道 f32 采样（多声道取均值下混）
    samples: Vec<f32>,
    sample_rate: u32,
}

/// 裁剪试听音频。
///
/// `ext_hint` 为压缩包条目的扩展名（可选），用于引导容器探测。
pub fn trim_preview(
    audio: &[u8],
    ext_hint: Option<&str>,
    preview_time_ms: i64,
) -> Result<Vec<u8>, AssetGenError> {
    let decoded = decode_to_mono(audio, ext_hint)?;
    let window = preview_window(&decoded.samples, decoded.sample_rate, preview_time_ms);
    let resampled = resample(window, decoded.sample_rate, PREVIEW_SAMPLE_RATE)?;
    encode_mp3(&resampled, PREVIEW_SAMPLE_RATE)
}

fn decode_to_mono(bytes: &[u8], ext_hint: Option<&str>) -> Result<DecodedAudio, AssetGenError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = ext_hint {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| AssetGenError::UnsupportedAudio(format!("容器探测失败: {e}")))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AssetGenError::UnsupportedAudio("没有可解码的音轨".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AssetGenError::UnsupportedAudio(format!("创建解码器失败: {e}")))?;

    let track_id = track.id;
    let mut samples: Vec<f32> = Vec::new();
    let mut sample_rate = 0u32;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            // 流走到尽头（内存源表现为 IO 错误）
            Err(SymphoniaError::IoError(_)) => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(AssetGenError::UnsupportedAudio(format!("读取音频包失败: {e}")));
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                sample_buf.copy_interleaved_ref(decoded);

                let channels = spec.channels.count();
                if channels == 1 {
                    samples.extend_from_slice(sample_buf.samples());
                } else {
                    // 交错多声道取均值下混为单声道
                    for frame in sample_buf.samples().chunks(channels) {
                        let sum: f32 = frame.iter().sum();
                        samples.push(sum / channels as f32);
                    }
                }
            }
            Err(SymphoniaError::IoError(_)) => break,
            // 个别坏包跳过，整体解码继续
            Err(SymphoniaError::DecodeError(_)) => (),
            Err(e) => {
                return Err(AssetGenError::UnsupportedAudio(format!("解码失败: {e}")));
            }
        }
    }

    if samples.is_empty() || sample_rate == 0 {
        return Err(AssetGenError::UnsupportedAudio(
            "解码结果为空".to_string(),
        ));
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

/// 计算试听窗口。
///
/// 起点规则：`preview_time_ms == -1`（以及任何负值）或不小于音轨总长时从 0 开始，
/// 否则从声明的偏移开始；窗口至多 10 秒，尾段不足时取剩余全部，不做填充。
fn preview_window(samples: &[f32], sample_rate: u32, preview_time_ms: i64) -> &[f32] {
    if samples.is_empty() {
        return samples;
    }
    let total = samples.len() as u64;
    let rate = sample_rate as u64;
    let track_ms = total * 1000 / rate;

    let start_ms = if preview_time_ms < 0 || preview_time_ms as u64 >= track_ms {
        0
    } else {
        preview_time_ms as u64
    };

    let start = (start_ms * rate / 1000).min(total) as usize;
    let end = ((start as u64) + PREVIEW_WINDOW_SECS * rate).min(total) as usize;
    &samples[start..end]
}

fn resample(samples: &[f32], from: u32, to: u32) -> Result<Vec<f32>, AssetGenError> {
    if from == to || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(
        to as f64 / from as f64,
        2.0,
        params,
        samples.len(),
        1,
    )
    .map_err(|e| AssetGenError::UnsupportedAudio(format!("重采样器创建失败: {e}")))?;

    let waves_in = vec![samples.to_vec()];
    let mut waves_out = resampler
        .process(&waves_in, None)
        .map_err(|e| AssetGenError::UnsupportedAudio(format!("重采样失败: {e}")))?;
    Ok(waves_out.remove(0))
}

fn encode_mp3(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, AssetGenError> {
    let mut builder = Builder::new().ok_or_else(|| {
        AssetGenError::UnsupportedAudio("LAME 编码器初始化失败".to_string())
    })?;
    builder
        .set_num_channels(1)
        .map_err(|e| AssetGenError::UnsupportedAudio(format!("LAME 声道配置失败: {e:?}")))?;
    builder
        .set_sample_rate(sample_rate)
        .map_err(|e| AssetGenError::UnsupportedAudio(format!("LAME 采样率配置失败: {e:?}")))?;
    builder
        .set_brate(Bitrate::Kbps64)
        .map_err(|e| AssetGenError::UnsupportedAudio(format!("LAME 码率配置失败: {e:?}")))?;
    builder
        .set_quality(Quality::Good)
        .map_err(|e| AssetGenError::UnsupportedAudio(format!("LAME 质量配置失败: {e:?}")))?;
    let mut lame = builder
        .build()
        .map_err(|e| AssetGenError::UnsupportedAudio(format!("LAME 编码器构建失败: {e:?}")))?;

    // LAME 推荐的输出缓冲大小：1.25 * 采样数 + 7200 字节
    let estimated = (samples.len() as f64 * 1.25 + 7200.0) as usize;
    let mut out: Vec<u8> = Vec::with_capacity(estimated);

    let written = lame
        .encode(MonoPcm(samples), out.spare_capacity_mut())
        .map_err(|e| AssetGenError::UnsupportedAudio(format!("MP3 编码失败: {e:?}")))?;
    // SAFETY: LAME 保证恰好写入了 written 字节
    unsafe {
        out.set_len(written);
    }

    let flushed = lame
        .flush::<FlushNoGap>(out.spare_capacity_mut())
        .map_err(|e| AssetGenError::UnsupportedAudio(format!("MP3 收尾失败: {e:?}")))?;
    // SAFETY: 同上，flush 写入了 flushed 字节
    unsafe {
        out.set_len(out.len() + flushed);
    }

    Ok(out)
}

//! 谱面缩略图渲染。
//!
//! 输出是固定的 160x120 JPEG：背景取谱面内声明/探测到的图片（中心裁剪），
//! 没有可用背景时合成由谱面集 ID 决定的纯色底。两条路径都会叠加统一的
//! 压暗层与 ID 水印，再经 SVG 模板栅格化后编码。

use base64::{Engine as _, engine::general_purpose::STANDARD as base64_engine};
use image::ColorType;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use resvg::usvg::{self, Options as UsvgOptions, fontdb};
use resvg::{
    render,
    tiny_skia::{Pixmap, Transform},
};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use crate::error::AssetGenError;

/// 缩略图固定宽度（像素）
pub const THUMB_WIDTH: u32 = 160;
/// 缩略图固定高度（像素）
pub const THUMB_HEIGHT: u32 = 120;

/// JPEG 编码质量（固定值，不随请求变化）
const JPEG_QUALITY: u8 = 85;
/// 压暗层不透明度
const OVERLAY_OPACITY: f32 = 0.35;
/// 水印字号（相对 160x120 画布）
const WATERMARK_FONT_SIZE: u32 = 14;
/// 水印基线距底边的距离
const WATERMARK_BASELINE_MARGIN: u32 = 8;

/// 自定义字体目录（存在则并入字体库）
const FONTS_DIR: &str = "resources/fonts";

// 全局字体数据库单例
static GLOBAL_FONT_DB: OnceLock<Arc<fontdb::Database>> = OnceLock::new();

fn get_global_font_db() -> Arc<fontdb::Database> {
    GLOBAL_FONT_DB
        .get_or_init(|| {
            let mut font_db = fontdb::Database::new();
            font_db.load_system_fonts();

            let fonts_dir = PathBuf::from(FONTS_DIR);
            if fonts_dir.exists() {
                font_db.load_fonts_dir(&fonts_dir);
            }

            tracing::debug!("字体库初始化完成，共 {} 个字面", font_db.len());
            Arc::new(font_db)
        })
        .clone()
}

/// 启动期预热字体库，避免首次生成请求承担扫描开销。
pub fn prewarm_fonts() {
    let _ = get_global_font_db();
}

/// 由谱面集 ID 派生兜底底色。
///
/// 纯函数：同一 ID 在任何进程、任何时刻都得到同一颜色，
/// 这样无背景谱面的占位图在重复生成后保持视觉稳定。
pub fn fallback_color(beatmapset_id: i64) -> [u8; 3] {
    let digest = Sha256::digest(beatmapset_id.to_string().as_bytes());
    let hue = u16::from_be_bytes([digest[0], digest[1]]) as f32 % 360.0;
    hsl_to_rgb(hue, 0.55, 0.45)
}

fn hsl_to_rgb(h: f32, s: f32, l: f32) -> [u8; 3] {
    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let hp = h / 60.0;
    let x = c * (1.0 - (hp % 2.0 - 1.0).abs());
    let (r1, g1, b1) = match hp as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = l - c / 2.0;
    [
        ((r1 + m) * 255.0).round() as u8,
        ((g1 + m) * 255.0).round() as u8,
        ((b1 + m) * 255.0).round() as u8,
    ]
}

/// 将背景图解码并按 160x120 等比裁剪填充（中心裁剪），编码为 JPEG Data URI。
///
/// 解码失败一律返回 None，调用方走纯色兜底路径；极小图会被放大而不是拒绝。
fn background_data_uri(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    let img = image::load_from_memory(bytes).ok()?;
    let rgb = img
        .resize_to_fill(THUMB_WIDTH, THUMB_HEIGHT, FilterType::Lanczos3)
        .to_rgb8();

    let mut out = Vec::new();
    let mut enc = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
    if enc
        .encode(&rgb, THUMB_WIDTH, THUMB_HEIGHT, ColorType::Rgb8.into())
        .is_err()
    {
        return None;
    }
    let b64 = base64_engine.encode(out);
    Some(format!("data:image/jpeg;base64,{b64}"))
}

/// 组装缩略图 SVG：背景层 + 压暗层 + 水印文字。
fn thumbnail_svg(background_uri: Option<&str>, beatmapset_id: i64) -> String {
    let mut svg = String::with_capacity(1024);
    let _ = write!(
        svg,
        r#"<svg width="{w}" height="{h}" viewBox="0 0 {w} {h}" xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink">"#,
        w = THUMB_WIDTH,
        h = THUMB_HEIGHT
    );

    match background_uri {
        Some(uri) => {
            let _ = write!(
                svg,
                r#"<image x="0" y="0" width="{w}" height="{h}" preserveAspectRatio="xMidYMid slice" xlink:href="{uri}"/>"#,
                w = THUMB_WIDTH,
                h = THUMB_HEIGHT
            );
        }
        None => {
            let [r, g, b] = fallback_color(beatmapset_id);
            let _ = write!(
                svg,
                r##"<rect width="{w}" height="{h}" fill="#{r:02x}{g:02x}{b:02x}"/>"##,
                w = THUMB_WIDTH,
                h = THUMB_HEIGHT
            );
        }
    }

    let _ = write!(
        svg,
        r##"<rect width="{w}" height="{h}" fill="#000000" fill-opacity="{op}"/>"##,
        w = THUMB_WIDTH,
        h = THUMB_HEIGHT,
        op = OVERLAY_OPACITY
    );
    let _ = write!(
        svg,
        r##"<text x="{x}" y="{y}" text-anchor="middle" font-family="sans-serif" font-size="{size}" fill="#ffffff">{id}</text>"##,
        x = THUMB_WIDTH / 2,
        y = THUMB_HEIGHT - WATERMARK_BASELINE_MARGIN,
        size = WATERMARK_FONT_SIZE,
        id = beatmapset_id
    );
    svg.push_str("</svg>");
    svg
}

/// 渲染谱面缩略图。
///
/// `background` 为压缩包里取出的原始图片字节；传 None 或解码失败时走纯色兜底。
/// 输出恒为 160x120 的 JPEG 字节。
pub fn render_thumbnail(
    background: Option<&[u8]>,
    beatmapset_id: i64,
    optimize_speed: bool,
) -> Result<Vec<u8>, AssetGenError> {
    let background_uri = background.and_then(background_data_uri);
    if background.is_some() && background_uri.is_none() {
        tracing::debug!("谱面集 {beatmapset_id} 背景图解码失败，使用纯色兜底");
    }
    let svg = thumbnail_svg(background_uri.as_deref(), beatmapset_id);

    let font_db = get_global_font_db();
    let opts = UsvgOptions {
        fontdb: font_db,
        font_family: "sans-serif".to_string(),
        font_size: WATERMARK_FONT_SIZE as f32,
        shape_rendering: if optimize_speed {
            usvg::ShapeRendering::OptimizeSpeed
        } else {
            usvg::ShapeRendering::GeometricPrecision
        },
        text_rendering: if optimize_speed {
            usvg::TextRendering::OptimizeSpeed
        } else {
            usvg::TextRendering::OptimizeLegibility
        },
        image_rendering: if optimize_speed {
            usvg::ImageRendering::OptimizeSpeed
        } else {
            usvg::ImageRendering::OptimizeQuality
        },
        ..Default::default()
    };

    let tree = usvg::Tree::from_data(svg.as_bytes(), &opts)
        .map_err(|e| AssetGenError::Render(format!("SVG 解析失败: {e}")))?;

    let mut pixmap = Pixmap::new(THUMB_WIDTH, THUMB_HEIGHT)
        .ok_or_else(|| AssetGenError::Render("Pixmap 创建失败".to_string()))?;
    render(&tree, Transform::default(), &mut pixmap.as_mut());

    // 将 RGBA 像素扁平化到黑色背景（JPEG 无透明通道）
    let rgba = pixmap.data();
    let mut rgb: Vec<u8> =
        Vec::with_capacity((THUMB_WIDTH as usize) * (THUMB_HEIGHT as usize) * 3);
    let mut i = 0;
    while i + 3 < rgba.len() {
        let a = rgba[i + 3] as u16;
        rgb.push(((rgba[i] as u16 * a) / 255) as u8);
        rgb.push(((rgba[i + 1] as u16 * a) / 255) as u8);
        rgb.push(((rgba[i + 2] as u16 * a) / 255) as u8);
        i += 4;
    }

    let mut out = Vec::new();
    let mut enc = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
    enc.encode(&rgb, THUMB_WIDTH, THUMB_HEIGHT, ColorType::Rgb8.into())
        .map_err(|e| AssetGenError::Render(format!("JPEG 编码失败: {e}")))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::{fallback_color, hsl_to_rgb, render_thumbnail, thumbnail_svg};

    fn png_fixture(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 40, 90]));
        let mut out = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .expect("encode png fixture");
        out.into_inner()
    }

    fn assert_is_160x120_jpeg(bytes: &[u8]) {
        assert_eq!(
            image::guess_format(bytes).expect("guess format"),
            image::ImageFormat::Jpeg
        );
        let decoded = image::load_from_memory(bytes).expect("decode thumbnail");
        assert_eq!(decoded.width(), super::THUMB_WIDTH);
        assert_eq!(decoded.height(), super::THUMB_HEIGHT);
    }

    #[test]
    fn fallback_color_is_deterministic() {
        assert_eq!(fallback_color(999999), fallback_color(999999));
        assert_eq!(fallback_color(1), fallback_color(1));
    }

    #[test]
    fn hsl_conversion_hits_primaries() {
        assert_eq!(hsl_to_rgb(0.0, 1.0, 0.5), [255, 0, 0]);
        assert_eq!(hsl_to_rgb(120.0, 1.0, 0.5), [0, 255, 0]);
        assert_eq!(hsl_to_rgb(240.0, 1.0, 0.5), [0, 0, 255]);
    }

    #[test]
    fn svg_uses_flat_rect_without_background() {
        let svg = thumbnail_svg(None, 42);
        assert!(svg.contains("<rect"));
        assert!(svg.contains(">42</text>"));
        assert!(!svg.contains("<image"));
    }

    #[test]
    fn render_without_background_is_fixed_size_jpeg() {
        let bytes = render_thumbnail(None, 999999, false).expect("render fallback");
        assert_is_160x120_jpeg(&bytes);
    }

    #[test]
    fn render_crops_any_aspect_ratio() {
        // 竖长条与横长条都必须被中心裁剪到 160x120
        for (w, h) in [(64, 256), (640, 120), (32, 24)] {
            let bytes = render_thumbnail(Some(&png_fixture(w, h)), 7, false)
                .expect("render with background");
            assert_is_160x120_jpeg(&bytes);
        }
    }

    #[test]
    fn unreadable_background_falls_back() {
        let garbage = vec![0u8; 64];
        let bytes = render_thumbnail(Some(&garbage), 31337, false).expect("render fallback");
        assert_is_160x120_jpeg(&bytes);

        let empty = render_thumbnail(Some(&[]), 31337, false).expect("render empty");
        assert_is_160x120_jpeg(&empty);
    }
}

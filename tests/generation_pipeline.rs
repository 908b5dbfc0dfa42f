//! 生成管线端到端测试：内存构造 osz 压缩包，直接驱动同步生成核心，
//! 对照缓存条目与输出格式不变量。

use std::io::Write;

use uuid::Uuid;
use zip::write::SimpleFileOptions;

use osz_asset_backend::features::assets::{AssetKind, AssetStore, ensure_generated};

// =============== 夹具 ===============

fn temp_store() -> AssetStore {
    let root = std::env::temp_dir().join(format!("osz-gen-pipeline-{}", Uuid::new_v4()));
    let store = AssetStore::new(root);
    store.ensure_layout().expect("create store layout");
    store
}

fn build_osz(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .expect("start zip entry");
        writer.write_all(data).expect("write zip entry");
    }
    writer.finish().expect("finish zip").into_inner()
}

fn definition(preview_time: Option<i64>, background: Option<&str>, audio: Option<&str>) -> Vec<u8> {
    let mut text = String::from("osu file format v14\n\n[General]\n");
    if let Some(a) = audio {
        text.push_str(&format!("AudioFilename: {a}\n"));
    }
    if let Some(t) = preview_time {
        text.push_str(&format!("PreviewTime: {t}\n"));
    }
    text.push_str("\n[Metadata]\nTitle:Test Song\nArtist:Test Artist\n\n[Events]\n");
    if let Some(bg) = background {
        text.push_str(&format!("0,0,\"{bg}\",0,0\n"));
    }
    text.into_bytes()
}

fn png_fixture(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([30, 144, 255]));
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("encode png fixture");
    out.into_inner()
}

/// 单声道 16bit PCM WAV（440Hz 正弦）。
fn wav_fixture(seconds: f64, sample_rate: u32) -> Vec<u8> {
    let num_samples = (seconds * sample_rate as f64) as u32;
    let data_len = num_samples * 2;
    let mut out = Vec::with_capacity(44 + data_len as usize);

    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for n in 0..num_samples {
        let t = n as f64 / sample_rate as f64;
        let v = (t * 440.0 * 2.0 * std::f64::consts::PI).sin();
        out.extend_from_slice(&((v * 8000.0) as i16).to_le_bytes());
    }
    out
}

fn assert_thumbnail_invariants(bytes: &[u8]) {
    assert_eq!(
        image::guess_format(bytes).expect("guess thumbnail format"),
        image::ImageFormat::Jpeg
    );
    let decoded = image::load_from_memory(bytes).expect("decode thumbnail");
    assert_eq!((decoded.width(), decoded.height()), (160, 120));
}

/// 用 symphonia 解码 MP3，返回（时长秒, 采样率）。
fn mp3_duration_secs(bytes: &[u8]) -> (f64, u32) {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
    use symphonia::core::errors::Error as SymphoniaError;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    let mss = MediaSourceStream::new(
        Box::new(std::io::Cursor::new(bytes.to_vec())),
        Default::default(),
    );
    let mut hint = Hint::new();
    hint.with_extension("mp3");

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .expect("probe mp3");
    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .expect("mp3 track");
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .expect("mp3 decoder");
    let track_id = track.id;

    let mut frames = 0u64;
    let mut rate = 0u32;
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(_)) => break,
            Err(e) => panic!("read mp3 packet: {e}"),
        };
        if packet.track_id() != track_id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                rate = spec.rate;
                let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                frames += (buf.samples().len() / spec.channels.count()) as u64;
            }
            Err(SymphoniaError::DecodeError(_)) => (),
            Err(SymphoniaError::IoError(_)) => break,
            Err(e) => panic!("decode mp3: {e}"),
        }
    }
    assert!(rate > 0, "mp3 produced no samples");
    (frames as f64 / rate as f64, rate)
}

// =============== 场景 ===============

#[test]
fn full_archive_generates_both_assets() {
    let store = temp_store();
    let osz = build_osz(&[
        (
            "song.osu",
            definition(Some(2_000), Some("bg.png"), Some("audio.wav")).as_slice(),
        ),
        ("bg.png", png_fixture(640, 480).as_slice()),
        ("audio.wav", wav_fixture(5.0, 44_100).as_slice()),
    ]);

    ensure_generated(&store, 1001, osz, true);

    let thumb = store.get(1001, AssetKind::Thumbnail).expect("thumbnail cached");
    assert_thumbnail_invariants(&thumb);

    let preview = store.get(1001, AssetKind::Preview).expect("preview cached");
    let (duration, rate) = mp3_duration_secs(&preview);
    assert_eq!(rate, 22_050);
    // PreviewTime=2000ms，音轨 5 秒：窗口应为约 3 秒
    assert!(
        (duration - 3.0).abs() < 0.3,
        "expected ~3s preview, got {duration}s"
    );
}

#[test]
fn bare_archive_yields_fallback_thumbnail_and_no_preview() {
    let store = temp_store();
    // 既没有定义文件，也没有背景和音频
    let osz = build_osz(&[("readme.txt", b"hello")]);

    ensure_generated(&store, 999999, osz, true);

    let thumb = store
        .get(999999, AssetKind::Thumbnail)
        .expect("fallback thumbnail cached");
    assert_thumbnail_invariants(&thumb);
    // 试听静默失败：缓存保持缺失
    assert!(store.get(999999, AssetKind::Preview).is_none());
}

#[test]
fn out_of_range_preview_time_starts_from_zero() {
    let store = temp_store();
    // PreviewTime 30s >= 音轨 12s，回退到从 0 开始的完整 10 秒窗口
    let osz = build_osz(&[
        (
            "song.osu",
            definition(Some(30_000), None, Some("audio.wav")).as_slice(),
        ),
        ("audio.wav", wav_fixture(12.0, 22_050).as_slice()),
    ]);

    ensure_generated(&store, 1002, osz, true);

    let preview = store.get(1002, AssetKind::Preview).expect("preview cached");
    let (duration, _) = mp3_duration_secs(&preview);
    assert!(
        (duration - 10.0).abs() < 0.3,
        "expected ~10s preview, got {duration}s"
    );
}

#[test]
fn missing_preview_time_defaults_to_track_start() {
    let store = temp_store();
    let osz = build_osz(&[
        (
            "song.osu",
            definition(None, Some("bg.png"), Some("audio.wav")).as_slice(),
        ),
        ("bg.png", png_fixture(100, 700).as_slice()),
        ("audio.wav", wav_fixture(4.0, 44_100).as_slice()),
    ]);

    ensure_generated(&store, 1003, osz, true);

    assert_thumbnail_invariants(&store.get(1003, AssetKind::Thumbnail).unwrap());
    let (duration, _) = mp3_duration_secs(&store.get(1003, AssetKind::Preview).unwrap());
    assert!(
        (duration - 4.0).abs() < 0.3,
        "expected ~4s preview, got {duration}s"
    );
}

#[test]
fn declared_background_wins_over_extension_guess() {
    let store = temp_store();
    // 压缩包里先出现一张"诱饵"大图，定义声明的才是正主；
    // 生成必须按声明取 real.png（1x1 放大后整图同色）。
    let decoy = image::RgbImage::from_pixel(8, 8, image::Rgb([255, 0, 0]));
    let mut decoy_png = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(decoy)
        .write_to(&mut decoy_png, image::ImageFormat::Png)
        .unwrap();
    let real = image::RgbImage::from_pixel(8, 8, image::Rgb([0, 0, 255]));
    let mut real_png = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(real)
        .write_to(&mut real_png, image::ImageFormat::Png)
        .unwrap();

    let osz = build_osz(&[
        ("aaa_decoy.png", decoy_png.into_inner().as_slice()),
        (
            "song.osu",
            definition(None, Some("real.png"), None).as_slice(),
        ),
        ("real.png", real_png.into_inner().as_slice()),
    ]);

    ensure_generated(&store, 1004, osz, true);

    let thumb = store.get(1004, AssetKind::Thumbnail).unwrap();
    let decoded = image::load_from_memory(&thumb).unwrap().to_rgb8();
    let center = decoded.get_pixel(80, 30);
    // 压暗后的蓝色背景：蓝通道仍显著强于红通道
    assert!(
        center[2] as u16 > center[0] as u16 + 40,
        "expected blue-dominant pixel, got {:?}",
        center
    );
}

#[test]
fn corrupt_archive_fails_silently_for_both_kinds() {
    let store = temp_store();

    ensure_generated(&store, 1005, b"this is not a zip archive".to_vec(), true);

    assert!(store.get(1005, AssetKind::Thumbnail).is_none());
    assert!(store.get(1005, AssetKind::Preview).is_none());
}

#[test]
fn unsupported_audio_does_not_block_thumbnail() {
    let store = temp_store();
    let osz = build_osz(&[
        (
            "song.osu",
            definition(Some(1_000), Some("bg.png"), Some("audio.mp3")).as_slice(),
        ),
        ("bg.png", png_fixture(320, 240).as_slice()),
        // 扩展名是 mp3，内容是垃圾：试听失败，缩略图不受影响
        ("audio.mp3", b"garbage garbage garbage".as_slice()),
    ]);

    ensure_generated(&store, 1006, osz, true);

    assert_thumbnail_invariants(&store.get(1006, AssetKind::Thumbnail).unwrap());
    assert!(store.get(1006, AssetKind::Preview).is_none());
}

#[test]
fn regeneration_is_an_idempotent_no_op() {
    let store = temp_store();
    let osz = build_osz(&[
        (
            "song.osu",
            definition(Some(0), None, Some("audio.wav")).as_slice(),
        ),
        ("audio.wav", wav_fixture(3.0, 44_100).as_slice()),
    ]);

    ensure_generated(&store, 1007, osz.clone(), true);
    let thumb_first = store.get(1007, AssetKind::Thumbnail).unwrap();
    let preview_first = store.get(1007, AssetKind::Preview).unwrap();

    // 缓存已存在：第二次调用应跳过，不重写条目
    ensure_generated(&store, 1007, osz, true);
    assert_eq!(store.get(1007, AssetKind::Thumbnail).unwrap(), thumb_first);
    assert_eq!(store.get(1007, AssetKind::Preview).unwrap(), preview_first);

    assert_thumbnail_invariants(&thumb_first);
    let (duration, rate) = mp3_duration_secs(&preview_first);
    assert_eq!(rate, 22_050);
    assert!((duration - 3.0).abs() < 0.3);
}

#[test]
fn sub_second_track_still_produces_preview() {
    let store = temp_store();
    let osz = build_osz(&[
        (
            "song.osu",
            definition(Some(-1), None, Some("blip.wav")).as_slice(),
        ),
        ("blip.wav", wav_fixture(0.5, 44_100).as_slice()),
    ]);

    ensure_generated(&store, 1008, osz, true);

    let preview = store.get(1008, AssetKind::Preview).expect("short preview cached");
    let (duration, _) = mp3_duration_secs(&preview);
    assert!(duration > 0.2 && duration < 1.0, "got {duration}s");
}

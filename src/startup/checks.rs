use crate::config::AppConfig;
use crate::error::AppError;
use crate::features::assets::AssetStore;
use crate::features::thumbnail;
use std::fs;
use std::path::PathBuf;

/// 执行启动检查
///
/// 1. 检查并创建 resources 文件夹
/// 2. 检查并创建资产缓存目录（缩略图 / 试听子目录）
/// 3. 检查字体资源（仅告警，不阻断启动）
/// 4. 预热字体库，降低首次生成请求的长尾延迟
pub async fn run_startup_checks(config: &AppConfig) -> Result<(), AppError> {
    tracing::info!("🔍 开始执行启动检查...");

    ensure_resources_folder(config)?;
    ensure_asset_layout(config)?;
    ensure_font_resources();

    let t_prewarm = std::time::Instant::now();
    if let Err(e) = tokio::task::spawn_blocking(thumbnail::prewarm_fonts).await {
        tracing::warn!("字体库预热任务失败: {}", e);
    } else {
        tracing::info!("字体库预热完成: {}ms", t_prewarm.elapsed().as_millis());
    }

    tracing::info!("✅ 启动检查完成");
    Ok(())
}

/// 确保 resources 文件夹存在
fn ensure_resources_folder(config: &AppConfig) -> Result<(), AppError> {
    let resources_path = config.resources_path();

    if !resources_path.exists() {
        tracing::warn!("📁 未找到 resources 文件夹，正在创建: {:?}", resources_path);
        fs::create_dir_all(&resources_path)
            .map_err(|e| AppError::Internal(format!("创建 resources 文件夹失败: {e}")))?;
        tracing::info!("✅ resources 文件夹创建成功");
    } else {
        tracing::info!("✅ resources 文件夹已存在");
    }

    Ok(())
}

/// 确保资产缓存目录结构存在
fn ensure_asset_layout(config: &AppConfig) -> Result<(), AppError> {
    let store = AssetStore::new(config.assets_path());
    store
        .ensure_layout()
        .map_err(|e| AppError::Internal(format!("创建资产缓存目录失败: {e}")))?;
    tracing::info!("✅ 资产缓存目录就绪: {:?}", store.root());
    Ok(())
}

/// 检查字体目录（水印渲染优先使用系统字体，目录缺失只降级不报错）
fn ensure_font_resources() {
    let font_dir = PathBuf::from("resources/fonts");
    if font_dir.is_dir() {
        tracing::info!("字体目录存在: {:?}", font_dir);
    } else {
        tracing::warn!("未找到字体目录 {:?}，水印将依赖系统字体", font_dir);
    }
}

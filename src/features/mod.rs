/// 谱面压缩包读取模块
pub mod archive;

/// 谱面定义（.osu）解析模块
pub mod beatmap;

/// 缩略图渲染模块
pub mod thumbnail;

/// 试听音频裁剪模块
pub mod preview;

/// 资产缓存与编排模块
pub mod assets;

/// 上传触发模块
pub mod upload;

/// 健康检查模块
pub mod health;

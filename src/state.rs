use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::features::assets::AssetStore;

/// 聚合的应用共享状态
#[derive(Clone)]
pub struct AppState {
    /// 生成资产的磁盘缓存
    pub asset_store: Arc<AssetStore>,
    /// 控制并发生成的信号量（限制 CPU 密集型任务数量）
    pub generate_semaphore: Arc<Semaphore>,
    /// 单个上传压缩包的字节上限
    pub upload_max_bytes: u64,
    /// 栅格化是否偏向速度
    pub optimize_speed: bool,
}

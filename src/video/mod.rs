//! Video assets, the idle/talking catalog, and the idle-pattern scheduler.
//!
//! - [`VideoCatalog`]: the static `video_config.json` structure: idle clips
//!   by key, the three talking clips, and the repeating idle pattern.
//! - [`VideoAsset`]: resolved duration/dimension metadata for one file,
//!   tagged [`AssetKind::Image`] or [`AssetKind::Video`].
//! - [`VideoScheduler`]: owns the asset memo, advances the idle cursor,
//!   selects talking clips by reply length, and runs the idle loop.

pub mod asset;
pub mod catalog;
pub mod scheduler;

pub use asset::{AssetKind, AssetProbe, FfprobeProbe, VideoAsset, VideoStreamInfo};
pub use catalog::{IdlePatternStep, VideoCatalog, VideoFiles};
pub use scheduler::{
    IDLE_RETRY_BACKOFF, IdleStep, MEDIUM_REPLY_CHARS, SHORT_REPLY_CHARS, SchedulerCursor,
    VideoScheduler,
};

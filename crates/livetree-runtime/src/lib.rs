#![forbid(unsafe_code)]

//! Frame-scheduled runtime for livetree.
//!
//! # Role in livetree
//! `livetree-runtime` decides *when* reconciliation happens. It batches
//! render requests between animation frames, runs one patch pass per frame
//! over the graphics and outline views, and paints page canvases on a
//! cancellable background thread.
//!
//! # Primary responsibilities
//! - **ReconcileScheduler**: owns the live trees and runs passes on demand.
//! - **ChangeCoalescer**: latest-wins batching of renders and view changes.
//! - **RasterPass**: background painting with cooperative cancellation.
//! - **RuntimeConfig**: TOML/JSON configuration (`config-file` feature).
//! - **Telemetry**: `tracing-subscriber` setup (`telemetry` feature).
//!
//! # How it fits in the system
//! A document backend sends [`RenderRequest`]s; the host's frame loop calls
//! [`ReconcileScheduler::on_frame`] whenever
//! [`ReconcileScheduler::needs_frame`] is true. The structural work itself
//! lives in `livetree-render` and `livetree-core`.

pub mod coalescer;
pub mod config;
pub mod raster;
pub mod scheduler;
#[cfg(feature = "telemetry")]
pub mod telemetry;

pub use coalescer::{
    ChangeCoalescer, PendingBatch, RenderKind, RenderRequest, ViewChange, ViewConcern,
};
pub use config::{ConfigError, LogConfig, PatchConfig, RasterConfig, RuntimeConfig};
pub use raster::{BlankRasterizer, RasterError, RasterOutcome, RasterPass, Rasterizer};
pub use scheduler::{FrameReport, PassError, PassReport, ReconcileScheduler};
#[cfg(feature = "telemetry")]
pub use telemetry::{TelemetryError, init_tracing};

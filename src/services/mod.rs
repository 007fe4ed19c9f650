/// Change-driven fan-out of seed snapshots.
pub mod broadcast_scheduler;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Debounced write-back of dirty seeds.
pub mod persistence_sync;
/// Seed store connection supervision with degraded mode.
pub mod storage_supervisor;
/// WebSocket connection and message handling service.
pub mod websocket_service;

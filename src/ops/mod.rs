// ============================================================================
// OPS MODULE: heavy image operations for ColorSplash
// ============================================================================
//
// Architecture:
//   quantize.rs: image → capped distinct palette + per-cell palette index
//   jobs.rs    : cancellable background runner for quantize requests
// ============================================================================

pub mod jobs;
pub mod quantize;

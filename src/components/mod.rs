// ============================================================================
// COMPONENTS: interactive canvas engine
// ============================================================================
//
// Architecture:
//   gesture.rs: pointer map + viewport transform → affected cell indices
//   history.rs: stroke-level undo/redo snapshots
//   cycle.rs  : picks the next active color once the current one is done
// ============================================================================

pub mod cycle;
pub mod gesture;
pub mod history;

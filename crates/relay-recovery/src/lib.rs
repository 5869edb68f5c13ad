pub mod reconciler;

pub use reconciler::{OrderReconciler, ReconciliationReport};

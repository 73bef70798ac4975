//! Per-submission completion callbacks

use contracts::DeliveryReport;
use tokio::sync::oneshot;

/// Completion callback, consumed on the batch's terminal outcome
pub type Callback = Box<dyn FnOnce(&DeliveryReport) + Send + 'static>;

/// Wrap a closure as a [`Callback`]
pub fn from_fn<F>(f: F) -> Callback
where
    F: FnOnce(&DeliveryReport) + Send + 'static,
{
    Box::new(f)
}

/// Callback that forwards the report to a one-shot receiver
///
/// The receiver yields `Err` if the batch was abandoned by a forced close.
pub fn oneshot() -> (Callback, oneshot::Receiver<DeliveryReport>) {
    let (tx, rx) = oneshot::channel();
    let callback = from_fn(move |report: &DeliveryReport| {
        let _ = tx.send(report.clone());
    });
    (callback, rx)
}

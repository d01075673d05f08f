use std::time::Instant;

/// Monotonic seconds, measured from an arbitrary but fixed epoch for the
/// lifetime of the process. Used for `WorkflowMeta::started_at` and
/// `WorkflowRuntime::task_started_at`; never `SystemTime`, which can jump.
pub fn monotonic_seconds() -> f64 {
    EPOCH.elapsed().as_secs_f64()
}

static EPOCH: once_epoch::Epoch = once_epoch::Epoch::new();

mod once_epoch {
    use super::Instant;
    use std::sync::OnceLock;

    pub struct Epoch(OnceLock<Instant>);

    impl Epoch {
        pub const fn new() -> Self {
            Epoch(OnceLock::new())
        }

        pub fn elapsed(&self) -> std::time::Duration {
            self.0.get_or_init(Instant::now).elapsed()
        }
    }
}

pub mod fake_repository;
pub mod fixtures;

pub use fake_repository::{FakeRepository, FakeRepositoryStats};

/// Route `log` output through `env_logger` in tests (`RUST_LOG=debug`).
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

use once_cell::sync::OnceCell;

static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

// Initializes env_logger once per test binary; `RUST_LOG=tessera_core=trace` shows graph construction.
#[allow(dead_code)]
pub(crate) fn init_logger() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

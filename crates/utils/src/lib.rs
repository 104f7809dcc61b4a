pub mod env_probe;
pub mod exec_mode;
pub mod logging;
pub mod settings;

pub use env_probe::{conda_run_prefix, get_health, has_command, select_conda_env};
pub use exec_mode::ExecMode;
pub use logging::tail_file;
pub use settings::Settings;

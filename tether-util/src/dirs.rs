use std::path::PathBuf;

/// Return the application state directory, this is where provisioning
/// results are kept between runs
pub fn state_dir() -> PathBuf {
    let dir = if let Some(state_dir) = dirs::state_dir() {
        state_dir
    } else {
        // Fallback to home directory if state dir is not available
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".local")
            .join("state")
    };
    dir.join(env!("TETHER_PKG_NAME"))
}

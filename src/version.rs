// Version information for the FastVLM node

/// Semantic version number
pub const VERSION_NUMBER: &str = env!("CARGO_PKG_VERSION");

/// Full version string
pub const VERSION: &str = concat!("v", env!("CARGO_PKG_VERSION"), "-fastvlm-onnx");

/// Get formatted version string for logging
pub fn get_version_string() -> String {
    format!("FastVLM Node {}", VERSION_NUMBER)
}

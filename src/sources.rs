//! Built-in source definitions embedded in the binary
//!
//! This module embeds the known export formats directly into the binary,
//! allowing a project file to list `novaxs_270` instead of an inline definition.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Built-in source YAML definitions
pub static BUILTIN_SOURCES: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    let mut m = HashMap::new();

    // NovaXS point of sale
    m.insert("novaxs_270", include_str!("../sources/novaxs_270.yaml"));
    m.insert("novaxs_664", include_str!("../sources/novaxs_664.yaml"));
    m.insert("novaxs_418", include_str!("../sources/novaxs_418.yaml"));

    // Quality ERP
    m.insert(
        "quality_contas_receber",
        include_str!("../sources/quality_contas_receber.yaml"),
    );
    m.insert("quality_acessos", include_str!("../sources/quality_acessos.yaml"));

    // Limber access control
    m.insert("limber_acessos", include_str!("../sources/limber_acessos.yaml"));

    // Weather scraping
    m.insert("clima_scraping", include_str!("../sources/clima_scraping.yaml"));

    m
});

/// Get a built-in source by name
pub fn get_builtin(name: &str) -> Option<&'static str> {
    BUILTIN_SOURCES.get(name).copied()
}

/// Check if a name is a built-in source
pub fn is_builtin(name: &str) -> bool {
    BUILTIN_SOURCES.contains_key(name)
}

/// List all built-in source names, sorted
pub fn list_builtin() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = BUILTIN_SOURCES.keys().copied().collect();
    names.sort_unstable();
    names
}

/// Example program to print the loaded configuration
///
/// Run with: cargo run -p oit-config --example print_config

fn main() {
    // Load configuration from oit.toml
    let config = oit_config::OitConfig::load();

    println!("=== OIT Configuration ===\n");

    println!("Buffer Settings:");
    println!("  Resolution: {}x{}", config.buffer.width, config.buffer.height);
    println!("  Capacity: {:?}", config.buffer.capacity);
    println!("  Max Fragments: {}", config.buffer.max_fragments);
    println!();

    println!("Resolve Settings:");
    println!("  Empty Pixel: {:?}", config.resolve.empty_pixel);
    println!("  Depth Key: {:?}", config.resolve.depth_key);
    println!();

    println!("Runtime Settings:");
    println!("  Backend: {:?}", config.runtime.backend);
    println!("  Threads: {:?}", config.runtime.threads);
    println!();

    println!("Demo Settings:");
    println!("  Output: {}", config.demo.output.display());
    println!("  Background: {:?}", config.demo.background);
    println!();

    match toml::to_string_pretty(&config) {
        Ok(toml_str) => {
            println!("=== Serialized Configuration ===");
            println!("{}", toml_str);
        }
        Err(e) => {
            eprintln!("Failed to serialize config: {}", e);
        }
    }
}

use std::env;
use std::fs;
use std::path::Path;

const EMBEDDED_VARS: [&str; 2] = ["MOCKMATE_API_BASE_URL", "MOCKMATE_API_TOKEN"];

fn main() {
    // Load .env file during build so release binaries can carry a default backend
    if let Err(e) = dotenvy::dotenv() {
        println!("cargo:warning=BUILD.RS: No .env file loaded ({}). Using system environment variables.", e);
    }

    // Also try the parent directory .env (shared with the web app checkout)
    let parent_env = Path::new("../.env");
    if parent_env.exists() {
        if let Ok(contents) = fs::read_to_string(parent_env) {
            for line in contents.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    let key = key.trim();
                    if !EMBEDDED_VARS.contains(&key) || env::var(key).is_ok() {
                        continue;
                    }

                    // Remove inline comments from the value
                    let value = match value.find('#') {
                        Some(comment_pos) => value[..comment_pos].trim(),
                        None => value.trim(),
                    };
                    env::set_var(key, value);
                }
            }
        }
    }

    // Picked up at runtime through option_env!() as a fallback default
    for key in EMBEDDED_VARS {
        println!("cargo:rerun-if-env-changed={}", key);
        if let Ok(value) = env::var(key) {
            println!("cargo:rustc-env={}={}", key, value);
            println!("cargo:warning=Embedded {} (length: {})", key, value.len());
        }
    }
}

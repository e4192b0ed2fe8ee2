use std::fs;

use anyhow::Context;

fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "openapi.json".to_string());

    let doc = site_supervision::docs::build_openapi(8000)?;
    let body = serde_json::to_string_pretty(&doc)?;
    fs::write(&path, body).with_context(|| format!("failed to write {path}"))?;
    println!("wrote {}", path);
    Ok(())
}

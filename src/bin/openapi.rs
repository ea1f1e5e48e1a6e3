//! Print the OpenAPI document for the API surface.

use anyhow::Result;

fn main() -> Result<()> {
    let spec = talentgate::api::openapi();
    println!("{}", serde_json::to_string_pretty(&spec)?);
    Ok(())
}

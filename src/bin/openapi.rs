use anyhow::Result;

// Print the OpenAPI document served at /api-docs/openapi.json.
fn main() -> Result<()> {
    let doc = account_portal::api::openapi();
    let json = serde_json::to_string_pretty(&doc)?;
    println!("{json}");
    Ok(())
}
